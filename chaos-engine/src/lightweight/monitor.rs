//! Process resource sampling and budget checks.

use super::profile::ResourceProfile;
use chaos_types::time::unix_millis_now;
use serde::Serialize;
use sysinfo::{Pid, System};

const BYTES_PER_MB: f64 = 1024.0 * 1024.0;

/// One reading of this process's resource use.
#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize)]
pub struct ResourceSample {
    /// Resident memory in MB.
    pub memory_mb: f64,
    /// CPU use in percent of one core.
    pub cpu_percent: f32,
}

/// Source of resource readings.
pub trait ResourceSampler: Send {
    /// Take a reading.
    fn sample(&mut self) -> ResourceSample;
}

/// Reads the current process through `sysinfo`.
pub struct SystemSampler {
    system: System,
    pid: Option<Pid>,
}

impl std::fmt::Debug for SystemSampler {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SystemSampler").field("pid", &self.pid).finish()
    }
}

impl SystemSampler {
    /// Sampler for this process.
    pub fn new() -> Self {
        let pid = match sysinfo::get_current_pid() {
            Ok(pid) => Some(pid),
            Err(e) => {
                tracing::warn!(error = e, "cannot resolve own pid, samples will read zero");
                None
            }
        };
        Self {
            system: System::new_all(),
            pid,
        }
    }
}

impl Default for SystemSampler {
    fn default() -> Self {
        Self::new()
    }
}

impl ResourceSampler for SystemSampler {
    fn sample(&mut self) -> ResourceSample {
        self.system.refresh_all();
        match self.pid.and_then(|pid| self.system.process(pid)) {
            Some(process) => ResourceSample {
                memory_mb: process.memory() as f64 / BYTES_PER_MB,
                cpu_percent: process.cpu_usage(),
            },
            None => ResourceSample::default(),
        }
    }
}

/// Result of a budget check.
#[derive(Debug, Clone, PartialEq)]
pub enum BudgetCheck {
    /// Usage within the profile.
    Within(ResourceSample),
    /// Usage over the profile.
    Exceeded {
        /// The offending reading.
        sample: ResourceSample,
        /// Which limit was crossed.
        reason: String,
    },
}

impl BudgetCheck {
    /// True when a limit was crossed.
    pub fn is_exceeded(&self) -> bool {
        matches!(self, BudgetCheck::Exceeded { .. })
    }

    /// The reading behind the check.
    pub fn sample(&self) -> ResourceSample {
        match self {
            BudgetCheck::Within(sample) | BudgetCheck::Exceeded { sample, .. } => *sample,
        }
    }
}

/// Samples resource use and compares it with a [`ResourceProfile`].
pub struct ResourceMonitor {
    profile: ResourceProfile,
    sampler: Box<dyn ResourceSampler>,
    peak_memory_mb: f64,
    samples: u64,
}

impl std::fmt::Debug for ResourceMonitor {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ResourceMonitor")
            .field("profile", &self.profile)
            .field("peak_memory_mb", &self.peak_memory_mb)
            .field("samples", &self.samples)
            .finish_non_exhaustive()
    }
}

impl ResourceMonitor {
    /// Monitor this process against `profile`.
    pub fn new(profile: ResourceProfile) -> Self {
        Self::with_sampler(profile, Box::new(SystemSampler::new()))
    }

    /// Monitor with a custom sampler.
    pub fn with_sampler(profile: ResourceProfile, sampler: Box<dyn ResourceSampler>) -> Self {
        Self {
            profile,
            sampler,
            peak_memory_mb: 0.0,
            samples: 0,
        }
    }

    /// Budget being enforced.
    pub fn profile(&self) -> &ResourceProfile {
        &self.profile
    }

    /// Highest memory reading so far.
    pub fn peak_memory_mb(&self) -> f64 {
        self.peak_memory_mb
    }

    /// Readings taken so far.
    pub fn samples(&self) -> u64 {
        self.samples
    }

    /// Take a reading and track the peak.
    pub fn sample(&mut self) -> ResourceSample {
        let sample = self.sampler.sample();
        self.samples += 1;
        self.peak_memory_mb = self.peak_memory_mb.max(sample.memory_mb);
        sample
    }

    /// Take a reading and compare it with the budget.
    pub fn check(&mut self) -> BudgetCheck {
        let sample = self.sample();
        let memory_limit = self.profile.memory_limit_mb as f64;
        let cpu_limit = (self.profile.cpu_cores * 100.0) as f32;

        if sample.memory_mb > memory_limit {
            return BudgetCheck::Exceeded {
                sample,
                reason: format!(
                    "memory {:.1}MB over {}MB budget",
                    sample.memory_mb, self.profile.memory_limit_mb
                ),
            };
        }
        if sample.cpu_percent > cpu_limit {
            return BudgetCheck::Exceeded {
                sample,
                reason: format!("cpu {:.0}% over {:.0}% budget", sample.cpu_percent, cpu_limit),
            };
        }
        BudgetCheck::Within(sample)
    }
}

/// Counters for one lightweight run.
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct LightweightMetrics {
    /// Run start (Unix milliseconds).
    pub started_at_ms: u64,
    /// Run end (Unix milliseconds).
    pub finished_at_ms: Option<u64>,
    /// Last memory reading in MB.
    pub memory_used_mb: f64,
    /// Highest memory reading in MB.
    pub peak_memory_mb: f64,
    /// Scenarios run.
    pub tests_executed: u64,
    /// Scenarios skipped for budget.
    pub tests_skipped: u64,
    /// Failed operations across all runs.
    pub errors: u64,
    /// Budget checks that failed.
    pub resource_violations: u64,
}

impl LightweightMetrics {
    /// Start counting now.
    pub fn start() -> Self {
        Self {
            started_at_ms: unix_millis_now(),
            ..Self::default()
        }
    }

    /// Stamp the end time.
    pub fn finish(&mut self) {
        self.finished_at_ms = Some(unix_millis_now());
    }

    /// Fraction of planned scenarios that ran; 1.0 when nothing was planned.
    pub fn completion_rate(&self) -> f64 {
        let planned = self.tests_executed + self.tests_skipped;
        if planned == 0 {
            1.0
        } else {
            self.tests_executed as f64 / planned as f64
        }
    }
}

#[cfg(test)]
pub(crate) mod tests {
    use super::*;

    /// Replays a fixed sequence, repeating the last reading.
    pub(crate) struct ScriptedSampler(pub Vec<ResourceSample>);

    impl ResourceSampler for ScriptedSampler {
        fn sample(&mut self) -> ResourceSample {
            if self.0.len() > 1 {
                self.0.remove(0)
            } else {
                self.0.first().copied().unwrap_or_default()
            }
        }
    }

    pub(crate) fn mb(memory_mb: f64) -> ResourceSample {
        ResourceSample {
            memory_mb,
            cpu_percent: 0.0,
        }
    }

    #[test]
    fn within_budget() {
        let mut monitor = ResourceMonitor::with_sampler(
            ResourceProfile::standard(),
            Box::new(ScriptedSampler(vec![mb(40.0)])),
        );
        assert_eq!(monitor.check(), BudgetCheck::Within(mb(40.0)));
    }

    #[test]
    fn memory_over_budget() {
        let mut monitor = ResourceMonitor::with_sampler(
            ResourceProfile::ultra_light(),
            Box::new(ScriptedSampler(vec![mb(100.0)])),
        );
        let check = monitor.check();
        assert!(check.is_exceeded());
        match check {
            BudgetCheck::Exceeded { reason, .. } => assert!(reason.contains("64MB")),
            BudgetCheck::Within(_) => unreachable!(),
        }
    }

    #[test]
    fn cpu_over_budget() {
        let mut monitor = ResourceMonitor::with_sampler(
            ResourceProfile::ultra_light(),
            Box::new(ScriptedSampler(vec![ResourceSample {
                memory_mb: 1.0,
                cpu_percent: 90.0,
            }])),
        );
        assert!(monitor.check().is_exceeded());
    }

    #[test]
    fn tracks_peak() {
        let mut monitor = ResourceMonitor::with_sampler(
            ResourceProfile::standard(),
            Box::new(ScriptedSampler(vec![mb(10.0), mb(90.0), mb(30.0)])),
        );
        for _ in 0..3 {
            monitor.sample();
        }
        assert_eq!(monitor.peak_memory_mb(), 90.0);
        assert_eq!(monitor.samples(), 3);
    }

    #[test]
    fn system_sampler_reads_this_process() {
        let sample = SystemSampler::new().sample();
        assert!(sample.memory_mb > 0.0);
    }

    #[test]
    fn completion_rate() {
        let mut metrics = LightweightMetrics::start();
        assert_eq!(metrics.completion_rate(), 1.0);
        metrics.tests_executed = 3;
        metrics.tests_skipped = 1;
        assert_eq!(metrics.completion_rate(), 0.75);
        metrics.finish();
        assert!(metrics.finished_at_ms.unwrap() >= metrics.started_at_ms);
    }
}
