//! Resource budgets for lightweight runs.

use chaos_config::{
    parse_cpu_cores, parse_memory_mb, LightweightModeConfig, ProfileName, UnitError,
};
use std::time::Duration;

/// Resource budget for a lightweight run.
#[derive(Debug, Clone, PartialEq)]
pub struct ResourceProfile {
    /// Process memory budget in MB.
    pub memory_limit_mb: u64,
    /// CPU budget in cores.
    pub cpu_cores: f64,
    /// Tests allowed at once. Lightweight runs still execute one at a time.
    pub max_concurrent_tests: usize,
    /// Duration of each scenario run.
    pub test_duration: Duration,
    /// Time between resource samples.
    pub sample_interval: Duration,
    /// Records per replay batch.
    pub batch_size: usize,
}

/// Workload-shaped presets.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Workload {
    /// Shared CI runners: short and small.
    Ci,
    /// Developer machines: longer runs, more memory.
    Development,
}

impl ResourceProfile {
    /// 64MB, a quarter core.
    pub fn ultra_light() -> Self {
        Self {
            memory_limit_mb: 64,
            cpu_cores: 0.25,
            max_concurrent_tests: 1,
            test_duration: Duration::from_secs(3),
            sample_interval: Duration::from_secs(1),
            batch_size: 5,
        }
    }

    /// 128MB, half a core.
    pub fn standard() -> Self {
        Self {
            memory_limit_mb: 128,
            cpu_cores: 0.5,
            max_concurrent_tests: 2,
            test_duration: Duration::from_secs(5),
            sample_interval: Duration::from_millis(500),
            batch_size: 10,
        }
    }

    /// 256MB, one core.
    pub fn balanced() -> Self {
        Self {
            memory_limit_mb: 256,
            cpu_cores: 1.0,
            max_concurrent_tests: 4,
            test_duration: Duration::from_secs(10),
            sample_interval: Duration::from_millis(250),
            batch_size: 20,
        }
    }

    /// Preset for a workload.
    pub fn for_workload(workload: Workload) -> Self {
        match workload {
            Workload::Ci => Self {
                memory_limit_mb: 128,
                cpu_cores: 0.5,
                max_concurrent_tests: 1,
                test_duration: Duration::from_secs(3),
                sample_interval: Duration::from_millis(500),
                batch_size: 10,
            },
            Workload::Development => Self {
                memory_limit_mb: 256,
                cpu_cores: 1.0,
                max_concurrent_tests: 2,
                test_duration: Duration::from_secs(10),
                sample_interval: Duration::from_millis(500),
                batch_size: 20,
            },
        }
    }

    /// Preset by configured name.
    pub fn named(name: ProfileName) -> Self {
        match name {
            ProfileName::UltraLight => Self::ultra_light(),
            ProfileName::Standard => Self::standard(),
            ProfileName::Balanced => Self::balanced(),
            ProfileName::Ci => Self::for_workload(Workload::Ci),
            ProfileName::Development => Self::for_workload(Workload::Development),
        }
    }

    /// Pick a preset from total system memory and CPU count.
    ///
    /// - < 2048 MB or a single CPU: ultra-light
    /// - < 8192 MB or fewer than 4 CPUs: standard
    /// - otherwise: balanced
    pub fn for_system(total_memory_mb: u64, cpus: usize) -> Self {
        if total_memory_mb < 2048 || cpus <= 1 {
            Self::ultra_light()
        } else if total_memory_mb < 8192 || cpus < 4 {
            Self::standard()
        } else {
            Self::balanced()
        }
    }

    /// Pick a preset for this machine.
    pub fn auto_select() -> Self {
        let cpus = std::thread::available_parallelism()
            .map(|n| n.get())
            .unwrap_or(1);
        let memory = detect_total_memory_mb();
        let profile = Self::for_system(memory, cpus);
        tracing::debug!(
            memory_mb = memory,
            cpus,
            limit_mb = profile.memory_limit_mb,
            "auto-selected resource profile"
        );
        profile
    }

    /// Build from the `[lightweight_mode]` section.
    ///
    /// Starts from the named preset (auto-selected when unset); limits and
    /// timings the section sets replace the preset's, the rest are kept.
    pub fn from_config(config: &LightweightModeConfig) -> Result<Self, UnitError> {
        let mut profile = match config.profile {
            Some(name) => Self::named(name),
            None => Self::auto_select(),
        };
        if let Some(memory) = &config.memory_limit {
            profile.memory_limit_mb = parse_memory_mb(memory)?;
        }
        if let Some(cpu) = &config.cpu_limit {
            profile.cpu_cores = parse_cpu_cores(cpu)?;
        }
        if let Some(secs) = config.test_duration_secs.filter(|s| *s > 0) {
            profile.test_duration = Duration::from_secs(secs);
        }
        if let Some(ms) = config.sample_interval_ms.filter(|m| *m > 0) {
            profile.sample_interval = Duration::from_millis(ms);
        }
        if let Some(batch) = config.batch_size.filter(|b| *b > 0) {
            profile.batch_size = batch;
        }
        Ok(profile)
    }
}

impl Default for ResourceProfile {
    fn default() -> Self {
        Self::standard()
    }
}

/// Total system memory in megabytes.
pub fn detect_total_memory_mb() -> u64 {
    use sysinfo::System;
    let sys = System::new_all();
    sys.total_memory() / (1024 * 1024)
}
