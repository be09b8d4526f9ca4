//! Fault kinds, parameters and injection results.

use serde::Serialize;
use std::time::Duration;
use thiserror::Error;

use crate::time::serialize_duration_ms;

tagged_kind! {
    /// A simulated fault.
    pub enum FaultKind {
        // Network
        /// Added latency before the target sees traffic.
        NetworkDelay => "network_delay",
        /// Request hangs until the fault window closes, then times out.
        NetworkTimeout => "network_timeout",
        /// Target unreachable for the fault window.
        NetworkPartition => "network_partition",
        /// A fraction of simulated packets is dropped.
        PacketLoss => "packet_loss",
        /// Connection reset mid-exchange.
        ConnectionReset => "connection_reset",
        /// Throughput capped.
        BandwidthThrottle => "bandwidth_throttle",
        /// Name resolution fails.
        DnsFailure => "dns_failure",

        // Resource
        /// Transient large allocation.
        MemoryExhaustion => "memory_exhaustion",
        /// Busy loop on a blocking worker.
        CpuSpike => "cpu_spike",
        /// Writes fail with "no space left on device".
        DiskFull => "disk_full",
        /// New descriptors refused.
        FdExhaustion => "fd_exhaustion",

        // Service
        /// Probability-gated "service unavailable".
        ServiceUnavailable => "service_unavailable",
        /// Added service latency.
        ServiceLatency => "service_latency",
        /// A downstream dependency fails.
        DependencyFailure => "dependency_failure",
        /// Requests throttled.
        RateLimited => "rate_limited",

        // Data
        /// Probabilistic corruption error.
        DataCorruption => "data_corruption",
        /// Only part of a write lands.
        PartialWrite => "partial_write",

        // Timing
        /// Clock jumps by a small random offset.
        ClockSkew => "clock_skew",
        /// Small random delays reorder concurrent work.
        RaceCondition => "race_condition",
        /// Lock acquisition stalls for the fault window.
        LockContention => "lock_contention",
    }
}

tagged_kind! {
    /// Grouping of fault kinds.
    pub enum FaultFamily {
        /// Network faults.
        Network => "network",
        /// Resource faults.
        Resource => "resource",
        /// Service faults.
        Service => "service",
        /// Data faults.
        Data => "data",
        /// Timing faults.
        Timing => "timing",
    }
}

impl FaultKind {
    /// Family this fault belongs to.
    pub fn family(&self) -> FaultFamily {
        use FaultKind::*;
        match self {
            NetworkDelay | NetworkTimeout | NetworkPartition | PacketLoss | ConnectionReset
            | BandwidthThrottle | DnsFailure => FaultFamily::Network,
            MemoryExhaustion | CpuSpike | DiskFull | FdExhaustion => FaultFamily::Resource,
            ServiceUnavailable | ServiceLatency | DependencyFailure | RateLimited => {
                FaultFamily::Service
            }
            DataCorruption | PartialWrite => FaultFamily::Data,
            ClockSkew | RaceCondition | LockContention => FaultFamily::Timing,
        }
    }

    /// Faults that consume real memory or CPU while active.
    pub fn is_resource_intensive(&self) -> bool {
        matches!(self, FaultKind::MemoryExhaustion | FaultKind::CpuSpike)
    }
}

/// Tunables for a fault. Unset fields take per-kind defaults.
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct FaultParams {
    /// Probability (0.0-1.0) that a probabilistic fault fires.
    pub probability: Option<f64>,
    /// Added latency.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub latency_ms: Option<u64>,
    /// Allocation size for memory exhaustion.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub memory_mb: Option<usize>,
    /// Number of simulated packets/requests.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub operations: Option<u32>,
    /// Bandwidth cap in kbit/s.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub rate_kbit: Option<u64>,
}

impl FaultParams {
    /// Empty parameter set.
    pub fn new() -> Self {
        Self::default()
    }

    /// Set firing probability.
    pub fn probability(mut self, p: f64) -> Self {
        self.probability = Some(p);
        self
    }

    /// Set added latency.
    pub fn latency(mut self, ms: u64) -> Self {
        self.latency_ms = Some(ms);
        self
    }

    /// Set allocation size.
    pub fn memory_mb(mut self, mb: usize) -> Self {
        self.memory_mb = Some(mb);
        self
    }

    /// Set simulated operation count.
    pub fn operations(mut self, n: u32) -> Self {
        self.operations = Some(n);
        self
    }

    /// Set bandwidth cap.
    pub fn rate(mut self, kbit: u64) -> Self {
        self.rate_kbit = Some(kbit);
        self
    }
}

/// Synthetic failure a fault inflicts on whatever it targets.
///
/// These are expected outcomes, not harness bugs.
#[derive(Debug, Clone, PartialEq, Error, Serialize)]
#[serde(tag = "effect", rename_all = "snake_case")]
pub enum SimulatedFault {
    /// Request timed out.
    #[error("operation timed out after {after_ms}ms")]
    Timeout {
        /// Time waited.
        after_ms: u64,
    },
    /// Target unreachable.
    #[error("network partition: {target} unreachable")]
    Partitioned {
        /// Unreachable target.
        target: String,
    },
    /// Packets dropped.
    #[error("{dropped} of {sent} packets dropped")]
    PacketsDropped {
        /// Dropped count.
        dropped: u32,
        /// Sent count.
        sent: u32,
    },
    /// Connection reset.
    #[error("connection reset by peer")]
    ConnectionReset,
    /// Name resolution failed.
    #[error("dns resolution failed for {host}")]
    DnsFailure {
        /// Host that failed to resolve.
        host: String,
    },
    /// Disk full.
    #[error("no space left on device")]
    DiskFull,
    /// Descriptor limit hit.
    #[error("too many open files")]
    FdLimit,
    /// Service unavailable.
    #[error("service unavailable")]
    ServiceUnavailable,
    /// Dependency failed.
    #[error("dependency {name} failed")]
    DependencyFailed {
        /// Failed dependency.
        name: String,
    },
    /// Rate limited.
    #[error("rate limit exceeded")]
    RateLimited,
    /// Data corrupted.
    #[error("data corruption detected at offset {offset}")]
    DataCorrupted {
        /// Corrupted offset.
        offset: usize,
    },
    /// Partial write.
    #[error("partial write: {written} of {requested} bytes")]
    PartialWrite {
        /// Bytes written.
        written: usize,
        /// Bytes requested.
        requested: usize,
    },
    /// Clock skew observed.
    #[error("clock skewed by {skew_ms}ms")]
    ClockSkew {
        /// Skew applied.
        skew_ms: i64,
    },
    /// Lock not acquired in time.
    #[error("lock acquisition timed out")]
    LockTimeout,
}

/// Record of one fault injection.
#[derive(Debug, Clone, Serialize)]
pub struct FaultInjectionResult {
    /// Fault injected.
    pub kind: FaultKind,
    /// Target identifier.
    pub target: String,
    /// Effective parameters.
    pub params: FaultParams,
    /// Start time (Unix milliseconds).
    pub started_at_ms: u64,
    /// Time the fault was active.
    #[serde(serialize_with = "serialize_duration_ms")]
    pub duration: Duration,
    /// Whether the injection itself completed.
    pub success: bool,
    /// Harness error when the injection could not be carried out.
    pub error: Option<String>,
    /// Synthetic failure the fault inflicted, if any.
    pub effect: Option<SimulatedFault>,
}
