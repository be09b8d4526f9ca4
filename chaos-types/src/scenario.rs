//! Chaos scenarios and the events they record.

use serde::Serialize;
use std::collections::BTreeMap;
use std::time::Duration;

use crate::time::serialize_duration_ms;
use crate::{FaultKind, Value};

tagged_kind! {
    /// A named, schedulable disruption executed during a run.
    pub enum ScenarioKind {
        // Input generation
        /// Malformed individual spans.
        MalformedSpans => "malformed_spans",
        /// A whole corrupted distributed trace.
        CorruptedTraces => "corrupted_traces",
        /// Garbled payloads across every gork family.
        GorkPayloads => "gork_payloads",
        /// Structurally mutated records.
        MutatedRecords => "mutated_records",
        /// Records carrying injection attack strings.
        SecurityPayloads => "security_payloads",
        /// Bidi, zero-width and zalgo text.
        UnicodeHazards => "unicode_hazards",
        /// Broken text encodings.
        EncodingCorruption => "encoding_corruption",
        /// Decompression bombs.
        CompressionBomb => "compression_bomb",

        // Fault injection
        /// Added network latency.
        SlowNetwork => "slow_network",
        /// Target unreachable.
        NetworkPartition => "network_partition",
        /// Dropped packets.
        PacketLoss => "packet_loss",
        /// Reset connections.
        ConnectionReset => "connection_reset",
        /// Memory pressure.
        MemoryPressure => "memory_pressure",
        /// CPU saturation.
        CpuSpike => "cpu_spike",
        /// Disk full.
        DiskFull => "disk_full",
        /// Descriptor exhaustion.
        FdExhaustion => "fd_exhaustion",
        /// Target service unavailable.
        ServiceUnavailable => "service_unavailable",
        /// Downstream dependency failure.
        DependencyFailure => "dependency_failure",
        /// Clock skew.
        ClockSkew => "clock_skew",
        /// Concurrent duplicate submissions.
        RaceCondition => "race_condition",
    }
}

impl ScenarioKind {
    /// Scenarios that hold real memory, CPU, disk or descriptors.
    pub const RESOURCE_INTENSIVE: &'static [ScenarioKind] = &[
        ScenarioKind::MemoryPressure,
        ScenarioKind::CpuSpike,
        ScenarioKind::DiskFull,
        ScenarioKind::FdExhaustion,
    ];

    /// True for resource-intensive scenarios.
    pub fn is_resource_intensive(&self) -> bool {
        Self::RESOURCE_INTENSIVE.contains(self)
    }

    /// The fault this scenario injects, for fault-driven scenarios.
    pub fn fault(&self) -> Option<FaultKind> {
        use ScenarioKind::*;
        match self {
            SlowNetwork => Some(FaultKind::NetworkDelay),
            NetworkPartition => Some(FaultKind::NetworkPartition),
            PacketLoss => Some(FaultKind::PacketLoss),
            ConnectionReset => Some(FaultKind::ConnectionReset),
            MemoryPressure => Some(FaultKind::MemoryExhaustion),
            CpuSpike => Some(FaultKind::CpuSpike),
            DiskFull => Some(FaultKind::DiskFull),
            FdExhaustion => Some(FaultKind::FdExhaustion),
            ServiceUnavailable => Some(FaultKind::ServiceUnavailable),
            DependencyFailure => Some(FaultKind::DependencyFailure),
            ClockSkew => Some(FaultKind::ClockSkew),
            MalformedSpans | CorruptedTraces | GorkPayloads | MutatedRecords
            | SecurityPayloads | UnicodeHazards | EncodingCorruption | CompressionBomb
            | RaceCondition => None,
        }
    }
}

/// One scenario execution.
#[derive(Debug, Clone, Serialize)]
pub struct ChaosEvent {
    /// Scenario executed.
    pub scenario: ScenarioKind,
    /// Start time (Unix milliseconds).
    pub timestamp_ms: u64,
    /// Time the handler ran.
    #[serde(serialize_with = "serialize_duration_ms")]
    pub duration: Duration,
    /// Target identifier.
    pub target: String,
    /// Free-form details recorded by the handler.
    pub parameters: BTreeMap<String, Value>,
    /// Whether the target came through the scenario cleanly.
    pub success: bool,
    /// First error observed.
    pub error: Option<String>,
    /// Cut off by the run deadline rather than failed by the target.
    pub cancelled: bool,
}
