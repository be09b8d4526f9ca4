//! Scenario compatibility analysis.
//!
//! A fixed pairwise matrix of scenario combinations that interact badly when
//! run together, plus a risk score over the whole set.

use chaos_types::{ChaosError, ScenarioKind};
use serde::Serialize;
use std::collections::BTreeSet;

/// Risk added per resource-intensive scenario in the set.
const RESOURCE_RISK: f64 = 0.05;

/// Risk added per scenario beyond [`CROWDED_SET`].
const CROWDING_RISK: f64 = 0.02;

/// Scenario count beyond which a run is considered crowded.
const CROWDED_SET: usize = 8;

struct ConflictRule {
    a: ScenarioKind,
    b: ScenarioKind,
    risk: f64,
    reason: &'static str,
    mitigation: &'static str,
}

const CONFLICTS: &[ConflictRule] = &[
    ConflictRule {
        a: ScenarioKind::MemoryPressure,
        b: ScenarioKind::CompressionBomb,
        risk: 0.9,
        reason: "both allocate large buffers; together they can exhaust memory for the whole process",
        mitigation: "run memory_pressure and compression_bomb in separate runs",
    },
    ConflictRule {
        a: ScenarioKind::NetworkPartition,
        b: ScenarioKind::DependencyFailure,
        risk: 0.6,
        reason: "a partitioned dependency and a failed dependency are indistinguishable to the target",
        mitigation: "test dependency_failure with the network healthy",
    },
    ConflictRule {
        a: ScenarioKind::MemoryPressure,
        b: ScenarioKind::CpuSpike,
        risk: 0.7,
        reason: "combined resource starvation can stall the harness as well as the target",
        mitigation: "stagger resource scenarios or use lightweight mode",
    },
    ConflictRule {
        a: ScenarioKind::DiskFull,
        b: ScenarioKind::FdExhaustion,
        risk: 0.5,
        reason: "both fail file operations; failures cannot be attributed to either",
        mitigation: "run disk_full and fd_exhaustion separately",
    },
    ConflictRule {
        a: ScenarioKind::NetworkPartition,
        b: ScenarioKind::PacketLoss,
        risk: 0.3,
        reason: "packet loss is unobservable while the target is partitioned",
        mitigation: "drop packet_loss from runs that partition the network",
    },
    ConflictRule {
        a: ScenarioKind::NetworkPartition,
        b: ScenarioKind::ConnectionReset,
        risk: 0.3,
        reason: "resets are unobservable while the target is partitioned",
        mitigation: "drop connection_reset from runs that partition the network",
    },
    ConflictRule {
        a: ScenarioKind::ClockSkew,
        b: ScenarioKind::CorruptedTraces,
        risk: 0.4,
        reason: "skewed clocks and corrupted span timestamps mask each other",
        mitigation: "verify timestamp handling with clock_skew alone first",
    },
    ConflictRule {
        a: ScenarioKind::CpuSpike,
        b: ScenarioKind::RaceCondition,
        risk: 0.4,
        reason: "CPU saturation changes task interleaving and makes race results irreproducible",
        mitigation: "run race_condition on an idle scheduler",
    },
];

/// One incompatible pair found in a scenario set.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ScenarioConflict {
    /// First scenario.
    pub first: ScenarioKind,
    /// Second scenario.
    pub second: ScenarioKind,
    /// Risk contribution in `[0, 1]`.
    pub risk: f64,
    /// Why the pair is unsafe.
    pub reason: String,
}

/// Outcome of a compatibility check.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct CompatibilityReport {
    /// True when no conflicting pair is present.
    pub compatible: bool,
    /// Conflicting pairs.
    pub conflicts: Vec<ScenarioConflict>,
    /// Overall risk in `[0, 1]`.
    pub risk_score: f64,
    /// Mitigations, deduplicated.
    pub recommendations: Vec<String>,
}

/// Static compatibility matrix.
pub struct ScenarioCompatibility;

impl ScenarioCompatibility {
    /// True when `a` and `b` appear together in the conflict matrix.
    pub fn conflicts(a: ScenarioKind, b: ScenarioKind) -> bool {
        rule_for(a, b).is_some()
    }

    /// Check a scenario set. Duplicates are ignored.
    pub fn check(scenarios: &[ScenarioKind]) -> CompatibilityReport {
        let unique: Vec<ScenarioKind> = scenarios
            .iter()
            .copied()
            .collect::<BTreeSet<_>>()
            .into_iter()
            .collect();

        let mut conflicts = Vec::new();
        let mut recommendations: Vec<String> = Vec::new();
        let mut push_recommendation = |text: &str| {
            if !recommendations.iter().any(|r| r == text) {
                recommendations.push(text.to_string());
            }
        };

        for (i, &a) in unique.iter().enumerate() {
            for &b in &unique[i + 1..] {
                if let Some(rule) = rule_for(a, b) {
                    conflicts.push(ScenarioConflict {
                        first: rule.a,
                        second: rule.b,
                        risk: rule.risk,
                        reason: rule.reason.to_string(),
                    });
                    push_recommendation(rule.mitigation);
                }
            }
        }

        let resource_heavy = unique.iter().filter(|s| s.is_resource_intensive()).count();
        if resource_heavy >= 2 {
            push_recommendation("run resource-intensive scenarios sequentially");
        }
        if unique.len() > CROWDED_SET {
            push_recommendation("split large scenario sets into several smaller runs");
        }

        let risk_score = (conflicts.iter().map(|c| c.risk).sum::<f64>()
            + resource_heavy as f64 * RESOURCE_RISK
            + unique.len().saturating_sub(CROWDED_SET) as f64 * CROWDING_RISK)
            .clamp(0.0, 1.0);

        if !conflicts.is_empty() {
            tracing::debug!(
                conflicts = conflicts.len(),
                risk_score,
                "incompatible chaos scenarios"
            );
        }

        CompatibilityReport {
            compatible: conflicts.is_empty(),
            conflicts,
            risk_score,
            recommendations,
        }
    }

    /// Check scenarios given by their config names.
    pub fn check_names<S: AsRef<str>>(names: &[S]) -> Result<CompatibilityReport, ChaosError> {
        let kinds = names
            .iter()
            .map(|n| n.as_ref().parse())
            .collect::<Result<Vec<ScenarioKind>, _>>()?;
        Ok(Self::check(&kinds))
    }
}

fn rule_for(a: ScenarioKind, b: ScenarioKind) -> Option<&'static ConflictRule> {
    CONFLICTS
        .iter()
        .find(|r| (r.a == a && r.b == b) || (r.a == b && r.b == a))
}
