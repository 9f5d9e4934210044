//! # Violation Statistics
//!
//! Aggregate counters exposed to anti-cheat and telemetry collaborators.

use lurk_shared::ParticipantId;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;

/// Snapshot of the restrictor's violation counters.
#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
pub struct ViolationStats {
    /// Movement requests validated.
    pub checks: u64,
    /// Requests rejected for overspeed.
    pub violations: u64,
    /// Requests whose position was altered (overspeed or direction cap).
    pub corrected_moves: u64,
    /// Highest implied/allowed speed ratio seen.
    pub worst_overspeed_ratio: f32,
    /// Participants with at least one violation, most violations first.
    pub offenders: Vec<(ParticipantId, u32)>,
}

impl ViolationStats {
    /// Fraction of checks that were violations.
    #[must_use]
    pub fn violation_rate(&self) -> f32 {
        if self.checks == 0 {
            0.0
        } else {
            self.violations as f32 / self.checks as f32
        }
    }
}

/// Running counters owned by the restrictor.
#[derive(Debug, Default)]
pub(crate) struct StatsAccumulator {
    checks: u64,
    violations: u64,
    corrected_moves: u64,
    worst_overspeed_ratio: f32,
}

impl StatsAccumulator {
    pub(crate) fn record_check(&mut self, corrected: bool) {
        self.checks += 1;
        if corrected {
            self.corrected_moves += 1;
        }
    }

    pub(crate) fn record_violation(&mut self, overspeed_ratio: f32) {
        self.violations += 1;
        if overspeed_ratio.is_finite() {
            self.worst_overspeed_ratio = self.worst_overspeed_ratio.max(overspeed_ratio);
        }
    }

    pub(crate) fn reset(&mut self) {
        *self = Self::default();
    }

    pub(crate) fn snapshot(&self, per_participant: &HashMap<ParticipantId, u32>) -> ViolationStats {
        let mut offenders: Vec<(ParticipantId, u32)> = per_participant
            .iter()
            .filter(|(_, count)| **count > 0)
            .map(|(id, count)| (*id, *count))
            .collect();
        offenders.sort_by(|a, b| b.1.cmp(&a.1).then(a.0.cmp(&b.0)));

        ViolationStats {
            checks: self.checks,
            violations: self.violations,
            corrected_moves: self.corrected_moves,
            worst_overspeed_ratio: self.worst_overspeed_ratio,
            offenders,
        }
    }
}
