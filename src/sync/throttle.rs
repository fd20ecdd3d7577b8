//! Throttled failure logging across cycles.
//!
//! A target that keeps failing would otherwise write the same error every
//! interval. The first failure of a streak is logged at error level, then
//! only every `every`-th consecutive one; the rest go to debug.

use super::report::{TargetOutcome, TargetReport};
use std::collections::{HashMap, HashSet};
use std::sync::Mutex;
use tracing::{debug, error, info};

#[derive(Debug, Default)]
pub struct FailureLog {
    streaks: Mutex<HashMap<String, u32>>,
}

impl FailureLog {
    pub fn new() -> Self {
        Self::default()
    }

    /// Record a target's outcome, log it, and return the current failure streak.
    pub fn observe(&self, report: &TargetReport, every: u32) -> u32 {
        let mut streaks = self.streaks.lock().unwrap_or_else(|p| p.into_inner());

        if report.is_success() {
            if let Some(previous) = streaks.remove(&report.target) {
                info!(
                    target_name = %report.target,
                    failed_cycles = previous,
                    "Target recovered"
                );
            }
            return 0;
        }

        let streak = streaks.entry(report.target.clone()).or_insert(0);
        *streak += 1;
        let streak = *streak;
        let loud = streak == 1 || (every > 0 && streak % every == 0);
        log_failure(report, streak, loud);
        streak
    }

    /// Drop streaks for targets that are no longer configured.
    pub fn retain_targets(&self, names: &HashSet<String>) {
        let mut streaks = self.streaks.lock().unwrap_or_else(|p| p.into_inner());
        streaks.retain(|name, _| names.contains(name));
    }

    pub fn streak(&self, target: &str) -> u32 {
        let streaks = self.streaks.lock().unwrap_or_else(|p| p.into_inner());
        streaks.get(target).copied().unwrap_or(0)
    }
}

fn log_failure(report: &TargetReport, streak: u32, loud: bool) {
    match &report.outcome {
        TargetOutcome::Skipped { stage, error } => {
            if loud {
                error!(
                    target_name = %report.target,
                    %stage,
                    error = %error,
                    transient = error.is_transient(),
                    consecutive_failures = streak,
                    "Target cycle skipped"
                );
            } else {
                debug!(
                    target_name = %report.target,
                    %stage,
                    error = %error,
                    consecutive_failures = streak,
                    "Target cycle skipped"
                );
            }
        }
        TargetOutcome::Completed(applied) => {
            let Some(failure) = &applied.failure else {
                return;
            };
            if loud {
                error!(
                    target_name = %report.target,
                    phase = %failure.phase,
                    account = %failure.account,
                    error = %failure.error,
                    transient = failure.error.is_transient(),
                    removed = applied.removed,
                    created = applied.created,
                    consecutive_failures = streak,
                    "Device operation failed"
                );
            } else {
                debug!(
                    target_name = %report.target,
                    phase = %failure.phase,
                    account = %failure.account,
                    error = %failure.error,
                    consecutive_failures = streak,
                    "Device operation failed"
                );
            }
        }
    }
}
