//! Per-target and per-cycle outcome records.

use crate::error::SyncError;
use crate::types::{Account, NewAccount, ReconciliationResult};
use std::fmt;

/// Step at which a target's cycle was abandoned before applying anything.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Stage {
    FetchRoster,
    Connect,
    ListAccounts,
    /// The target's task panicked or was cancelled
    Task,
}

impl fmt::Display for Stage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Stage::FetchRoster => "fetch_roster",
            Stage::Connect => "connect",
            Stage::ListAccounts => "list_accounts",
            Stage::Task => "task",
        };
        f.write_str(name)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Phase {
    Removal,
    Creation,
}

impl fmt::Display for Phase {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Phase::Removal => f.write_str("removal"),
            Phase::Creation => f.write_str("creation"),
        }
    }
}

/// The device operation that stopped the applying phase.
#[derive(Debug)]
pub struct ApplyFailure {
    pub phase: Phase,
    /// Account name the operation was for
    pub account: String,
    pub error: SyncError,
}

/// What was planned and applied for one target.
#[derive(Debug, Default)]
pub struct ApplyReport {
    pub roster_count: usize,
    pub account_count: usize,
    pub matched: usize,
    pub planned_removals: Vec<Account>,
    pub planned_creations: Vec<NewAccount>,
    pub removed: usize,
    pub created: usize,
    pub retained: usize,
    pub duplicates: usize,
    pub conflicts: usize,
    pub failure: Option<ApplyFailure>,
    pub dry_run: bool,
}

impl ApplyReport {
    pub fn planned(
        roster_count: usize,
        account_count: usize,
        plan: &ReconciliationResult,
        dry_run: bool,
    ) -> Self {
        Self {
            roster_count,
            account_count,
            matched: plan.matched,
            planned_removals: plan.removals.clone(),
            planned_creations: plan.creations.clone(),
            retained: plan.retained.len(),
            duplicates: plan.duplicates.len(),
            conflicts: plan.conflicts.len(),
            dry_run,
            ..Default::default()
        }
    }

    /// Everything planned was applied (always false for a dry run with pending changes).
    pub fn is_converged(&self) -> bool {
        self.failure.is_none()
            && self.removed == self.planned_removals.len()
            && self.created == self.planned_creations.len()
    }
}

#[derive(Debug)]
pub enum TargetOutcome {
    Skipped { stage: Stage, error: SyncError },
    Completed(ApplyReport),
}

#[derive(Debug)]
pub struct TargetReport {
    pub target: String,
    pub outcome: TargetOutcome,
}

impl TargetReport {
    /// No fetch error and no failed device operation.
    pub fn is_success(&self) -> bool {
        matches!(&self.outcome, TargetOutcome::Completed(report) if report.failure.is_none())
    }

    pub fn applied(&self) -> Option<&ApplyReport> {
        match &self.outcome {
            TargetOutcome::Completed(report) => Some(report),
            TargetOutcome::Skipped { .. } => None,
        }
    }

    pub fn error(&self) -> Option<&SyncError> {
        match &self.outcome {
            TargetOutcome::Skipped { error, .. } => Some(error),
            TargetOutcome::Completed(report) => report.failure.as_ref().map(|f| &f.error),
        }
    }
}

/// Outcome of one pass over every configured target.
#[derive(Debug, Default)]
pub struct CycleReport {
    /// In configuration order
    pub targets: Vec<TargetReport>,
}

impl CycleReport {
    pub fn get(&self, target: &str) -> Option<&TargetReport> {
        self.targets.iter().find(|r| r.target == target)
    }

    pub fn succeeded(&self) -> usize {
        self.targets.iter().filter(|r| r.is_success()).count()
    }

    pub fn failed(&self) -> usize {
        self.targets.len() - self.succeeded()
    }

    pub fn removed(&self) -> usize {
        self.targets
            .iter()
            .filter_map(TargetReport::applied)
            .map(|r| r.removed)
            .sum()
    }

    pub fn created(&self) -> usize {
        self.targets
            .iter()
            .filter_map(TargetReport::applied)
            .map(|r| r.created)
            .sum()
    }
}
