//! Background sync loop.
//!
//! Every cycle re-reads the settings, then reconciles each target
//! independently: fetch the roster, list the device accounts, diff, and
//! apply removals before creations. A failure only ends the current cycle of
//! the target it happened on. The loop itself never stops on a remote error.

pub mod report;
pub mod throttle;

use crate::config::{ConfigSource, SyncConfig, Target};
use crate::directory::{AccountDirectory, DirectoryConnector};
use crate::error::{ConfigError, SyncError, TimeoutError};
use crate::reconcile::{AccountFilter, Reconciler};
use crate::roster::RosterFetcher;
use futures::future::join_all;
use std::collections::HashSet;
use std::future::Future;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::{watch, Semaphore};
use tracing::{debug, info, info_span, warn, Instrument};

pub use report::{
    ApplyFailure, ApplyReport, CycleReport, Phase, Stage, TargetOutcome, TargetReport,
};
pub use throttle::FailureLog;

/// Sleep used until a configuration has been loaded successfully.
pub const DEFAULT_INTERVAL: Duration = Duration::from_secs(60);

/// Run a remote call with an upper bound on its duration.
async fn bounded<T, E, F>(limit: Duration, call: F) -> Result<T, E>
where
    E: TimeoutError,
    F: Future<Output = Result<T, E>>,
{
    match tokio::time::timeout(limit, call).await {
        Ok(result) => result,
        Err(_) => Err(E::timed_out(limit.as_secs())),
    }
}

/// Drives reconciliation cycles for every configured target.
#[derive(Clone)]
pub struct SyncLoop {
    config_source: Arc<dyn ConfigSource>,
    roster: Arc<dyn RosterFetcher>,
    directories: Arc<dyn DirectoryConnector>,
    failures: Arc<FailureLog>,
    dry_run: bool,
}

impl SyncLoop {
    pub fn new(
        config_source: Arc<dyn ConfigSource>,
        roster: Arc<dyn RosterFetcher>,
        directories: Arc<dyn DirectoryConnector>,
    ) -> Self {
        Self {
            config_source,
            roster,
            directories,
            failures: Arc::new(FailureLog::new()),
            dry_run: false,
        }
    }

    /// Plan and log changes without touching any device.
    pub fn with_dry_run(mut self, dry_run: bool) -> Self {
        self.dry_run = dry_run;
        self
    }

    pub fn failures(&self) -> &FailureLog {
        &self.failures
    }

    /// Run cycles until `shutdown` turns true or its sender is dropped.
    ///
    /// Shutdown is only observed between cycles, so an in-flight cycle always
    /// finishes its device calls and closes its sessions.
    pub async fn run(&self, mut shutdown: watch::Receiver<bool>) {
        info!(
            source = %self.config_source.describe(),
            dry_run = self.dry_run,
            "Starting hotspot sync"
        );

        let mut interval = DEFAULT_INTERVAL;
        let mut cycle: u64 = 0;

        loop {
            if *shutdown.borrow() {
                break;
            }

            cycle += 1;
            match self.run_once().instrument(info_span!("cycle", cycle)).await {
                Ok((config, report)) => {
                    interval = config.interval();
                    info!(
                        cycle,
                        targets = report.targets.len(),
                        succeeded = report.succeeded(),
                        failed = report.failed(),
                        removed = report.removed(),
                        created = report.created(),
                        "Sync cycle finished"
                    );
                }
                Err(e) => {
                    warn!(cycle, error = %e, "Could not load settings, skipping this cycle");
                }
            }

            debug!(next_in_secs = interval.as_secs(), "Sleeping until next cycle");
            let sleep = tokio::time::sleep(interval);
            tokio::pin!(sleep);
            loop {
                tokio::select! {
                    _ = &mut sleep => break,
                    changed = shutdown.changed() => {
                        if changed.is_err() || *shutdown.borrow() {
                            info!("Shutting down hotspot sync");
                            return;
                        }
                    }
                }
            }
        }

        info!("Shutting down hotspot sync");
    }

    /// Load the current settings and run one cycle with them.
    pub async fn run_once(&self) -> Result<(SyncConfig, CycleReport), ConfigError> {
        let config = self.config_source.load()?;
        info!(
            targets = config.targets.len(),
            interval_minutes = config.interval_minutes,
            "Sync started"
        );
        let report = self.run_cycle(&config).await;
        Ok((config, report))
    }

    /// Reconcile every target once. Reports come back in configuration order.
    pub async fn run_cycle(&self, config: &SyncConfig) -> CycleReport {
        let config = Arc::new(config.clone());
        let semaphore = Arc::new(Semaphore::new(config.max_concurrent_targets.max(1)));

        let mut names = Vec::with_capacity(config.targets.len());
        let mut tasks = Vec::with_capacity(config.targets.len());
        for target in config.targets.iter().cloned() {
            names.push(target.display_name());
            let this = self.clone();
            let config = config.clone();
            let semaphore = semaphore.clone();

            tasks.push(tokio::spawn(async move {
                // The semaphore is never closed
                let _permit = semaphore.acquire_owned().await.ok();
                this.sync_target(&target, &config).await
            }));
        }

        let mut reports = Vec::with_capacity(tasks.len());
        for (name, joined) in names.into_iter().zip(join_all(tasks).await) {
            let report = match joined {
                Ok(report) => report,
                Err(e) => TargetReport {
                    target: name,
                    outcome: TargetOutcome::Skipped {
                        stage: Stage::Task,
                        error: SyncError::Aborted(e.to_string()),
                    },
                },
            };
            self.failures.observe(&report, config.failure_log_every);
            reports.push(report);
        }

        let configured: HashSet<String> = config.targets.iter().map(Target::display_name).collect();
        self.failures.retain_targets(&configured);

        CycleReport { targets: reports }
    }

    /// One fetch, diff and apply pass for a single target.
    pub async fn sync_target(&self, target: &Target, config: &SyncConfig) -> TargetReport {
        let name = target.display_name();
        let span = info_span!("target", target_name = %name);
        let outcome = self.reconcile_target(target, config).instrument(span).await;
        TargetReport {
            target: name,
            outcome,
        }
    }

    async fn reconcile_target(&self, target: &Target, config: &SyncConfig) -> TargetOutcome {
        let limit = config.request_timeout();

        let occupants = match bounded(limit, self.roster.fetch_roster(target)).await {
            Ok(occupants) => occupants,
            Err(e) => {
                return TargetOutcome::Skipped {
                    stage: Stage::FetchRoster,
                    error: e.into(),
                }
            }
        };
        info!(count = occupants.len(), "Roster fetched");

        let filter = AccountFilter::new(
            config.reserved_account.clone(),
            target.account_profile.clone(),
        );
        let mut session = match bounded(limit, self.directories.connect(target, &filter)).await {
            Ok(session) => session,
            Err(e) => {
                return TargetOutcome::Skipped {
                    stage: Stage::Connect,
                    error: e.into(),
                }
            }
        };

        let accounts = match bounded(limit, session.list_accounts()).await {
            Ok(accounts) => accounts,
            Err(e) => {
                return TargetOutcome::Skipped {
                    stage: Stage::ListAccounts,
                    error: e.into(),
                }
            }
        };
        info!(count = accounts.len(), "Device accounts listed");

        let reconciler = Reconciler::new(
            filter,
            config.protected_accounts_for(target),
            config.transliterate_labels,
        );
        let plan = reconciler.reconcile(&occupants, &accounts);

        for duplicate in &plan.duplicates {
            warn!(
                occupant = %duplicate.id,
                name = %duplicate.name,
                "Roster repeats an identifier; only its first entry is used"
            );
        }
        for conflict in &plan.conflicts {
            warn!(
                occupant = %conflict.id,
                name = %conflict.name,
                "Roster identifier is the reserved account name; not created"
            );
        }
        for kept in &plan.retained {
            debug!(account = %kept.name, "Protected account kept");
        }
        info!(count = plan.removals.len(), "Accounts to remove");
        for account in &plan.removals {
            info!(account = %account.name, label = %account.label(), "Marked for removal");
        }
        info!(count = plan.creations.len(), "Accounts to create");
        for account in &plan.creations {
            info!(account = %account.name, label = %account.comment, "Marked for creation");
        }

        let mut report = ApplyReport::planned(occupants.len(), accounts.len(), &plan, self.dry_run);
        if self.dry_run {
            info!("Dry run, no changes applied");
        } else {
            self.apply(session.as_mut(), limit, &mut report).await;
        }

        if let Err(e) = bounded(limit, session.close()).await {
            debug!(error = %e, "Closing device session failed");
        }

        TargetOutcome::Completed(report)
    }

    /// Removals first; a failed removal means no creations this cycle.
    async fn apply(
        &self,
        session: &mut dyn AccountDirectory,
        limit: Duration,
        report: &mut ApplyReport,
    ) {
        let removals = report.planned_removals.clone();
        for account in &removals {
            match bounded(limit, session.remove_account(&account.id)).await {
                Ok(()) => {
                    report.removed += 1;
                    debug!(account = %account.name, id = %account.id, "Removed account");
                }
                Err(e) => {
                    report.failure = Some(ApplyFailure {
                        phase: Phase::Removal,
                        account: account.name.clone(),
                        error: e.into(),
                    });
                    return;
                }
            }
        }

        let creations = report.planned_creations.clone();
        for account in &creations {
            match bounded(limit, session.create_account(account)).await {
                Ok(()) => {
                    report.created += 1;
                    debug!(account = %account.name, "Created account");
                }
                Err(e) => {
                    report.failure = Some(ApplyFailure {
                        phase: Phase::Creation,
                        account: account.name.clone(),
                        error: e.into(),
                    });
                    return;
                }
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::StaticConfigSource;
    use crate::error::{DirectoryError, FetchError};
    use crate::config::FileConfigSource;
    use crate::test_utils::{Call, Journal, MemoryConnector, MemoryRoster};
    use crate::types::{Account, Occupant};
    use async_trait::async_trait;
    use chrono::DateTime;

    const PROFILE: &str = "uprof_customer";

    fn occupant(id: &str, name: &str) -> Occupant {
        Occupant {
            id: id.to_string(),
            name: name.to_string(),
            birth_year: 1990,
            check_in: DateTime::parse_from_rfc3339("2024-01-01T00:00:00Z").unwrap(),
            check_out: DateTime::parse_from_rfc3339("2024-01-05T00:00:00Z").unwrap(),
            id_card: None,
        }
    }

    fn account(id: &str, name: &str) -> Account {
        Account::new(id, name).with_profile(PROFILE)
    }

    fn target(name: &str) -> Target {
        Target {
            name: Some(name.to_string()),
            roster_address: "pms.local".to_string(),
            roster_profile: name.to_string(),
            device_address: "10.0.0.1".to_string(),
            device_username: "api".to_string(),
            device_password: "secret".to_string(),
            account_profile: Some(PROFILE.to_string()),
            protected_accounts: Vec::new(),
        }
    }

    fn config(targets: &[&str]) -> SyncConfig {
        SyncConfig {
            request_timeout_secs: 1,
            targets: targets.iter().map(|name| target(name)).collect(),
            ..Default::default()
        }
    }

    struct Harness {
        journal: Journal,
        roster: MemoryRoster,
        devices: MemoryConnector,
    }

    impl Harness {
        fn new() -> Self {
            let journal = Journal::new();
            Self {
                roster: MemoryRoster::new(journal.clone()),
                devices: MemoryConnector::new(journal.clone()),
                journal,
            }
        }

        fn sync_loop(&self, config: SyncConfig) -> SyncLoop {
            SyncLoop::new(
                Arc::new(StaticConfigSource::new(config)),
                Arc::new(self.roster.clone()),
                Arc::new(self.devices.clone()),
            )
        }
    }

    #[tokio::test]
    async fn test_sync_target_applies_plan() {
        let harness = Harness::new();
        harness
            .roster
            .set_occupants("lobby", vec![occupant("G1", "Alice"), occupant("G2", "Bob")]);
        harness
            .devices
            .set_accounts("lobby", vec![account("*1", "G1"), account("*2", "G9")]);

        let config = config(&["lobby"]);
        let report = harness
            .sync_loop(config.clone())
            .sync_target(&config.targets[0], &config)
            .await;

        assert!(report.is_success());
        let applied = report.applied().unwrap();
        assert_eq!(applied.roster_count, 2);
        assert_eq!(applied.account_count, 2);
        assert_eq!(applied.removed, 1);
        assert_eq!(applied.created, 1);
        assert!(applied.is_converged());

        let names: Vec<_> = harness
            .devices
            .accounts("lobby")
            .into_iter()
            .map(|a| a.name)
            .collect();
        assert_eq!(names, vec!["G1", "G2"]);
    }

    #[tokio::test]
    async fn test_removals_before_creations() {
        let harness = Harness::new();
        harness.roster.set_occupants(
            "lobby",
            vec![occupant("G1", "Alice"), occupant("G2", "Bob")],
        );
        harness.devices.set_accounts(
            "lobby",
            vec![account("*1", "G7"), account("*2", "G8"), account("*3", "G9")],
        );

        let config = config(&["lobby"]);
        harness.sync_loop(config.clone()).run_cycle(&config).await;

        let calls = harness.journal.calls_for("lobby");
        let last_remove = calls
            .iter()
            .rposition(|c| matches!(c, Call::Remove { .. }))
            .unwrap();
        let first_create = calls
            .iter()
            .position(|c| matches!(c, Call::Create { .. }))
            .unwrap();
        assert!(last_remove < first_create);
        assert_eq!(
            calls.iter().filter(|c| matches!(c, Call::Remove { .. })).count(),
            3
        );
    }

    #[tokio::test]
    async fn test_removal_failure_skips_creations() {
        let harness = Harness::new();
        harness.roster.set_occupants("lobby", vec![occupant("G1", "Alice")]);
        harness
            .devices
            .set_accounts("lobby", vec![account("*1", "G7"), account("*2", "G8")]);
        harness.devices.update("lobby", |device| {
            device.fail_remove.insert("*1".to_string());
        });

        let config = config(&["lobby"]);
        let report = harness
            .sync_loop(config.clone())
            .sync_target(&config.targets[0], &config)
            .await;

        let applied = report.applied().unwrap();
        let failure = applied.failure.as_ref().unwrap();
        assert_eq!(failure.phase, Phase::Removal);
        assert_eq!(failure.account, "G7");
        assert_eq!(applied.removed, 0);
        assert_eq!(applied.created, 0);
        assert!(!report.is_success());

        let calls = harness.journal.calls_for("lobby");
        assert!(!calls.iter().any(|c| matches!(c, Call::Create { .. })));
        assert_eq!(
            calls.iter().filter(|c| matches!(c, Call::Remove { .. })).count(),
            1
        );
    }

    #[tokio::test]
    async fn test_creation_failure_ends_target_cycle() {
        let harness = Harness::new();
        harness.roster.set_occupants(
            "lobby",
            vec![
                occupant("G1", "Alice"),
                occupant("G2", "Bob"),
                occupant("G3", "Carol"),
            ],
        );
        harness.devices.update("lobby", |device| {
            device.fail_create.insert("G2".to_string());
        });

        let config = config(&["lobby"]);
        let report = harness
            .sync_loop(config.clone())
            .sync_target(&config.targets[0], &config)
            .await;

        let applied = report.applied().unwrap();
        assert_eq!(applied.created, 1);
        let failure = applied.failure.as_ref().unwrap();
        assert_eq!(failure.phase, Phase::Creation);
        assert_eq!(failure.account, "G2");

        let created: Vec<_> = harness
            .journal
            .calls_for("lobby")
            .into_iter()
            .filter_map(|c| match c {
                Call::Create { name, .. } => Some(name),
                _ => None,
            })
            .collect();
        assert_eq!(created, vec!["G1", "G2"]);
    }

    #[tokio::test]
    async fn test_roster_failure_makes_no_directory_calls() {
        let harness = Harness::new();
        harness.roster.set_unavailable("lobby", "maintenance");
        harness.devices.set_accounts("lobby", vec![account("*1", "G1")]);

        let config = config(&["lobby"]);
        let report = harness
            .sync_loop(config.clone())
            .sync_target(&config.targets[0], &config)
            .await;

        match &report.outcome {
            TargetOutcome::Skipped { stage, error } => {
                assert_eq!(*stage, Stage::FetchRoster);
                assert!(matches!(error, SyncError::Fetch(FetchError::Status { .. })));
            }
            other => panic!("unexpected outcome: {:?}", other),
        }
        assert!(harness
            .journal
            .calls_for("lobby")
            .iter()
            .all(|c| !c.is_directory_call()));
    }

    #[tokio::test]
    async fn test_connect_and_list_failures_skip_target() {
        let harness = Harness::new();
        harness.roster.set_occupants("a", vec![occupant("G1", "Alice")]);
        harness.roster.set_occupants("b", vec![occupant("G1", "Alice")]);
        harness.devices.update("a", |device| device.refuse_connections = true);
        harness.devices.update("b", |device| device.fail_list = true);

        let config = config(&["a", "b"]);
        let report = harness.sync_loop(config.clone()).run_cycle(&config).await;

        match &report.get("a").unwrap().outcome {
            TargetOutcome::Skipped { stage, error } => {
                assert_eq!(*stage, Stage::Connect);
                assert!(matches!(
                    error,
                    SyncError::Directory(DirectoryError::Connect { .. })
                ));
            }
            other => panic!("unexpected outcome: {:?}", other),
        }
        match &report.get("b").unwrap().outcome {
            TargetOutcome::Skipped { stage, .. } => assert_eq!(*stage, Stage::ListAccounts),
            other => panic!("unexpected outcome: {:?}", other),
        }
        assert!(!harness
            .journal
            .calls()
            .iter()
            .any(|c| matches!(c, Call::Create { .. } | Call::Remove { .. })));
    }

    #[tokio::test]
    async fn test_roster_timeout_is_bounded() {
        let journal = Journal::new();
        let roster = MemoryRoster::new(journal.clone()).with_delay(Duration::from_secs(5));
        let devices = MemoryConnector::new(journal.clone());
        let config = config(&["lobby"]);
        let sync = SyncLoop::new(
            Arc::new(StaticConfigSource::new(config.clone())),
            Arc::new(roster),
            Arc::new(devices),
        );

        let started = std::time::Instant::now();
        let report = sync.sync_target(&config.targets[0], &config).await;

        assert!(started.elapsed() < Duration::from_secs(4));
        assert!(matches!(
            report.error(),
            Some(SyncError::Fetch(FetchError::Timeout { secs: 1 }))
        ));
    }

    #[tokio::test]
    async fn test_dry_run_issues_no_changes() {
        let harness = Harness::new();
        harness.roster.set_occupants("lobby", vec![occupant("G1", "Alice")]);
        harness.devices.set_accounts("lobby", vec![account("*2", "G9")]);

        let config = config(&["lobby"]);
        let report = harness
            .sync_loop(config.clone())
            .with_dry_run(true)
            .sync_target(&config.targets[0], &config)
            .await;

        let applied = report.applied().unwrap();
        assert!(applied.dry_run);
        assert_eq!(applied.planned_removals.len(), 1);
        assert_eq!(applied.planned_creations.len(), 1);
        assert_eq!(applied.removed + applied.created, 0);
        assert!(!harness
            .journal
            .calls()
            .iter()
            .any(|c| matches!(c, Call::Create { .. } | Call::Remove { .. })));
    }

    #[tokio::test]
    async fn test_second_cycle_is_idle() {
        let harness = Harness::new();
        harness.roster.set_occupants(
            "lobby",
            vec![occupant("G1", "Alice"), occupant("G2", "Bob")],
        );
        harness.devices.set_accounts(
            "lobby",
            vec![account("*1", "G2"), account("*2", "G3"), account("dev0", "default-trial")],
        );

        let config = config(&["lobby"]);
        let sync = harness.sync_loop(config.clone());
        sync.run_cycle(&config).await;
        harness.journal.clear();

        let report = sync.run_cycle(&config).await;
        let applied = report.get("lobby").unwrap().applied().unwrap();
        assert!(applied.planned_removals.is_empty());
        assert!(applied.planned_creations.is_empty());
        assert_eq!(applied.matched, 2);
        assert!(!harness
            .journal
            .calls()
            .iter()
            .any(|c| matches!(c, Call::Create { .. } | Call::Remove { .. })));
        assert!(harness
            .devices
            .accounts("lobby")
            .iter()
            .any(|a| a.name == "default-trial"));
    }

    #[tokio::test]
    async fn test_failure_streak_tracked_across_cycles() {
        let harness = Harness::new();
        harness.roster.set_unavailable("lobby", "down");

        let config = config(&["lobby"]);
        let sync = harness.sync_loop(config.clone());
        sync.run_cycle(&config).await;
        sync.run_cycle(&config).await;
        assert_eq!(sync.failures().streak("lobby"), 2);

        harness.roster.set_occupants("lobby", Vec::new());
        sync.run_cycle(&config).await;
        assert_eq!(sync.failures().streak("lobby"), 0);
    }

    #[tokio::test]
    async fn test_run_stops_on_shutdown() {
        let harness = Harness::new();
        harness.roster.set_occupants("lobby", vec![occupant("G1", "Alice")]);

        let sync = harness.sync_loop(config(&["lobby"]));
        let (tx, rx) = watch::channel(false);
        let handle = tokio::spawn(async move { sync.run(rx).await });

        // Wait for the first cycle to apply, then stop during the sleep
        for _ in 0..100 {
            if !harness.devices.accounts("lobby").is_empty() {
                break;
            }
            tokio::time::sleep(Duration::from_millis(10)).await;
        }
        tx.send(true).unwrap();

        tokio::time::timeout(Duration::from_secs(5), handle)
            .await
            .expect("loop should stop")
            .unwrap();
        assert_eq!(harness.devices.accounts("lobby").len(), 1);
    }

    #[tokio::test]
    async fn test_invalid_settings_skip_cycle_without_stopping() {
        let harness = Harness::new();
        let broken = SyncConfig {
            interval_minutes: 0,
            ..config(&["lobby"])
        };

        let sync = harness.sync_loop(broken);
        assert!(matches!(sync.run_once().await, Err(ConfigError::Invalid(_))));

        let (tx, rx) = watch::channel(false);
        let handle = tokio::spawn(async move { sync.run(rx).await });
        tokio::time::sleep(Duration::from_millis(50)).await;
        assert!(!handle.is_finished());

        drop(tx);
        tokio::time::timeout(Duration::from_secs(5), handle)
            .await
            .expect("loop should stop")
            .unwrap();
        assert!(harness.journal.calls().is_empty());
    }

    /// Roster that panics for one target and delegates otherwise.
    struct PanickingRoster {
        panic_for: String,
        inner: MemoryRoster,
    }

    #[async_trait]
    impl RosterFetcher for PanickingRoster {
        async fn fetch_roster(&self, target: &Target) -> Result<Vec<Occupant>, FetchError> {
            if target.display_name() == self.panic_for {
                panic!("roster decoder crashed");
            }
            self.inner.fetch_roster(target).await
        }
    }

    #[tokio::test]
    async fn test_panicking_target_is_contained() {
        let harness = Harness::new();
        harness.roster.set_occupants("b", vec![occupant("G1", "Alice")]);

        let config = config(&["a", "b"]);
        let sync = SyncLoop::new(
            Arc::new(StaticConfigSource::new(config.clone())),
            Arc::new(PanickingRoster {
                panic_for: "a".to_string(),
                inner: harness.roster.clone(),
            }),
            Arc::new(harness.devices.clone()),
        );

        let report = sync.run_cycle(&config).await;

        assert_eq!(report.targets.len(), 2);
        match &report.targets[0].outcome {
            TargetOutcome::Skipped { stage, error } => {
                assert_eq!(report.targets[0].target, "a");
                assert_eq!(*stage, Stage::Task);
                assert!(matches!(error, SyncError::Aborted(_)));
            }
            other => panic!("unexpected outcome: {:?}", other),
        }

        let b = report.get("b").unwrap();
        assert!(b.is_success());
        assert_eq!(b.applied().unwrap().created, 1);
        assert_eq!(harness.devices.accounts("b").len(), 1);
        assert_eq!(sync.failures().streak("a"), 1);
    }

    fn settings_with_interval(minutes: u64) -> String {
        format!(
            r#"interval_minutes = {}

[[targets]]
name = "lobby"
roster_address = "pms.local"
roster_profile = "lobby"
device_address = "10.0.0.1"
device_username = "api"
"#,
            minutes
        )
    }

    /// Yield to the runtime until `done` holds, without advancing the clock.
    async fn settle(done: impl Fn() -> bool) -> bool {
        for _ in 0..1000 {
            if done() {
                return true;
            }
            tokio::task::yield_now().await;
        }
        done()
    }

    #[tokio::test(start_paused = true)]
    async fn test_interval_change_applies_to_next_sleep() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("hotspot-sync.toml");
        std::fs::write(&path, settings_with_interval(2)).unwrap();

        let harness = Harness::new();
        let sync = SyncLoop::new(
            Arc::new(FileConfigSource::new(&path)),
            Arc::new(harness.roster.clone()),
            Arc::new(harness.devices.clone()),
        );
        let journal = harness.journal.clone();
        let cycles = move || {
            journal
                .calls()
                .iter()
                .filter(|c| matches!(c, Call::FetchRoster { .. }))
                .count()
        };

        let (tx, rx) = watch::channel(false);
        let handle = tokio::spawn(async move { sync.run(rx).await });

        assert!(settle(|| cycles() == 1).await);

        // Picked up by the second cycle, which then sleeps five minutes
        std::fs::write(&path, settings_with_interval(5)).unwrap();

        tokio::time::advance(Duration::from_secs(119)).await;
        assert!(!settle(|| cycles() > 1).await);
        tokio::time::advance(Duration::from_secs(2)).await;
        assert!(settle(|| cycles() == 2).await);

        tokio::time::advance(Duration::from_secs(298)).await;
        assert!(!settle(|| cycles() > 2).await);
        tokio::time::advance(Duration::from_secs(3)).await;
        assert!(settle(|| cycles() == 3).await);

        tx.send(true).unwrap();
        handle.await.unwrap();
    }
}
