use indicatif::{ProgressBar, ProgressStyle};
use serde::{Deserialize, Serialize};
use std::path::Path;
use std::sync::{Mutex, OnceLock, PoisonError};
use std::time::{Duration, Instant};

use chrono::{DateTime, Utc};
use tracing::{debug, info, warn};

use super::{CleanResult, Cleaner, CleanerOptions, Resource, ScanItem, SizeEstimate};
use crate::cleaners;
use crate::common::config::{Config, SafetyLevel};
use crate::common::errors::{ErrorCode, Result, SweepError};
use crate::common::exec::Context;
use crate::common::safety::check_risk;
use crate::profiles::loader::{CleanupOperation, OperationType, RiskLevel};

/// Whether a run only lists candidates or also removes them
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum RunMode {
    Scan,
    Clean,
}

impl std::fmt::Display for RunMode {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            RunMode::Scan => write!(f, "scan"),
            RunMode::Clean => write!(f, "clean"),
        }
    }
}

/// What happened to one operation of a profile
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "status", rename_all = "snake_case")]
pub enum Outcome {
    Scanned { items: Vec<ScanItem>, size: SizeEstimate },
    Cleaned { result: CleanResult },
    Skipped { reason: String },
    Failed { code: String, message: String },
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct OperationReport {
    pub operation: String,
    pub risk_level: RiskLevel,
    pub outcome: Outcome,
}

/// Aggregate of one profile run
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RunReport {
    pub profile: String,
    pub mode: RunMode,
    pub dry_run: bool,
    pub operations: Vec<OperationReport>,
    pub total: SizeEstimate,
    pub items_removed: u64,
    pub items_failed: u64,
    pub started_at: DateTime<Utc>,
    pub elapsed: Duration,
}

impl RunReport {
    pub fn skipped(&self) -> usize {
        self.operations
            .iter()
            .filter(|op| matches!(op.outcome, Outcome::Skipped { .. }))
            .count()
    }

    pub fn failed(&self) -> usize {
        self.operations
            .iter()
            .filter(|op| matches!(op.outcome, Outcome::Failed { .. }))
            .count()
    }
}

// ─── Resource locking ─────────────────────────────────────────────────────────

fn held_resources() -> &'static Mutex<Vec<Resource>> {
    static HELD: OnceLock<Mutex<Vec<Resource>>> = OnceLock::new();
    HELD.get_or_init(|| Mutex::new(Vec::new()))
}

/// Process-wide claim on a set of resources, released on drop.
#[derive(Debug)]
pub struct ResourceLock {
    resources: Vec<Resource>,
}

impl ResourceLock {
    /// Claim every resource or none. Fails with `InvalidOperation` when any
    /// requested resource overlaps one already held.
    pub fn acquire(resources: Vec<Resource>) -> Result<Self> {
        let mut held = held_resources()
            .lock()
            .unwrap_or_else(PoisonError::into_inner);
        for wanted in &resources {
            if let Some(busy) = held.iter().find(|h| h.overlaps(wanted)) {
                return Err(SweepError::new(
                    ErrorCode::InvalidOperation,
                    format!("another cleanup is already running against {}", busy),
                )
                .with_details("resource", busy.to_string()));
            }
        }
        held.extend(resources.iter().cloned());
        Ok(Self { resources })
    }
}

impl Drop for ResourceLock {
    fn drop(&mut self) {
        let mut held = held_resources()
            .lock()
            .unwrap_or_else(PoisonError::into_inner);
        for r in &self.resources {
            if let Some(pos) = held.iter().position(|h| h == r) {
                held.remove(pos);
            }
        }
    }
}

// ─── Engine ───────────────────────────────────────────────────────────────────

/// Runs the operations of a profile against freshly built cleaners.
#[derive(Debug)]
pub struct Engine<'a> {
    config: &'a Config,
    options: CleanerOptions,
    show_progress: bool,
}

impl<'a> Engine<'a> {
    /// Config-level protected paths are added to the options' guard.
    pub fn new(config: &'a Config, mut options: CleanerOptions) -> Self {
        for path in config.all_protected() {
            options.guard.protect(path);
        }
        Self {
            config,
            options,
            show_progress: false,
        }
    }

    pub fn with_progress(mut self, show: bool) -> Self {
        self.show_progress = show;
        self
    }

    pub fn options(&self) -> &CleanerOptions {
        &self.options
    }

    /// Run `profile` (or the current profile) in `mode`.
    ///
    /// Nothing executes unless the whole profile passes the risk gate and
    /// every operation's cleaner can be built from its settings.
    pub fn run(&self, ctx: &Context, profile: Option<&str>, mode: RunMode) -> Result<RunReport> {
        let name = profile.unwrap_or(&self.config.current_profile);
        if name.is_empty() {
            return Err(SweepError::new(
                ErrorCode::MissingProfile,
                "no profile given and no current profile selected",
            ));
        }
        let profile = self.config.profile(name)?;
        if !profile.is_enabled() {
            return Err(SweepError::new(
                ErrorCode::InvalidOperation,
                format!("profile '{}' is disabled", name),
            )
            .with_details("profile", name));
        }

        let operations: Vec<&CleanupOperation> = profile.enabled_operations().collect();
        self.risk_gate(&operations)?;

        let mut planned = Vec::with_capacity(operations.len());
        for op in &operations {
            let op_type: OperationType = op.op_type()?;
            let cleaner = cleaners::build(op_type, &self.options, op.settings.as_ref())?;
            planned.push((*op, cleaner));
        }

        let resources: Vec<Resource> = planned
            .iter()
            .flat_map(|(_, cleaner)| cleaner.resources())
            .collect();
        let _lock = ResourceLock::acquire(resources)?;

        info!(profile = name, mode = %mode, dry_run = self.options.dry_run, "starting run");
        let started = Instant::now();
        let mut report = RunReport {
            profile: name.to_string(),
            mode,
            dry_run: self.options.dry_run,
            operations: Vec::with_capacity(planned.len()),
            total: SizeEstimate::known(0),
            items_removed: 0,
            items_failed: 0,
            started_at: Utc::now(),
            elapsed: Duration::ZERO,
        };

        let spinner = self.spinner(planned.len());
        for (op, cleaner) in &planned {
            ctx.check()?;
            spinner.set_message(&op.name);
            let outcome = self.run_one(ctx, cleaner.as_ref(), mode)?;
            match &outcome {
                Outcome::Scanned { size, .. } => report.total += *size,
                Outcome::Cleaned { result } => {
                    report.total += result.size_estimate;
                    report.items_removed += result.items_removed;
                    report.items_failed += result.items_failed;
                }
                Outcome::Skipped { .. } | Outcome::Failed { .. } => {}
            }
            report.operations.push(OperationReport {
                operation: op.name.clone(),
                risk_level: op.risk_level,
                outcome,
            });
            spinner.inc();
        }
        drop(spinner);

        report.elapsed = started.elapsed();
        info!(
            profile = name,
            removed = report.items_removed,
            failed = report.items_failed,
            "run finished"
        );
        Ok(report)
    }

    fn risk_gate(&self, operations: &[&CleanupOperation]) -> Result<()> {
        if self.config.safety_level == SafetyLevel::Disabled {
            warn!("safety checks are disabled");
        }
        for op in operations {
            check_risk(self.config.safety_level, &op.name, op.risk_level)?;
        }
        Ok(())
    }

    /// Per-operation errors become `Failed`; only cancellation and deadline
    /// expiry abort the run.
    fn run_one(&self, ctx: &Context, cleaner: &dyn Cleaner, mode: RunMode) -> Result<Outcome> {
        if !cleaner.is_available(ctx) {
            debug!(cleaner = cleaner.name(), "not available, skipping");
            return Ok(Outcome::Skipped {
                reason: format!("{} is not available on this system", cleaner.name()),
            });
        }

        let attempt = match mode {
            RunMode::Scan => cleaner.scan(ctx).map(|items| {
                let items = self.unprotected(items);
                let size = cleaner.scan_estimate(&items);
                Outcome::Scanned { items, size }
            }),
            RunMode::Clean => cleaner.clean(ctx).map(|result| Outcome::Cleaned { result }),
        };

        match attempt {
            Ok(outcome) => Ok(outcome),
            Err(e) if e.is(ErrorCode::Cancelled) => Err(e),
            Err(e) if e.is(ErrorCode::Timeout) && ctx.check().is_err() => Err(e),
            Err(e) if e.is(ErrorCode::ExternalToolUnavailable) => {
                debug!(cleaner = cleaner.name(), "{}", e);
                Ok(Outcome::Skipped {
                    reason: e.message().to_string(),
                })
            }
            Err(e) => {
                warn!(cleaner = cleaner.name(), code = %e.code(), "{}", e);
                Ok(Outcome::Failed {
                    code: e.code().to_string(),
                    message: e.message().to_string(),
                })
            }
        }
    }

    fn unprotected(&self, items: Vec<ScanItem>) -> Vec<ScanItem> {
        items
            .into_iter()
            .filter(|item| {
                let path = Path::new(&item.path);
                !(path.is_absolute() && self.options.guard.is_protected(path))
            })
            .collect()
    }

    fn spinner(&self, len: usize) -> Spinner {
        if !self.show_progress {
            return Spinner(None);
        }
        let pb = ProgressBar::new(len as u64);
        pb.set_style(
            ProgressStyle::default_spinner()
                .template("{spinner:.cyan} [{pos}/{len}] {msg}")
                .unwrap_or_else(|_| ProgressStyle::default_spinner()),
        );
        pb.enable_steady_tick(Duration::from_millis(100));
        Spinner(Some(pb))
    }
}

/// Run progress, cleared from the terminal when dropped so an aborted run
/// leaves nothing behind.
struct Spinner(Option<ProgressBar>);

impl Spinner {
    fn set_message(&self, msg: &str) {
        if let Some(pb) = &self.0 {
            pb.set_message(msg.to_string());
        }
    }

    fn inc(&self) {
        if let Some(pb) = &self.0 {
            pb.inc(1);
        }
    }
}

impl Drop for Spinner {
    fn drop(&mut self) {
        if let Some(pb) = &self.0 {
            pb.finish_and_clear();
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::cleaner::Strategy;
    use crate::common::exec::RecordingRunner;
    use crate::profiles::loader::{CleanupOperation, OperationSettings, Profile};
    use std::fs;
    use std::sync::Arc;
    use tempfile::TempDir;

    fn temp_profile(root: &Path) -> Profile {
        Profile::new(
            "tmp-only",
            "temp files under a fixture root",
            vec![
                CleanupOperation::new(OperationType::TempFiles, "old temp files").with_settings(
                    OperationSettings::TempFiles {
                        older_than: "0h".to_string(),
                        excludes: Vec::new(),
                        base_paths: vec![root.to_path_buf()],
                    },
                ),
            ],
        )
    }

    fn config_with(profile: Profile) -> Config {
        let mut config = Config::default();
        config.current_profile = profile.name.clone();
        config.upsert_profile(profile);
        config
    }

    fn options(home: &Path, dry_run: bool) -> CleanerOptions {
        CleanerOptions::new(false, dry_run)
            .with_home(home)
            .with_runner(Arc::new(RecordingRunner::new()))
    }

    #[test]
    fn test_dry_run_leaves_files() {
        let dir = TempDir::new().unwrap();
        let root = dir.path().join("scratch");
        fs::create_dir_all(&root).unwrap();
        fs::write(root.join("a.log"), vec![0u8; 64]).unwrap();
        std::thread::sleep(Duration::from_millis(20));

        let config = config_with(temp_profile(&root));
        let engine = Engine::new(&config, options(dir.path(), true));
        let report = engine
            .run(&Context::background(), None, RunMode::Clean)
            .unwrap();

        assert!(report.dry_run);
        assert_eq!(report.items_removed, 1);
        assert_eq!(report.total, SizeEstimate::known(64));
        match &report.operations[0].outcome {
            Outcome::Cleaned { result } => assert_eq!(result.strategy, Strategy::DryRun),
            other => panic!("unexpected outcome {:?}", other),
        }
        assert!(root.join("a.log").exists());
    }

    #[test]
    fn test_unavailable_cleaner_is_skipped() {
        let dir = TempDir::new().unwrap();
        let profile = Profile::new(
            "docker-only",
            "",
            vec![CleanupOperation::new(OperationType::Docker, "prune")],
        );
        let config = config_with(profile);
        let engine = Engine::new(&config, options(dir.path(), false));
        let report = engine
            .run(&Context::background(), Some("docker-only"), RunMode::Clean)
            .unwrap();
        assert_eq!(report.skipped(), 1);
        assert_eq!(report.items_removed, 0);
    }

    #[test]
    fn test_missing_and_disabled_profiles() {
        let dir = TempDir::new().unwrap();
        let mut config = config_with(temp_profile(dir.path()));
        let engine = Engine::new(&config, options(dir.path(), true));
        let err = engine
            .run(&Context::background(), Some("nope"), RunMode::Scan)
            .unwrap_err();
        assert!(err.is(ErrorCode::MissingProfile));

        config.disable_profile("quick").unwrap();
        let engine = Engine::new(&config, options(dir.path(), true));
        let err = engine
            .run(&Context::background(), Some("quick"), RunMode::Scan)
            .unwrap_err();
        assert!(err.is(ErrorCode::InvalidOperation));
    }

    #[test]
    fn test_overlapping_runs_are_refused() {
        let dir = TempDir::new().unwrap();
        let root = dir.path().join("locked");
        fs::create_dir_all(&root).unwrap();
        let _held = ResourceLock::acquire(vec![Resource::Directory(dir.path().to_path_buf())])
            .unwrap();

        let config = config_with(temp_profile(&root));
        let engine = Engine::new(&config, options(dir.path(), true));
        let err = engine
            .run(&Context::background(), None, RunMode::Scan)
            .unwrap_err();
        assert!(err.is(ErrorCode::InvalidOperation));
    }

    #[test]
    fn test_lock_released_on_drop() {
        let dir = TempDir::new().unwrap();
        let r = Resource::Directory(dir.path().join("x"));
        drop(ResourceLock::acquire(vec![r.clone()]).unwrap());
        assert!(ResourceLock::acquire(vec![r]).is_ok());
    }

    #[test]
    fn test_scan_total_follows_cleaner_certainty() {
        let dir = TempDir::new().unwrap();
        let profile = Profile::new(
            "projects-only",
            "",
            vec![CleanupOperation::new(OperationType::ProjectsMgmt, "automation cache")],
        );
        let config = config_with(profile);
        let runner = Arc::new(
            RecordingRunner::new().with_installed(&[crate::cleaners::projects::PROGRAM]),
        );
        let options = CleanerOptions::new(false, true)
            .with_home(dir.path())
            .with_runner(runner);
        let engine = Engine::new(&config, options);
        let ctx = Context::background();

        let scan = engine.run(&ctx, None, RunMode::Scan).unwrap();
        let dry = engine.run(&ctx, None, RunMode::Clean).unwrap();
        assert!(scan.total.is_unknown());
        assert_eq!(scan.total.status, dry.total.status);
    }

    #[test]
    fn test_spinner_cleared_on_drop() {
        let pb = ProgressBar::hidden();
        drop(Spinner(Some(pb.clone())));
        assert!(pb.is_finished());
    }

    #[test]
    fn test_cancelled_context_aborts() {
        let dir = TempDir::new().unwrap();
        let config = config_with(temp_profile(dir.path()));
        let engine = Engine::new(&config, options(dir.path(), true));
        let ctx = Context::background();
        ctx.cancel();
        let err = engine.run(&ctx, None, RunMode::Scan).unwrap_err();
        assert!(err.is(ErrorCode::Cancelled));
    }
}
