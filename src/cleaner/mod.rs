pub mod engine;
pub mod registry;
pub mod result;

use std::path::{Path, PathBuf};
use std::sync::{Arc, OnceLock};

use tracing::{debug, info};

use crate::common::errors::{ErrorCode, Result, SweepError};
use crate::common::exec::{CommandRunner, Context, SystemRunner};
use crate::common::safety::{SafetyGuard, DEFAULT_PROTECTED};
use crate::profiles::loader::{OperationSettings, OperationType};
use crate::scanner::walker;

pub use engine::{Engine, OperationReport, Outcome, RunMode, RunReport};
pub use registry::{default_registry, default_registry_with, registry_from, Registry};
pub use result::{CleanResult, ScanItem, ScanType, SizeEstimate, SizeStatus, Strategy};

/// Lifecycle of one cleaner run. There is no retry edge.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum CleanerState {
    Idle,
    Probing,
    Scanning,
    Cleaning,
    Completed,
    Failed,
}

impl CleanerState {
    pub fn can_transition_to(self, next: CleanerState) -> bool {
        use CleanerState::*;
        matches!(
            (self, next),
            (Idle, Probing)
                | (Probing, Scanning)
                | (Probing, Cleaning)
                | (Probing, Failed)
                | (Scanning, Completed)
                | (Scanning, Failed)
                | (Cleaning, Completed)
                | (Cleaning, Failed)
        )
    }
}

/// Something two concurrent cleanups must not both touch.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum Resource {
    DockerDaemon,
    NixStore,
    Directory(PathBuf),
}

impl Resource {
    pub fn overlaps(&self, other: &Resource) -> bool {
        match (self, other) {
            (Resource::Directory(a), Resource::Directory(b)) => {
                a.starts_with(b) || b.starts_with(a)
            }
            (a, b) => a == b,
        }
    }
}

impl std::fmt::Display for Resource {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Resource::DockerDaemon => write!(f, "docker daemon"),
            Resource::NixStore => write!(f, "nix store"),
            Resource::Directory(p) => write!(f, "{}", p.display()),
        }
    }
}

/// Flags and collaborators threaded into every cleaner.
#[derive(Clone)]
pub struct CleanerOptions {
    pub verbose: bool,
    pub dry_run: bool,
    pub runner: Arc<dyn CommandRunner>,
    pub guard: SafetyGuard,
    pub home: Option<PathBuf>,
}

impl std::fmt::Debug for CleanerOptions {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("CleanerOptions")
            .field("verbose", &self.verbose)
            .field("dry_run", &self.dry_run)
            .field("guard", &self.guard)
            .field("home", &self.home)
            .finish_non_exhaustive()
    }
}

impl Default for CleanerOptions {
    fn default() -> Self {
        Self::new(false, false)
    }
}

impl CleanerOptions {
    pub fn new(verbose: bool, dry_run: bool) -> Self {
        let home = walker::home_dir().ok();
        let guard = SafetyGuard::new(DEFAULT_PROTECTED, home.as_deref());
        Self {
            verbose,
            dry_run,
            runner: Arc::new(SystemRunner),
            guard,
            home,
        }
    }

    pub fn with_runner(mut self, runner: Arc<dyn CommandRunner>) -> Self {
        self.runner = runner;
        self
    }

    pub fn with_guard(mut self, guard: SafetyGuard) -> Self {
        self.guard = guard;
        self
    }

    /// Override the home directory, rebuilding home-relative protection.
    pub fn with_home(mut self, home: impl Into<PathBuf>) -> Self {
        let home = home.into();
        self.guard = SafetyGuard::new(DEFAULT_PROTECTED, Some(&home));
        self.home = Some(home);
        self
    }

    pub fn home(&self) -> Result<&Path> {
        self.home.as_deref().ok_or_else(|| {
            SweepError::new(
                ErrorCode::Filesystem,
                "could not determine home directory (tried user database, HOME, USERPROFILE)",
            )
        })
    }

    /// `DryRun` when dry-running, otherwise the cleaner's own strategy.
    pub fn strategy(&self, aggressive: bool) -> Strategy {
        if self.dry_run {
            Strategy::DryRun
        } else if aggressive {
            Strategy::Aggressive
        } else {
            Strategy::Conservative
        }
    }

    /// Per-step progress line, visible only in verbose mode.
    pub fn step(&self, cleaner: &str, message: impl std::fmt::Display) {
        if self.verbose {
            info!(cleaner, "{}", message);
        } else {
            debug!(cleaner, "{}", message);
        }
    }
}

/// Memoized result of an availability probe.
#[derive(Debug, Default)]
pub struct AvailabilityCache(OnceLock<bool>);

impl AvailabilityCache {
    pub fn get_or_probe(&self, probe: impl FnOnce() -> bool) -> bool {
        *self.0.get_or_init(probe)
    }
}

/// The uniform contract every cleanup source implements.
pub trait Cleaner: Send + Sync {
    /// Stable identifier, unique within a registry.
    fn name(&self) -> &str;

    fn op_type(&self) -> OperationType;

    /// Side-effect-free probe; must finish within a few seconds.
    fn is_available(&self, ctx: &Context) -> bool;

    /// `None` is always valid and means "use defaults".
    fn validate_settings(&self, settings: Option<&OperationSettings>) -> Result<()>;

    /// List deletion candidates without deleting anything.
    fn scan(&self, ctx: &Context) -> Result<Vec<ScanItem>>;

    /// Reclaimable size of `items`, as sure as this cleaner can be about it.
    ///
    /// Cleaners whose items carry placeholder sizes must override this so a
    /// scan never reports a measured-looking zero.
    fn scan_estimate(&self, items: &[ScanItem]) -> SizeEstimate {
        SizeEstimate::known(items.iter().map(ScanItem::size_bytes).sum())
    }

    /// Reclaim space, or report what would be reclaimed when dry-running.
    fn clean(&self, ctx: &Context) -> Result<CleanResult>;

    /// Shared resources a run of this cleaner touches.
    fn resources(&self) -> Vec<Resource> {
        Vec::new()
    }

    fn ensure_available(&self, ctx: &Context) -> Result<()> {
        if self.is_available(ctx) {
            Ok(())
        } else {
            Err(SweepError::tool_unavailable(self.name()))
        }
    }
}

impl std::fmt::Debug for dyn Cleaner {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Cleaner")
            .field("name", &self.name())
            .field("type", &self.op_type())
            .finish()
    }
}
