use serde::{Deserialize, Serialize};
use std::path::PathBuf;
use std::time::Instant;

use tracing::warn;

use crate::cleaner::{
    AvailabilityCache, CleanResult, Cleaner, CleanerOptions, Resource, ScanItem, ScanType,
    SizeEstimate,
};
use crate::common::errors::{ErrorCode, Result};
use crate::common::exec::{timeouts, Context};
use crate::profiles::loader::{OperationSettings, OperationType};
use crate::scanner::walker;

const NAME: &str = "node-packages";

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum NodePackageManager {
    Npm,
    Pnpm,
    Yarn,
    Bun,
}

impl NodePackageManager {
    pub fn all() -> Vec<NodePackageManager> {
        vec![
            NodePackageManager::Npm,
            NodePackageManager::Pnpm,
            NodePackageManager::Yarn,
            NodePackageManager::Bun,
        ]
    }

    pub fn program(self) -> &'static str {
        match self {
            NodePackageManager::Npm => "npm",
            NodePackageManager::Pnpm => "pnpm",
            NodePackageManager::Yarn => "yarn",
            NodePackageManager::Bun => "bun",
        }
    }

    fn clean_args(self) -> &'static [&'static str] {
        match self {
            NodePackageManager::Npm => &["cache", "clean", "--force"],
            NodePackageManager::Pnpm => &["store", "prune"],
            NodePackageManager::Yarn => &["cache", "clean"],
            NodePackageManager::Bun => &["pm", "cache", "rm"],
        }
    }
}

/// Clears package manager caches for every manager on `$PATH`.
#[derive(Debug)]
pub struct NodeCleaner {
    options: CleanerOptions,
    managers: Vec<NodePackageManager>,
    available: AvailabilityCache,
}

impl NodeCleaner {
    pub fn new(options: CleanerOptions, managers: Vec<NodePackageManager>) -> Self {
        Self {
            options,
            managers,
            available: AvailabilityCache::default(),
        }
    }

    pub fn from_settings(
        options: CleanerOptions,
        settings: Option<&OperationSettings>,
    ) -> Result<Self> {
        match settings {
            None => Ok(Self::new(options, NodePackageManager::all())),
            Some(OperationSettings::Node { managers }) => Ok(Self::new(options, managers.clone())),
            Some(other) => Err(other.mismatch(NAME)),
        }
    }

    /// Selected managers that are installed.
    pub fn installed(&self) -> Vec<NodePackageManager> {
        self.managers
            .iter()
            .copied()
            .filter(|m| self.options.runner.is_installed(m.program()))
            .collect()
    }

    fn cache_path(&self, ctx: &Context, manager: NodePackageManager) -> Result<Option<PathBuf>> {
        let from_command = |args: &[&str]| -> Result<Option<PathBuf>> {
            let out = self
                .options
                .runner
                .run(ctx, manager.program(), args, timeouts::PROBE)?;
            let path = out.stdout.trim();
            Ok((!path.is_empty()).then(|| PathBuf::from(path)))
        };
        match manager {
            NodePackageManager::Npm => from_command(&["config", "get", "cache"]),
            NodePackageManager::Pnpm => from_command(&["store", "path"]),
            NodePackageManager::Yarn | NodePackageManager::Bun => {
                Ok(self.default_cache_dir(manager))
            }
        }
    }

    /// A manager's cache location when it is not configured otherwise.
    fn default_cache_dir(&self, manager: NodePackageManager) -> Option<PathBuf> {
        let home = self.options.home.as_ref();
        match manager {
            NodePackageManager::Npm => env_dir("npm_config_cache")
                .or_else(|| home.map(|h| h.join(".npm"))),
            NodePackageManager::Pnpm => {
                if cfg!(target_os = "macos") {
                    home.map(|h| h.join("Library/pnpm/store"))
                } else {
                    env_dir("XDG_DATA_HOME")
                        .or_else(|| home.map(|h| h.join(".local/share")))
                        .map(|data| data.join("pnpm/store"))
                }
            }
            NodePackageManager::Yarn => home.map(|h| h.join(".yarn/cache")),
            NodePackageManager::Bun => home.map(|h| h.join(".bun/install/cache")),
        }
    }
}

fn env_dir(var: &str) -> Option<PathBuf> {
    std::env::var_os(var)
        .filter(|v| !v.is_empty())
        .map(PathBuf::from)
}

impl Cleaner for NodeCleaner {
    fn name(&self) -> &str {
        NAME
    }

    fn op_type(&self) -> OperationType {
        OperationType::NodePackages
    }

    fn is_available(&self, _ctx: &Context) -> bool {
        self.available.get_or_probe(|| !self.installed().is_empty())
    }

    fn validate_settings(&self, settings: Option<&OperationSettings>) -> Result<()> {
        Self::from_settings(self.options.clone(), settings).map(|_| ())
    }

    fn scan(&self, ctx: &Context) -> Result<Vec<ScanItem>> {
        let mut items = Vec::new();
        for manager in self.installed() {
            ctx.check()?;
            if let Some(path) = self.cache_path(ctx, manager)? {
                if path.exists() && !self.options.guard.is_protected(&path) {
                    items.push(
                        ScanItem::new(
                            path.to_string_lossy().into_owned(),
                            walker::dir_size(&path) as i64,
                            ScanType::System,
                        )
                        .with_created(walker::dir_mod_time(&path)),
                    );
                }
            }
        }
        Ok(items)
    }

    fn clean(&self, ctx: &Context) -> Result<CleanResult> {
        self.ensure_available(ctx)?;
        let started = Instant::now();
        let mut result = CleanResult::new(self.options.strategy(false));
        let managers = self.installed();

        // Cache clean commands do not say what they freed.
        if self.options.dry_run {
            result.items_removed = managers.len() as u64;
            result.size_estimate = SizeEstimate::unknown();
            return Ok(result.complete(started));
        }

        for manager in managers {
            ctx.check()?;
            self.options
                .step(NAME, format!("cleaning {} cache", manager.program()));
            match self.options.runner.run(
                ctx,
                manager.program(),
                manager.clean_args(),
                timeouts::DEFAULT,
            ) {
                Ok(_) => result.removed(SizeEstimate::unknown()),
                Err(e) if e.is(ErrorCode::Timeout) || e.is(ErrorCode::Cancelled) => return Err(e),
                Err(e) => {
                    warn!(cleaner = NAME, manager = manager.program(), "{}", e);
                    result.failed();
                }
            }
        }

        Ok(result.complete(started))
    }

    fn resources(&self) -> Vec<Resource> {
        self.managers
            .iter()
            .filter_map(|m| self.default_cache_dir(*m))
            .map(Resource::Directory)
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::common::exec::RecordingRunner;
    use crate::cleaner::engine::ResourceLock;
    use std::sync::Arc;
    use tempfile::TempDir;

    #[test]
    fn test_only_installed_managers_are_cleaned() {
        let runner = Arc::new(RecordingRunner::new().with_installed(&["npm", "bun"]));
        let options = CleanerOptions::new(false, false).with_runner(runner.clone());
        let cleaner = NodeCleaner::new(options, NodePackageManager::all());
        let result = cleaner.clean(&Context::background()).unwrap();

        assert_eq!(result.items_removed, 2);
        assert!(result.size_estimate.is_unknown());
        assert!(runner.was_called("npm cache clean --force"));
        assert!(runner.was_called("bun pm cache rm"));
        assert!(!runner.was_called("pnpm"));
    }

    #[test]
    fn test_failing_manager_is_per_item_failure() {
        let runner = Arc::new(
            RecordingRunner::new()
                .with_installed(&["npm", "yarn"])
                .fail("yarn cache clean", "EACCES"),
        );
        let options = CleanerOptions::new(false, false).with_runner(runner);
        let cleaner = NodeCleaner::new(options, NodePackageManager::all());
        let result = cleaner.clean(&Context::background()).unwrap();
        assert_eq!(result.items_removed, 1);
        assert_eq!(result.items_failed, 1);
    }

    #[test]
    fn test_cache_claim_refused_while_held() {
        let home = TempDir::new().unwrap();
        let options = CleanerOptions::new(false, false).with_home(home.path());
        let cleaner = NodeCleaner::new(options, vec![NodePackageManager::Yarn]);
        assert_eq!(
            cleaner.resources(),
            vec![Resource::Directory(home.path().join(".yarn/cache"))]
        );

        let held = ResourceLock::acquire(vec![Resource::Directory(home.path().join(".yarn"))])
            .unwrap();
        let err = ResourceLock::acquire(cleaner.resources()).unwrap_err();
        assert!(err.is(ErrorCode::InvalidOperation));

        drop(held);
        assert!(ResourceLock::acquire(cleaner.resources()).is_ok());
    }
}
