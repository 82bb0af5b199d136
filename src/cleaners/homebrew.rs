use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::time::Instant;

use crate::cleaner::{
    AvailabilityCache, CleanResult, Cleaner, CleanerOptions, Resource, ScanItem, ScanType,
    SizeEstimate,
};
use crate::common::errors::Result;
use crate::common::exec::{timeouts, Context};
use crate::profiles::loader::{OperationSettings, OperationType};
use crate::scanner::walker;

const NAME: &str = "homebrew";
const FORMULA_PREFIX: &str = "brew:formula:";

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum HomebrewMode {
    /// Remove formulae nothing depends on anymore
    Unused,
    /// Prune the download cache only
    #[default]
    Cleanup,
    All,
}

/// Drives `brew autoremove` and `brew cleanup`.
///
/// Neither command prints a machine-readable total, so reclaimed space is
/// always reported as unknown.
#[derive(Debug)]
pub struct HomebrewCleaner {
    options: CleanerOptions,
    mode: HomebrewMode,
    available: AvailabilityCache,
}

impl HomebrewCleaner {
    pub fn new(options: CleanerOptions, mode: HomebrewMode) -> Self {
        Self {
            options,
            mode,
            available: AvailabilityCache::default(),
        }
    }

    pub fn from_settings(
        options: CleanerOptions,
        settings: Option<&OperationSettings>,
    ) -> Result<Self> {
        match settings {
            None => Ok(Self::new(options, HomebrewMode::default())),
            Some(OperationSettings::Homebrew { mode }) => Ok(Self::new(options, *mode)),
            Some(other) => Err(other.mismatch(NAME)),
        }
    }

    fn brew(&self, ctx: &Context, args: &[&str]) -> Result<String> {
        Ok(self
            .options
            .runner
            .run(ctx, "brew", args, timeouts::DEFAULT)?
            .stdout)
    }

    fn prunes_cache(&self) -> bool {
        matches!(self.mode, HomebrewMode::Cleanup | HomebrewMode::All)
    }

    fn removes_unused(&self) -> bool {
        matches!(self.mode, HomebrewMode::Unused | HomebrewMode::All)
    }

    /// Formulae `brew autoremove` would uninstall.
    fn unused_formulae(&self, ctx: &Context) -> Result<Vec<String>> {
        let out = self.brew(ctx, &["autoremove", "--dry-run"])?;
        Ok(out
            .lines()
            .map(str::trim)
            .filter(|l| !l.is_empty() && !l.starts_with("==>"))
            .map(str::to_string)
            .collect())
    }

    fn cache_dir(&self, ctx: &Context) -> Result<Option<PathBuf>> {
        let out = self.brew(ctx, &["--cache"])?;
        let path = out.trim();
        Ok((!path.is_empty()).then(|| PathBuf::from(path)))
    }
}

fn env_dir(var: &str) -> Option<PathBuf> {
    std::env::var_os(var)
        .filter(|v| !v.is_empty())
        .map(PathBuf::from)
}

/// Where `brew cleanup` prunes downloads, without asking brew.
fn default_cache_dir(home: Option<&Path>) -> Option<PathBuf> {
    if let Some(dir) = env_dir("HOMEBREW_CACHE") {
        return Some(dir);
    }
    if cfg!(target_os = "macos") {
        return home.map(|h| h.join("Library/Caches/Homebrew"));
    }
    env_dir("XDG_CACHE_HOME")
        .or_else(|| home.map(|h| h.join(".cache")))
        .map(|cache| cache.join("Homebrew"))
}

/// Where `brew autoremove` uninstalls kegs from.
fn default_cellar() -> PathBuf {
    let prefix = env_dir("HOMEBREW_PREFIX").unwrap_or_else(|| {
        if cfg!(all(target_os = "macos", target_arch = "aarch64")) {
            PathBuf::from("/opt/homebrew")
        } else if cfg!(target_os = "macos") {
            PathBuf::from("/usr/local")
        } else {
            PathBuf::from("/home/linuxbrew/.linuxbrew")
        }
    });
    prefix.join("Cellar")
}

/// Count `Removing:` and `Uninstalling` lines.
fn count_removed(output: &str) -> u64 {
    output
        .lines()
        .map(str::trim_start)
        .filter(|l| l.starts_with("Removing:") || l.starts_with("Uninstalling"))
        .count() as u64
}

impl Cleaner for HomebrewCleaner {
    fn name(&self) -> &str {
        NAME
    }

    fn op_type(&self) -> OperationType {
        OperationType::Homebrew
    }

    fn is_available(&self, _ctx: &Context) -> bool {
        self.available
            .get_or_probe(|| self.options.runner.is_installed("brew"))
    }

    fn validate_settings(&self, settings: Option<&OperationSettings>) -> Result<()> {
        Self::from_settings(self.options.clone(), settings).map(|_| ())
    }

    fn scan(&self, ctx: &Context) -> Result<Vec<ScanItem>> {
        let mut items = Vec::new();
        if !self.is_available(ctx) {
            return Ok(items);
        }
        if self.prunes_cache() {
            if let Some(cache) = self.cache_dir(ctx)? {
                if cache.exists() && !self.options.guard.is_protected(&cache) {
                    items.push(ScanItem::new(
                        cache.to_string_lossy().into_owned(),
                        walker::dir_size(&cache) as i64,
                        ScanType::System,
                    ));
                }
            }
        }
        if self.removes_unused() {
            items.extend(
                self.unused_formulae(ctx)?
                    .into_iter()
                    .map(|f| ScanItem::new(format!("{}{}", FORMULA_PREFIX, f), 0, ScanType::System)),
            );
        }
        Ok(items)
    }

    fn clean(&self, ctx: &Context) -> Result<CleanResult> {
        self.ensure_available(ctx)?;
        let started = Instant::now();
        let mut result = CleanResult::new(self.options.strategy(self.mode == HomebrewMode::All));

        if self.options.dry_run {
            let items = self.scan(ctx)?;
            result.items_removed = items.len() as u64;
            result.size_estimate = self.scan_estimate(&items);
            return Ok(result.complete(started));
        }
        result.size_estimate = SizeEstimate::unknown();

        if self.removes_unused() {
            self.options.step(NAME, "brew autoremove");
            let out = self.brew(ctx, &["autoremove"])?;
            result.items_removed += count_removed(&out);
        }
        if self.prunes_cache() {
            self.options.step(NAME, "brew cleanup --prune=all");
            let out = self.brew(ctx, &["cleanup", "--prune=all"])?;
            result.items_removed += count_removed(&out);
        }

        Ok(result.complete(started))
    }

    /// Unused formulae carry no size of their own; the download cache is
    /// measured.
    fn scan_estimate(&self, items: &[ScanItem]) -> SizeEstimate {
        if items.iter().any(|i| i.path.starts_with(FORMULA_PREFIX)) {
            return SizeEstimate::unknown();
        }
        SizeEstimate::known(items.iter().map(ScanItem::size_bytes).sum())
    }

    fn resources(&self) -> Vec<Resource> {
        let mut dirs = Vec::new();
        if self.prunes_cache() {
            dirs.extend(default_cache_dir(self.options.home.as_deref()));
        }
        if self.removes_unused() {
            dirs.push(default_cellar());
        }
        dirs.into_iter().map(Resource::Directory).collect()
    }
}
