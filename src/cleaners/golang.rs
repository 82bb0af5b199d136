use serde::{Deserialize, Serialize};
use std::ops::{BitOr, BitOrAssign};
use std::path::{Path, PathBuf};
use std::time::{Duration, Instant};

use tracing::debug;

use crate::cleaner::{
    AvailabilityCache, CleanResult, Cleaner, CleanerOptions, Resource, ScanItem, ScanType,
    SizeEstimate,
};
use crate::common::errors::{ErrorCode, Result};
use crate::common::exec::{timeouts, Context};
use crate::common::format::format_estimate;
use crate::profiles::loader::{OperationSettings, OperationType};
use crate::scanner::walker;

const NAME: &str = "go-packages";

/// One Go cache category, as written in config files.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum GoCacheKind {
    GoCache,
    TestCache,
    ModCache,
    BuildCache,
    LintCache,
}

impl GoCacheKind {
    pub fn all() -> Vec<GoCacheKind> {
        vec![
            GoCacheKind::GoCache,
            GoCacheKind::TestCache,
            GoCacheKind::ModCache,
            GoCacheKind::BuildCache,
            GoCacheKind::LintCache,
        ]
    }

    fn flag(self) -> GoCaches {
        match self {
            GoCacheKind::GoCache => GoCaches::GOCACHE,
            GoCacheKind::TestCache => GoCaches::TEST_CACHE,
            GoCacheKind::ModCache => GoCaches::MOD_CACHE,
            GoCacheKind::BuildCache => GoCaches::BUILD_CACHE,
            GoCacheKind::LintCache => GoCaches::LINT_CACHE,
        }
    }

    fn label(self) -> &'static str {
        match self {
            GoCacheKind::GoCache => "GOCACHE",
            GoCacheKind::TestCache => "test cache",
            GoCacheKind::ModCache => "module cache",
            GoCacheKind::BuildCache => "build cache folders",
            GoCacheKind::LintCache => "golangci-lint cache",
        }
    }
}

/// Bit set of Go cache categories, composed with `|`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub struct GoCaches(u8);

impl GoCaches {
    pub const NONE: GoCaches = GoCaches(0);
    pub const GOCACHE: GoCaches = GoCaches(1 << 0);
    pub const TEST_CACHE: GoCaches = GoCaches(1 << 1);
    pub const MOD_CACHE: GoCaches = GoCaches(1 << 2);
    pub const BUILD_CACHE: GoCaches = GoCaches(1 << 3);
    pub const LINT_CACHE: GoCaches = GoCaches(1 << 4);
    pub const ALL: GoCaches = GoCaches(0b1_1111);

    pub fn contains(self, other: GoCaches) -> bool {
        self.0 & other.0 == other.0
    }

    pub fn is_empty(self) -> bool {
        self.0 == 0
    }

    /// Selected kinds in a fixed order.
    pub fn kinds(self) -> impl Iterator<Item = GoCacheKind> {
        GoCacheKind::all()
            .into_iter()
            .filter(move |k| self.contains(k.flag()))
    }
}

impl BitOr for GoCaches {
    type Output = GoCaches;

    fn bitor(self, rhs: GoCaches) -> GoCaches {
        GoCaches(self.0 | rhs.0)
    }
}

impl BitOrAssign for GoCaches {
    fn bitor_assign(&mut self, rhs: GoCaches) {
        self.0 |= rhs.0;
    }
}

impl FromIterator<GoCacheKind> for GoCaches {
    fn from_iter<I: IntoIterator<Item = GoCacheKind>>(iter: I) -> Self {
        iter.into_iter()
            .fold(GoCaches::NONE, |acc, kind| acc | kind.flag())
    }
}

/// Cleans Go toolchain caches through `go clean` and `golangci-lint`.
#[derive(Debug)]
pub struct GoCleaner {
    options: CleanerOptions,
    caches: GoCaches,
    available: AvailabilityCache,
}

impl GoCleaner {
    pub fn new(options: CleanerOptions, caches: GoCaches) -> Self {
        Self {
            options,
            caches,
            available: AvailabilityCache::default(),
        }
    }

    pub fn from_settings(
        options: CleanerOptions,
        settings: Option<&OperationSettings>,
    ) -> Result<Self> {
        match settings {
            None => Ok(Self::new(options, GoCaches::ALL)),
            Some(OperationSettings::Go { caches }) => {
                Ok(Self::new(options, caches.iter().copied().collect()))
            }
            Some(other) => Err(other.mismatch(NAME)),
        }
    }

    pub fn caches(&self) -> GoCaches {
        self.caches
    }

    /// `go env <var>`, trimmed; empty when Go reports nothing.
    fn go_env(&self, ctx: &Context, var: &str) -> Result<Option<PathBuf>> {
        let out = self
            .options
            .runner
            .run(ctx, "go", &["env", var], timeouts::GO_ENV)?;
        let value = out.stdout.trim();
        Ok((!value.is_empty()).then(|| PathBuf::from(value)))
    }

    /// Where the toolchain keeps a variable's directory when `go env` is not
    /// consulted: the environment first, then Go's built-in default.
    fn default_dir(&self, var: &str) -> Option<PathBuf> {
        if let Some(dir) = env_dir(var) {
            return Some(dir);
        }
        match var {
            "GOCACHE" => self.user_cache_dir().map(|c| c.join("go-build")),
            "GOMODCACHE" => env_dir("GOPATH")
                .and_then(|gopath| std::env::split_paths(&gopath).next())
                .or_else(|| self.options.home.as_ref().map(|h| h.join("go")))
                .map(|gopath| gopath.join("pkg/mod")),
            _ => None,
        }
    }

    fn user_cache_dir(&self) -> Option<PathBuf> {
        let home = self.options.home.as_ref();
        if cfg!(target_os = "macos") {
            return home.map(|h| h.join("Library/Caches"));
        }
        env_dir("XDG_CACHE_HOME").or_else(|| home.map(|h| h.join(".cache")))
    }

    /// Directory holding the stray `go-build*` folders.
    fn build_cache_root(&self) -> Option<PathBuf> {
        if cfg!(target_os = "macos") {
            self.options.home.as_ref().map(|h| h.join("Library/Caches"))
        } else {
            Some(PathBuf::from("/tmp"))
        }
    }

    fn build_cache_dirs(&self) -> Vec<PathBuf> {
        let pattern = match self.build_cache_root() {
            Some(root) => root.join("go-build*"),
            None => return Vec::new(),
        };
        glob::glob(&pattern.to_string_lossy())
            .map(|paths| {
                paths
                    .filter_map(|p| p.ok())
                    .filter(|p| p.is_dir())
                    .filter(|p| !self.options.guard.is_protected(p))
                    .collect()
            })
            .unwrap_or_default()
    }

    fn lint_cache_dir(&self) -> Option<PathBuf> {
        match env_dir("XDG_CACHE_HOME") {
            Some(xdg) => Some(xdg.join("golangci-lint")),
            None => self
                .options
                .home
                .as_ref()
                .map(|h| h.join(".cache/golangci-lint")),
        }
    }

    fn measure(path: Option<&Path>) -> SizeEstimate {
        SizeEstimate::known(path.map_or(0, walker::dir_size))
    }

    /// Run a cache-clearing command and report what it freed in `dir`.
    ///
    /// Nothing runs when `dir` is already empty. Without a directory to
    /// measure the result is unknown.
    fn run_and_measure(
        &self,
        ctx: &Context,
        dir: Option<&Path>,
        program: &str,
        args: &[&str],
        timeout: Duration,
    ) -> Result<SizeEstimate> {
        let runner = &self.options.runner;
        let Some(dir) = dir else {
            runner.run(ctx, program, args, timeout)?;
            return Ok(SizeEstimate::unknown());
        };
        let before = walker::dir_size(dir);
        if before == 0 {
            return Ok(SizeEstimate::known(0));
        }
        runner.run(ctx, program, args, timeout)?;
        Ok(SizeEstimate::known(before.saturating_sub(walker::dir_size(dir))))
    }

    /// What one category would free, without touching it.
    fn estimate_kind(&self, ctx: &Context, kind: GoCacheKind) -> Result<SizeEstimate> {
        Ok(match kind {
            GoCacheKind::GoCache => Self::measure(self.go_env(ctx, "GOCACHE")?.as_deref()),
            // Test results live inside GOCACHE and cannot be measured apart.
            GoCacheKind::TestCache => SizeEstimate::unknown(),
            GoCacheKind::ModCache => Self::measure(self.go_env(ctx, "GOMODCACHE")?.as_deref()),
            GoCacheKind::BuildCache => self
                .build_cache_dirs()
                .iter()
                .map(|d| SizeEstimate::known(walker::dir_size(d)))
                .sum(),
            GoCacheKind::LintCache => {
                if self.options.runner.is_installed("golangci-lint") {
                    Self::measure(self.lint_cache_dir().as_deref())
                } else {
                    SizeEstimate::unknown()
                }
            }
        })
    }

    /// Clear one category, counting an item only for what actually went away.
    fn clean_kind(
        &self,
        ctx: &Context,
        kind: GoCacheKind,
        result: &mut CleanResult,
    ) -> Result<()> {
        let freed = match kind {
            GoCacheKind::GoCache => {
                let dir = self.go_env(ctx, "GOCACHE")?;
                self.run_and_measure(
                    ctx,
                    dir.as_deref(),
                    "go",
                    &["clean", "-cache"],
                    timeouts::GO_CLEAN,
                )?
            }
            GoCacheKind::TestCache => {
                self.options.runner.run(
                    ctx,
                    "go",
                    &["clean", "-testcache"],
                    timeouts::GO_CLEAN,
                )?;
                SizeEstimate::unknown()
            }
            GoCacheKind::ModCache => {
                let dir = self.go_env(ctx, "GOMODCACHE")?;
                self.run_and_measure(
                    ctx,
                    dir.as_deref(),
                    "go",
                    &["clean", "-modcache"],
                    timeouts::GO_CLEAN,
                )?
            }
            GoCacheKind::BuildCache => {
                for dir in self.build_cache_dirs() {
                    ctx.check()?;
                    let bytes = walker::dir_size(&dir);
                    match walker::remove_path(&dir) {
                        Ok(()) => result.removed(SizeEstimate::known(bytes)),
                        Err(e) if e.is(ErrorCode::FileNotFound) => {}
                        Err(e) => {
                            debug!(cleaner = NAME, "failed to remove {}: {}", dir.display(), e);
                            result.failed();
                        }
                    }
                }
                return Ok(());
            }
            GoCacheKind::LintCache => {
                if !self.options.runner.is_installed("golangci-lint") {
                    debug!(cleaner = NAME, "golangci-lint not installed");
                    return Ok(());
                }
                self.run_and_measure(
                    ctx,
                    self.lint_cache_dir().as_deref(),
                    "golangci-lint",
                    &["cache", "clean"],
                    timeouts::LINT_CLEAN,
                )?
            }
        };

        self.options
            .step(NAME, format!("{}: {}", kind.label(), format_estimate(&freed)));
        if freed.value() > 0 {
            result.removed(freed);
        } else {
            result.size_estimate += freed;
        }
        Ok(())
    }
}

fn env_dir(var: &str) -> Option<PathBuf> {
    std::env::var_os(var)
        .filter(|v| !v.is_empty())
        .map(PathBuf::from)
}

impl Cleaner for GoCleaner {
    fn name(&self) -> &str {
        NAME
    }

    fn op_type(&self) -> OperationType {
        OperationType::GoPackages
    }

    fn is_available(&self, _ctx: &Context) -> bool {
        self.available
            .get_or_probe(|| self.options.runner.is_installed("go"))
    }

    fn validate_settings(&self, settings: Option<&OperationSettings>) -> Result<()> {
        Self::from_settings(self.options.clone(), settings).map(|_| ())
    }

    fn scan(&self, ctx: &Context) -> Result<Vec<ScanItem>> {
        let mut items = Vec::new();
        if !self.is_available(ctx) {
            return Ok(items);
        }

        let mut push = |path: &Path| {
            if path.exists() && !self.options.guard.is_protected(path) {
                items.push(
                    ScanItem::new(
                        path.to_string_lossy().into_owned(),
                        walker::dir_size(path) as i64,
                        ScanType::System,
                    )
                    .with_created(walker::dir_mod_time(path)),
                );
            }
        };

        if self.caches.contains(GoCaches::GOCACHE) {
            if let Some(p) = self.go_env(ctx, "GOCACHE")? {
                push(&p);
            }
        }
        if self.caches.contains(GoCaches::MOD_CACHE) {
            if let Some(p) = self.go_env(ctx, "GOMODCACHE")? {
                push(&p);
            }
        }
        if self.caches.contains(GoCaches::BUILD_CACHE) {
            for dir in self.build_cache_dirs() {
                push(&dir);
            }
        }
        if self.caches.contains(GoCaches::LINT_CACHE) {
            if let Some(p) = self.lint_cache_dir() {
                push(&p);
            }
        }
        Ok(items)
    }

    fn clean(&self, ctx: &Context) -> Result<CleanResult> {
        self.ensure_available(ctx)?;
        let started = Instant::now();
        let aggressive = self.caches.contains(GoCaches::MOD_CACHE);
        let mut result = CleanResult::new(self.options.strategy(aggressive));

        for kind in self.caches.kinds() {
            ctx.check()?;
            if self.options.dry_run {
                let size = self.estimate_kind(ctx, kind)?;
                self.options
                    .step(NAME, format!("{}: {}", kind.label(), format_estimate(&size)));
                result.removed(size);
            } else {
                self.clean_kind(ctx, kind, &mut result)?;
            }
        }

        Ok(result.complete(started))
    }

    fn resources(&self) -> Vec<Resource> {
        let mut dirs = Vec::new();
        if self.caches.contains(GoCaches::GOCACHE) || self.caches.contains(GoCaches::TEST_CACHE) {
            dirs.extend(self.default_dir("GOCACHE"));
        }
        if self.caches.contains(GoCaches::MOD_CACHE) {
            dirs.extend(self.default_dir("GOMODCACHE"));
        }
        if self.caches.contains(GoCaches::BUILD_CACHE) {
            dirs.extend(self.build_cache_root());
        }
        if self.caches.contains(GoCaches::LINT_CACHE) {
            dirs.extend(self.lint_cache_dir());
        }
        dirs.dedup();
        dirs.into_iter().map(Resource::Directory).collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_bitflags_compose() {
        let sel = GoCaches::GOCACHE | GoCaches::TEST_CACHE;
        assert!(sel.contains(GoCaches::GOCACHE));
        assert!(sel.contains(GoCaches::TEST_CACHE));
        assert!(!sel.contains(GoCaches::MOD_CACHE));
        assert!(GoCaches::ALL.contains(sel));
        assert_eq!(GoCaches::ALL.kinds().count(), 5);
        assert!(GoCaches::NONE.is_empty());
    }

    #[test]
    fn test_from_kinds() {
        let sel: GoCaches = vec![GoCacheKind::ModCache, GoCacheKind::LintCache]
            .into_iter()
            .collect();
        assert_eq!(sel, GoCaches::MOD_CACHE | GoCaches::LINT_CACHE);
        assert_eq!(
            sel.kinds().collect::<Vec<_>>(),
            vec![GoCacheKind::ModCache, GoCacheKind::LintCache]
        );
    }

    #[test]
    fn test_declares_every_cleared_directory() {
        let options = CleanerOptions::new(false, false).with_home("/home/dev");
        let all = GoCleaner::new(options.clone(), GoCaches::ALL).resources();
        assert_eq!(all.len(), 4);

        let test_only = GoCleaner::new(options, GoCaches::TEST_CACHE).resources();
        assert_eq!(test_only.len(), 1);
        assert!(all.contains(&test_only[0]));
    }

    #[cfg(not(target_os = "macos"))]
    #[test]
    fn test_build_cache_claim_covers_tmp_folders() {
        let options = CleanerOptions::new(false, false).with_home("/home/dev");
        let cleaner = GoCleaner::new(options, GoCaches::BUILD_CACHE);
        let stray = Resource::Directory(PathBuf::from("/tmp/go-build123"));
        assert!(cleaner.resources().iter().any(|r| r.overlaps(&stray)));
    }

    #[test]
    fn test_settings_kind_names() {
        let kinds: Vec<GoCacheKind> = serde_yaml::from_str("[gocache, testcache, modcache]").unwrap();
        assert_eq!(kinds.len(), 3);
    }
}
