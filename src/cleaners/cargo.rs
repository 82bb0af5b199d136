use std::path::PathBuf;
use std::time::Instant;

use crate::cleaner::{
    AvailabilityCache, CleanResult, Cleaner, CleanerOptions, Resource, ScanItem, ScanType,
    SizeEstimate,
};
use crate::common::errors::Result;
use crate::common::exec::{timeouts, Context};
use crate::profiles::loader::{OperationSettings, OperationType};
use crate::scanner::walker;

const NAME: &str = "cargo";

/// Cleans the Cargo registry and git caches.
///
/// Prefers `cargo-cache --autoclean`; falls back to `cargo clean`.
#[derive(Debug)]
pub struct CargoCleaner {
    options: CleanerOptions,
    autoclean: bool,
    cargo_home: Option<PathBuf>,
    available: AvailabilityCache,
}

impl CargoCleaner {
    pub fn new(options: CleanerOptions, autoclean: bool) -> Self {
        let cargo_home = std::env::var_os("CARGO_HOME")
            .filter(|v| !v.is_empty())
            .map(PathBuf::from)
            .or_else(|| options.home.as_ref().map(|h| h.join(".cargo")));
        Self {
            options,
            autoclean,
            cargo_home,
            available: AvailabilityCache::default(),
        }
    }

    pub fn from_settings(
        options: CleanerOptions,
        settings: Option<&OperationSettings>,
    ) -> Result<Self> {
        match settings {
            None => Ok(Self::new(options, true)),
            Some(OperationSettings::Cargo { autoclean }) => Ok(Self::new(options, *autoclean)),
            Some(other) => Err(other.mismatch(NAME)),
        }
    }

    pub fn with_cargo_home(mut self, cargo_home: impl Into<PathBuf>) -> Self {
        self.cargo_home = Some(cargo_home.into());
        self
    }

    /// `$CARGO_HOME/registry` and `$CARGO_HOME/git`
    pub fn cache_dirs(&self) -> Vec<PathBuf> {
        self.cargo_home
            .as_ref()
            .map(|home| vec![home.join("registry"), home.join("git")])
            .unwrap_or_default()
    }

    fn uses_cargo_cache(&self) -> bool {
        self.autoclean && self.options.runner.is_installed("cargo-cache")
    }
}

impl Cleaner for CargoCleaner {
    fn name(&self) -> &str {
        NAME
    }

    fn op_type(&self) -> OperationType {
        OperationType::Cargo
    }

    fn is_available(&self, _ctx: &Context) -> bool {
        self.available.get_or_probe(|| {
            self.options.runner.is_installed("cargo-cache")
                || self.options.runner.is_installed("cargo")
        })
    }

    fn validate_settings(&self, settings: Option<&OperationSettings>) -> Result<()> {
        Self::from_settings(self.options.clone(), settings).map(|_| ())
    }

    fn scan(&self, ctx: &Context) -> Result<Vec<ScanItem>> {
        ctx.check()?;
        Ok(self
            .cache_dirs()
            .into_iter()
            .filter(|d| d.exists() && !self.options.guard.is_protected(d))
            .map(|d| {
                ScanItem::new(
                    d.to_string_lossy().into_owned(),
                    walker::dir_size(&d) as i64,
                    ScanType::System,
                )
                .with_created(walker::dir_mod_time(&d))
            })
            .collect())
    }

    fn clean(&self, ctx: &Context) -> Result<CleanResult> {
        self.ensure_available(ctx)?;
        let started = Instant::now();
        let mut result = CleanResult::new(self.options.strategy(false));
        let items = self.scan(ctx)?;

        if self.options.dry_run {
            // autoclean keeps compressed crates, so only part of this goes away
            result.items_removed = items.len() as u64;
            result.size_estimate =
                SizeEstimate::estimated(items.iter().map(ScanItem::size_bytes).sum());
            return Ok(result.complete(started));
        }

        if !self.uses_cargo_cache() {
            // `cargo clean` empties the current target dir, never the caches
            // measured here, so nothing is attributed to them.
            self.options.step(NAME, "cargo clean");
            self.options
                .runner
                .run(ctx, "cargo", &["clean"], timeouts::CARGO)?;
            result.size_estimate = SizeEstimate::unknown();
            return Ok(result.complete(started));
        }

        let dirs = self.cache_dirs();
        let before: Vec<u64> = dirs.iter().map(|d| walker::dir_size(d)).collect();
        self.options.step(NAME, "cargo-cache --autoclean");
        self.options
            .runner
            .run(ctx, "cargo-cache", &["--autoclean"], timeouts::CARGO)?;

        for (dir, before) in dirs.iter().zip(before) {
            let freed = before.saturating_sub(walker::dir_size(dir));
            if freed > 0 {
                result.removed(SizeEstimate::known(freed));
            }
        }
        Ok(result.complete(started))
    }

    fn resources(&self) -> Vec<Resource> {
        self.cargo_home
            .iter()
            .map(|h| Resource::Directory(h.clone()))
            .collect()
    }
}
