use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::time::Instant;

use tracing::debug;

use crate::cleaner::{
    CleanResult, Cleaner, CleanerOptions, Resource, ScanItem, ScanType, SizeEstimate,
};
use crate::common::errors::{ErrorCode, Result};
use crate::common::exec::Context;
use crate::profiles::loader::{OperationSettings, OperationType};
use crate::scanner::walker;

const NAME: &str = "system-cache";

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SystemCacheKind {
    Spotlight,
    Xcode,
    Cocoapods,
    Homebrew,
}

impl SystemCacheKind {
    pub fn all() -> Vec<SystemCacheKind> {
        vec![
            SystemCacheKind::Spotlight,
            SystemCacheKind::Xcode,
            SystemCacheKind::Cocoapods,
            SystemCacheKind::Homebrew,
        ]
    }

    /// Location relative to home.
    pub fn relative_path(self) -> &'static str {
        match self {
            SystemCacheKind::Spotlight => "Library/Metadata/CoreSpotlight",
            SystemCacheKind::Xcode => "Library/Developer/Xcode/DerivedData",
            SystemCacheKind::Cocoapods => "Library/Caches/CocoaPods",
            SystemCacheKind::Homebrew => "Library/Caches/Homebrew",
        }
    }
}

/// Removes well-known macOS developer caches under `~/Library`.
#[derive(Debug)]
pub struct SystemCacheCleaner {
    options: CleanerOptions,
    kinds: Vec<SystemCacheKind>,
}

impl SystemCacheCleaner {
    pub fn new(options: CleanerOptions, kinds: Vec<SystemCacheKind>) -> Self {
        Self { options, kinds }
    }

    pub fn from_settings(
        options: CleanerOptions,
        settings: Option<&OperationSettings>,
    ) -> Result<Self> {
        match settings {
            None => Ok(Self::new(options, SystemCacheKind::all())),
            Some(OperationSettings::SystemCache { types }) => {
                Ok(Self::new(options, types.clone()))
            }
            Some(other) => Err(other.mismatch(NAME)),
        }
    }

    fn paths(&self) -> Vec<PathBuf> {
        match self.options.home.as_deref() {
            Some(home) => self
                .kinds
                .iter()
                .map(|k| home.join(k.relative_path()))
                .collect(),
            None => Vec::new(),
        }
    }
}

impl Cleaner for SystemCacheCleaner {
    fn name(&self) -> &str {
        NAME
    }

    fn op_type(&self) -> OperationType {
        OperationType::SystemCache
    }

    /// macOS only.
    fn is_available(&self, _ctx: &Context) -> bool {
        cfg!(target_os = "macos")
    }

    fn validate_settings(&self, settings: Option<&OperationSettings>) -> Result<()> {
        Self::from_settings(self.options.clone(), settings).map(|_| ())
    }

    fn scan(&self, ctx: &Context) -> Result<Vec<ScanItem>> {
        ctx.check()?;
        Ok(self
            .paths()
            .into_iter()
            .filter(|p| p.exists() && !self.options.guard.is_protected(p))
            .map(|p| {
                ScanItem::new(
                    p.to_string_lossy().into_owned(),
                    walker::dir_size(&p) as i64,
                    ScanType::System,
                )
                .with_created(walker::dir_mod_time(&p))
            })
            .collect())
    }

    fn clean(&self, ctx: &Context) -> Result<CleanResult> {
        self.ensure_available(ctx)?;
        let started = Instant::now();
        let mut result = CleanResult::new(self.options.strategy(false));

        for item in self.scan(ctx)? {
            ctx.check()?;
            if self.options.dry_run {
                result.removed(SizeEstimate::known(item.size_bytes()));
                continue;
            }
            let path = Path::new(&item.path);
            match walker::remove_path(path) {
                Ok(()) => {
                    self.options.step(NAME, format!("removed {}", path.display()));
                    result.removed(SizeEstimate::known(item.size_bytes()));
                }
                Err(e) if e.is(ErrorCode::FileNotFound) => result.removed(SizeEstimate::known(0)),
                Err(e) => {
                    debug!(cleaner = NAME, "{}", e);
                    result.failed();
                }
            }
        }

        Ok(result.complete(started))
    }

    fn resources(&self) -> Vec<Resource> {
        self.paths().into_iter().map(Resource::Directory).collect()
    }
}
