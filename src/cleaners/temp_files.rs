use std::path::{Path, PathBuf};
use std::time::{Duration, Instant, SystemTime};

use rayon::prelude::*;
use tracing::debug;
use walkdir::WalkDir;

use crate::cleaner::{CleanResult, Cleaner, CleanerOptions, Resource, ScanItem, ScanType, SizeEstimate};
use crate::common::errors::{ErrorCode, Result, SweepError};
use crate::common::exec::Context;
use crate::profiles::loader::{OperationSettings, OperationType};
use crate::scanner::{parse, walker};

const NAME: &str = "temp-files";

/// Removes stale regular files under the configured temp roots.
///
/// Directories are never removed, only the files inside them.
#[derive(Debug)]
pub struct TempFilesCleaner {
    options: CleanerOptions,
    older_than: Duration,
    excludes: Vec<PathBuf>,
    base_paths: Vec<PathBuf>,
}

impl TempFilesCleaner {
    /// Fails here if `older_than` is not a valid duration.
    pub fn new(
        options: CleanerOptions,
        older_than: &str,
        excludes: Vec<PathBuf>,
        base_paths: Vec<PathBuf>,
    ) -> Result<Self> {
        let age = parse::parse_duration(older_than)?;
        let older_than = age.to_std().map_err(|_| {
            SweepError::validation(format!("older_than must not be negative: {}", older_than))
        })?;
        Ok(Self {
            options,
            older_than,
            excludes,
            base_paths,
        })
    }

    pub fn from_settings(
        options: CleanerOptions,
        settings: Option<&OperationSettings>,
    ) -> Result<Self> {
        match settings {
            None => Self::new(options, "7d", Vec::new(), vec![PathBuf::from("/tmp")]),
            Some(OperationSettings::TempFiles {
                older_than,
                excludes,
                base_paths,
            }) => Self::new(options, older_than, excludes.clone(), base_paths.clone()),
            Some(other) => Err(other.mismatch(NAME)),
        }
    }

    pub fn older_than(&self) -> Duration {
        self.older_than
    }

    fn is_stale(&self, modified: SystemTime, now: SystemTime) -> bool {
        now.duration_since(modified)
            .map_or(false, |age| age > self.older_than)
    }

    fn scan_root(&self, root: &Path, now: SystemTime) -> Vec<ScanItem> {
        WalkDir::new(root)
            .follow_links(false)
            .into_iter()
            .filter_entry(|e| !walker::is_excluded(e.path(), &self.excludes))
            .filter_map(|e| e.ok())
            .filter(|e| e.file_type().is_file())
            .filter(|e| !self.options.guard.is_protected(e.path()))
            .filter_map(|e| {
                let meta = e.metadata().ok()?;
                let modified = meta.modified().ok()?;
                self.is_stale(modified, now).then(|| {
                    ScanItem::new(
                        e.path().to_string_lossy().into_owned(),
                        meta.len() as i64,
                        ScanType::Temp,
                    )
                    .with_created(Some(modified))
                })
            })
            .collect()
    }
}

impl Cleaner for TempFilesCleaner {
    fn name(&self) -> &str {
        NAME
    }

    fn op_type(&self) -> OperationType {
        OperationType::TempFiles
    }

    fn is_available(&self, _ctx: &Context) -> bool {
        true
    }

    fn validate_settings(&self, settings: Option<&OperationSettings>) -> Result<()> {
        Self::from_settings(self.options.clone(), settings).map(|_| ())
    }

    fn scan(&self, ctx: &Context) -> Result<Vec<ScanItem>> {
        ctx.check()?;
        let now = SystemTime::now();
        let items: Vec<ScanItem> = self
            .base_paths
            .par_iter()
            .flat_map(|root| self.scan_root(root, now))
            .collect();
        debug!(cleaner = NAME, count = items.len(), "scan complete");
        Ok(items)
    }

    fn clean(&self, ctx: &Context) -> Result<CleanResult> {
        self.ensure_available(ctx)?;
        let started = Instant::now();
        let mut result = CleanResult::new(self.options.strategy(false));

        for item in self.scan(ctx)? {
            ctx.check()?;
            let path = Path::new(&item.path);

            if self.options.dry_run {
                result.removed(SizeEstimate::known(item.size_bytes()));
                continue;
            }

            match std::fs::remove_file(path) {
                Ok(()) => {
                    self.options.step(NAME, format!("removed {}", path.display()));
                    result.removed(SizeEstimate::known(item.size_bytes()));
                }
                Err(e) => {
                    let err = SweepError::from_io(path, e);
                    if err.is(ErrorCode::FileNotFound) {
                        // Vanished since the scan: already gone is success.
                        result.removed(SizeEstimate::known(0));
                    } else {
                        debug!(cleaner = NAME, "failed to remove: {}", err);
                        result.failed();
                    }
                }
            }
        }

        Ok(result.complete(started))
    }

    fn resources(&self) -> Vec<Resource> {
        self.base_paths
            .iter()
            .map(|p| Resource::Directory(walker::normalize(p)))
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_invalid_duration_fails_at_construction() {
        let err = TempFilesCleaner::new(CleanerOptions::default(), "soon", vec![], vec![])
            .unwrap_err();
        assert!(err.is(ErrorCode::InvalidFormat));
    }

    #[test]
    fn test_negative_duration_rejected() {
        assert!(TempFilesCleaner::new(CleanerOptions::default(), "-1d", vec![], vec![]).is_err());
    }

    #[test]
    fn test_wrong_settings_kind_rejected() {
        let err = TempFilesCleaner::from_settings(
            CleanerOptions::default(),
            Some(&OperationSettings::Cargo { autoclean: true }),
        )
        .unwrap_err();
        assert!(err.is(ErrorCode::InvalidConfig));
    }

    #[test]
    fn test_default_settings() {
        let cleaner = TempFilesCleaner::from_settings(CleanerOptions::default(), None).unwrap();
        assert_eq!(cleaner.older_than(), Duration::from_secs(7 * 86_400));
        assert!(cleaner.validate_settings(None).is_ok());
    }
}
