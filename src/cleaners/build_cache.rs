use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::time::{Duration, Instant, SystemTime};

use tracing::debug;
use walkdir::WalkDir;

use crate::cleaner::{
    CleanResult, Cleaner, CleanerOptions, Resource, ScanItem, ScanType, SizeEstimate,
};
use crate::common::errors::{ErrorCode, Result, SweepError};
use crate::common::exec::Context;
use crate::profiles::loader::{OperationSettings, OperationType};
use crate::scanner::{parse, walker};

const NAME: &str = "build-cache";

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum BuildTool {
    Gradle,
    Maven,
    Sbt,
}

impl BuildTool {
    pub fn all() -> Vec<BuildTool> {
        vec![BuildTool::Gradle, BuildTool::Maven, BuildTool::Sbt]
    }

    /// Cache root relative to home.
    pub fn cache_dir(self) -> &'static str {
        match self {
            BuildTool::Gradle => ".gradle/caches",
            BuildTool::Maven => ".m2/repository",
            BuildTool::Sbt => ".ivy2/cache",
        }
    }
}

/// Cleans JVM build tool caches.
///
/// Gradle and SBT lose whole cache subdirectories. Maven only loses `*.part`
/// partial downloads; installed artifacts in `~/.m2` are never touched.
#[derive(Debug)]
pub struct BuildCacheCleaner {
    options: CleanerOptions,
    tools: Vec<BuildTool>,
    older_than: Option<Duration>,
}

impl BuildCacheCleaner {
    pub fn new(
        options: CleanerOptions,
        tools: Vec<BuildTool>,
        older_than: Option<&str>,
    ) -> Result<Self> {
        let older_than = older_than
            .map(|s| {
                parse::parse_duration(s)?.to_std().map_err(|_| {
                    SweepError::validation(format!("older_than must not be negative: {}", s))
                })
            })
            .transpose()?;
        Ok(Self {
            options,
            tools,
            older_than,
        })
    }

    pub fn from_settings(
        options: CleanerOptions,
        settings: Option<&OperationSettings>,
    ) -> Result<Self> {
        match settings {
            None => Self::new(options, BuildTool::all(), None),
            Some(OperationSettings::BuildCache { tools, older_than }) => {
                Self::new(options, tools.clone(), older_than.as_deref())
            }
            Some(other) => Err(other.mismatch(NAME)),
        }
    }

    fn roots(&self) -> Vec<(BuildTool, PathBuf)> {
        match self.options.home.as_deref() {
            Some(home) => self
                .tools
                .iter()
                .map(|t| (*t, home.join(t.cache_dir())))
                .collect(),
            None => Vec::new(),
        }
    }

    fn old_enough(&self, modified: Option<SystemTime>) -> bool {
        match (self.older_than, modified) {
            (None, _) => true,
            (Some(limit), Some(m)) => walker::age_of(m) > limit,
            (Some(_), None) => false,
        }
    }

    fn scan_subdirs(&self, root: &Path) -> Vec<ScanItem> {
        let entries = match std::fs::read_dir(root) {
            Ok(entries) => entries,
            Err(_) => return Vec::new(),
        };
        entries
            .filter_map(|e| e.ok())
            .map(|e| e.path())
            .filter(|p| p.is_dir() && !self.options.guard.is_protected(p))
            .filter_map(|p| {
                let modified = walker::dir_mod_time(&p);
                self.old_enough(modified).then(|| {
                    ScanItem::new(
                        p.to_string_lossy().into_owned(),
                        walker::dir_size(&p) as i64,
                        ScanType::System,
                    )
                    .with_created(modified)
                })
            })
            .collect()
    }

    fn scan_partial_downloads(&self, root: &Path) -> Vec<ScanItem> {
        WalkDir::new(root)
            .follow_links(false)
            .into_iter()
            .filter_map(|e| e.ok())
            .filter(|e| e.file_type().is_file())
            .filter(|e| e.path().extension().map_or(false, |ext| ext == "part"))
            .filter_map(|e| {
                let meta = e.metadata().ok()?;
                let modified = meta.modified().ok();
                self.old_enough(modified).then(|| {
                    ScanItem::new(
                        e.path().to_string_lossy().into_owned(),
                        meta.len() as i64,
                        ScanType::Temp,
                    )
                    .with_created(modified)
                })
            })
            .collect()
    }
}

impl Cleaner for BuildCacheCleaner {
    fn name(&self) -> &str {
        NAME
    }

    fn op_type(&self) -> OperationType {
        OperationType::BuildCache
    }

    /// Any selected cache directory exists.
    fn is_available(&self, _ctx: &Context) -> bool {
        self.roots().iter().any(|(_, root)| root.is_dir())
    }

    fn validate_settings(&self, settings: Option<&OperationSettings>) -> Result<()> {
        Self::from_settings(self.options.clone(), settings).map(|_| ())
    }

    fn scan(&self, ctx: &Context) -> Result<Vec<ScanItem>> {
        let mut items = Vec::new();
        for (tool, root) in self.roots() {
            ctx.check()?;
            match tool {
                BuildTool::Maven => items.extend(self.scan_partial_downloads(&root)),
                BuildTool::Gradle | BuildTool::Sbt => items.extend(self.scan_subdirs(&root)),
            }
        }
        debug!(cleaner = NAME, count = items.len(), "scan complete");
        Ok(items)
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
        self.roots()
            .into_iter()
            .map(|(_, root)| Resource::Directory(root))
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::fs;
    use tempfile::TempDir;

    fn fixture() -> TempDir {
        let home = TempDir::new().unwrap();
        let h = home.path();
        fs::create_dir_all(h.join(".gradle/caches/modules-2")).unwrap();
        fs::write(h.join(".gradle/caches/modules-2/a.bin"), vec![0u8; 10]).unwrap();
        fs::create_dir_all(h.join(".m2/repository/org/foo/1.0")).unwrap();
        fs::write(h.join(".m2/repository/org/foo/1.0/foo-1.0.jar"), vec![0u8; 20]).unwrap();
        fs::write(h.join(".m2/repository/org/foo/1.0/foo-1.0.jar.part"), vec![0u8; 5]).unwrap();
        home
    }

    #[test]
    fn test_maven_only_loses_partial_downloads() {
        let home = fixture();
        let options = CleanerOptions::new(false, false).with_home(home.path());
        let cleaner = BuildCacheCleaner::new(options, BuildTool::all(), None).unwrap();
        let result = cleaner.clean(&Context::background()).unwrap();

        assert_eq!(result.items_removed, 2);
        assert_eq!(result.size_estimate, SizeEstimate::known(15));
        let repo = home.path().join(".m2/repository/org/foo/1.0");
        assert!(repo.join("foo-1.0.jar").exists());
        assert!(!repo.join("foo-1.0.jar.part").exists());
        assert!(!home.path().join(".gradle/caches/modules-2").exists());
        assert!(home.path().join(".gradle/caches").exists());
    }

    #[test]
    fn test_dry_run_removes_nothing() {
        let home = fixture();
        let options = CleanerOptions::new(false, true).with_home(home.path());
        let cleaner = BuildCacheCleaner::new(options, BuildTool::all(), None).unwrap();
        let result = cleaner.clean(&Context::background()).unwrap();
        assert!(result.is_dry_run());
        assert_eq!(result.items_removed, 2);
        assert!(home.path().join(".m2/repository/org/foo/1.0/foo-1.0.jar.part").exists());
        assert!(home.path().join(".gradle/caches/modules-2").exists());
    }

    #[test]
    fn test_age_filter_skips_fresh_entries() {
        let home = fixture();
        let options = CleanerOptions::new(false, true).with_home(home.path());
        let cleaner = BuildCacheCleaner::new(options, BuildTool::all(), Some("30d")).unwrap();
        assert!(cleaner.scan(&Context::background()).unwrap().is_empty());
    }

    #[test]
    fn test_invalid_age_fails_construction() {
        assert!(BuildCacheCleaner::new(CleanerOptions::default(), vec![], Some("x")).is_err());
    }
}
