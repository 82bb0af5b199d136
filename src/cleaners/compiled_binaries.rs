use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::time::{Duration, Instant};

use rayon::prelude::*;
use tracing::{debug, warn};
use walkdir::{DirEntry, WalkDir};

use crate::cleaner::{
    AvailabilityCache, CleanResult, Cleaner, CleanerOptions, Resource, ScanItem, ScanType,
    SizeEstimate,
};
use crate::common::errors::{ErrorCode, Result, SweepError};
use crate::common::exec::{timeouts, Context};
use crate::profiles::loader::{OperationSettings, OperationType};
use crate::scanner::{parse, walker};

const MB: u64 = 1024 * 1024;

/// Directories never descended into
pub const EXCLUDED_DIRS: &[&str] = &[
    "node_modules",
    ".venv",
    ".git",
    ".terraform",
    "__pycache__",
    ".hg",
    ".svn",
];

/// Binaries kept even when large: browser drivers are downloaded on purpose.
pub const EXCLUDED_NAME_PARTS: &[&str] = &["chromedriver", "geckodriver", "edgedriver"];

/// Project roots under home searched when none are configured
const DEFAULT_ROOTS: &[&str] = &["projects", "src", "code", "dev", "workspace", "go/src"];

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum BinaryCategory {
    Test,
    Tmp,
    Bin,
    Dist,
    Root,
}

impl BinaryCategory {
    pub fn all() -> Vec<BinaryCategory> {
        vec![
            BinaryCategory::Test,
            BinaryCategory::Tmp,
            BinaryCategory::Bin,
            BinaryCategory::Dist,
            BinaryCategory::Root,
        ]
    }

    /// First matching rule wins. `relative` is the path below the project
    /// root, so where the root itself lives does not matter.
    pub fn of(relative: &Path) -> BinaryCategory {
        let name = relative
            .file_name()
            .map(|n| n.to_string_lossy().into_owned())
            .unwrap_or_default();
        let path = format!("/{}", relative.to_string_lossy());

        if name.ends_with(".test") {
            BinaryCategory::Test
        } else if path.contains("/tmp/") {
            BinaryCategory::Tmp
        } else if path.contains("/bin/") {
            BinaryCategory::Bin
        } else if path.contains("/dist/") {
            BinaryCategory::Dist
        } else {
            BinaryCategory::Root
        }
    }
}

/// Finds large, executable build outputs in project trees and moves them to
/// the trash with the external `trash` command.
#[derive(Debug)]
pub struct CompiledBinariesCleaner {
    options: CleanerOptions,
    op_type: OperationType,
    min_size: u64,
    older_than: Option<Duration>,
    base_paths: Vec<PathBuf>,
    categories: Vec<BinaryCategory>,
    exclude_patterns: Vec<glob::Pattern>,
    available: AvailabilityCache,
}

impl CompiledBinariesCleaner {
    pub fn new(
        options: CleanerOptions,
        min_size_mb: u64,
        older_than: Option<&str>,
        base_paths: Vec<PathBuf>,
        categories: Vec<BinaryCategory>,
        exclude_patterns: &[String],
    ) -> Result<Self> {
        let older_than = older_than
            .map(|s| {
                parse::parse_duration(s)?.to_std().map_err(|_| {
                    SweepError::validation(format!("older_than must not be negative: {}", s))
                })
            })
            .transpose()?;
        let exclude_patterns = exclude_patterns
            .iter()
            .map(|p| {
                glob::Pattern::new(p).map_err(|e| {
                    SweepError::invalid_config(format!("invalid exclude pattern '{}': {}", p, e))
                        .with_cause(e)
                })
            })
            .collect::<Result<Vec<_>>>()?;

        Ok(Self {
            options,
            op_type: OperationType::CompiledBinaries,
            min_size: min_size_mb.saturating_mul(MB),
            older_than,
            base_paths,
            categories,
            exclude_patterns,
            available: AvailabilityCache::default(),
        })
    }

    pub fn from_settings(
        options: CleanerOptions,
        settings: Option<&OperationSettings>,
    ) -> Result<Self> {
        match settings {
            None => Self::new(options, 10, None, Vec::new(), BinaryCategory::all(), &[]),
            Some(OperationSettings::CompiledBinaries {
                min_size_mb,
                older_than,
                base_paths,
                categories,
                exclude_patterns,
            }) => Self::new(
                options,
                *min_size_mb,
                older_than.as_deref(),
                base_paths.clone(),
                categories.clone(),
                exclude_patterns,
            ),
            Some(other) => Err(other.mismatch(OperationType::CompiledBinaries.as_str())),
        }
    }

    /// The `project-executables` preset: stray executables at project roots.
    pub fn project_executables_from_settings(
        options: CleanerOptions,
        settings: Option<&OperationSettings>,
    ) -> Result<Self> {
        let mut cleaner = match settings {
            None => Self::new(options, 10, None, Vec::new(), vec![BinaryCategory::Root], &[])?,
            Some(_) => Self::from_settings(options, settings)?,
        };
        cleaner.op_type = OperationType::ProjectExecutables;
        Ok(cleaner)
    }

    fn roots(&self) -> Vec<PathBuf> {
        if !self.base_paths.is_empty() {
            return self.base_paths.clone();
        }
        match self.options.home.as_deref() {
            Some(home) => DEFAULT_ROOTS.iter().map(|r| home.join(r)).collect(),
            None => Vec::new(),
        }
    }

    fn is_excluded_by_pattern(&self, path: &Path) -> bool {
        let name = path.file_name().map(|n| n.to_string_lossy());
        self.exclude_patterns.iter().any(|p| {
            p.matches_path(path) || name.as_deref().map_or(false, |n| p.matches(n))
        })
    }

    fn descend(&self, entry: &DirEntry) -> bool {
        if entry.depth() > 0 && entry.file_type().is_dir() {
            let name = entry.file_name().to_string_lossy();
            if EXCLUDED_DIRS.contains(&name.as_ref()) {
                return false;
            }
        }
        !self.is_excluded_by_pattern(entry.path())
    }

    fn candidate(&self, root: &Path, entry: &DirEntry) -> Option<ScanItem> {
        if !entry.file_type().is_file() {
            return None;
        }
        let meta = entry.metadata().ok()?;
        if meta.len() < self.min_size || !is_executable(&meta) {
            return None;
        }
        let name = entry.file_name().to_string_lossy().to_lowercase();
        if EXCLUDED_NAME_PARTS.iter().any(|part| name.contains(part)) {
            return None;
        }
        let relative = entry.path().strip_prefix(root).unwrap_or(entry.path());
        if !self.categories.contains(&BinaryCategory::of(relative)) {
            return None;
        }
        let modified = meta.modified().ok();
        if let Some(limit) = self.older_than {
            if modified.map_or(true, |m| walker::age_of(m) <= limit) {
                return None;
            }
        }
        if self.options.guard.is_protected(entry.path()) {
            return None;
        }
        Some(
            ScanItem::new(
                entry.path().to_string_lossy().into_owned(),
                meta.len() as i64,
                ScanType::Temp,
            )
            .with_created(modified),
        )
    }

    fn scan_root(&self, root: &Path) -> Vec<ScanItem> {
        if !root.is_dir() {
            return Vec::new();
        }
        WalkDir::new(root)
            .follow_links(false)
            .into_iter()
            .filter_entry(|e| self.descend(e))
            .filter_map(|e| e.ok())
            .filter_map(|e| self.candidate(root, &e))
            .collect()
    }
}

#[cfg(unix)]
fn is_executable(meta: &std::fs::Metadata) -> bool {
    use std::os::unix::fs::PermissionsExt;
    meta.permissions().mode() & 0o111 != 0
}

#[cfg(not(unix))]
fn is_executable(_meta: &std::fs::Metadata) -> bool {
    false
}

impl Cleaner for CompiledBinariesCleaner {
    fn name(&self) -> &str {
        self.op_type.as_str()
    }

    fn op_type(&self) -> OperationType {
        self.op_type
    }

    /// Deletion goes through `trash`, so it must be installed.
    fn is_available(&self, _ctx: &Context) -> bool {
        self.available
            .get_or_probe(|| self.options.runner.is_installed("trash"))
    }

    fn validate_settings(&self, settings: Option<&OperationSettings>) -> Result<()> {
        Self::from_settings(self.options.clone(), settings).map(|_| ())
    }

    fn scan(&self, ctx: &Context) -> Result<Vec<ScanItem>> {
        ctx.check()?;
        let items: Vec<ScanItem> = self
            .roots()
            .par_iter()
            .flat_map(|root| self.scan_root(root))
            .collect();
        debug!(cleaner = self.name(), count = items.len(), "scan complete");
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
            self.options.step(self.name(), format!("trashing {}", item.path));
            match self
                .options
                .runner
                .run(ctx, "trash", &[item.path.as_str()], timeouts::TRASH)
            {
                Ok(_) => result.removed(SizeEstimate::known(item.size_bytes())),
                Err(e) if e.is(ErrorCode::Timeout) || e.is(ErrorCode::Cancelled) => return Err(e),
                Err(e) => {
                    warn!(cleaner = self.name(), "{}", e);
                    result.failed();
                }
            }
        }

        Ok(result.complete(started))
    }

    fn resources(&self) -> Vec<Resource> {
        self.roots().into_iter().map(Resource::Directory).collect()
    }
}
