use serde::{Deserialize, Serialize};
use std::path::PathBuf;
use std::str::FromStr;

use crate::cleaners::build_cache::BuildTool;
use crate::cleaners::compiled_binaries::BinaryCategory;
use crate::cleaners::docker::DockerPruneMode;
use crate::cleaners::golang::GoCacheKind;
use crate::cleaners::homebrew::HomebrewMode;
use crate::cleaners::lang_version::VersionManager;
use crate::cleaners::node::NodePackageManager;
use crate::cleaners::system_cache::SystemCacheKind;
use crate::common::errors::{ErrorCode, Result, SweepError};

/// Ordinal classification of how much harm an operation can do.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum RiskLevel {
    Low,
    Medium,
    High,
    Critical,
}

impl std::fmt::Display for RiskLevel {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            RiskLevel::Low => write!(f, "low"),
            RiskLevel::Medium => write!(f, "medium"),
            RiskLevel::High => write!(f, "high"),
            RiskLevel::Critical => write!(f, "critical"),
        }
    }
}

/// Enabled/disabled switch shared by profiles and operations.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Status {
    #[default]
    Enabled,
    Disabled,
}

impl Status {
    pub fn is_enabled(self) -> bool {
        self == Status::Enabled
    }
}

/// Every kind of cleaner the tool knows about.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum OperationType {
    NixGenerations,
    Homebrew,
    TempFiles,
    NodePackages,
    GoPackages,
    Cargo,
    BuildCache,
    Docker,
    SystemCache,
    LangVersion,
    ProjectsMgmt,
    CompiledBinaries,
    ProjectExecutables,
}

impl OperationType {
    pub const ALL: [OperationType; 13] = [
        OperationType::NixGenerations,
        OperationType::Homebrew,
        OperationType::TempFiles,
        OperationType::NodePackages,
        OperationType::GoPackages,
        OperationType::Cargo,
        OperationType::BuildCache,
        OperationType::Docker,
        OperationType::SystemCache,
        OperationType::LangVersion,
        OperationType::ProjectsMgmt,
        OperationType::CompiledBinaries,
        OperationType::ProjectExecutables,
    ];

    /// Stable name, also used as the registry key.
    pub fn as_str(self) -> &'static str {
        match self {
            OperationType::NixGenerations => "nix-generations",
            OperationType::Homebrew => "homebrew",
            OperationType::TempFiles => "temp-files",
            OperationType::NodePackages => "node-packages",
            OperationType::GoPackages => "go-packages",
            OperationType::Cargo => "cargo",
            OperationType::BuildCache => "build-cache",
            OperationType::Docker => "docker",
            OperationType::SystemCache => "system-cache",
            OperationType::LangVersion => "lang-version",
            OperationType::ProjectsMgmt => "projects-mgmt",
            OperationType::CompiledBinaries => "compiled-binaries",
            OperationType::ProjectExecutables => "project-executables",
        }
    }

    pub fn default_risk(self) -> RiskLevel {
        match self {
            OperationType::TempFiles
            | OperationType::GoPackages
            | OperationType::BuildCache
            | OperationType::LangVersion => RiskLevel::Low,
            OperationType::Homebrew
            | OperationType::NodePackages
            | OperationType::Cargo
            | OperationType::SystemCache
            | OperationType::ProjectsMgmt => RiskLevel::Medium,
            OperationType::NixGenerations
            | OperationType::Docker
            | OperationType::CompiledBinaries
            | OperationType::ProjectExecutables => RiskLevel::High,
        }
    }
}

impl std::fmt::Display for OperationType {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for OperationType {
    type Err = SweepError;

    fn from_str(s: &str) -> Result<Self> {
        OperationType::ALL
            .into_iter()
            .find(|t| t.as_str() == s)
            .ok_or_else(|| {
                SweepError::new(
                    ErrorCode::InvalidOperation,
                    format!("unknown operation type '{}'", s),
                )
            })
    }
}

// ─── Settings ─────────────────────────────────────────────────────────────────

/// Operation-specific settings, tagged by cleaner family.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum OperationSettings {
    Nix {
        #[serde(default = "default_generations")]
        generations: u32,
    },
    Homebrew {
        #[serde(default)]
        mode: HomebrewMode,
    },
    Docker {
        #[serde(default)]
        mode: DockerPruneMode,
    },
    Go {
        #[serde(default = "GoCacheKind::all")]
        caches: Vec<GoCacheKind>,
    },
    Cargo {
        #[serde(default = "default_true")]
        autoclean: bool,
    },
    Node {
        #[serde(default = "NodePackageManager::all")]
        managers: Vec<NodePackageManager>,
    },
    BuildCache {
        #[serde(default = "BuildTool::all")]
        tools: Vec<BuildTool>,
        #[serde(default)]
        older_than: Option<String>,
    },
    TempFiles {
        #[serde(default = "default_temp_age")]
        older_than: String,
        #[serde(default)]
        excludes: Vec<PathBuf>,
        #[serde(default = "default_temp_paths")]
        base_paths: Vec<PathBuf>,
    },
    SystemCache {
        #[serde(default = "SystemCacheKind::all")]
        types: Vec<SystemCacheKind>,
    },
    LangVersion {
        #[serde(default = "VersionManager::all")]
        managers: Vec<VersionManager>,
    },
    CompiledBinaries {
        #[serde(default = "default_min_size_mb")]
        min_size_mb: u64,
        #[serde(default)]
        older_than: Option<String>,
        #[serde(default)]
        base_paths: Vec<PathBuf>,
        #[serde(default = "BinaryCategory::all")]
        categories: Vec<BinaryCategory>,
        #[serde(default)]
        exclude_patterns: Vec<String>,
    },
}

impl OperationSettings {
    /// Short family name used in error messages.
    pub fn kind(&self) -> &'static str {
        match self {
            OperationSettings::Nix { .. } => "nix",
            OperationSettings::Homebrew { .. } => "homebrew",
            OperationSettings::Docker { .. } => "docker",
            OperationSettings::Go { .. } => "go",
            OperationSettings::Cargo { .. } => "cargo",
            OperationSettings::Node { .. } => "node",
            OperationSettings::BuildCache { .. } => "build_cache",
            OperationSettings::TempFiles { .. } => "temp_files",
            OperationSettings::SystemCache { .. } => "system_cache",
            OperationSettings::LangVersion { .. } => "lang_version",
            OperationSettings::CompiledBinaries { .. } => "compiled_binaries",
        }
    }

    /// Error for settings handed to the wrong cleaner.
    pub fn mismatch(&self, expected: &str) -> SweepError {
        SweepError::invalid_config(format!(
            "settings of kind '{}' do not apply to {}",
            self.kind(),
            expected
        ))
    }
}

fn default_true() -> bool {
    true
}
fn default_generations() -> u32 {
    5
}
fn default_temp_age() -> String {
    "7d".to_string()
}
fn default_temp_paths() -> Vec<PathBuf> {
    vec![PathBuf::from("/tmp")]
}
fn default_min_size_mb() -> u64 {
    10
}

// ─── Operations and profiles ──────────────────────────────────────────────────

/// A profile's leaf entry.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct CleanupOperation {
    pub name: String,
    #[serde(default)]
    pub description: String,
    pub risk_level: RiskLevel,
    #[serde(default)]
    pub status: Status,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub settings: Option<OperationSettings>,
}

impl CleanupOperation {
    /// An enabled operation with the type's default risk.
    pub fn new(op: OperationType, description: &str) -> Self {
        Self {
            name: op.as_str().to_string(),
            description: description.to_string(),
            risk_level: op.default_risk(),
            status: Status::Enabled,
            settings: None,
        }
    }

    pub fn with_settings(mut self, settings: OperationSettings) -> Self {
        self.settings = Some(settings);
        self
    }

    pub fn with_risk(mut self, risk: RiskLevel) -> Self {
        self.risk_level = risk;
        self
    }

    pub fn op_type(&self) -> Result<OperationType> {
        self.name.parse()
    }

    pub fn is_enabled(&self) -> bool {
        self.status.is_enabled()
    }
}

/// A named, ordered collection of cleanup operations.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct Profile {
    pub name: String,
    #[serde(default)]
    pub description: String,
    #[serde(default)]
    pub status: Status,
    #[serde(default)]
    pub operations: Vec<CleanupOperation>,
}

impl Profile {
    pub fn new(name: &str, description: &str, operations: Vec<CleanupOperation>) -> Self {
        Self {
            name: name.to_string(),
            description: description.to_string(),
            status: Status::Enabled,
            operations,
        }
    }

    pub fn is_enabled(&self) -> bool {
        self.status.is_enabled()
    }

    pub fn enabled_operations(&self) -> impl Iterator<Item = &CleanupOperation> {
        self.operations.iter().filter(|op| op.is_enabled())
    }

    /// Highest risk among enabled operations.
    pub fn max_risk(&self) -> Option<RiskLevel> {
        self.enabled_operations().map(|op| op.risk_level).max()
    }
}

/// Built-in profile definitions
pub fn builtin_profiles() -> Vec<Profile> {
    vec![
        Profile::new(
            "quick",
            "Fast daily cleanup: old temp files, test caches, Homebrew downloads",
            vec![
                CleanupOperation::new(OperationType::TempFiles, "Temp files older than a week")
                    .with_settings(OperationSettings::TempFiles {
                        older_than: default_temp_age(),
                        excludes: Vec::new(),
                        base_paths: default_temp_paths(),
                    }),
                CleanupOperation::new(OperationType::GoPackages, "Go test and build caches")
                    .with_settings(OperationSettings::Go {
                        caches: vec![GoCacheKind::TestCache, GoCacheKind::BuildCache],
                    }),
                CleanupOperation::new(OperationType::Homebrew, "Prune the Homebrew download cache")
                    .with_settings(OperationSettings::Homebrew {
                        mode: HomebrewMode::Cleanup,
                    }),
            ],
        ),
        Profile::new(
            "developer",
            "Developer caches: package managers, build tools, stopped containers",
            vec![
                CleanupOperation::new(OperationType::TempFiles, "Temp files older than a week"),
                CleanupOperation::new(OperationType::GoPackages, "Go build, test and lint caches")
                    .with_settings(OperationSettings::Go {
                        caches: vec![
                            GoCacheKind::GoCache,
                            GoCacheKind::TestCache,
                            GoCacheKind::BuildCache,
                            GoCacheKind::LintCache,
                        ],
                    }),
                CleanupOperation::new(OperationType::Cargo, "Cargo registry and git caches"),
                CleanupOperation::new(OperationType::NodePackages, "npm/pnpm/yarn/bun caches"),
                CleanupOperation::new(OperationType::BuildCache, "Gradle, Maven and SBT caches"),
                CleanupOperation::new(OperationType::Docker, "Stopped containers")
                    .with_risk(RiskLevel::Medium)
                    .with_settings(OperationSettings::Docker {
                        mode: DockerPruneMode::Containers,
                    }),
                CleanupOperation::new(OperationType::SystemCache, "macOS developer caches"),
                CleanupOperation::new(OperationType::LangVersion, "Report unused toolchain versions"),
            ],
        ),
        Profile::new(
            "aggressive",
            "Everything reclaimable, including Nix generations and all Docker data",
            vec![
                CleanupOperation::new(OperationType::NixGenerations, "Old Nix generations")
                    .with_settings(OperationSettings::Nix { generations: 3 }),
                CleanupOperation::new(OperationType::Homebrew, "Unused formulae and cache")
                    .with_settings(OperationSettings::Homebrew {
                        mode: HomebrewMode::All,
                    }),
                CleanupOperation::new(OperationType::Docker, "All unused Docker data")
                    .with_settings(OperationSettings::Docker {
                        mode: DockerPruneMode::All,
                    }),
                CleanupOperation::new(OperationType::GoPackages, "Every Go cache")
                    .with_risk(RiskLevel::High),
                CleanupOperation::new(OperationType::Cargo, "Cargo caches"),
                CleanupOperation::new(OperationType::NodePackages, "Package manager caches"),
                CleanupOperation::new(OperationType::BuildCache, "JVM build caches"),
                CleanupOperation::new(OperationType::TempFiles, "Temp files older than a day")
                    .with_settings(OperationSettings::TempFiles {
                        older_than: "1d".to_string(),
                        excludes: Vec::new(),
                        base_paths: default_temp_paths(),
                    }),
                CleanupOperation::new(OperationType::SystemCache, "macOS caches"),
                CleanupOperation::new(OperationType::ProjectsMgmt, "Project automation cache"),
                CleanupOperation::new(OperationType::CompiledBinaries, "Large stale binaries")
                    .with_settings(OperationSettings::CompiledBinaries {
                        min_size_mb: default_min_size_mb(),
                        older_than: Some("1m".to_string()),
                        base_paths: Vec::new(),
                        categories: BinaryCategory::all(),
                        exclude_patterns: Vec::new(),
                    }),
            ],
        ),
    ]
}
