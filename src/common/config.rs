use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::path::{Path, PathBuf};
use std::str::FromStr;

use super::errors::{ErrorCode, Result, SweepError};
use super::safety::DEFAULT_PROTECTED;
use crate::cleaner::registry::{default_registry_with, Registry};
use crate::profiles::loader::{builtin_profiles, OperationType, Profile, Status};

/// Whether the risk gate is active.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SafetyLevel {
    #[default]
    Enabled,
    Disabled,
}

/// How much of `Config` to check before a run.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ValidationLevel {
    None,
    Basic,
    #[default]
    Comprehensive,
    Strict,
}

impl FromStr for ValidationLevel {
    type Err = SweepError;

    fn from_str(s: &str) -> Result<Self> {
        match s.to_ascii_lowercase().as_str() {
            "none" => Ok(ValidationLevel::None),
            "basic" => Ok(ValidationLevel::Basic),
            "comprehensive" => Ok(ValidationLevel::Comprehensive),
            "strict" => Ok(ValidationLevel::Strict),
            _ => Err(SweepError::invalid_format(format!(
                "unknown validation level '{}'",
                s
            ))),
        }
    }
}

/// Root configuration document
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct Config {
    /// Semantic version of the document
    pub version: String,

    #[serde(default)]
    pub safety_level: SafetyLevel,

    /// Disk usage percentage ceiling
    #[serde(default = "default_max_disk_usage")]
    pub max_disk_usage: u8,

    /// Paths that must never be cleaned
    #[serde(default)]
    pub protected: Vec<PathBuf>,

    #[serde(default)]
    pub user_protected: Vec<PathBuf>,

    #[serde(default)]
    pub profiles: BTreeMap<String, Profile>,

    #[serde(default)]
    pub current_profile: String,

    #[serde(default = "Utc::now")]
    pub updated: DateTime<Utc>,
}

fn default_max_disk_usage() -> u8 {
    90
}

impl Default for Config {
    fn default() -> Self {
        Self {
            version: "1.0.0".to_string(),
            safety_level: SafetyLevel::Enabled,
            max_disk_usage: default_max_disk_usage(),
            protected: DEFAULT_PROTECTED.iter().map(PathBuf::from).collect(),
            user_protected: Vec::new(),
            profiles: builtin_profiles()
                .into_iter()
                .map(|p| (p.name.clone(), p))
                .collect(),
            current_profile: "quick".to_string(),
            updated: Utc::now(),
        }
    }
}

impl Config {
    /// Get the devsweep data directory (~/.devsweep)
    pub fn data_dir() -> Result<PathBuf> {
        Ok(crate::scanner::walker::home_dir()?.join(".devsweep"))
    }

    /// Get the config file path
    pub fn default_path() -> Result<PathBuf> {
        Ok(Self::data_dir()?.join("config.yaml"))
    }

    /// Load config from a YAML file
    pub fn load_from(path: &Path) -> Result<Self> {
        let contents =
            std::fs::read_to_string(path).map_err(|e| SweepError::from_io(path, e))?;
        Self::from_yaml(&contents).map_err(|e| e.with_details("path", path.display().to_string()))
    }

    /// Load config from file, or fall back to defaults if it does not exist
    pub fn load_or_default(path: &Path) -> Result<Self> {
        if path.exists() {
            Self::load_from(path)
        } else {
            Ok(Self::default())
        }
    }

    pub fn from_yaml(contents: &str) -> Result<Self> {
        serde_yaml::from_str(contents).map_err(|e| {
            SweepError::invalid_config(format!("failed to parse config: {}", e)).with_cause(e)
        })
    }

    pub fn to_yaml(&self) -> Result<String> {
        serde_yaml::to_string(self).map_err(|e| {
            SweepError::invalid_config(format!("failed to serialize config: {}", e)).with_cause(e)
        })
    }

    /// Save config atomically: write a sibling temp file, then rename over.
    pub fn save_to(&self, path: &Path) -> Result<()> {
        if let Some(dir) = path.parent() {
            if !dir.as_os_str().is_empty() {
                std::fs::create_dir_all(dir).map_err(|e| SweepError::from_io(dir, e))?;
            }
        }
        let contents = self.to_yaml()?;
        let mut tmp_name = path.as_os_str().to_owned();
        tmp_name.push(".tmp");
        let tmp = PathBuf::from(tmp_name);

        std::fs::write(&tmp, contents).map_err(|e| SweepError::from_io(&tmp, e))?;
        std::fs::rename(&tmp, path).map_err(|e| {
            let _ = std::fs::remove_file(&tmp);
            SweepError::from_io(path, e)
        })
    }

    /// Every protected path, system and user supplied.
    pub fn all_protected(&self) -> impl Iterator<Item = &PathBuf> {
        self.protected.iter().chain(self.user_protected.iter())
    }

    pub fn profile(&self, name: &str) -> Result<&Profile> {
        self.profiles.get(name).ok_or_else(|| {
            SweepError::new(
                ErrorCode::MissingProfile,
                format!("profile '{}' not found", name),
            )
            .with_details("profile", name)
        })
    }

    fn profile_mut(&mut self, name: &str) -> Result<&mut Profile> {
        self.profiles.get_mut(name).ok_or_else(|| {
            SweepError::new(
                ErrorCode::MissingProfile,
                format!("profile '{}' not found", name),
            )
            .with_details("profile", name)
        })
    }

    /// The selected profile, if one is set.
    pub fn current(&self) -> Option<&Profile> {
        if self.current_profile.is_empty() {
            None
        } else {
            self.profiles.get(&self.current_profile)
        }
    }

    fn touch(&mut self) {
        self.updated = Utc::now();
    }

    // ─── Profile lifecycle ───────────────────────────────────────────────────

    pub fn select_profile(&mut self, name: &str) -> Result<()> {
        if !self.profile(name)?.is_enabled() {
            return Err(SweepError::new(
                ErrorCode::InvalidOperation,
                format!("profile '{}' is disabled and cannot be selected", name),
            ));
        }
        self.current_profile = name.to_string();
        self.touch();
        Ok(())
    }

    pub fn delete_profile(&mut self, name: &str) -> Result<Profile> {
        if self.current_profile == name {
            return Err(SweepError::new(
                ErrorCode::InvalidOperation,
                format!("profile '{}' is currently selected and cannot be deleted", name),
            ));
        }
        let removed = self.profiles.remove(name).ok_or_else(|| {
            SweepError::new(
                ErrorCode::MissingProfile,
                format!("profile '{}' not found", name),
            )
        })?;
        self.touch();
        Ok(removed)
    }

    pub fn disable_profile(&mut self, name: &str) -> Result<()> {
        self.profile_mut(name)?.status = Status::Disabled;
        self.touch();
        Ok(())
    }

    pub fn enable_profile(&mut self, name: &str) -> Result<()> {
        self.profile_mut(name)?.status = Status::Enabled;
        self.touch();
        Ok(())
    }

    /// Insert or replace a profile under its own name.
    pub fn upsert_profile(&mut self, profile: Profile) {
        self.profiles.insert(profile.name.clone(), profile);
        self.touch();
    }

    pub fn add_protected(&mut self, path: PathBuf) -> Result<()> {
        if !path.is_absolute() {
            return Err(SweepError::validation(format!(
                "protected path must be absolute: {}",
                path.display()
            )));
        }
        if !self.user_protected.contains(&path) {
            self.user_protected.push(path);
            self.touch();
        }
        Ok(())
    }

    // ─── Validation ──────────────────────────────────────────────────────────

    /// Full validation, checking operation settings against the default fleet.
    pub fn validate(&self) -> Result<()> {
        self.validate_with(&default_registry_with(false, true))
    }

    /// Validate at a runtime-chosen level.
    pub fn validate_at(&self, level: ValidationLevel, registry: &Registry) -> Result<()> {
        match level {
            ValidationLevel::None => Ok(()),
            ValidationLevel::Basic => self.validate_protected(),
            ValidationLevel::Comprehensive => self.validate_with(registry),
            ValidationLevel::Strict => {
                self.validate_with(registry)?;
                if self.safety_level != SafetyLevel::Enabled {
                    return Err(SweepError::validation(
                        "strict validation requires safety_level: enabled",
                    ));
                }
                Ok(())
            }
        }
    }

    fn validate_protected(&self) -> Result<()> {
        if self.protected.is_empty() {
            return Err(SweepError::validation("protected paths must not be empty"));
        }
        if let Some(p) = self.all_protected().find(|p| !p.is_absolute()) {
            return Err(SweepError::validation(format!(
                "protected path must be absolute: {}",
                p.display()
            )));
        }
        Ok(())
    }

    pub fn validate_with(&self, registry: &Registry) -> Result<()> {
        semver::Version::parse(&self.version).map_err(|e| {
            SweepError::validation(format!("version '{}' is not a semantic version", self.version))
                .with_cause(e)
        })?;

        self.validate_protected()?;

        if !(1..=100).contains(&self.max_disk_usage) {
            return Err(SweepError::validation(format!(
                "max_disk_usage must be between 1 and 100, got {}",
                self.max_disk_usage
            )));
        }

        if !self.current_profile.is_empty() && !self.profiles.contains_key(&self.current_profile)
        {
            return Err(SweepError::new(
                ErrorCode::MissingProfile,
                format!("current profile '{}' does not exist", self.current_profile),
            ));
        }

        for (key, profile) in &self.profiles {
            if key != &profile.name {
                return Err(SweepError::validation(format!(
                    "profile stored under '{}' is named '{}'",
                    key, profile.name
                )));
            }
            for op in &profile.operations {
                let op_type: OperationType = op.name.parse().map_err(|e: SweepError| {
                    e.with_details("profile", profile.name.as_str())
                })?;
                if let Some(cleaner) = registry.get(op_type.as_str()) {
                    cleaner
                        .validate_settings(op.settings.as_ref())
                        .map_err(|e| {
                            e.with_details("profile", profile.name.as_str())
                                .with_details("operation", op.name.as_str())
                        })?;
                }
            }
        }
        Ok(())
    }
}
