use serde::{Deserialize, Serialize};
use std::path::PathBuf;
use std::time::Instant;

use tracing::warn;

use crate::cleaner::{CleanResult, Cleaner, CleanerOptions, ScanItem, ScanType, SizeEstimate};
use crate::common::errors::Result;
use crate::common::exec::Context;
use crate::profiles::loader::{OperationSettings, OperationType};
use crate::scanner::walker;

const NAME: &str = "lang-version";

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum VersionManager {
    Nvm,
    Pyenv,
    Rbenv,
}

impl VersionManager {
    pub fn all() -> Vec<VersionManager> {
        vec![VersionManager::Nvm, VersionManager::Pyenv, VersionManager::Rbenv]
    }

    /// Glob, relative to home, matching one directory per installed version.
    fn version_glob(self) -> &'static str {
        match self {
            VersionManager::Nvm => "~/.nvm/versions/*/*",
            VersionManager::Pyenv => "~/.pyenv/versions/*",
            VersionManager::Rbenv => "~/.rbenv/versions/*",
        }
    }

    fn root(self) -> &'static str {
        match self {
            VersionManager::Nvm => ".nvm/versions",
            VersionManager::Pyenv => ".pyenv/versions",
            VersionManager::Rbenv => ".rbenv/versions",
        }
    }
}

/// Reports installed toolchain versions.
///
/// `clean` never deletes: which versions are still in use cannot be
/// decided reliably, so removal is left to the user.
#[derive(Debug)]
pub struct LangVersionCleaner {
    options: CleanerOptions,
    managers: Vec<VersionManager>,
}

impl LangVersionCleaner {
    pub fn new(options: CleanerOptions, managers: Vec<VersionManager>) -> Self {
        Self { options, managers }
    }

    pub fn from_settings(
        options: CleanerOptions,
        settings: Option<&OperationSettings>,
    ) -> Result<Self> {
        match settings {
            None => Ok(Self::new(options, VersionManager::all())),
            Some(OperationSettings::LangVersion { managers }) => {
                Ok(Self::new(options, managers.clone()))
            }
            Some(other) => Err(other.mismatch(NAME)),
        }
    }

    fn version_dirs(&self) -> Vec<PathBuf> {
        let home = match self.options.home.as_deref() {
            Some(home) => home,
            None => return Vec::new(),
        };
        let globs: Vec<String> = self
            .managers
            .iter()
            .map(|m| m.version_glob().to_string())
            .collect();
        walker::expand_paths(&globs, home)
            .into_iter()
            .filter(|p| p.is_dir())
            .collect()
    }
}

impl Cleaner for LangVersionCleaner {
    fn name(&self) -> &str {
        NAME
    }

    fn op_type(&self) -> OperationType {
        OperationType::LangVersion
    }

    fn is_available(&self, _ctx: &Context) -> bool {
        self.options.home.as_deref().map_or(false, |home| {
            self.managers.iter().any(|m| home.join(m.root()).is_dir())
        })
    }

    fn validate_settings(&self, settings: Option<&OperationSettings>) -> Result<()> {
        Self::from_settings(self.options.clone(), settings).map(|_| ())
    }

    fn scan(&self, ctx: &Context) -> Result<Vec<ScanItem>> {
        ctx.check()?;
        Ok(self
            .version_dirs()
            .into_iter()
            .map(|p| {
                ScanItem::new(
                    p.to_string_lossy().into_owned(),
                    walker::dir_size(&p) as i64,
                    ScanType::Config,
                )
                .with_created(walker::dir_mod_time(&p))
            })
            .collect())
    }

    fn clean(&self, ctx: &Context) -> Result<CleanResult> {
        self.ensure_available(ctx)?;
        let started = Instant::now();
        let found = self.version_dirs().len();
        warn!(
            cleaner = NAME,
            versions = found,
            "removing toolchain versions is destructive, manual action required"
        );
        let mut result = CleanResult::new(self.options.strategy(false));
        result.size_estimate = SizeEstimate::known(0);
        Ok(result.complete(started))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[test]
    fn test_clean_is_a_no_op() {
        let home = TempDir::new().unwrap();
        let v = home.path().join(".pyenv/versions/3.11.4");
        std::fs::create_dir_all(&v).unwrap();
        std::fs::write(v.join("python"), b"bin").unwrap();
        let nvm = home.path().join(".nvm/versions/node/v20.1.0");
        std::fs::create_dir_all(&nvm).unwrap();

        let options = CleanerOptions::new(false, false).with_home(home.path());
        let cleaner = LangVersionCleaner::new(options, VersionManager::all());
        let ctx = Context::background();

        assert_eq!(cleaner.scan(&ctx).unwrap().len(), 2);
        let result = cleaner.clean(&ctx).unwrap();
        assert_eq!(result.items_removed, 0);
        assert_eq!(result.size_estimate, SizeEstimate::known(0));
        assert!(v.join("python").exists());
        assert!(nvm.exists());
    }
}
