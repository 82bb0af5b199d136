use std::path::{Path, PathBuf};

use super::config::SafetyLevel;
use super::errors::{ErrorCode, Result, SweepError};
use crate::profiles::loader::RiskLevel;
use crate::scanner::walker::normalize;

/// System paths protected by default in a fresh config.
pub const DEFAULT_PROTECTED: &[&str] = &[
    "/System",
    "/Applications",
    "/Library",
    "/usr",
    "/bin",
    "/sbin",
    "/etc",
    "/boot",
    "/nix/store",
];

/// Paths under home whose contents must never be touched
const PROTECTED_HOME_TREES: &[&str] = &[".ssh", ".gnupg"];

/// Paths under home that must never be deleted entirely
const PROTECTED_HOME_DIRS: &[&str] = &[
    "", // home dir itself
    "Desktop",
    "Documents",
    "Downloads",
    "Pictures",
    "Music",
    "Movies",
    "Library",
    "Applications",
];

/// Decides whether a path may be removed.
///
/// `trees` protect the path, everything below it and every ancestor.
/// `exact` entries protect only themselves and their ancestors, so caches
/// nested inside (e.g. `~/Library/Caches/...`) stay cleanable.
#[derive(Debug, Clone, Default)]
pub struct SafetyGuard {
    trees: Vec<PathBuf>,
    exact: Vec<PathBuf>,
}

impl SafetyGuard {
    /// A guard that only refuses the filesystem root.
    pub fn permissive() -> Self {
        Self {
            trees: Vec::new(),
            exact: vec![PathBuf::from("/")],
        }
    }

    /// Built-in protection plus the given protected trees.
    pub fn new<I, P>(protected: I, home: Option<&Path>) -> Self
    where
        I: IntoIterator<Item = P>,
        P: AsRef<Path>,
    {
        let mut guard = Self::permissive();
        guard
            .trees
            .extend(protected.into_iter().map(|p| normalize(p.as_ref())));

        if let Some(home) = home {
            for dir in PROTECTED_HOME_TREES {
                guard.trees.push(normalize(&home.join(dir)));
            }
            for dir in PROTECTED_HOME_DIRS {
                let path = if dir.is_empty() {
                    home.to_path_buf()
                } else {
                    home.join(dir)
                };
                guard.exact.push(normalize(&path));
            }
        }
        guard
    }

    pub fn protect(&mut self, path: &Path) {
        self.trees.push(normalize(path));
    }

    /// Check if a path is protected and should NEVER be deleted
    pub fn is_protected(&self, path: &Path) -> bool {
        let path = normalize(path);
        self.trees
            .iter()
            .any(|t| path.starts_with(t) || t.starts_with(&path))
            || self.exact.iter().any(|e| e.starts_with(&path))
    }

    pub fn check(&self, path: &Path) -> Result<()> {
        if self.is_protected(path) {
            Err(SweepError::new(
                ErrorCode::SafetyViolation,
                format!("refusing to remove protected path {}", path.display()),
            )
            .with_details("path", path.display().to_string()))
        } else {
            Ok(())
        }
    }
}

/// Risk gate: with safety enabled, critical operations never run.
pub fn check_risk(safety: SafetyLevel, operation: &str, risk: RiskLevel) -> Result<()> {
    if safety == SafetyLevel::Enabled && risk >= RiskLevel::Critical {
        return Err(SweepError::new(
            ErrorCode::SafetyViolation,
            format!(
                "operation '{}' is {} risk and safety is enabled",
                operation, risk
            ),
        )
        .with_details("operation", operation)
        .with_details("risk", risk.to_string()));
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    fn guard() -> SafetyGuard {
        SafetyGuard::new(DEFAULT_PROTECTED, Some(Path::new("/home/dev")))
    }

    #[test]
    fn test_root_is_protected() {
        assert!(guard().is_protected(Path::new("/")));
        assert!(SafetyGuard::permissive().is_protected(Path::new("/")));
    }

    #[test]
    fn test_system_trees_protected() {
        let g = guard();
        assert!(g.is_protected(Path::new("/usr")));
        assert!(g.is_protected(Path::new("/usr/local/bin/tool")));
        assert!(g.is_protected(Path::new("/nix")));
        assert!(g.is_protected(Path::new("/nix/store/abc-foo")));
    }

    #[test]
    fn test_home_dir_protected() {
        let g = guard();
        assert!(g.is_protected(Path::new("/home/dev")));
        assert!(g.is_protected(Path::new("/home")));
        assert!(g.is_protected(Path::new("/home/dev/Documents")));
        assert!(g.is_protected(Path::new("/home/dev/.ssh/id_ed25519")));
    }

    #[test]
    fn test_cache_dir_not_protected() {
        let g = guard();
        assert!(!g.is_protected(Path::new("/home/dev/Library/Caches/Homebrew")));
        assert!(!g.is_protected(Path::new("/home/dev/.cargo/registry")));
        assert!(!g.is_protected(Path::new("/home/dev/Documents/../.gradle/caches")));
    }

    #[test]
    fn test_tmp_not_protected() {
        assert!(!guard().is_protected(Path::new("/tmp/somefile")));
    }

    #[test]
    fn test_check_reports_safety_violation() {
        let err = guard().check(Path::new("/etc/hosts")).unwrap_err();
        assert!(err.is(ErrorCode::SafetyViolation));
    }

    #[test]
    fn test_risk_gate() {
        assert!(check_risk(SafetyLevel::Enabled, "docker", RiskLevel::High).is_ok());
        let err = check_risk(SafetyLevel::Enabled, "docker", RiskLevel::Critical).unwrap_err();
        assert!(err.is(ErrorCode::SafetyViolation));
        assert!(check_risk(SafetyLevel::Disabled, "docker", RiskLevel::Critical).is_ok());
    }
}
