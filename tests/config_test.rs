use std::path::PathBuf;
use std::sync::Arc;

use devsweep::cleaner::{default_registry_with, CleanerOptions, Engine, RunMode};
use devsweep::common::config::{Config, SafetyLevel, ValidationLevel};
use devsweep::common::errors::ErrorCode;
use devsweep::common::exec::{Context, RecordingRunner};
use devsweep::profiles::loader::{
    CleanupOperation, OperationSettings, OperationType, Profile, RiskLevel,
};
use tempfile::TempDir;

fn registry() -> devsweep::cleaner::Registry {
    default_registry_with(false, true)
}

// ─── Validation levels ───────────────────────────────────────────────────────

#[test]
fn test_validation_levels() {
    let reg = registry();
    let mut config = Config::default();
    config.version = "one".to_string();

    config.validate_at(ValidationLevel::None, &reg).unwrap();
    config.validate_at(ValidationLevel::Basic, &reg).unwrap();
    let err = config
        .validate_at(ValidationLevel::Comprehensive, &reg)
        .unwrap_err();
    assert!(err.is(ErrorCode::ValidationFailed));

    let mut config = Config::default();
    config.safety_level = SafetyLevel::Disabled;
    config
        .validate_at(ValidationLevel::Comprehensive, &reg)
        .unwrap();
    assert!(config.validate_at(ValidationLevel::Strict, &reg).is_err());
}

#[test]
fn test_basic_rejects_relative_protected_path() {
    let mut config = Config::default();
    config.user_protected.push(PathBuf::from("relative/dir"));
    assert!(config
        .validate_at(ValidationLevel::Basic, &registry())
        .is_err());
    assert!(config.add_protected(PathBuf::from("also/relative")).is_err());
}

#[test]
fn test_disk_usage_bounds() {
    let mut config = Config::default();
    config.max_disk_usage = 0;
    assert!(config.validate().is_err());
    config.max_disk_usage = 100;
    config.validate().unwrap();
}

#[test]
fn test_bad_operation_settings_fail_validation() {
    let mut config = Config::default();
    config.upsert_profile(Profile::new(
        "broken",
        "",
        vec![
            CleanupOperation::new(OperationType::TempFiles, "").with_settings(
                OperationSettings::TempFiles {
                    older_than: "whenever".to_string(),
                    excludes: Vec::new(),
                    base_paths: Vec::new(),
                },
            ),
        ],
    ));
    let err = config.validate().unwrap_err();
    assert!(err.is(ErrorCode::InvalidFormat));
    assert_eq!(err.detail("profile"), Some("broken"));
}

#[test]
fn test_mismatched_settings_kind_fails_validation() {
    let mut config = Config::default();
    config.upsert_profile(Profile::new(
        "mixed",
        "",
        vec![CleanupOperation::new(OperationType::Docker, "")
            .with_settings(OperationSettings::Nix { generations: 3 })],
    ));
    assert!(config.validate().unwrap_err().is(ErrorCode::InvalidConfig));
}

// ─── YAML ────────────────────────────────────────────────────────────────────

#[test]
fn test_yaml_round_trip_and_lowercase_enums() {
    let config = Config::default();
    let yaml = config.to_yaml().unwrap();
    assert!(yaml.contains("name: temp-files"));
    assert!(yaml.contains("safety_level: enabled"));
    let back = Config::from_yaml(&yaml).unwrap();
    assert_eq!(back.profiles, config.profiles);
    assert_eq!(back.current_profile, config.current_profile);
}

#[test]
fn test_unknown_keys_are_rejected() {
    let yaml = "version: 1.0.0\nprotected: [/usr]\nretention_days: 7\n";
    let err = Config::from_yaml(yaml).unwrap_err();
    assert!(err.is(ErrorCode::InvalidConfig));
}

#[test]
fn test_minimal_yaml_takes_defaults() {
    let yaml = "version: 2.1.0\nprotected: [/usr, /etc]\n";
    let config = Config::from_yaml(yaml).unwrap();
    assert_eq!(config.safety_level, SafetyLevel::Enabled);
    assert_eq!(config.max_disk_usage, 90);
    assert!(config.profiles.is_empty());
    config.validate().unwrap();
}

// ─── Persistence ─────────────────────────────────────────────────────────────

#[test]
fn test_save_is_atomic_and_reloadable() {
    let dir = TempDir::new().unwrap();
    let path = dir.path().join("nested/config.yaml");

    let mut config = Config::default();
    config.select_profile("developer").unwrap();
    config.save_to(&path).unwrap();

    assert!(path.exists());
    assert!(!dir.path().join("nested/config.yaml.tmp").exists());
    let loaded = Config::load_from(&path).unwrap();
    assert_eq!(loaded.current_profile, "developer");
}

#[test]
fn test_load_or_default_without_file() {
    let dir = TempDir::new().unwrap();
    let config = Config::load_or_default(&dir.path().join("missing.yaml")).unwrap();
    assert_eq!(config.current_profile, "quick");
    assert_eq!(config.profiles, Config::default().profiles);
}

// ─── Profile lifecycle ───────────────────────────────────────────────────────

#[test]
fn test_profile_lifecycle() {
    let mut config = Config::default();

    let err = config.delete_profile("quick").unwrap_err();
    assert!(err.is(ErrorCode::InvalidOperation));

    config.disable_profile("aggressive").unwrap();
    assert!(config
        .select_profile("aggressive")
        .unwrap_err()
        .is(ErrorCode::InvalidOperation));
    config.enable_profile("aggressive").unwrap();
    config.select_profile("aggressive").unwrap();
    assert_eq!(config.current().unwrap().name, "aggressive");

    config.delete_profile("quick").unwrap();
    assert!(config
        .profile("quick")
        .unwrap_err()
        .is(ErrorCode::MissingProfile));
    assert!(config
        .disable_profile("quick")
        .unwrap_err()
        .is(ErrorCode::MissingProfile));
}

// ─── Risk gate ───────────────────────────────────────────────────────────────

#[test]
fn test_critical_operation_blocked_before_any_subprocess() {
    let home = TempDir::new().unwrap();
    let mut config = Config::default();
    config.upsert_profile(Profile::new(
        "risky",
        "",
        vec![
            CleanupOperation::new(OperationType::GoPackages, "runs first if not gated"),
            CleanupOperation::new(OperationType::Docker, "").with_risk(RiskLevel::Critical),
        ],
    ));

    let runner = Arc::new(RecordingRunner::new().with_installed(&["go", "docker"]));
    let options = CleanerOptions::new(false, false)
        .with_home(home.path())
        .with_runner(runner.clone());
    let engine = Engine::new(&config, options);

    let err = engine
        .run(&Context::background(), Some("risky"), RunMode::Clean)
        .unwrap_err();
    assert!(err.is(ErrorCode::SafetyViolation));
    assert!(runner.calls().is_empty());
}

#[test]
fn test_critical_operation_allowed_with_safety_disabled() {
    let home = TempDir::new().unwrap();
    let mut config = Config::default();
    config.safety_level = SafetyLevel::Disabled;
    config.upsert_profile(Profile::new(
        "risky",
        "",
        vec![CleanupOperation::new(OperationType::GoPackages, "")
            .with_settings(OperationSettings::Go {
                caches: vec![devsweep::cleaners::golang::GoCacheKind::TestCache],
            })
            .with_risk(RiskLevel::Critical)],
    ));

    let runner = Arc::new(RecordingRunner::new().with_installed(&["go"]));
    let options = CleanerOptions::new(false, true)
        .with_home(home.path())
        .with_runner(runner.clone());
    let report = Engine::new(&config, options)
        .run(&Context::background(), Some("risky"), RunMode::Clean)
        .unwrap();
    assert_eq!(report.items_removed, 1);
    assert!(report.total.is_unknown());
}
