use std::fs;
use std::path::Path;
use std::sync::Arc;

use devsweep::cleaner::{Cleaner, CleanerOptions, SizeEstimate, Strategy};
use devsweep::cleaners::compiled_binaries::BinaryCategory;
use devsweep::cleaners::docker::DockerPruneMode;
use devsweep::cleaners::golang::GoCaches;
use devsweep::cleaners::homebrew::HomebrewMode;
use devsweep::cleaners::nix::NixProbe;
use devsweep::cleaners::node::NodePackageManager;
use devsweep::cleaners::{
    CargoCleaner, CompiledBinariesCleaner, DockerCleaner, GoCleaner, HomebrewCleaner,
    NixCleaner, NodeCleaner, ProjectsCleaner,
};
use devsweep::common::errors::ErrorCode;
use devsweep::common::exec::{Context, RecordingRunner};
use tempfile::TempDir;

/// Command lines that change state on the host.
const MUTATING: &[&str] = &[
    "go clean",
    "golangci-lint cache clean",
    "docker system prune",
    "docker image prune",
    "docker container prune",
    "docker volume prune",
    "docker builder prune",
    "brew cleanup",
    "cargo clean",
    "cargo-cache --autoclean",
    "npm cache clean",
    "pnpm store prune",
    "yarn cache clean",
    "bun pm cache rm",
    "nix-env --delete-generations",
    "nix-store --gc",
    "trash",
    "projects-management-automation --clear-cache",
];

fn assert_no_mutation(runner: &RecordingRunner) {
    for call in runner.calls() {
        assert!(
            call != "brew autoremove" && !MUTATING.iter().any(|m| call.starts_with(m)),
            "dry run issued mutating command: {}",
            call
        );
    }
}

fn dry_options(runner: &Arc<RecordingRunner>, home: &Path) -> CleanerOptions {
    CleanerOptions::new(false, true)
        .with_home(home)
        .with_runner(runner.clone())
}

// ─── Go ──────────────────────────────────────────────────────────────────────

#[test]
fn test_go_dry_run_all_kinds() {
    let home = TempDir::new().unwrap();
    let runner = Arc::new(RecordingRunner::new().with_installed(&["go"]));
    let cleaner = GoCleaner::new(dry_options(&runner, home.path()), GoCaches::ALL);

    let result = cleaner.clean(&Context::background()).unwrap();
    assert_eq!(result.items_removed, 5);
    assert_eq!(result.strategy, Strategy::DryRun);
    assert!(!runner.was_called("go clean"));
    assert_no_mutation(&runner);
}

#[test]
fn test_go_real_run_invokes_selected_kinds_only() {
    let home = TempDir::new().unwrap();
    let runner = Arc::new(RecordingRunner::new().with_installed(&["go"]));
    let options = CleanerOptions::new(false, false)
        .with_home(home.path())
        .with_runner(runner.clone());
    let cleaner = GoCleaner::new(options, GoCaches::GOCACHE | GoCaches::TEST_CACHE);

    // `go env` reports nothing, so neither category can be shown to shrink
    let result = cleaner.clean(&Context::background()).unwrap();
    assert_eq!(result.items_removed, 0);
    assert!(result.size_estimate.is_unknown());
    assert!(runner.was_called("go clean -cache"));
    assert!(runner.was_called("go clean -testcache"));
    assert!(!runner.was_called("go clean -modcache"));
}

#[test]
fn test_go_second_clean_removes_nothing() {
    let home = TempDir::new().unwrap();
    let gocache = home.path().join("go-build");
    fs::create_dir_all(gocache.join("00")).unwrap();
    fs::write(gocache.join("00/obj-d"), vec![0u8; 256]).unwrap();

    let runner = Arc::new(
        RecordingRunner::new()
            .with_installed(&["go"])
            .respond("go env GOCACHE", &format!("{}\n", gocache.display()))
            .removes("go clean -cache", &gocache),
    );
    let options = CleanerOptions::new(false, false)
        .with_home(home.path())
        .with_runner(runner.clone());
    let cleaner = GoCleaner::new(options, GoCaches::GOCACHE);
    let ctx = Context::background();

    let first = cleaner.clean(&ctx).unwrap();
    assert_eq!(first.items_removed, 1);
    assert_eq!(first.size_estimate, SizeEstimate::known(256));

    let second = cleaner.clean(&ctx).unwrap();
    assert_eq!(second.items_removed, 0);
    assert_eq!(second.size_estimate, SizeEstimate::known(0));
    let cleans = runner
        .calls()
        .iter()
        .filter(|c| c.starts_with("go clean"))
        .count();
    assert_eq!(cleans, 1);
}

#[test]
fn test_go_unavailable_fails_clean() {
    let home = TempDir::new().unwrap();
    let runner = Arc::new(RecordingRunner::new());
    let cleaner = GoCleaner::new(dry_options(&runner, home.path()), GoCaches::ALL);
    let ctx = Context::background();
    assert!(!cleaner.is_available(&ctx));
    assert!(cleaner
        .clean(&ctx)
        .unwrap_err()
        .is(ErrorCode::ExternalToolUnavailable));
}

// ─── Dry-run guarantees across cleaners ──────────────────────────────────────

#[test]
fn test_dry_run_never_mutates() {
    let home = TempDir::new().unwrap();
    let runner = Arc::new(
        RecordingRunner::new()
            .with_installed(&[
                "docker",
                "brew",
                "cargo",
                "npm",
                "pnpm",
                "nix-env",
                "trash",
                "projects-management-automation",
            ])
            .respond("docker images", "sha256:aa\t1.5MB\n")
            .respond("brew --cache", "")
            .respond("brew autoremove --dry-run", "==> Would autoremove 1 unneeded formula:\nlibfoo\n"),
    );
    let ctx = Context::background();
    let options = dry_options(&runner, home.path());

    let cleaners: Vec<Box<dyn Cleaner>> = vec![
        Box::new(DockerCleaner::new(options.clone(), DockerPruneMode::All)),
        Box::new(HomebrewCleaner::new(options.clone(), HomebrewMode::All)),
        Box::new(CargoCleaner::new(options.clone(), true).with_cargo_home(home.path().join(".cargo"))),
        Box::new(NodeCleaner::new(options.clone(), NodePackageManager::all())),
        Box::new(
            NixCleaner::new(options.clone(), 1)
                .unwrap()
                .with_probe(NixProbe::Synthetic),
        ),
        Box::new(ProjectsCleaner::new(options.clone())),
    ];

    for cleaner in &cleaners {
        let result = cleaner.clean(&ctx).unwrap();
        assert!(result.is_dry_run(), "{}", cleaner.name());
        assert_eq!(result.items_failed, 0, "{}", cleaner.name());
        result.validate().unwrap();
    }
    assert_no_mutation(&runner);
}

#[test]
fn test_docker_dry_run_is_estimated() {
    let runner = Arc::new(
        RecordingRunner::new()
            .with_installed(&["docker"])
            .respond("docker images", "sha256:aa\t1kB\nsha256:bb\t1kB\n"),
    );
    let options = CleanerOptions::new(false, true).with_runner(runner.clone());
    let result = DockerCleaner::new(options, DockerPruneMode::Images)
        .clean(&Context::background())
        .unwrap();
    assert_eq!(result.items_removed, 2);
    assert_eq!(result.size_estimate, SizeEstimate::estimated(2048));
    assert_no_mutation(&runner);
}

#[test]
fn test_node_dry_run_size_is_unknown() {
    let home = TempDir::new().unwrap();
    let runner = Arc::new(RecordingRunner::new().with_installed(&["npm", "yarn"]));
    let result = NodeCleaner::new(dry_options(&runner, home.path()), NodePackageManager::all())
        .clean(&Context::background())
        .unwrap();
    assert_eq!(result.items_removed, 2);
    assert!(result.size_estimate.is_unknown());
    assert_eq!(result.size_estimate.value(), 0);
    assert_no_mutation(&runner);
}

// ─── Nix ─────────────────────────────────────────────────────────────────────

#[test]
fn test_nix_synthetic_keeps_newest_and_current() {
    let home = TempDir::new().unwrap();
    let runner = Arc::new(RecordingRunner::new());
    let cleaner = NixCleaner::new(dry_options(&runner, home.path()), 3)
        .unwrap()
        .with_probe(NixProbe::Synthetic);
    let ctx = Context::background();

    let generations = cleaner.generations(&ctx).unwrap();
    assert_eq!(generations.len(), 5);
    let doomed = cleaner.deletable(&generations);
    assert_eq!(doomed.iter().map(|g| g.id).collect::<Vec<_>>(), vec![1, 2]);
    assert!(doomed.iter().all(|g| !g.is_current()));

    let result = cleaner.clean(&ctx).unwrap();
    assert_eq!(result.items_removed, 2);
    assert!(result.size_estimate.is_unknown());
    assert!(runner.calls().is_empty());
}

#[test]
fn test_nix_keep_zero_rejected() {
    let err = NixCleaner::new(CleanerOptions::default(), 0).unwrap_err();
    assert!(err.is(ErrorCode::ValidationFailed));
}

// ─── Compiled binaries ───────────────────────────────────────────────────────

#[cfg(unix)]
fn write_executable(path: &Path, bytes: usize) {
    use std::os::unix::fs::PermissionsExt;
    fs::create_dir_all(path.parent().unwrap()).unwrap();
    fs::write(path, vec![0u8; bytes]).unwrap();
    fs::set_permissions(path, fs::Permissions::from_mode(0o755)).unwrap();
}

#[cfg(unix)]
fn binaries_fixture() -> TempDir {
    let root = TempDir::new().unwrap();
    let r = root.path();
    write_executable(&r.join("svc/server"), 64);
    write_executable(&r.join("svc/bin/tool"), 64);
    write_executable(&r.join("svc/pkg.test"), 64);
    write_executable(&r.join("web/dist/app"), 64);
    write_executable(&r.join("web/node_modules/.bin/esbuild"), 64);
    write_executable(&r.join("e2e/chromedriver"), 64);
    fs::write(r.join("svc/notes.txt"), vec![0u8; 64]).unwrap();
    root
}

#[cfg(unix)]
fn binaries(
    runner: &Arc<RecordingRunner>,
    root: &Path,
    dry_run: bool,
    categories: Vec<BinaryCategory>,
) -> CompiledBinariesCleaner {
    let options = CleanerOptions::new(false, dry_run)
        .with_home(root)
        .with_runner(runner.clone());
    CompiledBinariesCleaner::new(options, 0, None, vec![root.to_path_buf()], categories, &[])
        .unwrap()
}

#[cfg(unix)]
#[test]
fn test_compiled_binaries_scan_filters() {
    let root = binaries_fixture();
    let runner = Arc::new(RecordingRunner::new().with_installed(&["trash"]));
    let cleaner = binaries(&runner, root.path(), true, BinaryCategory::all());

    let mut found: Vec<String> = cleaner
        .scan(&Context::background())
        .unwrap()
        .into_iter()
        .map(|i| {
            Path::new(&i.path)
                .strip_prefix(root.path())
                .unwrap()
                .to_string_lossy()
                .into_owned()
        })
        .collect();
    found.sort();
    assert_eq!(
        found,
        vec!["svc/bin/tool", "svc/pkg.test", "svc/server", "web/dist/app"]
    );

    let only_root = binaries(&runner, root.path(), true, vec![BinaryCategory::Root]);
    assert_eq!(only_root.scan(&Context::background()).unwrap().len(), 1);
}

#[cfg(unix)]
#[test]
fn test_compiled_binaries_trash_only_when_not_dry_run() {
    let root = binaries_fixture();
    let runner = Arc::new(RecordingRunner::new().with_installed(&["trash"]));

    let dry = binaries(&runner, root.path(), true, vec![BinaryCategory::Test])
        .clean(&Context::background())
        .unwrap();
    assert_eq!(dry.items_removed, 1);
    assert_eq!(dry.size_estimate, SizeEstimate::known(64));
    assert!(!runner.was_called("trash"));

    let real = binaries(&runner, root.path(), false, vec![BinaryCategory::Test])
        .clean(&Context::background())
        .unwrap();
    assert_eq!(real.items_removed, 1);
    let expected = format!("trash {}", root.path().join("svc/pkg.test").display());
    assert_eq!(runner.calls(), vec![expected]);
}

#[cfg(unix)]
#[test]
fn test_compiled_binaries_needs_trash() {
    let root = binaries_fixture();
    let runner = Arc::new(RecordingRunner::new());
    let cleaner = binaries(&runner, root.path(), false, BinaryCategory::all());
    assert!(cleaner
        .clean(&Context::background())
        .unwrap_err()
        .is(ErrorCode::ExternalToolUnavailable));
}
