use anyhow::{Context as _, Result};
use clap::Parser;
use colored::Colorize;
use std::path::Path;
use tracing_subscriber::EnvFilter;

use devsweep::cleaner::{registry_from, CleanerOptions, Engine, RunMode, RunReport};
use devsweep::cli::args::{Cli, Commands, ConfigAction, OutputFormat, ProfileAction};
use devsweep::cli::output::{self, CleanerRow};
use devsweep::common::config::Config;
use devsweep::common::exec::Context;
use devsweep::common::format;

fn main() -> Result<()> {
    let cli = Cli::parse();

    if cli.no_color {
        colored::control::set_override(false);
    }
    init_tracing(cli.verbose);

    let config_path = match cli.config.clone() {
        Some(path) => path,
        None => Config::default_path()?,
    };

    match cli.command {
        Commands::Scan {
            ref profile,
            detailed,
        } => cmd_scan(&cli, &config_path, profile.as_deref(), detailed),

        Commands::Clean {
            ref profile,
            dry_run,
            yes,
        } => cmd_clean(&cli, &config_path, profile.as_deref(), dry_run, yes),

        Commands::List => cmd_list(&cli, &config_path),

        Commands::Config { ref action } => cmd_config(&cli, &config_path, action),

        Commands::Profile { ref action } => cmd_profile(&cli, &config_path, action),

        Commands::Completions { shell } => {
            use clap::CommandFactory;
            let mut cmd = Cli::command();
            let shell = match shell {
                devsweep::cli::args::CompletionShell::Bash => clap_complete::Shell::Bash,
                devsweep::cli::args::CompletionShell::Zsh => clap_complete::Shell::Zsh,
                devsweep::cli::args::CompletionShell::Fish => clap_complete::Shell::Fish,
            };
            clap_complete::generate(shell, &mut cmd, "devsweep", &mut std::io::stdout());
            Ok(())
        }
    }
}

/// Logs go to stderr so JSON on stdout stays parseable. `RUST_LOG` wins.
fn init_tracing(verbose: bool) {
    let default = if verbose { "devsweep=debug" } else { "devsweep=warn" };
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default));
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .with_target(false)
        .init();
}

fn load_config(path: &Path) -> Result<Config> {
    Config::load_or_default(path)
        .with_context(|| format!("Failed to load config from {}", path.display()))
}

fn show_progress(cli: &Cli) -> bool {
    !cli.quiet && cli.format == OutputFormat::Human
}

fn emit_report(cli: &Cli, report: &RunReport, detailed: bool) {
    match cli.format {
        OutputFormat::Human => output::print_run_report(report, detailed),
        OutputFormat::Json => output::print_json(report),
        OutputFormat::Quiet => output::print_run_quiet(report),
    }
}

// ─── Scan / Clean ─────────────────────────────────────────────────────────────

fn cmd_scan(cli: &Cli, config_path: &Path, profile: Option<&str>, detailed: bool) -> Result<()> {
    let config = load_config(config_path)?;
    let options = CleanerOptions::new(cli.verbose, true);
    let engine = Engine::new(&config, options).with_progress(show_progress(cli));

    if show_progress(cli) {
        if let Ok(p) = config.profile(profile.unwrap_or(&config.current_profile)) {
            output::print_profile_info(p);
        }
    }

    let report = engine.run(&Context::background(), profile, RunMode::Scan)?;
    emit_report(cli, &report, detailed);
    Ok(())
}

fn cmd_clean(
    cli: &Cli,
    config_path: &Path,
    profile: Option<&str>,
    dry_run: bool,
    yes: bool,
) -> Result<()> {
    let config = load_config(config_path)?;
    let ctx = Context::background();
    let progress = show_progress(cli);

    if show_progress(cli) {
        if let Ok(p) = config.profile(profile.unwrap_or(&config.current_profile)) {
            output::print_profile_info(p);
        }
    }

    // Confirm unless --yes or dry-run
    if !dry_run && !yes {
        let preview = Engine::new(&config, CleanerOptions::new(cli.verbose, true))
            .with_progress(progress)
            .run(&ctx, profile, RunMode::Clean)?;
        if cli.format == OutputFormat::Human {
            output::print_run_report(&preview, false);
        }
        if preview.items_removed == 0 {
            println!("  {} Nothing to clean!", "✨");
            return Ok(());
        }

        print!(
            "\n  {} Clean {} items ({})? [y/N] ",
            "❓",
            preview.items_removed,
            format::format_estimate(&preview.total)
        );
        use std::io::Write;
        std::io::stdout().flush()?;

        let mut input = String::new();
        std::io::stdin().read_line(&mut input)?;
        if !input.trim().eq_ignore_ascii_case("y") {
            println!("  {} Cancelled", "✗".red());
            return Ok(());
        }
    }

    let engine =
        Engine::new(&config, CleanerOptions::new(cli.verbose, dry_run)).with_progress(progress);
    let report = engine.run(&ctx, profile, RunMode::Clean)?;
    emit_report(cli, &report, false);

    if report.items_failed > 0 || report.failed() > 0 {
        anyhow::bail!(
            "{} items and {} operations failed",
            report.items_failed,
            report.failed()
        );
    }
    Ok(())
}

// ─── List ─────────────────────────────────────────────────────────────────────

fn cmd_list(cli: &Cli, config_path: &Path) -> Result<()> {
    let config = load_config(config_path)?;
    let mut options = CleanerOptions::new(cli.verbose, true);
    for p in config.all_protected() {
        options.guard.protect(p);
    }
    let registry = registry_from(&options);
    let ctx = Context::background();

    let mut rows: Vec<CleanerRow> = registry
        .list()
        .iter()
        .map(|c| CleanerRow {
            name: c.name().to_string(),
            available: c.is_available(&ctx),
            default_risk: c.op_type().default_risk().to_string(),
        })
        .collect();
    rows.sort_by(|a, b| a.name.cmp(&b.name));

    match cli.format {
        OutputFormat::Human => output::print_cleaners(&rows),
        OutputFormat::Json => output::print_json(&rows),
        OutputFormat::Quiet => {
            for row in rows.iter().filter(|r| r.available) {
                println!("{}", row.name);
            }
        }
    }
    Ok(())
}

// ─── Config ───────────────────────────────────────────────────────────────────

fn cmd_config(cli: &Cli, config_path: &Path, action: &ConfigAction) -> Result<()> {
    match action {
        ConfigAction::Init { force } => {
            if config_path.exists() && !force {
                anyhow::bail!(
                    "Config already exists at {} (use --force to overwrite)",
                    config_path.display()
                );
            }
            Config::default().save_to(config_path)?;
            if !cli.quiet {
                println!(
                    "  {} Wrote default config to {}",
                    "✓".green(),
                    format::format_path(config_path)
                );
            }
            Ok(())
        }
        ConfigAction::Show => {
            let config = load_config(config_path)?;
            match cli.format {
                OutputFormat::Human => output::print_config(&config, config_path),
                OutputFormat::Json => output::print_json(&config),
                OutputFormat::Quiet => print!("{}", config.to_yaml()?),
            }
            Ok(())
        }
        ConfigAction::Validate { level } => {
            let config = Config::load_from(config_path)
                .with_context(|| format!("Failed to load {}", config_path.display()))?;
            let registry = registry_from(&CleanerOptions::new(false, true));
            config.validate_at((*level).into(), &registry)?;
            if !cli.quiet {
                println!("  {} Configuration is valid", "✓".green());
            }
            Ok(())
        }
        ConfigAction::Protect { path } => {
            let mut config = load_config(config_path)?;
            config.add_protected(path.clone())?;
            config.save_to(config_path)?;
            if !cli.quiet {
                println!("  {} Protected {}", "✓".green(), path.display());
            }
            Ok(())
        }
    }
}

// ─── Profiles ─────────────────────────────────────────────────────────────────

fn cmd_profile(cli: &Cli, config_path: &Path, action: &ProfileAction) -> Result<()> {
    let mut config = load_config(config_path)?;

    let (verb, name) = match action {
        ProfileAction::List => {
            match cli.format {
                OutputFormat::Json => output::print_json(&config.profiles),
                OutputFormat::Quiet => {
                    for name in config.profiles.keys() {
                        println!("{}", name);
                    }
                }
                OutputFormat::Human => output::print_profiles(&config),
            }
            return Ok(());
        }
        ProfileAction::Show { name } => {
            let profile = config.profile(name)?;
            match cli.format {
                OutputFormat::Json => output::print_json(profile),
                _ => output::print_profile_detail(profile),
            }
            return Ok(());
        }
        ProfileAction::Select { name } => {
            config.select_profile(name)?;
            ("Selected", name)
        }
        ProfileAction::Delete { name } => {
            config.delete_profile(name)?;
            ("Deleted", name)
        }
        ProfileAction::Disable { name } => {
            config.disable_profile(name)?;
            ("Disabled", name)
        }
        ProfileAction::Enable { name } => {
            config.enable_profile(name)?;
            ("Enabled", name)
        }
    };

    config.save_to(config_path)?;
    if !cli.quiet {
        println!("  {} {} profile {}", "✓".green(), verb, name.bold());
    }
    Ok(())
}
