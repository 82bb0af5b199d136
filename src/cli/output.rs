use colored::*;
use serde::Serialize;
use std::path::Path;

use crate::cleaner::{Outcome, RunMode, RunReport, ScanItem, SizeEstimate};
use crate::common::config::Config;
use crate::common::format::{self, format_estimate, format_risk, format_size_colored};
use crate::profiles::loader::Profile;

/// One row of `devsweep list`
#[derive(Debug, Clone, Serialize)]
pub struct CleanerRow {
    pub name: String,
    pub available: bool,
    pub default_risk: String,
}

/// Print any serializable value as pretty JSON
pub fn print_json<T: Serialize>(value: &T) {
    match serde_json::to_string_pretty(value) {
        Ok(json) => println!("{}", json),
        Err(e) => eprintln!("Error serializing output: {}", e),
    }
}

fn colored_estimate(estimate: &SizeEstimate) -> ColoredString {
    if estimate.is_known() {
        format_size_colored(estimate.value())
    } else {
        format_estimate(estimate).yellow()
    }
}

/// Print a scan or clean report in human-readable format
pub fn print_run_report(report: &RunReport, detailed: bool) {
    let title = match (report.mode, report.dry_run) {
        (RunMode::Scan, _) => "devsweep Scan Results",
        (RunMode::Clean, true) => "devsweep Dry Run",
        (RunMode::Clean, false) => "devsweep Cleanup",
    };
    println!();
    println!("  {}  {}", title.bold(), format!("[{}]", report.profile).dimmed());
    println!("{}", "─".repeat(60).dimmed());
    println!(
        "  Finished in {}  •  {} {}",
        format::format_duration(report.elapsed.as_secs_f64()).cyan(),
        colored_estimate(&report.total),
        if report.mode == RunMode::Scan || report.dry_run {
            "reclaimable"
        } else {
            "reclaimed"
        }
    );
    println!("{}", "─".repeat(60).dimmed());
    println!();

    for op in &report.operations {
        match &op.outcome {
            Outcome::Scanned { items, size } => {
                println!(
                    "  {} {:<22} {:>12}  {} items  {}",
                    "●".green(),
                    op.operation.bold(),
                    colored_estimate(size),
                    items.len().to_string().cyan(),
                    format_risk(op.risk_level)
                );
                if detailed {
                    print_items(items);
                }
            }
            Outcome::Cleaned { result } => {
                let failed = if result.items_failed > 0 {
                    format!("  {} failed", result.items_failed).red()
                } else {
                    "".normal()
                };
                println!(
                    "  {} {:<22} {:>12}  {} items{}  {}",
                    "✓".green(),
                    op.operation.bold(),
                    colored_estimate(&result.size_estimate),
                    result.items_removed.to_string().cyan(),
                    failed,
                    result.strategy.to_string().dimmed()
                );
            }
            Outcome::Skipped { reason } => {
                println!(
                    "  {} {:<22} {}",
                    "○".dimmed(),
                    op.operation.dimmed(),
                    reason.dimmed()
                );
            }
            Outcome::Failed { code, message } => {
                println!(
                    "  {} {:<22} {} {}",
                    "✗".red(),
                    op.operation.bold(),
                    code.red(),
                    message
                );
            }
        }
    }

    if report.mode == RunMode::Clean {
        println!();
        println!(
            "  {} removed, {} failed, {} skipped",
            report.items_removed.to_string().cyan(),
            report.items_failed.to_string().red(),
            report.skipped().to_string().dimmed()
        );
    }
    println!();
}

fn print_items(items: &[ScanItem]) {
    for item in items.iter().take(20) {
        println!(
            "      {} {:>10}  {}",
            "·".dimmed(),
            format::format_size(item.size_bytes()).dimmed(),
            format::truncate(&format::format_path(Path::new(&item.path)), 60)
        );
    }
    if items.len() > 20 {
        println!(
            "      ... and {} more",
            (items.len() - 20).to_string().dimmed()
        );
    }
}

/// Print a minimal summary: total, removed, failed
pub fn print_run_quiet(report: &RunReport) {
    println!(
        "{}  {}  {}",
        format_estimate(&report.total),
        report.items_removed,
        report.items_failed
    );
}

/// Print a profile header before a run
pub fn print_profile_info(profile: &Profile) {
    println!();
    println!("  Profile: {}", profile.name.bold());
    if !profile.description.is_empty() {
        println!("  {}", profile.description.dimmed());
    }
    if let Some(risk) = profile.max_risk() {
        println!("  Highest risk: {}", format_risk(risk));
    }
}

/// Print the registered cleaners
pub fn print_cleaners(rows: &[CleanerRow]) {
    format::print_header("Cleaners");
    for row in rows {
        let mark = if row.available {
            "●".green()
        } else {
            "○".dimmed()
        };
        println!(
            "  {} {:<22} {}",
            mark,
            row.name.bold(),
            row.default_risk.dimmed()
        );
    }
    println!();
}

/// Print all profiles, marking the current one
pub fn print_profiles(config: &Config) {
    format::print_header("Profiles");
    for profile in config.profiles.values() {
        let marker = if profile.name == config.current_profile {
            "*".green().bold()
        } else {
            " ".normal()
        };
        let status = if profile.is_enabled() {
            "".normal()
        } else {
            " (disabled)".dimmed()
        };
        println!(
            "  {} {:<14}{} {} operations  {}",
            marker,
            profile.name.bold(),
            status,
            profile.enabled_operations().count().to_string().cyan(),
            profile.description.dimmed()
        );
    }
    println!();
}

/// Print one profile's operations
pub fn print_profile_detail(profile: &Profile) {
    print_profile_info(profile);
    println!();
    for op in &profile.operations {
        let name = if op.is_enabled() {
            op.name.bold()
        } else {
            op.name.dimmed()
        };
        println!(
            "    {:<22} {:<8} {}",
            name,
            format_risk(op.risk_level),
            op.description.dimmed()
        );
    }
    println!();
}

/// Print the effective configuration summary
pub fn print_config(config: &Config, path: &Path) {
    format::print_header("devsweep Configuration");
    println!("  File:            {}", format::format_path(path).cyan());
    println!("  Version:         {}", config.version);
    println!("  Safety:          {:?}", config.safety_level);
    println!("  Max disk usage:  {}%", config.max_disk_usage);
    println!("  Current profile: {}", config.current_profile.bold());
    println!("  Profiles:        {}", config.profiles.len());
    println!("  Protected paths:");
    for p in config.all_protected() {
        println!("    {}", format::format_path(p).dimmed());
    }
    println!();
}
