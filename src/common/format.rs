use colored::*;

use crate::cleaner::{SizeEstimate, SizeStatus};
use crate::profiles::loader::RiskLevel;

const BINARY_UNITS: [(&str, u64); 4] = [
    ("TB", 1 << 40),
    ("GB", 1 << 30),
    ("MB", 1 << 20),
    ("KB", 1 << 10),
];

/// Human-readable size: two decimals from MB up, one for KB.
pub fn format_size(bytes: u64) -> String {
    for (unit, scale) in BINARY_UNITS {
        if bytes >= scale {
            let value = bytes as f64 / scale as f64;
            return if scale == 1 << 10 {
                format!("{:.1} {}", value, unit)
            } else {
                format!("{:.2} {}", value, unit)
            };
        }
    }
    format!("{} B", bytes)
}

/// Render a size estimate, making the epistemic status visible.
pub fn format_estimate(estimate: &SizeEstimate) -> String {
    match estimate.status {
        SizeStatus::Known => format_size(estimate.value()),
        SizeStatus::Estimated => format!("~{}", format_size(estimate.value())),
        SizeStatus::Unknown => "unknown".to_string(),
    }
}

/// Render bytes in the compact unit style Docker prints (`2.50GB`, `1.84kB`).
///
/// Uses binary multiples so that `parse_docker_size` reads the value back.
pub fn render_docker_size(bytes: i64) -> String {
    let magnitude = bytes.unsigned_abs();
    for (unit, scale) in BINARY_UNITS {
        if magnitude >= scale {
            let unit = if unit == "KB" { "kB" } else { unit };
            return format!("{:.2}{}", bytes as f64 / scale as f64, unit);
        }
    }
    format!("{}B", bytes)
}

/// Red from 1 GB, yellow from 100 MB.
pub fn format_size_colored(bytes: u64) -> ColoredString {
    let s = format_size(bytes);
    match bytes {
        b if b >= 1 << 30 => s.red().bold(),
        b if b >= 100 << 20 => s.yellow(),
        _ => s.white(),
    }
}

/// Display form of `path` with the home directory shortened to `~`
pub fn format_path(path: &std::path::Path) -> String {
    dirs::home_dir()
        .and_then(|home| path.strip_prefix(home).ok().map(|p| format!("~/{}", p.display())))
        .unwrap_or_else(|| path.display().to_string())
}

/// Elapsed wall time: `500ms`, `3.7s`, `2m 5s`
pub fn format_duration(secs: f64) -> String {
    match secs {
        s if s < 1.0 => format!("{:.0}ms", s * 1000.0),
        s if s < 60.0 => format!("{:.1}s", s),
        s => {
            let mins = (s / 60.0).floor();
            format!("{}m {:.0}s", mins as u64, s - mins * 60.0)
        }
    }
}

/// Colorize risk level
pub fn format_risk(risk: RiskLevel) -> ColoredString {
    match risk {
        RiskLevel::Low => "low".green(),
        RiskLevel::Medium => "medium".yellow(),
        RiskLevel::High => "high".red(),
        RiskLevel::Critical => "critical".red().bold(),
    }
}

/// Print a section header
pub fn print_header(title: &str) {
    println!();
    println!("{}", title.bold().underline());
    println!();
}

/// Truncate a string to max length with ellipsis
pub fn truncate(s: &str, max_len: usize) -> String {
    if s.chars().count() <= max_len {
        s.to_string()
    } else if max_len <= 3 {
        ".".repeat(max_len)
    } else {
        let kept: String = s.chars().take(max_len - 3).collect();
        format!("{}...", kept)
    }
}
