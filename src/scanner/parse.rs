//! Parsers that turn tool output into typed values.
//!
//! None of the tools involved promise machine-readable output, so every parser
//! here is narrow and fails with `InvalidFormat` rather than guessing.

use crate::common::errors::{Result, SweepError};

const KIB: f64 = 1024.0;

/// Parse a Docker size string such as `2.5GB`, `1.84kB`, `13.5 MB` or `512B`.
///
/// Units are matched case-insensitively and use binary multiples.
pub fn parse_docker_size(s: &str) -> Result<i64> {
    let s = s.trim();
    if s.is_empty() || s == "0" || s == "0B" {
        return Ok(0);
    }

    let num_end = s
        .char_indices()
        .find(|(_, c)| !(c.is_ascii_digit() || *c == '.'))
        .map_or(s.len(), |(i, _)| i);
    let (number, unit) = s.split_at(num_end);

    let value: f64 = number
        .parse()
        .map_err(|_| SweepError::invalid_format(format!("invalid size number in {:?}", s)))?;

    let multiplier = match unit.trim().to_ascii_uppercase().as_str() {
        "B" => 1.0,
        "KB" => KIB,
        "MB" => KIB * KIB,
        "GB" => KIB * KIB * KIB,
        "TB" => KIB * KIB * KIB * KIB,
        _ => {
            return Err(SweepError::invalid_format(format!(
                "missing or unknown size unit in {:?}",
                s
            )))
        }
    };

    Ok((value * multiplier) as i64)
}

/// Extract the byte count from `docker ... prune` output.
///
/// Output without a `Total reclaimed space:` line means nothing was reclaimed.
pub fn parse_reclaimed_space(output: &str) -> Result<i64> {
    let line = match output
        .lines()
        .find(|l| l.contains("Total reclaimed space:"))
    {
        Some(line) => line,
        None => return Ok(0),
    };
    let value = line.split_once(':').map_or("", |(_, rest)| rest);
    parse_docker_size(value.trim())
}

/// Parse a container size of the form `<current> (virtual <total>)`.
pub fn parse_container_size(s: &str) -> Result<i64> {
    let current = match s.find("(virtual") {
        Some(idx) => &s[..idx],
        None => s,
    };
    parse_docker_size(current.trim())
}

/// Parse durations like `24h`, `7d`, `2w`, `3m` (30 days) or `1y` (365 days).
pub fn parse_duration(s: &str) -> Result<chrono::Duration> {
    let s = s.trim();
    if s.chars().count() < 2 {
        return Err(SweepError::invalid_format(format!(
            "duration {:?} is too short; expected <number><h|d|w|m|y>",
            s
        )));
    }

    let split = s.char_indices().last().map_or(0, |(i, _)| i);
    let (amount, unit) = s.split_at(split);
    let amount: i64 = amount
        .parse()
        .map_err(|_| SweepError::invalid_format(format!("invalid duration amount in {:?}", s)))?;

    let unit_secs: i64 = match unit {
        "h" => 3600,
        "d" => 86_400,
        "w" => 7 * 86_400,
        "m" => 30 * 86_400,
        "y" => 365 * 86_400,
        _ => {
            return Err(SweepError::invalid_format(format!(
                "unknown duration unit {:?} in {:?}",
                unit, s
            )))
        }
    };

    amount
        .checked_mul(unit_secs)
        .filter(|secs| secs.checked_mul(1000).is_some())
        .map(chrono::Duration::seconds)
        .ok_or_else(|| SweepError::invalid_format(format!("duration {:?} is out of range", s)))
}

/// Collect every `"Name":"..."` value from `docker system df -v` style output.
pub fn parse_volume_names(output: &str) -> Vec<String> {
    const NEEDLE: &str = "\"Name\":\"";
    let mut names = Vec::new();
    let mut rest = output;

    while let Some(start) = rest.find(NEEDLE) {
        rest = &rest[start + NEEDLE.len()..];
        let mut name = String::new();
        let mut chars = rest.char_indices();
        let mut end = rest.len();
        let mut closed = false;

        while let Some((i, c)) = chars.next() {
            match c {
                '\\' => {
                    if let Some((_, escaped)) = chars.next() {
                        name.push(escaped);
                    }
                }
                '"' => {
                    end = i + 1;
                    closed = true;
                    break;
                }
                other => name.push(other),
            }
        }

        if closed && !name.is_empty() {
            names.push(name);
        }
        rest = &rest[end..];
    }

    names
}

/// Count removed objects in prune output (IDs and `deleted:`/`untagged:` lines).
pub fn count_pruned_objects(output: &str) -> u64 {
    output
        .lines()
        .map(str::trim)
        .filter(|l| !l.is_empty())
        .filter(|l| !l.ends_with(':'))
        .filter(|l| !l.starts_with("Total reclaimed space"))
        .filter(|l| !l.starts_with("WARNING"))
        .filter(|l| !l.starts_with("Are you sure"))
        .count() as u64
}

/// Parse the `N store paths deleted, X MiB freed` summary from `nix-store --gc`.
pub fn parse_nix_freed(output: &str) -> Option<u64> {
    let line = output.lines().find(|l| l.contains("freed"))?;
    let before = line.split("freed").next()?.trim();
    let mut parts = before.rsplitn(2, ' ');
    let unit = parts.next()?;
    let number: f64 = parts.next()?.rsplit(' ').next()?.trim().parse().ok()?;

    let multiplier = match unit {
        "bytes" | "B" => 1.0,
        "KiB" => KIB,
        "MiB" => KIB * KIB,
        "GiB" => KIB * KIB * KIB,
        "TiB" => KIB * KIB * KIB * KIB,
        _ => return None,
    };
    Some((number * multiplier) as u64)
}
