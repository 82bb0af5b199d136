use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::iter::Sum;
use std::ops::{Add, AddAssign};
use std::time::{Duration, Instant, SystemTime};

use crate::common::errors::{Result, SweepError};

// ─── Size estimate ────────────────────────────────────────────────────────────

/// How much we trust a byte count.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SizeStatus {
    Known,
    Estimated,
    Unknown,
}

/// A byte quantity whose true value may be unknown.
///
/// Adding estimates degrades the status (`known + estimated = estimated`,
/// anything `+ unknown = unknown`) so totals never claim more precision than
/// their weakest part.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct SizeEstimate {
    /// Meaningful only when `status != Unknown`.
    pub known: u64,
    pub status: SizeStatus,
}

impl Default for SizeEstimate {
    fn default() -> Self {
        Self::known(0)
    }
}

impl SizeEstimate {
    pub fn known(bytes: u64) -> Self {
        Self {
            known: bytes,
            status: SizeStatus::Known,
        }
    }

    pub fn estimated(bytes: u64) -> Self {
        Self {
            known: bytes,
            status: SizeStatus::Estimated,
        }
    }

    pub fn unknown() -> Self {
        Self {
            known: 0,
            status: SizeStatus::Unknown,
        }
    }

    /// The byte count, or zero when unknown.
    pub fn value(&self) -> u64 {
        match self.status {
            SizeStatus::Unknown => 0,
            _ => self.known,
        }
    }

    pub fn is_known(&self) -> bool {
        self.status == SizeStatus::Known
    }

    pub fn is_unknown(&self) -> bool {
        self.status == SizeStatus::Unknown
    }
}

impl Add for SizeEstimate {
    type Output = SizeEstimate;

    fn add(self, rhs: SizeEstimate) -> SizeEstimate {
        use SizeStatus::*;
        match (self.status, rhs.status) {
            (Unknown, _) | (_, Unknown) => SizeEstimate::unknown(),
            (Known, Known) => SizeEstimate::known(self.known.saturating_add(rhs.known)),
            _ => SizeEstimate::estimated(self.known.saturating_add(rhs.known)),
        }
    }
}

impl AddAssign for SizeEstimate {
    fn add_assign(&mut self, rhs: SizeEstimate) {
        *self = *self + rhs;
    }
}

impl Sum for SizeEstimate {
    fn sum<I: Iterator<Item = SizeEstimate>>(iter: I) -> Self {
        iter.fold(SizeEstimate::known(0), Add::add)
    }
}

// ─── Clean result ─────────────────────────────────────────────────────────────

/// How a clean run treated the system.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum Strategy {
    DryRun,
    Conservative,
    Aggressive,
}

impl std::fmt::Display for Strategy {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Strategy::DryRun => write!(f, "dry-run"),
            Strategy::Conservative => write!(f, "conservative"),
            Strategy::Aggressive => write!(f, "aggressive"),
        }
    }
}

/// Outcome of one cleaner's `clean` call.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CleanResult {
    pub size_estimate: SizeEstimate,
    pub items_removed: u64,
    pub items_failed: u64,
    pub clean_time: Duration,
    /// Completion time; `None` until the run finishes.
    pub cleaned_at: Option<DateTime<Utc>>,
    pub strategy: Strategy,
}

impl CleanResult {
    pub fn new(strategy: Strategy) -> Self {
        Self {
            size_estimate: SizeEstimate::known(0),
            items_removed: 0,
            items_failed: 0,
            clean_time: Duration::ZERO,
            cleaned_at: None,
            strategy,
        }
    }

    /// Record one removed item worth `size`.
    pub fn removed(&mut self, size: SizeEstimate) {
        self.items_removed += 1;
        self.size_estimate += size;
    }

    pub fn failed(&mut self) {
        self.items_failed += 1;
    }

    /// Stamp elapsed time and completion time.
    pub fn complete(mut self, started: Instant) -> Self {
        self.clean_time = started.elapsed();
        self.cleaned_at = Some(Utc::now());
        self
    }

    pub fn is_dry_run(&self) -> bool {
        self.strategy == Strategy::DryRun
    }

    pub fn validate(&self) -> Result<()> {
        if self.size_estimate.status == SizeStatus::Unknown && self.size_estimate.known != 0 {
            return Err(SweepError::validation(
                "size estimate is unknown but carries a byte count",
            ));
        }
        if self.strategy == Strategy::DryRun && self.items_failed > 0 {
            return Err(SweepError::validation("a dry run cannot fail items"));
        }
        if self.cleaned_at.is_none() {
            return Err(SweepError::validation("clean result has no completion time"));
        }
        Ok(())
    }
}

// ─── Scan items ───────────────────────────────────────────────────────────────

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ScanType {
    Temp,
    System,
    Config,
}

/// A deletion candidate reported by `scan`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ScanItem {
    /// Filesystem path or pseudo-URI such as `docker:image:<id>`.
    pub path: String,
    pub size: i64,
    pub created: Option<SystemTime>,
    pub scan_type: ScanType,
}

impl ScanItem {
    pub fn new(path: impl Into<String>, size: i64, scan_type: ScanType) -> Self {
        Self {
            path: path.into(),
            size,
            created: None,
            scan_type,
        }
    }

    pub fn with_created(mut self, created: Option<SystemTime>) -> Self {
        self.created = created;
        self
    }

    pub fn size_bytes(&self) -> u64 {
        self.size.max(0) as u64
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_value_hides_unknown() {
        let e = SizeEstimate {
            known: 42,
            status: SizeStatus::Unknown,
        };
        assert_eq!(e.value(), 0);
        assert_eq!(SizeEstimate::estimated(7).value(), 7);
    }

    #[test]
    fn test_addition_propagates_status() {
        let k = SizeEstimate::known(10);
        let e = SizeEstimate::estimated(5);
        let u = SizeEstimate::unknown();
        assert_eq!(k + k, SizeEstimate::known(20));
        assert_eq!(k + e, SizeEstimate::estimated(15));
        assert_eq!(e + k, SizeEstimate::estimated(15));
        assert!((k + u).is_unknown());
        assert!((u + e).is_unknown());
        let total: SizeEstimate = vec![k, e, u, k].into_iter().sum();
        assert!(total.is_unknown());
        assert_eq!(total.value(), 0);
    }

    #[test]
    fn test_validate_rules() {
        let started = Instant::now();
        let ok = CleanResult::new(Strategy::Conservative).complete(started);
        assert!(ok.validate().is_ok());

        let mut bad = ok.clone();
        bad.size_estimate = SizeEstimate {
            known: 1,
            status: SizeStatus::Unknown,
        };
        assert!(bad.validate().is_err());

        let mut dry = CleanResult::new(Strategy::DryRun).complete(started);
        dry.items_failed = 1;
        assert!(dry.validate().is_err());

        let unfinished = CleanResult::new(Strategy::Aggressive);
        assert!(unfinished.validate().is_err());
    }

    #[test]
    fn test_removed_accumulates() {
        let mut r = CleanResult::new(Strategy::Conservative);
        r.removed(SizeEstimate::known(100));
        r.removed(SizeEstimate::known(50));
        r.failed();
        assert_eq!(r.items_removed, 2);
        assert_eq!(r.items_failed, 1);
        assert_eq!(r.size_estimate, SizeEstimate::known(150));
    }
}
