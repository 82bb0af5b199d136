use chrono::{DateTime, NaiveDateTime, TimeZone, Utc};
use std::path::{Path, PathBuf};
use std::time::Instant;

use tracing::debug;

use crate::cleaner::{
    AvailabilityCache, CleanResult, Cleaner, CleanerOptions, Resource, ScanItem, ScanType,
    SizeEstimate,
};
use crate::common::errors::{ErrorCode, Result, SweepError};
use crate::common::exec::{timeouts, Context};
use crate::profiles::loader::{OperationSettings, OperationType};
use crate::scanner::parse;

const NAME: &str = "nix-generations";

pub const PROFILES_DIR: &str = "/nix/var/nix/profiles";

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum GenerationState {
    Current,
    Historical,
}

/// A numbered snapshot of a Nix profile.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NixGeneration {
    pub id: u32,
    pub path: PathBuf,
    pub date: DateTime<Utc>,
    pub state: GenerationState,
}

impl NixGeneration {
    pub fn is_current(&self) -> bool {
        self.state == GenerationState::Current
    }
}

/// Where generations come from.
///
/// `Synthetic` reports a fixed five-generation list and claims availability
/// without touching the host; it only exists for tests and CI.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum NixProbe {
    #[default]
    System,
    Synthetic,
}

/// Deletes old Nix profile generations, keeping the newest N and the current one.
#[derive(Debug)]
pub struct NixCleaner {
    options: CleanerOptions,
    keep: u32,
    probe: NixProbe,
    profiles_dir: PathBuf,
    available: AvailabilityCache,
}

impl NixCleaner {
    pub fn new(options: CleanerOptions, keep: u32) -> Result<Self> {
        if keep == 0 {
            return Err(SweepError::validation(
                "nix generations to keep must be at least 1",
            ));
        }
        Ok(Self {
            options,
            keep,
            probe: NixProbe::System,
            profiles_dir: PathBuf::from(PROFILES_DIR),
            available: AvailabilityCache::default(),
        })
    }

    pub fn from_settings(
        options: CleanerOptions,
        settings: Option<&OperationSettings>,
    ) -> Result<Self> {
        match settings {
            None => Self::new(options, 5),
            Some(OperationSettings::Nix { generations }) => Self::new(options, *generations),
            Some(other) => Err(other.mismatch(NAME)),
        }
    }

    pub fn with_probe(mut self, probe: NixProbe) -> Self {
        self.probe = probe;
        self
    }

    pub fn keep(&self) -> u32 {
        self.keep
    }

    /// All generations of the default profile, oldest first.
    pub fn generations(&self, ctx: &Context) -> Result<Vec<NixGeneration>> {
        match self.probe {
            NixProbe::Synthetic => Ok(synthetic_generations(&self.profiles_dir)),
            NixProbe::System => {
                let out = self.options.runner.run(
                    ctx,
                    "nix-env",
                    &["--list-generations"],
                    timeouts::DEFAULT,
                )?;
                parse_generations(&out.stdout, &self.profiles_dir)
            }
        }
    }

    /// Generations outside the keep window, never including the current one.
    pub fn deletable(&self, generations: &[NixGeneration]) -> Vec<NixGeneration> {
        let mut newest_first: Vec<&NixGeneration> = generations.iter().collect();
        newest_first.sort_by(|a, b| b.id.cmp(&a.id));

        let mut kept = 0u32;
        let mut doomed = Vec::new();
        for generation in newest_first {
            if generation.is_current() {
                kept += 1;
            } else if kept < self.keep {
                kept += 1;
            } else {
                doomed.push(generation.clone());
            }
        }
        doomed.sort_by_key(|g| g.id);
        doomed
    }
}

/// Parse `nix-env --list-generations` output.
///
/// Lines look like `  42   2024-03-01 10:15:00   (current)`.
pub fn parse_generations(output: &str, profiles_dir: &Path) -> Result<Vec<NixGeneration>> {
    let mut generations = Vec::new();

    for line in output.lines().map(str::trim).filter(|l| !l.is_empty()) {
        let mut fields = line.split_whitespace();
        let (id, day, time) = match (fields.next(), fields.next(), fields.next()) {
            (Some(id), Some(day), Some(time)) => (id, day, time),
            _ => {
                return Err(SweepError::new(
                    ErrorCode::InvalidGeneration,
                    format!("malformed generation line: {:?}", line),
                ))
            }
        };
        let id: u32 = id
            .parse()
            .ok()
            .filter(|id| *id > 0)
            .ok_or_else(|| {
                SweepError::new(
                    ErrorCode::InvalidGeneration,
                    format!("invalid generation id in {:?}", line),
                )
            })?;
        let naive = NaiveDateTime::parse_from_str(&format!("{} {}", day, time), "%Y-%m-%d %H:%M:%S")
            .map_err(|e| {
                SweepError::new(
                    ErrorCode::InvalidGeneration,
                    format!("invalid generation date in {:?}", line),
                )
                .with_cause(e)
            })?;
        let state = if fields.any(|f| f == "(current)") {
            GenerationState::Current
        } else {
            GenerationState::Historical
        };

        generations.push(NixGeneration {
            id,
            path: profiles_dir.join(format!("profile-{}-link", id)),
            date: Utc.from_utc_datetime(&naive),
            state,
        });
    }

    if generations.iter().filter(|g| g.is_current()).count() > 1 {
        return Err(SweepError::new(
            ErrorCode::InvalidGeneration,
            "more than one generation is marked current",
        ));
    }
    generations.sort_by_key(|g| g.id);
    Ok(generations)
}

fn synthetic_generations(profiles_dir: &Path) -> Vec<NixGeneration> {
    let base = Utc.with_ymd_and_hms(2024, 1, 1, 12, 0, 0).single().unwrap_or_default();
    (1..=5u32)
        .map(|id| NixGeneration {
            id,
            path: profiles_dir.join(format!("profile-{}-link", id)),
            date: base + chrono::Duration::days(i64::from(id) * 7),
            state: if id == 5 {
                GenerationState::Current
            } else {
                GenerationState::Historical
            },
        })
        .collect()
}

impl Cleaner for NixCleaner {
    fn name(&self) -> &str {
        NAME
    }

    fn op_type(&self) -> OperationType {
        OperationType::NixGenerations
    }

    fn is_available(&self, _ctx: &Context) -> bool {
        match self.probe {
            NixProbe::Synthetic => true,
            NixProbe::System => self
                .available
                .get_or_probe(|| self.options.runner.is_installed("nix-env")),
        }
    }

    fn validate_settings(&self, settings: Option<&OperationSettings>) -> Result<()> {
        Self::from_settings(self.options.clone(), settings).map(|_| ())
    }

    fn scan(&self, ctx: &Context) -> Result<Vec<ScanItem>> {
        if !self.is_available(ctx) {
            return Ok(Vec::new());
        }
        let generations = self.generations(ctx)?;
        Ok(self
            .deletable(&generations)
            .into_iter()
            .map(|g| {
                ScanItem::new(g.path.to_string_lossy().into_owned(), 0, ScanType::System)
                    .with_created(Some(g.date.into()))
            })
            .collect())
    }

    fn clean(&self, ctx: &Context) -> Result<CleanResult> {
        self.ensure_available(ctx)?;
        let started = Instant::now();
        let mut result = CleanResult::new(self.options.strategy(false));

        let doomed = self.deletable(&self.generations(ctx)?);
        if doomed.is_empty() {
            debug!(cleaner = NAME, keep = self.keep, "nothing outside the keep window");
            return Ok(result.complete(started));
        }

        if self.options.dry_run {
            result.items_removed = doomed.len() as u64;
            result.size_estimate = SizeEstimate::unknown();
            return Ok(result.complete(started));
        }

        let ids: Vec<String> = doomed.iter().map(|g| g.id.to_string()).collect();
        let mut args = vec!["--delete-generations"];
        args.extend(ids.iter().map(String::as_str));
        self.options
            .step(NAME, format!("deleting generations {}", ids.join(", ")));
        self.options
            .runner
            .run(ctx, "nix-env", &args, timeouts::DEFAULT)?;
        result.items_removed = doomed.len() as u64;

        let gc = self
            .options
            .runner
            .run(ctx, "nix-store", &["--gc"], timeouts::DEFAULT)?;
        result.size_estimate = match parse::parse_nix_freed(&gc.combined()) {
            Some(bytes) => SizeEstimate::known(bytes),
            None => SizeEstimate::unknown(),
        };

        Ok(result.complete(started))
    }

    /// Generation closures are only sized by the garbage collector itself.
    fn scan_estimate(&self, items: &[ScanItem]) -> SizeEstimate {
        if items.is_empty() {
            SizeEstimate::known(0)
        } else {
            SizeEstimate::unknown()
        }
    }

    fn resources(&self) -> Vec<Resource> {
        vec![Resource::NixStore]
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const LISTING: &str = "   1   2024-01-01 10:00:00   \n   2   2024-01-08 10:00:00   \n   3   2024-02-01 09:30:00   (current)\n   4   2024-02-02 11:00:00   \n";

    #[test]
    fn test_parse_generations() {
        let gens = parse_generations(LISTING, Path::new(PROFILES_DIR)).unwrap();
        assert_eq!(gens.len(), 4);
        assert_eq!(gens[2].id, 3);
        assert!(gens[2].is_current());
        assert_eq!(
            gens[0].path,
            PathBuf::from("/nix/var/nix/profiles/profile-1-link")
        );
    }

    #[test]
    fn test_parse_rejects_two_current() {
        let out = "1 2024-01-01 10:00:00 (current)\n2 2024-01-02 10:00:00 (current)\n";
        let err = parse_generations(out, Path::new(PROFILES_DIR)).unwrap_err();
        assert!(err.is(ErrorCode::InvalidGeneration));
    }

    #[test]
    fn test_parse_rejects_garbage() {
        assert!(parse_generations("zero 2024-01-01 10:00:00", Path::new("/")).is_err());
        assert!(parse_generations("0 2024-01-01 10:00:00", Path::new("/")).is_err());
        assert!(parse_generations("1 yesterday noon", Path::new("/")).is_err());
    }

    #[test]
    fn test_keep_window_always_keeps_current() {
        let gens = parse_generations(LISTING, Path::new(PROFILES_DIR)).unwrap();
        let cleaner = NixCleaner::new(CleanerOptions::default(), 1).unwrap();
        let ids: Vec<u32> = cleaner.deletable(&gens).iter().map(|g| g.id).collect();
        // 4 is newest, 3 is current
        assert_eq!(ids, vec![1, 2]);

        let cleaner = NixCleaner::new(CleanerOptions::default(), 5).unwrap();
        assert!(cleaner.deletable(&gens).is_empty());
    }

    #[test]
    fn test_zero_keep_rejected() {
        assert!(NixCleaner::new(CleanerOptions::default(), 0).is_err());
    }
}
