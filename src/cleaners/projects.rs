use std::time::Instant;

use crate::cleaner::{
    AvailabilityCache, CleanResult, Cleaner, CleanerOptions, ScanItem, ScanType, SizeEstimate,
};
use crate::common::errors::Result;
use crate::common::exec::{timeouts, Context};
use crate::profiles::loader::{OperationSettings, OperationType};

const NAME: &str = "projects-mgmt";

pub const PROGRAM: &str = "projects-management-automation";

/// Thin driver for `projects-management-automation --clear-cache`.
#[derive(Debug)]
pub struct ProjectsCleaner {
    options: CleanerOptions,
    available: AvailabilityCache,
}

impl ProjectsCleaner {
    pub fn new(options: CleanerOptions) -> Self {
        Self {
            options,
            available: AvailabilityCache::default(),
        }
    }

    /// Takes no settings.
    pub fn from_settings(
        options: CleanerOptions,
        settings: Option<&OperationSettings>,
    ) -> Result<Self> {
        match settings {
            None => Ok(Self::new(options)),
            Some(other) => Err(other.mismatch(NAME)),
        }
    }
}

impl Cleaner for ProjectsCleaner {
    fn name(&self) -> &str {
        NAME
    }

    fn op_type(&self) -> OperationType {
        OperationType::ProjectsMgmt
    }

    fn is_available(&self, _ctx: &Context) -> bool {
        self.available
            .get_or_probe(|| self.options.runner.is_installed(PROGRAM))
    }

    fn validate_settings(&self, settings: Option<&OperationSettings>) -> Result<()> {
        Self::from_settings(self.options.clone(), settings).map(|_| ())
    }

    fn scan(&self, ctx: &Context) -> Result<Vec<ScanItem>> {
        ctx.check()?;
        if !self.is_available(ctx) {
            return Ok(Vec::new());
        }
        Ok(vec![ScanItem::new(
            format!("{}:cache", PROGRAM),
            0,
            ScanType::Config,
        )])
    }

    fn clean(&self, ctx: &Context) -> Result<CleanResult> {
        self.ensure_available(ctx)?;
        let started = Instant::now();
        let mut result = CleanResult::new(self.options.strategy(false));

        if !self.options.dry_run {
            self.options.step(NAME, "clearing project automation cache");
            self.options
                .runner
                .run(ctx, PROGRAM, &["--clear-cache"], timeouts::DEFAULT)?;
        }
        result.removed(SizeEstimate::unknown());
        Ok(result.complete(started))
    }

    fn scan_estimate(&self, items: &[ScanItem]) -> SizeEstimate {
        if items.is_empty() {
            SizeEstimate::known(0)
        } else {
            SizeEstimate::unknown()
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::common::exec::RecordingRunner;
    use std::sync::Arc;

    #[test]
    fn test_clear_cache_invoked() {
        let runner = Arc::new(RecordingRunner::new().with_installed(&[PROGRAM]));
        let options = CleanerOptions::new(false, false).with_runner(runner.clone());
        let result = ProjectsCleaner::new(options)
            .clean(&Context::background())
            .unwrap();
        assert_eq!(
            runner.calls(),
            vec!["projects-management-automation --clear-cache"]
        );
        assert!(result.size_estimate.is_unknown());
    }

    #[test]
    fn test_settings_rejected() {
        let err = ProjectsCleaner::from_settings(
            CleanerOptions::default(),
            Some(&OperationSettings::Nix { generations: 2 }),
        )
        .unwrap_err();
        assert!(err.is(crate::common::errors::ErrorCode::InvalidConfig));
    }
}
