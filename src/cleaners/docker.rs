use serde::{Deserialize, Serialize};
use std::time::Instant;

use tracing::debug;

use crate::cleaner::{
    AvailabilityCache, CleanResult, Cleaner, CleanerOptions, Resource, ScanItem, ScanType,
    SizeEstimate,
};
use crate::common::errors::Result;
use crate::common::exec::{timeouts, Context};
use crate::profiles::loader::{OperationSettings, OperationType};
use crate::scanner::parse;

const NAME: &str = "docker";

/// What `docker ... prune` should remove.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum DockerPruneMode {
    /// `system prune -af --volumes`
    #[default]
    All,
    Images,
    Containers,
    Volumes,
    Builds,
}

impl DockerPruneMode {
    fn prune_args(self) -> &'static [&'static str] {
        match self {
            DockerPruneMode::All => &["system", "prune", "-af", "--volumes"],
            DockerPruneMode::Images => &["image", "prune", "-f"],
            DockerPruneMode::Containers => &["container", "prune", "-f"],
            DockerPruneMode::Volumes => &["volume", "prune", "-f"],
            DockerPruneMode::Builds => &["builder", "prune", "-f"],
        }
    }

    fn includes(self, other: DockerPruneMode) -> bool {
        self == DockerPruneMode::All || self == other
    }
}

/// Prunes unused Docker objects through the Docker CLI.
#[derive(Debug)]
pub struct DockerCleaner {
    options: CleanerOptions,
    mode: DockerPruneMode,
    available: AvailabilityCache,
}

impl DockerCleaner {
    pub fn new(options: CleanerOptions, mode: DockerPruneMode) -> Self {
        Self {
            options,
            mode,
            available: AvailabilityCache::default(),
        }
    }

    pub fn from_settings(
        options: CleanerOptions,
        settings: Option<&OperationSettings>,
    ) -> Result<Self> {
        match settings {
            None => Ok(Self::new(options, DockerPruneMode::default())),
            Some(OperationSettings::Docker { mode }) => Ok(Self::new(options, *mode)),
            Some(other) => Err(other.mismatch(NAME)),
        }
    }

    pub fn mode(&self) -> DockerPruneMode {
        self.mode
    }

    fn docker(&self, ctx: &Context, args: &[&str]) -> Result<String> {
        Ok(self
            .options
            .runner
            .run(ctx, "docker", args, timeouts::DOCKER)?
            .stdout)
    }

    /// Dangling images
    fn scan_images(&self, ctx: &Context) -> Result<Vec<ScanItem>> {
        let out = self.docker(
            ctx,
            &["images", "-f", "dangling=true", "--format", "{{.ID}}\t{{.Size}}"],
        )?;
        tab_rows(&out)
            .map(|(id, size)| -> Result<ScanItem> {
                Ok(ScanItem::new(
                    format!("docker:image:{}", id),
                    parse::parse_docker_size(size)?,
                    ScanType::System,
                ))
            })
            .collect()
    }

    /// Exited containers
    fn scan_containers(&self, ctx: &Context) -> Result<Vec<ScanItem>> {
        let out = self.docker(
            ctx,
            &[
                "ps",
                "-a",
                "-f",
                "status=exited",
                "--size",
                "--format",
                "{{.ID}}\t{{.Size}}",
            ],
        )?;
        tab_rows(&out)
            .map(|(id, size)| -> Result<ScanItem> {
                Ok(ScanItem::new(
                    format!("docker:container:{}", id),
                    parse::parse_container_size(size)?,
                    ScanType::System,
                ))
            })
            .collect()
    }

    /// Volumes no container references
    fn scan_volumes(&self, ctx: &Context) -> Result<Vec<ScanItem>> {
        let out = self.docker(
            ctx,
            &["volume", "ls", "-f", "dangling=true", "--format", "{{json .}}"],
        )?;
        Ok(parse::parse_volume_names(&out)
            .into_iter()
            .map(|name| ScanItem::new(format!("docker:volume:{}", name), 0, ScanType::System))
            .collect())
    }

    fn scan_build_cache(&self, ctx: &Context) -> Result<Vec<ScanItem>> {
        let out = self.docker(
            ctx,
            &["system", "df", "--format", "{{.Type}}\t{{.Reclaimable}}"],
        )?;
        for (kind, reclaimable) in tab_rows(&out) {
            if kind == "Build Cache" {
                let size = parse::parse_container_size(strip_percentage(reclaimable))?;
                if size > 0 {
                    return Ok(vec![ScanItem::new(
                        "docker:build-cache",
                        size,
                        ScanType::System,
                    )]);
                }
            }
        }
        Ok(Vec::new())
    }
}

/// Split `a\tb` rows, ignoring blank or short lines.
fn tab_rows(output: &str) -> impl Iterator<Item = (&str, &str)> {
    output
        .lines()
        .filter_map(|line| line.split_once('\t'))
        .map(|(a, b)| (a.trim(), b.trim()))
        .filter(|(a, _)| !a.is_empty())
}

/// `1.2GB (100%)` -> `1.2GB`
fn strip_percentage(s: &str) -> &str {
    s.split_once(" (").map_or(s, |(size, _)| size)
}

impl Cleaner for DockerCleaner {
    fn name(&self) -> &str {
        NAME
    }

    fn op_type(&self) -> OperationType {
        OperationType::Docker
    }

    /// Installed and the daemon answers.
    fn is_available(&self, ctx: &Context) -> bool {
        self.available.get_or_probe(|| {
            self.options.runner.is_installed("docker")
                && self
                    .options
                    .runner
                    .run(
                        ctx,
                        "docker",
                        &["info", "--format", "{{.ServerVersion}}"],
                        timeouts::PROBE,
                    )
                    .is_ok()
        })
    }

    fn validate_settings(&self, settings: Option<&OperationSettings>) -> Result<()> {
        Self::from_settings(self.options.clone(), settings).map(|_| ())
    }

    fn scan(&self, ctx: &Context) -> Result<Vec<ScanItem>> {
        let mut items = Vec::new();
        if self.mode.includes(DockerPruneMode::Images) {
            items.extend(self.scan_images(ctx)?);
        }
        if self.mode.includes(DockerPruneMode::Containers) {
            items.extend(self.scan_containers(ctx)?);
        }
        if self.mode.includes(DockerPruneMode::Volumes) {
            items.extend(self.scan_volumes(ctx)?);
        }
        if self.mode.includes(DockerPruneMode::Builds) {
            items.extend(self.scan_build_cache(ctx)?);
        }
        debug!(cleaner = NAME, count = items.len(), "scan complete");
        Ok(items)
    }

    fn clean(&self, ctx: &Context) -> Result<CleanResult> {
        self.ensure_available(ctx)?;
        let started = Instant::now();
        let aggressive = self.mode == DockerPruneMode::All;
        let mut result = CleanResult::new(self.options.strategy(aggressive));

        if self.options.dry_run {
            let items = self.scan(ctx)?;
            result.items_removed = items.len() as u64;
            result.size_estimate = self.scan_estimate(&items);
            return Ok(result.complete(started));
        }

        let args = self.mode.prune_args();
        self.options
            .step(NAME, format!("running docker {}", args.join(" ")));
        let output = self.docker(ctx, args)?;
        let reclaimed = parse::parse_reclaimed_space(&output)?;

        result.items_removed = parse::count_pruned_objects(&output);
        result.size_estimate = SizeEstimate::known(reclaimed.max(0) as u64);
        Ok(result.complete(started))
    }

    /// Volume sizes are not listed by `docker volume ls`, so any non-empty
    /// scan is an estimate.
    fn scan_estimate(&self, items: &[ScanItem]) -> SizeEstimate {
        if items.is_empty() {
            return SizeEstimate::known(0);
        }
        SizeEstimate::estimated(items.iter().map(ScanItem::size_bytes).sum())
    }

    fn resources(&self) -> Vec<Resource> {
        vec![Resource::DockerDaemon]
    }
}
