//! Concrete cleanup sources.
//!
//! Each cleaner is configured once at construction from optional
//! `OperationSettings`; bad settings fail here, never at first use.

pub mod build_cache;
pub mod cargo;
pub mod compiled_binaries;
pub mod docker;
pub mod golang;
pub mod homebrew;
pub mod lang_version;
pub mod nix;
pub mod node;
pub mod projects;
pub mod system_cache;
pub mod temp_files;

use std::sync::Arc;

use crate::cleaner::{Cleaner, CleanerOptions};
use crate::common::errors::Result;
use crate::profiles::loader::{OperationSettings, OperationType};

pub use build_cache::BuildCacheCleaner;
pub use cargo::CargoCleaner;
pub use compiled_binaries::CompiledBinariesCleaner;
pub use docker::DockerCleaner;
pub use golang::GoCleaner;
pub use homebrew::HomebrewCleaner;
pub use lang_version::LangVersionCleaner;
pub use nix::NixCleaner;
pub use node::NodeCleaner;
pub use projects::ProjectsCleaner;
pub use system_cache::SystemCacheCleaner;
pub use temp_files::TempFilesCleaner;

/// Construct the cleaner for `op`, applying `settings` when present.
pub fn build(
    op: OperationType,
    options: &CleanerOptions,
    settings: Option<&OperationSettings>,
) -> Result<Arc<dyn Cleaner>> {
    let options = options.clone();
    let cleaner: Arc<dyn Cleaner> = match op {
        OperationType::NixGenerations => Arc::new(NixCleaner::from_settings(options, settings)?),
        OperationType::Homebrew => Arc::new(HomebrewCleaner::from_settings(options, settings)?),
        OperationType::TempFiles => Arc::new(TempFilesCleaner::from_settings(options, settings)?),
        OperationType::NodePackages => Arc::new(NodeCleaner::from_settings(options, settings)?),
        OperationType::GoPackages => Arc::new(GoCleaner::from_settings(options, settings)?),
        OperationType::Cargo => Arc::new(CargoCleaner::from_settings(options, settings)?),
        OperationType::BuildCache => Arc::new(BuildCacheCleaner::from_settings(options, settings)?),
        OperationType::Docker => Arc::new(DockerCleaner::from_settings(options, settings)?),
        OperationType::SystemCache => {
            Arc::new(SystemCacheCleaner::from_settings(options, settings)?)
        }
        OperationType::LangVersion => {
            Arc::new(LangVersionCleaner::from_settings(options, settings)?)
        }
        OperationType::ProjectsMgmt => Arc::new(ProjectsCleaner::from_settings(options, settings)?),
        OperationType::CompiledBinaries => {
            Arc::new(CompiledBinariesCleaner::from_settings(options, settings)?)
        }
        OperationType::ProjectExecutables => Arc::new(
            CompiledBinariesCleaner::project_executables_from_settings(options, settings)?,
        ),
    };
    Ok(cleaner)
}
