use clap::{Parser, Subcommand, ValueEnum};
use std::path::PathBuf;

/// devsweep: reclaim disk space from developer caches and build artifacts
#[derive(Parser, Debug)]
#[command(
    name = "devsweep",
    version,
    about = "A developer-aware disk cleanup utility",
    long_about = "devsweep cleans package manager caches, build artifacts, container\n\
                   resources and old toolchain generations, driven by profiles.",
    after_help = "EXAMPLES:\n  \
        devsweep scan                            Scan with the current profile\n  \
        devsweep scan --profile developer        Scan with a specific profile\n  \
        devsweep clean --dry-run                 Report what would be reclaimed\n  \
        devsweep clean --profile quick --yes     Clean without confirmation\n  \
        devsweep list                            Show every known cleaner\n  \
        devsweep config validate --level strict  Validate the config file\n  \
        devsweep profile select aggressive       Change the current profile\n  \
        devsweep --format json scan              Machine-readable output"
)]
pub struct Cli {
    #[command(subcommand)]
    pub command: Commands,

    /// Path to the config file (defaults to ~/.devsweep/config.yaml)
    #[arg(long, global = true, value_name = "PATH", env = "DEVSWEEP_CONFIG")]
    pub config: Option<PathBuf>,

    /// Output format
    #[arg(long, global = true, default_value = "human")]
    pub format: OutputFormat,

    /// Disable colored output
    #[arg(long, global = true)]
    pub no_color: bool,

    /// Verbose output
    #[arg(long, short, global = true)]
    pub verbose: bool,

    /// Quiet mode: minimal output
    #[arg(long, short, global = true)]
    pub quiet: bool,
}

#[derive(Subcommand, Debug)]
pub enum Commands {
    /// List what a profile would clean, without removing anything
    Scan {
        /// Profile to use instead of the current one
        #[arg(long, short, value_name = "NAME")]
        profile: Option<String>,

        /// Show individual items in results
        #[arg(long)]
        detailed: bool,
    },

    /// Run a profile's cleanup operations
    Clean {
        /// Profile to use instead of the current one
        #[arg(long, short, value_name = "NAME")]
        profile: Option<String>,

        /// Report what would be reclaimed without changing anything
        #[arg(long)]
        dry_run: bool,

        /// Skip confirmation prompt
        #[arg(long, short = 'y')]
        yes: bool,
    },

    /// List every registered cleaner and whether it is available
    List,

    /// Manage configuration
    Config {
        #[command(subcommand)]
        action: ConfigAction,
    },

    /// Manage cleanup profiles
    Profile {
        #[command(subcommand)]
        action: ProfileAction,
    },

    /// Generate shell completions
    Completions {
        /// Shell to generate completions for
        #[arg(value_enum)]
        shell: CompletionShell,
    },
}

#[derive(Subcommand, Debug)]
pub enum ConfigAction {
    /// Show current configuration
    Show,

    /// Validate the configuration file
    Validate {
        /// How thoroughly to validate
        #[arg(long, default_value = "comprehensive")]
        level: LevelArg,
    },

    /// Write a default configuration file
    Init {
        /// Overwrite an existing file
        #[arg(long)]
        force: bool,
    },

    /// Protect a path from every cleaner
    Protect {
        /// Absolute path to protect
        path: PathBuf,
    },
}

#[derive(Subcommand, Debug)]
pub enum ProfileAction {
    /// List profiles
    List,

    /// Show one profile's operations
    Show {
        /// Profile name
        name: String,
    },

    /// Make a profile the current one
    Select {
        /// Profile name
        name: String,
    },

    /// Delete a profile
    Delete {
        /// Profile name
        name: String,
    },

    /// Disable a profile
    Disable {
        /// Profile name
        name: String,
    },

    /// Enable a profile
    Enable {
        /// Profile name
        name: String,
    },
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
pub enum OutputFormat {
    Human,
    Json,
    Quiet,
}

#[derive(Debug, Clone, Copy, ValueEnum)]
pub enum LevelArg {
    None,
    Basic,
    Comprehensive,
    Strict,
}

impl From<LevelArg> for crate::common::config::ValidationLevel {
    fn from(level: LevelArg) -> Self {
        use crate::common::config::ValidationLevel;
        match level {
            LevelArg::None => ValidationLevel::None,
            LevelArg::Basic => ValidationLevel::Basic,
            LevelArg::Comprehensive => ValidationLevel::Comprehensive,
            LevelArg::Strict => ValidationLevel::Strict,
        }
    }
}

#[derive(Debug, Clone, Copy, ValueEnum)]
pub enum CompletionShell {
    Bash,
    Zsh,
    Fish,
}

#[cfg(test)]
mod tests {
    use super::*;
    use clap::CommandFactory;

    #[test]
    fn test_cli_definition_is_consistent() {
        Cli::command().debug_assert();
    }

    #[test]
    fn test_parse_clean_flags() {
        let cli = Cli::parse_from(["devsweep", "clean", "--dry-run", "-y", "-p", "quick"]);
        match cli.command {
            Commands::Clean {
                profile,
                dry_run,
                yes,
            } => {
                assert_eq!(profile.as_deref(), Some("quick"));
                assert!(dry_run);
                assert!(yes);
            }
            other => panic!("unexpected command {:?}", other),
        }
    }
}
