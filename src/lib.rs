//! # devsweep
//!
//! A developer-aware disk cleanup utility.
//!
//! devsweep reclaims space held by package manager caches, build artifacts,
//! container resources and old toolchain generations. It features:
//!
//! - **Uniform cleaners**: every source implements the same `Cleaner` contract
//! - **Dry-run everywhere**: a dry run reports sizes and never mutates state
//! - **Profiles**: quick, developer and aggressive presets in a YAML config
//! - **Safety-first**: protected paths and a risk gate before anything runs
//! - **Honest sizes**: totals say when a byte count is estimated or unknown

pub mod cleaner;
pub mod cleaners;
pub mod cli;
pub mod common;
pub mod profiles;
pub mod scanner;
