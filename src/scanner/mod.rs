//! Filesystem walking and subprocess output parsing shared by the cleaners.

pub mod parse;
pub mod walker;
