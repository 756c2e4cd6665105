//! Subcommand implementations.

pub mod moves;
pub mod show;
