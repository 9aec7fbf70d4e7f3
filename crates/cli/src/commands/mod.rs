//! Subcommand implementations

pub mod capacity;
pub mod containers;
pub mod health;
