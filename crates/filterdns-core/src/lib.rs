//! Core constants shared across the FilterDNS client crates.

pub mod defaults;

/// Crate version, taken from the workspace manifest.
pub const VERSION: &str = env!("CARGO_PKG_VERSION");
