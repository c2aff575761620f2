//! Core functionality for the memory sampler

pub mod types;

pub use types::*;

/// Crate version
pub const VERSION: &str = env!("CARGO_PKG_VERSION");
