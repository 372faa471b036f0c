//! Hookline Core - shared infrastructure for the Hookline server
//!
//! Error context, configuration loading, logging initialisation and async helpers
//! used by the AAA core and the operator tooling.

pub mod async_utils;
pub mod config;
pub mod error;
pub mod logging;
pub mod types;

pub use async_utils::*;
pub use error::*;
pub use logging::*;
pub use types::*;

// The logging macros expand to `$crate::tracing` calls
pub use tracing;
