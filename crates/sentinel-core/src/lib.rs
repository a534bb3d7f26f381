//! # Sentinel Core
//!
//! Shared building blocks for the sentinel workspace:
//! - Event types flowing through the pipeline (`Sample`, `Anomaly`)
//! - Log channel naming
//! - Configuration loading
//! - The common error type

#![warn(missing_debug_implementations, rust_2018_idioms, unreachable_pub)]

pub mod config;
pub mod error;
pub mod events;
pub mod types;

pub use error::{CorruptRecord, Error, ReadError, Result, WriteError};

/// Re-export commonly used types
pub mod prelude {
    pub use crate::config::Config;
    pub use crate::error::{Error, ReadError, Result, WriteError};
    pub use crate::events::{Anomaly, Sample};
    pub use crate::types::Channel;
}
