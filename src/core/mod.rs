//! Core domain types, configuration and errors.
//!
//! Everything else in the crate depends on this module; it depends on
//! nothing else in the crate.

#![warn(missing_docs)]

pub mod config;
pub mod error;
pub mod types;

// Re-export commonly used types
pub use config::{Config, ConfigBuilder};
pub use error::{HomeMetricsError, Result};
pub use types::{FieldValue, Fields, Metric, Tags, ID_TAG, NAME_TAG};
