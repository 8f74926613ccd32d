//! Progress tree core data models.
//!
//! Counters, fractions, identifiers and the plain data types shared by the
//! concurrent progress tree in `progtree-progress`.

#![warn(missing_docs)]

// Identities
mod id;

// Counters and fractions
mod unit;

// Subscriber payloads and snapshots
mod update;
mod snapshot;

// Configuration and errors
mod config;
mod error;

// Re-exports
pub use id::*;

pub use unit::{Fraction, Granularity, UnitCount};
pub use update::{DescriptionUpdate, FractionUpdate};
pub use snapshot::ProgressSnapshot;
pub use config::{ProgressConfig, ENV_GRANULARITY, ENV_TOTAL_UNIT_COUNT};
pub use error::{ProgressError, Result};

/// Timestamp type
pub type Time = chrono::DateTime<chrono::Utc>;
