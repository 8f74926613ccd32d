//! Payloads delivered to subscribers.

use crate::unit::{Fraction, UnitCount};
use serde::{Deserialize, Serialize};

/// Delivered to fraction subscribers when a node crosses its granularity
/// threshold or completes.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct FractionUpdate {
    /// Completed units at the time of the change
    pub completed_unit_count: UnitCount,

    /// Total units at the time of the change
    pub total_unit_count: UnitCount,

    /// Aggregated fraction, including live children
    pub fraction_completed: Fraction,
}

/// Delivered to description subscribers whenever either string changes.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct DescriptionUpdate {
    /// Primary description
    pub localized_description: String,

    /// Secondary, more detailed description
    pub localized_additional_description: String,
}
