//! Point-in-time view of a progress subtree.

use crate::id::NodeId;
use crate::unit::{Fraction, UnitCount};
use crate::Time;
use serde::{Deserialize, Serialize};

/// A snapshot of one node and its live children.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ProgressSnapshot {
    /// Node the snapshot was taken from
    pub id: NodeId,

    /// When snapshot was taken
    pub taken_at: Time,

    /// Total units
    pub total_unit_count: UnitCount,

    /// Completed units, including folded-in children
    pub completed_unit_count: UnitCount,

    /// Aggregated fraction
    pub fraction_completed: Fraction,

    /// This node's share of its parent's total (0 for roots)
    pub portion_of_parent: UnitCount,

    /// Whether no meaningful fraction can be computed
    pub is_indeterminate: bool,

    /// Whether the node has reached its total
    pub is_finished: bool,

    /// Cancelled locally or through an ancestor
    pub is_cancelled: bool,

    /// Primary description
    pub localized_description: String,

    /// Secondary description
    pub localized_additional_description: String,

    /// Live (not yet completed) children, in attach order
    pub children: Vec<ProgressSnapshot>,
}

impl ProgressSnapshot {
    /// Number of nodes in this snapshot, itself included.
    pub fn node_count(&self) -> usize {
        1 + self.children.iter().map(Self::node_count).sum::<usize>()
    }

    /// Render as pretty-printed JSON.
    pub fn to_json(&self) -> crate::Result<String> {
        Ok(serde_json::to_string_pretty(self)?)
    }
}
