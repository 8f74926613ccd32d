//! Capability surface for progress implementations outside this crate.

use std::sync::Arc;

use async_trait::async_trait;
use progtree_core::UnitCount;

use crate::node::ProgressNode;
use crate::portion::ProgressPortion;

/// The minimal surface a foreign progress tree implements to act as a
/// parent of (or be driven alongside) [`ProgressNode`]s.
///
/// Implementations must eventually reflect an added child's updates in their
/// own completion accounting and must forward their own cancellation to the
/// children they were given. Calls may suspend; nothing is assumed about the
/// implementation's threading.
#[async_trait]
pub trait OpaqueProgress: Send + Sync {
    /// Whether the implementation considers itself cancelled.
    async fn is_cancelled(&self) -> bool;

    /// Cancel. Idempotent.
    async fn cancel(&self);

    /// Completed units.
    async fn completed_unit_count(&self) -> UnitCount;

    /// Overwrite completed units.
    async fn set_completed_unit_count(&self, completed_unit_count: UnitCount);

    /// Attach a core node under this implementation.
    async fn add_child(&self, child: ProgressNode, pending_unit_count: UnitCount);

    /// Capture `pending_unit_count` of this implementation's budget.
    fn pass(self: Arc<Self>, pending_unit_count: UnitCount) -> ProgressPortion
    where
        Self: Sized + 'static,
    {
        let target: Arc<dyn OpaqueProgress> = self;
        ProgressPortion::foreign(&target, pending_unit_count)
    }
}

/// Core nodes speak the same capability, so code written against
/// `OpaqueProgress` drives native trees unchanged.
#[async_trait]
impl OpaqueProgress for ProgressNode {
    async fn is_cancelled(&self) -> bool {
        ProgressNode::is_cancelled(self).await
    }

    async fn cancel(&self) {
        ProgressNode::cancel(self).await
    }

    async fn completed_unit_count(&self) -> UnitCount {
        ProgressNode::completed_unit_count(self).await
    }

    async fn set_completed_unit_count(&self, completed_unit_count: UnitCount) {
        ProgressNode::set_completed_unit_count(self, completed_unit_count).await
    }

    async fn add_child(&self, child: ProgressNode, pending_unit_count: UnitCount) {
        ProgressNode::add_child(self, &child, pending_unit_count).await
    }

    fn pass(self: Arc<Self>, pending_unit_count: UnitCount) -> ProgressPortion {
        ProgressNode::pass(&self, pending_unit_count)
    }
}
