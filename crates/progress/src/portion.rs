//! Deferred child construction.

use std::sync::{Arc, Weak};

use progtree_core::{Granularity, UnitCount};
use tracing::debug;

use crate::node::{NodeInner, ProgressNode};
use crate::opaque::OpaqueProgress;

#[derive(Clone)]
enum Target {
    Node(Weak<NodeInner>),
    Foreign(Weak<dyn OpaqueProgress>),
    Nothing,
}

/// A share of some node's budget, handed to a callee that does not need to
/// know the node's total.
///
/// A portion holds its target weakly and may outlive it. Once the target is
/// gone every operation degrades quietly: [`make_child`](Self::make_child)
/// yields a root, [`mark_complete`](Self::mark_complete) does nothing, and
/// the portion never reports cancelled.
///
/// Consume a portion once, through either `make_child` or `mark_complete`.
/// Doing both with clones of the same portion counts the budget twice.
#[derive(Clone)]
pub struct ProgressPortion {
    target: Target,
    pending_unit_count: UnitCount,
}

enum Resolved {
    Node(ProgressNode),
    Foreign(Arc<dyn OpaqueProgress>),
}

impl ProgressPortion {
    pub(crate) fn native(node: &ProgressNode, pending_unit_count: UnitCount) -> Self {
        Self {
            target: Target::Node(Arc::downgrade(&node.inner)),
            pending_unit_count,
        }
    }

    /// A portion of a foreign progress implementation's budget.
    pub fn foreign(target: &Arc<dyn OpaqueProgress>, pending_unit_count: UnitCount) -> Self {
        Self {
            target: Target::Foreign(Arc::downgrade(target)),
            pending_unit_count,
        }
    }

    /// A portion with no target; behaves like one whose target is gone.
    pub fn unattached(pending_unit_count: UnitCount) -> Self {
        Self {
            target: Target::Nothing,
            pending_unit_count,
        }
    }

    /// Units this portion represents in its target.
    pub fn pending_unit_count(&self) -> UnitCount {
        self.pending_unit_count
    }

    /// Whether the target still exists.
    pub fn is_alive(&self) -> bool {
        self.resolve().is_some()
    }

    fn resolve(&self) -> Option<Resolved> {
        match &self.target {
            Target::Node(weak) => weak
                .upgrade()
                .map(|inner| Resolved::Node(ProgressNode::from_inner(inner))),
            Target::Foreign(weak) => weak.upgrade().map(Resolved::Foreign),
            Target::Nothing => None,
        }
    }

    /// Build the node that will report against this portion.
    ///
    /// With the target gone the node is an unparented root.
    pub async fn make_child(
        self,
        total_unit_count: UnitCount,
        granularity: Granularity,
    ) -> ProgressNode {
        let child = ProgressNode::root(total_unit_count, granularity);
        match self.resolve() {
            Some(Resolved::Node(parent)) => {
                parent.add_child(&child, self.pending_unit_count).await;
            }
            Some(Resolved::Foreign(parent)) => {
                parent.add_child(child.clone(), self.pending_unit_count).await;
            }
            None => {
                debug!("Portion target gone; node {} starts as a root", child.id());
            }
        }
        child
    }

    /// Count the whole portion as done without building a child.
    ///
    /// A foreign target is updated by reading and then writing its completed
    /// count, since the capability has no increment. Two portions completing
    /// concurrently against the same foreign target can lose one update.
    pub async fn mark_complete(self) {
        match self.resolve() {
            Some(Resolved::Node(target)) => {
                target
                    .increment_completed_unit_count(self.pending_unit_count)
                    .await;
            }
            Some(Resolved::Foreign(target)) => {
                let completed = target.completed_unit_count().await;
                target
                    .set_completed_unit_count(completed.saturating_add(self.pending_unit_count))
                    .await;
            }
            None => {
                debug!("Portion target gone; mark_complete ignored");
            }
        }
    }

    /// Cancel the target, if it still exists.
    pub async fn cancel(&self) {
        match self.resolve() {
            Some(Resolved::Node(target)) => target.cancel().await,
            Some(Resolved::Foreign(target)) => target.cancel().await,
            None => {}
        }
    }

    /// Whether the target is cancelled. Always `false` once it is gone.
    pub async fn is_cancelled(&self) -> bool {
        match self.resolve() {
            Some(Resolved::Node(target)) => target.is_cancelled().await,
            Some(Resolved::Foreign(target)) => target.is_cancelled().await,
            None => false,
        }
    }
}

impl std::fmt::Debug for ProgressPortion {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let target = match &self.target {
            Target::Node(_) => "node",
            Target::Foreign(_) => "foreign",
            Target::Nothing => "nothing",
        };
        f.debug_struct("ProgressPortion")
            .field("target", &target)
            .field("alive", &self.is_alive())
            .field("pending_unit_count", &self.pending_unit_count)
            .finish()
    }
}
