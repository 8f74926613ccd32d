//! Progress nodes: mutation, detachment on completion, cancellation and
//! subscriber notification.

use std::collections::HashMap;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError, Weak};

use progtree_core::{
    DescriptionUpdate, Fraction, FractionUpdate, Granularity, NodeId, ProgressConfig,
    ProgressSnapshot, SubscriptionId, UnitCount,
};
use tracing::{debug, trace, warn};

use crate::backing::Backing;
use crate::channel::NotificationChannel;
use crate::domain::{isolated, Isolated};
use crate::portion::ProgressPortion;

/// Handle to one node of a progress tree.
///
/// Cloning the handle is cheap and yields the same node. A node is kept
/// alive by its parent's children list or by any outstanding handle; the
/// link from a child to its parent is weak.
///
/// Every accessor and mutator enters the process-wide serialization domain,
/// so each is an `.await` point. Once inside, a mutation and the
/// notification cascade it triggers complete without suspending.
#[derive(Clone)]
pub struct ProgressNode {
    pub(crate) inner: Arc<NodeInner>,
}

pub(crate) struct NodeInner {
    id: NodeId,
    granularity: Granularity,
    state: Mutex<NodeState>,
}

struct NodeState {
    backing: Backing,
    parent: Option<Weak<NodeInner>>,
    portion_of_parent: UnitCount,
    last_notified_fraction: Fraction,
    cancellation: HashMap<SubscriptionId, NotificationChannel<()>>,
    fraction: HashMap<SubscriptionId, NotificationChannel<FractionUpdate>>,
    description: HashMap<SubscriptionId, NotificationChannel<DescriptionUpdate>>,
}

impl ProgressNode {
    /// Create an unparented node.
    pub fn root(total_unit_count: UnitCount, granularity: Granularity) -> Self {
        let node = Self {
            inner: Arc::new(NodeInner {
                id: NodeId::new(),
                granularity,
                state: Mutex::new(NodeState {
                    backing: Backing::new(total_unit_count),
                    parent: None,
                    portion_of_parent: 0,
                    last_notified_fraction: 0.0,
                    cancellation: HashMap::new(),
                    fraction: HashMap::new(),
                    description: HashMap::new(),
                }),
            }),
        };
        trace!("Created node {} (total {})", node.id(), total_unit_count);
        node
    }

    /// Create a node and attach it beneath `parent` with `pending_unit_count`
    /// as its share of the parent's total.
    pub async fn with_parent(
        parent: &ProgressNode,
        pending_unit_count: UnitCount,
        total_unit_count: UnitCount,
        granularity: Granularity,
    ) -> Self {
        let node = Self::root(total_unit_count, granularity);
        parent.add_child(&node, pending_unit_count).await;
        node
    }

    /// Create an unparented node from configured defaults.
    pub fn from_config(config: &ProgressConfig) -> progtree_core::Result<Self> {
        Ok(Self::root(
            config.default_total_unit_count,
            config.granularity()?,
        ))
    }

    pub(crate) fn from_inner(inner: Arc<NodeInner>) -> Self {
        Self { inner }
    }

    /// Unique identifier, stable for the node's lifetime.
    pub fn id(&self) -> NodeId {
        self.inner.id
    }

    /// Threshold fixed at construction.
    pub fn granularity(&self) -> Granularity {
        self.inner.granularity
    }

    /// Capture `pending_unit_count` of this node's budget for a callee.
    ///
    /// The portion holds only a weak reference and does not keep this node
    /// alive.
    pub fn pass(&self, pending_unit_count: UnitCount) -> ProgressPortion {
        ProgressPortion::native(self, pending_unit_count)
    }

    // === Reads ===

    /// Total unit count.
    pub async fn total_unit_count(&self) -> UnitCount {
        isolated(|iso| self.state(iso).backing.total_unit_count).await
    }

    /// Completed unit count, including shares folded in from finished children.
    pub async fn completed_unit_count(&self) -> UnitCount {
        isolated(|iso| self.state(iso).backing.completed_unit_count).await
    }

    /// Aggregated fraction in `[0.0, 1.0]`.
    pub async fn fraction_completed(&self) -> Fraction {
        isolated(|iso| self.status(iso).0).await
    }

    /// Whether no meaningful fraction can be computed.
    pub async fn is_indeterminate(&self) -> bool {
        isolated(|iso| self.state(iso).backing.is_indeterminate()).await
    }

    /// Whether completed has reached total on a determinate node.
    pub async fn is_finished(&self) -> bool {
        isolated(|iso| self.state(iso).backing.is_completed()).await
    }

    /// Cancelled locally or through any ancestor.
    pub async fn is_cancelled(&self) -> bool {
        isolated(|iso| self.is_cancelled_in(iso)).await
    }

    /// Primary description.
    pub async fn localized_description(&self) -> String {
        isolated(|iso| self.state(iso).backing.localized_description.clone()).await
    }

    /// Secondary description.
    pub async fn localized_additional_description(&self) -> String {
        isolated(|iso| {
            self.state(iso)
                .backing
                .localized_additional_description
                .clone()
        })
        .await
    }

    /// Current parent, if attached and still alive.
    pub async fn parent(&self) -> Option<ProgressNode> {
        isolated(|iso| self.parent_in(iso)).await
    }

    /// Share of the parent's total. Meaningless for roots.
    pub async fn portion_of_parent(&self) -> UnitCount {
        isolated(|iso| self.portion_of_parent_in(iso)).await
    }

    /// Live children in attach order.
    pub async fn children(&self) -> Vec<ProgressNode> {
        isolated(|iso| self.state(iso).backing.children.clone()).await
    }

    /// Number of live children.
    pub async fn children_count(&self) -> usize {
        isolated(|iso| self.state(iso).backing.children.len()).await
    }

    /// Number of registered subscriptions across all notification kinds.
    pub async fn subscription_count(&self) -> usize {
        isolated(|iso| {
            let state = self.state(iso);
            state.cancellation.len() + state.fraction.len() + state.description.len()
        })
        .await
    }

    /// Recursive point-in-time view of this node and its live children.
    pub async fn snapshot(&self) -> ProgressSnapshot {
        isolated(|iso| {
            let inherited = self
                .parent_in(iso)
                .is_some_and(|parent| parent.is_cancelled_in(iso));
            self.snapshot_in(inherited, chrono::Utc::now(), iso)
        })
        .await
    }

    // === Mutations ===

    /// Set total units.
    pub async fn set_total_unit_count(&self, total_unit_count: UnitCount) {
        isolated(|iso| {
            let (fraction, completed) = self
                .state(iso)
                .backing
                .set_total(total_unit_count, iso);
            self.propagate_fraction(fraction, completed, iso);
        })
        .await
    }

    /// Set completed units.
    pub async fn set_completed_unit_count(&self, completed_unit_count: UnitCount) {
        isolated(|iso| {
            let (fraction, completed) = self
                .state(iso)
                .backing
                .set_completed(completed_unit_count, iso);
            self.propagate_fraction(fraction, completed, iso);
        })
        .await
    }

    /// Add `delta` to completed units.
    pub async fn increment_completed_unit_count(&self, delta: UnitCount) {
        isolated(|iso| self.increment_in(delta, iso)).await
    }

    /// Set the primary description and notify description subscribers.
    pub async fn set_localized_description(&self, description: impl Into<String>) {
        let description = description.into();
        isolated(|iso| {
            self.state(iso).backing.set_description(description);
            self.fire_description(iso);
        })
        .await
    }

    /// Set the secondary description and notify description subscribers.
    pub async fn set_localized_additional_description(&self, description: impl Into<String>) {
        let description = description.into();
        isolated(|iso| {
            self.state(iso)
                .backing
                .set_additional_description(description);
            self.fire_description(iso);
        })
        .await
    }

    /// Cancel this node and push the notification through its current
    /// subtree. Idempotent.
    ///
    /// Nodes attached after this call are not notified, but they do report
    /// cancelled through [`is_cancelled`](Self::is_cancelled).
    pub async fn cancel(&self) {
        isolated(|iso| {
            self.state(iso).backing.cancel();
            debug!("Cancelling node {}", self.id());
            self.propagate_cancellation(iso);
        })
        .await
    }

    /// Attach `child` beneath this node with `pending_unit_count` as its share.
    ///
    /// Adding a node that is already a child is a no-op. A child attached
    /// elsewhere is moved here. Attaching a node beneath itself or one of its
    /// own descendants is refused.
    pub async fn add_child(&self, child: &ProgressNode, pending_unit_count: UnitCount) {
        isolated(|iso| self.attach(child, pending_unit_count, iso)).await
    }

    // === Subscriptions ===

    /// Invoke `handler` whenever the fraction moves by at least the node's
    /// granularity, and on every change once completed.
    pub async fn on_fraction_change<F>(&self, handler: F) -> SubscriptionId
    where
        F: FnMut(FractionUpdate) + Send + 'static,
    {
        let id = SubscriptionId::new();
        isolated(|iso| {
            let channel = NotificationChannel::new(handler);
            self.state(iso).fraction.insert(id, channel);
        })
        .await;
        debug!("Node {} registered fraction subscription {}", self.id(), id);
        id
    }

    /// Invoke `handler` whenever either description string changes.
    pub async fn on_description_change<F>(&self, handler: F) -> SubscriptionId
    where
        F: FnMut(DescriptionUpdate) + Send + 'static,
    {
        let id = SubscriptionId::new();
        isolated(|iso| {
            let channel = NotificationChannel::new(handler);
            self.state(iso).description.insert(id, channel);
        })
        .await;
        debug!("Node {} registered description subscription {}", self.id(), id);
        id
    }

    /// Invoke `handler` once when this node or an ancestor is cancelled.
    ///
    /// If the node already reports cancelled, `handler` fires right away and
    /// nothing is registered.
    pub async fn on_cancel<F>(&self, handler: F) -> SubscriptionId
    where
        F: FnOnce() + Send + 'static,
    {
        let id = SubscriptionId::new();
        let mut handler = Some(handler);
        isolated(|iso| {
            let channel = NotificationChannel::new(move |()| {
                if let Some(handler) = handler.take() {
                    handler();
                }
            });
            if self.is_cancelled_in(iso) {
                debug!("Node {} already cancelled; firing {} now", self.id(), id);
                channel.send(());
            } else {
                self.state(iso).cancellation.insert(id, channel);
                debug!("Node {} registered cancellation subscription {}", self.id(), id);
            }
        })
        .await;
        id
    }

    /// Remove a subscription of any kind. Returns whether it was present.
    pub async fn unsubscribe(&self, id: SubscriptionId) -> bool {
        let removed = isolated(|iso| {
            let mut state = self.state(iso);
            let removed = state.fraction.remove(&id).is_some()
                || state.description.remove(&id).is_some()
                || state.cancellation.remove(&id).is_some();
            removed
        })
        .await;
        if removed {
            debug!("Node {} removed subscription {}", self.id(), id);
        }
        removed
    }

    // === Inside the domain ===

    fn state<'a>(&'a self, _iso: &Isolated<'_>) -> MutexGuard<'a, NodeState> {
        // Only ever locked inside the domain, so the lock is uncontended.
        self.inner
            .state
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
    }

    fn status(&self, iso: &Isolated<'_>) -> (Fraction, bool) {
        self.state(iso).backing.status(iso)
    }

    fn parent_in(&self, iso: &Isolated<'_>) -> Option<ProgressNode> {
        let parent = self.state(iso).parent.clone();
        parent.and_then(|weak| weak.upgrade()).map(Self::from_inner)
    }

    pub(crate) fn portion_of_parent_in(&self, iso: &Isolated<'_>) -> UnitCount {
        self.state(iso).portion_of_parent
    }

    pub(crate) fn set_portion_of_parent(&self, pending_unit_count: UnitCount, iso: &Isolated<'_>) {
        self.state(iso).portion_of_parent = pending_unit_count;
    }

    /// This node's contribution to its parent's fraction.
    pub(crate) fn weighted_fraction(&self, iso: &Isolated<'_>) -> Fraction {
        let state = self.state(iso);
        state.backing.fraction_completed(iso) * state.portion_of_parent as f64
    }

    pub(crate) fn is_cancelled_in(&self, iso: &Isolated<'_>) -> bool {
        // Release our own lock before reading the parent.
        let (local, parent) = {
            let state = self.state(iso);
            (state.backing.is_cancelled, state.parent.clone())
        };
        local
            || parent
                .and_then(|weak| weak.upgrade())
                .is_some_and(|parent| Self::from_inner(parent).is_cancelled_in(iso))
    }

    fn increment_in(&self, delta: UnitCount, iso: &Isolated<'_>) {
        let (fraction, completed) = self.state(iso).backing.increment_completed(delta, iso);
        self.propagate_fraction(fraction, completed, iso);
    }

    fn is_ancestor_of(&self, node: &ProgressNode, iso: &Isolated<'_>) -> bool {
        let mut current = node.parent_in(iso);
        while let Some(ancestor) = current {
            if ancestor == *self {
                return true;
            }
            current = ancestor.parent_in(iso);
        }
        false
    }

    fn attach(&self, child: &ProgressNode, pending_unit_count: UnitCount, iso: &Isolated<'_>) {
        if child == self || child.is_ancestor_of(self, iso) {
            warn!(
                "Refusing to attach node {} beneath {}: it would own itself",
                child.id(),
                self.id()
            );
            return;
        }

        let previous = child.parent_in(iso);
        if previous.as_ref() == Some(self) {
            return;
        }
        if let Some(previous) = &previous {
            previous.state(iso).backing.remove_child(child);
            debug!("Moving node {} from {} to {}", child.id(), previous.id(), self.id());
        }

        let added = self
            .state(iso)
            .backing
            .add_child(child, pending_unit_count, iso);
        if !added {
            return;
        }
        child.state(iso).parent = Some(Arc::downgrade(&self.inner));
        debug!(
            "Attached node {} to {} with portion {}",
            child.id(),
            self.id(),
            pending_unit_count
        );

        // An already finished child is folded in immediately.
        let (child_fraction, child_completed) = child.status(iso);
        if child_completed {
            child.propagate_fraction(child_fraction, child_completed, iso);
        } else {
            let (fraction, completed) = self.status(iso);
            self.propagate_fraction(fraction, completed, iso);
        }

        if let Some(previous) = previous {
            let (fraction, completed) = previous.status(iso);
            previous.propagate_fraction(fraction, completed, iso);
        }
    }

    /// React to a counter change on this node: detach when completed under a
    /// parent, otherwise notify when the granularity threshold is crossed, and
    /// let the parent re-check its own threshold.
    fn propagate_fraction(&self, fraction: Fraction, completed: bool, iso: &Isolated<'_>) {
        let parent = self.parent_in(iso);

        if let (true, Some(parent)) = (completed, &parent) {
            let portion = {
                let mut state = self.state(iso);
                state.parent = None;
                state.portion_of_parent
            };
            let (parent_fraction, parent_completed) = {
                let mut parent_state = parent.state(iso);
                parent_state.backing.remove_child(self);
                parent_state.backing.increment_completed(portion, iso)
            };
            debug!(
                "Node {} completed; detached from {} folding {} units",
                self.id(),
                parent.id(),
                portion
            );
            self.fire_fraction(fraction, iso);
            parent.propagate_fraction(parent_fraction, parent_completed, iso);
            return;
        }

        let last = self.state(iso).last_notified_fraction;
        if !completed && (fraction - last).abs() < self.inner.granularity.get() {
            trace!(
                "Node {} fraction {:.4} within granularity of {:.4}",
                self.id(),
                fraction,
                last
            );
            return;
        }

        self.fire_fraction(fraction, iso);
        if let Some(parent) = parent {
            let (parent_fraction, parent_completed) = parent.status(iso);
            parent.propagate_fraction(parent_fraction, parent_completed, iso);
        }
    }

    fn fire_fraction(&self, fraction: Fraction, iso: &Isolated<'_>) {
        let mut state = self.state(iso);
        state.last_notified_fraction = fraction;
        let update = FractionUpdate {
            completed_unit_count: state.backing.completed_unit_count,
            total_unit_count: state.backing.total_unit_count,
            fraction_completed: fraction,
        };
        trace!(
            "Node {} notifying {} fraction subscribers: {:.4}",
            self.id(),
            state.fraction.len(),
            fraction
        );
        for channel in state.fraction.values() {
            channel.send(update);
        }
    }

    fn fire_description(&self, iso: &Isolated<'_>) {
        let state = self.state(iso);
        let update = DescriptionUpdate {
            localized_description: state.backing.localized_description.clone(),
            localized_additional_description: state
                .backing
                .localized_additional_description
                .clone(),
        };
        trace!(
            "Node {} notifying {} description subscribers",
            self.id(),
            state.description.len()
        );
        for channel in state.description.values() {
            channel.send(update.clone());
        }
    }

    /// Fire and drop this node's cancellation subscriptions, then recurse
    /// into every current child regardless of its local flag.
    fn propagate_cancellation(&self, iso: &Isolated<'_>) {
        let (channels, children) = {
            let mut state = self.state(iso);
            (
                std::mem::take(&mut state.cancellation),
                state.backing.children.clone(),
            )
        };
        for channel in channels.into_values() {
            channel.send(());
        }
        for child in children {
            child.propagate_cancellation(iso);
        }
    }

    fn snapshot_in(
        &self,
        inherited_cancel: bool,
        taken_at: progtree_core::Time,
        iso: &Isolated<'_>,
    ) -> ProgressSnapshot {
        let (mut snapshot, children) = {
            let state = self.state(iso);
            let backing = &state.backing;
            let snapshot = ProgressSnapshot {
                id: self.id(),
                taken_at,
                total_unit_count: backing.total_unit_count,
                completed_unit_count: backing.completed_unit_count,
                fraction_completed: backing.fraction_completed(iso),
                portion_of_parent: if state.parent.is_some() {
                    state.portion_of_parent
                } else {
                    0
                },
                is_indeterminate: backing.is_indeterminate(),
                is_finished: backing.is_completed(),
                is_cancelled: inherited_cancel || backing.is_cancelled,
                localized_description: backing.localized_description.clone(),
                localized_additional_description: backing
                    .localized_additional_description
                    .clone(),
                children: Vec::new(),
            };
            (snapshot, backing.children.clone())
        };
        let cancelled = snapshot.is_cancelled;
        snapshot.children = children
            .iter()
            .map(|child| child.snapshot_in(cancelled, taken_at, iso))
            .collect();
        snapshot
    }
}

impl PartialEq for ProgressNode {
    fn eq(&self, other: &Self) -> bool {
        Arc::ptr_eq(&self.inner, &other.inner)
    }
}

impl Eq for ProgressNode {}

impl std::fmt::Debug for ProgressNode {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ProgressNode")
            .field("id", &self.inner.id)
            .field("granularity", &self.inner.granularity)
            .finish_non_exhaustive()
    }
}
