//! Mutable state record of one progress node, and fraction aggregation.

use crate::domain::Isolated;
use crate::node::ProgressNode;
use progtree_core::{Fraction, UnitCount};

/// Counters, descriptions, the local cancellation flag and the live children
/// of a single node.
///
/// Counter mutators return `(fraction_completed, is_completed)` so callers
/// can react without walking the subtree a second time.
#[derive(Debug, Default)]
pub(crate) struct Backing {
    pub(crate) total_unit_count: UnitCount,
    pub(crate) completed_unit_count: UnitCount,
    pub(crate) localized_description: String,
    pub(crate) localized_additional_description: String,
    /// Local flag only; ancestors are consulted by the node.
    pub(crate) is_cancelled: bool,
    /// Strongly owned. Children hold only a weak link back.
    pub(crate) children: Vec<ProgressNode>,
}

impl Backing {
    pub(crate) fn new(total_unit_count: UnitCount) -> Self {
        Self {
            total_unit_count,
            ..Default::default()
        }
    }

    pub(crate) fn is_indeterminate(&self) -> bool {
        self.total_unit_count < 0
            || self.completed_unit_count < 0
            || (self.total_unit_count == 0 && self.completed_unit_count == 0)
    }

    pub(crate) fn is_completed(&self) -> bool {
        !self.is_indeterminate() && self.completed_unit_count >= self.total_unit_count
    }

    /// Aggregated fraction over own units and live children.
    ///
    /// Locks each child in turn; the caller holds this node's lock, which
    /// keeps lock order parent before child.
    pub(crate) fn fraction_completed(&self, iso: &Isolated<'_>) -> Fraction {
        let total = self.total_unit_count;
        let completed = self.completed_unit_count;

        if completed >= total && completed > 0 && total >= 0 {
            return 1.0;
        }
        if total <= 0 {
            return 0.0;
        }

        let own = completed.max(0) as f64;
        let children: f64 = self
            .children
            .iter()
            .map(|child| child.weighted_fraction(iso))
            .sum();

        ((own + children) / total as f64).clamp(0.0, 1.0)
    }

    pub(crate) fn status(&self, iso: &Isolated<'_>) -> (Fraction, bool) {
        (self.fraction_completed(iso), self.is_completed())
    }

    pub(crate) fn set_total(&mut self, total: UnitCount, iso: &Isolated<'_>) -> (Fraction, bool) {
        self.total_unit_count = total;
        self.status(iso)
    }

    pub(crate) fn set_completed(
        &mut self,
        completed: UnitCount,
        iso: &Isolated<'_>,
    ) -> (Fraction, bool) {
        self.completed_unit_count = completed;
        self.status(iso)
    }

    pub(crate) fn increment_completed(
        &mut self,
        delta: UnitCount,
        iso: &Isolated<'_>,
    ) -> (Fraction, bool) {
        self.completed_unit_count = self.completed_unit_count.saturating_add(delta);
        self.status(iso)
    }

    pub(crate) fn set_description(&mut self, description: String) {
        self.localized_description = description;
    }

    pub(crate) fn set_additional_description(&mut self, description: String) {
        self.localized_additional_description = description;
    }

    pub(crate) fn cancel(&mut self) {
        self.is_cancelled = true;
    }

    /// Append `child` with `pending_unit_count` as its share. Returns `false`
    /// when the very same node is already a child.
    pub(crate) fn add_child(
        &mut self,
        child: &ProgressNode,
        pending_unit_count: UnitCount,
        iso: &Isolated<'_>,
    ) -> bool {
        if self.children.iter().any(|existing| existing == child) {
            return false;
        }
        child.set_portion_of_parent(pending_unit_count, iso);
        self.children.push(child.clone());
        true
    }

    pub(crate) fn remove_child(&mut self, child: &ProgressNode) -> bool {
        let before = self.children.len();
        self.children.retain(|existing| existing != child);
        self.children.len() != before
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::isolated;
    use progtree_core::Granularity;

    fn backing_with(completed: UnitCount, total: UnitCount) -> Backing {
        Backing {
            total_unit_count: total,
            completed_unit_count: completed,
            ..Default::default()
        }
    }

    #[tokio::test]
    async fn test_indeterminate_table() {
        let table = [
            ((-1, -1), (true, 0.0)),
            ((0, -1), (true, 0.0)),
            ((1, -1), (true, 0.0)),
            ((-1, 0), (true, 0.0)),
            ((0, 0), (true, 0.0)),
            ((1, 0), (false, 1.0)),
            ((-1, 1), (true, 0.0)),
            ((0, 1), (false, 0.0)),
            ((1, 1), (false, 1.0)),
        ];
        isolated(|iso| {
            for ((completed, total), expected) in table {
                let backing = backing_with(completed, total);
                assert_eq!(
                    (backing.is_indeterminate(), backing.fraction_completed(iso)),
                    expected,
                    "completed={completed} total={total}"
                );
            }
        })
        .await;
    }

    #[tokio::test]
    async fn test_fraction_bounds_over_grid() {
        isolated(|iso| {
            for total in -3..=12 {
                for completed in -3..=15 {
                    let fraction = backing_with(completed, total).fraction_completed(iso);
                    assert!(!fraction.is_nan());
                    assert!(
                        (0.0..=1.0).contains(&fraction),
                        "{completed}/{total} -> {fraction}"
                    );
                }
            }
        })
        .await;
    }

    #[tokio::test]
    async fn test_fraction_bounds_with_children() {
        let nearly_done_a = ProgressNode::root(10, Granularity::default());
        let nearly_done_b = ProgressNode::root(10, Granularity::default());
        let halfway = ProgressNode::root(10, Granularity::default());
        nearly_done_a.set_completed_unit_count(9).await;
        nearly_done_b.set_completed_unit_count(9).await;
        halfway.set_completed_unit_count(5).await;

        isolated(|iso| {
            // Portions add up to twice the total.
            let mut overcommitted = Backing::new(10);
            overcommitted.add_child(&nearly_done_a, 10, iso);
            overcommitted.add_child(&nearly_done_b, 10, iso);
            let (fraction, completed) = overcommitted.status(iso);
            assert!(!fraction.is_nan());
            assert_eq!(fraction, 1.0, "overcommitted fraction {fraction}");
            assert!(!completed);

            // A negative portion pulls the sum below zero.
            let mut negative = Backing::new(10);
            negative.completed_unit_count = 2;
            negative.add_child(&halfway, -50, iso);
            let fraction = negative.fraction_completed(iso);
            assert!(!fraction.is_nan());
            assert_eq!(fraction, 0.0, "negative portion fraction {fraction}");

            for portion in [-1000, -10, -1, 0, 1, 7, 10, 1000] {
                for completed in [-5, 0, 3, 9] {
                    let mut backing = Backing::new(10);
                    backing.completed_unit_count = completed;
                    backing.add_child(&halfway, portion, iso);
                    let fraction = backing.fraction_completed(iso);
                    assert!(!fraction.is_nan());
                    assert!(
                        (0.0..=1.0).contains(&fraction),
                        "portion={portion} completed={completed} -> {fraction}"
                    );
                }
            }
        })
        .await;
    }

    #[test]
    fn test_completion_requires_determinate_state() {
        let mut backing = Backing::new(0);
        assert!(!backing.is_completed());
        backing.completed_unit_count = 1;
        assert!(backing.is_completed());
        backing.total_unit_count = 5;
        assert!(!backing.is_completed());
        backing.completed_unit_count = 7;
        assert!(backing.is_completed());
        backing.total_unit_count = -1;
        assert!(!backing.is_completed());
    }

    #[tokio::test]
    async fn test_children_weighted_by_portion() {
        let a = ProgressNode::root(10, Granularity::default());
        let b = ProgressNode::root(4, Granularity::default());
        a.set_completed_unit_count(5).await;
        b.set_completed_unit_count(1).await;

        let (fraction, completed) = isolated(|iso| {
            let mut backing = Backing::new(100);
            backing.completed_unit_count = 10;
            assert!(backing.add_child(&a, 20, iso));
            assert!(backing.add_child(&b, 40, iso));
            backing.status(iso)
        })
        .await;

        // (10 + 0.5 * 20 + 0.25 * 40) / 100
        assert!((fraction - 0.30).abs() < 1e-9);
        assert!(!completed);
    }

    #[tokio::test]
    async fn test_add_child_is_identity_idempotent() {
        let child = ProgressNode::root(10, Granularity::default());
        let twin = ProgressNode::root(10, Granularity::default());
        isolated(|iso| {
            let mut backing = Backing::new(10);
            assert!(backing.add_child(&child, 3, iso));
            assert!(!backing.add_child(&child.clone(), 7, iso));
            assert!(backing.add_child(&twin, 2, iso));
            assert_eq!(backing.children.len(), 2);
            assert_eq!(child.portion_of_parent_in(iso), 3);

            assert!(backing.remove_child(&child));
            assert!(!backing.remove_child(&child));
            assert_eq!(backing.children.len(), 1);
        })
        .await;
    }

    #[tokio::test]
    async fn test_increment_saturates() {
        isolated(|iso| {
            let mut backing = Backing::new(10);
            backing.completed_unit_count = UnitCount::MAX - 1;
            let (fraction, completed) = backing.increment_completed(5, iso);
            assert_eq!(backing.completed_unit_count, UnitCount::MAX);
            assert_eq!(fraction, 1.0);
            assert!(completed);
        })
        .await;
    }
}
