//! Concurrent progress tree.
//!
//! Hierarchical, incrementally updated progress with a live fraction
//! aggregated bottom-up, throttled subscriber notifications and cancellation
//! fan-out. Completed children detach from their parent and fold their share
//! into the parent's completed count.
//!
//! ```no_run
//! use progtree_progress::{Granularity, ProgressNode};
//!
//! # async fn run() {
//! let job = ProgressNode::root(100, Granularity::default());
//! job.on_fraction_change(|update| println!("{:.0}%", update.fraction_completed * 100.0))
//!     .await;
//!
//! let download = job.pass(80).make_child(1024, Granularity::default()).await;
//! download.set_completed_unit_count(512).await;
//!
//! // The verification step turned out to be unnecessary.
//! job.pass(20).mark_complete().await;
//! # }
//! ```

#![warn(missing_docs)]

mod backing;
mod domain;

pub mod channel;
pub mod node;
pub mod opaque;
pub mod portion;

pub use channel::NotificationChannel;
pub use node::ProgressNode;
pub use opaque::OpaqueProgress;
pub use portion::ProgressPortion;

pub use progtree_core::{
    DescriptionUpdate, Fraction, FractionUpdate, Granularity, NodeId, ProgressConfig,
    ProgressError, ProgressSnapshot, SubscriptionId, UnitCount,
};
