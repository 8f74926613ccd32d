//! The process-wide single-writer serialization domain.
//!
//! Every read and write of node state, in every tree, happens inside
//! [`isolated`]. Entering is the only suspension point: the closure is
//! synchronous, so a mutation and the notification cascade it triggers up or
//! down the tree are observed as one atomic step by every other caller.

use std::sync::OnceLock;
use tokio::sync::{Mutex, MutexGuard};

fn gate() -> &'static Mutex<()> {
    static GATE: OnceLock<Mutex<()>> = OnceLock::new();
    GATE.get_or_init(|| Mutex::new(()))
}

/// Proof of being inside the domain.
///
/// Only [`isolated`] can construct one, so any function taking `&Isolated`
/// can only be reached from inside the critical section.
pub(crate) struct Isolated<'a> {
    _guard: MutexGuard<'a, ()>,
}

/// Enter the domain, run `f`, exit.
pub(crate) async fn isolated<R>(f: impl FnOnce(&Isolated<'_>) -> R) -> R {
    let iso = Isolated {
        _guard: gate().lock().await,
    };
    f(&iso)
}
