//! Single-subscriber asynchronous delivery pipe.

use tokio::sync::mpsc::{self, UnboundedSender};
use tracing::warn;

/// One subscription's queue plus the task draining it.
///
/// [`send`](Self::send) never blocks and never runs subscriber code. A
/// consumer task spawned at construction receives values in FIFO order and
/// hands each one to the handler. Dropping the channel closes the queue; the
/// consumer delivers whatever was already enqueued and then exits.
pub struct NotificationChannel<T> {
    sender: UnboundedSender<T>,
}

impl<T: Send + 'static> NotificationChannel<T> {
    /// Spawn the consumer for `handler`.
    ///
    /// Must be called from within a tokio runtime.
    pub fn new<F>(mut handler: F) -> Self
    where
        F: FnMut(T) + Send + 'static,
    {
        let (sender, mut receiver) = mpsc::unbounded_channel();
        tokio::spawn(async move {
            while let Some(value) = receiver.recv().await {
                handler(value);
            }
        });
        Self { sender }
    }

    /// Enqueue a value for delivery.
    pub fn send(&self, value: T) {
        if self.sender.send(value).is_err() {
            warn!("Notification consumer has stopped; dropping value");
        }
    }

    /// Whether the consumer task is gone (runtime shut down or handler panicked).
    pub fn is_closed(&self) -> bool {
        self.sender.is_closed()
    }
}

impl<T> std::fmt::Debug for NotificationChannel<T> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("NotificationChannel")
            .field("closed", &self.sender.is_closed())
            .finish()
    }
}
