//! Coalescing one-shot dispatcher
//!
//! A single-slot signal: any number of producers calling [`Dispatch::fire`]
//! before the consumer reacts collapses to exactly one wakeup, useful for
//! "advertise now" and "bootstrap now" triggers. Built on
//! `tokio::sync::Notify`, whose `notify_one` already has this coalescing
//! behaviour when there is a single waiting consumer.

use std::sync::Arc;

use tokio::sync::Notify;

/// A coalescing one-shot dispatcher.
#[derive(Clone, Default)]
pub struct Dispatch {
    notify: Arc<Notify>,
}

impl Dispatch {
    pub fn new() -> Self {
        Self {
            notify: Arc::new(Notify::new()),
        }
    }

    /// Signal the dispatcher. Multiple signals before the consumer wakes
    /// collapse into a single wakeup.
    pub fn fire(&self) {
        self.notify.notify_one();
    }

    /// Wait for the next signal.
    pub async fn fired(&self) {
        self.notify.notified().await;
    }
}
