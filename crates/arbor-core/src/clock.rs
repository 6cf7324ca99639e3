//! Time abstraction for testability
//!
//! Timers are monotonic; wall-clock is never used for protocol decisions.
//! [`Clock`] lets tests drive announcement-timeout and bootstrap-interval
//! logic under `tokio::time::pause`/`advance` without depending on real
//! sleep durations.

use std::sync::Arc;
use std::time::{Duration, Instant};

/// Abstraction over monotonic time and sleeping.
pub trait Clock: Send + Sync {
    fn now(&self) -> Instant;
    fn sleep(&self, duration: Duration) -> std::pin::Pin<Box<dyn std::future::Future<Output = ()> + Send>>;
}

/// Real clock backed by `std::time`/`tokio::time`.
#[derive(Debug, Clone, Copy, Default)]
pub struct SystemClock;

impl Clock for SystemClock {
    fn now(&self) -> Instant {
        Instant::now()
    }

    fn sleep(&self, duration: Duration) -> std::pin::Pin<Box<dyn std::future::Future<Output = ()> + Send>> {
        Box::pin(tokio::time::sleep(duration))
    }
}

/// Convenience alias used throughout the router/tree/snake crates.
pub type SharedClock = Arc<dyn Clock>;

pub fn system_clock() -> SharedClock {
    Arc::new(SystemClock)
}
