//! Router configuration
//!
//! Plain struct with a `Default` impl and builder-style `with_*` setters.

use std::time::Duration;

use arbor_peer::DEFAULT_ANNOUNCE_DEADLINE;
use arbor_snake::DEFAULT_BOOTSTRAP_INTERVAL;
use arbor_switch::MIN_CAPACITY;
use arbor_tree::{DEFAULT_ANNOUNCEMENT_INTERVAL, DEFAULT_ANNOUNCEMENT_TIMEOUT};

/// Tunables for one [`crate::Router`] instance.
#[derive(Debug, Clone)]
pub struct RouterConfig {
    /// Number of slots in the switch-port table (must be >= 16).
    pub port_table_capacity: usize,
    /// Depth of each peer's proto/traffic outbound queue.
    pub queue_depth: usize,
    /// Announcer fallback deadline before re-arming "advertise now".
    pub announce_deadline: Duration,
    /// Root re-advertise interval / non-root refresh interval.
    pub announcement_interval: Duration,
    /// Age at which a chosen announcement is considered stale.
    pub announcement_timeout: Duration,
    /// Period between self-bootstraps of the virtual-snake ring.
    pub bootstrap_interval: Duration,
}

impl Default for RouterConfig {
    fn default() -> Self {
        Self {
            port_table_capacity: MIN_CAPACITY,
            queue_depth: arbor_peer::DEFAULT_QUEUE_DEPTH,
            announce_deadline: DEFAULT_ANNOUNCE_DEADLINE,
            announcement_interval: DEFAULT_ANNOUNCEMENT_INTERVAL,
            announcement_timeout: DEFAULT_ANNOUNCEMENT_TIMEOUT,
            bootstrap_interval: DEFAULT_BOOTSTRAP_INTERVAL,
        }
    }
}

impl RouterConfig {
    pub fn with_port_table_capacity(mut self, capacity: usize) -> Self {
        self.port_table_capacity = capacity;
        self
    }

    pub fn with_queue_depth(mut self, depth: usize) -> Self {
        self.queue_depth = depth;
        self
    }

    pub fn with_announce_deadline(mut self, deadline: Duration) -> Self {
        self.announce_deadline = deadline;
        self
    }

    pub fn with_announcement_interval(mut self, interval: Duration) -> Self {
        self.announcement_interval = interval;
        self
    }

    pub fn with_announcement_timeout(mut self, timeout: Duration) -> Self {
        self.announcement_timeout = timeout;
        self
    }

    pub fn with_bootstrap_interval(mut self, interval: Duration) -> Self {
        self.bootstrap_interval = interval;
        self
    }
}
