//! On-disk node configuration
//!
//! A plain struct with a `Default` impl, builder-style `with_*` setters, and
//! TOML (de)serialization.

use std::path::Path;
use std::time::Duration;

use serde::{Deserialize, Serialize};

use arbor_router::RouterConfig;

use crate::error::{NodeError, NodeResult};

/// TOML-serializable tunables for one node. Durations are expressed in
/// whole seconds on the wire since sub-second tree/snake timers are not a
/// deployment concern.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct NodeConfig {
    /// Number of slots in the switch-port table (must be >= 16).
    pub port_table_capacity: usize,
    /// Depth of each peer's proto/traffic outbound queue.
    pub queue_depth: usize,
    /// Announcer fallback deadline, in seconds, before re-arming
    /// "advertise now".
    pub announce_deadline_secs: u64,
    /// Root re-advertise interval / non-root refresh interval, in seconds.
    pub announcement_interval_secs: u64,
    /// Age, in seconds, at which a chosen announcement is considered stale.
    pub announcement_timeout_secs: u64,
    /// Period, in seconds, between self-bootstraps of the virtual-snake
    /// ring.
    pub bootstrap_interval_secs: u64,
    /// Log level passed to `tracing_subscriber::EnvFilter` when `RUST_LOG`
    /// is unset.
    pub default_log_level: String,
}

impl Default for NodeConfig {
    fn default() -> Self {
        let defaults = RouterConfig::default();
        Self {
            port_table_capacity: defaults.port_table_capacity,
            queue_depth: defaults.queue_depth,
            announce_deadline_secs: defaults.announce_deadline.as_secs(),
            announcement_interval_secs: defaults.announcement_interval.as_secs(),
            announcement_timeout_secs: defaults.announcement_timeout.as_secs(),
            bootstrap_interval_secs: defaults.bootstrap_interval.as_secs(),
            default_log_level: "info".to_string(),
        }
    }
}

impl NodeConfig {
    /// Load a configuration from a TOML file, falling back to defaults for
    /// any field the file omits (`#[serde(default)]` on every field).
    pub fn from_toml_file(path: impl AsRef<Path>) -> NodeResult<Self> {
        let text = std::fs::read_to_string(path.as_ref()).map_err(NodeError::Io)?;
        toml::from_str(&text).map_err(|err| NodeError::Config(err.to_string()))
    }

    pub fn with_port_table_capacity(mut self, capacity: usize) -> Self {
        self.port_table_capacity = capacity;
        self
    }

    pub fn with_queue_depth(mut self, depth: usize) -> Self {
        self.queue_depth = depth;
        self
    }

    pub fn with_default_log_level(mut self, level: impl Into<String>) -> Self {
        self.default_log_level = level.into();
        self
    }

    /// Translate into the `RouterConfig` the core's `Router::with_config`
    /// expects, converting second-granularity durations back to `Duration`.
    pub fn to_router_config(&self) -> RouterConfig {
        RouterConfig {
            port_table_capacity: self.port_table_capacity,
            queue_depth: self.queue_depth,
            announce_deadline: Duration::from_secs(self.announce_deadline_secs.max(1)),
            announcement_interval: Duration::from_secs(self.announcement_interval_secs),
            announcement_timeout: Duration::from_secs(self.announcement_timeout_secs),
            bootstrap_interval: Duration::from_secs(self.bootstrap_interval_secs),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_round_trips_through_toml() {
        let config = NodeConfig::default();
        let text = toml::to_string(&config).unwrap();
        let parsed: NodeConfig = toml::from_str(&text).unwrap();
        assert_eq!(parsed.port_table_capacity, config.port_table_capacity);
        assert_eq!(parsed.default_log_level, config.default_log_level);
    }

    #[test]
    fn partial_toml_falls_back_to_defaults() {
        let parsed: NodeConfig = toml::from_str("queue_depth = 512\n").unwrap();
        assert_eq!(parsed.queue_depth, 512);
        assert_eq!(parsed.port_table_capacity, NodeConfig::default().port_table_capacity);
    }

    #[test]
    fn to_router_config_converts_seconds_to_duration() {
        let config = NodeConfig::default().with_queue_depth(64);
        let router_config = config.to_router_config();
        assert_eq!(router_config.queue_depth, 64);
        assert_eq!(
            router_config.announcement_timeout,
            Duration::from_secs(config.announcement_timeout_secs)
        );
    }
}
