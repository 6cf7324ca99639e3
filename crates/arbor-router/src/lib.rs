//! # Arbor Router
//!
//! The facade that ties identity, switch-port table, tree, and snake state
//! together into one running node: `Connect`/`Disconnect`/`Send` plus read
//! accessors for this node's current place in the tree and the ring.

pub mod config;
pub mod error;
pub mod facade;

pub use config::RouterConfig;
pub use error::RouterError;
pub use facade::{DeliveredFrame, Router};
