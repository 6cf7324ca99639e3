//! # Arbor Peer
//!
//! Per-peer I/O: the handshake, the reader/writer/announcer task group, and
//! the bounded dual-priority outbound queues that back them.

pub mod connection;
pub mod error;
pub mod policy;
pub mod queue;
pub mod tasks;

pub use connection::{handshake, Connection};
pub use error::PeerError;
pub use policy::ForwardingPolicy;
pub use queue::{outbound_queues, QueueReceiver, QueueSender, DEFAULT_QUEUE_DEPTH};
pub use tasks::{spawn_peer, PeerHandle, DEFAULT_ANNOUNCE_DEADLINE};
