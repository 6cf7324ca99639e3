//! # Arbor Switch
//!
//! The fixed-capacity switch-port table: peer slot bookkeeping, peer-type
//! tagging, and the per-peer metadata the tree and snake subsystems read
//! and mutate. Connection I/O and task wiring live in `arbor-peer`.

pub mod error;
pub mod peer_type;
pub mod port_table;

pub use error::SwitchError;
pub use peer_type::PeerType;
pub use port_table::{
    Coordinates, PeerCounters, PeerLiveState, PeerRecord, PortId, PortTable, LOCAL_PORT,
    MIN_CAPACITY,
};
