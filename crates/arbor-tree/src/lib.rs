//! # Arbor Tree
//!
//! Spanning-tree root election: signed announcement propagation, loop
//! detection, coordinate derivation, re-advertise scheduling, and greedy
//! (coordinate-prefix) routing.

pub mod announcement;
pub mod error;
pub mod greedy;
pub mod state;

pub use announcement::{Announcement, SignatureEntry};
pub use error::TreeError;
pub use greedy::{select_next_hop, Candidate};
pub use state::{
    AcceptOutcome, TreeState, DEFAULT_ANNOUNCEMENT_INTERVAL, DEFAULT_ANNOUNCEMENT_TIMEOUT,
};
