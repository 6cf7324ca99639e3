//! # Arbor Core
//!
//! Shared identity, error, timing, and dispatch primitives for the Arbor
//! overlay router. Every other crate in the workspace depends on this one.

pub mod clock;
pub mod dispatch;
pub mod error;
pub mod identity;

pub use clock::{system_clock, Clock, SharedClock, SystemClock};
pub use dispatch::Dispatch;
pub use error::IdentityError;
pub use identity::{PrivateKey, PublicKey, Signature};
