//! Identity-level error types shared by every crate that depends on `arbor-core`.

use thiserror::Error;

/// Errors related to peer identity.
#[derive(Debug, Error)]
pub enum IdentityError {
    #[error("invalid public key: {0}")]
    InvalidKey(String),
}
