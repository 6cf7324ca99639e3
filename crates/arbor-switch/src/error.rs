//! Switch-port table errors

use thiserror::Error;

#[derive(Debug, Error)]
pub enum SwitchError {
    #[error("port table is full")]
    PortTableFull,

    #[error("a peer with this public key is already attached")]
    DuplicateKey,

    #[error("port {0} is not bound to a peer")]
    NotBound(u32),
}
