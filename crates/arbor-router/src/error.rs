//! Router facade errors

use thiserror::Error;

use arbor_snake::SnakeError;
use arbor_switch::SwitchError;
use arbor_tree::TreeError;

#[derive(Debug, Error)]
pub enum RouterError {
    #[error("port table is full")]
    PortTableFull,

    #[error("a peer with this public key is already connected")]
    DuplicateKey,

    #[error("port {0} is not bound to a peer")]
    NotBound(u32),

    #[error("port {0} is bound but its peer tasks have not started")]
    NotStarted(u32),

    #[error("handshake with the peer failed: {0}")]
    Handshake(#[from] arbor_peer::PeerError),

    #[error(transparent)]
    Tree(#[from] TreeError),

    #[error(transparent)]
    Snake(#[from] SnakeError),
}

impl From<SwitchError> for RouterError {
    fn from(err: SwitchError) -> Self {
        match err {
            SwitchError::PortTableFull => RouterError::PortTableFull,
            SwitchError::DuplicateKey => RouterError::DuplicateKey,
            SwitchError::NotBound(port) => RouterError::NotBound(port),
        }
    }
}
