//! Peer task group errors

use thiserror::Error;

#[derive(Debug, Error)]
pub enum PeerError {
    #[error("i/o error on peer connection: {0}")]
    Io(#[from] std::io::Error),

    #[error("peer closed the connection before the handshake completed")]
    HandshakeClosed,

    #[error("peer sent an invalid public key during the handshake")]
    HandshakeInvalidKey,
}
