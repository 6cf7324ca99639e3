//! Transport abstraction and handshake
//!
//! Every peer connection exchanges a 32-byte public key before any framed
//! traffic. The core makes no assumption about the concrete byte stream:
//! production wires in TCP/QUIC/TLS, tests use `tokio::io::duplex`.

use tokio::io::{AsyncRead, AsyncReadExt, AsyncWrite, AsyncWriteExt};

use arbor_core::PublicKey;

use crate::error::PeerError;

/// Anything byte-stream-shaped enough to carry framed traffic.
pub trait Connection: AsyncRead + AsyncWrite + Send + Unpin {}

impl<T: AsyncRead + AsyncWrite + Send + Unpin> Connection for T {}

/// Exchange public keys with the peer at the other end of `conn`, writing
/// ours first and then reading theirs. The order is fixed (rather than
/// negotiated) since both ends run identical code.
pub async fn handshake<C: Connection>(
    conn: &mut C,
    local_key: &PublicKey,
) -> Result<PublicKey, PeerError> {
    conn.write_all(local_key.as_bytes()).await?;
    conn.flush().await?;

    let mut bytes = [0u8; 32];
    conn.read_exact(&mut bytes).await.map_err(|e| {
        if e.kind() == std::io::ErrorKind::UnexpectedEof {
            PeerError::HandshakeClosed
        } else {
            PeerError::Io(e)
        }
    })?;
    PublicKey::from_bytes(bytes).map_err(|_| PeerError::HandshakeInvalidKey)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn handshake_exchanges_keys_both_ways() {
        let (mut a, mut b) = tokio::io::duplex(64);
        let key_a = arbor_core::PrivateKey::generate().public();
        let key_b = arbor_core::PrivateKey::generate().public();

        let (res_a, res_b) = tokio::join!(handshake(&mut a, &key_a), handshake(&mut b, &key_b));
        assert_eq!(res_a.unwrap(), key_b);
        assert_eq!(res_b.unwrap(), key_a);
    }

    #[tokio::test]
    async fn handshake_reports_closed_connection() {
        let (mut a, b) = tokio::io::duplex(64);
        drop(b);
        let key_a = arbor_core::PrivateKey::generate().public();
        let err = handshake(&mut a, &key_a).await.unwrap_err();
        assert!(matches!(err, PeerError::HandshakeClosed));
    }
}
