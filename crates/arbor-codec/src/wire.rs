//! Binary frame layout
//!
//! ```text
//! magic(4) | version(1) | type(1) | <type-specific length fields> | payload+keys
//! ```
//!
//! All integers are big-endian. The reader only ever needs to peek 12 bytes
//! (magic + version + type + up to three 16-bit length fields) to compute
//! the full frame length before reading the rest off the wire.

use bytes::{Buf, BufMut, Bytes, BytesMut};

use arbor_core::PublicKey;

use crate::error::CodecError;
use crate::vlq::{decode_port_sequence, encode_port_sequence, PortSequence};

/// Wire magic bytes: ASCII "pine".
pub const MAGIC: [u8; 4] = *b"pine";
pub const VERSION0: u8 = 0;

/// Bytes of header a reader must peek to compute the full frame length.
pub const HEADER_PEEK_LEN: usize = 12;

/// Largest total frame size (header + body) a reader will accept. Every
/// length field on the wire is 16-bit, so the worst case a frame with
/// several such sections (e.g. a `VirtualSnakeBootstrapAck`'s dst/src/payload
/// trio, each maxed out) could claim is a little under 200 KiB — far beyond
/// any legitimate announcement, coordinate list, or application payload.
/// This cap sits below that pathological worst case so a corrupted or
/// adversarial length field is caught as `FrameTooLarge` rather than
/// accepted as a giant allocation.
pub const MAX_FRAME_LEN: usize = 64 * 1024;

/// A 32-byte Ed25519 public key as it appears on the wire.
const KEY_LEN: usize = 32;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FrameType {
    Stp,
    Greedy,
    Source,
    Pathfind,
    DhtRequest,
    DhtResponse,
    VirtualSnake,
    VirtualSnakeBootstrap,
    VirtualSnakeBootstrapAck,
    VirtualSnakeSetup,
    VirtualSnakePathfind,
}

impl FrameType {
    fn to_byte(self) -> u8 {
        match self {
            FrameType::Stp => 0,
            FrameType::Greedy => 1,
            FrameType::Source => 2,
            FrameType::Pathfind => 3,
            FrameType::DhtRequest => 4,
            FrameType::DhtResponse => 5,
            FrameType::VirtualSnake => 6,
            FrameType::VirtualSnakeBootstrap => 7,
            FrameType::VirtualSnakeBootstrapAck => 8,
            FrameType::VirtualSnakeSetup => 9,
            FrameType::VirtualSnakePathfind => 10,
        }
    }

    fn from_byte(byte: u8) -> Result<Self, CodecError> {
        Ok(match byte {
            0 => FrameType::Stp,
            1 => FrameType::Greedy,
            2 => FrameType::Source,
            3 => FrameType::Pathfind,
            4 => FrameType::DhtRequest,
            5 => FrameType::DhtResponse,
            6 => FrameType::VirtualSnake,
            7 => FrameType::VirtualSnakeBootstrap,
            8 => FrameType::VirtualSnakeBootstrapAck,
            9 => FrameType::VirtualSnakeSetup,
            10 => FrameType::VirtualSnakePathfind,
            other => return Err(CodecError::UnknownType(other)),
        })
    }
}

/// A decoded frame body. Port sequences and payloads borrow from the
/// original read buffer where possible (`Bytes` clones are zero-copy).
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum FrameBody {
    Stp {
        dst: PortSequence,
        payload: Bytes,
    },
    Greedy {
        dst: PortSequence,
        src: PortSequence,
        payload: Bytes,
    },
    Source {
        dst: PortSequence,
        src: PortSequence,
        payload: Bytes,
    },
    Pathfind {
        dst: PortSequence,
        src: PortSequence,
        payload: Bytes,
    },
    DhtRequest {
        dst: PortSequence,
        src: PortSequence,
        payload: Bytes,
    },
    DhtResponse {
        dst: PortSequence,
        src: PortSequence,
        payload: Bytes,
    },
    VirtualSnake {
        dst_key: PublicKey,
        src_key: PublicKey,
        payload: Bytes,
    },
    VirtualSnakePathfind {
        dst_key: PublicKey,
        src_key: PublicKey,
        payload: Bytes,
    },
    VirtualSnakeBootstrap {
        coords: PortSequence,
        key: PublicKey,
        payload: Bytes,
    },
    VirtualSnakeBootstrapAck {
        dst: PortSequence,
        src: PortSequence,
        dst_key: PublicKey,
        src_key: PublicKey,
        payload: Bytes,
    },
    VirtualSnakeSetup {
        coords: PortSequence,
        dst_key: PublicKey,
        src_key: PublicKey,
        payload: Bytes,
    },
}

impl FrameBody {
    pub fn frame_type(&self) -> FrameType {
        match self {
            FrameBody::Stp { .. } => FrameType::Stp,
            FrameBody::Greedy { .. } => FrameType::Greedy,
            FrameBody::Source { .. } => FrameType::Source,
            FrameBody::Pathfind { .. } => FrameType::Pathfind,
            FrameBody::DhtRequest { .. } => FrameType::DhtRequest,
            FrameBody::DhtResponse { .. } => FrameType::DhtResponse,
            FrameBody::VirtualSnake { .. } => FrameType::VirtualSnake,
            FrameBody::VirtualSnakeBootstrap { .. } => FrameType::VirtualSnakeBootstrap,
            FrameBody::VirtualSnakeBootstrapAck { .. } => FrameType::VirtualSnakeBootstrapAck,
            FrameBody::VirtualSnakeSetup { .. } => FrameType::VirtualSnakeSetup,
            FrameBody::VirtualSnakePathfind { .. } => FrameType::VirtualSnakePathfind,
        }
    }
}

/// A fully decoded frame: version plus typed body.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DecodedFrame {
    pub version: u8,
    pub body: FrameBody,
}

impl DecodedFrame {
    pub fn new(body: FrameBody) -> Self {
        Self {
            version: VERSION0,
            body,
        }
    }
}

fn put_key(out: &mut BytesMut, key: &PublicKey) {
    out.put_slice(key.as_bytes());
}

fn take_key(buf: &mut Bytes) -> Result<PublicKey, CodecError> {
    if buf.len() < KEY_LEN {
        return Err(CodecError::Malformed("truncated public key"));
    }
    let mut bytes = [0u8; KEY_LEN];
    bytes.copy_from_slice(&buf[..KEY_LEN]);
    buf.advance(KEY_LEN);
    PublicKey::from_bytes(bytes).map_err(|_| CodecError::Malformed("invalid public key bytes"))
}

/// Encode a frame to its wire representation.
pub fn encode(frame: &DecodedFrame) -> Bytes {
    let mut out = BytesMut::with_capacity(128);
    out.put_slice(&MAGIC);
    out.put_u8(frame.version);
    out.put_u8(frame.body.frame_type().to_byte());

    match &frame.body {
        FrameBody::Stp { dst, payload } => {
            let dst_bytes = encode_port_sequence(dst);
            out.put_u16(dst_bytes.len() as u16);
            out.put_u16(payload.len() as u16);
            out.put_slice(&dst_bytes);
            out.put_slice(payload);
        }
        FrameBody::Greedy { dst, src, payload }
        | FrameBody::Source { dst, src, payload }
        | FrameBody::Pathfind { dst, src, payload }
        | FrameBody::DhtRequest { dst, src, payload }
        | FrameBody::DhtResponse { dst, src, payload } => {
            let dst_bytes = encode_port_sequence(dst);
            let src_bytes = encode_port_sequence(src);
            out.put_u16(dst_bytes.len() as u16);
            out.put_u16(src_bytes.len() as u16);
            out.put_u16(payload.len() as u16);
            out.put_slice(&dst_bytes);
            out.put_slice(&src_bytes);
            out.put_slice(payload);
        }
        FrameBody::VirtualSnake {
            dst_key,
            src_key,
            payload,
        }
        | FrameBody::VirtualSnakePathfind {
            dst_key,
            src_key,
            payload,
        } => {
            out.put_u16(payload.len() as u16);
            out.put_slice(payload);
            put_key(&mut out, dst_key);
            put_key(&mut out, src_key);
        }
        FrameBody::VirtualSnakeBootstrap {
            coords,
            key,
            payload,
        } => {
            let coords_bytes = encode_port_sequence(coords);
            out.put_u16(payload.len() as u16);
            out.put_u16(coords_bytes.len() as u16);
            out.put_slice(&coords_bytes);
            out.put_slice(payload);
            put_key(&mut out, key);
        }
        FrameBody::VirtualSnakeBootstrapAck {
            dst,
            src,
            dst_key,
            src_key,
            payload,
        } => {
            let dst_bytes = encode_port_sequence(dst);
            let src_bytes = encode_port_sequence(src);
            out.put_u16(payload.len() as u16);
            out.put_u16(dst_bytes.len() as u16);
            out.put_u16(src_bytes.len() as u16);
            out.put_slice(&dst_bytes);
            out.put_slice(&src_bytes);
            out.put_slice(payload);
            put_key(&mut out, dst_key);
            put_key(&mut out, src_key);
        }
        FrameBody::VirtualSnakeSetup {
            coords,
            dst_key,
            src_key,
            payload,
        } => {
            let coords_bytes = encode_port_sequence(coords);
            out.put_u16(payload.len() as u16);
            out.put_u16(coords_bytes.len() as u16);
            out.put_slice(&coords_bytes);
            out.put_slice(payload);
            put_key(&mut out, dst_key);
            put_key(&mut out, src_key);
        }
    }

    out.freeze()
}

/// Compute the total frame length (header + body) from a peeked header of
/// at least [`HEADER_PEEK_LEN`] bytes. The caller is responsible for having
/// already verified the magic prefix.
pub fn peek_frame_length(header: &[u8]) -> Result<usize, CodecError> {
    if header.len() < HEADER_PEEK_LEN {
        return Err(CodecError::Malformed("short header peek"));
    }
    let version = header[4];
    if version != VERSION0 {
        return Err(CodecError::UnsupportedVersion(version));
    }
    let frame_type = FrameType::from_byte(header[5])?;
    let u16_at = |i: usize| -> usize {
        u16::from_be_bytes([header[6 + i], header[6 + i + 1]]) as usize
    };

    let len = match frame_type {
        FrameType::Stp => {
            let dst_len = u16_at(0);
            let payload_len = u16_at(2);
            10 + dst_len + payload_len
        }
        FrameType::Greedy
        | FrameType::Source
        | FrameType::Pathfind
        | FrameType::DhtRequest
        | FrameType::DhtResponse => {
            let dst_len = u16_at(0);
            let src_len = u16_at(2);
            let payload_len = u16_at(4);
            12 + dst_len + src_len + payload_len
        }
        FrameType::VirtualSnake | FrameType::VirtualSnakePathfind => {
            let payload_len = u16_at(0);
            8 + payload_len + KEY_LEN * 2
        }
        FrameType::VirtualSnakeBootstrap => {
            let payload_len = u16_at(0);
            let coords_len = u16_at(2);
            10 + coords_len + payload_len + KEY_LEN
        }
        FrameType::VirtualSnakeBootstrapAck => {
            let payload_len = u16_at(0);
            let dst_len = u16_at(2);
            let src_len = u16_at(4);
            12 + dst_len + src_len + payload_len + KEY_LEN * 2
        }
        FrameType::VirtualSnakeSetup => {
            let payload_len = u16_at(0);
            let coords_len = u16_at(2);
            10 + coords_len + payload_len + KEY_LEN * 2
        }
    };
    if len > MAX_FRAME_LEN {
        return Err(CodecError::TooLarge(len));
    }
    Ok(len)
}

/// Decode a complete frame (header and body) from `buf`.
///
/// `buf` must contain exactly one frame's worth of bytes, as already sized
/// by [`peek_frame_length`].
pub fn decode(mut buf: Bytes) -> Result<DecodedFrame, CodecError> {
    if buf.len() < 6 || buf[..4] != MAGIC {
        return Err(CodecError::Malformed("missing magic prefix"));
    }
    buf.advance(4);
    let version = buf.get_u8();
    if version != VERSION0 {
        return Err(CodecError::UnsupportedVersion(version));
    }
    let frame_type = FrameType::from_byte(buf.get_u8())?;

    let body = match frame_type {
        FrameType::Stp => {
            let dst_len = buf.get_u16() as usize;
            let payload_len = buf.get_u16() as usize;
            let mut dst_section = take_section(&mut buf, dst_len)?;
            let dst = decode_port_sequence(&mut dst_section)?;
            let payload = take_section(&mut buf, payload_len)?;
            FrameBody::Stp { dst, payload }
        }
        FrameType::Greedy
        | FrameType::Source
        | FrameType::Pathfind
        | FrameType::DhtRequest
        | FrameType::DhtResponse => {
            let dst_len = buf.get_u16() as usize;
            let src_len = buf.get_u16() as usize;
            let payload_len = buf.get_u16() as usize;
            let mut dst_section = take_section(&mut buf, dst_len)?;
            let dst = decode_port_sequence(&mut dst_section)?;
            let mut src_section = take_section(&mut buf, src_len)?;
            let src = decode_port_sequence(&mut src_section)?;
            let payload = take_section(&mut buf, payload_len)?;
            build_dst_src_body(frame_type, dst, src, payload)
        }
        FrameType::VirtualSnake | FrameType::VirtualSnakePathfind => {
            let payload_len = buf.get_u16() as usize;
            let payload = take_section(&mut buf, payload_len)?;
            let dst_key = take_key(&mut buf)?;
            let src_key = take_key(&mut buf)?;
            if frame_type == FrameType::VirtualSnake {
                FrameBody::VirtualSnake {
                    dst_key,
                    src_key,
                    payload,
                }
            } else {
                FrameBody::VirtualSnakePathfind {
                    dst_key,
                    src_key,
                    payload,
                }
            }
        }
        FrameType::VirtualSnakeBootstrap => {
            let payload_len = buf.get_u16() as usize;
            let coords_len = buf.get_u16() as usize;
            let mut coords_section = take_section(&mut buf, coords_len)?;
            let coords = decode_port_sequence(&mut coords_section)?;
            let payload = take_section(&mut buf, payload_len)?;
            let key = take_key(&mut buf)?;
            FrameBody::VirtualSnakeBootstrap {
                coords,
                key,
                payload,
            }
        }
        FrameType::VirtualSnakeBootstrapAck => {
            let payload_len = buf.get_u16() as usize;
            let dst_len = buf.get_u16() as usize;
            let src_len = buf.get_u16() as usize;
            let mut dst_section = take_section(&mut buf, dst_len)?;
            let dst = decode_port_sequence(&mut dst_section)?;
            let mut src_section = take_section(&mut buf, src_len)?;
            let src = decode_port_sequence(&mut src_section)?;
            let payload = take_section(&mut buf, payload_len)?;
            let dst_key = take_key(&mut buf)?;
            let src_key = take_key(&mut buf)?;
            FrameBody::VirtualSnakeBootstrapAck {
                dst,
                src,
                dst_key,
                src_key,
                payload,
            }
        }
        FrameType::VirtualSnakeSetup => {
            let payload_len = buf.get_u16() as usize;
            let coords_len = buf.get_u16() as usize;
            let mut coords_section = take_section(&mut buf, coords_len)?;
            let coords = decode_port_sequence(&mut coords_section)?;
            let payload = take_section(&mut buf, payload_len)?;
            let dst_key = take_key(&mut buf)?;
            let src_key = take_key(&mut buf)?;
            FrameBody::VirtualSnakeSetup {
                coords,
                dst_key,
                src_key,
                payload,
            }
        }
    };

    Ok(DecodedFrame { version, body })
}

fn take_section(buf: &mut Bytes, len: usize) -> Result<Bytes, CodecError> {
    if buf.len() < len {
        return Err(CodecError::Malformed("section length exceeds frame"));
    }
    Ok(buf.split_to(len))
}

fn build_dst_src_body(
    frame_type: FrameType,
    dst: PortSequence,
    src: PortSequence,
    payload: Bytes,
) -> FrameBody {
    match frame_type {
        FrameType::Greedy => FrameBody::Greedy { dst, src, payload },
        FrameType::Source => FrameBody::Source { dst, src, payload },
        FrameType::Pathfind => FrameBody::Pathfind { dst, src, payload },
        FrameType::DhtRequest => FrameBody::DhtRequest { dst, src, payload },
        FrameType::DhtResponse => FrameBody::DhtResponse { dst, src, payload },
        _ => unreachable!("build_dst_src_body called with non dst/src frame type"),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn key(byte: u8) -> PublicKey {
        PublicKey::from_bytes([byte; 32]).unwrap()
    }

    #[test]
    fn stp_round_trip() {
        let frame = DecodedFrame::new(FrameBody::Stp {
            dst: vec![],
            payload: Bytes::from_static(b"announcement"),
        });
        let encoded = encode(&frame);
        assert_eq!(&encoded[..4], &MAGIC);
        let decoded = decode(encoded).unwrap();
        assert_eq!(decoded, frame);
    }

    #[test]
    fn greedy_round_trip_with_ports() {
        let frame = DecodedFrame::new(FrameBody::Greedy {
            dst: vec![1, 2, 3, 4000],
            src: vec![7],
            payload: Bytes::from_static(b"hello"),
        });
        let encoded = encode(&frame);
        let decoded = decode(encoded.clone()).unwrap();
        assert_eq!(decoded, frame);

        let mut header = [0u8; HEADER_PEEK_LEN];
        header.copy_from_slice(&encoded[..HEADER_PEEK_LEN]);
        assert_eq!(peek_frame_length(&header).unwrap(), encoded.len());
    }

    #[test]
    fn virtual_snake_round_trip() {
        let frame = DecodedFrame::new(FrameBody::VirtualSnake {
            dst_key: key(0xAA),
            src_key: key(0xBB),
            payload: Bytes::from_static(b"payload"),
        });
        let encoded = encode(&frame);
        let mut header = [0u8; HEADER_PEEK_LEN];
        header.copy_from_slice(&encoded[..HEADER_PEEK_LEN]);
        assert_eq!(peek_frame_length(&header).unwrap(), encoded.len());
        assert_eq!(decode(encoded).unwrap(), frame);
    }

    #[test]
    fn bootstrap_ack_round_trip() {
        let frame = DecodedFrame::new(FrameBody::VirtualSnakeBootstrapAck {
            dst: vec![1, 1],
            src: vec![2],
            dst_key: key(0x01),
            src_key: key(0x02),
            payload: Bytes::new(),
        });
        let encoded = encode(&frame);
        let mut header = [0u8; HEADER_PEEK_LEN];
        header.copy_from_slice(&encoded[..HEADER_PEEK_LEN]);
        assert_eq!(peek_frame_length(&header).unwrap(), encoded.len());
        assert_eq!(decode(encoded).unwrap(), frame);
    }

    #[test]
    fn setup_round_trip() {
        let frame = DecodedFrame::new(FrameBody::VirtualSnakeSetup {
            coords: vec![1, 2],
            dst_key: key(0x03),
            src_key: key(0x04),
            payload: Bytes::from_static(b"setup"),
        });
        let encoded = encode(&frame);
        assert_eq!(decode(encoded).unwrap(), frame);
    }

    #[test]
    fn bootstrap_round_trip() {
        let frame = DecodedFrame::new(FrameBody::VirtualSnakeBootstrap {
            coords: vec![9],
            key: key(0x05),
            payload: Bytes::from_static(b"boot"),
        });
        let encoded = encode(&frame);
        assert_eq!(decode(encoded).unwrap(), frame);
    }

    #[test]
    fn rejects_bad_magic() {
        let mut bytes = BytesMut::from(&b"xxxx\x00\x00\x00\x00\x00\x00\x00\x00"[..]);
        let err = decode(bytes.split().freeze()).unwrap_err();
        assert!(matches!(err, CodecError::Malformed(_)));
    }

    #[test]
    fn rejects_frame_claiming_to_exceed_the_size_cap() {
        let mut header = [0u8; HEADER_PEEK_LEN];
        header[..4].copy_from_slice(&MAGIC);
        header[4] = VERSION0;
        header[5] = FrameType::Greedy.to_byte();
        // dst_len = src_len = payload_len = 0xFFFF: far past MAX_FRAME_LEN.
        header[6..8].copy_from_slice(&0xFFFFu16.to_be_bytes());
        header[8..10].copy_from_slice(&0xFFFFu16.to_be_bytes());
        header[10..12].copy_from_slice(&0xFFFFu16.to_be_bytes());
        assert!(matches!(
            peek_frame_length(&header),
            Err(CodecError::TooLarge(_))
        ));
    }

    #[test]
    fn rejects_unsupported_version() {
        let mut header = [0u8; HEADER_PEEK_LEN];
        header[..4].copy_from_slice(&MAGIC);
        header[4] = 1;
        let err = peek_frame_length(&header).unwrap_err();
        assert!(matches!(err, CodecError::UnsupportedVersion(1)));
    }
}
