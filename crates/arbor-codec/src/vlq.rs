//! Port-sequence VLQ encoding
//!
//! Switch port ids are encoded 7 bits per byte, high bit set on every byte
//! but the last (continuation bit), most-significant group first. A
//! port-sequence field is a 16-bit leading byte length of the packed VLQ
//! section, followed by that many bytes.
//!
//! Test vector: `[1, 2, 3, 4000] -> 00 05 01 02 03 9F 20`.

use bytes::{Buf, BufMut, Bytes, BytesMut};

use crate::error::CodecError;

/// An ordered sequence of switch port ids — tree coordinates, or a
/// greedy/source routing destination/source path.
pub type PortSequence = Vec<u32>;

/// Encode a single port id as VLQ bytes (MSB group first).
fn encode_vlq(mut value: u32, out: &mut BytesMut) {
    let mut groups = [0u8; 5];
    let mut n = 0;
    loop {
        groups[n] = (value & 0x7f) as u8;
        value >>= 7;
        n += 1;
        if value == 0 {
            break;
        }
    }
    for i in (0..n).rev() {
        let mut byte = groups[i];
        if i != 0 {
            byte |= 0x80;
        }
        out.put_u8(byte);
    }
}

/// Decode a single VLQ-encoded port id, returning the id and bytes consumed.
fn decode_vlq(buf: &[u8]) -> Result<(u32, usize), CodecError> {
    let mut value: u32 = 0;
    for (i, &byte) in buf.iter().enumerate() {
        value = (value << 7) | u32::from(byte & 0x7f);
        if byte & 0x80 == 0 {
            return Ok((value, i + 1));
        }
    }
    Err(CodecError::Malformed("truncated VLQ port id"))
}

/// Encode a port sequence: 16-bit byte length of the packed VLQ section,
/// then the packed VLQ bytes themselves.
pub fn encode_port_sequence(ports: &PortSequence) -> Bytes {
    let mut body = BytesMut::with_capacity(ports.len() * 2);
    for &port in ports {
        encode_vlq(port, &mut body);
    }
    let mut out = BytesMut::with_capacity(2 + body.len());
    out.put_u16(body.len() as u16);
    out.put_slice(&body);
    out.freeze()
}

/// Decode a port sequence from the front of `buf`, advancing it past the
/// consumed bytes. The leading 16-bit field is the packed VLQ section's byte
/// length, not the number of port ids — ids are decoded one at a time until
/// exactly that many bytes have been consumed.
pub fn decode_port_sequence(buf: &mut Bytes) -> Result<PortSequence, CodecError> {
    if buf.len() < 2 {
        return Err(CodecError::Malformed("truncated port-sequence length"));
    }
    let byte_len = buf.get_u16() as usize;
    if buf.len() < byte_len {
        return Err(CodecError::Malformed("port-sequence length exceeds buffer"));
    }
    let mut section = buf.split_to(byte_len);
    let mut ports = Vec::new();
    while !section.is_empty() {
        let (port, consumed) = decode_vlq(&section)?;
        section.advance(consumed);
        ports.push(port);
    }
    Ok(ports)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn matches_known_port_sequence_encoding() {
        let ports: PortSequence = vec![1, 2, 3, 4000];
        let encoded = encode_port_sequence(&ports);
        assert_eq!(encoded.as_ref(), &[0, 5, 1, 2, 3, 0x9F, 0x20]);

        let mut cursor = encoded.clone();
        let decoded = decode_port_sequence(&mut cursor).unwrap();
        assert_eq!(decoded, ports);
        assert!(cursor.is_empty());
    }

    #[test]
    fn round_trips_empty_sequence() {
        let ports: PortSequence = vec![];
        let encoded = encode_port_sequence(&ports);
        let mut cursor = encoded.clone();
        assert_eq!(decode_port_sequence(&mut cursor).unwrap(), ports);
    }

    #[test]
    fn round_trips_boundary_values() {
        let ports: PortSequence = vec![0, 127, 128, 16383, 16384, u32::MAX];
        let encoded = encode_port_sequence(&ports);
        let mut cursor = encoded.clone();
        assert_eq!(decode_port_sequence(&mut cursor).unwrap(), ports);
    }

    proptest::proptest! {
        #[test]
        fn round_trips_arbitrary_sequences(ports in proptest::collection::vec(0u32..=u32::MAX, 0..64)) {
            let encoded = encode_port_sequence(&ports);
            let mut cursor = encoded.clone();
            let decoded = decode_port_sequence(&mut cursor).unwrap();
            proptest::prop_assert_eq!(decoded, ports);
            proptest::prop_assert!(cursor.is_empty());
        }
    }
}
