//! # Arbor Codec
//!
//! Binary wire-frame encoding/decoding, VLQ port-sequence packing, and
//! pooled frame buffers shared by every transport-facing crate.

pub mod error;
pub mod pool;
pub mod vlq;
pub mod wire;

pub use error::CodecError;
pub use pool::{Frame, FramePool};
pub use vlq::{decode_port_sequence, encode_port_sequence, PortSequence};
pub use wire::{decode, encode, DecodedFrame, FrameBody, FrameType, HEADER_PEEK_LEN, MAGIC, VERSION0};
