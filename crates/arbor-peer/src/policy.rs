//! Forwarding policy seam
//!
//! A peer's reader/announcer tasks don't know how to route a decoded frame
//! or what to announce next — that depends on the tree/snake subsystems,
//! which live in higher-layered crates. [`ForwardingPolicy`] is the
//! injected seam: the router implements it and owns every other peer's
//! queues, while a peer task only ever touches its own.

use arbor_codec::DecodedFrame;
use arbor_switch::PortId;

/// Connect/handshake/attach always happen synchronously in the router
/// before a peer's tasks are ever spawned, so this seam only needs to cover
/// what the reader/announcer tasks themselves trigger after that point.
pub trait ForwardingPolicy: Send + Sync {
    /// A frame arrived on `inbound_port`; decide what, if anything, to do
    /// with it (deliver locally, forward to one or more peers, answer with
    /// a reply). Implementations perform routing and enqueue results onto
    /// the relevant peers' own queues themselves.
    fn on_frame(&self, inbound_port: PortId, frame: DecodedFrame);

    /// Called when a peer's tasks are tearing down (I/O error, EOF, or an
    /// explicit disconnect), so the router can detach the port and tear
    /// down any tree/snake state that depended on it.
    fn on_peer_stopped(&self, port: PortId);

    /// Polled by the announcer task whenever its deadline elapses or its
    /// dispatcher fires; `None` means nothing needs announcing right now.
    fn next_announcement(&self, port: PortId) -> Option<DecodedFrame>;
}
