//! Reader/writer/announcer task group
//!
//! Every connected peer gets three cooperating tasks: a
//! reader that accumulates bytes into frames and hands them to the
//! forwarding policy, a writer that drains the proto queue ahead of the
//! traffic queue, and an announcer that emits a fresh tree announcement on
//! a coalesced "advertise now" signal or a fallback deadline, whichever
//! comes first.

use std::sync::Arc;
use std::time::Duration;

use bytes::{Buf, BytesMut};
use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::sync::watch;
use tokio::task::JoinHandle;
use tracing::{debug, instrument, warn};

use arbor_codec::{encode, peek_frame_length, CodecError, DecodedFrame, Frame, FramePool, HEADER_PEEK_LEN, MAGIC};
use arbor_core::Dispatch;
use arbor_switch::{PeerCounters, PortId};

use crate::connection::Connection;
use crate::policy::ForwardingPolicy;
use crate::queue::{outbound_queues, QueueReceiver, QueueSender};

/// Default announcer fallback deadline.
pub const DEFAULT_ANNOUNCE_DEADLINE: Duration = Duration::from_secs(1);

enum ParseOutcome {
    Frame(DecodedFrame),
    Resync,
    Incomplete,
    /// The declared frame length exceeds [`arbor_codec::MAX_FRAME_LEN`]; this
    /// closes the peer outright rather than attempting to resynchronize on a
    /// stream whose framing we can no longer trust.
    TooLarge,
}

fn try_parse_frame(buf: &mut BytesMut) -> ParseOutcome {
    if buf.len() < 4 {
        return ParseOutcome::Incomplete;
    }
    if buf[..4] != MAGIC {
        return ParseOutcome::Resync;
    }
    if buf.len() < HEADER_PEEK_LEN {
        return ParseOutcome::Incomplete;
    }
    let total_len = match peek_frame_length(&buf[..HEADER_PEEK_LEN]) {
        Ok(len) => len,
        Err(CodecError::TooLarge(_)) => return ParseOutcome::TooLarge,
        Err(_) => return ParseOutcome::Resync,
    };
    if buf.len() < total_len {
        return ParseOutcome::Incomplete;
    }
    let frame_bytes = buf.split_to(total_len).freeze();
    match arbor_codec::decode(frame_bytes) {
        Ok(decoded) => ParseOutcome::Frame(decoded),
        Err(_) => ParseOutcome::Resync,
    }
}

/// Handle to a running peer task group.
pub struct PeerHandle {
    pub queues: QueueSender,
    /// Fires the announcer task's "advertise now" wakeup. Owned here (not
    /// inside the announcer task itself) so the router can trigger an
    /// immediate re-announcement on this peer from the outside, e.g. when a
    /// different peer's tree acceptance changes this node's coordinates.
    pub dispatch: Dispatch,
    cancel: watch::Sender<bool>,
    reader: JoinHandle<()>,
    writer: JoinHandle<()>,
    announcer: JoinHandle<()>,
}

impl PeerHandle {
    /// Request cancellation and wait for all three tasks to exit.
    pub async fn shutdown(self) {
        let _ = self.cancel.send(true);
        let _ = self.reader.await;
        let _ = self.writer.await;
        let _ = self.announcer.await;
    }

    /// Signal cancellation without waiting for the tasks to exit. Used from
    /// a synchronous [`crate::policy::ForwardingPolicy::on_peer_stopped`]
    /// callback (itself invoked from inside the reader task), where awaiting
    /// the reader's own `JoinHandle` would deadlock. The writer and
    /// announcer tasks observe the signal and exit on their own; their
    /// `JoinHandle`s are simply dropped rather than joined.
    pub fn cancel_now(&self) {
        let _ = self.cancel.send(true);
    }
}

#[instrument(skip(conn, counters, policy, pool))]
pub fn spawn_peer<C: Connection + 'static>(
    conn: C,
    port: PortId,
    counters: Arc<PeerCounters>,
    policy: Arc<dyn ForwardingPolicy>,
    pool: FramePool,
    queue_depth: usize,
    announce_deadline: Duration,
) -> PeerHandle {
    let (read_half, write_half) = tokio::io::split(conn);
    let (queue_tx, queue_rx) = outbound_queues(queue_depth, counters);
    let (cancel_tx, cancel_rx) = watch::channel(false);
    let dispatch = Dispatch::new();

    let reader = tokio::spawn(reader_task(
        read_half,
        port,
        policy.clone(),
        cancel_rx.clone(),
    ));
    let writer = tokio::spawn(writer_task(write_half, queue_rx, cancel_rx.clone()));
    let announcer = tokio::spawn(announcer_task(
        port,
        policy,
        pool,
        queue_tx.clone(),
        dispatch.clone(),
        announce_deadline,
        cancel_rx,
    ));

    PeerHandle {
        queues: queue_tx,
        dispatch,
        cancel: cancel_tx,
        reader,
        writer,
        announcer,
    }
}

#[instrument(skip(read_half, policy, cancel))]
async fn reader_task<R: tokio::io::AsyncRead + Unpin>(
    mut read_half: R,
    port: PortId,
    policy: Arc<dyn ForwardingPolicy>,
    mut cancel: watch::Receiver<bool>,
) {
    let mut buf = BytesMut::with_capacity(4096);
    'outer: loop {
        tokio::select! {
            changed = cancel.changed() => {
                if changed.is_err() || *cancel.borrow() {
                    break;
                }
            }
            result = read_half.read_buf(&mut buf) => {
                match result {
                    Ok(0) => break,
                    Ok(_) => {}
                    Err(err) => {
                        warn!(port, error = %err, "peer read failed");
                        break;
                    }
                }
            }
        }

        loop {
            match try_parse_frame(&mut buf) {
                ParseOutcome::Frame(frame) => policy.on_frame(port, frame),
                ParseOutcome::Resync => {
                    if buf.is_empty() {
                        break;
                    }
                    buf.advance(1);
                }
                ParseOutcome::Incomplete => break,
                ParseOutcome::TooLarge => {
                    warn!(port, "frame exceeds maximum size, closing peer");
                    break 'outer;
                }
            }
        }
    }
    debug!(port, "reader task stopped");
    policy.on_peer_stopped(port);
}

#[instrument(skip(write_half, queues, cancel))]
async fn writer_task<W: tokio::io::AsyncWrite + Unpin>(
    mut write_half: W,
    mut queues: QueueReceiver,
    mut cancel: watch::Receiver<bool>,
) {
    loop {
        tokio::select! {
            changed = cancel.changed() => {
                if changed.is_err() || *cancel.borrow() {
                    break;
                }
            }
            frame = queues.recv() => {
                match frame {
                    Some(frame) => {
                        if write_half.write_all(frame.bytes()).await.is_err() {
                            break;
                        }
                        if write_half.flush().await.is_err() {
                            break;
                        }
                    }
                    None => break,
                }
            }
        }
    }
}

#[instrument(skip(policy, pool, queue_tx, dispatch, cancel))]
async fn announcer_task(
    port: PortId,
    policy: Arc<dyn ForwardingPolicy>,
    pool: FramePool,
    queue_tx: QueueSender,
    dispatch: Dispatch,
    deadline: Duration,
    mut cancel: watch::Receiver<bool>,
) {
    loop {
        tokio::select! {
            changed = cancel.changed() => {
                if changed.is_err() || *cancel.borrow() {
                    break;
                }
            }
            _ = dispatch.fired() => {}
            _ = tokio::time::sleep(deadline) => {}
        }

        if let Some(frame) = policy.next_announcement(port) {
            let encoded = encode(&frame);
            let pooled: Frame = pool.wrap(encoded);
            queue_tx.send_proto(pooled);
        }
    }
}
