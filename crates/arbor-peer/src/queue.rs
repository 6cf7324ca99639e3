//! Dual bounded priority queues
//!
//! Every peer has two outbound queues: `proto` (tree announcements, snake
//! control frames) and `traffic` (everything else). The writer task always
//! drains `proto` before `traffic`. Both are bounded and non-blocking on
//! enqueue: a full queue drops the frame and increments the peer's drop
//! counter rather than applying backpressure to the caller.

use std::sync::Arc;

use arbor_codec::Frame;
use arbor_switch::PeerCounters;
use tokio::sync::mpsc;

/// Default bounded depth for each of a peer's two outbound queues.
pub const DEFAULT_QUEUE_DEPTH: usize = 256;

/// The producer half, cloneable and handed to anything that forwards frames
/// toward this peer (the router's forwarding policy).
#[derive(Clone)]
pub struct QueueSender {
    proto_tx: mpsc::Sender<Frame>,
    traffic_tx: mpsc::Sender<Frame>,
    counters: Arc<PeerCounters>,
}

impl QueueSender {
    pub fn send_proto(&self, frame: Frame) {
        if self.proto_tx.try_send(frame).is_ok() {
            self.counters.record_proto_sent();
        } else {
            self.counters.record_proto_dropped();
        }
    }

    pub fn send_traffic(&self, frame: Frame) {
        if self.traffic_tx.try_send(frame).is_ok() {
            self.counters.record_traffic_sent();
        } else {
            self.counters.record_traffic_dropped();
        }
    }
}

/// The consumer half, owned by the writer task.
pub struct QueueReceiver {
    proto_rx: mpsc::Receiver<Frame>,
    traffic_rx: mpsc::Receiver<Frame>,
}

impl QueueReceiver {
    /// Pull the next frame to send: proto frames always win over traffic.
    /// Resolves to `None` once both queues are closed and drained.
    pub async fn recv(&mut self) -> Option<Frame> {
        if let Ok(frame) = self.proto_rx.try_recv() {
            return Some(frame);
        }
        tokio::select! {
            biased;
            frame = self.proto_rx.recv() => match frame {
                Some(frame) => Some(frame),
                // proto closed: fall back to waiting on traffic alone rather
                // than re-entering select, where a closed proto channel would
                // otherwise win the biased race on every poll.
                None => self.traffic_rx.recv().await,
            },
            frame = self.traffic_rx.recv() => frame,
        }
    }
}

pub fn outbound_queues(depth: usize, counters: Arc<PeerCounters>) -> (QueueSender, QueueReceiver) {
    let (proto_tx, proto_rx) = mpsc::channel(depth);
    let (traffic_tx, traffic_rx) = mpsc::channel(depth);
    (
        QueueSender {
            proto_tx,
            traffic_tx,
            counters,
        },
        QueueReceiver { proto_rx, traffic_rx },
    )
}

#[cfg(test)]
mod tests {
    use super::*;
    use bytes::Bytes;

    fn frame(pool: &arbor_codec::FramePool, tag: &'static str) -> Frame {
        pool.wrap(Bytes::from_static(tag.as_bytes()))
    }

    #[tokio::test]
    async fn proto_frames_are_drained_before_traffic() {
        let pool = arbor_codec::FramePool::new();
        let counters = Arc::new(PeerCounters::default());
        let (tx, mut rx) = outbound_queues(8, counters);
        tx.send_traffic(frame(&pool, "traffic"));
        tx.send_proto(frame(&pool, "proto"));

        let first = rx.recv().await.unwrap();
        assert_eq!(first.bytes().as_ref(), b"proto");
        let second = rx.recv().await.unwrap();
        assert_eq!(second.bytes().as_ref(), b"traffic");
    }

    #[tokio::test]
    async fn full_queue_drops_and_counts() {
        let pool = arbor_codec::FramePool::new();
        let counters = Arc::new(PeerCounters::default());
        let (tx, mut rx) = outbound_queues(1, counters.clone());
        tx.send_traffic(frame(&pool, "a"));
        tx.send_traffic(frame(&pool, "b")); // queue depth 1, this one is dropped
        assert_eq!(counters.tx_traffic_dropped(), 1);
        let only = rx.recv().await.unwrap();
        assert_eq!(only.bytes().as_ref(), b"a");
    }
}
