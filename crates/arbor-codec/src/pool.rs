//! Pooled frame buffers
//!
//! A borrowed frame handle backed by a pool, where each handoff increments a
//! reference count and the buffer returns to the pool once the last handle
//! drops. `Arc`'s strong count already gives us exactly that lifecycle, so a
//! pooled [`Frame`] is a `Bytes` (itself `Arc`-backed) wrapped with
//! pool-return-on-drop semantics via `Bytes::try_into_mut`.

use std::sync::Arc;

use bytes::{Bytes, BytesMut};
use parking_lot::Mutex;

/// Default capacity for buffers freshly allocated when the pool is empty.
const DEFAULT_BUFFER_CAPACITY: usize = 2048;

/// Maximum number of spare buffers a pool will hold onto.
const MAX_POOLED_BUFFERS: usize = 256;

struct PoolInner {
    spares: Mutex<Vec<BytesMut>>,
}

/// A shared pool of reusable frame-sized buffers.
///
/// Checked out buffers are handed back automatically when the last clone of
/// their [`Frame`] handle is dropped; if the buffer is still shared at that
/// point (e.g. a slice escaped into a queue) it is simply discarded rather
/// than reused.
#[derive(Clone)]
pub struct FramePool {
    inner: Arc<PoolInner>,
}

impl FramePool {
    pub fn new() -> Self {
        Self {
            inner: Arc::new(PoolInner {
                spares: Mutex::new(Vec::new()),
            }),
        }
    }

    /// Check out a buffer, reusing a spare if one is available.
    pub fn checkout(&self) -> BytesMut {
        let mut spares = self.inner.spares.lock();
        spares
            .pop()
            .unwrap_or_else(|| BytesMut::with_capacity(DEFAULT_BUFFER_CAPACITY))
    }

    /// Wrap encoded bytes as a pooled [`Frame`], ready to fan out to
    /// multiple outbound queues without copying.
    pub fn wrap(&self, bytes: Bytes) -> Frame {
        Frame {
            bytes,
            pool: self.clone(),
        }
    }

    fn reclaim(&self, bytes: Bytes) {
        let mut spares = self.inner.spares.lock();
        if spares.len() >= MAX_POOLED_BUFFERS {
            return;
        }
        if let Ok(mut buf) = bytes.try_into_mut() {
            buf.clear();
            spares.push(buf);
        }
    }
}

impl Default for FramePool {
    fn default() -> Self {
        Self::new()
    }
}

/// A reference-counted handle onto an encoded frame's bytes.
///
/// Cloning a `Frame` is cheap (it clones the underlying `Arc`-backed
/// `Bytes`). When the last clone drops, the backing buffer is offered back
/// to its originating [`FramePool`].
pub struct Frame {
    bytes: Bytes,
    pool: FramePool,
}

impl Frame {
    pub fn bytes(&self) -> &Bytes {
        &self.bytes
    }
}

impl Clone for Frame {
    fn clone(&self) -> Self {
        Self {
            bytes: self.bytes.clone(),
            pool: self.pool.clone(),
        }
    }
}

impl Drop for Frame {
    fn drop(&mut self) {
        // Take the bytes out rather than cloning them: cloning would bump
        // the `Bytes` refcount before `reclaim` checks it, so a truly-last
        // handle would always look shared and never get reclaimed.
        let bytes = std::mem::take(&mut self.bytes);
        self.pool.reclaim(bytes);
    }
}

impl std::ops::Deref for Frame {
    type Target = Bytes;

    fn deref(&self) -> &Bytes {
        &self.bytes
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn checkout_reuses_spare_buffers() {
        // `Bytes::from_static` can never convert back into a `BytesMut`, so
        // exercise reclaiming with a buffer the pool itself checked out
        // (the shape every real `encode`d frame takes).
        let pool = FramePool::new();
        let mut buf = pool.checkout();
        buf.extend_from_slice(b"hello");
        let reclaimable = buf.freeze();
        let before = reclaimable.as_ptr();

        let frame = pool.wrap(reclaimable);
        drop(frame);

        let spare = pool.checkout();
        assert!(spare.capacity() >= 5);
        assert_eq!(spare.as_ptr(), before, "the exact buffer should have been reclaimed");
    }

    #[test]
    fn cloned_frame_keeps_bytes_alive_until_last_drop() {
        let pool = FramePool::new();
        let frame = pool.wrap(Bytes::from_static(b"payload"));
        let second = frame.clone();
        drop(frame);
        assert_eq!(second.bytes().as_ref(), b"payload");
    }

    #[test]
    fn pool_caps_spare_buffers() {
        let pool = FramePool::new();
        for _ in 0..(MAX_POOLED_BUFFERS + 8) {
            let frame = pool.wrap(Bytes::from_static(b"x"));
            drop(frame);
        }
        let spares = pool.inner.spares.lock();
        assert!(spares.len() <= MAX_POOLED_BUFFERS);
    }
}
