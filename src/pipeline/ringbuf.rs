//! Frame ring for the capture → streaming-engine hand-off.
//!
//! A fixed frame index table over one shared circular payload buffer,
//! guarded as a unit by a single mutex. The lock is held only for a
//! bounded copy plus a slot write, never across I/O or decoding.

use std::sync::atomic::{AtomicUsize, Ordering};

use bytes::Bytes;
use crossbeam::utils::CachePadded;
use parking_lot::Mutex;
use thiserror::Error;

/// Slots in the frame index table. Sized for a worst-case burst; for an
/// audio-only stream it acts as a watermark rather than a hard limit.
pub const FRAME_SLOTS: usize = 42;

/// Bytes in the shared circular payload buffer.
pub const PAYLOAD_CAPACITY: usize = 32 * 1024;

#[derive(Error, Debug, PartialEq, Eq)]
#[error("frame of {len} bytes exceeds the ring payload capacity")]
pub struct OversizeFrame {
    pub len: usize,
}

/// One finished frame handed to the streaming engine.
#[derive(Debug, Clone)]
pub struct OutputFrame {
    pub payload: Bytes,
    /// Stream counter of the source frame, wraps at 2^16
    pub counter: u16,
}

/// Frame position inside the payload buffer.
#[derive(Debug, Clone, Copy)]
struct FrameSlot {
    start: usize,
    counter: u16,
    len: usize,
}

/// Everything the mutex protects: slot table, payload buffer and all
/// cursors move together or not at all.
struct Inner {
    payload: Box<[u8]>,
    slots: [FrameSlot; FRAME_SLOTS],
    write_pos: usize,
    read_slot: usize,
    write_slot: usize,
    queued: usize,
}

impl Inner {
    fn copy_in(&mut self, bytes: &[u8]) -> usize {
        let start = self.write_pos;
        let first = bytes.len().min(PAYLOAD_CAPACITY - start);
        self.payload[start..start + first].copy_from_slice(&bytes[..first]);
        let rest = bytes.len() - first;
        if rest > 0 {
            self.payload[..rest].copy_from_slice(&bytes[first..]);
            self.write_pos = rest;
        } else {
            self.write_pos = (start + first) % PAYLOAD_CAPACITY;
        }
        start
    }

    fn copy_out(&self, slot: FrameSlot) -> Bytes {
        let mut out = vec![0u8; slot.len];
        let first = slot.len.min(PAYLOAD_CAPACITY - slot.start);
        out[..first].copy_from_slice(&self.payload[slot.start..slot.start + first]);
        if first < slot.len {
            out[first..].copy_from_slice(&self.payload[..slot.len - first]);
        }
        Bytes::from(out)
    }
}

/// Bounded frame ring decoupling the capture cadence from the consumer.
pub struct FrameRingBuffer {
    inner: Mutex<Inner>,

    /// Statistics
    stats: CachePadded<Stats>,
}

#[derive(Default)]
struct Stats {
    frames_written: AtomicUsize,
    frames_read: AtomicUsize,
    frames_dropped: AtomicUsize,
}

impl FrameRingBuffer {
    pub fn new() -> Self {
        const EMPTY: FrameSlot = FrameSlot { start: 0, counter: 0, len: 0 };
        Self {
            inner: Mutex::new(Inner {
                payload: vec![0u8; PAYLOAD_CAPACITY].into_boxed_slice(),
                slots: [EMPTY; FRAME_SLOTS],
                write_pos: 0,
                read_slot: 0,
                write_slot: 0,
                queued: 0,
            }),
            stats: CachePadded::new(Stats::default()),
        }
    }

    pub fn payload_capacity(&self) -> usize {
        PAYLOAD_CAPACITY
    }

    /// Producer: copy a finished frame into the ring. A full ring evicts
    /// its oldest queued frame so the consumer always sees the most recent
    /// `FRAME_SLOTS` frames in order.
    pub fn push(&self, bytes: &[u8], counter: u16) -> Result<(), OversizeFrame> {
        if bytes.len() > PAYLOAD_CAPACITY {
            return Err(OversizeFrame { len: bytes.len() });
        }

        let mut inner = self.inner.lock();
        if inner.queued == FRAME_SLOTS {
            inner.read_slot = (inner.read_slot + 1) % FRAME_SLOTS;
            inner.queued -= 1;
            self.stats.frames_dropped.fetch_add(1, Ordering::Relaxed);
        }
        let start = inner.copy_in(bytes);
        let w = inner.write_slot;
        inner.slots[w] = FrameSlot { start, counter, len: bytes.len() };
        inner.write_slot = (w + 1) % FRAME_SLOTS;
        inner.queued += 1;
        drop(inner);

        self.stats.frames_written.fetch_add(1, Ordering::Relaxed);
        Ok(())
    }

    /// Consumer: take the oldest queued frame. `None` means no data yet,
    /// not an error. The payload is copied out under the lock, so a popped
    /// frame can never be torn by a concurrent push.
    pub fn pop(&self) -> Option<OutputFrame> {
        let mut inner = self.inner.lock();
        if inner.queued == 0 {
            return None;
        }
        let slot = inner.slots[inner.read_slot];
        let payload = inner.copy_out(slot);
        inner.read_slot = (inner.read_slot + 1) % FRAME_SLOTS;
        inner.queued -= 1;
        drop(inner);

        self.stats.frames_read.fetch_add(1, Ordering::Relaxed);
        Some(OutputFrame { payload, counter: slot.counter })
    }

    pub fn len(&self) -> usize {
        self.inner.lock().queued
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn stats(&self) -> (usize, usize, usize) {
        (
            self.stats.frames_written.load(Ordering::Relaxed),
            self.stats.frames_read.load(Ordering::Relaxed),
            self.stats.frames_dropped.load(Ordering::Relaxed),
        )
    }
}

impl Default for FrameRingBuffer {
    fn default() -> Self {
        Self::new()
    }
}
