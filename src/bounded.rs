//! Fixed-capacity queues shared by the callback bridges.
//!
//! Two overflow policies exist and each component uses exactly one of them:
//!
//! - [`HistoryRing`] drops the oldest entry when full. Readers address entries by an absolute sequence number and
//!   skip forward when they fall behind. Used for inquiry responses.
//! - [`ByteQueue`] rejects new bytes when full and never touches bytes already queued. Used for connection receive
//!   buffers.

use std::collections::VecDeque;

/// A drop-oldest ring of the most recent `capacity` pushed values.
#[derive(Debug)]
pub(crate) struct HistoryRing<T> {
    slots: Vec<Option<T>>,
    written: u64,
}

impl<T> HistoryRing<T> {
    pub fn new(capacity: usize) -> Self {
        assert!(capacity > 0);
        let mut slots = Vec::with_capacity(capacity);
        slots.resize_with(capacity, || None);
        HistoryRing { slots, written: 0 }
    }

    pub fn capacity(&self) -> usize {
        self.slots.len()
    }

    /// Total number of values pushed since the last clear. This is the sequence number of the next push.
    pub fn written(&self) -> u64 {
        self.written
    }

    /// The sequence number of the oldest value still retained.
    pub fn oldest(&self) -> u64 {
        self.written.saturating_sub(self.capacity() as u64)
    }

    pub fn push(&mut self, value: T) {
        let idx = (self.written % self.capacity() as u64) as usize;
        self.slots[idx] = Some(value);
        self.written += 1;
    }

    /// Returns the value pushed with sequence number `seq` if it has not been overwritten.
    pub fn get(&self, seq: u64) -> Option<&T> {
        if seq >= self.written || seq < self.oldest() {
            return None;
        }
        self.slots[(seq % self.capacity() as u64) as usize].as_ref()
    }

    pub fn clear(&mut self) {
        self.slots.iter_mut().for_each(|slot| *slot = None);
        self.written = 0;
    }
}

/// A bounded FIFO byte queue that rejects bytes beyond its capacity.
#[derive(Debug)]
pub(crate) struct ByteQueue {
    buf: VecDeque<u8>,
    capacity: usize,
}

impl ByteQueue {
    pub fn new(capacity: usize) -> Self {
        ByteQueue {
            buf: VecDeque::new(),
            capacity,
        }
    }

    pub fn len(&self) -> usize {
        self.buf.len()
    }

    pub fn is_empty(&self) -> bool {
        self.buf.is_empty()
    }

    pub fn free(&self) -> usize {
        self.capacity - self.buf.len()
    }

    /// Appends as much of `data` as fits and returns the number of bytes accepted.
    pub fn push(&mut self, data: &[u8]) -> usize {
        let accepted = data.len().min(self.free());
        self.buf.extend(&data[..accepted]);
        accepted
    }

    pub fn pop(&mut self) -> Option<u8> {
        self.buf.pop_front()
    }

    /// Moves up to `max_len` bytes out of the queue.
    pub fn take(&mut self, max_len: usize) -> Vec<u8> {
        let count = max_len.min(self.buf.len());
        self.buf.drain(..count).collect()
    }
}
