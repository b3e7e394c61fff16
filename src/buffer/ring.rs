//! Growable Circular Byte Buffer
//!
//! Each connection owns two of these: one staging bytes received from the
//! peer, one holding bytes waiting for the socket to become writable.
//!
//! ## Cursor Model
//!
//! ```text
//!            tail & mask          head & mask
//!                 │                    │
//!                 ▼                    ▼
//!  ┌───┬───┬───┬───┬───┬───┬───┬───┬───┬───┬───┬───┐
//!  │   │   │   │ a │ b │ c │ d │ e │ f │   │   │   │
//!  └───┴───┴───┴───┴───┴───┴───┴───┴───┴───┴───┴───┘
//!                 └──── head - tail ───┘
//! ```
//!
//! `head` and `tail` are free-running counters that only ever increase
//! (modulo `usize` wraparound). Positions in the backing store are derived by
//! masking with `capacity - 1`, which is why the capacity is always a power of
//! two. The number of pending bytes is `head - tail` under wrapping
//! subtraction and always lies in `[0, capacity]`:
//!
//! - empty iff `head == tail`
//! - full iff `head - tail == capacity`
//! - free space is `capacity - (head - tail)`, whatever the masked positions
//!
//! Copies into and out of the store happen in at most two contiguous chunks,
//! one up to the end of the store and one from offset zero.

use bytes::{Bytes, BytesMut};
use std::collections::TryReserveError;
use std::io::{self, Read, Write};
use thiserror::Error;
use tracing::{trace, warn};

/// Errors produced while sizing or growing a buffer.
#[derive(Debug, Error)]
pub enum BufferError {
    /// The requested capacity is zero or not a power of two
    #[error("buffer capacity must be a non-zero power of two, got {0}")]
    InvalidCapacity(usize),

    /// Growing past this size would overflow `usize`
    #[error("buffer capacity overflow: {current} + {requested} bytes")]
    CapacityOverflow { current: usize, requested: usize },

    /// The allocator refused the backing store
    #[error("buffer allocation failed: {0}")]
    Alloc(#[from] TryReserveError),
}

/// A power-of-two ring of bytes with unbounded head/tail cursors.
#[derive(Debug)]
pub struct CircularBuffer {
    /// Backing store, `store.len()` is the capacity
    store: Vec<u8>,

    /// Write cursor (total bytes ever appended)
    head: usize,

    /// Read cursor (total bytes ever consumed)
    tail: usize,
}

impl CircularBuffer {
    /// Allocates a buffer holding exactly `capacity` bytes.
    ///
    /// The capacity is not rounded; anything other than a non-zero power of
    /// two is rejected.
    pub fn with_capacity(capacity: usize) -> Result<Self, BufferError> {
        if !capacity.is_power_of_two() {
            return Err(BufferError::InvalidCapacity(capacity));
        }

        Ok(Self {
            store: alloc_store(capacity)?,
            head: 0,
            tail: 0,
        })
    }

    /// Size of the backing store in bytes.
    #[inline]
    pub fn capacity(&self) -> usize {
        self.store.len()
    }

    /// Number of buffered bytes not yet consumed.
    #[inline]
    pub fn len(&self) -> usize {
        self.head.wrapping_sub(self.tail)
    }

    #[inline]
    pub fn is_empty(&self) -> bool {
        self.head == self.tail
    }

    #[inline]
    pub fn is_full(&self) -> bool {
        self.len() == self.capacity()
    }

    /// Bytes that can be appended without growing.
    #[inline]
    pub fn free_space(&self) -> usize {
        self.capacity() - self.len()
    }

    /// The write cursor.
    #[inline]
    pub fn head(&self) -> usize {
        self.head
    }

    /// The read cursor.
    #[inline]
    pub fn tail(&self) -> usize {
        self.tail
    }

    #[inline]
    fn mask(&self) -> usize {
        self.capacity() - 1
    }

    /// Appends as much of `data` as fits and returns the number of bytes
    /// written.
    ///
    /// Nothing is written when `data` is empty or the buffer is already full.
    /// When there is not enough room and `allow_growth` is set, the store is
    /// first reallocated to the next power of two at or above
    /// `capacity + data.len()`, so the whole slice fits. Without growth the
    /// write is partial and exactly `free_space()` bytes are taken.
    pub fn append(&mut self, data: &[u8], allow_growth: bool) -> Result<usize, BufferError> {
        if data.is_empty() || self.is_full() {
            return Ok(0);
        }

        if self.free_space() < data.len() && allow_growth {
            let target = self
                .capacity()
                .checked_add(data.len())
                .ok_or(BufferError::CapacityOverflow {
                    current: self.capacity(),
                    requested: data.len(),
                })?;
            self.grow_to(target)?;
        }

        let count = data.len().min(self.free_space());
        let start = self.head & self.mask();
        let first = count.min(self.capacity() - start);

        self.store[start..start + first].copy_from_slice(&data[..first]);
        self.store[..count - first].copy_from_slice(&data[first..count]);

        self.head = self.head.wrapping_add(count);
        Ok(count)
    }

    /// Makes sure at least `additional` bytes can be appended without a
    /// partial write, growing the store if needed.
    pub fn reserve(&mut self, additional: usize) -> Result<(), BufferError> {
        if self.free_space() >= additional {
            return Ok(());
        }

        let target = self
            .len()
            .checked_add(additional)
            .ok_or(BufferError::CapacityOverflow {
                current: self.capacity(),
                requested: additional,
            })?;
        self.grow_to(target)
    }

    /// Reallocates to the next power of two at or above `min_capacity`.
    ///
    /// Pending bytes are copied out in logical order to offset zero of the new
    /// store; a wrapped range would otherwise end up split around a hole.
    fn grow_to(&mut self, min_capacity: usize) -> Result<(), BufferError> {
        let new_capacity =
            min_capacity
                .checked_next_power_of_two()
                .ok_or(BufferError::CapacityOverflow {
                    current: self.capacity(),
                    requested: min_capacity,
                })?;

        if new_capacity <= self.capacity() {
            return Ok(());
        }

        let mut store = match alloc_store(new_capacity) {
            Ok(store) => store,
            Err(e) => {
                warn!(
                    capacity = self.capacity(),
                    requested = new_capacity,
                    "Buffer growth failed"
                );
                return Err(e);
            }
        };

        let pending = self.len();
        let (first, second) = self.peek();
        store[..first.len()].copy_from_slice(first);
        store[first.len()..pending].copy_from_slice(second);

        trace!(
            from = self.capacity(),
            to = new_capacity,
            pending,
            "Grew circular buffer"
        );

        self.store = store;
        self.tail = 0;
        self.head = pending;
        Ok(())
    }

    /// Returns the pending bytes as up to two contiguous slices, in order.
    ///
    /// The second slice is empty unless the pending range wraps past the end
    /// of the store.
    pub fn peek(&self) -> (&[u8], &[u8]) {
        let pending = self.len();
        let start = self.tail & self.mask();
        let first = pending.min(self.capacity() - start);

        (
            &self.store[start..start + first],
            &self.store[..pending - first],
        )
    }

    /// Discards up to `count` pending bytes and returns how many were dropped.
    pub fn consume(&mut self, count: usize) -> usize {
        let count = count.min(self.len());
        self.tail = self.tail.wrapping_add(count);
        count
    }

    /// Copies pending bytes into `dst`, consuming them.
    pub fn read_into(&mut self, dst: &mut [u8]) -> usize {
        let (first, second) = self.peek();
        let from_first = dst.len().min(first.len());
        let from_second = (dst.len() - from_first).min(second.len());

        dst[..from_first].copy_from_slice(&first[..from_first]);
        dst[from_first..from_first + from_second].copy_from_slice(&second[..from_second]);

        self.consume(from_first + from_second)
    }

    /// Removes up to `count` pending bytes and returns them as one contiguous
    /// `Bytes`.
    pub fn take(&mut self, count: usize) -> Bytes {
        let count = count.min(self.len());
        let mut out = BytesMut::with_capacity(count);
        let (first, second) = self.peek();
        let from_first = count.min(first.len());

        out.extend_from_slice(&first[..from_first]);
        out.extend_from_slice(&second[..count - from_first]);

        self.consume(count);
        out.freeze()
    }

    /// Drops every pending byte.
    pub fn clear(&mut self) {
        self.tail = self.head;
    }

    /// Hands the pending bytes to `sink` with a single `write` call.
    ///
    /// The tail advances by exactly the count the sink reports, so a short
    /// write leaves the remainder queued for the next writable notification.
    /// When the pending range wraps it is first linearized into a temporary
    /// buffer, since the sink only accepts contiguous memory. Errors from the
    /// sink (including `WouldBlock`) are returned without touching the tail.
    pub fn drain_to<W: Write + ?Sized>(&mut self, sink: &mut W) -> io::Result<usize> {
        if self.is_empty() {
            return Ok(0);
        }

        let sent = match self.peek() {
            (contiguous, []) => sink.write(contiguous)?,
            (first, second) => {
                let mut linear = BytesMut::with_capacity(first.len() + second.len());
                linear.extend_from_slice(first);
                linear.extend_from_slice(second);
                sink.write(&linear)?
            }
        };

        // A sink claiming more than it was given is a broken `Write` impl.
        let sent = sent.min(self.len());
        self.tail = self.tail.wrapping_add(sent);
        trace!(sent, remaining = self.len(), "Drained buffer");
        Ok(sent)
    }

    /// Reads once from `source` into the free space after the head.
    ///
    /// Only the contiguous free region starting at the head is offered to the
    /// reader, so a wrapped free range may take two calls to fill. Returns
    /// `Ok(0)` either at end of stream or when the buffer is full; callers
    /// that need to tell the two apart should `reserve` first.
    pub fn fill_from<R: Read + ?Sized>(&mut self, source: &mut R) -> io::Result<usize> {
        let free = self.free_space();
        if free == 0 {
            return Ok(0);
        }

        let start = self.head & self.mask();
        let chunk = free.min(self.capacity() - start);
        let read = source.read(&mut self.store[start..start + chunk])?;

        let read = read.min(chunk);
        self.head = self.head.wrapping_add(read);
        Ok(read)
    }
}

fn alloc_store(capacity: usize) -> Result<Vec<u8>, BufferError> {
    let mut store = Vec::new();
    store.try_reserve_exact(capacity)?;
    store.resize(capacity, 0);
    Ok(store)
}
