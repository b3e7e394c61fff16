//! Circular I/O Buffers
//!
//! Every accepted connection owns two [`CircularBuffer`]s: an input buffer
//! that stages bytes read from the socket until the handler consumes them,
//! and an output buffer that holds bytes the socket could not take yet.
//!
//! ## Backpressure
//!
//! Sockets are non-blocking, so a send may accept only part of what is
//! pending. The output buffer keeps the rest and the handler drains it again
//! on the next writable notification. There is no other flow control: buffer
//! occupancy *is* the backpressure signal.
//!
//! ## Example
//!
//! ```
//! use ringpoll::buffer::CircularBuffer;
//!
//! let mut out = CircularBuffer::with_capacity(8).unwrap();
//!
//! // Fixed size: only what fits is taken
//! assert_eq!(out.append(b"hello world", false).unwrap(), 8);
//!
//! // Growable: the store becomes the next power of two at or above
//! // capacity + length (8 + 11 rounds up to 32)
//! out.clear();
//! assert_eq!(out.append(b"hello world", true).unwrap(), 11);
//! assert_eq!(out.capacity(), 32);
//!
//! let mut sink = Vec::new();
//! assert_eq!(out.drain_to(&mut sink).unwrap(), 11);
//! assert_eq!(sink, b"hello world");
//! ```

pub mod ring;

pub use ring::{BufferError, CircularBuffer};
