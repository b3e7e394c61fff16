//! Connection Context
//!
//! Everything the server keeps for one accepted client: the socket, the
//! peer address, an input and an output [`CircularBuffer`], the handler that
//! receives this connection's readiness events, a user-defined status word
//! and optional user data.
//!
//! ## Lifecycle
//!
//! ```text
//! 1. Listener readable
//!        │
//!        ▼
//! 2. ServerContext::accept()
//!        │  accept → non-blocking → buffers → registry → table
//!        │  (any failing step releases what was built so far)
//!        ▼
//! 3. ┌──────────────────────────────┐
//!    │  Dispatch loop               │
//!    │                              │
//!    │  readiness ──> handler       │
//!    │                 │            │
//!    │                 ├─ receive() │
//!    │                 ├─ send()    │
//!    │                 └─ flush()   │
//!    └──────────────────────────────┘
//!        │
//!        ▼
//! 4. ServerContext::disconnect()
//!        │  registry → table → close socket → free buffers
//!        ▼
//! 5. Context dropped
//! ```
//!
//! The context is owned by the server's connection table; handlers reach it
//! through [`ServerContext::connection_mut`](crate::server::ServerContext::connection_mut).

use crate::buffer::{BufferError, CircularBuffer};
use crate::server::Handler;
use socket2::Socket;
use std::any::Any;
use std::fmt;
use std::io;
use std::net::SocketAddr;
use std::os::fd::{AsRawFd, RawFd};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use tracing::{debug, trace};

/// Statistics for connection handling
#[derive(Debug, Default)]
pub struct ConnectionStats {
    /// Total number of connections accepted
    pub connections_accepted: AtomicU64,
    /// Currently active connections
    pub active_connections: AtomicU64,
    /// Accepts that failed at any step
    pub accept_failures: AtomicU64,
    /// Readiness events handed to connection handlers
    pub events_dispatched: AtomicU64,
    /// Completed poll iterations
    pub polls: AtomicU64,
    /// Total bytes read
    pub bytes_read: AtomicU64,
    /// Total bytes written
    pub bytes_written: AtomicU64,
}

impl ConnectionStats {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn connection_opened(&self) {
        self.connections_accepted.fetch_add(1, Ordering::Relaxed);
        self.active_connections.fetch_add(1, Ordering::Relaxed);
    }

    pub fn connection_closed(&self) {
        self.active_connections.fetch_sub(1, Ordering::Relaxed);
    }

    pub fn accept_failed(&self) {
        self.accept_failures.fetch_add(1, Ordering::Relaxed);
    }

    pub fn event_dispatched(&self) {
        self.events_dispatched.fetch_add(1, Ordering::Relaxed);
    }

    pub fn poll_completed(&self) {
        self.polls.fetch_add(1, Ordering::Relaxed);
    }

    pub fn bytes_read(&self, count: usize) {
        self.bytes_read.fetch_add(count as u64, Ordering::Relaxed);
    }

    pub fn bytes_written(&self, count: usize) {
        self.bytes_written
            .fetch_add(count as u64, Ordering::Relaxed);
    }
}

/// Identifies a live connection by its socket descriptor.
///
/// Descriptors are reused by the OS once closed, so an id is only meaningful
/// while its connection is in the server's table.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct ConnectionId(RawFd);

impl ConnectionId {
    #[inline]
    pub const fn from_raw(fd: RawFd) -> Self {
        Self(fd)
    }

    #[inline]
    pub const fn fd(self) -> RawFd {
        self.0
    }
}

impl fmt::Display for ConnectionId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "fd:{}", self.0)
    }
}

/// One accepted client connection.
pub struct ConnectionContext<D> {
    /// Non-blocking connected socket; closed when the context drops
    socket: Socket,

    /// Client's address (for logging)
    peer: SocketAddr,

    /// Bytes received and not yet consumed by the handler
    input: CircularBuffer,

    /// Bytes queued for the peer and not yet accepted by the socket
    output: CircularBuffer,

    /// Receives this connection's readiness events
    handler: Handler<D>,

    /// User-defined connection state, never interpreted here
    status: u32,

    user_data: Option<Box<dyn Any>>,

    /// Connection statistics (shared)
    stats: Arc<ConnectionStats>,
}

impl<D> ConnectionContext<D> {
    /// Builds a context around an accepted socket, allocating both buffers
    /// with `buffer_size` bytes.
    ///
    /// If either buffer cannot be allocated the socket is closed and nothing
    /// is left behind.
    pub fn new(
        socket: Socket,
        peer: SocketAddr,
        handler: Handler<D>,
        buffer_size: usize,
        stats: Arc<ConnectionStats>,
    ) -> Result<Self, BufferError> {
        let input = CircularBuffer::with_capacity(buffer_size)?;
        let output = CircularBuffer::with_capacity(buffer_size)?;

        stats.connection_opened();

        Ok(Self {
            socket,
            peer,
            input,
            output,
            handler,
            status: 0,
            user_data: None,
            stats,
        })
    }

    #[inline]
    pub fn id(&self) -> ConnectionId {
        ConnectionId(self.socket.as_raw_fd())
    }

    #[inline]
    pub fn peer_addr(&self) -> SocketAddr {
        self.peer
    }

    #[inline]
    pub fn socket(&self) -> &Socket {
        &self.socket
    }

    #[inline]
    pub fn input(&self) -> &CircularBuffer {
        &self.input
    }

    #[inline]
    pub fn input_mut(&mut self) -> &mut CircularBuffer {
        &mut self.input
    }

    #[inline]
    pub fn output(&self) -> &CircularBuffer {
        &self.output
    }

    #[inline]
    pub fn output_mut(&mut self) -> &mut CircularBuffer {
        &mut self.output
    }

    #[inline]
    pub fn handler(&self) -> &Handler<D> {
        &self.handler
    }

    /// Replaces the handler that receives this connection's events.
    pub fn set_handler(&mut self, handler: Handler<D>) {
        self.handler = handler;
    }

    #[inline]
    pub fn status(&self) -> u32 {
        self.status
    }

    pub fn set_status(&mut self, status: u32) {
        self.status = status;
    }

    /// User data of type `T`, if any was set with that type.
    pub fn user_data<T: Any>(&self) -> Option<&T> {
        self.user_data.as_deref()?.downcast_ref()
    }

    pub fn user_data_mut<T: Any>(&mut self) -> Option<&mut T> {
        self.user_data.as_deref_mut()?.downcast_mut()
    }

    pub fn set_user_data<T: Any>(&mut self, data: T) {
        self.user_data = Some(Box::new(data));
    }

    /// Removes and returns the user data.
    pub fn take_user_data(&mut self) -> Option<Box<dyn Any>> {
        self.user_data.take()
    }

    /// Reads whatever the socket has into the input buffer.
    ///
    /// A full input buffer is doubled first, so `Ok(0)` always means the peer
    /// closed its side. A socket with nothing to read reports
    /// `ErrorKind::WouldBlock`.
    pub fn receive(&mut self) -> io::Result<usize> {
        if self.input.is_full() {
            let grow_by = self.input.capacity();
            self.input
                .reserve(grow_by)
                .map_err(|e| io::Error::new(io::ErrorKind::OutOfMemory, e))?;
        }

        let mut source = &self.socket;
        let n = self.input.fill_from(&mut source)?;

        self.stats.bytes_read(n);
        trace!(client = %self.peer, bytes = n, buffered = self.input.len(), "Read data");
        Ok(n)
    }

    /// Queues `data` for the peer, growing the output buffer as needed.
    ///
    /// Nothing is sent until [`flush`](Self::flush) runs. Returns the number
    /// of bytes queued, which is short only when the output buffer was
    /// already full.
    pub fn send(&mut self, data: &[u8]) -> Result<usize, BufferError> {
        self.output.append(data, true)
    }

    /// Writes as much pending output as the socket accepts right now.
    ///
    /// A socket that cannot take anything yet is a short write of zero bytes,
    /// not an error; the remainder waits for the next writable event.
    pub fn flush(&mut self) -> io::Result<usize> {
        let mut sink = &self.socket;
        let sent = match self.output.drain_to(&mut sink) {
            Ok(sent) => sent,
            Err(e) if e.kind() == io::ErrorKind::WouldBlock => 0,
            Err(e) => {
                debug!(client = %self.peer, error = %e, "Send failed");
                return Err(e);
            }
        };

        self.stats.bytes_written(sent);
        trace!(
            client = %self.peer,
            bytes = sent,
            pending = self.output.len(),
            "Sent data"
        );
        Ok(sent)
    }

    /// Closes the socket and releases both buffers.
    pub fn close(self) {
        debug!(client = %self.peer, fd = self.socket.as_raw_fd(), "Closing connection");
        drop(self);
    }
}

impl<D> Drop for ConnectionContext<D> {
    fn drop(&mut self) {
        self.stats.connection_closed();
    }
}

impl<D> fmt::Debug for ConnectionContext<D> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ConnectionContext")
            .field("id", &self.id())
            .field("peer", &self.peer)
            .field("input", &self.input.len())
            .field("output", &self.output.len())
            .field("status", &self.status)
            .finish_non_exhaustive()
    }
}
