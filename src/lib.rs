//! # ringpoll - A Single-Threaded Poll-Driven TCP Server Core
//!
//! ringpoll accepts TCP connections on one IPv4 listener, watches every
//! socket with a single `poll(2)` call per iteration, and hands readiness
//! events to user callbacks. Each connection owns an input and an output
//! circular buffer, so partial reads and partial writes on non-blocking
//! sockets are absorbed without blocking the loop.
//!
//! ## Features
//!
//! - **No threads, no runtime**: one blocking point, the poll call
//! - **Circular buffers**: power-of-two ring buffers with optional growth
//! - **Partial sends**: unsent output stays queued for the next writable event
//! - **Protocol agnostic**: handlers decide what to read, write and close
//!
//! ## Architecture
//!
//! ```text
//! ┌─────────────────────────────────────────────────────────────────────────┐
//! │                            ServerContext                                │
//! │                                                                         │
//! │  ┌─────────────┐    ┌──────────────────┐    ┌─────────────────────────┐ │
//! │  │  Listener   │    │    Registry      │    │    ConnectionTable      │ │
//! │  │  (socket2)  │───>│  pollfd[0] = L   │    │  fd → ConnectionContext │ │
//! │  └─────────────┘    │  pollfd[1..] = C │───>│   ├─ input  ring buffer │ │
//! │                     └────────┬─────────┘    │   ├─ output ring buffer │ │
//! │                              │              │   └─ handler            │ │
//! │                              ▼              └─────────────────────────┘ │
//! │                     ┌──────────────────┐                                │
//! │                     │  Dispatch loop   │── Source::Listener ──> accept  │
//! │                     │  poll() → route  │── Source::Connection ─> I/O    │
//! │                     └──────────────────┘                                │
//! └─────────────────────────────────────────────────────────────────────────┘
//! ```
//!
//! ## Quick Start
//!
//! ```no_run
//! use ringpoll::server::{handler, ServerContext, Source};
//! use std::rc::Rc;
//!
//! let on_connection = handler(|server, source, events, _: &mut ()| {
//!     if let Source::Connection(id) = source {
//!         if events.is_hangup() {
//!             server.disconnect(id);
//!         }
//!     }
//! });
//! let on_listener = handler(move |server, _, _, _: &mut ()| {
//!     let _ = server.accept(Rc::clone(&on_connection));
//! });
//!
//! let mut server = ServerContext::bind("9000", on_listener)?;
//! server.run(&mut ())?;
//! # Ok::<(), ringpoll::ServerError>(())
//! ```
//!
//! ## Module Overview
//!
//! - [`buffer`]: Circular byte buffers
//! - [`registry`]: Watched descriptors and the poll call
//! - [`net`]: Address parsing, bind-and-listen, accept
//! - [`connection`]: Per-client state and the descriptor-keyed table
//! - [`server`]: The server context, handlers and dispatch loop
//!
//! ## Design Highlights
//!
//! ### Unbounded Cursors
//!
//! Buffer positions are never reduced modulo the capacity. The pending count
//! is `head - tail` in wrapping arithmetic and the storage index is
//! `position & (capacity - 1)`, so "empty" and "full" never look alike.
//!
//! ### Compact Registry
//!
//! Removing a descriptor shifts later entries down, so the live entries always
//! occupy the first `len` slots and the listener stays in slot 0.

pub mod buffer;
pub mod connection;
pub mod net;
pub mod registry;
pub mod server;

// Re-export commonly used types for convenience
pub use buffer::{BufferError, CircularBuffer};
pub use connection::{ConnectionContext, ConnectionId, ConnectionStats};
pub use registry::{EventMask, Registry};
pub use server::{handler, EventHandler, Handler, ServerConfig, ServerContext, ServerError, Source};

/// The default port the demo server listens on
pub const DEFAULT_PORT: u16 = 9000;

/// The default host the demo server binds to
pub const DEFAULT_HOST: &str = "0.0.0.0";

/// Version of ringpoll
pub const VERSION: &str = env!("CARGO_PKG_VERSION");
