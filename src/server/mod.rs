//! Server Module
//!
//! Ties the pieces together: a [`ServerContext`] binds the listener, owns the
//! registry and the connection table, and runs the dispatch loop that routes
//! readiness events to [`EventHandler`]s.
//!
//! ## Example
//!
//! ```no_run
//! use ringpoll::server::{handler, ServerContext, Source};
//! use std::rc::Rc;
//!
//! // Echo every byte back to its sender
//! let on_connection = handler(|server, source, events, _: &mut ()| {
//!     let Source::Connection(id) = source else { return };
//!     let Some(conn) = server.connection_mut(id) else { return };
//!
//!     if events.is_readable() {
//!         match conn.receive() {
//!             Ok(0) => {
//!                 server.disconnect(id);
//!                 return;
//!             }
//!             Ok(_) => {
//!                 let bytes = conn.input_mut().take(usize::MAX);
//!                 conn.send(&bytes).unwrap();
//!             }
//!             Err(_) => {}
//!         }
//!     }
//!     let _ = conn.flush();
//! });
//!
//! let on_listener = handler(move |server, _, _, _: &mut ()| {
//!     let _ = server.accept(Rc::clone(&on_connection));
//! });
//!
//! let mut server = ServerContext::bind("127.0.0.1:9000", on_listener).unwrap();
//! server.run(&mut ()).unwrap();
//! ```
//!
//! ## Modules
//!
//! - `config`: [`ServerConfig`] and its defaults
//! - `context`: [`ServerContext`], [`ServerError`] and the dispatch loop
//! - `handler`: [`EventHandler`], [`Source`] and the [`handler`] constructor

pub mod config;
pub mod context;
pub mod handler;

pub use config::{ServerConfig, BUFFER_SIZE, MAX_CLIENTS};
pub use context::{ServerContext, ServerError};
pub use handler::{handler, EventHandler, Handler, Source};
