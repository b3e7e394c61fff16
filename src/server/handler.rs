//! Event Handlers
//!
//! One callback shape serves both the listener and every connection: the
//! handler receives the server, the [`Source`] of the event, the observed
//! [`EventMask`] and the caller's data passed to
//! [`ServerContext::poll`](super::ServerContext::poll).
//!
//! Handlers are reference counted so one handler can be shared by any number
//! of connections.

use super::ServerContext;
use crate::connection::ConnectionId;
use crate::registry::EventMask;
use std::rc::Rc;

/// Where a readiness event came from.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Source {
    /// The listening socket, usually meaning connections are waiting
    Listener,
    /// An accepted connection
    Connection(ConnectionId),
}

/// Receives readiness events from the dispatch loop.
///
/// Any `Fn(&mut ServerContext<D>, Source, EventMask, &mut D)` closure is a
/// handler.
pub trait EventHandler<D> {
    fn on_event(&self, server: &mut ServerContext<D>, source: Source, events: EventMask, data: &mut D);
}

impl<D, F> EventHandler<D> for F
where
    F: Fn(&mut ServerContext<D>, Source, EventMask, &mut D),
{
    fn on_event(&self, server: &mut ServerContext<D>, source: Source, events: EventMask, data: &mut D) {
        self(server, source, events, data)
    }
}

/// A shareable handler.
pub type Handler<D> = Rc<dyn EventHandler<D>>;

/// Wraps a closure into a [`Handler`].
///
/// Going through this function lets the compiler infer the closure's
/// argument types.
///
/// ```
/// use ringpoll::server::{handler, Source};
///
/// let on_event = handler(|server, source, events, _: &mut ()| {
///     if let Source::Connection(id) = source {
///         if events.is_hangup() {
///             server.disconnect(id);
///         }
///     }
/// });
/// # let _ = on_event;
/// ```
pub fn handler<D, F>(f: F) -> Handler<D>
where
    F: Fn(&mut ServerContext<D>, Source, EventMask, &mut D) + 'static,
{
    Rc::new(f)
}
