//! Server Context and Dispatch Loop
//!
//! [`ServerContext`] owns the listening socket, the readiness registry, the
//! connection table and the top-level handler. One call to
//! [`poll`](ServerContext::poll) is one iteration of the event loop:
//!
//! ```text
//!   registry.poll()            (the only blocking point)
//!        │
//!        ├─ slot 0 ready? ──> top-level handler (Source::Listener)
//!        │                      └─ typically server.accept(handler)
//!        │
//!        └─ for each other ready slot:
//!               table[fd] ──> connection handler (Source::Connection(id))
//!                               └─ receive / send / flush / disconnect
//! ```
//!
//! Nothing here imposes a protocol. Handlers decide what to read, what to
//! write and when to hang up; a failed send or receive is reported to the
//! handler and never disconnects on its own.

use super::config::ServerConfig;
use super::handler::{Handler, Source};
use crate::buffer::{BufferError, CircularBuffer};
use crate::connection::{
    ConnectionContext, ConnectionId, ConnectionStats, ConnectionTable, Rejected, TableError,
};
use crate::net::{BindError, Listener, Socket};
use crate::registry::{EventMask, Registry, RegistryError};
use std::any::Any;
use std::fmt;
use std::io;
use std::net::SocketAddr;
use std::os::fd::{AsRawFd, RawFd};
use std::rc::Rc;
use std::sync::Arc;
use std::time::Duration;
use thiserror::Error;
use tracing::{debug, error, info, trace, warn};

/// Registry slot held by the listener for the server's whole life
const LISTENER_SLOT: usize = 0;

/// Errors surfaced by the server.
#[derive(Debug, Error)]
pub enum ServerError {
    /// Listener address or socket setup failed
    #[error("bind failed: {0}")]
    Bind(#[from] BindError),

    /// Registry allocation failed or the registry is full
    #[error("registry error: {0}")]
    Registry(#[from] RegistryError),

    /// Connection table allocation or insert failed
    #[error("connection table error: {0}")]
    Table(#[from] TableError),

    /// A buffer could not be allocated
    #[error("buffer error: {0}")]
    Buffer(#[from] BufferError),

    /// The raw accept call failed (including `WouldBlock`)
    #[error("accept failed: {0}")]
    Accept(#[source] io::Error),

    /// The multiplex call failed; this iteration was abandoned
    #[error("poll failed: {0}")]
    Poll(#[source] io::Error),

    /// Socket configuration failed
    #[error("I/O error: {0}")]
    Io(#[from] io::Error),

    /// No live connection has this id
    #[error("unknown connection {0}")]
    UnknownConnection(ConnectionId),
}

impl ServerError {
    /// True when an accept found no pending connection.
    pub fn is_would_block(&self) -> bool {
        matches!(self, ServerError::Accept(e) if e.kind() == io::ErrorKind::WouldBlock)
    }
}

/// A single-threaded TCP server driven by `poll(2)`.
///
/// `D` is the caller's data handed to every handler by
/// [`poll`](Self::poll).
pub struct ServerContext<D> {
    /// Bound, non-blocking listening socket
    listener: Listener,

    /// Watched descriptors, listener in slot 0
    registry: Registry,

    /// Live connections keyed by descriptor
    connections: ConnectionTable<D>,

    /// Receives listener events
    handler: Handler<D>,

    config: ServerConfig,

    /// Connection statistics (shared)
    stats: Arc<ConnectionStats>,

    user_data: Option<Box<dyn Any>>,

    /// Ready descriptors of the current iteration, kept to reuse the allocation
    pending: Vec<RawFd>,

    running: bool,
}

impl<D> ServerContext<D> {
    /// Binds a listener on `addr` (`A.B.C.D:port` or `port`) with the default
    /// configuration.
    pub fn bind(addr: &str, handler: Handler<D>) -> Result<Self, ServerError> {
        Self::bind_with_config(addr, handler, ServerConfig::default())
    }

    /// Binds a listener on `addr` and starts watching it.
    ///
    /// The table and registry are allocated before the socket is created, so
    /// a failure at any step leaves nothing open.
    pub fn bind_with_config(
        addr: &str,
        handler: Handler<D>,
        config: ServerConfig,
    ) -> Result<Self, ServerError> {
        if !config.buffer_size.is_power_of_two() {
            return Err(BufferError::InvalidCapacity(config.buffer_size).into());
        }

        let connections = ConnectionTable::with_capacity(config.max_clients)?;
        let mut registry = Registry::with_capacity(config.max_clients)?;
        registry.set_timeout(config.poll_timeout);

        let listener = Listener::bind(addr, config.backlog)?;
        registry.add_or_update(listener.as_raw_fd(), EventMask::LISTENER)?;

        info!(
            addr = %listener.local_addr(),
            max_clients = config.max_clients,
            buffer_size = config.buffer_size,
            "Server listening"
        );

        Ok(Self {
            listener,
            registry,
            connections,
            handler,
            config,
            stats: Arc::new(ConnectionStats::new()),
            user_data: None,
            pending: Vec::new(),
            running: false,
        })
    }

    /// Accepts one pending connection and hands its events to `handler`.
    ///
    /// The new socket is made non-blocking, given its two buffers, watched
    /// for readable, writable and hang-up events and entered in the table.
    /// If any step fails, everything done so far is undone in reverse and the
    /// socket is closed: the connection is either fully live or gone.
    pub fn accept(&mut self, handler: Handler<D>) -> Result<ConnectionId, ServerError> {
        let (socket, peer) = match self.listener.accept() {
            Ok(pair) => pair,
            Err(e) => {
                if e.kind() != io::ErrorKind::WouldBlock {
                    warn!(error = %e, "Failed to accept connection");
                    self.stats.accept_failed();
                }
                return Err(ServerError::Accept(e));
            }
        };

        match self.register(socket, peer, handler) {
            Ok(id) => {
                info!(client = %peer, id = %id, "Client connected");
                Ok(id)
            }
            Err(e) => {
                warn!(client = %peer, error = %e, "Dropping connection");
                self.stats.accept_failed();
                Err(e)
            }
        }
    }

    fn register(
        &mut self,
        socket: Socket,
        peer: SocketAddr,
        handler: Handler<D>,
    ) -> Result<ConnectionId, ServerError> {
        socket.set_nonblocking(true)?;

        let context = ConnectionContext::new(
            socket,
            peer,
            handler,
            self.config.buffer_size,
            Arc::clone(&self.stats),
        )?;
        let id = context.id();

        self.registry.add_or_update(id.fd(), EventMask::CONNECTION)?;

        if let Err(Rejected { error, context }) = self.connections.insert(context) {
            self.registry.remove(id.fd());
            context.close();
            return Err(error.into());
        }

        Ok(id)
    }

    /// Stops watching the connection, drops it from the table, closes its
    /// socket and frees both buffers.
    ///
    /// Returns false if `id` is not a live connection.
    pub fn disconnect(&mut self, id: ConnectionId) -> bool {
        // Only table members are unwatched; the listener slot is never touched
        match self.connections.remove(id) {
            Some(context) => {
                self.registry.remove(id.fd());
                info!(client = %context.peer_addr(), id = %id, "Client disconnected");
                context.close();
                true
            }
            None => {
                debug!(id = %id, "Disconnect of unknown connection");
                false
            }
        }
    }

    /// Replaces the events watched for a connection.
    ///
    /// Dropping `WRITABLE` while there is nothing to send keeps the poll from
    /// returning immediately on every iteration.
    pub fn set_interest(&mut self, id: ConnectionId, events: EventMask) -> Result<(), ServerError> {
        if !self.connections.contains(id) {
            return Err(ServerError::UnknownConnection(id));
        }
        self.registry.add_or_update(id.fd(), events)?;
        Ok(())
    }

    /// Runs one iteration of the event loop.
    ///
    /// Blocks in `poll(2)` for at most the configured timeout, then calls the
    /// top-level handler if the listener is ready and each ready connection's
    /// handler. Returns the number of ready descriptors. A poll failure
    /// abandons the iteration and is returned as [`ServerError::Poll`].
    pub fn poll(&mut self, data: &mut D) -> Result<usize, ServerError> {
        let ready = self.registry.poll().map_err(|e| {
            error!(error = %e, "Error polling file descriptors");
            ServerError::Poll(e)
        })?;
        self.stats.poll_completed();

        if ready == 0 {
            return Ok(0);
        }

        let mut pending = std::mem::take(&mut self.pending);
        pending.clear();
        pending.extend(
            self.registry
                .ready()
                .filter(|(index, _)| *index != LISTENER_SLOT)
                .map(|(_, entry)| entry.fd),
        );

        let listener_events = self.registry.revents(LISTENER_SLOT);
        if !listener_events.is_empty() {
            trace!(events = %listener_events, "Listener ready");
            let handler = Rc::clone(&self.handler);
            handler.on_event(self, Source::Listener, listener_events, data);
        }

        for &fd in &pending {
            // Events are re-read: an earlier handler may have disconnected
            // this descriptor or replaced its interest.
            let events = match self.registry.position(fd) {
                Some(index) => self.registry.revents(index),
                None => continue,
            };
            if events.is_empty() {
                continue;
            }

            let id = ConnectionId::from_raw(fd);
            let Some(handler) = self.connections.get(id).map(|c| Rc::clone(c.handler())) else {
                warn!(fd, "Ready descriptor has no connection");
                continue;
            };

            trace!(id = %id, events = %events, "Connection ready");
            self.stats.event_dispatched();
            handler.on_event(self, Source::Connection(id), events, data);
        }

        self.pending = pending;
        Ok(ready)
    }

    /// Polls repeatedly until [`stop`](Self::stop) is called from a handler
    /// or a poll fails.
    pub fn run(&mut self, data: &mut D) -> Result<(), ServerError> {
        self.running = true;
        while self.running {
            self.poll(data)?;
        }
        debug!("Event loop stopped");
        Ok(())
    }

    /// Makes [`run`](Self::run) return after the current iteration.
    pub fn stop(&mut self) {
        self.running = false;
    }

    /// Closes every watched descriptor, releasing each live connection's
    /// buffers, then the listener.
    pub fn shutdown(mut self) {
        let listener_fd = self.listener.as_raw_fd();
        let mut closed = 0usize;

        for fd in self.registry.clear() {
            if fd == listener_fd {
                continue;
            }
            if let Some(context) = self.connections.remove(ConnectionId::from_raw(fd)) {
                context.close();
                closed += 1;
            }
        }

        // Every table entry is also watched; this only catches a desync
        for context in self.connections.drain() {
            warn!(id = %context.id(), "Connection was not registered");
            context.close();
            closed += 1;
        }

        info!(addr = %self.listener.local_addr(), closed, "Server shut down");
    }

    pub fn connection(&self, id: ConnectionId) -> Option<&ConnectionContext<D>> {
        self.connections.get(id)
    }

    pub fn connection_mut(&mut self, id: ConnectionId) -> Option<&mut ConnectionContext<D>> {
        self.connections.get_mut(id)
    }

    /// Ids of every live connection, in no particular order.
    pub fn connection_ids(&self) -> impl Iterator<Item = ConnectionId> + '_ {
        self.connections.ids()
    }

    #[inline]
    pub fn connection_count(&self) -> usize {
        self.connections.len()
    }

    #[inline]
    pub fn registry(&self) -> &Registry {
        &self.registry
    }

    #[inline]
    pub fn local_addr(&self) -> SocketAddr {
        self.listener.local_addr()
    }

    #[inline]
    pub fn listener_fd(&self) -> RawFd {
        self.listener.as_raw_fd()
    }

    #[inline]
    pub fn config(&self) -> &ServerConfig {
        &self.config
    }

    #[inline]
    pub fn stats(&self) -> &Arc<ConnectionStats> {
        &self.stats
    }

    pub fn set_poll_timeout(&mut self, timeout: Option<Duration>) {
        self.registry.set_timeout(timeout);
    }

    /// Replaces the top-level handler that receives listener events.
    pub fn set_handler(&mut self, handler: Handler<D>) {
        self.handler = handler;
    }

    pub fn user_data<T: Any>(&self) -> Option<&T> {
        self.user_data.as_deref()?.downcast_ref()
    }

    pub fn user_data_mut<T: Any>(&mut self) -> Option<&mut T> {
        self.user_data.as_deref_mut()?.downcast_mut()
    }

    pub fn set_user_data<T: Any>(&mut self, data: T) {
        self.user_data = Some(Box::new(data));
    }

    /// Creates a buffer sized like the per-connection buffers.
    pub fn new_buffer(&self) -> Result<CircularBuffer, BufferError> {
        CircularBuffer::with_capacity(self.config.buffer_size)
    }
}

impl<D> fmt::Debug for ServerContext<D> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ServerContext")
            .field("addr", &self.listener.local_addr())
            .field("watched", &self.registry.len())
            .field("connections", &self.connections.len())
            .field("config", &self.config)
            .finish_non_exhaustive()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::server::handler;
    use std::collections::HashMap;
    use std::io::{Read, Write};
    use std::net::TcpStream;
    use std::sync::atomic::Ordering;

    #[derive(Debug, Default)]
    struct Recorder {
        received: Vec<(SocketAddr, Vec<u8>)>,
        accepted: Vec<ConnectionId>,
        accept_errors: usize,
    }

    /// Connection handler: stores whatever arrives, hangs up on end of stream.
    fn recording_handler() -> Handler<Recorder> {
        handler(|server, source, events, rec: &mut Recorder| {
            let Source::Connection(id) = source else {
                return;
            };
            if !events.is_readable() {
                return;
            }
            let Some(conn) = server.connection_mut(id) else {
                return;
            };
            match conn.receive() {
                Ok(0) => {
                    server.disconnect(id);
                }
                Ok(_) => {
                    let peer = conn.peer_addr();
                    let bytes = conn.input_mut().take(usize::MAX);
                    rec.received.push((peer, bytes.to_vec()));
                }
                Err(_) => {}
            }
        })
    }

    /// Listener handler: accepts one connection per event, watching it for
    /// read and hang-up only.
    fn accepting_handler(on_connection: Handler<Recorder>) -> Handler<Recorder> {
        handler(move |server, source, _, rec: &mut Recorder| {
            if source != Source::Listener {
                return;
            }
            match server.accept(Rc::clone(&on_connection)) {
                Ok(id) => {
                    server
                        .set_interest(id, EventMask::READABLE | EventMask::HANGUP)
                        .unwrap();
                    rec.accepted.push(id);
                }
                Err(_) => rec.accept_errors += 1,
            }
        })
    }

    fn test_server(max_clients: usize) -> ServerContext<Recorder> {
        let config = ServerConfig::default()
            .max_clients(max_clients)
            .buffer_size(64)
            .poll_timeout(Some(Duration::from_millis(20)));
        ServerContext::bind_with_config(
            "127.0.0.1:0",
            accepting_handler(recording_handler()),
            config,
        )
        .unwrap()
    }

    fn poll_until<D>(
        server: &mut ServerContext<D>,
        data: &mut D,
        mut done: impl FnMut(&ServerContext<D>, &D) -> bool,
    ) {
        for _ in 0..250 {
            if done(server, data) {
                return;
            }
            server.poll(data).unwrap();
        }
        assert!(done(server, data), "condition not reached after polling");
    }

    fn connect(server: &ServerContext<Recorder>) -> TcpStream {
        let client = TcpStream::connect(server.local_addr()).unwrap();
        client
            .set_read_timeout(Some(Duration::from_secs(2)))
            .unwrap();
        client
    }

    fn assert_closed_by_server(client: &mut TcpStream) {
        let mut buf = [0u8; 8];
        match client.read(&mut buf) {
            Ok(0) => {}
            Ok(n) => panic!("unexpected {n} bytes"),
            Err(e) => assert_eq!(e.kind(), io::ErrorKind::ConnectionReset),
        }
    }

    /// Registry descriptors (listener excluded) and table ids agree.
    fn assert_in_sync<D>(server: &ServerContext<D>) {
        let mut watched: Vec<RawFd> = server.registry().entries().skip(1).map(|e| e.fd).collect();
        let mut live: Vec<RawFd> = server.connection_ids().map(ConnectionId::fd).collect();
        watched.sort_unstable();
        live.sort_unstable();
        assert_eq!(watched, live);
        assert_eq!(server.registry().entry(0).unwrap().fd, server.listener_fd());
    }

    #[test]
    fn test_bind_rejects_bad_buffer_size() {
        let result = ServerContext::bind_with_config(
            "127.0.0.1:0",
            handler(|_, _, _, _: &mut ()| {}),
            ServerConfig::default().buffer_size(1000),
        );
        assert!(matches!(
            result,
            Err(ServerError::Buffer(BufferError::InvalidCapacity(1000)))
        ));
    }

    #[test]
    fn test_bind_rejects_bad_address() {
        let result = ServerContext::bind("localhost", handler(|_, _, _, _: &mut ()| {}));
        assert!(matches!(result, Err(ServerError::Bind(BindError::Address(_)))));
    }

    #[test]
    fn test_listener_owns_slot_zero() {
        let server = test_server(8);
        assert_eq!(server.registry().len(), 1);
        let entry = server.registry().entry(0).unwrap();
        assert_eq!(entry.fd, server.listener_fd());
        assert_eq!(entry.events, EventMask::LISTENER);
    }

    #[test]
    fn test_poll_timeout_returns_zero() {
        let mut server = test_server(8);
        let mut rec = Recorder::default();

        assert_eq!(server.poll(&mut rec).unwrap(), 0);
        assert_eq!(server.stats().polls.load(Ordering::Relaxed), 1);
        assert!(rec.accepted.is_empty());
    }

    #[test]
    fn test_accept_registers_connection() {
        let mut server = test_server(8);
        let mut rec = Recorder::default();
        let client = connect(&server);

        poll_until(&mut server, &mut rec, |s, _| s.connection_count() == 1);

        let id = rec.accepted[0];
        let conn = server.connection(id).unwrap();
        assert_eq!(conn.peer_addr(), client.local_addr().unwrap());
        assert_eq!(conn.input().capacity(), 64);
        assert_eq!(conn.output().capacity(), 64);

        assert_eq!(server.registry().len(), 2);
        let entry = server.registry().entry(1).unwrap();
        assert_eq!(entry.fd, id.fd());
        assert_eq!(entry.events, EventMask::READABLE | EventMask::HANGUP);
        assert_in_sync(&server);
    }

    #[test]
    fn test_ping_then_drain() {
        // Connection handler queues "ping" the first time the socket is writable
        let on_connection = handler(|server, source, events, _: &mut ()| {
            let Source::Connection(id) = source else {
                return;
            };
            let conn = server.connection_mut(id).unwrap();
            if events.is_writable() && conn.status() == 0 {
                conn.send(b"ping").unwrap();
                conn.set_status(1);
            }
        });
        let on_listener = handler(move |server, _, _, _: &mut ()| {
            let _ = server.accept(Rc::clone(&on_connection));
        });

        let config = ServerConfig::default().poll_timeout(Some(Duration::from_millis(20)));
        let mut server = ServerContext::bind_with_config("127.0.0.1:0", on_listener, config).unwrap();
        let mut client = TcpStream::connect(server.local_addr()).unwrap();
        client
            .set_read_timeout(Some(Duration::from_secs(2)))
            .unwrap();

        poll_until(&mut server, &mut (), |s, _| {
            s.connection_ids()
                .next()
                .and_then(|id| s.connection(id))
                .is_some_and(|c| c.status() == 1)
        });

        let id = server.connection_ids().next().unwrap();
        let conn = server.connection_mut(id).unwrap();
        assert_eq!(conn.output().len(), 4);
        assert_eq!(conn.output().tail(), 0);

        assert_eq!(conn.flush().unwrap(), 4);
        assert_eq!(conn.output().tail(), 4);
        assert_eq!(conn.flush().unwrap(), 0);

        let mut buf = [0u8; 4];
        client.read_exact(&mut buf).unwrap();
        assert_eq!(&buf, b"ping");
    }

    #[test]
    fn test_disconnect_removes_everywhere() {
        let mut server = test_server(8);
        let mut rec = Recorder::default();
        let mut client = connect(&server);

        poll_until(&mut server, &mut rec, |s, _| s.connection_count() == 1);
        let id = rec.accepted[0];
        let watched = server.registry().len();

        assert!(server.disconnect(id));

        assert_eq!(server.registry().len(), watched - 1);
        assert!(!server.registry().contains(id.fd()));
        assert!(server.connection(id).is_none());
        assert_eq!(server.stats().active_connections.load(Ordering::Relaxed), 0);
        assert_closed_by_server(&mut client);

        // Second disconnect is a no-op
        assert!(!server.disconnect(id));
        assert_eq!(server.registry().len(), watched - 1);
    }

    #[test]
    fn test_disconnect_ignores_listener_descriptor() {
        let mut server = test_server(8);
        let mut rec = Recorder::default();
        let listener = ConnectionId::from_raw(server.listener_fd());

        assert!(!server.disconnect(listener));

        assert_eq!(server.registry().len(), 1);
        let entry = server.registry().entry(0).unwrap();
        assert_eq!(entry.fd, server.listener_fd());
        assert_eq!(entry.events, EventMask::LISTENER);

        // Still accepting
        let _client = connect(&server);
        poll_until(&mut server, &mut rec, |s, _| s.connection_count() == 1);
        assert_in_sync(&server);
    }

    #[test]
    fn test_peer_close_triggers_disconnect() {
        let mut server = test_server(8);
        let mut rec = Recorder::default();
        let client = connect(&server);

        poll_until(&mut server, &mut rec, |s, _| s.connection_count() == 1);
        drop(client);

        poll_until(&mut server, &mut rec, |s, _| s.connection_count() == 0);
        assert_eq!(server.registry().len(), 1);
        assert_in_sync(&server);
    }

    #[test]
    fn test_survivors_stay_mapped_after_removal() {
        let mut server = test_server(8);
        let mut rec = Recorder::default();

        let mut clients: Vec<TcpStream> = Vec::new();
        for n in 1..=3 {
            clients.push(connect(&server));
            poll_until(&mut server, &mut rec, |s, _| s.connection_count() == n);
        }

        // Drop the middle connection from the server side
        let middle = rec.accepted[1];
        assert!(server.disconnect(middle));
        assert_eq!(server.registry().len(), 3);
        assert_in_sync(&server);

        clients.push(connect(&server));
        poll_until(&mut server, &mut rec, |s, _| s.connection_count() == 3);
        assert_in_sync(&server);

        // Every surviving client sends its own tag
        let mut expected = HashMap::new();
        for (index, client) in clients.iter_mut().enumerate() {
            if index == 1 {
                continue;
            }
            let tag = format!("client-{index}").into_bytes();
            client.write_all(&tag).unwrap();
            expected.insert(client.local_addr().unwrap(), tag);
        }

        poll_until(&mut server, &mut rec, |_, rec| {
            let total: usize = rec.received.iter().map(|(_, bytes)| bytes.len()).sum();
            total == expected.values().map(Vec::len).sum::<usize>()
        });

        let mut got: HashMap<SocketAddr, Vec<u8>> = HashMap::new();
        for (peer, bytes) in &rec.received {
            got.entry(*peer).or_default().extend_from_slice(bytes);
        }
        assert_eq!(got, expected);
    }

    #[test]
    fn test_failed_accept_leaves_nothing_behind() {
        // Listener plus exactly one connection fit in the registry
        let mut server = test_server(2);
        let mut rec = Recorder::default();

        let _first = connect(&server);
        poll_until(&mut server, &mut rec, |s, _| s.connection_count() == 1);

        let mut second = connect(&server);
        poll_until(&mut server, &mut rec, |_, rec| rec.accept_errors == 1);

        assert_eq!(server.connection_count(), 1);
        assert_eq!(server.registry().len(), 2);
        assert_in_sync(&server);

        let stats = server.stats();
        assert_eq!(stats.accept_failures.load(Ordering::Relaxed), 1);
        assert_eq!(stats.active_connections.load(Ordering::Relaxed), 1);

        // The rejected socket was closed, not leaked
        assert_closed_by_server(&mut second);
    }

    #[test]
    fn test_set_interest() {
        let mut server = test_server(8);
        let mut rec = Recorder::default();
        let _client = connect(&server);

        poll_until(&mut server, &mut rec, |s, _| s.connection_count() == 1);
        let id = rec.accepted[0];

        server.set_interest(id, EventMask::CONNECTION).unwrap();
        let index = server.registry().position(id.fd()).unwrap();
        assert_eq!(server.registry().entry(index).unwrap().events, EventMask::CONNECTION);
        assert_eq!(server.registry().len(), 2);

        let unknown = ConnectionId::from_raw(9999);
        assert!(matches!(
            server.set_interest(unknown, EventMask::READABLE),
            Err(ServerError::UnknownConnection(_))
        ));
    }

    #[test]
    fn test_run_until_stopped() {
        let on_listener = handler(|server, _, _, accepted: &mut usize| {
            if server.accept(handler(|_, _, _, _: &mut usize| {})).is_ok() {
                *accepted += 1;
                server.stop();
            }
        });
        let config = ServerConfig::default().poll_timeout(Some(Duration::from_millis(20)));
        let mut server = ServerContext::bind_with_config("127.0.0.1:0", on_listener, config).unwrap();

        let _client = TcpStream::connect(server.local_addr()).unwrap();
        let mut accepted = 0;
        server.run(&mut accepted).unwrap();

        assert_eq!(accepted, 1);
        assert_eq!(server.connection_count(), 1);
    }

    #[test]
    fn test_shutdown_closes_connections() {
        let mut server = test_server(8);
        let mut rec = Recorder::default();
        let mut a = connect(&server);
        poll_until(&mut server, &mut rec, |s, _| s.connection_count() == 1);
        let mut b = connect(&server);
        poll_until(&mut server, &mut rec, |s, _| s.connection_count() == 2);

        let stats = Arc::clone(server.stats());
        let addr = server.local_addr();
        server.shutdown();

        assert_eq!(stats.active_connections.load(Ordering::Relaxed), 0);
        assert_closed_by_server(&mut a);
        assert_closed_by_server(&mut b);
        assert!(TcpStream::connect(addr).is_err());
    }

    #[test]
    fn test_server_user_data() {
        let mut server = test_server(8);
        assert!(server.user_data::<u64>().is_none());

        server.set_user_data(41u64);
        *server.user_data_mut::<u64>().unwrap() += 1;
        assert_eq!(server.user_data::<u64>(), Some(&42));
    }
}
