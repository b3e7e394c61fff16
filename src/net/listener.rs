//! Listening Socket
//!
//! Bind-and-listen plus accept on a non-blocking IPv4 TCP socket. Closing is
//! ownership: dropping a [`Listener`] or an accepted [`Socket`] closes the
//! descriptor.

use super::address::{parse_address, AddressError};
use socket2::{Domain, Protocol, SockAddr, Socket, Type};
use std::io;
use std::net::SocketAddr;
use std::os::fd::{AsRawFd, RawFd};
use thiserror::Error;
use tracing::{debug, error};

/// Errors raised while setting up the listener.
#[derive(Debug, Error)]
pub enum BindError {
    #[error(transparent)]
    Address(#[from] AddressError),

    #[error("failed to {step} listener socket: {source}")]
    Io {
        step: &'static str,
        #[source]
        source: io::Error,
    },
}

fn step(step: &'static str) -> impl FnOnce(io::Error) -> BindError {
    move |source| {
        error!(step, error = %source, "Listener setup failed");
        BindError::Io { step, source }
    }
}

/// A bound, listening, non-blocking TCP socket.
#[derive(Debug)]
pub struct Listener {
    socket: Socket,
    local_addr: SocketAddr,
}

impl Listener {
    /// Creates a TCP/IPv4 socket, binds it to `addr` and starts listening.
    ///
    /// `SO_REUSEADDR` is set so a restarted server can rebind a port left in
    /// `TIME_WAIT`. The socket is switched to non-blocking mode so `accept`
    /// never stalls the dispatch loop.
    pub fn bind(addr: &str, backlog: i32) -> Result<Self, BindError> {
        let addr = parse_address(addr)?;

        let socket = Socket::new(Domain::IPV4, Type::STREAM, Some(Protocol::TCP))
            .map_err(step("create"))?;
        socket.set_reuse_address(true).map_err(step("configure"))?;
        socket
            .bind(&SockAddr::from(addr))
            .map_err(step("bind"))?;
        socket.listen(backlog).map_err(step("listen on"))?;
        socket.set_nonblocking(true).map_err(step("configure"))?;

        // Port 0 asks the kernel to pick; report what it picked
        let local_addr = socket
            .local_addr()
            .map_err(step("inspect"))?
            .as_socket()
            .unwrap_or(SocketAddr::V4(addr));

        debug!(addr = %local_addr, backlog, "Listener bound");

        Ok(Self { socket, local_addr })
    }

    /// Accepts one pending connection.
    ///
    /// Returns `WouldBlock` when nothing is waiting. The returned socket is
    /// still in blocking mode.
    pub fn accept(&self) -> io::Result<(Socket, SocketAddr)> {
        let (socket, peer) = self.socket.accept()?;
        let peer = peer.as_socket().ok_or_else(|| {
            io::Error::new(io::ErrorKind::InvalidData, "peer address is not IP")
        })?;
        Ok((socket, peer))
    }

    /// The address the listener is bound to.
    #[inline]
    pub fn local_addr(&self) -> SocketAddr {
        self.local_addr
    }

    #[inline]
    pub fn port(&self) -> u16 {
        self.local_addr.port()
    }
}

impl AsRawFd for Listener {
    fn as_raw_fd(&self) -> RawFd {
        self.socket.as_raw_fd()
    }
}
