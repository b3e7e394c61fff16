//! Server Configuration

use std::time::Duration;

/// Default number of watched descriptors, listener included
pub const MAX_CLIENTS: usize = 1024;

/// Default initial size of each per-connection buffer
pub const BUFFER_SIZE: usize = 1024;

/// Configuration for a [`ServerContext`](super::ServerContext).
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ServerConfig {
    /// Registry and connection table size (default: 1024). The listener
    /// occupies one registry slot.
    pub max_clients: usize,

    /// Initial capacity of each connection's input and output buffer, a
    /// power of two (default: 1024)
    pub buffer_size: usize,

    /// How long one poll may block; `None` waits indefinitely (default)
    pub poll_timeout: Option<Duration>,

    /// Listen backlog (default: `max_clients`)
    pub backlog: i32,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            max_clients: MAX_CLIENTS,
            buffer_size: BUFFER_SIZE,
            poll_timeout: None,
            backlog: MAX_CLIENTS as i32,
        }
    }
}

impl ServerConfig {
    pub fn max_clients(mut self, max_clients: usize) -> Self {
        self.max_clients = max_clients;
        self
    }

    pub fn buffer_size(mut self, buffer_size: usize) -> Self {
        self.buffer_size = buffer_size;
        self
    }

    pub fn poll_timeout(mut self, timeout: Option<Duration>) -> Self {
        self.poll_timeout = timeout;
        self
    }

    pub fn backlog(mut self, backlog: i32) -> Self {
        self.backlog = backlog;
        self
    }
}
