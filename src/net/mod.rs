//! Socket Plumbing
//!
//! The thin POSIX layer underneath the server: parsing the listener address,
//! bind-and-listen, and accepting connections. Sockets come from `socket2` and
//! close themselves when dropped.

pub mod address;
pub mod listener;

pub use address::{parse_address, AddressError};
pub use listener::{BindError, Listener};
pub use socket2::Socket;
