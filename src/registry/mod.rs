//! Descriptor Readiness Registry
//!
//! Tracks which descriptors the server watches and wraps the single blocking
//! `poll(2)` call made per dispatch iteration.
//!
//! ## Modules
//!
//! - `events`: The [`EventMask`] readiness vocabulary
//! - `pollfds`: The packed watch list and the poll call itself
//!
//! ## Example
//!
//! ```
//! use ringpoll::registry::{EventMask, Registry};
//!
//! let mut registry = Registry::with_capacity(16).unwrap();
//! registry.add_or_update(3, EventMask::LISTENER).unwrap();
//! registry.add_or_update(7, EventMask::CONNECTION).unwrap();
//!
//! // Same descriptor again: the interest is replaced, no new slot is used
//! registry.add_or_update(7, EventMask::READABLE).unwrap();
//! assert_eq!(registry.len(), 2);
//!
//! registry.remove(7);
//! assert_eq!(registry.len(), 1);
//! assert_eq!(registry.entry(0).unwrap().fd, 3);
//! ```

pub mod events;
pub mod pollfds;

pub use events::EventMask;
pub use pollfds::{Entry, Registry, RegistryError, INVALID_FD};
