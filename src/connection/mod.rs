//! Connection Management Module
//!
//! This module holds the per-client state of the server and the table that
//! finds it again when a descriptor becomes ready.
//!
//! ## Architecture
//!
//! ```text
//! ┌─────────────────────────────────────────────────────────────┐
//! │                      ServerContext                          │
//! │                                                             │
//! │  ┌──────────────┐              ┌─────────────────────────┐  │
//! │  │  Registry    │   fd → id    │    ConnectionTable      │  │
//! │  │  [L|7|9|12]  │ ───────────> │  7  → ConnectionContext │  │
//! │  └──────────────┘              │  9  → ConnectionContext │  │
//! │                                │  12 → ConnectionContext │  │
//! │                                └─────────────────────────┘  │
//! └─────────────────────────────────────────────────────────────┘
//! ```
//!
//! The registry and the table always agree on which descriptors are live:
//! a connection is added to both or to neither, and removed from both
//! before its socket is closed.
//!
//! ## Modules
//!
//! - `context`: [`ConnectionContext`], [`ConnectionId`] and [`ConnectionStats`]
//! - `table`: The bounded, descriptor-keyed [`ConnectionTable`]

pub mod context;
pub mod table;

// Re-export commonly used types
pub use context::{ConnectionContext, ConnectionId, ConnectionStats};
pub use table::{ConnectionTable, Rejected, TableError};
