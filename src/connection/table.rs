//! Descriptor-Keyed Connection Table
//!
//! Maps a [`ConnectionId`] to the [`ConnectionContext`] that owns it, so the
//! dispatch loop can route a ready descriptor to its handler in O(1). The
//! table is bounded like the registry it mirrors.

use super::context::{ConnectionContext, ConnectionId};
use std::collections::hash_map::{self, HashMap};
use std::collections::TryReserveError;
use std::fmt;
use thiserror::Error;

/// Errors reported by the connection table.
#[derive(Debug, Error)]
pub enum TableError {
    /// Storage for the table could not be allocated
    #[error("connection table allocation failed: {0}")]
    Alloc(#[from] TryReserveError),

    /// The table already holds `capacity` connections
    #[error("connection table full: {capacity} connections")]
    Full { capacity: usize },

    /// A live connection already uses this descriptor
    #[error("duplicate connection {0}")]
    Duplicate(ConnectionId),
}

/// An insert that was refused, handing the context back to the caller.
pub struct Rejected<D> {
    pub error: TableError,
    pub context: ConnectionContext<D>,
}

impl<D> fmt::Debug for Rejected<D> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Rejected")
            .field("error", &self.error)
            .field("context", &self.context)
            .finish()
    }
}

/// Live connections keyed by descriptor.
#[derive(Debug)]
pub struct ConnectionTable<D> {
    map: HashMap<ConnectionId, ConnectionContext<D>>,
    capacity: usize,
}

impl<D> ConnectionTable<D> {
    /// Creates a table holding at most `capacity` connections, reserving the
    /// storage up front.
    pub fn with_capacity(capacity: usize) -> Result<Self, TableError> {
        let mut map = HashMap::new();
        map.try_reserve(capacity)?;
        Ok(Self { map, capacity })
    }

    #[inline]
    pub fn len(&self) -> usize {
        self.map.len()
    }

    #[inline]
    pub fn is_empty(&self) -> bool {
        self.map.is_empty()
    }

    #[inline]
    pub fn capacity(&self) -> usize {
        self.capacity
    }

    /// Inserts `context` under its own id.
    ///
    /// On failure the context comes back untouched inside [`Rejected`], so
    /// the caller decides when it gets closed.
    pub fn insert(&mut self, context: ConnectionContext<D>) -> Result<(), Rejected<D>> {
        let id = context.id();

        if self.map.len() >= self.capacity {
            return Err(Rejected {
                error: TableError::Full {
                    capacity: self.capacity,
                },
                context,
            });
        }

        match self.map.entry(id) {
            hash_map::Entry::Occupied(_) => Err(Rejected {
                error: TableError::Duplicate(id),
                context,
            }),
            hash_map::Entry::Vacant(slot) => {
                slot.insert(context);
                Ok(())
            }
        }
    }

    pub fn remove(&mut self, id: ConnectionId) -> Option<ConnectionContext<D>> {
        self.map.remove(&id)
    }

    pub fn get(&self, id: ConnectionId) -> Option<&ConnectionContext<D>> {
        self.map.get(&id)
    }

    pub fn get_mut(&mut self, id: ConnectionId) -> Option<&mut ConnectionContext<D>> {
        self.map.get_mut(&id)
    }

    pub fn contains(&self, id: ConnectionId) -> bool {
        self.map.contains_key(&id)
    }

    /// Ids of every live connection, in no particular order.
    pub fn ids(&self) -> impl Iterator<Item = ConnectionId> + '_ {
        self.map.keys().copied()
    }

    /// Removes every connection from the table.
    pub fn drain(&mut self) -> impl Iterator<Item = ConnectionContext<D>> + '_ {
        self.map.drain().map(|(_, context)| context)
    }
}
