//! Readiness Registry
//!
//! A fixed-capacity, densely packed `pollfd` array handed straight to
//! `poll(2)`. The first `len()` slots are the watched descriptors, every slot
//! after them holds the invalid descriptor `-1`.
//!
//! ## Compaction
//!
//! ```text
//! remove(fd 9)
//!
//!  before: [ 3 | 7 | 9 | 12 | 15 | -1 | -1 ]   len = 5
//!                    └─ cleared
//!  after:  [ 3 | 7 | 12 | 15 | -1 | -1 | -1 ]  len = 4
//! ```
//!
//! Survivors shift forward one slot and keep their relative order. Slot 0 is
//! claimed by the listening socket at bind time and is never vacated while
//! the server runs, so it stays the listener after any number of removals.

use super::events::EventMask;
use std::collections::TryReserveError;
use std::io;
use std::os::fd::RawFd;
use std::time::Duration;
use thiserror::Error;
use tracing::{trace, warn};

/// Descriptor value marking an unused slot.
pub const INVALID_FD: RawFd = -1;

/// Errors reported by the registry.
#[derive(Debug, Error)]
pub enum RegistryError {
    /// Storage for the watch list could not be allocated
    #[error("registry allocation failed: {0}")]
    Alloc(#[from] TryReserveError),

    /// Every slot is already watching a descriptor
    #[error("registry full: all {capacity} slots in use")]
    Full { capacity: usize },

    /// Negative descriptors cannot be watched
    #[error("invalid descriptor: {0}")]
    InvalidDescriptor(RawFd),
}

/// One watched descriptor, as seen after the last poll.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Entry {
    pub fd: RawFd,
    /// Requested interest
    pub events: EventMask,
    /// What the last poll observed
    pub revents: EventMask,
}

impl From<&libc::pollfd> for Entry {
    fn from(slot: &libc::pollfd) -> Self {
        Self {
            fd: slot.fd,
            events: EventMask::from_bits(slot.events),
            revents: EventMask::from_bits(slot.revents),
        }
    }
}

/// The watch list passed to `poll(2)`.
#[derive(Debug)]
pub struct Registry {
    /// `capacity` slots; the first `watched` are live
    fds: Vec<libc::pollfd>,

    /// Number of live slots
    watched: usize,

    /// `None` blocks until an event arrives
    timeout: Option<Duration>,
}

const VACANT: libc::pollfd = libc::pollfd {
    fd: INVALID_FD,
    events: 0,
    revents: 0,
};

impl Registry {
    /// Allocates `capacity` vacant slots. The timeout starts out as
    /// "block indefinitely".
    pub fn with_capacity(capacity: usize) -> Result<Self, RegistryError> {
        let mut fds = Vec::new();
        fds.try_reserve_exact(capacity)?;
        fds.resize(capacity, VACANT);

        Ok(Self {
            fds,
            watched: 0,
            timeout: None,
        })
    }

    /// Number of watched descriptors.
    #[inline]
    pub fn len(&self) -> usize {
        self.watched
    }

    #[inline]
    pub fn is_empty(&self) -> bool {
        self.watched == 0
    }

    /// Maximum number of descriptors this registry can watch.
    #[inline]
    pub fn capacity(&self) -> usize {
        self.fds.len()
    }

    #[inline]
    pub fn timeout(&self) -> Option<Duration> {
        self.timeout
    }

    /// Sets the poll timeout; `None` blocks until an event arrives.
    pub fn set_timeout(&mut self, timeout: Option<Duration>) {
        self.timeout = timeout;
    }

    /// Slot index of `fd`, if it is watched.
    pub fn position(&self, fd: RawFd) -> Option<usize> {
        self.fds[..self.watched].iter().position(|slot| slot.fd == fd)
    }

    pub fn contains(&self, fd: RawFd) -> bool {
        self.position(fd).is_some()
    }

    /// The watched entry at `index`, if the slot is live.
    pub fn entry(&self, index: usize) -> Option<Entry> {
        self.fds[..self.watched].get(index).map(Entry::from)
    }

    /// All watched entries, in slot order.
    pub fn entries(&self) -> impl Iterator<Item = Entry> + '_ {
        self.fds[..self.watched].iter().map(Entry::from)
    }

    /// Watched entries whose last poll observed at least one event.
    pub fn ready(&self) -> impl Iterator<Item = (usize, Entry)> + '_ {
        self.entries()
            .enumerate()
            .filter(|(_, entry)| !entry.revents.is_empty())
    }

    /// Starts watching `fd` for `events`, or replaces the interest of an
    /// already watched `fd`.
    ///
    /// An update also clears the observed events. It takes no new slot, so it
    /// succeeds even when the registry is full; only a new descriptor can fail
    /// with [`RegistryError::Full`], leaving existing entries untouched.
    pub fn add_or_update(&mut self, fd: RawFd, events: EventMask) -> Result<(), RegistryError> {
        if fd < 0 {
            return Err(RegistryError::InvalidDescriptor(fd));
        }

        if let Some(index) = self.position(fd) {
            let slot = &mut self.fds[index];
            slot.events = events.bits();
            slot.revents = 0;
            trace!(fd, index, events = %events, "Updated watched descriptor");
            return Ok(());
        }

        if self.watched == self.capacity() {
            warn!(fd, capacity = self.capacity(), "Registry full");
            return Err(RegistryError::Full {
                capacity: self.capacity(),
            });
        }

        self.fds[self.watched] = libc::pollfd {
            fd,
            events: events.bits(),
            revents: 0,
        };
        self.watched += 1;
        trace!(fd, index = self.watched - 1, events = %events, "Watching descriptor");
        Ok(())
    }

    /// Stops watching `fd` and packs the survivors toward the front.
    ///
    /// Returns false if `fd` was not watched. The descriptor itself is left
    /// open.
    pub fn remove(&mut self, fd: RawFd) -> bool {
        let Some(index) = self.position(fd) else {
            return false;
        };

        self.fds.copy_within(index + 1..self.watched, index);
        self.watched -= 1;
        self.fds[self.watched] = VACANT;

        trace!(fd, index, remaining = self.watched, "Stopped watching descriptor");
        true
    }

    /// Waits for readiness on every watched descriptor.
    ///
    /// This is the only call that blocks, for at most the configured timeout.
    /// Returns the number of descriptors with a non-empty observed mask. An
    /// interrupted wait (`EINTR`) is reported like any other failure.
    pub fn poll(&mut self) -> io::Result<usize> {
        let timeout = poll_timeout_ms(self.timeout);

        // SAFETY: the pointer and length describe the live prefix of `fds`,
        // which stays borrowed mutably for the duration of the call.
        let ready = unsafe {
            libc::poll(
                self.fds.as_mut_ptr(),
                self.watched as libc::nfds_t,
                timeout,
            )
        };

        if ready < 0 {
            return Err(io::Error::last_os_error());
        }

        Ok(ready as usize)
    }

    /// True if the last poll observed every bit of `flag` on slot `index`.
    pub fn flag_set(&self, index: usize, flag: EventMask) -> bool {
        self.entry(index)
            .is_some_and(|entry| entry.revents.contains(flag))
    }

    /// Observed events on slot `index`, empty for vacant slots.
    pub fn revents(&self, index: usize) -> EventMask {
        self.entry(index)
            .map(|entry| entry.revents)
            .unwrap_or(EventMask::NONE)
    }

    /// Vacates every slot and returns the descriptors that were watched, in
    /// slot order.
    pub fn clear(&mut self) -> Vec<RawFd> {
        let fds = self.fds[..self.watched].iter().map(|slot| slot.fd).collect();
        self.fds[..self.watched].fill(VACANT);
        self.watched = 0;
        fds
    }

    #[cfg(test)]
    pub(crate) fn set_revents(&mut self, index: usize, revents: EventMask) {
        self.fds[index].revents = revents.bits();
    }
}

/// Converts a timeout to the millisecond argument of `poll(2)`.
///
/// `None` is `-1` (block). Partial milliseconds round up, so a non-zero
/// timeout never turns into a busy poll; only `Duration::ZERO` maps to 0.
fn poll_timeout_ms(timeout: Option<Duration>) -> libc::c_int {
    match timeout {
        None => -1,
        Some(timeout) => timeout
            .as_nanos()
            .div_ceil(1_000_000)
            .min(libc::c_int::MAX as u128) as libc::c_int,
    }
}
