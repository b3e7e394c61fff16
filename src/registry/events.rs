//! Readiness Event Masks
//!
//! A thin, typed wrapper over the `poll(2)` event bits. The same mask type is
//! used for the interest a descriptor is registered with and for what the
//! kernel reports back after a poll.

use std::fmt;
use std::ops::{BitAnd, BitOr, BitOrAssign};

/// A set of `poll(2)` readiness flags.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub struct EventMask(libc::c_short);

impl EventMask {
    /// No events
    pub const NONE: EventMask = EventMask(0);

    /// Data can be read without blocking (`POLLIN`)
    pub const READABLE: EventMask = EventMask(libc::POLLIN);

    /// Data can be written without blocking (`POLLOUT`)
    pub const WRITABLE: EventMask = EventMask(libc::POLLOUT);

    /// Urgent/out-of-band data is available (`POLLPRI`)
    pub const PRIORITY: EventMask = EventMask(libc::POLLPRI);

    /// The peer hung up (`POLLHUP`)
    pub const HANGUP: EventMask = EventMask(libc::POLLHUP);

    /// An error condition is pending on the descriptor (`POLLERR`, output only)
    pub const ERROR: EventMask = EventMask(libc::POLLERR);

    /// The descriptor is not open (`POLLNVAL`, output only)
    pub const INVALID: EventMask = EventMask(libc::POLLNVAL);

    /// Interest registered for the listening socket
    pub const LISTENER: EventMask = EventMask(libc::POLLIN | libc::POLLPRI);

    /// Interest registered for a freshly accepted connection
    pub const CONNECTION: EventMask = EventMask(libc::POLLIN | libc::POLLOUT | libc::POLLHUP);

    #[inline]
    pub const fn from_bits(bits: libc::c_short) -> Self {
        Self(bits)
    }

    #[inline]
    pub const fn bits(self) -> libc::c_short {
        self.0
    }

    #[inline]
    pub const fn is_empty(self) -> bool {
        self.0 == 0
    }

    /// True if every bit of `other` is set in `self`.
    #[inline]
    pub const fn contains(self, other: EventMask) -> bool {
        self.0 & other.0 == other.0
    }

    /// True if any bit of `other` is set in `self`.
    #[inline]
    pub const fn intersects(self, other: EventMask) -> bool {
        self.0 & other.0 != 0
    }

    #[inline]
    pub const fn is_readable(self) -> bool {
        self.intersects(Self::READABLE)
    }

    #[inline]
    pub const fn is_writable(self) -> bool {
        self.intersects(Self::WRITABLE)
    }

    #[inline]
    pub const fn is_priority(self) -> bool {
        self.intersects(Self::PRIORITY)
    }

    #[inline]
    pub const fn is_hangup(self) -> bool {
        self.intersects(Self::HANGUP)
    }

    /// True for `POLLERR` or `POLLNVAL`.
    #[inline]
    pub const fn is_error(self) -> bool {
        self.intersects(EventMask(libc::POLLERR | libc::POLLNVAL))
    }

    #[inline]
    pub const fn remove(self, other: EventMask) -> Self {
        Self(self.0 & !other.0)
    }
}

impl BitOr for EventMask {
    type Output = Self;

    fn bitor(self, rhs: Self) -> Self {
        Self(self.0 | rhs.0)
    }
}

impl BitOrAssign for EventMask {
    fn bitor_assign(&mut self, rhs: Self) {
        self.0 |= rhs.0;
    }
}

impl BitAnd for EventMask {
    type Output = Self;

    fn bitand(self, rhs: Self) -> Self {
        Self(self.0 & rhs.0)
    }
}

impl fmt::Display for EventMask {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        const NAMES: [(EventMask, &str); 6] = [
            (EventMask::READABLE, "READABLE"),
            (EventMask::WRITABLE, "WRITABLE"),
            (EventMask::PRIORITY, "PRIORITY"),
            (EventMask::HANGUP, "HANGUP"),
            (EventMask::ERROR, "ERROR"),
            (EventMask::INVALID, "INVALID"),
        ];

        if self.is_empty() {
            return write!(f, "NONE");
        }

        let mut first = true;
        for (flag, name) in NAMES {
            if self.contains(flag) {
                if !first {
                    write!(f, "|")?;
                }
                write!(f, "{}", name)?;
                first = false;
            }
        }

        // Bits outside the named set (e.g. POLLRDNORM) are shown raw
        let named = NAMES.iter().fold(0, |acc, (flag, _)| acc | flag.0);
        let rest = self.0 & !named;
        if rest != 0 {
            if !first {
                write!(f, "|")?;
            }
            write!(f, "{:#06x}", rest)?;
        }

        Ok(())
    }
}
