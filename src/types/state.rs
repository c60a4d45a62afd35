//! Lifecycle state flags of a control block.
//!
//! The flags form a small bitset rather than an enum because several of them
//! hold at once: a finished task that was cancelled is
//! `STARTED | FINISHED | TERMINATED | FAILED`.
//!
//! ```text
//! Created ──start()──► STARTED|RESUMED ◄──resume()──┐
//!                            │                      │
//!                            ├──suspend()──► STARTED (suspended)
//!                            │
//!                            └──exit──► FINISHED [+TERMINATED] [+FAILED]
//! ```

use core::fmt;
use std::ops::{BitOr, BitOrAssign};

/// Bitset describing where a control block is in its lifecycle.
#[derive(Clone, Copy, Default, PartialEq, Eq, Hash)]
pub struct StateFlags(u8);

impl StateFlags {
    /// No flag set: the block has been created but not started.
    pub const CREATED: Self = Self(0);
    /// `start()` has run. Never cleared.
    pub const STARTED: Self = Self(1 << 0);
    /// The resume gate is open. Cleared by `suspend()`, set by `resume()`.
    pub const RESUMED: Self = Self(1 << 1);
    /// The body has exited on some path. Never cleared.
    pub const FINISHED: Self = Self(1 << 2);
    /// The body exited because it was cancelled or forcibly aborted.
    pub const TERMINATED: Self = Self(1 << 3);
    /// The body exited with an error (cancellation included).
    pub const FAILED: Self = Self(1 << 4);

    const NAMES: [(Self, &'static str); 5] = [
        (Self::STARTED, "STARTED"),
        (Self::RESUMED, "RESUMED"),
        (Self::FINISHED, "FINISHED"),
        (Self::TERMINATED, "TERMINATED"),
        (Self::FAILED, "FAILED"),
    ];

    /// Returns the raw bits.
    #[inline]
    #[must_use]
    pub const fn bits(self) -> u8 {
        self.0
    }

    /// Returns true if every flag in `other` is set.
    #[inline]
    #[must_use]
    pub const fn contains(self, other: Self) -> bool {
        self.0 & other.0 == other.0
    }

    /// Sets the flags in `other`.
    #[inline]
    pub fn insert(&mut self, other: Self) {
        self.0 |= other.0;
    }

    /// Clears the flags in `other`.
    #[inline]
    pub fn remove(&mut self, other: Self) {
        self.0 &= !other.0;
    }

    /// Started, not finished, and the resume bit is clear.
    #[inline]
    #[must_use]
    pub const fn is_suspended(self) -> bool {
        self.contains(Self::STARTED)
            && !self.contains(Self::RESUMED)
            && !self.contains(Self::FINISHED)
    }
}

impl BitOr for StateFlags {
    type Output = Self;

    fn bitor(self, rhs: Self) -> Self {
        Self(self.0 | rhs.0)
    }
}

impl BitOrAssign for StateFlags {
    fn bitor_assign(&mut self, rhs: Self) {
        self.0 |= rhs.0;
    }
}

impl fmt::Debug for StateFlags {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "StateFlags({self})")
    }
}

impl fmt::Display for StateFlags {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let mut first = true;
        for (flag, name) in Self::NAMES {
            if self.contains(flag) {
                if !first {
                    f.write_str("|")?;
                }
                f.write_str(name)?;
                first = false;
            }
        }
        if first {
            f.write_str("CREATED")?;
        }
        Ok(())
    }
}
