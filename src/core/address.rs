//! Code addresses.
//!
//! Stub bookkeeping never dereferences an address; it only orders, compares and
//! stores them. A plain `u64` wrapper keeps the archive free of raw pointers so
//! addresses can be written out and read back by a later process.

use std::fmt;

/// An address inside a code buffer. Zero is the null address.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, PartialOrd, Ord, Hash)]
#[repr(transparent)]
pub struct Address(u64);

impl Address {
    pub const NULL: Address = Address(0);

    pub const fn new(raw: u64) -> Self {
        Self(raw)
    }

    pub const fn raw(self) -> u64 {
        self.0
    }

    pub const fn is_null(self) -> bool {
        self.0 == 0
    }

    /// Distance from `base` to this address, or `None` if it lies below `base`.
    pub fn offset_from(self, base: Address) -> Option<u64> {
        self.0.checked_sub(base.0)
    }

    pub fn add(self, offset: u64) -> Address {
        Address(self.0.wrapping_add(offset))
    }
}

impl From<u64> for Address {
    fn from(raw: u64) -> Self {
        Self(raw)
    }
}

impl fmt::Display for Address {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{:#018x}", self.0)
    }
}

impl fmt::LowerHex for Address {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        fmt::LowerHex::fmt(&self.0, f)
    }
}
