//! Stub code descriptors.
//!
//! A [`StubCodeDesc`] identifies one generated code region so that a program
//! counter can be mapped back to a named stub. Descriptors are created with a
//! known `begin` and, for freshly generated code, finished later by setting
//! `end`; hydrated descriptors are created with both bounds.

use std::fmt;
use std::sync::Arc;

use super::address::Address;
use super::error::{StubError, StubResult};

/// Identity of one generated code region.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StubCodeDesc {
    group: Arc<str>,
    name: Arc<str>,
    /// First byte of the stub (included).
    begin: Address,
    /// First byte after the stub (excluded). `None` while the stub is being built.
    end: Option<Address>,
    /// Offset of `begin` from the owning buffer's base.
    disp: u64,
    loaded_from_cache: bool,
}

impl StubCodeDesc {
    pub(crate) fn new(group: &str, name: &str, begin: Address, end: Option<Address>) -> Self {
        Self {
            group: Arc::from(group),
            name: Arc::from(name),
            begin,
            end,
            disp: 0,
            loaded_from_cache: false,
        }
    }

    pub fn group(&self) -> &str {
        &self.group
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn begin(&self) -> Address {
        self.begin
    }

    pub fn end(&self) -> Option<Address> {
        self.end
    }

    pub fn disp(&self) -> u64 {
        self.disp
    }

    pub fn loaded_from_cache(&self) -> bool {
        self.loaded_from_cache
    }

    pub fn is_complete(&self) -> bool {
        self.end.is_some()
    }

    /// Size of the finished region, zero while the stub is still being built.
    pub fn size_in_bytes(&self) -> u64 {
        self.end
            .and_then(|end| end.offset_from(self.begin))
            .unwrap_or(0)
    }

    /// Whether `pc` lies in `[begin, end)`. An unfinished stub contains nothing.
    pub fn contains(&self, pc: Address) -> bool {
        match self.end {
            Some(end) => self.begin <= pc && pc < end,
            None => false,
        }
    }

    pub(crate) fn set_begin(&mut self, begin: Address) -> StubResult<()> {
        if begin < self.begin {
            return Err(StubError::BeginDecreased {
                name: self.name.to_string(),
                old: self.begin,
                new: begin,
            });
        }
        if let Some(end) = self.end {
            if begin > end {
                return Err(StubError::UnorderedBounds {
                    name: self.name.to_string(),
                    begin,
                    end,
                });
            }
        }
        self.begin = begin;
        Ok(())
    }

    pub(crate) fn set_end(&mut self, end: Address) -> StubResult<()> {
        if self.begin > end {
            return Err(StubError::UnorderedBounds {
                name: self.name.to_string(),
                begin: self.begin,
                end,
            });
        }
        self.end = Some(end);
        Ok(())
    }

    pub(crate) fn set_disp(&mut self, disp: u64) {
        self.disp = disp;
    }

    pub(crate) fn set_loaded_from_cache(&mut self) {
        self.loaded_from_cache = true;
    }
}

impl fmt::Display for StubCodeDesc {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}::{} [{}, ", self.group, self.name, self.begin)?;
        match self.end {
            Some(end) => write!(f, "{end}")?,
            None => f.write_str("?")?,
        }
        write!(f, "] ({} bytes)", self.size_in_bytes())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_contains_is_half_open() {
        let desc = StubCodeDesc::new(
            "StubRoutines",
            "f2i_fixup",
            Address::new(0x1000),
            Some(Address::new(0x1020)),
        );
        assert!(desc.contains(Address::new(0x1000)));
        assert!(desc.contains(Address::new(0x101f)));
        assert!(!desc.contains(Address::new(0x1020)));
        assert!(!desc.contains(Address::new(0x0fff)));
        assert_eq!(desc.size_in_bytes(), 0x20);
    }

    #[test]
    fn test_unfinished_desc_contains_nothing() {
        let desc = StubCodeDesc::new("StubRoutines", "fence", Address::new(0x1000), None);
        assert!(!desc.is_complete());
        assert!(!desc.contains(Address::new(0x1000)));
        assert_eq!(desc.size_in_bytes(), 0);
    }

    #[test]
    fn test_begin_may_not_decrease() {
        let mut desc = StubCodeDesc::new("StubRoutines", "fence", Address::new(0x1010), None);
        assert!(desc.set_begin(Address::new(0x1018)).is_ok());
        assert!(matches!(
            desc.set_begin(Address::new(0x1000)),
            Err(StubError::BeginDecreased { .. })
        ));
        assert!(matches!(
            desc.set_end(Address::new(0x1004)),
            Err(StubError::UnorderedBounds { .. })
        ));
        desc.set_end(Address::new(0x1020)).unwrap();
        assert!(matches!(
            desc.set_begin(Address::new(0x1030)),
            Err(StubError::UnorderedBounds { .. })
        ));
    }

    #[test]
    fn test_describe() {
        let desc = StubCodeDesc::new(
            "StubRoutines",
            "d2l_fixup",
            Address::new(0x2000),
            Some(Address::new(0x2030)),
        );
        assert_eq!(
            desc.to_string(),
            "StubRoutines::d2l_fixup [0x0000000000002000, 0x0000000000002030] (48 bytes)"
        );
    }
}
