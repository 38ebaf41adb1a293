// This module provides the process-wide descriptor registry. StubRegistry is an explicit object
// rather than a global: whoever owns bootstrap sequencing creates it and hands a reference (or an
// Arc when a compiler worker thread needs it) to every generation session. Descriptors live in an
// append-only vector and are addressed by DescId handles; lookups scan from the most recently
// registered descriptor so the newest stub wins on overlap, matching a list that is prepended
// to. The frozen flag is a one-way-per-pairing guard that marks when bootstrap registration is
// over; it bounds when appends are legal while the RwLock provides the actual mutual exclusion
// once a delayed compiler phase can append from another thread.

//! Descriptor registry with a freeze/unfreeze guard.

use parking_lot::RwLock;

use super::address::Address;
use super::descriptor::StubCodeDesc;
use super::error::{StubError, StubResult};

/// Handle to a descriptor in a [`StubRegistry`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct DescId(usize);

#[derive(Debug, Default)]
struct RegistryState {
    /// Descriptors in registration order. Never removed or reordered.
    descs: Vec<StubCodeDesc>,
    frozen: bool,
}

/// Append-only registry of all stub descriptors across all phases.
#[derive(Debug, Default)]
pub struct StubRegistry {
    state: RwLock<RegistryState>,
}

impl StubRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Create and link a new descriptor.
    ///
    /// `end` is `None` for a stub about to be emitted.
    pub fn register(
        &self,
        group: &str,
        name: &str,
        begin: Address,
        end: Option<Address>,
    ) -> StubResult<DescId> {
        if name.is_empty() {
            return Err(StubError::EmptyStubName {
                group: group.to_string(),
            });
        }
        if let Some(end) = end {
            if begin > end {
                return Err(StubError::UnorderedBounds {
                    name: name.to_string(),
                    begin,
                    end,
                });
            }
        }

        let mut state = self.state.write();
        if state.frozen {
            return Err(StubError::RegistryFrozen {
                group: group.to_string(),
                name: name.to_string(),
            });
        }
        let id = DescId(state.descs.len());
        state.descs.push(StubCodeDesc::new(group, name, begin, end));
        Ok(id)
    }

    /// First descriptor, most recent first, whose `[begin, end)` contains `pc`.
    pub fn find_by_address(&self, pc: Address) -> Option<StubCodeDesc> {
        self.state
            .read()
            .descs
            .iter()
            .rev()
            .find(|desc| desc.contains(pc))
            .cloned()
    }

    pub fn get(&self, id: DescId) -> Option<StubCodeDesc> {
        self.state.read().descs.get(id.0).cloned()
    }

    /// Formatted summary of a descriptor, see [`StubCodeDesc`]'s `Display`.
    pub fn describe(&self, id: DescId) -> Option<String> {
        self.state.read().descs.get(id.0).map(ToString::to_string)
    }

    pub fn freeze(&self) -> StubResult<()> {
        let mut state = self.state.write();
        if state.frozen {
            return Err(StubError::RepeatedFreeze);
        }
        state.frozen = true;
        log::trace!("stub registry frozen with {} descriptors", state.descs.len());
        Ok(())
    }

    pub fn unfreeze(&self) -> StubResult<()> {
        let mut state = self.state.write();
        if !state.frozen {
            return Err(StubError::RepeatedUnfreeze);
        }
        state.frozen = false;
        log::trace!("stub registry unfrozen");
        Ok(())
    }

    pub fn is_frozen(&self) -> bool {
        self.state.read().frozen
    }

    pub fn len(&self) -> usize {
        self.state.read().descs.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// All descriptors, most recently registered first.
    pub fn descriptors(&self) -> Vec<StubCodeDesc> {
        self.state.read().descs.iter().rev().cloned().collect()
    }

    pub(crate) fn set_begin(&self, id: DescId, begin: Address) -> StubResult<()> {
        self.with_desc(id, |desc| desc.set_begin(begin))
    }

    /// Finalize a descriptor that was registered without an end.
    pub(crate) fn finish(&self, id: DescId, end: Address, disp: u64) -> StubResult<StubCodeDesc> {
        self.with_desc(id, |desc| {
            desc.set_end(end)?;
            desc.set_disp(disp);
            Ok(desc.clone())
        })
    }

    /// Stamp a registered, complete descriptor as hydrated from an archive.
    pub(crate) fn mark_loaded(&self, id: DescId, disp: u64) -> StubResult<StubCodeDesc> {
        self.with_desc(id, |desc| {
            desc.set_disp(disp);
            desc.set_loaded_from_cache();
            Ok(desc.clone())
        })
    }

    fn with_desc<R>(
        &self,
        id: DescId,
        f: impl FnOnce(&mut StubCodeDesc) -> StubResult<R>,
    ) -> StubResult<R> {
        let mut state = self.state.write();
        let desc = state
            .descs
            .get_mut(id.0)
            .ok_or(StubError::UnknownDescriptor(id))?;
        f(desc)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn addr(raw: u64) -> Address {
        Address::new(raw)
    }

    #[test]
    fn test_register_and_find() {
        let registry = StubRegistry::new();
        registry
            .register("StubRoutines", "f2i_fixup", addr(0x1000), Some(addr(0x1020)))
            .unwrap();
        registry
            .register("StubRoutines", "f2l_fixup", addr(0x1020), Some(addr(0x1050)))
            .unwrap();

        assert_eq!(registry.len(), 2);
        assert_eq!(
            registry.find_by_address(addr(0x1010)).unwrap().name(),
            "f2i_fixup"
        );
        assert_eq!(
            registry.find_by_address(addr(0x1020)).unwrap().name(),
            "f2l_fixup"
        );
        assert!(registry.find_by_address(addr(0x1050)).is_none());
        assert!(registry.find_by_address(addr(0x0fff)).is_none());
    }

    #[test]
    fn test_most_recent_wins_on_overlap() {
        let registry = StubRegistry::new();
        registry
            .register("StubRoutines", "old", addr(0x1000), Some(addr(0x1100)))
            .unwrap();
        registry
            .register("StubRoutines", "new", addr(0x1080), Some(addr(0x1100)))
            .unwrap();
        assert_eq!(registry.find_by_address(addr(0x1090)).unwrap().name(), "new");
        assert_eq!(registry.descriptors()[0].name(), "new");
    }

    #[test]
    fn test_freeze_blocks_registration() {
        let registry = StubRegistry::new();
        registry.freeze().unwrap();
        assert!(matches!(
            registry.register("StubRoutines", "fence", addr(0x1000), None),
            Err(StubError::RegistryFrozen { .. })
        ));
        registry.unfreeze().unwrap();
        assert!(registry
            .register("StubRoutines", "fence", addr(0x1000), None)
            .is_ok());
    }

    #[test]
    fn test_freeze_calls_must_pair() {
        let registry = StubRegistry::new();
        assert_eq!(registry.unfreeze(), Err(StubError::RepeatedUnfreeze));
        registry.freeze().unwrap();
        assert_eq!(registry.freeze(), Err(StubError::RepeatedFreeze));
    }

    #[test]
    fn test_empty_name_rejected() {
        let registry = StubRegistry::new();
        assert!(matches!(
            registry.register("StubRoutines", "", addr(0x1000), None),
            Err(StubError::EmptyStubName { .. })
        ));
        assert!(registry.is_empty());
    }

    #[test]
    fn test_finish_pending_descriptor() {
        let registry = StubRegistry::new();
        let id = registry
            .register("StubRoutines", "call_stub", addr(0x1000), None)
            .unwrap();
        assert!(registry.find_by_address(addr(0x1000)).is_none());

        registry.set_begin(id, addr(0x1008)).unwrap();
        let desc = registry.finish(id, addr(0x1040), 8).unwrap();
        assert_eq!(desc.begin(), addr(0x1008));
        assert_eq!(desc.disp(), 8);
        assert_eq!(
            registry.describe(id).unwrap(),
            "StubRoutines::call_stub [0x0000000000001008, 0x0000000000001040] (56 bytes)"
        );
        assert_eq!(registry.find_by_address(addr(0x1010)), Some(desc));
    }
}
