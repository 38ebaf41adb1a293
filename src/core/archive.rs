// This module implements the per-phase stub archive index. StubArchiveData pairs a flat,
// append-only address array shared by every stub of one phase with a fixed-size index table that
// holds, for each stub slot of the phase, either nothing or the (start_index, count) run the stub
// owns in the address array. A run always starts with the stub's entry address, ends with its
// exclusive end address, and carries any additional entry points in between. Slots are
// write-once and runs are appended in insertion order, so start indices grow monotonically and
// never overlap; nothing is ever compacted. The store side fills the index while stubs are being
// generated; the retrieve side (find, then retrieve or entry) reads it back in a later process
// after the external loader has rebuilt it from an ArchiveSnapshot, the logical persistence
// shape with -1/0 sentinels for unset slots. Each stored slot also remembers the stub's name so
// that an archive produced by a build with a different stub table is caught on retrieval.

//! Archive index mapping stub ids to runs of addresses.

use std::sync::Arc;

use super::address::Address;
use super::error::{StubError, StubResult};
use super::phase::{StubId, StubsKind};

/// Run of addresses owned by one stub in the address array.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct IndexEntry {
    start_index: usize,
    count: usize,
}

impl IndexEntry {
    /// Raw form of an unset slot.
    pub const UNSET: (i32, u32) = (-1, 0);

    pub fn start_index(&self) -> usize {
        self.start_index
    }

    pub fn count(&self) -> usize {
        self.count
    }

    /// Index of the stub's end address.
    pub fn end_index(&self) -> usize {
        self.start_index + self.count - 1
    }

    /// Number of entry points between start and end.
    pub fn extra_count(&self) -> usize {
        self.count - 2
    }

    fn to_raw(entry: Option<IndexEntry>) -> (i32, u32) {
        match entry {
            // Tables are sized by phase cardinality; runs fit comfortably.
            Some(e) => (e.start_index as i32, e.count as u32),
            None => Self::UNSET,
        }
    }
}

/// Addresses of one archived stub.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ArchivedStub {
    pub stub: StubId,
    pub start: Address,
    pub end: Address,
    /// Intermediate entry points, in order.
    pub entries: Vec<Address>,
}

/// Logical persistence shape of one phase's archive.
///
/// How this is laid out on disk is up to the loader; the core only produces
/// and validates it.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ArchiveSnapshot {
    pub kind: StubsKind,
    /// `(start_index, count)` per slot, `(-1, 0)` when unset.
    pub index_table: Vec<(i32, u32)>,
    pub addresses: Vec<u64>,
    /// Stub name per slot, `None` when unset.
    pub names: Vec<Option<String>>,
}

/// Per-phase archive of stub addresses.
#[derive(Debug)]
pub struct StubArchiveData {
    kind: StubsKind,
    /// Addresses owned by stubs, in insertion order.
    address_array: Vec<Address>,
    /// One slot per stub of the phase.
    index_table: Box<[Option<IndexEntry>]>,
    names: Box<[Option<Arc<str>>]>,
    /// Stub selected by the last successful `find`.
    current: Option<StubId>,
}

impl StubArchiveData {
    /// Create an empty archive sized for `kind`.
    pub fn new(kind: StubsKind) -> Self {
        let count = kind.stub_count();
        Self {
            kind,
            address_array: Vec::new(),
            index_table: vec![None; count].into_boxed_slice(),
            names: vec![None; count].into_boxed_slice(),
            current: None,
        }
    }

    pub fn kind(&self) -> StubsKind {
        self.kind
    }

    pub fn index_table_count(&self) -> usize {
        self.index_table.len()
    }

    pub fn index_table(&self) -> &[Option<IndexEntry>] {
        &self.index_table
    }

    pub fn address_array(&self) -> &[Address] {
        &self.address_array
    }

    /// Number of slots holding a stored stub.
    pub fn stored_count(&self) -> usize {
        self.index_table.iter().filter(|e| e.is_some()).count()
    }

    pub fn current_stub(&self) -> Option<StubId> {
        self.current
    }

    /// Slot index of `stub`, checking that it belongs to this phase.
    fn slot(&self, stub: StubId) -> StubResult<usize> {
        if stub.kind() != self.kind {
            return Err(StubError::WrongPhase {
                stub,
                expected: self.kind,
                actual: stub.kind(),
            });
        }
        let index = stub.local_index();
        debug_assert!(index < self.index_table.len());
        Ok(index)
    }

    /// Look up `stub`. On a hit the stub becomes current for retrieval.
    ///
    /// A miss clears the current stub so stale data cannot be retrieved.
    pub fn find(&mut self, stub: StubId) -> StubResult<bool> {
        let index = self.slot(stub)?;
        let found = self.index_table[index].is_some();
        self.current = found.then_some(stub);
        log::trace!(
            "archive {} lookup for {stub}: {}",
            self.kind,
            if found { "hit" } else { "miss" }
        );
        Ok(found)
    }

    fn current_entry(&self) -> StubResult<(StubId, IndexEntry)> {
        let stub = self.current.ok_or(StubError::NoCurrentStub)?;
        let index = self.slot(stub)?;
        let entry = self.index_table[index].ok_or(StubError::NoCurrentStub)?;
        if let Some(found) = &self.names[index] {
            if &**found != stub.name() {
                return Err(StubError::StubNameMismatch {
                    expected: stub.name().to_string(),
                    found: found.to_string(),
                });
            }
        }
        Ok((stub, entry))
    }

    /// Addresses of the current stub with the first `extra_count`
    /// intermediate entries.
    pub fn retrieve(&self, extra_count: usize) -> StubResult<ArchivedStub> {
        let (stub, entry) = self.current_entry()?;
        if extra_count > entry.extra_count() {
            return Err(StubError::EntryIndexOutOfRange {
                stub,
                index: extra_count,
                count: entry.count(),
            });
        }
        let first_extra = entry.start_index() + 1;
        Ok(ArchivedStub {
            stub,
            start: self.address_array[entry.start_index()],
            end: self.address_array[entry.end_index()],
            entries: self.address_array[first_extra..first_extra + extra_count].to_vec(),
        })
    }

    /// Addresses of the current stub with every intermediate entry.
    pub fn retrieve_all(&self) -> StubResult<ArchivedStub> {
        let (_, entry) = self.current_entry()?;
        self.retrieve(entry.extra_count())
    }

    /// Intermediate entry `index` (zero-based) of the current stub.
    pub fn entry(&self, index: usize) -> StubResult<Address> {
        let (stub, entry) = self.current_entry()?;
        // Position inside the run; must fall strictly between start and end.
        let position = index + 1;
        if position > entry.count() - 2 {
            return Err(StubError::EntryIndexOutOfRange {
                stub,
                index,
                count: entry.count(),
            });
        }
        Ok(self.address_array[entry.start_index() + position])
    }

    /// Append `start`, `extras` and `end` and record the run for `stub`.
    pub fn store(
        &mut self,
        stub: StubId,
        start: Address,
        end: Address,
        extras: &[Address],
    ) -> StubResult<()> {
        let index = self.slot(stub)?;
        if self.index_table[index].is_some() {
            return Err(StubError::SlotAlreadySet { stub });
        }
        if start.is_null() {
            return Err(StubError::NullAddress {
                stub,
                which: "start",
            });
        }
        if end.is_null() {
            return Err(StubError::NullAddress { stub, which: "end" });
        }
        if extras.iter().any(|a| a.is_null()) {
            return Err(StubError::NullAddress {
                stub,
                which: "entry",
            });
        }

        let start_index = self.address_array.len();
        self.address_array.push(start);
        self.address_array.extend_from_slice(extras);
        self.address_array.push(end);
        let count = self.address_array.len() - start_index;

        self.index_table[index] = Some(IndexEntry { start_index, count });
        self.names[index] = Some(Arc::from(stub.name()));
        log::trace!(
            "archived {stub}: [{start}, {end}) with {} extra entries at index {start_index}",
            extras.len()
        );
        Ok(())
    }

    /// Store a stub with one additional entry point.
    pub fn store_with_entry(
        &mut self,
        stub: StubId,
        start: Address,
        entry: Address,
        end: Address,
    ) -> StubResult<()> {
        self.store(stub, start, end, &[entry])
    }

    /// Store a stub with two additional entry points.
    pub fn store_with_two_entries(
        &mut self,
        stub: StubId,
        start: Address,
        entry1: Address,
        entry2: Address,
        end: Address,
    ) -> StubResult<()> {
        self.store(stub, start, end, &[entry1, entry2])
    }

    /// Export the logical persistence shape.
    pub fn snapshot(&self) -> ArchiveSnapshot {
        ArchiveSnapshot {
            kind: self.kind,
            index_table: self
                .index_table
                .iter()
                .map(|e| IndexEntry::to_raw(*e))
                .collect(),
            addresses: self.address_array.iter().map(|a| a.raw()).collect(),
            names: self
                .names
                .iter()
                .map(|n| n.as_deref().map(str::to_string))
                .collect(),
        }
    }

    /// Rebuild an archive from a snapshot produced by an earlier process.
    pub fn from_snapshot(snapshot: ArchiveSnapshot) -> StubResult<Self> {
        let kind = snapshot.kind;
        let corrupt = |reason: String| StubError::CorruptArchive { kind, reason };

        let count = kind.stub_count();
        if snapshot.index_table.len() != count {
            return Err(corrupt(format!(
                "index table has {} slots, phase has {count} stubs",
                snapshot.index_table.len()
            )));
        }
        if snapshot.names.len() != count {
            return Err(corrupt(format!(
                "name table has {} slots, phase has {count} stubs",
                snapshot.names.len()
            )));
        }
        if let Some(pos) = snapshot.addresses.iter().position(|&a| a == 0) {
            return Err(corrupt(format!("null address at index {pos}")));
        }

        let mut archive = Self::new(kind);
        let mut runs = Vec::new();
        for (slot, (&(start, n), name)) in snapshot
            .index_table
            .iter()
            .zip(snapshot.names.iter())
            .enumerate()
        {
            if (start, n) == IndexEntry::UNSET {
                if name.is_some() {
                    return Err(corrupt(format!("unset slot {slot} carries a name")));
                }
                continue;
            }
            let name = name
                .as_ref()
                .ok_or_else(|| corrupt(format!("slot {slot} has no name")))?;
            if start < 0 || n < 2 {
                return Err(corrupt(format!(
                    "slot {slot} has invalid run ({start}, {n})"
                )));
            }
            let entry = IndexEntry {
                start_index: start as usize,
                count: n as usize,
            };
            if entry.start_index + entry.count > snapshot.addresses.len() {
                return Err(corrupt(format!("slot {slot} runs past the address array")));
            }
            archive.index_table[slot] = Some(entry);
            archive.names[slot] = Some(Arc::from(name.as_str()));
            runs.push((entry, slot));
        }

        // Runs follow insertion order, not slot order.
        runs.sort_by_key(|(entry, _)| entry.start_index);
        for pair in runs.windows(2) {
            let ((prev, _), (next, slot)) = (pair[0], pair[1]);
            if next.start_index <= prev.end_index() {
                return Err(corrupt(format!("slot {slot} overlaps an earlier run")));
            }
        }

        archive.address_array = snapshot.addresses.into_iter().map(Address::new).collect();
        Ok(archive)
    }
}
