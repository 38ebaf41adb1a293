// This module defines the error type for stub bookkeeping using the thiserror crate. StubError
// enumerates every invariant the descriptor registry, the archive index, the generation session
// and the bootstrap sequencer guard: registry freeze misuse, descriptor bound ordering, stub ids
// that do not belong to an archive's phase, double stores, null addresses, out-of-range entry
// requests, retrieval without a current stub, archived-name mismatches, corrupt snapshots, phase
// ordering, mark misuse, buffer overflow and encoding failures. Each variant carries the stub,
// address or phase involved so the diagnostic identifies the offender. None of these are
// recoverable: callers propagate them to the bootstrap driver, which reports and terminates.
// The only expected negative outcome, an archive miss, is not an error at all.

//! Error types for stub generation bookkeeping.

use thiserror::Error;

use super::address::Address;
use super::phase::{StubId, StubsKind};
use super::registry::DescId;

/// Main error type for stub registration, archiving and generation.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum StubError {
    #[error("no modifications allowed: registry is frozen (registering {group}::{name})")]
    RegistryFrozen { group: String, name: String },

    #[error("no name specified for stub in group {group}")]
    EmptyStubName { group: String },

    #[error("repeated freeze operation")]
    RepeatedFreeze,

    #[error("repeated unfreeze operation")]
    RepeatedUnfreeze,

    #[error("begin may not decrease for {name}: {old} -> {new}")]
    BeginDecreased {
        name: String,
        old: Address,
        new: Address,
    },

    #[error("begin & end not properly ordered for {name}: [{begin}, {end})")]
    UnorderedBounds {
        name: String,
        begin: Address,
        end: Address,
    },

    #[error("unknown descriptor handle {0:?}")]
    UnknownDescriptor(DescId),

    #[error("stub id {stub} belongs to {actual} stubs, archive holds {expected} stubs")]
    WrongPhase {
        stub: StubId,
        expected: StubsKind,
        actual: StubsKind,
    },

    #[error("invalid stub id {0}")]
    UnknownStubId(u16),

    #[error("archive slot for stub {stub} is already set")]
    SlotAlreadySet { stub: StubId },

    #[error("{which} address cannot be null for stub {stub}")]
    NullAddress { stub: StubId, which: &'static str },

    #[error("entry index {index} out of range for stub {stub} with {count} addresses")]
    EntryIndexOutOfRange {
        stub: StubId,
        index: usize,
        count: usize,
    },

    #[error("no current stub: retrieval requires a successful find")]
    NoCurrentStub,

    #[error("restored stub has wrong name: expected {expected}, archive has {found}")]
    StubNameMismatch { expected: String, found: String },

    #[error("corrupt {kind} stub archive: {reason}")]
    CorruptArchive { kind: StubsKind, reason: String },

    #[error("{phase} stubs require {requires} stubs to be generated first")]
    PhaseOrder {
        phase: StubsKind,
        requires: StubsKind,
    },

    #[error("archive for {actual} stubs attached to {expected} stub generation")]
    ArchiveKindMismatch {
        expected: StubsKind,
        actual: StubsKind,
    },

    #[error("{0} stubs have already been generated")]
    PhaseAlreadyGenerated(StubsKind),

    #[error("stub {active} is still being generated, cannot begin {name}")]
    NestedStub { active: String, name: String },

    #[error("stub mark for {name} does not belong to the active stub")]
    MarkMismatch { name: String },

    #[error("stub {stub} declares {expected} extra entries, emitted {found}")]
    EntryCountMismatch {
        stub: StubId,
        expected: usize,
        found: usize,
    },

    #[error("code buffer overflow: {required} bytes required, capacity {capacity}")]
    CodeBufferOverflow { required: usize, capacity: usize },

    #[error("Code generation failed: {reason}")]
    CodeGeneration { reason: String },
}

/// Result type alias for stub operations.
pub type StubResult<T> = Result<T, StubError>;

impl From<iced_x86::IcedError> for StubError {
    fn from(err: iced_x86::IcedError) -> Self {
        Self::CodeGeneration {
            reason: err.to_string(),
        }
    }
}
