// This module is the hub for stub bookkeeping shared by every phase and every target. It
// organizes the pieces a stub generator needs: addresses and descriptors for emitted code, the
// process-wide descriptor registry with its freeze protocol, the per-phase archive index used to
// hydrate stubs from a saved cache, the phase and stub id tables, the generation session that
// brackets each stub with begin and end marks, listener notifications, options read from the
// environment, and summary statistics. Nothing here emits machine code directly; a target
// provides a CodeSink and the session only ever reads its current pc and asks it to flush.

//! Core stub bookkeeping.
//!
//! # Key Components
//!
//! ## Descriptors and registry (`descriptor`, `registry`)
//! - Named `[begin, end)` ranges for every emitted stub
//! - Append-only registry with address lookup and freeze/unfreeze
//!
//! ## Archive index (`archive`)
//! - Flat address array plus a write-once per-stub index table
//! - Snapshot form for saving and validating a cache
//!
//! ## Generation session (`session`)
//! - Begin/end marks with prolog and epilog hooks
//! - Hydration from an archive before generating
//! - Publication to code event listeners

pub mod address;
pub mod archive;
pub mod codegen;
pub mod config;
pub mod descriptor;
pub mod error;
pub mod listener;
pub mod phase;
pub mod registry;
pub mod session;
pub mod statistics;
pub mod test_utils;

pub use address::Address;
pub use archive::{ArchiveSnapshot, ArchivedStub, IndexEntry, StubArchiveData};
pub use codegen::CodeSink;
pub use config::StubGenOptions;
pub use descriptor::StubCodeDesc;
pub use error::{StubError, StubResult};
pub use listener::{CodeEventListener, LoggingListener, NullListener};
pub use phase::{local_index, phase_of, stub_count, StubId, StubsKind};
pub use registry::{DescId, StubRegistry};
pub use session::{
    print_stub_code_desc, DefaultHooks, StubCodeGenerator, StubCodeMark, StubEntries, StubHooks,
    STUB_ROUTINES_GROUP,
};
pub use statistics::StubStatistics;
