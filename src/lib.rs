//! Stubcode - bookkeeping for runtime-generated stub routines.
//!
//! A virtual machine emits small machine-code stubs at startup (call stubs,
//! arraycopy kernels, intrinsics) in ordered phases. This crate records a
//! named descriptor for every stub, answers "which stub contains this pc",
//! and keeps a per-phase archive index so a later run can hydrate stubs from
//! a saved cache instead of regenerating them.
//!
//! # Primary Usage
//!
//! ```ignore
//! use std::sync::Arc;
//! use stubcode::{Address, NullListener, StubGenOptions, StubId, StubRegistry, StubsKind};
//! use stubcode::routines::StubRoutines;
//! use stubcode::x64::X64CodeBuffer;
//!
//! let routines = StubRoutines::new(Arc::new(StubRegistry::new()), StubGenOptions::from_env());
//! let mut buffer = X64CodeBuffer::for_phase(StubsKind::Initial, Address::new(0x7f00_0000_0000))?;
//! routines.generate_phase(StubsKind::Initial, &mut buffer, None, &NullListener, |gen| {
//!     gen.generate_stub(StubId::Fence, 0, |b| {
//!         b.asm().mfence()?;
//!         b.asm().ret()?;
//!         Ok(Vec::new())
//!     })?;
//!     Ok(())
//! })?;
//! ```
//!
//! # Architecture
//!
//! - [`core`] - Descriptors, registry, archive index, generation session
//! - [`x64`] - x86-64 code buffer and disassembly
//! - [`routines`] - Phase ordering and registry freezing across bootstrap

pub mod core;
pub mod routines;
pub mod x64;

pub use core::{
    Address, ArchiveSnapshot, CodeEventListener, CodeSink, LoggingListener, NullListener,
    StubArchiveData, StubCodeDesc, StubCodeGenerator, StubError, StubGenOptions, StubId,
    StubRegistry, StubResult, StubStatistics, StubsKind,
};
pub use routines::StubRoutines;
