//! Code-generation collaborator interface.
//!
//! The generation session never encodes instructions itself. It only needs a
//! buffer that can report its write cursor as an address and commit pending
//! instructions, see [`crate::x64::X64CodeBuffer`] for the x86-64 implementation.

use super::address::Address;
use super::error::StubResult;

/// A code buffer stubs are emitted into.
pub trait CodeSink {
    /// Current write cursor. Only meaningful after [`CodeSink::flush`].
    fn pc(&self) -> Address;

    /// Base address of the buffer's instruction section.
    fn insts_begin(&self) -> Address;

    /// Commit pending instructions so that `pc` reflects them.
    fn flush(&mut self) -> StubResult<()>;

    /// Bytes emitted in `[begin, end)`, if this buffer owns that range.
    fn code_bytes(&self, _begin: Address, _end: Address) -> Option<&[u8]> {
        None
    }
}
