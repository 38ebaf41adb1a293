// This module provides the x86-64 code buffer stubs are emitted into, built on iced-x86's
// CodeAssembler. X64CodeBuffer implements CodeSink: instructions are queued on a CodeAssembler
// through asm(), and flush() assembles the queue at the buffer's current pc, appends the bytes
// and starts a fresh assembler, so pc() always names the next byte to be written. Stub
// generators call flush() whenever they need the address of an entry point, the same way the
// end of a stub is taken. The buffer has a fixed capacity (one per generation phase) and refuses
// to grow past it. Addresses are virtual: the buffer is anchored at a caller-chosen base and
// never mapped executable, which is left to the code cache. Prologue/epilogue helpers emit the
// usual System V frame setup around stub bodies that call out.

//! x86-64 code buffer using iced-x86.

use iced_x86::code_asm::*;

use crate::core::{Address, CodeSink, StubError, StubResult, StubsKind};

/// Growable, capacity-bounded x86-64 code buffer.
pub struct X64CodeBuffer {
    /// Address of the first byte of the buffer.
    base: Address,
    capacity: usize,
    /// Bytes committed so far.
    code: Vec<u8>,
    /// Instructions queued since the last flush.
    assembler: CodeAssembler,
}

impl X64CodeBuffer {
    /// Create an empty buffer anchored at `base`.
    pub fn new(base: Address, capacity: usize) -> StubResult<Self> {
        Ok(Self {
            base,
            capacity,
            code: Vec::with_capacity(capacity),
            assembler: CodeAssembler::new(64)?,
        })
    }

    /// Buffer sized for the stubs of `kind`.
    pub fn for_phase(kind: StubsKind, base: Address) -> StubResult<Self> {
        Self::new(base, kind.code_size())
    }

    /// Assembler for queuing instructions at the current position.
    pub fn asm(&mut self) -> &mut CodeAssembler {
        &mut self.assembler
    }

    /// Committed bytes.
    pub fn code(&self) -> &[u8] {
        &self.code
    }

    pub fn len(&self) -> usize {
        self.code.len()
    }

    pub fn is_empty(&self) -> bool {
        self.code.is_empty()
    }

    pub fn capacity(&self) -> usize {
        self.capacity
    }

    pub fn remaining(&self) -> usize {
        self.capacity - self.code.len()
    }

    /// Queue a frame setup: `push rbp; mov rbp, rsp; sub rsp, frame_size`.
    pub fn emit_prologue(&mut self, frame_size: u32) -> StubResult<()> {
        self.assembler.push(rbp)?;
        self.assembler.mov(rbp, rsp)?;
        if frame_size > 0 {
            self.assembler.sub(rsp, frame_size as i32)?;
        }
        Ok(())
    }

    /// Queue the matching teardown and `ret`.
    pub fn emit_epilogue(&mut self, frame_size: u32) -> StubResult<()> {
        if frame_size > 0 {
            self.assembler.add(rsp, frame_size as i32)?;
        }
        self.assembler.pop(rbp)?;
        self.assembler.ret()?;
        Ok(())
    }
}

impl CodeSink for X64CodeBuffer {
    fn pc(&self) -> Address {
        self.base.add(self.code.len() as u64)
    }

    fn insts_begin(&self) -> Address {
        self.base
    }

    fn flush(&mut self) -> StubResult<()> {
        if self.assembler.instructions().is_empty() {
            return Ok(());
        }

        let bytes = self.assembler.assemble(self.pc().raw())?;
        let required = self.code.len() + bytes.len();
        if required > self.capacity {
            return Err(StubError::CodeBufferOverflow {
                required,
                capacity: self.capacity,
            });
        }
        self.code.extend_from_slice(&bytes);
        self.assembler = CodeAssembler::new(64)?;
        Ok(())
    }

    fn code_bytes(&self, begin: Address, end: Address) -> Option<&[u8]> {
        let start = usize::try_from(begin.offset_from(self.base)?).ok()?;
        let stop = usize::try_from(end.offset_from(self.base)?).ok()?;
        self.code.get(start..stop)
    }
}
