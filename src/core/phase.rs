// This module classifies stubs into generation phases. StubsKind is the ordered set of bootstrap
// stages (Initial, Continuation, Compiler, Final) and StubId is the closed set of stub
// identifiers, generated by the declare_stubs! macro from a per-phase table so that ids of one
// phase are always contiguous. From that table the module derives each phase's cardinality (the
// size of an archive index table), the phase owning an id, and the zero-based slot of an id
// inside its phase. The declaration order is the identity of a stub across save/reload: an
// archive written by one build only makes sense to a build with the same table.

//! Generation phases and stub identifiers.

use std::fmt;

use super::error::{StubError, StubResult};

/// Bootstrap stage in which a group of stubs is generated.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
#[repr(u8)]
pub enum StubsKind {
    /// Used by the runtime, the interpreter and compiled code. Generated
    /// before anything executes.
    Initial,
    /// Used by continuations. Generated once barriers are set up but before
    /// the interpreter is initialized.
    Continuation,
    /// Intrinsics used only by compiled code. May be deferred to a compiler
    /// worker thread.
    Compiler,
    /// Everything else. Generated at the end of bootstrap.
    Final,
}

impl StubsKind {
    pub const ALL: [StubsKind; 4] = [
        StubsKind::Initial,
        StubsKind::Continuation,
        StubsKind::Compiler,
        StubsKind::Final,
    ];

    pub const fn name(self) -> &'static str {
        match self {
            StubsKind::Initial => "Initial",
            StubsKind::Continuation => "Continuation",
            StubsKind::Compiler => "Compiler",
            StubsKind::Final => "Final",
        }
    }

    /// Number of stub ids in this phase.
    pub const fn stub_count(self) -> usize {
        let mut i = 0;
        let mut count = 0;
        while i < StubId::ALL.len() {
            if StubId::ALL[i].kind() as u8 == self as u8 {
                count += 1;
            }
            i += 1;
        }
        count
    }

    /// Raw id of the first stub in this phase.
    const fn first_raw(self) -> usize {
        let mut i = 0;
        while i < StubId::ALL.len() {
            if StubId::ALL[i].kind() as u8 == self as u8 {
                return i;
            }
            i += 1;
        }
        StubId::ALL.len()
    }

    /// The stubs of this phase in slot order.
    pub fn stubs(self) -> &'static [StubId] {
        let first = self.first_raw();
        &StubId::ALL[first..first + self.stub_count()]
    }

    /// Stub id occupying `index` in this phase's table.
    pub fn stub_at(self, index: usize) -> Option<StubId> {
        self.stubs().get(index).copied()
    }

    /// Code buffer capacity in bytes for this phase on x86-64.
    pub const fn code_size(self) -> usize {
        match self {
            StubsKind::Initial => 20_000,
            StubsKind::Continuation => 2_000,
            StubsKind::Compiler => 59_000,
            StubsKind::Final => 30_000,
        }
    }

    /// Phases that must be complete before this one may run.
    ///
    /// `Final` depends on `Compiler` only when compiler stubs are generated
    /// eagerly.
    pub fn requires(self, delay_compiler_stubs: bool) -> &'static [StubsKind] {
        match self {
            StubsKind::Initial => &[],
            StubsKind::Continuation => &[StubsKind::Initial],
            StubsKind::Compiler => &[StubsKind::Initial, StubsKind::Continuation],
            StubsKind::Final if delay_compiler_stubs => {
                &[StubsKind::Initial, StubsKind::Continuation]
            }
            StubsKind::Final => &[
                StubsKind::Initial,
                StubsKind::Continuation,
                StubsKind::Compiler,
            ],
        }
    }
}

impl fmt::Display for StubsKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

/// Declares the stub table. Stubs must be listed phase by phase in
/// `StubsKind` order so every phase occupies a contiguous id range.
macro_rules! declare_stubs {
    ($($kind:ident { $($variant:ident => $name:literal,)* })*) => {
        /// Identifier of one stub routine.
        #[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
        #[repr(u16)]
        pub enum StubId {
            $($($variant,)*)*
        }

        impl StubId {
            /// Every stub id in raw id order.
            pub const ALL: &'static [StubId] = &[$($(StubId::$variant,)*)*];

            pub const fn name(self) -> &'static str {
                match self {
                    $($(StubId::$variant => $name,)*)*
                }
            }

            /// Phase that generates this stub.
            pub const fn kind(self) -> StubsKind {
                match self {
                    $($(StubId::$variant => StubsKind::$kind,)*)*
                }
            }
        }
    };
}

declare_stubs! {
    Initial {
        CallStub => "call_stub",
        ForwardException => "forward_exception",
        CatchException => "catch_exception",
        GetPreviousSp => "get_previous_sp",
        VerifyMxcsr => "verify_mxcsr",
        F2iFixup => "f2i_fixup",
        F2lFixup => "f2l_fixup",
        D2iFixup => "d2i_fixup",
        D2lFixup => "d2l_fixup",
        Fence => "fence",
        UpdateBytesCrc32 => "updateBytesCRC32",
        UpdateBytesCrc32c => "updateBytesCRC32C",
    }
    Continuation {
        ContThaw => "Thaw",
        ContReturnBarrier => "Cont thaw return barrier",
        ContReturnBarrierException => "Cont thaw return barrier exception",
    }
    Compiler {
        Base64EncodeBlock => "base64_encodeBlock",
        Base64DecodeBlock => "base64_decodeBlock",
        Sha256ImplCompress => "sha256_implCompress",
        Md5ImplCompress => "md5_implCompress",
        UpdateBytesAdler32 => "updateBytesAdler32",
        GhashProcessBlocks => "ghash_processBlocks",
        Chacha20Block => "chacha20Block",
        Poly1305ProcessBlocks => "poly1305_processBlocks",
        ArraysHashcode => "arrays_hashcode",
    }
    Final {
        VerifyOop => "verify_oop",
        JbyteArraycopy => "jbyte_arraycopy",
        JintArraycopy => "jint_arraycopy",
        JlongArraycopy => "jlong_arraycopy",
        CheckcastArraycopy => "checkcast_arraycopy",
        GenericArraycopy => "generic_arraycopy",
        MethodEntryBarrier => "method_entry_barrier",
        UpcallStubExceptionHandler => "upcall_stub_exception_handler",
    }
}

impl StubId {
    pub const fn raw(self) -> u16 {
        self as u16
    }

    pub fn from_raw(raw: u16) -> StubResult<StubId> {
        StubId::ALL
            .get(raw as usize)
            .copied()
            .ok_or(StubError::UnknownStubId(raw))
    }

    /// Zero-based slot of this stub inside its phase's table.
    pub fn local_index(self) -> usize {
        self as usize - self.kind().first_raw()
    }
}

impl TryFrom<u16> for StubId {
    type Error = StubError;

    fn try_from(raw: u16) -> StubResult<Self> {
        StubId::from_raw(raw)
    }
}

impl fmt::Display for StubId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} ({})", self.name(), self.raw())
    }
}

/// Phase owning `stub`.
pub fn phase_of(stub: StubId) -> StubsKind {
    stub.kind()
}

/// Slot of `stub` within its phase.
pub fn local_index(stub: StubId) -> usize {
    stub.local_index()
}

/// Cardinality of `kind`.
pub fn stub_count(kind: StubsKind) -> usize {
    kind.stub_count()
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashSet;

    #[test]
    fn test_phases_partition_all_ids() {
        let total: usize = StubsKind::ALL.iter().map(|k| k.stub_count()).sum();
        assert_eq!(total, StubId::ALL.len());
    }

    #[test]
    fn test_local_index_is_bijective() {
        for kind in StubsKind::ALL {
            let indices: HashSet<usize> = StubId::ALL
                .iter()
                .filter(|s| s.kind() == kind)
                .map(|s| s.local_index())
                .collect();
            let expected: HashSet<usize> = (0..kind.stub_count()).collect();
            assert_eq!(indices, expected, "{kind} indices");

            for (index, stub) in kind.stubs().iter().enumerate() {
                assert_eq!(stub.local_index(), index);
                assert_eq!(kind.stub_at(index), Some(*stub));
            }
        }
    }

    #[test]
    fn test_ids_are_contiguous_per_phase() {
        let mut seen = Vec::new();
        for stub in StubId::ALL {
            if seen.last() != Some(&stub.kind()) {
                assert!(!seen.contains(&stub.kind()), "{stub} breaks phase order");
                seen.push(stub.kind());
            }
        }
        assert_eq!(seen, StubsKind::ALL.to_vec());
    }

    #[test]
    fn test_raw_round_trip() {
        for stub in StubId::ALL {
            assert_eq!(StubId::from_raw(stub.raw()), Ok(*stub));
        }
        let bad = StubId::ALL.len() as u16;
        assert_eq!(StubId::from_raw(bad), Err(StubError::UnknownStubId(bad)));
    }

    #[test]
    fn test_final_ordering_depends_on_delay_flag() {
        assert!(StubsKind::Final
            .requires(false)
            .contains(&StubsKind::Compiler));
        assert!(!StubsKind::Final
            .requires(true)
            .contains(&StubsKind::Compiler));
    }
}
