// This module sequences stub generation across the bootstrap phases. StubRoutines holds the
// shared descriptor registry and the generation options, and runs one phase at a time through a
// StubCodeGenerator built over the caller's code buffer, archive and listener. It enforces the
// temporal contract between phases: Continuation after Initial, Compiler after Initial and
// Continuation, Final after everything eager. A phase runs at most once, and an attached archive
// must have been built for that phase. Completing Final ends bootstrap registration by freezing
// the registry. A delayed Compiler phase may run on a compiler worker thread, before, during or
// after Final: if it starts after the freeze it unfreezes the registry, and whichever of the two
// phases finishes last performs the freeze. Phase bookkeeping and the freeze transitions happen
// under one mutex, so the two threads never observe a half-updated state.

//! Bootstrap sequencing of stub generation phases.

use std::sync::Arc;

use parking_lot::Mutex;

use crate::core::{
    CodeEventListener, CodeSink, StubArchiveData, StubCodeGenerator, StubError, StubGenOptions,
    StubRegistry, StubResult, StubsKind,
};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum PhaseState {
    Pending,
    Running,
    Done,
}

/// Owner of bootstrap-time stub generation.
pub struct StubRoutines {
    registry: Arc<StubRegistry>,
    options: StubGenOptions,
    phases: Mutex<[PhaseState; 4]>,
}

impl StubRoutines {
    pub fn new(registry: Arc<StubRegistry>, options: StubGenOptions) -> Self {
        Self {
            registry,
            options,
            phases: Mutex::new([PhaseState::Pending; 4]),
        }
    }

    pub fn registry(&self) -> &Arc<StubRegistry> {
        &self.registry
    }

    pub fn options(&self) -> &StubGenOptions {
        &self.options
    }

    pub fn is_generated(&self, kind: StubsKind) -> bool {
        self.phases.lock()[kind as usize] == PhaseState::Done
    }

    /// Run `body` as the generation of phase `kind`.
    ///
    /// `archive`, when given, must belong to `kind`; it is consulted for
    /// hydration and filled with freshly generated stubs.
    pub fn generate_phase<S, F, R>(
        &self,
        kind: StubsKind,
        sink: &mut S,
        archive: Option<&mut StubArchiveData>,
        listener: &dyn CodeEventListener,
        body: F,
    ) -> StubResult<R>
    where
        S: CodeSink,
        F: FnOnce(&mut StubCodeGenerator<'_, S>) -> StubResult<R>,
    {
        if let Some(archive) = archive.as_deref() {
            if archive.kind() != kind {
                return Err(StubError::ArchiveKindMismatch {
                    expected: kind,
                    actual: archive.kind(),
                });
            }
        }
        self.claim(kind)?;

        log::info!("generating {kind} stubs ({} declared)", kind.stub_count());
        let mut generator = StubCodeGenerator::new(sink, &self.registry, listener)
            .with_archive(archive)
            .print_code(self.options.print_stub_code);
        let result = body(&mut generator)?;
        log::info!(
            "{kind} stubs done: {} descriptors registered",
            generator.stubs_published()
        );

        self.complete(kind)?;
        Ok(result)
    }

    /// Check ordering and mark `kind` as running.
    fn claim(&self, kind: StubsKind) -> StubResult<()> {
        let mut phases = self.phases.lock();
        if phases[kind as usize] != PhaseState::Pending {
            return Err(StubError::PhaseAlreadyGenerated(kind));
        }
        for &required in kind.requires(self.options.delay_compiler_stubs) {
            if phases[required as usize] != PhaseState::Done {
                return Err(StubError::PhaseOrder {
                    phase: kind,
                    requires: required,
                });
            }
        }
        // Delayed compiler stubs may arrive after bootstrap froze the registry.
        if kind == StubsKind::Compiler && self.registry.is_frozen() {
            log::debug!("unfreezing stub registry for delayed compiler stubs");
            self.registry.unfreeze()?;
        }
        phases[kind as usize] = PhaseState::Running;
        Ok(())
    }

    /// Mark `kind` as done and freeze the registry once nothing else may register.
    fn complete(&self, kind: StubsKind) -> StubResult<()> {
        let mut phases = self.phases.lock();
        phases[kind as usize] = PhaseState::Done;

        let final_done = phases[StubsKind::Final as usize] == PhaseState::Done;
        let compiler_running = phases[StubsKind::Compiler as usize] == PhaseState::Running;
        if final_done && !compiler_running && !self.registry.is_frozen() {
            self.registry.freeze()?;
        }
        Ok(())
    }
}
