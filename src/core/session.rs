// This module provides the stub generation session. StubCodeGenerator borrows a code buffer, the
// shared descriptor registry, an optional per-phase archive and a notification listener, and
// wraps every unit of stub emission in a descriptor. For each stub it first asks the archive for
// previously recorded addresses; on a hit it registers a finished descriptor flagged as loaded
// from cache and skips emission entirely, on a miss it opens a StubCodeMark (registering a
// descriptor whose end is unknown), runs the prolog hook, lets the caller emit code, closes the
// mark by finalizing end and displacement, runs the epilog hook and commits the addresses to the
// archive. Cached or fresh, every descriptor is published to the listener. Marks are consumed
// when closed, so a registered stub cannot be reopened, and only one mark may be open at a time.
// The prolog/epilog strategy is the StubHooks trait; DefaultHooks logs each finished descriptor
// and, when print_stub_code is set, its disassembly.

//! Stub generation sessions.

use super::address::Address;
use super::archive::StubArchiveData;
use super::codegen::CodeSink;
use super::descriptor::StubCodeDesc;
use super::error::{StubError, StubResult};
use super::listener::CodeEventListener;
use super::phase::StubId;
use super::registry::{DescId, StubRegistry};

/// Group label of descriptors created for archived stub routines.
pub const STUB_ROUTINES_GROUP: &str = "StubRoutines";

/// Per-session prolog/epilog strategy.
pub trait StubHooks<S: CodeSink> {
    /// Called after the descriptor is registered and before its begin is
    /// fixed. Code emitted here lies outside the stub.
    fn stub_prolog(&mut self, _sink: &mut S, _desc: &StubCodeDesc) -> StubResult<()> {
        Ok(())
    }

    /// Called once the stub's end is known.
    fn stub_epilog(&mut self, sink: &S, desc: &StubCodeDesc, print_code: bool) {
        let end = desc.end().unwrap_or(desc.begin());
        print_stub_code_desc(desc, sink.code_bytes(desc.begin(), end), print_code);
    }
}

/// Stock hooks: no prolog, epilog logs the descriptor.
#[derive(Debug, Default, Clone, Copy)]
pub struct DefaultHooks;

impl<S: CodeSink> StubHooks<S> for DefaultHooks {}

/// Log a descriptor and, when requested and available, its disassembly.
pub fn print_stub_code_desc(desc: &StubCodeDesc, code: Option<&[u8]>, print_code: bool) {
    log::debug!("{desc}");

    if print_code {
        match code {
            Some(bytes) => {
                let mut listing = String::new();
                for line in crate::x64::disassemble(bytes, desc.begin()) {
                    listing.push_str(&line);
                    listing.push('\n');
                }
                log::info!(
                    "- - - [BEGIN] - - - - - - - - - -\n{desc}\n{listing}- - - [END] - - - - - - - - - -"
                );
            }
            None => log::info!("{desc} (no code available)"),
        }
    }
}

/// An open stub. Consumed by [`StubCodeGenerator::end_stub`].
#[derive(Debug)]
#[must_use = "an open stub must be closed with end_stub"]
pub struct StubCodeMark {
    id: DescId,
    name: String,
}

impl StubCodeMark {
    pub fn desc_id(&self) -> DescId {
        self.id
    }

    pub fn name(&self) -> &str {
        &self.name
    }
}

/// Addresses of a stub after generation or hydration.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StubEntries {
    pub stub: StubId,
    pub start: Address,
    pub end: Address,
    /// Additional entry points, in order.
    pub entries: Vec<Address>,
    pub loaded_from_cache: bool,
}

/// Drives descriptor bookkeeping around code emission.
pub struct StubCodeGenerator<'a, S: CodeSink, H: StubHooks<S> = DefaultHooks> {
    sink: &'a mut S,
    registry: &'a StubRegistry,
    archive: Option<&'a mut StubArchiveData>,
    listener: &'a dyn CodeEventListener,
    hooks: H,
    print_code: bool,
    /// Descriptor of the open mark, if any.
    active: Option<DescId>,
    /// Descriptors published by this generator.
    published: usize,
}

impl<'a, S: CodeSink> StubCodeGenerator<'a, S, DefaultHooks> {
    pub fn new(
        sink: &'a mut S,
        registry: &'a StubRegistry,
        listener: &'a dyn CodeEventListener,
    ) -> Self {
        Self {
            sink,
            registry,
            archive: None,
            listener,
            hooks: DefaultHooks,
            print_code: false,
            active: None,
            published: 0,
        }
    }
}

impl<'a, S: CodeSink, H: StubHooks<S>> StubCodeGenerator<'a, S, H> {
    /// Attach an archive to consult and fill.
    pub fn with_archive(mut self, archive: Option<&'a mut StubArchiveData>) -> Self {
        self.archive = archive;
        self
    }

    /// Replace the prolog/epilog strategy.
    pub fn with_hooks<H2: StubHooks<S>>(self, hooks: H2) -> StubCodeGenerator<'a, S, H2> {
        StubCodeGenerator {
            sink: self.sink,
            registry: self.registry,
            archive: self.archive,
            listener: self.listener,
            hooks,
            print_code: self.print_code,
            active: self.active,
            published: self.published,
        }
    }

    pub fn print_code(mut self, print_code: bool) -> Self {
        self.print_code = print_code;
        self
    }

    pub fn sink(&mut self) -> &mut S {
        &mut *self.sink
    }

    pub fn registry(&self) -> &StubRegistry {
        self.registry
    }

    pub fn hooks(&self) -> &H {
        &self.hooks
    }

    pub fn has_archive(&self) -> bool {
        self.archive.is_some()
    }

    /// Stubs this generator has registered, generated or hydrated.
    pub fn stubs_published(&self) -> usize {
        self.published
    }

    /// Open a descriptor for a stub about to be emitted.
    pub fn begin_stub(&mut self, group: &str, name: &str) -> StubResult<StubCodeMark> {
        if let Some(active) = self.active {
            let active = self
                .registry
                .get(active)
                .map(|d| d.name().to_string())
                .unwrap_or_default();
            return Err(StubError::NestedStub {
                active,
                name: name.to_string(),
            });
        }

        self.sink.flush()?;
        let id = self.registry.register(group, name, self.sink.pc(), None)?;
        let desc = self.registry.get(id).ok_or(StubError::UnknownDescriptor(id))?;
        self.hooks.stub_prolog(&mut *self.sink, &desc)?;

        // The stub's entry point is after the prolog.
        self.sink.flush()?;
        self.registry.set_begin(id, self.sink.pc())?;
        self.active = Some(id);
        log::trace!("{group}::{name} generating");
        Ok(StubCodeMark {
            id,
            name: name.to_string(),
        })
    }

    /// Close `mark`: finalize the descriptor's end and displacement and publish it.
    pub fn end_stub(&mut self, mark: StubCodeMark) -> StubResult<StubCodeDesc> {
        if self.active != Some(mark.id) {
            return Err(StubError::MarkMismatch { name: mark.name });
        }

        self.sink.flush()?;
        let end = self.sink.pc();
        let begin = self
            .registry
            .get(mark.id)
            .ok_or(StubError::UnknownDescriptor(mark.id))?
            .begin();
        let disp = self.displacement(begin);
        let desc = self.registry.finish(mark.id, end, disp)?;
        self.active = None;

        self.hooks.stub_epilog(&*self.sink, &desc, self.print_code);
        self.publish(&desc);
        Ok(desc)
    }

    /// Hydrate `stub` from the archive, registering a finished descriptor.
    ///
    /// Returns `Ok(None)` on a miss or when no archive is attached.
    pub fn try_load_from_archive(
        &mut self,
        stub: StubId,
        extra_count: usize,
    ) -> StubResult<Option<StubEntries>> {
        let Some(archive) = self.archive.as_deref_mut() else {
            return Ok(None);
        };
        if !archive.find(stub)? {
            return Ok(None);
        }
        // The archived run must match the current stub layout exactly.
        let loaded = archive.retrieve_all()?;
        if loaded.entries.len() != extra_count {
            return Err(StubError::EntryCountMismatch {
                stub,
                expected: extra_count,
                found: loaded.entries.len(),
            });
        }

        let desc = self.setup_loaded_code_desc(stub.name(), loaded.start, loaded.end)?;
        log::trace!("{} hydrated from archive", desc.name());
        Ok(Some(StubEntries {
            stub,
            start: loaded.start,
            end: loaded.end,
            entries: loaded.entries,
            loaded_from_cache: true,
        }))
    }

    /// Record a freshly generated stub's addresses for a later run, and
    /// publish its entry addresses whether or not an archive is attached.
    pub fn commit_to_archive(
        &mut self,
        stub: StubId,
        start: Address,
        end: Address,
        extras: &[Address],
    ) -> StubResult<()> {
        if let Some(archive) = self.archive.as_deref_mut() {
            archive.store(stub, start, end, extras)?;
        }
        self.listener.add_stub_address(start);
        for &entry in extras {
            self.listener.add_stub_address(entry);
        }
        Ok(())
    }

    /// Generate `stub`, or hydrate it from the archive when possible.
    ///
    /// `emit` writes the stub body into the sink and returns the stub's
    /// `extra_count` additional entry points.
    pub fn generate_stub<F>(
        &mut self,
        stub: StubId,
        extra_count: usize,
        emit: F,
    ) -> StubResult<StubEntries>
    where
        F: FnOnce(&mut S) -> StubResult<Vec<Address>>,
    {
        if let Some(entries) = self.try_load_from_archive(stub, extra_count)? {
            return Ok(entries);
        }

        let mark = self.begin_stub(STUB_ROUTINES_GROUP, stub.name())?;
        let entries = emit(&mut *self.sink)?;
        if entries.len() != extra_count {
            return Err(StubError::EntryCountMismatch {
                stub,
                expected: extra_count,
                found: entries.len(),
            });
        }
        let desc = self.end_stub(mark)?;

        let start = desc.begin();
        let end = desc.end().unwrap_or(start);
        self.commit_to_archive(stub, start, end, &entries)?;
        Ok(StubEntries {
            stub,
            start,
            end,
            entries,
            loaded_from_cache: false,
        })
    }

    /// Register a hydrated descriptor whose bounds are already known and publish it.
    fn setup_loaded_code_desc(
        &mut self,
        name: &str,
        start: Address,
        end: Address,
    ) -> StubResult<StubCodeDesc> {
        let id = self
            .registry
            .register(STUB_ROUTINES_GROUP, name, start, Some(end))?;
        let disp = self.displacement(start);
        let desc = self.registry.mark_loaded(id, disp)?;
        print_stub_code_desc(&desc, None, self.print_code);
        self.publish(&desc);
        Ok(desc)
    }

    fn displacement(&self, begin: Address) -> u64 {
        let base = self.sink.insts_begin();
        begin.offset_from(base).unwrap_or_else(|| {
            log::warn!("stub at {begin} lies below buffer base {base}");
            0
        })
    }

    fn publish(&mut self, desc: &StubCodeDesc) {
        self.published += 1;
        let end = desc.end().unwrap_or(desc.begin());
        self.listener.register_stub(desc.name(), desc.begin(), end);
        if self.listener.should_post_dynamic_code_generated() {
            self.listener
                .post_dynamic_code_generated(desc.name(), desc.begin(), end);
        }
    }
}
