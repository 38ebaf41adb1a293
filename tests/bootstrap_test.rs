//! Phase sequencing, generation and hydration across a whole bootstrap.

use std::sync::Arc;
use std::thread;

use iced_x86::code_asm::*;
use stubcode::x64::X64CodeBuffer;
use stubcode::{
    Address, CodeSink, NullListener, StubArchiveData, StubError, StubGenOptions, StubId,
    StubRegistry, StubResult, StubRoutines, StubStatistics, StubsKind,
};

fn init_logging() {
    let _ = env_logger::builder().is_test(true).try_init();
}

fn base(kind: StubsKind) -> Address {
    Address::new(0x7f20_0000_0000 + 0x10_0000 * kind as u64)
}

fn extra_entries(stub: StubId) -> usize {
    if stub == StubId::CallStub {
        1
    } else {
        0
    }
}

fn emit(stub: StubId, b: &mut X64CodeBuffer) -> StubResult<Vec<Address>> {
    b.emit_prologue(0)?;
    let mut entries = Vec::new();
    if stub == StubId::CallStub {
        b.asm().call(rdx)?;
        b.flush()?;
        entries.push(b.pc());
    }
    b.asm().xor(eax, eax)?;
    b.emit_epilogue(0)?;
    Ok(entries)
}

fn run_phase(
    routines: &StubRoutines,
    kind: StubsKind,
    archive: Option<&mut StubArchiveData>,
) -> StubResult<usize> {
    let mut buffer = X64CodeBuffer::for_phase(kind, base(kind))?;
    routines.generate_phase(kind, &mut buffer, archive, &NullListener, |gen| {
        let mut loaded = 0;
        for &stub in kind.stubs() {
            let entries = gen.generate_stub(stub, extra_entries(stub), |b| emit(stub, b))?;
            assert_eq!(entries.entries.len(), extra_entries(stub));
            if entries.loaded_from_cache {
                loaded += 1;
            }
        }
        Ok(loaded)
    })
}

#[test]
fn test_full_bootstrap_registers_every_stub() {
    init_logging();
    let routines = StubRoutines::new(Arc::new(StubRegistry::new()), StubGenOptions::default());
    for kind in StubsKind::ALL {
        assert_eq!(run_phase(&routines, kind, None).unwrap(), 0);
    }

    let registry = routines.registry();
    assert!(registry.is_frozen());
    assert_eq!(registry.len(), StubId::ALL.len());
    for kind in StubsKind::ALL {
        let desc = registry.find_by_address(base(kind)).unwrap();
        assert_eq!(desc.name(), kind.stubs()[0].name());
        assert_eq!(desc.disp(), 0);
    }

    let stats = StubStatistics::collect(registry);
    assert_eq!(stats.emitted, StubId::ALL.len());
    assert_eq!(stats.loaded_from_cache, 0);
}

#[test]
fn test_out_of_order_phase_rejected() {
    let routines = StubRoutines::new(Arc::new(StubRegistry::new()), StubGenOptions::default());
    assert_eq!(
        run_phase(&routines, StubsKind::Compiler, None),
        Err(StubError::PhaseOrder {
            phase: StubsKind::Compiler,
            requires: StubsKind::Initial
        })
    );
    assert!(routines.registry().is_empty());
}

#[test]
fn test_hydrated_bootstrap_matches_generated() {
    init_logging();
    let routines = StubRoutines::new(Arc::new(StubRegistry::new()), StubGenOptions::default());
    let mut snapshots = Vec::new();
    for kind in StubsKind::ALL {
        let mut archive = StubArchiveData::new(kind);
        run_phase(&routines, kind, Some(&mut archive)).unwrap();
        assert_eq!(archive.stored_count(), kind.stub_count());
        snapshots.push(archive.snapshot());
    }

    let hydrated = StubRoutines::new(Arc::new(StubRegistry::new()), StubGenOptions::default());
    for (kind, snapshot) in StubsKind::ALL.into_iter().zip(snapshots) {
        let mut archive = StubArchiveData::from_snapshot(snapshot).unwrap();
        let loaded = run_phase(&hydrated, kind, Some(&mut archive)).unwrap();
        assert_eq!(loaded, kind.stub_count());
    }

    let original = routines.registry().descriptors();
    let restored = hydrated.registry().descriptors();
    assert_eq!(original.len(), restored.len());
    for (a, b) in original.iter().zip(&restored) {
        assert_eq!(a.name(), b.name());
        assert_eq!(a.begin(), b.begin());
        assert_eq!(a.end(), b.end());
        assert!(b.loaded_from_cache());
    }
    assert_eq!(StubStatistics::collect(hydrated.registry()).generated(), 0);
}

#[test]
fn test_partial_archive_falls_back_to_generation() {
    let routines = StubRoutines::new(Arc::new(StubRegistry::new()), StubGenOptions::default());
    let mut archive = StubArchiveData::new(StubsKind::Initial);
    archive
        .store(StubId::Fence, Address::new(0x7f30_0000_0000), Address::new(0x7f30_0000_0004), &[])
        .unwrap();

    let loaded = run_phase(&routines, StubsKind::Initial, Some(&mut archive)).unwrap();
    assert_eq!(loaded, 1);
    assert_eq!(archive.stored_count(), StubsKind::Initial.stub_count());

    let fence = routines
        .registry()
        .find_by_address(Address::new(0x7f30_0000_0000))
        .unwrap();
    assert!(fence.loaded_from_cache());
}

#[test]
fn test_delayed_compiler_stubs_on_worker_thread() {
    init_logging();
    let options = StubGenOptions {
        delay_compiler_stubs: true,
        ..Default::default()
    };
    let routines = Arc::new(StubRoutines::new(Arc::new(StubRegistry::new()), options));
    run_phase(&routines, StubsKind::Initial, None).unwrap();
    run_phase(&routines, StubsKind::Continuation, None).unwrap();

    let worker = {
        let routines = Arc::clone(&routines);
        thread::spawn(move || run_phase(&routines, StubsKind::Compiler, None))
    };
    run_phase(&routines, StubsKind::Final, None).unwrap();
    worker.join().unwrap().unwrap();

    assert!(routines.is_generated(StubsKind::Compiler));
    assert!(routines.registry().is_frozen());
    assert_eq!(routines.registry().len(), StubId::ALL.len());
    assert!(routines
        .registry()
        .find_by_address(base(StubsKind::Compiler))
        .is_some());
}
