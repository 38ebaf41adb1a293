//! Stub generation driver.
//!
//! Runs the four bootstrap phases over a set of small x86-64 stub bodies,
//! optionally generating compiler stubs on a worker thread, archiving every
//! phase and hydrating a second bootstrap from the archives. Prints the
//! resulting stub statistics and resolves `--lookup` addresses to stubs.

use std::error::Error;
use std::sync::Arc;
use std::thread;

use clap::{ArgAction, Parser};
use iced_x86::code_asm::*;

use stubcode::x64::X64CodeBuffer;
use stubcode::{
    Address, CodeEventListener, CodeSink, LoggingListener, StubArchiveData, StubGenOptions, StubId,
    StubRegistry, StubResult, StubRoutines, StubStatistics, StubsKind,
};

/// Base address of the first phase's code buffer.
const CODE_BASE: u64 = 0x7f10_0000_0000;
/// Distance between phase buffers, larger than any phase's code size.
const PHASE_STRIDE: u64 = 0x10_0000;

#[derive(Parser, Debug)]
#[command(name = "stubgen", version, about = "Generate, archive and look up runtime stubs")]
struct Cli {
    /// Disassemble every freshly generated stub
    #[arg(long)]
    print_stub_code: bool,

    /// Generate compiler stubs on a worker thread after the eager phases
    #[arg(long)]
    delay_compiler_stubs: bool,

    /// Archive every phase and hydrate a second bootstrap from the archives
    #[arg(long)]
    archive: bool,

    /// Report the stub containing each address (hex, 0x prefix optional)
    #[arg(long = "lookup", value_name = "PC", value_parser = parse_address)]
    lookup: Vec<Address>,

    /// Increase log verbosity (-v info, -vv debug, -vvv trace)
    #[arg(short, long, action = ArgAction::Count)]
    verbose: u8,
}

impl Cli {
    fn options(&self) -> StubGenOptions {
        let mut options = StubGenOptions::from_env();
        options.print_stub_code |= self.print_stub_code;
        options.delay_compiler_stubs |= self.delay_compiler_stubs;
        options.archive_stubs |= self.archive;
        options
    }
}

fn parse_address(arg: &str) -> Result<Address, String> {
    let digits = arg
        .strip_prefix("0x")
        .or_else(|| arg.strip_prefix("0X"))
        .unwrap_or(arg);
    u64::from_str_radix(digits, 16)
        .map(Address::new)
        .map_err(|e| format!("invalid address {arg}: {e}"))
}

fn init_logging(verbose: u8) {
    let level = match verbose {
        0 => "warn",
        1 => "info",
        2 => "debug",
        _ => "trace",
    };
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or(level)).init();
}

fn phase_base(kind: StubsKind) -> Address {
    Address::new(CODE_BASE + PHASE_STRIDE * kind as u64)
}

/// Additional entry points a stub publishes besides its start.
fn extra_entries(stub: StubId) -> usize {
    match stub {
        StubId::CallStub
        | StubId::JbyteArraycopy
        | StubId::JintArraycopy
        | StubId::JlongArraycopy => 1,
        _ => 0,
    }
}

/// Emit the body of `stub`, returning its extra entry points.
fn emit_stub(stub: StubId, b: &mut X64CodeBuffer) -> StubResult<Vec<Address>> {
    let mut entries = Vec::with_capacity(extra_entries(stub));
    match stub {
        StubId::CallStub => {
            b.emit_prologue(16)?;
            b.asm().mov(qword_ptr(rbp - 8), rdi)?;
            b.asm().call(rdx)?;
            // Return address for frames entered through the call stub.
            b.flush()?;
            entries.push(b.pc());
            b.asm().mov(rdi, qword_ptr(rbp - 8))?;
            b.emit_epilogue(16)?;
        }
        StubId::GetPreviousSp => {
            b.asm().lea(rax, qword_ptr(rsp + 8))?;
            b.asm().ret()?;
        }
        StubId::Fence => {
            b.asm().mfence()?;
            b.asm().ret()?;
        }
        StubId::VerifyMxcsr => {
            b.asm().sub(rsp, 8)?;
            b.asm().stmxcsr(dword_ptr(rsp))?;
            b.asm().mov(eax, dword_ptr(rsp))?;
            b.asm().add(rsp, 8)?;
            b.asm().ret()?;
        }
        StubId::JbyteArraycopy | StubId::JintArraycopy | StubId::JlongArraycopy => {
            b.emit_prologue(0)?;
            // Entry for callers that already set up the frame.
            b.flush()?;
            entries.push(b.pc());
            b.asm().mov(rcx, rdx)?;
            b.asm().xor(eax, eax)?;
            b.emit_epilogue(0)?;
        }
        _ => {
            b.emit_prologue(0)?;
            b.asm().xor(eax, eax)?;
            b.emit_epilogue(0)?;
        }
    }
    Ok(entries)
}

fn run_phase(
    routines: &StubRoutines,
    kind: StubsKind,
    archive: Option<&mut StubArchiveData>,
    listener: &dyn CodeEventListener,
) -> StubResult<()> {
    let mut buffer = X64CodeBuffer::for_phase(kind, phase_base(kind))?;
    routines.generate_phase(kind, &mut buffer, archive, listener, |gen| {
        for &stub in kind.stubs() {
            gen.generate_stub(stub, extra_entries(stub), |b| emit_stub(stub, b))?;
        }
        Ok(())
    })
}

/// Run every phase in bootstrap order against a fresh registry.
///
/// `archives` is indexed by phase; a `None` slot generates that phase
/// without an archive.
fn bootstrap(
    options: StubGenOptions,
    archives: &mut [Option<StubArchiveData>; 4],
) -> Result<Arc<StubRegistry>, Box<dyn Error>> {
    let routines = Arc::new(StubRoutines::new(Arc::new(StubRegistry::new()), options));
    let listener = LoggingListener;

    run_phase(
        &routines,
        StubsKind::Initial,
        archives[StubsKind::Initial as usize].as_mut(),
        &listener,
    )?;
    run_phase(
        &routines,
        StubsKind::Continuation,
        archives[StubsKind::Continuation as usize].as_mut(),
        &listener,
    )?;

    if options.delay_compiler_stubs {
        let worker_routines = Arc::clone(&routines);
        let mut compiler_archive = archives[StubsKind::Compiler as usize].take();
        let worker = thread::Builder::new()
            .name("compiler-stubs".to_string())
            .spawn(move || {
                run_phase(
                    &worker_routines,
                    StubsKind::Compiler,
                    compiler_archive.as_mut(),
                    &LoggingListener,
                )
                .map(|()| compiler_archive)
            })?;

        run_phase(
            &routines,
            StubsKind::Final,
            archives[StubsKind::Final as usize].as_mut(),
            &listener,
        )?;
        archives[StubsKind::Compiler as usize] = worker
            .join()
            .map_err(|_| "compiler stub worker panicked")??;
    } else {
        run_phase(
            &routines,
            StubsKind::Compiler,
            archives[StubsKind::Compiler as usize].as_mut(),
            &listener,
        )?;
        run_phase(
            &routines,
            StubsKind::Final,
            archives[StubsKind::Final as usize].as_mut(),
            &listener,
        )?;
    }

    Ok(Arc::clone(routines.registry()))
}

/// Rebuild each recorded archive from its snapshot, as a later process would.
fn restore_archives(
    archives: &[Option<StubArchiveData>; 4],
) -> StubResult<[Option<StubArchiveData>; 4]> {
    let mut restored: [Option<StubArchiveData>; 4] = [None, None, None, None];
    for archive in archives.iter().flatten() {
        log::info!(
            "{} archive: {} stubs, {} addresses",
            archive.kind(),
            archive.stored_count(),
            archive.address_array().len()
        );
        let data = StubArchiveData::from_snapshot(archive.snapshot())?;
        let kind = data.kind();
        restored[kind as usize] = Some(data);
    }
    Ok(restored)
}

fn run(cli: &Cli) -> Result<(), Box<dyn Error>> {
    let options = cli.options();
    log::debug!("stub generation options: {options:?}");

    let mut archives: [Option<StubArchiveData>; 4] = if options.archive_stubs {
        StubsKind::ALL.map(|kind| Some(StubArchiveData::new(kind)))
    } else {
        [None, None, None, None]
    };

    let mut registry = bootstrap(options, &mut archives)?;
    println!("{}", StubStatistics::collect(&registry));

    if options.archive_stubs {
        let mut hydrated = restore_archives(&archives)?;
        registry = bootstrap(options, &mut hydrated)?;
        let stats = StubStatistics::collect(&registry);
        println!("After hydration:");
        println!("{stats}");
        if stats.generated() != 0 {
            log::warn!(
                "{} stubs were regenerated despite a complete archive",
                stats.generated()
            );
        }
    }

    for &pc in &cli.lookup {
        match registry.find_by_address(pc) {
            Some(desc) => println!("{pc}: {desc}"),
            None => println!("{pc}: not in any stub"),
        }
    }
    Ok(())
}

fn main() {
    let cli = Cli::parse();
    init_logging(cli.verbose);

    if let Err(err) = run(&cli) {
        log::error!("stub generation failed: {err}");
        eprintln!("Error: {err}");
        std::process::exit(1);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn archiving(delay_compiler_stubs: bool) -> StubGenOptions {
        StubGenOptions {
            archive_stubs: true,
            delay_compiler_stubs,
            ..Default::default()
        }
    }

    #[test]
    fn test_parse_address() {
        assert_eq!(parse_address("0x7f10"), Ok(Address::new(0x7f10)));
        assert_eq!(parse_address("7F10"), Ok(Address::new(0x7f10)));
        assert!(parse_address("0xzz").is_err());
    }

    #[test]
    fn test_archive_then_hydrate() {
        for delay in [false, true] {
            let options = archiving(delay);
            let mut archives = StubsKind::ALL.map(|kind| Some(StubArchiveData::new(kind)));
            let generated = bootstrap(options, &mut archives).unwrap();
            assert_eq!(StubStatistics::collect(&generated).generated(), StubId::ALL.len());

            let mut hydrated = restore_archives(&archives).unwrap();
            for kind in StubsKind::ALL {
                assert_eq!(hydrated[kind as usize].as_ref().unwrap().kind(), kind);
            }
            let registry = bootstrap(options, &mut hydrated).unwrap();
            let stats = StubStatistics::collect(&registry);
            assert_eq!(stats.generated(), 0);
            assert_eq!(stats.loaded_from_cache, StubId::ALL.len());

            let call_stub = registry.find_by_address(phase_base(StubsKind::Initial)).unwrap();
            assert_eq!(call_stub.name(), "call_stub");
            assert!(call_stub.loaded_from_cache());
        }
    }
}
