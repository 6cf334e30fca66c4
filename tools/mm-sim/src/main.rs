//! Replays user-level memory workloads against the memory manager and
//! prints the counters a user program would observe.
//!
//! ```text
//! mm-sim [cow|mmap|shared|sizes|stress]...
//! ```
//!
//! With no arguments every scenario runs. Log output goes to stderr at the
//! level named by `MM_LOG` (default `warn`).

mod logger;

use kernel_alloc::{BootError, FrameAllocator, InvariantViolation};
use kernel_info::memory::PoolLayout;
use kernel_memory_addresses::{PAGE_SIZE, VirtualAddress};
use kernel_mm::syscall::{FAILED, NULL, Sysno, syscall};
use kernel_mm::{MemoryManager, MmError, UserMemory};
use log::info;
use logger::StderrLogger;
use std::process::ExitCode;
use std::thread;

const POOL_FRAMES: u64 = 256;

#[derive(Debug, thiserror::Error)]
enum SimError {
    #[error("boot failed: {0}")]
    Boot(#[from] BootError),
    #[error(transparent)]
    Mm(#[from] MmError),
    #[error("kernel halted: {0}")]
    Halted(#[from] InvariantViolation),
    #[error("{what}: expected {expected:#x}, got {got:#x}")]
    Mismatch {
        what: &'static str,
        expected: u64,
        got: u64,
    },
    #[error("unknown scenario {0:?}")]
    UnknownScenario(String),
    #[error("worker thread panicked")]
    WorkerPanicked,
}

type Scenario = fn(&MemoryManager<'_>) -> Result<(), SimError>;

const SCENARIOS: &[(&str, Scenario)] = &[
    ("cow", cow),
    ("mmap", mmap),
    ("shared", shared),
    ("sizes", sizes),
    ("stress", stress),
];

fn main() -> ExitCode {
    if let Err(e) = StderrLogger::from_env().init() {
        eprintln!("logger: {e}");
    }

    let wanted: Vec<String> = std::env::args().skip(1).collect();
    match run(&wanted) {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            eprintln!("mm-sim: {e}");
            ExitCode::FAILURE
        }
    }
}

fn run(wanted: &[String]) -> Result<(), SimError> {
    let selected: Vec<_> = if wanted.is_empty() {
        SCENARIOS.to_vec()
    } else {
        wanted
            .iter()
            .map(|w| {
                SCENARIOS
                    .iter()
                    .find(|(name, _)| *name == w.as_str())
                    .copied()
                    .ok_or_else(|| SimError::UnknownScenario(w.clone()))
            })
            .collect::<Result<_, _>>()?
    };

    for (name, scenario) in selected {
        // Each scenario gets a fresh machine.
        let frames = FrameAllocator::boot(PoolLayout::small(POOL_FRAMES))?;
        let mm = MemoryManager::new(&frames);
        println!("== {name}");
        scenario(&mm)?;
        let stats = mm.cow_stats();
        println!(
            "   ok: free {}/{}, cow faults {}, copied {}, sole owner {}",
            frames.free_count(),
            frames.total_frames(),
            stats.faults,
            stats.pages_copied,
            stats.sole_owner
        );
        expect("frames leaked", frames.total_frames() as u64, frames.free_count() as u64)?;
    }
    Ok(())
}

fn sys(mm: &MemoryManager<'_>, mem: &mut UserMemory, no: Sysno, arg: u64) -> Result<u64, SimError> {
    Ok(syscall(mm, mem, no as u64, arg)?)
}

fn poke(mm: &MemoryManager<'_>, mem: &mut UserMemory, va: u64, v: u8) -> Result<(), SimError> {
    Ok(mm.write_user(mem, VirtualAddress::new(va), &[v])?)
}

fn peek(mm: &MemoryManager<'_>, mem: &mut UserMemory, va: u64) -> Result<u8, SimError> {
    let mut b = [0u8];
    mm.read_user(mem, VirtualAddress::new(va), &mut b)?;
    Ok(b[0])
}

fn expect(what: &'static str, expected: u64, got: u64) -> Result<(), SimError> {
    if expected == got {
        Ok(())
    } else {
        Err(SimError::Mismatch {
            what,
            expected,
            got,
        })
    }
}

fn cow(mm: &MemoryManager<'_>) -> Result<(), SimError> {
    let mut parent = mm.spawn(1)?;
    let mem = sys(mm, &mut parent, Sysno::Sbrk, 3 * PAGE_SIZE)?;
    for (i, b) in [b'A', b'B', b'C'].into_iter().enumerate() {
        poke(mm, &mut parent, mem + i as u64 * PAGE_SIZE, b)?;
    }

    let before = sys(mm, &mut parent, Sysno::NumFreePages, 0)?;
    let mut child = mm.fork(&mut parent)?;
    expect("free after fork", before, sys(mm, &mut child, Sysno::NumFreePages, 0)?)?;

    expect("child reads parent data", u64::from(b'A'), u64::from(peek(mm, &mut child, mem)?))?;
    poke(mm, &mut child, mem, b'X')?;
    expect("free after first write", before - 1, sys(mm, &mut child, Sysno::NumFreePages, 0)?)?;
    poke(mm, &mut child, mem + 2 * PAGE_SIZE, b'Z')?;
    expect("free after second write", before - 2, sys(mm, &mut child, Sysno::NumFreePages, 0)?)?;
    mm.exit(&mut child)?;

    poke(mm, &mut parent, mem + PAGE_SIZE, b'Y')?;
    expect("parent page 0", u64::from(b'A'), u64::from(peek(mm, &mut parent, mem)?))?;
    let page2 = peek(mm, &mut parent, mem + 2 * PAGE_SIZE)?;
    expect("parent page 2", u64::from(b'C'), u64::from(page2))?;
    expect("free after parent write", before, sys(mm, &mut parent, Sysno::NumFreePages, 0)?)?;
    info!("cow: isolation holds");
    mm.exit(&mut parent)?;
    Ok(())
}

fn mmap(mm: &MemoryManager<'_>) -> Result<(), SimError> {
    let mut mem = mm.spawn(1)?;
    let pp = sys(mm, &mut mem, Sysno::NumPhysicalPages, 0)?;

    let addr = sys(mm, &mut mem, Sysno::Mmap, 4 * PAGE_SIZE)?;
    if addr == NULL {
        return Err(MmError::OutOfMemory.into());
    }
    expect("resident after mmap", pp, sys(mm, &mut mem, Sysno::NumPhysicalPages, 0)?)?;
    for page in [0, 2] {
        poke(mm, &mut mem, addr + page * PAGE_SIZE, 0x42)?;
    }
    expect("resident after two touches", pp + 2, sys(mm, &mut mem, Sysno::NumPhysicalPages, 0)?)?;
    expect("mmap(0)", NULL, sys(mm, &mut mem, Sysno::Mmap, 0)?)?;
    expect("mmap(100)", NULL, sys(mm, &mut mem, Sysno::Mmap, 100)?)?;
    println!(
        "   vp {} pp {}",
        sys(mm, &mut mem, Sysno::NumVirtualPages, 0)?,
        sys(mm, &mut mem, Sysno::NumPhysicalPages, 0)?
    );
    mm.exit(&mut mem)?;
    Ok(())
}

fn shared(mm: &MemoryManager<'_>) -> Result<(), SimError> {
    let mut parent = mm.spawn(1)?;
    let va = sys(mm, &mut parent, Sysno::MapShared, 0)?;
    poke(mm, &mut parent, va, 1)?;

    for (round, value) in [10u8, 20].into_iter().enumerate() {
        let mut child = mm.fork(&mut parent)?;
        let at = sys(mm, &mut child, Sysno::GetShared, 0)?;
        expect("child shared address", va, at)?;
        let seen = peek(mm, &mut child, at)?;
        println!("   child {round} sees {seen}, writes {value}");
        poke(mm, &mut child, at, value)?;

        let mut grandchild = mm.fork(&mut child)?;
        expect("grandchild shared address", NULL, sys(mm, &mut grandchild, Sysno::GetShared, 0)?)?;
        mm.exit(&mut grandchild)?;
        mm.exit(&mut child)?;
    }

    expect("parent sees last write", 20, u64::from(peek(mm, &mut parent, va)?))?;
    expect("unmap", 0, sys(mm, &mut parent, Sysno::UnmapShared, 0)?)?;
    expect("second unmap", FAILED, sys(mm, &mut parent, Sysno::UnmapShared, 0)?)?;
    mm.exit(&mut parent)?;
    Ok(())
}

fn sizes(mm: &MemoryManager<'_>) -> Result<(), SimError> {
    let mut mem = mm.spawn(2)?;
    for grow in [1, 4, 16] {
        sys(mm, &mut mem, Sysno::Sbrk, grow * PAGE_SIZE)?;
        let vp = sys(mm, &mut mem, Sysno::NumVirtualPages, 0)?;
        let pp = sys(mm, &mut mem, Sysno::NumPhysicalPages, 0)?;
        let pt = sys(mm, &mut mem, Sysno::PageTableSize, 0)?;
        println!("   sbrk +{grow}: vp {vp} pp {pp} ptsize {pt}");
        expect("vp == pp", vp, pp)?;
    }
    mm.exit(&mut mem)?;
    Ok(())
}

fn stress(mm: &MemoryManager<'_>) -> Result<(), SimError> {
    const CHILDREN: u8 = 8;
    const PAGES: u64 = 8;

    let mut parent = mm.spawn(PAGES)?;
    for p in 0..PAGES {
        poke(mm, &mut parent, p * PAGE_SIZE, 0xAA)?;
    }
    let mut children = (0..CHILDREN)
        .map(|_| mm.fork(&mut parent))
        .collect::<Result<Vec<_>, _>>()?;

    thread::scope(|s| {
        let workers: Vec<_> = children
            .iter_mut()
            .zip(1..)
            .map(|(child, tag)| {
                s.spawn(move || -> Result<(), SimError> {
                    for p in 0..PAGES {
                        poke(mm, child, p * PAGE_SIZE + 1, tag)?;
                    }
                    for p in 0..PAGES {
                        let own = peek(mm, child, p * PAGE_SIZE + 1)?;
                        expect("own write", u64::from(tag), u64::from(own))?;
                        let inherited = peek(mm, child, p * PAGE_SIZE)?;
                        expect("inherited byte", 0xAA, u64::from(inherited))?;
                    }
                    Ok(())
                })
            })
            .collect();
        workers
            .into_iter()
            .map(|w| w.join().unwrap_or(Err(SimError::WorkerPanicked)))
            .collect::<Result<(), _>>()
    })?;

    for mut child in children {
        mm.exit(&mut child)?;
    }
    expect("parent untouched", 0, u64::from(peek(mm, &mut parent, 1)?))?;
    mm.exit(&mut parent)?;
    Ok(())
}
