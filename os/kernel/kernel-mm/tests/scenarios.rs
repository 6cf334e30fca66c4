//! End-to-end runs of the classic user-level memory tests.

use kernel_alloc::FrameAllocator;
use kernel_info::memory::PoolLayout;
use kernel_memory_addresses::{PAGE_SIZE, VirtualAddress};
use kernel_mm::syscall::{FAILED, NULL, Sysno, syscall};
use kernel_mm::{CowStats, MemoryManager, UserMemory};
use std::sync::Barrier;
use std::thread;

const PAGE: u64 = PAGE_SIZE;

fn pool(frames: u64) -> FrameAllocator {
    FrameAllocator::boot(PoolLayout::small(frames)).unwrap()
}

fn peek(mm: &MemoryManager<'_>, mem: &mut UserMemory, va: u64) -> u8 {
    let mut b = [0u8];
    mm.read_user(mem, VirtualAddress::new(va), &mut b).unwrap();
    b[0]
}

fn poke(mm: &MemoryManager<'_>, mem: &mut UserMemory, va: u64, v: u8) {
    mm.write_user(mem, VirtualAddress::new(va), &[v]).unwrap();
}

fn sys(mm: &MemoryManager<'_>, mem: &mut UserMemory, no: Sysno, arg: u64) -> u64 {
    syscall(mm, mem, no as u64, arg).unwrap()
}

#[test]
fn introspection_after_sbrk() {
    let frames = pool(32);
    let mm = MemoryManager::new(&frames);
    let mut mem = mm.spawn(2).unwrap();

    assert_eq!(sys(&mm, &mut mem, Sysno::Sbrk, PAGE), 2 * PAGE);
    assert_eq!(sys(&mm, &mut mem, Sysno::Sbrk, 2 * PAGE), 3 * PAGE);
    let vp = sys(&mm, &mut mem, Sysno::NumVirtualPages, 0);
    let pp = sys(&mm, &mut mem, Sysno::NumPhysicalPages, 0);
    assert_eq!(vp, 5);
    assert_eq!(vp, pp, "a lone process without demand paging is fully resident");
    assert!(sys(&mm, &mut mem, Sysno::PageTableSize, 0) >= 1);
}

#[test]
fn copy_on_write_fork() {
    let frames = pool(32);
    let mm = MemoryManager::new(&frames);
    let mut parent = mm.spawn(1).unwrap();

    let mem = sys(&mm, &mut parent, Sysno::Sbrk, 3 * PAGE);
    assert_ne!(mem, FAILED);
    poke(&mm, &mut parent, mem, b'A');
    poke(&mm, &mut parent, mem + PAGE, b'B');
    poke(&mm, &mut parent, mem + 2 * PAGE, b'C');
    let free_before_fork = sys(&mm, &mut parent, Sysno::NumFreePages, 0);

    let mut child = mm.fork(&mut parent).unwrap();
    let free_after_fork = sys(&mm, &mut child, Sysno::NumFreePages, 0);
    assert_eq!(free_after_fork, free_before_fork);

    assert_eq!(peek(&mm, &mut child, mem), b'A');
    assert_eq!(sys(&mm, &mut child, Sysno::NumFreePages, 0), free_after_fork);

    poke(&mm, &mut child, mem, b'X');
    assert_eq!(sys(&mm, &mut child, Sysno::NumFreePages, 0), free_after_fork - 1);
    poke(&mm, &mut child, mem + 2 * PAGE, b'Z');
    assert_eq!(sys(&mm, &mut child, Sysno::NumFreePages, 0), free_after_fork - 2);

    assert_eq!(mm.exit(&mut child).unwrap(), 2);

    // The child is gone, so the parent is the sole owner of the middle page.
    poke(&mm, &mut parent, mem + PAGE, b'Y');
    assert_eq!(sys(&mm, &mut parent, Sysno::NumFreePages, 0), free_before_fork);

    assert_eq!(peek(&mm, &mut parent, mem), b'A');
    assert_eq!(peek(&mm, &mut parent, mem + PAGE), b'Y');
    assert_eq!(peek(&mm, &mut parent, mem + 2 * PAGE), b'C');
    assert_eq!(
        mm.cow_stats(),
        CowStats {
            faults: 3,
            pages_copied: 2,
            sole_owner: 1
        }
    );
}

#[test]
fn demand_paged_mmap() {
    let frames = pool(32);
    let mm = MemoryManager::new(&frames);
    let mut mem = mm.spawn(1).unwrap();
    let initial_vp = sys(&mm, &mut mem, Sysno::NumVirtualPages, 0);
    let initial_pp = sys(&mm, &mut mem, Sysno::NumPhysicalPages, 0);

    let addr1 = sys(&mm, &mut mem, Sysno::Mmap, PAGE);
    assert_ne!(addr1, NULL);
    assert!(sys(&mm, &mut mem, Sysno::NumVirtualPages, 0) > initial_vp);
    assert_eq!(sys(&mm, &mut mem, Sysno::NumPhysicalPages, 0), initial_pp);

    poke(&mm, &mut mem, addr1, b'A');
    poke(&mm, &mut mem, addr1 + PAGE - 1, b'Z');
    assert_eq!(sys(&mm, &mut mem, Sysno::NumPhysicalPages, 0), initial_pp + 1);
    assert_eq!(peek(&mm, &mut mem, addr1), b'A');
    assert_eq!(peek(&mm, &mut mem, addr1 + PAGE - 1), b'Z');
    assert_eq!(peek(&mm, &mut mem, addr1 + 1), 0, "demand pages start zeroed");

    let vp_before = sys(&mm, &mut mem, Sysno::NumVirtualPages, 0);
    let pp_before = sys(&mm, &mut mem, Sysno::NumPhysicalPages, 0);
    let addr2 = sys(&mm, &mut mem, Sysno::Mmap, 3 * PAGE);
    assert_eq!(addr2, addr1 + PAGE);
    assert_eq!(sys(&mm, &mut mem, Sysno::NumVirtualPages, 0), vp_before + 3);
    assert_eq!(sys(&mm, &mut mem, Sysno::NumPhysicalPages, 0), pp_before);

    poke(&mm, &mut mem, addr2, b'X');
    poke(&mm, &mut mem, addr2 + 2 * PAGE, b'Y');
    assert_eq!(sys(&mm, &mut mem, Sysno::NumPhysicalPages, 0), pp_before + 2);

    assert_eq!(sys(&mm, &mut mem, Sysno::Mmap, 0), NULL);
    assert_eq!(sys(&mm, &mut mem, Sysno::Mmap, u64::MAX), NULL);
}

#[test]
fn shared_page_parent_and_child() {
    let frames = pool(16);
    let mm = MemoryManager::new(&frames);
    let mut parent = mm.spawn(1).unwrap();

    let shared = sys(&mm, &mut parent, Sysno::MapShared, 0);
    assert_ne!(shared, NULL);
    poke(&mm, &mut parent, shared, 42);

    let mut child = mm.fork(&mut parent).unwrap();
    let child_shared = sys(&mm, &mut child, Sysno::GetShared, 0);
    assert_eq!(child_shared, shared);
    assert_eq!(peek(&mm, &mut child, child_shared), 42);
    poke(&mm, &mut child, child_shared, 43);
    assert_eq!(peek(&mm, &mut child, child_shared), 43);

    assert_eq!(peek(&mm, &mut parent, shared), 43);
    poke(&mm, &mut parent, shared, 54);
    assert_eq!(peek(&mm, &mut child, child_shared), 54);

    mm.exit(&mut child).unwrap();
    assert_eq!(peek(&mm, &mut parent, shared), 54, "page outlives the child");
    assert_eq!(sys(&mm, &mut parent, Sysno::UnmapShared, 0), 0);
    assert_eq!(sys(&mm, &mut parent, Sysno::UnmapShared, 0), FAILED);
}

#[test]
fn shared_page_between_siblings() {
    let frames = pool(16);
    let mm = MemoryManager::new(&frames);
    let mut parent = mm.spawn(1).unwrap();
    let shared = sys(&mm, &mut parent, Sysno::MapShared, 0);
    poke(&mm, &mut parent, shared, 1);

    let mut first = mm.fork(&mut parent).unwrap();
    let s = sys(&mm, &mut first, Sysno::GetShared, 0);
    assert_eq!(peek(&mm, &mut first, s), 1);
    poke(&mm, &mut first, s, 10);
    mm.exit(&mut first).unwrap();

    let mut second = mm.fork(&mut parent).unwrap();
    let s = sys(&mm, &mut second, Sysno::GetShared, 0);
    assert_eq!(peek(&mm, &mut second, s), 10);
    poke(&mm, &mut second, s, 20);
    mm.exit(&mut second).unwrap();

    assert_eq!(peek(&mm, &mut parent, shared), 20);
    let free = sys(&mm, &mut parent, Sysno::NumFreePages, 0);
    assert_eq!(sys(&mm, &mut parent, Sysno::UnmapShared, 0), 0);
    assert_eq!(sys(&mm, &mut parent, Sysno::NumFreePages, 0), free + 1);
}

#[test]
fn shared_page_not_inherited_by_grandchild() {
    let frames = pool(16);
    let mm = MemoryManager::new(&frames);
    let mut parent = mm.spawn(1).unwrap();
    assert_ne!(sys(&mm, &mut parent, Sysno::MapShared, 0), NULL);

    let mut child = mm.fork(&mut parent).unwrap();
    assert_ne!(sys(&mm, &mut child, Sysno::GetShared, 0), NULL);

    let mut grandchild = mm.fork(&mut child).unwrap();
    assert_eq!(sys(&mm, &mut grandchild, Sysno::GetShared, 0), NULL);
    assert_eq!(grandchild.virtual_pages(), 1);

    mm.exit(&mut grandchild).unwrap();
    mm.exit(&mut child).unwrap();
    assert_eq!(sys(&mm, &mut parent, Sysno::UnmapShared, 0), 0);
    mm.exit(&mut parent).unwrap();
    assert_eq!(frames.free_count(), frames.total_frames());
}

#[test]
fn parent_and_child_write_concurrently() {
    const PAGES: u64 = 16;

    let frames = pool(64);
    let mm = MemoryManager::new(&frames);
    let mut parent = mm.spawn(PAGES).unwrap();
    for p in 0..PAGES {
        poke(&mm, &mut parent, p * PAGE, 0xEE);
    }
    let mut child = mm.fork(&mut parent).unwrap();
    let barrier = Barrier::new(2);

    thread::scope(|s| {
        for (mem, value) in [(&mut parent, 0x11u8), (&mut child, 0x22u8)] {
            let mm = &mm;
            let barrier = &barrier;
            s.spawn(move || {
                barrier.wait();
                for p in 0..PAGES {
                    poke(mm, mem, p * PAGE + 7, value);
                }
            });
        }
    });

    for p in 0..PAGES {
        assert_eq!(peek(&mm, &mut parent, p * PAGE + 7), 0x11);
        assert_eq!(peek(&mm, &mut child, p * PAGE + 7), 0x22);
        assert_eq!(peek(&mm, &mut parent, p * PAGE), 0xEE);
        assert_eq!(peek(&mm, &mut child, p * PAGE), 0xEE);
    }

    let stats = mm.cow_stats();
    assert_eq!(stats.faults, 2 * PAGES);
    assert_eq!(stats.pages_copied + stats.sole_owner, 2 * PAGES);

    mm.exit(&mut parent).unwrap();
    mm.exit(&mut child).unwrap();
    assert_eq!(frames.free_count(), frames.total_frames());
}
