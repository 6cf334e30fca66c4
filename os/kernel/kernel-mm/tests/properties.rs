use kernel_alloc::{FrameAllocator, Released};
use kernel_info::memory::{PoolLayout, SHARED_PAGE_VA};
use kernel_memory_addresses::{PAGE_SIZE, VirtualAddress};
use kernel_mm::syscall::{self, NULL, Sysno};
use kernel_mm::{CowStats, MemoryManager, MmError, PageState, UserMemory};
use proptest::prelude::*;
use std::collections::HashSet;

const PAGE: i64 = PAGE_SIZE as i64;

fn pool(frames: u64) -> FrameAllocator {
    FrameAllocator::boot(PoolLayout::small(frames)).unwrap()
}

fn page(n: u64) -> VirtualAddress {
    VirtualAddress::new(n * PAGE_SIZE)
}

fn read_byte(mm: &MemoryManager<'_>, mem: &mut UserMemory, va: VirtualAddress) -> u8 {
    let mut b = [0u8];
    mm.read_user(mem, va, &mut b).unwrap();
    b[0]
}

#[derive(Debug, Clone)]
enum Op {
    Spawn,
    Grow(usize, u8),
    Shrink(usize),
    MapDemand(usize, u8),
    Touch(usize, u16),
    Fork(usize),
    Exit(usize),
}

fn op() -> impl Strategy<Value = Op> {
    prop_oneof![
        1 => Just(Op::Spawn),
        2 => (any::<usize>(), 1..4u8).prop_map(|(p, n)| Op::Grow(p, n)),
        1 => any::<usize>().prop_map(Op::Shrink),
        2 => (any::<usize>(), 1..4u8).prop_map(|(p, n)| Op::MapDemand(p, n)),
        4 => (any::<usize>(), any::<u16>()).prop_map(|(p, o)| Op::Touch(p, o)),
        2 => any::<usize>().prop_map(Op::Fork),
        1 => any::<usize>().prop_map(Op::Exit),
    ]
}

proptest! {
    #![proptest_config(ProptestConfig::with_cases(64))]

    /// Property 1 across whole processes: every frame is either free or
    /// mapped by at least one live address space.
    #[test]
    fn frames_are_free_or_mapped(ops in proptest::collection::vec(op(), 1..60)) {
        let frames = pool(48);
        let mm = MemoryManager::new(&frames);
        let mut procs = vec![mm.spawn(1).unwrap()];

        for op in ops {
            let pick = |i: usize, n: usize| i % n.max(1);
            match op {
                Op::Spawn => {
                    if let Ok(p) = mm.spawn(1) {
                        procs.push(p);
                    }
                }
                Op::Grow(i, n) if !procs.is_empty() => {
                    let p = pick(i, procs.len());
                    let _ = mm.grow(&mut procs[p], i64::from(n) * PAGE);
                }
                Op::Shrink(i) if !procs.is_empty() => {
                    let p = pick(i, procs.len());
                    let _ = mm.grow(&mut procs[p], -PAGE);
                }
                Op::MapDemand(i, n) if !procs.is_empty() => {
                    let p = pick(i, procs.len());
                    let _ = mm.map_demand(&mut procs[p], i64::from(n) * PAGE);
                }
                Op::Touch(i, off) if !procs.is_empty() => {
                    let p = pick(i, procs.len());
                    let size = procs[p].size();
                    if size > 0 {
                        let va = VirtualAddress::new(u64::from(off) * 97 % size);
                        match mm.write_user(&mut procs[p], va, &[0x5A]) {
                            Ok(()) | Err(MmError::OutOfMemory | MmError::BadAddress(_)) => {}
                            Err(e) => prop_assert!(false, "unexpected {e}"),
                        }
                    }
                }
                Op::Fork(i) if !procs.is_empty() => {
                    let p = pick(i, procs.len());
                    let child = mm.fork(&mut procs[p]).unwrap();
                    procs.push(child);
                }
                Op::Exit(i) if !procs.is_empty() => {
                    let p = pick(i, procs.len());
                    let mut gone = procs.swap_remove(p);
                    mm.exit(&mut gone).unwrap();
                }
                _ => {}
            }

            let mapped: HashSet<_> = procs
                .iter()
                .flat_map(|p| p.space().mappings().map(|(_, e)| e.physical_page()))
                .collect();
            prop_assert_eq!(frames.allocated_count(), mapped.len());
            prop_assert_eq!(frames.free_count() + frames.allocated_count(), frames.total_frames());
        }

        for mut p in procs {
            mm.exit(&mut p).unwrap();
        }
        prop_assert_eq!(frames.free_count(), frames.total_frames());
    }
}

#[test]
fn fork_consumes_no_frames() {
    let frames = pool(32);
    let mm = MemoryManager::new(&frames);
    let mut parent = mm.spawn(2).unwrap();
    mm.grow(&mut parent, 3 * PAGE).unwrap();
    assert_eq!(parent.resident_pages(), 5);

    let before = mm.free_frames();
    let child = mm.fork(&mut parent).unwrap();
    assert_eq!(mm.free_frames(), before);
    assert_eq!(child.resident_pages(), 5);
    for n in 0..5 {
        assert_eq!(parent.page_state(page(n)), PageState::SharedReadOnly);
        assert_eq!(child.page_state(page(n)), PageState::SharedReadOnly);
    }
}

#[test]
fn reading_cow_page_consumes_no_frames() {
    let frames = pool(16);
    let mm = MemoryManager::new(&frames);
    let mut parent = mm.spawn(1).unwrap();
    mm.write_user(&mut parent, page(0), b"A").unwrap();
    let mut child = mm.fork(&mut parent).unwrap();

    let before = mm.free_frames();
    assert_eq!(read_byte(&mm, &mut child, page(0)), b'A');
    assert_eq!(mm.free_frames(), before);
    assert_eq!(mm.cow_stats(), CowStats::default());
}

#[test]
fn first_write_to_cow_page_takes_one_frame() {
    let frames = pool(16);
    let mm = MemoryManager::new(&frames);
    let mut parent = mm.spawn(2).unwrap();
    mm.write_user(&mut parent, page(0), b"A").unwrap();
    mm.write_user(&mut parent, page(1), b"B").unwrap();
    let mut child = mm.fork(&mut parent).unwrap();

    let before = mm.free_frames();
    mm.write_user(&mut child, page(0), b"X").unwrap();
    assert_eq!(mm.free_frames(), before - 1);
    mm.write_user(&mut child, page(0) + 1, b"Y").unwrap();
    assert_eq!(mm.free_frames(), before - 1);

    assert_eq!(read_byte(&mm, &mut parent, page(0)), b'A');
    assert_eq!(read_byte(&mm, &mut child, page(0)), b'X');
    assert_eq!(child.page_state(page(0)), PageState::PrivateWritable);
    assert_eq!(child.page_state(page(1)), PageState::SharedReadOnly);
    assert_eq!(
        mm.cow_stats(),
        CowStats {
            faults: 1,
            pages_copied: 1,
            sole_owner: 0
        }
    );
}

#[test]
fn map_demand_adds_virtual_not_resident_pages() {
    let frames = pool(16);
    let mm = MemoryManager::new(&frames);
    let mut mem = mm.spawn(1).unwrap();

    let (vp, rp, free) = (mem.virtual_pages(), mem.resident_pages(), mm.free_frames());
    let base = mm.map_demand(&mut mem, 3 * PAGE).unwrap();
    assert_eq!(base, page(1));
    assert_eq!(mem.virtual_pages(), vp + 3);
    assert_eq!(mem.resident_pages(), rp);
    assert_eq!(mm.free_frames(), free);
    assert_eq!(mem.page_state(base), PageState::ReservedUncommitted);
}

#[test]
fn touching_k_of_n_reserved_pages_commits_k() {
    let frames = pool(16);
    let mm = MemoryManager::new(&frames);
    let mut mem = mm.spawn(1).unwrap();
    let base = mm.map_demand(&mut mem, 3 * PAGE).unwrap();
    let rp = mem.resident_pages();

    mm.write_user(&mut mem, base, b"X").unwrap();
    mm.write_user(&mut mem, base + 2 * PAGE_SIZE, b"Y").unwrap();
    assert_eq!(mem.resident_pages(), rp + 2);
    assert_eq!(mem.page_state(base + PAGE_SIZE), PageState::ReservedUncommitted);
    assert_eq!(mem.page_state(base), PageState::PrivateWritable);

    // A second touch of a committed page takes nothing.
    mm.write_user(&mut mem, base + 100, b"Z").unwrap();
    assert_eq!(mem.resident_pages(), rp + 2);
}

#[test]
fn map_demand_rejects_non_positive_lengths() {
    let frames = pool(8);
    let mm = MemoryManager::new(&frames);
    let mut mem = mm.spawn(1).unwrap();
    let (size, vp) = (mem.size(), mem.virtual_pages());

    assert_eq!(mm.map_demand(&mut mem, 0), Err(MmError::InvalidLength(0)));
    assert_eq!(mm.map_demand(&mut mem, -1), Err(MmError::InvalidLength(-1)));
    assert_eq!(syscall::syscall(&mm, &mut mem, Sysno::Mmap as u64, 0), Ok(NULL));
    assert_eq!(
        syscall::syscall(&mm, &mut mem, Sysno::Mmap as u64, u64::MAX),
        Ok(NULL)
    );
    assert_eq!(mem.size(), size);
    assert_eq!(mem.virtual_pages(), vp);
    assert!(mem.reservations().is_empty());
}

#[test]
fn shared_page_is_coherent_across_fork() {
    let frames = pool(16);
    let mm = MemoryManager::new(&frames);
    let mut parent = mm.spawn(1).unwrap();
    let shm = mm.create_shared(&mut parent).unwrap();
    assert_eq!(shm.as_u64(), SHARED_PAGE_VA);
    mm.write_user(&mut parent, shm, &[42]).unwrap();

    let mut child = mm.fork(&mut parent).unwrap();
    let child_shm = child.lookup_shared().unwrap();
    assert_eq!(child_shm, shm);
    assert_eq!(child.page_state(child_shm), PageState::SharedWritable);
    assert_eq!(read_byte(&mm, &mut child, child_shm), 42);

    let free = mm.free_frames();
    mm.write_user(&mut child, child_shm, &[43]).unwrap();
    assert_eq!(mm.free_frames(), free, "shared page must never be copied");
    assert_eq!(read_byte(&mm, &mut parent, shm), 43);

    mm.write_user(&mut parent, shm, &[54]).unwrap();
    assert_eq!(read_byte(&mm, &mut child, child_shm), 54);
}

#[test]
fn grandchild_gets_no_shared_page() {
    let frames = pool(16);
    let mm = MemoryManager::new(&frames);
    let mut parent = mm.spawn(1).unwrap();
    mm.create_shared(&mut parent).unwrap();
    let mut child = mm.fork(&mut parent).unwrap();
    let mut grandchild = mm.fork(&mut child).unwrap();

    assert!(child.lookup_shared().is_some());
    assert_eq!(grandchild.lookup_shared(), None);
    assert_eq!(
        syscall::syscall(&mm, &mut grandchild, Sysno::GetShared as u64, 0),
        Ok(NULL)
    );
    assert_eq!(
        mm.read_user(&mut grandchild, VirtualAddress::new(SHARED_PAGE_VA), &mut [0u8]),
        Err(MmError::BadAddress(VirtualAddress::new(SHARED_PAGE_VA)))
    );
}

#[test]
fn last_shared_release_frees_the_frame() {
    let frames = pool(16);
    let mm = MemoryManager::new(&frames);
    let mut parent = mm.spawn(1).unwrap();
    mm.create_shared(&mut parent).unwrap();
    let mut child = mm.fork(&mut parent).unwrap();

    let free = mm.free_frames();
    assert_eq!(mm.release_shared(&mut child), Ok(Released::StillShared(1)));
    assert_eq!(mm.free_frames(), free);
    assert_eq!(child.lookup_shared(), None);

    assert_eq!(mm.release_shared(&mut parent), Ok(Released::Freed));
    assert_eq!(mm.free_frames(), free + 1);
    assert_eq!(mm.release_shared(&mut parent), Err(MmError::NoSharedMapping));
}
