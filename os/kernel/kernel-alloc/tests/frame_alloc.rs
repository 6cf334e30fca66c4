use kernel_alloc::{FrameAllocError, FrameAllocator, FrameIndex, Released};
use kernel_info::memory::PoolLayout;
use proptest::prelude::*;
use std::collections::HashSet;
use std::sync::{Arc, Barrier};
use std::thread;

fn pool(frames: u64) -> FrameAllocator {
    FrameAllocator::boot(PoolLayout::small(frames)).unwrap()
}

#[derive(Debug, Clone, Copy)]
enum Op {
    Allocate,
    Retain(usize),
    Release(usize),
}

fn op() -> impl Strategy<Value = Op> {
    prop_oneof![
        3 => Just(Op::Allocate),
        1 => any::<usize>().prop_map(Op::Retain),
        3 => any::<usize>().prop_map(Op::Release),
    ]
}

proptest! {
    #[test]
    fn free_plus_allocated_is_total(ops in proptest::collection::vec(op(), 0..200)) {
        let alloc = pool(16);
        // One entry per outstanding reference.
        let mut held: Vec<FrameIndex> = Vec::new();

        for op in ops {
            match op {
                Op::Allocate => match alloc.allocate() {
                    Ok(f) => held.push(f),
                    Err(FrameAllocError::Exhausted) => prop_assert_eq!(alloc.free_count(), 0),
                },
                Op::Retain(i) if !held.is_empty() => {
                    let f = held[i % held.len()];
                    alloc.retain(f).unwrap();
                    held.push(f);
                }
                Op::Release(i) if !held.is_empty() => {
                    let f = held.swap_remove(i % held.len());
                    let still_held = held.iter().filter(|&&h| h == f).count();
                    match alloc.release(f).unwrap() {
                        Released::Freed => prop_assert_eq!(still_held, 0),
                        Released::StillShared(n) => prop_assert_eq!(n as usize, still_held),
                    }
                }
                _ => {}
            }

            let distinct: HashSet<_> = held.iter().copied().collect();
            prop_assert_eq!(alloc.allocated_count(), distinct.len());
            prop_assert_eq!(alloc.free_count() + alloc.allocated_count(), alloc.total_frames());
        }
    }
}

#[test]
fn concurrent_allocations_are_distinct() {
    const THREADS: usize = 8;
    const PER_THREAD: usize = 32;

    let alloc = Arc::new(pool((THREADS * PER_THREAD) as u64));
    let barrier = Arc::new(Barrier::new(THREADS));

    let handles: Vec<_> = (0..THREADS)
        .map(|_| {
            let alloc = Arc::clone(&alloc);
            let barrier = Arc::clone(&barrier);
            thread::spawn(move || {
                barrier.wait();
                (0..PER_THREAD)
                    .map(|_| alloc.allocate().unwrap())
                    .collect::<Vec<_>>()
            })
        })
        .collect();

    let mut seen = HashSet::new();
    for h in handles {
        for f in h.join().unwrap() {
            assert!(seen.insert(f), "frame {f:?} handed out twice");
        }
    }
    assert_eq!(alloc.free_count(), 0);
    assert_eq!(alloc.allocate(), Err(FrameAllocError::Exhausted));
}

#[test]
fn concurrent_release_sees_zero_crossing_once() {
    const THREADS: u32 = 8;

    for _ in 0..50 {
        let alloc = Arc::new(pool(4));
        let frame = alloc.allocate().unwrap();
        for _ in 1..THREADS {
            alloc.retain(frame).unwrap();
        }
        let barrier = Arc::new(Barrier::new(THREADS as usize));

        let handles: Vec<_> = (0..THREADS)
            .map(|_| {
                let alloc = Arc::clone(&alloc);
                let barrier = Arc::clone(&barrier);
                thread::spawn(move || {
                    barrier.wait();
                    alloc.release(frame).unwrap()
                })
            })
            .collect();

        let freed = handles
            .into_iter()
            .map(|h| h.join().unwrap())
            .filter(|r| r.is_freed())
            .count();
        assert_eq!(freed, 1);
        assert_eq!(alloc.free_count(), 4);
        assert_eq!(alloc.ref_count(frame), 0);
    }
}

#[test]
fn mixed_churn_conserves_frames() {
    const THREADS: usize = 4;
    let alloc = Arc::new(pool(64));

    let handles: Vec<_> = (0..THREADS)
        .map(|_| {
            let alloc = Arc::clone(&alloc);
            thread::spawn(move || {
                for _ in 0..500 {
                    if let Ok(f) = alloc.allocate() {
                        alloc.retain(f).unwrap();
                        alloc.write_frame(f, 0, &[0xAB]);
                        assert_eq!(alloc.release(f), Ok(Released::StillShared(1)));
                        assert_eq!(alloc.release(f), Ok(Released::Freed));
                    }
                }
            })
        })
        .collect();

    for h in handles {
        h.join().unwrap();
    }
    assert_eq!(alloc.free_count(), 64);
    assert_eq!(alloc.allocated_count(), 0);
}
