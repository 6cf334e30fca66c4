//! Copy-on-write fault counters.

use core::sync::atomic::{AtomicU64, Ordering};

/// Live counters, one set per [`MemoryManager`](crate::MemoryManager).
#[derive(Debug, Default)]
pub(crate) struct CowCounters {
    faults: AtomicU64,
    pages_copied: AtomicU64,
    sole_owner: AtomicU64,
}

impl CowCounters {
    pub(crate) const fn new() -> Self {
        Self {
            faults: AtomicU64::new(0),
            pages_copied: AtomicU64::new(0),
            sole_owner: AtomicU64::new(0),
        }
    }

    pub(crate) fn record_fault(&self) {
        self.faults.fetch_add(1, Ordering::Relaxed);
    }

    pub(crate) fn record_copy(&self) {
        self.pages_copied.fetch_add(1, Ordering::Relaxed);
    }

    pub(crate) fn record_sole_owner(&self) {
        self.sole_owner.fetch_add(1, Ordering::Relaxed);
    }

    pub(crate) fn snapshot(&self) -> CowStats {
        CowStats {
            faults: self.faults.load(Ordering::Relaxed),
            pages_copied: self.pages_copied.load(Ordering::Relaxed),
            sole_owner: self.sole_owner.load(Ordering::Relaxed),
        }
    }
}

/// Copy-on-write statistics snapshot.
///
/// `faults == pages_copied + sole_owner` once all faults have completed.
#[derive(Debug, Default, Copy, Clone, Eq, PartialEq)]
pub struct CowStats {
    /// Write faults taken on copy-on-write pages.
    pub faults: u64,
    /// Faults resolved by copying into a fresh frame.
    pub pages_copied: u64,
    /// Faults resolved by re-enabling writes because no other mapping was left.
    pub sole_owner: u64,
}
