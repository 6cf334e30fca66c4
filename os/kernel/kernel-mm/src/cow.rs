//! # Copy-on-Write Fork
//!
//! Fork duplicates the *mappings* of a process, not its memory. Every private
//! page ends up read-only and marked copy-on-write in both parent and child,
//! with one extra reference on the frame. The first write through either
//! mapping faults and is resolved here:
//!
//! ```text
//! refcount > 1:  allocate ─► copy ─► remap writable ─► release old
//! refcount = 1:  re-enable writes in place (no other mapping is left)
//! ```
//!
//! Fork itself never draws from the frame pool: page tables are not pool
//! frames and data frames are shared.

use crate::memory::{SharedSlot, UserMemory};
use crate::{FaultOutcome, MemoryManager, MmError};
use alloc::vec::Vec;
use kernel_alloc::PhysMapper;
use kernel_memory_addresses::VirtualAddress;
use kernel_vmem::PageEntryBits;
use log::{debug, trace, warn};

impl<M: PhysMapper> MemoryManager<'_, M> {
    /// Create a child sharing every page of `parent` copy-on-write.
    ///
    /// Reservations are inherited as reservations. The shared page follows
    /// the family rule: a creator's children are granted it, nobody else is.
    ///
    /// # Errors
    /// Only fatal errors; fork allocates no frames. On error the child is
    /// torn down again and its references are dropped.
    pub fn fork(&self, parent: &mut UserMemory) -> Result<UserMemory, MmError> {
        let mut child = UserMemory::new(self.next_pid());
        child.size = parent.size;
        child.reserved = parent.reserved.clone();

        if let Err(e) = self.share_pages(parent, &mut child) {
            self.teardown(&mut child)?;
            return Err(e);
        }

        debug!(
            "fork {} -> {}: {} pages shared, shm {}",
            parent.pid,
            child.pid,
            child.space.mapped_pages(),
            if child.shared.is_some() { "granted" } else { "none" }
        );
        Ok(child)
    }

    fn share_pages(&self, parent: &mut UserMemory, child: &mut UserMemory) -> Result<(), MmError> {
        let private: Vec<_> = parent
            .space
            .mappings()
            .filter(|(_, e)| !e.shared())
            .collect();

        let cow = PageEntryBits::user_cow();
        for (page, e) in private {
            let va = page.base();
            let frame = self.frame_of(e)?;
            self.frames.retain(frame)?;
            if let Err(err) = child.space.map(va, e.physical_page(), cow) {
                self.frames.release(frame)?;
                return Err(err.into());
            }
            if e.writable() {
                parent.space.set_flags(va, cow)?;
            }
        }

        if let Some(slot) = parent.shared.filter(SharedSlot::is_creator) {
            self.frames.retain(slot.frame)?;
            let shared = PageEntryBits::user_shared();
            if let Err(err) = child.space.map(slot.va(), slot.frame.page(), shared) {
                self.frames.release(slot.frame)?;
                return Err(err.into());
            }
            child.shared = Some(SharedSlot {
                frame: slot.frame,
                generation: slot.generation + 1,
            });
        }
        Ok(())
    }

    /// Resolve a write fault on a copy-on-write page.
    pub(crate) fn cow_fault(
        &self,
        mem: &mut UserMemory,
        va: VirtualAddress,
        entry: PageEntryBits,
    ) -> Result<FaultOutcome, MmError> {
        self.cow.record_fault();
        let old = self.frame_of(entry)?;

        if self.frames.ref_count(old) == 1 {
            mem.space.set_flags(va, PageEntryBits::user_rw())?;
            self.cow.record_sole_owner();
            trace!("{}: cow {} sole owner of {old}", mem.pid, va.page());
            return Ok(FaultOutcome::UpgradedInPlace);
        }

        let new = self.frames.allocate().inspect_err(|_| {
            warn!("{}: no frame to copy {} into", mem.pid, va.page());
        })?;
        self.frames.copy_frame(old, new);
        mem.space.remap(va, new.page(), PageEntryBits::user_rw())?;
        self.frames.release(old)?;
        self.cow.record_copy();
        trace!("{}: cow {} copied {old} -> {new}", mem.pid, va.page());
        Ok(FaultOutcome::CopiedOnWrite)
    }
}
