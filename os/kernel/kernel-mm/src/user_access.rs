//! Byte access to user memory the way the MMU performs it.
//!
//! Each page touched is translated; if the entry is missing or lacks write
//! permission the fault is dispatched exactly as a hardware trap would be,
//! and the access is retried once.

use crate::fault::{Fault, FaultKind};
use crate::memory::UserMemory;
use crate::{MemoryManager, MmError};
use kernel_alloc::{FRAME_BYTES, PhysMapper};
use kernel_memory_addresses::VirtualAddress;
use kernel_vmem::PageEntryBits;

impl<M: PhysMapper> MemoryManager<'_, M> {
    /// Copy `buf.len()` bytes out of user memory starting at `va`.
    ///
    /// # Errors
    /// Any unresolvable fault; bytes before the faulting page have already
    /// been copied.
    pub fn read_user(
        &self,
        mem: &mut UserMemory,
        va: VirtualAddress,
        buf: &mut [u8],
    ) -> Result<(), MmError> {
        let mut done = 0;
        while done < buf.len() {
            let at = va + done as u64;
            let (offset, len) = chunk(at, buf.len() - done);
            let e = self.access(mem, at, FaultKind::Read)?;
            self.frames
                .read_frame(self.frame_of(e)?, offset, &mut buf[done..done + len]);
            done += len;
        }
        Ok(())
    }

    /// Copy `data` into user memory starting at `va`.
    ///
    /// # Errors
    /// Any unresolvable fault; bytes before the faulting page have already
    /// been written.
    pub fn write_user(
        &self,
        mem: &mut UserMemory,
        va: VirtualAddress,
        data: &[u8],
    ) -> Result<(), MmError> {
        let mut done = 0;
        while done < data.len() {
            let at = va + done as u64;
            let (offset, len) = chunk(at, data.len() - done);
            let e = self.access(mem, at, FaultKind::Write)?;
            self.frames
                .write_frame(self.frame_of(e)?, offset, &data[done..done + len]);
            done += len;
        }
        Ok(())
    }

    /// Translate with permission check, faulting and retrying once.
    fn access(
        &self,
        mem: &mut UserMemory,
        va: VirtualAddress,
        kind: FaultKind,
    ) -> Result<PageEntryBits, MmError> {
        let permitted = |mem: &UserMemory| {
            mem.space
                .translate(va)
                .filter(|e| kind == FaultKind::Read || e.writable())
        };

        if let Some(e) = permitted(mem) {
            return Ok(e);
        }
        self.handle_fault(mem, Fault { va, kind })?;
        permitted(mem).ok_or(MmError::ProtectionFault(va))
    }
}

/// In-page offset of `va` and how many of `remaining` bytes fit in its page.
#[allow(clippy::cast_possible_truncation)]
fn chunk(va: VirtualAddress, remaining: usize) -> (usize, usize) {
    let offset = va.page_offset() as usize;
    (offset, remaining.min(FRAME_BYTES - offset))
}
