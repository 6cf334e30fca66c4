//! # Page Fault Dispatch
//!
//! The trap layer reports "access of kind K at address A" and gets back a
//! [`FaultResolution`]:
//!
//! | Page state at A                     | Read       | Write                        |
//! |-------------------------------------|------------|------------------------------|
//! | present, writable                   | spurious   | spurious                     |
//! | present, copy-on-write              | spurious   | copy or upgrade in place     |
//! | present, read-only (not CoW)        | spurious   | protection fault (kill)      |
//! | absent, inside a reservation        | demand-zero| demand-zero                  |
//! | absent, anywhere else               | bad address (kill)                        |
//!
//! Out-of-memory while resolving kills the faulting process. An allocator
//! invariant violation halts the kernel.

use crate::memory::UserMemory;
use crate::{MemoryManager, MmError};
use kernel_alloc::{InvariantViolation, PhysMapper};
use kernel_info::memory::KERNEL_BASE;
use kernel_memory_addresses::VirtualAddress;
use log::{error, warn};

/// Kind of access that faulted.
#[derive(Debug, Copy, Clone, Eq, PartialEq)]
pub enum FaultKind {
    Read,
    Write,
}

/// A page fault as delivered by the trap layer.
#[derive(Debug, Copy, Clone, Eq, PartialEq)]
pub struct Fault {
    pub va: VirtualAddress,
    pub kind: FaultKind,
}

impl Fault {
    #[must_use]
    pub const fn read(va: VirtualAddress) -> Self {
        Self {
            va,
            kind: FaultKind::Read,
        }
    }

    #[must_use]
    pub const fn write(va: VirtualAddress) -> Self {
        Self {
            va,
            kind: FaultKind::Write,
        }
    }
}

/// How a fault was resolved.
#[derive(Debug, Copy, Clone, Eq, PartialEq)]
pub enum FaultOutcome {
    /// A shared frame was copied into a private one.
    CopiedOnWrite,
    /// The process was the last mapper of a copy-on-write frame; writes were
    /// re-enabled without copying.
    UpgradedInPlace,
    /// A reserved page received a zeroed frame.
    DemandZero,
    /// The access is already permitted (e.g. another CPU resolved it first).
    Spurious,
}

/// What the trap layer must do next.
#[derive(Debug, Copy, Clone, Eq, PartialEq)]
pub enum FaultResolution {
    /// Return to the faulting instruction.
    Resume,
    /// Terminate the faulting process.
    Kill(MmError),
    /// Stop the kernel.
    Halt(InvariantViolation),
}

/// Map the result of [`MemoryManager::handle_fault`] onto the trap contract.
#[must_use]
pub fn resolve(result: Result<FaultOutcome, MmError>) -> FaultResolution {
    match result {
        Ok(_) => FaultResolution::Resume,
        Err(MmError::Fatal(v)) => {
            error!("halting on page fault: {v}");
            FaultResolution::Halt(v)
        }
        Err(e) => FaultResolution::Kill(e),
    }
}

impl<M: PhysMapper> MemoryManager<'_, M> {
    /// Resolve a page fault of `mem`.
    ///
    /// # Errors
    /// - [`MmError::BadAddress`] outside the process's memory.
    /// - [`MmError::ProtectionFault`] for a write to a read-only page that is
    ///   not copy-on-write.
    /// - [`MmError::OutOfMemory`] if a frame was needed and none was left.
    /// - [`MmError::Fatal`] on allocator invariant violations.
    pub fn handle_fault(&self, mem: &mut UserMemory, fault: Fault) -> Result<FaultOutcome, MmError> {
        let va = fault.va;
        let result = match (mem.space.translate(va), fault.kind) {
            (Some(_), FaultKind::Read) => Ok(FaultOutcome::Spurious),
            (Some(e), FaultKind::Write) if e.writable() => Ok(FaultOutcome::Spurious),
            (Some(e), FaultKind::Write) if e.cow() => self.cow_fault(mem, va, e),
            (Some(_), FaultKind::Write) => Err(MmError::ProtectionFault(va)),
            (None, _) if va.as_u64() >= KERNEL_BASE || UserMemory::is_shared_page(va) => {
                Err(MmError::BadAddress(va))
            }
            (None, _) if va.as_u64() < mem.size && mem.reserved.covers(va) => {
                self.demand_fault(mem, va)
            }
            (None, _) => Err(MmError::BadAddress(va)),
        };

        if let Err(e) = &result
            && !e.is_fatal()
        {
            warn!("{}: {:?} fault at {va} not resolved: {e}", mem.pid, fault.kind);
        }
        result
    }
}
