use crate::FrameIndex;
use kernel_memory_addresses::PhysicalAddress;

/// Recoverable allocation failure.
#[derive(Debug, Copy, Clone, Eq, PartialEq, thiserror::Error)]
pub enum FrameAllocError {
    #[error("physical frame pool exhausted")]
    Exhausted,
}

/// A broken allocator invariant.
///
/// None of these can be repaired: continuing would let the free list and the
/// reference table disagree, and a later allocation could hand the same frame
/// to two owners. The kernel must stop when it sees one.
#[derive(Debug, Copy, Clone, Eq, PartialEq, thiserror::Error)]
pub enum InvariantViolation {
    #[error("frame address {0} is not page aligned")]
    Misaligned(PhysicalAddress),
    #[error("frame address {0} is outside the managed pool")]
    OutOfRange(PhysicalAddress),
    #[error("frame {0} has no references left")]
    NotAllocated(FrameIndex),
    #[error("frame {0} is already on the free list")]
    DoubleFree(FrameIndex),
    #[error("reference count of frame {0} overflowed")]
    RefCountOverflow(FrameIndex),
}

/// Rejected boot-time pool population.
#[derive(Debug, Copy, Clone, Eq, PartialEq, thiserror::Error)]
pub enum BootError {
    #[error("range bounds {0}..{1} are not page aligned")]
    Unaligned(PhysicalAddress, PhysicalAddress),
    #[error("range {0}..{1} lies outside the physical pool")]
    OutsidePhysicalRange(PhysicalAddress, PhysicalAddress),
    #[error("range {0}..{1} overlaps an already populated range")]
    Overlap(PhysicalAddress, PhysicalAddress),
    #[error("boot stage {0:?} cannot follow the current stage")]
    OutOfOrder(crate::BootStage),
}
