use kernel_alloc::{FrameAllocError, InvariantViolation};
use kernel_memory_addresses::VirtualAddress;
use kernel_vmem::MapError;

/// Failure of a memory-management request or fault.
///
/// Everything except [`MmError::Fatal`] is scoped to one process: the
/// request fails (or the faulting process is killed) and the kernel keeps
/// running.
#[derive(Debug, Copy, Clone, Eq, PartialEq, thiserror::Error)]
pub enum MmError {
    #[error("out of physical memory")]
    OutOfMemory,
    #[error("invalid length {0}")]
    InvalidLength(i64),
    #[error("user address space exhausted")]
    AddressSpaceExhausted,
    #[error("bad address {0}")]
    BadAddress(VirtualAddress),
    #[error("write to read-only page at {0}")]
    ProtectionFault(VirtualAddress),
    #[error("mapping would start at the null address")]
    NullBase,
    #[error("no shared mapping")]
    NoSharedMapping,
    #[error(transparent)]
    PageTable(#[from] MapError),
    #[error(transparent)]
    Fatal(#[from] InvariantViolation),
}

impl MmError {
    /// `true` if the kernel cannot continue.
    #[inline]
    #[must_use]
    pub const fn is_fatal(&self) -> bool {
        matches!(self, Self::Fatal(_))
    }

    /// The underlying invariant violation of a fatal error.
    #[inline]
    #[must_use]
    pub const fn fatal(&self) -> Option<InvariantViolation> {
        match self {
            Self::Fatal(v) => Some(*v),
            _ => None,
        }
    }
}

impl From<FrameAllocError> for MmError {
    fn from(e: FrameAllocError) -> Self {
        match e {
            FrameAllocError::Exhausted => Self::OutOfMemory,
        }
    }
}
