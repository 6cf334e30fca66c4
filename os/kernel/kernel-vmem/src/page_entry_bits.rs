use bitfield_struct::bitfield;
use kernel_memory_addresses::{PhysicalAddress, PhysicalPage};

/// A single 32-bit page-table entry in its raw bitfield form.
///
/// The hardware-defined low bits follow the classic two-level x86 layout.
/// Two of the three OS-available bits carry the memory manager's own
/// bookkeeping, which the MMU ignores.
///
/// ### Bit layout
///
/// | Bits   | Name            | Meaning |
/// |--------|-----------------|---------|
/// | 0      | `P`             | Entry maps a frame |
/// | 1      | `RW`            | Writable if set |
/// | 2      | `US`            | User-mode accessible if set |
/// | 3      | `PWT`           | Write-through caching |
/// | 4      | `PCD`           | Caching disabled |
/// | 5      | `A`             | Accessed |
/// | 6      | `D`             | Dirty |
/// | 7      | `PAT`           | Unused here |
/// | 8      | `G`             | Global |
/// | 9      | `COW` (OS)      | Copy-on-write: read-only until the first write fault |
/// | 10     | `SHARED` (OS)   | Family shared page: writable, never copied on fork |
/// | 11     | OS              | Reserved |
/// | 12..31 | `frame`         | Physical frame number |
///
/// ### Example
/// ```rust
/// # use kernel_vmem::PageEntryBits;
/// # use kernel_memory_addresses::PhysicalPage;
/// let mut e = PageEntryBits::user_rw();
/// e.set_physical_page(PhysicalPage::from_number(0x345));
/// assert!(e.present() && e.writable());
/// assert_eq!(e.physical_page().number(), 0x345);
/// ```
#[bitfield(u32)]
#[derive(PartialEq, Eq)]
pub struct PageEntryBits {
    /// Present (P, bit 0).
    pub present: bool,

    /// Writable (RW, bit 1). Clear for read-only; writes then fault.
    pub writable: bool,

    /// User/Supervisor (US, bit 2).
    pub user_access: bool,

    /// Page Write-Through (PWT, bit 3).
    pub write_through: bool,

    /// Page Cache Disable (PCD, bit 4).
    pub cache_disabled: bool,

    /// Accessed (A, bit 5). Set by the MMU on any access.
    pub accessed: bool,

    /// Dirty (D, bit 6). Set by the MMU on the first write.
    pub dirty: bool,

    #[bits(1)]
    __: u8,

    /// Global (G, bit 8).
    pub global_translation: bool,

    /// Copy-on-write marker (OS bit 9).
    ///
    /// Set together with a cleared `writable` bit on every private page of a
    /// forked address space. A write fault on such a page is resolved by
    /// copying (or, for a sole owner, re-enabling writes) instead of killing
    /// the process.
    pub cow: bool,

    /// Family shared page marker (OS bit 10).
    pub shared: bool,

    #[bits(1)]
    __: u8,

    /// Physical frame number (bits 12..=31).
    #[bits(20)]
    frame_number: u32,
}

impl PageEntryBits {
    #[inline]
    #[must_use]
    pub const fn physical_page(&self) -> PhysicalPage {
        PhysicalPage::from_number(self.frame_number() as u64)
    }

    #[inline]
    #[must_use]
    pub const fn physical_address(&self) -> PhysicalAddress {
        self.physical_page().base()
    }

    #[inline]
    #[allow(clippy::cast_possible_truncation)]
    pub const fn set_physical_page(&mut self, page: PhysicalPage) {
        self.set_frame_number(page.number() as u32);
    }

    #[inline]
    #[must_use]
    pub const fn with_physical_page(mut self, page: PhysicalPage) -> Self {
        self.set_physical_page(page);
        self
    }

    /// Ordinary private user page.
    #[inline]
    #[must_use]
    pub const fn user_rw() -> Self {
        Self::new()
            .with_present(true)
            .with_writable(true)
            .with_user_access(true)
    }

    /// Private page shared copy-on-write with another address space.
    #[inline]
    #[must_use]
    pub const fn user_cow() -> Self {
        Self::new()
            .with_present(true)
            .with_writable(false)
            .with_user_access(true)
            .with_cow(true)
    }

    /// The family shared page.
    #[inline]
    #[must_use]
    pub const fn user_shared() -> Self {
        Self::user_rw().with_shared(true)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn bit_positions_match_layout() {
        assert_eq!(PageEntryBits::user_rw().into_bits(), 0b111);
        assert_eq!(PageEntryBits::user_cow().into_bits(), 0b10_0000_0101);
        assert_eq!(PageEntryBits::user_shared().into_bits(), 0b100_0000_0111);
    }

    #[test]
    fn frame_round_trips() {
        let page = PhysicalPage::from_number(0xD_FFFF);
        let e = PageEntryBits::user_cow().with_physical_page(page);
        assert_eq!(e.physical_page(), page);
        assert_eq!(e.into_bits() >> 12, 0xD_FFFF);
        assert!(e.cow() && !e.writable());
        assert_eq!(e.with_physical_page(PhysicalPage::from_number(0)), PageEntryBits::user_cow());
    }
}
