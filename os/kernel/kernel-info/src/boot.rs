//! # Boot Memory Hand-off

use crate::memory::DIRECT_MAP_SIZE;
use kernel_memory_addresses::{PAGE_SIZE, PhysicalAddress};

/// Physical RAM bounds known at the time the VM subsystem starts.
///
/// Everything below [`first_free`](Self::first_free) is occupied by the kernel
/// image and early boot data. Everything from there up to
/// [`end`](Self::end) is unmanaged RAM the frame allocator may claim.
#[repr(C)]
#[derive(Debug, Copy, Clone, Eq, PartialEq)]
pub struct PhysicalMemoryInfo {
    /// First physical address not used by the kernel image.
    pub first_free: PhysicalAddress,

    /// One past the last byte of RAM.
    pub end: PhysicalAddress,
}

impl PhysicalMemoryInfo {
    /// Creates the hand-off record, rounding `first_free` up and `end` down to
    /// whole frames.
    ///
    /// # Panics
    /// If the rounded range is empty or inverted, or if RAM extends past the
    /// kernel's direct map.
    #[must_use]
    pub const fn new(first_free: PhysicalAddress, end: PhysicalAddress) -> Self {
        let lo = first_free.as_u64().div_ceil(PAGE_SIZE) * PAGE_SIZE;
        let hi = end.as_u64() / PAGE_SIZE * PAGE_SIZE;
        assert!(lo < hi, "boot memory range is empty");
        assert!(hi <= DIRECT_MAP_SIZE, "RAM extends past the direct map");
        Self {
            first_free: PhysicalAddress::new(lo),
            end: PhysicalAddress::new(hi),
        }
    }

    /// Total number of frames from physical zero up to [`end`](Self::end).
    #[must_use]
    #[allow(clippy::cast_possible_truncation)]
    pub const fn total_frames(&self) -> usize {
        (self.end.as_u64() / PAGE_SIZE) as usize
    }

    /// Number of frames below [`first_free`](Self::first_free).
    #[must_use]
    #[allow(clippy::cast_possible_truncation)]
    pub const fn reserved_frames(&self) -> usize {
        (self.first_free.as_u64() / PAGE_SIZE) as usize
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn rounds_to_frames() {
        let info = PhysicalMemoryInfo::new(PhysicalAddress::new(0x1_0001), PhysicalAddress::new(0x10_0FFF));
        assert_eq!(info.first_free.as_u64(), 0x1_1000);
        assert_eq!(info.end.as_u64(), 0x10_0000);
        assert_eq!(info.reserved_frames(), 0x11);
        assert_eq!(info.total_frames(), 0x100);
    }

    #[test]
    fn all_of_the_direct_map_is_usable() {
        let info = PhysicalMemoryInfo::new(PhysicalAddress::new(0x1000), PhysicalAddress::new(DIRECT_MAP_SIZE));
        assert_eq!(info.end.as_u64(), DIRECT_MAP_SIZE);
    }

    #[test]
    #[should_panic(expected = "RAM extends past the direct map")]
    fn rejects_ram_beyond_the_direct_map() {
        let _ = PhysicalMemoryInfo::new(PhysicalAddress::new(0x1000), PhysicalAddress::new(DIRECT_MAP_SIZE + PAGE_SIZE));
    }

    #[test]
    #[should_panic(expected = "boot memory range is empty")]
    fn rejects_empty_range() {
        let _ = PhysicalMemoryInfo::new(PhysicalAddress::new(0x2000), PhysicalAddress::new(0x2FFF));
    }
}
