//! Frame stealing before the coremap exists.

use kernel_info::boot::PhysicalMemoryInfo;
use kernel_memory_addresses::{PAGE_SIZE, PhysicalAddress, PhysicalPage};

/// Bump allocator over unmanaged RAM.
///
/// Hands out frames upward from the first free physical address. There is no
/// way to give them back.
#[derive(Debug)]
pub(crate) struct BootStealer {
    next: PhysicalAddress,
    end: PhysicalAddress,
}

impl BootStealer {
    pub(crate) const fn new(info: &PhysicalMemoryInfo) -> Self {
        Self {
            next: info.first_free,
            end: info.end,
        }
    }

    /// Take `count` contiguous frames, or `None` if RAM is exhausted.
    pub(crate) fn steal(&mut self, count: usize) -> Option<PhysicalPage> {
        let bytes = (count as u64).checked_mul(PAGE_SIZE)?;
        let new_next = self.next.checked_add(bytes)?;
        if new_next > self.end {
            return None;
        }
        let first = self.next.page();
        self.next = new_next;
        Some(first)
    }

    /// Everything below this address is in use.
    pub(crate) const fn watermark(&self) -> PhysicalAddress {
        self.next
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn steals_upward_until_exhausted() {
        let info = PhysicalMemoryInfo::new(PhysicalAddress::new(0x2000), PhysicalAddress::new(0x6000));
        let mut s = BootStealer::new(&info);
        assert_eq!(s.steal(1), Some(PhysicalPage::from_index(2)));
        assert_eq!(s.steal(2), Some(PhysicalPage::from_index(3)));
        assert_eq!(s.steal(2), None);
        assert_eq!(s.watermark().as_u64(), 0x5000);
        assert_eq!(s.steal(1), Some(PhysicalPage::from_index(5)));
        assert_eq!(s.steal(1), None);
        assert_eq!(s.steal(usize::MAX), None);
    }
}
