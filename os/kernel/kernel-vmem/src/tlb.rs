//! # Translation Cache (TLB)
//!
//! The processor translates through a small, fully associative cache of
//! [`TlbEntry`] slots that the kernel loads by hand. Each entry is a pair of
//! words:
//!
//! ```text
//!  EntryHi  | 63 ............. 12 | 11 .. 0 |
//!           |  virtual page no.   |    -    |
//!
//!  EntryLo  | 63 ............. 12 | 11 | 10 | 9 | 8 | 7 .. 0 |
//!           |  physical frame no. | NC |  D | V | G |    -   |
//! ```
//!
//! `D` (dirty) doubles as the write-enable bit: a store through an entry with
//! `D` clear raises a read-only fault.
//!
//! All slot updates happen with local interrupts disabled, so an interrupt
//! handler cannot observe or clobber a half-written slot.

use crate::info::TLB_SLOTS;
use bitfield_struct::bitfield;
use kernel_memory_addresses::{PAGE_SHIFT, PhysicalAddress, PhysicalPage, VirtualAddress, VirtualPage};
use kernel_sync::{IrqGuard, SpinLock};
use log::{trace, warn};

#[bitfield(u64)]
#[derive(PartialEq, Eq)]
pub struct EntryHi {
    #[bits(12)]
    __: u16,
    #[bits(52)]
    vpn: u64,
}

#[bitfield(u64)]
#[derive(PartialEq, Eq)]
pub struct EntryLo {
    #[bits(8)]
    __: u8,
    pub global: bool,
    pub valid: bool,
    /// Write enable.
    pub dirty: bool,
    pub no_cache: bool,
    #[bits(52)]
    pfn: u64,
}

impl EntryHi {
    #[inline]
    #[must_use]
    pub const fn for_page(page: VirtualPage) -> Self {
        Self::new().with_vpn(page.base().as_u64() >> PAGE_SHIFT)
    }

    #[inline]
    #[must_use]
    pub const fn page(self) -> VirtualPage {
        VirtualAddress::new(self.vpn() << PAGE_SHIFT).page()
    }
}

impl EntryLo {
    #[inline]
    #[must_use]
    pub const fn for_frame(frame: PhysicalPage, writable: bool) -> Self {
        Self::new()
            .with_pfn(frame.base().as_u64() >> PAGE_SHIFT)
            .with_valid(true)
            .with_dirty(writable)
    }

    #[inline]
    #[must_use]
    pub const fn frame(self) -> PhysicalPage {
        PhysicalAddress::new(self.pfn() << PAGE_SHIFT).page()
    }
}

/// One translation-cache slot.
#[derive(Copy, Clone, Debug, Default, Eq, PartialEq)]
pub struct TlbEntry {
    pub hi: EntryHi,
    pub lo: EntryLo,
}

impl TlbEntry {
    /// An entry that never matches.
    pub const INVALID: Self = Self {
        hi: EntryHi::new(),
        lo: EntryLo::new(),
    };

    #[inline]
    #[must_use]
    pub const fn new(page: VirtualPage, frame: PhysicalPage, writable: bool) -> Self {
        Self {
            hi: EntryHi::for_page(page),
            lo: EntryLo::for_frame(frame, writable),
        }
    }

    #[inline]
    #[must_use]
    pub const fn is_valid(&self) -> bool {
        self.lo.valid()
    }
}

/// Access to the processor's translation cache, slot by slot.
///
/// Implementations are not required to be atomic across calls; callers that
/// read-modify-write slots hold an [`IrqGuard`].
pub trait TranslationCache {
    /// Number of slots.
    fn slots(&self) -> usize;

    fn read(&self, slot: usize) -> TlbEntry;

    fn write(&self, slot: usize, entry: TlbEntry);

    /// Slot holding a valid translation for `page`, if any.
    fn probe(&self, page: VirtualPage) -> Option<usize> {
        (0..self.slots()).find(|&i| {
            let e = self.read(i);
            e.is_valid() && e.hi.page() == page
        })
    }
}

/// Load `page → frame` into the cache and return the slot used.
///
/// An existing translation for `page` is overwritten in place. Otherwise the
/// first invalid slot is taken; with no invalid slot left, slot 0 is evicted.
pub fn install<T: TranslationCache + ?Sized>(
    tlb: &T,
    page: VirtualPage,
    frame: PhysicalPage,
    writable: bool,
) -> usize {
    let _irq = IrqGuard::new();
    let entry = TlbEntry::new(page, frame, writable);

    let slot = if let Some(slot) = tlb.probe(page) {
        slot
    } else if let Some(slot) = (0..tlb.slots()).find(|&i| !tlb.read(i).is_valid()) {
        slot
    } else {
        let victim = tlb.read(0);
        warn!(
            "tlb full; evicting slot 0 ({} -> {})",
            victim.hi.page(),
            victim.lo.frame()
        );
        0
    };

    tlb.write(slot, entry);
    trace!("tlb[{slot}] = {page} -> {frame} w={writable}");
    slot
}

/// Invalidate every slot.
pub fn invalidate_all<T: TranslationCache + ?Sized>(tlb: &T) {
    let _irq = IrqGuard::new();
    for i in 0..tlb.slots() {
        tlb.write(i, TlbEntry::INVALID);
    }
}

/// Drop the translation for `page`, if cached.
pub fn invalidate_page<T: TranslationCache + ?Sized>(tlb: &T, page: VirtualPage) {
    let _irq = IrqGuard::new();
    if let Some(slot) = tlb.probe(page) {
        tlb.write(slot, TlbEntry::INVALID);
    }
}

/// Software translation cache with `N` slots.
///
/// Stands in for the hardware TLB on hosted builds and in tests.
pub struct SoftTlb<const N: usize = TLB_SLOTS> {
    slots: SpinLock<[TlbEntry; N]>,
}

impl<const N: usize> Default for SoftTlb<N> {
    fn default() -> Self {
        Self::new()
    }
}

impl<const N: usize> SoftTlb<N> {
    #[must_use]
    pub const fn new() -> Self {
        Self {
            slots: SpinLock::new([TlbEntry::INVALID; N]),
        }
    }

    /// Translate `va` the way the processor would, or `None` on a miss.
    #[must_use]
    pub fn translate(&self, va: VirtualAddress) -> Option<PhysicalAddress> {
        let page = va.page();
        self.slots.with_lock(|slots| {
            slots
                .iter()
                .find(|e| e.is_valid() && e.hi.page() == page)
                .map(|e| e.lo.frame().base() + va.page_offset())
        })
    }

    /// Number of valid slots.
    #[must_use]
    pub fn valid_entries(&self) -> usize {
        self.slots
            .with_lock(|slots| slots.iter().filter(|e| e.is_valid()).count())
    }
}

impl<const N: usize> TranslationCache for SoftTlb<N> {
    fn slots(&self) -> usize {
        N
    }

    fn read(&self, slot: usize) -> TlbEntry {
        self.slots.with_lock(|s| s[slot])
    }

    fn write(&self, slot: usize, entry: TlbEntry) {
        self.slots.with_lock(|s| s[slot] = entry);
    }
}
