//! # Frame Allocator
//!
//! The kernel-wide owner of physical frames. Starts out stealing frames with a
//! bump pointer and switches to the coremap once [`FrameAllocator::bootstrap`]
//! has been called.

use crate::bootstrap::BootStealer;
use crate::coremap::{Coremap, FrameRecord, FrameStats};
use crate::phys_mapper::{kernel_physical, kernel_virtual};
use alloc::vec::Vec;
use kernel_info::boot::PhysicalMemoryInfo;
use kernel_info::memory::DIRECT_MAP_SIZE;
use kernel_memory_addresses::{PhysicalPage, VirtualAddress};
use kernel_sync::SpinLock;
use kernel_vmem::FrameAlloc;
use log::{debug, trace};

enum Mode {
    Boot(BootStealer),
    Coremap(Coremap),
}

/// Physical frame allocator.
///
/// Every operation takes one spin lock with local interrupts disabled. The lock
/// covers the bookkeeping only; frame contents are never touched here.
pub struct FrameAllocator {
    info: PhysicalMemoryInfo,
    mode: SpinLock<Mode>,
}

impl FrameAllocator {
    /// Create an allocator in bootstrap (stealing) mode.
    ///
    /// # Panics
    /// If RAM reaches past the direct map, where
    /// [`alloc_kpages`](Self::alloc_kpages) could not address it.
    #[must_use]
    pub const fn new(info: PhysicalMemoryInfo) -> Self {
        assert!(
            info.end.as_u64() <= DIRECT_MAP_SIZE,
            "RAM extends past the direct map"
        );
        Self {
            info,
            mode: SpinLock::new(Mode::Boot(BootStealer::new(&info))),
        }
    }

    /// Whether [`bootstrap`](Self::bootstrap) has completed.
    #[must_use]
    pub fn is_bootstrapped(&self) -> bool {
        self.mode.with_lock(|m| matches!(m, Mode::Coremap(_)))
    }

    /// Switch from stealing to the coremap.
    ///
    /// Every frame below the stealing watermark, including the kernel image,
    /// becomes [`Fixed`](crate::FrameState::Fixed).
    ///
    /// # Panics
    /// If called twice, or if the coremap itself cannot be allocated.
    pub fn bootstrap(&self) {
        assert!(!self.is_bootstrapped(), "frame allocator bootstrapped twice");

        // The heap may call back into this allocator, so the coremap storage
        // is reserved before taking the lock.
        let frames = self.info.total_frames();
        let mut records = Vec::new();
        if records.try_reserve_exact(frames).is_err() {
            panic!("no memory for a coremap of {frames} frames");
        }
        records.resize(frames, FrameRecord::FREE);
        let mut coremap = Coremap::from_records(records);

        let mut mode = self.mode.lock();
        let watermark = match &*mode {
            Mode::Boot(stealer) => stealer.watermark(),
            Mode::Coremap(_) => panic!("frame allocator bootstrapped twice"),
        };
        coremap.fix_below(watermark.page().index());
        let stats = coremap.stats();
        *mode = Mode::Coremap(coremap);
        drop(mode);

        debug!(
            "coremap online: {} frames, {} fixed ({} kernel image, {} stolen), {} free",
            stats.total,
            stats.fixed,
            self.info.reserved_frames(),
            stats.fixed - self.info.reserved_frames(),
            stats.free
        );
    }

    /// Allocate `count` physically contiguous frames.
    ///
    /// Returns the first frame, or `None` when no such run exists.
    ///
    /// # Panics
    /// If `count` is zero.
    pub fn alloc(&self, count: usize) -> Option<PhysicalPage> {
        assert!(count > 0, "zero-frame allocation");
        let frame = self.mode.with_lock(|mode| match mode {
            Mode::Boot(stealer) => stealer.steal(count),
            Mode::Coremap(map) => map.allocate(count).map(PhysicalPage::from_index),
        });
        match frame {
            Some(f) => trace!("alloc {count} frame(s) at {f}"),
            None => debug!("out of frames for a run of {count}"),
        }
        frame
    }

    /// Release the run starting at `first`.
    ///
    /// # Panics
    /// In bootstrap mode, or if `first` is not the first frame of a live run.
    pub fn free(&self, first: PhysicalPage) {
        let len = self.mode.with_lock(|mode| match mode {
            Mode::Boot(_) => panic!("free of {first} in bootstrap mode: stolen memory is never returned"),
            Mode::Coremap(map) => map.free(first.index()),
        });
        trace!("free {len} frame(s) at {first}");
    }

    /// Allocate `count` frames and return their kernel virtual address.
    pub fn alloc_kpages(&self, count: usize) -> Option<VirtualAddress> {
        self.alloc(count).map(|f| kernel_virtual(f.base()))
    }

    /// Release pages obtained from [`alloc_kpages`](Self::alloc_kpages).
    ///
    /// # Panics
    /// If `va` is not a page-aligned address in the direct-mapped window, or on
    /// any of the conditions of [`free`](Self::free).
    pub fn free_kpages(&self, va: VirtualAddress) {
        assert!(va.is_page_aligned(), "free_kpages of unaligned {va}");
        self.free(kernel_physical(va).page());
    }

    /// Frame counts by state. All frames count as reserved before bootstrap.
    #[must_use]
    pub fn stats(&self) -> FrameStats {
        self.mode.with_lock(|mode| match mode {
            Mode::Coremap(map) => map.stats(),
            Mode::Boot(stealer) => {
                let total = self.info.total_frames();
                let fixed = stealer.watermark().page().index();
                FrameStats {
                    total,
                    free: total - fixed,
                    allocated: 0,
                    fixed,
                }
            }
        })
    }

    /// The coremap record of `frame`, once bootstrapped.
    #[must_use]
    pub fn state_of(&self, frame: PhysicalPage) -> Option<FrameRecord> {
        self.mode.with_lock(|mode| match mode {
            Mode::Coremap(map) => map.record(frame.index()),
            Mode::Boot(_) => None,
        })
    }
}

impl FrameAlloc for FrameAllocator {
    #[inline]
    fn alloc_frames(&self, count: usize) -> Option<PhysicalPage> {
        self.alloc(count)
    }

    #[inline]
    fn free_frames(&self, first: PhysicalPage) {
        self.free(first);
    }
}
