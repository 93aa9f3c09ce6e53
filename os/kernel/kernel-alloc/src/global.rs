//! The kernel's frame allocator instance.

use crate::FrameAllocator;
use kernel_info::boot::PhysicalMemoryInfo;
use kernel_memory_addresses::VirtualAddress;
use kernel_sync::SyncOnceCell;

static FRAME_ALLOCATOR: SyncOnceCell<FrameAllocator> = SyncOnceCell::new();

/// Install the global allocator in bootstrap mode.
///
/// # Panics
/// If an allocator is already installed.
pub fn install(info: PhysicalMemoryInfo) -> &'static FrameAllocator {
    match FRAME_ALLOCATOR.set(FrameAllocator::new(info)) {
        Ok(fa) => fa,
        Err(_) => panic!("global frame allocator installed twice"),
    }
}

/// The global allocator, if installed.
#[inline]
pub fn get() -> Option<&'static FrameAllocator> {
    FRAME_ALLOCATOR.get()
}

fn installed() -> &'static FrameAllocator {
    get().unwrap_or_else(|| panic!("global frame allocator not installed"))
}

/// [`FrameAllocator::alloc_kpages`] on the global allocator.
///
/// # Panics
/// If no allocator is installed.
pub fn alloc_kpages(count: usize) -> Option<VirtualAddress> {
    installed().alloc_kpages(count)
}

/// [`FrameAllocator::free_kpages`] on the global allocator.
///
/// # Panics
/// If no allocator is installed.
pub fn free_kpages(va: VirtualAddress) {
    installed().free_kpages(va);
}
