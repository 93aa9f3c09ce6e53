#![allow(dead_code)]

use kernel_alloc::{FrameAllocator, HeapPhysMapper};
use kernel_info::boot::PhysicalMemoryInfo;
use kernel_memory_addresses::{PAGE_SIZE, PhysicalAddress, VirtualAddress};
use kernel_vm::Vmm;
use kernel_vmem::SoftTlb;

/// Frames below this index hold the "kernel image".
pub const RESERVED_FRAMES: usize = 4;

pub const TEXT: u64 = 0x40_0000;
pub const DATA: u64 = 0x60_0000;

/// Simulated RAM, the frame allocator over it and a translation cache.
pub struct Machine {
    pub frames: FrameAllocator,
    pub ram: HeapPhysMapper,
    pub tlb: SoftTlb<8>,
}

impl Machine {
    pub fn new(total_frames: usize) -> Self {
        let _ = env_logger::builder().is_test(true).try_init();
        let frames = FrameAllocator::new(PhysicalMemoryInfo::new(
            PhysicalAddress::new(RESERVED_FRAMES as u64 * PAGE_SIZE),
            PhysicalAddress::new(total_frames as u64 * PAGE_SIZE),
        ));
        frames.bootstrap();
        Self {
            frames,
            ram: HeapPhysMapper::new(total_frames),
            tlb: SoftTlb::new(),
        }
    }

    pub fn vmm(&self) -> Vmm<'_, FrameAllocator, HeapPhysMapper, SoftTlb<8>> {
        Vmm::new(&self.frames, &self.ram, &self.tlb)
    }

    /// Frames handed out to address spaces.
    pub fn allocated(&self) -> usize {
        self.frames.stats().allocated
    }
}

pub fn va(addr: u64) -> VirtualAddress {
    VirtualAddress::new(addr)
}
