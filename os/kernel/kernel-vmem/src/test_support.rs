//! Frame pool and simulated RAM for unit tests.

use crate::{FRAME_BYTES, FrameAlloc, PhysMapper};
use core::cell::{Cell, RefCell};
use kernel_memory_addresses::{PhysicalAddress, PhysicalPage};

/// Hands out single frames `0..n`, tracking which are live.
pub struct TestFrames {
    used: RefCell<Vec<bool>>,
    live: Cell<usize>,
}

impl TestFrames {
    pub fn new(n: usize) -> Self {
        Self {
            used: RefCell::new(vec![false; n]),
            live: Cell::new(0),
        }
    }

    pub fn live(&self) -> usize {
        self.live.get()
    }
}

impl FrameAlloc for TestFrames {
    fn alloc_frames(&self, count: usize) -> Option<PhysicalPage> {
        assert_eq!(count, 1, "test pool only hands out single frames");
        let mut used = self.used.borrow_mut();
        let idx = used.iter().position(|u| !*u)?;
        used[idx] = true;
        self.live.set(self.live.get() + 1);
        Some(PhysicalPage::from_index(idx))
    }

    fn free_frames(&self, first: PhysicalPage) {
        let mut used = self.used.borrow_mut();
        assert!(used[first.index()], "double free of {first}");
        used[first.index()] = false;
        self.live.set(self.live.get() - 1);
    }
}

/// A 4 KiB-aligned raw frame.
#[repr(C, align(4096))]
struct Aligned4K([u8; FRAME_BYTES]);

/// "Physical memory" as a vector of aligned frames; physical address 0 is
/// the first byte of frame 0.
pub struct TestPhys {
    frames: Box<[RefCell<Aligned4K>]>,
}

impl TestPhys {
    pub fn new(n: usize) -> Self {
        Self {
            frames: (0..n).map(|_| RefCell::new(Aligned4K([0; FRAME_BYTES]))).collect(),
        }
    }

    pub fn fill(&self, byte: u8) {
        for f in &self.frames {
            f.borrow_mut().0.fill(byte);
        }
    }

    pub fn frame_bytes(&self, frame: PhysicalPage) -> Vec<u8> {
        self.frames[frame.index()].borrow().0.to_vec()
    }

    pub fn read(&self, pa: PhysicalAddress) -> u8 {
        self.frames[pa.page().index()].borrow().0[offset(pa)]
    }

    pub fn write(&self, pa: PhysicalAddress, value: u8) {
        self.frames[pa.page().index()].borrow_mut().0[offset(pa)] = value;
    }
}

fn offset(pa: PhysicalAddress) -> usize {
    usize::try_from(pa.page_offset()).unwrap()
}

unsafe impl PhysMapper for TestPhys {
    fn frame_ptr(&self, frame: PhysicalPage) -> *mut u8 {
        self.frames[frame.index()].as_ptr().cast::<u8>()
    }
}
