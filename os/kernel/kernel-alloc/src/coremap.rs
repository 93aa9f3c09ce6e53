//! # Coremap
//!
//! One [`FrameRecord`] per physical frame, indexed by frame number. A run of
//! allocated frames is described entirely by its first record:
//!
//! ```text
//!  index:   0     1     2     3     4     5     6     7
//!         ┌─────┬─────┬─────┬─────┬─────┬─────┬─────┬─────┐
//!         │ Fix │ Fix │ A*3 │  A  │  A  │  F  │ A*1 │  F  │
//!         └─────┴─────┴─────┴─────┴─────┴─────┴─────┴─────┘
//!                       ▲ run start, length 3     ▲ run start, length 1
//! ```
//!
//! ### Invariants
//! - Every allocated run has exactly one record with `run_start` set, and it
//!   carries the run length.
//! - `Fixed` records never change.
//! - Records only move `Free → Allocated → Free`.

use alloc::vec::Vec;
use bitfield_struct::bitfield;

/// Lifecycle state of a physical frame.
#[derive(Copy, Clone, Debug, Default, Eq, PartialEq)]
#[repr(u8)]
pub enum FrameState {
    #[default]
    Free = 0,
    Allocated = 1,
    /// Permanently reserved (kernel image, boot-time allocations).
    Fixed = 2,
}

impl FrameState {
    const fn into_bits(self) -> u8 {
        self as u8
    }

    const fn from_bits(value: u8) -> Self {
        match value {
            0 => Self::Free,
            1 => Self::Allocated,
            _ => Self::Fixed,
        }
    }
}

/// Packed per-frame bookkeeping.
///
/// | Bits  | Field       |
/// |-------|-------------|
/// | 0–1   | `state`     |
/// | 2     | `run_start` |
/// | 3–31  | `run_len` (first frame of a run only) |
#[bitfield(u32)]
#[derive(PartialEq, Eq)]
pub struct FrameRecord {
    #[bits(2, default = FrameState::Free)]
    pub state: FrameState,
    pub run_start: bool,
    #[bits(29)]
    pub run_len: u32,
}

impl FrameRecord {
    /// Longest run a single record can describe.
    pub const MAX_RUN: usize = (1 << 29) - 1;

    pub const FREE: Self = Self::new();
    pub const FIXED: Self = Self::new().with_state(FrameState::Fixed);
}

/// Frame counts by state.
#[derive(Copy, Clone, Debug, Default, Eq, PartialEq)]
pub struct FrameStats {
    pub total: usize,
    pub free: usize,
    pub allocated: usize,
    pub fixed: usize,
}

/// The coremap proper. Not synchronized; [`FrameAllocator`](crate::FrameAllocator)
/// wraps it in a lock.
#[derive(Debug)]
pub struct Coremap {
    records: Vec<FrameRecord>,
}

impl Coremap {
    /// Take ownership of `records`, one per frame starting at frame 0.
    #[must_use]
    pub const fn from_records(records: Vec<FrameRecord>) -> Self {
        Self { records }
    }

    #[inline]
    #[must_use]
    pub fn frames(&self) -> usize {
        self.records.len()
    }

    #[inline]
    #[must_use]
    pub fn record(&self, index: usize) -> Option<FrameRecord> {
        self.records.get(index).copied()
    }

    /// First-fit search for `count` contiguous free frames.
    ///
    /// Returns the index of the first frame, already marked allocated.
    pub fn allocate(&mut self, count: usize) -> Option<usize> {
        if count == 0 || count > FrameRecord::MAX_RUN || count > self.records.len() {
            return None;
        }

        let mut start = 0;
        let mut len = 0;
        for (i, rec) in self.records.iter().enumerate() {
            if rec.state() != FrameState::Free {
                len = 0;
                continue;
            }
            if len == 0 {
                start = i;
            }
            len += 1;
            if len == count {
                self.mark_run(start, count);
                return Some(start);
            }
        }
        None
    }

    #[allow(clippy::cast_possible_truncation)]
    fn mark_run(&mut self, start: usize, count: usize) {
        let run = &mut self.records[start..start + count];
        for rec in run.iter_mut() {
            *rec = FrameRecord::new().with_state(FrameState::Allocated);
        }
        run[0] = run[0].with_run_start(true).with_run_len(count as u32);
    }

    /// Release the run starting at frame `index` and return its length.
    ///
    /// # Panics
    /// If `index` is outside RAM, is `Fixed`, is not allocated, or is not the
    /// first frame of a run.
    pub fn free(&mut self, index: usize) -> usize {
        let Some(rec) = self.record(index) else {
            panic!("free of frame {index} outside managed RAM");
        };
        assert_ne!(
            rec.state(),
            FrameState::Fixed,
            "free of fixed frame {index}"
        );
        assert_eq!(
            rec.state(),
            FrameState::Allocated,
            "free of unallocated frame {index}"
        );
        assert!(rec.run_start(), "free of frame {index} inside a run");

        let len = rec.run_len() as usize;
        for r in &mut self.records[index..index + len] {
            debug_assert_eq!(r.state(), FrameState::Allocated);
            *r = FrameRecord::FREE;
        }
        len
    }

    /// Mark frames `0..count` as permanently reserved.
    pub fn fix_below(&mut self, count: usize) {
        let count = count.min(self.records.len());
        for r in &mut self.records[..count] {
            *r = FrameRecord::FIXED;
        }
    }

    #[must_use]
    pub fn stats(&self) -> FrameStats {
        let mut stats = FrameStats {
            total: self.records.len(),
            ..FrameStats::default()
        };
        for r in &self.records {
            match r.state() {
                FrameState::Free => stats.free += 1,
                FrameState::Allocated => stats.allocated += 1,
                FrameState::Fixed => stats.fixed += 1,
            }
        }
        stats
    }
}
