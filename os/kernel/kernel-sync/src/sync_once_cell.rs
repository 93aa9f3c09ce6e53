use core::{
    cell::UnsafeCell,
    mem::MaybeUninit,
    sync::atomic::{AtomicU8, Ordering},
};

const EMPTY: u8 = 0;
const WRITING: u8 = 1;
const PUBLISHED: u8 = 2;

/// A cell written at most once, readable from any CPU afterwards.
///
/// Holds kernel-wide singletons created during boot, such as the frame
/// allocator.
pub struct SyncOnceCell<T> {
    state: AtomicU8,
    value: UnsafeCell<MaybeUninit<T>>,
}

impl<T> Default for SyncOnceCell<T> {
    fn default() -> Self {
        Self::new()
    }
}

impl<T> SyncOnceCell<T> {
    #[must_use]
    pub const fn new() -> Self {
        Self {
            state: AtomicU8::new(EMPTY),
            value: UnsafeCell::new(MaybeUninit::uninit()),
        }
    }

    /// The stored value, once published.
    #[inline]
    pub fn get(&self) -> Option<&T> {
        self.is_initialized().then(|| {
            // SAFETY: PUBLISHED is stored only after the write completed.
            unsafe { self.published() }
        })
    }

    /// Whether a value has been published.
    #[inline]
    pub fn is_initialized(&self) -> bool {
        self.state.load(Ordering::Acquire) == PUBLISHED
    }

    /// Stores `value` if the cell is still empty.
    ///
    /// # Errors
    /// Hands `value` back if the cell is already initialized or another
    /// CPU is initializing it right now.
    pub fn set(&self, value: T) -> Result<&T, T> {
        if self.claim() {
            Ok(self.publish(value))
        } else {
            Err(value)
        }
    }

    /// Move from EMPTY to WRITING; only one caller ever succeeds.
    fn claim(&self) -> bool {
        self.state
            .compare_exchange(EMPTY, WRITING, Ordering::Acquire, Ordering::Relaxed)
            .is_ok()
    }

    /// Write the value after a successful [`claim`](Self::claim).
    fn publish(&self, value: T) -> &T {
        // SAFETY: the claim makes us the only writer; readers wait for PUBLISHED.
        unsafe { (*self.value.get()).write(value) };
        self.state.store(PUBLISHED, Ordering::Release);
        // SAFETY: just written.
        unsafe { self.published() }
    }

    /// # Safety
    /// The state must be PUBLISHED.
    unsafe fn published(&self) -> &T {
        unsafe { (*self.value.get()).assume_init_ref() }
    }
}

// SAFETY: the value is shared only after publication and written once.
unsafe impl<T: Sync> Sync for SyncOnceCell<T> {}
unsafe impl<T: Send> Send for SyncOnceCell<T> {}

impl<T> Drop for SyncOnceCell<T> {
    fn drop(&mut self) {
        if *self.state.get_mut() == PUBLISHED {
            // SAFETY: published values are initialized and never moved out.
            unsafe { self.value.get_mut().assume_init_drop() };
        }
    }
}
