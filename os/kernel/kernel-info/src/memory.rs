//! # Memory Layout

use kernel_memory_addresses::PAGE_SIZE;

/// End of the user VA range; kernel space begins here.
pub const USERSPACE_END: u64 = 0x8000_0000;

/// Top of every user stack. The stack grows downward from here.
pub const USER_STACK_TOP: u64 = USERSPACE_END;

/// Number of pages a user stack may span below [`USER_STACK_TOP`].
pub const USER_STACK_PAGES: usize = 18;

/// Lowest address of the user stack window.
pub const USER_STACK_BOTTOM: u64 = USER_STACK_TOP - USER_STACK_PAGES as u64 * PAGE_SIZE;

/// Base of the direct-mapped kernel window.
///
/// Physical address `pa` is visible to the kernel at `DIRECT_MAP_BASE + pa`.
pub const DIRECT_MAP_BASE: u64 = 0x8000_0000;

/// Amount of physical memory reachable through the direct map.
pub const DIRECT_MAP_SIZE: u64 = 0x2000_0000; // 512 MiB

/// Number of entries in the translation cache.
pub const TLB_SLOTS: usize = 64;

const _: () = {
    assert!(USERSPACE_END.is_multiple_of(PAGE_SIZE));
    assert!(USER_STACK_BOTTOM.is_multiple_of(PAGE_SIZE));
    assert!(USER_STACK_BOTTOM < USER_STACK_TOP);
    assert!(DIRECT_MAP_BASE >= USERSPACE_END);
    assert!(DIRECT_MAP_SIZE.is_multiple_of(PAGE_SIZE));
    assert!(TLB_SLOTS > 0);
};
