//! Instrumentation hooks: scribbling, guard checking, defragmentation.
//!
//! Every hook observes allocation/free events from inside the heap lock and
//! must not disturb allocator invariants: scribbles touch payload bytes
//! only, and the defragmentation sweep uses the same single-step merge
//! primitive as the release path, just applied repeatedly.

use crate::block::{self, BlockHeader};
use crate::config::DebugFlags;
use crate::zone::{ZoneHeader, ZoneIter};

/// Sentinel byte written into fresh allocations (`MALLOC_PRE_SCRIBBLE`).
pub const SCRIBBLE_ALLOC: u8 = 0xAA;

/// Sentinel byte written into released payloads (`MALLOC_SCRIBBLE`).
pub const SCRIBBLE_FREE: u8 = 0xDE;

/// Fills `size` payload bytes at `ptr` with `pattern`.
///
/// # Safety
///
/// `ptr` must be valid for `size` writes.
pub unsafe fn scribble_memory(ptr: *mut u8, size: usize, pattern: u8) {
    if ptr.is_null() || size == 0 {
        return;
    }
    // SAFETY: caller guarantees the payload range is writable.
    unsafe {
        std::ptr::write_bytes(ptr, pattern, size);
    }
}

/// Guard-byte check hook, invoked around release.
///
/// Extension point only: the design reserves `MALLOC_GUARD` without
/// enforcing any guard semantics yet.
pub fn check_guards(_ptr: *const u8, flags: &DebugFlags) {
    if !flags.guard {
        return;
    }
    // TODO: wire trailing guard bytes here once the guard layout is
    // settled; until then the flag is accepted and ignored.
}

/// Multi-step forward coalescing over one zone chain.
///
/// At each position the single-step merge is applied repeatedly while the
/// successor is free, so runs of free blocks collapse into one.
///
/// # Safety
///
/// `head` must be null or a valid zone chain head, with the heap lock held.
pub unsafe fn defragment_chain(head: *mut ZoneHeader) {
    // SAFETY: chain and block links are valid under the heap lock.
    unsafe {
        for zone in ZoneIter::new(head) {
            let mut current: *mut BlockHeader = (*zone).blocks;
            while !current.is_null() {
                if (*current).is_free && block::merge_next(current) {
                    // Stay on this block; the new successor may be free too.
                    continue;
                }
                current = (*current).next;
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::block::HEADER_SIZE;
    use crate::size_class::SizeClass;
    use crate::zone::{self, allocate_from_zone};
    use std::ptr;

    #[test]
    fn scribble_fills_payload() {
        let mut buf = [0u8; 64];
        unsafe {
            scribble_memory(buf.as_mut_ptr(), 64, SCRIBBLE_FREE);
        }
        assert!(buf.iter().all(|&b| b == 0xDE));
        // Null and zero-size are no-ops.
        unsafe {
            scribble_memory(ptr::null_mut(), 64, SCRIBBLE_FREE);
            scribble_memory(buf.as_mut_ptr(), 0, SCRIBBLE_ALLOC);
        }
    }

    #[test]
    fn defragment_collapses_free_runs() {
        let mut chain: *mut zone::ZoneHeader = ptr::null_mut();
        let zone_size = SizeClass::Tiny.zone_size().expect("tiny zone size");
        unsafe {
            let p1 = allocate_from_zone(&mut chain, 64, zone_size).expect("alloc");
            let p2 = allocate_from_zone(&mut chain, 64, zone_size).expect("alloc");
            let p3 = allocate_from_zone(&mut chain, 64, zone_size).expect("alloc");
            let _guard_alloc = allocate_from_zone(&mut chain, 64, zone_size).expect("alloc");

            for p in [p1, p2, p3] {
                (*block::from_payload(p.as_ptr())).is_free = true;
            }

            defragment_chain(chain);

            // Three 64-byte blocks plus two absorbed headers become one.
            let merged = block::from_payload(p1.as_ptr());
            assert!((*merged).is_free);
            assert_eq!((*merged).size, 3 * 64 + 2 * HEADER_SIZE);
        }
    }

    #[test]
    fn defragment_keeps_used_blocks() {
        let mut chain: *mut zone::ZoneHeader = ptr::null_mut();
        let zone_size = SizeClass::Tiny.zone_size().expect("tiny zone size");
        unsafe {
            let p1 = allocate_from_zone(&mut chain, 64, zone_size).expect("alloc");
            let p2 = allocate_from_zone(&mut chain, 64, zone_size).expect("alloc");
            let p3 = allocate_from_zone(&mut chain, 64, zone_size).expect("alloc");

            (*block::from_payload(p1.as_ptr())).is_free = true;
            (*block::from_payload(p3.as_ptr())).is_free = true;

            defragment_chain(chain);

            // The used middle block blocks coalescing across it.
            assert_eq!((*block::from_payload(p1.as_ptr())).size, 64);
            assert!(!(*block::from_payload(p2.as_ptr())).is_free);
        }
    }
}
