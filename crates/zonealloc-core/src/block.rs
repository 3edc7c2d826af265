//! Block layer: the free/used unit inside a zone.
//!
//! A block is a fixed-layout header followed immediately by its payload.
//! Inside a zone, blocks are contiguous: `next` always equals
//! `self + HEADER_SIZE + size` except for the zone's last block, whose
//! `next` is null. Large allocations reuse the same header at the start of
//! their dedicated mapping, linked through `next` into the large registry
//! instead of a zone.
//!
//! The header layout is a wire contract for tools inspecting raw memory:
//! payload size, free flag, forward link, allocation timestamp, magic.

use std::ptr::{self, NonNull};

use crate::size_class::ALIGNMENT;

/// Canary written into every header; validated in debug builds before a
/// user-supplied pointer is trusted.
pub const BLOCK_MAGIC: u64 = 0x5A4F_4E45_424C_4B30; // "ZONEBLK0"

/// Allocation header preceding every payload.
///
/// `align(16)` pads the struct to a 16-byte multiple so payloads stay
/// 16-byte aligned whenever the header itself starts on a 16-byte boundary.
#[repr(C, align(16))]
#[derive(Debug)]
pub struct BlockHeader {
    /// Payload bytes (always a multiple of 16).
    pub size: usize,
    /// Whether the payload is currently free.
    pub is_free: bool,
    /// Next block in the same zone (contiguous), or next large allocation
    /// in the registry. Null terminates either list.
    pub next: *mut BlockHeader,
    /// Unix timestamp of the last allocation of this block; 0 when never
    /// allocated. Introspection only.
    pub alloc_time: i64,
    /// Header canary, [`BLOCK_MAGIC`] for any header this allocator wrote.
    pub magic: u64,
}

/// Header size in bytes; a 16-byte multiple by construction.
pub const HEADER_SIZE: usize = size_of::<BlockHeader>();

const _: () = assert!(HEADER_SIZE % ALIGNMENT == 0);

/// Current unix time in seconds, for allocation timestamps.
#[must_use]
pub fn unix_now() -> i64 {
    // SAFETY: time(NULL) has no preconditions.
    unsafe { libc::time(ptr::null_mut()) as i64 }
}

/// Writes a fresh header at `block`.
///
/// # Safety
///
/// `block` must be 16-byte aligned and valid for `HEADER_SIZE` writes.
pub unsafe fn init(block: *mut BlockHeader, size: usize, is_free: bool, next: *mut BlockHeader) {
    // SAFETY: caller guarantees block is writable for a full header.
    unsafe {
        (*block).size = size;
        (*block).is_free = is_free;
        (*block).next = next;
        (*block).alloc_time = 0;
        (*block).magic = BLOCK_MAGIC;
    }
}

/// Payload pointer for a block header.
///
/// # Safety
///
/// `block` must point to a live header.
#[must_use]
pub unsafe fn payload(block: *mut BlockHeader) -> NonNull<u8> {
    // SAFETY: the payload starts immediately after the header; caller
    // guarantees the header is live, so the payload address is in-bounds.
    unsafe { NonNull::new_unchecked(block.cast::<u8>().add(HEADER_SIZE)) }
}

/// Recovers the header from a user payload pointer.
///
/// # Safety
///
/// `ptr` must have been returned by this allocator; anything else is
/// undefined behavior. Debug builds additionally trip on a bad magic at
/// the use sites.
#[must_use]
pub unsafe fn from_payload(ptr: *mut u8) -> *mut BlockHeader {
    // SAFETY: caller guarantees ptr sits HEADER_SIZE bytes past a header.
    unsafe { ptr.sub(HEADER_SIZE).cast::<BlockHeader>() }
}

/// First-fit scan over a block list starting at `first`.
///
/// Returns the first free block with `size >= needed`, or null.
///
/// # Safety
///
/// `first` must be null or the head of a well-formed block list.
#[must_use]
pub unsafe fn find_free_block(first: *mut BlockHeader, needed: usize) -> *mut BlockHeader {
    let mut current = first;
    while !current.is_null() {
        // SAFETY: list links only reach live headers.
        unsafe {
            if (*current).is_free && (*current).size >= needed {
                return current;
            }
            current = (*current).next;
        }
    }
    ptr::null_mut()
}

/// Splits `block` so it holds exactly `size` payload bytes, carving the
/// remainder into a new trailing free block, and marks `block` used.
///
/// Returns `false` without touching anything when the remainder could not
/// host a header plus one alignment unit; the caller then hands out the
/// whole block (internal fragmentation accepted).
///
/// # Safety
///
/// `block` must be a live, free block whose payload spans its full `size`,
/// and `size` must be 16-byte aligned.
pub unsafe fn split_block(block: *mut BlockHeader, size: usize) -> bool {
    // SAFETY: caller guarantees block is a live header.
    unsafe {
        if (*block).size < size + HEADER_SIZE + ALIGNMENT {
            return false;
        }
        let remainder = (*block).size - size - HEADER_SIZE;
        let new_block = block.cast::<u8>().add(HEADER_SIZE + size).cast::<BlockHeader>();
        init(new_block, remainder, true, (*block).next);

        (*block).size = size;
        (*block).is_free = false;
        (*block).next = new_block;
        true
    }
}

/// Coalesces `block` with its immediate successor if that successor is
/// free. Strictly single-step: callers needing multi-step coalescing (the
/// defragmentation sweep) loop explicitly.
///
/// Returns `true` if a merge happened.
///
/// # Safety
///
/// `block` must be a live block inside a zone; large-registry headers have
/// non-contiguous `next` links and must never be passed here.
pub unsafe fn merge_next(block: *mut BlockHeader) -> bool {
    // SAFETY: caller guarantees block is a live zone block; contiguity makes
    // absorbing next's header and payload into this block's payload valid.
    unsafe {
        let next = (*block).next;
        if next.is_null() || !(*next).is_free {
            return false;
        }
        (*block).size += HEADER_SIZE + (*next).size;
        (*block).next = (*next).next;
        true
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    /// 16-aligned scratch buffer standing in for zone memory.
    #[repr(align(16))]
    struct Scratch([u8; 4096]);

    fn scratch() -> Box<Scratch> {
        Box::new(Scratch([0; 4096]))
    }

    /// Lays out one giant free block over the whole scratch buffer.
    unsafe fn giant_block(buf: &mut Scratch) -> *mut BlockHeader {
        let block = buf.0.as_mut_ptr().cast::<BlockHeader>();
        unsafe {
            init(block, buf.0.len() - HEADER_SIZE, true, ptr::null_mut());
        }
        block
    }

    #[test]
    fn header_is_aligned_multiple() {
        assert_eq!(HEADER_SIZE % ALIGNMENT, 0);
        assert_eq!(align_of::<BlockHeader>(), 16);
    }

    #[test]
    fn payload_round_trips_through_header() {
        let mut buf = scratch();
        unsafe {
            let block = giant_block(&mut buf);
            let p = payload(block);
            assert_eq!(p.as_ptr() as usize, block as usize + HEADER_SIZE);
            assert_eq!(from_payload(p.as_ptr()), block);
            assert_eq!((*block).magic, BLOCK_MAGIC);
        }
    }

    #[test]
    fn split_preserves_contiguity() {
        let mut buf = scratch();
        unsafe {
            let block = giant_block(&mut buf);
            let total = (*block).size;
            assert!(split_block(block, 64));

            assert_eq!((*block).size, 64);
            assert!(!(*block).is_free);
            let tail = (*block).next;
            assert!(!tail.is_null());
            assert_eq!(
                tail as usize,
                block as usize + HEADER_SIZE + 64,
                "split tail must start exactly after the carved payload"
            );
            assert!((*tail).is_free);
            assert_eq!((*tail).size, total - 64 - HEADER_SIZE);
            assert!((*tail).next.is_null());
        }
    }

    #[test]
    fn split_refuses_tiny_remainder() {
        let mut buf = scratch();
        unsafe {
            let block = giant_block(&mut buf);
            let size = (*block).size;
            // Remainder would be smaller than a header plus one alignment
            // unit; the whole block is handed out instead.
            assert!(!split_block(block, size - HEADER_SIZE));
            assert_eq!((*block).size, size);
            assert!((*block).is_free, "failed split must leave the block untouched");
        }
    }

    #[test]
    fn split_boundary_is_inclusive() {
        let mut buf = scratch();
        unsafe {
            let block = giant_block(&mut buf);
            let size = (*block).size - HEADER_SIZE - ALIGNMENT;
            assert!(split_block(block, size));
            assert_eq!((*(*block).next).size, ALIGNMENT);
        }
    }

    #[test]
    fn merge_absorbs_next_header_and_payload() {
        let mut buf = scratch();
        unsafe {
            let block = giant_block(&mut buf);
            let total = (*block).size;
            assert!(split_block(block, 128));
            (*block).is_free = true;

            assert!(merge_next(block));
            assert_eq!((*block).size, total, "merge must restore the original span");
            assert!((*block).next.is_null());
        }
    }

    #[test]
    fn merge_is_single_step() {
        let mut buf = scratch();
        unsafe {
            let block = giant_block(&mut buf);
            assert!(split_block(block, 64));
            let second = (*block).next;
            assert!(split_block(second, 64));
            let third = (*second).next;
            (*second).is_free = true;
            (*third).is_free = true;
            (*block).is_free = true;

            // One call merges block+second only; third needs a second call.
            assert!(merge_next(block));
            assert_eq!((*block).next, third);
            assert!(merge_next(block));
            assert!((*block).next.is_null());
        }
    }

    #[test]
    fn merge_skips_used_successor() {
        let mut buf = scratch();
        unsafe {
            let block = giant_block(&mut buf);
            assert!(split_block(block, 64));
            (*block).is_free = true;
            // Successor is free here; flip it used and verify no merge.
            (*(*block).next).is_free = false;
            assert!(!merge_next(block));
            assert_eq!((*block).size, 64);
        }
    }

    #[test]
    fn find_free_block_is_first_fit() {
        let mut buf = scratch();
        unsafe {
            let block = giant_block(&mut buf);
            assert!(split_block(block, 64));
            let second = (*block).next;
            assert!(split_block(second, 256));
            let third = (*second).next;
            (*second).is_free = true;
            (*third).is_free = true;

            // block is used; second (256) is the first fit for 128 even
            // though third is larger.
            assert_eq!(find_free_block(block, 128), second);
            assert_eq!(find_free_block(block, 512), third);
            assert!(find_free_block(block, 1 << 20).is_null());
        }
    }
}
