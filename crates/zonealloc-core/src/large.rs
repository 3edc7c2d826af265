//! Large object manager: one dedicated mapping per oversized allocation.
//!
//! A large allocation is a [`BlockHeader`] at the start of its own mapping,
//! and the mapping length is always exactly `HEADER_SIZE + size`. Release
//! and resize recompute the mapping length purely from the header, so no
//! slack is ever tolerated. Headers are linked LIFO into a flat registry
//! through the same `next` field zone blocks use; the registry has no
//! back-links, so unlinking is an O(n) scan.

use std::ptr::NonNull;

use crate::block::{self, BlockHeader, HEADER_SIZE};
use crate::error::MapError;
use crate::mmap;

/// Maps `HEADER_SIZE + size` bytes for a new large object and prepends it
/// to the registry.
///
/// # Safety
///
/// `head` must point at the current registry head (possibly null).
pub unsafe fn allocate_large(
    head: &mut *mut BlockHeader,
    size: usize,
) -> Result<NonNull<u8>, MapError> {
    let total = HEADER_SIZE + size;
    let mapping = mmap::map_anonymous(total)?;
    let blk = mapping.as_ptr().cast::<BlockHeader>();

    // SAFETY: the fresh mapping is big enough for a header and page-aligned.
    unsafe {
        block::init(blk, size, false, *head);
        (*blk).alloc_time = block::unix_now();
        *head = blk;
        Ok(block::payload(blk))
    }
}

/// Whether `blk` is currently registered as a large object.
///
/// # Safety
///
/// `head` must be null or the registry head. `blk` is only compared by
/// address, never dereferenced.
#[must_use]
pub unsafe fn is_large(head: *mut BlockHeader, blk: *mut BlockHeader) -> bool {
    let mut current = head;
    while !current.is_null() {
        if current == blk {
            return true;
        }
        // SAFETY: registry links only reach live large headers.
        current = unsafe { (*current).next };
    }
    false
}

/// Unlinks `blk` from the registry and unmaps exactly `HEADER_SIZE +
/// blk.size` bytes.
///
/// Returns the payload size when `blk` was registered, `None` when it was
/// not (the caller then treats the pointer as a zone block). Unmap failure
/// is best-effort: the entry is gone from the registry either way, and the
/// allocator never aborts the process over it.
///
/// # Safety
///
/// `head` must point at the registry head. If `blk` is registered it must
/// not be used after this call.
pub unsafe fn release_large(head: &mut *mut BlockHeader, blk: *mut BlockHeader) -> Option<usize> {
    // SAFETY: registry links only reach live large headers; blk itself is
    // only dereferenced once found in the registry.
    unsafe {
        let mut prev: *mut BlockHeader = std::ptr::null_mut();
        let mut current = *head;
        while !current.is_null() && current != blk {
            prev = current;
            current = (*current).next;
        }
        if current.is_null() {
            return None;
        }

        if prev.is_null() {
            *head = (*current).next;
        } else {
            (*prev).next = (*current).next;
        }

        let size = (*current).size;
        let _ = mmap::unmap(current.cast::<u8>(), HEADER_SIZE + size);
        Some(size)
    }
}

/// Grows a registered large object in place via `mremap`, relinking the
/// registry entry when the kernel moved the mapping.
///
/// Returns the (possibly moved) payload pointer, or `None` when the remap
/// failed; the caller then falls back to allocate/copy/release.
///
/// # Safety
///
/// `blk` must be registered in `head`'s registry, and `new_size` must be
/// 16-byte aligned and larger than the current size.
pub unsafe fn try_grow(
    head: &mut *mut BlockHeader,
    blk: *mut BlockHeader,
    new_size: usize,
) -> Option<NonNull<u8>> {
    // SAFETY: blk is a registered large header, so its mapping is exactly
    // HEADER_SIZE + size bytes long.
    unsafe {
        let old_total = HEADER_SIZE + (*blk).size;
        let new_total = HEADER_SIZE + new_size;
        let moved = mmap::remap(blk.cast::<u8>(), old_total, new_total).ok()?;
        let new_blk = moved.as_ptr().cast::<BlockHeader>();

        if new_blk != blk {
            // The header moved with the mapping, links intact; only the
            // predecessor (or the head) still points at the old address.
            // The old address is compared, never dereferenced.
            let mut prev: *mut BlockHeader = std::ptr::null_mut();
            let mut current = *head;
            while !current.is_null() && current != blk {
                prev = current;
                current = (*current).next;
            }
            if prev.is_null() {
                *head = new_blk;
            } else {
                (*prev).next = new_blk;
            }
        }

        (*new_blk).size = new_size;
        Some(block::payload(new_blk))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::ptr;

    #[test]
    fn allocate_prepends_lifo() {
        let mut head: *mut BlockHeader = ptr::null_mut();
        unsafe {
            let p1 = allocate_large(&mut head, 8192).expect("large alloc");
            let p2 = allocate_large(&mut head, 16384).expect("large alloc");

            let b1 = block::from_payload(p1.as_ptr());
            let b2 = block::from_payload(p2.as_ptr());
            assert_eq!(head, b2, "newest allocation must be the registry head");
            assert_eq!((*b2).next, b1);
            assert!((*b1).next.is_null());
            assert!(!(*b1).is_free);
            assert_eq!((*b1).size, 8192);

            assert_eq!(release_large(&mut head, b2), Some(16384));
            assert_eq!(release_large(&mut head, b1), Some(8192));
            assert!(head.is_null());
        }
    }

    #[test]
    fn release_unlinks_middle_entry() {
        let mut head: *mut BlockHeader = ptr::null_mut();
        unsafe {
            let p1 = allocate_large(&mut head, 8192).expect("large alloc");
            let p2 = allocate_large(&mut head, 8192).expect("large alloc");
            let p3 = allocate_large(&mut head, 8192).expect("large alloc");

            let b1 = block::from_payload(p1.as_ptr());
            let b2 = block::from_payload(p2.as_ptr());
            let b3 = block::from_payload(p3.as_ptr());

            assert_eq!(release_large(&mut head, b2), Some(8192));
            assert_eq!(head, b3);
            assert_eq!((*b3).next, b1, "unlink must bridge over the removed entry");
            assert!(!is_large(head, b2));

            release_large(&mut head, b1);
            release_large(&mut head, b3);
        }
    }

    #[test]
    fn foreign_pointer_is_not_released() {
        let mut head: *mut BlockHeader = ptr::null_mut();
        unsafe {
            let p = allocate_large(&mut head, 8192).expect("large alloc");
            let blk = block::from_payload(p.as_ptr());
            assert_eq!(release_large(&mut head, 0x4000 as *mut BlockHeader), None);
            assert!(is_large(head, blk), "failed release must leave the registry intact");
            release_large(&mut head, blk);
        }
    }

    #[cfg(target_os = "linux")]
    #[test]
    fn grow_preserves_data_and_registry() {
        let mut head: *mut BlockHeader = ptr::null_mut();
        unsafe {
            let p1 = allocate_large(&mut head, 8192).expect("large alloc");
            let p2 = allocate_large(&mut head, 8192).expect("large alloc");
            ptr::write_bytes(p1.as_ptr(), 0x7E, 8192);

            let b1 = block::from_payload(p1.as_ptr());
            let grown = try_grow(&mut head, b1, 1 << 20).expect("mremap growth");
            let gb = block::from_payload(grown.as_ptr());

            assert_eq!((*gb).size, 1 << 20);
            assert_eq!(*grown.as_ptr(), 0x7E);
            assert_eq!(*grown.as_ptr().add(8191), 0x7E);
            assert!(is_large(head, gb), "grown block must stay registered");
            assert!(is_large(head, block::from_payload(p2.as_ptr())));

            release_large(&mut head, gb);
            release_large(&mut head, block::from_payload(p2.as_ptr()));
        }
    }
}
