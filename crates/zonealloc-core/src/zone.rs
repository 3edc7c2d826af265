//! Zone manager: page-mapped regions subdivided into blocks.
//!
//! Each bounded size class (tiny, small) owns a singly linked chain of
//! zones. New zones are prepended, so the newest zone is scanned first;
//! this ordering is part of the observable allocation behavior and is kept
//! as-is. Zones are never returned to the OS once created — a documented
//! limitation of this design.

use std::ptr::{self, NonNull};

use crate::block::{self, BlockHeader, HEADER_SIZE};
use crate::error::MapError;
use crate::mmap;
use crate::size_class::{ALIGNMENT, align16};

/// Zone header at the start of every zone mapping.
#[repr(C)]
#[derive(Debug)]
pub struct ZoneHeader {
    /// Whole mapping length in bytes, including this header.
    pub size: usize,
    /// Next zone in the chain; newest zone is the chain head.
    pub next: *mut ZoneHeader,
    /// First block of the zone.
    pub blocks: *mut BlockHeader,
}

/// Zone header size in bytes.
pub const ZONE_HEADER_SIZE: usize = size_of::<ZoneHeader>();

/// Maps a fresh zone of `zone_size` bytes and carves it into one giant
/// free block spanning all usable space after the zone header and its
/// alignment padding.
pub fn create_zone(zone_size: usize) -> Result<*mut ZoneHeader, MapError> {
    let mapping = mmap::map_anonymous(zone_size)?;
    let zone = mapping.as_ptr().cast::<ZoneHeader>();

    // SAFETY: the mapping is page-aligned and zone_size bytes long, large
    // enough for the zone header, one block header, and payload space.
    unsafe {
        let first = align16(zone as usize + ZONE_HEADER_SIZE) as *mut BlockHeader;
        let used = first as usize - zone as usize;
        block::init(first, zone_size - used - HEADER_SIZE, true, ptr::null_mut());

        (*zone).size = zone_size;
        (*zone).next = ptr::null_mut();
        (*zone).blocks = first;
    }
    Ok(zone)
}

/// Serves `size` aligned payload bytes from the zone chain rooted at
/// `chain`, creating and prepending a fresh `zone_size` zone when no
/// existing block fits.
///
/// First-fit: every zone's block list is scanned in chain order (newest
/// zone first) and the first free block large enough wins. The winning
/// block is split when the remainder can host another header plus one
/// alignment unit, marked used, and timestamped.
///
/// # Safety
///
/// `chain` must point at a valid chain head (possibly null) for the size
/// class matching `zone_size`, and `size` must be 16-byte aligned and no
/// larger than the class ceiling.
pub unsafe fn allocate_from_zone(
    chain: &mut *mut ZoneHeader,
    size: usize,
    zone_size: usize,
) -> Result<NonNull<u8>, MapError> {
    if chain.is_null() {
        *chain = create_zone(zone_size)?;
    }

    // SAFETY: chain links only reach live zone headers.
    unsafe {
        let mut zone = *chain;
        while !zone.is_null() {
            let found = block::find_free_block((*zone).blocks, size);
            if !found.is_null() {
                return Ok(take_block(found, size));
            }
            zone = (*zone).next;
        }
    }

    // Nothing fits anywhere; grow the chain. The fresh zone's single block
    // is guaranteed to fit since zone_size exceeds the class ceiling.
    let new_zone = create_zone(zone_size)?;
    // SAFETY: new_zone was just initialized with one giant free block.
    unsafe {
        (*new_zone).next = *chain;
        *chain = new_zone;
        Ok(take_block((*new_zone).blocks, size))
    }
}

/// Marks `found` used (splitting first when worthwhile), stamps the
/// allocation time, and returns its payload.
///
/// # Safety
///
/// `found` must be a live free block with `size <= found.size`.
unsafe fn take_block(found: *mut BlockHeader, size: usize) -> NonNull<u8> {
    // SAFETY: caller guarantees found is a live free block that fits.
    unsafe {
        if !block::split_block(found, size) {
            // Remainder too small for a header; hand out the whole block
            // with its full size.
            (*found).is_free = false;
        }
        (*found).alloc_time = block::unix_now();
        block::payload(found)
    }
}

/// Iterator over a zone chain.
pub struct ZoneIter {
    current: *mut ZoneHeader,
}

impl ZoneIter {
    /// # Safety
    ///
    /// `head` must be null or a valid chain head whose zones outlive the
    /// iterator.
    #[must_use]
    pub unsafe fn new(head: *mut ZoneHeader) -> Self {
        Self { current: head }
    }
}

impl Iterator for ZoneIter {
    type Item = *mut ZoneHeader;

    fn next(&mut self) -> Option<*mut ZoneHeader> {
        if self.current.is_null() {
            return None;
        }
        let zone = self.current;
        // SAFETY: construction contract keeps chain links valid.
        self.current = unsafe { (*zone).next };
        Some(zone)
    }
}

/// Iterator over a block list.
pub struct BlockIter {
    current: *mut BlockHeader,
}

impl BlockIter {
    /// # Safety
    ///
    /// `first` must be null or a valid list head whose blocks outlive the
    /// iterator.
    #[must_use]
    pub unsafe fn new(first: *mut BlockHeader) -> Self {
        Self { current: first }
    }
}

impl Iterator for BlockIter {
    type Item = *mut BlockHeader;

    fn next(&mut self) -> Option<*mut BlockHeader> {
        if self.current.is_null() {
            return None;
        }
        let blk = self.current;
        // SAFETY: construction contract keeps list links valid.
        self.current = unsafe { (*blk).next };
        Some(blk)
    }
}

/// Checks whether `block` belongs to any zone of `head`'s chain. Used by
/// debug assertions and tests; the hot paths never need it.
///
/// # Safety
///
/// `head` must be null or a valid chain head.
#[must_use]
pub unsafe fn chain_contains(head: *mut ZoneHeader, block: *mut BlockHeader) -> bool {
    // SAFETY: iterators only follow valid links per the caller contract.
    unsafe {
        for zone in ZoneIter::new(head) {
            if BlockIter::new((*zone).blocks).any(|b| b == block) {
                return true;
            }
        }
    }
    false
}
