//! Thin wrappers over the anonymous-mapping syscalls.
//!
//! These are the only routes through which the allocator obtains or returns
//! memory; nothing in this crate goes through another allocator.

use std::ptr::{self, NonNull};

use crate::error::MapError;

fn last_errno() -> i32 {
    std::io::Error::last_os_error().raw_os_error().unwrap_or(0)
}

/// Maps `len` bytes of zeroed, private, anonymous memory.
///
/// The returned pointer is page-aligned.
pub fn map_anonymous(len: usize) -> Result<NonNull<u8>, MapError> {
    // SAFETY: anonymous private mapping with no address hint has no
    // preconditions; the result is checked against MAP_FAILED.
    let raw = unsafe {
        libc::mmap(
            ptr::null_mut(),
            len,
            libc::PROT_READ | libc::PROT_WRITE,
            libc::MAP_PRIVATE | libc::MAP_ANONYMOUS,
            -1,
            0,
        )
    };
    if raw == libc::MAP_FAILED {
        return Err(MapError::Map {
            len,
            errno: last_errno(),
        });
    }
    NonNull::new(raw.cast::<u8>()).ok_or(MapError::Map {
        len,
        errno: last_errno(),
    })
}

/// Unmaps a region previously obtained from [`map_anonymous`] or
/// [`remap`].
///
/// # Safety
///
/// `ptr` must be the start of a live mapping of exactly `len` bytes, and no
/// reference into the region may be used afterwards.
pub unsafe fn unmap(ptr: *mut u8, len: usize) -> Result<(), MapError> {
    // SAFETY: caller guarantees ptr/len describe a live mapping.
    let rc = unsafe { libc::munmap(ptr.cast(), len) };
    if rc == 0 {
        Ok(())
    } else {
        Err(MapError::Unmap {
            len,
            errno: last_errno(),
        })
    }
}

/// Grows (or shrinks) a mapping in place, moving it if the kernel cannot
/// extend it at its current address.
///
/// # Safety
///
/// `ptr` must be the start of a live mapping of exactly `old_len` bytes. On
/// success the old pointer is invalid if the region moved.
#[cfg(target_os = "linux")]
pub unsafe fn remap(ptr: *mut u8, old_len: usize, new_len: usize) -> Result<NonNull<u8>, MapError> {
    // SAFETY: caller guarantees ptr/old_len describe a live mapping.
    let raw = unsafe { libc::mremap(ptr.cast(), old_len, new_len, libc::MREMAP_MAYMOVE) };
    if raw == libc::MAP_FAILED {
        return Err(MapError::Remap {
            new_len,
            errno: last_errno(),
        });
    }
    NonNull::new(raw.cast::<u8>()).ok_or(MapError::Remap {
        new_len,
        errno: last_errno(),
    })
}

/// `mremap` is Linux-only; elsewhere large-object growth always takes the
/// allocate/copy/release fallback.
#[cfg(not(target_os = "linux"))]
pub unsafe fn remap(
    _ptr: *mut u8,
    _old_len: usize,
    new_len: usize,
) -> Result<NonNull<u8>, MapError> {
    Err(MapError::Remap {
        new_len,
        errno: libc::ENOSYS,
    })
}
