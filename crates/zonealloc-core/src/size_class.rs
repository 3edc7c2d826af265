//! Size classes and alignment.
//!
//! The allocator routes every request into one of three classes:
//! - Tiny: up to 512 bytes, served from 4-page zones
//! - Small: up to 4096 bytes, served from 32-page zones
//! - Large: everything above, one dedicated mapping per allocation
//!
//! All payload sizes are rounded up to a 16-byte boundary before routing, so
//! class ceilings apply to the aligned size.

use std::sync::atomic::{AtomicUsize, Ordering};

/// Payload alignment in bytes. Every returned pointer and every block size
/// is a multiple of this.
pub const ALIGNMENT: usize = 16;

/// Maximum aligned payload size served from tiny zones.
pub const TINY_MAX: usize = 512;

/// Maximum aligned payload size served from small zones. Above this, the
/// large-allocation path takes over.
pub const SMALL_MAX: usize = 4096;

/// Tiny zone mapping length, in pages.
pub const TINY_ZONE_PAGES: usize = 4;

/// Small zone mapping length, in pages.
pub const SMALL_ZONE_PAGES: usize = 32;

/// Rounds a size up to the nearest 16-byte boundary.
#[must_use]
pub const fn align16(size: usize) -> usize {
    (size + ALIGNMENT - 1) & !(ALIGNMENT - 1)
}

// 0 means "not queried yet"; the page size never changes within a process.
static PAGE_SIZE: AtomicUsize = AtomicUsize::new(0);

/// Returns the OS page size, queried once via `sysconf` and cached.
#[must_use]
pub fn page_size() -> usize {
    let cached = PAGE_SIZE.load(Ordering::Relaxed);
    if cached != 0 {
        return cached;
    }
    // SAFETY: sysconf(_SC_PAGESIZE) has no preconditions.
    let raw = unsafe { libc::sysconf(libc::_SC_PAGESIZE) };
    let page = if raw > 0 { raw as usize } else { 4096 };
    PAGE_SIZE.store(page, Ordering::Relaxed);
    page
}

/// Routing decision for an aligned request size.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SizeClass {
    /// Served from the tiny zone chain.
    Tiny,
    /// Served from the small zone chain.
    Small,
    /// Served by a dedicated mapping.
    Large,
}

impl SizeClass {
    /// Classifies an aligned payload size.
    #[must_use]
    pub const fn classify(size: usize) -> Self {
        if size <= TINY_MAX {
            Self::Tiny
        } else if size <= SMALL_MAX {
            Self::Small
        } else {
            Self::Large
        }
    }

    /// Mapping length for a fresh zone of this class, or `None` for large
    /// allocations (which size their mapping per request).
    #[must_use]
    pub fn zone_size(self) -> Option<usize> {
        match self {
            Self::Tiny => Some(TINY_ZONE_PAGES * page_size()),
            Self::Small => Some(SMALL_ZONE_PAGES * page_size()),
            Self::Large => None,
        }
    }

    /// Display label used by the introspection report.
    #[must_use]
    pub const fn label(self) -> &'static str {
        match self {
            Self::Tiny => "TINY",
            Self::Small => "SMALL",
            Self::Large => "LARGE",
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn align16_rounds_up() {
        assert_eq!(align16(1), 16);
        assert_eq!(align16(16), 16);
        assert_eq!(align16(17), 32);
        assert_eq!(align16(0), 0);
        assert_eq!(align16(511), 512);
    }

    #[test]
    fn classify_boundaries() {
        assert_eq!(SizeClass::classify(1), SizeClass::Tiny);
        assert_eq!(SizeClass::classify(TINY_MAX), SizeClass::Tiny);
        assert_eq!(SizeClass::classify(TINY_MAX + 1), SizeClass::Small);
        assert_eq!(SizeClass::classify(SMALL_MAX), SizeClass::Small);
        assert_eq!(SizeClass::classify(SMALL_MAX + 1), SizeClass::Large);
    }

    #[test]
    fn zone_sizes_are_page_multiples() {
        let page = page_size();
        assert_eq!(SizeClass::Tiny.zone_size(), Some(4 * page));
        assert_eq!(SizeClass::Small.zone_size(), Some(32 * page));
        assert_eq!(SizeClass::Large.zone_size(), None);
    }

    #[test]
    fn zone_fits_class_ceiling() {
        // A fresh zone must always satisfy the largest request of its class,
        // even after zone-header and block-header overhead.
        let page = page_size();
        assert!(TINY_ZONE_PAGES * page > TINY_MAX + 4 * ALIGNMENT + 64);
        assert!(SMALL_ZONE_PAGES * page > SMALL_MAX + 4 * ALIGNMENT + 64);
    }
}
