//! Heap state and the public allocate/release/resize entry points.
//!
//! A [`Heap`] owns both zone chains, the large-object registry, the debug
//! configuration, and the event history, all behind one process-wide-style
//! mutex. Every public call takes the lock at entry and holds it across all
//! critical work: size routing, zone/block mutation, registry mutation, and
//! history writes. Heaps are explicit values so tests can run isolated
//! instances; [`Heap::global`] provides the process-wide default for
//! drop-in use.

use std::ptr::{self, NonNull};
use std::sync::OnceLock;

use parking_lot::{Mutex, MutexGuard};

use crate::block::{self, BlockHeader};
use crate::config::DebugFlags;
use crate::debug::{self, SCRIBBLE_ALLOC, SCRIBBLE_FREE};
use crate::history::HistoryRing;
use crate::large;
use crate::size_class::{ALIGNMENT, SMALL_MAX, SizeClass, align16};
use crate::zone::{self, ZoneHeader};

/// Largest request the size arithmetic can carry: anything bigger would
/// wrap when aligned up or when a header is added to the mapping length.
const MAX_REQUEST: usize = usize::MAX - block::HEADER_SIZE - ALIGNMENT;

/// Everything the heap lock protects.
pub(crate) struct HeapState {
    /// Tiny zone chain head (newest zone first).
    pub(crate) tiny: *mut ZoneHeader,
    /// Small zone chain head (newest zone first).
    pub(crate) small: *mut ZoneHeader,
    /// Large-object registry head (newest allocation first).
    pub(crate) large: *mut BlockHeader,
    /// Debug configuration, fixed at construction.
    pub(crate) debug: DebugFlags,
    /// Bounded allocate/release event ring.
    pub(crate) history: HistoryRing,
}

// SAFETY: the raw chain pointers are only dereferenced while the owning
// mutex is held, which serializes all access from any thread.
unsafe impl Send for HeapState {}

impl HeapState {
    fn with_flags(debug: DebugFlags) -> Self {
        Self {
            tiny: ptr::null_mut(),
            small: ptr::null_mut(),
            large: ptr::null_mut(),
            debug,
            history: HistoryRing::new(),
        }
    }

    /// Allocation core; `size` is already aligned and non-zero. Runs under
    /// the heap lock.
    fn allocate_locked(&mut self, size: usize) -> Option<NonNull<u8>> {
        let payload = match SizeClass::classify(size) {
            SizeClass::Tiny => {
                let zone_size = SizeClass::Tiny.zone_size()?;
                // SAFETY: lock held; tiny is the tiny chain head.
                unsafe { zone::allocate_from_zone(&mut self.tiny, size, zone_size).ok()? }
            }
            SizeClass::Small => {
                let zone_size = SizeClass::Small.zone_size()?;
                // SAFETY: lock held; small is the small chain head.
                unsafe { zone::allocate_from_zone(&mut self.small, size, zone_size).ok()? }
            }
            // SAFETY: lock held; large is the registry head.
            SizeClass::Large => unsafe { large::allocate_large(&mut self.large, size).ok()? },
        };

        if self.debug.pre_scribble {
            // SAFETY: payload spans `size` freshly allocated bytes.
            unsafe {
                debug::scribble_memory(payload.as_ptr(), size, SCRIBBLE_ALLOC);
            }
        }
        if self.debug.stack_logging {
            self.history
                .record(payload.as_ptr() as usize, size, block::unix_now(), false);
        }
        Some(payload)
    }

    /// Release core. Runs under the heap lock.
    ///
    /// The large registry is checked first: large headers are never linked
    /// into any zone's block chain, so the generic path must not see them.
    fn release_locked(&mut self, payload: NonNull<u8>) {
        // SAFETY: the contract of release requires payload to originate
        // from this allocator; the header sits HEADER_SIZE bytes before it.
        unsafe {
            let blk = block::from_payload(payload.as_ptr());
            debug_assert_eq!(
                (*blk).magic,
                block::BLOCK_MAGIC,
                "release of a pointer this allocator never returned"
            );

            if large::is_large(self.large, blk) {
                let size = (*blk).size;
                if self.debug.stack_logging {
                    self.history
                        .record(payload.as_ptr() as usize, size, block::unix_now(), true);
                }
                // Unmaps exactly HEADER_SIZE + size; the memory goes back
                // to the OS, so it is never scribbled.
                large::release_large(&mut self.large, blk);
                return;
            }

            debug::check_guards(payload.as_ptr(), &self.debug);
            let size = (*blk).size;
            if self.debug.scribble {
                debug::scribble_memory(payload.as_ptr(), size, SCRIBBLE_FREE);
            }
            if self.debug.stack_logging {
                self.history
                    .record(payload.as_ptr() as usize, size, block::unix_now(), true);
            }
            (*blk).is_free = true;
            block::merge_next(blk);
        }
    }
}

/// A complete allocator instance: zone chains, large registry, debug
/// configuration, history, and the lock guarding them.
pub struct Heap {
    inner: Mutex<HeapState>,
}

impl Heap {
    /// Creates a heap, reading debug flags from the environment once.
    #[must_use]
    pub fn new() -> Self {
        Self::with_flags(DebugFlags::from_env())
    }

    /// Creates a heap with explicit flags; used by tests to exercise
    /// instrumentation without touching the process environment.
    #[must_use]
    pub fn with_flags(flags: DebugFlags) -> Self {
        Self {
            inner: Mutex::new(HeapState::with_flags(flags)),
        }
    }

    /// The process-wide default heap, initialized on first use.
    pub fn global() -> &'static Heap {
        static GLOBAL: OnceLock<Heap> = OnceLock::new();
        GLOBAL.get_or_init(Heap::new)
    }

    pub(crate) fn lock(&self) -> MutexGuard<'_, HeapState> {
        self.inner.lock()
    }

    /// Allocates at least `size` usable bytes, 16-byte aligned.
    ///
    /// Zero-size requests, requests beyond [`MAX_REQUEST`], and OS mapping
    /// failures all return `None`.
    pub fn allocate(&self, size: usize) -> Option<NonNull<u8>> {
        if size == 0 || size > MAX_REQUEST {
            return None;
        }
        let size = align16(size);
        self.lock().allocate_locked(size)
    }

    /// Releases an allocation. `None` is a no-op.
    ///
    /// Passing a pointer this allocator did not return is undefined
    /// behavior by contract; debug builds trap on the header canary.
    pub fn release(&self, payload: Option<NonNull<u8>>) {
        let Some(payload) = payload else {
            return;
        };
        self.lock().release_locked(payload);
    }

    /// Resizes an allocation.
    ///
    /// `None` pointer behaves as `allocate(new_size)`; `new_size == 0`
    /// behaves as `release` and returns `None`. Shrinking never reduces
    /// capacity or moves data. Growth tries `mremap` for large objects
    /// staying large, then falls back to allocate/copy/release.
    pub fn resize(&self, payload: Option<NonNull<u8>>, new_size: usize) -> Option<NonNull<u8>> {
        let Some(payload) = payload else {
            return self.allocate(new_size);
        };
        if new_size == 0 {
            self.release(Some(payload));
            return None;
        }
        // Failure leaves the original block untouched, same as a mapping
        // failure in the growth path.
        if new_size > MAX_REQUEST {
            return None;
        }

        let new_size = align16(new_size);
        let mut state = self.lock();

        // SAFETY: resize's contract requires payload to originate from this
        // allocator; the lock serializes all header access.
        unsafe {
            let blk = block::from_payload(payload.as_ptr());
            debug_assert_eq!(
                (*blk).magic,
                block::BLOCK_MAGIC,
                "resize of a pointer this allocator never returned"
            );

            // Capacity already suffices: shrink-in-place, capacity kept.
            if (*blk).size >= new_size {
                return Some(payload);
            }

            // Zero-copy growth for large objects that stay large.
            if new_size > SMALL_MAX && large::is_large(state.large, blk) {
                if let Some(grown) = large::try_grow(&mut state.large, blk, new_size) {
                    return Some(grown);
                }
            }

            // Generic fallback: allocate new, copy the old payload, release
            // the old block. Copy happens after the pre-scribble so data
            // lands on top of the fill pattern.
            let old_size = (*blk).size;
            let new_payload = state.allocate_locked(new_size)?;
            ptr::copy_nonoverlapping(
                payload.as_ptr(),
                new_payload.as_ptr(),
                old_size.min(new_size),
            );
            state.release_locked(payload);
            Some(new_payload)
        }
    }

    /// Coalesces every run of free blocks in both zone chains. Synchronous
    /// and caller-invoked only; never triggered by allocate/release.
    pub fn defragment(&self) {
        let state = self.lock();
        // SAFETY: lock held; both heads are valid chain heads.
        unsafe {
            debug::defragment_chain(state.tiny);
            debug::defragment_chain(state.small);
        }
    }

    /// Sum of live (in-use) payload bytes across all classes.
    #[must_use]
    pub fn live_bytes(&self) -> usize {
        let state = self.lock();
        let mut total = 0usize;
        // SAFETY: lock held; chain and registry links are valid.
        unsafe {
            for head in [state.tiny, state.small] {
                for z in zone::ZoneIter::new(head) {
                    for blk in zone::BlockIter::new((*z).blocks) {
                        if !(*blk).is_free {
                            total += (*blk).size;
                        }
                    }
                }
            }
            for blk in zone::BlockIter::new(state.large) {
                total += (*blk).size;
            }
        }
        total
    }
}

impl Default for Heap {
    fn default() -> Self {
        Self::new()
    }
}

/// Allocates from the process-global heap. See [`Heap::allocate`].
pub fn allocate(size: usize) -> Option<NonNull<u8>> {
    Heap::global().allocate(size)
}

/// Releases into the process-global heap. See [`Heap::release`].
pub fn release(payload: Option<NonNull<u8>>) {
    Heap::global().release(payload);
}

/// Resizes via the process-global heap. See [`Heap::resize`].
pub fn resize(payload: Option<NonNull<u8>>, new_size: usize) -> Option<NonNull<u8>> {
    Heap::global().resize(payload, new_size)
}

/// Defragments the process-global heap. See [`Heap::defragment`].
pub fn defragment() {
    Heap::global().defragment();
}
