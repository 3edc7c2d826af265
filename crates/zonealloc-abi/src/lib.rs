//! ABI layer: `extern "C"` boundary exporting `malloc`, `free`, `realloc`,
//! the `show_alloc_mem` introspection pair, and `malloc_defragment` over
//! the process-global heap.
//!
//! Built as a `cdylib` for preloading. In debug builds the symbols are not
//! exported, so test binaries keep their system allocator instead of
//! recursing into a half-linked replacement.
//!
//! Introspection renders into a fixed stack buffer and emits through
//! `libc::write`: printing must not allocate through the allocator it is
//! describing.

use std::ffi::c_void;
use std::fmt::{self, Write as _};
use std::ptr::{self, NonNull};

use zonealloc_core::{Heap, report};

/// Capacity of the stack buffer backing one report.
const REPORT_BUF_LEN: usize = 16 * 1024;

/// `fmt::Write` sink over a fixed byte buffer; output beyond capacity is
/// truncated rather than grown.
struct FixedWriter {
    buf: [u8; REPORT_BUF_LEN],
    len: usize,
}

impl FixedWriter {
    const fn new() -> Self {
        Self {
            buf: [0; REPORT_BUF_LEN],
            len: 0,
        }
    }

    fn flush_to_stdout(&self) {
        let mut written = 0usize;
        while written < self.len {
            // SAFETY: the range [written, len) is initialized buffer.
            let rc = unsafe {
                libc::write(
                    1,
                    self.buf[written..].as_ptr().cast::<c_void>(),
                    self.len - written,
                )
            };
            if rc <= 0 {
                break;
            }
            written += rc as usize;
        }
    }
}

impl fmt::Write for FixedWriter {
    fn write_str(&mut self, s: &str) -> fmt::Result {
        let bytes = s.as_bytes();
        let room = REPORT_BUF_LEN - self.len;
        let take = bytes.len().min(room);
        self.buf[self.len..self.len + take].copy_from_slice(&bytes[..take]);
        self.len += take;
        Ok(())
    }
}

/// Replacement `malloc` -- allocates `size` bytes, 16-byte aligned.
///
/// Returns null when `size` is 0 or the underlying mapping fails.
///
/// # Safety
///
/// Caller must eventually pass the returned pointer to `free` exactly once.
#[cfg_attr(not(debug_assertions), unsafe(no_mangle))]
pub unsafe extern "C" fn malloc(size: usize) -> *mut c_void {
    match Heap::global().allocate(size) {
        Some(p) => p.as_ptr().cast(),
        None => ptr::null_mut(),
    }
}

/// Replacement `free` -- releases memory from `malloc`/`realloc`.
///
/// Null is a no-op, per POSIX.
///
/// # Safety
///
/// `ptr` must be null or a live pointer previously returned by this
/// allocator's `malloc` or `realloc`.
#[cfg_attr(not(debug_assertions), unsafe(no_mangle))]
pub unsafe extern "C" fn free(ptr: *mut c_void) {
    Heap::global().release(NonNull::new(ptr.cast::<u8>()));
}

/// Replacement `realloc` -- resizes a block.
///
/// - Null `ptr` behaves as `malloc(size)`.
/// - `size == 0` behaves as `free(ptr)` and returns null.
/// - Shrinks are satisfied in place; growth may move the block.
///
/// # Safety
///
/// `ptr` must be null or a live pointer previously returned by this
/// allocator's `malloc` or `realloc`.
#[cfg_attr(not(debug_assertions), unsafe(no_mangle))]
pub unsafe extern "C" fn realloc(ptr: *mut c_void, size: usize) -> *mut c_void {
    match Heap::global().resize(NonNull::new(ptr.cast::<u8>()), size) {
        Some(p) => p.as_ptr().cast(),
        None => ptr::null_mut(),
    }
}

/// Prints the standard memory report to stdout: zones, in-use blocks, and
/// the live-byte total.
#[cfg_attr(not(debug_assertions), unsafe(no_mangle))]
pub extern "C" fn show_alloc_mem() {
    let mut out = FixedWriter::new();
    let _ = report::write_report(Heap::global(), &mut out);
    out.flush_to_stdout();
}

/// Prints the extended memory report: standard report plus debug
/// configuration, recent history, and hex dumps of live allocations.
#[cfg_attr(not(debug_assertions), unsafe(no_mangle))]
pub extern "C" fn show_alloc_mem_ex() {
    let mut out = FixedWriter::new();
    let _ = report::write_report_ex(Heap::global(), &mut out);
    out.flush_to_stdout();
}

/// Runs one synchronous defragmentation sweep over both zone chains.
#[cfg_attr(not(debug_assertions), unsafe(no_mangle))]
pub extern "C" fn malloc_defragment() {
    Heap::global().defragment();
}
