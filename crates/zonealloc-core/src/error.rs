//! Error taxonomy for OS mapping calls.
//!
//! Every fallible operation in the allocator bottoms out in one of the three
//! mapping syscalls. Failures are never fatal: the public API converts them
//! into a `None` result, and release paths treat unmap failure as
//! best-effort.

use thiserror::Error;

/// Failure of an underlying memory-mapping syscall.
#[derive(Debug, Error, Clone, Copy, PartialEq, Eq)]
pub enum MapError {
    /// `mmap` of a fresh anonymous region failed.
    #[error("anonymous mapping of {len} bytes failed (errno {errno})")]
    Map { len: usize, errno: i32 },

    /// `munmap` of an existing region failed.
    #[error("unmapping {len} bytes failed (errno {errno})")]
    Unmap { len: usize, errno: i32 },

    /// `mremap` growth of a large object failed; callers fall back to
    /// allocate/copy/release.
    #[error("remapping to {new_len} bytes failed (errno {errno})")]
    Remap { new_len: usize, errno: i32 },
}
