//! # zonealloc-core
//!
//! A user-space memory allocator that replaces the standard allocation
//! triad (allocate, release, resize) without relying on any other
//! allocator. Memory comes straight from anonymous page mappings:
//!
//! - Tiny (<= 512 B) and small (<= 4 KB) requests are served from
//!   page-mapped zones subdivided into contiguous blocks, first-fit, with
//!   forward-only coalescing.
//! - Larger requests each get a dedicated mapping sized exactly
//!   header + payload, tracked in a flat registry, with `mremap`-based
//!   zero-copy growth on resize.
//! - An instrumentation layer (scribbling, bounded event history, guard
//!   hook, defragmentation sweep) observes every allocation and release,
//!   configured once from `MALLOC_*` environment variables.
//!
//! A [`Heap`] is an explicit value so tests can run isolated instances;
//! [`Heap::global`] and the module-level [`allocate`]/[`release`]/
//! [`resize`] free functions provide the process-wide default for drop-in
//! replacement use (see the `zonealloc-abi` crate for the `extern "C"`
//! boundary).

pub mod block;
pub mod config;
pub mod debug;
pub mod error;
pub mod heap;
pub mod history;
pub mod large;
pub mod mmap;
pub mod report;
pub mod size_class;
pub mod zone;

pub use config::DebugFlags;
pub use error::MapError;
pub use heap::{Heap, allocate, defragment, release, resize};
pub use history::{HISTORY_CAPACITY, HistoryEntry, HistoryRing};
pub use report::{write_report, write_report_ex};
pub use size_class::{ALIGNMENT, SMALL_MAX, SizeClass, TINY_MAX, align16};
