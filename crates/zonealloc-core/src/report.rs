//! Introspection report rendering.
//!
//! Produces the textual memory report expected by tooling: per size class,
//! each zone's address and byte size, each in-use block's address range and
//! size, and a grand total of live bytes. The extended variant adds the
//! debug configuration, the most recent history entries, and a hex+ASCII
//! dump of each live allocation's first bytes.
//!
//! Rendering goes through `fmt::Write` so callers choose the sink; the ABI
//! layer writes into a fixed stack buffer to stay allocation-free.

use std::fmt::{self, Write};

use crate::block::HEADER_SIZE;
use crate::heap::{Heap, HeapState};
use crate::size_class::SizeClass;
use crate::zone::{BlockIter, ZoneIter};

/// History entries printed by the extended report; older entries are
/// summarized as a count.
const HISTORY_SHOWN: usize = 20;

/// Payload bytes hex-dumped per live allocation in the extended report.
const DUMP_BYTES: usize = 64;

/// Bytes per hex-dump line.
const DUMP_WIDTH: usize = 16;

/// Writes the standard report: zones, in-use blocks, and the live-byte
/// total across all classes.
pub fn write_report(heap: &Heap, out: &mut dyn Write) -> fmt::Result {
    let state = heap.lock();
    write_report_locked(&state, out)
}

fn write_report_locked(state: &HeapState, out: &mut dyn Write) -> fmt::Result {
    let mut total = 0usize;
    write_zone_class(state, SizeClass::Tiny, out, &mut total)?;
    write_zone_class(state, SizeClass::Small, out, &mut total)?;
    write_large_class(state, out, &mut total)?;
    writeln!(out, "Total : {total} bytes")
}

/// Writes the extended report: standard report plus debug configuration,
/// recent history, and per-allocation hex dumps.
///
/// The whole report is rendered under one lock acquisition, so the totals
/// and the dump section describe the same heap snapshot.
pub fn write_report_ex(heap: &Heap, out: &mut dyn Write) -> fmt::Result {
    let state = heap.lock();
    write_report_locked(&state, out)?;

    let d = &state.debug;
    writeln!(out, "-- debug configuration --")?;
    writeln!(out, "scribble      : {}", d.scribble)?;
    writeln!(out, "pre_scribble  : {}", d.pre_scribble)?;
    writeln!(out, "guard         : {}", d.guard)?;
    writeln!(out, "stack_logging : {}", d.stack_logging)?;
    writeln!(out, "check_level   : {}", d.check_level)?;

    writeln!(out, "-- allocation history --")?;
    for entry in state.history.iter_recent().take(HISTORY_SHOWN) {
        writeln!(
            out,
            "{} {:#X} : {} bytes (t={})",
            if entry.freed { "free " } else { "alloc" },
            entry.ptr,
            entry.size,
            entry.timestamp,
        )?;
    }
    let len = state.history.len();
    if len > HISTORY_SHOWN {
        writeln!(out, "... {} older entries elided", len - HISTORY_SHOWN)?;
    }

    writeln!(out, "-- live allocation contents --")?;
    // SAFETY: lock held; all links valid, payloads live for their size.
    unsafe {
        for class in [SizeClass::Tiny, SizeClass::Small] {
            for zone in ZoneIter::new(chain_head(&state, class)) {
                for blk in BlockIter::new((*zone).blocks) {
                    if !(*blk).is_free {
                        dump_payload(blk as usize + HEADER_SIZE, (*blk).size, out)?;
                    }
                }
            }
        }
        for blk in BlockIter::new(state.large) {
            dump_payload(blk as usize + HEADER_SIZE, (*blk).size, out)?;
        }
    }
    Ok(())
}

fn chain_head(state: &HeapState, class: SizeClass) -> *mut crate::zone::ZoneHeader {
    match class {
        SizeClass::Tiny => state.tiny,
        SizeClass::Small => state.small,
        SizeClass::Large => std::ptr::null_mut(),
    }
}

fn write_zone_class(
    state: &HeapState,
    class: SizeClass,
    out: &mut dyn Write,
    total: &mut usize,
) -> fmt::Result {
    // SAFETY: lock held by the caller; links valid.
    unsafe {
        for zone in ZoneIter::new(chain_head(state, class)) {
            writeln!(out, "{} : {:#X} ({} bytes)", class.label(), zone as usize, (*zone).size)?;
            for blk in BlockIter::new((*zone).blocks) {
                if !(*blk).is_free {
                    let start = blk as usize + HEADER_SIZE;
                    let size = (*blk).size;
                    writeln!(out, "{:#X} - {:#X} : {} bytes", start, start + size, size)?;
                    *total += size;
                }
            }
        }
    }
    Ok(())
}

fn write_large_class(state: &HeapState, out: &mut dyn Write, total: &mut usize) -> fmt::Result {
    // SAFETY: lock held by the caller; registry links valid.
    unsafe {
        for blk in BlockIter::new(state.large) {
            let size = (*blk).size;
            writeln!(
                out,
                "{} : {:#X} ({} bytes)",
                SizeClass::Large.label(),
                blk as usize,
                HEADER_SIZE + size
            )?;
            let start = blk as usize + HEADER_SIZE;
            writeln!(out, "{:#X} - {:#X} : {} bytes", start, start + size, size)?;
            *total += size;
        }
    }
    Ok(())
}

/// Hex+ASCII dump of the first [`DUMP_BYTES`] bytes of one payload.
///
/// # Safety
///
/// `addr` must be a live payload of at least `size` bytes, with the heap
/// lock held.
unsafe fn dump_payload(addr: usize, size: usize, out: &mut dyn Write) -> fmt::Result {
    writeln!(out, "{:#X} ({} bytes):", addr, size)?;
    let shown = size.min(DUMP_BYTES);
    let mut offset = 0;
    while offset < shown {
        let line = DUMP_WIDTH.min(shown - offset);
        write!(out, "  {:04x}: ", offset)?;
        for i in 0..DUMP_WIDTH {
            if i < line {
                // SAFETY: addr + offset + i < addr + size per caller contract.
                let byte = unsafe { *((addr + offset + i) as *const u8) };
                write!(out, "{byte:02x} ")?;
            } else {
                write!(out, "   ")?;
            }
        }
        write!(out, "|")?;
        for i in 0..line {
            // SAFETY: in-bounds per caller contract.
            let byte = unsafe { *((addr + offset + i) as *const u8) };
            let shown_char = if byte.is_ascii_graphic() || byte == b' ' {
                byte as char
            } else {
                '.'
            };
            write!(out, "{shown_char}")?;
        }
        writeln!(out, "|")?;
        offset += line;
    }
    Ok(())
}
