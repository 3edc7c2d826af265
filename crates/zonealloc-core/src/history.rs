//! Bounded allocation/release event history.
//!
//! A fixed 1000-slot ring: every successful allocate and every release
//! appends one entry in O(1) without allocating, and once the ring is full
//! the oldest entries are silently overwritten. Bounded retention is the
//! production contract; an unbounded history is deliberately not offered.

/// Ring capacity in entries.
pub const HISTORY_CAPACITY: usize = 1000;

/// One allocate or release event.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct HistoryEntry {
    /// Payload address of the event.
    pub ptr: usize,
    /// Payload size in bytes.
    pub size: usize,
    /// Unix timestamp of the event.
    pub timestamp: i64,
    /// True for release events, false for allocations.
    pub freed: bool,
}

impl HistoryEntry {
    const EMPTY: Self = Self {
        ptr: 0,
        size: 0,
        timestamp: 0,
        freed: false,
    };
}

/// Fixed-capacity event ring.
pub struct HistoryRing {
    entries: [HistoryEntry; HISTORY_CAPACITY],
    /// Total events ever recorded; `count % HISTORY_CAPACITY` is the next
    /// write slot.
    count: usize,
}

impl HistoryRing {
    /// Creates an empty ring.
    #[must_use]
    pub const fn new() -> Self {
        Self {
            entries: [HistoryEntry::EMPTY; HISTORY_CAPACITY],
            count: 0,
        }
    }

    /// Appends one event, overwriting the oldest once full.
    pub fn record(&mut self, ptr: usize, size: usize, timestamp: i64, freed: bool) {
        self.entries[self.count % HISTORY_CAPACITY] = HistoryEntry {
            ptr,
            size,
            timestamp,
            freed,
        };
        self.count += 1;
    }

    /// Number of entries currently retained (saturates at capacity).
    #[must_use]
    pub fn len(&self) -> usize {
        self.count.min(HISTORY_CAPACITY)
    }

    /// True when nothing has been recorded yet.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.count == 0
    }

    /// Total events ever recorded, including overwritten ones.
    #[must_use]
    pub fn total_recorded(&self) -> usize {
        self.count
    }

    /// Iterates retained entries newest-first.
    pub fn iter_recent(&self) -> impl Iterator<Item = &HistoryEntry> {
        (1..=self.len()).map(move |back| {
            let idx = (self.count - back) % HISTORY_CAPACITY;
            &self.entries[idx]
        })
    }
}

impl Default for HistoryRing {
    fn default() -> Self {
        Self::new()
    }
}
