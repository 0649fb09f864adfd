//! Saver statistics.
//!
//! Counters are shared by every saver of a controller and can be read
//! while workers are flushing.

use std::sync::atomic::{AtomicU64, Ordering};

/// Live saver counters.
#[derive(Debug, Default)]
pub struct SaverStats {
    records_added: AtomicU64,
    records_flushed: AtomicU64,
    flush_failures: AtomicU64,
    records_spilled: AtomicU64,
    dead_letter_write_failures: AtomicU64,
    records_replayed: AtomicU64,
    dead_letter_pending: AtomicU64,
    quarantined_bytes: AtomicU64,
}

impl SaverStats {
    /// Creates zeroed counters.
    pub fn new() -> Self {
        Self::default()
    }

    pub(crate) fn record_added(&self, records: usize) {
        self.records_added.fetch_add(records as u64, Ordering::Relaxed);
    }

    pub(crate) fn record_flushed(&self, records: usize) {
        self.records_flushed.fetch_add(records as u64, Ordering::Relaxed);
    }

    pub(crate) fn record_flush_failure(&self) {
        self.flush_failures.fetch_add(1, Ordering::Relaxed);
    }

    pub(crate) fn record_spilled(&self, records: usize) {
        self.records_spilled.fetch_add(records as u64, Ordering::Relaxed);
        self.dead_letter_pending.fetch_add(1, Ordering::Relaxed);
    }

    pub(crate) fn record_dead_letter_write_failure(&self) {
        self.dead_letter_write_failures.fetch_add(1, Ordering::Relaxed);
    }

    pub(crate) fn record_replayed(&self, records: usize) {
        self.records_replayed.fetch_add(records as u64, Ordering::Relaxed);
    }

    pub(crate) fn record_pending_loaded(&self, entries: usize) {
        self.dead_letter_pending.fetch_add(entries as u64, Ordering::Relaxed);
    }

    pub(crate) fn record_quarantined(&self, bytes: usize) {
        self.quarantined_bytes.fetch_add(bytes as u64, Ordering::Relaxed);
    }

    /// Takes a consistent-enough copy of every counter.
    pub fn snapshot(&self) -> SaverStatsSnapshot {
        SaverStatsSnapshot {
            records_added: self.records_added.load(Ordering::Relaxed),
            records_flushed: self.records_flushed.load(Ordering::Relaxed),
            flush_failures: self.flush_failures.load(Ordering::Relaxed),
            records_spilled: self.records_spilled.load(Ordering::Relaxed),
            dead_letter_write_failures: self.dead_letter_write_failures.load(Ordering::Relaxed),
            records_replayed: self.records_replayed.load(Ordering::Relaxed),
            dead_letter_pending: self.dead_letter_pending.load(Ordering::Relaxed),
            quarantined_bytes: self.quarantined_bytes.load(Ordering::Relaxed),
        }
    }
}

/// Point-in-time copy of [`SaverStats`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct SaverStatsSnapshot {
    /// Records accepted by `add`.
    pub records_added: u64,
    /// Records committed to the persistent store, replays excluded.
    pub records_flushed: u64,
    /// Bulk inserts that failed during a flush.
    pub flush_failures: u64,
    /// Records written to dead-letter files.
    pub records_spilled: u64,
    /// Dead-letter appends that failed. Those records are lost.
    pub dead_letter_write_failures: u64,
    /// Records replayed from dead-letter files.
    pub records_replayed: u64,
    /// Dead-letter entries still waiting for a replay.
    pub dead_letter_pending: u64,
    /// Bytes moved out of dead-letter files as undecodable.
    pub quarantined_bytes: u64,
}
