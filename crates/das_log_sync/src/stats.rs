//! Per-connection sync counters.

use std::sync::atomic::{AtomicU64, Ordering};

/// Live sync counters for one connection.
#[derive(Debug, Default)]
pub struct SyncStats {
    requests_sent: AtomicU64,
    timeouts: AtomicU64,
    batches_inserted: AtomicU64,
    rows_inserted: AtomicU64,
    insert_failures: AtomicU64,
    packs_accepted: AtomicU64,
    packs_rejected: AtomicU64,
    bad_payloads: AtomicU64,
}

impl SyncStats {
    /// Creates zeroed counters.
    pub fn new() -> Self {
        Self::default()
    }

    pub(crate) fn record_request(&self) {
        self.requests_sent.fetch_add(1, Ordering::Relaxed);
    }

    pub(crate) fn record_timeout(&self) {
        self.timeouts.fetch_add(1, Ordering::Relaxed);
    }

    pub(crate) fn record_inserted(&self, rows: usize) {
        self.batches_inserted.fetch_add(1, Ordering::Relaxed);
        self.rows_inserted.fetch_add(rows as u64, Ordering::Relaxed);
    }

    pub(crate) fn record_insert_failure(&self) {
        self.insert_failures.fetch_add(1, Ordering::Relaxed);
    }

    pub(crate) fn record_pack(&self, accepted: bool) {
        if accepted {
            self.packs_accepted.fetch_add(1, Ordering::Relaxed);
        } else {
            self.packs_rejected.fetch_add(1, Ordering::Relaxed);
        }
    }

    pub(crate) fn record_bad_payload(&self) {
        self.bad_payloads.fetch_add(1, Ordering::Relaxed);
    }

    /// Copies every counter.
    pub fn snapshot(&self) -> SyncStatsSnapshot {
        SyncStatsSnapshot {
            requests_sent: self.requests_sent.load(Ordering::Relaxed),
            timeouts: self.timeouts.load(Ordering::Relaxed),
            batches_inserted: self.batches_inserted.load(Ordering::Relaxed),
            rows_inserted: self.rows_inserted.load(Ordering::Relaxed),
            insert_failures: self.insert_failures.load(Ordering::Relaxed),
            packs_accepted: self.packs_accepted.load(Ordering::Relaxed),
            packs_rejected: self.packs_rejected.load(Ordering::Relaxed),
            bad_payloads: self.bad_payloads.load(Ordering::Relaxed),
        }
    }
}

/// Point-in-time copy of [`SyncStats`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct SyncStatsSnapshot {
    /// Gap-fill requests sent.
    pub requests_sent: u64,
    /// Requests that expired unanswered.
    pub timeouts: u64,
    /// Gap-fill answers committed to the store.
    pub batches_inserted: u64,
    /// Rows in those answers.
    pub rows_inserted: u64,
    /// Gap-fill answers the store refused.
    pub insert_failures: u64,
    /// Real-time packs handed to the saver controller.
    pub packs_accepted: u64,
    /// Real-time packs the saver controller refused.
    pub packs_rejected: u64,
    /// Payloads that failed to decode.
    pub bad_payloads: u64,
}
