//! Per-kind batching cache.

use crate::dead_letter::{DeadLetterFile, ReplayReport, ReplayStep};
use crate::error::{SaverError, SaverResult};
use crate::stats::SaverStats;
use crate::store::PersistentStore;
use das_codec::Value;
use das_log_protocol::{LogBatch, LogKind, LogRecord};
use parking_lot::Mutex;
use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Instant;
use tracing::{debug, error, info, warn};

/// Pending records of one tenant.
#[derive(Debug)]
struct CacheEntry<T> {
    records: Vec<T>,
    opened_at: Instant,
}

/// Outcome of one [`Saver::flush`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct FlushReport {
    /// Tenants with pending records.
    pub tenants: usize,
    /// Records committed to the store.
    pub records_flushed: usize,
    /// Records written to the dead-letter file.
    pub records_spilled: usize,
    /// Records lost because the dead-letter write failed as well.
    pub records_lost: usize,
}

/// Tenant-partitioned write-back cache for one record type.
///
/// `add` only appends under a short lock. `flush` swaps all pending
/// records out under the same lock, then runs one bulk insert per tenant
/// without holding it. A failed insert sends that tenant's batch to the
/// dead-letter file; it is never put back in the cache.
pub struct Saver<T: LogRecord> {
    cache: Mutex<HashMap<u32, CacheEntry<T>>>,
    store: Arc<dyn PersistentStore>,
    dead_letter: DeadLetterFile,
    stats: Arc<SaverStats>,
    flushing: AtomicBool,
}

impl<T: LogRecord> std::fmt::Debug for Saver<T> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Saver")
            .field("kind", &T::KIND)
            .field("dead_letter", &self.dead_letter)
            .finish_non_exhaustive()
    }
}

impl<T: LogRecord> Saver<T> {
    /// Creates a saver over a store and a dead-letter file of the same kind.
    ///
    /// # Errors
    ///
    /// Returns an error if the dead-letter file holds another kind.
    pub fn new(
        store: Arc<dyn PersistentStore>,
        dead_letter: DeadLetterFile,
        stats: Arc<SaverStats>,
    ) -> SaverResult<Self> {
        if dead_letter.kind() != T::KIND {
            return Err(SaverError::KindMismatch {
                expected: T::KIND,
                found: dead_letter.kind(),
            });
        }
        Ok(Self {
            cache: Mutex::new(HashMap::new()),
            store,
            dead_letter,
            stats,
            flushing: AtomicBool::new(false),
        })
    }

    /// Appends records to a tenant's pending sequence.
    ///
    /// Every record is stamped with `scheme_id`. An entry that was empty
    /// restarts its dwell clock.
    pub fn add(&self, scheme_id: u32, mut records: Vec<T>) {
        if records.is_empty() {
            return;
        }
        for record in &mut records {
            record.header_mut().scheme_id = scheme_id;
        }
        let count = records.len();

        {
            let mut cache = self.cache.lock();
            let entry = cache.entry(scheme_id).or_insert_with(|| CacheEntry {
                records: Vec::new(),
                opened_at: Instant::now(),
            });
            if entry.records.is_empty() {
                entry.opened_at = Instant::now();
            }
            entry.records.extend(records);
        }

        self.stats.record_added(count);
    }

    /// Copy of a tenant's pending records.
    pub fn get_cache_data(&self, scheme_id: u32) -> Vec<T> {
        self.cache
            .lock()
            .get(&scheme_id)
            .map(|entry| entry.records.clone())
            .unwrap_or_default()
    }

    /// Returns true if no tenant has pending records.
    pub fn is_data_empty(&self) -> bool {
        self.cache.lock().values().all(|entry| entry.records.is_empty())
    }

    /// Returns true if there are no tenant entries at all, empty or not.
    pub fn is_cache_empty(&self) -> bool {
        self.cache.lock().is_empty()
    }

    /// Total pending records across tenants.
    pub fn pending_records(&self) -> usize {
        self.cache.lock().values().map(|entry| entry.records.len()).sum()
    }

    /// Oldest "opened at" among tenants with pending records.
    pub fn oldest_cache_time(&self) -> Option<Instant> {
        self.cache
            .lock()
            .values()
            .filter(|entry| !entry.records.is_empty())
            .map(|entry| entry.opened_at)
            .min()
    }

    /// Drops tenant entries with no pending records. Returns how many.
    pub fn erase_empty_cache(&self) -> usize {
        let mut cache = self.cache.lock();
        let before = cache.len();
        cache.retain(|_, entry| !entry.records.is_empty());
        before - cache.len()
    }

    /// Writes every pending record to the store, one insert per tenant.
    pub fn flush(&self) -> FlushReport {
        let taken: Vec<(u32, Vec<T>)> = {
            let mut cache = self.cache.lock();
            cache
                .iter_mut()
                .filter(|(_, entry)| !entry.records.is_empty())
                .map(|(scheme_id, entry)| (*scheme_id, std::mem::take(&mut entry.records)))
                .collect()
        };

        let mut report = FlushReport {
            tenants: taken.len(),
            ..FlushReport::default()
        };

        for (scheme_id, records) in taken {
            let count = records.len();
            let batch = T::into_batch(records);
            let statement = batch.insert_statement();

            match self.store.bulk_insert(&statement) {
                Ok(()) => {
                    debug!(kind = %T::KIND, scheme_id, rows = count, "flushed");
                    self.stats.record_flushed(count);
                    report.records_flushed += count;
                }
                Err(e) => {
                    warn!(kind = %T::KIND, scheme_id, rows = count, error = %e, "flush failed, spilling to dead-letter file");
                    self.stats.record_flush_failure();
                    if self.spill(&batch.insert_rows()) {
                        report.records_spilled += count;
                    } else {
                        report.records_lost += count;
                    }
                }
            }
        }

        report
    }

    fn spill(&self, rows: &[Vec<Value>]) -> bool {
        match self.dead_letter.append(rows) {
            Ok(()) => {
                self.stats.record_spilled(rows.len());
                true
            }
            Err(e) => {
                self.stats.record_dead_letter_write_failure();
                error!(kind = %T::KIND, rows = rows.len(), error = %e, "dead-letter write failed, records lost");
                false
            }
        }
    }

    /// Replays the dead-letter file through the bulk insert path.
    ///
    /// Rows that no longer decode as this kind are quarantined. The first
    /// failing insert stops the replay and keeps the remainder for the next
    /// start.
    ///
    /// # Errors
    ///
    /// Returns an error if the file cannot be read or rewritten.
    pub fn load_dead_letter(&self) -> SaverResult<ReplayReport> {
        let report = self.dead_letter.replay(|rows| {
            let batch = match LogBatch::from_insert_rows(T::KIND, rows) {
                Ok(batch) => batch,
                Err(e) => {
                    error!(kind = %T::KIND, error = %e, "undecodable dead-letter entry");
                    return ReplayStep::Reject;
                }
            };
            match self.store.bulk_insert(&batch.insert_statement()) {
                Ok(()) => ReplayStep::Consumed,
                Err(e) => {
                    warn!(kind = %T::KIND, error = %e, "dead-letter replay stopped");
                    ReplayStep::Retry
                }
            }
        })?;

        self.stats.record_replayed(report.rows_replayed);
        self.stats.record_pending_loaded(report.entries_remaining);
        self.stats.record_quarantined(report.bytes_quarantined);
        if report.entries_replayed > 0 || report.entries_remaining > 0 {
            info!(
                kind = %T::KIND,
                replayed = report.entries_replayed,
                remaining = report.entries_remaining,
                "loaded dead-letter file"
            );
        }
        Ok(report)
    }

    /// The dead-letter file of this saver.
    pub fn dead_letter(&self) -> &DeadLetterFile {
        &self.dead_letter
    }
}

/// Kind-erased view of a [`Saver`], as held by the controller.
pub trait SaverBase: Send + Sync {
    /// Kind of the records.
    fn kind(&self) -> LogKind;

    /// Appends a batch for a tenant.
    ///
    /// # Errors
    ///
    /// Returns [`SaverError::KindMismatch`] if the batch holds another kind.
    fn add_batch(&self, scheme_id: u32, batch: LogBatch) -> SaverResult<()>;

    /// Copy of a tenant's pending records as a batch.
    fn cache_snapshot(&self, scheme_id: u32) -> LogBatch;

    /// See [`Saver::flush`].
    fn flush(&self) -> FlushReport;

    /// See [`Saver::load_dead_letter`].
    fn load_dead_letter(&self) -> SaverResult<ReplayReport>;

    /// See [`Saver::is_data_empty`].
    fn is_data_empty(&self) -> bool;

    /// See [`Saver::is_cache_empty`].
    fn is_cache_empty(&self) -> bool;

    /// See [`Saver::pending_records`].
    fn pending_records(&self) -> usize;

    /// See [`Saver::oldest_cache_time`].
    fn oldest_cache_time(&self) -> Option<Instant>;

    /// See [`Saver::erase_empty_cache`].
    fn erase_empty_cache(&self) -> usize;

    /// Claims the saver for one worker. Returns false if another worker
    /// is already flushing it.
    fn try_begin_flush(&self) -> bool;

    /// Releases the claim taken by [`try_begin_flush`](Self::try_begin_flush).
    fn end_flush(&self);
}

impl<T: LogRecord> SaverBase for Saver<T> {
    fn kind(&self) -> LogKind {
        T::KIND
    }

    fn add_batch(&self, scheme_id: u32, batch: LogBatch) -> SaverResult<()> {
        let records = T::from_batch(batch).map_err(|other| SaverError::KindMismatch {
            expected: T::KIND,
            found: other.kind(),
        })?;
        self.add(scheme_id, records);
        Ok(())
    }

    fn cache_snapshot(&self, scheme_id: u32) -> LogBatch {
        T::into_batch(self.get_cache_data(scheme_id))
    }

    fn flush(&self) -> FlushReport {
        Saver::flush(self)
    }

    fn load_dead_letter(&self) -> SaverResult<ReplayReport> {
        Saver::load_dead_letter(self)
    }

    fn is_data_empty(&self) -> bool {
        Saver::is_data_empty(self)
    }

    fn is_cache_empty(&self) -> bool {
        Saver::is_cache_empty(self)
    }

    fn pending_records(&self) -> usize {
        Saver::pending_records(self)
    }

    fn oldest_cache_time(&self) -> Option<Instant> {
        Saver::oldest_cache_time(self)
    }

    fn erase_empty_cache(&self) -> usize {
        Saver::erase_empty_cache(self)
    }

    fn try_begin_flush(&self) -> bool {
        self.flushing
            .compare_exchange(false, true, Ordering::AcqRel, Ordering::Acquire)
            .is_ok()
    }

    fn end_flush(&self) {
        self.flushing.store(false, Ordering::Release);
    }
}
