//! Persistent store interface.

use crate::error::{StoreError, StoreResult};
use das_log_protocol::{InsertStatement, LogKind};
use parking_lot::Mutex;
use std::collections::VecDeque;
use std::sync::atomic::{AtomicBool, Ordering};

/// The relational store log records end up in.
///
/// Implementations execute one bulk insert per call, all rows or none.
/// Calls come from saver worker threads and the sync store thread, never
/// from the thread that received the records.
pub trait PersistentStore: Send + Sync {
    /// Executes a bulk insert.
    ///
    /// # Errors
    ///
    /// Returns an error if the insert was not committed.
    fn bulk_insert(&self, statement: &InsertStatement) -> StoreResult<()>;
}

/// An in-memory store that records every committed statement.
///
/// Used by tests and the benchmark. Failures can be switched on globally
/// or queued one at a time.
#[derive(Debug, Default)]
pub struct MemoryStore {
    committed: Mutex<Vec<InsertStatement>>,
    unavailable: AtomicBool,
    scripted_failures: Mutex<VecDeque<StoreError>>,
}

impl MemoryStore {
    /// Creates an empty, available store.
    pub fn new() -> Self {
        Self::default()
    }

    /// Makes every insert fail with [`StoreError::Unavailable`] while set.
    pub fn set_unavailable(&self, unavailable: bool) {
        self.unavailable.store(unavailable, Ordering::SeqCst);
    }

    /// Queues an error for the next insert only.
    pub fn fail_next(&self, error: StoreError) {
        self.scripted_failures.lock().push_back(error);
    }

    /// Returns the committed statements, oldest first.
    pub fn committed(&self) -> Vec<InsertStatement> {
        self.committed.lock().clone()
    }

    /// Total committed rows of one kind.
    pub fn row_count(&self, kind: LogKind) -> usize {
        self.committed
            .lock()
            .iter()
            .filter(|s| s.kind == kind)
            .map(|s| s.row_count)
            .sum()
    }
}

impl PersistentStore for MemoryStore {
    fn bulk_insert(&self, statement: &InsertStatement) -> StoreResult<()> {
        if let Some(error) = self.scripted_failures.lock().pop_front() {
            return Err(error);
        }
        if self.unavailable.load(Ordering::SeqCst) {
            return Err(StoreError::Unavailable("memory store switched off".into()));
        }
        self.committed.lock().push(statement.clone());
        Ok(())
    }
}
