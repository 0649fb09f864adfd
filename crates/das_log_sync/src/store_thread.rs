//! Dedicated thread for gap-fill inserts.
//!
//! History answers can be large; their bulk inserts run here so the thread
//! that received the answer never waits on the store. Completion callbacks
//! run on the store thread, in submission order.

use crate::error::{SyncError, SyncResult};
use das_log_protocol::InsertStatement;
use das_log_saver::{PersistentStore, StoreResult};
use parking_lot::{Condvar, Mutex};
use std::sync::mpsc::{self, Sender};
use std::sync::Arc;
use std::thread::{self, JoinHandle};
use std::time::{Duration, Instant};
use tracing::{debug, warn};

type Completion = Box<dyn FnOnce(StoreResult<()>) + Send>;

struct Job {
    statement: InsertStatement,
    done: Completion,
}

#[derive(Default)]
struct Pending {
    count: Mutex<usize>,
    idle: Condvar,
}

impl Pending {
    fn finish_one(&self) {
        let mut count = self.count.lock();
        *count = count.saturating_sub(1);
        if *count == 0 {
            self.idle.notify_all();
        }
    }
}

/// Single worker thread executing bulk inserts off a job queue.
pub struct StoreThread {
    sender: Mutex<Option<Sender<Job>>>,
    pending: Arc<Pending>,
    handle: Mutex<Option<JoinHandle<()>>>,
}

impl std::fmt::Debug for StoreThread {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("StoreThread")
            .field("pending", &self.pending())
            .finish()
    }
}

impl StoreThread {
    /// Spawns the store thread.
    ///
    /// # Errors
    ///
    /// Returns an error if the OS refuses to spawn the thread.
    pub fn spawn(store: Arc<dyn PersistentStore>) -> SyncResult<Self> {
        let (sender, receiver) = mpsc::channel::<Job>();
        let pending = Arc::new(Pending::default());
        let worker_pending = Arc::clone(&pending);

        let handle = thread::Builder::new()
            .name("log-store".into())
            .spawn(move || {
                while let Ok(job) = receiver.recv() {
                    let result = store.bulk_insert(&job.statement);
                    (job.done)(result);
                    worker_pending.finish_one();
                }
                debug!("store thread exiting");
            })
            .map_err(SyncError::Spawn)?;

        Ok(Self {
            sender: Mutex::new(Some(sender)),
            pending,
            handle: Mutex::new(Some(handle)),
        })
    }

    /// Queues an insert. `done` runs on the store thread with its result.
    ///
    /// # Errors
    ///
    /// Returns [`SyncError::StoreThreadStopped`] after shutdown.
    pub fn submit(
        &self,
        statement: InsertStatement,
        done: impl FnOnce(StoreResult<()>) + Send + 'static,
    ) -> SyncResult<()> {
        let sender = self.sender.lock();
        let Some(sender) = sender.as_ref() else {
            return Err(SyncError::StoreThreadStopped);
        };
        *self.pending.count.lock() += 1;
        let job = Job {
            statement,
            done: Box::new(done),
        };
        if sender.send(job).is_err() {
            self.pending.finish_one();
            return Err(SyncError::StoreThreadStopped);
        }
        Ok(())
    }

    /// Jobs queued or running.
    pub fn pending(&self) -> usize {
        *self.pending.count.lock()
    }

    /// Blocks until the queue is drained or `timeout` passes.
    ///
    /// Returns true if the queue drained.
    pub fn wait_idle(&self, timeout: Duration) -> bool {
        let deadline = Instant::now() + timeout;
        let mut count = self.pending.count.lock();
        while *count > 0 {
            if self.pending.idle.wait_until(&mut count, deadline).timed_out() {
                return *count == 0;
            }
        }
        true
    }

    /// Stops accepting jobs, drains the queue and joins the thread.
    pub fn shutdown(&self) {
        drop(self.sender.lock().take());
        let Some(handle) = self.handle.lock().take() else {
            return;
        };
        // The last owner may be dropped from inside a completion callback.
        if handle.thread().id() == thread::current().id() {
            return;
        }
        if handle.join().is_err() {
            warn!("store thread panicked");
        }
    }
}

impl Drop for StoreThread {
    fn drop(&mut self) {
        self.shutdown();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use das_log_protocol::{LogBatch, LogHeader, LogKind, LogMode};
    use das_log_saver::{MemoryStore, StoreError};

    fn statement(ts: i64) -> InsertStatement {
        LogBatch::Mode(vec![LogMode::new(LogHeader::new(ts).with_scheme(1), 1, 2)]).insert_statement()
    }

    #[test]
    fn jobs_run_in_order_and_report_results() {
        let store = Arc::new(MemoryStore::new());
        let thread = StoreThread::spawn(store.clone()).unwrap();
        let (tx, rx) = mpsc::channel();

        for ts in 0..3 {
            let tx = tx.clone();
            thread
                .submit(statement(ts), move |result| {
                    tx.send((ts, result.is_ok())).unwrap();
                })
                .unwrap();
        }

        assert!(thread.wait_idle(Duration::from_secs(5)));
        let results: Vec<_> = rx.try_iter().collect();
        assert_eq!(results, vec![(0, true), (1, true), (2, true)]);
        assert_eq!(store.row_count(LogKind::Mode), 3);
    }

    #[test]
    fn failures_reach_the_callback() {
        let store = Arc::new(MemoryStore::new());
        store.fail_next(StoreError::Rejected("duplicate key".into()));
        let thread = StoreThread::spawn(store.clone()).unwrap();
        let (tx, rx) = mpsc::channel();

        thread
            .submit(statement(1), move |result| {
                tx.send(result).unwrap();
            })
            .unwrap();

        let result = rx.recv_timeout(Duration::from_secs(5)).unwrap();
        assert!(matches!(result, Err(StoreError::Rejected(_))));
        assert_eq!(store.row_count(LogKind::Mode), 0);
    }

    #[test]
    fn submit_after_shutdown_fails() {
        let thread = StoreThread::spawn(Arc::new(MemoryStore::new())).unwrap();
        thread.shutdown();
        thread.shutdown();
        let result = thread.submit(statement(1), |_| {});
        assert!(matches!(result, Err(SyncError::StoreThreadStopped)));
        assert_eq!(thread.pending(), 0);
    }
}
