//! Saver controller and its flush workers.

use crate::config::SaverConfig;
use crate::dead_letter::DeadLetterFile;
use crate::error::{SaverError, SaverResult};
use crate::saver::{FlushReport, Saver, SaverBase};
use crate::stats::{SaverStats, SaverStatsSnapshot};
use crate::store::PersistentStore;
use das_log_protocol::{LogBatch, LogEvent, LogKind, LogMode, LogParam, LogRecord, LogStatus, LogValue};
use parking_lot::{Condvar, Mutex, RwLock};
use std::sync::Arc;
use std::thread::{self, JoinHandle};
use std::time::Instant;
use tracing::{debug, error, info, warn};

/// Wake-up state shared between `add` and the workers.
#[derive(Debug, Default)]
struct Signal {
    /// Set by `add`, cleared by the worker that picks it up.
    dirty: bool,
    stop: bool,
}

/// State shared with the worker threads.
struct Shared {
    config: SaverConfig,
    savers: Vec<Arc<dyn SaverBase>>,
    stats: Arc<SaverStats>,
    signal: Mutex<Signal>,
    wakeup: Condvar,
    last_erase: Mutex<Instant>,
}

impl Shared {
    fn saver(&self, kind: LogKind) -> Option<&Arc<dyn SaverBase>> {
        self.savers.iter().find(|saver| saver.kind() == kind)
    }

    /// Claims the most urgent eligible saver, oldest pending entry first.
    fn claim_next(&self) -> Option<Arc<dyn SaverBase>> {
        let now = Instant::now();
        let mut candidates: Vec<(Instant, &Arc<dyn SaverBase>)> = self
            .savers
            .iter()
            .filter_map(|saver| {
                let oldest = saver.oldest_cache_time()?;
                let aged = now.saturating_duration_since(oldest) >= self.config.min_flush_age;
                let full = saver.pending_records() >= self.config.max_cache_records;
                (aged || full).then_some((oldest, saver))
            })
            .collect();
        candidates.sort_by_key(|(oldest, _)| *oldest);

        candidates
            .into_iter()
            .map(|(_, saver)| saver)
            .find(|saver| saver.try_begin_flush())
            .cloned()
    }

    fn run_worker(&self, index: usize) {
        debug!(worker = index, "saver worker started");
        loop {
            {
                let mut signal = self.signal.lock();
                if !signal.stop && !signal.dirty {
                    self.wakeup.wait_for(&mut signal, self.config.poll_interval);
                }
                if signal.stop {
                    break;
                }
                signal.dirty = false;
            }

            self.erase_empty_if_due();

            while let Some(saver) = self.claim_next() {
                let report = saver.flush();
                saver.end_flush();
                if report.records_spilled > 0 || report.records_lost > 0 {
                    warn!(
                        worker = index,
                        kind = %saver.kind(),
                        spilled = report.records_spilled,
                        lost = report.records_lost,
                        "flush incomplete"
                    );
                }
                if self.signal.lock().stop {
                    break;
                }
            }
        }
        debug!(worker = index, "saver worker stopped");
    }

    fn erase_empty_if_due(&self) {
        let mut last = self.last_erase.lock();
        if last.elapsed() >= self.config.erase_empty_interval {
            *last = Instant::now();
            drop(last);
            self.erase_empty();
        }
    }

    fn erase_empty(&self) -> usize {
        self.savers.iter().map(|saver| saver.erase_empty_cache()).sum()
    }
}

/// Owns one [`Saver`] per registered kind and the workers that flush them.
///
/// Construction replays each kind's dead-letter file, then starts
/// `thread_count` workers. A worker sleeps on a condition variable until
/// `add` wakes it or the poll interval elapses, then flushes eligible savers
/// oldest-first until none is left. A saver is eligible when its oldest
/// pending entry has dwelt for `min_flush_age` or it holds at least
/// `max_cache_records` records.
///
/// Shutdown stops the workers, joins them and makes one final flush pass
/// over every saver; whatever the store refuses lands in the dead-letter
/// files. Dropping the controller shuts it down.
pub struct SaverController {
    shared: Arc<Shared>,
    workers: Mutex<Vec<JoinHandle<()>>>,
    /// Adds hold the read side until the batch is cached; shutdown takes
    /// the write side before its final flush.
    shut_down: RwLock<bool>,
}

impl std::fmt::Debug for SaverController {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SaverController")
            .field("config", &self.shared.config)
            .field("kinds", &self.kinds())
            .finish_non_exhaustive()
    }
}

impl SaverController {
    /// Opens the dead-letter files in `config.dead_letter_dir` and starts.
    ///
    /// # Errors
    ///
    /// Returns an error if a dead-letter file cannot be opened or replayed,
    /// or a worker cannot be spawned.
    pub fn new(config: SaverConfig, store: Arc<dyn PersistentStore>) -> SaverResult<Arc<Self>> {
        let files = config
            .kinds
            .iter()
            .map(|kind| DeadLetterFile::open(&config.dead_letter_dir, *kind))
            .collect::<SaverResult<Vec<_>>>()?;
        Self::with_dead_letter_files(config, store, files)
    }

    /// Starts with caller-provided dead-letter files, one per kind.
    ///
    /// Kinds without a file are not registered, whatever `config.kinds`
    /// says.
    ///
    /// # Errors
    ///
    /// Returns an error if a dead-letter file cannot be replayed or a worker
    /// cannot be spawned.
    pub fn with_dead_letter_files(
        config: SaverConfig,
        store: Arc<dyn PersistentStore>,
        files: Vec<DeadLetterFile>,
    ) -> SaverResult<Arc<Self>> {
        let stats = Arc::new(SaverStats::new());
        let mut savers: Vec<Arc<dyn SaverBase>> = Vec::with_capacity(files.len());
        for file in files {
            let saver = make_saver(file, Arc::clone(&store), Arc::clone(&stats))?;
            if savers.iter().any(|s| s.kind() == saver.kind()) {
                warn!(kind = %saver.kind(), "duplicate dead-letter file ignored");
                continue;
            }
            saver.load_dead_letter()?;
            savers.push(saver);
        }
        savers.sort_by_key(|saver| saver.kind());

        let shared = Arc::new(Shared {
            config,
            savers,
            stats,
            signal: Mutex::new(Signal::default()),
            wakeup: Condvar::new(),
            last_erase: Mutex::new(Instant::now()),
        });

        let controller = Arc::new(Self {
            shared: Arc::clone(&shared),
            workers: Mutex::new(Vec::new()),
            shut_down: RwLock::new(false),
        });

        for index in 0..shared.config.thread_count.max(1) {
            let worker_shared = Arc::clone(&shared);
            let handle = thread::Builder::new()
                .name(format!("log-saver-{index}"))
                .spawn(move || worker_shared.run_worker(index))
                .map_err(SaverError::Spawn)?;
            controller.workers.lock().push(handle);
        }

        info!(
            workers = shared.config.thread_count.max(1),
            kinds = shared.savers.len(),
            "saver controller started"
        );
        Ok(controller)
    }

    /// Kinds with a registered saver.
    pub fn kinds(&self) -> Vec<LogKind> {
        self.shared.savers.iter().map(|saver| saver.kind()).collect()
    }

    /// Caches typed records for a tenant and wakes a worker.
    ///
    /// Returns false if no saver is registered for `T` or the controller
    /// has shut down.
    pub fn add<T: LogRecord>(&self, scheme_id: u32, records: Vec<T>) -> bool {
        self.add_batch(scheme_id, T::into_batch(records))
    }

    /// Caches a kind-tagged batch for a tenant and wakes a worker.
    ///
    /// Returns false if no saver is registered for the batch kind or the
    /// controller has shut down.
    pub fn add_batch(&self, scheme_id: u32, batch: LogBatch) -> bool {
        match self.try_add_batch(scheme_id, batch) {
            Ok(()) => true,
            Err(e) => {
                warn!(scheme_id, error = %e, "batch not cached");
                false
            }
        }
    }

    fn try_add_batch(&self, scheme_id: u32, batch: LogBatch) -> SaverResult<()> {
        let shut_down = self.shut_down.read();
        if *shut_down {
            return Err(SaverError::ShutDown);
        }
        let kind = batch.kind();
        let saver = self.shared.saver(kind).ok_or(SaverError::NotRegistered(kind))?;
        saver.add_batch(scheme_id, batch)?;
        drop(shut_down);

        self.shared.signal.lock().dirty = true;
        self.shared.wakeup.notify_one();
        Ok(())
    }

    /// Copy of a tenant's pending records of type `T`.
    pub fn get_cache_data<T: LogRecord>(&self, scheme_id: u32) -> Vec<T> {
        self.shared
            .saver(T::KIND)
            .map(|saver| saver.cache_snapshot(scheme_id))
            .and_then(|batch| T::from_batch(batch).ok())
            .unwrap_or_default()
    }

    /// Returns true if no saver has pending records.
    pub fn is_data_empty(&self) -> bool {
        self.shared.savers.iter().all(|saver| saver.is_data_empty())
    }

    /// Returns true if no saver has any tenant entry.
    pub fn is_cache_empty(&self) -> bool {
        self.shared.savers.iter().all(|saver| saver.is_cache_empty())
    }

    /// Oldest pending entry across all savers.
    pub fn oldest_cache_time(&self) -> Option<Instant> {
        self.shared
            .savers
            .iter()
            .filter_map(|saver| saver.oldest_cache_time())
            .min()
    }

    /// Drops empty tenant entries in every saver. Returns how many.
    pub fn erase_empty_cache(&self) -> usize {
        self.shared.erase_empty()
    }

    /// Flushes every saver now, on the calling thread, ignoring dwell time.
    ///
    /// Savers a worker is flushing at that moment are skipped.
    pub fn flush_all(&self) -> FlushReport {
        let mut total = FlushReport::default();
        for saver in &self.shared.savers {
            if !saver.try_begin_flush() {
                continue;
            }
            let report = saver.flush();
            saver.end_flush();
            total.tenants += report.tenants;
            total.records_flushed += report.records_flushed;
            total.records_spilled += report.records_spilled;
            total.records_lost += report.records_lost;
        }
        total
    }

    /// Current counters.
    pub fn stats(&self) -> SaverStatsSnapshot {
        self.shared.stats.snapshot()
    }

    /// Asks the workers to exit after their current flush.
    pub fn stop(&self) {
        self.shared.signal.lock().stop = true;
        self.shared.wakeup.notify_all();
    }

    /// Waits for every worker to exit.
    pub fn join(&self) {
        let handles: Vec<JoinHandle<()>> = self.workers.lock().drain(..).collect();
        for handle in handles {
            if handle.join().is_err() {
                error!("saver worker panicked");
            }
        }
    }

    /// Stops and joins the workers, then flushes every saver one last time.
    ///
    /// Idempotent. Later `add` calls return false.
    pub fn shutdown(&self) {
        // waits for adds in progress
        let mut shut_down = self.shut_down.write();
        if *shut_down {
            return;
        }
        *shut_down = true;
        drop(shut_down);

        self.stop();
        self.join();

        let report = self.flush_all();
        info!(
            flushed = report.records_flushed,
            spilled = report.records_spilled,
            lost = report.records_lost,
            "saver controller shut down"
        );
    }
}

impl Drop for SaverController {
    fn drop(&mut self) {
        self.shutdown();
    }
}

fn make_saver(
    file: DeadLetterFile,
    store: Arc<dyn PersistentStore>,
    stats: Arc<SaverStats>,
) -> SaverResult<Arc<dyn SaverBase>> {
    let saver: Arc<dyn SaverBase> = match file.kind() {
        LogKind::Value => Arc::new(Saver::<LogValue>::new(store, file, stats)?),
        LogKind::Event => Arc::new(Saver::<LogEvent>::new(store, file, stats)?),
        LogKind::Param => Arc::new(Saver::<LogParam>::new(store, file, stats)?),
        LogKind::Status => Arc::new(Saver::<LogStatus>::new(store, file, stats)?),
        LogKind::Mode => Arc::new(Saver::<LogMode>::new(store, file, stats)?),
    };
    Ok(saver)
}
