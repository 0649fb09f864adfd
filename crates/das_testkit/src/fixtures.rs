//! Test fixtures: a controllable store and ready-made controllers.
//!
//! Fixtures panic on setup failure; they are meant for tests only.

use das_log_protocol::{InsertStatement, LogKind};
use das_log_saver::{MemoryStore, PersistentStore, SaverConfig, SaverController, StoreError, StoreResult};
use das_log_sync::{MockConnection, SyncConfig, Synchronizer};
use parking_lot::Mutex;
use std::collections::HashSet;
use std::path::Path;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tempfile::TempDir;

/// A [`PersistentStore`] that can be taken offline, per tenant or entirely.
#[derive(Debug, Default)]
pub struct FlakyStore {
    inner: MemoryStore,
    offline: AtomicBool,
    blocked_tenants: Mutex<HashSet<u32>>,
    attempts: AtomicUsize,
    failures: AtomicUsize,
}

impl FlakyStore {
    /// Creates an online store.
    pub fn new() -> Self {
        Self::default()
    }

    /// Takes the whole store offline or back online.
    pub fn set_offline(&self, offline: bool) {
        self.offline.store(offline, Ordering::SeqCst);
    }

    /// Fails every insert containing a row of `scheme_id`.
    pub fn block_tenant(&self, scheme_id: u32) {
        self.blocked_tenants.lock().insert(scheme_id);
    }

    /// Lets inserts for `scheme_id` through again.
    pub fn unblock_tenant(&self, scheme_id: u32) {
        self.blocked_tenants.lock().remove(&scheme_id);
    }

    /// Committed statements.
    pub fn committed(&self) -> Vec<InsertStatement> {
        self.inner.committed()
    }

    /// Committed rows of `kind`.
    pub fn row_count(&self, kind: LogKind) -> usize {
        self.inner.row_count(kind)
    }

    /// Committed rows of `kind` belonging to `scheme_id`.
    pub fn tenant_row_count(&self, kind: LogKind, scheme_id: u32) -> usize {
        self.inner
            .committed()
            .iter()
            .filter(|statement| statement.kind == kind)
            .map(|statement| {
                statement
                    .rows()
                    .filter(|row| statement_scheme(statement, row) == Some(scheme_id))
                    .count()
            })
            .sum()
    }

    /// Inserts attempted, successful or not.
    pub fn attempts(&self) -> usize {
        self.attempts.load(Ordering::SeqCst)
    }

    /// Inserts refused.
    pub fn failures(&self) -> usize {
        self.failures.load(Ordering::SeqCst)
    }
}

fn statement_scheme(statement: &InsertStatement, row: &[das_codec::Value]) -> Option<u32> {
    let column = statement.fields.iter().position(|f| *f == "scheme_id")?;
    row.get(column)?
        .as_integer()
        .and_then(|id| u32::try_from(id).ok())
}

impl PersistentStore for FlakyStore {
    fn bulk_insert(&self, statement: &InsertStatement) -> StoreResult<()> {
        self.attempts.fetch_add(1, Ordering::SeqCst);
        if self.offline.load(Ordering::SeqCst) {
            self.failures.fetch_add(1, Ordering::SeqCst);
            return Err(StoreError::Unavailable("store offline".into()));
        }
        {
            let blocked = self.blocked_tenants.lock();
            let hit = statement
                .rows()
                .filter_map(|row| statement_scheme(statement, row))
                .find(|scheme| blocked.contains(scheme));
            if let Some(scheme) = hit {
                self.failures.fetch_add(1, Ordering::SeqCst);
                return Err(StoreError::Unavailable(format!("tenant {scheme} offline")));
            }
        }
        self.inner.bulk_insert(statement)
    }
}

/// Saver config for tests: flushes only on demand or at shutdown.
pub fn manual_flush_config(dir: &Path) -> SaverConfig {
    SaverConfig::new(dir)
        .with_thread_count(2)
        .with_min_flush_age(Duration::from_secs(3600))
        .with_max_cache_records(usize::MAX)
        .with_poll_interval(Duration::from_millis(20))
}

/// A saver controller over a [`FlakyStore`] in a temporary directory.
pub struct TestController {
    /// The controller.
    pub controller: Arc<SaverController>,
    /// The store behind it.
    pub store: Arc<FlakyStore>,
    config: SaverConfig,
    dir: TempDir,
}

impl TestController {
    /// Creates a controller that flushes only on demand.
    pub fn new() -> Self {
        Self::with_config(manual_flush_config)
    }

    /// Creates a controller from a config built for the temporary directory.
    pub fn with_config(config: impl FnOnce(&Path) -> SaverConfig) -> Self {
        let dir = TempDir::new().expect("Failed to create temp directory");
        let config = config(dir.path());
        let store = Arc::new(FlakyStore::new());
        let controller = SaverController::new(config.clone(), store.clone())
            .expect("Failed to start saver controller");
        Self {
            controller,
            store,
            config,
            dir,
        }
    }

    /// Dead-letter directory.
    pub fn dir(&self) -> &Path {
        self.dir.path()
    }

    /// Shuts the controller down and starts a fresh one on the same
    /// directory and store, replaying whatever was spilled.
    ///
    /// Every [`TestConnection`] made by [`connect`](Self::connect) must be
    /// dropped first: they keep the old controller's files locked.
    pub fn restart(self) -> Self {
        let Self {
            controller,
            store,
            config,
            dir,
        } = self;
        controller.shutdown();
        drop(controller);

        let controller = SaverController::new(config.clone(), store.clone())
            .expect("Failed to restart saver controller");
        Self {
            controller,
            store,
            config,
            dir,
        }
    }

    /// Attaches a synchronizer for an agent of `scheme_id`.
    pub fn connect(&self, scheme_id: u32, config: SyncConfig) -> TestConnection {
        let connection = Arc::new(MockConnection::new(scheme_id));
        let sync = Synchronizer::new(
            config,
            connection.clone(),
            self.controller.clone(),
            self.store.clone(),
        )
        .expect("Failed to start synchronizer");
        TestConnection { sync, connection }
    }
}

impl Default for TestController {
    fn default() -> Self {
        Self::new()
    }
}

/// A synchronizer wired to a [`MockConnection`].
pub struct TestConnection {
    /// The synchronizer.
    pub sync: Synchronizer,
    /// The connection it talks through.
    pub connection: Arc<MockConnection>,
}

impl TestConnection {
    /// Waits until every queued history insert has run.
    pub fn settle(&self) {
        assert!(
            self.sync.store_thread().wait_idle(Duration::from_secs(5)),
            "store thread did not drain"
        );
    }
}

impl std::ops::Deref for TestConnection {
    type Target = Synchronizer;

    fn deref(&self) -> &Self::Target {
        &self.sync
    }
}
