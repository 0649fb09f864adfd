//! Per-connection log synchronizer.

use crate::config::SyncConfig;
use crate::connection::LogConnection;
use crate::error::SyncResult;
use crate::item::{SyncContext, SyncItem};
use crate::observer::ObserverRegistry;
use crate::stats::{SyncStats, SyncStatsSnapshot};
use crate::store_thread::StoreThread;
use crate::structure::StructureState;
use das_log_protocol::{Command, LogKind, LogMessage};
use das_log_saver::{PersistentStore, SaverController};
use std::sync::Arc;
use tracing::{debug, warn};

/// Owns one [`SyncItem`] per log kind for a single agent connection.
///
/// The transport routes `LOG_DATA` and `LOG_PACK` payloads here, either by
/// kind through [`process_data`](Self::process_data) and
/// [`process_pack`](Self::process_pack), or by command framing through
/// [`handle_message`](Self::handle_message).
pub struct Synchronizer {
    context: Arc<SyncContext>,
    items: Vec<Arc<SyncItem>>,
}

impl std::fmt::Debug for Synchronizer {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Synchronizer")
            .field("scheme_id", &self.scheme_id())
            .field("items", &self.items)
            .finish()
    }
}

impl Synchronizer {
    /// Creates a synchronizer with its own store thread.
    ///
    /// # Errors
    ///
    /// Returns an error if the store thread cannot be spawned.
    pub fn new(
        config: SyncConfig,
        connection: Arc<dyn LogConnection>,
        controller: Arc<SaverController>,
        store: Arc<dyn PersistentStore>,
    ) -> SyncResult<Self> {
        let store_thread = Arc::new(StoreThread::spawn(store)?);
        Ok(Self::with_store_thread(config, connection, controller, store_thread))
    }

    /// Creates a synchronizer on a store thread shared with other connections.
    pub fn with_store_thread(
        config: SyncConfig,
        connection: Arc<dyn LogConnection>,
        controller: Arc<SaverController>,
        store_thread: Arc<StoreThread>,
    ) -> Self {
        let context = Arc::new(SyncContext {
            config,
            connection,
            controller,
            store_thread,
            observers: Arc::new(ObserverRegistry::new()),
            structure: Arc::new(StructureState::new()),
            stats: Arc::new(SyncStats::new()),
        });
        let items = LogKind::ALL
            .iter()
            .map(|kind| SyncItem::new(*kind, Arc::clone(&context)))
            .collect();
        Self { context, items }
    }

    /// Tenant of the connected agent.
    pub fn scheme_id(&self) -> u32 {
        self.context.connection.scheme_id()
    }

    /// Sync item handling `kind`.
    pub fn log_sync_item(&self, kind: LogKind) -> &Arc<SyncItem> {
        // Items are built in `LogKind::ALL` order, codes 1 to 5.
        &self.items[usize::from(kind.code()) - 1]
    }

    /// Runs [`SyncItem::check`] for every configured kind.
    ///
    /// Returns the number of requests sent. Send failures are logged and
    /// retried on the next check.
    pub fn check(&self) -> usize {
        let mut sent = 0;
        for kind in &self.context.config.kinds {
            match self.log_sync_item(*kind).check() {
                Ok(Some(_)) => sent += 1,
                Ok(None) => {}
                Err(e) => debug!(kind = %kind, error = %e, "check skipped"),
            }
        }
        sent
    }

    /// Routes a `LOG_DATA` answer to request `request_id` to the item for
    /// `kind`.
    ///
    /// # Errors
    ///
    /// See [`SyncItem::process_log_data`].
    pub fn process_data(&self, kind: LogKind, request_id: u64, payload: &[u8], msg_id: u64) -> SyncResult<()> {
        self.log_sync_item(kind).process_log_data(request_id, payload, msg_id)
    }

    /// Routes a `LOG_PACK` payload to the item for `kind`.
    ///
    /// # Errors
    ///
    /// See [`SyncItem::process_pack`].
    pub fn process_pack(&self, kind: LogKind, payload: &[u8], msg_id: u64) -> SyncResult<bool> {
        self.log_sync_item(kind).process_pack(payload, msg_id)
    }

    /// Routes a transport-reported timeout to the item for `kind`.
    pub fn handle_timeout(&self, kind: LogKind, request_id: u64) -> bool {
        self.log_sync_item(kind).handle_timeout(request_id)
    }

    /// Routes a payload by its command framing.
    ///
    /// Answers and pushes for the same kind are told apart by the command
    /// alone. `request_id` names the request a `LOG_DATA` answer replies to
    /// and is ignored for other commands. Requests are not expected from an
    /// agent and are ignored.
    ///
    /// # Errors
    ///
    /// Returns an error if the payload does not decode as `command`.
    pub fn handle_message(&self, command: Command, request_id: u64, payload: &[u8], msg_id: u64) -> SyncResult<()> {
        let message = LogMessage::decode(command, payload).inspect_err(|e| {
            self.context.stats.record_bad_payload();
            warn!(scheme_id = self.scheme_id(), ?command, error = %e, "malformed log message");
        })?;
        match message {
            LogMessage::Data(answer) => self
                .log_sync_item(answer.kind())
                .accept_answer(request_id, answer, msg_id),
            LogMessage::Pack(pack) => {
                self.log_sync_item(pack.kind()).accept_pack(pack, msg_id);
                Ok(())
            }
            LogMessage::Request(request) => {
                warn!(scheme_id = self.scheme_id(), kind = %request.kind, "unexpected log request from agent");
                Ok(())
            }
        }
    }

    /// Counters for this connection.
    pub fn stats(&self) -> SyncStatsSnapshot {
        self.context.stats.snapshot()
    }

    /// Structure state updated from accepted packs.
    pub fn structure(&self) -> &Arc<StructureState> {
        &self.context.structure
    }

    /// Observers notified of accepted packs.
    pub fn observers(&self) -> &Arc<ObserverRegistry> {
        &self.context.observers
    }

    /// Store thread running this connection's history inserts.
    pub fn store_thread(&self) -> &Arc<StoreThread> {
        &self.context.store_thread
    }

    /// Saver controller receiving this connection's packs.
    pub fn controller(&self) -> &Arc<SaverController> {
        &self.context.controller
    }
}
