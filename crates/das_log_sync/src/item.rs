//! Gap-fill state machine for one log kind on one connection.
//!
//! A [`SyncItem`] is either idle or waiting on exactly one outstanding
//! `LOG_DATA_REQUEST`. The answer, a transport timeout and a stale-request
//! sweep in [`SyncItem::check`] all lead back to idle; the outstanding
//! request id decides which of them gets to perform the transition. An
//! answer to an earlier, already expired request is still stored but leaves
//! the current request outstanding.
//!
//! History answers are inserted on the [`StoreThread`] and acknowledged only
//! once the insert succeeded. Real-time packs go to the saver controller.

use crate::config::SyncConfig;
use crate::connection::LogConnection;
use crate::error::{SyncError, SyncResult};
use crate::observer::{LogNotification, ObserverRegistry};
use crate::stats::SyncStats;
use crate::store_thread::StoreThread;
use crate::structure::StructureState;
use das_log_protocol::{Command, LogDataAnswer, LogDataRequest, LogError, LogKind, LogPack};
use das_log_saver::{SaverController, StoreResult};
use parking_lot::Mutex;
use std::sync::{Arc, Weak};
use std::time::Instant;
use tracing::{debug, error, warn};

/// Everything the items of one connection share.
pub(crate) struct SyncContext {
    pub(crate) config: SyncConfig,
    pub(crate) connection: Arc<dyn LogConnection>,
    pub(crate) controller: Arc<SaverController>,
    pub(crate) store_thread: Arc<StoreThread>,
    pub(crate) observers: Arc<ObserverRegistry>,
    pub(crate) structure: Arc<StructureState>,
    pub(crate) stats: Arc<SyncStats>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum ItemState {
    Idle,
    Requesting { request_id: u64, sent_at: Instant },
}

/// Per-kind gap-fill state machine.
pub struct SyncItem {
    kind: LogKind,
    context: Arc<SyncContext>,
    state: Mutex<ItemState>,
    this: Weak<SyncItem>,
}

impl std::fmt::Debug for SyncItem {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SyncItem")
            .field("kind", &self.kind)
            .field("state", &*self.state.lock())
            .finish()
    }
}

impl SyncItem {
    pub(crate) fn new(kind: LogKind, context: Arc<SyncContext>) -> Arc<Self> {
        Arc::new_cyclic(|this| Self {
            kind,
            context,
            state: Mutex::new(ItemState::Idle),
            this: this.clone(),
        })
    }

    /// Kind handled by this item.
    pub fn kind(&self) -> LogKind {
        self.kind
    }

    /// Whether a request is outstanding.
    pub fn is_requesting(&self) -> bool {
        matches!(*self.state.lock(), ItemState::Requesting { .. })
    }

    /// Id of the outstanding request, if any.
    pub fn outstanding_request(&self) -> Option<u64> {
        match *self.state.lock() {
            ItemState::Idle => None,
            ItemState::Requesting { request_id, .. } => Some(request_id),
        }
    }

    fn scheme_id(&self) -> u32 {
        self.context.connection.scheme_id()
    }

    /// Requests the next chunk of history unless a request is outstanding.
    ///
    /// A request older than the configured timeout is expired first. Returns
    /// the id of the request sent, or `None` if one is still outstanding.
    ///
    /// # Errors
    ///
    /// Returns the connection's error if the request could not be sent; the
    /// item stays idle.
    pub fn check(&self) -> SyncResult<Option<u64>> {
        let mut state = self.state.lock();
        if let ItemState::Requesting { request_id, sent_at } = *state {
            if sent_at.elapsed() < self.context.config.request_timeout {
                return Ok(None);
            }
            self.expire(request_id);
            *state = ItemState::Idle;
        }

        // Sent under the lock so two concurrent checks cannot both request.
        let request_id = match self.context.connection.send_request(&LogDataRequest::new(self.kind)) {
            Ok(request_id) => request_id,
            Err(e) => {
                warn!(kind = %self.kind, scheme_id = self.scheme_id(), error = %e, "log request not sent");
                return Err(e);
            }
        };
        *state = ItemState::Requesting {
            request_id,
            sent_at: Instant::now(),
        };
        self.context.stats.record_request();
        debug!(kind = %self.kind, scheme_id = self.scheme_id(), request_id, "log request sent");
        Ok(Some(request_id))
    }

    /// Expires the outstanding request if it is `request_id`.
    ///
    /// Returns false if that request was already answered or expired.
    pub fn handle_timeout(&self, request_id: u64) -> bool {
        let mut state = self.state.lock();
        match *state {
            ItemState::Requesting { request_id: outstanding, .. } if outstanding == request_id => {
                self.expire(request_id);
                *state = ItemState::Idle;
                true
            }
            _ => false,
        }
    }

    fn expire(&self, request_id: u64) {
        self.context.stats.record_timeout();
        warn!(
            kind = %self.kind,
            scheme_id = self.scheme_id(),
            request_id,
            "log request timed out"
        );
    }

    /// Handles a `LOG_DATA` answer to request `request_id`.
    ///
    /// If `request_id` is the outstanding request the item returns to idle
    /// whatever the outcome. The insert runs on the store thread; the answer
    /// is acknowledged and the next request chained from there once the
    /// insert succeeded.
    ///
    /// # Errors
    ///
    /// Returns an error if the payload does not decode as an answer of this
    /// kind, or if the store thread has stopped.
    pub fn process_log_data(&self, request_id: u64, payload: &[u8], msg_id: u64) -> SyncResult<()> {
        self.settle(request_id);
        let answer = self.decode(LogDataAnswer::decode_checked(payload).and_then(|answer| {
            self.ensure_kind(answer.kind())?;
            Ok(answer)
        }))?;
        self.store_answer(answer, msg_id)
    }

    pub(crate) fn accept_answer(&self, request_id: u64, answer: LogDataAnswer, msg_id: u64) -> SyncResult<()> {
        self.settle(request_id);
        self.store_answer(answer, msg_id)
    }

    /// Returns to idle if `request_id` is the outstanding request.
    fn settle(&self, request_id: u64) {
        let mut state = self.state.lock();
        match *state {
            ItemState::Requesting { request_id: outstanding, .. } if outstanding == request_id => {
                *state = ItemState::Idle;
            }
            ItemState::Requesting { request_id: outstanding, .. } => {
                debug!(kind = %self.kind, request_id, outstanding, "late log answer");
            }
            ItemState::Idle => debug!(kind = %self.kind, request_id, "late log answer"),
        }
    }

    fn store_answer(&self, answer: LogDataAnswer, msg_id: u64) -> SyncResult<()> {
        let LogDataAnswer { mut batch, more } = answer;
        let scheme_id = self.scheme_id();
        if batch.is_empty() {
            warn!(kind = %self.kind, scheme_id, more, "empty log answer");
            return Ok(());
        }

        batch.stamp_scheme(scheme_id);
        let rows = batch.len();
        let statement = batch.insert_statement();
        let item = self.this.clone();
        self.context.store_thread.submit(statement, move |result| {
            if let Some(item) = item.upgrade() {
                item.finish_insert(result, msg_id, rows, more);
            }
        })
    }

    fn finish_insert(&self, result: StoreResult<()>, msg_id: u64, rows: usize, more: bool) {
        let scheme_id = self.scheme_id();
        if let Err(e) = result {
            self.context.stats.record_insert_failure();
            error!(kind = %self.kind, scheme_id, rows, error = %e, "log history insert failed");
            return;
        }

        self.context.stats.record_inserted(rows);
        debug!(kind = %self.kind, scheme_id, rows, more, "log history inserted");
        if let Err(e) = self.context.connection.send_answer(Command::LogData, msg_id) {
            warn!(kind = %self.kind, scheme_id, msg_id, error = %e, "log answer not acknowledged");
        }
        if more && self.context.config.chain_requests {
            match self.check() {
                Ok(Some(request_id)) => debug!(kind = %self.kind, scheme_id, request_id, "log request chained"),
                Ok(None) => {}
                Err(e) => debug!(kind = %self.kind, scheme_id, error = %e, "chained request skipped"),
            }
        }
    }

    /// Handles a `LOG_PACK` push.
    ///
    /// Returns true if the saver controller accepted the records. Accepted
    /// packs are acknowledged, applied to the structure state and delivered
    /// to observers, in that order.
    ///
    /// # Errors
    ///
    /// Returns an error if the payload does not decode as a pack of this kind.
    pub fn process_pack(&self, payload: &[u8], msg_id: u64) -> SyncResult<bool> {
        let pack = self.decode(LogPack::decode_checked(payload).and_then(|pack| {
            self.ensure_kind(pack.kind())?;
            Ok(pack)
        }))?;
        Ok(self.accept_pack(pack, msg_id))
    }

    pub(crate) fn accept_pack(&self, pack: LogPack, msg_id: u64) -> bool {
        let LogPack { mut batch } = pack;
        let scheme_id = self.scheme_id();
        if batch.is_empty() {
            debug!(kind = %self.kind, scheme_id, "empty log pack skipped");
            return false;
        }

        batch.stamp_scheme(scheme_id);
        let accepted = self.context.controller.add_batch(scheme_id, batch.clone());
        self.context.stats.record_pack(accepted);
        if !accepted {
            warn!(kind = %self.kind, scheme_id, rows = batch.len(), "log pack refused by saver");
            return false;
        }

        if let Err(e) = self.context.connection.send_answer(Command::LogPack, msg_id) {
            warn!(kind = %self.kind, scheme_id, msg_id, error = %e, "log pack not acknowledged");
        }
        self.context.structure.apply(&batch);
        self.context
            .observers
            .notify(&LogNotification::new(scheme_id, batch));
        true
    }

    fn ensure_kind(&self, found: LogKind) -> Result<(), LogError> {
        if found == self.kind {
            Ok(())
        } else {
            Err(LogError::KindMismatch {
                expected: self.kind,
                found,
            })
        }
    }

    fn decode<M>(&self, decoded: Result<M, LogError>) -> SyncResult<M> {
        decoded.map_err(|e| {
            self.context.stats.record_bad_payload();
            warn!(kind = %self.kind, scheme_id = self.scheme_id(), error = %e, "malformed log payload");
            SyncError::from(e)
        })
    }
}
