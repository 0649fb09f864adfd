//! Cross-crate integration helpers.
//!
//! [`MockAgent`] plays the device side of a connection: it holds a history
//! backlog per kind and answers the requests a [`Synchronizer`] sends
//! through its [`MockConnection`].

use das_codec::Encode;
use das_log_protocol::{LogBatch, LogDataAnswer, LogKind, LogPack};
use das_log_sync::{MockConnection, SyncResult, Synchronizer};
use parking_lot::Mutex;
use std::collections::{HashMap, VecDeque};
use std::time::Duration;

/// Encodes a `LOG_PACK` payload.
pub fn pack_payload(batch: LogBatch) -> Vec<u8> {
    LogPack::new(batch).encode().expect("Failed to encode pack")
}

/// Encodes a `LOG_DATA` payload.
pub fn answer_payload(batch: LogBatch, more: bool) -> Vec<u8> {
    LogDataAnswer::new(batch, more)
        .encode()
        .expect("Failed to encode answer")
}

/// Simulated agent with a history backlog.
#[derive(Debug, Default)]
pub struct MockAgent {
    backlog: Mutex<HashMap<LogKind, VecDeque<LogBatch>>>,
    answered: Mutex<usize>,
    next_msg_id: Mutex<u64>,
}

impl MockAgent {
    /// Creates an agent with no history.
    pub fn new() -> Self {
        Self::default()
    }

    /// Queues a chunk of history; each request is answered with one chunk.
    pub fn push_history(&self, batch: LogBatch) {
        self.backlog
            .lock()
            .entry(batch.kind())
            .or_default()
            .push_back(batch);
    }

    /// Chunks not yet delivered for `kind`.
    pub fn remaining(&self, kind: LogKind) -> usize {
        self.backlog.lock().get(&kind).map_or(0, VecDeque::len)
    }

    fn next_answer(&self, kind: LogKind) -> (LogBatch, bool) {
        let mut backlog = self.backlog.lock();
        let queue = backlog.entry(kind).or_default();
        let batch = queue.pop_front().unwrap_or_else(|| LogBatch::empty(kind));
        (batch, !queue.is_empty())
    }

    /// Answers every request not answered yet, until the synchronizer stops
    /// asking. Returns the number of answers sent.
    ///
    /// # Errors
    ///
    /// Returns the first error the synchronizer reports.
    pub fn serve(&self, connection: &MockConnection, sync: &Synchronizer) -> SyncResult<usize> {
        let mut sent = 0;
        loop {
            let requests = connection.requests();
            let pending: Vec<_> = {
                let answered = self.answered.lock();
                requests.into_iter().skip(*answered).collect()
            };
            if pending.is_empty() {
                return Ok(sent);
            }
            for (request_id, request) in pending {
                *self.answered.lock() += 1;
                let (batch, more) = self.next_answer(request.kind);
                let msg_id = {
                    let mut next = self.next_msg_id.lock();
                    *next += 1;
                    *next
                };
                sync.process_data(request.kind, request_id, &answer_payload(batch, more), msg_id)?;
                sent += 1;
            }
            // Chained requests are sent from the store thread.
            sync.store_thread().wait_idle(Duration::from_secs(5));
        }
    }
}
