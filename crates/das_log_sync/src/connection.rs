//! Peer connection abstraction.

use crate::error::{SyncError, SyncResult};
use das_log_protocol::{Command, LogDataRequest};
use parking_lot::Mutex;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};

/// The connection to one agent, as seen by the log synchronizer.
///
/// Sends must not block on the peer and must not deliver the peer's answer
/// synchronously from inside the call: answers come back later through
/// [`Synchronizer::process_data`](crate::Synchronizer::process_data).
pub trait LogConnection: Send + Sync {
    /// Tenant the connected agent belongs to.
    fn scheme_id(&self) -> u32;

    /// Sends a gap-fill request. Returns the request id a transport-side
    /// timeout will later be reported with.
    ///
    /// # Errors
    ///
    /// Returns an error if the request could not be queued.
    fn send_request(&self, request: &LogDataRequest) -> SyncResult<u64>;

    /// Acknowledges a received message.
    ///
    /// # Errors
    ///
    /// Returns an error if the acknowledgment could not be queued.
    fn send_answer(&self, command: Command, msg_id: u64) -> SyncResult<()>;

    /// Checks if the connection is up.
    fn is_connected(&self) -> bool;
}

/// A mock connection for testing.
///
/// Records every request and acknowledgment. Request ids count up from 1.
#[derive(Debug)]
pub struct MockConnection {
    scheme_id: u32,
    connected: AtomicBool,
    fail_sends: AtomicBool,
    next_request_id: AtomicU64,
    requests: Mutex<Vec<(u64, LogDataRequest)>>,
    answers: Mutex<Vec<(Command, u64)>>,
}

impl MockConnection {
    /// Creates a connected mock bound to a tenant.
    pub fn new(scheme_id: u32) -> Self {
        Self {
            scheme_id,
            connected: AtomicBool::new(true),
            fail_sends: AtomicBool::new(false),
            next_request_id: AtomicU64::new(1),
            requests: Mutex::new(Vec::new()),
            answers: Mutex::new(Vec::new()),
        }
    }

    /// Sets the connected state.
    pub fn set_connected(&self, connected: bool) {
        self.connected.store(connected, Ordering::SeqCst);
    }

    /// Makes every send fail with a retryable transport error while set.
    pub fn set_fail_sends(&self, fail: bool) {
        self.fail_sends.store(fail, Ordering::SeqCst);
    }

    /// Requests sent so far, with their ids.
    pub fn requests(&self) -> Vec<(u64, LogDataRequest)> {
        self.requests.lock().clone()
    }

    /// Acknowledgments sent so far.
    pub fn answers(&self) -> Vec<(Command, u64)> {
        self.answers.lock().clone()
    }

    /// Id of the most recent request.
    pub fn last_request_id(&self) -> Option<u64> {
        self.requests.lock().last().map(|(id, _)| *id)
    }

    fn check_sendable(&self) -> SyncResult<()> {
        if !self.is_connected() {
            return Err(SyncError::NotConnected);
        }
        if self.fail_sends.load(Ordering::SeqCst) {
            return Err(SyncError::transport_retryable("mock send failure"));
        }
        Ok(())
    }
}

impl LogConnection for MockConnection {
    fn scheme_id(&self) -> u32 {
        self.scheme_id
    }

    fn send_request(&self, request: &LogDataRequest) -> SyncResult<u64> {
        self.check_sendable()?;
        let id = self.next_request_id.fetch_add(1, Ordering::SeqCst);
        self.requests.lock().push((id, *request));
        Ok(id)
    }

    fn send_answer(&self, command: Command, msg_id: u64) -> SyncResult<()> {
        self.check_sendable()?;
        self.answers.lock().push((command, msg_id));
        Ok(())
    }

    fn is_connected(&self) -> bool {
        self.connected.load(Ordering::SeqCst)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use das_log_protocol::LogKind;

    #[test]
    fn mock_connection_records_traffic() {
        let connection = MockConnection::new(12);
        assert_eq!(connection.scheme_id(), 12);

        let first = connection.send_request(&LogDataRequest::new(LogKind::Mode)).unwrap();
        let second = connection.send_request(&LogDataRequest::new(LogKind::Event)).unwrap();
        assert_eq!((first, second), (1, 2));
        assert_eq!(connection.last_request_id(), Some(2));

        connection.send_answer(Command::LogPack, 40).unwrap();
        assert_eq!(connection.answers(), vec![(Command::LogPack, 40)]);
    }

    #[test]
    fn mock_connection_not_connected_error() {
        let connection = MockConnection::new(1);
        connection.set_connected(false);
        let result = connection.send_request(&LogDataRequest::new(LogKind::Value));
        assert!(matches!(result, Err(SyncError::NotConnected)));
        assert!(connection.requests().is_empty());
    }

    #[test]
    fn mock_connection_send_failure() {
        let connection = MockConnection::new(1);
        connection.set_fail_sends(true);
        let err = connection.send_answer(Command::LogData, 1).unwrap_err();
        assert!(err.is_retryable());
    }
}
