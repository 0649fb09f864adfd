//! Configuration for log synchronization.

use das_log_protocol::LogKind;
use std::time::Duration;

/// Configuration for a [`Synchronizer`](crate::Synchronizer).
#[derive(Debug, Clone)]
pub struct SyncConfig {
    /// How long a gap-fill request may stay unanswered.
    pub request_timeout: Duration,
    /// Kinds that are requested by [`check`](crate::Synchronizer::check).
    pub kinds: Vec<LogKind>,
    /// Whether an answer that reports more backlog triggers the next request.
    pub chain_requests: bool,
}

impl SyncConfig {
    /// Creates the default configuration.
    pub fn new() -> Self {
        Self {
            request_timeout: Duration::from_secs(15),
            kinds: LogKind::ALL.to_vec(),
            chain_requests: true,
        }
    }

    /// Sets the request timeout.
    pub fn with_request_timeout(mut self, timeout: Duration) -> Self {
        self.request_timeout = timeout;
        self
    }

    /// Restricts the kinds that are requested.
    pub fn with_kinds(mut self, kinds: impl IntoIterator<Item = LogKind>) -> Self {
        self.kinds = kinds.into_iter().collect();
        self
    }

    /// Enables or disables request chaining.
    pub fn with_chain_requests(mut self, chain: bool) -> Self {
        self.chain_requests = chain;
        self
    }
}

impl Default for SyncConfig {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_config() {
        let config = SyncConfig::default();
        assert_eq!(config.request_timeout, Duration::from_secs(15));
        assert_eq!(config.kinds.len(), 5);
        assert!(config.chain_requests);
    }

    #[test]
    fn sync_config_builder() {
        let config = SyncConfig::new()
            .with_request_timeout(Duration::from_millis(50))
            .with_kinds([LogKind::Value])
            .with_chain_requests(false);
        assert_eq!(config.request_timeout, Duration::from_millis(50));
        assert_eq!(config.kinds, vec![LogKind::Value]);
        assert!(!config.chain_requests);
    }
}
