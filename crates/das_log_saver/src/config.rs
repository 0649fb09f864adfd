//! Configuration for the saver controller.

use das_log_protocol::LogKind;
use std::path::PathBuf;
use std::time::Duration;

/// Configuration for the saver controller.
#[derive(Debug, Clone)]
pub struct SaverConfig {
    /// Number of background flush workers.
    pub thread_count: usize,
    /// Directory holding the `fail_log_<code>.dat` files.
    pub dead_letter_dir: PathBuf,
    /// Minimum time a tenant entry stays cached before it is flushed.
    pub min_flush_age: Duration,
    /// Pending record count at which a saver is flushed regardless of age.
    pub max_cache_records: usize,
    /// How long an idle worker sleeps before re-checking the savers.
    pub poll_interval: Duration,
    /// How often workers prune empty tenant entries.
    pub erase_empty_interval: Duration,
    /// Kinds a saver is registered for.
    pub kinds: Vec<LogKind>,
}

impl SaverConfig {
    /// Creates a configuration spilling into `dead_letter_dir`.
    pub fn new(dead_letter_dir: impl Into<PathBuf>) -> Self {
        Self {
            thread_count: 5,
            dead_letter_dir: dead_letter_dir.into(),
            min_flush_age: Duration::from_secs(1),
            max_cache_records: 1000,
            poll_interval: Duration::from_millis(250),
            erase_empty_interval: Duration::from_secs(60),
            kinds: LogKind::ALL.to_vec(),
        }
    }

    /// Sets the worker count. Zero is raised to one.
    pub fn with_thread_count(mut self, count: usize) -> Self {
        self.thread_count = count.max(1);
        self
    }

    /// Sets the minimum dwell time.
    pub fn with_min_flush_age(mut self, age: Duration) -> Self {
        self.min_flush_age = age;
        self
    }

    /// Sets the size threshold.
    pub fn with_max_cache_records(mut self, records: usize) -> Self {
        self.max_cache_records = records;
        self
    }

    /// Sets the idle poll interval.
    pub fn with_poll_interval(mut self, interval: Duration) -> Self {
        self.poll_interval = interval;
        self
    }

    /// Sets the empty-entry pruning interval.
    pub fn with_erase_empty_interval(mut self, interval: Duration) -> Self {
        self.erase_empty_interval = interval;
        self
    }

    /// Restricts the registered kinds.
    pub fn with_kinds(mut self, kinds: impl IntoIterator<Item = LogKind>) -> Self {
        self.kinds = kinds.into_iter().collect();
        self.kinds.sort();
        self.kinds.dedup();
        self
    }
}

impl Default for SaverConfig {
    fn default() -> Self {
        Self::new(".")
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_config() {
        let config = SaverConfig::default();
        assert_eq!(config.thread_count, 5);
        assert_eq!(config.dead_letter_dir, PathBuf::from("."));
        assert_eq!(config.kinds, LogKind::ALL.to_vec());
        assert!(config.poll_interval < config.erase_empty_interval);
    }

    #[test]
    fn saver_config_builder() {
        let config = SaverConfig::new("/var/lib/das")
            .with_thread_count(0)
            .with_min_flush_age(Duration::ZERO)
            .with_max_cache_records(10)
            .with_poll_interval(Duration::from_millis(5))
            .with_kinds([LogKind::Mode, LogKind::Event, LogKind::Mode]);

        assert_eq!(config.thread_count, 1);
        assert_eq!(config.min_flush_age, Duration::ZERO);
        assert_eq!(config.max_cache_records, 10);
        assert_eq!(config.poll_interval, Duration::from_millis(5));
        assert_eq!(config.kinds, vec![LogKind::Event, LogKind::Mode]);
    }
}
