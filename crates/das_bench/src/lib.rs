//! Benchmark utilities.

#![warn(missing_docs)]

use das_log_protocol::{EventSeverity, InsertStatement, LogEvent, LogHeader, LogKind, LogValue};
use das_log_saver::{DeadLetterFile, PersistentStore, Saver, SaverResult, SaverStats, StoreResult};
use das_storage::InMemoryBackend;
use rand::Rng;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

/// Generate device readings spread over `items` item ids.
pub fn generate_values(count: usize, items: u32) -> Vec<LogValue> {
    let mut rng = rand::thread_rng();
    (0..count)
        .map(|i| {
            let raw: i64 = rng.gen_range(0..4096);
            LogValue::new(
                LogHeader::new(1_700_000_000_000 + i as i64).with_user(1),
                rng.gen_range(0..items.max(1)),
                raw as f64 / 10.0,
                raw,
            )
        })
        .collect()
}

/// Generate events with text of roughly `text_len` characters.
pub fn generate_events(count: usize, text_len: usize) -> Vec<LogEvent> {
    let mut rng = rand::thread_rng();
    (0..count)
        .map(|i| {
            let text: String = (0..text_len)
                .map(|_| char::from(rng.gen_range(b'a'..=b'z')))
                .collect();
            LogEvent::new(
                LogHeader::new(1_700_000_000_000 + i as i64),
                rng.gen_range(1..500),
                EventSeverity::Warning,
                text,
            )
        })
        .collect()
}

/// Store that counts rows and keeps nothing.
#[derive(Debug, Default)]
pub struct DiscardStore {
    rows: AtomicU64,
}

impl DiscardStore {
    /// Rows received so far.
    pub fn rows(&self) -> u64 {
        self.rows.load(Ordering::Relaxed)
    }
}

impl PersistentStore for DiscardStore {
    fn bulk_insert(&self, statement: &InsertStatement) -> StoreResult<()> {
        self.rows.fetch_add(statement.row_count as u64, Ordering::Relaxed);
        Ok(())
    }
}

/// A reading saver over a [`DiscardStore`] and in-memory dead-letter file.
pub fn memory_value_saver() -> SaverResult<(Saver<LogValue>, Arc<DiscardStore>)> {
    let store = Arc::new(DiscardStore::default());
    let dead_letter = DeadLetterFile::with_backends(
        LogKind::Value,
        Box::new(InMemoryBackend::new()),
        Box::new(InMemoryBackend::new()),
    );
    let saver = Saver::new(store.clone(), dead_letter, Arc::new(SaverStats::new()))?;
    Ok((saver, store))
}
