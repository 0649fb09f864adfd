//! Durability and scheduling tests for the saver controller.

use das_codec::Value;
use das_log_protocol::{
    EventSeverity, InsertStatement, LogEvent, LogHeader, LogKind, LogMode, LogRecord, LogValue,
};
use das_log_saver::dead_letter::scan_entries;
use das_log_saver::{
    DeadLetterFile, MemoryStore, PersistentStore, Saver, SaverConfig, SaverController, SaverStats,
    StoreError, StoreResult,
};
use std::collections::HashSet;
use std::sync::Arc;
use std::thread;
use std::time::{Duration, Instant};
use tempfile::tempdir;

/// Fails every insert whose rows belong to a blocked tenant.
#[derive(Default)]
struct TenantFilterStore {
    inner: MemoryStore,
    blocked: parking_lot::Mutex<HashSet<u32>>,
}

impl TenantFilterStore {
    fn block(&self, scheme_id: u32) {
        self.blocked.lock().insert(scheme_id);
    }
}

impl PersistentStore for TenantFilterStore {
    fn bulk_insert(&self, statement: &InsertStatement) -> StoreResult<()> {
        let scheme_column = statement
            .fields
            .iter()
            .position(|f| *f == "scheme_id")
            .unwrap_or(2);
        let blocked = self.blocked.lock();
        for row in statement.rows() {
            if let Some(Value::Integer(scheme_id)) = row.get(scheme_column) {
                if blocked.contains(&(*scheme_id as u32)) {
                    return Err(StoreError::Unavailable(format!("tenant {scheme_id} offline")));
                }
            }
        }
        drop(blocked);
        self.inner.bulk_insert(statement)
    }
}

fn event(ts: i64, text: &str) -> LogEvent {
    LogEvent::new(LogHeader::new(ts), 10, EventSeverity::Alarm, text)
}

fn wait_until(timeout: Duration, mut condition: impl FnMut() -> bool) -> bool {
    let deadline = Instant::now() + timeout;
    while Instant::now() < deadline {
        if condition() {
            return true;
        }
        thread::sleep(Duration::from_millis(5));
    }
    condition()
}

#[test]
fn failed_tenant_lands_in_dead_letter_file() {
    let dir = tempdir().unwrap();
    let store = Arc::new(TenantFilterStore::default());
    store.block(9);

    let dead_letter = DeadLetterFile::open(dir.path(), LogKind::Event).unwrap();
    let saver: Saver<LogEvent> =
        Saver::new(store.clone(), dead_letter, Arc::new(SaverStats::new())).unwrap();

    saver.add(7, vec![event(1, "e1"), event(2, "e2")]);
    saver.add(9, vec![event(3, "e3")]);
    let report = saver.flush();

    assert_eq!(report.records_flushed, 2);
    assert_eq!(report.records_spilled, 1);
    assert!(saver.get_cache_data(7).is_empty());
    assert!(saver.get_cache_data(9).is_empty());

    let committed = store.inner.committed();
    assert_eq!(committed.len(), 1);
    assert_eq!(committed[0].row_count, 2);

    let bytes = std::fs::read(dir.path().join("fail_log_2.dat")).unwrap();
    let scan = scan_entries(&bytes);
    assert_eq!(scan.entries.len(), 1);
    let Value::Array(row) = &scan.entries[0].rows[0] else {
        panic!("row is not an array");
    };
    let spilled = LogEvent::from_insert_row(row).unwrap();
    assert_eq!(spilled.text, "e3");
    assert_eq!(spilled.header.scheme_id, 9);
}

#[test]
fn spilled_records_replay_on_next_start() {
    let dir = tempdir().unwrap();
    let config = SaverConfig::new(dir.path())
        .with_thread_count(2)
        .with_min_flush_age(Duration::from_secs(3600));

    let offline = Arc::new(MemoryStore::new());
    offline.set_unavailable(true);
    {
        let controller = SaverController::new(config.clone(), offline.clone()).unwrap();
        assert!(controller.add(3, vec![LogMode::new(LogHeader::new(5), 1, 4)]));
        assert!(controller.add(3, vec![event(6, "lost connection")]));
        controller.shutdown();

        let stats = controller.stats();
        assert_eq!(stats.records_spilled, 2);
        assert_eq!(stats.dead_letter_pending, 2);
        assert!(controller.is_data_empty());
    }

    let online = Arc::new(MemoryStore::new());
    let controller = SaverController::new(config, online.clone()).unwrap();
    assert_eq!(online.row_count(LogKind::Mode), 1);
    assert_eq!(online.row_count(LogKind::Event), 1);
    assert_eq!(controller.stats().records_replayed, 2);
    assert_eq!(controller.stats().dead_letter_pending, 0);

    for kind in [LogKind::Mode, LogKind::Event] {
        let path = dir.path().join(kind.dead_letter_file_name());
        assert!(std::fs::read(path).unwrap().is_empty());
    }
}

#[test]
fn backlog_survives_a_start_with_store_still_down() {
    let dir = tempdir().unwrap();
    let config = SaverConfig::new(dir.path()).with_kinds([LogKind::Event]);

    let store = Arc::new(MemoryStore::new());
    store.set_unavailable(true);
    {
        let controller = SaverController::new(config.clone(), store.clone()).unwrap();
        controller.add(1, vec![event(1, "a")]);
        controller.add(2, vec![event(2, "b")]);
        controller.shutdown();
    }

    {
        let controller = SaverController::new(config.clone(), store.clone()).unwrap();
        assert_eq!(controller.stats().records_replayed, 0);
        assert_eq!(controller.stats().dead_letter_pending, 2);
    }

    store.set_unavailable(false);
    let controller = SaverController::new(config, store.clone()).unwrap();
    assert_eq!(controller.stats().records_replayed, 2);
    assert_eq!(store.row_count(LogKind::Event), 2);
}

#[test]
fn truncated_tail_does_not_block_replay() {
    let dir = tempdir().unwrap();
    let path = dir.path().join(LogKind::Mode.dead_letter_file_name());

    let rows = vec![LogMode::new(LogHeader::new(1).with_scheme(4), 2, 3).insert_row()];
    let mut bytes = das_log_saver::dead_letter::encode_entry(&rows).unwrap();
    let whole = bytes.clone();
    bytes.extend_from_slice(&whole[..whole.len() / 2]);
    std::fs::write(&path, &bytes).unwrap();

    let store = Arc::new(MemoryStore::new());
    let controller =
        SaverController::new(SaverConfig::new(dir.path()).with_kinds([LogKind::Mode]), store.clone()).unwrap();

    assert_eq!(store.row_count(LogKind::Mode), 1);
    assert_eq!(controller.stats().quarantined_bytes, 0);
    assert!(std::fs::read(&path).unwrap().is_empty());
}

#[test]
fn spills_behind_a_torn_entry_replay_on_next_start() {
    let dir = tempdir().unwrap();
    let path = dir.path().join(LogKind::Mode.dead_letter_file_name());
    let entry = |ts: i64| {
        let rows = vec![LogMode::new(LogHeader::new(ts).with_scheme(4), 2, 3).insert_row()];
        das_log_saver::dead_letter::encode_entry(&rows).unwrap()
    };

    let mut bytes = entry(1);
    let torn = entry(2);
    let torn = &torn[..torn.len() / 2];
    bytes.extend_from_slice(torn);
    bytes.extend(entry(3));
    bytes.extend(entry(4));
    std::fs::write(&path, &bytes).unwrap();

    let store = Arc::new(MemoryStore::new());
    let controller =
        SaverController::new(SaverConfig::new(dir.path()).with_kinds([LogKind::Mode]), store.clone()).unwrap();

    assert_eq!(store.row_count(LogKind::Mode), 3);
    assert_eq!(controller.stats().records_replayed, 3);
    assert_eq!(controller.stats().quarantined_bytes, torn.len() as u64);
    assert!(std::fs::read(&path).unwrap().is_empty());
    let corrupt = std::fs::read(dir.path().join("fail_log_5.dat.corrupt")).unwrap();
    assert_eq!(corrupt, torn);
}

#[test]
fn slow_kind_is_not_starved_by_a_busy_one() {
    let dir = tempdir().unwrap();
    let store = Arc::new(MemoryStore::new());
    let config = SaverConfig::new(dir.path())
        .with_thread_count(1)
        .with_min_flush_age(Duration::from_millis(20))
        .with_max_cache_records(5)
        .with_poll_interval(Duration::from_millis(5));
    let controller = SaverController::new(config, store.clone()).unwrap();

    assert!(controller.add(1, vec![LogMode::new(LogHeader::new(0), 1, 1)]));

    let producer = {
        let controller = Arc::clone(&controller);
        let store = store.clone();
        thread::spawn(move || {
            let deadline = Instant::now() + Duration::from_secs(5);
            let mut ts = 0;
            while store.row_count(LogKind::Mode) == 0 && Instant::now() < deadline {
                let batch: Vec<LogValue> = (0..10)
                    .map(|i| {
                        ts += 1;
                        LogValue::new(LogHeader::new(ts), i, 1.5, 15)
                    })
                    .collect();
                controller.add(1, batch);
                thread::sleep(Duration::from_millis(1));
            }
        })
    };

    let mode_flushed = wait_until(Duration::from_secs(5), || store.row_count(LogKind::Mode) == 1);
    producer.join().unwrap();
    assert!(mode_flushed, "mode record starved by value traffic");
    assert!(store.row_count(LogKind::Value) > 0);
}

#[test]
fn second_controller_on_same_directory_is_refused() {
    let dir = tempdir().unwrap();
    let config = SaverConfig::new(dir.path());
    let _first = SaverController::new(config.clone(), Arc::new(MemoryStore::new())).unwrap();
    let second = SaverController::new(config, Arc::new(MemoryStore::new()));
    assert!(matches!(
        second,
        Err(das_log_saver::SaverError::Storage(das_storage::StorageError::Locked { .. }))
    ));
}
