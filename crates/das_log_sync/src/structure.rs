//! In-memory device structure state fed by real-time logs.

use das_codec::Value;
use das_log_protocol::LogBatch;
use parking_lot::RwLock;
use std::collections::{BTreeMap, HashMap};

/// Latest reported value of a device item.
#[derive(Debug, Clone, PartialEq)]
pub struct ItemValue {
    /// Engineering value.
    pub value: Value,
    /// Raw sensor value.
    pub raw_value: Value,
    /// When the value was measured.
    pub timestamp_msecs: i64,
}

#[derive(Debug, Default)]
struct Inner {
    values: HashMap<u32, ItemValue>,
    params: HashMap<(u32, u32), String>,
    statuses: HashMap<u32, BTreeMap<u32, Vec<String>>>,
    modes: HashMap<u32, u32>,
}

/// Current values, parameters, statuses and modes of one tenant's devices.
///
/// Events carry no state and are ignored. Item values are only replaced by
/// a value at least as recent as the stored one.
#[derive(Debug, Default)]
pub struct StructureState {
    inner: RwLock<Inner>,
}

impl StructureState {
    /// Creates an empty state.
    pub fn new() -> Self {
        Self::default()
    }

    /// Applies a batch. Returns the number of records that changed state.
    pub fn apply(&self, batch: &LogBatch) -> usize {
        let mut inner = self.inner.write();
        let mut changed = 0;
        match batch {
            LogBatch::Value(records) => {
                for record in records {
                    let stale = inner
                        .values
                        .get(&record.item_id)
                        .is_some_and(|current| current.timestamp_msecs > record.header.timestamp_msecs);
                    if stale {
                        continue;
                    }
                    inner.values.insert(
                        record.item_id,
                        ItemValue {
                            value: record.value.clone(),
                            raw_value: record.raw_value.clone(),
                            timestamp_msecs: record.header.timestamp_msecs,
                        },
                    );
                    changed += 1;
                }
            }
            LogBatch::Event(_) => {}
            LogBatch::Param(records) => {
                for record in records {
                    inner
                        .params
                        .insert((record.group_id, record.param_id), record.value.clone());
                    changed += 1;
                }
            }
            LogBatch::Status(records) => {
                for record in records {
                    let group = inner.statuses.entry(record.group_id).or_default();
                    if record.removed {
                        if group.remove(&record.status_id).is_some() {
                            changed += 1;
                        }
                    } else {
                        group.insert(record.status_id, record.args.clone());
                        changed += 1;
                    }
                }
                inner.statuses.retain(|_, group| !group.is_empty());
            }
            LogBatch::Mode(records) => {
                for record in records {
                    inner.modes.insert(record.group_id, record.mode_id);
                    changed += 1;
                }
            }
        }
        changed
    }

    /// Latest value of an item.
    pub fn item_value(&self, item_id: u32) -> Option<ItemValue> {
        self.inner.read().values.get(&item_id).cloned()
    }

    /// Current value of a parameter.
    pub fn param(&self, group_id: u32, param_id: u32) -> Option<String> {
        self.inner.read().params.get(&(group_id, param_id)).cloned()
    }

    /// Active statuses of a group with their arguments, by status id.
    pub fn active_statuses(&self, group_id: u32) -> Vec<(u32, Vec<String>)> {
        self.inner
            .read()
            .statuses
            .get(&group_id)
            .map(|group| group.iter().map(|(id, args)| (*id, args.clone())).collect())
            .unwrap_or_default()
    }

    /// Current mode of a group.
    pub fn mode(&self, group_id: u32) -> Option<u32> {
        self.inner.read().modes.get(&group_id).copied()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use das_log_protocol::{LogEvent, LogHeader, LogMode, LogParam, LogStatus, LogValue, EventSeverity};

    #[test]
    fn values_keep_the_newest() {
        let state = StructureState::new();
        state.apply(&LogBatch::Value(vec![
            LogValue::new(LogHeader::new(20), 5, 2.5, 250),
            LogValue::new(LogHeader::new(10), 5, 1.0, 100),
        ]));

        let current = state.item_value(5).unwrap();
        assert_eq!(current.timestamp_msecs, 20);
        assert_eq!(current.value, Value::Float(2.5));
        assert!(state.item_value(6).is_none());
    }

    #[test]
    fn statuses_are_raised_and_cleared() {
        let state = StructureState::new();
        let raised = state.apply(&LogBatch::Status(vec![
            LogStatus::raised(LogHeader::new(1), 2, 10, vec!["pump 1".into()]),
            LogStatus::raised(LogHeader::new(2), 2, 11, Vec::new()),
        ]));
        assert_eq!(raised, 2);
        assert_eq!(
            state.active_statuses(2),
            vec![(10, vec!["pump 1".to_string()]), (11, Vec::new())]
        );

        state.apply(&LogBatch::Status(vec![
            LogStatus::cleared(LogHeader::new(3), 2, 10),
            LogStatus::cleared(LogHeader::new(4), 2, 11),
        ]));
        assert!(state.active_statuses(2).is_empty());

        let unknown = state.apply(&LogBatch::Status(vec![LogStatus::cleared(LogHeader::new(5), 3, 1)]));
        assert_eq!(unknown, 0);
    }

    #[test]
    fn params_and_modes_overwrite() {
        let state = StructureState::new();
        state.apply(&LogBatch::Param(vec![
            LogParam::new(LogHeader::new(1), 1, 7, "20.5"),
            LogParam::new(LogHeader::new(2), 1, 7, "21.0"),
        ]));
        state.apply(&LogBatch::Mode(vec![LogMode::new(LogHeader::new(3), 4, 2)]));

        assert_eq!(state.param(1, 7).as_deref(), Some("21.0"));
        assert_eq!(state.mode(4), Some(2));
        assert_eq!(state.mode(5), None);
    }

    #[test]
    fn events_change_nothing() {
        let state = StructureState::new();
        let changed = state.apply(&LogBatch::Event(vec![LogEvent::new(
            LogHeader::new(1),
            3,
            EventSeverity::Info,
            "door opened",
        )]));
        assert_eq!(changed, 0);
    }
}
