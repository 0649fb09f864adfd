//! Property-based test generators using proptest.
//!
//! Strategies produce records that survive the wire and insert layouts:
//! finite floats, status arguments without line breaks.

use das_codec::Value;
use das_log_protocol::{
    EventSeverity, LogBatch, LogEvent, LogHeader, LogKind, LogMode, LogParam, LogStatus, LogValue,
};
use proptest::prelude::*;

/// Strategy for log kinds.
pub fn log_kind_strategy() -> impl Strategy<Value = LogKind> {
    prop::sample::select(LogKind::ALL.to_vec())
}

/// Strategy for headers with no tenant stamped.
pub fn header_strategy() -> impl Strategy<Value = LogHeader> {
    (0i64..4_102_444_800_000, 0u32..1000)
        .prop_map(|(ts, user)| LogHeader::new(ts).with_user(user))
}

/// Strategy for scalar reading values.
pub fn scalar_strategy() -> impl Strategy<Value = Value> {
    prop_oneof![
        Just(Value::Null),
        any::<bool>().prop_map(Value::Bool),
        any::<i64>().prop_map(Value::Integer),
        (-1.0e12f64..1.0e12).prop_map(Value::Float),
        "[ -~]{0,16}".prop_map(Value::Text),
    ]
}

/// Strategy for device readings.
pub fn log_value_strategy() -> impl Strategy<Value = LogValue> {
    (header_strategy(), any::<u32>(), scalar_strategy(), scalar_strategy())
        .prop_map(|(header, item, value, raw)| LogValue::new(header, item, value, raw))
}

/// Strategy for event severities.
pub fn severity_strategy() -> impl Strategy<Value = EventSeverity> {
    prop::sample::select(vec![
        EventSeverity::Info,
        EventSeverity::Warning,
        EventSeverity::Alarm,
        EventSeverity::Critical,
    ])
}

/// Strategy for events.
pub fn log_event_strategy() -> impl Strategy<Value = LogEvent> {
    (header_strategy(), any::<u32>(), severity_strategy(), "\\PC{0,40}")
        .prop_map(|(header, code, severity, text)| LogEvent::new(header, code, severity, text))
}

/// Strategy for parameter changes.
pub fn log_param_strategy() -> impl Strategy<Value = LogParam> {
    (header_strategy(), 0u32..64, 0u32..256, "[ -~]{0,24}")
        .prop_map(|(header, group, param, value)| LogParam::new(header, group, param, value))
}

/// Strategy for status changes.
pub fn log_status_strategy() -> impl Strategy<Value = LogStatus> {
    (
        header_strategy(),
        0u32..64,
        0u32..256,
        prop::collection::vec("[a-z0-9 \n]{0,8}", 0..4),
        any::<bool>(),
    )
        .prop_map(|(header, group, status, args, removed)| {
            if removed {
                LogStatus::cleared(header, group, status)
            } else {
                LogStatus::raised(header, group, status, args)
            }
        })
}

/// Strategy for mode switches.
pub fn log_mode_strategy() -> impl Strategy<Value = LogMode> {
    (header_strategy(), 0u32..64, 0u32..16)
        .prop_map(|(header, group, mode)| LogMode::new(header, group, mode))
}

/// Strategy for batches of one kind with up to `max_len` records.
pub fn batch_of_kind_strategy(kind: LogKind, max_len: usize) -> BoxedStrategy<LogBatch> {
    let len = 0..=max_len;
    match kind {
        LogKind::Value => prop::collection::vec(log_value_strategy(), len)
            .prop_map(LogBatch::Value)
            .boxed(),
        LogKind::Event => prop::collection::vec(log_event_strategy(), len)
            .prop_map(LogBatch::Event)
            .boxed(),
        LogKind::Param => prop::collection::vec(log_param_strategy(), len)
            .prop_map(LogBatch::Param)
            .boxed(),
        LogKind::Status => prop::collection::vec(log_status_strategy(), len)
            .prop_map(LogBatch::Status)
            .boxed(),
        LogKind::Mode => prop::collection::vec(log_mode_strategy(), len)
            .prop_map(LogBatch::Mode)
            .boxed(),
    }
}

/// Strategy for batches of any kind.
pub fn log_batch_strategy(max_len: usize) -> impl Strategy<Value = LogBatch> {
    log_kind_strategy().prop_flat_map(move |kind| batch_of_kind_strategy(kind, max_len))
}

/// Configuration for property tests.
#[derive(Debug, Clone)]
pub struct PropTestConfig {
    /// Number of test cases to run.
    pub cases: u32,
    /// Maximum shrink iterations.
    pub max_shrink_iters: u32,
}

impl Default for PropTestConfig {
    fn default() -> Self {
        Self {
            cases: 256,
            max_shrink_iters: 1000,
        }
    }
}

impl PropTestConfig {
    /// Creates a configuration for quick tests.
    #[must_use]
    pub fn quick() -> Self {
        Self {
            cases: 32,
            max_shrink_iters: 100,
        }
    }

    /// Converts to proptest config.
    #[must_use]
    pub fn to_proptest_config(&self) -> ProptestConfig {
        ProptestConfig {
            cases: self.cases,
            max_shrink_iters: self.max_shrink_iters,
            ..ProptestConfig::default()
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use das_codec::Encode;
    use das_log_protocol::{LogDataAnswer, LogPack};

    proptest! {
        #![proptest_config(PropTestConfig::quick().to_proptest_config())]

        #[test]
        fn answers_survive_the_wire(batch in log_batch_strategy(8), more in any::<bool>()) {
            let answer = LogDataAnswer::new(batch, more);
            let bytes = answer.encode().unwrap();
            prop_assert_eq!(LogDataAnswer::decode_checked(&bytes).unwrap(), answer);
        }

        #[test]
        fn stamping_reaches_every_insert_row(batch in log_batch_strategy(8), scheme in any::<u32>()) {
            let mut batch = batch;
            batch.stamp_scheme(scheme);
            let statement = batch.insert_statement();
            let column = statement.fields.iter().position(|f| *f == "scheme_id").unwrap();

            prop_assert_eq!(statement.row_count, batch.len());
            prop_assert_eq!(statement.values.len(), batch.len() * statement.fields.len());
            for row in statement.rows() {
                prop_assert_eq!(&row[column], &Value::from(scheme));
            }
        }

        #[test]
        fn stamped_pack_rows_decode_as_insert_rows(batch in log_batch_strategy(8), scheme in 1u32..100) {
            let pack = LogPack::new(batch);
            let mut received = LogPack::decode_checked(&pack.encode().unwrap()).unwrap();
            received.batch.stamp_scheme(scheme);

            let rows: Vec<Value> = received.batch.insert_rows().into_iter().map(Value::Array).collect();
            let decoded = LogBatch::from_insert_rows(received.batch.kind(), &rows).unwrap();
            prop_assert_eq!(decoded, received.batch);
        }
    }
}
