//! CBOR encoding through `ciborium`.

use crate::error::{CodecError, CodecResult};
use crate::value::Value;
use ciborium::value::{Integer, Value as Cbor};

/// Encodes a value to CBOR bytes.
///
/// # Errors
///
/// Returns an error if the underlying writer fails.
pub fn to_cbor(value: &Value) -> CodecResult<Vec<u8>> {
    let mut buffer = Vec::new();
    ciborium::ser::into_writer(&to_cbor_value(value), &mut buffer)
        .map_err(|e| CodecError::encoding_failed(e.to_string()))?;
    Ok(buffer)
}

/// Decodes a value from CBOR bytes.
///
/// Tags are skipped and the tagged content is decoded in their place.
///
/// # Errors
///
/// Returns an error if the bytes are not valid CBOR or carry an integer
/// outside the `i64` range.
pub fn from_cbor(bytes: &[u8]) -> CodecResult<Value> {
    let cbor: Cbor =
        ciborium::de::from_reader(bytes).map_err(|e| CodecError::decoding_failed(e.to_string()))?;
    from_cbor_value(cbor)
}

fn to_cbor_value(value: &Value) -> Cbor {
    match value {
        Value::Null => Cbor::Null,
        Value::Bool(b) => Cbor::Bool(*b),
        Value::Integer(n) => Cbor::Integer(Integer::from(*n)),
        Value::Float(f) => Cbor::Float(*f),
        Value::Bytes(b) => Cbor::Bytes(b.clone()),
        Value::Text(s) => Cbor::Text(s.clone()),
        Value::Array(items) => Cbor::Array(items.iter().map(to_cbor_value).collect()),
        Value::Map(pairs) => Cbor::Map(
            pairs
                .iter()
                .map(|(k, v)| (to_cbor_value(k), to_cbor_value(v)))
                .collect(),
        ),
    }
}

fn from_cbor_value(cbor: Cbor) -> CodecResult<Value> {
    Ok(match cbor {
        Cbor::Null => Value::Null,
        Cbor::Bool(b) => Value::Bool(b),
        Cbor::Integer(n) => {
            let wide = i128::from(n);
            Value::Integer(i64::try_from(wide).map_err(|_| CodecError::IntegerOverflow)?)
        }
        Cbor::Float(f) => Value::Float(f),
        Cbor::Bytes(b) => Value::Bytes(b),
        Cbor::Text(s) => Value::Text(s),
        Cbor::Array(items) => Value::Array(
            items
                .into_iter()
                .map(from_cbor_value)
                .collect::<CodecResult<_>>()?,
        ),
        Cbor::Map(pairs) => Value::Map(
            pairs
                .into_iter()
                .map(|(k, v)| Ok((from_cbor_value(k)?, from_cbor_value(v)?)))
                .collect::<CodecResult<_>>()?,
        ),
        Cbor::Tag(_, inner) => from_cbor_value(*inner)?,
        other => {
            return Err(CodecError::decoding_failed(format!(
                "unsupported CBOR item: {other:?}"
            )))
        }
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;

    #[test]
    fn row_with_mixed_scalars() {
        let row = Value::Array(vec![
            Value::Integer(1_700_000_000_000),
            Value::Integer(0),
            Value::Float(-12.25),
            Value::Text("line1\nline2".into()),
            Value::Null,
            Value::Bool(true),
        ]);
        let bytes = to_cbor(&row).unwrap();
        assert_eq!(from_cbor(&bytes).unwrap(), row);
    }

    #[test]
    fn nested_message() {
        let msg = Value::map([
            ("kind", Value::Integer(3)),
            (
                "records",
                Value::Array(vec![Value::Array(vec![Value::Integer(5)])]),
            ),
        ]);
        let bytes = to_cbor(&msg).unwrap();
        let decoded = from_cbor(&bytes).unwrap();
        assert_eq!(decoded.get("kind"), Some(&Value::Integer(3)));
        assert_eq!(decoded, msg);
    }

    #[test]
    fn truncated_input_fails() {
        let bytes = to_cbor(&Value::Text("hello".into())).unwrap();
        let result = from_cbor(&bytes[..bytes.len() - 2]);
        assert!(matches!(result, Err(CodecError::DecodingFailed { .. })));
    }

    #[test]
    fn oversized_unsigned_is_rejected() {
        // 0x1b = unsigned, 8-byte argument; u64::MAX does not fit i64
        let bytes = [0x1b, 0xff, 0xff, 0xff, 0xff, 0xff, 0xff, 0xff, 0xff];
        assert_eq!(from_cbor(&bytes), Err(CodecError::IntegerOverflow));
    }

    fn scalar() -> impl Strategy<Value = Value> {
        prop_oneof![
            Just(Value::Null),
            any::<bool>().prop_map(Value::Bool),
            any::<i64>().prop_map(Value::Integer),
            (-1.0e9f64..1.0e9).prop_map(Value::Float),
            "[a-z0-9 ]{0,16}".prop_map(Value::Text),
        ]
    }

    proptest! {
        #[test]
        fn flattened_rows_survive_encoding(row in prop::collection::vec(scalar(), 0..32)) {
            let value = Value::Array(row);
            let bytes = to_cbor(&value).unwrap();
            prop_assert_eq!(from_cbor(&bytes).unwrap(), value);
        }
    }
}
