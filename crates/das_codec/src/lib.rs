//! # DAS Codec
//!
//! Dynamic values and CBOR encoding for DAS log payloads.
//!
//! Log records travel as untyped value lists: on the wire between agents
//! and the server, and inside dead-letter files when the persistent store
//! rejects a flush. This crate provides:
//! - [`Value`], the dynamic value every record field flattens into
//! - [`to_cbor`] / [`from_cbor`] for the byte representation
//! - [`Encode`] / [`Decode`] traits for typed messages
//!
//! ## Usage
//!
//! ```
//! use das_codec::{from_cbor, to_cbor, Value};
//!
//! let row = Value::Array(vec![Value::Integer(7), Value::Float(21.5), "ok".into()]);
//! let bytes = to_cbor(&row).unwrap();
//! assert_eq!(from_cbor(&bytes).unwrap(), row);
//! ```

#![deny(unsafe_code)]
#![warn(missing_docs)]

mod cbor;
mod error;
mod value;

pub use cbor::{from_cbor, to_cbor};
pub use error::{CodecError, CodecResult};
pub use value::Value;

/// Types that can be encoded to CBOR bytes.
pub trait Encode {
    /// Encodes this value.
    fn encode(&self) -> CodecResult<Vec<u8>>;
}

/// Types that can be decoded from CBOR bytes.
pub trait Decode: Sized {
    /// Decodes a value.
    fn decode(bytes: &[u8]) -> CodecResult<Self>;
}

impl Encode for Value {
    fn encode(&self) -> CodecResult<Vec<u8>> {
        to_cbor(self)
    }
}

impl Decode for Value {
    fn decode(bytes: &[u8]) -> CodecResult<Self> {
        from_cbor(bytes)
    }
}
