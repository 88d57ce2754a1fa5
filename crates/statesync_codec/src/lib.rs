//! # Statesync Codec
//!
//! Dynamic values and their JSON encoding for the statesync engine.
//!
//! Everything a node feature stores is a [`Value`]. On the wire it travels as
//! JSON, with two rules:
//! - Integers and floats are distinct and never convert into each other
//! - Finite floats round-trip bit for bit
//!
//! ## Usage
//!
//! ```
//! use statesync_codec::{from_str, to_string, Value};
//!
//! let value = Value::map([("value", Value::Float(0.5))]);
//! let text = to_string(&value).unwrap();
//! assert_eq!(text, r#"{"value":0.5}"#);
//!
//! let decoded = from_str(&text).unwrap();
//! assert_eq!(value, decoded);
//! ```

#![deny(unsafe_code)]
#![warn(missing_docs)]

mod error;
mod json;
mod value;

pub use error::{CodecError, CodecResult};
pub use json::{from_json, from_str, to_json, to_json_with, to_string, NonFinitePolicy};
pub use value::Value;

/// Trait for types that can be encoded to JSON text.
pub trait Encode {
    /// Encode this value to JSON text.
    fn encode(&self) -> CodecResult<String>;
}

/// Trait for types that can be decoded from JSON text.
pub trait Decode: Sized {
    /// Decode this value from JSON text.
    fn decode(text: &str) -> CodecResult<Self>;
}

impl Encode for Value {
    fn encode(&self) -> CodecResult<String> {
        to_string(self)
    }
}

impl Decode for Value {
    fn decode(text: &str) -> CodecResult<Self> {
        from_str(text)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn encode_decode_nested() {
        let value = Value::map([
            (
                "users",
                Value::Array(vec![
                    Value::map([("name", Value::from("Alice")), ("age", Value::Integer(30))]),
                    Value::map([("name", Value::from("Bob")), ("age", Value::Integer(25))]),
                ]),
            ),
            ("count", Value::Integer(2)),
        ]);
        let text = value.encode().unwrap();
        assert_eq!(Value::decode(&text).unwrap(), value);
    }

    #[test]
    fn decode_rejects_garbage() {
        assert!(matches!(
            Value::decode("{not json"),
            Err(CodecError::DecodingFailed { .. })
        ));
    }
}
