//! Conversion between [`Value`] and JSON.
//!
//! Integers stay integers and floats stay floats: a JSON number without a
//! fraction or exponent decodes to [`Value::Integer`], anything else to
//! [`Value::Float`]. Floats are written in serde_json's shortest round-trip
//! form, so `decode(encode(x)) == x` for every finite float.

use crate::error::{CodecError, CodecResult};
use crate::value::Value;
use serde::de::{Deserialize, Deserializer};
use serde::ser::{Serialize, SerializeMap, SerializeSeq, Serializer};
use serde_json::{Map, Number};

/// How non-finite floats are handled while encoding.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum NonFinitePolicy {
    /// Fail with [`CodecError::NonFiniteFloat`].
    #[default]
    Reject,
    /// Replace the float with JSON `null`.
    Null,
}

/// Converts a value to a JSON tree, rejecting non-finite floats.
pub fn to_json(value: &Value) -> CodecResult<serde_json::Value> {
    to_json_with(value, NonFinitePolicy::Reject)
}

/// Converts a value to a JSON tree with an explicit non-finite policy.
pub fn to_json_with(value: &Value, policy: NonFinitePolicy) -> CodecResult<serde_json::Value> {
    Ok(match value {
        Value::Null => serde_json::Value::Null,
        Value::Bool(b) => serde_json::Value::Bool(*b),
        Value::Integer(n) => serde_json::Value::Number(Number::from(*n)),
        Value::Float(f) => match Number::from_f64(*f) {
            Some(n) => serde_json::Value::Number(n),
            None => match policy {
                NonFinitePolicy::Reject => {
                    return Err(CodecError::NonFiniteFloat {
                        value: f.to_string(),
                    })
                }
                NonFinitePolicy::Null => serde_json::Value::Null,
            },
        },
        Value::Text(s) => serde_json::Value::String(s.clone()),
        Value::Array(items) => serde_json::Value::Array(
            items
                .iter()
                .map(|item| to_json_with(item, policy))
                .collect::<CodecResult<Vec<_>>>()?,
        ),
        Value::Map(entries) => {
            let mut map = Map::with_capacity(entries.len());
            for (key, item) in entries {
                map.insert(key.clone(), to_json_with(item, policy)?);
            }
            serde_json::Value::Object(map)
        }
    })
}

/// Converts a JSON tree to a value.
pub fn from_json(json: &serde_json::Value) -> CodecResult<Value> {
    Ok(match json {
        serde_json::Value::Null => Value::Null,
        serde_json::Value::Bool(b) => Value::Bool(*b),
        serde_json::Value::Number(n) => number_to_value(n)?,
        serde_json::Value::String(s) => Value::Text(s.clone()),
        serde_json::Value::Array(items) => {
            Value::Array(items.iter().map(from_json).collect::<CodecResult<Vec<_>>>()?)
        }
        serde_json::Value::Object(map) => {
            let mut entries = indexmap::IndexMap::with_capacity(map.len());
            for (key, item) in map {
                entries.insert(key.clone(), from_json(item)?);
            }
            Value::Map(entries)
        }
    })
}

fn number_to_value(n: &Number) -> CodecResult<Value> {
    if let Some(i) = n.as_i64() {
        Ok(Value::Integer(i))
    } else if n.is_u64() {
        Err(CodecError::IntegerOverflow)
    } else {
        n.as_f64()
            .map(Value::Float)
            .ok_or_else(|| CodecError::decoding(format!("unrepresentable number {n}")))
    }
}

/// Encodes a value to JSON text.
pub fn to_string(value: &Value) -> CodecResult<String> {
    Ok(serde_json::to_string(&to_json(value)?)?)
}

/// Decodes a value from JSON text.
pub fn from_str(text: &str) -> CodecResult<Value> {
    let json: serde_json::Value = serde_json::from_str(text)?;
    from_json(&json)
}

impl Serialize for Value {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        match self {
            Value::Null => serializer.serialize_unit(),
            Value::Bool(b) => serializer.serialize_bool(*b),
            Value::Integer(n) => serializer.serialize_i64(*n),
            Value::Float(f) => serializer.serialize_f64(*f),
            Value::Text(s) => serializer.serialize_str(s),
            Value::Array(items) => {
                let mut seq = serializer.serialize_seq(Some(items.len()))?;
                for item in items {
                    seq.serialize_element(item)?;
                }
                seq.end()
            }
            Value::Map(entries) => {
                let mut map = serializer.serialize_map(Some(entries.len()))?;
                for (key, item) in entries {
                    map.serialize_entry(key, item)?;
                }
                map.end()
            }
        }
    }
}

impl<'de> Deserialize<'de> for Value {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let json = serde_json::Value::deserialize(deserializer)?;
        from_json(&json).map_err(serde::de::Error::custom)
    }
}
