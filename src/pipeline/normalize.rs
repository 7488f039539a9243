use std::collections::BTreeMap;
use std::fmt;

use serde::{Serialize, Serializer};
use serde_json::Value;

use crate::constants::{RAW_MESSAGE_KEY, UNKNOWN_DEVICE_ID};

/// A decimal number held as its canonical text.
///
/// Built from the shortest text that round-trips the source float, so `21.5`
/// is stored as `"21.5"` and never as the binary expansion of the float.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct ExactDecimal(String);

impl ExactDecimal {
    pub fn from_f64(value: f64) -> Self {
        Self(value.to_string())
    }

    /// Accepts decimal text as produced by [`ExactDecimal::as_str`].
    pub fn parse(text: &str) -> Option<Self> {
        let value: f64 = text.trim().parse().ok()?;
        value.is_finite().then(|| Self(text.trim().to_string()))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }

    pub fn to_f64(&self) -> f64 {
        self.0.parse().unwrap_or(f64::NAN)
    }
}

impl fmt::Display for ExactDecimal {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// A normalized value, safe to hand to either sink.
#[derive(Debug, Clone, PartialEq)]
pub enum CanonicalValue {
    Null,
    Bool(bool),
    Integer(i64),
    /// Integers above `i64::MAX`.
    Unsigned(u64),
    Decimal(ExactDecimal),
    String(String),
    List(Vec<CanonicalValue>),
    Map(BTreeMap<String, CanonicalValue>),
}

impl CanonicalValue {
    /// Plain JSON form, as written to the archive.
    pub fn to_json(&self) -> Value {
        match self {
            CanonicalValue::Null => Value::Null,
            CanonicalValue::Bool(b) => Value::Bool(*b),
            CanonicalValue::Integer(i) => Value::from(*i),
            CanonicalValue::Unsigned(u) => Value::from(*u),
            CanonicalValue::Decimal(d) => serde_json::Number::from_f64(d.to_f64())
                .map(Value::Number)
                .unwrap_or(Value::Null),
            CanonicalValue::String(s) => Value::String(s.clone()),
            CanonicalValue::List(items) => Value::Array(items.iter().map(Self::to_json).collect()),
            CanonicalValue::Map(entries) => Value::Object(
                entries
                    .iter()
                    .map(|(k, v)| (k.clone(), v.to_json()))
                    .collect(),
            ),
        }
    }

    pub fn as_decimal(&self) -> Option<&ExactDecimal> {
        match self {
            CanonicalValue::Decimal(d) => Some(d),
            _ => None,
        }
    }
}

impl Serialize for CanonicalValue {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        self.to_json().serialize(serializer)
    }
}

/// The normalized form of one inbound message. Always a mapping.
#[derive(Debug, Clone, PartialEq, Default)]
pub struct CanonicalMessage {
    fields: BTreeMap<String, CanonicalValue>,
}

impl CanonicalMessage {
    pub fn get(&self, key: &str) -> Option<&CanonicalValue> {
        self.fields.get(key)
    }

    pub fn fields(&self) -> &BTreeMap<String, CanonicalValue> {
        &self.fields
    }

    pub fn into_fields(self) -> BTreeMap<String, CanonicalValue> {
        self.fields
    }

    pub fn from_fields(fields: BTreeMap<String, CanonicalValue>) -> Self {
        Self { fields }
    }

    /// Device id of the message, `"unknown"` when missing or blank.
    pub fn device_id(&self) -> String {
        let id = match self.fields.get("device_id") {
            None | Some(CanonicalValue::Null) => return UNKNOWN_DEVICE_ID.to_string(),
            Some(CanonicalValue::String(s)) => s.clone(),
            Some(CanonicalValue::Integer(i)) => i.to_string(),
            Some(CanonicalValue::Unsigned(u)) => u.to_string(),
            Some(CanonicalValue::Decimal(d)) => d.to_string(),
            Some(CanonicalValue::Bool(b)) => b.to_string(),
            Some(nested) => nested.to_json().to_string(),
        };
        if id.trim().is_empty() {
            UNKNOWN_DEVICE_ID.to_string()
        } else {
            id
        }
    }

    pub fn to_json(&self) -> Value {
        Value::Object(
            self.fields
                .iter()
                .map(|(k, v)| (k.clone(), v.to_json()))
                .collect(),
        )
    }

    /// UTF-8 JSON text of the message.
    pub fn to_json_bytes(&self) -> crate::error::Result<Vec<u8>> {
        Ok(serde_json::to_vec(&self.to_json())?)
    }
}

impl Serialize for CanonicalMessage {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        self.fields.serialize(serializer)
    }
}

/// Normalize a parsed message.
///
/// Drops blank keys at every depth and turns every float into an
/// [`ExactDecimal`]. A top level that is not a mapping is kept under `"raw"`.
pub fn normalize(raw: Value) -> CanonicalMessage {
    match canonicalize(raw) {
        CanonicalValue::Map(fields) => CanonicalMessage { fields },
        other => {
            let mut fields = BTreeMap::new();
            fields.insert(RAW_MESSAGE_KEY.to_string(), other);
            CanonicalMessage { fields }
        }
    }
}

fn canonicalize(value: Value) -> CanonicalValue {
    match value {
        Value::Null => CanonicalValue::Null,
        Value::Bool(b) => CanonicalValue::Bool(b),
        Value::Number(n) => {
            if let Some(i) = n.as_i64() {
                CanonicalValue::Integer(i)
            } else if let Some(u) = n.as_u64() {
                CanonicalValue::Unsigned(u)
            } else {
                // serde_json numbers are always finite
                CanonicalValue::Decimal(ExactDecimal::from_f64(n.as_f64().unwrap_or_default()))
            }
        }
        Value::String(s) => CanonicalValue::String(s),
        Value::Array(items) => CanonicalValue::List(items.into_iter().map(canonicalize).collect()),
        Value::Object(entries) => CanonicalValue::Map(
            entries
                .into_iter()
                .filter(|(k, _)| !k.trim().is_empty())
                .map(|(k, v)| (k, canonicalize(v)))
                .collect(),
        ),
    }
}
