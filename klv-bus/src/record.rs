use std::fmt::{Display, Formatter};

use bytes::Bytes;
use chrono::{DateTime, SecondsFormat, Utc};

/// One complete framed record: key, BER length and payload.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct RawRecord {
    data: Bytes,
    key_len: usize,
    payload_offset: usize,
}

impl RawRecord {
    pub(crate) fn new(data: Bytes, key_len: usize, payload_offset: usize) -> Self {
        Self {
            data,
            key_len,
            payload_offset,
        }
    }

    /// All bytes of the record, exactly as they were read.
    pub fn data(&self) -> &[u8] {
        &self.data
    }

    /// The fixed header (sync pattern included).
    pub fn key(&self) -> &[u8] {
        &self.data[..self.key_len]
    }

    pub fn payload(&self) -> &[u8] {
        &self.data[self.payload_offset..]
    }

    pub fn payload_bytes(&self) -> Bytes {
        self.data.slice(self.payload_offset..)
    }

    /// Offset of the payload within [`RawRecord::data`].
    pub fn payload_offset(&self) -> usize {
        self.payload_offset
    }

    pub fn len(&self) -> usize {
        self.data.len()
    }

    pub fn is_empty(&self) -> bool {
        self.data.is_empty()
    }
}

impl Display for RawRecord {
    fn fmt(&self, f: &mut Formatter<'_>) -> Result<(), std::fmt::Error> {
        write!(
            f,
            "RawRecord {{ len: {}, payload: {} }}",
            self.data.len(),
            self.data.len() - self.payload_offset
        )
    }
}

/// A decoded field value.
#[derive(Clone, Debug, PartialEq)]
pub enum Value {
    /// Opaque bytes; rendered as hex.
    Bytes(Bytes),
    Text(String),
    Unsigned(u64),
    Signed(i64),
    Float(f64),
    Timestamp(DateTime<Utc>),
}

impl Value {
    pub fn is_binary(&self) -> bool {
        matches!(self, Value::Bytes(_))
    }

    /// Natural JSON form; binary values become lowercase hex strings.
    pub fn to_json(&self) -> serde_json::Value {
        match self {
            Value::Bytes(b) => serde_json::Value::String(hex::encode(b)),
            Value::Text(s) => serde_json::Value::String(s.clone()),
            Value::Unsigned(v) => serde_json::Value::from(*v),
            Value::Signed(v) => serde_json::Value::from(*v),
            // Non-finite floats have no JSON form.
            Value::Float(v) => serde_json::Number::from_f64(*v)
                .map(serde_json::Value::Number)
                .unwrap_or(serde_json::Value::Null),
            Value::Timestamp(t) => {
                serde_json::Value::String(t.to_rfc3339_opts(SecondsFormat::Micros, true))
            }
        }
    }
}

impl Display for Value {
    fn fmt(&self, f: &mut Formatter<'_>) -> Result<(), std::fmt::Error> {
        match self {
            Value::Bytes(b) => write!(f, "{}", hex::encode(b)),
            Value::Text(s) => write!(f, "{}", s),
            Value::Unsigned(v) => write!(f, "{}", v),
            Value::Signed(v) => write!(f, "{}", v),
            Value::Float(v) => write!(f, "{}", v),
            Value::Timestamp(t) => write!(f, "{}", t.to_rfc3339_opts(SecondsFormat::Micros, true)),
        }
    }
}

/// One field decoded out of a record. `name` is `None` when the tag is not in
/// the dictionary; writers refuse such items.
#[derive(Clone, Debug, PartialEq)]
pub struct DecodedItem {
    pub tag: u64,
    pub name: Option<&'static str>,
    pub short_name: Option<&'static str>,
    pub value: Value,
}

impl DecodedItem {
    pub fn new(tag: u64, name: &'static str, short_name: &'static str, value: Value) -> Self {
        Self {
            tag,
            name: Some(name),
            short_name: Some(short_name),
            value,
        }
    }

    pub fn unknown(tag: u64, value: Bytes) -> Self {
        Self {
            tag,
            name: None,
            short_name: None,
            value: Value::Bytes(value),
        }
    }
}
