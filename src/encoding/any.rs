// created = 2026-10-19
// modified = 2026-10-19
// driver = "Isaac Clayton"

//! Self-describing values and their binary codec.
//!
//! Every encoded value starts with one tag byte from the reserved range
//! 116..=127, leaving 0..=115 free for callers that frame their own
//! messages around `Any` payloads.
//!
//! | tag | value                         |
//! |-----|-------------------------------|
//! | 127 | undefined                     |
//! | 126 | null                          |
//! | 125 | integer (31-bit, signed varint) |
//! | 124 | float32                       |
//! | 123 | float64                       |
//! | 122 | bigint (64-bit)               |
//! | 121 | false                         |
//! | 120 | true                          |
//! | 119 | string                        |
//! | 118 | map (string keys)             |
//! | 117 | array                         |
//! | 116 | byte buffer                   |

use std::collections::BTreeMap;
use std::fmt;
use std::sync::Arc;

use serde::Deserialize;
use serde::Deserializer;
use serde::Serialize;
use serde::Serializer;
use serde::ser::SerializeMap;
use serde::ser::SerializeSeq;

use super::Cursor;
use super::Write;
use crate::error::Error;
use crate::error::Result;

const TAG_UNDEFINED: u8 = 127;
const TAG_NULL: u8 = 126;
const TAG_INTEGER: u8 = 125;
const TAG_FLOAT32: u8 = 124;
const TAG_FLOAT64: u8 = 123;
const TAG_BIGINT: u8 = 122;
const TAG_FALSE: u8 = 121;
const TAG_TRUE: u8 = 120;
const TAG_STRING: u8 = 119;
const TAG_MAP: u8 = 118;
const TAG_ARRAY: u8 = 117;
const TAG_BUFFER: u8 = 116;

/// Largest magnitude written with the compact integer tag.
const BITS31: f64 = 0x7FFF_FFFF as f64;

/// A plain value: the payload of `ContentAny`, `ContentEmbed`,
/// `ContentFormat` and sub-document options.
#[derive(Clone, Debug, PartialEq, Default)]
pub enum Any {
    #[default]
    Undefined,
    Null,
    Bool(bool),
    Number(f64),
    BigInt(i64),
    String(Arc<str>),
    Buffer(Arc<[u8]>),
    Array(Arc<[Any]>),
    Map(Arc<BTreeMap<String, Any>>),
}

impl Any {
    /// Encode with the tagged binary format.
    pub fn encode<W: Write>(&self, w: &mut W) {
        match self {
            Any::Undefined => w.write_u8(TAG_UNDEFINED),
            Any::Null => w.write_u8(TAG_NULL),
            Any::Bool(true) => w.write_u8(TAG_TRUE),
            Any::Bool(false) => w.write_u8(TAG_FALSE),
            Any::Number(n) => {
                let n = *n;
                if n.fract() == 0.0 && n.abs() <= BITS31 {
                    w.write_u8(TAG_INTEGER);
                    w.write_var_i64(n as i64);
                } else if ((n as f32) as f64) == n {
                    w.write_u8(TAG_FLOAT32);
                    w.write_f32(n as f32);
                } else {
                    w.write_u8(TAG_FLOAT64);
                    w.write_f64(n);
                }
            }
            Any::BigInt(n) => {
                w.write_u8(TAG_BIGINT);
                w.write_i64(*n);
            }
            Any::String(s) => {
                w.write_u8(TAG_STRING);
                w.write_string(s);
            }
            Any::Map(map) => {
                w.write_u8(TAG_MAP);
                w.write_var_u64(map.len() as u64);
                for (key, value) in map.iter() {
                    w.write_string(key);
                    value.encode(w);
                }
            }
            Any::Array(items) => {
                w.write_u8(TAG_ARRAY);
                w.write_var_u64(items.len() as u64);
                for item in items.iter() {
                    item.encode(w);
                }
            }
            Any::Buffer(buf) => {
                w.write_u8(TAG_BUFFER);
                w.write_buf(buf);
            }
        }
    }

    /// Decode one tagged value.
    pub fn decode(cursor: &mut Cursor<'_>) -> Result<Any> {
        let tag = cursor.read_u8()?;
        let value = match tag {
            TAG_UNDEFINED => Any::Undefined,
            TAG_NULL => Any::Null,
            TAG_INTEGER => Any::Number(cursor.read_var_i64()? as f64),
            TAG_FLOAT32 => Any::Number(cursor.read_f32()? as f64),
            TAG_FLOAT64 => Any::Number(cursor.read_f64()?),
            TAG_BIGINT => Any::BigInt(cursor.read_i64()?),
            TAG_FALSE => Any::Bool(false),
            TAG_TRUE => Any::Bool(true),
            TAG_STRING => Any::String(Arc::from(cursor.read_string()?)),
            TAG_MAP => {
                let len = cursor.read_var_u32()?;
                let mut map = BTreeMap::new();
                for _ in 0..len {
                    let key = cursor.read_string()?.to_owned();
                    let value = Any::decode(cursor)?;
                    map.insert(key, value);
                }
                Any::Map(Arc::new(map))
            }
            TAG_ARRAY => {
                let len = cursor.read_var_u32()?;
                let mut items = Vec::with_capacity(len.min(1024) as usize);
                for _ in 0..len {
                    items.push(Any::decode(cursor)?);
                }
                Any::Array(Arc::from(items))
            }
            TAG_BUFFER => Any::Buffer(Arc::from(cursor.read_buf()?)),
            other => {
                return Err(Error::UnexpectedTag { kind: "any", tag: other as u32 });
            }
        };
        return Ok(value);
    }

    /// Encode into a fresh buffer.
    pub fn encode_to_vec(&self) -> Vec<u8> {
        let mut buf = Vec::new();
        self.encode(&mut buf);
        return buf;
    }

    /// Parse a JSON document into an `Any`.
    pub fn from_json(src: &str) -> Result<Any> {
        let value: serde_json::Value = serde_json::from_str(src)
            .map_err(|e| Error::InvalidJson { reason: e.to_string() })?;
        return Ok(Any::from(value));
    }

    /// Render as JSON text. `Undefined` renders as `null` and buffers as
    /// arrays of numbers.
    pub fn to_json_string(&self) -> String {
        return serde_json::to_string(self).unwrap_or_default();
    }

    /// Shorthand for building a map value.
    pub fn map<I, K>(entries: I) -> Any
    where
        I: IntoIterator<Item = (K, Any)>,
        K: Into<String>,
    {
        let map: BTreeMap<String, Any> =
            entries.into_iter().map(|(k, v)| (k.into(), v)).collect();
        return Any::Map(Arc::new(map));
    }

    /// Shorthand for building an array value.
    pub fn array<I: IntoIterator<Item = Any>>(items: I) -> Any {
        let items: Vec<Any> = items.into_iter().collect();
        return Any::Array(Arc::from(items));
    }

    pub fn is_null_or_undefined(&self) -> bool {
        return matches!(self, Any::Null | Any::Undefined);
    }
}

impl fmt::Display for Any {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Any::String(s) => return f.write_str(s),
            Any::Undefined => return f.write_str("undefined"),
            other => return f.write_str(&other.to_json_string()),
        }
    }
}

// =============================================================================
// Conversions
// =============================================================================

macro_rules! any_from_number {
    ($($t:ty),*) => {
        $(
            impl From<$t> for Any {
                fn from(value: $t) -> Any {
                    return Any::Number(value as f64);
                }
            }
        )*
    };
}

any_from_number!(f64, f32, i32, u32, i16, u16, i8, u8, usize, isize);

impl From<i64> for Any {
    fn from(value: i64) -> Any {
        if value.unsigned_abs() <= (1u64 << 53) {
            return Any::Number(value as f64);
        }
        return Any::BigInt(value);
    }
}

impl From<bool> for Any {
    fn from(value: bool) -> Any {
        return Any::Bool(value);
    }
}

impl From<&str> for Any {
    fn from(value: &str) -> Any {
        return Any::String(Arc::from(value));
    }
}

impl From<String> for Any {
    fn from(value: String) -> Any {
        return Any::String(Arc::from(value));
    }
}

impl From<Arc<str>> for Any {
    fn from(value: Arc<str>) -> Any {
        return Any::String(value);
    }
}

impl From<Vec<Any>> for Any {
    fn from(value: Vec<Any>) -> Any {
        return Any::Array(Arc::from(value));
    }
}

impl From<BTreeMap<String, Any>> for Any {
    fn from(value: BTreeMap<String, Any>) -> Any {
        return Any::Map(Arc::new(value));
    }
}

impl From<&[u8]> for Any {
    fn from(value: &[u8]) -> Any {
        return Any::Buffer(Arc::from(value));
    }
}

impl<T: Into<Any>> From<Option<T>> for Any {
    fn from(value: Option<T>) -> Any {
        match value {
            Some(v) => return v.into(),
            None => return Any::Null,
        }
    }
}

impl From<serde_json::Value> for Any {
    fn from(value: serde_json::Value) -> Any {
        match value {
            serde_json::Value::Null => return Any::Null,
            serde_json::Value::Bool(b) => return Any::Bool(b),
            serde_json::Value::Number(n) => {
                if let Some(f) = n.as_f64() {
                    if let Some(i) = n.as_i64() {
                        return Any::from(i);
                    }
                    return Any::Number(f);
                }
                return Any::Null;
            }
            serde_json::Value::String(s) => return Any::from(s),
            serde_json::Value::Array(items) => {
                return Any::array(items.into_iter().map(Any::from));
            }
            serde_json::Value::Object(entries) => {
                return Any::map(entries.into_iter().map(|(k, v)| (k, Any::from(v))));
            }
        }
    }
}

impl From<&Any> for serde_json::Value {
    fn from(value: &Any) -> serde_json::Value {
        return serde_json::to_value(value).unwrap_or(serde_json::Value::Null);
    }
}

// =============================================================================
// Serde
// =============================================================================

impl Serialize for Any {
    fn serialize<S: Serializer>(&self, serializer: S) -> std::result::Result<S::Ok, S::Error> {
        match self {
            Any::Undefined | Any::Null => return serializer.serialize_unit(),
            Any::Bool(b) => return serializer.serialize_bool(*b),
            Any::Number(n) => {
                if n.fract() == 0.0 && n.abs() < (1u64 << 53) as f64 {
                    return serializer.serialize_i64(*n as i64);
                }
                return serializer.serialize_f64(*n);
            }
            Any::BigInt(n) => return serializer.serialize_i64(*n),
            Any::String(s) => return serializer.serialize_str(s),
            Any::Buffer(buf) => {
                let mut seq = serializer.serialize_seq(Some(buf.len()))?;
                for byte in buf.iter() {
                    seq.serialize_element(byte)?;
                }
                return seq.end();
            }
            Any::Array(items) => {
                let mut seq = serializer.serialize_seq(Some(items.len()))?;
                for item in items.iter() {
                    seq.serialize_element(item)?;
                }
                return seq.end();
            }
            Any::Map(map) => {
                let mut ser = serializer.serialize_map(Some(map.len()))?;
                for (key, value) in map.iter() {
                    ser.serialize_entry(key, value)?;
                }
                return ser.end();
            }
        }
    }
}

impl<'de> Deserialize<'de> for Any {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> std::result::Result<Any, D::Error> {
        let value = serde_json::Value::deserialize(deserializer)?;
        return Ok(Any::from(value));
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn roundtrip(value: &Any) -> Any {
        let buf = value.encode_to_vec();
        let mut cursor = Cursor::new(&buf);
        let decoded = Any::decode(&mut cursor).unwrap();
        assert!(!cursor.has_content());
        return decoded;
    }

    #[test]
    fn tags_live_in_the_reserved_range() {
        let values = [
            Any::Undefined,
            Any::Null,
            Any::from(7),
            Any::from(0.5),
            Any::from(0.1),
            Any::BigInt(1 << 60),
            Any::from(true),
            Any::from(false),
            Any::from("x"),
            Any::map([("a", Any::Null)]),
            Any::array([Any::Null]),
            Any::from(&b"\x00"[..]),
        ];
        for value in &values {
            let tag = value.encode_to_vec()[0];
            assert!((116..=127).contains(&tag), "tag {} for {:?}", tag, value);
        }
    }

    #[test]
    fn number_picks_smallest_representation() {
        assert_eq!(Any::from(42).encode_to_vec()[0], TAG_INTEGER);
        assert_eq!(Any::from(0.5).encode_to_vec()[0], TAG_FLOAT32);
        assert_eq!(Any::from(0.1).encode_to_vec()[0], TAG_FLOAT64);
        assert_eq!(Any::Number(4_294_967_296.0).encode_to_vec()[0], TAG_FLOAT32);
    }

    #[test]
    fn nested_values_survive() {
        let value = Any::map([
            ("name", Any::from("tandem")),
            ("tags", Any::array([Any::from(1), Any::from(-2.25), Any::Null])),
            ("blob", Any::from(&b"\x01\x02\x03"[..])),
            ("big", Any::BigInt(-(1 << 62))),
        ]);
        assert_eq!(roundtrip(&value), value);
    }

    #[test]
    fn unknown_tag_is_rejected() {
        let buf = [42u8];
        let err = Any::decode(&mut Cursor::new(&buf)).unwrap_err();
        assert_eq!(err, Error::UnexpectedTag { kind: "any", tag: 42 });
    }

    #[test]
    fn json_conversion() {
        let value = Any::from_json(r#"{"a":[1,2.5,"x"],"b":null,"c":true}"#).unwrap();
        let expected = Any::map([
            ("a", Any::array([Any::from(1), Any::from(2.5), Any::from("x")])),
            ("b", Any::Null),
            ("c", Any::from(true)),
        ]);
        assert_eq!(value, expected);
        assert_eq!(value.to_json_string(), r#"{"a":[1,2.5,"x"],"b":null,"c":true}"#);
    }
}
