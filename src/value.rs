//! Decoded data values
//!
//! `Value` mirrors the MaxMind DB data types that can be observed by a caller.
//! Pointers never appear here: the decoder follows them and returns the value
//! they point at. Maps keep the order in which their pairs were stored.

use serde::ser::{SerializeMap, SerializeSeq};
use serde::{Serialize, Serializer};

/// A decoded data-section value
#[derive(Debug, Clone, PartialEq)]
pub enum Value {
    /// UTF-8 string
    String(String),
    /// IEEE 754 double precision float
    Double(f64),
    /// Raw byte array
    Bytes(Vec<u8>),
    /// Unsigned 16-bit integer
    Uint16(u16),
    /// Unsigned 32-bit integer
    Uint32(u32),
    /// Key-value map (string keys only)
    Map(Map),
    /// Signed 32-bit integer
    Int32(i32),
    /// Unsigned 64-bit integer
    Uint64(u64),
    /// Unsigned 128-bit integer
    Uint128(u128),
    /// Array of values
    Array(Vec<Value>),
    /// Boolean value
    Bool(bool),
    /// IEEE 754 single precision float
    Float(f32),
}

impl Value {
    /// Look up `key` if this value is a map
    pub fn get(&self, key: &str) -> Option<&Value> {
        match self {
            Value::Map(map) => map.get(key),
            _ => None,
        }
    }

    /// Follow a path of map keys, e.g. `["country", "iso_code"]`
    pub fn path(&self, keys: &[&str]) -> Option<&Value> {
        keys.iter().try_fold(self, |value, key| value.get(key))
    }

    /// String contents, if this is a string
    pub fn as_str(&self) -> Option<&str> {
        match self {
            Value::String(s) => Some(s),
            _ => None,
        }
    }

    /// Any unsigned integer (or non-negative int32) that fits in a `u64`
    pub fn as_u64(&self) -> Option<u64> {
        match self {
            Value::Uint16(n) => Some(u64::from(*n)),
            Value::Uint32(n) => Some(u64::from(*n)),
            Value::Uint64(n) => Some(*n),
            Value::Uint128(n) => u64::try_from(*n).ok(),
            Value::Int32(n) => u64::try_from(*n).ok(),
            _ => None,
        }
    }

    /// Any numeric value widened to `f64`
    pub fn as_f64(&self) -> Option<f64> {
        match self {
            Value::Double(d) => Some(*d),
            Value::Float(f) => Some(f64::from(*f)),
            Value::Int32(n) => Some(f64::from(*n)),
            Value::Uint16(n) => Some(f64::from(*n)),
            Value::Uint32(n) => Some(f64::from(*n)),
            Value::Uint64(n) => Some(*n as f64),
            Value::Uint128(n) => Some(*n as f64),
            _ => None,
        }
    }

    /// Boolean contents
    pub fn as_bool(&self) -> Option<bool> {
        match self {
            Value::Bool(b) => Some(*b),
            _ => None,
        }
    }

    /// Raw bytes
    pub fn as_bytes(&self) -> Option<&[u8]> {
        match self {
            Value::Bytes(b) => Some(b),
            _ => None,
        }
    }

    /// Array elements
    pub fn as_array(&self) -> Option<&[Value]> {
        match self {
            Value::Array(items) => Some(items),
            _ => None,
        }
    }

    /// Map contents
    pub fn as_map(&self) -> Option<&Map> {
        match self {
            Value::Map(map) => Some(map),
            _ => None,
        }
    }

    /// Name of the stored type, as used in error messages
    pub fn type_name(&self) -> &'static str {
        match self {
            Value::String(_) => "utf8_string",
            Value::Double(_) => "double",
            Value::Bytes(_) => "bytes",
            Value::Uint16(_) => "uint16",
            Value::Uint32(_) => "uint32",
            Value::Map(_) => "map",
            Value::Int32(_) => "int32",
            Value::Uint64(_) => "uint64",
            Value::Uint128(_) => "uint128",
            Value::Array(_) => "array",
            Value::Bool(_) => "boolean",
            Value::Float(_) => "float",
        }
    }
}

/// String-keyed map that preserves stored order
///
/// Lookups scan linearly; records in MMDB files are small. If a key occurs
/// more than once the last occurrence wins.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Map {
    entries: Vec<(String, Value)>,
}

impl Map {
    /// Create an empty map
    pub fn new() -> Self {
        Self::default()
    }

    /// Create an empty map with room for `capacity` pairs
    pub fn with_capacity(capacity: usize) -> Self {
        Self {
            entries: Vec::with_capacity(capacity),
        }
    }

    /// Insert a pair, replacing the value of an existing key in place
    pub fn insert(&mut self, key: impl Into<String>, value: Value) {
        let key = key.into();
        match self.entries.iter_mut().find(|(k, _)| *k == key) {
            Some(slot) => slot.1 = value,
            None => self.entries.push((key, value)),
        }
    }

    /// Append a pair without checking for duplicates
    pub(crate) fn push(&mut self, key: String, value: Value) {
        self.entries.push((key, value));
    }

    /// Look up a key
    pub fn get(&self, key: &str) -> Option<&Value> {
        self.entries
            .iter()
            .rev()
            .find(|(k, _)| k == key)
            .map(|(_, v)| v)
    }

    /// Whether the map holds `key`
    pub fn contains_key(&self, key: &str) -> bool {
        self.get(key).is_some()
    }

    /// Number of stored pairs
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    /// Whether the map is empty
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Pairs in stored order
    pub fn iter(&self) -> impl Iterator<Item = (&str, &Value)> {
        self.entries.iter().map(|(k, v)| (k.as_str(), v))
    }

    /// Keys in stored order
    pub fn keys(&self) -> impl Iterator<Item = &str> {
        self.entries.iter().map(|(k, _)| k.as_str())
    }
}

impl FromIterator<(String, Value)> for Map {
    fn from_iter<I: IntoIterator<Item = (String, Value)>>(iter: I) -> Self {
        let mut map = Map::new();
        for (k, v) in iter {
            map.insert(k, v);
        }
        map
    }
}

impl IntoIterator for Map {
    type Item = (String, Value);
    type IntoIter = std::vec::IntoIter<(String, Value)>;

    fn into_iter(self) -> Self::IntoIter {
        self.entries.into_iter()
    }
}

impl Serialize for Map {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        let mut map = serializer.serialize_map(Some(self.entries.len()))?;
        for (k, v) in &self.entries {
            map.serialize_entry(k, v)?;
        }
        map.end()
    }
}

/// Text for infinities and NaN, which JSON numbers cannot carry
fn non_finite_name(x: f64) -> &'static str {
    if x.is_nan() {
        "NaN"
    } else if x > 0.0 {
        "+Inf"
    } else {
        "-Inf"
    }
}

/// Non-finite doubles and floats serialize as the strings `"+Inf"`, `"-Inf"`
/// and `"NaN"`; everything else maps to the matching serde primitive.
impl Serialize for Value {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        match self {
            Value::String(s) => serializer.serialize_str(s),
            Value::Double(d) if !d.is_finite() => serializer.serialize_str(non_finite_name(*d)),
            Value::Double(d) => serializer.serialize_f64(*d),
            Value::Bytes(b) => {
                let mut seq = serializer.serialize_seq(Some(b.len()))?;
                for byte in b {
                    seq.serialize_element(byte)?;
                }
                seq.end()
            }
            Value::Uint16(n) => serializer.serialize_u16(*n),
            Value::Uint32(n) => serializer.serialize_u32(*n),
            Value::Map(m) => m.serialize(serializer),
            Value::Int32(n) => serializer.serialize_i32(*n),
            Value::Uint64(n) => serializer.serialize_u64(*n),
            Value::Uint128(n) => serializer.serialize_u128(*n),
            Value::Array(items) => {
                let mut seq = serializer.serialize_seq(Some(items.len()))?;
                for item in items {
                    seq.serialize_element(item)?;
                }
                seq.end()
            }
            Value::Bool(b) => serializer.serialize_bool(*b),
            Value::Float(f) if !f.is_finite() => {
                serializer.serialize_str(non_finite_name(f64::from(*f)))
            }
            Value::Float(f) => serializer.serialize_f32(*f),
        }
    }
}
