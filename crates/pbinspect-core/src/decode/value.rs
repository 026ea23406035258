//! Decoded values and the accumulation rules for repeated and map fields.

use crate::schema::{FieldType, Primitive};
use bytes::Bytes;
use serde::ser::{Serialize, Serializer};
use std::collections::BTreeMap;
use std::fmt;

/// A decoded field value
#[derive(Debug, Clone, PartialEq)]
pub enum Value {
    /// `int32`, `sint32`, `sfixed32`
    I32(i32),
    /// `int64`, `sint64`, `sfixed64`
    I64(i64),
    /// `uint32`, `fixed32`
    U32(u32),
    /// `uint64`, `fixed64`
    U64(u64),
    /// `float`
    F32(f32),
    /// `double`
    F64(f64),
    /// `bool`
    Bool(bool),
    /// `string`
    String(String),
    /// `bytes`
    Bytes(Bytes),
    /// Symbolic enum member name
    Enum(String),
    /// Every occurrence of a repeated field, in wire order
    List(Vec<Value>),
    /// An embedded message
    Message(Fields),
    /// A map field, keyed by the stringified map key
    Map(BTreeMap<String, Value>),
}

impl Value {
    /// The proto3 default for a scalar type
    pub fn default_for(primitive: Primitive) -> Self {
        match primitive {
            Primitive::Double => Self::F64(0.0),
            Primitive::Float => Self::F32(0.0),
            Primitive::Int32 | Primitive::Sint32 | Primitive::Sfixed32 => Self::I32(0),
            Primitive::Int64 | Primitive::Sint64 | Primitive::Sfixed64 => Self::I64(0),
            Primitive::Uint32 | Primitive::Fixed32 => Self::U32(0),
            Primitive::Uint64 | Primitive::Fixed64 => Self::U64(0),
            Primitive::Bool => Self::Bool(false),
            Primitive::String => Self::String(String::new()),
            Primitive::Bytes => Self::Bytes(Bytes::new()),
        }
    }

    /// Renders a map key.
    ///
    /// String keys are used as-is; every other key becomes
    /// `"<value> (<type>)"`, e.g. `"7 (int32)"`.
    pub fn map_key(&self, key_type: &FieldType) -> String {
        match self {
            Self::String(s) => s.clone(),
            other => format!("{} ({})", other, key_type),
        }
    }

    /// Elements of a list value
    pub fn as_list(&self) -> Option<&[Value]> {
        match self {
            Self::List(items) => Some(items),
            _ => None,
        }
    }

    /// Fields of a message value
    pub fn as_message(&self) -> Option<&Fields> {
        match self {
            Self::Message(fields) => Some(fields),
            _ => None,
        }
    }

    /// Entries of a map value
    pub fn as_map(&self) -> Option<&BTreeMap<String, Value>> {
        match self {
            Self::Map(entries) => Some(entries),
            _ => None,
        }
    }
}

impl fmt::Display for Value {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::I32(v) => write!(f, "{}", v),
            Self::I64(v) => write!(f, "{}", v),
            Self::U32(v) => write!(f, "{}", v),
            Self::U64(v) => write!(f, "{}", v),
            Self::F32(v) => write!(f, "{}", v),
            Self::F64(v) => write!(f, "{}", v),
            Self::Bool(v) => write!(f, "{}", v),
            Self::String(s) | Self::Enum(s) => f.write_str(s),
            Self::Bytes(b) => b.iter().try_for_each(|byte| write!(f, "{:02x}", byte)),
            Self::List(items) => {
                f.write_str("[")?;
                for (i, item) in items.iter().enumerate() {
                    if i > 0 {
                        f.write_str(", ")?;
                    }
                    write!(f, "{}", item)?;
                }
                f.write_str("]")
            }
            Self::Message(fields) => write!(f, "{}", fields),
            Self::Map(entries) => write_entries(f, entries),
        }
    }
}

impl Serialize for Value {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        match self {
            Self::I32(v) => serializer.serialize_i32(*v),
            Self::I64(v) => serializer.serialize_i64(*v),
            Self::U32(v) => serializer.serialize_u32(*v),
            Self::U64(v) => serializer.serialize_u64(*v),
            Self::F32(v) => serializer.serialize_f32(*v),
            Self::F64(v) => serializer.serialize_f64(*v),
            Self::Bool(v) => serializer.serialize_bool(*v),
            Self::String(s) | Self::Enum(s) => serializer.serialize_str(s),
            Self::Bytes(b) => serializer.serialize_bytes(b),
            Self::List(items) => serializer.collect_seq(items),
            Self::Message(fields) => fields.serialize(serializer),
            Self::Map(entries) => serializer.collect_map(entries),
        }
    }
}

fn write_entries(f: &mut fmt::Formatter<'_>, entries: &BTreeMap<String, Value>) -> fmt::Result {
    f.write_str("{")?;
    for (i, (key, value)) in entries.iter().enumerate() {
        if i > 0 {
            f.write_str(", ")?;
        }
        write!(f, "{}: {}", key, value)?;
    }
    f.write_str("}")
}

/// Decoded fields of one message, keyed by field name
#[derive(Debug, Clone, Default, PartialEq, serde::Serialize)]
#[serde(transparent)]
pub struct Fields(BTreeMap<String, Value>);

impl Fields {
    /// Creates an empty field set
    pub fn new() -> Self {
        Self::default()
    }

    /// Value stored under `name`
    pub fn get(&self, name: &str) -> Option<&Value> {
        self.0.get(name)
    }

    /// Removes and returns the value stored under `name`
    pub fn remove(&mut self, name: &str) -> Option<Value> {
        self.0.remove(name)
    }

    /// Number of fields present
    pub fn len(&self) -> usize {
        self.0.len()
    }

    /// Returns true if no field was decoded
    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    /// Iterates fields in name order
    pub fn iter(&self) -> impl Iterator<Item = (&str, &Value)> {
        self.0.iter().map(|(k, v)| (k.as_str(), v))
    }

    /// Stores a singular value; a later occurrence replaces an earlier one
    pub fn set(&mut self, name: &str, value: Value) {
        self.0.insert(name.to_string(), value);
    }

    /// Appends to the list stored under `name`, creating it if needed
    pub fn push(&mut self, name: &str, value: Value) {
        match self.0.get_mut(name) {
            Some(Value::List(items)) => items.push(value),
            _ => {
                self.0.insert(name.to_string(), Value::List(vec![value]));
            }
        }
    }

    /// Merges one map entry into the map stored under `name`
    pub fn merge_entry(&mut self, name: &str, key: String, value: Value) {
        match self.0.get_mut(name) {
            Some(Value::Map(entries)) => {
                entries.insert(key, value);
            }
            _ => {
                self.0
                    .insert(name.to_string(), Value::Map(BTreeMap::from([(key, value)])));
            }
        }
    }

    /// Consumes the set, returning the underlying map
    pub fn into_inner(self) -> BTreeMap<String, Value> {
        self.0
    }
}

impl fmt::Display for Fields {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write_entries(f, &self.0)
    }
}

impl IntoIterator for Fields {
    type Item = (String, Value);
    type IntoIter = std::collections::btree_map::IntoIter<String, Value>;

    fn into_iter(self) -> Self::IntoIter {
        self.0.into_iter()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    #[test]
    fn test_push_accumulates_in_order() {
        let mut fields = Fields::new();
        fields.push("n", Value::I32(1));
        fields.push("n", Value::I32(2));
        fields.push("n", Value::I32(3));
        assert_eq!(
            fields.get("n"),
            Some(&Value::List(vec![Value::I32(1), Value::I32(2), Value::I32(3)]))
        );
    }

    #[test]
    fn test_set_is_last_write_wins() {
        let mut fields = Fields::new();
        fields.set("s", Value::String("a".into()));
        fields.set("s", Value::String("b".into()));
        assert_eq!(fields.get("s"), Some(&Value::String("b".into())));
        assert_eq!(fields.len(), 1);
    }

    #[test]
    fn test_merge_entry_overwrites_same_key() {
        let mut fields = Fields::new();
        fields.merge_entry("m", "a".into(), Value::I32(1));
        fields.merge_entry("m", "b".into(), Value::I32(2));
        fields.merge_entry("m", "a".into(), Value::I32(3));

        let map = fields.get("m").and_then(Value::as_map).unwrap();
        assert_eq!(map.len(), 2);
        assert_eq!(map["a"], Value::I32(3));
        assert_eq!(map["b"], Value::I32(2));
    }

    #[test]
    fn test_map_key_formatting() {
        let int32 = FieldType::Primitive(Primitive::Int32);
        let boolean = FieldType::Primitive(Primitive::Bool);
        let string = FieldType::Primitive(Primitive::String);

        assert_eq!(Value::I32(7).map_key(&int32), "7 (int32)");
        assert_eq!(Value::Bool(true).map_key(&boolean), "true (bool)");
        assert_eq!(Value::String("k".into()).map_key(&string), "k");
    }

    #[test]
    fn test_display() {
        let mut inner = Fields::new();
        inner.set("id", Value::U64(9));
        let mut fields = Fields::new();
        fields.set("blob", Value::Bytes(Bytes::from_static(b"\x01\xff")));
        fields.set("inner", Value::Message(inner));
        fields.push("tags", Value::Enum("A".into()));
        assert_eq!(fields.to_string(), "{blob: 01ff, inner: {id: 9}, tags: [A]}");
    }

    #[test]
    fn test_serialize_json() {
        let mut fields = Fields::new();
        fields.set("float", Value::F32(1.0));
        fields.set("name", Value::String("x".into()));
        fields.merge_entry("m", "1 (int32)".into(), Value::Bool(true));
        fields.push("l", Value::U32(5));

        let json = serde_json::to_value(&fields).unwrap();
        assert_eq!(
            json,
            serde_json::json!({
                "float": 1.0,
                "name": "x",
                "m": { "1 (int32)": true },
                "l": [5]
            })
        );
    }
}
