//! In-memory message representation.
//!
//! A [`DynamicMessage`] is a bag of field values keyed by field number. It
//! carries no descriptor; the [`MessageType`](crate::schema::MessageType) that
//! produced it interprets the values.

use std::collections::BTreeMap;

use bytes::Bytes;

/// A single field value.
#[derive(Debug, Clone, PartialEq)]
pub enum Value {
    Bool(bool),
    I32(i32),
    I64(i64),
    U32(u32),
    U64(u64),
    F32(f32),
    F64(f64),
    String(String),
    Bytes(Bytes),
    /// Enum number (may be outside the declared values).
    Enum(i32),
    Message(DynamicMessage),
    /// Elements of a repeated field.
    List(Vec<Value>),
    /// Entries of a map field in insertion order.
    Map(Vec<(Value, Value)>),
}

impl Value {
    pub fn as_message(&self) -> Option<&DynamicMessage> {
        match self {
            Value::Message(m) => Some(m),
            _ => None,
        }
    }

    pub fn as_list(&self) -> Option<&[Value]> {
        match self {
            Value::List(items) => Some(items),
            _ => None,
        }
    }
}

/// Decoded or constructed message contents.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct DynamicMessage {
    fields: BTreeMap<u32, Value>,
}

impl DynamicMessage {
    pub fn new() -> Self {
        Self::default()
    }

    /// Value of field `number`, if present.
    pub fn get(&self, number: u32) -> Option<&Value> {
        self.fields.get(&number)
    }

    pub fn has(&self, number: u32) -> bool {
        self.fields.contains_key(&number)
    }

    /// Set field `number`, replacing any previous value.
    pub fn set(&mut self, number: u32, value: Value) {
        self.fields.insert(number, value);
    }

    pub fn clear(&mut self, number: u32) -> Option<Value> {
        self.fields.remove(&number)
    }

    /// Append to a repeated field, creating the list if absent.
    pub(crate) fn push(&mut self, number: u32, value: Value) {
        match self.fields.get_mut(&number) {
            Some(Value::List(items)) => items.push(value),
            _ => {
                self.fields.insert(number, Value::List(vec![value]));
            }
        }
    }

    /// Insert into a map field; a repeated key replaces the earlier entry.
    pub(crate) fn insert_entry(&mut self, number: u32, key: Value, value: Value) {
        match self.fields.get_mut(&number) {
            Some(Value::Map(entries)) => {
                if let Some(slot) = entries.iter_mut().find(|(k, _)| *k == key) {
                    slot.1 = value;
                } else {
                    entries.push((key, value));
                }
            }
            _ => {
                self.fields.insert(number, Value::Map(vec![(key, value)]));
            }
        }
    }

    /// Present fields in field-number order.
    pub fn iter(&self) -> impl Iterator<Item = (u32, &Value)> {
        self.fields.iter().map(|(n, v)| (*n, v))
    }

    pub fn len(&self) -> usize {
        self.fields.len()
    }

    pub fn is_empty(&self) -> bool {
        self.fields.is_empty()
    }
}
