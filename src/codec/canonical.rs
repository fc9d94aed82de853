//! Canonical structured form of decoded messages.
//!
//! The canonical form is a JSON object keyed by field name. How 64-bit
//! integers, enums and byte strings are rendered, and whether absent fields
//! get default values, is controlled by [`ConversionOptions`].
//!
//! # Example
//!
//! ```
//! use protowire::codec::{ConversionOptions, LongRepr};
//!
//! let options = ConversionOptions::default()
//!     .with_longs(LongRepr::Number)
//!     .with_defaults(true);
//! assert!(options.defaults);
//! ```

use base64::engine::general_purpose::STANDARD;
use base64::Engine;
use serde::Deserialize;
use serde_json::{json, Map, Number, Value as Json};

use super::value::{DynamicMessage, Value};
use crate::schema::{DescriptorPool, FieldDescriptor, FieldKind, MessageDescriptor, ScalarKind};

/// Rendering of 64-bit integers.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Deserialize)]
#[serde(from = "String")]
pub enum LongRepr {
    /// Decimal string, exact.
    #[default]
    String,
    /// JSON number.
    Number,
    /// `{"low": i32, "high": i32, "unsigned": bool}`.
    Long,
}

impl From<String> for LongRepr {
    fn from(value: String) -> Self {
        match value.as_str() {
            "Number" => LongRepr::Number,
            "Long" => LongRepr::Long,
            _ => LongRepr::String,
        }
    }
}

/// Rendering of enum values.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Deserialize)]
#[serde(from = "String")]
pub enum EnumRepr {
    /// Value name; unknown numbers stay numeric.
    #[default]
    String,
    Number,
}

impl From<String> for EnumRepr {
    fn from(value: String) -> Self {
        match value.as_str() {
            "Number" => EnumRepr::Number,
            _ => EnumRepr::String,
        }
    }
}

/// Rendering of byte strings.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Deserialize)]
#[serde(from = "String")]
pub enum BytesRepr {
    /// Standard base64.
    #[default]
    String,
    /// Array of byte values.
    Array,
    /// `{"type": "Buffer", "data": [..]}`.
    Buffer,
}

impl From<String> for BytesRepr {
    fn from(value: String) -> Self {
        match value.as_str() {
            "Array" => BytesRepr::Array,
            "Buffer" => BytesRepr::Buffer,
            _ => BytesRepr::String,
        }
    }
}

/// Options for [`to_canonical`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct ConversionOptions {
    pub longs: LongRepr,
    pub enums: EnumRepr,
    pub bytes: BytesRepr,
    /// Emit defaults for absent non-oneof fields (also `[]` and `{}`).
    pub defaults: bool,
    /// Emit `[]` for absent repeated fields.
    pub arrays: bool,
    /// Emit `{}` for absent map fields.
    pub objects: bool,
    /// Add a property per oneof naming the present member.
    pub oneofs: bool,
    /// Render NaN and infinities as strings instead of null.
    pub json: bool,
}

impl ConversionOptions {
    pub fn with_longs(mut self, longs: LongRepr) -> Self {
        self.longs = longs;
        self
    }

    pub fn with_enums(mut self, enums: EnumRepr) -> Self {
        self.enums = enums;
        self
    }

    pub fn with_bytes(mut self, bytes: BytesRepr) -> Self {
        self.bytes = bytes;
        self
    }

    pub fn with_defaults(mut self, defaults: bool) -> Self {
        self.defaults = defaults;
        self
    }

    pub fn with_arrays(mut self, arrays: bool) -> Self {
        self.arrays = arrays;
        self
    }

    pub fn with_objects(mut self, objects: bool) -> Self {
        self.objects = objects;
        self
    }

    pub fn with_oneofs(mut self, oneofs: bool) -> Self {
        self.oneofs = oneofs;
        self
    }

    pub fn with_json(mut self, json: bool) -> Self {
        self.json = json;
        self
    }
}

/// Convert `msg` into its canonical object.
///
/// Fields appear in field-number order, followed by virtual oneof
/// properties when requested.
pub fn to_canonical(
    pool: &DescriptorPool,
    desc: &MessageDescriptor,
    msg: &DynamicMessage,
    options: &ConversionOptions,
) -> Json {
    let mut object = Map::new();

    for field in desc.fields() {
        match msg.get(field.number()) {
            Some(value) => {
                object.insert(field.name().to_string(), field_value(pool, field, value, options));
            }
            None if field.is_map() => {
                if options.defaults || options.objects {
                    object.insert(field.name().to_string(), Json::Object(Map::new()));
                }
            }
            None if field.is_repeated() => {
                if options.defaults || options.arrays {
                    object.insert(field.name().to_string(), Json::Array(Vec::new()));
                }
            }
            None => {
                if options.defaults && field.oneof().is_none() {
                    object.insert(field.name().to_string(), default_json(pool, field.kind(), options));
                }
            }
        }
    }

    if options.oneofs {
        for oneof in desc.oneofs() {
            if let Some(present) = desc.oneof_members(oneof).find(|f| msg.has(f.number())) {
                object.insert(oneof.clone(), Json::String(present.name().to_string()));
            }
        }
    }

    Json::Object(object)
}

fn field_value(
    pool: &DescriptorPool,
    field: &FieldDescriptor,
    value: &Value,
    options: &ConversionOptions,
) -> Json {
    match (field.kind(), value) {
        (FieldKind::Map { key, value: value_kind }, Value::Map(entries)) => {
            let mut object = Map::new();
            for (k, v) in entries {
                object.insert(map_key(*key, k), convert(pool, value_kind, v, options));
            }
            Json::Object(object)
        }
        (kind, Value::List(items)) => Json::Array(
            items
                .iter()
                .map(|item| convert(pool, kind, item, options))
                .collect(),
        ),
        (kind, value) => convert(pool, kind, value, options),
    }
}

fn map_key(kind: ScalarKind, key: &Value) -> String {
    match key {
        Value::String(s) => s.clone(),
        Value::Bool(b) => b.to_string(),
        Value::I32(n) => n.to_string(),
        Value::I64(n) => n.to_string(),
        Value::U32(n) => n.to_string(),
        Value::U64(n) => n.to_string(),
        other => {
            tracing::debug!(key_kind = kind.name(), value = ?other, "unexpected map key value");
            String::new()
        }
    }
}

fn convert(pool: &DescriptorPool, kind: &FieldKind, value: &Value, options: &ConversionOptions) -> Json {
    match value {
        Value::Bool(b) => Json::Bool(*b),
        Value::I32(n) => json!(n),
        Value::U32(n) => json!(n),
        Value::I64(n) => long_json(*n as u64, *n, false, options.longs),
        Value::U64(n) => long_json(*n, *n as i64, true, options.longs),
        Value::F32(f) => float_json(f64::from(*f), options.json),
        Value::F64(f) => float_json(*f, options.json),
        Value::String(s) => Json::String(s.clone()),
        Value::Bytes(b) => bytes_json(b, options.bytes),
        Value::Enum(n) => enum_json(pool, kind, *n, options.enums),
        Value::Message(nested) => match kind {
            FieldKind::Message(name) => match pool.message(name) {
                Some(desc) => to_canonical(pool, desc, nested, options),
                None => Json::Null,
            },
            _ => Json::Null,
        },
        Value::List(items) => Json::Array(items.iter().map(|v| convert(pool, kind, v, options)).collect()),
        Value::Map(_) => Json::Null,
    }
}

fn long_json(bits: u64, signed: i64, unsigned: bool, repr: LongRepr) -> Json {
    match repr {
        LongRepr::String if unsigned => Json::String(bits.to_string()),
        LongRepr::String => Json::String(signed.to_string()),
        LongRepr::Number if unsigned => json!(bits),
        LongRepr::Number => json!(signed),
        LongRepr::Long => json!({
            "low": bits as u32 as i32,
            "high": (bits >> 32) as u32 as i32,
            "unsigned": unsigned,
        }),
    }
}

fn float_json(value: f64, json_mode: bool) -> Json {
    match Number::from_f64(value) {
        Some(n) => Json::Number(n),
        None if json_mode => {
            let text = if value.is_nan() {
                "NaN"
            } else if value > 0.0 {
                "Infinity"
            } else {
                "-Infinity"
            };
            Json::String(text.to_string())
        }
        None => Json::Null,
    }
}

fn bytes_json(bytes: &[u8], repr: BytesRepr) -> Json {
    match repr {
        BytesRepr::String => Json::String(STANDARD.encode(bytes)),
        BytesRepr::Array => Json::Array(bytes.iter().map(|b| json!(b)).collect()),
        BytesRepr::Buffer => json!({ "type": "Buffer", "data": bytes }),
    }
}

fn enum_json(pool: &DescriptorPool, kind: &FieldKind, number: i32, repr: EnumRepr) -> Json {
    if repr == EnumRepr::String {
        let name = match kind {
            FieldKind::Enum(enum_name) => pool.enumeration(enum_name).and_then(|e| e.name_of(number)),
            _ => None,
        };
        if let Some(name) = name {
            return Json::String(name.to_string());
        }
    }
    json!(number)
}

fn default_json(pool: &DescriptorPool, kind: &FieldKind, options: &ConversionOptions) -> Json {
    match kind {
        FieldKind::Scalar(scalar) => match scalar {
            ScalarKind::Double | ScalarKind::Float => json!(0),
            ScalarKind::Bool => Json::Bool(false),
            ScalarKind::String => Json::String(String::new()),
            ScalarKind::Bytes => bytes_json(&[], options.bytes),
            s if s.is_long() => long_json(0, 0, s.is_unsigned(), options.longs),
            _ => json!(0),
        },
        FieldKind::Enum(name) => {
            let number = pool.enumeration(name).map(|e| e.default_number()).unwrap_or(0);
            enum_json(pool, kind, number, options.enums)
        }
        FieldKind::Message(_) | FieldKind::Map { .. } => Json::Null,
    }
}

#[cfg(test)]
mod tests {
    use bytes::Bytes;

    use super::*;
    use crate::schema::{EnumDescriptor, FieldDescriptor, MessageDescriptor};

    fn pool() -> DescriptorPool {
        DescriptorPool::builder()
            .message(
                MessageDescriptor::builder("Test")
                    .field(FieldDescriptor::scalar("count", 1, ScalarKind::Int64))
                    .field(FieldDescriptor::scalar("total", 2, ScalarKind::Uint64))
                    .field(FieldDescriptor::enumeration("color", 3, "Color"))
                    .field(FieldDescriptor::scalar("data", 4, ScalarKind::Bytes))
                    .field(FieldDescriptor::scalar("ratio", 5, ScalarKind::Double))
                    .field(FieldDescriptor::scalar("tags", 6, ScalarKind::String).repeated())
                    .field(FieldDescriptor::map(
                        "attrs",
                        7,
                        ScalarKind::Int32,
                        FieldKind::Scalar(ScalarKind::String),
                    ))
                    .field(FieldDescriptor::message("inner", 8, "Test"))
                    .field(FieldDescriptor::scalar("a", 9, ScalarKind::Int32).in_oneof("pick"))
                    .field(FieldDescriptor::scalar("b", 10, ScalarKind::String).in_oneof("pick"))
                    .build(),
            )
            .enumeration(EnumDescriptor::new("Color", [("RED", 0), ("BLUE", 1)]))
            .build()
            .unwrap()
    }

    fn canonical(msg: &DynamicMessage, options: ConversionOptions) -> Json {
        let pool = pool();
        let desc = pool.message("Test").unwrap().clone();
        to_canonical(&pool, &desc, msg, &options)
    }

    #[test]
    fn test_absent_fields_omitted() {
        assert_eq!(canonical(&DynamicMessage::new(), ConversionOptions::default()), json!({}));
    }

    #[test]
    fn test_long_representations() {
        let mut msg = DynamicMessage::new();
        msg.set(1, Value::I64(-2));
        msg.set(2, Value::U64(u64::MAX));

        let as_string = canonical(&msg, ConversionOptions::default());
        assert_eq!(as_string, json!({"count": "-2", "total": "18446744073709551615"}));

        let as_number = canonical(&msg, ConversionOptions::default().with_longs(LongRepr::Number));
        assert_eq!(as_number, json!({"count": -2, "total": u64::MAX}));

        let as_long = canonical(&msg, ConversionOptions::default().with_longs(LongRepr::Long));
        assert_eq!(
            as_long,
            json!({
                "count": {"low": -2, "high": -1, "unsigned": false},
                "total": {"low": -1, "high": -1, "unsigned": true},
            })
        );
    }

    #[test]
    fn test_enum_representations() {
        let mut msg = DynamicMessage::new();
        msg.set(3, Value::Enum(1));
        assert_eq!(canonical(&msg, ConversionOptions::default()), json!({"color": "BLUE"}));
        assert_eq!(
            canonical(&msg, ConversionOptions::default().with_enums(EnumRepr::Number)),
            json!({"color": 1})
        );

        msg.set(3, Value::Enum(42));
        assert_eq!(canonical(&msg, ConversionOptions::default()), json!({"color": 42}));
    }

    #[test]
    fn test_bytes_representations() {
        let mut msg = DynamicMessage::new();
        msg.set(4, Value::Bytes(Bytes::from_static(b"hi")));
        assert_eq!(canonical(&msg, ConversionOptions::default()), json!({"data": "aGk="}));
        assert_eq!(
            canonical(&msg, ConversionOptions::default().with_bytes(BytesRepr::Array)),
            json!({"data": [104, 105]})
        );
        assert_eq!(
            canonical(&msg, ConversionOptions::default().with_bytes(BytesRepr::Buffer)),
            json!({"data": {"type": "Buffer", "data": [104, 105]}})
        );
    }

    #[test]
    fn test_non_finite_floats() {
        let mut msg = DynamicMessage::new();
        msg.set(5, Value::F64(f64::NEG_INFINITY));
        assert_eq!(canonical(&msg, ConversionOptions::default()), json!({"ratio": null}));
        assert_eq!(
            canonical(&msg, ConversionOptions::default().with_json(true)),
            json!({"ratio": "-Infinity"})
        );
        msg.set(5, Value::F64(f64::NAN));
        assert_eq!(
            canonical(&msg, ConversionOptions::default().with_json(true)),
            json!({"ratio": "NaN"})
        );
    }

    #[test]
    fn test_defaults_skip_oneof_members() {
        let out = canonical(&DynamicMessage::new(), ConversionOptions::default().with_defaults(true));
        assert_eq!(
            out,
            json!({
                "count": "0",
                "total": "0",
                "color": "RED",
                "data": "",
                "ratio": 0,
                "tags": [],
                "attrs": {},
                "inner": null,
            })
        );
    }

    #[test]
    fn test_arrays_and_objects_flags() {
        let out = canonical(
            &DynamicMessage::new(),
            ConversionOptions::default().with_arrays(true).with_objects(true),
        );
        assert_eq!(out, json!({"tags": [], "attrs": {}}));
    }

    #[test]
    fn test_oneof_virtual_property() {
        let mut msg = DynamicMessage::new();
        msg.set(10, Value::String("x".into()));
        assert_eq!(
            canonical(&msg, ConversionOptions::default().with_oneofs(true)),
            json!({"b": "x", "pick": "b"})
        );
        assert_eq!(canonical(&msg, ConversionOptions::default()), json!({"b": "x"}));
    }

    #[test]
    fn test_nested_map_and_list() {
        let mut inner = DynamicMessage::new();
        inner.set(1, Value::I64(7));
        let mut msg = DynamicMessage::new();
        msg.set(6, Value::List(vec![Value::String("a".into()), Value::String("b".into())]));
        msg.set(7, Value::Map(vec![(Value::I32(3), Value::String("three".into()))]));
        msg.set(8, Value::Message(inner));
        assert_eq!(
            canonical(&msg, ConversionOptions::default()),
            json!({"tags": ["a", "b"], "attrs": {"3": "three"}, "inner": {"count": "7"}})
        );
    }

    #[test]
    fn test_repr_from_unknown_string() {
        assert_eq!(LongRepr::from("Bogus".to_string()), LongRepr::String);
        assert_eq!(EnumRepr::from("Number".to_string()), EnumRepr::Number);
        assert_eq!(BytesRepr::from("Buffer".to_string()), BytesRepr::Buffer);
    }
}
