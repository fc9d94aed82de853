//! Building messages from their canonical structured form.
//!
//! Strict construction accepts only values of the exact expected shape.
//! Flexible construction coerces: numbers from strings, booleans from
//! truthiness, enums from names, 32-bit integers with wrap-around. In both
//! modes a repeated field must be an array and a message or map field must be
//! an object.

use base64::engine::general_purpose::STANDARD;
use base64::Engine;
use bytes::Bytes;
use serde_json::Value as Json;

use super::value::{DynamicMessage, Value};
use super::verify::{expected_name, field_path};
use crate::error::ValidationError;
use crate::schema::{DescriptorPool, FieldKind, MessageDescriptor, ScalarKind};

/// Build a message of type `desc` from `value`.
///
/// `null` properties are treated as absent; properties that name no field
/// are ignored. Required fields are not checked here, see
/// [`verify`](super::verify).
pub fn from_canonical(
    pool: &DescriptorPool,
    desc: &MessageDescriptor,
    value: &Json,
    strict: bool,
) -> Result<DynamicMessage, ValidationError> {
    match value {
        Json::Object(_) => build_message(pool, desc, value, strict, ""),
        _ => Err(ValidationError::ObjectExpected {
            field: desc.name().to_string(),
        }),
    }
}

fn build_message(
    pool: &DescriptorPool,
    desc: &MessageDescriptor,
    value: &Json,
    strict: bool,
    prefix: &str,
) -> Result<DynamicMessage, ValidationError> {
    let Json::Object(object) = value else {
        return Err(ValidationError::ObjectExpected {
            field: prefix.to_string(),
        });
    };

    let mut msg = DynamicMessage::new();
    for field in desc.fields() {
        let raw = match object.get(field.name()) {
            None | Some(Json::Null) => continue,
            Some(raw) => raw,
        };
        let path = field_path(prefix, field.name());

        match field.kind() {
            FieldKind::Map { key, value: value_kind } => {
                let Json::Object(entries) = raw else {
                    return Err(ValidationError::ObjectExpected { field: path });
                };
                let mut map = Vec::with_capacity(entries.len());
                for (k, v) in entries {
                    let key = map_key(*key, k, strict, &path)?;
                    let entry_path = format!("{path}.{k}");
                    if let Some(v) = convert(pool, value_kind, v, strict, &entry_path)? {
                        map.push((key, v));
                    }
                }
                msg.set(field.number(), Value::Map(map));
            }
            kind if field.is_repeated() => {
                let Json::Array(items) = raw else {
                    return Err(ValidationError::ArrayExpected { field: path });
                };
                let mut list = Vec::with_capacity(items.len());
                for (i, item) in items.iter().enumerate() {
                    if let Some(v) = convert(pool, kind, item, strict, &format!("{path}[{i}]"))? {
                        list.push(v);
                    }
                }
                msg.set(field.number(), Value::List(list));
            }
            kind => {
                if let Some(v) = convert(pool, kind, raw, strict, &path)? {
                    msg.set(field.number(), v);
                }
            }
        }
    }
    Ok(msg)
}

/// Convert one JSON value. `Ok(None)` leaves the field unset.
fn convert(
    pool: &DescriptorPool,
    kind: &FieldKind,
    value: &Json,
    strict: bool,
    path: &str,
) -> Result<Option<Value>, ValidationError> {
    let invalid = || ValidationError::InvalidValue {
        field: path.to_string(),
        expected: expected_name(kind),
    };

    match kind {
        FieldKind::Message(name) => {
            let desc = pool.message(name).ok_or_else(invalid)?;
            if !value.is_object() {
                return Err(ValidationError::ObjectExpected {
                    field: path.to_string(),
                });
            }
            build_message(pool, desc, value, strict, path).map(|m| Some(Value::Message(m)))
        }
        FieldKind::Enum(name) => {
            let desc = pool.enumeration(name).ok_or_else(invalid)?;
            let number = match value {
                Json::String(s) => desc.number_of(s),
                Json::Number(n) if strict => n
                    .as_i64()
                    .and_then(|n| i32::try_from(n).ok())
                    .filter(|n| desc.name_of(*n).is_some()),
                Json::Number(n) => n.as_f64().map(to_int32),
                _ => None,
            };
            match number {
                Some(n) => Ok(Some(Value::Enum(n))),
                None if strict => Err(invalid()),
                None => Ok(None),
            }
        }
        FieldKind::Scalar(scalar) => {
            let converted = if strict {
                strict_scalar(*scalar, value)
            } else {
                flexible_scalar(*scalar, value)
            };
            match converted {
                Some(v) => Ok(Some(v)),
                // numbers and booleans have no byte representation
                None if !strict && *scalar == ScalarKind::Bytes && !value.is_string() => Ok(None),
                None => Err(invalid()),
            }
        }
        FieldKind::Map { .. } => Err(invalid()),
    }
}

fn strict_scalar(kind: ScalarKind, value: &Json) -> Option<Value> {
    match kind {
        ScalarKind::Double => value.as_f64().map(Value::F64),
        ScalarKind::Float => value.as_f64().map(|f| Value::F32(f as f32)),
        ScalarKind::Bool => value.as_bool().map(Value::Bool),
        ScalarKind::String => value.as_str().map(|s| Value::String(s.to_string())),
        ScalarKind::Bytes => bytes_from_json(value).map(Value::Bytes),
        s if s.is_long() => {
            let n = match value {
                Json::Number(_) => exact_integer(value)?,
                Json::String(s) => s.trim().parse::<i128>().ok()?,
                Json::Object(_) => long_bits(value, s.is_unsigned())?,
                _ => return None,
            };
            integer_value(s, n)
        }
        s => integer_value(s, exact_integer(value)?),
    }
}

fn flexible_scalar(kind: ScalarKind, value: &Json) -> Option<Value> {
    match kind {
        ScalarKind::Double => Some(Value::F64(to_number(value))),
        ScalarKind::Float => Some(Value::F32(to_number(value) as f32)),
        ScalarKind::Bool => Some(Value::Bool(truthy(value))),
        ScalarKind::String => Some(Value::String(match value {
            Json::String(s) => s.clone(),
            other => other.to_string(),
        })),
        ScalarKind::Bytes => bytes_from_json(value).map(Value::Bytes),
        ScalarKind::Int32 | ScalarKind::Sint32 | ScalarKind::Sfixed32 => {
            Some(Value::I32(to_int32(to_number(value))))
        }
        ScalarKind::Uint32 | ScalarKind::Fixed32 => {
            Some(Value::U32(to_int32(to_number(value)) as u32))
        }
        s => {
            let n = match value {
                Json::String(text) => text
                    .trim()
                    .parse::<i128>()
                    .ok()
                    .unwrap_or_else(|| saturating_i128(to_number(value))),
                Json::Object(_) => long_bits(value, s.is_unsigned()).unwrap_or(0),
                other => saturating_i128(to_number(other)),
            };
            Some(match s {
                ScalarKind::Uint64 | ScalarKind::Fixed64 => Value::U64(n as u64),
                _ => Value::I64(n as i64),
            })
        }
    }
}

/// Integer held by a JSON number, if it has no fractional part.
fn exact_integer(value: &Json) -> Option<i128> {
    let Json::Number(n) = value else {
        return None;
    };
    if let Some(i) = n.as_i64() {
        return Some(i128::from(i));
    }
    if let Some(u) = n.as_u64() {
        return Some(i128::from(u));
    }
    let f = n.as_f64()?;
    (f.is_finite() && f.fract() == 0.0).then(|| saturating_i128(f))
}

/// `{"low", "high", "unsigned"}` object as an integer.
fn long_bits(value: &Json, unsigned_field: bool) -> Option<i128> {
    let low = value.get("low")?.as_i64()?;
    let high = value.get("high")?.as_i64()?;
    let unsigned = value
        .get("unsigned")
        .and_then(Json::as_bool)
        .unwrap_or(unsigned_field);
    let bits = (u64::from(high as u32) << 32) | u64::from(low as u32);
    Some(if unsigned {
        i128::from(bits)
    } else {
        i128::from(bits as i64)
    })
}

/// Range-checked integer for an integral kind.
fn integer_value(kind: ScalarKind, n: i128) -> Option<Value> {
    match kind {
        ScalarKind::Int32 | ScalarKind::Sint32 | ScalarKind::Sfixed32 => {
            i32::try_from(n).ok().map(Value::I32)
        }
        ScalarKind::Uint32 | ScalarKind::Fixed32 => u32::try_from(n).ok().map(Value::U32),
        ScalarKind::Int64 | ScalarKind::Sint64 | ScalarKind::Sfixed64 => {
            i64::try_from(n).ok().map(Value::I64)
        }
        ScalarKind::Uint64 | ScalarKind::Fixed64 => {
            // negative values reinterpret as two's complement
            if n < 0 {
                i64::try_from(n).ok().map(|n| Value::U64(n as u64))
            } else {
                u64::try_from(n).ok().map(Value::U64)
            }
        }
        _ => None,
    }
}

fn bytes_from_json(value: &Json) -> Option<Bytes> {
    match value {
        Json::String(s) => STANDARD.decode(s.trim()).ok().map(Bytes::from),
        Json::Array(items) => items
            .iter()
            .map(|item| item.as_f64().map(|f| to_int32(f) as u8))
            .collect::<Option<Vec<u8>>>()
            .map(Bytes::from),
        Json::Object(object) if object.get("type").and_then(Json::as_str) == Some("Buffer") => {
            object.get("data").and_then(bytes_from_json)
        }
        _ => None,
    }
}

fn map_key(kind: ScalarKind, key: &str, strict: bool, path: &str) -> Result<Value, ValidationError> {
    let parsed = match kind {
        ScalarKind::String => Some(Value::String(key.to_string())),
        ScalarKind::Bool => match key {
            "true" => Some(Value::Bool(true)),
            "false" => Some(Value::Bool(false)),
            _ if strict => None,
            _ => Some(Value::Bool(!key.is_empty())),
        },
        integral => match key.trim().parse::<i128>() {
            Ok(n) => integer_value(integral, n),
            Err(_) if strict => None,
            Err(_) => integer_value(integral, 0),
        },
    };
    parsed.ok_or_else(|| ValidationError::InvalidValue {
        field: format!("{path} key"),
        expected: expected_name(&FieldKind::Scalar(kind)),
    })
}

/// Numeric coercion: strings parse, booleans are 0/1, anything else is NaN.
fn to_number(value: &Json) -> f64 {
    match value {
        Json::Number(n) => n.as_f64().unwrap_or(f64::NAN),
        Json::Bool(b) => f64::from(u8::from(*b)),
        Json::String(s) => {
            let s = s.trim();
            if s.is_empty() {
                0.0
            } else {
                s.parse::<f64>().unwrap_or(f64::NAN)
            }
        }
        Json::Null => 0.0,
        _ => f64::NAN,
    }
}

/// Truncate to a 32-bit integer with wrap-around; NaN and infinities are 0.
fn to_int32(value: f64) -> i32 {
    if !value.is_finite() {
        return 0;
    }
    let wrapped = value.trunc() % 4_294_967_296.0;
    wrapped as i64 as u32 as i32
}

fn saturating_i128(value: f64) -> i128 {
    if value.is_finite() {
        value.trunc() as i128
    } else {
        0
    }
}

fn truthy(value: &Json) -> bool {
    match value {
        Json::Null => false,
        Json::Bool(b) => *b,
        Json::Number(n) => n.as_f64().map(|f| f != 0.0 && !f.is_nan()).unwrap_or(false),
        Json::String(s) => !s.is_empty(),
        Json::Array(_) | Json::Object(_) => true,
    }
}

#[cfg(test)]
mod tests {
    use serde_json::json;

    use super::*;
    use crate::schema::{EnumDescriptor, FieldDescriptor, MessageDescriptor};

    fn pool() -> DescriptorPool {
        DescriptorPool::builder()
            .message(
                MessageDescriptor::builder("Test")
                    .field(FieldDescriptor::scalar("ratio", 1, ScalarKind::Double))
                    .field(FieldDescriptor::scalar("count", 2, ScalarKind::Int32))
                    .field(FieldDescriptor::scalar("big", 3, ScalarKind::Int64))
                    .field(FieldDescriptor::scalar("flag", 4, ScalarKind::Bool))
                    .field(FieldDescriptor::scalar("label", 5, ScalarKind::String))
                    .field(FieldDescriptor::scalar("blob", 6, ScalarKind::Bytes))
                    .field(FieldDescriptor::enumeration("color", 7, "Color"))
                    .field(FieldDescriptor::scalar("items", 8, ScalarKind::Uint32).repeated())
                    .field(FieldDescriptor::message("inner", 9, "Inner"))
                    .field(FieldDescriptor::map(
                        "scores",
                        10,
                        ScalarKind::Int32,
                        FieldKind::Scalar(ScalarKind::Float),
                    ))
                    .build(),
            )
            .message(
                MessageDescriptor::builder("Inner")
                    .field(FieldDescriptor::scalar("id", 1, ScalarKind::Uint64))
                    .build(),
            )
            .enumeration(EnumDescriptor::new("Color", [("RED", 0), ("BLUE", 3)]))
            .build()
            .unwrap()
    }

    fn build(value: Json, strict: bool) -> Result<DynamicMessage, ValidationError> {
        let pool = pool();
        let desc = pool.message("Test").unwrap().clone();
        from_canonical(&pool, &desc, &value, strict)
    }

    #[test]
    fn test_strict_exact_shapes() {
        let msg = build(
            json!({
                "ratio": 1.5,
                "count": -3,
                "big": "9007199254740993",
                "flag": true,
                "label": "x",
                "blob": "aGk=",
                "color": "BLUE",
                "items": [1, 2],
                "inner": {"id": {"low": -1, "high": 0, "unsigned": true}},
                "scores": {"7": 0.5},
                "unknown": 1,
            }),
            true,
        )
        .unwrap();
        assert_eq!(msg.get(1), Some(&Value::F64(1.5)));
        assert_eq!(msg.get(2), Some(&Value::I32(-3)));
        assert_eq!(msg.get(3), Some(&Value::I64(9_007_199_254_740_993)));
        assert_eq!(msg.get(4), Some(&Value::Bool(true)));
        assert_eq!(msg.get(6), Some(&Value::Bytes(Bytes::from_static(b"hi"))));
        assert_eq!(msg.get(7), Some(&Value::Enum(3)));
        assert_eq!(msg.get(8), Some(&Value::List(vec![Value::U32(1), Value::U32(2)])));
        let inner = msg.get(9).and_then(Value::as_message).unwrap();
        assert_eq!(inner.get(1), Some(&Value::U64(0xFFFF_FFFF)));
        assert_eq!(msg.get(10), Some(&Value::Map(vec![(Value::I32(7), Value::F32(0.5))])));
    }

    #[test]
    fn test_strict_rejects_coercions() {
        let err = build(json!({"count": "12"}), true).unwrap_err();
        assert_eq!(
            err,
            ValidationError::InvalidValue {
                field: "count".into(),
                expected: "integer"
            }
        );
        assert!(build(json!({"count": 1.5}), true).is_err());
        assert!(build(json!({"count": 3_000_000_000u64}), true).is_err());
        assert!(build(json!({"flag": 1}), true).is_err());
        assert!(build(json!({"label": 5}), true).is_err());
        assert!(build(json!({"color": 1}), true).is_err());
        assert!(build(json!({"color": "GREEN"}), true).is_err());
        assert!(build(json!({"ratio": "1.5"}), true).is_err());
    }

    #[test]
    fn test_strict_nested_path() {
        let err = build(json!({"inner": {"id": true}}), true).unwrap_err();
        assert_eq!(
            err,
            ValidationError::InvalidValue {
                field: "inner.id".into(),
                expected: "integer|Long"
            }
        );
    }

    #[test]
    fn test_flexible_coercions() {
        let msg = build(
            json!({
                "ratio": "2.5",
                "count": "42",
                "big": 12.9,
                "flag": "yes",
                "label": 7,
                "color": "BLUE",
                "items": ["3", -1],
            }),
            false,
        )
        .unwrap();
        assert_eq!(msg.get(1), Some(&Value::F64(2.5)));
        assert_eq!(msg.get(2), Some(&Value::I32(42)));
        assert_eq!(msg.get(3), Some(&Value::I64(12)));
        assert_eq!(msg.get(4), Some(&Value::Bool(true)));
        assert_eq!(msg.get(5), Some(&Value::String("7".into())));
        assert_eq!(msg.get(7), Some(&Value::Enum(3)));
        assert_eq!(
            msg.get(8),
            Some(&Value::List(vec![Value::U32(3), Value::U32(u32::MAX)]))
        );
    }

    #[test]
    fn test_flexible_int32_wraps() {
        let msg = build(json!({"count": 4_294_967_297u64}), false).unwrap();
        assert_eq!(msg.get(2), Some(&Value::I32(1)));
        let msg = build(json!({"count": "abc"}), false).unwrap();
        assert_eq!(msg.get(2), Some(&Value::I32(0)));
    }

    #[test]
    fn test_flexible_unknown_enum_name_unset() {
        let msg = build(json!({"color": "GREEN"}), false).unwrap();
        assert!(!msg.has(7));
        let msg = build(json!({"color": 9}), false).unwrap();
        assert_eq!(msg.get(7), Some(&Value::Enum(9)));
    }

    #[test]
    fn test_shape_errors_in_both_modes() {
        for strict in [true, false] {
            assert_eq!(
                build(json!({"items": 5}), strict).unwrap_err(),
                ValidationError::ArrayExpected {
                    field: "items".into()
                }
            );
            assert_eq!(
                build(json!({"inner": "x"}), strict).unwrap_err(),
                ValidationError::ObjectExpected {
                    field: "inner".into()
                }
            );
            assert_eq!(
                build(json!([1, 2]), strict).unwrap_err(),
                ValidationError::ObjectExpected {
                    field: "Test".into()
                }
            );
        }
    }

    #[test]
    fn test_bytes_forms() {
        let expected = Some(Value::Bytes(Bytes::from_static(&[1, 2])));
        for value in [
            json!({"blob": "AQI="}),
            json!({"blob": [1, 2]}),
            json!({"blob": {"type": "Buffer", "data": [1, 2]}}),
        ] {
            assert_eq!(build(value, true).unwrap().get(6).cloned(), expected);
        }
        assert!(build(json!({"blob": "not base64!"}), false).is_err());
        assert!(!build(json!({"blob": 5}), false).unwrap().has(6));
    }

    #[test]
    fn test_null_is_absent() {
        let msg = build(json!({"count": null, "inner": null}), true).unwrap();
        assert!(msg.is_empty());
    }

    #[test]
    fn test_to_int32() {
        assert_eq!(to_int32(-1.7), -1);
        assert_eq!(to_int32(2_147_483_648.0), i32::MIN);
        assert_eq!(to_int32(f64::NAN), 0);
        assert_eq!(to_int32(f64::INFINITY), 0);
    }
}
