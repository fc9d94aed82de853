//! Structural checks on in-memory messages.

use super::value::{DynamicMessage, Value};
use crate::error::ValidationError;
use crate::schema::{DescriptorPool, FieldDescriptor, FieldKind, MessageDescriptor, ScalarKind};

/// Check that `msg` satisfies `desc`.
///
/// Required fields must be present (recursively), at most one member of
/// each oneof may be set, and every value must match its field kind.
pub fn verify(
    pool: &DescriptorPool,
    desc: &MessageDescriptor,
    msg: &DynamicMessage,
) -> Result<(), ValidationError> {
    verify_nested(pool, desc, msg, "")
}

/// Path of the first absent required field, if any.
pub fn missing_required(
    pool: &DescriptorPool,
    desc: &MessageDescriptor,
    msg: &DynamicMessage,
) -> Option<String> {
    match verify(pool, desc, msg) {
        Err(ValidationError::MissingRequired { field }) => Some(field),
        _ => None,
    }
}

/// Dotted path of a field below `prefix`.
pub(crate) fn field_path(prefix: &str, name: &str) -> String {
    if prefix.is_empty() {
        name.to_string()
    } else {
        format!("{prefix}.{name}")
    }
}

fn verify_nested(
    pool: &DescriptorPool,
    desc: &MessageDescriptor,
    msg: &DynamicMessage,
    prefix: &str,
) -> Result<(), ValidationError> {
    for field in desc.fields() {
        let path = field_path(prefix, field.name());
        match msg.get(field.number()) {
            None if field.is_required() => {
                return Err(ValidationError::MissingRequired { field: path })
            }
            None => {}
            Some(value) => check_field(pool, field, value, &path)?,
        }
    }

    for oneof in desc.oneofs() {
        let present = desc
            .oneof_members(oneof)
            .filter(|f| msg.has(f.number()))
            .count();
        if present > 1 {
            return Err(ValidationError::MultipleOneofValues {
                oneof: field_path(prefix, oneof),
            });
        }
    }
    Ok(())
}

fn check_field(
    pool: &DescriptorPool,
    field: &FieldDescriptor,
    value: &Value,
    path: &str,
) -> Result<(), ValidationError> {
    match (field.kind(), value) {
        (FieldKind::Map { key, value: value_kind }, Value::Map(entries)) => {
            for (k, v) in entries {
                if !scalar_matches(*key, k) {
                    return Err(ValidationError::InvalidValue {
                        field: format!("{path} key"),
                        expected: expected_name(&FieldKind::Scalar(*key)),
                    });
                }
                check_single(pool, value_kind, v, path)?;
            }
            Ok(())
        }
        (FieldKind::Map { .. }, _) => Err(ValidationError::ObjectExpected {
            field: path.to_string(),
        }),
        (kind, Value::List(items)) if field.is_repeated() => {
            for (i, item) in items.iter().enumerate() {
                check_single(pool, kind, item, &format!("{path}[{i}]"))?;
            }
            Ok(())
        }
        _ if field.is_repeated() => Err(ValidationError::ArrayExpected {
            field: path.to_string(),
        }),
        (kind, value) => check_single(pool, kind, value, path),
    }
}

fn check_single(
    pool: &DescriptorPool,
    kind: &FieldKind,
    value: &Value,
    path: &str,
) -> Result<(), ValidationError> {
    let ok = match (kind, value) {
        (FieldKind::Scalar(scalar), value) => scalar_matches(*scalar, value),
        (FieldKind::Enum(_), Value::Enum(_)) => true,
        (FieldKind::Message(name), Value::Message(nested)) => {
            return match pool.message(name) {
                Some(desc) => verify_nested(pool, desc, nested, path),
                None => Err(ValidationError::InvalidValue {
                    field: path.to_string(),
                    expected: "object",
                }),
            };
        }
        _ => false,
    };
    if ok {
        Ok(())
    } else {
        Err(ValidationError::InvalidValue {
            field: path.to_string(),
            expected: expected_name(kind),
        })
    }
}

fn scalar_matches(kind: ScalarKind, value: &Value) -> bool {
    matches!(
        (kind, value),
        (ScalarKind::Double, Value::F64(_))
            | (ScalarKind::Float, Value::F32(_))
            | (
                ScalarKind::Int32 | ScalarKind::Sint32 | ScalarKind::Sfixed32,
                Value::I32(_)
            )
            | (
                ScalarKind::Int64 | ScalarKind::Sint64 | ScalarKind::Sfixed64,
                Value::I64(_)
            )
            | (ScalarKind::Uint32 | ScalarKind::Fixed32, Value::U32(_))
            | (ScalarKind::Uint64 | ScalarKind::Fixed64, Value::U64(_))
            | (ScalarKind::Bool, Value::Bool(_))
            | (ScalarKind::String, Value::String(_))
            | (ScalarKind::Bytes, Value::Bytes(_))
    )
}

/// Human name of the value shape a kind expects.
pub(crate) fn expected_name(kind: &FieldKind) -> &'static str {
    match kind {
        FieldKind::Scalar(scalar) => match scalar {
            ScalarKind::Double | ScalarKind::Float => "number",
            ScalarKind::Bool => "boolean",
            ScalarKind::String => "string",
            ScalarKind::Bytes => "buffer",
            s if s.is_long() => "integer|Long",
            _ => "integer",
        },
        FieldKind::Enum(_) => "enum value",
        FieldKind::Message(_) | FieldKind::Map { .. } => "object",
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::schema::MessageDescriptor;

    fn pool() -> DescriptorPool {
        DescriptorPool::builder()
            .message(
                MessageDescriptor::builder("Outer")
                    .field(FieldDescriptor::scalar("id", 1, ScalarKind::Uint32).required())
                    .field(FieldDescriptor::message("inner", 2, "Inner"))
                    .field(FieldDescriptor::scalar("a", 3, ScalarKind::Int32).in_oneof("pick"))
                    .field(FieldDescriptor::scalar("b", 4, ScalarKind::Int32).in_oneof("pick"))
                    .field(FieldDescriptor::scalar("list", 5, ScalarKind::Bool).repeated())
                    .build(),
            )
            .message(
                MessageDescriptor::builder("Inner")
                    .field(FieldDescriptor::scalar("name", 1, ScalarKind::String).required())
                    .build(),
            )
            .build()
            .unwrap()
    }

    fn check(msg: &DynamicMessage) -> Result<(), ValidationError> {
        let pool = pool();
        let desc = pool.message("Outer").unwrap().clone();
        verify(&pool, &desc, msg)
    }

    fn valid() -> DynamicMessage {
        let mut msg = DynamicMessage::new();
        msg.set(1, Value::U32(1));
        msg
    }

    #[test]
    fn test_verify_valid() {
        assert_eq!(check(&valid()), Ok(()));
    }

    #[test]
    fn test_verify_missing_required() {
        assert_eq!(
            check(&DynamicMessage::new()),
            Err(ValidationError::MissingRequired { field: "id".into() })
        );

        let mut msg = valid();
        msg.set(2, Value::Message(DynamicMessage::new()));
        assert_eq!(
            check(&msg),
            Err(ValidationError::MissingRequired {
                field: "inner.name".into()
            })
        );

        let pool = pool();
        let desc = pool.message("Outer").unwrap().clone();
        assert_eq!(missing_required(&pool, &desc, &msg), Some("inner.name".into()));
        assert_eq!(missing_required(&pool, &desc, &valid()), None);
    }

    #[test]
    fn test_verify_oneof_exclusive() {
        let mut msg = valid();
        msg.set(3, Value::I32(1));
        msg.set(4, Value::I32(2));
        assert_eq!(
            check(&msg),
            Err(ValidationError::MultipleOneofValues {
                oneof: "pick".into()
            })
        );
    }

    #[test]
    fn test_verify_value_kinds() {
        let mut msg = valid();
        msg.set(3, Value::String("x".into()));
        assert_eq!(
            check(&msg),
            Err(ValidationError::InvalidValue {
                field: "a".into(),
                expected: "integer"
            })
        );

        let mut msg = valid();
        msg.set(5, Value::Bool(true));
        assert_eq!(
            check(&msg),
            Err(ValidationError::ArrayExpected { field: "list".into() })
        );

        let mut msg = valid();
        msg.set(5, Value::List(vec![Value::Bool(true), Value::I32(0)]));
        assert_eq!(
            check(&msg),
            Err(ValidationError::InvalidValue {
                field: "list[1]".into(),
                expected: "boolean"
            })
        );
    }
}
