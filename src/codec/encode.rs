//! Binary message encoding against a descriptor.

use bytes::{BufMut, BytesMut};

use super::value::{DynamicMessage, Value};
use super::wire::{encode_tag, encode_varint, zigzag_encode32, zigzag_encode64, WireType};
use crate::error::WireError;
use crate::schema::{DescriptorPool, FieldDescriptor, FieldKind, MessageDescriptor, ScalarKind};

/// Encode `msg` in field-number order.
///
/// Repeated packable fields are written packed unless the field is marked
/// unpacked. Map entries are written as `{key = 1, value = 2}` sub-messages.
pub fn encode_message(
    pool: &DescriptorPool,
    desc: &MessageDescriptor,
    msg: &DynamicMessage,
    buf: &mut BytesMut,
) -> Result<(), WireError> {
    for field in desc.fields() {
        let Some(value) = msg.get(field.number()) else {
            continue;
        };
        match (field.kind(), value) {
            (FieldKind::Map { key, value: value_kind }, Value::Map(entries)) => {
                let key_kind = FieldKind::Scalar(*key);
                for (k, v) in entries {
                    let mut entry = BytesMut::new();
                    encode_tag(1, key_kind.wire_type(), &mut entry);
                    encode_value(pool, field, &key_kind, k, &mut entry)?;
                    encode_tag(2, value_kind.wire_type(), &mut entry);
                    encode_value(pool, field, value_kind, v, &mut entry)?;
                    encode_tag(field.number(), WireType::LengthDelimited, buf);
                    encode_varint(entry.len() as u64, buf);
                    buf.extend_from_slice(&entry);
                }
            }
            (_, Value::List(items)) if field.is_repeated() => {
                if field.is_packed() {
                    if items.is_empty() {
                        continue;
                    }
                    let mut packed = BytesMut::new();
                    for item in items {
                        encode_value(pool, field, field.kind(), item, &mut packed)?;
                    }
                    encode_tag(field.number(), WireType::LengthDelimited, buf);
                    encode_varint(packed.len() as u64, buf);
                    buf.extend_from_slice(&packed);
                } else {
                    for item in items {
                        encode_tag(field.number(), field.kind().wire_type(), buf);
                        encode_value(pool, field, field.kind(), item, buf)?;
                    }
                }
            }
            (FieldKind::Map { .. }, _) | (_, Value::List(_)) | (_, Value::Map(_)) => {
                return Err(mismatch(field));
            }
            _ if field.is_repeated() => return Err(mismatch(field)),
            (kind, value) => {
                encode_tag(field.number(), kind.wire_type(), buf);
                encode_value(pool, field, kind, value, buf)?;
            }
        }
    }
    Ok(())
}

fn mismatch(field: &FieldDescriptor) -> WireError {
    WireError::ValueMismatch {
        field: field.name().to_string(),
    }
}

fn encode_value(
    pool: &DescriptorPool,
    field: &FieldDescriptor,
    kind: &FieldKind,
    value: &Value,
    buf: &mut BytesMut,
) -> Result<(), WireError> {
    match (kind, value) {
        (FieldKind::Enum(_), Value::Enum(n)) => encode_varint(*n as i64 as u64, buf),
        (FieldKind::Message(name), Value::Message(nested)) => {
            let desc = pool
                .message(name)
                .ok_or_else(|| WireError::UnresolvedType(name.clone()))?;
            let mut inner = BytesMut::new();
            encode_message(pool, desc, nested, &mut inner)?;
            encode_varint(inner.len() as u64, buf);
            buf.extend_from_slice(&inner);
        }
        (FieldKind::Scalar(scalar), value) => encode_scalar(*scalar, value, buf).ok_or_else(|| mismatch(field))?,
        _ => return Err(mismatch(field)),
    }
    Ok(())
}

fn encode_scalar(kind: ScalarKind, value: &Value, buf: &mut BytesMut) -> Option<()> {
    match (kind, value) {
        (ScalarKind::Double, Value::F64(v)) => buf.put_f64_le(*v),
        (ScalarKind::Float, Value::F32(v)) => buf.put_f32_le(*v),
        (ScalarKind::Int32, Value::I32(v)) => encode_varint(*v as i64 as u64, buf),
        (ScalarKind::Int64, Value::I64(v)) => encode_varint(*v as u64, buf),
        (ScalarKind::Uint32, Value::U32(v)) => encode_varint(u64::from(*v), buf),
        (ScalarKind::Uint64, Value::U64(v)) => encode_varint(*v, buf),
        (ScalarKind::Sint32, Value::I32(v)) => encode_varint(u64::from(zigzag_encode32(*v)), buf),
        (ScalarKind::Sint64, Value::I64(v)) => encode_varint(zigzag_encode64(*v), buf),
        (ScalarKind::Fixed32, Value::U32(v)) => buf.put_u32_le(*v),
        (ScalarKind::Fixed64, Value::U64(v)) => buf.put_u64_le(*v),
        (ScalarKind::Sfixed32, Value::I32(v)) => buf.put_i32_le(*v),
        (ScalarKind::Sfixed64, Value::I64(v)) => buf.put_i64_le(*v),
        (ScalarKind::Bool, Value::Bool(v)) => buf.put_u8(u8::from(*v)),
        (ScalarKind::String, Value::String(s)) => {
            encode_varint(s.len() as u64, buf);
            buf.extend_from_slice(s.as_bytes());
        }
        (ScalarKind::Bytes, Value::Bytes(b)) => {
            encode_varint(b.len() as u64, buf);
            buf.extend_from_slice(b);
        }
        _ => return None,
    }
    Some(())
}
