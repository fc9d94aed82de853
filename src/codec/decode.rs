//! Binary message decoding against a descriptor.

use bytes::Bytes;

use super::value::{DynamicMessage, Value};
use super::wire::{zigzag_decode32, zigzag_decode64, WireReader, WireType};
use crate::error::WireError;
use crate::schema::{DescriptorPool, FieldDescriptor, FieldKind, MessageDescriptor, ScalarKind};

/// Maximum message nesting depth.
pub const RECURSION_LIMIT: usize = 100;

/// Decode a bare message.
///
/// Unknown fields are skipped. Repeated scalars are accepted packed or
/// unpacked. A later value for a singular field replaces the earlier one and
/// setting a oneof member clears its siblings.
pub fn decode_message(
    pool: &DescriptorPool,
    desc: &MessageDescriptor,
    buf: &[u8],
) -> Result<DynamicMessage, WireError> {
    decode_nested(pool, desc, buf, 0)
}

fn decode_nested(
    pool: &DescriptorPool,
    desc: &MessageDescriptor,
    buf: &[u8],
    depth: usize,
) -> Result<DynamicMessage, WireError> {
    if depth > RECURSION_LIMIT {
        return Err(WireError::RecursionLimit);
    }
    let mut reader = WireReader::new(buf);
    let mut msg = DynamicMessage::new();

    while !reader.is_empty() {
        let (number, wire_type) = reader.read_tag()?;
        if wire_type == WireType::EndGroup {
            return Err(WireError::UnexpectedEndGroup);
        }
        let Some(field) = desc.field_by_number(number) else {
            reader.skip(wire_type, depth)?;
            continue;
        };

        if let FieldKind::Map { key, value } = field.kind() {
            expect_wire_type(field, WireType::LengthDelimited, wire_type)?;
            let entry = reader.read_length_delimited()?;
            let (k, v) = decode_map_entry(pool, field, *key, value, entry, depth)?;
            msg.insert_entry(number, k, v);
            continue;
        }

        if field.is_repeated() {
            if wire_type == WireType::LengthDelimited && field.kind().is_packable() {
                let packed = reader.read_length_delimited()?;
                let mut inner = WireReader::new(packed);
                while !inner.is_empty() {
                    let value = decode_value(pool, field, field.kind(), &mut inner, depth)?;
                    msg.push(number, value);
                }
            } else {
                expect_wire_type(field, field.kind().wire_type(), wire_type)?;
                let value = decode_value(pool, field, field.kind(), &mut reader, depth)?;
                msg.push(number, value);
            }
            continue;
        }

        expect_wire_type(field, field.kind().wire_type(), wire_type)?;
        let value = decode_value(pool, field, field.kind(), &mut reader, depth)?;
        if let Some(oneof) = field.oneof() {
            for sibling in desc.oneof_members(oneof) {
                msg.clear(sibling.number());
            }
        }
        msg.set(number, value);
    }

    Ok(msg)
}

fn expect_wire_type(
    field: &FieldDescriptor,
    expected: WireType,
    actual: WireType,
) -> Result<(), WireError> {
    if expected == actual {
        Ok(())
    } else {
        Err(WireError::WireTypeMismatch {
            field: field.name().to_string(),
            expected,
            actual,
        })
    }
}

fn decode_map_entry(
    pool: &DescriptorPool,
    field: &FieldDescriptor,
    key_kind: ScalarKind,
    value_kind: &FieldKind,
    buf: &[u8],
    depth: usize,
) -> Result<(Value, Value), WireError> {
    let key_kind = FieldKind::Scalar(key_kind);
    let mut reader = WireReader::new(buf);
    let mut key = None;
    let mut value = None;

    while !reader.is_empty() {
        let (number, wire_type) = reader.read_tag()?;
        match number {
            1 => {
                expect_wire_type(field, key_kind.wire_type(), wire_type)?;
                key = Some(decode_value(pool, field, &key_kind, &mut reader, depth)?);
            }
            2 => {
                expect_wire_type(field, value_kind.wire_type(), wire_type)?;
                value = Some(decode_value(pool, field, value_kind, &mut reader, depth)?);
            }
            _ => reader.skip(wire_type, depth + 1)?,
        }
    }

    let key = match key {
        Some(key) => key,
        None => default_value(pool, &key_kind)?,
    };
    let value = match value {
        Some(value) => value,
        None => default_value(pool, value_kind)?,
    };
    Ok((key, value))
}

/// Zero value of a kind; used for absent map entry parts.
fn default_value(pool: &DescriptorPool, kind: &FieldKind) -> Result<Value, WireError> {
    Ok(match kind {
        FieldKind::Scalar(scalar) => match scalar {
            ScalarKind::Double => Value::F64(0.0),
            ScalarKind::Float => Value::F32(0.0),
            ScalarKind::Int32 | ScalarKind::Sint32 | ScalarKind::Sfixed32 => Value::I32(0),
            ScalarKind::Int64 | ScalarKind::Sint64 | ScalarKind::Sfixed64 => Value::I64(0),
            ScalarKind::Uint32 | ScalarKind::Fixed32 => Value::U32(0),
            ScalarKind::Uint64 | ScalarKind::Fixed64 => Value::U64(0),
            ScalarKind::Bool => Value::Bool(false),
            ScalarKind::String => Value::String(String::new()),
            ScalarKind::Bytes => Value::Bytes(Bytes::new()),
        },
        FieldKind::Enum(name) => {
            let desc = pool
                .enumeration(name)
                .ok_or_else(|| WireError::UnresolvedType(name.clone()))?;
            Value::Enum(desc.default_number())
        }
        FieldKind::Message(_) => Value::Message(DynamicMessage::new()),
        FieldKind::Map { .. } => Value::Map(Vec::new()),
    })
}

fn decode_value(
    pool: &DescriptorPool,
    field: &FieldDescriptor,
    kind: &FieldKind,
    reader: &mut WireReader<'_>,
    depth: usize,
) -> Result<Value, WireError> {
    let scalar = match kind {
        FieldKind::Scalar(scalar) => *scalar,
        FieldKind::Enum(_) => return Ok(Value::Enum(reader.read_varint()? as i32)),
        FieldKind::Message(name) => {
            let nested = pool
                .message(name)
                .ok_or_else(|| WireError::UnresolvedType(name.clone()))?;
            let buf = reader.read_length_delimited()?;
            return Ok(Value::Message(decode_nested(pool, nested, buf, depth + 1)?));
        }
        FieldKind::Map { .. } => {
            return Err(WireError::ValueMismatch {
                field: field.name().to_string(),
            })
        }
    };

    Ok(match scalar {
        ScalarKind::Double => Value::F64(f64::from_bits(reader.read_fixed64()?)),
        ScalarKind::Float => Value::F32(f32::from_bits(reader.read_fixed32()?)),
        ScalarKind::Int32 => Value::I32(reader.read_varint()? as i32),
        ScalarKind::Int64 => Value::I64(reader.read_varint()? as i64),
        ScalarKind::Uint32 => Value::U32(reader.read_varint()? as u32),
        ScalarKind::Uint64 => Value::U64(reader.read_varint()?),
        ScalarKind::Sint32 => Value::I32(zigzag_decode32(reader.read_varint()? as u32)),
        ScalarKind::Sint64 => Value::I64(zigzag_decode64(reader.read_varint()?)),
        ScalarKind::Fixed32 => Value::U32(reader.read_fixed32()?),
        ScalarKind::Fixed64 => Value::U64(reader.read_fixed64()?),
        ScalarKind::Sfixed32 => Value::I32(reader.read_fixed32()? as i32),
        ScalarKind::Sfixed64 => Value::I64(reader.read_fixed64()? as i64),
        ScalarKind::Bool => Value::Bool(reader.read_varint()? != 0),
        ScalarKind::String => {
            let raw = reader.read_length_delimited()?;
            let text = std::str::from_utf8(raw).map_err(|_| WireError::InvalidUtf8 {
                field: field.name().to_string(),
            })?;
            Value::String(text.to_string())
        }
        ScalarKind::Bytes => Value::Bytes(Bytes::copy_from_slice(reader.read_length_delimited()?)),
    })
}
