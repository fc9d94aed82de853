//! Descriptor pool and resolved message types.
//!
//! A [`DescriptorPool`] is an immutable, validated set of message and enum
//! descriptors. Lookups return a [`MessageType`], which pairs a descriptor
//! with its pool so that nested references can be followed during encode,
//! decode and conversion.

use std::collections::BTreeMap;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use bytes::{Bytes, BytesMut};

use super::descriptor::{EnumDescriptor, FieldKind, MessageDescriptor};
use crate::codec::{self, ConversionOptions, DynamicMessage};
use crate::error::{DecodeError, SchemaError, ValidationError, WireError};

/// Immutable set of message and enum types.
#[derive(Debug, Default)]
pub struct DescriptorPool {
    messages: BTreeMap<String, Arc<MessageDescriptor>>,
    enums: BTreeMap<String, Arc<EnumDescriptor>>,
    sources: Vec<PathBuf>,
}

impl DescriptorPool {
    pub fn builder() -> DescriptorPoolBuilder {
        DescriptorPoolBuilder::default()
    }

    /// Message descriptor by exact fully-qualified name.
    pub fn message(&self, full_name: &str) -> Option<&Arc<MessageDescriptor>> {
        self.messages.get(full_name.trim_start_matches('.'))
    }

    /// Enum descriptor by exact fully-qualified name.
    pub fn enumeration(&self, full_name: &str) -> Option<&Arc<EnumDescriptor>> {
        self.enums.get(full_name.trim_start_matches('.'))
    }

    /// Fully-qualified names of all message types, sorted.
    pub fn list_types(&self) -> Vec<String> {
        self.messages.keys().cloned().collect()
    }

    /// Files this pool was loaded from.
    pub fn sources(&self) -> &[PathBuf] {
        &self.sources
    }

    /// Resolve a message type by name.
    ///
    /// Accepts the fully-qualified name (with or without a leading `.`) or a
    /// dotted suffix of it, such as the bare message name. An ambiguous
    /// suffix resolves to the alphabetically first match.
    pub fn lookup_type(self: &Arc<Self>, name: &str) -> Result<MessageType, SchemaError> {
        let descriptor = self
            .resolve_message(name)
            .ok_or_else(|| SchemaError::TypeNotFound(name.to_string()))?;
        Ok(MessageType {
            pool: Arc::clone(self),
            descriptor,
        })
    }

    fn resolve_message(&self, name: &str) -> Option<Arc<MessageDescriptor>> {
        let name = name.trim();
        if name.is_empty() {
            return None;
        }
        if let Some(absolute) = name.strip_prefix('.') {
            return self.messages.get(absolute).cloned();
        }
        if let Some(exact) = self.messages.get(name) {
            return Some(Arc::clone(exact));
        }
        let suffix = format!(".{name}");
        self.messages
            .iter()
            .find(|(full, _)| full.ends_with(&suffix))
            .map(|(_, desc)| Arc::clone(desc))
    }
}

/// Collects descriptors and validates them into a [`DescriptorPool`].
#[derive(Debug, Default)]
pub struct DescriptorPoolBuilder {
    messages: Vec<MessageDescriptor>,
    enums: Vec<EnumDescriptor>,
    sources: Vec<PathBuf>,
}

impl DescriptorPoolBuilder {
    pub fn message(mut self, descriptor: MessageDescriptor) -> Self {
        self.messages.push(descriptor);
        self
    }

    pub fn enumeration(mut self, descriptor: EnumDescriptor) -> Self {
        self.enums.push(descriptor);
        self
    }

    /// Record the file a set of descriptors came from.
    pub fn source(mut self, path: impl AsRef<Path>) -> Self {
        self.sources.push(path.as_ref().to_path_buf());
        self
    }

    /// Validate and freeze.
    ///
    /// # Errors
    ///
    /// Duplicate type names, duplicate or out-of-range field numbers,
    /// references to unknown types and illegal map keys are rejected.
    pub fn build(self) -> Result<DescriptorPool, SchemaError> {
        let mut pool = DescriptorPool {
            sources: self.sources,
            ..DescriptorPool::default()
        };

        for desc in self.enums {
            let name = desc.full_name().to_string();
            if pool.enums.contains_key(&name) {
                return Err(SchemaError::DuplicateType(name));
            }
            pool.enums.insert(name, Arc::new(desc));
        }
        for desc in self.messages {
            let name = desc.full_name().to_string();
            if pool.messages.contains_key(&name) || pool.enums.contains_key(&name) {
                return Err(SchemaError::DuplicateType(name));
            }
            pool.messages.insert(name, Arc::new(desc));
        }

        for desc in pool.messages.values() {
            pool.validate_message(desc)?;
        }
        Ok(pool)
    }
}

impl DescriptorPool {
    fn validate_message(&self, desc: &MessageDescriptor) -> Result<(), SchemaError> {
        let mut previous = None;
        for field in desc.fields() {
            let number = field.number();
            if number == 0 || number > codec::MAX_FIELD_NUMBER {
                return Err(SchemaError::InvalidFieldNumber {
                    message: desc.full_name().to_string(),
                    number,
                });
            }
            if previous == Some(number) {
                return Err(SchemaError::DuplicateFieldNumber {
                    message: desc.full_name().to_string(),
                    number,
                });
            }
            previous = Some(number);

            let unresolved = |type_name: &str| SchemaError::UnresolvedType {
                message: desc.full_name().to_string(),
                field: field.name().to_string(),
                type_name: type_name.to_string(),
            };
            let check_ref = |kind: &FieldKind| match kind {
                FieldKind::Message(name) if self.message(name).is_none() => Err(unresolved(name)),
                FieldKind::Enum(name) if self.enumeration(name).is_none() => Err(unresolved(name)),
                _ => Ok(()),
            };
            match field.kind() {
                FieldKind::Map { key, value } => {
                    if !key.is_valid_map_key() || matches!(**value, FieldKind::Map { .. }) {
                        return Err(SchemaError::InvalidMapKey {
                            message: desc.full_name().to_string(),
                            field: field.name().to_string(),
                        });
                    }
                    check_ref(value.as_ref())?;
                }
                other => check_ref(other)?,
            }
        }
        Ok(())
    }
}

/// A message type resolved from a pool.
///
/// Cheap to clone. Holds the pool alive so that nested types stay resolvable
/// even if the registry publishes a newer pool.
#[derive(Debug, Clone)]
pub struct MessageType {
    pool: Arc<DescriptorPool>,
    descriptor: Arc<MessageDescriptor>,
}

impl MessageType {
    /// Short name.
    pub fn name(&self) -> &str {
        self.descriptor.name()
    }

    pub fn full_name(&self) -> &str {
        self.descriptor.full_name()
    }

    pub fn descriptor(&self) -> &MessageDescriptor {
        &self.descriptor
    }

    pub fn pool(&self) -> &Arc<DescriptorPool> {
        &self.pool
    }

    /// Decode a bare (unprefixed) message.
    ///
    /// # Errors
    ///
    /// [`DecodeError::Wire`] for malformed input; [`DecodeError::MissingRequired`]
    /// carries the partially decoded message when a required field is absent.
    pub fn decode(&self, buf: &[u8]) -> Result<DynamicMessage, DecodeError> {
        let msg = codec::decode_message(&self.pool, &self.descriptor, buf)?;
        match codec::missing_required(&self.pool, &self.descriptor, &msg) {
            Some(missing) => Err(DecodeError::MissingRequired {
                missing,
                partial: msg,
            }),
            None => Ok(msg),
        }
    }

    /// Decode a message preceded by its varint length.
    ///
    /// Bytes after the announced length are ignored.
    pub fn decode_length_prefixed(&self, buf: &[u8]) -> Result<DynamicMessage, DecodeError> {
        let (len, consumed) = codec::decode_varint(buf)?;
        let end = usize::try_from(len)
            .ok()
            .and_then(|len| consumed.checked_add(len))
            .filter(|end| *end <= buf.len())
            .ok_or(WireError::Truncated {
                position: consumed,
                needed: len as usize,
                length: buf.len(),
            })?;
        self.decode(&buf[consumed..end])
    }

    /// Encode without a length prefix.
    pub fn encode(&self, msg: &DynamicMessage) -> Result<Bytes, WireError> {
        let mut buf = BytesMut::new();
        codec::encode_message(&self.pool, &self.descriptor, msg, &mut buf)?;
        Ok(buf.freeze())
    }

    /// Encode with a varint length prefix.
    pub fn encode_length_prefixed(&self, msg: &DynamicMessage) -> Result<Bytes, WireError> {
        let body = self.encode(msg)?;
        let mut buf = BytesMut::with_capacity(body.len() + codec::MAX_VARINT_LEN);
        codec::encode_varint(body.len() as u64, &mut buf);
        buf.extend_from_slice(&body);
        Ok(buf.freeze())
    }

    /// Canonical structured form of `msg`.
    pub fn to_canonical(&self, msg: &DynamicMessage, options: &ConversionOptions) -> serde_json::Value {
        codec::to_canonical(&self.pool, &self.descriptor, msg, options)
    }

    /// Build a message from its canonical form.
    ///
    /// Strict mode accepts only exact shapes; flexible mode coerces.
    pub fn from_canonical(
        &self,
        value: &serde_json::Value,
        strict: bool,
    ) -> Result<DynamicMessage, ValidationError> {
        codec::from_canonical(&self.pool, &self.descriptor, value, strict)
    }

    /// Check required fields, oneof exclusivity and value kinds.
    pub fn verify(&self, msg: &DynamicMessage) -> Result<(), ValidationError> {
        codec::verify(&self.pool, &self.descriptor, msg)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::schema::{FieldDescriptor, ScalarKind};

    fn pool() -> Arc<DescriptorPool> {
        Arc::new(
            DescriptorPool::builder()
                .message(
                    MessageDescriptor::builder("a.b.Outer")
                        .field(FieldDescriptor::message("inner", 1, "a.b.Inner"))
                        .build(),
                )
                .message(
                    MessageDescriptor::builder("a.b.Inner")
                        .field(FieldDescriptor::enumeration("color", 1, "a.Color"))
                        .build(),
                )
                .message(MessageDescriptor::builder("z.Inner").build())
                .enumeration(EnumDescriptor::new("a.Color", [("RED", 0)]))
                .build()
                .unwrap(),
        )
    }

    #[test]
    fn test_lookup_forms() {
        let pool = pool();
        assert_eq!(pool.lookup_type("a.b.Outer").unwrap().full_name(), "a.b.Outer");
        assert_eq!(pool.lookup_type(".a.b.Outer").unwrap().full_name(), "a.b.Outer");
        assert_eq!(pool.lookup_type("Outer").unwrap().full_name(), "a.b.Outer");
        assert_eq!(pool.lookup_type("b.Outer").unwrap().full_name(), "a.b.Outer");
        // ambiguous suffix picks the first in name order
        assert_eq!(pool.lookup_type("Inner").unwrap().full_name(), "a.b.Inner");
        assert_eq!(pool.lookup_type("z.Inner").unwrap().full_name(), "z.Inner");
    }

    #[test]
    fn test_lookup_misses() {
        let pool = pool();
        assert_eq!(
            pool.lookup_type("Missing").unwrap_err(),
            SchemaError::TypeNotFound("Missing".into())
        );
        assert!(pool.lookup_type("").is_err());
        assert!(pool.lookup_type(".Outer").is_err());
        assert!(pool.lookup_type("uter").is_err());
        // enums are not message types
        assert!(pool.lookup_type("a.Color").is_err());
    }

    #[test]
    fn test_list_types_sorted() {
        assert_eq!(pool().list_types(), vec!["a.b.Inner", "a.b.Outer", "z.Inner"]);
    }

    #[test]
    fn test_build_rejects_duplicates() {
        let err = DescriptorPool::builder()
            .message(MessageDescriptor::builder("M").build())
            .message(MessageDescriptor::builder("M").build())
            .build()
            .unwrap_err();
        assert_eq!(err, SchemaError::DuplicateType("M".into()));

        let err = DescriptorPool::builder()
            .message(
                MessageDescriptor::builder("M")
                    .field(FieldDescriptor::scalar("a", 1, ScalarKind::Int32))
                    .field(FieldDescriptor::scalar("b", 1, ScalarKind::Int32))
                    .build(),
            )
            .build()
            .unwrap_err();
        assert!(matches!(err, SchemaError::DuplicateFieldNumber { number: 1, .. }));
    }

    #[test]
    fn test_build_rejects_bad_references() {
        let err = DescriptorPool::builder()
            .message(
                MessageDescriptor::builder("M")
                    .field(FieldDescriptor::message("x", 1, "Nope"))
                    .build(),
            )
            .build()
            .unwrap_err();
        assert!(matches!(err, SchemaError::UnresolvedType { .. }));

        let err = DescriptorPool::builder()
            .message(
                MessageDescriptor::builder("M")
                    .field(FieldDescriptor::scalar("x", 0, ScalarKind::Int32))
                    .build(),
            )
            .build()
            .unwrap_err();
        assert!(matches!(err, SchemaError::InvalidFieldNumber { number: 0, .. }));

        let err = DescriptorPool::builder()
            .message(
                MessageDescriptor::builder("M")
                    .field(FieldDescriptor::map(
                        "x",
                        1,
                        ScalarKind::Float,
                        FieldKind::Scalar(ScalarKind::Int32),
                    ))
                    .build(),
            )
            .build()
            .unwrap_err();
        assert!(matches!(err, SchemaError::InvalidMapKey { .. }));
    }

    #[test]
    fn test_length_prefixed_truncated() {
        let ty = pool().lookup_type("Outer").unwrap();
        assert!(matches!(
            ty.decode_length_prefixed(&[0x05, 0x0A]),
            Err(DecodeError::Wire(WireError::Truncated { .. }))
        ));
    }
}
