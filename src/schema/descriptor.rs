//! Message, field and enum descriptors.
//!
//! Descriptors are plain data. References between types are fully-qualified
//! names resolved through the owning [`DescriptorPool`](super::DescriptorPool).
//!
//! # Example
//!
//! ```
//! use protowire::schema::{FieldDescriptor, MessageDescriptor, ScalarKind};
//!
//! let desc = MessageDescriptor::builder("demo.Reading")
//!     .field(FieldDescriptor::scalar("timestamp", 1, ScalarKind::Double))
//!     .field(FieldDescriptor::scalar("tags", 2, ScalarKind::String).repeated())
//!     .build();
//!
//! assert_eq!(desc.name(), "Reading");
//! assert!(desc.field_by_name("tags").unwrap().is_repeated());
//! ```

use crate::codec::WireType;

/// Scalar value types.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ScalarKind {
    Double,
    Float,
    Int32,
    Int64,
    Uint32,
    Uint64,
    Sint32,
    Sint64,
    Fixed32,
    Fixed64,
    Sfixed32,
    Sfixed64,
    Bool,
    String,
    Bytes,
}

impl ScalarKind {
    /// Parse a `.proto` scalar type keyword.
    pub fn from_name(name: &str) -> Option<Self> {
        Some(match name {
            "double" => Self::Double,
            "float" => Self::Float,
            "int32" => Self::Int32,
            "int64" => Self::Int64,
            "uint32" => Self::Uint32,
            "uint64" => Self::Uint64,
            "sint32" => Self::Sint32,
            "sint64" => Self::Sint64,
            "fixed32" => Self::Fixed32,
            "fixed64" => Self::Fixed64,
            "sfixed32" => Self::Sfixed32,
            "sfixed64" => Self::Sfixed64,
            "bool" => Self::Bool,
            "string" => Self::String,
            "bytes" => Self::Bytes,
            _ => return None,
        })
    }

    /// The `.proto` type keyword.
    pub fn name(&self) -> &'static str {
        match self {
            Self::Double => "double",
            Self::Float => "float",
            Self::Int32 => "int32",
            Self::Int64 => "int64",
            Self::Uint32 => "uint32",
            Self::Uint64 => "uint64",
            Self::Sint32 => "sint32",
            Self::Sint64 => "sint64",
            Self::Fixed32 => "fixed32",
            Self::Fixed64 => "fixed64",
            Self::Sfixed32 => "sfixed32",
            Self::Sfixed64 => "sfixed64",
            Self::Bool => "bool",
            Self::String => "string",
            Self::Bytes => "bytes",
        }
    }

    pub fn wire_type(&self) -> WireType {
        match self {
            Self::Double | Self::Fixed64 | Self::Sfixed64 => WireType::Fixed64,
            Self::Float | Self::Fixed32 | Self::Sfixed32 => WireType::Fixed32,
            Self::String | Self::Bytes => WireType::LengthDelimited,
            _ => WireType::Varint,
        }
    }

    /// 64-bit integer kinds, subject to the long representation option.
    pub fn is_long(&self) -> bool {
        matches!(
            self,
            Self::Int64 | Self::Uint64 | Self::Sint64 | Self::Fixed64 | Self::Sfixed64
        )
    }

    pub fn is_unsigned(&self) -> bool {
        matches!(
            self,
            Self::Uint32 | Self::Uint64 | Self::Fixed32 | Self::Fixed64
        )
    }

    /// Whether a repeated field of this kind may use packed encoding.
    pub fn is_packable(&self) -> bool {
        !matches!(self, Self::String | Self::Bytes)
    }

    /// Whether this kind may key a map.
    pub fn is_valid_map_key(&self) -> bool {
        !matches!(self, Self::Double | Self::Float | Self::Bytes)
    }
}

/// What a field holds.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum FieldKind {
    Scalar(ScalarKind),
    /// Fully-qualified enum name.
    Enum(String),
    /// Fully-qualified message name.
    Message(String),
    /// `map<key, value>`; value is never itself a map.
    Map {
        key: ScalarKind,
        value: Box<FieldKind>,
    },
}

impl FieldKind {
    /// Wire type of a single (unpacked) element.
    pub fn wire_type(&self) -> WireType {
        match self {
            FieldKind::Scalar(kind) => kind.wire_type(),
            FieldKind::Enum(_) => WireType::Varint,
            FieldKind::Message(_) | FieldKind::Map { .. } => WireType::LengthDelimited,
        }
    }

    pub fn is_packable(&self) -> bool {
        match self {
            FieldKind::Scalar(kind) => kind.is_packable(),
            FieldKind::Enum(_) => true,
            _ => false,
        }
    }

    /// Name as written in a `.proto` definition, relative names shortened.
    pub fn display_name(&self) -> String {
        match self {
            FieldKind::Scalar(kind) => kind.name().to_string(),
            FieldKind::Enum(name) | FieldKind::Message(name) => short_name(name).to_string(),
            FieldKind::Map { key, value } => {
                format!("map<{}, {}>", key.name(), value.display_name())
            }
        }
    }
}

/// Field cardinality.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum Label {
    #[default]
    Optional,
    Required,
    Repeated,
}

/// A single field of a message type.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FieldDescriptor {
    name: String,
    number: u32,
    kind: FieldKind,
    label: Label,
    oneof: Option<String>,
    packed: bool,
}

impl FieldDescriptor {
    /// Create an optional field.
    pub fn new(name: impl Into<String>, number: u32, kind: FieldKind) -> Self {
        Self {
            name: name.into(),
            number,
            kind,
            label: Label::Optional,
            oneof: None,
            packed: true,
        }
    }

    pub fn scalar(name: impl Into<String>, number: u32, kind: ScalarKind) -> Self {
        Self::new(name, number, FieldKind::Scalar(kind))
    }

    pub fn message(name: impl Into<String>, number: u32, type_name: impl Into<String>) -> Self {
        Self::new(name, number, FieldKind::Message(type_name.into()))
    }

    pub fn enumeration(name: impl Into<String>, number: u32, type_name: impl Into<String>) -> Self {
        Self::new(name, number, FieldKind::Enum(type_name.into()))
    }

    pub fn map(name: impl Into<String>, number: u32, key: ScalarKind, value: FieldKind) -> Self {
        Self::new(
            name,
            number,
            FieldKind::Map {
                key,
                value: Box::new(value),
            },
        )
    }

    /// Mark the field repeated.
    pub fn repeated(mut self) -> Self {
        self.label = Label::Repeated;
        self
    }

    /// Mark the field required (proto2).
    pub fn required(mut self) -> Self {
        self.label = Label::Required;
        self
    }

    /// Place the field in a oneof group.
    pub fn in_oneof(mut self, oneof: impl Into<String>) -> Self {
        self.oneof = Some(oneof.into());
        self
    }

    /// Encode a repeated scalar one element per tag.
    pub fn unpacked(mut self) -> Self {
        self.packed = false;
        self
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn number(&self) -> u32 {
        self.number
    }

    pub fn kind(&self) -> &FieldKind {
        &self.kind
    }

    pub fn label(&self) -> Label {
        self.label
    }

    pub fn oneof(&self) -> Option<&str> {
        self.oneof.as_deref()
    }

    pub fn is_repeated(&self) -> bool {
        self.label == Label::Repeated
    }

    pub fn is_required(&self) -> bool {
        self.label == Label::Required
    }

    pub fn is_map(&self) -> bool {
        matches!(self.kind, FieldKind::Map { .. })
    }

    /// Repeated scalar written as a single length-delimited run.
    pub fn is_packed(&self) -> bool {
        self.packed && self.is_repeated() && self.kind.is_packable()
    }

    /// Wire type this field is written with.
    pub fn wire_type(&self) -> WireType {
        if self.is_packed() {
            WireType::LengthDelimited
        } else {
            self.kind.wire_type()
        }
    }

    /// Type name as it appears in a definition (`int32`, `Inner`, `map<string, int32>`).
    pub fn type_name(&self) -> String {
        self.kind.display_name()
    }
}

/// A message type: ordered fields plus oneof groups.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MessageDescriptor {
    full_name: String,
    fields: Vec<FieldDescriptor>,
    oneofs: Vec<String>,
}

impl MessageDescriptor {
    pub fn builder(full_name: impl Into<String>) -> MessageDescriptorBuilder {
        MessageDescriptorBuilder::new(full_name)
    }

    /// Short name (last path segment).
    pub fn name(&self) -> &str {
        short_name(&self.full_name)
    }

    pub fn full_name(&self) -> &str {
        &self.full_name
    }

    /// Fields sorted by field number.
    pub fn fields(&self) -> &[FieldDescriptor] {
        &self.fields
    }

    pub fn field_by_number(&self, number: u32) -> Option<&FieldDescriptor> {
        self.fields
            .binary_search_by_key(&number, |f| f.number)
            .ok()
            .map(|idx| &self.fields[idx])
    }

    pub fn field_by_name(&self, name: &str) -> Option<&FieldDescriptor> {
        self.fields.iter().find(|f| f.name == name)
    }

    /// Oneof group names in declaration order.
    pub fn oneofs(&self) -> &[String] {
        &self.oneofs
    }

    /// Members of a oneof group.
    pub fn oneof_members<'a>(
        &'a self,
        oneof: &'a str,
    ) -> impl Iterator<Item = &'a FieldDescriptor> + 'a {
        self.fields.iter().filter(move |f| f.oneof() == Some(oneof))
    }
}

/// Fluent builder for [`MessageDescriptor`].
#[derive(Debug)]
pub struct MessageDescriptorBuilder {
    full_name: String,
    fields: Vec<FieldDescriptor>,
    oneofs: Vec<String>,
}

impl MessageDescriptorBuilder {
    pub fn new(full_name: impl Into<String>) -> Self {
        Self {
            full_name: full_name.into().trim_start_matches('.').to_string(),
            fields: Vec::new(),
            oneofs: Vec::new(),
        }
    }

    /// Add a field.
    pub fn field(mut self, field: FieldDescriptor) -> Self {
        if let Some(oneof) = field.oneof() {
            if !self.oneofs.iter().any(|o| o == oneof) {
                self.oneofs.push(oneof.to_string());
            }
        }
        self.fields.push(field);
        self
    }

    pub fn build(mut self) -> MessageDescriptor {
        self.fields.sort_by_key(|f| f.number);
        MessageDescriptor {
            full_name: self.full_name,
            fields: self.fields,
            oneofs: self.oneofs,
        }
    }
}

/// An enum type.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EnumDescriptor {
    full_name: String,
    values: Vec<(String, i32)>,
}

impl EnumDescriptor {
    pub fn new<I, S>(full_name: impl Into<String>, values: I) -> Self
    where
        I: IntoIterator<Item = (S, i32)>,
        S: Into<String>,
    {
        let mut values: Vec<(String, i32)> =
            values.into_iter().map(|(n, v)| (n.into(), v)).collect();
        values.sort_by_key(|(_, v)| *v);
        Self {
            full_name: full_name.into().trim_start_matches('.').to_string(),
            values,
        }
    }

    pub fn name(&self) -> &str {
        short_name(&self.full_name)
    }

    pub fn full_name(&self) -> &str {
        &self.full_name
    }

    /// Values sorted by number.
    pub fn values(&self) -> &[(String, i32)] {
        &self.values
    }

    /// First name declared for `number`.
    pub fn name_of(&self, number: i32) -> Option<&str> {
        self.values
            .iter()
            .find(|(_, v)| *v == number)
            .map(|(n, _)| n.as_str())
    }

    pub fn number_of(&self, name: &str) -> Option<i32> {
        self.values.iter().find(|(n, _)| n == name).map(|(_, v)| *v)
    }

    /// Zero if declared, otherwise the lowest declared number.
    pub fn default_number(&self) -> i32 {
        if self.name_of(0).is_some() {
            0
        } else {
            self.values.first().map(|(_, v)| *v).unwrap_or(0)
        }
    }
}

/// Last segment of a dotted name.
pub(crate) fn short_name(full_name: &str) -> &str {
    full_name.rsplit('.').next().unwrap_or(full_name)
}
