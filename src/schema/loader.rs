//! JSON descriptor loading.
//!
//! Reads descriptor files in the protobufjs JSON layout:
//!
//! ```json
//! {"nested": {"pkg": {"nested": {
//!     "Reading": {
//!         "fields": {
//!             "sensor_id": {"type": "string", "id": 1},
//!             "samples": {"rule": "repeated", "type": "Sample", "id": 2},
//!             "labels": {"keyType": "string", "type": "int32", "id": 3}
//!         },
//!         "oneofs": {"source": {"oneof": ["sensor_id"]}},
//!         "nested": {"Sample": {"fields": {"value": {"type": "double", "id": 1}}}}
//!     },
//!     "Unit": {"values": {"CELSIUS": 0, "KELVIN": 1}}
//! }}}}
//! ```
//!
//! Type references are resolved like `.proto` scopes: inner scope first, then
//! each enclosing namespace outward; a leading `.` makes a name absolute.
//! Field and oneof names are converted to lowerCamelCase unless
//! [`LoadOptions::keep_case`] is set.

use std::collections::{BTreeMap, HashMap, HashSet};
use std::fs;
use std::path::{Path, PathBuf};

use serde::Deserialize;

use super::descriptor::{EnumDescriptor, FieldDescriptor, FieldKind, MessageDescriptor, ScalarKind};
use super::pool::DescriptorPool;
use crate::error::{LoadError, SchemaError};

/// Options for [`DescriptorPool::load`].
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct LoadOptions {
    /// Keep field names exactly as declared.
    pub keep_case: bool,
}

#[derive(Debug, Deserialize)]
struct JsonRoot {
    #[serde(default)]
    nested: BTreeMap<String, JsonNode>,
}

#[derive(Debug, Deserialize)]
struct JsonNode {
    fields: Option<BTreeMap<String, JsonField>>,
    values: Option<BTreeMap<String, i32>>,
    #[serde(default)]
    oneofs: BTreeMap<String, JsonOneof>,
    #[serde(default)]
    nested: BTreeMap<String, JsonNode>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct JsonField {
    #[serde(rename = "type")]
    type_name: String,
    id: u32,
    #[serde(default)]
    rule: Option<String>,
    #[serde(default)]
    key_type: Option<String>,
    #[serde(default)]
    options: Option<JsonFieldOptions>,
}

#[derive(Debug, Default, Deserialize)]
struct JsonFieldOptions {
    packed: Option<bool>,
}

#[derive(Debug, Deserialize)]
struct JsonOneof {
    oneof: Vec<String>,
}

struct RawMessage {
    full_name: String,
    fields: BTreeMap<String, JsonField>,
    oneofs: BTreeMap<String, JsonOneof>,
}

/// Flattened view of all namespaces across the loaded files.
#[derive(Default)]
struct Collector {
    messages: Vec<RawMessage>,
    enums: Vec<EnumDescriptor>,
    message_names: HashSet<String>,
    enum_names: HashSet<String>,
    sources: Vec<PathBuf>,
}

impl Collector {
    fn collect(&mut self, prefix: &str, nested: BTreeMap<String, JsonNode>) {
        for (name, node) in nested {
            let full_name = join(prefix, &name);
            if let Some(fields) = node.fields {
                self.message_names.insert(full_name.clone());
                self.messages.push(RawMessage {
                    full_name: full_name.clone(),
                    fields,
                    oneofs: node.oneofs,
                });
            }
            if let Some(values) = node.values {
                self.enum_names.insert(full_name.clone());
                self.enums.push(EnumDescriptor::new(full_name.clone(), values));
            }
            self.collect(&full_name, node.nested);
        }
    }

    fn resolve(&self, scope: &str, type_name: &str) -> Option<FieldKind> {
        if let Some(scalar) = ScalarKind::from_name(type_name) {
            return Some(FieldKind::Scalar(scalar));
        }
        let lookup = |candidate: String| {
            if self.message_names.contains(&candidate) {
                Some(FieldKind::Message(candidate))
            } else if self.enum_names.contains(&candidate) {
                Some(FieldKind::Enum(candidate))
            } else {
                None
            }
        };
        if let Some(absolute) = type_name.strip_prefix('.') {
            return lookup(absolute.to_string());
        }

        let mut scope = scope;
        loop {
            if let Some(kind) = lookup(join(scope, type_name)) {
                return Some(kind);
            }
            if scope.is_empty() {
                return None;
            }
            scope = scope.rsplit_once('.').map(|(parent, _)| parent).unwrap_or("");
        }
    }

    fn build(self, options: LoadOptions) -> Result<DescriptorPool, SchemaError> {
        let rename = |name: &str| {
            if options.keep_case {
                name.to_string()
            } else {
                camel_case(name)
            }
        };

        let mut builder = DescriptorPool::builder();
        for raw in &self.messages {
            let membership: HashMap<&str, &str> = raw
                .oneofs
                .iter()
                .flat_map(|(oneof, group)| group.oneof.iter().map(move |f| (f.as_str(), oneof.as_str())))
                .collect();

            let mut message = MessageDescriptor::builder(raw.full_name.clone());
            for (name, field) in &raw.fields {
                let unresolved = || SchemaError::UnresolvedType {
                    message: raw.full_name.clone(),
                    field: name.clone(),
                    type_name: field.type_name.clone(),
                };
                let value_kind = self
                    .resolve(&raw.full_name, &field.type_name)
                    .ok_or_else(unresolved)?;

                let kind = match &field.key_type {
                    Some(key_type) => FieldKind::Map {
                        key: ScalarKind::from_name(key_type).ok_or_else(|| {
                            SchemaError::InvalidMapKey {
                                message: raw.full_name.clone(),
                                field: name.clone(),
                            }
                        })?,
                        value: Box::new(value_kind),
                    },
                    None => value_kind,
                };

                let mut descriptor = FieldDescriptor::new(rename(name), field.id, kind);
                match field.rule.as_deref() {
                    Some("repeated") if field.key_type.is_none() => descriptor = descriptor.repeated(),
                    Some("required") => descriptor = descriptor.required(),
                    _ => {}
                }
                if field.options.as_ref().and_then(|o| o.packed) == Some(false) {
                    descriptor = descriptor.unpacked();
                }
                if let Some(oneof) = membership.get(name.as_str()) {
                    descriptor = descriptor.in_oneof(rename(oneof));
                }
                message = message.field(descriptor);
            }
            builder = builder.message(message.build());
        }
        for desc in self.enums {
            builder = builder.enumeration(desc);
        }
        for source in self.sources {
            builder = builder.source(source);
        }
        builder.build()
    }
}

impl DescriptorPool {
    /// Load and merge JSON descriptor files.
    ///
    /// # Errors
    ///
    /// Unreadable or malformed files, unresolvable type references and the
    /// validation failures of [`DescriptorPoolBuilder::build`](super::DescriptorPoolBuilder::build).
    pub fn load<P: AsRef<Path>>(paths: &[P], options: LoadOptions) -> Result<Self, LoadError> {
        if paths.is_empty() {
            return Err(LoadError::NoSources);
        }
        let mut collector = Collector::default();
        for path in paths {
            let path = path.as_ref();
            let text = fs::read_to_string(path).map_err(|source| LoadError::Io {
                path: path.to_path_buf(),
                source,
            })?;
            let root: JsonRoot = serde_json::from_str(&text).map_err(|source| LoadError::Json {
                path: path.to_path_buf(),
                source,
            })?;
            collector.collect("", root.nested);
            collector.sources.push(path.to_path_buf());
        }
        Ok(collector.build(options)?)
    }

    /// Build a pool from one in-memory JSON descriptor.
    pub fn from_json(json: &str, options: LoadOptions) -> Result<Self, LoadError> {
        let root: JsonRoot = serde_json::from_str(json).map_err(|source| LoadError::Json {
            path: PathBuf::from("<memory>"),
            source,
        })?;
        let mut collector = Collector::default();
        collector.collect("", root.nested);
        Ok(collector.build(options)?)
    }
}

fn join(prefix: &str, name: &str) -> String {
    if prefix.is_empty() {
        name.to_string()
    } else {
        format!("{prefix}.{name}")
    }
}

/// `snake_case` to `lowerCamelCase`: `_x` becomes `X` for lowercase `x`.
pub(crate) fn camel_case(name: &str) -> String {
    let mut out = String::with_capacity(name.len());
    let mut chars = name.chars().peekable();
    if let Some(first) = chars.next() {
        out.push(first);
    }
    while let Some(c) = chars.next() {
        if c == '_' {
            if let Some(next) = chars.peek().copied().filter(char::is_ascii_lowercase) {
                out.push(next.to_ascii_uppercase());
                chars.next();
                continue;
            }
        }
        out.push(c);
    }
    out
}
