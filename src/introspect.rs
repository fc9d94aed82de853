//! Schema introspection for the editor.
//!
//! The host answers three queries per schema node: the message types it
//! knows, the fields of one type, and a `.proto`-style preview of a type
//! together with the nested types it references.

use std::collections::{HashMap, HashSet, VecDeque};
use std::fmt::Write;
use std::sync::Arc;

use serde::Serialize;

use crate::error::IntrospectError;
use crate::schema::{
    DescriptorPool, FieldDescriptor, FieldKind, Label, MessageDescriptor, MessageType, SchemaHandle,
};

/// Field listing entry.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct FieldSummary {
    pub name: String,
    #[serde(rename = "type")]
    pub type_name: String,
    pub id: u32,
}

/// Schema handles of every schema node, by node id.
#[derive(Debug, Clone, Default)]
pub struct SchemaDirectory {
    nodes: HashMap<String, SchemaHandle>,
}

impl SchemaDirectory {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn register(&mut self, id: impl Into<String>, schema: SchemaHandle) {
        self.nodes.insert(id.into(), schema);
    }

    pub fn remove(&mut self, id: &str) -> Option<SchemaHandle> {
        self.nodes.remove(id)
    }

    pub fn get(&self, id: &str) -> Option<&SchemaHandle> {
        self.nodes.get(id)
    }

    /// Fully-qualified message type names, sorted.
    pub fn types(&self, id: &str) -> Result<Vec<String>, IntrospectError> {
        Ok(self.pool(id)?.list_types())
    }

    /// Fields of `type_name`, sorted by number.
    pub fn fields(&self, id: &str, type_name: &str) -> Result<Vec<FieldSummary>, IntrospectError> {
        let message_type = self.lookup(id, type_name)?;
        Ok(message_type
            .descriptor()
            .fields()
            .iter()
            .map(|f| FieldSummary {
                name: f.name().to_string(),
                type_name: f.type_name(),
                id: f.number(),
            })
            .collect())
    }

    /// Text preview of `type_name` and the types it references.
    pub fn definition(&self, id: &str, type_name: &str) -> Result<String, IntrospectError> {
        Ok(format_type_definition(&self.lookup(id, type_name)?))
    }

    fn pool(&self, id: &str) -> Result<Arc<DescriptorPool>, IntrospectError> {
        self.nodes
            .get(id)
            .ok_or_else(|| IntrospectError::NodeNotFound(id.to_string()))?
            .current()
            .ok_or_else(|| IntrospectError::SchemaNotLoaded(id.to_string()))
    }

    fn lookup(&self, id: &str, type_name: &str) -> Result<MessageType, IntrospectError> {
        self.pool(id)?
            .lookup_type(type_name)
            .map_err(|_| IntrospectError::TypeNotFound(type_name.to_string()))
    }
}

/// Render `message_type` as `.proto`-like text.
///
/// Referenced message and enum types follow the main definition, each once,
/// in the order they are first referenced.
pub fn format_type_definition(message_type: &MessageType) -> String {
    let pool = message_type.pool();
    let mut out = String::new();
    write_message(&mut out, message_type.descriptor());

    let mut seen = HashSet::from([message_type.full_name().to_string()]);
    let mut queue: VecDeque<String> = referenced(message_type.descriptor()).collect();
    while let Some(name) = queue.pop_front() {
        if !seen.insert(name.clone()) {
            continue;
        }
        if let Some(desc) = pool.message(&name) {
            out.push_str("\n\n");
            write_message(&mut out, desc);
            queue.extend(referenced(desc));
        } else if let Some(desc) = pool.enumeration(&name) {
            out.push_str("\n\n");
            let _ = writeln!(out, "enum {} {{", desc.name());
            for (value, number) in desc.values() {
                let _ = writeln!(out, "  {value} = {number};");
            }
            out.push('}');
        }
    }
    out
}

fn write_message(out: &mut String, desc: &MessageDescriptor) {
    let _ = writeln!(out, "message {} {{", desc.name());
    let mut written_oneofs = HashSet::new();
    for field in desc.fields() {
        match field.oneof() {
            Some(oneof) => {
                if written_oneofs.insert(oneof) {
                    let _ = writeln!(out, "  oneof {oneof} {{");
                    for member in desc.oneof_members(oneof) {
                        write_field(out, member, "    ");
                    }
                    out.push_str("  }\n");
                }
            }
            None => write_field(out, field, "  "),
        }
    }
    out.push('}');
}

fn write_field(out: &mut String, field: &FieldDescriptor, indent: &str) {
    let label = match field.label() {
        Label::Repeated if !field.is_map() => "repeated ",
        Label::Required => "required ",
        _ => "",
    };
    let _ = writeln!(
        out,
        "{indent}{label}{} {} = {};",
        field.type_name(),
        field.name(),
        field.number()
    );
}

fn referenced(desc: &MessageDescriptor) -> impl Iterator<Item = String> + '_ {
    desc.fields().iter().filter_map(|f| {
        let kind = match f.kind() {
            FieldKind::Map { value, .. } => value.as_ref(),
            kind => kind,
        };
        match kind {
            FieldKind::Enum(name) | FieldKind::Message(name) => Some(name.clone()),
            _ => None,
        }
    })
}
