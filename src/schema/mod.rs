//! Schema registry - descriptors, pools and their publication.
//!
//! - [`MessageDescriptor`], [`FieldDescriptor`], [`EnumDescriptor`] describe types
//! - [`DescriptorPool`] validates a set of them and resolves names
//! - [`MessageType`] is a resolved type, the entry point for encode/decode
//! - [`SchemaSource`] / [`SchemaHandle`] load files and publish pools

mod descriptor;
mod loader;
mod pool;
mod source;

pub use descriptor::{
    EnumDescriptor, FieldDescriptor, FieldKind, Label, MessageDescriptor,
    MessageDescriptorBuilder, ScalarKind,
};
pub use loader::LoadOptions;
pub use pool::{DescriptorPool, DescriptorPoolBuilder, MessageType};
pub use source::{SchemaConfig, SchemaHandle, SchemaSource};
