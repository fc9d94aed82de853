//! Message type resolution.
//!
//! The configured type wins; an item's own `protobuf_type` is used only when
//! nothing is configured. The schema is read through a [`SchemaHandle`] on
//! every call, so a reload takes effect on the next item.

use crate::error::{PipelineError, Result};
use crate::item::WorkItem;
use crate::schema::{MessageType, SchemaHandle};

/// Picks the message type for each work item.
#[derive(Debug, Clone)]
pub struct TypeResolver {
    configured: Option<String>,
    schema: SchemaHandle,
}

impl TypeResolver {
    /// `configured` may be empty, meaning "take the type from the item".
    pub fn new(configured: impl Into<String>, schema: SchemaHandle) -> Self {
        let configured = configured.into();
        Self {
            configured: (!configured.trim().is_empty()).then_some(configured),
            schema,
        }
    }

    pub fn configured(&self) -> Option<&str> {
        self.configured.as_deref()
    }

    pub fn schema(&self) -> &SchemaHandle {
        &self.schema
    }

    /// Type name that would be used for `item`.
    pub fn effective_name<'a>(&'a self, item: &'a WorkItem) -> Option<&'a str> {
        self.configured.as_deref().or_else(|| item.type_override())
    }

    /// Resolve the type for `item` and record the name used on it.
    ///
    /// # Errors
    ///
    /// - [`PipelineError::TypeMissing`] if no name is configured or carried
    /// - [`PipelineError::SchemaNotReady`] if no schema has loaded
    /// - [`PipelineError::TypeNotFound`] if the schema lacks the type
    pub fn resolve(&self, item: &mut WorkItem) -> Result<MessageType> {
        let name = self
            .effective_name(item)
            .ok_or(PipelineError::TypeMissing)?
            .to_string();
        let pool = self.schema.current().ok_or(PipelineError::SchemaNotReady)?;
        let message_type = pool
            .lookup_type(&name)
            .map_err(|_| PipelineError::TypeNotFound {
                type_name: name.clone(),
                sources: pool.sources().to_vec(),
            })?;
        item.protobuf_type = Some(name);
        Ok(message_type)
    }
}
