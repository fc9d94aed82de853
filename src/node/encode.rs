//! Encode node: canonical objects in, wire bytes out.

use tokio::sync::watch;
use tracing::{debug, warn};

use super::config::EncodeConfig;
use super::runtime::Stage;
use super::status::{NodeStatus, StatusReporter};
use crate::error::{PipelineError, Result, ValidationError};
use crate::item::{Emission, Payload, WorkItem};
use crate::schema::SchemaHandle;
use crate::stage::{MessageEncoder, TypeResolver};

/// One encode node instance.
#[derive(Debug)]
pub struct EncodeNode {
    config: EncodeConfig,
    resolver: TypeResolver,
    encoder: MessageEncoder,
    status: StatusReporter,
}

impl EncodeNode {
    pub fn new(config: EncodeConfig, schema: SchemaHandle) -> Self {
        let resolver = TypeResolver::new(config.proto_type.clone(), schema);
        let encoder = MessageEncoder::new(config.is_strict(), config.framing());
        Self {
            config,
            resolver,
            encoder,
            status: StatusReporter::new(),
        }
    }

    pub fn config(&self) -> &EncodeConfig {
        &self.config
    }

    pub fn status(&self) -> NodeStatus {
        self.status.current()
    }

    pub fn subscribe_status(&self) -> watch::Receiver<NodeStatus> {
        self.status.subscribe()
    }

    /// Encode the item's object payload.
    ///
    /// On success the payload is replaced by the serialized bytes and
    /// `protobuf_string` holds their hex form.
    pub fn handle(&mut self, mut item: WorkItem) -> Result<Emission> {
        let message_type = match self.resolver.resolve(&mut item) {
            Ok(message_type) => message_type,
            Err(e) => {
                let requested = self.resolver.effective_name(&item).map(str::to_string);
                return Err(self.fail(e, requested.as_deref()));
            }
        };
        self.status.set(NodeStatus::Ready);

        let encoded = match &item.payload {
            Payload::Object(object) => self.encoder.encode(&message_type, object),
            Payload::Bytes(_) => Err(PipelineError::MessageInvalid(ValidationError::ObjectExpected {
                field: message_type.name().to_string(),
            })),
        };
        let encoded = match encoded {
            Ok(encoded) => encoded,
            Err(e) => return Err(self.fail(e, Some(message_type.full_name()))),
        };

        debug!(
            message_type = message_type.full_name(),
            len = encoded.len(),
            "message encoded"
        );
        item.protobuf_string = Some(encoded.hex());
        item.payload = Payload::Bytes(encoded.into_bytes());
        self.status.set(NodeStatus::Processed);
        Ok(Emission::single(item))
    }

    fn fail(&self, error: PipelineError, resolved: Option<&str>) -> PipelineError {
        self.status.set(NodeStatus::from(&error));
        match &error {
            PipelineError::TypeNotFound { type_name, sources } => warn!(
                configured = self.resolver.configured(),
                resolved = %type_name,
                sources = ?sources,
                "Problem while looking up the message type"
            ),
            PipelineError::MessageInvalid(_) => warn!(
                configured = self.resolver.configured(),
                resolved,
                error = %error,
                "Message is not valid under selected message type"
            ),
            _ => warn!(
                configured = self.resolver.configured(),
                resolved,
                error = %error,
                "Encode failed"
            ),
        }
        error
    }
}

impl Stage for EncodeNode {
    fn handle(&mut self, item: WorkItem) -> Result<Option<Emission>> {
        EncodeNode::handle(self, item).map(Some)
    }
}

#[cfg(test)]
mod tests {
    use serde_json::json;

    use super::*;
    use crate::schema::{DescriptorPool, FieldDescriptor, MessageDescriptor, ScalarKind};

    fn schema() -> SchemaHandle {
        let pool = DescriptorPool::builder()
            .message(
                MessageDescriptor::builder("test.Point")
                    .field(FieldDescriptor::scalar("x", 1, ScalarKind::Int32).required())
                    .field(FieldDescriptor::scalar("label", 2, ScalarKind::String))
                    .build(),
            )
            .build()
            .unwrap();
        SchemaHandle::fixed(pool)
    }

    #[test]
    fn test_encode_sets_bytes_and_hex() {
        let mut node = EncodeNode::new(EncodeConfig::new("Point"), schema());
        let emission = node.handle(WorkItem::object(json!({"x": 150}))).unwrap();
        let item = emission.first().unwrap();
        assert_eq!(&item.payload_bytes().unwrap()[..], &[0x08, 0x96, 0x01]);
        assert_eq!(item.protobuf_string.as_deref(), Some("089601"));
        assert_eq!(item.protobuf_type.as_deref(), Some("Point"));
        assert_eq!(node.status(), NodeStatus::Processed);
    }

    #[test]
    fn test_encode_delimited() {
        let config = EncodeConfig::new("").with_delimited(true);
        let mut node = EncodeNode::new(config, schema());
        let item = WorkItem::object(json!({"x": 1})).with_type("test.Point");
        let emission = node.handle(item).unwrap();
        assert_eq!(emission.first().unwrap().protobuf_string.as_deref(), Some("020801"));
    }

    #[test]
    fn test_invalid_message() {
        let mut node = EncodeNode::new(EncodeConfig::new("Point"), schema());
        let err = node.handle(WorkItem::object(json!({"label": "x"}))).unwrap_err();
        assert!(matches!(
            err,
            PipelineError::MessageInvalid(ValidationError::MissingRequired { .. })
        ));
        assert_eq!(node.status().text(), "Message invalid");

        let err = node.handle(WorkItem::bytes(vec![1u8])).unwrap_err();
        assert!(matches!(err, PipelineError::MessageInvalid(_)));
    }

    #[test]
    fn test_flexible_input() {
        let config = EncodeConfig::new("Point").with_flexible_input(true);
        let mut node = EncodeNode::new(config, schema());
        let emission = node.handle(WorkItem::object(json!({"x": "2", "label": 5}))).unwrap();
        assert_eq!(emission.first().unwrap().protobuf_string.as_deref(), Some("0802120135"));
    }

    #[test]
    fn test_type_not_found() {
        let mut node = EncodeNode::new(EncodeConfig::new("Nope"), schema());
        let err = node.handle(WorkItem::object(json!({}))).unwrap_err();
        assert!(matches!(err, PipelineError::TypeNotFound { .. }));
        assert_eq!(node.status(), NodeStatus::TypeNotFound);
    }
}
