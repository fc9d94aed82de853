//! Decode node: bytes in, canonical objects out.
//!
//! Whole-buffer input goes straight to resolution and decoding. Stream input
//! carries one byte per item; bytes are assembled into frames first:
//!
//! - delimited framing completes a frame when the announced length is reached
//! - raw framing completes a frame when no byte arrived for the configured
//!   timeout; the runtime calls [`Stage::on_deadline`] at that point
//!
//! # Example
//!
//! ```
//! use protowire::node::{DecodeConfig, DecodeNode};
//! use protowire::schema::{DescriptorPool, FieldDescriptor, MessageDescriptor, ScalarKind, SchemaHandle};
//! use protowire::WorkItem;
//!
//! let pool = DescriptorPool::builder()
//!     .message(
//!         MessageDescriptor::builder("demo.Point")
//!             .field(FieldDescriptor::scalar("x", 1, ScalarKind::Int32))
//!             .build(),
//!     )
//!     .build()
//!     .unwrap();
//!
//! let mut node = DecodeNode::new(DecodeConfig::new("demo.Point"), SchemaHandle::fixed(pool));
//! let emission = node.handle(WorkItem::bytes(vec![0x08, 0x96, 0x01])).unwrap().unwrap();
//! let item = emission.first().unwrap();
//! assert_eq!(item.payload_object(), Some(&serde_json::json!({"x": 150})));
//! ```

use tokio::sync::watch;
use tokio::time::Instant;
use tracing::{debug, warn};

use super::config::DecodeConfig;
use super::runtime::Stage;
use super::status::{NodeStatus, StatusReporter};
use crate::error::{PipelineError, Result};
use crate::item::{Emission, Payload, WorkItem};
use crate::protocol::{AssemblerState, CompleteFrame, FrameAssembler, FramingMode};
use crate::schema::SchemaHandle;
use crate::stage::{Decoded, MessageDecoder, OutputRouter, TypeResolver};

/// One decode node instance.
#[derive(Debug)]
pub struct DecodeNode {
    config: DecodeConfig,
    resolver: TypeResolver,
    decoder: MessageDecoder,
    router: OutputRouter,
    assembler: FrameAssembler,
    /// Raw streaming: the item that carried the most recent byte.
    pending: Option<WorkItem>,
    status: StatusReporter,
}

impl DecodeNode {
    pub fn new(config: DecodeConfig, schema: SchemaHandle) -> Self {
        let resolver = TypeResolver::new(config.proto_type.clone(), schema);
        let decoder = MessageDecoder::new(config.framing(), config.conversion_options());
        let router = OutputRouter::new(config.split_output, config.output_count());
        let assembler = FrameAssembler::new()
            .with_timeout(config.timeout())
            .with_max_message_size(config.max_message_size);
        Self {
            config,
            resolver,
            decoder,
            router,
            assembler,
            pending: None,
            status: StatusReporter::new(),
        }
    }

    pub fn config(&self) -> &DecodeConfig {
        &self.config
    }

    pub fn status(&self) -> NodeStatus {
        self.status.current()
    }

    /// Receiver observing every status change.
    pub fn subscribe_status(&self) -> watch::Receiver<NodeStatus> {
        self.status.subscribe()
    }

    pub fn assembler_state(&self) -> AssemblerState {
        self.assembler.state()
    }

    /// Process one inbound item.
    ///
    /// Returns `Ok(None)` while stream bytes are still being collected.
    pub fn handle(&mut self, item: WorkItem) -> Result<Option<Emission>> {
        if !self.config.stream_input {
            return self.process(item).map(Some);
        }

        let byte = match item.payload_bytes().map(|b| &b[..]) {
            Some([byte]) => *byte,
            other => {
                let len = other.map_or(0, <[u8]>::len);
                return Err(self.fail(PipelineError::InvalidStreamInput { len }, None));
            }
        };

        match self.config.framing() {
            FramingMode::Delimited => match self.assembler.feed(byte) {
                Ok(Some(frame)) => self.process_frame(item, frame, true).map(Some),
                Ok(None) => {
                    if self.assembler.state() == AssemblerState::CollectingMessage {
                        self.status.set(NodeStatus::Collecting(self.assembler.buffered_len()));
                    }
                    Ok(None)
                }
                Err(e) => Err(self.fail(e.into(), None)),
            },
            FramingMode::Raw => {
                self.assembler.feed_raw(byte, Instant::now());
                self.pending = Some(item);
                self.status.set(NodeStatus::Collecting(self.assembler.buffered_len()));
                Ok(None)
            }
        }
    }

    /// Finalize the raw-mode frame collected so far.
    pub fn flush(&mut self) -> Result<Option<Emission>> {
        let base = self.pending.take();
        match self.assembler.expire() {
            Some(frame) => {
                let base = base.unwrap_or_else(|| WorkItem::bytes(bytes::Bytes::new()));
                self.process_frame(base, frame, false).map(Some)
            }
            None => Ok(None),
        }
    }

    /// Cancel the deadline and discard partial frames.
    pub fn reset(&mut self) {
        self.assembler.clear();
        self.pending = None;
    }

    fn process_frame(
        &mut self,
        mut item: WorkItem,
        frame: CompleteFrame,
        delimited: bool,
    ) -> Result<Emission> {
        item.payload = Payload::Bytes(frame.payload(delimited));
        item.proto = Some(frame.info());
        self.process(item)
    }

    fn process(&mut self, mut item: WorkItem) -> Result<Emission> {
        let Some(buf) = item.payload_bytes().cloned() else {
            return Err(self.fail(PipelineError::PayloadNotBinary, None));
        };

        let message_type = match self.resolver.resolve(&mut item) {
            Ok(message_type) => message_type,
            Err(e) => {
                let requested = self.resolver.effective_name(&item).map(str::to_string);
                return Err(self.fail(e, requested.as_deref()));
            }
        };
        self.status.set(NodeStatus::Ready);

        match self.decoder.decode(&message_type, &buf) {
            Decoded::Ok(object) => {
                let emission = self.router.route(object, &message_type, &item);
                self.status.set(if self.router.is_split() {
                    NodeStatus::SplitOutput
                } else {
                    NodeStatus::Processed
                });
                debug!(
                    message_type = message_type.full_name(),
                    ports = emission.ports(),
                    "message decoded"
                );
                Ok(emission)
            }
            Decoded::Incomplete { partial, missing } => {
                warn!(
                    message_type = message_type.full_name(),
                    %missing,
                    "Received message contains empty fields. Incomplete message will be forwarded."
                );
                self.status.set(NodeStatus::Incomplete);
                item.payload = Payload::Object(partial);
                let mut emission = Emission::with_ports(self.router.outputs());
                emission.set(0, item);
                Ok(emission)
            }
            Decoded::Invalid(e) => Err(self.fail(e.into(), Some(message_type.full_name()))),
        }
    }

    /// Record a failure on the status channel and log it.
    fn fail(&self, error: PipelineError, resolved: Option<&str>) -> PipelineError {
        self.status.set(NodeStatus::from(&error));
        match &error {
            PipelineError::TypeNotFound { type_name, sources } => warn!(
                configured = self.resolver.configured(),
                resolved = %type_name,
                sources = ?sources,
                "Problem while looking up the message type"
            ),
            PipelineError::WireFormatInvalid(_) | PipelineError::Protocol(_) => warn!(
                configured = self.resolver.configured(),
                resolved,
                error = %error,
                "Wire format is invalid"
            ),
            _ => warn!(
                configured = self.resolver.configured(),
                resolved,
                error = %error,
                "Decode failed"
            ),
        }
        error
    }
}

impl Stage for DecodeNode {
    fn handle(&mut self, item: WorkItem) -> Result<Option<Emission>> {
        DecodeNode::handle(self, item)
    }

    fn deadline(&self) -> Option<Instant> {
        self.assembler.deadline()
    }

    fn on_deadline(&mut self) -> Result<Option<Emission>> {
        self.flush()
    }

    fn close(&mut self) {
        self.reset();
    }
}

#[cfg(test)]
mod tests {
    use serde_json::json;

    use super::*;
    use crate::error::WireError;
    use crate::schema::{DescriptorPool, FieldDescriptor, MessageDescriptor, ScalarKind};

    fn schema() -> SchemaHandle {
        let pool = DescriptorPool::builder()
            .message(
                MessageDescriptor::builder("test.Point")
                    .field(FieldDescriptor::scalar("x", 1, ScalarKind::Int32).required())
                    .field(FieldDescriptor::scalar("y", 2, ScalarKind::Int32))
                    .build(),
            )
            .build()
            .unwrap();
        SchemaHandle::fixed(pool)
    }

    fn object(emission: &Emission, port: usize) -> serde_json::Value {
        emission.port(port).unwrap().payload_object().unwrap().clone()
    }

    #[test]
    fn test_whole_buffer() {
        let mut node = DecodeNode::new(DecodeConfig::new("test.Point"), schema());
        let emission = node.handle(WorkItem::bytes(vec![0x08, 0x01, 0x10, 0x02])).unwrap().unwrap();
        assert_eq!(object(&emission, 0), json!({"x": 1, "y": 2}));
        assert_eq!(emission.first().unwrap().protobuf_type.as_deref(), Some("test.Point"));
        assert_eq!(node.status(), NodeStatus::Processed);
    }

    #[test]
    fn test_type_from_item() {
        let mut node = DecodeNode::new(DecodeConfig::default(), schema());
        let item = WorkItem::bytes(vec![0x08, 0x01]).with_type("Point");
        let emission = node.handle(item).unwrap().unwrap();
        assert_eq!(emission.first().unwrap().protobuf_type.as_deref(), Some("Point"));

        let err = node.handle(WorkItem::bytes(vec![0x08, 0x01])).unwrap_err();
        assert!(matches!(err, PipelineError::TypeMissing));
        assert_eq!(node.status(), NodeStatus::TypeMissing);
    }

    #[test]
    fn test_schema_not_ready() {
        let mut node = DecodeNode::new(DecodeConfig::new("Point"), SchemaHandle::unavailable());
        let err = node.handle(WorkItem::bytes(vec![0x08, 0x01])).unwrap_err();
        assert!(matches!(err, PipelineError::SchemaNotReady));
        assert_eq!(node.status().text(), "Protofile not ready");
    }

    #[test]
    fn test_incomplete_forwards_partial() {
        let mut node = DecodeNode::new(DecodeConfig::new("Point").with_split_output(2), schema());
        let emission = node.handle(WorkItem::bytes(vec![0x10, 0x05])).unwrap().unwrap();
        assert_eq!(emission.ports(), 2);
        assert_eq!(object(&emission, 0), json!({"y": 5}));
        assert!(emission.port(1).is_none());
        assert_eq!(node.status(), NodeStatus::Incomplete);
    }

    #[test]
    fn test_invalid_wire_format() {
        let mut node = DecodeNode::new(DecodeConfig::new("Point"), schema());
        let err = node.handle(WorkItem::bytes(vec![0x08])).unwrap_err();
        assert!(matches!(err, PipelineError::WireFormatInvalid(_)));
        assert_eq!(node.status(), NodeStatus::Invalid);

        let err = node.handle(WorkItem::object(json!({"x": 1}))).unwrap_err();
        assert!(matches!(err, PipelineError::PayloadNotBinary));
    }

    #[test]
    fn test_nested_unknown_groups_invalid() {
        let mut node = DecodeNode::new(DecodeConfig::new("Point"), schema());
        let err = node.handle(WorkItem::bytes(vec![0x7Bu8; 1_000_000])).unwrap_err();
        assert!(matches!(
            err,
            PipelineError::WireFormatInvalid(WireError::RecursionLimit)
        ));
        assert_eq!(node.status(), NodeStatus::Invalid);

        let emission = node.handle(WorkItem::bytes(vec![0x08, 0x03])).unwrap().unwrap();
        assert_eq!(object(&emission, 0), json!({"x": 3}));
    }

    #[test]
    fn test_split_output() {
        let mut node = DecodeNode::new(DecodeConfig::new("Point").with_split_output(2), schema());
        let emission = node.handle(WorkItem::bytes(vec![0x08, 0x01, 0x10, 0x02])).unwrap().unwrap();
        assert_eq!(object(&emission, 1), json!(2));
        assert_eq!(emission.port(1).unwrap().field.as_deref(), Some("y"));
        assert_eq!(node.status(), NodeStatus::SplitOutput);
    }

    #[test]
    fn test_stream_delimited() {
        let config = DecodeConfig::new("Point").with_delimited(true).with_stream_input(true);
        let mut node = DecodeNode::new(config, schema());

        assert!(node.handle(WorkItem::bytes(vec![0x02])).unwrap().is_none());
        assert!(node.handle(WorkItem::bytes(vec![0x08])).unwrap().is_none());
        assert_eq!(node.status(), NodeStatus::Collecting(1));

        let emission = node.handle(WorkItem::bytes(vec![0x07])).unwrap().unwrap();
        let item = emission.first().unwrap();
        assert_eq!(item.payload_object(), Some(&json!({"x": 7})));
        let proto = item.proto.as_ref().unwrap();
        assert_eq!(proto.msg, "0807");
        assert_eq!(proto.msg_delimited.as_deref(), Some("020807"));
        assert_eq!(proto.length, 2);
        assert_eq!(node.assembler_state(), AssemblerState::Idle);
    }

    #[test]
    fn test_stream_rejects_multi_byte() {
        let config = DecodeConfig::new("Point").with_delimited(true).with_stream_input(true);
        let mut node = DecodeNode::new(config, schema());
        node.handle(WorkItem::bytes(vec![0x02])).unwrap();

        let err = node.handle(WorkItem::bytes(vec![0x08, 0x01])).unwrap_err();
        assert!(matches!(err, PipelineError::InvalidStreamInput { len: 2 }));
        assert_eq!(node.status(), NodeStatus::InvalidStreamInput);
        assert_eq!(node.assembler_state(), AssemblerState::CollectingMessage);
    }

    #[tokio::test(start_paused = true)]
    async fn test_stream_raw_flush() {
        let config = DecodeConfig::default().with_stream_input(true);
        let mut node = DecodeNode::new(config, schema());

        node.handle(WorkItem::bytes(vec![0x08])).unwrap();
        node.handle(WorkItem::bytes(vec![0x03]).with_type("Point")).unwrap();
        assert_eq!(node.status(), NodeStatus::Collecting(2));
        assert!(Stage::deadline(&node).is_some());

        let emission = node.flush().unwrap().unwrap();
        let item = emission.first().unwrap();
        assert_eq!(item.payload_object(), Some(&json!({"x": 3})));
        assert_eq!(item.proto.as_ref().unwrap().msg_delimited, None);
        assert!(Stage::deadline(&node).is_none());
        assert!(node.flush().unwrap().is_none());
    }

    #[tokio::test(start_paused = true)]
    async fn test_close_discards_bytes() {
        let config = DecodeConfig::new("Point").with_stream_input(true);
        let mut node = DecodeNode::new(config, schema());
        node.handle(WorkItem::bytes(vec![0x08])).unwrap();
        Stage::close(&mut node);
        assert_eq!(node.assembler_state(), AssemblerState::Idle);
        assert!(node.flush().unwrap().is_none());
    }
}
