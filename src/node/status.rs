//! Node status side channel.
//!
//! Every node publishes a [`NodeStatus`] after each message. The host reads
//! it through a `watch` receiver to render the status dot; it never affects
//! processing.

use serde::ser::SerializeStruct;
use serde::{Serialize, Serializer};
use tokio::sync::watch;

use crate::error::PipelineError;

/// Status dot colour.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum StatusFill {
    Green,
    Yellow,
    Red,
    Blue,
}

/// Last outcome reported by a node.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum NodeStatus {
    #[default]
    Ready,
    TypeMissing,
    SchemaNotReady,
    TypeNotFound,
    /// Streaming: bytes buffered so far.
    Collecting(usize),
    InvalidStreamInput,
    /// Wire format invalid.
    Invalid,
    Incomplete,
    MessageInvalid,
    Processed,
    SplitOutput,
}

impl NodeStatus {
    pub fn fill(&self) -> StatusFill {
        match self {
            NodeStatus::Ready | NodeStatus::Processed | NodeStatus::SplitOutput => StatusFill::Green,
            NodeStatus::TypeNotFound
            | NodeStatus::Invalid
            | NodeStatus::Incomplete
            | NodeStatus::MessageInvalid => StatusFill::Yellow,
            NodeStatus::TypeMissing | NodeStatus::SchemaNotReady | NodeStatus::InvalidStreamInput => {
                StatusFill::Red
            }
            NodeStatus::Collecting(_) => StatusFill::Blue,
        }
    }

    pub fn text(&self) -> String {
        match self {
            NodeStatus::Ready => "Ready".into(),
            NodeStatus::TypeMissing => "Protobuf type missing".into(),
            NodeStatus::SchemaNotReady => "Protofile not ready".into(),
            NodeStatus::TypeNotFound => "Message type not found".into(),
            NodeStatus::Collecting(n) => format!("Collecting bytes: {n}"),
            NodeStatus::InvalidStreamInput => "Invalid stream input".into(),
            NodeStatus::Invalid => "Wire format invalid".into(),
            NodeStatus::Incomplete => "Message incomplete".into(),
            NodeStatus::MessageInvalid => "Message invalid".into(),
            NodeStatus::Processed => "Processed".into(),
            NodeStatus::SplitOutput => "Split output".into(),
        }
    }

    pub fn is_error(&self) -> bool {
        matches!(self.fill(), StatusFill::Red | StatusFill::Yellow)
    }
}

/// Serialized as the host's status object: `{fill, shape, text}`.
impl Serialize for NodeStatus {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        let mut status = serializer.serialize_struct("NodeStatus", 3)?;
        status.serialize_field("fill", &self.fill())?;
        status.serialize_field("shape", "dot")?;
        status.serialize_field("text", &self.text())?;
        status.end()
    }
}

impl From<&PipelineError> for NodeStatus {
    fn from(error: &PipelineError) -> Self {
        match error {
            PipelineError::TypeMissing => NodeStatus::TypeMissing,
            PipelineError::SchemaNotReady | PipelineError::SchemaLoad(_) => NodeStatus::SchemaNotReady,
            PipelineError::TypeNotFound { .. } => NodeStatus::TypeNotFound,
            PipelineError::InvalidStreamInput { .. } => NodeStatus::InvalidStreamInput,
            PipelineError::MessageIncomplete { .. } => NodeStatus::Incomplete,
            PipelineError::MessageInvalid(_) | PipelineError::Json(_) => NodeStatus::MessageInvalid,
            PipelineError::WireFormatInvalid(_)
            | PipelineError::PayloadNotBinary
            | PipelineError::Protocol(_)
            | PipelineError::ChannelClosed => NodeStatus::Invalid,
        }
    }
}

/// Publishes status updates to any number of observers.
#[derive(Debug)]
pub struct StatusReporter {
    tx: watch::Sender<NodeStatus>,
}

impl Default for StatusReporter {
    fn default() -> Self {
        Self::new()
    }
}

impl StatusReporter {
    pub fn new() -> Self {
        let (tx, _) = watch::channel(NodeStatus::Ready);
        Self { tx }
    }

    pub fn set(&self, status: NodeStatus) {
        self.tx.send_replace(status);
    }

    pub fn current(&self) -> NodeStatus {
        *self.tx.borrow()
    }

    pub fn subscribe(&self) -> watch::Receiver<NodeStatus> {
        self.tx.subscribe()
    }
}
