//! Work items flowing between pipeline stages.
//!
//! A [`WorkItem`] carries a payload (raw bytes or a canonical object) plus the
//! metadata stages read and write. An [`Emission`] is what a stage produces
//! for one input: one optional item per output port.

use bytes::Bytes;
use serde::ser::SerializeStruct;
use serde::{Serialize, Serializer};
use serde_json::Value as Json;

use crate::protocol::FrameInfo;

/// Item payload.
#[derive(Debug, Clone, PartialEq)]
pub enum Payload {
    /// Binary data, serialized as `{"type": "Buffer", "data": [..]}`.
    Bytes(Bytes),
    /// Structured data.
    Object(Json),
}

impl Serialize for Payload {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        match self {
            Payload::Object(value) => value.serialize(serializer),
            Payload::Bytes(bytes) => {
                let mut buffer = serializer.serialize_struct("Buffer", 2)?;
                buffer.serialize_field("type", "Buffer")?;
                buffer.serialize_field("data", &bytes[..])?;
                buffer.end()
            }
        }
    }
}

/// One message travelling through the pipeline.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct WorkItem {
    pub payload: Payload,
    /// Type override on input; the resolved type name on output.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub protobuf_type: Option<String>,
    /// Frame debug info on streaming decode.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub proto: Option<FrameInfo>,
    /// Field name in split output.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub field: Option<String>,
    /// Declared field type in split output.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub field_type: Option<String>,
    /// Lowercase hex of the encoded bytes.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub protobuf_string: Option<String>,
}

impl WorkItem {
    fn with_payload(payload: Payload) -> Self {
        Self {
            payload,
            protobuf_type: None,
            proto: None,
            field: None,
            field_type: None,
            protobuf_string: None,
        }
    }

    /// Item carrying binary data.
    pub fn bytes(data: impl Into<Bytes>) -> Self {
        Self::with_payload(Payload::Bytes(data.into()))
    }

    /// Item carrying a structured object.
    pub fn object(value: Json) -> Self {
        Self::with_payload(Payload::Object(value))
    }

    /// Set the type override.
    pub fn with_type(mut self, protobuf_type: impl Into<String>) -> Self {
        self.protobuf_type = Some(protobuf_type.into());
        self
    }

    pub fn payload_bytes(&self) -> Option<&Bytes> {
        match &self.payload {
            Payload::Bytes(bytes) => Some(bytes),
            Payload::Object(_) => None,
        }
    }

    pub fn payload_object(&self) -> Option<&Json> {
        match &self.payload {
            Payload::Object(value) => Some(value),
            Payload::Bytes(_) => None,
        }
    }

    /// Type override, with an empty string treated as absent.
    pub fn type_override(&self) -> Option<&str> {
        self.protobuf_type.as_deref().filter(|t| !t.is_empty())
    }
}

/// Output of one stage invocation: one slot per output port.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Emission {
    slots: Vec<Option<WorkItem>>,
}

impl Emission {
    /// One item on the first port.
    pub fn single(item: WorkItem) -> Self {
        Self {
            slots: vec![Some(item)],
        }
    }

    /// `ports` empty slots.
    pub fn with_ports(ports: usize) -> Self {
        Self {
            slots: vec![None; ports],
        }
    }

    /// Place `item` on `port`; out-of-range ports are ignored.
    pub fn set(&mut self, port: usize, item: WorkItem) {
        if let Some(slot) = self.slots.get_mut(port) {
            *slot = Some(item);
        }
    }

    pub fn port(&self, port: usize) -> Option<&WorkItem> {
        self.slots.get(port).and_then(Option::as_ref)
    }

    /// Item on the first port.
    pub fn first(&self) -> Option<&WorkItem> {
        self.port(0)
    }

    pub fn ports(&self) -> usize {
        self.slots.len()
    }

    /// Occupied ports with their items.
    pub fn items(&self) -> impl Iterator<Item = (usize, &WorkItem)> {
        self.slots
            .iter()
            .enumerate()
            .filter_map(|(port, slot)| slot.as_ref().map(|item| (port, item)))
    }

    pub fn into_slots(self) -> Vec<Option<WorkItem>> {
        self.slots
    }
}
