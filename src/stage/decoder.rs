//! Message decoding with failure classification.

use serde_json::Value as Json;
use tracing::debug;

use crate::codec::ConversionOptions;
use crate::error::{DecodeError, PipelineError, Result, WireError};
use crate::protocol::FramingMode;
use crate::schema::MessageType;

/// Outcome of decoding one buffer.
#[derive(Debug, Clone, PartialEq)]
pub enum Decoded {
    /// Fully decoded canonical object.
    Ok(Json),
    /// Structurally valid, but a required field is absent. `partial` is the
    /// canonical form of what was decoded.
    Incomplete { partial: Json, missing: String },
    /// Malformed wire data.
    Invalid(WireError),
}

impl Decoded {
    /// Canonical object, if one is forwarded downstream.
    pub fn object(&self) -> Option<&Json> {
        match self {
            Decoded::Ok(object) | Decoded::Incomplete { partial: object, .. } => Some(object),
            Decoded::Invalid(_) => None,
        }
    }

    pub fn is_ok(&self) -> bool {
        matches!(self, Decoded::Ok(_))
    }

    /// Strict view: anything but a complete decode is an error.
    pub fn into_result(self) -> Result<Json> {
        match self {
            Decoded::Ok(object) => Ok(object),
            Decoded::Incomplete { missing, .. } => Err(PipelineError::MessageIncomplete { missing }),
            Decoded::Invalid(e) => Err(PipelineError::WireFormatInvalid(e)),
        }
    }
}

/// Decodes buffers of a resolved type to canonical objects.
#[derive(Debug, Clone, Copy, Default)]
pub struct MessageDecoder {
    framing: FramingMode,
    options: ConversionOptions,
}

impl MessageDecoder {
    pub fn new(framing: FramingMode, options: ConversionOptions) -> Self {
        Self { framing, options }
    }

    pub fn framing(&self) -> FramingMode {
        self.framing
    }

    pub fn options(&self) -> &ConversionOptions {
        &self.options
    }

    pub fn decode(&self, message_type: &MessageType, buf: &[u8]) -> Decoded {
        let result = match self.framing {
            FramingMode::Delimited => message_type.decode_length_prefixed(buf),
            FramingMode::Raw => message_type.decode(buf),
        };
        match result {
            Ok(msg) => Decoded::Ok(message_type.to_canonical(&msg, &self.options)),
            Err(DecodeError::MissingRequired { missing, partial }) => {
                debug!(message_type = message_type.full_name(), %missing, "required field missing");
                Decoded::Incomplete {
                    partial: message_type.to_canonical(&partial, &self.options),
                    missing,
                }
            }
            Err(DecodeError::Wire(e)) => Decoded::Invalid(e),
        }
    }
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;

    use serde_json::json;

    use super::*;
    use crate::codec::LongRepr;
    use crate::schema::{DescriptorPool, FieldDescriptor, MessageDescriptor, ScalarKind};

    fn message_type() -> MessageType {
        let pool = DescriptorPool::builder()
            .message(
                MessageDescriptor::builder("test.Reading")
                    .field(FieldDescriptor::scalar("id", 1, ScalarKind::Int64).required())
                    .field(FieldDescriptor::scalar("label", 2, ScalarKind::String))
                    .build(),
            )
            .build()
            .unwrap();
        Arc::new(pool).lookup_type("Reading").unwrap()
    }

    #[test]
    fn test_decode_raw() {
        let decoded = MessageDecoder::default().decode(&message_type(), &[0x08, 0x96, 0x01]);
        assert_eq!(decoded, Decoded::Ok(json!({"id": "150"})));
    }

    #[test]
    fn test_decode_delimited_with_options() {
        let decoder = MessageDecoder::new(
            FramingMode::Delimited,
            ConversionOptions::default().with_longs(LongRepr::Number),
        );
        let decoded = decoder.decode(&message_type(), &[0x03, 0x08, 0x96, 0x01]);
        assert_eq!(decoded.into_result().unwrap(), json!({"id": 150}));
    }

    #[test]
    fn test_missing_required_is_incomplete() {
        let decoded = MessageDecoder::default().decode(&message_type(), &[0x12, 0x01, b'x']);
        match &decoded {
            Decoded::Incomplete { partial, missing } => {
                assert_eq!(partial, &json!({"label": "x"}));
                assert_eq!(missing, "id");
            }
            other => panic!("unexpected {other:?}"),
        }
        assert_eq!(decoded.object(), Some(&json!({"label": "x"})));
        assert!(matches!(
            decoded.into_result(),
            Err(PipelineError::MessageIncomplete { .. })
        ));
    }

    #[test]
    fn test_truncated_is_invalid() {
        let decoded = MessageDecoder::default().decode(&message_type(), &[0x12, 0x05, b'x']);
        assert!(matches!(decoded, Decoded::Invalid(WireError::Truncated { .. })));
        assert!(decoded.object().is_none());
    }
}
