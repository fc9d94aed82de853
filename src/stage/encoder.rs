//! Canonical object to wire bytes.

use bytes::Bytes;
use serde_json::Value as Json;

use crate::error::Result;
use crate::protocol::FramingMode;
use crate::schema::MessageType;

/// Serialized message plus its hex view.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EncodedMessage {
    bytes: Bytes,
}

impl EncodedMessage {
    pub fn bytes(&self) -> &Bytes {
        &self.bytes
    }

    pub fn into_bytes(self) -> Bytes {
        self.bytes
    }

    /// Lowercase hex of the serialized bytes.
    pub fn hex(&self) -> String {
        hex::encode(&self.bytes)
    }

    pub fn len(&self) -> usize {
        self.bytes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.bytes.is_empty()
    }
}

/// Builds, verifies and serializes messages.
#[derive(Debug, Clone, Copy, Default)]
pub struct MessageEncoder {
    strict: bool,
    framing: FramingMode,
}

impl MessageEncoder {
    /// `strict` rejects values whose JSON shape does not match the field;
    /// otherwise values are coerced.
    pub fn new(strict: bool, framing: FramingMode) -> Self {
        Self { strict, framing }
    }

    pub fn is_strict(&self) -> bool {
        self.strict
    }

    pub fn framing(&self) -> FramingMode {
        self.framing
    }

    /// # Errors
    ///
    /// [`crate::PipelineError::MessageInvalid`] when construction or
    /// verification fails; nothing is serialized in that case.
    pub fn encode(&self, message_type: &MessageType, object: &Json) -> Result<EncodedMessage> {
        let msg = message_type.from_canonical(object, self.strict)?;
        message_type.verify(&msg)?;
        let bytes = match self.framing {
            FramingMode::Delimited => message_type.encode_length_prefixed(&msg)?,
            FramingMode::Raw => message_type.encode(&msg)?,
        };
        Ok(EncodedMessage { bytes })
    }
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;

    use serde_json::json;

    use super::*;
    use crate::error::{PipelineError, ValidationError};
    use crate::schema::{DescriptorPool, FieldDescriptor, MessageDescriptor, ScalarKind};

    fn message_type() -> MessageType {
        let pool = DescriptorPool::builder()
            .message(
                MessageDescriptor::builder("Point")
                    .field(FieldDescriptor::scalar("x", 1, ScalarKind::Int32).required())
                    .field(FieldDescriptor::scalar("on", 2, ScalarKind::Bool))
                    .build(),
            )
            .build()
            .unwrap();
        Arc::new(pool).lookup_type("Point").unwrap()
    }

    #[test]
    fn test_encode_raw_and_hex() {
        let encoded = MessageEncoder::new(true, FramingMode::Raw)
            .encode(&message_type(), &json!({"x": 150}))
            .unwrap();
        assert_eq!(&encoded.bytes()[..], &[0x08, 0x96, 0x01]);
        assert_eq!(encoded.hex(), "089601");
    }

    #[test]
    fn test_encode_delimited() {
        let encoded = MessageEncoder::new(true, FramingMode::Delimited)
            .encode(&message_type(), &json!({"x": 1}))
            .unwrap();
        assert_eq!(&encoded.into_bytes()[..], &[0x02, 0x08, 0x01]);
    }

    #[test]
    fn test_strict_rejects_flexible_coerces() {
        let object = json!({"x": "150", "on": 1});
        let err = MessageEncoder::new(true, FramingMode::Raw)
            .encode(&message_type(), &object)
            .unwrap_err();
        assert!(matches!(err, PipelineError::MessageInvalid(ValidationError::InvalidValue { .. })));

        let encoded = MessageEncoder::new(false, FramingMode::Raw)
            .encode(&message_type(), &object)
            .unwrap();
        assert_eq!(encoded.hex(), "0896011001");
    }

    #[test]
    fn test_missing_required_is_invalid() {
        let err = MessageEncoder::new(false, FramingMode::Raw)
            .encode(&message_type(), &json!({"on": true}))
            .unwrap_err();
        assert!(matches!(
            err,
            PipelineError::MessageInvalid(ValidationError::MissingRequired { .. })
        ));
    }
}
