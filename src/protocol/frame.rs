//! Complete frame with prefix and message accessors.
//!
//! A frame is what the assembler hands out once a message is complete: the
//! raw message bytes plus, in delimited mode, the varint length prefix that
//! announced them. Uses `bytes::Bytes` so payloads are shared, not copied.
//!
//! # Example
//!
//! ```
//! use protowire::protocol::{build_delimited, CompleteFrame};
//! use bytes::Bytes;
//!
//! let frame = CompleteFrame::new(Bytes::from_static(&[0x02]), Bytes::from_static(&[0x08, 0x01]));
//!
//! assert_eq!(frame.message(), &[0x08, 0x01]);
//! assert_eq!(&frame.payload(true)[..], &[0x02, 0x08, 0x01]);
//! assert_eq!(build_delimited(&[0x08, 0x01]), vec![0x02, 0x08, 0x01]);
//! ```

use bytes::{Bytes, BytesMut};
use serde::Serialize;

use crate::codec::{encode_varint, MAX_VARINT_LEN};

/// A complete message cut from a byte stream.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CompleteFrame {
    /// Varint prefix as received (empty in raw mode).
    length_prefix: Bytes,
    /// Message bytes without the prefix.
    message: Bytes,
}

impl CompleteFrame {
    /// Create a frame from prefix and message.
    pub fn new(length_prefix: Bytes, message: Bytes) -> Self {
        Self {
            length_prefix,
            message,
        }
    }

    /// Create a frame that had no prefix (raw framing).
    pub fn unprefixed(message: Bytes) -> Self {
        Self {
            length_prefix: Bytes::new(),
            message,
        }
    }

    /// Raw message bytes.
    #[inline]
    pub fn message(&self) -> &[u8] {
        &self.message
    }

    #[inline]
    pub fn length_prefix(&self) -> &[u8] {
        &self.length_prefix
    }

    /// Message length.
    #[inline]
    pub fn len(&self) -> usize {
        self.message.len()
    }

    #[inline]
    pub fn is_empty(&self) -> bool {
        self.message.is_empty()
    }

    /// Bytes to decode: prefix and message when `delimited`, else the message.
    pub fn payload(&self, delimited: bool) -> Bytes {
        if !delimited || self.length_prefix.is_empty() {
            return self.message.clone();
        }
        let mut buf = BytesMut::with_capacity(self.length_prefix.len() + self.message.len());
        buf.extend_from_slice(&self.length_prefix);
        buf.extend_from_slice(&self.message);
        buf.freeze()
    }

    /// Hex debug view attached to outgoing items.
    pub fn info(&self) -> FrameInfo {
        FrameInfo {
            msg: hex::encode(&self.message),
            msg_delimited: (!self.length_prefix.is_empty())
                .then(|| hex::encode(self.payload(true))),
            length: self.message.len(),
        }
    }
}

/// Frame debug info: message hex, prefixed hex and length.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct FrameInfo {
    pub msg: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub msg_delimited: Option<String>,
    pub length: usize,
}

/// Prefix `message` with its varint length.
pub fn build_delimited(message: &[u8]) -> Vec<u8> {
    let mut buf = Vec::with_capacity(MAX_VARINT_LEN + message.len());
    encode_varint(message.len() as u64, &mut buf);
    buf.extend_from_slice(message);
    buf
}
