//! Codec module - protobuf wire format and canonical conversion.
//!
//! This module turns bytes into messages and messages into structured values:
//!
//! - [`encode_varint`] / [`decode_varint`] and friends - varints, zigzag, tags
//! - [`decode_message`] / [`encode_message`] - binary codec driven by a descriptor
//! - [`to_canonical`] / [`from_canonical`] - JSON-shaped representation
//! - [`verify`] - required fields, oneof exclusivity, value kinds
//!
//! # Design
//!
//! Codecs are free functions over a [`DescriptorPool`](crate::schema::DescriptorPool)
//! and a [`MessageDescriptor`](crate::schema::MessageDescriptor). Most callers go
//! through [`MessageType`](crate::schema::MessageType), which bundles both.
//!
//! # Example
//!
//! ```
//! use std::sync::Arc;
//! use protowire::codec::{ConversionOptions, Value};
//! use protowire::schema::{DescriptorPool, FieldDescriptor, MessageDescriptor, ScalarKind};
//!
//! let pool = Arc::new(
//!     DescriptorPool::builder()
//!         .message(
//!             MessageDescriptor::builder("Point")
//!                 .field(FieldDescriptor::scalar("x", 1, ScalarKind::Int32))
//!                 .build(),
//!         )
//!         .build()
//!         .unwrap(),
//! );
//! let point = pool.lookup_type("Point").unwrap();
//!
//! let msg = point.from_canonical(&serde_json::json!({"x": 150}), true).unwrap();
//! let bytes = point.encode(&msg).unwrap();
//! assert_eq!(&bytes[..], &[0x08, 0x96, 0x01]);
//!
//! let decoded = point.decode(&bytes).unwrap();
//! assert_eq!(decoded.get(1), Some(&Value::I32(150)));
//! assert_eq!(
//!     point.to_canonical(&decoded, &ConversionOptions::default()),
//!     serde_json::json!({"x": 150})
//! );
//! ```

mod canonical;
mod construct;
mod decode;
mod encode;
mod value;
mod verify;
mod wire;

pub use canonical::{to_canonical, BytesRepr, ConversionOptions, EnumRepr, LongRepr};
pub use construct::from_canonical;
pub use decode::{decode_message, RECURSION_LIMIT};
pub use encode::encode_message;
pub use value::{DynamicMessage, Value};
pub use verify::{missing_required, verify};
pub use wire::{
    decode_varint, encode_tag, encode_varint, encoded_len_varint, zigzag_decode32,
    zigzag_decode64, zigzag_encode32, zigzag_encode64, WireType, MAX_FIELD_NUMBER, MAX_VARINT_LEN,
};
