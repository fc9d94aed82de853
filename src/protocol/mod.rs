//! Protocol module - stream framing and frame types.
//!
//! This module turns a byte stream into complete protobuf messages:
//! - Length-delimited framing (varint length prefix per message)
//! - Raw framing (message boundaries found by inactivity timeout)
//! - Frame struct with prefix/message accessors and hex debug info

mod assembler;
mod frame;

pub use assembler::{
    AssemblerState, FrameAssembler, DEFAULT_MAX_MESSAGE_SIZE, DEFAULT_STREAM_TIMEOUT,
};
pub use frame::{build_delimited, CompleteFrame, FrameInfo};

/// How messages are delimited on the wire.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum FramingMode {
    /// Each message is one bare payload.
    #[default]
    Raw,
    /// Each message is preceded by its varint length.
    Delimited,
}

impl FramingMode {
    pub fn from_delimited(delimited: bool) -> Self {
        if delimited {
            FramingMode::Delimited
        } else {
            FramingMode::Raw
        }
    }

    pub fn is_delimited(&self) -> bool {
        *self == FramingMode::Delimited
    }
}
