//! Node configuration.
//!
//! Both configs deserialize from the JSON the host stores for a node
//! (camelCase keys) and offer builder setters for programmatic use.
//!
//! # Example
//!
//! ```
//! use protowire::node::DecodeConfig;
//!
//! let config = DecodeConfig::from_json(
//!     r#"{"protoType": "pkg.Reading", "streamInput": true, "streamTimeout": "250"}"#,
//! ).unwrap();
//! assert!(config.stream_input);
//! assert_eq!(config.stream_timeout, 250);
//! ```

use std::time::Duration;

use serde::{Deserialize, Deserializer};

use crate::codec::{BytesRepr, ConversionOptions, EnumRepr, LongRepr};
use crate::error::Result;
use crate::protocol::{FramingMode, DEFAULT_MAX_MESSAGE_SIZE};
use crate::stage::MAX_OUTPUTS;

/// Default raw-mode inactivity timeout in milliseconds.
pub const DEFAULT_STREAM_TIMEOUT_MS: u64 = 100;

/// Decode node settings.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct DecodeConfig {
    /// Id of the schema node this node reads from.
    pub protofile: String,
    /// Configured message type; empty means "take it from the item".
    pub proto_type: String,
    pub message_delimited: bool,
    /// Payloads are single bytes of a continuous stream.
    pub stream_input: bool,
    /// Raw-mode inactivity timeout in milliseconds.
    #[serde(deserialize_with = "lenient_u64")]
    pub stream_timeout: u64,
    pub decode_longs: LongRepr,
    pub decode_enums: EnumRepr,
    pub decode_bytes: BytesRepr,
    pub decode_defaults: bool,
    pub decode_arrays: bool,
    pub decode_objects: bool,
    pub decode_oneofs: bool,
    pub decode_json: bool,
    pub split_output: bool,
    #[serde(deserialize_with = "lenient_u64")]
    pub outputs: u64,
    /// Largest accepted length prefix in streaming mode.
    pub max_message_size: usize,
}

impl Default for DecodeConfig {
    fn default() -> Self {
        Self {
            protofile: String::new(),
            proto_type: String::new(),
            message_delimited: false,
            stream_input: false,
            stream_timeout: DEFAULT_STREAM_TIMEOUT_MS,
            decode_longs: LongRepr::default(),
            decode_enums: EnumRepr::default(),
            decode_bytes: BytesRepr::default(),
            decode_defaults: false,
            decode_arrays: false,
            decode_objects: false,
            decode_oneofs: false,
            decode_json: false,
            split_output: false,
            outputs: 1,
            max_message_size: DEFAULT_MAX_MESSAGE_SIZE,
        }
    }
}

impl DecodeConfig {
    pub fn new(proto_type: impl Into<String>) -> Self {
        Self {
            proto_type: proto_type.into(),
            ..Self::default()
        }
    }

    /// Parse the host's JSON node configuration.
    pub fn from_json(json: &str) -> Result<Self> {
        Ok(serde_json::from_str(json)?)
    }

    pub fn with_delimited(mut self, delimited: bool) -> Self {
        self.message_delimited = delimited;
        self
    }

    pub fn with_stream_input(mut self, stream_input: bool) -> Self {
        self.stream_input = stream_input;
        self
    }

    pub fn with_stream_timeout(mut self, timeout: Duration) -> Self {
        self.stream_timeout = timeout.as_millis() as u64;
        self
    }

    pub fn with_split_output(mut self, outputs: usize) -> Self {
        self.split_output = true;
        self.outputs = outputs as u64;
        self
    }

    pub fn with_max_message_size(mut self, max_message_size: usize) -> Self {
        self.max_message_size = max_message_size;
        self
    }

    /// Apply all conversion settings at once.
    pub fn with_conversion(mut self, options: ConversionOptions) -> Self {
        self.decode_longs = options.longs;
        self.decode_enums = options.enums;
        self.decode_bytes = options.bytes;
        self.decode_defaults = options.defaults;
        self.decode_arrays = options.arrays;
        self.decode_objects = options.objects;
        self.decode_oneofs = options.oneofs;
        self.decode_json = options.json;
        self
    }

    pub fn framing(&self) -> FramingMode {
        FramingMode::from_delimited(self.message_delimited)
    }

    pub fn conversion_options(&self) -> ConversionOptions {
        ConversionOptions {
            longs: self.decode_longs,
            enums: self.decode_enums,
            bytes: self.decode_bytes,
            defaults: self.decode_defaults,
            arrays: self.decode_arrays,
            objects: self.decode_objects,
            oneofs: self.decode_oneofs,
            json: self.decode_json,
        }
    }

    /// Inactivity timeout; zero is replaced by the default.
    pub fn timeout(&self) -> Duration {
        match self.stream_timeout {
            0 => Duration::from_millis(DEFAULT_STREAM_TIMEOUT_MS),
            ms => Duration::from_millis(ms),
        }
    }

    /// Port count, clamped to `1..=MAX_OUTPUTS`.
    pub fn output_count(&self) -> usize {
        usize::try_from(self.outputs)
            .unwrap_or(MAX_OUTPUTS)
            .clamp(1, MAX_OUTPUTS)
    }
}

/// Encode node settings.
#[derive(Debug, Clone, Default, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct EncodeConfig {
    /// Id of the schema node this node reads from.
    pub protofile: String,
    pub proto_type: String,
    pub message_delimited: bool,
    /// Coerce input values instead of requiring exact shapes.
    pub flexible_input: bool,
}

impl EncodeConfig {
    pub fn new(proto_type: impl Into<String>) -> Self {
        Self {
            proto_type: proto_type.into(),
            ..Self::default()
        }
    }

    pub fn from_json(json: &str) -> Result<Self> {
        Ok(serde_json::from_str(json)?)
    }

    pub fn with_delimited(mut self, delimited: bool) -> Self {
        self.message_delimited = delimited;
        self
    }

    pub fn with_flexible_input(mut self, flexible: bool) -> Self {
        self.flexible_input = flexible;
        self
    }

    pub fn framing(&self) -> FramingMode {
        FramingMode::from_delimited(self.message_delimited)
    }

    pub fn is_strict(&self) -> bool {
        !self.flexible_input
    }
}

/// Accept `100`, `"100"` or an empty string (zero).
fn lenient_u64<'de, D: Deserializer<'de>>(deserializer: D) -> std::result::Result<u64, D::Error> {
    #[derive(Deserialize)]
    #[serde(untagged)]
    enum NumberOrString {
        Number(u64),
        String(String),
    }

    match NumberOrString::deserialize(deserializer)? {
        NumberOrString::Number(n) => Ok(n),
        NumberOrString::String(s) if s.trim().is_empty() => Ok(0),
        NumberOrString::String(s) => s.trim().parse().map_err(serde::de::Error::custom),
    }
}
