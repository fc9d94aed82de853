//! Error types for protowire.
//!
//! Each layer has its own error enum ([`WireError`] for the binary codec,
//! [`ValidationError`] for message construction, [`ProtocolError`] for stream
//! framing, [`SchemaError`]/[`LoadError`] for the registry, [`IntrospectError`]
//! for schema queries). Stage and node operations surface them through
//! [`PipelineError`].

use std::path::PathBuf;

use thiserror::Error;

use crate::codec::{DynamicMessage, WireType};

/// Failure while reading or writing the binary wire format.
#[derive(Debug, Clone, PartialEq, Error)]
pub enum WireError {
    /// Read past the end of the buffer.
    #[error("index out of range: {position} + {needed} > {length}")]
    Truncated {
        position: usize,
        needed: usize,
        length: usize,
    },

    /// Varint longer than 10 bytes.
    #[error("invalid varint encoding")]
    VarintOverflow,

    /// Wire type 6 or 7.
    #[error("invalid wire type {0}")]
    InvalidWireType(u8),

    /// Tag with field number 0.
    #[error("illegal field number 0")]
    FieldNumberZero,

    /// Known field encoded with an unexpected wire type.
    #[error("field '{field}' expects wire type {expected:?}, found {actual:?}")]
    WireTypeMismatch {
        field: String,
        expected: WireType,
        actual: WireType,
    },

    /// String field holding invalid UTF-8.
    #[error("field '{field}' is not valid UTF-8")]
    InvalidUtf8 { field: String },

    /// Group end tag without a matching start.
    #[error("unexpected end group tag")]
    UnexpectedEndGroup,

    /// Nesting deeper than the recursion limit.
    #[error("max recursion depth exceeded")]
    RecursionLimit,

    /// Field refers to a type missing from the pool.
    #[error("unresolved type '{0}'")]
    UnresolvedType(String),

    /// In-memory value does not match the field kind (encode side).
    #[error("value of field '{field}' does not match its declared type")]
    ValueMismatch { field: String },
}

/// Failure while decoding a complete message.
#[derive(Debug, Clone, PartialEq, Error)]
pub enum DecodeError {
    /// Structurally broken payload.
    #[error(transparent)]
    Wire(#[from] WireError),

    /// Payload decoded but a required field is absent.
    #[error("missing required '{missing}'")]
    MissingRequired {
        missing: String,
        partial: DynamicMessage,
    },
}

/// Failure while building or verifying a message from a canonical object.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ValidationError {
    #[error("{field}: object expected")]
    ObjectExpected { field: String },

    #[error("{field}: array expected")]
    ArrayExpected { field: String },

    #[error("{field}: {expected} expected")]
    InvalidValue {
        field: String,
        expected: &'static str,
    },

    #[error("missing required '{field}'")]
    MissingRequired { field: String },

    #[error("{oneof}: multiple values")]
    MultipleOneofValues { oneof: String },
}

/// Stream framing violation detected by the frame assembler.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ProtocolError {
    /// Length prefix did not terminate within 10 bytes.
    #[error("length prefix exceeds {bytes} bytes")]
    VarintOverflow { bytes: usize },

    /// Announced message length above the configured maximum.
    #[error("message size {length} exceeds maximum {max}")]
    Oversize { length: u64, max: usize },
}

/// Inconsistent descriptor set or failed lookup.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum SchemaError {
    #[error("no such type: {0}")]
    TypeNotFound(String),

    #[error("duplicate name '{0}'")]
    DuplicateType(String),

    #[error("{message}: duplicate field number {number}")]
    DuplicateFieldNumber { message: String, number: u32 },

    #[error("{message}: illegal field number {number}")]
    InvalidFieldNumber { message: String, number: u32 },

    #[error("{message}.{field}: unresolved type '{type_name}'")]
    UnresolvedType {
        message: String,
        field: String,
        type_name: String,
    },

    #[error("{message}.{field}: invalid map key type")]
    InvalidMapKey { message: String, field: String },
}

/// Failure while loading descriptor files.
#[derive(Debug, Error)]
pub enum LoadError {
    #[error("no schema source configured")]
    NoSources,

    #[error("cannot read {}: {source}", path.display())]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("invalid descriptor in {}: {source}", path.display())]
    Json {
        path: PathBuf,
        #[source]
        source: serde_json::Error,
    },

    #[error(transparent)]
    Schema(#[from] SchemaError),
}

/// Failed schema introspection request.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum IntrospectError {
    #[error("Node not found: {0}")]
    NodeNotFound(String),

    #[error("Node not found or proto file not loaded: {0}")]
    SchemaNotLoaded(String),

    #[error("Type not found: {0}")]
    TypeNotFound(String),
}

impl IntrospectError {
    /// HTTP status the host answers with.
    pub fn status_code(&self) -> u16 {
        404
    }
}

/// Main error type for stage and node operations.
///
/// Every variant is per-message: the node that produced it stays usable.
#[derive(Debug, Error)]
pub enum PipelineError {
    /// Neither a configured nor a carried type name.
    #[error("No protobuf type supplied")]
    TypeMissing,

    /// The schema registry has not loaded anything yet.
    #[error("No schema types loaded")]
    SchemaNotReady,

    /// The registry does not know the requested type.
    #[error("Message type '{type_name}' not found")]
    TypeNotFound {
        type_name: String,
        sources: Vec<PathBuf>,
    },

    /// Stream input mode received a payload that is not exactly one byte.
    #[error("Stream input mode expects single byte payloads, got {len} bytes")]
    InvalidStreamInput { len: usize },

    /// Decode input is a structured object instead of bytes.
    #[error("Payload is not binary")]
    PayloadNotBinary,

    /// Malformed binary payload.
    #[error("Wire format invalid: {0}")]
    WireFormatInvalid(#[from] WireError),

    /// Payload decoded only partially.
    #[error("Message incomplete: missing required '{missing}'")]
    MessageIncomplete { missing: String },

    /// Encode input does not satisfy the message type.
    #[error("Message invalid: {0}")]
    MessageInvalid(#[from] ValidationError),

    /// Framing violation in the byte stream.
    #[error("Protocol error: {0}")]
    Protocol(#[from] ProtocolError),

    /// Schema files could not be loaded.
    #[error("Schema load error: {0}")]
    SchemaLoad(#[from] LoadError),

    /// Node configuration could not be parsed.
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    /// Stage channel closed.
    #[error("Channel closed")]
    ChannelClosed,
}

/// Result type alias using PipelineError.
pub type Result<T> = std::result::Result<T, PipelineError>;
