//! Pipeline nodes and the task runtime that drives them.
//!
//! A node owns its configuration, a [`TypeResolver`](crate::stage::TypeResolver),
//! its stages and a status reporter. Nodes are synchronous; [`spawn_stage`]
//! runs one in a tokio task fed by a channel.

mod config;
mod decode;
mod encode;
mod runtime;
mod status;

pub use config::{DecodeConfig, EncodeConfig, DEFAULT_STREAM_TIMEOUT_MS};
pub use decode::DecodeNode;
pub use encode::EncodeNode;
pub use runtime::{
    spawn_stage, spawn_stage_with_config, RuntimeConfig, Stage, StageHandle,
    DEFAULT_CHANNEL_CAPACITY,
};
pub use status::{NodeStatus, StatusFill, StatusReporter};
