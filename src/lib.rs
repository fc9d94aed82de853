//! # protowire
//!
//! Streaming protobuf decode/encode stages for dataflow pipelines.
//!
//! A decode node turns binary payloads, whole or arriving one byte at a time,
//! into structured objects; an encode node does the reverse. Types are
//! resolved by name against a schema that can be reloaded while nodes run.
//!
//! ## Architecture
//!
//! - **Schema** ([`schema`]): descriptor pool, JSON descriptor loading, reload publication
//! - **Codec** ([`codec`]): dynamic wire codec and canonical object conversion
//! - **Protocol** ([`protocol`]): frame assembly for delimited and raw byte streams
//! - **Stages** ([`stage`]): type resolution, decoding, encoding, output routing
//! - **Nodes** ([`node`]): configured stage chains, status reporting, task runtime
//!
//! ## Example
//!
//! ```ignore
//! use protowire::node::{spawn_stage, DecodeConfig, DecodeNode};
//! use protowire::schema::{SchemaConfig, SchemaSource};
//! use protowire::WorkItem;
//!
//! #[tokio::main]
//! async fn main() {
//!     let source = SchemaSource::open(&SchemaConfig::new("schemas/reading.json"));
//!     let config = DecodeConfig::new("telemetry.Reading").with_stream_input(true);
//!     let node = DecodeNode::new(config, source.subscribe());
//!
//!     let (out_tx, mut out_rx) = tokio::sync::mpsc::channel(64);
//!     let (handle, _task) = spawn_stage(node, out_tx);
//!
//!     for byte in [0x08, 0x96, 0x01] {
//!         handle.send(WorkItem::bytes(vec![byte])).await.unwrap();
//!     }
//!     let emission = out_rx.recv().await.unwrap();
//!     println!("{:?}", emission.first());
//! }
//! ```

pub mod codec;
pub mod error;
pub mod introspect;
pub mod node;
pub mod protocol;
pub mod schema;
pub mod stage;

mod item;

pub use error::{PipelineError, Result};
pub use introspect::{format_type_definition, FieldSummary, SchemaDirectory};
pub use item::{Emission, Payload, WorkItem};
pub use node::{DecodeConfig, DecodeNode, EncodeConfig, EncodeNode, NodeStatus};
pub use schema::{DescriptorPool, MessageType, SchemaHandle, SchemaSource};
