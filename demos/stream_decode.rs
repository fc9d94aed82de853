//! Stream decode - feeds an encoded message byte by byte through a decode node.
//!
//! This demo shows:
//! - Loading a JSON descriptor with `SchemaSource`
//! - Encoding an object with `EncodeNode` (length-delimited)
//! - Running a streaming `DecodeNode` in its own task with `spawn_stage`
//!
//! # Running
//!
//! ```text
//! RUST_LOG=protowire=debug cargo run --example stream_decode -- tests/assets/test.json TestType
//! ```

use protowire::node::{spawn_stage, DecodeConfig, DecodeNode, EncodeConfig, EncodeNode};
use protowire::schema::{SchemaConfig, SchemaSource};
use protowire::WorkItem;
use serde_json::json;
use tracing_subscriber::EnvFilter;

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::from_default_env())
        .init();

    let mut args = std::env::args().skip(1);
    let protopath = args.next().unwrap_or_else(|| "tests/assets/test.json".into());
    let proto_type = args.next().unwrap_or_else(|| "TestType".into());

    let source = SchemaSource::open(&SchemaConfig::new(protopath));
    println!("types: {:?}", source.types());

    let mut encoder = EncodeNode::new(
        EncodeConfig::new(proto_type.as_str()).with_delimited(true),
        source.subscribe(),
    );
    let encoded = encoder.handle(WorkItem::object(json!({
        "timestamp": 1533295590569.0,
        "bar": true,
        "test": "streamed"
    })))?;
    let encoded = encoded.first().ok_or("encoder emitted nothing")?;
    println!("encoded: {}", encoded.protobuf_string.as_deref().unwrap_or_default());

    let config = DecodeConfig::new(proto_type)
        .with_delimited(true)
        .with_stream_input(true);
    let node = DecodeNode::new(config, source.subscribe());
    let (out_tx, mut out_rx) = tokio::sync::mpsc::channel(16);
    let (handle, task) = spawn_stage(node, out_tx);

    let bytes = encoded.payload_bytes().cloned().unwrap_or_default();
    for byte in bytes.iter() {
        handle.send(WorkItem::bytes(vec![*byte])).await?;
    }
    drop(handle);

    while let Some(emission) = out_rx.recv().await {
        for (port, item) in emission.items() {
            println!("port {port}: {}", serde_json::to_string(item)?);
        }
    }
    task.await??;

    Ok(())
}
