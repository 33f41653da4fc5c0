//! Opens a view over two sources on the in-memory transport, publishes a
//! burst of changes, and prints the materialized snapshot after each flush
//! window.
//!
//! Run with: `cargo run --example live_view`

use std::sync::Arc;
use std::time::Duration;

use serde_json::json;

use vantage_core::{
    open_view, MemTransport, RawObject, SourceId, Transport, ViewConfig, Watchable,
};

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "vantage_core=debug".into()),
        )
        .init();

    let transport = Arc::new(MemTransport::new());
    let sources = Watchable::new(vec![SourceId::from("room-1")]);

    let view = open_view(
        Arc::clone(&transport) as Arc<dyn Transport>,
        sources.clone(),
        ViewConfig::default().with_flush_interval(Duration::from_millis(50)),
    )?;

    publish(&transport, "room-1", "msg-1", json!({"text": "hello"}));
    publish(&transport, "room-1", "msg-2", json!({"text": "world"}));
    // Overwritten within the same window; only the last value survives.
    publish(&transport, "room-1", "msg-2", json!({"text": "world!"}));

    tokio::time::sleep(Duration::from_millis(80)).await;
    println!("after first flush: {:?}", view.values());

    // Grow the source set: room-1 keeps its session, the view resets and
    // rebuilds from both rooms.
    sources.set(vec!["room-1".into(), "room-2".into()]);
    publish(&transport, "room-1", "msg-1", json!({"text": "hello"}));
    publish(&transport, "room-2", "msg-3", json!({"text": "from room 2"}));

    tokio::time::sleep(Duration::from_millis(80)).await;
    println!("after source change: {:?}", view.values());

    tombstone(&transport, "room-1", "msg-1");
    tokio::time::sleep(Duration::from_millis(80)).await;
    println!("after delete: {:?}", view.values());

    println!("metrics: {:?}", view.metrics());
    view.dispose();
    Ok(())
}

fn publish(transport: &MemTransport, source: &str, key: &str, value: serde_json::Value) {
    transport.publish(
        &SourceId::from(source),
        RawObject {
            key: key.into(),
            deleted: false,
            value: Some(value),
        },
    );
}

fn tombstone(transport: &MemTransport, source: &str, key: &str) {
    transport.publish(
        &SourceId::from(source),
        RawObject {
            key: key.into(),
            deleted: true,
            value: None,
        },
    );
}
