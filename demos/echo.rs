//! Minimal request/reply exchange.
//!
//! Connects to a running Meridian server, round-trips one value, and
//! closes the connection.
//!
//! ```sh
//! cargo run --example echo -- ws://127.0.0.1:8000/rpc
//! ```

use anyhow::Result;
use serde_json::json;

use meridian_client::{Client, Config};

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
        .init();

    let endpoint = std::env::args()
        .nth(1)
        .unwrap_or_else(|| "ws://127.0.0.1:8000/rpc".to_string());

    let client = Client::connect(&Config::new(&endpoint)).await?;

    let value = client.send("echo", vec![json!(42)]).await?;
    println!("echo -> {value}");

    let rows = client.query("SELECT * FROM sensor").await?;
    println!("query -> {rows}");

    client.close();
    Ok(())
}
