//! Pooled concurrent queries.
//!
//! Runs a burst of queries through a bounded connection pool; callers
//! beyond the ceiling wait for a connection instead of opening more.
//!
//! ```sh
//! cargo run --example pooled -- ws://127.0.0.1:8000/rpc
//! ```

use std::sync::Arc;

use anyhow::Result;
use serde_json::json;

use meridian_client::{Config, ConnectionPool, PoolOptions};

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
        .init();

    let endpoint = std::env::args()
        .nth(1)
        .unwrap_or_else(|| "ws://127.0.0.1:8000/rpc".to_string());

    let options = PoolOptions::new()
        .with_min_connections(2)
        .with_max_connections(4);
    let pool = Arc::new(ConnectionPool::connect(Config::new(&endpoint), options).await?);

    let tasks: Vec<_> = (0..16)
        .map(|n| {
            let pool = Arc::clone(&pool);
            tokio::spawn(async move {
                pool.execute(|client| async move { client.send("echo", vec![json!(n)]).await })
                    .await
            })
        })
        .collect();

    for task in tasks {
        let value = task.await??;
        println!("reply: {value}");
    }

    println!(
        "done with {} connections ({} idle)",
        pool.total_connections(),
        pool.idle_count()
    );

    pool.close().await;
    Ok(())
}
