//! Live subscription push events.
//!
//! Signs in, starts a live subscription on a table, and prints every
//! push event for thirty seconds before unsubscribing.
//!
//! ```sh
//! cargo run --example live_select -- ws://127.0.0.1:8000/rpc
//! ```

use std::time::Duration;

use anyhow::Result;

use meridian_client::{Client, Config, Credentials};

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
        .init();

    let endpoint = std::env::args()
        .nth(1)
        .unwrap_or_else(|| "ws://127.0.0.1:8000/rpc".to_string());

    let config = Config::new(&endpoint)
        .with_credentials(Credentials::new("root", "root"))
        .with_namespace("app", "main");
    let client = Client::connect(&config).await?;

    let subscription = client
        .live("sensor", |notification| {
            println!(
                "[{}] {} {}",
                notification.id, notification.action, notification.data
            );
        })
        .await?;
    println!("subscribed as {subscription}; watching for 30s");

    tokio::time::sleep(Duration::from_secs(30)).await;

    client.kill(&subscription).await?;
    client.close();
    Ok(())
}
