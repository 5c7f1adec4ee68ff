//! Start a Redis container, talk to it, and tear it down.
//!
//! Run with: cargo run --example basic

use berth::{wait, ContainerBuilder};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "berth=debug".into()),
        )
        .init();

    let redis = ContainerBuilder::new()
        .with_image("redis:7-alpine")
        .with_random_port_binding(6379)
        .with_wait_strategies([
            wait::for_port(6379),
            wait::for_log("Ready to accept connections")?,
        ])
        .build()?;

    redis.start().await?;

    let host = redis.host().await?;
    let port = redis.mapped_port(6379).await?;
    println!("redis is ready on {host}:{port}");

    let pong = redis.exec(["redis-cli", "ping"]).await?;
    println!("redis-cli ping -> {}", pong.stdout.trim());

    redis.dispose().await?;
    berth::reaper::shutdown().await?;
    Ok(())
}
