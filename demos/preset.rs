//! Product presets as free functions.
//!
//! A "module" for a specific product is just a function returning a
//! pre-populated builder — configuration plus validation, no subclassing.
//!
//! Run with: cargo run --example preset

use berth::{wait, ContainerBuilder};

/// PostgreSQL preset: image, credentials, port, and readiness checks.
fn postgres(password: &str) -> ContainerBuilder {
    ContainerBuilder::new()
        .with_image("postgres:16-alpine")
        .with_env("POSTGRES_PASSWORD", password)
        .with_random_port_binding(5432)
        .with_wait_strategies([wait::for_exec(["pg_isready", "-U", "postgres"])])
}

/// A preset for an image that requires explicit license acceptance. The
/// check runs at build time, before any engine call.
fn licensed_broker() -> ContainerBuilder {
    ContainerBuilder::new()
        .with_image("vendor/enterprise-broker:4")
        .with_random_port_binding(5672)
        .with_check(|spec| {
            if spec.env().get("ACCEPT_EULA").map(String::as_str) == Some("Y") {
                Ok(())
            } else {
                Err("set ACCEPT_EULA=Y to accept the vendor license".to_string())
            }
        })
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "berth=info".into()),
        )
        .init();

    // The license check rejects an unconfigured build synchronously.
    match licensed_broker().build() {
        Err(e) => println!("license preset rejected as expected: {e}"),
        Ok(_) => println!("unexpected: license preset built without acceptance"),
    }

    let db = postgres("hunter2").build()?;
    db.start().await?;

    let port = db.mapped_port(5432).await?;
    println!("postgres is ready on port {port}");

    let version = db.exec(["psql", "-U", "postgres", "-tAc", "select version()"]).await?;
    println!("server: {}", version.stdout.trim());

    db.dispose().await?;
    berth::reaper::shutdown().await?;
    Ok(())
}
