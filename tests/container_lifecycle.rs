//! End-to-end container lifecycle tests.
//!
//! These require a running Docker (or compatible) engine and are skipped if
//! none is available or SKIP_CONTAINER_TESTS=1.

use berth::config::NetworkBuilder;
use berth::{wait, AccessMode, ContainerBuilder, LifecycleState};
use serial_test::serial;
use std::sync::Arc;
use std::time::Duration;
use test_tag::tag;

/// Check whether container tests should run.
fn should_run_container_tests() -> bool {
    if let Ok(value) = std::env::var("SKIP_CONTAINER_TESTS") {
        if value == "1" || value.eq_ignore_ascii_case("true") {
            return false;
        }
    }

    std::process::Command::new("docker")
        .arg("info")
        .output()
        .map(|o| o.status.success())
        .unwrap_or(false)
}

fn disable_reaper_sidecar() {
    // Labels still apply; only the sidecar container is skipped so tests
    // do not depend on pulling its image.
    unsafe { std::env::set_var("BERTH_REAPER_DISABLED", "1") };
}

#[tokio::test]
#[serial]
#[tag(integration, container)]
async fn container_walks_the_lifecycle() {
    if !should_run_container_tests() {
        eprintln!("Skipping container tests (engine not available or SKIP_CONTAINER_TESTS=1)");
        return;
    }
    disable_reaper_sidecar();

    let container = ContainerBuilder::new()
        .with_image("alpine:3.20")
        .with_command(["sleep", "infinity"])
        .build()
        .unwrap();

    assert_eq!(container.state().await, LifecycleState::Pending);

    container.start().await.expect("start failed");
    assert_eq!(container.state().await, LifecycleState::Running);
    assert!(container.id().await.is_some());

    let output = container.exec(["echo", "hello"]).await.unwrap();
    assert!(output.success());
    assert!(output.stdout.contains("hello"));

    container.dispose().await.unwrap();
    assert_eq!(container.state().await, LifecycleState::Removed);

    // Idempotent: a second disposal of a removed container succeeds.
    container.dispose().await.unwrap();
}

#[tokio::test]
#[serial]
#[tag(integration, container)]
async fn copied_file_round_trips_with_mode() {
    if !should_run_container_tests() {
        eprintln!("Skipping container tests");
        return;
    }
    disable_reaper_sidecar();

    let content = b"listen_addresses = '*'\n".to_vec();
    let container = ContainerBuilder::new()
        .with_image("alpine:3.20")
        .with_command(["sleep", "infinity"])
        .with_bytes(content.clone(), "/etc/app/app.conf", 0o600)
        .build()
        .unwrap();

    container.start().await.expect("start failed");

    let cat = container.exec(["cat", "/etc/app/app.conf"]).await.unwrap();
    assert!(cat.success());
    assert_eq!(cat.stdout.as_bytes(), content.as_slice());

    let stat = container
        .exec(["stat", "-c", "%a", "/etc/app/app.conf"])
        .await
        .unwrap();
    assert!(stat.success());
    assert_eq!(stat.stdout.trim(), "600");

    // Live copy into the running container takes the same path.
    container
        .copy_bytes_to(b"42\n".to_vec(), "/tmp/answer", 0o644)
        .await
        .unwrap();
    let answer = container.exec(["cat", "/tmp/answer"]).await.unwrap();
    assert_eq!(answer.stdout.trim(), "42");

    container.dispose().await.unwrap();
}

#[tokio::test]
#[serial]
#[tag(integration, container, slow)]
async fn wait_strategies_gate_readiness() {
    if !should_run_container_tests() {
        eprintln!("Skipping container tests");
        return;
    }
    disable_reaper_sidecar();

    let container = ContainerBuilder::new()
        .with_image("redis:7-alpine")
        .with_random_port_binding(6379)
        .with_wait_strategies([
            wait::for_port(6379),
            wait::for_log("Ready to accept connections").unwrap(),
        ])
        .with_ready_timeout(Duration::from_secs(60))
        .build()
        .unwrap();

    container.start().await.expect("start failed");

    let port = container.mapped_port(6379).await.unwrap();
    assert_ne!(port, 0);

    let ping = container.exec(["redis-cli", "ping"]).await.unwrap();
    assert!(ping.stdout.contains("PONG"));

    container.dispose().await.unwrap();
}

#[tokio::test]
#[serial]
#[tag(integration, container)]
async fn sibling_containers_share_a_base_builder() {
    if !should_run_container_tests() {
        eprintln!("Skipping container tests");
        return;
    }
    disable_reaper_sidecar();

    let base = ContainerBuilder::new()
        .with_image("alpine:3.20")
        .with_command(["sleep", "infinity"])
        .with_env("ROLE", "base");

    let first = base.with_env("ROLE", "first").build().unwrap();
    let second = base.with_env("ROLE", "second").build().unwrap();

    first.start().await.expect("first start failed");
    second.start().await.expect("second start failed");

    let one = first.exec(["printenv", "ROLE"]).await.unwrap();
    let two = second.exec(["printenv", "ROLE"]).await.unwrap();
    assert_eq!(one.stdout.trim(), "first");
    assert_eq!(two.stdout.trim(), "second");

    first.dispose().await.unwrap();
    second.dispose().await.unwrap();
}

#[tokio::test]
#[serial]
#[tag(integration, container)]
async fn dependencies_start_before_dependents() {
    if !should_run_container_tests() {
        eprintln!("Skipping container tests");
        return;
    }
    disable_reaper_sidecar();

    let upstream = Arc::new(
        ContainerBuilder::new()
            .with_image("alpine:3.20")
            .with_command(["sleep", "infinity"])
            .build()
            .unwrap(),
    );

    let downstream = ContainerBuilder::new()
        .with_image("alpine:3.20")
        .with_command(["sleep", "infinity"])
        .with_depends_on(&upstream)
        .build()
        .unwrap();

    downstream.start().await.expect("start failed");
    assert_eq!(upstream.state().await, LifecycleState::Running);
    assert_eq!(downstream.state().await, LifecycleState::Running);

    downstream.dispose().await.unwrap();
    upstream.dispose().await.unwrap();
}

#[tokio::test]
#[serial]
#[tag(integration, container)]
async fn owned_network_is_created_and_released() {
    if !should_run_container_tests() {
        eprintln!("Skipping container tests");
        return;
    }
    disable_reaper_sidecar();

    let network = Arc::new(NetworkBuilder::new().build().unwrap());

    let container = ContainerBuilder::new()
        .with_image("alpine:3.20")
        .with_command(["sleep", "infinity"])
        .with_network(&network)
        .with_network_alias("app")
        .build()
        .unwrap();

    // The network had no engine id, so the container creates and owns it.
    container.start().await.expect("start failed");
    assert!(network.exists().await.unwrap());

    container.dispose().await.unwrap();
    assert!(!network.exists().await.unwrap());
}

#[tokio::test]
#[serial]
#[tag(integration, container)]
async fn attached_network_is_left_alone() {
    if !should_run_container_tests() {
        eprintln!("Skipping container tests");
        return;
    }
    disable_reaper_sidecar();

    let network = Arc::new(NetworkBuilder::new().build().unwrap());
    network.create().await.unwrap();

    let container = ContainerBuilder::new()
        .with_image("alpine:3.20")
        .with_command(["sleep", "infinity"])
        .with_network(&network)
        .build()
        .unwrap();

    container.start().await.expect("start failed");
    container.dispose().await.unwrap();

    // Externally created: disposal must not remove it.
    assert!(network.exists().await.unwrap());
    network.remove().await.unwrap();
}

#[tokio::test]
#[serial]
#[tag(integration, container)]
async fn disposing_an_externally_removed_container_succeeds() {
    if !should_run_container_tests() {
        eprintln!("Skipping container tests");
        return;
    }
    disable_reaper_sidecar();

    let container = ContainerBuilder::new()
        .with_image("alpine:3.20")
        .with_command(["sleep", "infinity"])
        .build()
        .unwrap();

    container.start().await.expect("start failed");
    let id = container.id().await.unwrap();

    // Remove it out from under the handle.
    let status = std::process::Command::new("docker")
        .args(["rm", "-f", &id])
        .status()
        .unwrap();
    assert!(status.success());

    container.dispose().await.unwrap();
    assert_eq!(container.state().await, LifecycleState::Removed);
}

#[tokio::test]
#[serial]
#[tag(integration, container)]
async fn bind_mounts_expose_host_files() {
    if !should_run_container_tests() {
        eprintln!("Skipping container tests");
        return;
    }
    disable_reaper_sidecar();

    let dir = tempfile::tempdir().unwrap();
    std::fs::write(dir.path().join("fixture.txt"), "from the host\n").unwrap();

    let container = ContainerBuilder::new()
        .with_image("alpine:3.20")
        .with_command(["sleep", "infinity"])
        .with_bind_mount(dir.path(), "/fixtures", AccessMode::ReadOnly)
        .build()
        .unwrap();

    container.start().await.expect("start failed");

    let output = container.exec(["cat", "/fixtures/fixture.txt"]).await.unwrap();
    assert_eq!(output.stdout, "from the host\n");

    container.dispose().await.unwrap();
}
