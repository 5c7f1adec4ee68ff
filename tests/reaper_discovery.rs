//! Label-based reaper discovery.
//!
//! Every resource created under a session carries that session's label, and
//! a label-equality query returns exactly the live set. Requires a running
//! engine; skipped otherwise.

use berth::{reaper, ContainerBuilder, EngineClient};
use serial_test::serial;
use test_tag::tag;

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
    unsafe { std::env::set_var("BERTH_REAPER_DISABLED", "1") };
}

async fn count_session_containers(client: &EngineClient) -> usize {
    let filters = reaper::session_filter(&reaper::session().id);
    client
        .docker()
        .list_containers(Some(bollard::container::ListContainersOptions {
            all: true,
            filters,
            ..Default::default()
        }))
        .await
        .unwrap()
        .len()
}

#[tokio::test]
#[serial]
#[tag(integration, container, reaper)]
async fn session_label_query_tracks_live_resources() {
    if !should_run_container_tests() {
        eprintln!("Skipping reaper tests (engine not available or SKIP_CONTAINER_TESTS=1)");
        return;
    }
    disable_reaper_sidecar();

    let client = EngineClient::connect().await.unwrap();
    let before = count_session_containers(&client).await;

    let containers: Vec<_> = (0..3)
        .map(|_| {
            ContainerBuilder::new()
                .with_image("alpine:3.20")
                .with_command(["sleep", "infinity"])
                .build()
                .unwrap()
        })
        .collect();

    for container in &containers {
        container.start().await.expect("start failed");
    }

    assert_eq!(count_session_containers(&client).await, before + 3);

    for container in &containers {
        container.dispose().await.unwrap();
    }

    assert_eq!(count_session_containers(&client).await, before);
}

#[tokio::test]
#[serial]
#[tag(integration, container, reaper)]
async fn remove_session_sweeps_labeled_resources() {
    if !should_run_container_tests() {
        eprintln!("Skipping reaper tests");
        return;
    }
    disable_reaper_sidecar();

    let client = EngineClient::connect().await.unwrap();
    let leaked: Vec<_> = (0..2)
        .map(|_| {
            ContainerBuilder::new()
                .with_image("alpine:3.20")
                .with_command(["sleep", "infinity"])
                .build()
                .unwrap()
        })
        .collect();

    for container in &leaked {
        container.start().await.expect("start failed");
    }

    // Simulate a crashed process: nothing is disposed, the sweep runs.
    let removed = berth::reaper::remove_session(&client, &berth::reaper::session().id)
        .await
        .unwrap();
    assert!(removed.containers >= 2);

    assert_eq!(count_session_containers(&client).await, 0);
}

#[tokio::test]
#[serial]
#[tag(integration, container, reaper)]
async fn cleanup_opt_out_skips_the_session_label() {
    if !should_run_container_tests() {
        eprintln!("Skipping reaper tests");
        return;
    }
    disable_reaper_sidecar();

    let client = EngineClient::connect().await.unwrap();
    let before = count_session_containers(&client).await;

    let container = ContainerBuilder::new()
        .with_image("alpine:3.20")
        .with_command(["sleep", "infinity"])
        .with_cleanup(false)
        .build()
        .unwrap();

    container.start().await.expect("start failed");
    assert_eq!(count_session_containers(&client).await, before);

    container.dispose().await.unwrap();
}
