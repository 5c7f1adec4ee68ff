//! Wait-strategy semantics against local stub endpoints.
//!
//! The HTTP status-code policy is an external contract: with no explicit
//! criteria only 200 passes, an explicit set is a membership test, and a set
//! plus a predicate is a union. A stub responder pins the behavior without a
//! container engine.

use berth::wait::{HttpWait, PortWait};
use std::collections::HashMap;
use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::net::TcpListener;

/// Serve fixed HTTP responses per path from an ephemeral port.
async fn stub_responder(routes: HashMap<&'static str, u16>) -> u16 {
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let port = listener.local_addr().unwrap().port();

    tokio::spawn(async move {
        loop {
            let Ok((mut socket, _)) = listener.accept().await else {
                break;
            };
            let routes = routes.clone();
            tokio::spawn(async move {
                let mut buffer = [0u8; 1024];
                let Ok(read) = socket.read(&mut buffer).await else {
                    return;
                };
                let request = String::from_utf8_lossy(&buffer[..read]);
                let path = request
                    .split_whitespace()
                    .nth(1)
                    .unwrap_or("/")
                    .to_string();

                let status = routes.get(path.as_str()).copied().unwrap_or(404);
                let reason = match status {
                    200 => "OK",
                    201 => "Created",
                    202 => "Accepted",
                    418 => "I'm a teapot",
                    _ => "Not Found",
                };
                let response = format!(
                    "HTTP/1.1 {status} {reason}\r\ncontent-length: 0\r\nconnection: close\r\n\r\n"
                );
                let _ = socket.write_all(response.as_bytes()).await;
            });
        }
    });

    port
}

#[tokio::test]
async fn default_policy_accepts_only_200() {
    let port = stub_responder([("/ok", 200), ("/created", 201)].into_iter().collect()).await;

    let ok = HttpWait::new("/ok");
    assert_eq!(ok.probe("127.0.0.1", port).await, Some(200));
    assert!(ok.status_matches(ok.probe("127.0.0.1", port).await.unwrap()));

    let created = HttpWait::new("/created");
    let status = created.probe("127.0.0.1", port).await.unwrap();
    assert_eq!(status, 201);
    assert!(!created.status_matches(status));
}

#[tokio::test]
async fn explicit_status_codes_are_a_membership_test() {
    let port = stub_responder(
        [("/ok", 200), ("/created", 201), ("/accepted", 202)]
            .into_iter()
            .collect(),
    )
    .await;

    let wait = HttpWait::new("/").for_status_code(201).for_status_code(202);

    for (path, expected) in [("/created", true), ("/accepted", true), ("/ok", false)] {
        let probe = HttpWait::new(path);
        let status = probe.probe("127.0.0.1", port).await.unwrap();
        assert_eq!(
            wait.status_matches(status),
            expected,
            "status {status} from {path}"
        );
    }
}

#[tokio::test]
async fn status_codes_and_predicate_match_as_a_union() {
    let port = stub_responder(
        [("/ok", 200), ("/teapot", 418), ("/missing", 404)]
            .into_iter()
            .collect(),
    )
    .await;

    let wait = HttpWait::new("/")
        .for_status_code(200)
        .for_status_matching(|status| status == 418);

    let ok = HttpWait::new("/ok").probe("127.0.0.1", port).await.unwrap();
    let teapot = HttpWait::new("/teapot")
        .probe("127.0.0.1", port)
        .await
        .unwrap();
    let missing = HttpWait::new("/missing")
        .probe("127.0.0.1", port)
        .await
        .unwrap();

    assert!(wait.status_matches(ok), "explicit code must pass");
    assert!(wait.status_matches(teapot), "predicate match must pass");
    assert!(!wait.status_matches(missing), "unmatched status must fail");
}

#[tokio::test]
async fn unreachable_endpoint_probes_as_none() {
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let port = listener.local_addr().unwrap().port();
    drop(listener);

    assert_eq!(HttpWait::new("/").probe("127.0.0.1", port).await, None);
}

#[tokio::test]
async fn port_check_reflects_listener_presence() {
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let port = listener.local_addr().unwrap().port();

    assert!(PortWait::check("127.0.0.1", port).await);
    drop(listener);
    assert!(!PortWait::check("127.0.0.1", port).await);
}
