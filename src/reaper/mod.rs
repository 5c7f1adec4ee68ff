//! Resource reaper: session labeling and out-of-band garbage collection.
//!
//! Every resource created through a builder carries the current session's
//! label. A garbage-collector sidecar container watches those labels: the
//! process holds a TCP connection to it, and when the connection dies — the
//! test process crashed or exited without cleanup — the sidecar force-removes
//! everything labeled with the registered sessions after its grace period.
//!
//! The sidecar is process-wide state with an explicit lifecycle: it starts
//! lazily with the first labeled resource creation and is torn down by
//! [`shutdown`], which also removes the session's resources directly so a
//! clean exit does not wait on the sidecar. An unreachable sidecar degrades
//! to a logged warning; resource startup proceeds without it.

use crate::client::{self, EngineClient};
use crate::config::{AccessMode, ContainerBuilder};
use crate::resource::ContainerHandle;
use crate::{env, is_gone, wait, Error, Result};
use chrono::{DateTime, Utc};
use std::collections::HashMap;
use std::sync::{Arc, LazyLock};
use std::time::Duration;
use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::net::TcpStream;
use tokio::sync::Mutex;
use tracing::{debug, info, warn};
use url::form_urlencoded;
use uuid::Uuid;

const CONNECT_TIMEOUT: Duration = Duration::from_secs(5);
const ACK_TIMEOUT: Duration = Duration::from_secs(10);

/// A logical grouping of the resources created by one test run.
#[derive(Debug, Clone)]
pub struct Session {
    /// Unique id, embedded in every created resource's labels.
    pub id: Uuid,
    /// When the session began.
    pub started_at: DateTime<Utc>,
}

static SESSION: LazyLock<Session> = LazyLock::new(|| {
    let session = Session {
        id: Uuid::new_v4(),
        started_at: Utc::now(),
    };
    debug!("Session {} started at {}", session.id, session.started_at);
    session
});

/// The process-wide session.
pub fn session() -> &'static Session {
    &SESSION
}

/// The labels marking a resource as belonging to a session.
pub fn session_labels(session_id: &Uuid) -> HashMap<String, String> {
    [(env::SESSION_ID_LABEL.to_string(), session_id.to_string())]
        .into_iter()
        .collect()
}

/// The label equality filter selecting a session's resources.
pub fn session_filter(session_id: &Uuid) -> HashMap<String, Vec<String>> {
    [(
        "label".to_string(),
        vec![format!("{}={}", env::SESSION_ID_LABEL, session_id)],
    )]
    .into_iter()
    .collect()
}

enum ReaperStatus {
    Unstarted,
    Active(Arc<Reaper>),
    Degraded,
}

static REAPER: Mutex<ReaperStatus> = Mutex::const_new(ReaperStatus::Unstarted);

/// Lazily start the process-wide reaper for the current session. Idempotent
/// and safe under concurrent first access.
///
/// An unreachable sidecar degrades to a warning and best-effort cleanup;
/// only an unreachable engine is fatal.
///
/// # Errors
///
/// Returns [`Error::DockerUnavailable`] when connectivity setup itself
/// fails.
pub async fn ensure() -> Result<()> {
    let mut status = REAPER.lock().await;
    match &*status {
        ReaperStatus::Active(_) | ReaperStatus::Degraded => Ok(()),
        ReaperStatus::Unstarted => match Reaper::start(session().id).await {
            Ok(reaper) => {
                *status = ReaperStatus::Active(Arc::new(reaper));
                Ok(())
            }
            Err(e @ Error::DockerUnavailable(_)) => Err(e),
            Err(e) => {
                warn!(
                    "Reaper could not be confirmed reachable, cleanup is best-effort: {}",
                    e
                );
                *status = ReaperStatus::Degraded;
                Ok(())
            }
        },
    }
}

/// The currently active reaper, if one is running.
pub async fn instance() -> Option<Arc<Reaper>> {
    match &*REAPER.lock().await {
        ReaperStatus::Active(reaper) => Some(Arc::clone(reaper)),
        _ => None,
    }
}

/// Tear down the process-wide reaper state and remove the session's
/// resources directly, without waiting on the sidecar's grace period.
///
/// Resets the state so tests can start a fresh reaper afterwards.
pub async fn shutdown() -> Result<()> {
    let previous = {
        let mut status = REAPER.lock().await;
        std::mem::replace(&mut *status, ReaperStatus::Unstarted)
    };

    if let ReaperStatus::Active(reaper) = previous {
        reaper.disconnect().await;
        if let Err(e) = reaper.container.dispose().await {
            warn!("Failed to dispose reaper sidecar: {}", e);
        }
    }

    let client = EngineClient::connect().await?;
    let removed = remove_session(&client, &session().id).await?;
    info!(
        "Session {} cleanup removed {} containers, {} networks, {} volumes",
        session().id,
        removed.containers,
        removed.networks,
        removed.volumes
    );
    Ok(())
}

/// Counts of resources removed by a session sweep.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct RemovedResources {
    /// Containers force-removed.
    pub containers: usize,
    /// Networks removed.
    pub networks: usize,
    /// Volumes force-removed.
    pub volumes: usize,
}

/// Force-remove every resource labeled with the given session id.
pub async fn remove_session(
    client: &EngineClient,
    session_id: &Uuid,
) -> Result<RemovedResources> {
    let filters = session_filter(session_id);
    let mut removed = RemovedResources::default();

    let containers = client
        .docker()
        .list_containers(Some(bollard::container::ListContainersOptions {
            all: true,
            filters: filters.clone(),
            ..Default::default()
        }))
        .await?;
    for container in containers {
        let Some(id) = container.id else { continue };
        match client
            .docker()
            .remove_container(
                &id,
                Some(bollard::container::RemoveContainerOptions {
                    force: true,
                    v: true,
                    ..Default::default()
                }),
            )
            .await
        {
            Ok(()) => removed.containers += 1,
            Err(e) if is_gone(&e) => {}
            Err(e) => return Err(e.into()),
        }
    }

    let networks = client
        .docker()
        .list_networks(Some(bollard::network::ListNetworksOptions {
            filters: filters.clone(),
        }))
        .await?;
    for network in networks {
        let Some(id) = network.id else { continue };
        match client.docker().remove_network(&id).await {
            Ok(()) => removed.networks += 1,
            Err(e) if is_gone(&e) => {}
            Err(e) => return Err(e.into()),
        }
    }

    let volumes = client
        .docker()
        .list_volumes(Some(bollard::volume::ListVolumesOptions { filters }))
        .await?;
    for volume in volumes.volumes.unwrap_or_default() {
        match client
            .docker()
            .remove_volume(
                &volume.name,
                Some(bollard::volume::RemoveVolumeOptions { force: true }),
            )
            .await
        {
            Ok(()) => removed.volumes += 1,
            Err(e) if is_gone(&e) => {}
            Err(e) => return Err(e.into()),
        }
    }

    Ok(removed)
}

/// The garbage-collector sidecar and the connection keeping it on duty.
pub struct Reaper {
    session_id: Uuid,
    container: Arc<ContainerHandle>,
    connection: Mutex<Option<TcpStream>>,
}

impl Reaper {
    /// Start the sidecar container, connect to it, and register the
    /// session's label filter.
    async fn start(session_id: Uuid) -> Result<Self> {
        let settings = client::settings();
        if settings.reaper_disabled {
            return Err(Error::Reaper("reaper is disabled by settings".to_string()));
        }

        // Connectivity problems must surface before the sidecar attempt so
        // they abort instead of degrading.
        let client = EngineClient::connect().await?;

        info!(
            "Starting reaper sidecar {} for session {}",
            settings.reaper_image(),
            session_id
        );

        let container = ContainerBuilder::new()
            .with_image(settings.reaper_image())
            .with_name(format!("{}-reaper-{}", env::NAME_PREFIX, session_id))
            .with_cleanup(false)
            .with_auto_remove(true)
            .with_random_port_binding(env::reaper::PORT)
            .with_bind_mount(
                settings.docker_socket(),
                "/var/run/docker.sock",
                AccessMode::ReadWrite,
            )
            .with_wait_strategies([wait::for_port(env::reaper::PORT)])
            .with_ready_timeout(Duration::from_secs(30))
            .build()?;
        container.start().await?;

        let host = client.host();
        let port = container.mapped_port(env::reaper::PORT).await?;

        let reaper = Self {
            session_id,
            container: Arc::new(container),
            connection: Mutex::new(None),
        };
        reaper.connect_and_register(&host, port).await?;
        info!("Reaper is watching session {}", session_id);
        Ok(reaper)
    }

    /// The session this reaper watches.
    pub fn session_id(&self) -> Uuid {
        self.session_id
    }

    async fn connect_and_register(&self, host: &str, port: u16) -> Result<()> {
        let stream = tokio::time::timeout(CONNECT_TIMEOUT, TcpStream::connect((host, port)))
            .await
            .map_err(|_| Error::Reaper(format!("timed out connecting to {host}:{port}")))?
            .map_err(|e| Error::Reaper(format!("cannot connect to {host}:{port}: {e}")))?;

        let mut stream = stream;
        let filter: String = form_urlencoded::byte_serialize(
            format!("{}={}", env::SESSION_ID_LABEL, self.session_id).as_bytes(),
        )
        .collect();
        let line = format!("label={filter}\n");

        stream.write_all(line.as_bytes()).await.map_err(|e| {
            Error::Reaper(format!("failed to send label filter: {e}"))
        })?;

        let ack = tokio::time::timeout(ACK_TIMEOUT, async {
            let mut response = Vec::new();
            let mut byte = [0u8; 1];
            loop {
                let read = stream.read(&mut byte).await?;
                if read == 0 || byte[0] == b'\n' {
                    break;
                }
                response.push(byte[0]);
            }
            Ok::<Vec<u8>, std::io::Error>(response)
        })
        .await
        .map_err(|_| Error::Reaper("timed out waiting for filter acknowledgement".to_string()))?
        .map_err(|e| Error::Reaper(format!("failed to read acknowledgement: {e}")))?;

        if ack != b"ACK" {
            return Err(Error::Reaper(format!(
                "unexpected acknowledgement: {:?}",
                String::from_utf8_lossy(&ack)
            )));
        }

        // The open connection is the liveness signal: the sidecar prunes the
        // registered sessions once it drops.
        *self.connection.lock().await = Some(stream);
        Ok(())
    }

    async fn disconnect(&self) {
        if self.connection.lock().await.take().is_some() {
            debug!("Closed reaper connection for session {}", self.session_id);
        }
    }
}

impl std::fmt::Debug for Reaper {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Reaper")
            .field("session_id", &self.session_id)
            .finish_non_exhaustive()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn session_labels_carry_the_id() {
        let id = Uuid::new_v4();
        let labels = session_labels(&id);
        assert_eq!(labels[env::SESSION_ID_LABEL], id.to_string());
    }

    #[test]
    fn session_filter_is_a_label_equality_query() {
        let id = Uuid::new_v4();
        let filters = session_filter(&id);
        assert_eq!(
            filters["label"],
            vec![format!("{}={}", env::SESSION_ID_LABEL, id)]
        );
    }

    #[test]
    fn process_session_is_stable() {
        assert_eq!(session().id, session().id);
        assert!(session().started_at <= Utc::now());
    }
}
