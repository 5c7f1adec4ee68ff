//! Engine client wrapper.
//!
//! Wraps the bollard Docker API client with endpoint resolution, a
//! ping-on-connect health check, and a process-wide pool of clients keyed by
//! endpoint URI. The wrapped client is thread-safe, so pooled instances are
//! shared freely without extra locking.

mod endpoint;
mod settings;

pub use settings::Settings;

use crate::{Error, Result};
use bollard::Docker;
use dashmap::DashMap;
use std::sync::{Arc, LazyLock};
use tracing::{debug, info};
use url::Url;

const CONNECT_TIMEOUT_SECS: u64 = 120;

static SETTINGS: LazyLock<Settings> = LazyLock::new(Settings::discover);

static POOL: LazyLock<DashMap<String, EngineClient>> = LazyLock::new(DashMap::new);

/// Discovered crate settings, cached for the process lifetime.
pub(crate) fn settings() -> &'static Settings {
    &SETTINGS
}

/// A connected engine client bound to one endpoint.
#[derive(Clone)]
pub struct EngineClient {
    docker: Arc<Docker>,
    endpoint: String,
}

impl EngineClient {
    /// Connect using the standard resolution chain, reusing a pooled client
    /// when one exists for the resolved endpoint.
    ///
    /// # Errors
    ///
    /// Returns [`Error::DockerUnavailable`] if the engine cannot be reached.
    pub async fn connect() -> Result<Self> {
        Self::for_endpoint_override(None).await
    }

    /// Connect with an explicit endpoint override ahead of the resolution
    /// chain.
    ///
    /// # Errors
    ///
    /// Returns [`Error::DockerUnavailable`] if the engine cannot be reached.
    pub async fn for_endpoint_override(explicit: Option<&str>) -> Result<Self> {
        let endpoint = endpoint::resolve(explicit, settings());

        if let Some(client) = POOL.get(&endpoint) {
            return Ok(client.clone());
        }

        debug!("Connecting to container engine at {}", endpoint);
        let docker = Self::dial(&endpoint)?;

        let client = Self {
            docker: Arc::new(docker),
            endpoint: endpoint.clone(),
        };

        // Verify connectivity before the client enters the pool.
        client.ping().await?;
        info!("Connected to container engine at {}", endpoint);

        POOL.insert(endpoint, client.clone());
        Ok(client)
    }

    fn dial(endpoint: &str) -> Result<Docker> {
        let result = if endpoint.starts_with("unix://") {
            Docker::connect_with_unix(endpoint, CONNECT_TIMEOUT_SECS, bollard::API_DEFAULT_VERSION)
        } else if endpoint.starts_with("tcp://")
            || endpoint.starts_with("http://")
            || endpoint.starts_with("https://")
        {
            Docker::connect_with_http(endpoint, CONNECT_TIMEOUT_SECS, bollard::API_DEFAULT_VERSION)
        } else {
            Docker::connect_with_local_defaults()
        };

        result.map_err(|e| {
            Error::DockerUnavailable(format!("cannot connect to {}: {}", endpoint, e))
        })
    }

    /// Ping the engine to verify connectivity.
    ///
    /// # Errors
    ///
    /// Returns [`Error::DockerUnavailable`] if the ping fails.
    pub async fn ping(&self) -> Result<()> {
        self.docker.ping().await.map_err(|e| {
            Error::DockerUnavailable(format!("ping to {} failed: {}", self.endpoint, e))
        })?;
        debug!("Engine ping successful");
        Ok(())
    }

    /// The underlying bollard client, for direct API access.
    pub fn docker(&self) -> &Docker {
        &self.docker
    }

    /// The endpoint URI this client is bound to.
    pub fn endpoint(&self) -> &str {
        &self.endpoint
    }

    /// The hostname under which this endpoint's published ports are
    /// reachable: the configured override, the endpoint's host for TCP
    /// endpoints, or `localhost` for socket and pipe transports.
    pub fn host(&self) -> String {
        if let Some(host) = settings().host_override.as_deref() {
            return host.to_string();
        }

        if self.endpoint.starts_with("unix://") || self.endpoint.starts_with("npipe://") {
            return "localhost".to_string();
        }

        Url::parse(&self.endpoint)
            .ok()
            .and_then(|url| url.host_str().map(str::to_string))
            .unwrap_or_else(|| "localhost".to_string())
    }
}

impl std::fmt::Debug for EngineClient {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("EngineClient")
            .field("endpoint", &self.endpoint)
            .finish_non_exhaustive()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn host_for_unix_endpoint_is_localhost() {
        let client = EngineClient {
            docker: Arc::new(Docker::connect_with_local_defaults().unwrap()),
            endpoint: "unix:///var/run/docker.sock".to_string(),
        };
        assert_eq!(client.host(), "localhost");
    }

    #[test]
    fn host_for_tcp_endpoint_is_endpoint_host() {
        let client = EngineClient {
            docker: Arc::new(Docker::connect_with_local_defaults().unwrap()),
            endpoint: "tcp://10.1.2.3:2375".to_string(),
        };
        assert_eq!(client.host(), "10.1.2.3");
    }

    #[tokio::test]
    #[ignore] // Requires a running Docker engine
    async fn connect_and_ping() {
        let client = EngineClient::connect().await.unwrap();
        client.ping().await.unwrap();
    }

    #[tokio::test]
    #[ignore]
    async fn pool_reuses_clients_per_endpoint() {
        let a = EngineClient::connect().await.unwrap();
        let b = EngineClient::connect().await.unwrap();
        assert_eq!(a.endpoint(), b.endpoint());
        assert!(Arc::ptr_eq(&a.docker, &b.docker));
    }
}
