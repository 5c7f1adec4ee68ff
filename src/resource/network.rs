//! Network handle.

use crate::client::EngineClient;
use crate::config::NetworkSpec;
use crate::resource::LifecycleState;
use crate::{env, is_gone, reaper, Result};
use std::collections::HashMap;
use tokio::sync::{OnceCell, RwLock};
use tracing::{debug, info};
use uuid::Uuid;

/// An engine-bound network.
///
/// Created explicitly with [`NetworkHandle::create`], or on demand by the
/// first container that attaches to it (which then owns its removal).
pub struct NetworkHandle {
    spec: NetworkSpec,
    name: String,
    id: RwLock<Option<String>>,
    state: RwLock<LifecycleState>,
    client: OnceCell<EngineClient>,
}

impl NetworkHandle {
    pub(crate) fn from_spec(spec: NetworkSpec) -> Self {
        let name = spec
            .name()
            .map(str::to_string)
            .unwrap_or_else(|| format!("{}-net-{}", env::NAME_PREFIX, Uuid::new_v4()));
        Self {
            spec,
            name,
            id: RwLock::new(None),
            state: RwLock::new(LifecycleState::Pending),
            client: OnceCell::new(),
        }
    }

    /// The network name, generated when the specification left it unset.
    pub fn name(&self) -> &str {
        &self.name
    }

    /// The engine-assigned id, once created.
    pub async fn id(&self) -> Option<String> {
        self.id.read().await.clone()
    }

    /// The current lifecycle state.
    pub async fn state(&self) -> LifecycleState {
        *self.state.read().await
    }

    pub(crate) async fn client(&self) -> Result<EngineClient> {
        self.client
            .get_or_try_init(|| EngineClient::for_endpoint_override(self.spec.endpoint.as_deref()))
            .await
            .cloned()
    }

    /// Create the network. Idempotent: a handle that already has an engine
    /// id returns immediately.
    pub async fn create(&self) -> Result<()> {
        if self.id().await.is_some() {
            return Ok(());
        }

        let client = self.client().await?;
        *self.state.write().await = LifecycleState::Creating;
        debug!("Creating network: {}", self.name);

        let mut labels = self.spec.labels.clone();
        if self.spec.cleanup.unwrap_or(true) {
            labels.extend(reaper::session_labels(&reaper::session().id));
        }
        let labels: HashMap<&str, &str> = labels
            .iter()
            .map(|(k, v)| (k.as_str(), v.as_str()))
            .collect();
        let options: HashMap<&str, &str> = self
            .spec
            .options
            .iter()
            .map(|(k, v)| (k.as_str(), v.as_str()))
            .collect();

        let result = client
            .docker()
            .create_network(bollard::network::CreateNetworkOptions {
                name: self.name.as_str(),
                driver: self.spec.driver(),
                enable_ipv6: self.spec.enable_ipv6.unwrap_or(false),
                internal: self.spec.internal.unwrap_or(false),
                options,
                labels,
                ..Default::default()
            })
            .await;

        match result {
            Ok(response) => {
                info!("Created network: {} ({})", self.name, response.id);
                *self.id.write().await = Some(response.id);
                *self.state.write().await = LifecycleState::Created;
                Ok(())
            }
            Err(e) => {
                *self.state.write().await = LifecycleState::Failed;
                Err(e.into())
            }
        }
    }

    /// Remove the network. Idempotent: a missing network counts as removed.
    pub async fn remove(&self) -> Result<()> {
        let Some(id) = self.id().await else {
            *self.state.write().await = LifecycleState::Removed;
            return Ok(());
        };

        let client = self.client().await?;
        debug!("Removing network: {}", self.name);

        match client.docker().remove_network(&id).await {
            Ok(()) => {}
            Err(e) if is_gone(&e) => {
                debug!("Network {} already gone", self.name);
            }
            Err(e) => {
                *self.state.write().await = LifecycleState::Failed;
                return Err(e.into());
            }
        }

        info!("Removed network: {}", self.name);
        *self.id.write().await = None;
        *self.state.write().await = LifecycleState::Removed;
        Ok(())
    }

    /// Whether a network with this name exists on the engine.
    pub async fn exists(&self) -> Result<bool> {
        let client = self.client().await?;
        match client
            .docker()
            .inspect_network(
                &self.name,
                None::<bollard::network::InspectNetworkOptions<String>>,
            )
            .await
        {
            Ok(_) => Ok(true),
            Err(e) if is_gone(&e) => Ok(false),
            Err(e) => Err(e.into()),
        }
    }
}

impl std::fmt::Debug for NetworkHandle {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("NetworkHandle")
            .field("name", &self.name)
            .field("driver", &self.spec.driver())
            .finish_non_exhaustive()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::NetworkBuilder;

    #[test]
    fn generates_name_when_unset() {
        let network = NetworkBuilder::new().build().unwrap();
        assert!(network.name().starts_with("berth-net-"));
    }

    #[test]
    fn keeps_configured_name() {
        let network = NetworkBuilder::new().with_name("backend").build().unwrap();
        assert_eq!(network.name(), "backend");
    }

    #[tokio::test]
    #[ignore] // Requires a running Docker engine
    async fn network_lifecycle() {
        let network = NetworkBuilder::new().build().unwrap();
        network.create().await.unwrap();
        assert!(network.exists().await.unwrap());
        network.remove().await.unwrap();
        assert!(!network.exists().await.unwrap());
    }
}
