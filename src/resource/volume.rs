//! Volume handle.

use crate::client::EngineClient;
use crate::config::VolumeSpec;
use crate::resource::LifecycleState;
use crate::{env, is_gone, reaper, Result};
use std::collections::HashMap;
use tokio::sync::{OnceCell, RwLock};
use tracing::{debug, info};
use uuid::Uuid;

/// An engine-bound volume.
///
/// Volumes are keyed by name; the name doubles as the engine id once the
/// volume exists.
pub struct VolumeHandle {
    spec: VolumeSpec,
    name: String,
    created: RwLock<bool>,
    state: RwLock<LifecycleState>,
    client: OnceCell<EngineClient>,
}

impl VolumeHandle {
    pub(crate) fn from_spec(spec: VolumeSpec) -> Self {
        let name = spec
            .name()
            .map(str::to_string)
            .unwrap_or_else(|| format!("{}-vol-{}", env::NAME_PREFIX, Uuid::new_v4()));
        Self {
            spec,
            name,
            created: RwLock::new(false),
            state: RwLock::new(LifecycleState::Pending),
            client: OnceCell::new(),
        }
    }

    /// The volume name, generated when the specification left it unset.
    pub fn name(&self) -> &str {
        &self.name
    }

    /// The engine identifier, present once the volume has been created.
    pub async fn id(&self) -> Option<String> {
        if *self.created.read().await {
            Some(self.name.clone())
        } else {
            None
        }
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

    /// Create the volume. Idempotent: an already-created handle returns
    /// immediately.
    pub async fn create(&self) -> Result<()> {
        if *self.created.read().await {
            return Ok(());
        }

        let client = self.client().await?;
        *self.state.write().await = LifecycleState::Creating;
        debug!("Creating volume: {}", self.name);

        let mut labels = self.spec.labels.clone();
        if self.spec.cleanup.unwrap_or(true) {
            labels.extend(reaper::session_labels(&reaper::session().id));
        }
        let labels: HashMap<&str, &str> = labels
            .iter()
            .map(|(k, v)| (k.as_str(), v.as_str()))
            .collect();
        let driver_opts: HashMap<&str, &str> = self
            .spec
            .driver_opts
            .iter()
            .map(|(k, v)| (k.as_str(), v.as_str()))
            .collect();

        let result = client
            .docker()
            .create_volume(bollard::volume::CreateVolumeOptions {
                name: self.name.as_str(),
                driver: self.spec.driver(),
                driver_opts,
                labels,
            })
            .await;

        match result {
            Ok(response) => {
                info!("Created volume: {}", response.name);
                *self.created.write().await = true;
                *self.state.write().await = LifecycleState::Created;
                Ok(())
            }
            Err(e) => {
                *self.state.write().await = LifecycleState::Failed;
                Err(e.into())
            }
        }
    }

    /// Remove the volume. Idempotent: a missing volume counts as removed.
    pub async fn remove(&self, force: bool) -> Result<()> {
        if !*self.created.read().await {
            *self.state.write().await = LifecycleState::Removed;
            return Ok(());
        }

        let client = self.client().await?;
        debug!("Removing volume: {}", self.name);

        match client
            .docker()
            .remove_volume(&self.name, Some(bollard::volume::RemoveVolumeOptions { force }))
            .await
        {
            Ok(()) => {}
            Err(e) if is_gone(&e) => {
                debug!("Volume {} already gone", self.name);
            }
            Err(e) => {
                *self.state.write().await = LifecycleState::Failed;
                return Err(e.into());
            }
        }

        info!("Removed volume: {}", self.name);
        *self.created.write().await = false;
        *self.state.write().await = LifecycleState::Removed;
        Ok(())
    }

    /// Whether a volume with this name exists on the engine.
    pub async fn exists(&self) -> Result<bool> {
        let client = self.client().await?;
        match client.docker().inspect_volume(&self.name).await {
            Ok(_) => Ok(true),
            Err(e) if is_gone(&e) => Ok(false),
            Err(e) => Err(e.into()),
        }
    }
}

impl std::fmt::Debug for VolumeHandle {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("VolumeHandle")
            .field("name", &self.name)
            .field("driver", &self.spec.driver())
            .finish_non_exhaustive()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::VolumeBuilder;

    #[test]
    fn generates_name_when_unset() {
        let volume = VolumeBuilder::new().build().unwrap();
        assert!(volume.name().starts_with("berth-vol-"));
    }

    #[tokio::test]
    #[ignore] // Requires a running Docker engine
    async fn volume_lifecycle() {
        let volume = VolumeBuilder::new().build().unwrap();
        volume.create().await.unwrap();
        assert!(volume.exists().await.unwrap());
        volume.remove(true).await.unwrap();
        assert!(!volume.exists().await.unwrap());
    }
}
