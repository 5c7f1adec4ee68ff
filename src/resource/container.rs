//! Container handle: the stateful wrapper driving one container through its
//! lifecycle.
//!
//! `start` follows a fixed protocol: dependent resources first (networks,
//! volumes, declared dependency containers), then engine create with session
//! labels, file staging, engine start, runtime accessors, the startup
//! callback, and finally the wait strategies. `dispose` is the idempotent
//! inverse; resources that are already gone count as successfully removed.

use crate::archive;
use crate::client::{self, EngineClient};
use crate::config::{
    normalize_port, ContainerSpec, FileMapping, FileSource, HostPort, ImageSpec, MountSource,
};
use crate::output::OutputConsumer;
use crate::resource::exec::{self, ExecOutput, ExecSpec};
use crate::resource::{ImageHandle, LifecycleState, NetworkHandle, VolumeHandle};
use crate::wait::{self, WaitPolicy};
use crate::{env, is_gone, is_not_modified, reaper, Error, Result};
use bollard::service::{EndpointSettings, HostConfig, PortBinding};
use futures::future::BoxFuture;
use futures::stream::StreamExt;
use std::collections::HashMap;
use std::path::Path;
use std::sync::Arc;
use tokio::sync::{Mutex, OnceCell, RwLock};
use tokio::task::JoinHandle;
use tracing::{debug, info, warn};
use uuid::Uuid;

const STOP_TIMEOUT_SECS: i64 = 10;

/// An engine-bound container.
///
/// All operations take `&self`; handles are shared behind `Arc` when other
/// containers depend on them.
pub struct ContainerHandle {
    spec: ContainerSpec,
    state: RwLock<LifecycleState>,
    id: RwLock<Option<String>>,
    name: RwLock<Option<String>>,
    ports: RwLock<HashMap<String, u16>>,
    owned_networks: Mutex<Vec<Arc<NetworkHandle>>>,
    owned_volumes: Mutex<Vec<Arc<VolumeHandle>>>,
    log_pump: Mutex<Option<JoinHandle<()>>>,
    client: OnceCell<EngineClient>,
}

impl ContainerHandle {
    pub(crate) fn from_spec(spec: ContainerSpec) -> Self {
        Self {
            spec,
            state: RwLock::new(LifecycleState::Pending),
            id: RwLock::new(None),
            name: RwLock::new(None),
            ports: RwLock::new(HashMap::new()),
            owned_networks: Mutex::new(Vec::new()),
            owned_volumes: Mutex::new(Vec::new()),
            log_pump: Mutex::new(None),
            client: OnceCell::new(),
        }
    }

    /// The specification this handle was built from.
    pub fn spec(&self) -> &ContainerSpec {
        &self.spec
    }

    /// The current lifecycle state.
    pub async fn state(&self) -> LifecycleState {
        *self.state.read().await
    }

    /// The engine-assigned id, once created.
    pub async fn id(&self) -> Option<String> {
        self.id.read().await.clone()
    }

    /// The container name, assigned at creation.
    pub async fn name(&self) -> Option<String> {
        self.name.read().await.clone()
    }

    /// Whether the handle has reached `Running`.
    pub async fn is_running(&self) -> bool {
        self.state().await == LifecycleState::Running
    }

    async fn client(&self) -> Result<EngineClient> {
        self.client
            .get_or_try_init(|| EngineClient::for_endpoint_override(self.spec.endpoint.as_deref()))
            .await
            .cloned()
    }

    /// The hostname under which this container's published ports are
    /// reachable from the test process.
    pub async fn host(&self) -> Result<String> {
        Ok(self.client().await?.host())
    }

    /// The host port a container port was published on. Populated when the
    /// container starts.
    pub async fn mapped_port(&self, container_port: u16) -> Result<u16> {
        let key = normalize_port(container_port);
        self.ports.read().await.get(&key).copied().ok_or_else(|| {
            Error::Execution(format!(
                "container port {container_port} has no host mapping"
            ))
        })
    }

    fn wait_policy(&self) -> WaitPolicy {
        let mut policy = WaitPolicy::default();
        if let Some(interval) = self.spec.poll_interval {
            policy.poll_interval = interval;
        }
        if let Some(timeout) = self.spec.ready_timeout {
            policy.timeout = timeout;
        }
        policy
    }

    /// Start the container: dependencies, create, file staging, engine
    /// start, runtime accessors, startup callback, wait strategies.
    ///
    /// Idempotent for a handle that is already `Running`. A readiness
    /// timeout leaves the container running so its logs can be inspected.
    pub async fn start(&self) -> Result<()> {
        self.start_boxed().await
    }

    pub(crate) fn start_boxed(&self) -> BoxFuture<'_, Result<()>> {
        Box::pin(async move {
            if self.is_running().await {
                return Ok(());
            }

            let engine = self.client().await?;

            // Dependent resources first: networks, volumes, then declared
            // dependency containers in declaration order.
            for network in &self.spec.networks {
                if network.id().await.is_none() {
                    network.create().await?;
                    self.owned_networks.lock().await.push(Arc::clone(network));
                }
            }
            for mount in &self.spec.mounts {
                if let MountSource::Volume(volume) = &mount.source {
                    if volume.id().await.is_none() {
                        volume.create().await?;
                        self.owned_volumes.lock().await.push(Arc::clone(volume));
                    }
                }
            }
            for dependency in &self.spec.depends_on {
                dependency.start_boxed().await?;
            }

            if self.id().await.is_none() {
                self.create_resource(&engine).await?;
            }
            let id = self.id().await.ok_or_else(|| Error::InvalidState {
                expected: "created".to_string(),
                actual: LifecycleState::Pending.to_string(),
            })?;

            if !self.spec.file_mappings.is_empty() {
                let staged = archive::stage_mappings(&self.spec.file_mappings)?;
                self.upload_archive(&engine, &id, staged).await?;
            }

            *self.state.write().await = LifecycleState::Starting;
            if let Err(e) = engine
                .docker()
                .start_container(
                    &id,
                    None::<bollard::container::StartContainerOptions<String>>,
                )
                .await
            {
                *self.state.write().await = LifecycleState::Failed;
                return Err(e.into());
            }
            debug!("Started container {}", short_id(&id));

            self.refresh_ports(&engine, &id).await?;

            if let Some(consumer) = &self.spec.output {
                self.spawn_log_pump(&engine, &id, Arc::clone(consumer)).await;
            }

            if let Some(callback) = &self.spec.startup_callback {
                callback(self).await?;
            }

            if let Some(strategies) = &self.spec.wait {
                wait::await_ready(self, strategies, self.wait_policy()).await?;
            }

            *self.state.write().await = LifecycleState::Running;
            info!(
                "Container {} is running ({})",
                self.name().await.unwrap_or_default(),
                short_id(&id)
            );
            Ok(())
        })
    }

    async fn create_resource(&self, engine: &EngineClient) -> Result<()> {
        *self.state.write().await = LifecycleState::Creating;

        let image = self.spec.image.clone().ok_or_else(|| {
            Error::Configuration("container specification has no image".to_string())
        })?;

        // Pull through an image handle so registry auth and endpoint
        // overrides apply.
        ImageHandle::from_spec(ImageSpec {
            reference: Some(image.clone()),
            registry_auth: self.spec.registry_auth.clone(),
            endpoint: self.spec.endpoint.clone(),
            ..Default::default()
        })
        .ensure()
        .await?;

        let mut labels = self.spec.labels.clone();
        labels.insert(env::MANAGED_LABEL.to_string(), "true".to_string());
        labels.insert(
            env::VERSION_LABEL.to_string(),
            env!("CARGO_PKG_VERSION").to_string(),
        );

        if self.spec.cleanup() {
            labels.extend(reaper::session_labels(&reaper::session().id));
            if !client::settings().reaper_disabled {
                reaper::ensure().await?;
            }
        }

        let name = self
            .spec
            .name
            .clone()
            .unwrap_or_else(|| format!("{}-{}", env::NAME_PREFIX, Uuid::new_v4()));

        let request = self.to_create_request(&image.canonical(), labels);
        let options = bollard::container::CreateContainerOptions {
            name: name.as_str(),
            ..Default::default()
        };

        debug!("Creating container: {}", name);
        match engine
            .docker()
            .create_container(Some(options), request)
            .await
        {
            Ok(response) => {
                info!("Created container: {} ({})", name, short_id(&response.id));
                *self.id.write().await = Some(response.id);
                *self.name.write().await = Some(name);
                *self.state.write().await = LifecycleState::Created;
                Ok(())
            }
            Err(e) => {
                *self.state.write().await = LifecycleState::Failed;
                Err(e.into())
            }
        }
    }

    /// Translate the specification into the engine's create-request shape.
    /// Registered modifiers run last so they can override anything.
    fn to_create_request(
        &self,
        image: &str,
        labels: HashMap<String, String>,
    ) -> bollard::container::Config<String> {
        let spec = &self.spec;

        let env_vars: Vec<String> = spec
            .env
            .iter()
            .map(|(key, value)| format!("{key}={value}"))
            .collect();

        let mut exposed_ports: HashMap<String, HashMap<(), ()>> = spec
            .exposed_ports
            .iter()
            .map(|port| (port.clone(), HashMap::new()))
            .collect();

        let mut port_bindings: HashMap<String, Option<Vec<PortBinding>>> = HashMap::new();
        for (container_port, host_port) in &spec.port_bindings {
            exposed_ports.entry(container_port.clone()).or_default();
            port_bindings.insert(
                container_port.clone(),
                Some(vec![PortBinding {
                    host_ip: Some("0.0.0.0".to_string()),
                    host_port: Some(match host_port {
                        HostPort::Fixed(port) => port.to_string(),
                        HostPort::Random => "0".to_string(),
                    }),
                }]),
            );
        }

        let mounts: Vec<_> = spec.mounts.iter().map(|m| m.to_engine_mount()).collect();

        let host_config = HostConfig {
            mounts: if mounts.is_empty() { None } else { Some(mounts) },
            port_bindings: if port_bindings.is_empty() {
                None
            } else {
                Some(port_bindings)
            },
            auto_remove: spec.auto_remove,
            privileged: spec.privileged,
            ..Default::default()
        };

        let networking_config = if spec.networks.is_empty() {
            None
        } else {
            let endpoints_config: HashMap<String, EndpointSettings> = spec
                .networks
                .iter()
                .map(|network| {
                    (
                        network.name().to_string(),
                        EndpointSettings {
                            aliases: if spec.network_aliases.is_empty() {
                                None
                            } else {
                                Some(spec.network_aliases.clone())
                            },
                            ..Default::default()
                        },
                    )
                })
                .collect();
            Some(bollard::container::NetworkingConfig { endpoints_config })
        };

        let mut request = bollard::container::Config {
            image: Some(image.to_string()),
            hostname: spec.hostname.clone(),
            working_dir: spec.working_dir.clone(),
            entrypoint: if spec.entrypoint.is_empty() {
                None
            } else {
                Some(spec.entrypoint.clone())
            },
            cmd: if spec.command.is_empty() {
                None
            } else {
                Some(spec.command.clone())
            },
            env: if env_vars.is_empty() {
                None
            } else {
                Some(env_vars)
            },
            labels: Some(labels),
            exposed_ports: if exposed_ports.is_empty() {
                None
            } else {
                Some(exposed_ports)
            },
            host_config: Some(host_config),
            networking_config,
            ..Default::default()
        };

        for modifier in &spec.modifiers {
            modifier(&mut request);
        }
        request
    }

    async fn refresh_ports(&self, engine: &EngineClient, id: &str) -> Result<()> {
        let inspect = engine
            .docker()
            .inspect_container(
                id,
                None::<bollard::query_parameters::InspectContainerOptions>,
            )
            .await?;

        let mut ports = HashMap::new();
        if let Some(port_map) = inspect.network_settings.and_then(|settings| settings.ports) {
            for (container_port, bindings) in port_map {
                let host_port = bindings
                    .into_iter()
                    .flatten()
                    .find_map(|binding| binding.host_port?.parse::<u16>().ok());
                if let Some(host_port) = host_port {
                    ports.insert(container_port, host_port);
                }
            }
        }

        debug!("Mapped ports: {:?}", ports);
        *self.ports.write().await = ports;
        Ok(())
    }

    async fn spawn_log_pump(
        &self,
        engine: &EngineClient,
        id: &str,
        consumer: Arc<dyn OutputConsumer>,
    ) {
        let docker = engine.docker().clone();
        let id = id.to_string();

        let pump = tokio::spawn(async move {
            let mut stream = docker.logs(
                &id,
                Some(bollard::container::LogsOptions {
                    follow: true,
                    stdout: true,
                    stderr: true,
                    tail: "all".to_string(),
                    ..Default::default()
                }),
            );

            while let Some(chunk) = stream.next().await {
                match chunk {
                    Ok(log) => {
                        let text = log.to_string();
                        match log {
                            bollard::container::LogOutput::StdErr { .. } => {
                                consumer.on_stderr(&text);
                            }
                            _ => consumer.on_stdout(&text),
                        }
                    }
                    Err(e) => {
                        debug!("Log stream for {} ended: {}", short_id(&id), e);
                        break;
                    }
                }
            }
        });

        *self.log_pump.lock().await = Some(pump);
    }

    /// Stop the container with the engine's grace period. Already-stopped
    /// and already-gone containers count as stopped.
    pub async fn stop(&self) -> Result<()> {
        let Some(id) = self.id().await else {
            return Ok(());
        };

        let engine = self.client().await?;
        *self.state.write().await = LifecycleState::Stopping;
        debug!("Stopping container {}", short_id(&id));

        match engine
            .docker()
            .stop_container(
                &id,
                Some(bollard::container::StopContainerOptions {
                    t: STOP_TIMEOUT_SECS,
                }),
            )
            .await
        {
            Ok(()) => {}
            Err(e) if is_gone(&e) || is_not_modified(&e) => {
                debug!("Container {} already stopped or gone", short_id(&id));
            }
            Err(e) => {
                *self.state.write().await = LifecycleState::Failed;
                return Err(e.into());
            }
        }

        *self.state.write().await = LifecycleState::Stopped;
        info!("Stopped container {}", short_id(&id));
        Ok(())
    }

    /// Tear the container down: stop, force-remove, then release networks
    /// and volumes this handle created during startup. Externally created
    /// resources that were merely attached are left alone.
    ///
    /// Idempotent; a resource that is already gone counts as removed.
    pub async fn dispose(&self) -> Result<()> {
        if self.state().await == LifecycleState::Removed {
            return Ok(());
        }

        if let Some(pump) = self.log_pump.lock().await.take() {
            pump.abort();
        }

        if let Some(id) = self.id().await {
            let engine = self.client().await?;

            if let Err(e) = self.stop().await {
                warn!("Failed to stop container {}: {}", short_id(&id), e);
            }

            match engine
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
                Ok(()) => info!("Removed container {}", short_id(&id)),
                Err(e) if is_gone(&e) => {
                    debug!("Container {} already gone", short_id(&id));
                }
                Err(e) => {
                    *self.state.write().await = LifecycleState::Failed;
                    return Err(e.into());
                }
            }
        }

        for volume in self.owned_volumes.lock().await.drain(..) {
            volume.remove(true).await?;
        }
        for network in self.owned_networks.lock().await.drain(..) {
            network.remove().await?;
        }

        *self.id.write().await = None;
        self.ports.write().await.clear();
        *self.state.write().await = LifecycleState::Removed;
        Ok(())
    }

    /// Run a one-shot command inside the running container and capture its
    /// output. Does not change lifecycle state.
    ///
    /// # Errors
    ///
    /// Returns [`Error::Execution`] when the container is not `Running`.
    pub async fn exec<I, S>(&self, command: I) -> Result<ExecOutput>
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.exec_with(ExecSpec::command(command)).await
    }

    /// Run a fully configured exec invocation inside the running container.
    pub async fn exec_with(&self, spec: ExecSpec) -> Result<ExecOutput> {
        let state = self.state().await;
        if state != LifecycleState::Running {
            return Err(Error::Execution(format!(
                "cannot exec in a container that is {state}"
            )));
        }
        self.exec_spec_unchecked(spec).await
    }

    /// Exec without the lifecycle gate; used by wait strategies while the
    /// handle is still `Starting`.
    pub(crate) async fn exec_unchecked(&self, command: Vec<String>) -> Result<ExecOutput> {
        self.exec_spec_unchecked(ExecSpec::command(command)).await
    }

    async fn exec_spec_unchecked(&self, spec: ExecSpec) -> Result<ExecOutput> {
        let id = self.id().await.ok_or_else(|| {
            Error::Execution("container has not been created".to_string())
        })?;
        let engine = self.client().await?;
        exec::execute(engine.docker(), &id, &spec).await
    }

    /// Copy a host file into the container filesystem, preserving the given
    /// Unix mode bits.
    pub async fn copy_file_to<T: Into<String>>(
        &self,
        source: &Path,
        target: T,
        mode: u32,
    ) -> Result<()> {
        self.copy_mapping(FileMapping {
            source: FileSource::Path(source.to_path_buf()),
            target: target.into(),
            mode,
        })
        .await
    }

    /// Write bytes into the container filesystem, preserving the given Unix
    /// mode bits.
    pub async fn copy_bytes_to<T: Into<String>>(
        &self,
        content: Vec<u8>,
        target: T,
        mode: u32,
    ) -> Result<()> {
        self.copy_mapping(FileMapping {
            source: FileSource::Bytes(content),
            target: target.into(),
            mode,
        })
        .await
    }

    async fn copy_mapping(&self, mapping: FileMapping) -> Result<()> {
        let id = match self.id().await {
            Some(id) => id,
            None => {
                return Err(Error::InvalidState {
                    expected: "created".to_string(),
                    actual: self.state().await.to_string(),
                });
            }
        };
        let engine = self.client().await?;
        let staged = archive::stage_mappings(std::slice::from_ref(&mapping))?;
        self.upload_archive(&engine, &id, staged).await
    }

    async fn upload_archive(
        &self,
        engine: &EngineClient,
        id: &str,
        staged: Vec<u8>,
    ) -> Result<()> {
        debug!("Uploading {} archive bytes to {}", staged.len(), short_id(id));
        engine
            .docker()
            .upload_to_container(
                id,
                Some(bollard::container::UploadToContainerOptions {
                    path: "/".to_string(),
                    ..Default::default()
                }),
                bollard::body_full(bytes::Bytes::from(staged)),
            )
            .await?;
        Ok(())
    }

    /// Fetch the container's logs.
    pub async fn logs(&self, tail: Option<&str>) -> Result<String> {
        let id = match self.id().await {
            Some(id) => id,
            None => {
                return Err(Error::InvalidState {
                    expected: "created".to_string(),
                    actual: self.state().await.to_string(),
                });
            }
        };
        let engine = self.client().await?;

        let mut stream = engine.docker().logs(
            &id,
            Some(bollard::container::LogsOptions {
                stdout: true,
                stderr: true,
                tail: tail.unwrap_or("all").to_string(),
                ..Default::default()
            }),
        );

        let mut output = String::new();
        while let Some(chunk) = stream.next().await {
            output.push_str(&chunk?.to_string());
        }
        Ok(output)
    }
}

impl std::fmt::Debug for ContainerHandle {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ContainerHandle")
            .field("image", &self.spec.image())
            .field("name", &self.spec.name())
            .finish_non_exhaustive()
    }
}

fn short_id(id: &str) -> &str {
    id.get(..12).unwrap_or(id)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::ContainerBuilder;

    #[tokio::test]
    async fn fresh_handle_is_pending() {
        let container = ContainerBuilder::new()
            .with_image("redis:7")
            .build()
            .unwrap();

        assert_eq!(container.state().await, LifecycleState::Pending);
        assert!(container.id().await.is_none());
    }

    #[tokio::test]
    async fn mapped_port_before_start_fails() {
        let container = ContainerBuilder::new()
            .with_image("redis:7")
            .with_random_port_binding(6379)
            .build()
            .unwrap();

        assert!(matches!(
            container.mapped_port(6379).await,
            Err(Error::Execution(_))
        ));
    }

    #[tokio::test]
    async fn exec_requires_running_state() {
        let container = ContainerBuilder::new()
            .with_image("redis:7")
            .build()
            .unwrap();

        let err = container.exec(["true"]).await.unwrap_err();
        assert!(matches!(err, Error::Execution(_)));
    }

    #[tokio::test]
    async fn dispose_on_pending_handle_is_a_no_op() {
        let container = ContainerBuilder::new()
            .with_image("redis:7")
            .build()
            .unwrap();

        container.dispose().await.unwrap();
        container.dispose().await.unwrap();
        assert_eq!(container.state().await, LifecycleState::Removed);
    }

    #[test]
    fn create_request_translates_spec() {
        let builder = ContainerBuilder::new()
            .with_image("nginx:alpine")
            .with_hostname("web")
            .with_env("MODE", "test")
            .with_exposed_port(8080)
            .with_random_port_binding(80)
            .with_command(["nginx", "-g", "daemon off;"]);
        let container = builder.build().unwrap();

        let request = container.to_create_request("nginx:alpine", HashMap::new());
        assert_eq!(request.image.as_deref(), Some("nginx:alpine"));
        assert_eq!(request.hostname.as_deref(), Some("web"));
        assert!(request.env.unwrap().contains(&"MODE=test".to_string()));

        let exposed = request.exposed_ports.unwrap();
        assert!(exposed.contains_key("8080/tcp"));
        assert!(exposed.contains_key("80/tcp"));

        let bindings = request.host_config.unwrap().port_bindings.unwrap();
        let binding = bindings["80/tcp"].as_ref().unwrap();
        assert_eq!(binding[0].host_port.as_deref(), Some("0"));
    }

    #[test]
    fn create_modifiers_run_last() {
        let container = ContainerBuilder::new()
            .with_image("nginx:alpine")
            .with_hostname("from-spec")
            .with_create_modifier(|request| {
                request.hostname = Some("from-modifier".to_string());
            })
            .build()
            .unwrap();

        let request = container.to_create_request("nginx:alpine", HashMap::new());
        assert_eq!(request.hostname.as_deref(), Some("from-modifier"));
    }
}
