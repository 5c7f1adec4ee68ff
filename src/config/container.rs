//! Container specification: the immutable value a builder accumulates.

use crate::config::merge;
use crate::config::mount::{FileMapping, Mount};
use crate::config::ImageRef;
use crate::output::OutputConsumer;
use crate::resource::{ContainerHandle, NetworkHandle};
use crate::wait::WaitStrategy;
use futures::future::BoxFuture;
use std::collections::{HashMap, HashSet};
use std::sync::Arc;
use std::time::Duration;

/// Host side of a port binding.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum HostPort {
    /// Bind to a fixed host port.
    Fixed(u16),
    /// Let the engine assign a free host port; read it back with
    /// [`ContainerHandle::mapped_port`](crate::resource::ContainerHandle::mapped_port).
    Random,
}

/// Async hook invoked after the container starts and before wait strategies
/// are evaluated.
pub type StartupCallback =
    Arc<dyn for<'a> Fn(&'a ContainerHandle) -> BoxFuture<'a, crate::Result<()>> + Send + Sync>;

/// Escape hatch mutating the raw engine create request after translation.
/// Modifiers run last and may override anything.
pub type CreateRequestModifier =
    dyn Fn(&mut bollard::container::Config<String>) + Send + Sync;

/// Credentials for pulling from a private registry.
#[derive(Debug, Clone)]
pub struct RegistryAuth {
    /// Registry server address, e.g. `https://index.docker.io/v1/`.
    pub server: Option<String>,
    /// User name.
    pub username: String,
    /// Password or token.
    pub password: String,
}

impl RegistryAuth {
    pub(crate) fn to_credentials(&self) -> bollard::auth::DockerCredentials {
        bollard::auth::DockerCredentials {
            username: Some(self.username.clone()),
            password: Some(self.password.clone()),
            serveraddress: self.server.clone(),
            ..Default::default()
        }
    }
}

/// Immutable description of a desired container.
///
/// Never mutated after construction; every builder call produces a new
/// specification through [`ContainerSpec::merge`].
#[derive(Clone, Default)]
pub struct ContainerSpec {
    pub(crate) image: Option<ImageRef>,
    pub(crate) name: Option<String>,
    pub(crate) hostname: Option<String>,
    pub(crate) working_dir: Option<String>,
    pub(crate) entrypoint: Vec<String>,
    pub(crate) command: Vec<String>,
    pub(crate) env: HashMap<String, String>,
    pub(crate) labels: HashMap<String, String>,
    pub(crate) exposed_ports: HashSet<String>,
    pub(crate) port_bindings: HashMap<String, HostPort>,
    pub(crate) mounts: Vec<Mount>,
    pub(crate) file_mappings: Vec<FileMapping>,
    pub(crate) networks: Vec<Arc<NetworkHandle>>,
    pub(crate) network_aliases: Vec<String>,
    pub(crate) depends_on: Vec<Arc<ContainerHandle>>,
    pub(crate) output: Option<Arc<dyn OutputConsumer>>,
    pub(crate) wait: Option<Vec<Arc<dyn WaitStrategy>>>,
    pub(crate) startup_callback: Option<StartupCallback>,
    pub(crate) registry_auth: Option<RegistryAuth>,
    pub(crate) auto_remove: Option<bool>,
    pub(crate) privileged: Option<bool>,
    pub(crate) cleanup: Option<bool>,
    pub(crate) endpoint: Option<String>,
    pub(crate) poll_interval: Option<Duration>,
    pub(crate) ready_timeout: Option<Duration>,
    pub(crate) modifiers: Vec<Arc<CreateRequestModifier>>,
}

impl ContainerSpec {
    /// Pairwise merge: newer scalars win, collections concatenate,
    /// dictionaries shallow-merge, and the wait-strategy set, startup
    /// callback, output consumer, and registry auth are replaced as whole
    /// snapshots.
    pub fn merge(old: &Self, new: Self) -> Self {
        let old = old.clone();
        Self {
            image: merge::scalar(old.image, new.image),
            name: merge::scalar(old.name, new.name),
            hostname: merge::scalar(old.hostname, new.hostname),
            working_dir: merge::scalar(old.working_dir, new.working_dir),
            entrypoint: merge::collection(old.entrypoint, new.entrypoint),
            command: merge::collection(old.command, new.command),
            env: merge::map(old.env, new.env),
            labels: merge::map(old.labels, new.labels),
            exposed_ports: merge::set(old.exposed_ports, new.exposed_ports),
            port_bindings: merge::map(old.port_bindings, new.port_bindings),
            mounts: merge::collection(old.mounts, new.mounts),
            file_mappings: merge::collection(old.file_mappings, new.file_mappings),
            networks: merge::collection(old.networks, new.networks),
            network_aliases: merge::collection(old.network_aliases, new.network_aliases),
            depends_on: merge::collection(old.depends_on, new.depends_on),
            output: merge::snapshot(old.output, new.output),
            wait: merge::snapshot(old.wait, new.wait),
            startup_callback: merge::snapshot(old.startup_callback, new.startup_callback),
            registry_auth: merge::snapshot(old.registry_auth, new.registry_auth),
            auto_remove: merge::scalar(old.auto_remove, new.auto_remove),
            privileged: merge::scalar(old.privileged, new.privileged),
            cleanup: merge::scalar(old.cleanup, new.cleanup),
            endpoint: merge::scalar(old.endpoint, new.endpoint),
            poll_interval: merge::scalar(old.poll_interval, new.poll_interval),
            ready_timeout: merge::scalar(old.ready_timeout, new.ready_timeout),
            modifiers: merge::collection(old.modifiers, new.modifiers),
        }
    }

    /// Validate the specification before any engine call.
    pub fn validate(&self) -> crate::Result<()> {
        if self.image.is_none() {
            return Err(crate::Error::Configuration(
                "an image is required; call with_image before build".to_string(),
            ));
        }
        Ok(())
    }

    /// The configured image reference, if any.
    pub fn image(&self) -> Option<&ImageRef> {
        self.image.as_ref()
    }

    /// The configured container name, if any.
    pub fn name(&self) -> Option<&str> {
        self.name.as_deref()
    }

    /// The accumulated entrypoint elements.
    pub fn entrypoint(&self) -> &[String] {
        &self.entrypoint
    }

    /// The accumulated command elements.
    pub fn command(&self) -> &[String] {
        &self.command
    }

    /// The accumulated environment variables.
    pub fn env(&self) -> &HashMap<String, String> {
        &self.env
    }

    /// The accumulated labels.
    pub fn labels(&self) -> &HashMap<String, String> {
        &self.labels
    }

    /// The accumulated port bindings, keyed by normalized container port.
    pub fn port_bindings(&self) -> &HashMap<String, HostPort> {
        &self.port_bindings
    }

    /// The configured wait-strategy set, if one was supplied.
    pub fn wait_strategies(&self) -> Option<&[Arc<dyn WaitStrategy>]> {
        self.wait.as_deref()
    }

    /// Whether the reaper should clean this container up (default true).
    pub fn cleanup(&self) -> bool {
        self.cleanup.unwrap_or(true)
    }
}

impl std::fmt::Debug for ContainerSpec {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ContainerSpec")
            .field("image", &self.image)
            .field("name", &self.name)
            .field("hostname", &self.hostname)
            .field("entrypoint", &self.entrypoint)
            .field("command", &self.command)
            .field("env", &self.env)
            .field("labels", &self.labels)
            .field("exposed_ports", &self.exposed_ports)
            .field("port_bindings", &self.port_bindings)
            .field("mounts", &self.mounts)
            .field("file_mappings", &self.file_mappings.len())
            .field("networks", &self.networks.len())
            .field("depends_on", &self.depends_on.len())
            .field("wait_strategies", &self.wait.as_ref().map(Vec::len))
            .field("auto_remove", &self.auto_remove)
            .field("privileged", &self.privileged)
            .finish_non_exhaustive()
    }
}

/// Normalize a container port to the engine's `port/protocol` form.
pub(crate) fn normalize_port(port: u16) -> String {
    format!("{port}/tcp")
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn merge_prefers_new_scalars() {
        let old = ContainerSpec {
            image: Some(ImageRef::from("redis:6")),
            ..Default::default()
        };
        let new = ContainerSpec {
            image: Some(ImageRef::from("redis:7")),
            ..Default::default()
        };

        let merged = ContainerSpec::merge(&old, new);
        assert_eq!(merged.image().unwrap().to_string(), "redis:7");
    }

    #[test]
    fn merge_overwrites_env_by_key() {
        let old = ContainerSpec {
            env: [("X".to_string(), "1".to_string())].into_iter().collect(),
            ..Default::default()
        };
        let new = ContainerSpec {
            env: [
                ("X".to_string(), "2".to_string()),
                ("Y".to_string(), "3".to_string()),
            ]
            .into_iter()
            .collect(),
            ..Default::default()
        };

        let merged = ContainerSpec::merge(&old, new);
        assert_eq!(merged.env()["X"], "2");
        assert_eq!(merged.env()["Y"], "3");
    }

    #[test]
    fn merge_concatenates_command() {
        let old = ContainerSpec {
            command: vec!["redis-server".to_string()],
            ..Default::default()
        };
        let new = ContainerSpec {
            command: vec!["--appendonly".to_string(), "yes".to_string()],
            ..Default::default()
        };

        let merged = ContainerSpec::merge(&old, new);
        assert_eq!(merged.command, ["redis-server", "--appendonly", "yes"]);
    }

    #[test]
    fn validate_requires_image() {
        let spec = ContainerSpec::default();
        assert!(matches!(
            spec.validate(),
            Err(crate::Error::Configuration(_))
        ));
    }
}
