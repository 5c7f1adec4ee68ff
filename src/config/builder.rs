//! The generic fluent builder.
//!
//! One builder type serves every resource kind: it is parameterized over a
//! specification value and constructs its handle through the factory
//! registry. Product-specific builders are configuration presets (free
//! functions returning a pre-populated builder), not subclasses; extra
//! product validations attach with [`Builder::with_check`].

use crate::config::container::{
    normalize_port, ContainerSpec, CreateRequestModifier, HostPort, RegistryAuth, StartupCallback,
};
use crate::config::mount::{AccessMode, FileMapping, FileSource, Mount, MountSource};
use crate::config::{ImageRef, ImageSpec, NetworkSpec, VolumeSpec};
use crate::output::OutputConsumer;
use crate::resource::{
    registry, ContainerHandle, ImageHandle, NetworkHandle, ResourceKind, VolumeHandle,
};
use crate::wait::WaitStrategy;
use futures::future::BoxFuture;
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

/// A resource specification usable by the generic [`Builder`].
///
/// Implemented by the four built-in specification types; the associated
/// constant routes `build()` through the factory registry.
pub trait Spec: Clone + Default + sealed::Sealed {
    /// The handle type `build()` produces.
    type Handle;

    /// The registry tag of this resource kind.
    const KIND: ResourceKind;

    /// Pairwise merge, newer fields taking precedence per the combinator
    /// rules.
    fn merge(old: &Self, new: Self) -> Self;

    /// Validation run by `build()` before any engine call.
    fn validate(&self) -> crate::Result<()>;

    /// Construct the handle through the factory registry.
    fn construct(self) -> Self::Handle;
}

mod sealed {
    pub trait Sealed {}
    impl Sealed for super::ContainerSpec {}
    impl Sealed for super::NetworkSpec {}
    impl Sealed for super::VolumeSpec {}
    impl Sealed for super::ImageSpec {}
}

impl Spec for ContainerSpec {
    type Handle = ContainerHandle;
    const KIND: ResourceKind = ResourceKind::Container;

    fn merge(old: &Self, new: Self) -> Self {
        ContainerSpec::merge(old, new)
    }

    fn validate(&self) -> crate::Result<()> {
        ContainerSpec::validate(self)
    }

    fn construct(self) -> Self::Handle {
        (registry().container)(self)
    }
}

impl Spec for NetworkSpec {
    type Handle = NetworkHandle;
    const KIND: ResourceKind = ResourceKind::Network;

    fn merge(old: &Self, new: Self) -> Self {
        NetworkSpec::merge(old, new)
    }

    fn validate(&self) -> crate::Result<()> {
        NetworkSpec::validate(self)
    }

    fn construct(self) -> Self::Handle {
        (registry().network)(self)
    }
}

impl Spec for VolumeSpec {
    type Handle = VolumeHandle;
    const KIND: ResourceKind = ResourceKind::Volume;

    fn merge(old: &Self, new: Self) -> Self {
        VolumeSpec::merge(old, new)
    }

    fn validate(&self) -> crate::Result<()> {
        VolumeSpec::validate(self)
    }

    fn construct(self) -> Self::Handle {
        (registry().volume)(self)
    }
}

impl Spec for ImageSpec {
    type Handle = ImageHandle;
    const KIND: ResourceKind = ResourceKind::Image;

    fn merge(old: &Self, new: Self) -> Self {
        ImageSpec::merge(old, new)
    }

    fn validate(&self) -> crate::Result<()> {
        ImageSpec::validate(self)
    }

    fn construct(self) -> Self::Handle {
        (registry().image)(self)
    }
}

type Check<S> = Arc<dyn Fn(&S) -> Result<(), String> + Send + Sync>;

/// Fluent, immutable resource builder.
///
/// Every `with_*` method validates its arguments locally and returns a new
/// builder wrapping the merged specification; the receiver is never mutated.
/// Two builders derived from the same base never observe each other's later
/// changes, so a partially configured builder can produce siblings:
///
/// ```rust
/// use berth::ContainerBuilder;
///
/// let base = ContainerBuilder::new().with_image("nginx:alpine");
/// let http = base.with_port_binding(8080, 80).build().unwrap();
/// let https = base.with_port_binding(8443, 443).build().unwrap();
/// ```
#[derive(Clone)]
pub struct Builder<S: Spec> {
    spec: S,
    checks: Vec<Check<S>>,
}

/// Builds [`ContainerHandle`]s.
pub type ContainerBuilder = Builder<ContainerSpec>;

/// Builds [`NetworkHandle`]s.
pub type NetworkBuilder = Builder<NetworkSpec>;

/// Builds [`VolumeHandle`]s.
pub type VolumeBuilder = Builder<VolumeSpec>;

/// Builds [`ImageHandle`]s.
pub type ImageBuilder = Builder<ImageSpec>;

impl<S: Spec> Default for Builder<S> {
    fn default() -> Self {
        Self::new()
    }
}

impl<S: Spec> Builder<S> {
    /// Create an empty builder.
    pub fn new() -> Self {
        Self {
            spec: S::default(),
            checks: Vec::new(),
        }
    }

    /// Create a builder pre-populated with the given specification.
    pub fn from_spec(spec: S) -> Self {
        Self {
            spec,
            checks: Vec::new(),
        }
    }

    /// The specification accumulated so far.
    pub fn spec(&self) -> &S {
        &self.spec
    }

    /// Attach an extra validation run by [`Builder::build`], e.g. a product
    /// preset requiring a license-acceptance environment variable.
    pub fn with_check<F>(&self, check: F) -> Self
    where
        F: Fn(&S) -> Result<(), String> + Send + Sync + 'static,
    {
        let mut checks = self.checks.clone();
        checks.push(Arc::new(check));
        Self {
            spec: self.spec.clone(),
            checks,
        }
    }

    /// Validate the accumulated specification and construct the handle.
    ///
    /// Fails with [`Error::Configuration`](crate::Error::Configuration) before
    /// any engine call when validation fails.
    pub fn build(&self) -> crate::Result<S::Handle> {
        self.spec.validate()?;
        for check in &self.checks {
            check(&self.spec).map_err(crate::Error::Configuration)?;
        }
        Ok(self.spec.clone().construct())
    }

    fn overlay(&self, next: S) -> Self {
        Self {
            spec: S::merge(&self.spec, next),
            checks: self.checks.clone(),
        }
    }
}

impl Builder<ContainerSpec> {
    /// Set the container image.
    pub fn with_image<I: Into<ImageRef>>(&self, image: I) -> Self {
        self.overlay(ContainerSpec {
            image: Some(image.into()),
            ..Default::default()
        })
    }

    /// Set the container name.
    pub fn with_name<N: Into<String>>(&self, name: N) -> Self {
        self.overlay(ContainerSpec {
            name: Some(name.into()),
            ..Default::default()
        })
    }

    /// Set the hostname inside the container.
    pub fn with_hostname<H: Into<String>>(&self, hostname: H) -> Self {
        self.overlay(ContainerSpec {
            hostname: Some(hostname.into()),
            ..Default::default()
        })
    }

    /// Set the working directory inside the container.
    pub fn with_working_dir<D: Into<String>>(&self, dir: D) -> Self {
        self.overlay(ContainerSpec {
            working_dir: Some(dir.into()),
            ..Default::default()
        })
    }

    /// Append entrypoint elements.
    pub fn with_entrypoint<I, T>(&self, entrypoint: I) -> Self
    where
        I: IntoIterator<Item = T>,
        T: Into<String>,
    {
        self.overlay(ContainerSpec {
            entrypoint: entrypoint.into_iter().map(Into::into).collect(),
            ..Default::default()
        })
    }

    /// Append command elements.
    pub fn with_command<I, T>(&self, command: I) -> Self
    where
        I: IntoIterator<Item = T>,
        T: Into<String>,
    {
        self.overlay(ContainerSpec {
            command: command.into_iter().map(Into::into).collect(),
            ..Default::default()
        })
    }

    /// Add an environment variable. A later binding for the same key wins.
    pub fn with_env<K: Into<String>, V: Into<String>>(&self, key: K, value: V) -> Self {
        self.overlay(ContainerSpec {
            env: [(key.into(), value.into())].into_iter().collect(),
            ..Default::default()
        })
    }

    /// Add multiple environment variables.
    pub fn with_envs<I, K, V>(&self, envs: I) -> Self
    where
        I: IntoIterator<Item = (K, V)>,
        K: Into<String>,
        V: Into<String>,
    {
        self.overlay(ContainerSpec {
            env: envs
                .into_iter()
                .map(|(k, v)| (k.into(), v.into()))
                .collect(),
            ..Default::default()
        })
    }

    /// Add a label.
    pub fn with_label<K: Into<String>, V: Into<String>>(&self, key: K, value: V) -> Self {
        self.overlay(ContainerSpec {
            labels: [(key.into(), value.into())].into_iter().collect(),
            ..Default::default()
        })
    }

    /// Expose a container port without publishing it to the host.
    pub fn with_exposed_port(&self, port: u16) -> Self {
        self.overlay(ContainerSpec {
            exposed_ports: [normalize_port(port)].into_iter().collect(),
            ..Default::default()
        })
    }

    /// Publish a container port on a fixed host port.
    pub fn with_port_binding(&self, host_port: u16, container_port: u16) -> Self {
        self.overlay(ContainerSpec {
            port_bindings: [(normalize_port(container_port), HostPort::Fixed(host_port))]
                .into_iter()
                .collect(),
            ..Default::default()
        })
    }

    /// Publish a container port on an engine-assigned free host port; read
    /// the assignment back with
    /// [`ContainerHandle::mapped_port`](crate::resource::ContainerHandle::mapped_port).
    pub fn with_random_port_binding(&self, container_port: u16) -> Self {
        self.overlay(ContainerSpec {
            port_bindings: [(normalize_port(container_port), HostPort::Random)]
                .into_iter()
                .collect(),
            ..Default::default()
        })
    }

    /// Bind-mount a host path into the container.
    pub fn with_bind_mount<P: Into<PathBuf>, T: Into<String>>(
        &self,
        source: P,
        target: T,
        access: AccessMode,
    ) -> Self {
        self.overlay(ContainerSpec {
            mounts: vec![Mount {
                source: MountSource::Bind(source.into()),
                target: target.into(),
                access,
            }],
            ..Default::default()
        })
    }

    /// Mount a volume into the container. A volume handle without an engine
    /// id is created during startup and owned (and removed) by this
    /// container; an already-created one is attached and left alone on
    /// disposal.
    pub fn with_volume_mount<T: Into<String>>(
        &self,
        volume: &Arc<VolumeHandle>,
        target: T,
        access: AccessMode,
    ) -> Self {
        self.overlay(ContainerSpec {
            mounts: vec![Mount {
                source: MountSource::Volume(Arc::clone(volume)),
                target: target.into(),
                access,
            }],
            ..Default::default()
        })
    }

    /// Copy a host file into the container filesystem before start,
    /// preserving the given Unix mode bits.
    pub fn with_file<P: Into<PathBuf>, T: Into<String>>(
        &self,
        source: P,
        target: T,
        mode: u32,
    ) -> Self {
        self.overlay(ContainerSpec {
            file_mappings: vec![FileMapping {
                source: FileSource::Path(source.into()),
                target: target.into(),
                mode,
            }],
            ..Default::default()
        })
    }

    /// Write the given bytes into the container filesystem before start,
    /// preserving the given Unix mode bits.
    pub fn with_bytes<B: Into<Vec<u8>>, T: Into<String>>(
        &self,
        content: B,
        target: T,
        mode: u32,
    ) -> Self {
        self.overlay(ContainerSpec {
            file_mappings: vec![FileMapping {
                source: FileSource::Bytes(content.into()),
                target: target.into(),
                mode,
            }],
            ..Default::default()
        })
    }

    /// Attach the container to a network. A network handle without an engine
    /// id is created during startup and owned (and removed) by this
    /// container.
    pub fn with_network(&self, network: &Arc<NetworkHandle>) -> Self {
        self.overlay(ContainerSpec {
            networks: vec![Arc::clone(network)],
            ..Default::default()
        })
    }

    /// Add a network alias under which this container is reachable on its
    /// attached networks.
    pub fn with_network_alias<A: Into<String>>(&self, alias: A) -> Self {
        self.overlay(ContainerSpec {
            network_aliases: vec![alias.into()],
            ..Default::default()
        })
    }

    /// Declare a dependency: the given container is started and waited for
    /// before this one starts.
    pub fn with_depends_on(&self, dependency: &Arc<ContainerHandle>) -> Self {
        self.overlay(ContainerSpec {
            depends_on: vec![Arc::clone(dependency)],
            ..Default::default()
        })
    }

    /// Set the sink receiving the container's stdout/stderr.
    pub fn with_output_consumer<C: OutputConsumer>(&self, consumer: C) -> Self {
        self.overlay(ContainerSpec {
            output: Some(Arc::new(consumer)),
            ..Default::default()
        })
    }

    /// Replace the wait-strategy set evaluated after start. The set is a
    /// snapshot: a later call replaces the whole set rather than appending.
    pub fn with_wait_strategies<I>(&self, strategies: I) -> Self
    where
        I: IntoIterator<Item = Arc<dyn WaitStrategy>>,
    {
        self.overlay(ContainerSpec {
            wait: Some(strategies.into_iter().collect()),
            ..Default::default()
        })
    }

    /// Set the async hook invoked after start and before wait strategies.
    pub fn with_startup_callback<F>(&self, callback: F) -> Self
    where
        F: for<'a> Fn(&'a ContainerHandle) -> BoxFuture<'a, crate::Result<()>>
            + Send
            + Sync
            + 'static,
    {
        self.overlay(ContainerSpec {
            startup_callback: Some(Arc::new(callback) as StartupCallback),
            ..Default::default()
        })
    }

    /// Set credentials for pulling the image from a private registry.
    pub fn with_registry_auth(&self, auth: RegistryAuth) -> Self {
        self.overlay(ContainerSpec {
            registry_auth: Some(auth),
            ..Default::default()
        })
    }

    /// Ask the engine to remove the container as soon as it exits.
    pub fn with_auto_remove(&self, auto_remove: bool) -> Self {
        self.overlay(ContainerSpec {
            auto_remove: Some(auto_remove),
            ..Default::default()
        })
    }

    /// Run the container in privileged mode.
    pub fn with_privileged(&self, privileged: bool) -> Self {
        self.overlay(ContainerSpec {
            privileged: Some(privileged),
            ..Default::default()
        })
    }

    /// Opt out of reaper cleanup for this container.
    pub fn with_cleanup(&self, cleanup: bool) -> Self {
        self.overlay(ContainerSpec {
            cleanup: Some(cleanup),
            ..Default::default()
        })
    }

    /// Override the engine endpoint for this container.
    pub fn with_docker_endpoint<E: Into<String>>(&self, endpoint: E) -> Self {
        self.overlay(ContainerSpec {
            endpoint: Some(endpoint.into()),
            ..Default::default()
        })
    }

    /// Override the interval between wait-strategy polls.
    pub fn with_poll_interval(&self, interval: Duration) -> Self {
        self.overlay(ContainerSpec {
            poll_interval: Some(interval),
            ..Default::default()
        })
    }

    /// Override the overall readiness timeout.
    pub fn with_ready_timeout(&self, timeout: Duration) -> Self {
        self.overlay(ContainerSpec {
            ready_timeout: Some(timeout),
            ..Default::default()
        })
    }

    /// Register a hook mutating the raw engine create request. Hooks run
    /// after translation, in registration order, and may override anything.
    pub fn with_create_modifier<F>(&self, modifier: F) -> Self
    where
        F: Fn(&mut bollard::container::Config<String>) + Send + Sync + 'static,
    {
        self.overlay(ContainerSpec {
            modifiers: vec![Arc::new(modifier) as Arc<CreateRequestModifier>],
            ..Default::default()
        })
    }
}

impl Builder<NetworkSpec> {
    /// Set the network name.
    pub fn with_name<N: Into<String>>(&self, name: N) -> Self {
        self.overlay(NetworkSpec {
            name: Some(name.into()),
            ..Default::default()
        })
    }

    /// Set the network driver (`bridge`, `overlay`, ...).
    pub fn with_driver<D: Into<String>>(&self, driver: D) -> Self {
        self.overlay(NetworkSpec {
            driver: Some(driver.into()),
            ..Default::default()
        })
    }

    /// Enable IPv6 on the network.
    pub fn with_ipv6(&self, enable: bool) -> Self {
        self.overlay(NetworkSpec {
            enable_ipv6: Some(enable),
            ..Default::default()
        })
    }

    /// Make the network internal (no external connectivity).
    pub fn with_internal(&self, internal: bool) -> Self {
        self.overlay(NetworkSpec {
            internal: Some(internal),
            ..Default::default()
        })
    }

    /// Add a driver option.
    pub fn with_option<K: Into<String>, V: Into<String>>(&self, key: K, value: V) -> Self {
        self.overlay(NetworkSpec {
            options: [(key.into(), value.into())].into_iter().collect(),
            ..Default::default()
        })
    }

    /// Add a label.
    pub fn with_label<K: Into<String>, V: Into<String>>(&self, key: K, value: V) -> Self {
        self.overlay(NetworkSpec {
            labels: [(key.into(), value.into())].into_iter().collect(),
            ..Default::default()
        })
    }

    /// Opt out of reaper cleanup for this network.
    pub fn with_cleanup(&self, cleanup: bool) -> Self {
        self.overlay(NetworkSpec {
            cleanup: Some(cleanup),
            ..Default::default()
        })
    }

    /// Override the engine endpoint for this network.
    pub fn with_docker_endpoint<E: Into<String>>(&self, endpoint: E) -> Self {
        self.overlay(NetworkSpec {
            endpoint: Some(endpoint.into()),
            ..Default::default()
        })
    }
}

impl Builder<VolumeSpec> {
    /// Set the volume name.
    pub fn with_name<N: Into<String>>(&self, name: N) -> Self {
        self.overlay(VolumeSpec {
            name: Some(name.into()),
            ..Default::default()
        })
    }

    /// Set the volume driver.
    pub fn with_driver<D: Into<String>>(&self, driver: D) -> Self {
        self.overlay(VolumeSpec {
            driver: Some(driver.into()),
            ..Default::default()
        })
    }

    /// Add a driver option.
    pub fn with_driver_opt<K: Into<String>, V: Into<String>>(&self, key: K, value: V) -> Self {
        self.overlay(VolumeSpec {
            driver_opts: [(key.into(), value.into())].into_iter().collect(),
            ..Default::default()
        })
    }

    /// Add a label.
    pub fn with_label<K: Into<String>, V: Into<String>>(&self, key: K, value: V) -> Self {
        self.overlay(VolumeSpec {
            labels: [(key.into(), value.into())].into_iter().collect(),
            ..Default::default()
        })
    }

    /// Opt out of reaper cleanup for this volume.
    pub fn with_cleanup(&self, cleanup: bool) -> Self {
        self.overlay(VolumeSpec {
            cleanup: Some(cleanup),
            ..Default::default()
        })
    }

    /// Override the engine endpoint for this volume.
    pub fn with_docker_endpoint<E: Into<String>>(&self, endpoint: E) -> Self {
        self.overlay(VolumeSpec {
            endpoint: Some(endpoint.into()),
            ..Default::default()
        })
    }
}

impl Builder<ImageSpec> {
    /// Set the image reference to pull, or the tag a Dockerfile build
    /// produces.
    pub fn with_image<I: Into<ImageRef>>(&self, reference: I) -> Self {
        self.overlay(ImageSpec {
            reference: Some(reference.into()),
            ..Default::default()
        })
    }

    /// Build the image from the Dockerfile in the given directory instead of
    /// pulling it.
    pub fn with_dockerfile_dir<P: Into<PathBuf>>(&self, dir: P) -> Self {
        self.overlay(ImageSpec {
            dockerfile_dir: Some(dir.into()),
            ..Default::default()
        })
    }

    /// Name of the Dockerfile within the build context (default
    /// `Dockerfile`).
    pub fn with_dockerfile<N: Into<String>>(&self, name: N) -> Self {
        self.overlay(ImageSpec {
            dockerfile: Some(name.into()),
            ..Default::default()
        })
    }

    /// Add a build argument.
    pub fn with_build_arg<K: Into<String>, V: Into<String>>(&self, key: K, value: V) -> Self {
        self.overlay(ImageSpec {
            build_args: [(key.into(), value.into())].into_iter().collect(),
            ..Default::default()
        })
    }

    /// Add a label baked into the built image.
    pub fn with_label<K: Into<String>, V: Into<String>>(&self, key: K, value: V) -> Self {
        self.overlay(ImageSpec {
            labels: [(key.into(), value.into())].into_iter().collect(),
            ..Default::default()
        })
    }

    /// Set credentials for pulling from a private registry.
    pub fn with_registry_auth(&self, auth: RegistryAuth) -> Self {
        self.overlay(ImageSpec {
            registry_auth: Some(auth),
            ..Default::default()
        })
    }

    /// Override the engine endpoint for this image.
    pub fn with_docker_endpoint<E: Into<String>>(&self, endpoint: E) -> Self {
        self.overlay(ImageSpec {
            endpoint: Some(endpoint.into()),
            ..Default::default()
        })
    }
}
