//! Engine-bound resource handles.
//!
//! A handle is the in-process representative of a container, network,
//! volume, or image. It is built from an immutable specification, holds the
//! engine-assigned id once the resource exists, and walks the lifecycle
//! state machine below. Handles are interior-mutable: all operations take
//! `&self`, so they can be shared behind `Arc` for dependency and network
//! wiring.

mod container;
mod exec;
mod image;
mod network;
mod volume;

pub use container::ContainerHandle;
pub use exec::{ExecOutput, ExecSpec};
pub use image::ImageHandle;
pub use network::NetworkHandle;
pub use volume::VolumeHandle;

use crate::config::{ContainerSpec, ImageSpec, NetworkSpec, VolumeSpec};
use std::fmt;

/// Lifecycle states of a resource handle.
///
/// `Pending → Creating → Created → Starting → Running → Stopping →
/// Stopped/Removed`, with `Failed` absorbing any engine-call failure and
/// `Removed` terminal.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LifecycleState {
    /// Handle exists; no engine resource yet.
    Pending,
    /// Engine create call in flight.
    Creating,
    /// Engine id assigned; resource not started.
    Created,
    /// Engine start call and readiness phase in flight.
    Starting,
    /// Started and all wait strategies succeeded.
    Running,
    /// Engine stop call in flight.
    Stopping,
    /// Stopped but not removed.
    Stopped,
    /// Removed from the engine. Terminal.
    Removed,
    /// An engine call failed. Absorbing.
    Failed,
}

impl LifecycleState {
    /// Whether the state admits no further transitions.
    pub fn is_terminal(self) -> bool {
        matches!(self, Self::Removed)
    }
}

impl fmt::Display for LifecycleState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Self::Pending => "pending",
            Self::Creating => "creating",
            Self::Created => "created",
            Self::Starting => "starting",
            Self::Running => "running",
            Self::Stopping => "stopping",
            Self::Stopped => "stopped",
            Self::Removed => "removed",
            Self::Failed => "failed",
        };
        write!(f, "{name}")
    }
}

/// Tags the four resource kinds the factory registry can construct.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ResourceKind {
    /// A container.
    Container,
    /// A network.
    Network,
    /// A volume.
    Volume,
    /// An image.
    Image,
}

impl fmt::Display for ResourceKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Self::Container => "container",
            Self::Network => "network",
            Self::Volume => "volume",
            Self::Image => "image",
        };
        write!(f, "{name}")
    }
}

/// The factory registry: one constructor per resource kind.
///
/// Builders dispatch through this table instead of any runtime type
/// machinery, keeping construction an explicit, exhaustively testable list
/// of cases.
pub(crate) struct HandleFactory {
    pub container: fn(ContainerSpec) -> ContainerHandle,
    pub network: fn(NetworkSpec) -> NetworkHandle,
    pub volume: fn(VolumeSpec) -> VolumeHandle,
    pub image: fn(ImageSpec) -> ImageHandle,
}

static FACTORY: HandleFactory = HandleFactory {
    container: ContainerHandle::from_spec,
    network: NetworkHandle::from_spec,
    volume: VolumeHandle::from_spec,
    image: ImageHandle::from_spec,
};

/// The process-wide factory registry.
pub(crate) fn registry() -> &'static HandleFactory {
    &FACTORY
}
