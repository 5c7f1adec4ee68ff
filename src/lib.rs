//! # Berth
//!
//! Disposable Docker containers, networks, volumes, and images for
//! integration tests. Berth gives test suites a real database, broker, or
//! browser instead of a mock: a fluent builder accumulates the desired
//! configuration, `build()` validates it, and the resulting handle drives the
//! container through create, start, readiness checks, and teardown against a
//! running Docker (or compatible) engine.
//!
//! ## Architecture Overview
//!
//! The crate is organized into several modules:
//!
//! - [`config`]: immutable resource specifications, the merge combinator, and
//!   the generic fluent builder
//! - [`resource`]: engine-bound handles (container, network, volume, image)
//!   with the lifecycle state machine
//! - [`wait`]: pluggable readiness strategies polled after start
//! - [`reaper`]: session labeling and the out-of-band garbage collector for
//!   resources leaked by crashed test processes
//! - [`client`]: engine client wrapper with endpoint resolution and a
//!   process-wide connection pool
//! - [`archive`]: tar staging for copying files into containers
//! - [`output`]: sinks for container stdout/stderr
//!
//! ## Usage
//!
//! ```rust,no_run
//! use berth::{ContainerBuilder, wait};
//!
//! #[tokio::main]
//! async fn main() -> berth::Result<()> {
//!     let redis = ContainerBuilder::new()
//!         .with_image("redis:7-alpine")
//!         .with_random_port_binding(6379)
//!         .with_wait_strategies([wait::for_port(6379)])
//!         .build()?;
//!
//!     redis.start().await?;
//!     let port = redis.mapped_port(6379).await?;
//!     println!("redis is listening on localhost:{port}");
//!
//!     redis.dispose().await?;
//!     Ok(())
//! }
//! ```
//!
//! Builders are immutable: every `with_*` call returns a new builder, so a
//! partially configured builder can be reused to produce siblings with
//! different port bindings or environments.
//!
//! Every resource created through a builder carries a session label. If the
//! owning process exits without disposing its resources, the [`reaper`]
//! removes them out of band.

/// Constants shared across the crate: label keys, environment variable
/// names, and engine defaults.
pub mod env;

/// Engine client wrapper, endpoint resolution, and settings discovery.
pub mod client;

/// Immutable resource specifications, merge combinator, and fluent builders.
pub mod config;

/// Engine-bound resource handles and the lifecycle state machine.
pub mod resource;

/// Readiness strategies polled between start and ready.
pub mod wait;

/// Session labeling and out-of-band garbage collection.
pub mod reaper;

/// Tar staging for file injection and image build contexts.
pub mod archive;

/// Sinks for container stdout/stderr.
pub mod output;

pub use client::{EngineClient, Settings};
pub use config::{
    AccessMode, ContainerBuilder, ContainerSpec, HostPort, ImageBuilder, ImageRef, ImageSpec,
    Mount, NetworkBuilder, NetworkSpec, RegistryAuth, VolumeBuilder, VolumeSpec,
};
pub use output::OutputConsumer;
pub use resource::{
    ContainerHandle, ExecOutput, ImageHandle, LifecycleState, NetworkHandle, ResourceKind,
    VolumeHandle,
};
pub use wait::{WaitPolicy, WaitStrategy};

/// Errors surfaced by berth operations.
#[derive(Debug, thiserror::Error)]
pub enum Error {
    /// Invalid or incomplete configuration, raised before any engine call.
    #[error("configuration error: {0}")]
    Configuration(String),

    /// The engine could not be reached during endpoint resolution or
    /// connection setup. Fatal: no resource operations are attempted.
    #[error("Docker is not available: {0}")]
    DockerUnavailable(String),

    /// A failed engine call, propagated as-is.
    #[error("engine API error: {0}")]
    Engine(#[from] bollard::errors::Error),

    /// A wait strategy did not report ready within the configured timeout.
    /// The resource is left running so the caller can inspect it.
    #[error("container was not ready after {timeout:?}: {strategy} did not succeed")]
    ReadinessTimeout {
        /// Description of the failing strategy.
        strategy: String,
        /// The overall timeout that elapsed.
        timeout: std::time::Duration,
    },

    /// Command execution inside a resource failed or was attempted in the
    /// wrong lifecycle state.
    #[error("execution error: {0}")]
    Execution(String),

    /// The reaper could not be confirmed reachable. Callers normally never
    /// see this; it is logged and degrades to best-effort cleanup.
    #[error("reaper error: {0}")]
    Reaper(String),

    /// An operation was attempted in a lifecycle state that does not
    /// support it.
    #[error("invalid lifecycle state: expected {expected}, found {actual}")]
    InvalidState {
        /// The state the operation requires.
        expected: String,
        /// The state the handle was in.
        actual: String,
    },

    /// IO error
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

/// Result type for berth operations.
pub type Result<T> = std::result::Result<T, Error>;

pub(crate) fn is_gone(err: &bollard::errors::Error) -> bool {
    matches!(
        err,
        bollard::errors::Error::DockerResponseServerError {
            status_code: 404 | 409,
            ..
        }
    )
}

pub(crate) fn is_not_modified(err: &bollard::errors::Error) -> bool {
    matches!(
        err,
        bollard::errors::Error::DockerResponseServerError {
            status_code: 304,
            ..
        }
    )
}
