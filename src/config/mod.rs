//! Resource configuration: immutable specifications, the merge combinator,
//! and the fluent builder.
//!
//! A specification is a plain value describing the desired state of a
//! resource. Builders never mutate it; every `with_*` call merges an overlay
//! through the combinator in [`merge`] and wraps the result in a fresh
//! builder. Validation happens once, in `build()`, before any engine call.

mod builder;
mod container;
mod image;
mod image_build;
pub(crate) mod merge;
mod mount;
mod network;
mod volume;

pub use builder::{
    Builder, ContainerBuilder, ImageBuilder, NetworkBuilder, Spec, VolumeBuilder,
};
pub use container::{
    ContainerSpec, CreateRequestModifier, HostPort, RegistryAuth, StartupCallback,
};
pub(crate) use container::normalize_port;
pub use image::ImageRef;
pub use image_build::ImageSpec;
pub use mount::{AccessMode, FileMapping, FileSource, Mount, MountSource};
pub use network::NetworkSpec;
pub use volume::VolumeSpec;
