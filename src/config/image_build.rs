//! Image specification: pull an existing reference or build one from a
//! Dockerfile directory.

use crate::config::{merge, ImageRef, RegistryAuth};
use std::collections::HashMap;
use std::path::PathBuf;

/// Immutable description of a desired image.
///
/// Either a plain reference to pull, or a Dockerfile directory plus tag to
/// build. The build context is tar'd and gzip'd in memory and streamed to
/// the engine; no local `docker` binary is involved.
#[derive(Debug, Clone, Default)]
pub struct ImageSpec {
    pub(crate) reference: Option<ImageRef>,
    pub(crate) dockerfile_dir: Option<PathBuf>,
    pub(crate) dockerfile: Option<String>,
    pub(crate) build_args: HashMap<String, String>,
    pub(crate) labels: HashMap<String, String>,
    pub(crate) registry_auth: Option<RegistryAuth>,
    pub(crate) endpoint: Option<String>,
    pub(crate) cleanup: Option<bool>,
}

impl ImageSpec {
    /// Pairwise merge with the standard combinator rules.
    pub fn merge(old: &Self, new: Self) -> Self {
        let old = old.clone();
        Self {
            reference: merge::scalar(old.reference, new.reference),
            dockerfile_dir: merge::scalar(old.dockerfile_dir, new.dockerfile_dir),
            dockerfile: merge::scalar(old.dockerfile, new.dockerfile),
            build_args: merge::map(old.build_args, new.build_args),
            labels: merge::map(old.labels, new.labels),
            registry_auth: merge::snapshot(old.registry_auth, new.registry_auth),
            endpoint: merge::scalar(old.endpoint, new.endpoint),
            cleanup: merge::scalar(old.cleanup, new.cleanup),
        }
    }

    /// Validate the specification before any engine call.
    ///
    /// A reference is always required: it names the image to pull, or tags
    /// the image a Dockerfile build produces.
    pub fn validate(&self) -> crate::Result<()> {
        if self.reference.is_none() {
            return Err(crate::Error::Configuration(
                "an image reference is required; call with_image before build".to_string(),
            ));
        }
        Ok(())
    }

    /// The image reference to pull or tag.
    pub fn reference(&self) -> Option<&ImageRef> {
        self.reference.as_ref()
    }

    /// The Dockerfile directory, when building instead of pulling.
    pub fn dockerfile_dir(&self) -> Option<&PathBuf> {
        self.dockerfile_dir.as_ref()
    }
}
