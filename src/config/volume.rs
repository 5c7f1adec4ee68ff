//! Volume specification.

use crate::config::merge;
use std::collections::HashMap;

/// Immutable description of a desired volume.
#[derive(Debug, Clone, Default)]
pub struct VolumeSpec {
    pub(crate) name: Option<String>,
    pub(crate) driver: Option<String>,
    pub(crate) driver_opts: HashMap<String, String>,
    pub(crate) labels: HashMap<String, String>,
    pub(crate) endpoint: Option<String>,
    pub(crate) cleanup: Option<bool>,
}

impl VolumeSpec {
    /// Pairwise merge with the standard combinator rules.
    pub fn merge(old: &Self, new: Self) -> Self {
        let old = old.clone();
        Self {
            name: merge::scalar(old.name, new.name),
            driver: merge::scalar(old.driver, new.driver),
            driver_opts: merge::map(old.driver_opts, new.driver_opts),
            labels: merge::map(old.labels, new.labels),
            endpoint: merge::scalar(old.endpoint, new.endpoint),
            cleanup: merge::scalar(old.cleanup, new.cleanup),
        }
    }

    /// Volumes need nothing beyond a name, and one is generated when
    /// missing, so validation always passes.
    pub fn validate(&self) -> crate::Result<()> {
        Ok(())
    }

    /// The configured volume name, if any.
    pub fn name(&self) -> Option<&str> {
        self.name.as_deref()
    }

    /// The volume driver, defaulting to `local`.
    pub fn driver(&self) -> &str {
        self.driver.as_deref().unwrap_or("local")
    }
}
