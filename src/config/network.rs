//! Network specification.

use crate::config::merge;
use std::collections::HashMap;

/// Immutable description of a desired network.
#[derive(Debug, Clone, Default)]
pub struct NetworkSpec {
    pub(crate) name: Option<String>,
    pub(crate) driver: Option<String>,
    pub(crate) enable_ipv6: Option<bool>,
    pub(crate) internal: Option<bool>,
    pub(crate) options: HashMap<String, String>,
    pub(crate) labels: HashMap<String, String>,
    pub(crate) endpoint: Option<String>,
    pub(crate) cleanup: Option<bool>,
}

impl NetworkSpec {
    /// Pairwise merge with the standard combinator rules.
    pub fn merge(old: &Self, new: Self) -> Self {
        let old = old.clone();
        Self {
            name: merge::scalar(old.name, new.name),
            driver: merge::scalar(old.driver, new.driver),
            enable_ipv6: merge::scalar(old.enable_ipv6, new.enable_ipv6),
            internal: merge::scalar(old.internal, new.internal),
            options: merge::map(old.options, new.options),
            labels: merge::map(old.labels, new.labels),
            endpoint: merge::scalar(old.endpoint, new.endpoint),
            cleanup: merge::scalar(old.cleanup, new.cleanup),
        }
    }

    /// Networks need nothing beyond a name, and one is generated when
    /// missing, so validation always passes.
    pub fn validate(&self) -> crate::Result<()> {
        Ok(())
    }

    /// The configured network name, if any.
    pub fn name(&self) -> Option<&str> {
        self.name.as_deref()
    }

    /// The network driver, defaulting to `bridge`.
    pub fn driver(&self) -> &str {
        self.driver.as_deref().unwrap_or("bridge")
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn merge_prefers_new_driver() {
        let old = NetworkSpec {
            driver: Some("bridge".to_string()),
            ..Default::default()
        };
        let new = NetworkSpec {
            driver: Some("overlay".to_string()),
            ..Default::default()
        };
        assert_eq!(NetworkSpec::merge(&old, new).driver(), "overlay");
    }

    #[test]
    fn default_driver_is_bridge() {
        assert_eq!(NetworkSpec::default().driver(), "bridge");
    }
}
