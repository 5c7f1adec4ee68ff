//! Log-pattern readiness.

use crate::resource::ContainerHandle;
use crate::{Error, Result};
use async_trait::async_trait;
use regex::Regex;

/// Waits until the container's combined stdout/stderr matches a regular
/// expression.
#[derive(Debug, Clone)]
pub struct LogWait {
    pattern: Regex,
}

impl LogWait {
    /// Wait for the given pattern.
    ///
    /// # Errors
    ///
    /// Returns [`Error::Configuration`] if the pattern is not a valid regex.
    pub fn new(pattern: &str) -> Result<Self> {
        let pattern = Regex::new(pattern)
            .map_err(|e| Error::Configuration(format!("invalid log wait pattern: {e}")))?;
        Ok(Self { pattern })
    }

    /// Whether the given log text satisfies the pattern.
    pub fn matches(&self, logs: &str) -> bool {
        self.pattern.is_match(logs)
    }
}

#[async_trait]
impl crate::wait::WaitStrategy for LogWait {
    async fn ready(&self, container: &ContainerHandle) -> Result<bool> {
        let logs = container.logs(None).await?;
        Ok(self.matches(&logs))
    }

    fn describe(&self) -> String {
        format!("log line matching /{}/", self.pattern)
    }
}
