//! Readiness strategies.
//!
//! A wait strategy is a predicate polled after a container starts and before
//! it is considered usable. Strategies are evaluated sequentially in the
//! order they were declared, each with the same fixed poll interval and
//! overall timeout: cheap checks placed first gate expensive ones instead of
//! racing them. Transient evaluation errors (connection refused, missing
//! mapping) are retried; only an elapsed timeout produces a hard failure.

mod exec;
mod http;
mod log;
mod port;

pub use exec::ExecWait;
pub use http::HttpWait;
pub use log::LogWait;
pub use port::PortWait;

use crate::resource::ContainerHandle;
use crate::{Error, Result};
use async_trait::async_trait;
use std::sync::Arc;
use std::time::Duration;
use tokio::time::Instant;
use tracing::{debug, warn};

/// Poll cadence for wait-strategy evaluation.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct WaitPolicy {
    /// Interval between polls of a single strategy.
    pub poll_interval: Duration,
    /// Overall timeout per strategy.
    pub timeout: Duration,
}

impl Default for WaitPolicy {
    fn default() -> Self {
        Self {
            poll_interval: Duration::from_millis(250),
            timeout: Duration::from_secs(60),
        }
    }
}

/// A readiness predicate evaluated against a started container.
#[async_trait]
pub trait WaitStrategy: Send + Sync {
    /// Check the container once. `Ok(false)` and `Err` both mean "not ready
    /// yet"; errors are treated as transient and retried.
    async fn ready(&self, container: &ContainerHandle) -> Result<bool>;

    /// Human-readable description, used in timeout errors and logs.
    fn describe(&self) -> String;
}

/// Evaluate strategies sequentially, each polled until success or timeout.
pub(crate) async fn await_ready(
    container: &ContainerHandle,
    strategies: &[Arc<dyn WaitStrategy>],
    policy: WaitPolicy,
) -> Result<()> {
    for strategy in strategies {
        let deadline = Instant::now() + policy.timeout;
        debug!("Waiting for readiness: {}", strategy.describe());

        loop {
            match strategy.ready(container).await {
                Ok(true) => break,
                Ok(false) => {}
                Err(e) => {
                    debug!("Transient failure in {}: {}", strategy.describe(), e);
                }
            }

            if Instant::now() >= deadline {
                warn!(
                    "Readiness timeout after {:?}: {}",
                    policy.timeout,
                    strategy.describe()
                );
                return Err(Error::ReadinessTimeout {
                    strategy: strategy.describe(),
                    timeout: policy.timeout,
                });
            }

            tokio::time::sleep(policy.poll_interval).await;
        }

        debug!("Ready: {}", strategy.describe());
    }

    Ok(())
}

/// Wait until a host TCP connection to the mapped container port succeeds.
pub fn for_port(container_port: u16) -> Arc<dyn WaitStrategy> {
    Arc::new(PortWait::new(container_port))
}

/// Wait until the container logs match the given regular expression.
///
/// # Errors
///
/// Returns [`Error::Configuration`] if the pattern is not a valid regex.
pub fn for_log(pattern: &str) -> Result<Arc<dyn WaitStrategy>> {
    Ok(Arc::new(LogWait::new(pattern)?))
}

/// Wait until the given command exits successfully inside the container.
pub fn for_exec<I, S>(command: I) -> Arc<dyn WaitStrategy>
where
    I: IntoIterator<Item = S>,
    S: Into<String>,
{
    Arc::new(ExecWait::new(command))
}

/// Wait for an HTTP probe; see [`HttpWait`] for the matching rules.
pub fn for_http(path: &str) -> HttpWait {
    HttpWait::new(path)
}

/// Combine strategies with AND semantics: every child must report ready.
pub fn all_of<I>(children: I) -> Arc<dyn WaitStrategy>
where
    I: IntoIterator<Item = Arc<dyn WaitStrategy>>,
{
    Arc::new(AllOf {
        children: children.into_iter().collect(),
    })
}

/// Unconditionally wait for a fixed duration.
pub fn delay(duration: Duration) -> Arc<dyn WaitStrategy> {
    Arc::new(Delay { duration })
}

struct AllOf {
    children: Vec<Arc<dyn WaitStrategy>>,
}

#[async_trait]
impl WaitStrategy for AllOf {
    async fn ready(&self, container: &ContainerHandle) -> Result<bool> {
        for child in &self.children {
            if !child.ready(container).await? {
                return Ok(false);
            }
        }
        Ok(true)
    }

    fn describe(&self) -> String {
        let parts: Vec<String> = self.children.iter().map(|c| c.describe()).collect();
        format!("all of [{}]", parts.join(", "))
    }
}

struct Delay {
    duration: Duration,
}

#[async_trait]
impl WaitStrategy for Delay {
    async fn ready(&self, _container: &ContainerHandle) -> Result<bool> {
        tokio::time::sleep(self.duration).await;
        Ok(true)
    }

    fn describe(&self) -> String {
        format!("delay of {:?}", self.duration)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_policy_is_short_interval() {
        let policy = WaitPolicy::default();
        assert_eq!(policy.poll_interval, Duration::from_millis(250));
        assert_eq!(policy.timeout, Duration::from_secs(60));
    }

    #[test]
    fn all_of_describes_children() {
        let composite = all_of([for_port(80), for_port(443)]);
        let description = composite.describe();
        assert!(description.contains("80"));
        assert!(description.contains("443"));
    }

    #[test]
    fn invalid_log_pattern_is_a_configuration_error() {
        assert!(matches!(
            for_log("(unclosed"),
            Err(Error::Configuration(_))
        ));
    }
}
