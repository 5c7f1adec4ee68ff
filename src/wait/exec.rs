//! Command-exit readiness.

use crate::resource::ContainerHandle;
use crate::Result;
use async_trait::async_trait;

/// Waits until a command run inside the container exits with code 0.
#[derive(Debug, Clone)]
pub struct ExecWait {
    command: Vec<String>,
}

impl ExecWait {
    /// Wait for the given command to succeed.
    pub fn new<I, S>(command: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self {
            command: command.into_iter().map(Into::into).collect(),
        }
    }
}

#[async_trait]
impl crate::wait::WaitStrategy for ExecWait {
    async fn ready(&self, container: &ContainerHandle) -> Result<bool> {
        let output = container.exec_unchecked(self.command.clone()).await?;
        Ok(output.success())
    }

    fn describe(&self) -> String {
        format!("command {:?} exits 0", self.command)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::wait::WaitStrategy;

    #[test]
    fn describes_command() {
        let wait = ExecWait::new(["pg_isready", "-U", "postgres"]);
        assert!(wait.describe().contains("pg_isready"));
    }
}
