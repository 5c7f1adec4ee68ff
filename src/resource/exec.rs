//! One-shot command execution inside a running container.

use crate::{Error, Result};
use bollard::exec::{CreateExecOptions, StartExecResults};
use bollard::Docker;
use futures::stream::StreamExt;
use tracing::debug;

/// Configuration of a single exec invocation.
#[derive(Debug, Clone, Default)]
pub struct ExecSpec {
    /// Command and arguments.
    pub command: Vec<String>,
    /// Extra environment, as `KEY=value` entries.
    pub env: Vec<String>,
    /// Working directory inside the container.
    pub working_dir: Option<String>,
    /// User to run as.
    pub user: Option<String>,
}

impl ExecSpec {
    /// Exec the given command with no extra environment.
    pub fn command<I, S>(command: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self {
            command: command.into_iter().map(Into::into).collect(),
            ..Default::default()
        }
    }

    /// Add a `KEY=value` environment entry.
    pub fn env<K: Into<String>, V: Into<String>>(mut self, key: K, value: V) -> Self {
        self.env.push(format!("{}={}", key.into(), value.into()));
        self
    }

    /// Set the working directory.
    pub fn working_dir<D: Into<String>>(mut self, dir: D) -> Self {
        self.working_dir = Some(dir.into());
        self
    }

    /// Set the user.
    pub fn user<U: Into<String>>(mut self, user: U) -> Self {
        self.user = Some(user.into());
        self
    }
}

/// Captured result of an exec invocation.
#[derive(Debug, Clone)]
pub struct ExecOutput {
    /// Captured standard output.
    pub stdout: String,
    /// Captured standard error.
    pub stderr: String,
    /// Exit code, when the engine reports one.
    pub exit_code: Option<i64>,
}

impl ExecOutput {
    /// Whether the command exited with code 0.
    pub fn success(&self) -> bool {
        self.exit_code == Some(0)
    }

    /// stdout and stderr concatenated.
    pub fn combined(&self) -> String {
        format!("{}{}", self.stdout, self.stderr)
    }
}

/// Run a command in a running container and capture its output.
pub(crate) async fn execute(
    docker: &Docker,
    container_id: &str,
    spec: &ExecSpec,
) -> Result<ExecOutput> {
    debug!(
        "Executing in container {}: {:?}",
        container_id, spec.command
    );

    let options = CreateExecOptions {
        cmd: Some(spec.command.clone()),
        env: if spec.env.is_empty() {
            None
        } else {
            Some(spec.env.clone())
        },
        working_dir: spec.working_dir.clone(),
        user: spec.user.clone(),
        attach_stdout: Some(true),
        attach_stderr: Some(true),
        ..Default::default()
    };

    let exec = docker.create_exec(container_id, options).await?;
    let started = docker.start_exec(&exec.id, None).await?;

    let mut stdout = String::new();
    let mut stderr = String::new();

    match started {
        StartExecResults::Attached { mut output, .. } => {
            while let Some(chunk) = output.next().await {
                match chunk {
                    Ok(log) => {
                        let text = log.to_string();
                        match log {
                            bollard::container::LogOutput::StdOut { .. } => {
                                stdout.push_str(&text);
                            }
                            bollard::container::LogOutput::StdErr { .. } => {
                                stderr.push_str(&text);
                            }
                            _ => {}
                        }
                    }
                    Err(e) => {
                        return Err(Error::Execution(format!(
                            "failed to read exec output: {e}"
                        )));
                    }
                }
            }
        }
        StartExecResults::Detached => {
            return Err(Error::Execution(
                "unexpected detached execution".to_string(),
            ));
        }
    }

    let inspect = docker.inspect_exec(&exec.id).await?;
    let exit_code = inspect.exit_code;

    debug!("Exec finished with exit code {:?}", exit_code);

    Ok(ExecOutput {
        stdout,
        stderr,
        exit_code,
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn spec_builds_env_entries() {
        let spec = ExecSpec::command(["psql", "-c", "select 1"])
            .env("PGUSER", "postgres")
            .working_dir("/tmp");

        assert_eq!(spec.command, ["psql", "-c", "select 1"]);
        assert_eq!(spec.env, ["PGUSER=postgres"]);
        assert_eq!(spec.working_dir.as_deref(), Some("/tmp"));
    }

    #[test]
    fn success_requires_zero_exit() {
        let ok = ExecOutput {
            stdout: "1\n".to_string(),
            stderr: String::new(),
            exit_code: Some(0),
        };
        let failed = ExecOutput {
            stdout: String::new(),
            stderr: "boom\n".to_string(),
            exit_code: Some(1),
        };

        assert!(ok.success());
        assert!(!failed.success());
        assert_eq!(failed.combined(), "boom\n");
    }
}
