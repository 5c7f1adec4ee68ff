//! Engine endpoint resolution.
//!
//! Discovery order, an external contract test-writers rely on:
//!
//! 1. Explicit override (builder or settings)
//! 2. `DOCKER_HOST` environment variable
//! 3. The Docker CLI's current context: `currentContext` in `config.json`
//!    (or `DOCKER_CONTEXT`), resolved through
//!    `contexts/meta/<sha256(context)>/meta.json`
//! 4. Platform default socket

use crate::client::Settings;
use crate::env;
use serde::Deserialize;
use sha2::{Digest, Sha256};
use std::env as std_env;
use std::fs;
use std::path::PathBuf;
use tracing::debug;

/// Resolve the engine endpoint for the given per-resource override.
pub fn resolve(explicit: Option<&str>, settings: &Settings) -> String {
    if let Some(endpoint) = explicit {
        return endpoint.to_string();
    }

    if let Some(endpoint) = settings.docker_host.as_deref() {
        return endpoint.to_string();
    }

    if let Ok(endpoint) = std_env::var(env::DOCKER_HOST_ENV) {
        if !endpoint.is_empty() {
            return endpoint;
        }
    }

    if let Some(endpoint) = current_context_endpoint() {
        return endpoint;
    }

    default_endpoint().to_string()
}

/// The platform default engine socket.
pub fn default_endpoint() -> &'static str {
    if cfg!(windows) {
        env::WINDOWS_PIPE
    } else {
        env::UNIX_SOCKET
    }
}

/// Resolve the endpoint of the Docker CLI's current context, if one is
/// selected and is not the default context.
pub fn current_context_endpoint() -> Option<String> {
    let config_dir = docker_config_dir();
    let context = current_context(&config_dir)?;

    if context.is_empty() || context == "default" {
        return None;
    }

    context_meta_endpoint(&config_dir, &context)
}

fn docker_config_dir() -> PathBuf {
    if let Ok(dir) = std_env::var(env::DOCKER_CONFIG_ENV) {
        if !dir.is_empty() {
            return PathBuf::from(dir);
        }
    }
    let home = std_env::var("HOME").unwrap_or_default();
    PathBuf::from(home).join(".docker")
}

fn current_context(config_dir: &PathBuf) -> Option<String> {
    if let Ok(context) = std_env::var(env::DOCKER_CONTEXT_ENV) {
        if !context.is_empty() {
            return Some(context);
        }
    }

    let config_file = config_dir.join("config.json");
    let content = fs::read_to_string(&config_file).ok()?;
    let config: DockerCliConfig = serde_json::from_str(&content).ok()?;
    config.current_context
}

/// Look up the context's endpoint in `contexts/meta/<sha256(name)>/meta.json`,
/// mirroring `docker context inspect --format {{.Endpoints.docker.Host}}`.
fn context_meta_endpoint(config_dir: &PathBuf, context: &str) -> Option<String> {
    let hash = hex::encode(Sha256::digest(context.as_bytes()));
    let meta_file = config_dir
        .join("contexts")
        .join("meta")
        .join(hash)
        .join("meta.json");

    let content = fs::read_to_string(&meta_file).ok()?;
    let meta: ContextMeta = serde_json::from_str(&content).ok()?;

    if meta.name != context {
        debug!(
            "Context metadata name mismatch: expected {}, found {}",
            context, meta.name
        );
        return None;
    }

    meta.endpoints
        .and_then(|endpoints| endpoints.docker)
        .map(|docker| docker.host)
        .filter(|host| !host.is_empty())
}

#[derive(Debug, Deserialize)]
struct DockerCliConfig {
    #[serde(rename = "currentContext")]
    current_context: Option<String>,
}

#[derive(Debug, Deserialize)]
struct ContextMeta {
    #[serde(rename = "Name")]
    name: String,
    #[serde(rename = "Endpoints")]
    endpoints: Option<ContextEndpoints>,
}

#[derive(Debug, Deserialize)]
struct ContextEndpoints {
    #[serde(rename = "docker")]
    docker: Option<ContextDockerEndpoint>,
}

#[derive(Debug, Deserialize)]
struct ContextDockerEndpoint {
    #[serde(rename = "Host")]
    host: String,
}
