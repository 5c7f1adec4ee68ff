//! Shared constants: label keys, environment variable names, and engine
//! defaults.
//!
//! Centralizing these makes the label contract between created resources and
//! the reaper explicit, and keeps endpoint discovery in one place.

/// Label key carrying the session id of the test run that created a resource.
///
/// The reaper removes resources by an equality filter on this label; it is
/// the only coupling between resource creation and out-of-band cleanup.
pub const SESSION_ID_LABEL: &str = "dev.berth.session-id";

/// Label key marking a resource as managed by this crate.
pub const MANAGED_LABEL: &str = "dev.berth.managed";

/// Label key carrying the crate version that created a resource.
pub const VERSION_LABEL: &str = "dev.berth.version";

/// Prefix for generated resource names.
pub const NAME_PREFIX: &str = "berth";

/// Environment variable overriding the engine endpoint.
pub const DOCKER_HOST_ENV: &str = "DOCKER_HOST";

/// Environment variable selecting a Docker CLI context by name.
pub const DOCKER_CONTEXT_ENV: &str = "DOCKER_CONTEXT";

/// Environment variable overriding the Docker CLI config directory.
pub const DOCKER_CONFIG_ENV: &str = "DOCKER_CONFIG";

/// Default engine socket on Unix platforms.
pub const UNIX_SOCKET: &str = "unix:///var/run/docker.sock";

/// Default engine named pipe on Windows.
pub const WINDOWS_PIPE: &str = "npipe:////./pipe/docker_engine";

/// Settings-related environment variables and file names.
pub mod settings {
    /// Overrides the engine endpoint ahead of `DOCKER_HOST`.
    pub const DOCKER_HOST_ENV: &str = "BERTH_DOCKER_HOST";

    /// Overrides the hostname under which mapped ports are reachable.
    pub const HOST_OVERRIDE_ENV: &str = "BERTH_HOST_OVERRIDE";

    /// Overrides the reaper sidecar image.
    pub const REAPER_IMAGE_ENV: &str = "BERTH_REAPER_IMAGE";

    /// Disables the reaper sidecar entirely ("1" or "true").
    pub const REAPER_DISABLED_ENV: &str = "BERTH_REAPER_DISABLED";

    /// Overrides the engine socket path mounted into the reaper sidecar.
    pub const SOCKET_OVERRIDE_ENV: &str = "BERTH_DOCKER_SOCKET_OVERRIDE";

    /// Settings file name looked up in the discovery hierarchy.
    pub const FILE_NAME: &str = "berth.toml";
}

/// Reaper sidecar defaults.
pub mod reaper {
    /// Image of the garbage-collector sidecar.
    pub const DEFAULT_IMAGE: &str = "testcontainers/ryuk:0.5.1";

    /// Port the sidecar listens on for label filters.
    pub const PORT: u16 = 8080;

    /// Engine socket path mounted into the sidecar.
    pub const DEFAULT_SOCKET: &str = "/var/run/docker.sock";
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn label_keys_share_prefix() {
        for key in [SESSION_ID_LABEL, MANAGED_LABEL, VERSION_LABEL] {
            assert!(key.starts_with("dev.berth."));
        }
    }
}
