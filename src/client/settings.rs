//! Crate settings discovery.
//!
//! Settings come from environment variables first, then a TOML settings file
//! found through a discovery hierarchy, then built-in defaults:
//!
//! 1. Environment: `BERTH_DOCKER_HOST`, `BERTH_HOST_OVERRIDE`,
//!    `BERTH_REAPER_IMAGE`, `BERTH_REAPER_DISABLED`,
//!    `BERTH_DOCKER_SOCKET_OVERRIDE`
//! 2. Current directory: `./berth.toml`
//! 3. User config: `~/.config/berth/berth.toml`
//! 4. Built-in defaults

use crate::env;
use serde::{Deserialize, Serialize};
use std::env as std_env;
use std::fs;
use std::path::{Path, PathBuf};
use tracing::{debug, warn};

/// Crate-level settings affecting endpoint resolution and the reaper.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default, rename_all = "kebab-case")]
pub struct Settings {
    /// Engine endpoint override, ahead of `DOCKER_HOST`.
    pub docker_host: Option<String>,
    /// Hostname under which mapped ports are reachable, overriding the
    /// endpoint-derived default.
    pub host_override: Option<String>,
    /// Reaper sidecar image override.
    pub reaper_image: Option<String>,
    /// Disable the reaper sidecar entirely.
    pub reaper_disabled: bool,
    /// Engine socket path mounted into the reaper sidecar.
    pub docker_socket_override: Option<String>,
}

impl Settings {
    /// Discover settings from the environment and the settings-file
    /// hierarchy.
    pub fn discover() -> Self {
        let mut settings = Self::find_settings_file()
            .and_then(|path| match Self::from_toml_file(&path) {
                Ok(settings) => {
                    debug!("Loaded settings from {:?}", path);
                    Some(settings)
                }
                Err(e) => {
                    warn!("Ignoring unreadable settings file {:?}: {}", path, e);
                    None
                }
            })
            .unwrap_or_default();

        settings.apply_environment();
        settings
    }

    /// Load settings from a TOML file.
    pub fn from_toml_file(path: &Path) -> Result<Self, Box<dyn std::error::Error>> {
        let content = fs::read_to_string(path)?;
        let settings: Settings = toml::from_str(&content)?;
        Ok(settings)
    }

    fn apply_environment(&mut self) {
        if let Ok(value) = std_env::var(env::settings::DOCKER_HOST_ENV) {
            self.docker_host = Some(value);
        }
        if let Ok(value) = std_env::var(env::settings::HOST_OVERRIDE_ENV) {
            self.host_override = Some(value);
        }
        if let Ok(value) = std_env::var(env::settings::REAPER_IMAGE_ENV) {
            self.reaper_image = Some(value);
        }
        if let Ok(value) = std_env::var(env::settings::REAPER_DISABLED_ENV) {
            self.reaper_disabled = value == "1" || value.eq_ignore_ascii_case("true");
        }
        if let Ok(value) = std_env::var(env::settings::SOCKET_OVERRIDE_ENV) {
            self.docker_socket_override = Some(value);
        }
    }

    /// The reaper sidecar image, falling back to the built-in default.
    pub fn reaper_image(&self) -> &str {
        self.reaper_image
            .as_deref()
            .unwrap_or(env::reaper::DEFAULT_IMAGE)
    }

    /// The engine socket path mounted into the reaper sidecar.
    pub fn docker_socket(&self) -> &str {
        self.docker_socket_override
            .as_deref()
            .unwrap_or(env::reaper::DEFAULT_SOCKET)
    }

    fn find_settings_file() -> Option<PathBuf> {
        let mut candidates = vec![PathBuf::from(env::settings::FILE_NAME)];
        if let Ok(home) = std_env::var("HOME") {
            candidates.push(
                PathBuf::from(home)
                    .join(".config")
                    .join("berth")
                    .join(env::settings::FILE_NAME),
            );
        }

        candidates.into_iter().find(|candidate| candidate.exists())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_are_empty() {
        let settings = Settings::default();
        assert!(settings.docker_host.is_none());
        assert!(!settings.reaper_disabled);
        assert_eq!(settings.docker_socket(), "/var/run/docker.sock");
    }

    #[test]
    fn parses_settings_file() {
        let settings: Settings = toml::from_str(
            r#"
            docker-host = "tcp://10.0.0.5:2375"
            reaper-disabled = true
            "#,
        )
        .unwrap();

        assert_eq!(settings.docker_host.as_deref(), Some("tcp://10.0.0.5:2375"));
        assert!(settings.reaper_disabled);
        assert!(settings.reaper_image().contains("ryuk"));
    }
}
