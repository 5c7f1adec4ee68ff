//! Mounts and file mappings.
//!
//! A [`Mount`] describes a bind or volume mount declared at configuration
//! time and realized into an engine mount spec only when the container is
//! created. A [`FileMapping`] describes a file that is tar-staged and
//! uploaded into the container filesystem, preserving its Unix mode bits.

use crate::resource::VolumeHandle;
use bollard::service::{Mount as EngineMount, MountTypeEnum};
use std::path::PathBuf;
use std::sync::Arc;

/// Access mode of a mount.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AccessMode {
    /// The container may only read from the mount.
    ReadOnly,
    /// The container may read and write.
    ReadWrite,
}

/// Source of a mount: a host path or a named volume.
#[derive(Clone)]
pub enum MountSource {
    /// Bind mount of a host path.
    Bind(PathBuf),
    /// Mount of an engine volume, by handle so the container can create it
    /// on demand during startup.
    Volume(Arc<VolumeHandle>),
}

/// A declared mount, realized at container-creation time.
#[derive(Clone)]
pub struct Mount {
    /// Where the data comes from.
    pub source: MountSource,
    /// Absolute path inside the container.
    pub target: String,
    /// Read-only or read-write.
    pub access: AccessMode,
}

impl Mount {
    pub(crate) fn to_engine_mount(&self) -> EngineMount {
        let (source, typ) = match &self.source {
            MountSource::Bind(path) => {
                (path.display().to_string(), MountTypeEnum::BIND)
            }
            MountSource::Volume(volume) => (volume.name().to_string(), MountTypeEnum::VOLUME),
        };

        EngineMount {
            target: Some(self.target.clone()),
            source: Some(source),
            typ: Some(typ),
            read_only: Some(matches!(self.access, AccessMode::ReadOnly)),
            ..Default::default()
        }
    }
}

impl std::fmt::Debug for Mount {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let source = match &self.source {
            MountSource::Bind(path) => format!("bind:{}", path.display()),
            MountSource::Volume(volume) => format!("volume:{}", volume.name()),
        };
        f.debug_struct("Mount")
            .field("source", &source)
            .field("target", &self.target)
            .field("access", &self.access)
            .finish()
    }
}

/// Content source of a [`FileMapping`].
#[derive(Debug, Clone)]
pub enum FileSource {
    /// Read the content from a host file at upload time.
    Path(PathBuf),
    /// Use the given bytes directly.
    Bytes(Vec<u8>),
}

/// A file injected into the container filesystem via tar upload.
#[derive(Debug, Clone)]
pub struct FileMapping {
    /// Where the content comes from.
    pub source: FileSource,
    /// Absolute target path inside the container.
    pub target: String,
    /// Unix mode bits for the created file, e.g. `0o644`.
    pub mode: u32,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn bind_mount_realizes_engine_spec() {
        let mount = Mount {
            source: MountSource::Bind(PathBuf::from("/host/data")),
            target: "/data".to_string(),
            access: AccessMode::ReadOnly,
        };

        let engine = mount.to_engine_mount();
        assert_eq!(engine.source.as_deref(), Some("/host/data"));
        assert_eq!(engine.target.as_deref(), Some("/data"));
        assert_eq!(engine.typ, Some(MountTypeEnum::BIND));
        assert_eq!(engine.read_only, Some(true));
    }
}
