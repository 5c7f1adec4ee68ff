//! Tar staging.
//!
//! Files injected into a container travel as a POSIX tar stream with
//! explicit Unix mode bits per entry; that stream is the exact payload
//! handed to the engine's filesystem-write operation. Image build contexts
//! use the same staging plus gzip compression.

use crate::config::{FileMapping, FileSource};
use crate::{Error, Result};
use flate2::write::GzEncoder;
use flate2::Compression;
use std::fs;
use std::path::Path;

/// Builds an in-memory POSIX tar stream with explicit file modes.
pub struct TarStager {
    builder: tar::Builder<Vec<u8>>,
}

impl Default for TarStager {
    fn default() -> Self {
        Self::new()
    }
}

impl TarStager {
    /// Create an empty stager.
    pub fn new() -> Self {
        Self {
            builder: tar::Builder::new(Vec::new()),
        }
    }

    /// Append an entry with the given content and mode under the given
    /// absolute container path.
    pub fn append_bytes(&mut self, target: &str, mode: u32, content: &[u8]) -> Result<()> {
        let mut header = tar::Header::new_ustar();
        header.set_size(content.len() as u64);
        header.set_mode(mode);
        header.set_mtime(0);
        header.set_cksum();

        // Entries are extracted relative to the upload root.
        let path = target.trim_start_matches('/');
        if path.is_empty() {
            return Err(Error::Configuration(format!(
                "invalid tar target path: {target}"
            )));
        }

        self.builder.append_data(&mut header, path, content)?;
        Ok(())
    }

    /// Append a host file under the given absolute container path,
    /// overriding its mode bits.
    pub fn append_file(&mut self, source: &Path, target: &str, mode: u32) -> Result<()> {
        let content = fs::read(source)?;
        self.append_bytes(target, mode, &content)
    }

    /// Finish the archive and return its bytes.
    pub fn into_bytes(mut self) -> Result<Vec<u8>> {
        self.builder.finish()?;
        Ok(self.builder.into_inner()?)
    }
}

/// Stage a set of file mappings into one tar stream.
pub fn stage_mappings(mappings: &[FileMapping]) -> Result<Vec<u8>> {
    let mut stager = TarStager::new();
    for mapping in mappings {
        match &mapping.source {
            FileSource::Path(path) => {
                stager.append_file(path, &mapping.target, mapping.mode)?;
            }
            FileSource::Bytes(content) => {
                stager.append_bytes(&mapping.target, mapping.mode, content)?;
            }
        }
    }
    stager.into_bytes()
}

/// Tar and gzip a directory tree, preserving on-disk modes. Used as an image
/// build context.
pub fn gzipped_dir(dir: &Path) -> Result<Vec<u8>> {
    let encoder = GzEncoder::new(Vec::new(), Compression::default());
    let mut builder = tar::Builder::new(encoder);
    builder.append_dir_all(".", dir)?;
    let encoder = builder.into_inner()?;
    Ok(encoder.finish()?)
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Read;

    fn entries(archive: &[u8]) -> Vec<(String, u32, Vec<u8>)> {
        let mut reader = tar::Archive::new(archive);
        reader
            .entries()
            .unwrap()
            .map(|entry| {
                let mut entry = entry.unwrap();
                let path = entry.path().unwrap().display().to_string();
                let mode = entry.header().mode().unwrap();
                let mut content = Vec::new();
                entry.read_to_end(&mut content).unwrap();
                (path, mode, content)
            })
            .collect()
    }

    #[test]
    fn staged_entry_preserves_mode_and_content() {
        let mut stager = TarStager::new();
        stager
            .append_bytes("/etc/app/config.yml", 0o600, b"key: value\n")
            .unwrap();
        let archive = stager.into_bytes().unwrap();

        let entries = entries(&archive);
        assert_eq!(entries.len(), 1);
        let (path, mode, content) = &entries[0];
        assert_eq!(path, "etc/app/config.yml");
        assert_eq!(*mode, 0o600);
        assert_eq!(content, b"key: value\n");
    }

    #[test]
    fn stages_mappings_in_order() {
        let mappings = vec![
            FileMapping {
                source: FileSource::Bytes(b"#!/bin/sh\n".to_vec()),
                target: "/usr/local/bin/entry.sh".to_string(),
                mode: 0o755,
            },
            FileMapping {
                source: FileSource::Bytes(b"cert".to_vec()),
                target: "/certs/server.pem".to_string(),
                mode: 0o644,
            },
        ];

        let archive = stage_mappings(&mappings).unwrap();
        let entries = entries(&archive);
        assert_eq!(entries[0].0, "usr/local/bin/entry.sh");
        assert_eq!(entries[0].1, 0o755);
        assert_eq!(entries[1].0, "certs/server.pem");
        assert_eq!(entries[1].1, 0o644);
    }

    #[test]
    fn rejects_empty_target() {
        let mut stager = TarStager::new();
        assert!(stager.append_bytes("/", 0o644, b"x").is_err());
    }

    #[test]
    fn gzipped_dir_round_trips() {
        let dir = tempfile::tempdir().unwrap();
        fs::write(dir.path().join("Dockerfile"), "FROM scratch\n").unwrap();

        let compressed = gzipped_dir(dir.path()).unwrap();
        let mut decoder = flate2::read::GzDecoder::new(compressed.as_slice());
        let mut raw = Vec::new();
        decoder.read_to_end(&mut raw).unwrap();

        let names: Vec<String> = entries(&raw).into_iter().map(|(p, _, _)| p).collect();
        assert!(names.iter().any(|name| name.ends_with("Dockerfile")));
    }
}
