//! Tick-scoped camera image.
//!
//! The notifier uploads the photo from disk, so the frame is written to the
//! configured path for the lifetime of one dispatch and removed on drop.

#![allow(missing_docs)]

use std::fs;
use std::io;
use std::path::{Path, PathBuf};

use crate::core::errors::{MonitorError, Result};

#[derive(Debug)]
pub struct ImageArtifact {
    path: PathBuf,
    bytes: Vec<u8>,
}

impl ImageArtifact {
    /// Write `bytes` to `path`, replacing any leftover from an earlier tick.
    pub fn persist(path: &Path, bytes: Vec<u8>) -> Result<Self> {
        fs::write(path, &bytes).map_err(|source| MonitorError::io(path, source))?;
        Ok(Self {
            path: path.to_path_buf(),
            bytes,
        })
    }

    #[must_use]
    pub fn path(&self) -> &Path {
        &self.path
    }

    #[must_use]
    pub fn bytes(&self) -> &[u8] {
        &self.bytes
    }
}

impl Drop for ImageArtifact {
    fn drop(&mut self) {
        let _ = remove_stale(&self.path);
    }
}

/// Remove a leftover artifact. A missing file is not an error.
pub fn remove_stale(path: &Path) -> io::Result<bool> {
    match fs::remove_file(path) {
        Ok(()) => Ok(true),
        Err(e) if e.kind() == io::ErrorKind::NotFound => Ok(false),
        Err(e) => Err(e),
    }
}
