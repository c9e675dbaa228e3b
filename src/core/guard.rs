//! Exclusive run guard.
//!
//! Holds an advisory `fs2` lock on `<artifact_dir>/.pipeline.lock` for as
//! long as the guard lives. A second pipeline pointed at the same artifact
//! directory fails fast with [`RunLocked`] instead of interleaving writes.

use std::fs::{File, OpenOptions};
use std::io::Write;
use std::path::{Path, PathBuf};

use anyhow::Context;
use fs2::FileExt;
use thiserror::Error;
use tracing::{debug, warn};

use crate::config::paths;

/// Another run holds the lock
#[derive(Debug, Error)]
#[error("Another pipeline run is active (lock held on {path})")]
pub struct RunLocked {
    pub path: PathBuf,
}

/// Lock held for the lifetime of one run
#[derive(Debug)]
pub struct RunGuard {
    file: File,
    path: PathBuf,
}

impl RunGuard {
    /// Try to take the run lock without blocking
    pub fn acquire(artifact_dir: &Path) -> anyhow::Result<Self> {
        std::fs::create_dir_all(artifact_dir)
            .with_context(|| format!("Failed to create artifact directory: {}", artifact_dir.display()))?;

        let path = artifact_dir.join(paths::LOCK_FILE_NAME);
        let mut file = OpenOptions::new()
            .create(true)
            .read(true)
            .write(true)
            .truncate(false)
            .open(&path)
            .with_context(|| format!("Failed to open lock file: {}", path.display()))?;

        if file.try_lock_exclusive().is_err() {
            return Err(RunLocked { path }.into());
        }

        // Record the holder for humans inspecting a stuck lock
        file.set_len(0).ok();
        writeln!(file, "{}", std::process::id()).ok();

        debug!(path = %path.display(), "Acquired run lock");
        Ok(Self { file, path })
    }

    pub fn path(&self) -> &Path {
        &self.path
    }
}

impl Drop for RunGuard {
    fn drop(&mut self) {
        if let Err(e) = self.file.unlock() {
            warn!(path = %self.path.display(), error = %e, "Failed to release run lock");
        } else {
            debug!(path = %self.path.display(), "Released run lock");
        }
    }
}
