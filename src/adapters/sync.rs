//! Remote artifact sync adapters.
//!
//! `AwsCliSync` shells out to `aws s3 sync`, the same way the pipeline
//! would be synced by hand. `LocalMirror` copies into another directory
//! (a mounted bucket, a backup disk, or a test fixture).

use std::path::{Path, PathBuf};
use std::process::Stdio;

use anyhow::{Context, Result};
use async_trait::async_trait;
use tokio::process::Command;
use tracing::{debug, info};

use super::ArtifactSync;

/// `aws s3 sync <folder> <bucket>/<destination>`
pub struct AwsCliSync {
    /// Bucket root, e.g. `s3://sensor-artifacts`
    bucket_url: String,

    /// Path to the aws binary (default: "aws")
    binary_path: String,
}

impl AwsCliSync {
    pub fn new(bucket_url: impl Into<String>) -> Self {
        Self {
            bucket_url: bucket_url.into().trim_end_matches('/').to_string(),
            binary_path: "aws".to_string(),
        }
    }

    /// Use a custom aws binary
    pub fn with_binary_path(mut self, binary_path: impl Into<String>) -> Self {
        self.binary_path = binary_path.into();
        self
    }

    pub fn remote_url(&self, destination: &str) -> String {
        format!("{}/{}", self.bucket_url, destination.trim_matches('/'))
    }
}

#[async_trait]
impl ArtifactSync for AwsCliSync {
    fn name(&self) -> &str {
        "aws-s3"
    }

    async fn sync_folder(&self, folder: &Path, destination: &str) -> Result<()> {
        let remote = self.remote_url(destination);
        debug!(folder = %folder.display(), %remote, "Running aws s3 sync");

        let output = Command::new(&self.binary_path)
            .arg("s3")
            .arg("sync")
            .arg(folder)
            .arg(&remote)
            .stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .output()
            .await
            .with_context(|| format!("Failed to spawn '{}' for s3 sync", self.binary_path))?;

        if !output.status.success() {
            let stderr = String::from_utf8_lossy(&output.stderr);
            let exit_code = output.status.code().unwrap_or(-1);
            anyhow::bail!(
                "aws s3 sync to {} failed with exit code {}: {}",
                remote,
                exit_code,
                stderr.trim()
            );
        }

        info!(folder = %folder.display(), %remote, "Synced folder to s3");
        Ok(())
    }
}

/// Recursive copy into `<root>/<destination>`
pub struct LocalMirror {
    root: PathBuf,
}

impl LocalMirror {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }

    pub fn root(&self) -> &Path {
        &self.root
    }
}

#[async_trait]
impl ArtifactSync for LocalMirror {
    fn name(&self) -> &str {
        "local-mirror"
    }

    async fn sync_folder(&self, folder: &Path, destination: &str) -> Result<()> {
        if !folder.is_dir() {
            anyhow::bail!("Nothing to sync: {} is not a directory", folder.display());
        }

        let target = self.root.join(destination.trim_matches('/'));
        let copied = copy_tree(folder, &target).await?;
        info!(folder = %folder.display(), target = %target.display(), files = copied, "Mirrored folder");
        Ok(())
    }
}

/// Copy every file under `from` into `to`, returning the file count
async fn copy_tree(from: &Path, to: &Path) -> Result<usize> {
    let mut pending = vec![(from.to_path_buf(), to.to_path_buf())];
    let mut copied = 0usize;

    while let Some((src_dir, dst_dir)) = pending.pop() {
        tokio::fs::create_dir_all(&dst_dir)
            .await
            .with_context(|| format!("Failed to create directory: {}", dst_dir.display()))?;

        let mut entries = tokio::fs::read_dir(&src_dir)
            .await
            .with_context(|| format!("Failed to read directory: {}", src_dir.display()))?;

        while let Some(entry) = entries.next_entry().await? {
            let src = entry.path();
            let dst = dst_dir.join(entry.file_name());
            if entry.file_type().await?.is_dir() {
                pending.push((src, dst));
            } else {
                tokio::fs::copy(&src, &dst)
                    .await
                    .with_context(|| format!("Failed to copy {} to {}", src.display(), dst.display()))?;
                copied += 1;
            }
        }
    }

    Ok(copied)
}

/// No remote configured
pub struct DisabledSync;

#[async_trait]
impl ArtifactSync for DisabledSync {
    fn name(&self) -> &str {
        "disabled"
    }

    async fn sync_folder(&self, folder: &Path, destination: &str) -> Result<()> {
        debug!(folder = %folder.display(), destination, "Remote sync disabled, skipping");
        Ok(())
    }
}
