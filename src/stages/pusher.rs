//! Model pusher: publish an accepted model to the run directory and the
//! versioned saved-model registry.

use std::io::Write;
use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use sha2::{Digest, Sha256};
use tempfile::NamedTempFile;
use tracing::{info, instrument};

use crate::core::artifact_store::PusherPaths;
use crate::domain::{EvaluationArtifact, PusherArtifact};

pub struct ModelPusher {
    paths: PusherPaths,
}

impl ModelPusher {
    pub fn new(paths: PusherPaths) -> Self {
        Self { paths }
    }

    #[instrument(skip_all, name = "model_pusher")]
    pub async fn initiate_model_pusher(&self, evaluation: &EvaluationArtifact) -> Result<PusherArtifact> {
        if !evaluation.is_model_accepted {
            anyhow::bail!(
                "Refusing to push rejected model: {}",
                evaluation.trained_model_path.display()
            );
        }

        let bytes = tokio::fs::read(&evaluation.trained_model_path)
            .await
            .with_context(|| format!("Failed to read trained model: {}", evaluation.trained_model_path.display()))?;
        let model_sha256 = hex::encode(Sha256::digest(&bytes));

        write_atomic(self.paths.model_file_path.clone(), bytes.clone()).await?;
        write_atomic(self.paths.saved_model_path.clone(), bytes).await?;

        info!(
            saved_model_path = %self.paths.saved_model_path.display(),
            sha256 = %model_sha256,
            "Model pushed"
        );

        Ok(PusherArtifact {
            saved_model_path: self.paths.saved_model_path.clone(),
            model_file_path: self.paths.model_file_path.clone(),
            model_sha256,
        })
    }
}

/// Write through a temp file in the target directory, then rename into place
async fn write_atomic(path: PathBuf, bytes: Vec<u8>) -> Result<()> {
    tokio::task::spawn_blocking(move || persist(&path, &bytes))
        .await
        .context("Model write task panicked")?
}

fn persist(path: &Path, bytes: &[u8]) -> Result<()> {
    let dir = path
        .parent()
        .with_context(|| format!("No parent directory for {}", path.display()))?;
    std::fs::create_dir_all(dir).with_context(|| format!("Failed to create directory: {}", dir.display()))?;

    let mut tmp = NamedTempFile::new_in(dir).context("Failed to create temp file")?;
    tmp.write_all(bytes).context("Failed to write temp file")?;
    tmp.as_file().sync_all().context("Failed to sync temp file")?;
    tmp.persist(path)
        .with_context(|| format!("Failed to move model into place: {}", path.display()))?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::ClassificationMetric;
    use tempfile::TempDir;

    fn evaluation(trained: PathBuf, accepted: bool) -> EvaluationArtifact {
        EvaluationArtifact {
            is_model_accepted: accepted,
            improved_accuracy: None,
            best_model_path: None,
            trained_model_path: trained,
            train_model_metric_artifact: ClassificationMetric {
                f1_score: 0.9,
                precision_score: 0.9,
                recall_score: 0.9,
            },
            best_model_metric_artifact: None,
        }
    }

    fn paths(temp: &TempDir) -> PusherPaths {
        PusherPaths {
            model_file_path: temp.path().join("run/model_pusher/model.json"),
            saved_model_path: temp.path().join("saved_models/1760779800/model.json"),
        }
    }

    #[tokio::test]
    async fn test_push_writes_identical_copies() {
        let temp = TempDir::new().unwrap();
        let trained = temp.path().join("trained.json");
        std::fs::write(&trained, b"{\"model\":1}").unwrap();

        let pusher = ModelPusher::new(paths(&temp));
        let artifact = pusher.initiate_model_pusher(&evaluation(trained, true)).await.unwrap();

        assert_eq!(std::fs::read(&artifact.model_file_path).unwrap(), b"{\"model\":1}");
        assert_eq!(std::fs::read(&artifact.saved_model_path).unwrap(), b"{\"model\":1}");
        assert_eq!(artifact.model_sha256, hex::encode(Sha256::digest(b"{\"model\":1}")));
    }

    #[tokio::test]
    async fn test_push_is_idempotent() {
        let temp = TempDir::new().unwrap();
        let trained = temp.path().join("trained.json");
        std::fs::write(&trained, b"weights").unwrap();

        let pusher = ModelPusher::new(paths(&temp));
        let first = pusher.initiate_model_pusher(&evaluation(trained.clone(), true)).await.unwrap();
        let second = pusher.initiate_model_pusher(&evaluation(trained, true)).await.unwrap();

        assert_eq!(first, second);
        assert_eq!(std::fs::read(&second.saved_model_path).unwrap(), b"weights");

        // No temp files left behind
        let entries = std::fs::read_dir(second.saved_model_path.parent().unwrap()).unwrap().count();
        assert_eq!(entries, 1);
    }

    #[tokio::test]
    async fn test_rejected_model_is_not_pushed() {
        let temp = TempDir::new().unwrap();
        let trained = temp.path().join("trained.json");
        std::fs::write(&trained, b"weights").unwrap();

        let pusher = ModelPusher::new(paths(&temp));
        assert!(pusher.initiate_model_pusher(&evaluation(trained, false)).await.is_err());
        assert!(!paths(&temp).saved_model_path.exists());
    }
}
