//! Run-scoped artifact layout with an append-only event log.
//!
//! Each run owns `<artifact_dir>/<run_id>/`. Stage outputs live in fixed
//! subdirectories (see `config::paths`) and every stage transition is
//! appended to `events.jsonl` in the same directory, so the run directory
//! alone is enough to reconstruct what happened.

use std::io::ErrorKind as IoErrorKind;
use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use chrono::{DateTime, Local, Utc};
use tokio::fs::{self, File, OpenOptions};
use tokio::io::{AsyncBufReadExt, AsyncWriteExt, BufReader};
use tracing::debug;

use crate::config::paths;
use crate::domain::{Event, Run};

/// Directory layout and event log for one run
#[derive(Debug, Clone)]
pub struct ArtifactStore {
    run_id: String,

    /// `<artifact_dir>/<run_id>`
    run_dir: PathBuf,

    /// Path to the events.jsonl file
    events_path: PathBuf,

    /// When the run started; also the saved-model version
    started_at: DateTime<Utc>,

    /// Suffix that kept this run id unique within its second (0 for none)
    collision: u32,
}

/// Where ingestion writes
#[derive(Debug, Clone, PartialEq)]
pub struct IngestionPaths {
    pub feature_store_file_path: PathBuf,
    pub training_file_path: PathBuf,
    pub testing_file_path: PathBuf,
}

/// Where validation writes
#[derive(Debug, Clone, PartialEq)]
pub struct ValidationPaths {
    pub valid_train_file_path: PathBuf,
    pub valid_test_file_path: PathBuf,
    pub invalid_train_file_path: PathBuf,
    pub invalid_test_file_path: PathBuf,
    pub drift_report_file_path: PathBuf,
}

/// Where transformation writes
#[derive(Debug, Clone, PartialEq)]
pub struct TransformationPaths {
    pub transformed_train_file_path: PathBuf,
    pub transformed_test_file_path: PathBuf,
    pub transformed_object_file_path: PathBuf,
}

/// Where training writes
#[derive(Debug, Clone, PartialEq)]
pub struct TrainerPaths {
    pub trained_model_file_path: PathBuf,
}

/// Where evaluation writes
#[derive(Debug, Clone, PartialEq)]
pub struct EvaluationPaths {
    pub report_file_path: PathBuf,
}

/// Where the pusher writes
#[derive(Debug, Clone, PartialEq)]
pub struct PusherPaths {
    /// Stable copy inside the run directory
    pub model_file_path: PathBuf,
    /// Versioned copy in the saved-model registry
    pub saved_model_path: PathBuf,
}

impl ArtifactStore {
    /// Create a fresh run directory named after `started_at`.
    ///
    /// If a run with the same second already exists a `_1`, `_2`, ...
    /// suffix is appended so two runs never share a root.
    pub async fn create(artifact_dir: &Path, started_at: DateTime<Local>) -> Result<Self> {
        fs::create_dir_all(artifact_dir)
            .await
            .with_context(|| format!("Failed to create artifact directory: {}", artifact_dir.display()))?;

        let base_id = started_at.format(paths::RUN_ID_FORMAT).to_string();
        let mut suffix = 0u32;

        loop {
            let run_id = if suffix == 0 {
                base_id.clone()
            } else {
                format!("{}_{}", base_id, suffix)
            };
            let run_dir = artifact_dir.join(&run_id);

            match fs::create_dir(&run_dir).await {
                Ok(()) => {
                    debug!(%run_id, run_dir = %run_dir.display(), "Created run directory");
                    return Ok(Self {
                        events_path: run_dir.join(paths::EVENTS_FILE_NAME),
                        run_id,
                        run_dir,
                        started_at: started_at.with_timezone(&Utc),
                        collision: suffix,
                    });
                }
                Err(e) if e.kind() == IoErrorKind::AlreadyExists => suffix += 1,
                Err(e) => {
                    return Err(e).with_context(|| {
                        format!("Failed to create run directory: {}", run_dir.display())
                    })
                }
            }
        }
    }

    /// Open an existing run directory
    pub async fn open(artifact_dir: &Path, run_id: &str) -> Result<Self> {
        let run_dir = artifact_dir.join(run_id);
        if !run_dir.is_dir() {
            anyhow::bail!("Run not found: {}", run_dir.display());
        }

        let mut store = Self {
            run_id: run_id.to_string(),
            events_path: run_dir.join(paths::EVENTS_FILE_NAME),
            run_dir,
            started_at: Utc::now(),
            collision: collision_suffix(run_id),
        };

        if let Some(first) = store.replay().await?.first() {
            store.started_at = first.timestamp;
        }

        Ok(store)
    }

    pub fn run_id(&self) -> &str {
        &self.run_id
    }

    pub fn run_dir(&self) -> &Path {
        &self.run_dir
    }

    pub fn events_path(&self) -> &Path {
        &self.events_path
    }

    pub fn started_at(&self) -> DateTime<Utc> {
        self.started_at
    }

    /// Version directory name used in the saved-model registry.
    ///
    /// Unix seconds of the start time, plus the run id's collision suffix
    /// so runs started in the same second push to distinct versions.
    pub fn model_version(&self) -> String {
        match self.collision {
            0 => self.started_at.timestamp().to_string(),
            n => format!("{}_{}", self.started_at.timestamp(), n),
        }
    }

    pub fn ingestion_paths(&self) -> IngestionPaths {
        let root = self.run_dir.join(paths::DATA_INGESTION_DIR_NAME);
        let ingested = root.join(paths::DATA_INGESTION_INGESTED_DIR);
        IngestionPaths {
            feature_store_file_path: root
                .join(paths::DATA_INGESTION_FEATURE_STORE_DIR)
                .join(paths::FILE_NAME),
            training_file_path: ingested.join(paths::TRAIN_FILE_NAME),
            testing_file_path: ingested.join(paths::TEST_FILE_NAME),
        }
    }

    pub fn validation_paths(&self) -> ValidationPaths {
        let root = self.run_dir.join(paths::DATA_VALIDATION_DIR_NAME);
        let valid = root.join(paths::DATA_VALIDATION_VALID_DIR);
        let invalid = root.join(paths::DATA_VALIDATION_INVALID_DIR);
        ValidationPaths {
            valid_train_file_path: valid.join(paths::TRAIN_FILE_NAME),
            valid_test_file_path: valid.join(paths::TEST_FILE_NAME),
            invalid_train_file_path: invalid.join(paths::TRAIN_FILE_NAME),
            invalid_test_file_path: invalid.join(paths::TEST_FILE_NAME),
            drift_report_file_path: root
                .join(paths::DATA_VALIDATION_DRIFT_REPORT_DIR)
                .join(paths::REPORT_FILE_NAME),
        }
    }

    pub fn transformation_paths(&self) -> TransformationPaths {
        let root = self.run_dir.join(paths::DATA_TRANSFORMATION_DIR_NAME);
        let data = root.join(paths::DATA_TRANSFORMATION_TRANSFORMED_DATA_DIR);
        TransformationPaths {
            transformed_train_file_path: data.join(paths::TRANSFORMED_TRAIN_FILE_NAME),
            transformed_test_file_path: data.join(paths::TRANSFORMED_TEST_FILE_NAME),
            transformed_object_file_path: root
                .join(paths::DATA_TRANSFORMATION_TRANSFORMED_OBJECT_DIR)
                .join(paths::PREPROCESSING_OBJECT_FILE_NAME),
        }
    }

    pub fn trainer_paths(&self) -> TrainerPaths {
        TrainerPaths {
            trained_model_file_path: self
                .run_dir
                .join(paths::MODEL_TRAINER_DIR_NAME)
                .join(paths::MODEL_TRAINER_TRAINED_MODEL_DIR)
                .join(paths::MODEL_FILE_NAME),
        }
    }

    pub fn evaluation_paths(&self) -> EvaluationPaths {
        EvaluationPaths {
            report_file_path: self
                .run_dir
                .join(paths::MODEL_EVALUATION_DIR_NAME)
                .join(paths::REPORT_FILE_NAME),
        }
    }

    pub fn pusher_paths(&self, saved_model_dir: &Path) -> PusherPaths {
        PusherPaths {
            model_file_path: self
                .run_dir
                .join(paths::MODEL_PUSHER_DIR_NAME)
                .join(paths::MODEL_FILE_NAME),
            saved_model_path: saved_model_dir
                .join(self.model_version())
                .join(paths::MODEL_FILE_NAME),
        }
    }

    /// Append an event to the log
    pub async fn append(&self, event: &Event) -> Result<()> {
        let mut file = OpenOptions::new()
            .create(true)
            .append(true)
            .open(&self.events_path)
            .await
            .with_context(|| format!("Failed to open events file: {}", self.events_path.display()))?;

        let mut line = serde_json::to_string(event).context("Failed to serialize event")?;
        line.push('\n');
        file.write_all(line.as_bytes())
            .await
            .context("Failed to write event")?;
        file.flush().await.context("Failed to flush event")?;

        Ok(())
    }

    /// Replay all events in order
    pub async fn replay(&self) -> Result<Vec<Event>> {
        if !self.events_path.exists() {
            return Ok(Vec::new());
        }

        let file = File::open(&self.events_path)
            .await
            .with_context(|| format!("Failed to open events file: {}", self.events_path.display()))?;

        let mut lines = BufReader::new(file).lines();
        let mut events = Vec::new();

        while let Some(line) = lines.next_line().await? {
            if line.trim().is_empty() {
                continue;
            }
            let event: Event = serde_json::from_str(&line)
                .with_context(|| format!("Failed to parse event: {}", line))?;
            events.push(event);
        }

        Ok(events)
    }

    /// Reconstruct the run from its event log
    pub async fn load_run(&self) -> Result<Option<Run>> {
        Ok(Run::from_events(&self.replay().await?))
    }

    /// List run ids under `artifact_dir`, newest first.
    ///
    /// Only directories holding an event log count as runs.
    pub async fn list_runs(artifact_dir: &Path) -> Result<Vec<String>> {
        if !artifact_dir.exists() {
            return Ok(Vec::new());
        }

        let mut runs: Vec<(std::time::SystemTime, String)> = Vec::new();
        let mut entries = fs::read_dir(artifact_dir).await?;

        while let Some(entry) = entries.next_entry().await? {
            if !entry.file_type().await?.is_dir() {
                continue;
            }
            let events = entry.path().join(paths::EVENTS_FILE_NAME);
            let Ok(meta) = fs::metadata(&events).await else {
                continue;
            };
            if let Some(name) = entry.file_name().to_str() {
                let created = meta
                    .created()
                    .or_else(|_| meta.modified())
                    .unwrap_or(std::time::UNIX_EPOCH);
                runs.push((created, name.to_string()));
            }
        }

        runs.sort_by(|a, b| b.0.cmp(&a.0).then_with(|| b.1.cmp(&a.1)));
        Ok(runs.into_iter().map(|(_, name)| name).collect())
    }
}

/// The `_N` suffix of a run id, if it carries one
fn collision_suffix(run_id: &str) -> u32 {
    let parts: Vec<&str> = run_id.split('_').collect();
    match parts.as_slice() {
        [_, _, _, _, _, _, suffix] => suffix.parse().unwrap_or(0),
        _ => 0,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::{EventType, Stage, StageStatus};
    use chrono::TimeZone;
    use tempfile::TempDir;

    fn fixed_start() -> DateTime<Local> {
        Local.with_ymd_and_hms(2026, 10, 18, 9, 30, 0).unwrap()
    }

    #[tokio::test]
    async fn test_run_id_collision_gets_suffix() {
        let temp = TempDir::new().unwrap();

        let first = ArtifactStore::create(temp.path(), fixed_start()).await.unwrap();
        let second = ArtifactStore::create(temp.path(), fixed_start()).await.unwrap();
        let third = ArtifactStore::create(temp.path(), fixed_start()).await.unwrap();

        assert_eq!(first.run_id(), "10_18_2026_09_30_00");
        assert_eq!(second.run_id(), "10_18_2026_09_30_00_1");
        assert_eq!(third.run_id(), "10_18_2026_09_30_00_2");
        assert!(second.run_dir().is_dir());
    }

    #[tokio::test]
    async fn test_same_second_runs_push_to_distinct_versions() {
        let temp = TempDir::new().unwrap();
        let models = temp.path().join("saved_models");

        let first = ArtifactStore::create(temp.path(), fixed_start()).await.unwrap();
        let second = ArtifactStore::create(temp.path(), fixed_start()).await.unwrap();

        let secs = fixed_start().timestamp();
        assert_eq!(first.model_version(), secs.to_string());
        assert_eq!(second.model_version(), format!("{}_1", secs));
        assert_ne!(
            first.pusher_paths(&models).saved_model_path,
            second.pusher_paths(&models).saved_model_path
        );

        let reopened = ArtifactStore::open(temp.path(), second.run_id()).await.unwrap();
        assert_eq!(reopened.collision, 1);
        assert_eq!(collision_suffix("10_18_2026_09_30_00"), 0);
    }

    #[tokio::test]
    async fn test_stage_layout() {
        let temp = TempDir::new().unwrap();
        let store = ArtifactStore::create(temp.path(), fixed_start()).await.unwrap();
        let root = store.run_dir().to_path_buf();

        let ingestion = store.ingestion_paths();
        assert_eq!(
            ingestion.feature_store_file_path,
            root.join("data_ingestion/feature_store/sensor.csv")
        );
        assert_eq!(ingestion.training_file_path, root.join("data_ingestion/ingested/train.csv"));

        let validation = store.validation_paths();
        assert_eq!(
            validation.invalid_test_file_path,
            root.join("data_validation/invalid/test.csv")
        );
        assert_eq!(
            validation.drift_report_file_path,
            root.join("data_validation/drift_report/report.yaml")
        );

        let transformation = store.transformation_paths();
        assert_eq!(
            transformation.transformed_object_file_path,
            root.join("data_transformation/transformed_object/preprocessing.json")
        );

        let pusher = store.pusher_paths(Path::new("/models"));
        assert_eq!(
            pusher.saved_model_path,
            Path::new("/models")
                .join(fixed_start().timestamp().to_string())
                .join("model.json")
        );
        assert_eq!(pusher.model_file_path, root.join("model_pusher/model.json"));
    }

    #[tokio::test]
    async fn test_event_append_and_replay() {
        let temp = TempDir::new().unwrap();
        let store = ArtifactStore::create(temp.path(), fixed_start()).await.unwrap();
        let run_id = store.run_id().to_string();

        store
            .append(&Event::new(&run_id, None, EventType::RunStarted, "sensor", StageStatus::Running))
            .await
            .unwrap();
        for stage in [Stage::Ingestion, Stage::Validation] {
            store
                .append(&Event::new(
                    &run_id,
                    Some(stage),
                    EventType::StageCompleted,
                    format!("{} completed", stage),
                    StageStatus::Completed,
                ))
                .await
                .unwrap();
        }

        let events = store.replay().await.unwrap();
        assert_eq!(events.len(), 3);
        assert_eq!(events[0].event_type, EventType::RunStarted);
        assert_eq!(events[2].stage, Some(Stage::Validation));

        let reopened = ArtifactStore::open(temp.path(), &run_id).await.unwrap();
        assert_eq!(reopened.started_at(), events[0].timestamp);
        let run = reopened.load_run().await.unwrap().unwrap();
        assert!(run.is_stage_completed(Stage::Validation));
    }

    #[tokio::test]
    async fn test_list_runs_skips_foreign_dirs() {
        let temp = TempDir::new().unwrap();
        let store = ArtifactStore::create(temp.path(), fixed_start()).await.unwrap();
        store
            .append(&Event::new(store.run_id(), None, EventType::RunStarted, "sensor", StageStatus::Running))
            .await
            .unwrap();
        std::fs::create_dir_all(temp.path().join("scratch")).unwrap();

        let runs = ArtifactStore::list_runs(temp.path()).await.unwrap();
        assert_eq!(runs, vec![store.run_id().to_string()]);

        assert!(ArtifactStore::list_runs(&temp.path().join("missing"))
            .await
            .unwrap()
            .is_empty());
        assert!(ArtifactStore::open(temp.path(), "nope").await.is_err());
    }
}
