//! Pipeline orchestrator.
//!
//! Runs the six stages strictly in order under the run lock, logs every
//! transition to the run's event log, publishes the live state on a watch
//! channel, and always mirrors the run directory to the remote before
//! reporting the outcome.

use std::future::Future;
use std::path::PathBuf;
use std::time::Instant;

use anyhow::Result;
use chrono::Local;
use tokio::sync::watch;
use tracing::{debug, error, info, instrument, warn};

use super::artifact_store::ArtifactStore;
use super::error::PipelineError;
use super::gates::QualityViolation;
use super::guard::RunGuard;
use crate::adapters::{self, ArtifactSync, DataSource};
use crate::config::{paths, PipelineConfig};
use crate::domain::{
    EvaluationArtifact, Event, EventType, IngestionArtifact, PipelineState, PusherArtifact, Schema,
    Stage, StageStatus, TrainerArtifact, TransformationArtifact, ValidationArtifact,
};
use crate::ml::GradientBoosting;
use crate::stages::{
    DataIngestion, DataTransformation, DataValidation, ModelEvaluation, ModelPusher, ModelTrainer,
};

/// Everything a successful run produced
#[derive(Debug, Clone)]
pub struct PipelineRun {
    pub run_id: String,
    pub run_dir: PathBuf,
    pub ingestion: IngestionArtifact,
    pub validation: ValidationArtifact,
    pub transformation: TransformationArtifact,
    pub trainer: TrainerArtifact,
    pub evaluation: EvaluationArtifact,
    pub pusher: PusherArtifact,
    /// Whether every terminal sync succeeded
    pub synced: bool,
}

/// Owns the collaborators for one pipeline and runs it on demand
pub struct TrainingPipeline {
    config: PipelineConfig,
    schema: Schema,
    source: Box<dyn DataSource>,
    sync: Box<dyn ArtifactSync>,
    state: watch::Sender<PipelineState>,
}

impl TrainingPipeline {
    /// Build a pipeline from explicit collaborators
    pub fn new(
        config: PipelineConfig,
        schema: Schema,
        source: Box<dyn DataSource>,
        sync: Box<dyn ArtifactSync>,
    ) -> Self {
        let (state, _) = watch::channel(PipelineState::Idle);
        Self {
            config,
            schema,
            source,
            sync,
            state,
        }
    }

    /// Validate the config, load the schema and connect to the data source.
    ///
    /// Every failure here is a startup failure: no run directory exists yet.
    pub fn from_config(config: PipelineConfig) -> Result<Self, PipelineError> {
        let startup = |e: anyhow::Error| PipelineError::new(Stage::Startup, e);

        config.validate().map_err(|e| startup(e.into()))?;
        let url = config.require_connection_url().map_err(|e| startup(e.into()))?;
        let schema = Schema::from_file(&config.schema_file).map_err(|e| startup(e.into()))?;
        let source = adapters::connect(url).map_err(|e| startup(e.into()))?;
        let sync = adapters::sync_target(config.remote.as_deref());

        info!(
            source = source.name(),
            sync = sync.name(),
            schema = %config.schema_file.display(),
            "Pipeline configured"
        );
        Ok(Self::new(config, schema, source, sync))
    }

    pub fn config(&self) -> &PipelineConfig {
        &self.config
    }

    /// Watch the live pipeline state
    pub fn subscribe(&self) -> watch::Receiver<PipelineState> {
        self.state.subscribe()
    }

    pub fn state(&self) -> PipelineState {
        self.state.borrow().clone()
    }

    pub fn is_running(&self) -> bool {
        self.state.borrow().is_running()
    }

    /// Execute the pipeline once.
    ///
    /// Returns the produced artifacts, or the first fatal failure with the
    /// stage it came from. The run directory is synced either way.
    #[instrument(skip(self), fields(pipeline = paths::PIPELINE_NAME))]
    pub async fn run_pipeline(&self) -> Result<PipelineRun, PipelineError> {
        let _guard =
            RunGuard::acquire(&self.config.artifact_dir).map_err(|e| PipelineError::new(Stage::Startup, e))?;
        let store = ArtifactStore::create(&self.config.artifact_dir, Local::now())
            .await
            .map_err(|e| PipelineError::new(Stage::Startup, e))?;

        info!(run_id = %store.run_id(), run_dir = %store.run_dir().display(), "Starting pipeline run");

        if matches!(*self.state.borrow(), PipelineState::Synced { .. }) {
            self.transition(PipelineState::Idle);
        }
        self.record(
            &store,
            Event::new(
                store.run_id(),
                None,
                EventType::RunStarted,
                paths::PIPELINE_NAME,
                StageStatus::Running,
            ),
        )
        .await;

        match self.execute(&store).await {
            Ok(mut run) => {
                self.record(
                    &store,
                    Event::new(
                        store.run_id(),
                        None,
                        EventType::RunCompleted,
                        format!("Pipeline '{}' completed", paths::PIPELINE_NAME),
                        StageStatus::Completed,
                    ),
                )
                .await;

                run.synced = self.sync_artifacts(&store, true).await;
                self.transition(PipelineState::Synced { succeeded: true });
                info!(run_id = %store.run_id(), synced = run.synced, "Run completed successfully");
                Ok(run)
            }
            Err(err) => {
                let message = err.to_string();
                self.transition(PipelineState::Aborted {
                    stage: err.stage,
                    error: message.clone(),
                });
                self.record(
                    &store,
                    Event::new(
                        store.run_id(),
                        Some(err.stage),
                        EventType::RunFailed,
                        format!("Run failed in {}", err.stage),
                        StageStatus::Failed,
                    )
                    .with_error(message),
                )
                .await;

                self.sync_artifacts(&store, false).await;
                self.transition(PipelineState::Synced { succeeded: false });
                error!(run_id = %store.run_id(), stage = %err.stage, kind = %err.kind, "Run failed");
                Err(err)
            }
        }
    }

    async fn execute(&self, store: &ArtifactStore) -> Result<PipelineRun, PipelineError> {
        let config = &self.config;

        let ingestion = self
            .run_stage(store, Stage::Ingestion, async {
                DataIngestion::new(
                    self.source.as_ref(),
                    &self.schema,
                    &config.source,
                    &config.ingestion,
                    store.ingestion_paths(),
                )
                .initiate_data_ingestion()
                .await
            })
            .await?;

        let validation = self
            .run_stage(store, Stage::Validation, async {
                DataValidation::new(&self.schema, &config.validation, store.validation_paths())
                    .initiate_data_validation(&ingestion)
                    .await
            })
            .await?;

        let transformation = self
            .run_stage(store, Stage::Transformation, async {
                DataTransformation::new(&self.schema, &config.transformation, store.transformation_paths())
                    .initiate_data_transformation(&validation)
                    .await
            })
            .await?;

        let trainer = self
            .run_stage(store, Stage::Training, async {
                let estimator = GradientBoosting::new(config.boosting.clone());
                ModelTrainer::new(estimator, &config.gates, store.trainer_paths())
                    .initiate_model_trainer(&transformation)
                    .await
            })
            .await?;

        let evaluation = self
            .run_stage(store, Stage::Evaluation, async {
                let evaluation = ModelEvaluation::new(
                    &self.schema,
                    &config.gates,
                    &config.saved_model_dir,
                    store.evaluation_paths(),
                )
                .initiate_model_evaluation(&validation, &trainer)
                .await?;

                if !evaluation.is_model_accepted {
                    self.transition(PipelineState::Rejected);
                    return Err(anyhow::Error::new(QualityViolation::NotBetterThanBest {
                        improved: evaluation.improved_accuracy.unwrap_or_default(),
                        threshold: config.gates.change_threshold,
                    }));
                }
                self.transition(PipelineState::Accepted);
                Ok::<_, anyhow::Error>(evaluation)
            })
            .await?;

        let pusher = self
            .run_stage(store, Stage::Pusher, async {
                ModelPusher::new(store.pusher_paths(&config.saved_model_dir))
                    .initiate_model_pusher(&evaluation)
                    .await
            })
            .await?;

        Ok(PipelineRun {
            run_id: store.run_id().to_string(),
            run_dir: store.run_dir().to_path_buf(),
            ingestion,
            validation,
            transformation,
            trainer,
            evaluation,
            pusher,
            synced: false,
        })
    }

    /// Run one stage with state, events and error attribution
    async fn run_stage<T, F>(&self, store: &ArtifactStore, stage: Stage, work: F) -> Result<T, PipelineError>
    where
        F: Future<Output = Result<T>>,
    {
        if let Some(state) = PipelineState::for_stage(stage) {
            self.transition(state);
        }
        info!(%stage, "Stage started");
        self.record(
            store,
            Event::new(
                store.run_id(),
                Some(stage),
                EventType::StageStarted,
                format!("Starting {}", stage),
                StageStatus::Running,
            ),
        )
        .await;

        let started = Instant::now();
        let result = work.await;
        let duration_ms = started.elapsed().as_millis() as u64;

        match result {
            Ok(artifact) => {
                info!(%stage, duration_ms, "Stage completed");
                self.record(
                    store,
                    Event::new(
                        store.run_id(),
                        Some(stage),
                        EventType::StageCompleted,
                        format!("{} completed in {}ms", stage, duration_ms),
                        StageStatus::Completed,
                    )
                    .with_duration(duration_ms),
                )
                .await;
                Ok(artifact)
            }
            Err(e) => {
                let err = PipelineError::new(stage, e);
                error!(%stage, kind = %err.kind, error = %err, "Stage failed");
                self.record(
                    store,
                    Event::new(
                        store.run_id(),
                        Some(stage),
                        EventType::StageFailed,
                        format!("{} failed after {}ms", stage, duration_ms),
                        StageStatus::Failed,
                    )
                    .with_duration(duration_ms)
                    .with_error(err.to_string()),
                )
                .await;
                Err(err)
            }
        }
    }

    /// Mirror the run directory, plus the model registry after a success.
    ///
    /// Failures are logged and recorded, never raised.
    async fn sync_artifacts(&self, store: &ArtifactStore, succeeded: bool) -> bool {
        let mut ok = true;

        let destination = format!("{}/{}", paths::REMOTE_ARTIFACT_PREFIX, store.run_id());
        if let Err(e) = self.sync.sync_folder(store.run_dir(), &destination).await {
            ok = false;
            self.record_sync_failure(store, &destination, &e).await;
        }

        if succeeded {
            let registry = &self.config.saved_model_dir;
            if let Err(e) = self
                .sync
                .sync_folder(registry, paths::REMOTE_SAVED_MODELS_PREFIX)
                .await
            {
                ok = false;
                self.record_sync_failure(store, paths::REMOTE_SAVED_MODELS_PREFIX, &e)
                    .await;
            }
        }

        ok
    }

    async fn record_sync_failure(&self, store: &ArtifactStore, destination: &str, error: &anyhow::Error) {
        warn!(sync = self.sync.name(), destination, error = %format!("{:#}", error), "Artifact sync failed");
        self.record(
            store,
            Event::new(
                store.run_id(),
                Some(Stage::Sync),
                EventType::SyncFailed,
                format!("Sync to {} failed", destination),
                StageStatus::Failed,
            )
            .with_error(format!("{:#}", error)),
        )
        .await;
    }

    /// Append to the event log; a failed write is logged, not fatal
    async fn record(&self, store: &ArtifactStore, event: Event) {
        if let Err(e) = store.append(&event).await {
            warn!(event_type = ?event.event_type, error = %e, "Failed to record event");
        }
    }

    fn transition(&self, next: PipelineState) {
        let current = self.state.borrow().clone();
        if !current.can_transition_to(&next) {
            warn!(from = ?current, to = ?next, "Unexpected pipeline state transition");
        }
        debug!(from = ?current, to = ?next, "Pipeline state");
        self.state.send_replace(next);
    }
}
