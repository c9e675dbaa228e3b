//! Command-line interface for sensor-pipeline.
//!
//! Provides commands for running the training pipeline, inspecting runs,
//! scoring a CSV with a saved model, and showing the resolved config.

use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use clap::{Parser, Subcommand};

use crate::config::{self, PipelineConfig};
use crate::core::{ArtifactStore, TrainingPipeline};
use crate::domain::{DataFrame, Run, RunStatus, Value};
use crate::ml::estimator::load_object;
use crate::ml::{BoostedTrees, ModelResolver, SensorModel, TargetValueMapping};

/// Name of the column `predict` appends
pub const PREDICTION_COLUMN: &str = "predicted_class";

/// sensor-pipeline - Training pipeline for sensor fault classification
#[derive(Parser, Debug)]
#[command(name = "sensor-pipeline")]
#[command(author, version, about, long_about = None)]
pub struct Cli {
    #[command(subcommand)]
    pub command: Commands,
}

#[derive(Subcommand, Debug)]
pub enum Commands {
    /// Run the full training pipeline
    Train,

    /// Check the status of a run
    Status {
        /// Run ID (directory name under the artifact dir)
        run_id: String,
    },

    /// List recent runs
    Runs {
        /// Maximum number of runs to show
        #[arg(short, long, default_value = "10")]
        limit: usize,
    },

    /// Score a CSV file with a saved model
    Predict {
        /// CSV file with raw feature columns
        #[arg(short, long)]
        input: PathBuf,

        /// Model file (defaults to the latest saved model)
        #[arg(short, long)]
        model: Option<PathBuf>,

        /// Output CSV (prints to stdout if not provided)
        #[arg(short, long)]
        output: Option<PathBuf>,
    },

    /// Show resolved configuration (debug)
    Config,
}

impl Cli {
    /// Execute the CLI command
    pub async fn execute(self) -> Result<()> {
        let config = PipelineConfig::load()?;

        match self.command {
            Commands::Train => train(config).await,
            Commands::Status { run_id } => show_status(&config, &run_id).await,
            Commands::Runs { limit } => list_runs(&config, limit).await,
            Commands::Predict {
                input,
                model,
                output,
            } => predict(&config, &input, model, output.as_deref()).await,
            Commands::Config => show_config(&config),
        }
    }
}

/// Run the pipeline once
async fn train(config: PipelineConfig) -> Result<()> {
    let pipeline = TrainingPipeline::from_config(config)?;

    match pipeline.run_pipeline().await {
        Ok(run) => {
            println!("Run ID:        {}", run.run_id);
            println!("Train f1:      {:.4}", run.trainer.train_metric_artifact.f1_score);
            println!("Test f1:       {:.4}", run.trainer.test_metric_artifact.f1_score);
            match run.evaluation.improved_accuracy {
                Some(improved) => println!("Improvement:   {:+.4}", improved),
                None => println!("Improvement:   (first model)"),
            }
            println!("Saved model:   {}", run.pusher.saved_model_path.display());
            println!("SHA-256:       {}", run.pusher.model_sha256);
            if !run.synced {
                eprintln!("\n[Run {} completed, but remote sync failed; see events.jsonl]", run.run_id);
            } else {
                eprintln!("\n[Run {} completed successfully]", run.run_id);
            }
            Ok(())
        }
        Err(err) => {
            eprintln!("\n[Run failed in {} ({})]", err.stage, err.kind);
            Err(err.into())
        }
    }
}

/// Show the status of a run
async fn show_status(config: &PipelineConfig, run_id: &str) -> Result<()> {
    let store = ArtifactStore::open(&config.artifact_dir, run_id).await?;
    let run = store
        .load_run()
        .await?
        .with_context(|| format!("Run {} has no events", run_id))?;

    println!("Run ID: {}", run.id);
    println!("Pipeline: {}", run.pipeline_name);
    println!("Status: {}", status_label(&run));
    if let RunStatus::Failed { error } = &run.status {
        println!("Error: {}", error);
    }
    println!("Started: {}", run.started_at);
    if let Some(completed) = run.completed_at {
        println!("Completed: {}", completed);
    }
    println!("\nStage statuses:");
    for (stage, status) in &run.stage_statuses {
        println!("  {}: {:?}", stage, status);
    }
    if !run.sync_errors.is_empty() {
        println!("\nSync errors:");
        for error in &run.sync_errors {
            println!("  {}", error);
        }
    }

    Ok(())
}

/// List recent runs
async fn list_runs(config: &PipelineConfig, limit: usize) -> Result<()> {
    let run_ids = ArtifactStore::list_runs(&config.artifact_dir).await?;

    if run_ids.is_empty() {
        println!("No runs found");
        return Ok(());
    }

    println!("{:<24} {:<12} {:<12}", "RUN ID", "PIPELINE", "STATUS");
    println!("{}", "-".repeat(50));

    for run_id in run_ids.into_iter().take(limit) {
        let store = ArtifactStore::open(&config.artifact_dir, &run_id).await?;
        if let Some(run) = store.load_run().await? {
            println!("{:<24} {:<12} {:<12}", run.id, run.pipeline_name, status_label(&run));
        }
    }

    Ok(())
}

fn status_label(run: &Run) -> &'static str {
    match run.status {
        RunStatus::Running => "running",
        RunStatus::Completed => "completed",
        RunStatus::Failed { .. } => "failed",
    }
}

/// Score `input` and write it back with a prediction column
async fn predict(config: &PipelineConfig, input: &Path, model: Option<PathBuf>, output: Option<&Path>) -> Result<()> {
    let model_path = match model {
        Some(path) => path,
        None => ModelResolver::new(&config.saved_model_dir)
            .best_model_path()?
            .with_context(|| format!("No saved model found in {}", config.saved_model_dir.display()))?,
    };

    let model: SensorModel<BoostedTrees> = load_object(&model_path).await?;
    let frame = DataFrame::read_csv(input).await?;
    let scored = predict_frame(&model, frame)?;

    match output {
        Some(path) => {
            scored.write_csv(path).await?;
            eprintln!("Wrote {} predictions to {}", scored.n_rows(), path.display());
        }
        None => {
            let bytes = scored.to_csv_bytes()?;
            print!("{}", String::from_utf8_lossy(&bytes));
        }
    }

    Ok(())
}

/// Append decoded predictions to `frame`
pub fn predict_frame(model: &SensorModel<BoostedTrees>, frame: DataFrame) -> Result<DataFrame> {
    let codes = model.predict(&frame).context("Failed to score input rows")?;
    let labels = codes
        .into_iter()
        .map(|code| TargetValueMapping::decode(code).map(|label| Value::Text(label.to_string())))
        .collect::<Result<Vec<_>>>()?;
    frame.with_column(PREDICTION_COLUMN, labels)
}

/// Show the resolved configuration (for debugging)
fn show_config(cfg: &PipelineConfig) -> Result<()> {
    println!("sensor-pipeline configuration");
    println!();
    println!(
        "Config file: {}",
        cfg.config_file
            .as_ref()
            .map(|p| p.display().to_string())
            .unwrap_or_else(|| "(none - using defaults)".to_string())
    );
    println!(
        "Connection:  {}",
        cfg.redacted_connection_url()
            .unwrap_or_else(|| format!("(unset - export {})", config::MONGODB_URL_KEY))
    );
    println!("Remote:      {}", cfg.remote.as_deref().unwrap_or("(disabled)"));
    println!();
    println!("Paths:");
    println!("  Artifacts:    {}", cfg.artifact_dir.display());
    println!("  Saved models: {}", cfg.saved_model_dir.display());
    println!("  Schema:       {}", cfg.schema_file.display());
    println!();
    println!("Source:         {}.{}", cfg.source.database, cfg.source.collection);
    println!("Split ratio:    {}", cfg.ingestion.train_test_split_ratio);
    println!(
        "Drift:          threshold {} (halt: {})",
        cfg.validation.drift_threshold, cfg.validation.halt_on_drift
    );
    println!("Resampler:      {:?}", cfg.transformation.resampler);
    println!();
    println!("Quality gates:");
    println!("  Expected score:      {}", cfg.gates.expected_score);
    println!("  Overfit threshold:   {}", cfg.gates.overfitting_underfitting_threshold);
    println!("  Change threshold:    {}", cfg.gates.change_threshold);
    println!();
    println!("Boosting:");
    println!("  Estimators:    {}", cfg.boosting.n_estimators);
    println!("  Learning rate: {}", cfg.boosting.learning_rate);
    println!("  Max depth:     {}", cfg.boosting.max_depth);

    Ok(())
}
