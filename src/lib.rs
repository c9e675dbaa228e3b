//! sensor-pipeline - Sequential training pipeline for sensor fault classification
//!
//! Pulls raw sensor records from a document store and walks them through a
//! fixed chain of stages, each writing an immutable artifact under a
//! timestamped run directory:
//!
//! ```text
//! ingest -> validate -> transform -> train -> evaluate -> push
//! ```
//!
//! A trained model is only promoted to the serving location when it clears
//! the training gates and beats the currently deployed model. Whatever the
//! outcome, the run directory is mirrored to remote storage at the end.
//!
//! # Modules
//!
//! - `adapters`: External collaborators (document store, remote sync)
//! - `core`: Orchestration (ArtifactStore, quality gates, run guard, errors)
//! - `domain`: Data structures (DataFrame, Schema, artifacts, events, runs)
//! - `ml`: Numeric collaborators (drift test, preprocessing, resampling, boosting)
//! - `stages`: The six pipeline stages
//! - `cli`: Command-line interface
//!
//! # Usage
//!
//! ```bash
//! # Run the training pipeline
//! MONGO_DB_URL=file:///data/mongo-export sensor-pipeline train
//!
//! # Inspect a run
//! sensor-pipeline status 10_18_2026_09_30_00
//!
//! # Score a CSV with the serving model
//! sensor-pipeline predict --input batch.csv
//! ```

pub mod adapters;
pub mod cli;
pub mod config;
pub mod core;
pub mod domain;
pub mod ml;
pub mod stages;

// Re-export main types at crate root for convenience
pub use crate::config::PipelineConfig;
pub use crate::core::{ErrorKind, PipelineError, PipelineRun, TrainingPipeline};
pub use domain::{DataFrame, PipelineState, Schema, Stage, Value};
