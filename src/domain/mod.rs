//! Domain types for the training pipeline.
//!
//! This module contains the core data structures:
//! - DataFrame: tabular data and its CSV boundary
//! - Schema: the static column contract
//! - Artifacts: immutable stage outputs
//! - Events / Run: the per-run audit log and state machine

pub mod artifact;
pub mod events;
pub mod frame;
pub mod run;
pub mod schema;

// Re-export commonly used types
pub use artifact::{
    ClassificationMetric, EvaluationArtifact, IngestionArtifact, PusherArtifact, TrainerArtifact,
    TransformationArtifact, ValidationArtifact,
};
pub use events::{Event, EventType, StageStatus};
pub use frame::{DataFrame, Value};
pub use run::{PipelineState, Run, RunStatus, Stage};
pub use schema::{ColumnKind, ColumnSpec, Schema};
