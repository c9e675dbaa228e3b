//! Core orchestration logic.
//!
//! This module contains:
//! - ArtifactStore: run directory layout and append-only event log
//! - QualityGates: training and evaluation thresholds
//! - RunGuard: exclusive run lock
//! - PipelineError: structured failure with stage and kind
//! - TrainingPipeline: the orchestrator

pub mod artifact_store;
pub mod error;
pub mod gates;
pub mod guard;
pub mod orchestrator;

// Re-export commonly used types
pub use artifact_store::ArtifactStore;
pub use error::{ErrorKind, PipelineError};
pub use gates::{QualityGates, QualityViolation};
pub use guard::{RunGuard, RunLocked};
pub use orchestrator::{PipelineRun, TrainingPipeline};
