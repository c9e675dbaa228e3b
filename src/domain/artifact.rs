//! Artifacts produced by pipeline stages.
//!
//! Each stage returns exactly one artifact describing where its outputs
//! were written and what it concluded. Artifacts are built once by their
//! stage and only ever read afterwards.

use std::path::PathBuf;

use serde::{Deserialize, Serialize};

/// Output of data ingestion
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct IngestionArtifact {
    /// Raw snapshot exactly as fetched
    pub feature_store_file_path: PathBuf,

    pub training_file_path: PathBuf,

    pub testing_file_path: PathBuf,
}

/// Output of data validation
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ValidationArtifact {
    /// True only when no column drifted
    pub validation_status: bool,

    pub valid_train_file_path: PathBuf,

    pub valid_test_file_path: PathBuf,

    /// Where partitions go when they fail the schema checks
    pub invalid_train_file_path: PathBuf,

    pub invalid_test_file_path: PathBuf,

    pub drift_report_file_path: PathBuf,
}

/// Output of data transformation
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TransformationArtifact {
    /// Fitted preprocessing pipeline
    pub transformed_object_file_path: PathBuf,

    pub transformed_train_file_path: PathBuf,

    pub transformed_test_file_path: PathBuf,
}

/// Precision, recall and f1 for one pass over one split
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct ClassificationMetric {
    pub f1_score: f64,
    pub precision_score: f64,
    pub recall_score: f64,
}

/// Output of model training
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TrainerArtifact {
    /// Composite predictor (preprocessor + classifier)
    pub trained_model_file_path: PathBuf,

    pub train_metric_artifact: ClassificationMetric,

    pub test_metric_artifact: ClassificationMetric,
}

/// Output of model evaluation
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EvaluationArtifact {
    pub is_model_accepted: bool,

    /// Trained f1 minus deployed f1; absent when nothing is deployed
    pub improved_accuracy: Option<f64>,

    /// Currently deployed model, if any
    pub best_model_path: Option<PathBuf>,

    pub trained_model_path: PathBuf,

    pub train_model_metric_artifact: ClassificationMetric,

    pub best_model_metric_artifact: Option<ClassificationMetric>,
}

/// Output of the model pusher
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PusherArtifact {
    /// Versioned copy in the saved-model registry
    pub saved_model_path: PathBuf,

    /// Stable copy inside the run directory
    pub model_file_path: PathBuf,

    /// SHA-256 of the pushed bytes
    pub model_sha256: String,
}
