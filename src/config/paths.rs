//! Canonical names for everything the pipeline writes to disk.
//!
//! Single source of truth - import this instead of hardcoding paths.
//!
//! ## Layout
//!
//! | Location | Owner | Purpose |
//! |----------|-------|---------|
//! | `<artifact_dir>/<run_id>/` | one run | All stage outputs + `events.jsonl` |
//! | `<saved_model_dir>/<unix_ts>/` | pusher | Versioned accepted models |
//! | `<artifact_dir>/.pipeline.lock` | orchestrator | Single active run guard |

// ============================================================================
// Defaults (overridable through config file / environment)
// ============================================================================

/// Default root for run directories
pub const DEFAULT_ARTIFACT_DIR: &str = "artifact";

/// Default root for the versioned model registry
pub const DEFAULT_SAVED_MODEL_DIR: &str = "saved_models";

/// Default schema location
pub const DEFAULT_SCHEMA_FILE: &str = "config/schema.yaml";

/// Pipeline name recorded in the run event log
pub const PIPELINE_NAME: &str = "sensor";

/// strftime format of run ids (local time)
pub const RUN_ID_FORMAT: &str = "%m_%d_%Y_%H_%M_%S";

// ============================================================================
// Run-level files
// ============================================================================

pub const EVENTS_FILE_NAME: &str = "events.jsonl";
pub const LOCK_FILE_NAME: &str = ".pipeline.lock";

pub const FILE_NAME: &str = "sensor.csv";
pub const TRAIN_FILE_NAME: &str = "train.csv";
pub const TEST_FILE_NAME: &str = "test.csv";
pub const TRANSFORMED_TRAIN_FILE_NAME: &str = "train.npy";
pub const TRANSFORMED_TEST_FILE_NAME: &str = "test.npy";
pub const PREPROCESSING_OBJECT_FILE_NAME: &str = "preprocessing.json";
pub const MODEL_FILE_NAME: &str = "model.json";
pub const REPORT_FILE_NAME: &str = "report.yaml";

// ============================================================================
// Stage directories
// ============================================================================

pub const DATA_INGESTION_DIR_NAME: &str = "data_ingestion";
pub const DATA_INGESTION_FEATURE_STORE_DIR: &str = "feature_store";
pub const DATA_INGESTION_INGESTED_DIR: &str = "ingested";

pub const DATA_VALIDATION_DIR_NAME: &str = "data_validation";
pub const DATA_VALIDATION_VALID_DIR: &str = "validated";
pub const DATA_VALIDATION_INVALID_DIR: &str = "invalid";
pub const DATA_VALIDATION_DRIFT_REPORT_DIR: &str = "drift_report";

pub const DATA_TRANSFORMATION_DIR_NAME: &str = "data_transformation";
pub const DATA_TRANSFORMATION_TRANSFORMED_DATA_DIR: &str = "transformed";
pub const DATA_TRANSFORMATION_TRANSFORMED_OBJECT_DIR: &str = "transformed_object";

pub const MODEL_TRAINER_DIR_NAME: &str = "model_trainer";
pub const MODEL_TRAINER_TRAINED_MODEL_DIR: &str = "trained_model";

pub const MODEL_EVALUATION_DIR_NAME: &str = "model_evaluation";

pub const MODEL_PUSHER_DIR_NAME: &str = "model_pusher";

// ============================================================================
// Remote layout (relative to the configured remote root)
// ============================================================================

/// Remote prefix for run directories: `<remote>/artifact/<run_id>`
pub const REMOTE_ARTIFACT_PREFIX: &str = "artifact";

/// Remote prefix for the model registry
pub const REMOTE_SAVED_MODELS_PREFIX: &str = "saved_models";

// ============================================================================
// Tests
// ============================================================================

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_transformed_files_are_numpy() {
        assert!(TRANSFORMED_TRAIN_FILE_NAME.ends_with(".npy"));
        assert!(TRANSFORMED_TEST_FILE_NAME.ends_with(".npy"));
        assert_eq!(
            TRAIN_FILE_NAME.trim_end_matches(".csv"),
            TRANSFORMED_TRAIN_FILE_NAME.trim_end_matches(".npy")
        );
    }

    #[test]
    fn test_run_id_format_is_path_safe() {
        let formatted = chrono::NaiveDate::from_ymd_opt(2026, 10, 18)
            .unwrap()
            .and_hms_opt(9, 5, 7)
            .unwrap()
            .format(RUN_ID_FORMAT)
            .to_string();
        assert_eq!(formatted, "10_18_2026_09_05_07");
        assert!(!formatted.contains('/'));
    }
}
