//! Data validation: schema conformance plus train/test drift detection.
//!
//! Both partitions are checked before anything fails so the error names
//! every problem at once. Conformant partitions are copied to the
//! `validated/` location; rejected ones to `invalid/`.

use std::path::Path;

use anyhow::{Context, Result};
use thiserror::Error;
use tracing::{error, info, instrument, warn};

use crate::config::ValidationSettings;
use crate::core::artifact_store::ValidationPaths;
use crate::domain::{DataFrame, IngestionArtifact, Schema, ValidationArtifact};
use crate::ml::drift::{detect_drift, DriftReport};

/// Data-quality failures
#[derive(Debug, Clone, Error, PartialEq)]
pub enum DataQualityError {
    /// Accumulated column-check messages for both partitions
    #[error("{0}")]
    SchemaMismatch(String),

    #[error("Data drift detected in columns: {}", columns.join(", "))]
    DriftDetected { columns: Vec<String> },
}

/// True iff the frame has exactly as many columns as the schema declares
pub fn validate_number_of_columns(schema: &Schema, frame: &DataFrame) -> bool {
    let status = frame.n_cols() == schema.expected_column_count();
    if !status {
        warn!(
            expected = schema.expected_column_count(),
            actual = frame.n_cols(),
            "Column count mismatch"
        );
    }
    status
}

/// True iff every schema-declared numerical column is present
pub fn is_numerical_column_exist(schema: &Schema, frame: &DataFrame) -> bool {
    let missing: Vec<&String> = schema
        .numerical_columns()
        .iter()
        .filter(|c| !frame.has_column(c))
        .collect();

    for column in &missing {
        warn!(column = %column, "Missing numerical column");
    }
    missing.is_empty()
}

pub struct DataValidation<'a> {
    schema: &'a Schema,
    settings: &'a ValidationSettings,
    paths: ValidationPaths,
}

impl<'a> DataValidation<'a> {
    pub fn new(schema: &'a Schema, settings: &'a ValidationSettings, paths: ValidationPaths) -> Self {
        Self {
            schema,
            settings,
            paths,
        }
    }

    /// Run the KS test on every shared column and persist the report
    pub async fn detect_dataset_drift(&self, base: &DataFrame, current: &DataFrame) -> Result<DriftReport> {
        let report = detect_drift(base, current, self.settings.drift_threshold);

        for (column, drift) in report.columns.iter().filter(|(_, d)| d.drift_status) {
            info!(%column, p_value = drift.p_value, "Column drifted");
        }

        write_yaml(&self.paths.drift_report_file_path, &report).await?;
        Ok(report)
    }

    #[instrument(skip_all, name = "data_validation")]
    pub async fn initiate_data_validation(&self, ingestion: &IngestionArtifact) -> Result<ValidationArtifact> {
        let train = DataFrame::read_csv(&ingestion.training_file_path).await?;
        let test = DataFrame::read_csv(&ingestion.testing_file_path).await?;

        let mut error_message = String::new();
        let mut train_ok = true;
        let mut test_ok = true;

        if !validate_number_of_columns(self.schema, &train) {
            error_message.push_str("Train dataframe does not contain all columns.\n");
            train_ok = false;
        }
        if !validate_number_of_columns(self.schema, &test) {
            error_message.push_str("Test dataframe does not contain all columns.\n");
            test_ok = false;
        }
        if !is_numerical_column_exist(self.schema, &train) {
            error_message.push_str("Train dataframe does not contain all numerical columns.\n");
            train_ok = false;
        }
        if !is_numerical_column_exist(self.schema, &test) {
            error_message.push_str("Test dataframe does not contain all numerical columns.\n");
            test_ok = false;
        }

        if !error_message.is_empty() {
            if !train_ok {
                copy_partition(&ingestion.training_file_path, &self.paths.invalid_train_file_path).await?;
            }
            if !test_ok {
                copy_partition(&ingestion.testing_file_path, &self.paths.invalid_test_file_path).await?;
            }
            error!(message = %error_message.trim_end(), "Schema validation failed");
            return Err(DataQualityError::SchemaMismatch(error_message.trim_end().to_string()).into());
        }

        let report = self.detect_dataset_drift(&train, &test).await?;
        if !report.status && self.settings.halt_on_drift {
            let columns = report.drifted_columns();
            error!(?columns, "Halting on data drift");
            return Err(DataQualityError::DriftDetected { columns }.into());
        }

        copy_partition(&ingestion.training_file_path, &self.paths.valid_train_file_path).await?;
        copy_partition(&ingestion.testing_file_path, &self.paths.valid_test_file_path).await?;

        info!(
            validation_status = report.status,
            drifted = report.drifted_columns().len(),
            "Data validation finished"
        );

        Ok(ValidationArtifact {
            validation_status: report.status,
            valid_train_file_path: self.paths.valid_train_file_path.clone(),
            valid_test_file_path: self.paths.valid_test_file_path.clone(),
            invalid_train_file_path: self.paths.invalid_train_file_path.clone(),
            invalid_test_file_path: self.paths.invalid_test_file_path.clone(),
            drift_report_file_path: self.paths.drift_report_file_path.clone(),
        })
    }
}

async fn copy_partition(from: &Path, to: &Path) -> Result<()> {
    if let Some(dir) = to.parent() {
        tokio::fs::create_dir_all(dir)
            .await
            .with_context(|| format!("Failed to create directory: {}", dir.display()))?;
    }
    tokio::fs::copy(from, to)
        .await
        .with_context(|| format!("Failed to copy {} to {}", from.display(), to.display()))?;
    Ok(())
}

/// Serialize a value as YAML, creating parent directories
pub(crate) async fn write_yaml<T: serde::Serialize>(path: &Path, value: &T) -> Result<()> {
    if let Some(dir) = path.parent() {
        tokio::fs::create_dir_all(dir)
            .await
            .with_context(|| format!("Failed to create directory: {}", dir.display()))?;
    }
    let yaml = serde_yaml::to_string(value).context("Failed to serialize report")?;
    tokio::fs::write(path, yaml)
        .await
        .with_context(|| format!("Failed to write report: {}", path.display()))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::Value;
    use tempfile::TempDir;

    const SCHEMA: &str = "
columns:
  - class: category
  - aa_000: int64
  - ac_000: float64
numerical_columns:
  - aa_000
  - ac_000
";

    fn frame(columns: &[&str], n: usize, offset: f64) -> DataFrame {
        let rows = (0..n)
            .map(|i| {
                columns
                    .iter()
                    .map(|c| {
                        if *c == "class" {
                            Value::Text(if i % 2 == 0 { "neg" } else { "pos" }.into())
                        } else {
                            Value::Number(i as f64 + offset)
                        }
                    })
                    .collect()
            })
            .collect();
        DataFrame::from_rows(columns.iter().map(|c| c.to_string()).collect(), rows).unwrap()
    }

    fn paths(temp: &TempDir) -> ValidationPaths {
        let root = temp.path().join("data_validation");
        ValidationPaths {
            valid_train_file_path: root.join("validated/train.csv"),
            valid_test_file_path: root.join("validated/test.csv"),
            invalid_train_file_path: root.join("invalid/train.csv"),
            invalid_test_file_path: root.join("invalid/test.csv"),
            drift_report_file_path: root.join("drift_report/report.yaml"),
        }
    }

    async fn ingested(temp: &TempDir, train: &DataFrame, test: &DataFrame) -> IngestionArtifact {
        let artifact = IngestionArtifact {
            feature_store_file_path: temp.path().join("fs.csv"),
            training_file_path: temp.path().join("train.csv"),
            testing_file_path: temp.path().join("test.csv"),
        };
        train.write_csv(&artifact.training_file_path).await.unwrap();
        test.write_csv(&artifact.testing_file_path).await.unwrap();
        artifact
    }

    #[test]
    fn test_column_checks() {
        let schema = Schema::from_yaml(SCHEMA).unwrap();

        assert!(validate_number_of_columns(&schema, &frame(&["class", "aa_000", "ac_000"], 1, 0.0)));
        assert!(!validate_number_of_columns(&schema, &frame(&["class", "aa_000"], 1, 0.0)));

        assert!(is_numerical_column_exist(&schema, &frame(&["ac_000", "aa_000"], 1, 0.0)));
        assert!(!is_numerical_column_exist(&schema, &frame(&["class", "aa_000", "zz"], 1, 0.0)));
    }

    #[tokio::test]
    async fn test_identical_partitions_pass() {
        let temp = TempDir::new().unwrap();
        let schema = Schema::from_yaml(SCHEMA).unwrap();
        let settings = ValidationSettings::default();
        let data = frame(&["class", "aa_000", "ac_000"], 30, 0.0);
        let artifact = ingested(&temp, &data, &data).await;

        let stage = DataValidation::new(&schema, &settings, paths(&temp));
        let result = stage.initiate_data_validation(&artifact).await.unwrap();

        assert!(result.validation_status);
        assert!(result.valid_train_file_path.exists());
        assert!(!result.invalid_train_file_path.exists());

        let yaml = std::fs::read_to_string(&result.drift_report_file_path).unwrap();
        let report: DriftReport = serde_yaml::from_str(&yaml).unwrap();
        assert_eq!(report.columns.len(), 3);
        assert!(report.columns.values().all(|c| c.p_value == 1.0 && !c.drift_status));
    }

    #[tokio::test]
    async fn test_drift_is_advisory() {
        let temp = TempDir::new().unwrap();
        let schema = Schema::from_yaml(SCHEMA).unwrap();
        let settings = ValidationSettings::default();
        let train = frame(&["class", "aa_000", "ac_000"], 30, 0.0);
        let test = frame(&["class", "aa_000", "ac_000"], 30, 500.0);
        let artifact = ingested(&temp, &train, &test).await;

        let stage = DataValidation::new(&schema, &settings, paths(&temp));
        let result = stage.initiate_data_validation(&artifact).await.unwrap();
        assert!(!result.validation_status);
        assert!(result.valid_test_file_path.exists());
    }

    #[tokio::test]
    async fn test_drift_halts_when_configured() {
        let temp = TempDir::new().unwrap();
        let schema = Schema::from_yaml(SCHEMA).unwrap();
        let settings = ValidationSettings {
            halt_on_drift: true,
            ..Default::default()
        };
        let train = frame(&["class", "aa_000", "ac_000"], 30, 0.0);
        let test = frame(&["class", "aa_000", "ac_000"], 30, 500.0);
        let artifact = ingested(&temp, &train, &test).await;

        let p = paths(&temp);
        let stage = DataValidation::new(&schema, &settings, p.clone());
        let err = stage.initiate_data_validation(&artifact).await.unwrap_err();

        match err.downcast_ref::<DataQualityError>() {
            Some(DataQualityError::DriftDetected { columns }) => {
                assert!(columns.contains(&"aa_000".to_string()));
            }
            other => panic!("expected drift halt, got {:?}", other),
        }
        assert!(p.drift_report_file_path.exists());
        assert!(!p.valid_train_file_path.exists());
    }

    #[tokio::test]
    async fn test_schema_failures_accumulate() {
        let temp = TempDir::new().unwrap();
        let schema = Schema::from_yaml(SCHEMA).unwrap();
        let settings = ValidationSettings::default();
        let train = frame(&["class", "aa_000"], 10, 0.0);
        let test = frame(&["class", "aa_000", "ac_000"], 10, 0.0);
        let artifact = ingested(&temp, &train, &test).await;

        let p = paths(&temp);
        let stage = DataValidation::new(&schema, &settings, p.clone());
        let err = stage.initiate_data_validation(&artifact).await.unwrap_err();

        match err.downcast_ref::<DataQualityError>() {
            Some(DataQualityError::SchemaMismatch(message)) => {
                assert!(message.contains("Train dataframe does not contain all columns."));
                assert!(message.contains("Train dataframe does not contain all numerical columns."));
                assert!(!message.contains("Test dataframe"));
            }
            other => panic!("expected schema mismatch, got {:?}", other),
        }

        assert!(p.invalid_train_file_path.exists());
        assert!(!p.invalid_test_file_path.exists());
        assert!(!p.drift_report_file_path.exists());
    }
}
