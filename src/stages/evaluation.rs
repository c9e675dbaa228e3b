//! Model evaluation against the currently deployed model.
//!
//! Both models score the full validated dataset (train and test
//! partitions together). With nothing deployed yet the trained model is
//! accepted outright.

use std::path::PathBuf;

use anyhow::{Context, Result};
use tracing::{info, instrument};

use super::validation::write_yaml;
use crate::core::artifact_store::EvaluationPaths;
use crate::core::gates::QualityGates;
use crate::domain::{DataFrame, EvaluationArtifact, Schema, TrainerArtifact, ValidationArtifact};
use crate::ml::estimator::load_object;
use crate::ml::{classification_score, BoostedTrees, ModelResolver, SensorModel, TargetValueMapping};

pub struct ModelEvaluation<'a> {
    schema: &'a Schema,
    gates: &'a QualityGates,
    saved_model_dir: PathBuf,
    paths: EvaluationPaths,
}

impl<'a> ModelEvaluation<'a> {
    pub fn new(
        schema: &'a Schema,
        gates: &'a QualityGates,
        saved_model_dir: impl Into<PathBuf>,
        paths: EvaluationPaths,
    ) -> Self {
        Self {
            schema,
            gates,
            saved_model_dir: saved_model_dir.into(),
            paths,
        }
    }

    #[instrument(skip_all, name = "model_evaluation")]
    pub async fn initiate_model_evaluation(
        &self,
        validation: &ValidationArtifact,
        trainer: &TrainerArtifact,
    ) -> Result<EvaluationArtifact> {
        let train = DataFrame::read_csv(&validation.valid_train_file_path).await?;
        let test = DataFrame::read_csv(&validation.valid_test_file_path).await?;
        let full = train.concat(&test).context("Failed to combine validated partitions")?;

        let (features, target) = full.split_column(self.schema.target_column())?;
        let y_true = TargetValueMapping::encode_all(&target)?;

        let trained: SensorModel<BoostedTrees> = load_object(&trainer.trained_model_file_path).await?;
        let train_model_metric = classification_score(&y_true, &trained.predict(&features)?)?;

        let resolver = ModelResolver::new(&self.saved_model_dir);
        let artifact = match resolver.best_model_path()? {
            None => {
                info!("No deployed model yet, accepting trained model");
                EvaluationArtifact {
                    is_model_accepted: true,
                    improved_accuracy: None,
                    best_model_path: None,
                    trained_model_path: trainer.trained_model_file_path.clone(),
                    train_model_metric_artifact: train_model_metric,
                    best_model_metric_artifact: None,
                }
            }
            Some(best_path) => {
                let best: SensorModel<BoostedTrees> = load_object(&best_path)
                    .await
                    .with_context(|| format!("Failed to load deployed model: {}", best_path.display()))?;
                let best_metric = classification_score(&y_true, &best.predict(&features)?)?;

                let improved = train_model_metric.f1_score - best_metric.f1_score;
                let accepted = self.gates.accepts_improvement(improved);
                info!(
                    trained_f1 = train_model_metric.f1_score,
                    best_f1 = best_metric.f1_score,
                    improved,
                    accepted,
                    "Compared against deployed model"
                );

                EvaluationArtifact {
                    is_model_accepted: accepted,
                    improved_accuracy: Some(improved),
                    best_model_path: Some(best_path),
                    trained_model_path: trainer.trained_model_file_path.clone(),
                    train_model_metric_artifact: train_model_metric,
                    best_model_metric_artifact: Some(best_metric),
                }
            }
        };

        write_yaml(&self.paths.report_file_path, &artifact).await?;
        Ok(artifact)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::{ClassificationMetric, Value};
    use crate::ml::estimator::save_object;
    use crate::ml::{Estimator, GradientBoosting, Preprocessor};
    use tempfile::TempDir;

    const SCHEMA: &str = "
columns:
  - class: category
  - aa_000: int64
numerical_columns:
  - aa_000
";

    fn frame(range: std::ops::Range<i32>) -> DataFrame {
        let rows = range
            .map(|i| {
                let class = if i >= 30 { "pos" } else { "neg" };
                vec![Value::Text(class.into()), Value::Number(f64::from(i))]
            })
            .collect();
        DataFrame::from_rows(vec!["class".into(), "aa_000".into()], rows).unwrap()
    }

    async fn validated(temp: &TempDir) -> ValidationArtifact {
        let artifact = ValidationArtifact {
            validation_status: true,
            valid_train_file_path: temp.path().join("valid/train.csv"),
            valid_test_file_path: temp.path().join("valid/test.csv"),
            invalid_train_file_path: temp.path().join("invalid/train.csv"),
            invalid_test_file_path: temp.path().join("invalid/test.csv"),
            drift_report_file_path: temp.path().join("report.yaml"),
        };
        frame(0..45).write_csv(&artifact.valid_train_file_path).await.unwrap();
        frame(45..60).write_csv(&artifact.valid_test_file_path).await.unwrap();
        artifact
    }

    /// Save a model whose decision threshold sits at `cut`
    async fn model_at(path: &std::path::Path, cut: i32) {
        let rows = (0..60).map(|i| vec![Value::Number(f64::from(i))]).collect();
        let features = DataFrame::from_rows(vec!["aa_000".into()], rows).unwrap();
        let labels: Vec<f64> = (0..60).map(|i| if i >= cut { 1.0 } else { 0.0 }).collect();

        let preprocessor = Preprocessor::fit(&features, 0.0).unwrap();
        let x = preprocessor.transform(&features).unwrap();
        let model = GradientBoosting::default().fit(&x, &labels).unwrap();
        save_object(path, &SensorModel::new(preprocessor, model)).await.unwrap();
    }

    fn trainer_artifact(path: PathBuf) -> TrainerArtifact {
        let metric = ClassificationMetric {
            f1_score: 1.0,
            precision_score: 1.0,
            recall_score: 1.0,
        };
        TrainerArtifact {
            trained_model_file_path: path,
            train_metric_artifact: metric,
            test_metric_artifact: metric,
        }
    }

    fn paths(temp: &TempDir) -> EvaluationPaths {
        EvaluationPaths {
            report_file_path: temp.path().join("model_evaluation/report.yaml"),
        }
    }

    #[tokio::test]
    async fn test_first_model_is_accepted() {
        let temp = TempDir::new().unwrap();
        let schema = Schema::from_yaml(SCHEMA).unwrap();
        let gates = QualityGates::default();
        let validation = validated(&temp).await;
        let trained = temp.path().join("trained/model.json");
        model_at(&trained, 30).await;

        let stage = ModelEvaluation::new(&schema, &gates, temp.path().join("saved_models"), paths(&temp));
        let result = stage
            .initiate_model_evaluation(&validation, &trainer_artifact(trained))
            .await
            .unwrap();

        assert!(result.is_model_accepted);
        assert!(result.improved_accuracy.is_none());
        assert!(result.best_model_path.is_none());
        assert_eq!(result.train_model_metric_artifact.f1_score, 1.0);

        let yaml = std::fs::read_to_string(paths(&temp).report_file_path).unwrap();
        let parsed: EvaluationArtifact = serde_yaml::from_str(&yaml).unwrap();
        assert_eq!(parsed, result);
    }

    #[tokio::test]
    async fn test_better_model_is_accepted() {
        let temp = TempDir::new().unwrap();
        let schema = Schema::from_yaml(SCHEMA).unwrap();
        let gates = QualityGates::default();
        let validation = validated(&temp).await;

        let deployed = temp.path().join("saved_models/1700000000/model.json");
        model_at(&deployed, 50).await;
        let trained = temp.path().join("trained/model.json");
        model_at(&trained, 30).await;

        let stage = ModelEvaluation::new(&schema, &gates, temp.path().join("saved_models"), paths(&temp));
        let result = stage
            .initiate_model_evaluation(&validation, &trainer_artifact(trained))
            .await
            .unwrap();

        assert!(result.is_model_accepted);
        assert_eq!(result.best_model_path.as_deref(), Some(deployed.as_path()));
        let best = result.best_model_metric_artifact.unwrap();
        assert!(best.f1_score < 1.0);
        let improved = result.improved_accuracy.unwrap();
        assert!((improved - (1.0 - best.f1_score)).abs() < 1e-12);
    }

    #[tokio::test]
    async fn test_equal_model_is_rejected() {
        let temp = TempDir::new().unwrap();
        let schema = Schema::from_yaml(SCHEMA).unwrap();
        let gates = QualityGates::default();
        let validation = validated(&temp).await;

        let deployed = temp.path().join("saved_models/1700000000/model.json");
        model_at(&deployed, 30).await;
        let trained = temp.path().join("trained/model.json");
        model_at(&trained, 30).await;

        let stage = ModelEvaluation::new(&schema, &gates, temp.path().join("saved_models"), paths(&temp));
        let result = stage
            .initiate_model_evaluation(&validation, &trainer_artifact(trained))
            .await
            .unwrap();

        assert!(!result.is_model_accepted);
        assert_eq!(result.improved_accuracy, Some(0.0));
        assert!(paths(&temp).report_file_path.exists());
    }
}
