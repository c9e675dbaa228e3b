//! Model training behind the quality gates.
//!
//! A model that misses the expected train score or generalises badly is
//! never written; the stage fails with the gate that tripped.

use anyhow::{Context, Result};
use tracing::{info, instrument};

use crate::core::artifact_store::TrainerPaths;
use crate::core::gates::QualityGates;
use crate::domain::{TrainerArtifact, TransformationArtifact};
use crate::ml::arrays::{load_npy, split_label_column};
use crate::ml::estimator::{load_object, save_object};
use crate::ml::{classification_score, Estimator, Predictor, Preprocessor, SensorModel};

pub struct ModelTrainer<'a, E: Estimator> {
    estimator: E,
    gates: &'a QualityGates,
    paths: TrainerPaths,
}

impl<'a, E: Estimator> ModelTrainer<'a, E> {
    pub fn new(estimator: E, gates: &'a QualityGates, paths: TrainerPaths) -> Self {
        Self {
            estimator,
            gates,
            paths,
        }
    }

    #[instrument(skip_all, name = "model_trainer", fields(estimator = self.estimator.name()))]
    pub async fn initiate_model_trainer(&self, transformation: &TransformationArtifact) -> Result<TrainerArtifact> {
        let train = load_npy(&transformation.transformed_train_file_path).await?;
        let test = load_npy(&transformation.transformed_test_file_path).await?;
        let (x_train, y_train) = split_label_column(&train).context("Train array")?;
        let (x_test, y_test) = split_label_column(&test).context("Test array")?;

        let model = self
            .estimator
            .fit(&x_train, &y_train)
            .with_context(|| format!("Failed to fit {}", self.estimator.name()))?;

        let train_metric = classification_score(&y_train, &model.predict(&x_train)?)?;
        info!(f1 = train_metric.f1_score, "Train score");
        self.gates.check_train_score(&train_metric)?;

        let test_metric = classification_score(&y_test, &model.predict(&x_test)?)?;
        info!(f1 = test_metric.f1_score, "Test score");
        self.gates.check_generalisation(&train_metric, &test_metric)?;

        let preprocessor: Preprocessor = load_object(&transformation.transformed_object_file_path).await?;
        let bundle = SensorModel::new(preprocessor, model);
        save_object(&self.paths.trained_model_file_path, &bundle).await?;

        info!(path = %self.paths.trained_model_file_path.display(), "Trained model saved");

        Ok(TrainerArtifact {
            trained_model_file_path: self.paths.trained_model_file_path.clone(),
            train_metric_artifact: train_metric,
            test_metric_artifact: test_metric,
        })
    }
}
