//! Data transformation: encode the target, impute and scale features,
//! rebalance classes, and write model-ready arrays.
//!
//! The preprocessor is fitted on the train partition only and the same
//! fitted object transforms both partitions; that object is what gets
//! persisted and later bundled with the classifier.

use anyhow::{Context, Result};
use tracing::{info, instrument};

use crate::config::TransformationSettings;
use crate::core::artifact_store::TransformationPaths;
use crate::domain::{DataFrame, Schema, TransformationArtifact, ValidationArtifact};
use crate::ml::arrays::{save_npy, with_label_column};
use crate::ml::estimator::{save_object, TargetValueMapping};
use crate::ml::{Preprocessor, Resampler};

pub struct DataTransformation<'a> {
    schema: &'a Schema,
    settings: &'a TransformationSettings,
    paths: TransformationPaths,
}

impl<'a> DataTransformation<'a> {
    pub fn new(schema: &'a Schema, settings: &'a TransformationSettings, paths: TransformationPaths) -> Self {
        Self {
            schema,
            settings,
            paths,
        }
    }

    /// Split a partition into raw features and encoded labels
    pub fn separate_target(&self, frame: &DataFrame) -> Result<(DataFrame, Vec<f64>)> {
        let (features, target) = frame.split_column(self.schema.target_column())?;
        let labels = TargetValueMapping::encode_all(&target)
            .with_context(|| format!("Failed to encode target column '{}'", self.schema.target_column()))?;
        Ok((features, labels))
    }

    #[instrument(skip_all, name = "data_transformation")]
    pub async fn initiate_data_transformation(&self, validation: &ValidationArtifact) -> Result<TransformationArtifact> {
        let train = DataFrame::read_csv(&validation.valid_train_file_path).await?;
        let test = DataFrame::read_csv(&validation.valid_test_file_path).await?;

        let (train_features, train_labels) = self.separate_target(&train).context("Train partition")?;
        let (test_features, test_labels) = self.separate_target(&test).context("Test partition")?;

        let preprocessor = Preprocessor::fit(&train_features, self.settings.fill_value)
            .context("Failed to fit preprocessor on train features")?;
        let x_train = preprocessor.transform(&train_features).context("Train partition")?;
        let x_test = preprocessor.transform(&test_features).context("Test partition")?;

        let mut resampler = Resampler::new(self.settings.resampler, self.settings.random_seed);
        let (x_train, y_train) = resampler.fit_resample(&x_train, &train_labels)?;
        let (x_test, y_test) = resampler.fit_resample(&x_test, &test_labels)?;

        let train_arr = with_label_column(&x_train, &y_train)?;
        let test_arr = with_label_column(&x_test, &y_test)?;

        save_npy(&self.paths.transformed_train_file_path, &train_arr).await?;
        save_npy(&self.paths.transformed_test_file_path, &test_arr).await?;
        save_object(&self.paths.transformed_object_file_path, &preprocessor).await?;

        info!(
            features = preprocessor.n_features(),
            train_shape = ?train_arr.dim(),
            test_shape = ?test_arr.dim(),
            resampler = ?self.settings.resampler,
            "Transformed arrays written"
        );

        Ok(TransformationArtifact {
            transformed_object_file_path: self.paths.transformed_object_file_path.clone(),
            transformed_train_file_path: self.paths.transformed_train_file_path.clone(),
            transformed_test_file_path: self.paths.transformed_test_file_path.clone(),
        })
    }
}
