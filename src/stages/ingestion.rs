//! Data ingestion: export the collection, snapshot it, split train/test.

use anyhow::{Context, Result};
use rand::rngs::StdRng;
use rand::seq::SliceRandom;
use rand::SeedableRng;
use tracing::{info, instrument, warn};

use crate::adapters::DataSource;
use crate::config::{IngestionSettings, SourceSettings};
use crate::core::artifact_store::IngestionPaths;
use crate::domain::{DataFrame, IngestionArtifact, Schema};

pub struct DataIngestion<'a> {
    source: &'a dyn DataSource,
    schema: &'a Schema,
    location: &'a SourceSettings,
    settings: &'a IngestionSettings,
    paths: IngestionPaths,
}

impl<'a> DataIngestion<'a> {
    pub fn new(
        source: &'a dyn DataSource,
        schema: &'a Schema,
        location: &'a SourceSettings,
        settings: &'a IngestionSettings,
        paths: IngestionPaths,
    ) -> Self {
        Self {
            source,
            schema,
            location,
            settings,
            paths,
        }
    }

    /// Export the collection and persist it untouched as the feature store
    pub async fn export_data_into_feature_store(&self) -> Result<DataFrame> {
        let frame = self
            .source
            .export_collection(&self.location.database, &self.location.collection)
            .await
            .with_context(|| {
                format!(
                    "Failed to export {}.{} from {}",
                    self.location.database,
                    self.location.collection,
                    self.source.name()
                )
            })?;

        frame.write_csv(&self.paths.feature_store_file_path).await?;
        info!(
            rows = frame.n_rows(),
            columns = frame.n_cols(),
            path = %self.paths.feature_store_file_path.display(),
            "Feature store written"
        );
        Ok(frame)
    }

    /// Shuffle rows and hold out `ceil(ratio * n)` of them for testing
    pub fn split_data_as_train_test(&self, frame: &DataFrame) -> Result<(DataFrame, DataFrame)> {
        let n = frame.n_rows();
        let n_test = (self.settings.train_test_split_ratio * n as f64).ceil() as usize;
        if n_test == 0 || n_test >= n {
            anyhow::bail!(
                "Cannot split {} rows with ratio {}: both partitions must be non-empty",
                n,
                self.settings.train_test_split_ratio
            );
        }

        let mut rng = match self.settings.random_seed {
            Some(seed) => StdRng::seed_from_u64(seed),
            None => StdRng::from_entropy(),
        };
        let mut indices: Vec<usize> = (0..n).collect();
        indices.shuffle(&mut rng);

        let (test_idx, train_idx) = indices.split_at(n_test);
        Ok((frame.select_rows(train_idx), frame.select_rows(test_idx)))
    }

    #[instrument(skip(self), name = "data_ingestion")]
    pub async fn initiate_data_ingestion(&self) -> Result<IngestionArtifact> {
        let raw = self.export_data_into_feature_store().await?;

        let drop = self.schema.drop_columns();
        let absent: Vec<&String> = drop.iter().filter(|c| !raw.has_column(c)).collect();
        if !absent.is_empty() {
            warn!(columns = ?absent, "Schema drop columns not present in source data");
        }
        let frame = raw.drop_columns_lenient(drop);

        let (train, test) = self.split_data_as_train_test(&frame)?;
        train.write_csv(&self.paths.training_file_path).await?;
        test.write_csv(&self.paths.testing_file_path).await?;

        info!(
            train_rows = train.n_rows(),
            test_rows = test.n_rows(),
            "Train/test split written"
        );

        Ok(IngestionArtifact {
            feature_store_file_path: self.paths.feature_store_file_path.clone(),
            training_file_path: self.paths.training_file_path.clone(),
            testing_file_path: self.paths.testing_file_path.clone(),
        })
    }
}
