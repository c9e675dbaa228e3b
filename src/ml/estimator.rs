//! Estimator seams, target encoding, the composite predictor and the
//! saved-model registry lookup.

use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use ndarray::Array2;
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use tracing::debug;

use super::preprocess::Preprocessor;
use crate::config::paths;
use crate::domain::{DataFrame, Value};

/// Anything that maps a feature matrix to label codes
pub trait Predictor {
    fn predict(&self, features: &Array2<f64>) -> Result<Vec<f64>>;
}

/// A trainable classifier
pub trait Estimator {
    type Model: Predictor + Serialize + DeserializeOwned;

    /// Short name used in logs
    fn name(&self) -> &'static str;

    fn fit(&self, features: &Array2<f64>, labels: &[f64]) -> Result<Self::Model>;
}

/// Fixed mapping between raw target labels and numeric codes
pub struct TargetValueMapping;

impl TargetValueMapping {
    pub const NEGATIVE: &'static str = "neg";
    pub const POSITIVE: &'static str = "pos";

    /// Encode one raw label
    pub fn encode(value: &Value) -> Result<f64> {
        match value {
            Value::Text(s) if s == Self::NEGATIVE => Ok(0.0),
            Value::Text(s) if s == Self::POSITIVE => Ok(1.0),
            Value::Number(n) if *n == 0.0 || *n == 1.0 => Ok(*n),
            Value::Null => anyhow::bail!("Target label is missing"),
            other => anyhow::bail!("Unknown target label '{}'", other),
        }
    }

    pub fn encode_all(values: &[Value]) -> Result<Vec<f64>> {
        values
            .iter()
            .enumerate()
            .map(|(i, v)| Self::encode(v).with_context(|| format!("Row {}", i)))
            .collect()
    }

    /// Decode one code back to its raw label
    pub fn decode(code: f64) -> Result<&'static str> {
        if code == 0.0 {
            Ok(Self::NEGATIVE)
        } else if code == 1.0 {
            Ok(Self::POSITIVE)
        } else {
            anyhow::bail!("No target label for code {}", code)
        }
    }
}

/// Fitted preprocessor and classifier applied as one unit
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SensorModel<M> {
    pub preprocessor: Preprocessor,
    pub model: M,
}

impl<M: Predictor> SensorModel<M> {
    pub fn new(preprocessor: Preprocessor, model: M) -> Self {
        Self {
            preprocessor,
            model,
        }
    }

    /// Predict label codes for raw feature rows
    pub fn predict(&self, features: &DataFrame) -> Result<Vec<f64>> {
        let transformed = self.preprocessor.transform(features)?;
        self.model.predict(&transformed)
    }
}

/// Serialize an object as JSON, creating parent directories
pub async fn save_object<T: Serialize>(path: &Path, object: &T) -> Result<()> {
    if let Some(dir) = path.parent() {
        tokio::fs::create_dir_all(dir)
            .await
            .with_context(|| format!("Failed to create directory: {}", dir.display()))?;
    }
    let json = serde_json::to_vec(object).context("Failed to serialize object")?;
    tokio::fs::write(path, json)
        .await
        .with_context(|| format!("Failed to write object: {}", path.display()))
}

/// Load a JSON object written by [`save_object`]
pub async fn load_object<T: DeserializeOwned>(path: &Path) -> Result<T> {
    let bytes = tokio::fs::read(path)
        .await
        .with_context(|| format!("Failed to read object: {}", path.display()))?;
    serde_json::from_slice(&bytes)
        .with_context(|| format!("Failed to deserialize object: {}", path.display()))
}

/// Finds the latest model in the saved-model registry.
///
/// Versions are directory names `<secs>` or `<secs>_<n>`; the largest
/// `(secs, n)` wins.
pub struct ModelResolver {
    model_dir: PathBuf,
}

impl ModelResolver {
    pub fn new(model_dir: impl Into<PathBuf>) -> Self {
        Self {
            model_dir: model_dir.into(),
        }
    }

    /// Path of the latest saved model, or `None` when the registry is empty
    pub fn best_model_path(&self) -> Result<Option<PathBuf>> {
        if !self.model_dir.exists() {
            return Ok(None);
        }

        let pattern = self
            .model_dir
            .join("*")
            .join(paths::MODEL_FILE_NAME)
            .to_string_lossy()
            .to_string();

        let mut best: Option<((u64, u32), PathBuf)> = None;
        for entry in glob::glob(&pattern).context("Invalid saved-model pattern")? {
            let path = entry.context("Failed to read saved-model entry")?;
            let version = path
                .parent()
                .and_then(Path::file_name)
                .and_then(|name| name.to_str())
                .and_then(parse_version);

            match version {
                Some(v) if best.as_ref().map_or(true, |(b, _)| v > *b) => {
                    best = Some((v, path));
                }
                Some(_) => {}
                None => debug!(path = %path.display(), "Skipping non-numeric model version"),
            }
        }

        Ok(best.map(|(_, path)| path))
    }
}

fn parse_version(name: &str) -> Option<(u64, u32)> {
    match name.split_once('_') {
        None => Some((name.parse().ok()?, 0)),
        Some((secs, n)) => Some((secs.parse().ok()?, n.parse().ok()?)),
    }
}
