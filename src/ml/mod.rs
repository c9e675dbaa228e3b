//! Numeric building blocks used by the transformation, training and
//! evaluation stages.

pub mod arrays;
pub mod boosting;
pub mod drift;
pub mod estimator;
pub mod metric;
pub mod preprocess;
pub mod resample;

pub use boosting::{BoostedTrees, BoostingParams, GradientBoosting};
pub use drift::{detect_drift, ColumnDrift, DriftReport};
pub use estimator::{Estimator, ModelResolver, Predictor, SensorModel, TargetValueMapping};
pub use metric::classification_score;
pub use preprocess::Preprocessor;
pub use resample::{Resampler, ResamplerKind};
