//! The six pipeline stages, in execution order.
//!
//! Each stage consumes the artifacts of earlier stages and returns its
//! own. Stages know nothing about run state or sync; the orchestrator
//! sequences them.

pub mod evaluation;
pub mod ingestion;
pub mod pusher;
pub mod trainer;
pub mod transformation;
pub mod validation;

pub use evaluation::ModelEvaluation;
pub use ingestion::DataIngestion;
pub use pusher::ModelPusher;
pub use trainer::ModelTrainer;
pub use transformation::DataTransformation;
pub use validation::{DataQualityError, DataValidation};
