//! Model quality gates.
//!
//! Thresholds a trained model must clear before it is kept:
//! - minimum train f1
//! - maximum train/test f1 gap (overfit or underfit)
//! - minimum improvement over the deployed model

use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::config::ConfigError;
use crate::domain::ClassificationMetric;

/// Quality thresholds for training and evaluation
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct QualityGates {
    /// Minimum train f1 (default: 0.6)
    #[serde(default = "default_expected_score")]
    pub expected_score: f64,

    /// Maximum |train f1 - test f1| (default: 0.05)
    #[serde(default = "default_overfit_threshold")]
    pub overfitting_underfitting_threshold: f64,

    /// Minimum f1 gain over the deployed model (default: 0.02)
    #[serde(default = "default_change_threshold")]
    pub change_threshold: f64,
}

fn default_expected_score() -> f64 {
    0.6
}
fn default_overfit_threshold() -> f64 {
    0.05
}
fn default_change_threshold() -> f64 {
    0.02
}

impl Default for QualityGates {
    fn default() -> Self {
        Self {
            expected_score: default_expected_score(),
            overfitting_underfitting_threshold: default_overfit_threshold(),
            change_threshold: default_change_threshold(),
        }
    }
}

impl QualityGates {
    /// Reject thresholds outside their meaningful ranges
    pub fn validate(&self) -> Result<(), ConfigError> {
        if !(0.0..=1.0).contains(&self.expected_score) {
            return Err(ConfigError::InvalidSetting {
                key: "quality_gates.expected_score",
                message: format!("{} is not in [0, 1]", self.expected_score),
            });
        }
        if !(0.0..=1.0).contains(&self.overfitting_underfitting_threshold) {
            return Err(ConfigError::InvalidSetting {
                key: "quality_gates.overfitting_underfitting_threshold",
                message: format!("{} is not in [0, 1]", self.overfitting_underfitting_threshold),
            });
        }
        if !(-1.0..=1.0).contains(&self.change_threshold) {
            return Err(ConfigError::InvalidSetting {
                key: "quality_gates.change_threshold",
                message: format!("{} is not in [-1, 1]", self.change_threshold),
            });
        }
        Ok(())
    }

    /// Train f1 must reach the expected score
    pub fn check_train_score(&self, train: &ClassificationMetric) -> Result<(), QualityViolation> {
        if train.f1_score < self.expected_score {
            return Err(QualityViolation::BelowExpectedScore {
                actual: train.f1_score,
                expected: self.expected_score,
            });
        }
        Ok(())
    }

    /// Train and test f1 must stay within the overfit/underfit threshold
    pub fn check_generalisation(
        &self,
        train: &ClassificationMetric,
        test: &ClassificationMetric,
    ) -> Result<(), QualityViolation> {
        let diff = (train.f1_score - test.f1_score).abs();
        if diff > self.overfitting_underfitting_threshold {
            return Err(QualityViolation::OverfitGap {
                diff,
                threshold: self.overfitting_underfitting_threshold,
            });
        }
        Ok(())
    }

    /// Whether an improvement over the deployed model is enough to accept
    pub fn accepts_improvement(&self, improved: f64) -> bool {
        improved >= self.change_threshold
    }
}

/// Quality gate violations
#[derive(Debug, Clone, Error, PartialEq)]
pub enum QualityViolation {
    #[error("Trained model is not good enough: train f1 {actual:.4} < expected {expected:.4}")]
    BelowExpectedScore { actual: f64, expected: f64 },

    #[error("Model is overfitted or underfitted: f1 gap {diff:.4} > threshold {threshold:.4}")]
    OverfitGap { diff: f64, threshold: f64 },

    #[error(
        "Trained model is not better than current best: improvement {improved:.4} < change threshold {threshold:.4}"
    )]
    NotBetterThanBest { improved: f64, threshold: f64 },
}
