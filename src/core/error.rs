//! Structured pipeline failure.
//!
//! Stages return `anyhow` errors whose chains carry typed domain errors.
//! The orchestrator wraps them in [`PipelineError`], which records the
//! stage the failure came from and classifies the cause.

use std::fmt;

use serde::{Deserialize, Serialize};
use thiserror::Error;

use super::gates::QualityViolation;
use super::guard::RunLocked;
use crate::adapters::SourceError;
use crate::config::ConfigError;
use crate::domain::Stage;
use crate::stages::validation::DataQualityError;

/// Failure taxonomy
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ErrorKind {
    /// Missing environment value, bad schema or config file
    Configuration,
    /// Data store or filesystem failure
    SourceIo,
    /// Schema conformance failure or drift halt
    DataQuality,
    /// Training or evaluation gate rejected the model
    ModelQuality,
    /// Another run holds the lock
    Busy,
    Internal,
}

impl ErrorKind {
    /// Classify by the first typed error found in the chain
    pub fn classify(error: &anyhow::Error) -> Self {
        for cause in error.chain() {
            if cause.is::<ConfigError>() {
                return Self::Configuration;
            }
            if cause.is::<DataQualityError>() {
                return Self::DataQuality;
            }
            if cause.is::<QualityViolation>() {
                return Self::ModelQuality;
            }
            if cause.is::<RunLocked>() {
                return Self::Busy;
            }
            if cause.is::<SourceError>()
                || cause.is::<std::io::Error>()
                || cause.is::<reqwest::Error>()
                || cause.is::<mongodb::error::Error>()
                || cause.is::<csv::Error>()
                || cause.is::<ndarray_npy::ReadNpyError>()
                || cause.is::<ndarray_npy::WriteNpyError>()
            {
                return Self::SourceIo;
            }
        }
        Self::Internal
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Configuration => "configuration",
            Self::SourceIo => "source_io",
            Self::DataQuality => "data_quality",
            Self::ModelQuality => "model_quality",
            Self::Busy => "busy",
            Self::Internal => "internal",
        }
    }
}

impl fmt::Display for ErrorKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A run-ending failure with its origin
#[derive(Debug, Error)]
pub struct PipelineError {
    pub stage: Stage,
    pub kind: ErrorKind,
    #[source]
    pub source: anyhow::Error,
}

impl PipelineError {
    pub fn new(stage: Stage, source: anyhow::Error) -> Self {
        Self {
            stage,
            kind: ErrorKind::classify(&source),
            source,
        }
    }

    /// Typed cause, if the chain carries one of type `E`
    pub fn cause<E>(&self) -> Option<&E>
    where
        E: std::error::Error + Send + Sync + 'static,
    {
        self.source.chain().find_map(|c| c.downcast_ref::<E>())
    }
}

impl fmt::Display for PipelineError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} failed ({}): {:#}", self.stage, self.kind, self.source)
    }
}
