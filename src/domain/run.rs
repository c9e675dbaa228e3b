//! Run state: the pipeline state machine and run reconstruction from events.
//!
//! A Run is one execution of the pipeline, identified by its start
//! timestamp and owning one directory under the artifact root.

use std::collections::BTreeMap;
use std::fmt;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use super::events::{Event, EventType, StageStatus};

/// Pipeline stages, in execution order
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Stage {
    /// Configuration, schema, connection and run lock
    Startup,
    Ingestion,
    Validation,
    Transformation,
    Training,
    Evaluation,
    Pusher,
    /// Terminal remote synchronization
    Sync,
}

impl Stage {
    pub fn as_str(&self) -> &'static str {
        match self {
            Stage::Startup => "startup",
            Stage::Ingestion => "data_ingestion",
            Stage::Validation => "data_validation",
            Stage::Transformation => "data_transformation",
            Stage::Training => "model_trainer",
            Stage::Evaluation => "model_evaluation",
            Stage::Pusher => "model_pusher",
            Stage::Sync => "sync",
        }
    }
}

impl fmt::Display for Stage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Live state of the orchestrator
///
/// ```text
/// Idle -> Ingesting -> Validating -> Transforming -> Training -> Evaluating
///      -> [Accepted -> Pushing | Rejected -> Aborted] -> Synced
/// ```
///
/// Any working state may also move to `Aborted` on a fatal error.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case", tag = "state")]
pub enum PipelineState {
    Idle,
    Ingesting,
    Validating,
    Transforming,
    Training,
    Evaluating,
    Accepted,
    Rejected,
    Pushing,
    Aborted { stage: Stage, error: String },
    Synced { succeeded: bool },
}

impl Default for PipelineState {
    fn default() -> Self {
        Self::Idle
    }
}

impl PipelineState {
    /// The working state for a stage, if the stage has one
    pub fn for_stage(stage: Stage) -> Option<Self> {
        match stage {
            Stage::Ingestion => Some(Self::Ingesting),
            Stage::Validation => Some(Self::Validating),
            Stage::Transformation => Some(Self::Transforming),
            Stage::Training => Some(Self::Training),
            Stage::Evaluation => Some(Self::Evaluating),
            Stage::Pusher => Some(Self::Pushing),
            Stage::Startup | Stage::Sync => None,
        }
    }

    /// True between leaving `Idle` and reaching `Synced`
    pub fn is_running(&self) -> bool {
        !matches!(self, Self::Idle | Self::Synced { .. })
    }

    /// Whether `next` is a legal successor of this state
    pub fn can_transition_to(&self, next: &PipelineState) -> bool {
        use PipelineState::*;

        if matches!(next, Aborted { .. }) {
            return self.is_running() && !matches!(self, Aborted { .. });
        }

        matches!(
            (self, next),
            (Idle, Ingesting)
                | (Ingesting, Validating)
                | (Validating, Transforming)
                | (Transforming, Training)
                | (Training, Evaluating)
                | (Evaluating, Accepted)
                | (Evaluating, Rejected)
                | (Accepted, Pushing)
                | (Pushing, Synced { .. })
                | (Aborted { .. }, Synced { .. })
                | (Synced { .. }, Idle)
        )
    }
}

/// Outcome of a run as recorded in its event log
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case", tag = "status")]
pub enum RunStatus {
    Running,
    Completed,
    Failed { error: String },
}

impl Default for RunStatus {
    fn default() -> Self {
        Self::Running
    }
}

/// A pipeline run reconstructed from its event log
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Run {
    /// Run id (start timestamp)
    pub id: String,

    pub pipeline_name: String,

    pub status: RunStatus,

    pub started_at: DateTime<Utc>,

    pub completed_at: Option<DateTime<Utc>>,

    /// Last status of each stage
    pub stage_statuses: BTreeMap<Stage, StageStatus>,

    /// Terminal sync failures, if any
    pub sync_errors: Vec<String>,
}

impl Run {
    /// Create a new run
    pub fn new(id: impl Into<String>, pipeline_name: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            pipeline_name: pipeline_name.into(),
            status: RunStatus::Running,
            started_at: Utc::now(),
            completed_at: None,
            stage_statuses: BTreeMap::new(),
            sync_errors: Vec::new(),
        }
    }

    /// Reconstruct run state from a sequence of events
    pub fn from_events(events: &[Event]) -> Option<Self> {
        let first_event = events.first()?;

        let mut run = Self::new(first_event.run_id.clone(), String::new());
        run.started_at = first_event.timestamp;

        for event in events {
            run.apply_event(event);
        }

        Some(run)
    }

    /// Apply a single event to update run state
    pub fn apply_event(&mut self, event: &Event) {
        match event.event_type {
            EventType::RunStarted => {
                self.status = RunStatus::Running;
                self.started_at = event.timestamp;
                self.pipeline_name = event.summary.clone();
            }
            EventType::RunCompleted => {
                self.status = RunStatus::Completed;
                self.completed_at = Some(event.timestamp);
            }
            EventType::RunFailed => {
                self.status = RunStatus::Failed {
                    error: event.error.clone().unwrap_or_default(),
                };
                self.completed_at = Some(event.timestamp);
            }
            EventType::StageStarted | EventType::StageCompleted | EventType::StageFailed => {
                if let Some(stage) = event.stage {
                    self.stage_statuses.insert(stage, event.status);
                }
            }
            EventType::SyncFailed => {
                self.sync_errors
                    .push(event.error.clone().unwrap_or_else(|| event.summary.clone()));
            }
        }
    }

    pub fn is_running(&self) -> bool {
        matches!(self.status, RunStatus::Running)
    }

    pub fn is_stage_completed(&self, stage: Stage) -> bool {
        self.stage_statuses
            .get(&stage)
            .map(|s| *s == StageStatus::Completed)
            .unwrap_or(false)
    }
}
