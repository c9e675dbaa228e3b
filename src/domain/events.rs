//! Event records for the per-run audit log.
//!
//! Every stage transition is appended to the run's `events.jsonl`, so the
//! status of a run can be reconstructed after the process exits.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use super::run::Stage;

/// A single event in the append-only run log
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Event {
    /// Unique identifier for this event
    pub id: Uuid,

    /// When this event occurred (ISO 8601)
    pub timestamp: DateTime<Utc>,

    /// The run this event belongs to
    pub run_id: String,

    /// Stage this event concerns (if applicable)
    pub stage: Option<Stage>,

    /// Type of event
    pub event_type: EventType,

    /// Human-readable summary (NO secrets)
    pub summary: String,

    /// Status of the stage/run after this event
    pub status: StageStatus,

    /// Time taken in milliseconds (for finished stages)
    pub duration_ms: Option<u64>,

    /// Error message if failed
    pub error: Option<String>,
}

impl Event {
    /// Create a new event with the current timestamp
    pub fn new(
        run_id: impl Into<String>,
        stage: Option<Stage>,
        event_type: EventType,
        summary: impl Into<String>,
        status: StageStatus,
    ) -> Self {
        Self {
            id: Uuid::new_v4(),
            timestamp: Utc::now(),
            run_id: run_id.into(),
            stage,
            event_type,
            summary: summary.into(),
            status,
            duration_ms: None,
            error: None,
        }
    }

    pub fn with_duration(mut self, duration_ms: u64) -> Self {
        self.duration_ms = Some(duration_ms);
        self
    }

    pub fn with_error(mut self, error: impl Into<String>) -> Self {
        self.error = Some(error.into());
        self
    }
}

/// Types of events that can occur during a run
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum EventType {
    RunStarted,
    RunCompleted,
    RunFailed,
    StageStarted,
    StageCompleted,
    StageFailed,
    /// Terminal remote sync did not succeed (run outcome unaffected)
    SyncFailed,
}

/// Status of a stage or run
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum StageStatus {
    Pending,
    Running,
    Completed,
    Failed,
}

impl Default for StageStatus {
    fn default() -> Self {
        Self::Pending
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_event_serialization() {
        let event = Event::new(
            "10_18_2026_09_30_00",
            Some(Stage::Training),
            EventType::StageStarted,
            "Starting model_trainer",
            StageStatus::Running,
        );

        let json = serde_json::to_string(&event).unwrap();
        assert!(json.contains("\"stage\":\"training\""));
        assert!(json.contains("\"event_type\":\"stage_started\""));

        let parsed: Event = serde_json::from_str(&json).unwrap();
        assert_eq!(parsed.event_type, EventType::StageStarted);
        assert_eq!(parsed.stage, Some(Stage::Training));
    }

    #[test]
    fn test_event_with_duration_and_error() {
        let event = Event::new(
            "run",
            Some(Stage::Evaluation),
            EventType::StageFailed,
            "evaluation failed",
            StageStatus::Failed,
        )
        .with_duration(1500)
        .with_error("model rejected");

        assert_eq!(event.duration_ms, Some(1500));
        assert_eq!(event.error.as_deref(), Some("model rejected"));
    }
}
