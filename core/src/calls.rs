use std::fmt;
use std::str::FromStr;

use chrono::{DateTime, NaiveDate, Utc};
use serde::{Deserialize, Serialize};
use utoipa::ToSchema;
use uuid::Uuid;

/// Lifecycle of a call attempt.
///
/// `scheduled → initiated → in_progress → completed`, with `failed` reachable
/// from any non-terminal state. Status never moves backwards.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, ToSchema)]
#[serde(rename_all = "snake_case")]
pub enum CallStatus {
    Scheduled,
    Initiated,
    InProgress,
    Completed,
    Failed,
}

impl CallStatus {
    pub const NON_TERMINAL: [CallStatus; 3] = [
        CallStatus::Scheduled,
        CallStatus::Initiated,
        CallStatus::InProgress,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            CallStatus::Scheduled => "scheduled",
            CallStatus::Initiated => "initiated",
            CallStatus::InProgress => "in_progress",
            CallStatus::Completed => "completed",
            CallStatus::Failed => "failed",
        }
    }

    pub fn is_terminal(&self) -> bool {
        matches!(self, CallStatus::Completed | CallStatus::Failed)
    }

    fn rank(&self) -> u8 {
        match self {
            CallStatus::Scheduled => 0,
            CallStatus::Initiated => 1,
            CallStatus::InProgress => 2,
            CallStatus::Completed | CallStatus::Failed => 3,
        }
    }

    /// Whether `self → next` is a legal forward move.
    pub fn can_transition_to(&self, next: CallStatus) -> bool {
        if self.is_terminal() {
            return false;
        }
        next == CallStatus::Failed || next.rank() > self.rank()
    }

    /// A completion may be applied to any non-failed call. Re-applying it to an
    /// already completed call only rewrites equivalent values.
    pub fn accepts_completion(&self) -> bool {
        *self != CallStatus::Failed
    }
}

impl fmt::Display for CallStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error("unknown call status '{0}'")]
pub struct UnknownCallStatus(pub String);

impl FromStr for CallStatus {
    type Err = UnknownCallStatus;

    fn from_str(raw: &str) -> Result<Self, Self::Err> {
        match raw {
            "scheduled" => Ok(CallStatus::Scheduled),
            "initiated" => Ok(CallStatus::Initiated),
            "in_progress" => Ok(CallStatus::InProgress),
            "completed" => Ok(CallStatus::Completed),
            "failed" => Ok(CallStatus::Failed),
            other => Err(UnknownCallStatus(other.to_string())),
        }
    }
}

/// One attempted or completed call.
#[derive(Debug, Clone, Serialize, ToSchema)]
pub struct CallRecord {
    pub id: Uuid,
    pub user_id: Uuid,
    /// Null for ad-hoc calls
    #[serde(skip_serializing_if = "Option::is_none")]
    pub schedule_id: Option<Uuid>,
    pub status: CallStatus,
    pub scheduled_at: DateTime<Utc>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub started_at: Option<DateTime<Utc>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub ended_at: Option<DateTime<Utc>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub duration_seconds: Option<i32>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub transcript: Option<String>,
    /// Set once the voice provider accepts the call
    #[serde(skip_serializing_if = "Option::is_none")]
    pub provider_call_id: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub recording_reference: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error_detail: Option<String>,
    /// When transcript analysis was claimed for this call
    #[serde(skip_serializing_if = "Option::is_none")]
    pub analyzed_at: Option<DateTime<Utc>>,
}

impl CallRecord {
    /// The instant the attempt counts from: start if known, otherwise creation.
    pub fn attempted_at(&self) -> DateTime<Utc> {
        self.started_at.unwrap_or(self.scheduled_at)
    }
}

#[derive(Debug, Clone)]
pub struct NewCallRecord {
    pub user_id: Uuid,
    pub schedule_id: Option<Uuid>,
    pub scheduled_at: DateTime<Utc>,
}

/// Terminal "completed" values written onto a CallRecord.
#[derive(Debug, Clone, PartialEq)]
pub struct CallCompletion {
    pub transcript: String,
    pub ended_at: DateTime<Utc>,
    pub duration_seconds: i32,
    pub recording_reference: Option<String>,
}

/// One append-only piece of provider-reported content for a call.
#[derive(Debug, Clone, Serialize, ToSchema)]
pub struct CallEvent {
    pub id: Uuid,
    pub call_id: Uuid,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub speaker: Option<String>,
    pub text: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub provider_event_id: Option<String>,
    pub created_at: DateTime<Utc>,
}

#[derive(Debug, Clone, PartialEq)]
pub struct NewCallEvent {
    pub call_id: Uuid,
    pub speaker: Option<String>,
    pub text: String,
    /// Dedup key; at most one event per (call_id, provider_event_id)
    pub provider_event_id: Option<String>,
}

/// Rebuild the authoritative transcript from the ordered event log.
pub fn join_transcript(events: &[CallEvent]) -> String {
    events
        .iter()
        .map(|event| event.text.as_str())
        .collect::<Vec<_>>()
        .join("\n")
}

#[derive(Debug, Clone)]
pub struct ContactProfile {
    pub user_id: Uuid,
    pub full_name: Option<String>,
    /// Phone number the provider dials
    pub contact_address: Option<String>,
}

#[derive(Debug, Clone, Serialize, ToSchema)]
pub struct Task {
    pub id: Uuid,
    pub user_id: Uuid,
    pub title: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub target_value: Option<f64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub unit: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Serialize, ToSchema)]
pub struct TaskResponse {
    pub user_id: Uuid,
    pub task_id: Uuid,
    pub call_id: Uuid,
    pub response_value: Option<f64>,
    pub response_text: Option<String>,
    pub response_date: NaiveDate,
    pub completed: bool,
}
