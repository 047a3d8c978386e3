use serde::Deserialize;
use utoipa::ToSchema;

/// Raw provider notification as delivered. Unknown fields are ignored.
#[derive(Debug, Clone, Default, Deserialize, ToSchema)]
pub struct ProviderWebhook {
    #[serde(default, alias = "call_id")]
    pub provider_call_id: Option<String>,
    #[serde(default)]
    pub status: Option<String>,
    #[serde(default)]
    pub transcript: Option<String>,
    /// Call length in seconds
    #[serde(default)]
    pub duration: Option<f64>,
    #[serde(default, alias = "recording_url")]
    pub recording_reference: Option<String>,
    /// Dialled number, used only for fallback matching
    #[serde(default, alias = "phone_number")]
    pub contact_address: Option<String>,
    #[serde(default)]
    pub events: Option<Vec<ProviderSubEvent>>,
}

/// One granular transcript chunk inside a webhook.
#[derive(Debug, Clone, Default, Deserialize, ToSchema)]
pub struct ProviderSubEvent {
    /// Provider event id; strings and numbers are both accepted
    #[serde(default)]
    #[schema(value_type = Option<String>)]
    pub id: Option<serde_json::Value>,
    #[serde(default)]
    pub speaker: Option<String>,
    #[serde(default, alias = "transcript", alias = "message")]
    pub text: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum WebhookError {
    #[error("provider_call_id is required")]
    MissingCallId,
}

/// What a webhook asks the engine to do with the call's status.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum WebhookStatus {
    Completed,
    /// Provider reported the call as dead; carries the provider's status text
    Failed(String),
    /// Anything else: ringing, streaming, queued, or no status at all
    Update(Option<String>),
}

const FAILURE_STATUSES: &[&str] = &["failed", "error", "busy", "no-answer", "no_answer", "canceled", "cancelled"];

impl WebhookStatus {
    pub fn parse(raw: Option<&str>) -> Self {
        let Some(raw) = raw.map(str::trim).filter(|s| !s.is_empty()) else {
            return WebhookStatus::Update(None);
        };
        let normalized = raw.to_lowercase();
        if normalized == "completed" {
            WebhookStatus::Completed
        } else if FAILURE_STATUSES.contains(&normalized.as_str()) {
            WebhookStatus::Failed(normalized)
        } else {
            WebhookStatus::Update(Some(normalized))
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Fragment {
    pub provider_event_id: Option<String>,
    pub speaker: Option<String>,
    pub text: String,
}

/// A webhook with its mandatory identifier checked and its content normalized.
#[derive(Debug, Clone)]
pub struct WebhookEvent {
    pub provider_call_id: String,
    pub status: WebhookStatus,
    pub contact_address: Option<String>,
    pub transcript: Option<String>,
    pub fragments: Vec<Fragment>,
    pub duration_seconds: Option<i32>,
    pub recording_reference: Option<String>,
}

impl ProviderWebhook {
    pub fn into_event(self) -> Result<WebhookEvent, WebhookError> {
        let provider_call_id = non_empty(self.provider_call_id).ok_or(WebhookError::MissingCallId)?;
        let transcript = non_empty(self.transcript);

        let sub_events = self.events.unwrap_or_default();
        let fragments = if sub_events.is_empty() {
            // A bare transcript is one fragment without a provider event id, so it is never deduplicated.
            transcript
                .iter()
                .map(|text| Fragment {
                    provider_event_id: None,
                    speaker: None,
                    text: text.clone(),
                })
                .collect()
        } else {
            sub_events
                .into_iter()
                .filter_map(|ev| {
                    let text = non_empty(ev.text)?;
                    Some(Fragment {
                        provider_event_id: ev.id.as_ref().and_then(event_id_string),
                        speaker: non_empty(ev.speaker),
                        text,
                    })
                })
                .collect()
        };

        Ok(WebhookEvent {
            provider_call_id,
            status: WebhookStatus::parse(self.status.as_deref()),
            contact_address: non_empty(self.contact_address),
            transcript,
            fragments,
            duration_seconds: self
                .duration
                .filter(|d| d.is_finite() && *d >= 0.0)
                .map(|d| d.round().min(i32::MAX as f64) as i32),
            recording_reference: non_empty(self.recording_reference),
        })
    }
}

fn non_empty(value: Option<String>) -> Option<String> {
    value
        .map(|v| v.trim().to_string())
        .filter(|v| !v.is_empty())
}

fn event_id_string(value: &serde_json::Value) -> Option<String> {
    match value {
        serde_json::Value::String(s) => non_empty(Some(s.clone())),
        serde_json::Value::Number(n) => Some(n.to_string()),
        _ => None,
    }
}
