//! Applies inbound provider notifications to call records.
//!
//! Resolution tiers, first match wins:
//! 1. the stored provider call id,
//! 2. the contact address owner's latest call within the hour,
//! 3. the latest non-terminal call of anyone within the hour.
//!
//! An unresolvable event changes nothing and is still acknowledged.

use std::sync::Arc;

use chrono::{DateTime, Duration, Utc};
use serde::Serialize;
use utoipa::ToSchema;
use uuid::Uuid;

use checkin_core::calls::{CallCompletion, CallRecord, CallStatus, NewCallEvent, join_transcript};
use checkin_core::webhook::{WebhookEvent, WebhookStatus};

use crate::analysis::AnalysisQueue;
use crate::store::{CallStore, StoreError};

/// How far back the recency tiers look.
pub const RESOLUTION_WINDOW_SECS: i64 = 60 * 60;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, ToSchema)]
#[serde(rename_all = "snake_case")]
pub enum ResolutionTier {
    ProviderCallId,
    ContactRecency,
    GlobalRecency,
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct IngestOutcome {
    pub call_id: Option<Uuid>,
    pub tier: Option<ResolutionTier>,
    pub inserted: usize,
    pub duplicates: usize,
    pub failed_inserts: usize,
}

#[derive(Clone)]
pub struct EventReconciler {
    store: Arc<dyn CallStore>,
    analysis: AnalysisQueue,
}

impl EventReconciler {
    pub fn new(store: Arc<dyn CallStore>, analysis: AnalysisQueue) -> Self {
        Self { store, analysis }
    }

    pub async fn ingest(&self, event: WebhookEvent) -> Result<IngestOutcome, StoreError> {
        self.ingest_at(event, Utc::now()).await
    }

    pub async fn ingest_at(
        &self,
        event: WebhookEvent,
        now: DateTime<Utc>,
    ) -> Result<IngestOutcome, StoreError> {
        let Some((call, tier)) = self.resolve(&event, now).await? else {
            tracing::info!(
                provider_call_id = %event.provider_call_id,
                status = ?event.status,
                "Webhook matched no call; acknowledged without changes"
            );
            return Ok(IngestOutcome::default());
        };

        let mut outcome = IngestOutcome {
            call_id: Some(call.id),
            tier: Some(tier),
            ..IngestOutcome::default()
        };
        self.record_fragments(&call, &event, &mut outcome).await;

        match &event.status {
            WebhookStatus::Completed => self.complete(&call, &event, now).await?,
            WebhookStatus::Failed(status) => {
                let detail = format!("provider reported status '{status}'");
                if self.store.mark_failed(call.id, &detail, now).await? {
                    tracing::warn!(call_id = %call.id, %status, "Call failed at provider");
                }
            }
            WebhookStatus::Update(status) => {
                if !call.status.is_terminal()
                    && call.status != CallStatus::InProgress
                    && self.store.mark_in_progress(call.id, now).await?
                {
                    tracing::debug!(call_id = %call.id, status = ?status, "Call in progress");
                }
            }
        }

        tracing::info!(
            call_id = %call.id,
            provider_call_id = %event.provider_call_id,
            tier = ?tier,
            inserted = outcome.inserted,
            duplicates = outcome.duplicates,
            failed_inserts = outcome.failed_inserts,
            "Webhook applied"
        );
        Ok(outcome)
    }

    async fn resolve(
        &self,
        event: &WebhookEvent,
        now: DateTime<Utc>,
    ) -> Result<Option<(CallRecord, ResolutionTier)>, StoreError> {
        if let Some(call) = self
            .store
            .find_call_by_provider_id(&event.provider_call_id)
            .await?
        {
            return Ok(Some((call, ResolutionTier::ProviderCallId)));
        }

        let since = now - Duration::seconds(RESOLUTION_WINDOW_SECS);
        if let Some(address) = event.contact_address.as_deref() {
            if let Some(user_id) = self.store.find_user_by_contact(address).await? {
                if let Some(call) = self.store.latest_call_for_user_since(user_id, since).await? {
                    return Ok(Some((call, ResolutionTier::ContactRecency)));
                }
            }
        }

        Ok(self
            .store
            .latest_open_call_since(since)
            .await?
            .map(|call| (call, ResolutionTier::GlobalRecency)))
    }

    /// Best effort: one failed insert never stops the rest of the batch.
    async fn record_fragments(
        &self,
        call: &CallRecord,
        event: &WebhookEvent,
        outcome: &mut IngestOutcome,
    ) {
        for fragment in &event.fragments {
            let new_event = NewCallEvent {
                call_id: call.id,
                speaker: fragment.speaker.clone(),
                text: fragment.text.clone(),
                provider_event_id: fragment.provider_event_id.clone(),
            };
            match self.store.insert_call_event(&new_event).await {
                Ok(true) => outcome.inserted += 1,
                Ok(false) => {
                    outcome.duplicates += 1;
                    tracing::debug!(
                        call_id = %call.id,
                        provider_event_id = ?fragment.provider_event_id,
                        "Duplicate call event skipped"
                    );
                }
                Err(e) => {
                    outcome.failed_inserts += 1;
                    tracing::warn!(
                        call_id = %call.id,
                        provider_event_id = ?fragment.provider_event_id,
                        error = %e,
                        "Failed to insert call event"
                    );
                }
            }
        }
    }

    async fn complete(
        &self,
        call: &CallRecord,
        event: &WebhookEvent,
        now: DateTime<Utc>,
    ) -> Result<(), StoreError> {
        if !call.status.accepts_completion() {
            tracing::warn!(call_id = %call.id, "Completion for a failed call ignored");
            return Ok(());
        }

        let events = self.store.list_call_events(call.id).await?;
        let mut transcript = join_transcript(&events);
        if transcript.is_empty() {
            transcript = event
                .transcript
                .clone()
                .or_else(|| call.transcript.clone())
                .unwrap_or_default();
        }

        // Re-deliveries keep the first end time so the rewrite is a no-op in effect.
        let ended_at = call.ended_at.unwrap_or(now);
        let duration_seconds = event.duration_seconds.unwrap_or_else(|| {
            call.started_at
                .map(|started| (ended_at - started).num_seconds().clamp(0, i32::MAX as i64) as i32)
                .unwrap_or(0)
        });

        let completion = CallCompletion {
            transcript,
            ended_at,
            duration_seconds,
            recording_reference: event.recording_reference.clone(),
        };
        if !self.store.complete_call(call.id, &completion).await? {
            tracing::warn!(call_id = %call.id, "Call no longer accepts completion");
            return Ok(());
        }

        if self.analysis.dispatch(self.store.as_ref(), call.id, now).await? {
            tracing::info!(call_id = %call.id, "Call completed; analysis queued");
        } else {
            tracing::debug!(call_id = %call.id, "Call completed; analysis not queued");
        }
        Ok(())
    }
}
