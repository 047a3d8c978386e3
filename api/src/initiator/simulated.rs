use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use chrono::Utc;
use uuid::Uuid;

use checkin_core::calls::{CallCompletion, CallRecord};
use checkin_core::script::simulated_transcript;

use super::{CallInitiator, CallRequest, InitiateError, prepare, refreshed};
use crate::analysis::AnalysisQueue;
use crate::store::{CallStore, StoreError};

const LINE_INTERVAL: Duration = Duration::from_secs(1);
const SIMULATED_DURATION_SECS: i32 = 180;

/// Stand-in for the voice provider: streams a scripted conversation into the
/// record, completes it, and queues analysis.
pub struct SimulatedCallInitiator {
    store: Arc<dyn CallStore>,
    analysis: AnalysisQueue,
    line_interval: Duration,
}

impl SimulatedCallInitiator {
    pub fn new(store: Arc<dyn CallStore>, analysis: AnalysisQueue) -> Self {
        Self {
            store,
            analysis,
            line_interval: LINE_INTERVAL,
        }
    }

    #[cfg(test)]
    pub fn with_line_interval(mut self, interval: Duration) -> Self {
        self.line_interval = interval;
        self
    }
}

#[async_trait]
impl CallInitiator for SimulatedCallInitiator {
    fn kind(&self) -> &'static str {
        "simulated"
    }

    async fn initiate(&self, request: &CallRequest) -> Result<CallRecord, InitiateError> {
        let prepared = prepare(self.store.as_ref(), request, Utc::now()).await?;
        let call_id = prepared.record.id;
        self.store.mark_in_progress(call_id, Utc::now()).await?;

        let lines = simulated_transcript(prepared.profile.full_name.as_deref(), &prepared.tasks);
        tracing::info!(
            %call_id,
            user_id = %request.user_id,
            lines = lines.len(),
            "Simulated call started"
        );

        // Not cancelled on shutdown; a half-streamed simulation just stays in progress.
        let store = self.store.clone();
        let analysis = self.analysis.clone();
        let interval = self.line_interval;
        tokio::spawn(async move {
            if let Err(e) = stream_conversation(store, analysis, call_id, lines, interval).await {
                tracing::warn!(%call_id, error = %e, "Simulated call aborted");
            }
        });

        Ok(refreshed(self.store.as_ref(), prepared.record).await?)
    }
}

async fn stream_conversation(
    store: Arc<dyn CallStore>,
    analysis: AnalysisQueue,
    call_id: Uuid,
    lines: Vec<String>,
    interval: Duration,
) -> Result<(), StoreError> {
    for line in &lines {
        tokio::time::sleep(interval).await;
        store.append_transcript(call_id, line).await?;
    }

    let transcript = store
        .get_call(call_id)
        .await?
        .and_then(|call| call.transcript)
        .unwrap_or_else(|| lines.join("\n"));
    let completed = store
        .complete_call(
            call_id,
            &CallCompletion {
                transcript,
                ended_at: Utc::now(),
                duration_seconds: SIMULATED_DURATION_SECS,
                recording_reference: None,
            },
        )
        .await?;
    if !completed {
        tracing::warn!(%call_id, "Simulated call was already terminal; completion skipped");
        return Ok(());
    }

    analysis.dispatch(store.as_ref(), call_id, Utc::now()).await?;
    tracing::info!(%call_id, "Simulated call completed");
    Ok(())
}
