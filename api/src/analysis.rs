//! Store-backed transcript analysis and its background queue.
//!
//! The reconciler and the simulator go through [`AnalysisQueue::dispatch`], which
//! claims the call's analysis slot (`CallStore::claim_analysis`) before queueing.
//! A claim whose job cannot be queued, or whose analysis fails, is released so a
//! re-delivered completion can claim it again. The operator re-analyze route calls
//! [`TranscriptAnalyzer::analyze_call`] directly and upserts over earlier responses.

use std::sync::Arc;

use chrono::{DateTime, NaiveDate, Utc};
use serde::Serialize;
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use utoipa::ToSchema;
use uuid::Uuid;

use checkin_core::analysis::{self, Recommendation, TaskOutcome};
use checkin_core::calls::TaskResponse;

use crate::store::{CallStore, StoreError};

#[derive(Debug, Clone, Serialize, ToSchema)]
pub struct AnalysisReport {
    pub call_id: Uuid,
    pub outcomes: Vec<TaskOutcome>,
    pub recommendations: Vec<Recommendation>,
}

#[derive(Clone)]
pub struct TranscriptAnalyzer {
    store: Arc<dyn CallStore>,
}

impl TranscriptAnalyzer {
    pub fn new(store: Arc<dyn CallStore>) -> Self {
        Self { store }
    }

    /// Infer outcomes for the user's active tasks and persist one response per mentioned task.
    pub async fn analyze(
        &self,
        user_id: Uuid,
        call_id: Uuid,
        transcript: &str,
        reference_date: NaiveDate,
    ) -> Result<Vec<TaskOutcome>, StoreError> {
        let tasks = self.store.active_tasks(user_id).await?;
        let outcomes = analysis::infer_outcomes(&tasks, transcript);

        for outcome in &outcomes {
            let response = TaskResponse {
                user_id,
                task_id: outcome.task_id,
                call_id,
                response_value: outcome.response_value,
                response_text: Some(outcome.inferred_text.clone()),
                response_date: reference_date,
                completed: outcome.completed,
            };
            self.store.upsert_task_response(&response).await?;
        }

        tracing::info!(
            %call_id,
            %user_id,
            tasks = tasks.len(),
            matched = outcomes.len(),
            completed = outcomes.iter().filter(|o| o.completed).count(),
            "Transcript analyzed"
        );
        Ok(outcomes)
    }

    /// Analyze a stored call. `None` when the call does not exist.
    pub async fn analyze_call(&self, call_id: Uuid) -> Result<Option<AnalysisReport>, StoreError> {
        let Some(call) = self.store.get_call(call_id).await? else {
            return Ok(None);
        };
        let transcript = call.transcript.as_deref().unwrap_or_default();
        let reference_date = call.started_at.unwrap_or_else(Utc::now).date_naive();

        let outcomes = self
            .analyze(call.user_id, call.id, transcript, reference_date)
            .await?;
        let tasks = self.store.active_tasks(call.user_id).await?;
        let recommendations = analysis::recommendations(&tasks, &outcomes);

        Ok(Some(AnalysisReport {
            call_id,
            outcomes,
            recommendations,
        }))
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct AnalysisJob {
    pub call_id: Uuid,
}

/// Sending half of the analysis worker's channel.
#[derive(Clone)]
pub struct AnalysisQueue {
    tx: mpsc::UnboundedSender<AnalysisJob>,
}

impl AnalysisQueue {
    pub fn channel() -> (Self, mpsc::UnboundedReceiver<AnalysisJob>) {
        let (tx, rx) = mpsc::unbounded_channel();
        (Self { tx }, rx)
    }

    /// `false` when the worker is gone and the job was dropped.
    pub fn enqueue(&self, call_id: Uuid) -> bool {
        if self.tx.send(AnalysisJob { call_id }).is_err() {
            tracing::warn!(%call_id, "Analysis worker is gone; job dropped");
            return false;
        }
        true
    }

    /// Claim the call's analysis and queue it. Returns whether a job was queued.
    pub async fn dispatch(
        &self,
        store: &dyn CallStore,
        call_id: Uuid,
        at: DateTime<Utc>,
    ) -> Result<bool, StoreError> {
        if !store.claim_analysis(call_id, at).await? {
            return Ok(false);
        }
        if self.enqueue(call_id) {
            return Ok(true);
        }
        store.release_analysis(call_id).await?;
        Ok(false)
    }
}

/// Drain jobs until every queue handle is dropped.
pub fn spawn_worker(
    analyzer: TranscriptAnalyzer,
    mut jobs: mpsc::UnboundedReceiver<AnalysisJob>,
) -> JoinHandle<()> {
    tokio::spawn(async move {
        while let Some(job) = jobs.recv().await {
            match analyzer.analyze_call(job.call_id).await {
                Ok(Some(_)) => {}
                Ok(None) => tracing::warn!(call_id = %job.call_id, "Analysis job for unknown call"),
                Err(e) => {
                    tracing::warn!(call_id = %job.call_id, error = %e, "Analysis failed; claim released");
                    if let Err(e) = analyzer.store.release_analysis(job.call_id).await {
                        tracing::error!(call_id = %job.call_id, error = %e, "Failed to release analysis claim");
                    }
                }
            }
        }
        tracing::debug!("Analysis worker stopped");
    })
}
