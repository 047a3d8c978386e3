use std::future::Future;
use std::sync::Arc;
use std::time::Duration;

use chrono::{DateTime, Utc};
use tokio::time::MissedTickBehavior;

use checkin_core::schedule::ScheduleMatcher;

use crate::guard::TriggerGuard;
use crate::initiator::{CallInitiator, CallRequest, InitiateError};
use crate::store::{CallStore, StoreError};

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct PollSummary {
    pub scanned: usize,
    pub due: usize,
    pub suppressed: usize,
    pub initiated: usize,
    pub failed: usize,
}

/// Time-driven trigger: one pass over all active schedules per tick.
pub struct SchedulerLoop {
    store: Arc<dyn CallStore>,
    matcher: ScheduleMatcher,
    guard: TriggerGuard,
    initiator: Arc<dyn CallInitiator>,
    poll_interval: Duration,
}

impl SchedulerLoop {
    pub fn new(
        store: Arc<dyn CallStore>,
        matcher: ScheduleMatcher,
        guard: TriggerGuard,
        initiator: Arc<dyn CallInitiator>,
        poll_interval: Duration,
    ) -> Self {
        Self {
            store,
            matcher,
            guard,
            initiator,
            poll_interval,
        }
    }

    pub async fn poll_once(&self, now: DateTime<Utc>) -> Result<PollSummary, StoreError> {
        let schedules = self.store.list_active_schedules().await?;
        let mut summary = PollSummary {
            scanned: schedules.len(),
            ..PollSummary::default()
        };

        for schedule in schedules.iter().filter(|s| self.matcher.should_fire(s, now)) {
            summary.due += 1;
            match self.guard.recently_triggered(schedule.id, now).await {
                Ok(true) => {
                    summary.suppressed += 1;
                    tracing::debug!(schedule_id = %schedule.id, "Schedule fired recently; skipped");
                    continue;
                }
                Ok(false) => {}
                Err(e) => {
                    summary.failed += 1;
                    tracing::warn!(schedule_id = %schedule.id, error = %e, "Trigger guard lookup failed; skipped");
                    continue;
                }
            }

            match self.initiator.initiate(&CallRequest::for_schedule(schedule)).await {
                Ok(call) => {
                    summary.initiated += 1;
                    tracing::info!(
                        schedule_id = %schedule.id,
                        call_id = %call.id,
                        status = %call.status,
                        "Scheduled call placed"
                    );
                }
                Err(e) => {
                    summary.failed += 1;
                    match &e {
                        InitiateError::MissingContact { .. } => {
                            tracing::error!(schedule_id = %schedule.id, error = %e, "Schedule misconfigured")
                        }
                        _ => tracing::warn!(schedule_id = %schedule.id, error = %e, "Scheduled call failed"),
                    }
                }
            }
        }

        Ok(summary)
    }

    /// Poll until `shutdown` resolves. A pass always finishes before the next tick is taken.
    pub async fn run<F>(self, shutdown: F)
    where
        F: Future<Output = ()>,
    {
        let mut ticker = tokio::time::interval(self.poll_interval);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
        tokio::pin!(shutdown);

        tracing::info!(
            initiator = self.initiator.kind(),
            poll_interval_secs = self.poll_interval.as_secs(),
            tolerance_secs = self.matcher.tolerance().num_seconds(),
            lookback_secs = self.guard.lookback().num_seconds(),
            "Scheduler started"
        );
        loop {
            tokio::select! {
                _ = &mut shutdown => break,
                _ = ticker.tick() => {
                    match self.poll_once(Utc::now()).await {
                        Ok(summary) if summary.due > 0 => tracing::info!(?summary, "Scheduler poll"),
                        Ok(_) => {}
                        Err(e) => tracing::warn!(error = %e, "Scheduler poll failed"),
                    }
                }
            }
        }
        tracing::info!("Scheduler stopped");
    }
}
