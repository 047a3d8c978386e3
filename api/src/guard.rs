use std::sync::Arc;

use chrono::{DateTime, Duration, Utc};
use uuid::Uuid;

use crate::store::{CallStore, StoreError};

/// Suppresses a second trigger of the same schedule inside the look-back window.
///
/// Any attempt counts, including failed ones: a broken schedule is retried at
/// most once per window instead of on every poll.
#[derive(Clone)]
pub struct TriggerGuard {
    store: Arc<dyn CallStore>,
    lookback: Duration,
}

impl TriggerGuard {
    pub fn new(store: Arc<dyn CallStore>, lookback: Duration) -> Self {
        Self { store, lookback }
    }

    pub fn lookback(&self) -> Duration {
        self.lookback
    }

    pub async fn recently_triggered(
        &self,
        schedule_id: Uuid,
        now: DateTime<Utc>,
    ) -> Result<bool, StoreError> {
        self.store
            .schedule_attempted_since(schedule_id, now - self.lookback)
            .await
    }
}
