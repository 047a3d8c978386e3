//! Placing calls. Both initiators share [`prepare`], which refuses to create a
//! record for a user without a contact address.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use uuid::Uuid;

use checkin_core::calls::{CallRecord, ContactProfile, NewCallRecord, Task};
use checkin_core::schedule::Schedule;

use crate::store::{CallStore, StoreError};

pub mod provider;
pub mod simulated;

pub use provider::ProviderCallInitiator;
pub use simulated::SimulatedCallInitiator;

const AD_HOC_LABEL: &str = "Check-in";

#[derive(Debug, thiserror::Error)]
pub enum InitiateError {
    #[error("user {user_id} has no contact address on file")]
    MissingContact { user_id: Uuid },
    #[error("provider rejected call {call_id}: {detail}")]
    Provider { call_id: Uuid, detail: String },
    #[error(transparent)]
    Store(#[from] StoreError),
}

/// Who to call and under which schedule (none for ad-hoc calls).
#[derive(Debug, Clone)]
pub struct CallRequest {
    pub user_id: Uuid,
    pub schedule_id: Option<Uuid>,
    /// Schedule name used in the conversation script
    pub label: String,
}

impl CallRequest {
    pub fn for_schedule(schedule: &Schedule) -> Self {
        Self {
            user_id: schedule.user_id,
            schedule_id: Some(schedule.id),
            label: schedule.name.clone(),
        }
    }

    pub fn ad_hoc(user_id: Uuid) -> Self {
        Self {
            user_id,
            schedule_id: None,
            label: AD_HOC_LABEL.to_string(),
        }
    }
}

#[async_trait]
pub trait CallInitiator: Send + Sync {
    /// Short name for logs and health output.
    fn kind(&self) -> &'static str;

    async fn initiate(&self, request: &CallRequest) -> Result<CallRecord, InitiateError>;
}

pub(crate) struct PreparedCall {
    pub record: CallRecord,
    pub profile: ContactProfile,
    pub contact_address: String,
    pub tasks: Vec<Task>,
}

/// Resolve contact and tasks, then create the record in `scheduled`.
pub(crate) async fn prepare(
    store: &dyn CallStore,
    request: &CallRequest,
    now: DateTime<Utc>,
) -> Result<PreparedCall, InitiateError> {
    let profile = store.contact_profile(request.user_id).await?;
    let Some((profile, contact_address)) = profile.and_then(|p| {
        let address = p
            .contact_address
            .as_deref()
            .map(str::trim)
            .filter(|a| !a.is_empty())?
            .to_string();
        Some((p, address))
    }) else {
        tracing::warn!(
            user_id = %request.user_id,
            schedule_id = ?request.schedule_id,
            "No contact address on file; call not placed"
        );
        return Err(InitiateError::MissingContact {
            user_id: request.user_id,
        });
    };

    let tasks = store.active_tasks(request.user_id).await?;
    let record = store
        .create_call(NewCallRecord {
            user_id: request.user_id,
            schedule_id: request.schedule_id,
            scheduled_at: now,
        })
        .await?;

    Ok(PreparedCall {
        record,
        profile,
        contact_address,
        tasks,
    })
}

/// Latest persisted view of a record, falling back to `record` if it vanished.
pub(crate) async fn refreshed(
    store: &dyn CallStore,
    record: CallRecord,
) -> Result<CallRecord, StoreError> {
    Ok(store.get_call(record.id).await?.unwrap_or(record))
}
