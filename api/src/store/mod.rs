//! Data-store seam. Everything the engine reads or writes goes through [`CallStore`].

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use uuid::Uuid;

use checkin_core::calls::{
    CallCompletion, CallEvent, CallRecord, ContactProfile, NewCallEvent, NewCallRecord, Task,
    TaskResponse,
};
use checkin_core::schedule::Schedule;

#[cfg(test)]
pub mod memory;
pub mod postgres;

pub use postgres::PgCallStore;

#[derive(Debug, thiserror::Error)]
pub enum StoreError {
    #[error("database error: {0}")]
    Database(#[from] sqlx::Error),
    #[error("corrupt row in {table}: {detail}")]
    Corrupt { table: &'static str, detail: String },
}

#[async_trait]
pub trait CallStore: Send + Sync {
    async fn ping(&self) -> Result<(), StoreError>;

    // --- External collaborators (read-only) ---

    async fn list_active_schedules(&self) -> Result<Vec<Schedule>, StoreError>;
    async fn get_schedule(&self, schedule_id: Uuid) -> Result<Option<Schedule>, StoreError>;
    async fn contact_profile(&self, user_id: Uuid) -> Result<Option<ContactProfile>, StoreError>;
    async fn active_tasks(&self, user_id: Uuid) -> Result<Vec<Task>, StoreError>;
    async fn find_user_by_contact(&self, contact_address: &str)
    -> Result<Option<Uuid>, StoreError>;

    // --- Call records ---

    async fn create_call(&self, new: NewCallRecord) -> Result<CallRecord, StoreError>;
    async fn get_call(&self, call_id: Uuid) -> Result<Option<CallRecord>, StoreError>;

    /// Any attempt for the schedule (whatever its status) at or after `since`.
    async fn schedule_attempted_since(
        &self,
        schedule_id: Uuid,
        since: DateTime<Utc>,
    ) -> Result<bool, StoreError>;

    async fn find_call_by_provider_id(
        &self,
        provider_call_id: &str,
    ) -> Result<Option<CallRecord>, StoreError>;

    /// Most recently started call for the user with `started_at` at or after `since`, any status.
    async fn latest_call_for_user_since(
        &self,
        user_id: Uuid,
        since: DateTime<Utc>,
    ) -> Result<Option<CallRecord>, StoreError>;

    /// Most recently started non-terminal call across all users with `started_at` at or after `since`.
    async fn latest_open_call_since(
        &self,
        since: DateTime<Utc>,
    ) -> Result<Option<CallRecord>, StoreError>;

    // Status writes return `false` when the call's current status does not
    // allow the transition; the row is left untouched in that case.

    async fn mark_initiated(
        &self,
        call_id: Uuid,
        provider_call_id: Option<&str>,
        at: DateTime<Utc>,
    ) -> Result<bool, StoreError>;
    async fn mark_in_progress(&self, call_id: Uuid, at: DateTime<Utc>) -> Result<bool, StoreError>;
    async fn mark_failed(
        &self,
        call_id: Uuid,
        error_detail: &str,
        at: DateTime<Utc>,
    ) -> Result<bool, StoreError>;
    async fn complete_call(
        &self,
        call_id: Uuid,
        completion: &CallCompletion,
    ) -> Result<bool, StoreError>;

    /// Append a line to the denormalized transcript field.
    async fn append_transcript(&self, call_id: Uuid, line: &str) -> Result<(), StoreError>;

    // --- Call events ---

    /// Returns `false` when an event with the same (call, provider event id) already exists.
    async fn insert_call_event(&self, event: &NewCallEvent) -> Result<bool, StoreError>;
    /// Events for a call in creation order.
    async fn list_call_events(&self, call_id: Uuid) -> Result<Vec<CallEvent>, StoreError>;

    // --- Analysis bookkeeping ---

    /// Atomically claim the right to analyze a call. Only the first claim wins.
    async fn claim_analysis(&self, call_id: Uuid, at: DateTime<Utc>) -> Result<bool, StoreError>;
    /// Undo a claim whose analysis never ran, so the next completion can claim again.
    async fn release_analysis(&self, call_id: Uuid) -> Result<(), StoreError>;
    async fn upsert_task_response(&self, response: &TaskResponse) -> Result<(), StoreError>;
}
