//! In-memory [`CallStore`] for tests. Mirrors the Postgres predicates.

use std::collections::HashMap;
use std::sync::Mutex;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use uuid::Uuid;

use checkin_core::calls::{
    CallCompletion, CallEvent, CallRecord, CallStatus, ContactProfile, NewCallEvent,
    NewCallRecord, Task, TaskResponse,
};
use checkin_core::schedule::Schedule;

use super::{CallStore, StoreError};

#[derive(Default)]
struct Inner {
    profiles: HashMap<Uuid, ContactProfile>,
    tasks: Vec<Task>,
    schedules: Vec<Schedule>,
    calls: Vec<CallRecord>,
    events: Vec<CallEvent>,
    responses: Vec<TaskResponse>,
    fail_events_containing: Option<String>,
    fail_task_lookups: bool,
}

#[derive(Default)]
pub struct MemoryStore {
    inner: Mutex<Inner>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    fn lock(&self) -> std::sync::MutexGuard<'_, Inner> {
        self.inner.lock().unwrap_or_else(|poison| poison.into_inner())
    }

    pub fn add_profile(&self, user_id: Uuid, full_name: Option<&str>, contact: Option<&str>) {
        self.lock().profiles.insert(
            user_id,
            ContactProfile {
                user_id,
                full_name: full_name.map(str::to_string),
                contact_address: contact.map(str::to_string),
            },
        );
    }

    pub fn add_task(&self, user_id: Uuid, title: &str, target: Option<f64>, unit: Option<&str>) -> Task {
        let task = Task {
            id: Uuid::now_v7(),
            user_id,
            title: title.to_string(),
            target_value: target,
            unit: unit.map(str::to_string),
        };
        self.lock().tasks.push(task.clone());
        task
    }

    pub fn add_schedule(&self, schedule: Schedule) {
        self.lock().schedules.push(schedule);
    }

    /// Insert a fully specified record (for back-dated or pre-resolved calls).
    pub fn insert_call(&self, record: CallRecord) {
        self.lock().calls.push(record);
    }

    pub fn calls(&self) -> Vec<CallRecord> {
        self.lock().calls.clone()
    }

    pub fn call(&self, call_id: Uuid) -> Option<CallRecord> {
        self.lock().calls.iter().find(|c| c.id == call_id).cloned()
    }

    pub fn events(&self) -> Vec<CallEvent> {
        self.lock().events.clone()
    }

    pub fn responses(&self) -> Vec<TaskResponse> {
        self.lock().responses.clone()
    }

    /// Make every event insert whose text contains `needle` fail.
    pub fn fail_event_inserts_containing(&self, needle: &str) {
        self.lock().fail_events_containing = Some(needle.to_string());
    }

    /// Make `active_tasks` fail until switched back off.
    pub fn fail_task_lookups(&self, fail: bool) {
        self.lock().fail_task_lookups = fail;
    }

    fn update_call<F>(&self, call_id: Uuid, allowed: impl Fn(CallStatus) -> bool, apply: F) -> bool
    where
        F: FnOnce(&mut CallRecord),
    {
        let mut inner = self.lock();
        match inner.calls.iter_mut().find(|c| c.id == call_id) {
            Some(call) if allowed(call.status) => {
                apply(call);
                true
            }
            _ => false,
        }
    }
}

pub fn blank_call(user_id: Uuid, schedule_id: Option<Uuid>, scheduled_at: DateTime<Utc>) -> CallRecord {
    CallRecord {
        id: Uuid::now_v7(),
        user_id,
        schedule_id,
        status: CallStatus::Scheduled,
        scheduled_at,
        started_at: None,
        ended_at: None,
        duration_seconds: None,
        transcript: None,
        provider_call_id: None,
        recording_reference: None,
        error_detail: None,
        analyzed_at: None,
    }
}

#[async_trait]
impl CallStore for MemoryStore {
    async fn ping(&self) -> Result<(), StoreError> {
        Ok(())
    }

    async fn list_active_schedules(&self) -> Result<Vec<Schedule>, StoreError> {
        Ok(self.lock().schedules.iter().filter(|s| s.active).cloned().collect())
    }

    async fn get_schedule(&self, schedule_id: Uuid) -> Result<Option<Schedule>, StoreError> {
        Ok(self.lock().schedules.iter().find(|s| s.id == schedule_id).cloned())
    }

    async fn contact_profile(&self, user_id: Uuid) -> Result<Option<ContactProfile>, StoreError> {
        Ok(self.lock().profiles.get(&user_id).cloned())
    }

    async fn active_tasks(&self, user_id: Uuid) -> Result<Vec<Task>, StoreError> {
        if self.lock().fail_task_lookups {
            return Err(StoreError::Database(sqlx::Error::Protocol(
                "injected task lookup failure".to_string(),
            )));
        }
        Ok(self.lock().tasks.iter().filter(|t| t.user_id == user_id).cloned().collect())
    }

    async fn find_user_by_contact(
        &self,
        contact_address: &str,
    ) -> Result<Option<Uuid>, StoreError> {
        Ok(self
            .lock()
            .profiles
            .values()
            .find(|p| p.contact_address.as_deref() == Some(contact_address))
            .map(|p| p.user_id))
    }

    async fn create_call(&self, new: NewCallRecord) -> Result<CallRecord, StoreError> {
        let record = blank_call(new.user_id, new.schedule_id, new.scheduled_at);
        self.lock().calls.push(record.clone());
        Ok(record)
    }

    async fn get_call(&self, call_id: Uuid) -> Result<Option<CallRecord>, StoreError> {
        Ok(self.call(call_id))
    }

    async fn schedule_attempted_since(
        &self,
        schedule_id: Uuid,
        since: DateTime<Utc>,
    ) -> Result<bool, StoreError> {
        Ok(self
            .lock()
            .calls
            .iter()
            .any(|c| c.schedule_id == Some(schedule_id) && c.attempted_at() >= since))
    }

    async fn find_call_by_provider_id(
        &self,
        provider_call_id: &str,
    ) -> Result<Option<CallRecord>, StoreError> {
        Ok(self
            .lock()
            .calls
            .iter()
            .find(|c| c.provider_call_id.as_deref() == Some(provider_call_id))
            .cloned())
    }

    async fn latest_call_for_user_since(
        &self,
        user_id: Uuid,
        since: DateTime<Utc>,
    ) -> Result<Option<CallRecord>, StoreError> {
        Ok(self
            .lock()
            .calls
            .iter()
            .filter(|c| c.user_id == user_id && c.started_at.is_some_and(|t| t >= since))
            .max_by_key(|c| c.started_at)
            .cloned())
    }

    async fn latest_open_call_since(
        &self,
        since: DateTime<Utc>,
    ) -> Result<Option<CallRecord>, StoreError> {
        Ok(self
            .lock()
            .calls
            .iter()
            .filter(|c| !c.status.is_terminal() && c.started_at.is_some_and(|t| t >= since))
            .max_by_key(|c| c.started_at)
            .cloned())
    }

    async fn mark_initiated(
        &self,
        call_id: Uuid,
        provider_call_id: Option<&str>,
        at: DateTime<Utc>,
    ) -> Result<bool, StoreError> {
        Ok(self.update_call(
            call_id,
            |s| s == CallStatus::Scheduled,
            |c| {
                c.status = CallStatus::Initiated;
                if let Some(pid) = provider_call_id {
                    c.provider_call_id = Some(pid.to_string());
                }
                c.started_at.get_or_insert(at);
            },
        ))
    }

    async fn mark_in_progress(&self, call_id: Uuid, at: DateTime<Utc>) -> Result<bool, StoreError> {
        Ok(self.update_call(
            call_id,
            |s| matches!(s, CallStatus::Scheduled | CallStatus::Initiated),
            |c| {
                c.status = CallStatus::InProgress;
                c.started_at.get_or_insert(at);
            },
        ))
    }

    async fn mark_failed(
        &self,
        call_id: Uuid,
        error_detail: &str,
        at: DateTime<Utc>,
    ) -> Result<bool, StoreError> {
        Ok(self.update_call(
            call_id,
            |s| !s.is_terminal(),
            |c| {
                c.status = CallStatus::Failed;
                c.error_detail = Some(error_detail.to_string());
                c.ended_at.get_or_insert(at);
            },
        ))
    }

    async fn complete_call(
        &self,
        call_id: Uuid,
        completion: &CallCompletion,
    ) -> Result<bool, StoreError> {
        Ok(self.update_call(
            call_id,
            |s| s.accepts_completion(),
            |c| {
                c.status = CallStatus::Completed;
                c.transcript = Some(completion.transcript.clone());
                c.ended_at = Some(completion.ended_at);
                c.duration_seconds = Some(completion.duration_seconds);
                if let Some(reference) = &completion.recording_reference {
                    c.recording_reference = Some(reference.clone());
                }
            },
        ))
    }

    async fn append_transcript(&self, call_id: Uuid, line: &str) -> Result<(), StoreError> {
        self.update_call(
            call_id,
            |_| true,
            |c| {
                c.transcript = Some(match c.transcript.take().filter(|t| !t.is_empty()) {
                    Some(existing) => format!("{existing}\n{line}"),
                    None => line.to_string(),
                });
            },
        );
        Ok(())
    }

    async fn insert_call_event(&self, event: &NewCallEvent) -> Result<bool, StoreError> {
        let mut inner = self.lock();
        if let Some(needle) = &inner.fail_events_containing {
            if event.text.contains(needle.as_str()) {
                return Err(StoreError::Database(sqlx::Error::Protocol(
                    "injected insert failure".to_string(),
                )));
            }
        }
        if let Some(provider_event_id) = &event.provider_event_id {
            let duplicate = inner.events.iter().any(|e| {
                e.call_id == event.call_id
                    && e.provider_event_id.as_deref() == Some(provider_event_id.as_str())
            });
            if duplicate {
                return Ok(false);
            }
        }
        inner.events.push(CallEvent {
            id: Uuid::now_v7(),
            call_id: event.call_id,
            speaker: event.speaker.clone(),
            text: event.text.clone(),
            provider_event_id: event.provider_event_id.clone(),
            created_at: Utc::now(),
        });
        Ok(true)
    }

    async fn list_call_events(&self, call_id: Uuid) -> Result<Vec<CallEvent>, StoreError> {
        Ok(self
            .lock()
            .events
            .iter()
            .filter(|e| e.call_id == call_id)
            .cloned()
            .collect())
    }

    async fn claim_analysis(&self, call_id: Uuid, at: DateTime<Utc>) -> Result<bool, StoreError> {
        let mut inner = self.lock();
        match inner.calls.iter_mut().find(|c| c.id == call_id) {
            Some(call) if call.analyzed_at.is_none() => {
                call.analyzed_at = Some(at);
                Ok(true)
            }
            _ => Ok(false),
        }
    }

    async fn release_analysis(&self, call_id: Uuid) -> Result<(), StoreError> {
        if let Some(call) = self.lock().calls.iter_mut().find(|c| c.id == call_id) {
            call.analyzed_at = None;
        }
        Ok(())
    }

    async fn upsert_task_response(&self, response: &TaskResponse) -> Result<(), StoreError> {
        let mut inner = self.lock();
        inner
            .responses
            .retain(|r| !(r.call_id == response.call_id && r.task_id == response.task_id));
        inner.responses.push(response.clone());
        Ok(())
    }
}
