use async_trait::async_trait;
use chrono::{DateTime, NaiveTime, Utc};
use sqlx::PgPool;
use uuid::Uuid;

use checkin_core::calls::{
    CallCompletion, CallEvent, CallRecord, CallStatus, ContactProfile, NewCallEvent,
    NewCallRecord, Task, TaskResponse,
};
use checkin_core::schedule::{DaySet, Schedule, ScheduleError, TimeOfDay, parse_timezone};

use super::{CallStore, StoreError};

const SELECT_CALL: &str = r#"
    SELECT id, user_id, schedule_id, status, scheduled_at, started_at, ended_at,
           duration_seconds, transcript, provider_call_id, recording_reference,
           error_detail, analyzed_at
    FROM call_records
"#;

const SELECT_SCHEDULE: &str = r#"
    SELECT id, user_id, name, days_of_week, time_of_day, timezone, is_active
    FROM call_schedules
"#;

/// PostgreSQL-backed store. Status transitions are guarded in the UPDATE
/// predicates so concurrent writers can never move a call backwards.
#[derive(Clone)]
pub struct PgCallStore {
    pool: PgPool,
}

impl PgCallStore {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }
}

#[derive(sqlx::FromRow)]
struct CallRecordRow {
    id: Uuid,
    user_id: Uuid,
    schedule_id: Option<Uuid>,
    status: String,
    scheduled_at: DateTime<Utc>,
    started_at: Option<DateTime<Utc>>,
    ended_at: Option<DateTime<Utc>>,
    duration_seconds: Option<i32>,
    transcript: Option<String>,
    provider_call_id: Option<String>,
    recording_reference: Option<String>,
    error_detail: Option<String>,
    analyzed_at: Option<DateTime<Utc>>,
}

impl TryFrom<CallRecordRow> for CallRecord {
    type Error = StoreError;

    fn try_from(row: CallRecordRow) -> Result<Self, Self::Error> {
        let status = row.status.parse::<CallStatus>().map_err(|e| StoreError::Corrupt {
            table: "call_records",
            detail: format!("{}: {e}", row.id),
        })?;
        Ok(CallRecord {
            id: row.id,
            user_id: row.user_id,
            schedule_id: row.schedule_id,
            status,
            scheduled_at: row.scheduled_at,
            started_at: row.started_at,
            ended_at: row.ended_at,
            duration_seconds: row.duration_seconds,
            transcript: row.transcript,
            provider_call_id: row.provider_call_id,
            recording_reference: row.recording_reference,
            error_detail: row.error_detail,
            analyzed_at: row.analyzed_at,
        })
    }
}

fn into_record(row: Option<CallRecordRow>) -> Result<Option<CallRecord>, StoreError> {
    row.map(CallRecord::try_from).transpose()
}

#[derive(sqlx::FromRow)]
struct ScheduleRow {
    id: Uuid,
    user_id: Uuid,
    name: String,
    days_of_week: Vec<i16>,
    time_of_day: NaiveTime,
    timezone: String,
    is_active: bool,
}

impl TryFrom<ScheduleRow> for Schedule {
    type Error = ScheduleError;

    fn try_from(row: ScheduleRow) -> Result<Self, Self::Error> {
        Ok(Schedule {
            id: row.id,
            user_id: row.user_id,
            name: row.name,
            days: DaySet::from_indices(row.days_of_week)?,
            time_of_day: TimeOfDay::from_naive(row.time_of_day),
            timezone: parse_timezone(&row.timezone)?,
            active: row.is_active,
        })
    }
}

#[derive(sqlx::FromRow)]
struct ProfileRow {
    id: Uuid,
    full_name: Option<String>,
    phone_number: Option<String>,
}

#[derive(sqlx::FromRow)]
struct TaskRow {
    id: Uuid,
    user_id: Uuid,
    title: String,
    target_value: Option<f64>,
    unit: Option<String>,
}

#[derive(sqlx::FromRow)]
struct CallEventRow {
    id: Uuid,
    call_id: Uuid,
    speaker: Option<String>,
    text: String,
    provider_event_id: Option<String>,
    created_at: DateTime<Utc>,
}

#[async_trait]
impl CallStore for PgCallStore {
    async fn ping(&self) -> Result<(), StoreError> {
        sqlx::query_scalar::<_, i32>("SELECT 1")
            .fetch_one(&self.pool)
            .await?;
        Ok(())
    }

    async fn list_active_schedules(&self) -> Result<Vec<Schedule>, StoreError> {
        let rows = sqlx::query_as::<_, ScheduleRow>(&format!(
            "{SELECT_SCHEDULE} WHERE is_active = TRUE ORDER BY id"
        ))
        .fetch_all(&self.pool)
        .await?;

        Ok(rows
            .into_iter()
            .filter_map(|row| {
                let schedule_id = row.id;
                match Schedule::try_from(row) {
                    Ok(schedule) => Some(schedule),
                    Err(err) => {
                        tracing::warn!(%schedule_id, error = %err, "skipping malformed schedule");
                        None
                    }
                }
            })
            .collect())
    }

    async fn get_schedule(&self, schedule_id: Uuid) -> Result<Option<Schedule>, StoreError> {
        let row = sqlx::query_as::<_, ScheduleRow>(&format!("{SELECT_SCHEDULE} WHERE id = $1"))
            .bind(schedule_id)
            .fetch_optional(&self.pool)
            .await?;
        row.map(|row| {
            Schedule::try_from(row).map_err(|e| StoreError::Corrupt {
                table: "call_schedules",
                detail: format!("{schedule_id}: {e}"),
            })
        })
        .transpose()
    }

    async fn contact_profile(&self, user_id: Uuid) -> Result<Option<ContactProfile>, StoreError> {
        let row = sqlx::query_as::<_, ProfileRow>(
            "SELECT id, full_name, phone_number FROM profiles WHERE id = $1",
        )
        .bind(user_id)
        .fetch_optional(&self.pool)
        .await?;
        Ok(row.map(|r| ContactProfile {
            user_id: r.id,
            full_name: r.full_name,
            contact_address: r.phone_number.filter(|p| !p.trim().is_empty()),
        }))
    }

    async fn active_tasks(&self, user_id: Uuid) -> Result<Vec<Task>, StoreError> {
        let rows = sqlx::query_as::<_, TaskRow>(
            r#"
            SELECT id, user_id, title, target_value, unit
            FROM tasks
            WHERE user_id = $1 AND is_active = TRUE
            ORDER BY created_at, id
            "#,
        )
        .bind(user_id)
        .fetch_all(&self.pool)
        .await?;
        Ok(rows
            .into_iter()
            .map(|r| Task {
                id: r.id,
                user_id: r.user_id,
                title: r.title,
                target_value: r.target_value,
                unit: r.unit,
            })
            .collect())
    }

    async fn find_user_by_contact(
        &self,
        contact_address: &str,
    ) -> Result<Option<Uuid>, StoreError> {
        Ok(
            sqlx::query_scalar::<_, Uuid>("SELECT id FROM profiles WHERE phone_number = $1 LIMIT 1")
                .bind(contact_address)
                .fetch_optional(&self.pool)
                .await?,
        )
    }

    async fn create_call(&self, new: NewCallRecord) -> Result<CallRecord, StoreError> {
        let row = sqlx::query_as::<_, CallRecordRow>(
            r#"
            INSERT INTO call_records (id, user_id, schedule_id, status, scheduled_at)
            VALUES ($1, $2, $3, 'scheduled', $4)
            RETURNING id, user_id, schedule_id, status, scheduled_at, started_at, ended_at,
                      duration_seconds, transcript, provider_call_id, recording_reference,
                      error_detail, analyzed_at
            "#,
        )
        .bind(Uuid::now_v7())
        .bind(new.user_id)
        .bind(new.schedule_id)
        .bind(new.scheduled_at)
        .fetch_one(&self.pool)
        .await?;
        CallRecord::try_from(row)
    }

    async fn get_call(&self, call_id: Uuid) -> Result<Option<CallRecord>, StoreError> {
        let row = sqlx::query_as::<_, CallRecordRow>(&format!("{SELECT_CALL} WHERE id = $1"))
            .bind(call_id)
            .fetch_optional(&self.pool)
            .await?;
        into_record(row)
    }

    async fn schedule_attempted_since(
        &self,
        schedule_id: Uuid,
        since: DateTime<Utc>,
    ) -> Result<bool, StoreError> {
        Ok(sqlx::query_scalar::<_, bool>(
            r#"
            SELECT EXISTS (
                SELECT 1 FROM call_records
                WHERE schedule_id = $1
                  AND COALESCE(started_at, scheduled_at) >= $2
            )
            "#,
        )
        .bind(schedule_id)
        .bind(since)
        .fetch_one(&self.pool)
        .await?)
    }

    async fn find_call_by_provider_id(
        &self,
        provider_call_id: &str,
    ) -> Result<Option<CallRecord>, StoreError> {
        let row = sqlx::query_as::<_, CallRecordRow>(&format!(
            "{SELECT_CALL} WHERE provider_call_id = $1 ORDER BY scheduled_at DESC LIMIT 1"
        ))
        .bind(provider_call_id)
        .fetch_optional(&self.pool)
        .await?;
        into_record(row)
    }

    async fn latest_call_for_user_since(
        &self,
        user_id: Uuid,
        since: DateTime<Utc>,
    ) -> Result<Option<CallRecord>, StoreError> {
        let row = sqlx::query_as::<_, CallRecordRow>(&format!(
            r#"{SELECT_CALL}
            WHERE user_id = $1 AND started_at IS NOT NULL AND started_at >= $2
            ORDER BY started_at DESC
            LIMIT 1"#
        ))
        .bind(user_id)
        .bind(since)
        .fetch_optional(&self.pool)
        .await?;
        into_record(row)
    }

    async fn latest_open_call_since(
        &self,
        since: DateTime<Utc>,
    ) -> Result<Option<CallRecord>, StoreError> {
        let row = sqlx::query_as::<_, CallRecordRow>(&format!(
            r#"{SELECT_CALL}
            WHERE status IN ('scheduled', 'initiated', 'in_progress')
              AND started_at IS NOT NULL AND started_at >= $1
            ORDER BY started_at DESC
            LIMIT 1"#
        ))
        .bind(since)
        .fetch_optional(&self.pool)
        .await?;
        into_record(row)
    }

    async fn mark_initiated(
        &self,
        call_id: Uuid,
        provider_call_id: Option<&str>,
        at: DateTime<Utc>,
    ) -> Result<bool, StoreError> {
        let result = sqlx::query(
            r#"
            UPDATE call_records
            SET status = 'initiated',
                provider_call_id = COALESCE($2, provider_call_id),
                started_at = COALESCE(started_at, $3)
            WHERE id = $1 AND status = 'scheduled'
            "#,
        )
        .bind(call_id)
        .bind(provider_call_id)
        .bind(at)
        .execute(&self.pool)
        .await?;
        Ok(result.rows_affected() > 0)
    }

    async fn mark_in_progress(&self, call_id: Uuid, at: DateTime<Utc>) -> Result<bool, StoreError> {
        let result = sqlx::query(
            r#"
            UPDATE call_records
            SET status = 'in_progress',
                started_at = COALESCE(started_at, $2)
            WHERE id = $1 AND status IN ('scheduled', 'initiated')
            "#,
        )
        .bind(call_id)
        .bind(at)
        .execute(&self.pool)
        .await?;
        Ok(result.rows_affected() > 0)
    }

    async fn mark_failed(
        &self,
        call_id: Uuid,
        error_detail: &str,
        at: DateTime<Utc>,
    ) -> Result<bool, StoreError> {
        let result = sqlx::query(
            r#"
            UPDATE call_records
            SET status = 'failed',
                error_detail = $2,
                ended_at = COALESCE(ended_at, $3)
            WHERE id = $1 AND status IN ('scheduled', 'initiated', 'in_progress')
            "#,
        )
        .bind(call_id)
        .bind(error_detail)
        .bind(at)
        .execute(&self.pool)
        .await?;
        Ok(result.rows_affected() > 0)
    }

    async fn complete_call(
        &self,
        call_id: Uuid,
        completion: &CallCompletion,
    ) -> Result<bool, StoreError> {
        let result = sqlx::query(
            r#"
            UPDATE call_records
            SET status = 'completed',
                transcript = $2,
                ended_at = $3,
                duration_seconds = $4,
                recording_reference = COALESCE($5, recording_reference)
            WHERE id = $1 AND status <> 'failed'
            "#,
        )
        .bind(call_id)
        .bind(&completion.transcript)
        .bind(completion.ended_at)
        .bind(completion.duration_seconds)
        .bind(completion.recording_reference.as_deref())
        .execute(&self.pool)
        .await?;
        Ok(result.rows_affected() > 0)
    }

    async fn append_transcript(&self, call_id: Uuid, line: &str) -> Result<(), StoreError> {
        sqlx::query(
            r#"
            UPDATE call_records
            SET transcript = CASE
                WHEN transcript IS NULL OR transcript = '' THEN $2
                ELSE transcript || E'\n' || $2
            END
            WHERE id = $1
            "#,
        )
        .bind(call_id)
        .bind(line)
        .execute(&self.pool)
        .await?;
        Ok(())
    }

    async fn insert_call_event(&self, event: &NewCallEvent) -> Result<bool, StoreError> {
        let inserted = sqlx::query_scalar::<_, Uuid>(
            r#"
            INSERT INTO call_events (id, call_id, speaker, text, provider_event_id)
            VALUES ($1, $2, $3, $4, $5)
            ON CONFLICT (call_id, provider_event_id) WHERE provider_event_id IS NOT NULL
            DO NOTHING
            RETURNING id
            "#,
        )
        .bind(Uuid::now_v7())
        .bind(event.call_id)
        .bind(event.speaker.as_deref())
        .bind(&event.text)
        .bind(event.provider_event_id.as_deref())
        .fetch_optional(&self.pool)
        .await?;
        Ok(inserted.is_some())
    }

    async fn list_call_events(&self, call_id: Uuid) -> Result<Vec<CallEvent>, StoreError> {
        let rows = sqlx::query_as::<_, CallEventRow>(
            r#"
            SELECT id, call_id, speaker, text, provider_event_id, created_at
            FROM call_events
            WHERE call_id = $1
            ORDER BY created_at ASC, seq ASC
            "#,
        )
        .bind(call_id)
        .fetch_all(&self.pool)
        .await?;
        Ok(rows
            .into_iter()
            .map(|r| CallEvent {
                id: r.id,
                call_id: r.call_id,
                speaker: r.speaker,
                text: r.text,
                provider_event_id: r.provider_event_id,
                created_at: r.created_at,
            })
            .collect())
    }

    async fn claim_analysis(&self, call_id: Uuid, at: DateTime<Utc>) -> Result<bool, StoreError> {
        let result = sqlx::query(
            "UPDATE call_records SET analyzed_at = $2 WHERE id = $1 AND analyzed_at IS NULL",
        )
        .bind(call_id)
        .bind(at)
        .execute(&self.pool)
        .await?;
        Ok(result.rows_affected() > 0)
    }

    async fn release_analysis(&self, call_id: Uuid) -> Result<(), StoreError> {
        sqlx::query("UPDATE call_records SET analyzed_at = NULL WHERE id = $1")
            .bind(call_id)
            .execute(&self.pool)
            .await?;
        Ok(())
    }

    async fn upsert_task_response(&self, response: &TaskResponse) -> Result<(), StoreError> {
        sqlx::query(
            r#"
            INSERT INTO task_responses
                (id, user_id, task_id, call_id, response_value, response_text, response_date, completed)
            VALUES ($1, $2, $3, $4, $5, $6, $7, $8)
            ON CONFLICT (call_id, task_id) DO UPDATE
            SET response_value = EXCLUDED.response_value,
                response_text = EXCLUDED.response_text,
                response_date = EXCLUDED.response_date,
                completed = EXCLUDED.completed
            "#,
        )
        .bind(Uuid::now_v7())
        .bind(response.user_id)
        .bind(response.task_id)
        .bind(response.call_id)
        .bind(response.response_value)
        .bind(response.response_text.as_deref())
        .bind(response.response_date)
        .bind(response.completed)
        .execute(&self.pool)
        .await?;
        Ok(())
    }
}
