use axum::extract::{Path, State};
use axum::http::StatusCode;
use axum::response::IntoResponse;
use axum::routing::{get, post};
use axum::{Json, Router};
use serde::{Deserialize, Serialize};
use utoipa::ToSchema;
use uuid::Uuid;

use checkin_core::calls::{CallEvent, CallRecord};

use crate::analysis::AnalysisReport;
use crate::auth::Operator;
use crate::error::AppError;
use crate::extract::AppJson;
use crate::initiator::CallRequest;
use crate::state::AppState;

/// `POST /v1/calls` places real calls, so it is mounted separately behind a rate limit.
pub fn start_router() -> Router<AppState> {
    Router::new().route("/v1/calls", post(start_call))
}

pub fn router() -> Router<AppState> {
    Router::new()
        .route("/v1/calls/{call_id}", get(get_call))
        .route("/v1/calls/{call_id}/analyze", post(analyze_call))
}

/// Exactly one of `schedule_id` or `user_id`.
#[derive(Debug, Deserialize, ToSchema)]
pub struct StartCallRequest {
    #[serde(default)]
    pub schedule_id: Option<Uuid>,
    /// Ad-hoc call outside any schedule
    #[serde(default)]
    pub user_id: Option<Uuid>,
}

#[derive(Debug, Serialize, ToSchema)]
pub struct CallDetail {
    pub call: CallRecord,
    /// Events in creation order
    pub events: Vec<CallEvent>,
}

/// Place a call now
#[utoipa::path(
    post,
    path = "/v1/calls",
    request_body = StartCallRequest,
    responses(
        (status = 201, description = "Call placed", body = CallRecord),
        (status = 400, description = "Invalid request or no contact address", body = checkin_core::error::ApiError),
        (status = 401, description = "Missing or invalid operator token", body = checkin_core::error::ApiError),
        (status = 403, description = "Operator endpoints disabled", body = checkin_core::error::ApiError),
        (status = 404, description = "Unknown schedule or user", body = checkin_core::error::ApiError),
        (status = 502, description = "Provider rejected the call", body = checkin_core::error::ApiError)
    ),
    security(("bearer_auth" = [])),
    tag = "calls"
)]
pub async fn start_call(
    _operator: Operator,
    State(state): State<AppState>,
    AppJson(req): AppJson<StartCallRequest>,
) -> Result<impl IntoResponse, AppError> {
    let request = match (req.schedule_id, req.user_id) {
        (Some(schedule_id), None) => {
            let schedule = state
                .store
                .get_schedule(schedule_id)
                .await?
                .ok_or_else(|| AppError::NotFound {
                    resource: "schedule",
                    id: schedule_id.to_string(),
                })?;
            CallRequest::for_schedule(&schedule)
        }
        (None, Some(user_id)) => {
            if state.store.contact_profile(user_id).await?.is_none() {
                return Err(AppError::NotFound {
                    resource: "user",
                    id: user_id.to_string(),
                });
            }
            CallRequest::ad_hoc(user_id)
        }
        _ => {
            return Err(AppError::Validation {
                message: "Provide exactly one of schedule_id or user_id".to_string(),
                field: Some("schedule_id".to_string()),
                received: None,
                docs_hint: Some(
                    "Use {\"schedule_id\": ...} to run a schedule now, or {\"user_id\": ...} for an ad-hoc call."
                        .to_string(),
                ),
            });
        }
    };

    let record = state.initiator.initiate(&request).await?;
    tracing::info!(
        call_id = %record.id,
        user_id = %record.user_id,
        initiator = state.initiator.kind(),
        "Operator placed call"
    );
    Ok((StatusCode::CREATED, Json(record)))
}

/// Call record with its live event log
#[utoipa::path(
    get,
    path = "/v1/calls/{call_id}",
    params(("call_id" = Uuid, Path, description = "Call record id")),
    responses(
        (status = 200, description = "Call and events", body = CallDetail),
        (status = 401, description = "Missing or invalid operator token", body = checkin_core::error::ApiError),
        (status = 404, description = "Unknown call", body = checkin_core::error::ApiError)
    ),
    security(("bearer_auth" = [])),
    tag = "calls"
)]
pub async fn get_call(
    _operator: Operator,
    State(state): State<AppState>,
    Path(call_id): Path<Uuid>,
) -> Result<Json<CallDetail>, AppError> {
    let call = state
        .store
        .get_call(call_id)
        .await?
        .ok_or_else(|| AppError::NotFound {
            resource: "call",
            id: call_id.to_string(),
        })?;
    let events = state.store.list_call_events(call_id).await?;
    Ok(Json(CallDetail { call, events }))
}

/// Re-run transcript analysis for a call
///
/// Replaces earlier task responses for the call and returns follow-up
/// recommendations for tasks not completed or not mentioned.
#[utoipa::path(
    post,
    path = "/v1/calls/{call_id}/analyze",
    params(("call_id" = Uuid, Path, description = "Call record id")),
    responses(
        (status = 200, description = "Outcomes and recommendations", body = AnalysisReport),
        (status = 401, description = "Missing or invalid operator token", body = checkin_core::error::ApiError),
        (status = 404, description = "Unknown call", body = checkin_core::error::ApiError)
    ),
    security(("bearer_auth" = [])),
    tag = "calls"
)]
pub async fn analyze_call(
    _operator: Operator,
    State(state): State<AppState>,
    Path(call_id): Path<Uuid>,
) -> Result<Json<AnalysisReport>, AppError> {
    let report = state
        .analyzer
        .analyze_call(call_id)
        .await?
        .ok_or_else(|| AppError::NotFound {
            resource: "call",
            id: call_id.to_string(),
        })?;
    Ok(Json(report))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::routes::test_support::{config, json_request, send, test_app};
    use crate::store::memory::blank_call;
    use axum::body::Body;
    use axum::http::Request;
    use checkin_core::calls::{CallStatus, NewCallEvent};
    use checkin_core::schedule::{DaySet, Schedule, TimeOfDay};
    use crate::store::CallStore;
    use chrono::Utc;
    use serde_json::json;

    fn all_routes() -> Router<AppState> {
        start_router().merge(router())
    }

    fn get(uri: &str, token: Option<&str>) -> Request<Body> {
        let mut builder = Request::builder().uri(uri);
        if let Some(token) = token {
            builder = builder.header("authorization", format!("Bearer {token}"));
        }
        builder.body(Body::empty()).unwrap()
    }

    #[tokio::test]
    async fn operator_token_is_required() {
        let app = test_app(config());
        let uri = format!("/v1/calls/{}", Uuid::now_v7());
        let (status, body) = send(all_routes(), &app.state, get(&uri, None)).await;
        assert_eq!(status, StatusCode::UNAUTHORIZED);
        assert_eq!(body["error"], "unauthorized");

        let (status, _) = send(all_routes(), &app.state, get(&uri, Some("wrong"))).await;
        assert_eq!(status, StatusCode::UNAUTHORIZED);

        let mut disabled = config();
        disabled.operator_token = None;
        let app = test_app(disabled);
        let (status, body) = send(all_routes(), &app.state, get(&uri, Some("op-token"))).await;
        assert_eq!(status, StatusCode::FORBIDDEN);
        assert_eq!(body["error"], "forbidden");
    }

    #[tokio::test]
    async fn ad_hoc_call_is_created() {
        let app = test_app(config());
        let user_id = Uuid::now_v7();
        app.store.add_profile(user_id, Some("Ada"), Some("+15550001"));

        let (status, body) = send(
            all_routes(),
            &app.state,
            json_request("POST", "/v1/calls", json!({"user_id": user_id})),
        )
        .await;
        assert_eq!(status, StatusCode::CREATED);
        assert_eq!(body["status"], "in_progress");
        assert_eq!(body["user_id"], user_id.to_string());
        assert!(body["schedule_id"].is_null());
    }

    #[tokio::test]
    async fn schedule_call_resolves_schedule_and_contact() {
        let app = test_app(config());
        let user_id = Uuid::now_v7();
        app.store.add_profile(user_id, None, None);
        let schedule = Schedule {
            id: Uuid::now_v7(),
            user_id,
            name: "Evening".into(),
            days: DaySet::from_indices([0i64, 6]).unwrap(),
            time_of_day: TimeOfDay::new(20, 0).unwrap(),
            timezone: chrono_tz::Europe::Berlin,
            active: true,
        };
        let schedule_id = schedule.id;
        app.store.add_schedule(schedule);

        let (status, body) = send(
            all_routes(),
            &app.state,
            json_request("POST", "/v1/calls", json!({"schedule_id": schedule_id})),
        )
        .await;
        assert_eq!(status, StatusCode::BAD_REQUEST);
        assert_eq!(body["field"], "contact_address");
        assert!(app.store.calls().is_empty());

        let (status, _) = send(
            all_routes(),
            &app.state,
            json_request("POST", "/v1/calls", json!({"schedule_id": Uuid::now_v7()})),
        )
        .await;
        assert_eq!(status, StatusCode::NOT_FOUND);

        let (status, _) = send(
            all_routes(),
            &app.state,
            json_request("POST", "/v1/calls", json!({})),
        )
        .await;
        assert_eq!(status, StatusCode::BAD_REQUEST);
    }

    #[tokio::test]
    async fn call_detail_lists_events_in_order() {
        let app = test_app(config());
        let call = blank_call(Uuid::now_v7(), None, Utc::now());
        let call_id = call.id;
        app.store.insert_call(call);
        for text in ["one", "two"] {
            app.store
                .insert_call_event(&NewCallEvent {
                    call_id,
                    speaker: None,
                    text: text.into(),
                    provider_event_id: None,
                })
                .await
                .unwrap();
        }

        let (status, body) = send(
            all_routes(),
            &app.state,
            get(&format!("/v1/calls/{call_id}"), Some("op-token")),
        )
        .await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body["call"]["id"], call_id.to_string());
        assert_eq!(body["events"][0]["text"], "one");
        assert_eq!(body["events"][1]["text"], "two");
    }

    #[tokio::test]
    async fn analyze_returns_outcomes_and_recommendations() {
        let app = test_app(config());
        let user_id = Uuid::now_v7();
        app.store.add_task(user_id, "Drink water", Some(8.0), Some("glasses"));
        app.store.add_task(user_id, "Stretch", None, None);
        let mut call = blank_call(user_id, None, Utc::now());
        call.status = CallStatus::Completed;
        call.transcript = Some("Drink water: target 8, I drank 9 glasses, done!".into());
        let call_id = call.id;
        app.store.insert_call(call);

        let (status, body) = send(
            all_routes(),
            &app.state,
            json_request("POST", &format!("/v1/calls/{call_id}/analyze"), json!({})),
        )
        .await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body["outcomes"].as_array().unwrap().len(), 1);
        assert_eq!(body["outcomes"][0]["response_value"], 9.0);
        assert_eq!(body["outcomes"][0]["completed"], true);
        assert_eq!(body["recommendations"][0]["title"], "Stretch");
        assert_eq!(app.store.responses().len(), 1);

        let (status, _) = send(
            all_routes(),
            &app.state,
            json_request("POST", &format!("/v1/calls/{}/analyze", Uuid::now_v7()), json!({})),
        )
        .await;
        assert_eq!(status, StatusCode::NOT_FOUND);
    }
}
