use axum::body::Bytes;
use axum::extract::State;
use axum::http::HeaderMap;
use axum::{Json, Router, routing::post};
use serde::Serialize;
use utoipa::ToSchema;
use uuid::Uuid;

use checkin_core::webhook::ProviderWebhook;

use crate::error::AppError;
use crate::reconciler::{IngestOutcome, ResolutionTier};
use crate::signature::{self, SIGNATURE_HEADER};
use crate::state::AppState;

pub fn router() -> Router<AppState> {
    Router::new().route("/v1/webhooks/voice", post(receive_voice_webhook))
}

/// Acknowledgement returned to the provider. `call_id` is absent when no call matched.
#[derive(Debug, Serialize, ToSchema)]
pub struct WebhookAck {
    pub received: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub call_id: Option<Uuid>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub tier: Option<ResolutionTier>,
    pub inserted: usize,
    pub duplicates: usize,
    pub failed_inserts: usize,
}

impl From<IngestOutcome> for WebhookAck {
    fn from(outcome: IngestOutcome) -> Self {
        Self {
            received: true,
            call_id: outcome.call_id,
            tier: outcome.tier,
            inserted: outcome.inserted,
            duplicates: outcome.duplicates,
            failed_inserts: outcome.failed_inserts,
        }
    }
}

/// Receive a voice provider notification
///
/// The raw body is signature-checked before parsing. Notifications that match
/// no call are still acknowledged with 200 so the provider does not retry.
#[utoipa::path(
    post,
    path = "/v1/webhooks/voice",
    request_body = ProviderWebhook,
    responses(
        (status = 200, description = "Notification accepted", body = WebhookAck),
        (status = 400, description = "Malformed payload or missing call id", body = checkin_core::error::ApiError),
        (status = 401, description = "Signature missing or invalid", body = checkin_core::error::ApiError),
        (status = 500, description = "Data store failure", body = checkin_core::error::ApiError)
    ),
    tag = "webhooks"
)]
pub async fn receive_voice_webhook(
    State(state): State<AppState>,
    headers: HeaderMap,
    body: Bytes,
) -> Result<Json<WebhookAck>, AppError> {
    let provided = headers.get(SIGNATURE_HEADER).and_then(|v| v.to_str().ok());
    signature::check(
        state.config.webhook_secret.as_deref(),
        state.config.webhook_require_signature,
        provided,
        &body,
    )
    .map_err(|e| {
        tracing::warn!(error = %e, "Webhook signature rejected");
        AppError::Unauthorized {
            message: e.to_string(),
            docs_hint: Some(format!(
                "Send the hex HMAC-SHA256 of the raw body in the '{SIGNATURE_HEADER}' header."
            )),
        }
    })?;

    let payload: ProviderWebhook =
        serde_json::from_slice(&body).map_err(|e| AppError::Validation {
            message: format!("Invalid webhook body: {e}"),
            field: Some("body".to_string()),
            received: None,
            docs_hint: Some(
                "Expected a JSON object with provider_call_id (or call_id).".to_string(),
            ),
        })?;
    let event = payload.into_event().map_err(|e| AppError::Validation {
        message: e.to_string(),
        field: Some("provider_call_id".to_string()),
        received: None,
        docs_hint: None,
    })?;

    let outcome = state.reconciler.ingest(event).await?;
    Ok(Json(WebhookAck::from(outcome)))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::routes::test_support::{config, send, test_app};
    use crate::store::memory::blank_call;
    use axum::body::Body;
    use axum::http::{Request, StatusCode};
    use checkin_core::calls::CallStatus;
    use chrono::Utc;
    use serde_json::json;

    fn webhook(body: &serde_json::Value, signature: Option<&str>) -> Request<Body> {
        let mut builder = Request::builder()
            .method("POST")
            .uri("/v1/webhooks/voice")
            .header("content-type", "application/json");
        if let Some(signature) = signature {
            builder = builder.header(SIGNATURE_HEADER, signature);
        }
        builder.body(Body::from(body.to_string())).unwrap()
    }

    fn seed_call(app: &crate::routes::test_support::TestApp, provider_call_id: &str) -> Uuid {
        let mut call = blank_call(Uuid::now_v7(), None, Utc::now());
        call.status = CallStatus::Initiated;
        call.started_at = Some(Utc::now());
        call.provider_call_id = Some(provider_call_id.to_string());
        let id = call.id;
        app.store.insert_call(call);
        id
    }

    #[tokio::test]
    async fn duplicate_delivery_persists_one_event() {
        let app = test_app(config());
        let call_id = seed_call(&app, "X");
        let body = json!({
            "provider_call_id": "X",
            "status": "in-progress",
            "events": [{"id": "e1", "speaker": "user", "text": "I drank 9 glasses"}]
        });

        let (status, first) = send(router(), &app.state, webhook(&body, None)).await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(first["call_id"], call_id.to_string());
        assert_eq!(first["tier"], "provider_call_id");
        assert_eq!(first["inserted"], 1);

        let (_, second) = send(router(), &app.state, webhook(&body, None)).await;
        assert_eq!(second["inserted"], 0);
        assert_eq!(second["duplicates"], 1);
        assert_eq!(app.store.events().len(), 1);
    }

    #[tokio::test]
    async fn unmatched_notification_is_acknowledged() {
        let app = test_app(config());
        let (status, body) = send(
            router(),
            &app.state,
            webhook(&json!({"call_id": "nobody", "status": "completed", "transcript": "hi"}), None),
        )
        .await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body["received"], true);
        assert!(body.get("call_id").is_none());
        assert_eq!(body["inserted"], 0);
        assert!(app.store.events().is_empty());
        assert!(app.store.calls().is_empty());
    }

    #[tokio::test]
    async fn missing_call_id_is_a_client_error() {
        let app = test_app(config());
        let (status, body) = send(
            router(),
            &app.state,
            webhook(&json!({"status": "completed"}), None),
        )
        .await;
        assert_eq!(status, StatusCode::BAD_REQUEST);
        assert_eq!(body["error"], "validation_failed");
        assert_eq!(body["field"], "provider_call_id");

        let request = Request::builder()
            .method("POST")
            .uri("/v1/webhooks/voice")
            .body(Body::from("not json"))
            .unwrap();
        let (status, _) = send(router(), &app.state, request).await;
        assert_eq!(status, StatusCode::BAD_REQUEST);
    }

    #[tokio::test]
    async fn signature_is_enforced_when_secret_is_configured() {
        let mut cfg = config();
        cfg.webhook_secret = Some("s3cret".into());
        cfg.webhook_require_signature = true;
        let app = test_app(cfg);
        seed_call(&app, "X");
        let body = json!({"call_id": "X", "status": "ringing"});

        let (status, _) = send(router(), &app.state, webhook(&body, None)).await;
        assert_eq!(status, StatusCode::UNAUTHORIZED);

        let (status, body_json) =
            send(router(), &app.state, webhook(&body, Some("sha256=00ff"))).await;
        assert_eq!(status, StatusCode::UNAUTHORIZED);
        assert_eq!(body_json["error"], "unauthorized");

        let good = signature::sign("s3cret", body.to_string().as_bytes());
        let (status, _) = send(router(), &app.state, webhook(&body, Some(&good))).await;
        assert_eq!(status, StatusCode::OK);
    }

    #[tokio::test]
    async fn completion_queues_analysis() {
        let mut app = test_app(config());
        let call_id = seed_call(&app, "X");
        let body = json!({
            "call_id": "X",
            "status": "completed",
            "events": [{"id": "1", "text": "bye"}]
        });
        let (status, _) = send(router(), &app.state, webhook(&body, None)).await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(app.jobs.try_recv().unwrap().call_id, call_id);
        assert_eq!(app.store.call(call_id).unwrap().status, CallStatus::Completed);
    }
}
