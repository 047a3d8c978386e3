use axum::Json;
use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use checkin_core::error::{self, ApiError};

use crate::initiator::InitiateError;
use crate::store::StoreError;

/// Internal error type that converts to structured API responses
#[derive(Debug)]
pub enum AppError {
    /// Validation error (400)
    Validation {
        message: String,
        field: Option<String>,
        received: Option<serde_json::Value>,
        docs_hint: Option<String>,
    },
    /// Missing or wrong credentials (401)
    Unauthorized {
        message: String,
        docs_hint: Option<String>,
    },
    /// Feature switched off for this deployment (403)
    Forbidden { message: String },
    /// Unknown resource (404)
    NotFound { resource: &'static str, id: String },
    /// Voice provider refused or could not be reached (502)
    Provider {
        message: String,
        received: Option<serde_json::Value>,
    },
    /// Data store error (500)
    Store(StoreError),
}

impl IntoResponse for AppError {
    fn into_response(self) -> Response {
        let request_id = uuid::Uuid::now_v7().to_string();

        let (status, api_error) = match self {
            AppError::Validation {
                message,
                field,
                received,
                docs_hint,
            } => (
                StatusCode::BAD_REQUEST,
                ApiError {
                    error: error::codes::VALIDATION_FAILED.to_string(),
                    message,
                    field,
                    received,
                    request_id,
                    docs_hint,
                },
            ),
            AppError::Unauthorized { message, docs_hint } => (
                StatusCode::UNAUTHORIZED,
                ApiError {
                    error: error::codes::UNAUTHORIZED.to_string(),
                    message,
                    field: None,
                    received: None,
                    request_id,
                    docs_hint,
                },
            ),
            AppError::Forbidden { message } => (
                StatusCode::FORBIDDEN,
                ApiError {
                    error: error::codes::FORBIDDEN.to_string(),
                    message,
                    field: None,
                    received: None,
                    request_id,
                    docs_hint: None,
                },
            ),
            AppError::NotFound { resource, id } => (
                StatusCode::NOT_FOUND,
                ApiError {
                    error: error::codes::NOT_FOUND.to_string(),
                    message: format!("{resource} '{id}' not found"),
                    field: None,
                    received: Some(serde_json::Value::String(id)),
                    request_id,
                    docs_hint: None,
                },
            ),
            AppError::Provider { message, received } => {
                tracing::warn!("Provider error: {}", message);
                (
                    StatusCode::BAD_GATEWAY,
                    ApiError {
                        error: error::codes::PROVIDER_ERROR.to_string(),
                        message,
                        field: None,
                        received,
                        request_id,
                        docs_hint: Some(
                            "The call record was marked failed with the provider's response. \
                             Retry once the provider issue is resolved."
                                .to_string(),
                        ),
                    },
                )
            }
            AppError::Store(err) => {
                tracing::error!("Store error: {:?}", err);
                (
                    StatusCode::INTERNAL_SERVER_ERROR,
                    ApiError {
                        error: error::codes::INTERNAL_ERROR.to_string(),
                        message: "An internal error occurred".to_string(),
                        field: None,
                        received: None,
                        request_id,
                        docs_hint: None,
                    },
                )
            }
        };

        (status, Json(api_error)).into_response()
    }
}

impl From<StoreError> for AppError {
    fn from(err: StoreError) -> Self {
        AppError::Store(err)
    }
}

impl From<InitiateError> for AppError {
    fn from(err: InitiateError) -> Self {
        match err {
            InitiateError::MissingContact { user_id } => AppError::Validation {
                message: format!("User {user_id} has no contact address on file"),
                field: Some("contact_address".to_string()),
                received: Some(serde_json::Value::String(user_id.to_string())),
                docs_hint: Some("Add a phone number to the user's profile, then retry.".to_string()),
            },
            InitiateError::Provider { call_id, detail } => AppError::Provider {
                message: format!("Voice provider rejected the call: {detail}"),
                received: Some(serde_json::Value::String(call_id.to_string())),
            },
            InitiateError::Store(err) => AppError::Store(err),
        }
    }
}
