use axum::extract::FromRequestParts;
use axum::http::request::Parts;
use sha2::{Digest, Sha256};

use crate::error::AppError;
use crate::state::AppState;

/// Proof that the request carried the operator bearer token.
///
/// Operator routes are switched off (403) when `CHECKIN_OPERATOR_TOKEN` is unset.
#[derive(Debug, Clone, Copy)]
pub struct Operator;

impl FromRequestParts<AppState> for Operator {
    type Rejection = AppError;

    async fn from_request_parts(parts: &mut Parts, state: &AppState) -> Result<Self, Self::Rejection> {
        let Some(expected) = state.config.operator_token.as_deref() else {
            return Err(AppError::Forbidden {
                message: "Operator endpoints are disabled".to_string(),
            });
        };

        let auth_header = parts
            .headers
            .get("authorization")
            .and_then(|v| v.to_str().ok())
            .ok_or_else(|| AppError::Unauthorized {
                message: "Missing Authorization header".to_string(),
                docs_hint: Some("Include 'Authorization: Bearer <operator token>' header.".to_string()),
            })?;

        let token = auth_header
            .strip_prefix("Bearer ")
            .ok_or_else(|| AppError::Unauthorized {
                message: "Authorization header must use Bearer scheme".to_string(),
                docs_hint: Some("Format: 'Authorization: Bearer <token>'".to_string()),
            })?;

        // Comparing fixed-length digests keeps the check independent of where the tokens differ.
        if hash_token(token) != hash_token(expected) {
            return Err(AppError::Unauthorized {
                message: "Invalid operator token".to_string(),
                docs_hint: None,
            });
        }
        Ok(Operator)
    }
}

fn hash_token(token: &str) -> [u8; 32] {
    Sha256::digest(token.trim().as_bytes()).into()
}
