use axum::{
    extract::State,
    http::{HeaderMap, StatusCode},
    response::{IntoResponse, Redirect, Response},
};
use serde::Deserialize;

use crate::access::{AccessDecision, DenialReason, DownloadGate};
use crate::db::AppState;
use crate::error::Result;
use crate::extractors::{Json, Query};
use crate::util::extract_request_info;

#[derive(Debug, Deserialize)]
pub struct DownloadQuery {
    pub token: String,
}

/// Secure download route. The gate makes the allow/deny decision; on a
/// grant we record the attempt and redirect to object storage. Recording
/// happens before the redirect is returned, so an aborted transfer still
/// consumed an attempt.
pub async fn secure_download(
    State(state): State<AppState>,
    headers: HeaderMap,
    Query(query): Query<DownloadQuery>,
) -> Result<Response> {
    let conn = state.db.get()?;
    let gate = DownloadGate::new(&conn, &state.token_key);

    match gate.validate(&query.token)? {
        AccessDecision::Granted {
            purchase_id,
            resource,
            attempts_remaining,
        } => {
            let ctx = extract_request_info(&headers);
            gate.record_attempt(&purchase_id, true, &ctx);

            tracing::info!(
                purchase_id = %purchase_id,
                attempts_remaining = attempts_remaining - 1,
                "Download granted"
            );
            Ok(Redirect::temporary(&state.assets.url_for(&resource)).into_response())
        }
        AccessDecision::Denied(reason) => Ok(deny_response(&reason)),
    }
}

#[derive(Debug, serde::Serialize)]
struct DenyBody {
    valid: bool,
    error: &'static str,
    #[serde(skip_serializing_if = "Option::is_none")]
    purchase_status: Option<&'static str>,
    #[serde(skip_serializing_if = "Option::is_none")]
    expires_at: Option<i64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    attempts_used: Option<i32>,
    #[serde(skip_serializing_if = "Option::is_none")]
    max_attempts: Option<i32>,
}

fn deny_response(reason: &DenialReason) -> Response {
    let mut body = DenyBody {
        valid: false,
        error: reason.code(),
        purchase_status: None,
        expires_at: None,
        attempts_used: None,
        max_attempts: None,
    };

    let status = match reason {
        DenialReason::InvalidToken => StatusCode::UNAUTHORIZED,
        DenialReason::PurchaseNotFound => StatusCode::NOT_FOUND,
        DenialReason::PurchaseIncomplete { status } => {
            body.purchase_status = Some(status.as_str());
            StatusCode::CONFLICT
        }
        DenialReason::ExpiredToken { expires_at } => {
            body.expires_at = Some(*expires_at);
            StatusCode::GONE
        }
        DenialReason::MaxAttemptsExceeded {
            attempts_used,
            max_attempts,
        } => {
            body.attempts_used = Some(*attempts_used);
            body.max_attempts = Some(*max_attempts);
            StatusCode::FORBIDDEN
        }
    };

    tracing::info!(error = reason.code(), "Download denied");
    (status, Json(body)).into_response()
}
