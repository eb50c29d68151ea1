//! Payment-provider webhook.
//!
//! The provider signs the raw body with the shared webhook secret
//! (hex-encoded HMAC-SHA256 in `x-resonate-signature`). Completion is
//! idempotent, so redelivered events are harmless.

use axum::{
    body::Bytes,
    extract::State,
    http::{HeaderMap, StatusCode},
};
use hmac::{Hmac, Mac};
use serde::{Deserialize, Serialize};
use sha2::Sha256;
use subtle::ConstantTimeEq;

use crate::db::AppState;
use crate::error::{AppError, Result};
use crate::extractors::Json;
use crate::lifecycle::{CompleteOutcome, LifecycleManager, TransitionOutcome};

type HmacSha256 = Hmac<Sha256>;

pub const SIGNATURE_HEADER: &str = "x-resonate-signature";

#[derive(Debug, Deserialize)]
pub struct PaymentEvent {
    /// "payment.succeeded" | "payment.failed" | "payment.cancelled"
    #[serde(rename = "type")]
    pub event_type: String,
    pub purchase_id: String,
    /// Provider's reference for the payment; required for succeeded events
    #[serde(default)]
    pub payment_reference: Option<String>,
}

#[derive(Debug, Serialize)]
pub struct WebhookResponse {
    pub received: bool,
    pub outcome: &'static str,
}

/// Verify a hex-encoded HMAC-SHA256 signature over the raw payload.
pub fn verify_webhook_signature(secret: &str, payload: &[u8], provided: &str) -> bool {
    let mut mac =
        HmacSha256::new_from_slice(secret.as_bytes()).expect("HMAC can take key of any size");
    mac.update(payload);
    let expected = hex::encode(mac.finalize().into_bytes());

    let expected_bytes = expected.as_bytes();
    let provided_bytes = provided.trim().as_bytes();

    // Length check is not constant-time, but signature length is not secret
    // (always 64 hex chars for SHA-256).
    if expected_bytes.len() != provided_bytes.len() {
        return false;
    }

    // Constant-time comparison to prevent timing attacks on the signature.
    expected_bytes.ct_eq(provided_bytes).into()
}

pub async fn payment_webhook(
    State(state): State<AppState>,
    headers: HeaderMap,
    body: Bytes,
) -> Result<(StatusCode, Json<WebhookResponse>)> {
    let signature = headers
        .get(SIGNATURE_HEADER)
        .and_then(|v| v.to_str().ok())
        .ok_or(AppError::Unauthorized)?;

    if !verify_webhook_signature(&state.webhook_secret, &body, signature) {
        tracing::warn!("Payment webhook rejected: bad signature");
        return Err(AppError::Unauthorized);
    }

    let event: PaymentEvent = serde_json::from_slice(&body)?;
    let manager = LifecycleManager::from_state(&state);

    let outcome = match event.event_type.as_str() {
        "payment.succeeded" => {
            let reference = event.payment_reference.as_deref().ok_or_else(|| {
                AppError::BadRequest("payment_reference required for payment.succeeded".into())
            })?;
            match manager.complete(&event.purchase_id, reference)? {
                CompleteOutcome::Completed(_) => "completed",
                CompleteOutcome::AlreadyCompleted(_) => "already_completed",
                CompleteOutcome::NotFound => {
                    tracing::warn!(
                        purchase_id = %event.purchase_id,
                        "Payment webhook for unknown purchase"
                    );
                    "purchase_not_found"
                }
                CompleteOutcome::WrongState(status) => {
                    tracing::warn!(
                        purchase_id = %event.purchase_id,
                        status = status.as_str(),
                        "Payment webhook for closed purchase"
                    );
                    "wrong_state"
                }
            }
        }
        "payment.failed" => match manager.fail(&event.purchase_id)? {
            TransitionOutcome::Done(_) => "failed",
            TransitionOutcome::NotFound => "purchase_not_found",
            TransitionOutcome::WrongState(_) => "wrong_state",
        },
        "payment.cancelled" => match manager.cancel(&event.purchase_id)? {
            TransitionOutcome::Done(_) => "cancelled",
            TransitionOutcome::NotFound => "purchase_not_found",
            TransitionOutcome::WrongState(_) => "wrong_state",
        },
        other => {
            tracing::debug!(event_type = %other, "Ignoring unhandled payment event");
            "ignored"
        }
    };

    Ok((
        StatusCode::OK,
        Json(WebhookResponse {
            received: true,
            outcome,
        }),
    ))
}
