use axum::{
    extract::{Path, State},
    http::StatusCode,
    response::{IntoResponse, Response},
};
use serde::{Deserialize, Serialize};

use crate::db::{queries, AppState};
use crate::error::{AppError, Result};
use crate::extractors::Json;
use crate::lifecycle::{LifecycleManager, RenewOutcome, DEFAULT_TOKEN_TTL_HOURS};
use crate::models::{PurchaseStatus, Tier};

#[derive(Debug, Serialize)]
pub struct PurchaseInfoResponse {
    pub id: String,
    pub status: PurchaseStatus,
    pub tier: Tier,
    pub amount_cents: i64,
    pub download_expires_at: Option<i64>,
    pub attempts_remaining: i32,
    pub license_sent: bool,
    pub created_at: i64,
    pub completed_at: Option<i64>,
}

/// Purchase status for the account/order page. The token itself is never
/// echoed here; links are delivered by notification or explicit resend.
pub async fn get_purchase_info(
    State(state): State<AppState>,
    Path(id): Path<String>,
) -> Result<Json<PurchaseInfoResponse>> {
    let conn = state.db.get()?;
    let purchase = queries::get_purchase(&conn, &id)?
        .ok_or_else(|| AppError::NotFound("Purchase not found".into()))?;

    Ok(Json(PurchaseInfoResponse {
        attempts_remaining: purchase.attempts_remaining(),
        id: purchase.id,
        status: purchase.status,
        tier: purchase.tier,
        amount_cents: purchase.amount_cents,
        download_expires_at: purchase.download_expires_at,
        license_sent: purchase.license_sent,
        created_at: purchase.created_at,
        completed_at: purchase.completed_at,
    }))
}

/// Longest link a resend may mint (30 days); client-supplied TTLs outside
/// 1..=this are rejected.
pub const MAX_RESEND_TTL_HOURS: i64 = 24 * 30;

#[derive(Debug, Deserialize, Default)]
pub struct ResendRequest {
    /// TTL of the reissued link; defaults to the standard 48 hours
    pub ttl_hours: Option<i64>,
}

#[derive(Debug, Serialize)]
pub struct ResendResponse {
    pub download_url: String,
    pub expires_at: Option<i64>,
    pub attempts_remaining: i32,
}

#[derive(Debug, Serialize)]
struct ResendDenied {
    error: &'static str,
    #[serde(skip_serializing_if = "Option::is_none")]
    purchase_status: Option<&'static str>,
    #[serde(skip_serializing_if = "Option::is_none")]
    completed_at: Option<i64>,
}

/// Reissue the download link. The attempt counter is preserved; an exhausted
/// purchase gets a fresh link that still reports zero attempts remaining.
pub async fn resend_download_link(
    State(state): State<AppState>,
    Path(id): Path<String>,
    Json(request): Json<ResendRequest>,
) -> Result<Response> {
    let ttl_hours = request.ttl_hours.unwrap_or(DEFAULT_TOKEN_TTL_HOURS);
    if !(1..=MAX_RESEND_TTL_HOURS).contains(&ttl_hours) {
        return Err(AppError::BadRequest(format!(
            "ttl_hours must be between 1 and {}",
            MAX_RESEND_TTL_HOURS
        )));
    }

    let manager = LifecycleManager::from_state(&state);
    let response = match manager.renew_link(&id, ttl_hours)? {
        RenewOutcome::Renewed {
            purchase,
            download_url,
            attempts_remaining,
        } => Json(ResendResponse {
            download_url,
            expires_at: purchase.download_expires_at,
            attempts_remaining,
        })
        .into_response(),
        RenewOutcome::NotFound => (
            StatusCode::NOT_FOUND,
            Json(ResendDenied {
                error: "PURCHASE_NOT_FOUND",
                purchase_status: None,
                completed_at: None,
            }),
        )
            .into_response(),
        RenewOutcome::NotCompleted(status) => (
            StatusCode::CONFLICT,
            Json(ResendDenied {
                error: "PURCHASE_INCOMPLETE",
                purchase_status: Some(status.as_str()),
                completed_at: None,
            }),
        )
            .into_response(),
        RenewOutcome::TooOld { completed_at } => (
            StatusCode::GONE,
            Json(ResendDenied {
                error: "TOO_OLD",
                purchase_status: None,
                completed_at: Some(completed_at),
            }),
        )
            .into_response(),
    };

    Ok(response)
}
