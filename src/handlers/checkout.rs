use axum::{extract::State, http::StatusCode};
use serde::Serialize;

use crate::db::{queries, AppState};
use crate::error::Result;
use crate::extractors::Json;
use crate::models::{CreatePurchase, PurchaseStatus, Tier};

#[derive(Debug, Serialize)]
pub struct CheckoutResponse {
    pub purchase_id: String,
    pub status: PurchaseStatus,
    pub tier: Tier,
    /// Server-side price for the tier; informational only
    pub amount_cents: i64,
}

/// Create a pending purchase at checkout-session initiation. The external
/// payment processor confirms payment later via the webhook, which flips the
/// purchase to completed.
pub async fn create_checkout(
    State(state): State<AppState>,
    Json(request): Json<CreatePurchase>,
) -> Result<(StatusCode, Json<CheckoutResponse>)> {
    let conn = state.db.get()?;
    let purchase = queries::create_purchase(&conn, &request)?;

    tracing::info!(
        purchase_id = %purchase.id,
        tier = purchase.tier.as_str(),
        file_id = %purchase.file_id,
        "Checkout started"
    );

    Ok((
        StatusCode::CREATED,
        Json(CheckoutResponse {
            purchase_id: purchase.id,
            status: purchase.status,
            tier: purchase.tier,
            amount_cents: purchase.amount_cents,
        }),
    ))
}
