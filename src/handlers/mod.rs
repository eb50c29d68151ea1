mod checkout;
mod download;
mod purchases;
mod webhooks;

pub use checkout::*;
pub use download::*;
pub use purchases::*;
pub use webhooks::*;

use axum::{
    routing::{get, post},
    Json, Router,
};
use serde::Serialize;

use crate::db::AppState;
use crate::util::SECURE_DOWNLOAD_PATH;

#[derive(Serialize)]
struct HealthResponse {
    status: &'static str,
    version: &'static str,
}

async fn health() -> Json<HealthResponse> {
    Json(HealthResponse {
        status: "ok",
        version: env!("CARGO_PKG_VERSION"),
    })
}

pub fn router() -> Router<AppState> {
    Router::new()
        .route("/health", get(health))
        .route("/checkout", post(create_checkout))
        .route(SECURE_DOWNLOAD_PATH, get(secure_download))
        .route("/purchases/{id}", get(get_purchase_info))
        .route("/purchases/{id}/resend", post(resend_download_link))
        .route("/webhooks/payment", post(payment_webhook))
}
