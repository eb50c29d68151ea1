//! Shared utility functions for the Resonate backend.

use axum::http::HeaderMap;

use crate::models::AttemptContext;

/// Fixed path prefix for secure downloads; the token rides as a query param.
pub const SECURE_DOWNLOAD_PATH: &str = "/downloads/secure";

/// Build the user-facing download link embedding a token.
pub fn download_url(base_url: &str, token: &str) -> String {
    format!(
        "{}{}?token={}",
        base_url.trim_end_matches('/'),
        SECURE_DOWNLOAD_PATH,
        urlencoding::encode(token)
    )
}

/// Extract client IP address and user-agent from request headers.
///
/// Tries `x-forwarded-for` first (for proxied requests), then `x-real-ip`,
/// and extracts the `user-agent` header for the attempt audit trail.
pub fn extract_request_info(headers: &HeaderMap) -> AttemptContext {
    let ip_address = headers
        .get("x-forwarded-for")
        .or_else(|| headers.get("x-real-ip"))
        .and_then(|v| v.to_str().ok())
        .map(String::from);

    let user_agent = headers
        .get("user-agent")
        .and_then(|v| v.to_str().ok())
        .map(String::from);

    AttemptContext {
        ip_address,
        user_agent,
    }
}
