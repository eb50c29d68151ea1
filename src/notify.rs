//! License notification dispatch.
//!
//! Two variants, selected once at startup: `Resend` posts the license email
//! through the Resend API; `Noop` logs and does nothing (local dev, tests,
//! deployments that handle mail elsewhere). Callers treat dispatch as a
//! best-effort side effect; a send failure never unwinds a purchase
//! transition.

use std::time::Duration;

use chrono::{DateTime, Utc};
use reqwest::Client;
use serde::Serialize;

use crate::error::{AppError, Result};
use crate::models::Purchase;

/// Retry delays in seconds (exponential backoff: 1s, 4s, 16s)
const RETRY_DELAYS: &[u64] = &[1, 4, 16];

const RESEND_API_URL: &str = "https://api.resend.com/emails";

/// Format a Unix timestamp as a human-readable date (e.g., "Jan 15, 2026")
fn format_date(timestamp: i64) -> String {
    DateTime::<Utc>::from_timestamp(timestamp, 0)
        .map(|dt| dt.format("%b %d, %Y").to_string())
        .unwrap_or_else(|| "Unknown date".to_string())
}

/// Outcome of a dispatch attempt.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum NotifySendResult {
    /// Email was sent successfully via Resend
    Sent,
    /// Notifications are disabled (Noop variant)
    Disabled,
    /// Purchase has no email address to notify (account-owned; the account
    /// UI surfaces the link instead)
    NoRecipient,
}

/// License notification channel.
pub enum Notifier {
    Resend(ResendNotifier),
    Noop,
}

impl Notifier {
    /// Pick the variant from configuration: a Resend API key enables real
    /// delivery, otherwise notifications are logged and dropped.
    pub fn from_config(resend_api_key: Option<&str>, email_from: &str) -> Self {
        match resend_api_key {
            Some(key) if !key.is_empty() => {
                Self::Resend(ResendNotifier::new(key, email_from))
            }
            _ => Self::Noop,
        }
    }

    /// Send the license email for a completed purchase.
    pub async fn send_license(
        &self,
        purchase: &Purchase,
        download_url: &str,
    ) -> Result<NotifySendResult> {
        let Some(to_email) = purchase.email.as_deref() else {
            tracing::debug!(
                purchase_id = %purchase.id,
                "No email on purchase, skipping license notification"
            );
            return Ok(NotifySendResult::NoRecipient);
        };

        match self {
            Self::Resend(resend) => {
                resend.send(purchase, to_email, download_url).await?;
                Ok(NotifySendResult::Sent)
            }
            Self::Noop => {
                tracing::info!(
                    purchase_id = %purchase.id,
                    "Notifications disabled, license email not sent"
                );
                Ok(NotifySendResult::Disabled)
            }
        }
    }
}

#[derive(Serialize)]
struct ResendEmailRequest<'a> {
    from: &'a str,
    to: [&'a str; 1],
    subject: String,
    html: String,
}

pub struct ResendNotifier {
    client: Client,
    api_key: String,
    from: String,
}

impl ResendNotifier {
    pub fn new(api_key: &str, from: &str) -> Self {
        Self {
            client: Client::new(),
            api_key: api_key.to_string(),
            from: from.to_string(),
        }
    }

    async fn send(&self, purchase: &Purchase, to_email: &str, download_url: &str) -> Result<()> {
        let tier = purchase.tier.config();
        let expires = purchase
            .download_expires_at
            .map(format_date)
            .unwrap_or_else(|| "soon".to_string());

        let body = ResendEmailRequest {
            from: &self.from,
            to: [to_email],
            subject: format!("Your {} video is ready", purchase.tier.as_str()),
            html: format!(
                "<p>Your rendered video ({resolution}, {format}) is ready.</p>\
                 <p><a href=\"{url}\">Download your video</a></p>\
                 <p>The link works until {expires} and allows a limited number of \
                 download attempts. If it expires, request a fresh link from your \
                 purchase page.</p>\
                 <hr><p><small>{license}</small></p>",
                resolution = tier.resolution,
                format = tier.format,
                url = download_url,
                expires = expires,
                license = tier.license_text,
            ),
        };

        let mut last_err = None;
        for (attempt, delay) in std::iter::once(&0u64).chain(RETRY_DELAYS).enumerate() {
            if *delay > 0 {
                tokio::time::sleep(Duration::from_secs(*delay)).await;
            }

            let result = self
                .client
                .post(RESEND_API_URL)
                .bearer_auth(&self.api_key)
                .json(&body)
                .send()
                .await;

            match result {
                Ok(resp) if resp.status().is_success() => return Ok(()),
                Ok(resp) => {
                    let status = resp.status();
                    let text = resp.text().await.unwrap_or_default();
                    tracing::warn!(
                        purchase_id = %purchase.id,
                        attempt,
                        %status,
                        "Resend API rejected license email: {}",
                        text
                    );
                    // Client errors won't improve on retry
                    if status.is_client_error() {
                        return Err(AppError::Internal(format!(
                            "Resend API error {}: {}",
                            status, text
                        )));
                    }
                    last_err = Some(AppError::Internal(format!("Resend API error {}", status)));
                }
                Err(e) => {
                    tracing::warn!(
                        purchase_id = %purchase.id,
                        attempt,
                        "Resend request failed: {}",
                        e
                    );
                    last_err = Some(AppError::Internal(format!("Resend request failed: {}", e)));
                }
            }
        }

        Err(last_err.unwrap_or_else(|| AppError::Internal("Resend send failed".into())))
    }
}
