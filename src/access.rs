//! Download access gate.
//!
//! The single authority deciding whether a presented token currently grants
//! a download. Checks run cheapest-first: signature before any database
//! read, expiry before the attempt ceiling so callers can tell "renew the
//! link" apart from "out of tries".

use chrono::Utc;
use rusqlite::Connection;

use crate::db::queries;
use crate::error::Result;
use crate::models::{AttemptContext, PurchaseStatus};
use crate::token::{self, TokenKey};

/// Why a token was refused. Every variant is an expected, user-recoverable
/// outcome returned as data; only storage faults surface as errors.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum DenialReason {
    /// Malformed, tampered, or unparseable token
    InvalidToken,
    /// Token references a purchase that does not exist
    PurchaseNotFound,
    /// Purchase exists but payment has not completed
    PurchaseIncomplete { status: PurchaseStatus },
    /// Token's embedded expiry has passed; a renewed link will work
    ExpiredToken { expires_at: i64 },
    /// Attempt ceiling reached; renewal will not help
    MaxAttemptsExceeded {
        attempts_used: i32,
        max_attempts: i32,
    },
}

impl DenialReason {
    pub fn code(&self) -> &'static str {
        match self {
            Self::InvalidToken => "INVALID_TOKEN",
            Self::PurchaseNotFound => "PURCHASE_NOT_FOUND",
            Self::PurchaseIncomplete { .. } => "PURCHASE_INCOMPLETE",
            Self::ExpiredToken { .. } => "EXPIRED_TOKEN",
            Self::MaxAttemptsExceeded { .. } => "MAX_ATTEMPTS_EXCEEDED",
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum AccessDecision {
    Granted {
        purchase_id: String,
        resource: String,
        attempts_remaining: i32,
    },
    Denied(DenialReason),
}

impl AccessDecision {
    fn denied(reason: DenialReason) -> Self {
        Self::Denied(reason)
    }
}

pub struct DownloadGate<'a> {
    conn: &'a Connection,
    key: &'a TokenKey,
}

impl<'a> DownloadGate<'a> {
    pub fn new(conn: &'a Connection, key: &'a TokenKey) -> Self {
        Self { conn, key }
    }

    /// Decide whether `token` currently grants a download.
    ///
    /// Check order is part of the contract:
    /// 1. signature/structure (no DB touch for forged tokens)
    /// 2. purchase exists
    /// 3. purchase completed
    /// 4. token not expired
    /// 5. attempt ceiling not reached
    pub fn validate(&self, token: &str) -> Result<AccessDecision> {
        let payload = match token::verify(self.key, token) {
            Ok(p) => p,
            Err(_) => return Ok(AccessDecision::denied(DenialReason::InvalidToken)),
        };

        let Some(purchase) = queries::get_purchase(self.conn, &payload.purchase_id)? else {
            return Ok(AccessDecision::denied(DenialReason::PurchaseNotFound));
        };

        if purchase.status != PurchaseStatus::Completed {
            return Ok(AccessDecision::denied(DenialReason::PurchaseIncomplete {
                status: purchase.status,
            }));
        }

        if payload.expires_at <= Utc::now().timestamp() {
            return Ok(AccessDecision::denied(DenialReason::ExpiredToken {
                expires_at: payload.expires_at,
            }));
        }

        if purchase.download_attempts >= purchase.max_attempts {
            return Ok(AccessDecision::denied(DenialReason::MaxAttemptsExceeded {
                attempts_used: purchase.download_attempts,
                max_attempts: purchase.max_attempts,
            }));
        }

        let attempts_remaining = purchase.attempts_remaining();
        Ok(AccessDecision::Granted {
            purchase_id: purchase.id,
            resource: payload.resource,
            attempts_remaining,
        })
    }

    /// Record one download attempt against the purchase.
    ///
    /// Increments the counter whether or not the transfer succeeded:
    /// attempts model link exposure, not bytes delivered. Context goes to
    /// the audit trail only. Bookkeeping failures are logged and reported
    /// as `false`; they never break the caller's download response.
    pub fn record_attempt(
        &self,
        purchase_id: &str,
        succeeded: bool,
        ctx: &AttemptContext,
    ) -> bool {
        let incremented = match queries::increment_download_attempts(self.conn, purchase_id) {
            Ok(found) => found,
            Err(e) => {
                tracing::warn!(
                    purchase_id = %purchase_id,
                    "Failed to increment download attempts: {}",
                    e
                );
                return false;
            }
        };

        if !incremented {
            tracing::warn!(
                purchase_id = %purchase_id,
                "Attempt recorded for unknown purchase"
            );
            return false;
        }

        // The counter is what gates access; losing an audit row is only an
        // analytics gap.
        if let Err(e) = queries::insert_download_attempt(self.conn, purchase_id, succeeded, ctx) {
            tracing::warn!(
                purchase_id = %purchase_id,
                "Failed to write download attempt audit row: {}",
                e
            );
        }

        true
    }
}
