//! Purchase lifecycle manager.
//!
//! Owns the pending -> completed / cancelled / failed state machine and
//! download-link renewal. Completion is claimed with a conditional UPDATE so
//! duplicate payment webhooks are idempotent, and the license notification
//! is dispatched on a spawned task: the status transition is the source of
//! truth, a dead mail provider must never roll it back.

use std::sync::Arc;

use chrono::Utc;

use crate::db::{queries, AppState, DbPool};
use crate::error::{AppError, Result};
use crate::models::{Purchase, PurchaseStatus};
use crate::notify::{Notifier, NotifySendResult};
use crate::token::{self, TokenKey};
use crate::util::download_url;

/// TTL of the token minted at completion time.
pub const DEFAULT_TOKEN_TTL_HOURS: i64 = 48;

/// How long after completion a link may still be renewed.
pub const RENEWAL_WINDOW_DAYS: i64 = 30;

const SECONDS_PER_DAY: i64 = 86400;

#[derive(Debug)]
pub enum CompleteOutcome {
    /// First completion: token minted, notification dispatched
    Completed(Purchase),
    /// Purchase was already completed; nothing changed, no second
    /// notification
    AlreadyCompleted(Purchase),
    NotFound,
    /// Purchase is cancelled or failed; completion is not a legal transition
    WrongState(PurchaseStatus),
}

#[derive(Debug)]
pub enum RenewOutcome {
    Renewed {
        purchase: Purchase,
        download_url: String,
        attempts_remaining: i32,
    },
    NotFound,
    /// Only completed purchases carry a download link
    NotCompleted(PurchaseStatus),
    /// Past the renewal window; direct the customer to support
    TooOld { completed_at: i64 },
}

#[derive(Debug)]
pub enum TransitionOutcome {
    Done(Purchase),
    NotFound,
    WrongState(PurchaseStatus),
}

pub struct LifecycleManager {
    db: DbPool,
    key: TokenKey,
    notifier: Arc<Notifier>,
    base_url: String,
}

impl LifecycleManager {
    pub fn new(db: DbPool, key: TokenKey, notifier: Arc<Notifier>, base_url: &str) -> Self {
        Self {
            db,
            key,
            notifier,
            base_url: base_url.to_string(),
        }
    }

    pub fn from_state(state: &AppState) -> Self {
        Self::new(
            state.db.clone(),
            state.token_key.clone(),
            state.notifier.clone(),
            &state.base_url,
        )
    }

    /// Mark a purchase paid. Mints the first download token (48h TTL) and
    /// stores it atomically with the status flip. Calling this again for an
    /// already-completed purchase is a no-op that reports `AlreadyCompleted`.
    pub fn complete(&self, purchase_id: &str, payment_reference: &str) -> Result<CompleteOutcome> {
        let conn = self.db.get()?;

        let Some(purchase) = queries::get_purchase(&conn, purchase_id)? else {
            return Ok(CompleteOutcome::NotFound);
        };

        match purchase.status {
            PurchaseStatus::Completed => return Ok(CompleteOutcome::AlreadyCompleted(purchase)),
            PurchaseStatus::Cancelled | PurchaseStatus::Failed => {
                return Ok(CompleteOutcome::WrongState(purchase.status));
            }
            PurchaseStatus::Pending => {}
        }

        let issued = token::issue(
            &self.key,
            &purchase.id,
            &purchase.resource(),
            DEFAULT_TOKEN_TTL_HOURS,
        )?;

        let claimed = queries::try_complete_purchase(
            &conn,
            purchase_id,
            payment_reference,
            &issued.token,
            issued.expires_at,
        )?;

        let purchase = queries::get_purchase(&conn, purchase_id)?
            .ok_or_else(|| AppError::Internal("Purchase vanished during completion".into()))?;

        if !claimed {
            // Another writer won the pending -> completed race between our
            // read and the claim. Their token stands.
            return Ok(CompleteOutcome::AlreadyCompleted(purchase));
        }

        tracing::info!(
            purchase_id = %purchase.id,
            tier = purchase.tier.as_str(),
            payment_reference = %payment_reference,
            "Purchase completed"
        );

        self.dispatch_notification(purchase.clone(), issued.token);

        Ok(CompleteOutcome::Completed(purchase))
    }

    /// Reissue the download link for a completed purchase.
    ///
    /// Renewal fixes "the link died", not "I want more tries": the attempt
    /// counter survives, and an exhausted purchase stays exhausted.
    pub fn renew_link(&self, purchase_id: &str, ttl_hours: i64) -> Result<RenewOutcome> {
        let conn = self.db.get()?;

        let Some(purchase) = queries::get_purchase(&conn, purchase_id)? else {
            return Ok(RenewOutcome::NotFound);
        };

        if purchase.status != PurchaseStatus::Completed {
            return Ok(RenewOutcome::NotCompleted(purchase.status));
        }

        let completed_at = purchase
            .completed_at
            .ok_or_else(|| AppError::Internal("Completed purchase missing completed_at".into()))?;

        let age = Utc::now().timestamp() - completed_at;
        if age > RENEWAL_WINDOW_DAYS * SECONDS_PER_DAY {
            return Ok(RenewOutcome::TooOld { completed_at });
        }

        let issued = token::issue(&self.key, &purchase.id, &purchase.resource(), ttl_hours)?;
        queries::set_download_token(&conn, purchase_id, &issued.token, issued.expires_at)?;

        let purchase = queries::get_purchase(&conn, purchase_id)?
            .ok_or_else(|| AppError::Internal("Purchase vanished during renewal".into()))?;

        tracing::info!(
            purchase_id = %purchase.id,
            attempts_remaining = purchase.attempts_remaining(),
            "Download link renewed"
        );

        Ok(RenewOutcome::Renewed {
            download_url: download_url(&self.base_url, &issued.token),
            attempts_remaining: purchase.attempts_remaining(),
            purchase,
        })
    }

    pub fn cancel(&self, purchase_id: &str) -> Result<TransitionOutcome> {
        self.mark_terminal(purchase_id, PurchaseStatus::Cancelled)
    }

    pub fn fail(&self, purchase_id: &str) -> Result<TransitionOutcome> {
        self.mark_terminal(purchase_id, PurchaseStatus::Failed)
    }

    fn mark_terminal(&self, purchase_id: &str, status: PurchaseStatus) -> Result<TransitionOutcome> {
        let conn = self.db.get()?;

        let claimed = queries::try_mark_terminal(&conn, purchase_id, status)?;

        let Some(purchase) = queries::get_purchase(&conn, purchase_id)? else {
            return Ok(TransitionOutcome::NotFound);
        };

        if !claimed {
            return Ok(TransitionOutcome::WrongState(purchase.status));
        }

        tracing::info!(
            purchase_id = %purchase.id,
            status = status.as_str(),
            "Purchase closed"
        );
        Ok(TransitionOutcome::Done(purchase))
    }

    /// Fire-and-forget license notification. Runs on its own task so a slow
    /// or failing mail provider cannot block or fail the completion path.
    fn dispatch_notification(&self, purchase: Purchase, token: String) {
        let notifier = self.notifier.clone();
        let db = self.db.clone();
        let url = download_url(&self.base_url, &token);

        tokio::spawn(async move {
            match notifier.send_license(&purchase, &url).await {
                Ok(NotifySendResult::Sent) => {
                    let marked = db
                        .get()
                        .map_err(AppError::from)
                        .and_then(|conn| queries::mark_license_sent(&conn, &purchase.id));
                    if let Err(e) = marked {
                        tracing::warn!(
                            purchase_id = %purchase.id,
                            "License sent but could not record license_sent: {}",
                            e
                        );
                    }
                }
                Ok(result) => {
                    tracing::debug!(
                        purchase_id = %purchase.id,
                        ?result,
                        "License notification skipped"
                    );
                }
                Err(e) => {
                    tracing::error!(
                        purchase_id = %purchase.id,
                        "License notification failed (purchase stays completed): {}",
                        e
                    );
                }
            }
        });
    }
}
