use chrono::Utc;
use rusqlite::{params, Connection};

use crate::error::{AppError, Result};
use crate::id::{is_valid_prefixed_id, EntityType};
use crate::models::*;

use super::from_row::{query_one, DOWNLOAD_ATTEMPT_COLS, PURCHASE_COLS};

fn now() -> i64 {
    Utc::now().timestamp()
}

// ============ Purchases ============

/// Create a pending purchase. Price is derived from the tier table, never
/// taken from the caller.
pub fn create_purchase(conn: &Connection, input: &CreatePurchase) -> Result<Purchase> {
    match (&input.account_id, &input.email) {
        (Some(_), Some(_)) | (None, None) => {
            return Err(AppError::BadRequest(
                "Exactly one of account_id or email must be set".into(),
            ));
        }
        _ => {}
    }
    if !is_valid_prefixed_id(&input.file_id) {
        return Err(AppError::BadRequest(
            "file_id is not a valid rendered-file id".into(),
        ));
    }

    let id = EntityType::Purchase.gen_id();
    let created_at = now();
    let amount_cents = input.tier.config().amount_cents;

    conn.execute(
        "INSERT INTO purchases (id, account_id, email, tier, amount_cents, status, file_id, \
         download_attempts, max_attempts, license_sent, created_at) \
         VALUES (?1, ?2, ?3, ?4, ?5, 'pending', ?6, 0, ?7, 0, ?8)",
        params![
            id,
            input.account_id,
            input.email,
            input.tier.as_str(),
            amount_cents,
            input.file_id,
            MAX_DOWNLOAD_ATTEMPTS,
            created_at,
        ],
    )?;

    get_purchase(conn, &id)?
        .ok_or_else(|| AppError::Internal("Purchase vanished after insert".into()))
}

pub fn get_purchase(conn: &Connection, id: &str) -> Result<Option<Purchase>> {
    query_one(
        conn,
        &format!("SELECT {} FROM purchases WHERE id = ?1", PURCHASE_COLS),
        &[&id],
    )
}

/// Atomically claim the pending -> completed transition and store the first
/// download token. Returns false if the purchase was not pending (already
/// completed, terminal, or missing), so completion is idempotent under
/// concurrent webhook delivery.
pub fn try_complete_purchase(
    conn: &Connection,
    id: &str,
    payment_reference: &str,
    token: &str,
    expires_at: i64,
) -> Result<bool> {
    let rows = conn.execute(
        "UPDATE purchases SET status = 'completed', completed_at = ?1, payment_reference = ?2, \
         download_token = ?3, download_expires_at = ?4 \
         WHERE id = ?5 AND status = 'pending'",
        params![now(), payment_reference, token, expires_at, id],
    )?;
    Ok(rows > 0)
}

/// Pending-only terminal transition (cancelled or failed).
pub fn try_mark_terminal(conn: &Connection, id: &str, status: PurchaseStatus) -> Result<bool> {
    debug_assert!(matches!(
        status,
        PurchaseStatus::Cancelled | PurchaseStatus::Failed
    ));
    let rows = conn.execute(
        "UPDATE purchases SET status = ?1 WHERE id = ?2 AND status = 'pending'",
        params![status.as_str(), id],
    )?;
    Ok(rows > 0)
}

/// Overwrite the stored token/expiry on renewal. Attempt counters are
/// deliberately untouched.
pub fn set_download_token(
    conn: &Connection,
    id: &str,
    token: &str,
    expires_at: i64,
) -> Result<bool> {
    let rows = conn.execute(
        "UPDATE purchases SET download_token = ?1, download_expires_at = ?2 \
         WHERE id = ?3 AND status = 'completed'",
        params![token, expires_at, id],
    )?;
    Ok(rows > 0)
}

/// Single-statement increment so concurrent attempts can never lose an
/// update (SQLite serializes writers; the read-modify-write happens inside
/// the UPDATE itself).
pub fn increment_download_attempts(conn: &Connection, id: &str) -> Result<bool> {
    let rows = conn.execute(
        "UPDATE purchases SET download_attempts = download_attempts + 1 WHERE id = ?1",
        params![id],
    )?;
    Ok(rows > 0)
}

pub fn mark_license_sent(conn: &Connection, id: &str) -> Result<bool> {
    let rows = conn.execute(
        "UPDATE purchases SET license_sent = 1 WHERE id = ?1",
        params![id],
    )?;
    Ok(rows > 0)
}

// ============ Download attempt audit trail ============

pub fn insert_download_attempt(
    conn: &Connection,
    purchase_id: &str,
    succeeded: bool,
    ctx: &AttemptContext,
) -> Result<DownloadAttempt> {
    let id = EntityType::DownloadAttempt.gen_id();
    conn.execute(
        "INSERT INTO download_attempts (id, purchase_id, succeeded, ip_address, user_agent, created_at) \
         VALUES (?1, ?2, ?3, ?4, ?5, ?6)",
        params![
            id,
            purchase_id,
            succeeded as i32,
            ctx.ip_address,
            ctx.user_agent,
            now(),
        ],
    )?;
    query_one(
        conn,
        &format!(
            "SELECT {} FROM download_attempts WHERE id = ?1",
            DOWNLOAD_ATTEMPT_COLS
        ),
        &[&id],
    )?
    .ok_or_else(|| AppError::Internal("Download attempt vanished after insert".into()))
}

pub fn count_attempt_rows(conn: &Connection, purchase_id: &str) -> Result<i64> {
    let count = conn.query_row(
        "SELECT COUNT(*) FROM download_attempts WHERE purchase_id = ?1",
        params![purchase_id],
        |row| row.get(0),
    )?;
    Ok(count)
}

pub fn list_download_attempts(
    conn: &Connection,
    purchase_id: &str,
) -> Result<Vec<DownloadAttempt>> {
    super::from_row::query_all(
        conn,
        &format!(
            "SELECT {} FROM download_attempts WHERE purchase_id = ?1 ORDER BY created_at DESC",
            DOWNLOAD_ATTEMPT_COLS
        ),
        &[&purchase_id],
    )
}
