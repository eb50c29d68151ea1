//! Row mapping trait and helpers for reducing boilerplate in queries.

use rusqlite::{Connection, OptionalExtension, Row, ToSql};

use crate::models::*;

/// Parse a string column into an enum type, converting parse errors to rusqlite errors.
///
/// This provides graceful error handling instead of panicking when the database
/// contains invalid enum values (from corruption, migration errors, etc.).
fn parse_enum<T: std::str::FromStr>(row: &Row, col: usize, col_name: &str) -> rusqlite::Result<T> {
    row.get::<_, String>(col)?.parse::<T>().map_err(|_| {
        rusqlite::Error::InvalidColumnType(col, col_name.to_string(), rusqlite::types::Type::Text)
    })
}

/// Trait for constructing a type from a database row.
pub trait FromRow: Sized {
    fn from_row(row: &Row) -> rusqlite::Result<Self>;
}

/// Query for a single optional result.
pub fn query_one<T: FromRow>(
    conn: &Connection,
    sql: &str,
    params: &[&dyn ToSql],
) -> crate::error::Result<Option<T>> {
    conn.query_row(sql, params, T::from_row)
        .optional()
        .map_err(Into::into)
}

/// Query for multiple results.
pub fn query_all<T: FromRow>(
    conn: &Connection,
    sql: &str,
    params: &[&dyn ToSql],
) -> crate::error::Result<Vec<T>> {
    let mut stmt = conn.prepare(sql)?;
    let rows = stmt
        .query_map(params, T::from_row)?
        .collect::<std::result::Result<Vec<_>, _>>()?;
    Ok(rows)
}

// ============ SQL SELECT Constants ============

pub const PURCHASE_COLS: &str = "id, account_id, email, tier, amount_cents, status, file_id, \
     download_token, download_expires_at, download_attempts, max_attempts, license_sent, \
     payment_reference, created_at, completed_at";

pub const DOWNLOAD_ATTEMPT_COLS: &str =
    "id, purchase_id, succeeded, ip_address, user_agent, created_at";

// ============ FromRow Implementations ============

impl FromRow for Purchase {
    fn from_row(row: &Row) -> rusqlite::Result<Self> {
        Ok(Purchase {
            id: row.get(0)?,
            account_id: row.get(1)?,
            email: row.get(2)?,
            tier: parse_enum(row, 3, "tier")?,
            amount_cents: row.get(4)?,
            status: parse_enum(row, 5, "status")?,
            file_id: row.get(6)?,
            download_token: row.get(7)?,
            download_expires_at: row.get(8)?,
            download_attempts: row.get(9)?,
            max_attempts: row.get(10)?,
            license_sent: row.get::<_, i32>(11)? != 0,
            payment_reference: row.get(12)?,
            created_at: row.get(13)?,
            completed_at: row.get(14)?,
        })
    }
}

impl FromRow for DownloadAttempt {
    fn from_row(row: &Row) -> rusqlite::Result<Self> {
        Ok(DownloadAttempt {
            id: row.get(0)?,
            purchase_id: row.get(1)?,
            succeeded: row.get::<_, i32>(2)? != 0,
            ip_address: row.get(3)?,
            user_agent: row.get(4)?,
            created_at: row.get(5)?,
        })
    }
}
