use rusqlite::Connection;

/// Initialize the database schema.
pub fn init_db(conn: &Connection) -> rusqlite::Result<()> {
    conn.execute_batch(
        r#"
        PRAGMA journal_mode = WAL;
        PRAGMA synchronous = NORMAL;
        PRAGMA foreign_keys = ON;

        -- Purchases (one paid license per rendered asset)
        -- Owner is exactly one of account_id / email (guest checkout).
        -- amount_cents is copied from the tier table at creation time.
        CREATE TABLE IF NOT EXISTS purchases (
            id TEXT PRIMARY KEY,
            account_id TEXT,
            email TEXT,
            tier TEXT NOT NULL CHECK (tier IN ('personal', 'commercial', 'premium')),
            amount_cents INTEGER NOT NULL,
            status TEXT NOT NULL DEFAULT 'pending'
                CHECK (status IN ('pending', 'completed', 'failed', 'cancelled')),
            file_id TEXT NOT NULL,
            download_token TEXT,
            download_expires_at INTEGER,
            download_attempts INTEGER NOT NULL DEFAULT 0,
            max_attempts INTEGER NOT NULL DEFAULT 5,
            license_sent INTEGER NOT NULL DEFAULT 0,
            payment_reference TEXT,
            created_at INTEGER NOT NULL,
            completed_at INTEGER,

            CHECK ((account_id IS NULL) != (email IS NULL))
        );
        CREATE INDEX IF NOT EXISTS idx_purchases_account ON purchases(account_id);
        CREATE INDEX IF NOT EXISTS idx_purchases_email ON purchases(email);
        CREATE INDEX IF NOT EXISTS idx_purchases_status ON purchases(status);
        CREATE INDEX IF NOT EXISTS idx_purchases_file ON purchases(file_id);

        -- Download attempt audit trail (append-only, analytics/support only)
        CREATE TABLE IF NOT EXISTS download_attempts (
            id TEXT PRIMARY KEY,
            purchase_id TEXT NOT NULL REFERENCES purchases(id) ON DELETE CASCADE,
            succeeded INTEGER NOT NULL,
            ip_address TEXT,
            user_agent TEXT,
            created_at INTEGER NOT NULL
        );
        CREATE INDEX IF NOT EXISTS idx_download_attempts_purchase
            ON download_attempts(purchase_id, created_at DESC);
        "#,
    )?;
    Ok(())
}
