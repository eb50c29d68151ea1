//! Test utilities and fixtures for Resonate integration tests

#![allow(dead_code)]

use std::sync::Arc;

use hmac::{Hmac, Mac};
use r2d2_sqlite::SqliteConnectionManager;
use sha2::Sha256;

use resonate::access::DownloadGate;
use resonate::db::{init_db, queries, AppState, DbPool};
use resonate::id::EntityType;
use resonate::lifecycle::{CompleteOutcome, LifecycleManager};
use resonate::models::{AttemptContext, CreatePurchase, Purchase, Tier};
use resonate::notify::Notifier;
use resonate::storage::ObjectStore;
use resonate::token::TokenKey;

pub const TEST_WEBHOOK_SECRET: &str = "test-webhook-secret";

/// Create a test token key (deterministic for testing)
pub fn test_token_key() -> TokenKey {
    // Fixed test key - ONLY for testing!
    TokenKey::from_bytes([7u8; 32])
}

/// Create a single-connection in-memory pool with schema initialized.
/// Size 1 so every handle sees the same in-memory database.
pub fn setup_test_pool() -> DbPool {
    let manager = SqliteConnectionManager::memory();
    let pool = r2d2::Pool::builder()
        .max_size(1)
        .build(manager)
        .expect("Failed to build test pool");
    {
        let conn = pool.get().expect("Failed to get test connection");
        init_db(&conn).expect("Failed to initialize schema");
    }
    pool
}

pub fn create_test_app_state() -> AppState {
    AppState {
        db: setup_test_pool(),
        token_key: test_token_key(),
        notifier: Arc::new(Notifier::Noop),
        assets: ObjectStore::new("https://cdn.test"),
        base_url: "https://api.test".to_string(),
        webhook_secret: TEST_WEBHOOK_SECRET.to_string(),
    }
}

/// Create a pending guest purchase. Each call gets its own rendered file, so
/// two fixture purchases never share a resource.
pub fn create_test_purchase(conn: &rusqlite::Connection, tier: Tier) -> Purchase {
    queries::create_purchase(
        conn,
        &CreatePurchase {
            tier,
            file_id: EntityType::RenderedFile.gen_id(),
            account_id: None,
            email: Some("buyer@example.com".to_string()),
        },
    )
    .expect("Failed to create test purchase")
}

/// Create a purchase and drive it to completed via the lifecycle manager.
pub fn create_completed_purchase(state: &AppState, tier: Tier) -> Purchase {
    let purchase = {
        let conn = state.db.get().unwrap();
        create_test_purchase(&conn, tier)
    };

    let manager = LifecycleManager::from_state(state);
    match manager
        .complete(&purchase.id, "pay_ref_test")
        .expect("Failed to complete test purchase")
    {
        CompleteOutcome::Completed(p) => p,
        other => panic!("Expected completion, got {:?}", other),
    }
}

/// Record `n` download attempts against a purchase.
pub fn exhaust_attempts(state: &AppState, purchase_id: &str, n: i32) {
    let conn = state.db.get().unwrap();
    let gate = DownloadGate::new(&conn, &state.token_key);
    for _ in 0..n {
        assert!(gate.record_attempt(purchase_id, true, &AttemptContext::default()));
    }
}

/// Hex HMAC-SHA256 of a webhook body under the test secret.
pub fn sign_webhook(body: &[u8]) -> String {
    let mut mac = Hmac::<Sha256>::new_from_slice(TEST_WEBHOOK_SECRET.as_bytes()).unwrap();
    mac.update(body);
    hex::encode(mac.finalize().into_bytes())
}

/// The full app router wired to test state.
pub fn app(state: AppState) -> axum::Router {
    resonate::handlers::router().with_state(state)
}
