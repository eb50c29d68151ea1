mod schema;

pub mod from_row;
pub mod queries;

pub use schema::init_db;

use std::sync::Arc;

use r2d2::Pool;
use r2d2_sqlite::SqliteConnectionManager;

use crate::notify::Notifier;
use crate::storage::ObjectStore;
use crate::token::TokenKey;

pub type DbPool = Pool<SqliteConnectionManager>;

/// Application state threaded through handlers and the lifecycle manager.
#[derive(Clone)]
pub struct AppState {
    pub db: DbPool,
    /// HMAC key signing download tokens
    pub token_key: TokenKey,
    /// License notification channel, selected once at startup
    pub notifier: Arc<Notifier>,
    /// Object-storage collaborator resolving resource locators to URLs
    pub assets: ObjectStore,
    /// Base URL for building download links (e.g. https://api.example.com)
    pub base_url: String,
    /// Shared secret authenticating payment-provider webhooks
    pub webhook_secret: String,
}

pub fn create_pool(database_path: &str) -> Result<DbPool, r2d2::Error> {
    let manager = SqliteConnectionManager::file(database_path);
    Pool::builder().max_size(10).build(manager)
}
