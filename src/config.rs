use std::env;

#[derive(Debug, Clone)]
pub struct Config {
    pub host: String,
    pub port: u16,
    pub database_path: String,
    pub base_url: String,
    /// Public base URL of the bucket/CDN holding rendered assets
    pub asset_base_url: String,
    /// Base64-encoded 32-byte HMAC key for download tokens
    pub token_key: Option<String>,
    /// Shared secret for payment webhook signatures
    pub webhook_secret: Option<String>,
    pub resend_api_key: Option<String>,
    pub email_from: String,
    pub dev_mode: bool,
}

impl Config {
    pub fn from_env() -> Self {
        dotenvy::dotenv().ok();

        let dev_mode = env::var("RESONATE_ENV")
            .map(|v| v == "dev" || v == "development")
            .unwrap_or(false);

        let host = env::var("HOST").unwrap_or_else(|_| "127.0.0.1".to_string());
        let port: u16 = env::var("PORT")
            .ok()
            .and_then(|p| p.parse().ok())
            .unwrap_or(3000);

        let base_url =
            env::var("BASE_URL").unwrap_or_else(|_| format!("http://{}:{}", host, port));

        Self {
            host,
            port,
            database_path: env::var("DATABASE_PATH")
                .unwrap_or_else(|_| "resonate.db".to_string()),
            base_url,
            asset_base_url: env::var("ASSET_BASE_URL")
                .unwrap_or_else(|_| "https://cdn.resonate.app".to_string()),
            token_key: env::var("DOWNLOAD_TOKEN_KEY").ok(),
            webhook_secret: env::var("PAYMENT_WEBHOOK_SECRET").ok(),
            resend_api_key: env::var("RESEND_API_KEY").ok(),
            email_from: env::var("EMAIL_FROM")
                .unwrap_or_else(|_| "Resonate <downloads@resonate.app>".to_string()),
            dev_mode,
        }
    }

    pub fn addr(&self) -> String {
        format!("{}:{}", self.host, self.port)
    }
}
