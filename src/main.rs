use std::sync::Arc;

use clap::Parser;
use tower_http::trace::TraceLayer;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use resonate::config::Config;
use resonate::db::{create_pool, init_db, queries, AppState};
use resonate::handlers;
use resonate::lifecycle::LifecycleManager;
use resonate::models::{CreatePurchase, Tier};
use resonate::notify::Notifier;
use resonate::storage::ObjectStore;
use resonate::token::TokenKey;

#[derive(Parser, Debug)]
#[command(name = "resonate")]
#[command(about = "Purchase and secure-download backend for rendered audio-visualization videos")]
struct Cli {
    /// Print a fresh base64 download-token key and exit
    #[arg(long)]
    generate_token_key: bool,

    /// Seed the database with a completed dev purchase (dev mode only)
    #[arg(long)]
    seed: bool,

    /// Delete the database on exit (dev mode only, useful for fresh starts)
    #[arg(long)]
    ephemeral: bool,
}

fn seed_dev_data(state: &AppState) {
    let conn = state.db.get().expect("Failed to get db connection for seed");

    let purchase = queries::create_purchase(
        &conn,
        &CreatePurchase {
            tier: Tier::Personal,
            file_id: "rz_file_00000000000000000000000000000001".to_string(),
            account_id: None,
            email: Some("dev@example.com".to_string()),
        },
    )
    .expect("Failed to create seed purchase");

    let manager = LifecycleManager::from_state(state);
    manager
        .complete(&purchase.id, "seed-payment")
        .expect("Failed to complete seed purchase");

    let renewed = manager
        .renew_link(&purchase.id, 48)
        .expect("Failed to mint seed download link");

    if let resonate::lifecycle::RenewOutcome::Renewed { download_url, .. } = renewed {
        tracing::info!("Seeded purchase {}", purchase.id);
        tracing::info!("Seed download link: {}", download_url);
    }
}

#[tokio::main]
async fn main() {
    let cli = Cli::parse();

    if cli.generate_token_key {
        println!("{}", TokenKey::generate());
        return;
    }

    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "resonate=debug,tower_http=debug".into()),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();

    let config = Config::from_env();

    if config.dev_mode {
        tracing::info!("Running in DEVELOPMENT mode");
    }

    let token_key = match config.token_key.as_deref() {
        Some(encoded) => TokenKey::from_base64(encoded).expect("Invalid DOWNLOAD_TOKEN_KEY"),
        None if config.dev_mode => {
            tracing::warn!(
                "DOWNLOAD_TOKEN_KEY not set, using an ephemeral key; links die on restart"
            );
            TokenKey::from_base64(&TokenKey::generate()).expect("Generated key is valid")
        }
        None => {
            eprintln!("ERROR: DOWNLOAD_TOKEN_KEY must be set (try --generate-token-key)");
            std::process::exit(1);
        }
    };

    let webhook_secret = match config.webhook_secret.clone() {
        Some(secret) => secret,
        None if config.dev_mode => {
            tracing::warn!("PAYMENT_WEBHOOK_SECRET not set, using dev default");
            "dev-webhook-secret".to_string()
        }
        None => {
            eprintln!("ERROR: PAYMENT_WEBHOOK_SECRET must be set");
            std::process::exit(1);
        }
    };

    let db_pool = create_pool(&config.database_path).expect("Failed to create database pool");
    {
        let conn = db_pool.get().expect("Failed to get connection");
        init_db(&conn).expect("Failed to initialize database");
    }

    let notifier = Notifier::from_config(config.resend_api_key.as_deref(), &config.email_from);
    if matches!(notifier, Notifier::Noop) {
        tracing::info!("RESEND_API_KEY not set, license notifications disabled");
    }

    let state = AppState {
        db: db_pool,
        token_key,
        notifier: Arc::new(notifier),
        assets: ObjectStore::new(&config.asset_base_url),
        base_url: config.base_url.clone(),
        webhook_secret,
    };

    if cli.seed {
        if !config.dev_mode {
            tracing::warn!("--seed flag ignored: not in dev mode (set RESONATE_ENV=dev)");
        } else {
            seed_dev_data(&state);
        }
    }

    let app = handlers::router()
        .layer(TraceLayer::new_for_http())
        .with_state(state);

    let addr = config.addr();
    let listener = tokio::net::TcpListener::bind(&addr)
        .await
        .expect("Failed to bind to address");

    let cleanup_on_exit = cli.ephemeral && config.dev_mode;
    let db_path = config.database_path.clone();
    if cleanup_on_exit {
        tracing::info!("EPHEMERAL MODE: database will be deleted on exit");
    }

    tracing::info!("Resonate server listening on {}", addr);

    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await
        .expect("Failed to start server");

    if cleanup_on_exit {
        tracing::info!("Cleaning up ephemeral database...");
        if let Err(e) = std::fs::remove_file(&db_path) {
            tracing::warn!("Failed to remove {}: {}", db_path, e);
        }
        let _ = std::fs::remove_file(format!("{}-wal", db_path));
        let _ = std::fs::remove_file(format!("{}-shm", db_path));
    }
}

async fn shutdown_signal() {
    tokio::signal::ctrl_c()
        .await
        .expect("Failed to install Ctrl+C handler");
    tracing::info!("Shutdown signal received, stopping server...");
}
