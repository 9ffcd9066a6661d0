//! Concierge API server binary.
//!
//! Serves the session and push endpoints over HTTP, backed by PostgreSQL.

mod cleaner;

use std::sync::Arc;
use std::time::Duration;

use clap::Parser;
use concierge_api::AppState;
use concierge_api::config::ApiConfig;
use concierge_core::push::ChannelSet;
use concierge_core::push::web::VapidKeys;
use concierge_core::store::postgres::PgStore;
use sqlx::postgres::PgPoolOptions;
use tracing::{info, warn};

/// CLI arguments for the API server.
#[derive(Parser, Debug)]
#[command(name = "concierge_server", about = "Concierge session & push API server")]
struct Args {
    /// Address to listen on. Overrides `BIND_ADDR`.
    #[arg(long)]
    bind: Option<String>,

    /// PostgreSQL connection URL.
    #[arg(
        long,
        env = "DATABASE_URL",
        default_value = "postgres://localhost:5432/concierge"
    )]
    database_url: String,

    /// Maximum number of database connections in the pool.
    #[arg(long, default_value_t = 10)]
    max_connections: u32,

    /// Seconds between purges of long-expired refresh tokens.
    #[arg(long, default_value_t = cleaner::DEFAULT_CLEANUP_INTERVAL_SECS)]
    cleanup_interval_secs: u64,

    /// Print a fresh VAPID key pair as env lines and exit.
    #[arg(long, default_value_t = false)]
    generate_vapid_keys: bool,
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    dotenvy::dotenv().ok();

    tracing_subscriber::fmt()
        .with_writer(std::io::stderr)
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env().unwrap_or_else(|_| {
                tracing_subscriber::EnvFilter::new("info,concierge_api=debug,concierge_core=debug")
            }),
        )
        .init();

    let args = Args::parse();

    if args.generate_vapid_keys {
        let keys = VapidKeys::generate();
        println!("VAPID_PUBLIC_KEY={}", keys.public_key_base64url());
        println!("VAPID_PRIVATE_KEY={}", keys.private_key_base64url());
        return Ok(());
    }

    let mut config = ApiConfig::from_env()?;
    if let Some(bind) = args.bind {
        config.bind_addr = bind;
    }

    info!(bind_addr = %config.bind_addr, "starting concierge_server");
    info!(
        max_connections = args.max_connections,
        "configuring connection pool"
    );

    let pool = PgPoolOptions::new()
        .max_connections(args.max_connections)
        .acquire_timeout(Duration::from_secs(30))
        .connect(&args.database_url)
        .await?;
    let store = Arc::new(PgStore::new(pool));

    info!("running database migrations");
    store.migrate().await?;

    let http = reqwest::Client::builder()
        .timeout(config.push.dispatch.send_timeout)
        .build()?;
    let channels = ChannelSet::from_config(&config.push, http);
    info!(
        web = channels.web.is_some(),
        mobile = channels.mobile.is_some(),
        "push channels configured"
    );

    let state = AppState::new(store, &config.session, channels, &config.push.dispatch)?;
    if !state.sessions.rotates_on_use() {
        warn!("refresh token rotation is disabled");
    }

    let cleaner = cleaner::start_refresh_token_cleaner(
        state.sessions.clone(),
        Duration::from_secs(args.cleanup_interval_secs.max(1)),
    );

    let app = concierge_api::router(state);
    let listener = tokio::net::TcpListener::bind(&config.bind_addr).await?;
    info!(addr = %listener.local_addr()?, "REST API listening");

    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await?;

    cleaner.abort();
    info!("server stopped");
    Ok(())
}

async fn shutdown_signal() {
    if let Err(e) = tokio::signal::ctrl_c().await {
        warn!(error = %e, "failed to listen for shutdown signal");
        std::future::pending::<()>().await;
    }
    info!("shutdown signal received");
}
