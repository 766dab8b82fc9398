use anyhow::Result;
use clap::Parser;
use std::path::PathBuf;
use std::sync::Arc;
use tracing::info;

use pricebot::config;
use pricebot::db;
use pricebot::server::{self, AppState, RunLocks};
use pricebot::shopify::ShopifyClient;

#[derive(Debug, Parser)]
#[command(author, version, about)]
struct Args {
    /// Path to YAML config file
    #[arg(long, default_value = "config.yaml")]
    config: PathBuf,
}

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
        .with_target(false)
        .compact()
        .init();

    let args = Args::parse();
    let cfg = config::load(Some(&args.config))?;
    cfg.ensure_dirs()?;

    let database_url = std::env::var("DATABASE_URL")
        .unwrap_or_else(|_| format!("sqlite://{}/pricebot.db", cfg.app.data_dir));

    let pool = db::init_pool(&database_url).await?;
    db::run_migrations(&pool).await?;

    let client = ShopifyClient::new(
        &cfg.shopify.shop,
        cfg.shopify.access_token.clone(),
        &cfg.shopify.api_version,
    )?;

    let bind_addr = cfg.app.bind_addr.clone();
    let state = AppState {
        pool,
        admin: Arc::new(client),
        cfg: Arc::new(cfg),
        runs: RunLocks::default(),
    };
    let app = server::router(state);

    let listener = tokio::net::TcpListener::bind(&bind_addr).await?;
    info!(addr = %bind_addr, "starting price adjustment service");
    axum::serve(listener, app).await?;

    Ok(())
}
