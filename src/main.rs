use anyhow::Result;
use tracing::{error, info};

use momentum_backend::{config::AppConfig, db, server};

#[tokio::main]
async fn main() {
    // Load environment variables from .env file if it exists
    dotenvy::dotenv().ok();

    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "momentum_backend=info,tower_http=info".into()),
        )
        .init();

    // The server must never come up without a live database connection, so
    // any startup failure is fatal.
    if let Err(e) = run().await {
        error!(error = %e, "Startup failed");
        std::process::exit(1);
    }
}

async fn run() -> Result<()> {
    let config = AppConfig::from_env()?;

    info!(
        port = config.port,
        environment = %config.environment,
        "Starting Momentum backend"
    );

    let client = db::connect(&config).await?;

    server::serve(config, client).await
}
