use anyhow::{anyhow, Context, Result};
use mongodb::bson::doc;
use mongodb::{Client, Database};
use tracing::info;

use crate::config::AppConfig;

/// Database used when the connection string does not name one.
const DEFAULT_DB_NAME: &str = "momentum";

/// Open the MongoDB connection for the configured environment.
///
/// Exactly one attempt is made; the caller treats failure as fatal and the
/// listener is never bound without a live connection. Reconnects after a
/// transient drop are the driver's responsibility, not this layer's.
pub async fn connect(config: &AppConfig) -> Result<Client> {
    let uri = config.mongodb_uri.as_deref().ok_or_else(|| {
        anyhow!(
            "no MongoDB connection string configured: set {} for {} mode",
            config.environment.mongodb_uri_var(),
            config.environment
        )
    })?;

    info!(environment = %config.environment, "Connecting to MongoDB");

    let client = Client::with_uri_str(uri)
        .await
        .context("invalid MongoDB connection string")?;

    // The driver connects lazily; ping so an unreachable server fails
    // startup instead of the first request.
    client
        .database("admin")
        .run_command(doc! { "ping": 1 }, None)
        .await
        .context("failed to reach MongoDB")?;

    info!(environment = %config.environment, "Connected to MongoDB");

    Ok(client)
}

/// Handle to the application database named by the URI.
pub fn database(client: &Client) -> Database {
    client
        .default_database()
        .unwrap_or_else(|| client.database(DEFAULT_DB_NAME))
}

/// Close the connection, waiting for the driver to release its resources.
///
/// Called only after the HTTP listener has finished draining, so no handler
/// can run against a severed connection.
pub async fn close(client: Client) {
    client.shutdown().await;
    info!("MongoDB connection closed");
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::Environment;

    fn config_without_uri() -> AppConfig {
        AppConfig {
            port: 5000,
            environment: Environment::Production,
            client_url: "http://localhost:3000".to_string(),
            mongodb_uri: None,
        }
    }

    #[tokio::test]
    async fn test_connect_without_uri_fails() {
        let err = connect(&config_without_uri())
            .await
            .expect_err("connect must fail when no URI is configured");
        assert!(err.to_string().contains("MONGODB_URI_PROD"));
    }

    #[tokio::test]
    async fn test_database_falls_back_to_default_name() {
        // Client construction only parses the URI; nothing is dialed here.
        let client = Client::with_uri_str("mongodb://localhost:27017")
            .await
            .expect("client should parse a bare URI");
        assert_eq!(database(&client).name(), DEFAULT_DB_NAME);

        let client = Client::with_uri_str("mongodb://localhost:27017/productivity")
            .await
            .expect("client should parse a URI with a database");
        assert_eq!(database(&client).name(), "productivity");
    }
}
