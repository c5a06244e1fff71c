use std::env;
use std::fmt;

use anyhow::{Context, Result};
use axum::http::HeaderValue;

/// Port the server listens on when `PORT` is unset.
pub const DEFAULT_PORT: u16 = 5000;

/// Origin allowed by CORS when `CLIENT_URL` is unset.
pub const DEFAULT_CLIENT_URL: &str = "http://localhost:3000";

/// Environment mode the server runs in.
///
/// Production mode enables HSTS, serves the built frontend with an SPA
/// fallback, and strips internals from error responses.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Environment {
    Development,
    Production,
}

impl Environment {
    pub fn is_production(self) -> bool {
        matches!(self, Self::Production)
    }

    /// Name of the connection-string variable this mode reads.
    pub fn mongodb_uri_var(self) -> &'static str {
        match self {
            Self::Development => "MONGODB_URI",
            Self::Production => "MONGODB_URI_PROD",
        }
    }
}

impl fmt::Display for Environment {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            Self::Development => "development",
            Self::Production => "production",
        })
    }
}

/// Application configuration, resolved once at startup.
///
/// Every environment-mode branch in the codebase (CORS origin, security
/// headers, error verbosity, static serving, connection-string selection)
/// consults this one value.
#[derive(Debug, Clone)]
pub struct AppConfig {
    pub port: u16,
    pub environment: Environment,
    pub client_url: String,
    /// Connection string for the selected environment mode. `None` when the
    /// corresponding variable is unset; the connection attempt reports that
    /// downstream.
    pub mongodb_uri: Option<String>,
}

impl AppConfig {
    /// Read configuration from process environment variables.
    ///
    /// Missing optional variables fall back to defaults; only an unparseable
    /// `PORT` is an error here.
    pub fn from_env() -> Result<Self> {
        // APP_ENV wins when both are set; NODE_ENV is honored so existing
        // deployments keep their mode.
        let environment = match env::var("APP_ENV")
            .or_else(|_| env::var("NODE_ENV"))
            .as_deref()
        {
            Ok("production") => Environment::Production,
            _ => Environment::Development,
        };

        let port = match env::var("PORT") {
            Ok(raw) => raw
                .parse()
                .with_context(|| format!("invalid PORT value: {raw}"))?,
            Err(_) => DEFAULT_PORT,
        };

        let client_url =
            env::var("CLIENT_URL").unwrap_or_else(|_| DEFAULT_CLIENT_URL.to_string());
        // The origin ends up in CORS response headers; reject values that can
        // never be sent instead of serving an empty allow-list.
        client_url
            .parse::<HeaderValue>()
            .with_context(|| format!("invalid CLIENT_URL value: {client_url}"))?;

        let mongodb_uri = env::var(environment.mongodb_uri_var()).ok();

        Ok(Self {
            port,
            environment,
            client_url,
            mongodb_uri,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_environment_display() {
        assert_eq!(Environment::Development.to_string(), "development");
        assert_eq!(Environment::Production.to_string(), "production");
        assert!(Environment::Production.is_production());
        assert!(!Environment::Development.is_production());
    }

    #[test]
    fn test_uri_var_follows_environment() {
        assert_eq!(Environment::Development.mongodb_uri_var(), "MONGODB_URI");
        assert_eq!(Environment::Production.mongodb_uri_var(), "MONGODB_URI_PROD");
    }

    // Env-var mutations live in a single test so parallel test threads
    // cannot observe each other's changes.
    #[test]
    fn test_from_env() {
        env::remove_var("APP_ENV");
        env::remove_var("NODE_ENV");
        env::remove_var("PORT");
        env::remove_var("CLIENT_URL");
        env::remove_var("MONGODB_URI");
        env::remove_var("MONGODB_URI_PROD");

        let config = AppConfig::from_env().expect("defaults should resolve");
        assert_eq!(config.port, DEFAULT_PORT);
        assert_eq!(config.environment, Environment::Development);
        assert_eq!(config.client_url, DEFAULT_CLIENT_URL);
        assert!(config.mongodb_uri.is_none());

        env::set_var("APP_ENV", "production");
        env::set_var("PORT", "8443");
        env::set_var("CLIENT_URL", "https://app.example.com");
        env::set_var("MONGODB_URI", "mongodb://dev:27017/momentum");
        env::set_var("MONGODB_URI_PROD", "mongodb://prod:27017/momentum");

        let config = AppConfig::from_env().expect("production config should resolve");
        assert_eq!(config.port, 8443);
        assert_eq!(config.environment, Environment::Production);
        assert_eq!(config.client_url, "https://app.example.com");
        // Production mode must read MONGODB_URI_PROD, not MONGODB_URI.
        assert_eq!(
            config.mongodb_uri.as_deref(),
            Some("mongodb://prod:27017/momentum")
        );

        env::set_var("PORT", "not-a-port");
        assert!(AppConfig::from_env().is_err());
        env::remove_var("PORT");

        // NODE_ENV alone selects the mode...
        env::remove_var("APP_ENV");
        env::set_var("NODE_ENV", "production");
        let config = AppConfig::from_env().expect("NODE_ENV config should resolve");
        assert_eq!(config.environment, Environment::Production);
        assert_eq!(
            config.mongodb_uri.as_deref(),
            Some("mongodb://prod:27017/momentum")
        );

        // ...but APP_ENV wins when both are set.
        env::set_var("APP_ENV", "development");
        let config = AppConfig::from_env().expect("config should resolve");
        assert_eq!(config.environment, Environment::Development);

        // An origin that cannot be a header value fails startup.
        env::set_var("CLIENT_URL", "http://bad\norigin");
        assert!(AppConfig::from_env().is_err());

        env::remove_var("APP_ENV");
        env::remove_var("NODE_ENV");
        env::remove_var("CLIENT_URL");
        env::remove_var("MONGODB_URI");
        env::remove_var("MONGODB_URI_PROD");
    }

    #[test]
    fn test_unknown_app_env_falls_back_to_development() {
        // Unknown values are treated as development rather than rejected.
        let environment = match Some("staging") {
            Some("production") => Environment::Production,
            _ => Environment::Development,
        };
        assert_eq!(environment, Environment::Development);
    }
}
