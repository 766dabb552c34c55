//! services/api/src/config.rs
//!
//! Defines the application's configuration structure and loading logic.
//!
//! All configuration is loaded from environment variables at startup. The `.env`
//! file is used for local development.

use std::net::SocketAddr;
use tracing::Level;

/// Shortest accepted cookie signing secret, in bytes.
const MIN_SESSION_SECRET_LEN: usize = 32;

/// A custom error type for configuration loading failures.
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("Missing the environment variable {0}")]
    MissingVar(String),
    #[error("Invalid value for the environment variable {0}: {1}")]
    InvalidValue(String, String),
}

/// Credentials for one OAuth provider.
#[derive(Clone, Debug)]
pub struct OAuthClientConfig {
    pub client_id: String,
    pub client_secret: String,
}

/// Holds all configuration loaded from the environment at startup.
#[derive(Clone, Debug)]
pub struct Config {
    pub bind_address: SocketAddr,
    pub database_url: String,
    pub log_level: Level,
    /// Key for signing every cookie the site sets.
    pub session_secret: String,
    pub cms_url: String,
    pub cms_token: Option<String>,
    /// Without a key, outgoing mail is written to the log instead of sent.
    pub resend_api_key: Option<String>,
    pub mail_from: String,
    /// Public origin, used for links in emails and OAuth redirects.
    pub site_url: String,
    pub github: Option<OAuthClientConfig>,
    pub secure_cookies: bool,
}

impl Config {
    /// Loads configuration from environment variables.
    ///
    /// It will look for a `.env` file in the current directory for development,
    /// but this is skipped in test environments to ensure tests are hermetic.
    pub fn from_env() -> Result<Self, ConfigError> {
        // Only load from .env in non-test mode to avoid contamination.
        if !cfg!(test) {
            dotenvy::dotenv().ok();
        }

        // --- Load Server and Database Settings ---
        let bind_address_str =
            std::env::var("BIND_ADDRESS").unwrap_or_else(|_| "0.0.0.0:3000".to_string());
        let bind_address = bind_address_str.parse::<SocketAddr>().map_err(|e| {
            ConfigError::InvalidValue("BIND_ADDRESS".to_string(), e.to_string())
        })?;

        let database_url = required("DATABASE_URL")?;

        let log_level_str = std::env::var("RUST_LOG").unwrap_or_else(|_| "INFO".to_string());
        let log_level = log_level_str.parse::<Level>().map_err(|_| {
            ConfigError::InvalidValue(
                "RUST_LOG".to_string(),
                format!("'{}' is not a valid log level", log_level_str),
            )
        })?;

        // --- Load Cookie Settings ---
        let session_secret = required("SESSION_SECRET")?;
        if session_secret.len() < MIN_SESSION_SECRET_LEN {
            return Err(ConfigError::InvalidValue(
                "SESSION_SECRET".to_string(),
                format!("must be at least {MIN_SESSION_SECRET_LEN} bytes"),
            ));
        }
        let secure_cookies = match std::env::var("SECURE_COOKIES") {
            Ok(value) => value.parse::<bool>().map_err(|e| {
                ConfigError::InvalidValue("SECURE_COOKIES".to_string(), e.to_string())
            })?,
            Err(_) => true,
        };

        // --- Load Content Source Settings ---
        let cms_url = required("CMS_URL")?;
        let cms_token = std::env::var("CMS_TOKEN").ok();

        // --- Load Mail Settings ---
        let resend_api_key = std::env::var("RESEND_API_KEY").ok();
        let mail_from = std::env::var("MAIL_FROM")
            .unwrap_or_else(|_| "Killfeed <hello@killfeed.gg>".to_string());
        let site_url =
            std::env::var("SITE_URL").unwrap_or_else(|_| "http://localhost:3000".to_string());

        // --- Load OAuth Providers (as optional) ---
        let github = match (
            std::env::var("GITHUB_CLIENT_ID"),
            std::env::var("GITHUB_CLIENT_SECRET"),
        ) {
            (Ok(client_id), Ok(client_secret)) => Some(OAuthClientConfig {
                client_id,
                client_secret,
            }),
            _ => None,
        };

        Ok(Self {
            bind_address,
            database_url,
            log_level,
            session_secret,
            cms_url,
            cms_token,
            resend_api_key,
            mail_from,
            site_url: site_url.trim_end_matches('/').to_string(),
            github,
            secure_cookies,
        })
    }
}

fn required(name: &str) -> Result<String, ConfigError> {
    std::env::var(name).map_err(|_| ConfigError::MissingVar(name.to_string()))
}
