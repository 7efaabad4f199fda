use std::env;
use thiserror::Error;
use tracing::warn;

#[derive(Error, Debug)]
pub enum EnvConfigError {
    #[error("Missing required environment variable: {0}")]
    MissingEnv(String),

    #[error("Invalid environment variable value for {0}: {1}")]
    InvalidEnvValue(String, String),
}

/// SMTP relay settings. When absent the server runs with outbound mail
/// disabled and logs a warning for every skipped delivery.
#[derive(Debug, Clone)]
pub struct SmtpConfig {
    pub host: String,
    pub port: u16,
    pub username: String,
    pub password: String,
    pub from_address: String,
}

#[derive(Debug, Clone)]
pub struct EnvConfig {
    // Core settings
    pub log_level: String,
    pub http_port: u16,

    // Site identity
    pub site_name: String,
    pub base_url: String,

    // Admin credentials & session signing
    pub admin_email: String,
    pub admin_key: String,
    pub session_secret: String,

    // Storage
    pub db_url: String,
    pub posts_dir: String,

    // Outbound mail
    pub smtp: Option<SmtpConfig>,
}

impl EnvConfig {
    pub fn from_env() -> Result<Self, EnvConfigError> {
        let log_level = env::var("PLUME_LOG_LEVEL").unwrap_or_else(|_| "info".to_string());
        let http_port = Self::parse_port_with_default("PLUME_HTTP_PORT", 8080)?;

        let site_name = env::var("PLUME_SITE_NAME").unwrap_or_else(|_| "Plumehost".to_string());
        let base_url = env::var("PLUME_BASE_URL")
            .unwrap_or_else(|_| format!("http://localhost:{}", http_port));

        let admin_email = Self::require_env("PLUME_ADMIN_EMAIL")?;
        let admin_key = Self::require_env("PLUME_ADMIN_KEY")?;

        // The session codec signs with this value; an empty secret would let
        // anyone mint valid tokens, so it is rejected at startup rather than
        // inside the codec.
        let session_secret = Self::require_env("PLUME_SESSION_SECRET")?;
        if session_secret.trim().is_empty() {
            return Err(EnvConfigError::InvalidEnvValue(
                "PLUME_SESSION_SECRET".to_string(),
                "Secret must not be empty".to_string(),
            ));
        }

        let db_url = Self::require_env("PLUME_DB_URL")?;
        let posts_dir = env::var("PLUME_POSTS_DIR").unwrap_or_else(|_| "content/posts".to_string());

        let smtp = Self::parse_smtp()?;
        if smtp.is_none() {
            warn!("PLUME_SMTP_HOST is not set; outbound mail is disabled");
        }

        Ok(EnvConfig {
            log_level,
            http_port,
            site_name,
            base_url,
            admin_email,
            admin_key,
            session_secret,
            db_url,
            posts_dir,
            smtp,
        })
    }

    fn parse_smtp() -> Result<Option<SmtpConfig>, EnvConfigError> {
        let host = match env::var("PLUME_SMTP_HOST") {
            Ok(host) => host,
            Err(_) => return Ok(None),
        };

        let port = Self::parse_port_with_default("PLUME_SMTP_PORT", 587)?;
        let username = Self::require_env("PLUME_SMTP_USERNAME")?;
        let password = Self::require_env("PLUME_SMTP_PASSWORD")?;
        let from_address = env::var("PLUME_SMTP_FROM").unwrap_or_else(|_| username.clone());

        Ok(Some(SmtpConfig {
            host,
            port,
            username,
            password,
            from_address,
        }))
    }

    fn require_env(var_name: &str) -> Result<String, EnvConfigError> {
        env::var(var_name).map_err(|_| EnvConfigError::MissingEnv(var_name.to_string()))
    }

    fn parse_port_with_default(var_name: &str, default: u16) -> Result<u16, EnvConfigError> {
        match env::var(var_name) {
            Ok(val) => val.parse::<u16>().map_err(|_| {
                EnvConfigError::InvalidEnvValue(
                    var_name.to_string(),
                    format!("Expected a valid port number (0-65535). Got: {}", val),
                )
            }),
            Err(_) => Ok(default),
        }
    }
}
