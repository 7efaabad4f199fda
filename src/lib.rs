pub mod auth;
pub mod config;
pub mod content;
pub mod database;
pub mod mail;
pub mod server;
pub mod utils;

// Re-export important types and functions for easier access
pub use auth::{generate_session_token, verify_session_token};
pub use config::env_config::EnvConfig;
pub use content::PostStore;
pub use database::DatabaseClient;
pub use mail::{Mailer, SmtpMailer};
pub use server::SiteServer;
