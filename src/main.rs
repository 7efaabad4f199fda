use std::env;
use std::process::exit;
use std::sync::Arc;

use tracing::{error, info};

mod auth;
mod config;
mod content;
mod database;
mod mail;
mod server;
mod utils;

use config::env_config::EnvConfig;
use database::DatabaseClient;
use mail::{Mailer, SmtpMailer};
use server::SiteServer;

#[tokio::main]
async fn main() {
    // Initialize logging
    initialize_logging();

    // Load environment configuration
    let env_config = match EnvConfig::from_env() {
        Ok(config) => config,
        Err(e) => {
            error!("Failed to load environment configuration: {}", e);
            exit(1);
        }
    };

    info!("Starting Plumehost v{}", env!("CARGO_PKG_VERSION"));

    let db_client = match DatabaseClient::new(&env_config.db_url).await {
        Ok(client) => client,
        Err(e) => {
            error!("Failed to initialize database: {:#}", e);
            exit(1);
        }
    };

    let mailer: Option<Arc<dyn Mailer>> = match &env_config.smtp {
        Some(smtp) => match SmtpMailer::new(smtp, &env_config.site_name) {
            Ok(mailer) => Some(Arc::new(mailer)),
            Err(e) => {
                error!("Failed to initialize SMTP transport: {:#}", e);
                exit(1);
            }
        },
        None => None,
    };

    let site_server = SiteServer::new(env_config, db_client, mailer);
    if let Err(e) = site_server.start().await {
        error!("Server failed: {:#}", e);
        exit(1);
    }
}

fn initialize_logging() {
    let log_level = env::var("PLUME_LOG_LEVEL").unwrap_or_else(|_| "info".to_string());

    let env_filter = tracing_subscriber::EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new(format!("plumehost={}", log_level)));

    tracing_subscriber::fmt()
        .with_env_filter(env_filter)
        .with_target(true)
        .init();
}
