pub mod api;
pub mod config;
pub mod core_state;
pub mod models;
pub mod db;
pub mod pipeline;

use std::sync::Arc;
use tracing_subscriber::EnvFilter;

#[derive(Debug, thiserror::Error)]
pub enum StartupError {
    #[error("Configuration error: {0}")]
    Config(#[from] config::ConfigError),

    #[error("Initialization failed: {0}")]
    Core(#[from] core_state::CoreError),

    #[error("Server error: {0}")]
    Server(String),

    #[error("Signal handling failed: {0}")]
    Signal(#[from] std::io::Error),
}

/// Start the service and run until Ctrl-C.
pub async fn run() -> Result<(), StartupError> {
    // Initialize tracing
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| EnvFilter::new(config::default_log_filter())),
        )
        .init();

    let app_config = config::AppConfig::from_env()?;
    tracing::info!(
        data_dir = %app_config.data_dir.display(),
        bind = %app_config.bind_addr,
        "{} starting v{}",
        config::APP_NAME,
        config::APP_VERSION
    );

    let core = Arc::new(core_state::CoreState::new(&app_config));
    let init = core.clone();
    tokio::task::spawn_blocking(move || init.initialize())
        .await
        .map_err(|e| StartupError::Server(format!("initialization task failed: {e}")))??;

    let mut server = api::start_api_server(core, app_config.bind_addr)
        .await
        .map_err(StartupError::Server)?;

    tokio::signal::ctrl_c().await?;
    tracing::info!("Interrupt received, shutting down");
    server.shutdown();
    server.stopped().await;
    Ok(())
}
