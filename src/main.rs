//! CAD Engine Server: STEP/IGES to STL conversion service.
//!
//! Main entry point that loads configuration, sets up logging, and runs the
//! HTTP server.

use tracing_subscriber::{EnvFilter, fmt};

use cadengine_core::config::AppConfig;
use cadengine_core::result::AppResult;

#[tokio::main]
async fn main() {
    let config = match load_configuration() {
        Ok(c) => c,
        Err(e) => {
            eprintln!("Failed to load configuration: {}", e);
            std::process::exit(1);
        }
    };

    init_logging(&config);
    log_startup(&config);

    if let Err(e) = cadengine_api::run_server(config).await {
        tracing::error!("Server error: {}", e);
        std::process::exit(1);
    }
}

/// Load configuration from `config/` and `CADENGINE_*` environment variables.
fn load_configuration() -> AppResult<AppConfig> {
    let env = std::env::var("CADENGINE_ENV").unwrap_or_else(|_| "development".to_string());
    AppConfig::load(&env)
}

/// Initialize tracing/logging
fn init_logging(config: &AppConfig) {
    let filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(&config.logging.level));

    match config.logging.format.as_str() {
        "json" => {
            fmt()
                .json()
                .with_env_filter(filter)
                .with_target(true)
                .with_thread_ids(true)
                .init();
        }
        _ => {
            fmt()
                .pretty()
                .with_env_filter(filter)
                .with_target(true)
                .init();
        }
    }
}

/// Log the effective configuration, without anything sensitive.
fn log_startup(config: &AppConfig) {
    tracing::info!(
        version = env!("CARGO_PKG_VERSION"),
        environment = %config.environment,
        "CAD Engine starting"
    );
    tracing::info!(
        bind = %config.server.bind_address(),
        max_upload_mb = config.limits.max_upload_mb(),
        rate_limit_per_minute = config.limits.rate_limit_per_minute,
        rate_limit_enabled = config.limits.rate_limit_enabled,
        cors_origins = ?config.server.cors.allowed_origins,
        temp_dir = %config.storage.temp_dir.display(),
        "Server settings"
    );
    tracing::info!(
        engine = %config.kernel.engine_name,
        command = %config.kernel.command,
        timeout_secs = config.kernel.timeout_seconds,
        max_concurrent = config.kernel.max_concurrent_conversions,
        linear_deflection = config.mesh.linear_deflection,
        angular_deflection = config.mesh.angular_deflection,
        ascii = config.mesh.ascii,
        "Conversion settings"
    );
}
