//! Application configuration schemas.
//!
//! Configuration is assembled by the `config` crate from serde defaults,
//! optional TOML files (`config/default.toml` and `config/<env>.toml`),
//! and `CADENGINE_`-prefixed environment variables, in increasing order
//! of precedence. Each sub-module represents a logical section.

pub mod app;
pub mod conversion;
pub mod logging;

use std::path::Path;

use serde::{Deserialize, Serialize};
use validator::Validate;

pub use self::app::{CorsConfig, ServerConfig};
pub use self::conversion::{KernelConfig, LimitsConfig, MeshConfig, StorageConfig};
pub use self::logging::LoggingConfig;

use crate::error::AppError;
use crate::result::AppResult;

/// Environment variable prefix for configuration overrides.
pub const ENV_PREFIX: &str = "CADENGINE";

/// Root application configuration.
#[derive(Debug, Clone, Default, Serialize, Deserialize, Validate)]
#[serde(default)]
pub struct AppConfig {
    /// Deployment environment name (`development`, `production`, ...).
    pub environment: String,
    /// HTTP server settings.
    #[validate(nested)]
    pub server: ServerConfig,
    /// Logging settings.
    pub logging: LoggingConfig,
    /// Upload size and rate limits.
    #[validate(nested)]
    pub limits: LimitsConfig,
    /// Temp storage settings.
    pub storage: StorageConfig,
    /// Mesh tolerances.
    #[validate(nested)]
    pub mesh: MeshConfig,
    /// Geometry kernel invocation.
    #[validate(nested)]
    pub kernel: KernelConfig,
}

impl AppConfig {
    /// Load configuration from `./config` for the given environment.
    pub fn load(env: &str) -> AppResult<Self> {
        Self::load_from(Path::new("config"), env)
    }

    /// Load configuration from TOML files in `dir`, overlaid with
    /// `CADENGINE_`-prefixed environment variables.
    ///
    /// Nested keys use `__` as separator (`CADENGINE_SERVER__PORT`);
    /// CORS origins accept a comma-separated list.
    pub fn load_from(dir: &Path, env: &str) -> AppResult<Self> {
        let config = config::Config::builder()
            .set_default("environment", env)?
            .add_source(config::File::from(dir.join("default")).required(false))
            .add_source(config::File::from(dir.join(env)).required(false))
            .add_source(
                config::Environment::with_prefix(ENV_PREFIX)
                    .prefix_separator("_")
                    .separator("__")
                    .list_separator(",")
                    .with_list_parse_key("server.cors.allowed_origins")
                    .try_parsing(true),
            )
            .build()
            .map_err(|e| AppError::configuration(format!("Failed to build config: {e}")))?;

        let config: Self = config
            .try_deserialize()
            .map_err(|e| AppError::configuration(format!("Failed to deserialize config: {e}")))?;

        config.ensure_valid()?;
        Ok(config)
    }

    /// Check value ranges; a zero limit or non-positive tolerance is rejected.
    pub fn ensure_valid(&self) -> AppResult<()> {
        self.validate()
            .map_err(|e| AppError::configuration(format!("Invalid configuration: {e}")))
    }

    /// Whether the service runs in development mode.
    pub fn is_development(&self) -> bool {
        self.environment == "development"
    }
}
