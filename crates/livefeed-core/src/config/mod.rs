//! Application configuration schemas.
//!
//! All configuration structs are deserialized via the `config` crate from
//! TOML files plus `LIVEFEED__*` environment variables. Each sub-module
//! represents a logical configuration section.

pub mod app;
pub mod auth;
pub mod logging;
pub mod realtime;

use serde::{Deserialize, Serialize};

pub use self::app::{CorsConfig, ServerConfig};
pub use self::auth::AuthConfig;
pub use self::logging::LoggingConfig;
pub use self::realtime::RealtimeConfig;

use crate::error::AppError;

/// Root application configuration.
///
/// This struct is the top-level deserialization target for the merged
/// configuration (default.toml + environment overlay + environment variables).
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct AppConfig {
    /// HTTP/WebSocket server settings.
    #[serde(default)]
    pub server: ServerConfig,
    /// Token service settings.
    #[serde(default)]
    pub auth: AuthConfig,
    /// Real-time engine settings.
    #[serde(default)]
    pub realtime: RealtimeConfig,
    /// Logging settings.
    #[serde(default)]
    pub logging: LoggingConfig,
}

impl AppConfig {
    /// Load configuration from TOML files and the environment.
    ///
    /// Merges `config/default` with an environment-specific overlay
    /// `config/{env}` and environment variables prefixed with `LIVEFEED__`,
    /// then validates the result.
    pub fn load(env: &str) -> Result<Self, AppError> {
        let config = config::Config::builder()
            .add_source(config::File::with_name("config/default").required(false))
            .add_source(config::File::with_name(&format!("config/{env}")).required(false))
            .add_source(
                config::Environment::with_prefix("LIVEFEED")
                    .prefix_separator("__")
                    .separator("__")
                    .try_parsing(true),
            )
            .build()
            .map_err(|e| AppError::configuration(format!("Failed to build config: {e}")))?;

        let parsed: Self = config
            .try_deserialize()
            .map_err(|e| AppError::configuration(format!("Failed to deserialize config: {e}")))?;

        parsed.validate()?;
        Ok(parsed)
    }

    /// Checks cross-field constraints that serde defaults cannot express.
    pub fn validate(&self) -> Result<(), AppError> {
        if self.auth.jwt_secret.trim().is_empty() {
            return Err(AppError::configuration("auth.jwt_secret must not be empty"));
        }
        if self.auth.access_ttl_minutes == 0 || self.auth.refresh_ttl_hours == 0 {
            return Err(AppError::configuration("token TTLs must be positive"));
        }
        if self.auth.sweep_interval_seconds == 0 {
            return Err(AppError::configuration(
                "auth.sweep_interval_seconds must be positive",
            ));
        }

        let rt = &self.realtime;
        if rt.heartbeat_interval_seconds == 0 {
            return Err(AppError::configuration(
                "realtime.heartbeat_interval_seconds must be positive",
            ));
        }
        // A live peer must get at least two keepalives before it can go stale.
        if rt.stale_timeout_seconds <= rt.heartbeat_interval_seconds.saturating_mul(2) {
            return Err(AppError::configuration(format!(
                "realtime.stale_timeout_seconds ({}) must exceed twice the heartbeat interval ({})",
                rt.stale_timeout_seconds, rt.heartbeat_interval_seconds
            )));
        }
        if rt.send_timeout_seconds == 0 {
            return Err(AppError::configuration(
                "realtime.send_timeout_seconds must be positive",
            ));
        }
        if rt.channel_buffer_size == 0 || rt.change_feed_capacity == 0 {
            return Err(AppError::configuration(
                "realtime buffer capacities must be positive",
            ));
        }

        Ok(())
    }
}
