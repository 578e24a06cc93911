//! Configuration module for the engine
//!
//! Supports configuration via:
//! - TOML/YAML/JSON config files
//! - Environment variables (with DOCKHAND__ prefix)

use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};

use crate::models::AuthConfig;

/// Engine configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EngineConfig {
    /// Runtime address (`unix:///var/run/docker.sock`, `tcp://docker:2375`).
    /// Unset means local defaults, which honour `DOCKER_HOST`.
    #[serde(default)]
    pub docker_host: Option<String>,

    /// Request timeout handed to the runtime client, in seconds
    #[serde(default = "default_timeout")]
    pub timeout_seconds: u64,

    /// Grace period before a stopped container is killed, in seconds
    #[serde(default = "default_stop_timeout")]
    pub stop_timeout_seconds: i64,

    /// Log level (trace, debug, info, warn, error)
    #[serde(default = "default_log_level")]
    pub log_level: String,

    /// Credentials used for pull/push when the caller passes none
    #[serde(default)]
    pub registry_auth: Option<AuthConfig>,
}

fn default_timeout() -> u64 {
    120
}

fn default_stop_timeout() -> i64 {
    10
}

fn default_log_level() -> String {
    "info".to_string()
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            docker_host: None,
            timeout_seconds: default_timeout(),
            stop_timeout_seconds: default_stop_timeout(),
            log_level: default_log_level(),
            registry_auth: None,
        }
    }
}

impl EngineConfig {
    /// Load configuration from file and environment variables
    pub fn load() -> Result<Self> {
        // Try to load .env file if present
        let _ = dotenvy::dotenv();

        let config = config::Config::builder()
            .add_source(config::Config::try_from(&EngineConfig::default())?)
            .add_source(config::File::with_name("config/dockhand").required(false))
            .add_source(config::File::with_name("/etc/dockhand/config").required(false))
            .add_source(
                config::Environment::with_prefix("DOCKHAND")
                    .prefix_separator("__")
                    .separator("__")
                    .try_parsing(true),
            )
            .build()
            .context("Failed to build configuration")?;

        let engine_config: EngineConfig = config
            .try_deserialize()
            .context("Failed to deserialize configuration")?;

        engine_config.validate()?;

        Ok(engine_config)
    }

    /// Validate configuration values
    pub fn validate(&self) -> Result<()> {
        if self.timeout_seconds == 0 {
            anyhow::bail!("Runtime timeout cannot be 0");
        }

        if self.stop_timeout_seconds < 0 {
            anyhow::bail!("Stop timeout cannot be negative");
        }

        if let Some(host) = &self.docker_host {
            let supported = ["unix://", "tcp://", "http://"];
            if !supported.iter().any(|scheme| host.starts_with(scheme)) {
                anyhow::bail!("Unsupported docker_host {:?}, expected one of {:?}", host, supported);
            }
        }

        Ok(())
    }
}
