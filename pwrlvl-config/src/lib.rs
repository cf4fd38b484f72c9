//! # pwrlvl Configuration System
//!
//! Hierarchical configuration for the pwrlvl control plane.
//!
//! ## Features
//! - **Unified Configuration**: one tree shared by the server, the event bus and the orchestrator
//! - **Validation**: runtime validation of ports, sizes and interface names
//! - **Environment Awareness**: `PWRLVL_*` variables override file settings

#![warn(unsafe_code)]
#![deny(rustdoc::broken_intra_doc_links)]

use std::path::{Path, PathBuf};

use figment::{
    providers::{Env, Format, Serialized, Yaml},
    Figment,
};
use serde::{Deserialize, Serialize};
use validator::Validate;

mod core;
mod error;
mod loot;
mod server;
mod telemetry;
mod tools;
pub mod validation;

pub use self::core::EventBusConfig;
pub use self::core::OrchestratorConfig;
pub use error::ConfigError;
pub use loot::LootConfig;
pub use server::ServerConfig;
pub use telemetry::TelemetryConfig;
pub use tools::ToolsConfig;

/// Default location of the base configuration file.
pub const DEFAULT_CONFIG_FILE: &str = "config/pwrlvl.yaml";

/// Top‑level configuration container for all pwrlvl components.
#[derive(Debug, Serialize, Deserialize, Validate, Default, Clone)]
#[serde(default)]
pub struct PwrlvlConfig {
    /// HTTP listener and protocol limits.
    #[validate(nested)]
    pub server: ServerConfig,

    /// Event log and subscriber queue sizing.
    #[validate(nested)]
    pub events: EventBusConfig,

    /// Task orchestration timing.
    #[validate(nested)]
    pub orchestrator: OrchestratorConfig,

    /// Artifact directories.
    #[validate(nested)]
    pub loot: LootConfig,

    /// External tool lookup.
    #[validate(nested)]
    pub tools: ToolsConfig,

    /// Logging output.
    #[validate(nested)]
    pub telemetry: TelemetryConfig,
}

impl PwrlvlConfig {
    /// Load configuration from default files and environment.
    ///
    /// Hierarchy:
    /// 1. Default Values
    /// 2. `config/pwrlvl.yaml` - Base settings. If missing, defaults are used.
    /// 3. `config/<environment>.yaml` - Environment‑specific overrides (`PWRLVL_ENV`).
    /// 4. `PWRLVL_*` environment variables.
    pub fn load() -> Result<Self, ConfigError> {
        Self::load_layered(Path::new(DEFAULT_CONFIG_FILE))
    }

    /// Same hierarchy as [`PwrlvlConfig::load`] with an explicit base file.
    pub fn load_layered(base: &Path) -> Result<Self, ConfigError> {
        let mut figment = Figment::from(Serialized::defaults(PwrlvlConfig::default()));

        if base.exists() {
            figment = figment.merge(Yaml::file(base));
        }

        let env = std::env::var("PWRLVL_ENV").unwrap_or_else(|_| "production".into());
        let env_file = format!("config/{}.yaml", env);
        if Path::new(&env_file).exists() {
            figment = figment.merge(Yaml::file(env_file));
        }

        figment
            .merge(Env::prefixed("PWRLVL_").split("__"))
            .extract()
            .map_err(ConfigError::from)
            .and_then(|config: Self| {
                config.validate()?;
                Ok(config)
            })
    }

    /// Load configuration from a specific path, failing if it does not exist.
    pub fn load_from_path<P: AsRef<Path>>(path: P) -> Result<Self, ConfigError> {
        let path = path.as_ref();
        if !path.exists() {
            return Err(ConfigError::FileNotFound(PathBuf::from(path)));
        }

        Figment::from(Serialized::defaults(PwrlvlConfig::default()))
            .merge(Yaml::file(path))
            .merge(Env::prefixed("PWRLVL_").split("__"))
            .extract()
            .map_err(ConfigError::from)
            .and_then(|config: Self| {
                config.validate()?;
                Ok(config)
            })
    }

    /// Render the effective configuration as YAML.
    pub fn to_yaml(&self) -> Result<String, ConfigError> {
        serde_yaml::to_string(self).map_err(|e| ConfigError::Render(e.to_string()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    #[test]
    fn full_config_validation() {
        let config = PwrlvlConfig::default();
        config.validate().expect("Default config should validate");
        assert_eq!(config.server.port, 9000);
        assert_eq!(config.events.log_capacity, 500);
        assert_eq!(config.events.subscriber_capacity, 200);
        assert_eq!(config.events.backfill, 50);
    }

    #[test]
    fn file_overrides_defaults() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        writeln!(file, "server:\n  port: 9100\nevents:\n  backfill: 10").unwrap();

        let config = PwrlvlConfig::load_from_path(file.path()).unwrap();
        assert_eq!(config.server.port, 9100);
        assert_eq!(config.events.backfill, 10);
        // untouched sections keep their defaults
        assert_eq!(config.orchestrator.grace_ms, 3000);
    }

    #[test]
    fn missing_file_is_reported() {
        let err = PwrlvlConfig::load_from_path("/nonexistent/pwrlvl.yaml").unwrap_err();
        assert!(matches!(err, ConfigError::FileNotFound(_)));
    }

    #[test]
    fn invalid_values_fail_validation() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        writeln!(file, "events:\n  log_capacity: 0").unwrap();

        let err = PwrlvlConfig::load_from_path(file.path()).unwrap_err();
        assert!(matches!(err, ConfigError::Validation(_)));
        assert!(err.to_string().contains("log_capacity"));
    }

    #[test]
    fn renders_yaml() {
        let yaml = PwrlvlConfig::default().to_yaml().unwrap();
        assert!(yaml.contains("port: 9000"));
    }
}
