//! Configuration management for jail
//!
//! Configuration is loaded with the following priority (highest to lowest):
//! 1. Builder overrides (CLI flags)
//! 2. Environment variables (JAIL_CELL__STOP_TIMEOUT_MS, etc.)
//! 3. Config file (--config, JAIL_CONFIG_PATH, ./jail.toml or ~/.config/jail/config.toml)
//! 4. Built-in defaults
//!
//! # Example Config File (jail.toml)
//!
//! ```toml
//! [cell]
//! stop_timeout_ms = 1000
//! thread_stack_size = 16777216
//! max_call_depth = 200
//!
//! [fetch]
//! timeout_ms = 30000
//! user_agent = "jail/0.1"
//! ```
//!
//! # Environment Variables
//!
//! Every value can be set with the JAIL_ prefix and `__` between section and key:
//! - JAIL_CELL__STOP_TIMEOUT_MS
//! - JAIL_CELL__MAX_CALL_DEPTH
//! - JAIL_FETCH__TIMEOUT_MS
//! - etc.

use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use std::env;
use std::path::{Path, PathBuf};
use std::time::Duration;

use crate::interpreter::DEFAULT_MAX_CALL_DEPTH;

const ENV_PREFIX: &str = "JAIL";

/// Root configuration structure
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Config {
    #[serde(default)]
    pub cell: CellConfig,

    #[serde(default)]
    pub fetch: FetchConfig,
}

/// Per-cell settings
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CellConfig {
    /// How long `stop` waits for the loop thread
    #[serde(default = "default_stop_timeout_ms")]
    pub stop_timeout_ms: u64,

    /// Stack size of the loop thread in bytes
    #[serde(default = "default_thread_stack_size")]
    pub thread_stack_size: usize,

    /// Call depth at which a script faults
    #[serde(default = "default_max_call_depth")]
    pub max_call_depth: usize,
}

/// Settings for the `fetch` binding
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FetchConfig {
    /// Whole-request timeout
    #[serde(default = "default_fetch_timeout_ms")]
    pub timeout_ms: u64,

    #[serde(default = "default_user_agent")]
    pub user_agent: String,
}

// Default value functions for serde
fn default_stop_timeout_ms() -> u64 {
    1000
}
fn default_thread_stack_size() -> usize {
    16 * 1024 * 1024
}
fn default_max_call_depth() -> usize {
    DEFAULT_MAX_CALL_DEPTH
}
fn default_fetch_timeout_ms() -> u64 {
    30_000
}
fn default_user_agent() -> String {
    format!("jail/{}", env!("CARGO_PKG_VERSION"))
}

impl Default for CellConfig {
    fn default() -> Self {
        Self {
            stop_timeout_ms: default_stop_timeout_ms(),
            thread_stack_size: default_thread_stack_size(),
            max_call_depth: default_max_call_depth(),
        }
    }
}

impl CellConfig {
    pub fn stop_timeout(&self) -> Duration {
        Duration::from_millis(self.stop_timeout_ms)
    }
}

impl Default for FetchConfig {
    fn default() -> Self {
        Self {
            timeout_ms: default_fetch_timeout_ms(),
            user_agent: default_user_agent(),
        }
    }
}

impl FetchConfig {
    pub fn timeout(&self) -> Duration {
        Duration::from_millis(self.timeout_ms)
    }
}

impl Config {
    /// Load configuration with full priority chain:
    /// overrides → env vars → config file → defaults
    pub fn load() -> Result<Self> {
        Self::builder().build()
    }

    /// Load configuration from a specific file, without env overlays
    pub fn from_file<P: AsRef<Path>>(path: P) -> Result<Self> {
        let config_str = std::fs::read_to_string(path.as_ref())
            .with_context(|| format!("Failed to read config file: {:?}", path.as_ref()))?;

        let config: Config = toml::from_str(&config_str)
            .with_context(|| format!("Failed to parse config file: {:?}", path.as_ref()))?;

        config.validate()?;
        Ok(config)
    }

    /// Create a builder for constructing config with overrides
    pub fn builder() -> ConfigBuilder {
        ConfigBuilder::default()
    }

    /// Render as TOML
    pub fn to_toml(&self) -> Result<String> {
        toml::to_string_pretty(self).context("Failed to serialize config")
    }

    pub fn validate(&self) -> Result<()> {
        if self.cell.stop_timeout_ms == 0 {
            anyhow::bail!("cell.stop_timeout_ms must be greater than zero");
        }
        if self.cell.max_call_depth == 0 {
            anyhow::bail!("cell.max_call_depth must be greater than zero");
        }
        Ok(())
    }
}

/// Builder for constructing Config with optional overrides
#[derive(Default)]
pub struct ConfigBuilder {
    config_path: Option<PathBuf>,
    stop_timeout_ms: Option<u64>,
    max_call_depth: Option<usize>,
    fetch_timeout_ms: Option<u64>,
}

impl ConfigBuilder {
    /// Override the config file path
    pub fn config_path(mut self, path: Option<PathBuf>) -> Self {
        self.config_path = path;
        self
    }

    pub fn stop_timeout_ms(mut self, timeout: Option<u64>) -> Self {
        self.stop_timeout_ms = timeout;
        self
    }

    pub fn max_call_depth(mut self, depth: Option<usize>) -> Self {
        self.max_call_depth = depth;
        self
    }

    pub fn fetch_timeout_ms(mut self, timeout: Option<u64>) -> Self {
        self.fetch_timeout_ms = timeout;
        self
    }

    /// Build the final config by applying priority chain
    pub fn build(self) -> Result<Config> {
        // .env first, so real env vars override it
        let _ = dotenvy::dotenv();

        let mut layers = ::config::Config::builder();
        if let Some(path) = self.resolve_config_path()? {
            layers = layers.add_source(
                ::config::File::from(path.as_path()).format(::config::FileFormat::Toml),
            );
        }
        layers = layers.add_source(
            ::config::Environment::with_prefix(ENV_PREFIX)
                .prefix_separator("_")
                .separator("__")
                .try_parsing(true),
        );

        let mut config: Config = layers
            .build()
            .context("Failed to load configuration")?
            .try_deserialize()
            .context("Failed to parse configuration")?;

        self.apply_overrides(&mut config);
        config.validate()?;
        Ok(config)
    }

    /// Explicit path, then JAIL_CONFIG_PATH, then the default locations
    fn resolve_config_path(&self) -> Result<Option<PathBuf>> {
        if let Some(path) = &self.config_path {
            if !path.exists() {
                anyhow::bail!("Config file not found: {:?}", path);
            }
            return Ok(Some(path.clone()));
        }
        if let Ok(path_str) = env::var("JAIL_CONFIG_PATH") {
            let path = PathBuf::from(path_str);
            if !path.exists() {
                anyhow::bail!("Config file not found: {:?}", path);
            }
            return Ok(Some(path));
        }
        Ok(Self::find_config_file())
    }

    fn find_config_file() -> Option<PathBuf> {
        let project_config = PathBuf::from("jail.toml");
        if project_config.exists() {
            return Some(project_config);
        }

        if let Some(home) = env::var_os("HOME") {
            let user_config = PathBuf::from(home)
                .join(".config")
                .join("jail")
                .join("config.toml");
            if user_config.exists() {
                return Some(user_config);
            }
        }

        None
    }

    fn apply_overrides(&self, config: &mut Config) {
        if let Some(timeout) = self.stop_timeout_ms {
            config.cell.stop_timeout_ms = timeout;
        }
        if let Some(depth) = self.max_call_depth {
            config.cell.max_call_depth = depth;
        }
        if let Some(timeout) = self.fetch_timeout_ms {
            config.fetch.timeout_ms = timeout;
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_config() {
        let config = Config::default();

        assert_eq!(config.cell.stop_timeout(), Duration::from_secs(1));
        assert_eq!(config.cell.thread_stack_size, 16 * 1024 * 1024);
        assert_eq!(config.cell.max_call_depth, 200);
        assert_eq!(config.fetch.timeout_ms, 30_000);
        assert!(config.fetch.user_agent.starts_with("jail/"));
    }

    #[test]
    fn test_parse_toml() {
        let toml_str = r#"
            [cell]
            stop_timeout_ms = 250

            [fetch]
            user_agent = "probe"
        "#;

        let config: Config = toml::from_str(toml_str).unwrap();
        assert_eq!(config.cell.stop_timeout_ms, 250);
        assert_eq!(config.cell.max_call_depth, 200); // Default
        assert_eq!(config.fetch.user_agent, "probe");
        assert_eq!(config.fetch.timeout_ms, 30_000); // Default
    }

    #[test]
    fn test_builder_with_overrides() {
        let config = Config::builder()
            .stop_timeout_ms(Some(2500))
            .max_call_depth(Some(64))
            .build()
            .unwrap();

        assert_eq!(config.cell.stop_timeout_ms, 2500);
        assert_eq!(config.cell.max_call_depth, 64);
    }

    #[test]
    fn test_file_layer() {
        let path = env::temp_dir().join(format!("jail-config-{}.toml", uuid::Uuid::new_v4()));
        std::fs::write(&path, "[fetch]\ntimeout_ms = 1234\n").unwrap();

        let config = Config::builder()
            .config_path(Some(path.clone()))
            .build()
            .unwrap();
        assert_eq!(config.fetch.timeout_ms, 1234);
        assert_eq!(Config::from_file(&path).unwrap().fetch.timeout_ms, 1234);

        std::fs::remove_file(&path).unwrap();
    }

    #[test]
    fn test_missing_config_file_error() {
        let result = Config::builder()
            .config_path(Some(PathBuf::from("/definitely/not/here.toml")))
            .build();
        let error_msg = result.unwrap_err().to_string();
        assert!(error_msg.contains("Config file not found"));
    }

    #[test]
    fn test_env_overlay() {
        std::env::set_var("JAIL_FETCH__USER_AGENT", "from-env");
        let config = Config::builder().build();
        std::env::remove_var("JAIL_FETCH__USER_AGENT");

        assert_eq!(config.unwrap().fetch.user_agent, "from-env");
    }

    #[test]
    fn test_zero_values_rejected() {
        let err = Config::builder().stop_timeout_ms(Some(0)).build().unwrap_err();
        assert!(err.to_string().contains("stop_timeout_ms"));

        let err = Config::builder().max_call_depth(Some(0)).build().unwrap_err();
        assert!(err.to_string().contains("max_call_depth"));
    }

    #[test]
    fn test_round_trips_through_toml() {
        let config = Config::default();
        let rendered = config.to_toml().unwrap();
        assert!(rendered.contains("[cell]"));
        assert_eq!(toml::from_str::<Config>(&rendered).unwrap(), config);
    }
}
