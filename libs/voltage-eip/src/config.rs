//! Scanner configuration
//!
//! Loaded from a YAML, TOML or JSON file with `EIP_` prefixed environment
//! overrides. Nested keys are separated by a double underscore, e.g.
//! `EIP_SESSION__HOST=192.168.1.10`.

use std::collections::BTreeMap;
use std::path::Path;
use std::time::Duration;

use figment::{
    providers::{Env, Format, Json, Serialized, Toml, Yaml},
    Figment,
};
use serde::{Deserialize, Serialize};

use crate::connection_manager::ConnectionParameters;
use crate::constants::{DEFAULT_TIMEOUT, EXPLICIT_PORT, IMPLICIT_PORT};
use crate::error::{EipError, Result};

/// Environment variable prefix for overrides
pub const ENV_PREFIX: &str = "EIP_";

/// Target device session
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct SessionConfig {
    pub host: String,
    pub port: u16,
    /// Response timeout in milliseconds
    pub timeout_ms: u64,
}

impl Default for SessionConfig {
    fn default() -> Self {
        Self {
            host: "127.0.0.1".to_string(),
            port: EXPLICIT_PORT,
            timeout_ms: DEFAULT_TIMEOUT.as_millis() as u64,
        }
    }
}

impl SessionConfig {
    pub fn timeout(&self) -> Duration {
        Duration::from_millis(self.timeout_ms)
    }
}

/// Cyclic data socket
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct ImplicitConfig {
    /// Local UDP port for connected data
    pub local_port: u16,
}

impl Default for ImplicitConfig {
    fn default() -> Self {
        Self {
            local_port: IMPLICIT_PORT,
        }
    }
}

/// Complete scanner configuration
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ScannerConfig {
    pub session: SessionConfig,
    pub implicit: ImplicitConfig,
    /// Named implicit connection definitions
    pub connections: BTreeMap<String, ConnectionParameters>,
}

impl ScannerConfig {
    /// Look up a connection definition by name
    pub fn connection(&self, name: &str) -> Result<&ConnectionParameters> {
        self.connections
            .get(name)
            .ok_or_else(|| EipError::config(format!("Connection '{name}' is not defined")))
    }

    /// Check every connection definition
    pub fn validate(&self) -> Result<()> {
        if self.session.host.is_empty() {
            return Err(EipError::config("Session host is empty"));
        }
        if self.session.timeout_ms == 0 {
            return Err(EipError::config("Session timeout must be positive"));
        }
        for (name, params) in &self.connections {
            params
                .validate()
                .map_err(|e| EipError::config(format!("Connection '{name}': {e}")))?;
        }
        Ok(())
    }
}

/// Load configuration from defaults, an optional file and the environment
///
/// Priority (highest to lowest):
/// 1. Environment variables (`EIP_` prefixed)
/// 2. Config file
/// 3. Default values
pub fn load_config(path: Option<&Path>) -> Result<ScannerConfig> {
    load_with_prefix(path, ENV_PREFIX)
}

/// Load configuration from a specific file, without environment overrides
pub fn load_config_from_file<P: AsRef<Path>>(path: P) -> Result<ScannerConfig> {
    let figment = Figment::from(Serialized::defaults(ScannerConfig::default()));
    let config: ScannerConfig = with_file(figment, path.as_ref())?.extract()?;
    config.validate()?;
    Ok(config)
}

fn load_with_prefix(path: Option<&Path>, prefix: &str) -> Result<ScannerConfig> {
    let mut figment = Figment::from(Serialized::defaults(ScannerConfig::default()));
    if let Some(path) = path {
        figment = with_file(figment, path)?;
    }
    let config: ScannerConfig = figment
        .merge(Env::prefixed(prefix).split("__"))
        .extract()?;
    config.validate()?;
    Ok(config)
}

fn with_file(figment: Figment, path: &Path) -> Result<Figment> {
    if !path.exists() {
        return Err(EipError::config(format!(
            "Config file not found: {}",
            path.display()
        )));
    }
    let extension = path
        .extension()
        .and_then(|s| s.to_str())
        .ok_or_else(|| EipError::config("Config file must have an extension"))?;

    match extension {
        "toml" => Ok(figment.merge(Toml::file(path))),
        "yaml" | "yml" => Ok(figment.merge(Yaml::file(path))),
        "json" => Ok(figment.merge(Json::file(path))),
        _ => Err(EipError::config(format!(
            "Unsupported config file format: {extension}"
        ))),
    }
}
