//! Configuration system for the secrets bridge
//!
//! Every section is optional. The built-in defaults reproduce the stock
//! behaviour: secret id from `SECRET_NAME`, broker settings from
//! `MQTT_SERVER` / `MQTT_USERNAME` / `MQTT_PASSWORD`, and a single
//! subscribe + greeting on `hedro/mqtt/secrets`.

use crate::secrets::markers::ResolvedEnv;
use rumqttc::QoS;
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use thiserror::Error;
use tracing::debug;

/// Files searched, relative to the working directory, when no path is given
pub const DEFAULT_CONFIG_PATHS: &[&str] = &["mqtt-secrets.toml", "config/mqtt-secrets.toml"];

/// Main configuration structure
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Default)]
pub struct BridgeConfig {
    #[serde(default)]
    pub secrets: SecretsSection,
    #[serde(default)]
    pub mqtt: MqttSection,
}

/// Secrets store section
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct SecretsSection {
    /// Literal secret id; takes precedence over `secret_name_env`
    pub secret_name: Option<String>,
    /// Environment variable holding the secret id
    #[serde(default = "default_secret_name_env")]
    pub secret_name_env: String,
    /// AWS region override (falls back to the SDK default chain)
    pub region: Option<String>,
    /// Version stage passed to GetSecretValue
    #[serde(default = "default_version_stage")]
    pub version_stage: String,
    /// Prefix that marks an environment value as a bundle key reference
    #[serde(default = "default_marker")]
    pub marker: char,
}

impl Default for SecretsSection {
    fn default() -> Self {
        Self {
            secret_name: None,
            secret_name_env: default_secret_name_env(),
            region: None,
            version_stage: default_version_stage(),
            marker: default_marker(),
        }
    }
}

fn default_secret_name_env() -> String {
    "SECRET_NAME".to_string()
}

fn default_version_stage() -> String {
    "AWSCURRENT".to_string()
}

fn default_marker() -> char {
    '!'
}

/// MQTT section
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct MqttSection {
    /// Environment variable containing the broker URL
    #[serde(default = "default_broker_url_env")]
    pub broker_url_env: String,
    /// Environment variable containing username
    #[serde(default = "default_username_env")]
    pub username_env: Option<String>,
    /// Environment variable containing password
    #[serde(default = "default_password_env")]
    pub password_env: Option<String>,
    /// Topic subscribed to and greeted on
    #[serde(default = "default_topic")]
    pub topic: String,
    /// Payload published once the session is up
    #[serde(default = "default_greeting")]
    pub greeting: String,
    /// QoS for subscribe and publish (0, 1 or 2)
    #[serde(default)]
    pub qos: u8,
    #[serde(default = "default_client_id_prefix")]
    pub client_id_prefix: String,
    #[serde(default = "default_keep_alive")]
    pub keep_alive_secs: u64,
    /// How long to wait for CONNACK
    #[serde(default = "default_connect_timeout")]
    pub connect_timeout_secs: u64,
}

impl Default for MqttSection {
    fn default() -> Self {
        Self {
            broker_url_env: default_broker_url_env(),
            username_env: default_username_env(),
            password_env: default_password_env(),
            topic: default_topic(),
            greeting: default_greeting(),
            qos: 0,
            client_id_prefix: default_client_id_prefix(),
            keep_alive_secs: default_keep_alive(),
            connect_timeout_secs: default_connect_timeout(),
        }
    }
}

fn default_broker_url_env() -> String {
    "MQTT_SERVER".to_string()
}

fn default_username_env() -> Option<String> {
    Some("MQTT_USERNAME".to_string())
}

fn default_password_env() -> Option<String> {
    Some("MQTT_PASSWORD".to_string())
}

fn default_topic() -> String {
    "hedro/mqtt/secrets".to_string()
}

fn default_greeting() -> String {
    "Hello MQTT using secrets!".to_string()
}

fn default_client_id_prefix() -> String {
    "mqtt-secrets".to_string()
}

fn default_keep_alive() -> u64 {
    60
}

fn default_connect_timeout() -> u64 {
    30
}

/// Configuration loading errors
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("Failed to read config file: {0}")]
    FileRead(#[from] std::io::Error),
    #[error("Failed to parse TOML: {0}")]
    TomlParse(#[from] toml::de::Error),
    #[error("Failed to render TOML: {0}")]
    TomlRender(#[from] toml::ser::Error),
    #[error("Failed to load env file: {0}")]
    EnvFile(#[from] dotenvy::Error),
    #[error("Environment variable not found: {0}")]
    EnvVarNotFound(String),
    #[error("Invalid configuration: {0}")]
    InvalidConfig(String),
}

impl BridgeConfig {
    /// Load configuration from a TOML file
    pub fn load_from_file(path: &Path) -> Result<Self, ConfigError> {
        let content = std::fs::read_to_string(path)?;
        Self::from_toml_str(&content)
    }

    /// Parse and validate configuration from TOML text
    pub fn from_toml_str(content: &str) -> Result<Self, ConfigError> {
        let config: BridgeConfig = toml::from_str(content)?;
        config.validate()?;
        Ok(config)
    }

    /// Check cross-field constraints that serde cannot express
    pub fn validate(&self) -> Result<(), ConfigError> {
        self.secrets.validate()?;
        self.mqtt.validate()
    }

    /// Load the explicit file, else the first default path under `search_dir`
    /// that exists, else built-in defaults.
    ///
    /// Returns the configuration together with the file it came from.
    pub fn discover(
        explicit: Option<&Path>,
        search_dir: &Path,
    ) -> Result<(Self, Option<PathBuf>), ConfigError> {
        if let Some(path) = explicit {
            return Ok((Self::load_from_file(path)?, Some(path.to_path_buf())));
        }

        for candidate in DEFAULT_CONFIG_PATHS {
            let path = search_dir.join(candidate);
            if path.is_file() {
                return Ok((Self::load_from_file(&path)?, Some(path)));
            }
        }

        debug!("No configuration file found, using built-in defaults");
        Ok((Self::default(), None))
    }
}

/// Entries of an env file whose names are not already set.
///
/// `is_set` reports whether a variable already exists; those keep their value.
pub fn env_file_overlay<F>(path: &Path, is_set: F) -> Result<Vec<(String, String)>, ConfigError>
where
    F: Fn(&str) -> bool,
{
    let mut overlay = Vec::new();
    for entry in dotenvy::from_path_iter(path)? {
        let (name, value) = entry?;
        if !is_set(&name) {
            overlay.push((name, value));
        }
    }
    Ok(overlay)
}

/// Load an explicit env file, or `.env` under `search_dir` if one exists,
/// into the process environment. Variables already set take precedence.
///
/// Returns the file that was applied.
pub fn load_env_file(
    explicit: Option<&Path>,
    search_dir: &Path,
) -> Result<Option<PathBuf>, ConfigError> {
    let path = match explicit {
        Some(path) => path.to_path_buf(),
        None => {
            let implicit = search_dir.join(".env");
            if !implicit.is_file() {
                return Ok(None);
            }
            implicit
        }
    };

    let overlay = env_file_overlay(&path, |name| std::env::var_os(name).is_some())?;
    for (name, value) in overlay {
        std::env::set_var(name, value);
    }
    Ok(Some(path))
}

impl SecretsSection {
    fn validate(&self) -> Result<(), ConfigError> {
        if self.marker.is_whitespace() {
            return Err(ConfigError::InvalidConfig(
                "secrets.marker must not be whitespace".to_string(),
            ));
        }
        if self.version_stage.trim().is_empty() {
            return Err(ConfigError::InvalidConfig(
                "secrets.version_stage must not be empty".to_string(),
            ));
        }
        let has_literal = self
            .secret_name
            .as_deref()
            .is_some_and(|name| !name.trim().is_empty());
        if !has_literal && self.secret_name_env.trim().is_empty() {
            return Err(ConfigError::InvalidConfig(
                "either secrets.secret_name or secrets.secret_name_env is required".to_string(),
            ));
        }
        Ok(())
    }

    /// Resolve the secret id from the literal setting or the configured variable
    pub fn resolve_secret_name(&self, env: &ResolvedEnv) -> Result<String, ConfigError> {
        if let Some(name) = self.secret_name.as_deref().filter(|n| !n.trim().is_empty()) {
            return Ok(name.to_string());
        }

        env.get(&self.secret_name_env)
            .filter(|value| !value.trim().is_empty())
            .map(str::to_string)
            .ok_or_else(|| ConfigError::EnvVarNotFound(self.secret_name_env.clone()))
    }
}

impl MqttSection {
    fn validate(&self) -> Result<(), ConfigError> {
        validate_topic(&self.topic)?;

        if self.qos > 2 {
            return Err(ConfigError::InvalidConfig(format!(
                "mqtt.qos must be 0, 1 or 2 (got {})",
                self.qos
            )));
        }
        if self.broker_url_env.trim().is_empty() {
            return Err(ConfigError::InvalidConfig(
                "mqtt.broker_url_env must not be empty".to_string(),
            ));
        }
        if self.keep_alive_secs < 5 || self.keep_alive_secs > u64::from(u16::MAX) {
            return Err(ConfigError::InvalidConfig(format!(
                "mqtt.keep_alive_secs must be between 5 and {} (got {})",
                u16::MAX,
                self.keep_alive_secs
            )));
        }
        if self.connect_timeout_secs == 0 {
            return Err(ConfigError::InvalidConfig(
                "mqtt.connect_timeout_secs must be greater than 0".to_string(),
            ));
        }
        Ok(())
    }

    /// QoS level used for both the subscription and the greeting
    pub fn qos(&self) -> QoS {
        match self.qos {
            0 => QoS::AtMostOnce,
            1 => QoS::AtLeastOnce,
            _ => QoS::ExactlyOnce,
        }
    }
}

/// Topics are used for publishing as well, so wildcards are rejected
fn validate_topic(topic: &str) -> Result<(), ConfigError> {
    if topic.is_empty() {
        return Err(ConfigError::InvalidConfig(
            "mqtt.topic must not be empty".to_string(),
        ));
    }
    if topic.contains(['+', '#']) {
        return Err(ConfigError::InvalidConfig(format!(
            "mqtt.topic '{topic}' must not contain wildcards"
        )));
    }
    Ok(())
}
