//! mqtt-secrets
//!
//! Fetches a JSON secret bundle from AWS Secrets Manager, substitutes
//! marker-prefixed environment values (`MQTT_PASSWORD=!mqtt_password`) with
//! bundle entries, and runs a single MQTT session with the resolved
//! credentials.
//!
//! # Overview
//!
//! - [`config`] - TOML configuration with stock defaults
//! - [`secrets`] - Secret store abstraction, bundle parsing and marker substitution
//! - [`transport`] - Transport trait and the rumqttc-backed MQTT client
//! - [`session`] - Connect, subscribe, greet and disconnect
//!
//! # Quick Start
//!
//! ```rust
//! use mqtt_secrets::secrets::{substitute_markers, ResolvedEnv, SecretBundle};
//!
//! let bundle = SecretBundle::parse(r#"{"mqtt_password": "s3cr3t"}"#).unwrap();
//! let env = ResolvedEnv::from_vars([("MQTT_PASSWORD", "!mqtt_password")]);
//!
//! let resolved = substitute_markers(&env, &bundle, '!').unwrap();
//! assert_eq!(resolved.get("MQTT_PASSWORD"), Some("s3cr3t"));
//! assert_eq!(resolved.substituted(), ["MQTT_PASSWORD"]);
//! ```

pub mod config;
pub mod error;
pub mod observability;
pub mod secrets;
pub mod session;
pub mod testing;
pub mod transport;

pub use config::{BridgeConfig, ConfigError, MqttSection, SecretsSection};
pub use error::{BridgeError, BridgeResult};
pub use secrets::{
    load_bundle, resolve_environment, substitute_markers, AwsSecretStore, ResolvedEnv,
    SecretBundle, SecretStore, SecretsError, SubstitutionError,
};
pub use session::{Session, SessionError, SessionSettings};
pub use transport::mqtt::{MqttClient, MqttSettings};
pub use transport::Transport;
