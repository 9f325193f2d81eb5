//! Configuration loading and validation tests
//!
//! Tests focus on behavior of configuration loading, validation, and error handling.

use mqtt_secrets::config::{BridgeConfig, ConfigError};
use mqtt_secrets::secrets::ResolvedEnv;
use rumqttc::QoS;
use std::io::Write;
use tempfile::NamedTempFile;

#[test]
fn test_config_loads_successfully_from_valid_toml() {
    let mut temp_file = NamedTempFile::new().unwrap();
    writeln!(
        temp_file,
        r#"
[secrets]
secret_name = "prod/mqtt"
region = "eu-west-1"
version_stage = "AWSPREVIOUS"
marker = "@"

[mqtt]
broker_url_env = "BROKER"
topic = "plant/line-1/status"
greeting = "online"
qos = 1
keep_alive_secs = 30
"#
    )
    .unwrap();

    let config = BridgeConfig::load_from_file(temp_file.path()).unwrap();

    assert_eq!(config.secrets.secret_name.as_deref(), Some("prod/mqtt"));
    assert_eq!(config.secrets.region.as_deref(), Some("eu-west-1"));
    assert_eq!(config.secrets.version_stage, "AWSPREVIOUS");
    assert_eq!(config.secrets.marker, '@');
    assert_eq!(config.mqtt.broker_url_env, "BROKER");
    assert_eq!(config.mqtt.topic, "plant/line-1/status");
    assert_eq!(config.mqtt.greeting, "online");
    assert_eq!(config.mqtt.qos(), QoS::AtLeastOnce);
    assert_eq!(config.mqtt.keep_alive_secs, 30);
    // Untouched fields keep their defaults
    assert_eq!(config.mqtt.username_env.as_deref(), Some("MQTT_USERNAME"));
    assert_eq!(config.mqtt.connect_timeout_secs, 30);
}

#[test]
fn test_empty_file_yields_defaults() {
    let temp_file = NamedTempFile::new().unwrap();
    let config = BridgeConfig::load_from_file(temp_file.path()).unwrap();
    assert_eq!(config, BridgeConfig::default());
}

#[test]
fn test_default_config_matches_stock_behaviour() {
    let config = BridgeConfig::default();
    assert!(config.validate().is_ok());
    assert_eq!(config.secrets.secret_name_env, "SECRET_NAME");
    assert_eq!(config.secrets.version_stage, "AWSCURRENT");
    assert_eq!(config.secrets.marker, '!');
    assert_eq!(config.mqtt.broker_url_env, "MQTT_SERVER");
    assert_eq!(config.mqtt.password_env.as_deref(), Some("MQTT_PASSWORD"));
    assert_eq!(config.mqtt.topic, "hedro/mqtt/secrets");
    assert_eq!(config.mqtt.greeting, "Hello MQTT using secrets!");
    assert_eq!(config.mqtt.qos(), QoS::AtMostOnce);
}

#[test]
fn test_missing_file_is_read_error() {
    let result = BridgeConfig::load_from_file(std::path::Path::new("/nonexistent/mqtt-secrets.toml"));
    assert!(matches!(result, Err(ConfigError::FileRead(_))));
}

#[test]
fn test_malformed_toml_is_parse_error() {
    let result = BridgeConfig::from_toml_str("[mqtt\ntopic = ");
    assert!(matches!(result, Err(ConfigError::TomlParse(_))));
}

#[test]
fn test_wildcard_topic_rejected() {
    for topic in ["plant/+/status", "plant/#"] {
        let toml = format!("[mqtt]\ntopic = \"{topic}\"\n");
        assert!(
            matches!(
                BridgeConfig::from_toml_str(&toml),
                Err(ConfigError::InvalidConfig(_))
            ),
            "topic {topic} should be rejected"
        );
    }
}

#[test]
fn test_out_of_range_values_rejected() {
    let cases = [
        "[mqtt]\nqos = 3\n",
        "[mqtt]\ntopic = \"\"\n",
        "[mqtt]\nkeep_alive_secs = 1\n",
        "[mqtt]\nkeep_alive_secs = 65536\n",
        "[mqtt]\nconnect_timeout_secs = 0\n",
        "[secrets]\nmarker = \" \"\n",
        "[secrets]\nsecret_name_env = \"\"\n",
    ];
    for case in cases {
        assert!(
            matches!(
                BridgeConfig::from_toml_str(case),
                Err(ConfigError::InvalidConfig(_))
            ),
            "expected rejection for: {case}"
        );
    }
}

#[test]
fn test_keep_alive_upper_bound() {
    let config = BridgeConfig::from_toml_str("[mqtt]\nkeep_alive_secs = 65535\n").unwrap();
    assert_eq!(config.mqtt.keep_alive_secs, 65535);

    let err = BridgeConfig::from_toml_str("[mqtt]\nkeep_alive_secs = 65536\n").unwrap_err();
    assert!(err.to_string().contains("keep_alive_secs"));
}

#[test]
fn test_secret_name_resolution() {
    let env = ResolvedEnv::from_vars([("SECRET_NAME", "from/env"), ("OTHER", "other/env")]);

    let config = BridgeConfig::default();
    assert_eq!(config.secrets.resolve_secret_name(&env).unwrap(), "from/env");

    let config = BridgeConfig::from_toml_str("[secrets]\nsecret_name_env = \"OTHER\"\n").unwrap();
    assert_eq!(config.secrets.resolve_secret_name(&env).unwrap(), "other/env");

    let config = BridgeConfig::from_toml_str("[secrets]\nsecret_name = \"literal\"\n").unwrap();
    assert_eq!(config.secrets.resolve_secret_name(&env).unwrap(), "literal");

    let config = BridgeConfig::default();
    let empty = ResolvedEnv::from_vars([("SECRET_NAME", "  ")]);
    assert!(matches!(
        config.secrets.resolve_secret_name(&empty),
        Err(ConfigError::EnvVarNotFound(name)) if name == "SECRET_NAME"
    ));
}

#[test]
fn test_config_round_trips_through_toml() {
    let config = BridgeConfig::default();
    let rendered = toml::to_string_pretty(&config).unwrap();
    assert_eq!(BridgeConfig::from_toml_str(&rendered).unwrap(), config);
}
