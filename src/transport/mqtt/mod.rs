//! MQTT client implementation for the secrets bridge
//!
//! The module separates pure functions from I/O operations:
//!
//! - [`connection`] - Pure connection state, settings and option building
//! - [`message_handler`] - Pure event routing and inbound message forwarding
//! - [`client`] - Impure I/O operations and event loop coordination
//!
//! # Usage
//!
//! ```rust,no_run
//! use mqtt_secrets::transport::mqtt::{MqttClient, MqttSettings};
//! use rumqttc::QoS;
//!
//! # tokio_test::block_on(async {
//! let settings = MqttSettings {
//!     broker_url: "mqtt://localhost:1883".to_string(),
//!     ..Default::default()
//! };
//!
//! let mut client = MqttClient::new(settings)?;
//! client.connect().await?;
//! client.subscribe("hedro/mqtt/secrets", QoS::AtMostOnce).await?;
//! # Ok::<(), Box<dyn std::error::Error>>(())
//! # });
//! ```

pub mod client;
pub mod connection;
pub mod message_handler;

pub use client::MqttClient;
pub use connection::{configure_mqtt_options, ConnectionState, MqttError, MqttSettings};
pub use message_handler::{EventRoute, InboundMessage, MessageForwarder, MessageHandler};
