//! Transport layer for the broker session
//!
//! This module provides the transport abstraction and its MQTT implementation.

use rumqttc::QoS;
use tokio::sync::mpsc;

pub mod mqtt;

pub use mqtt::{ConnectionState, InboundMessage};

/// Transport trait for broker communication
///
/// This trait provides an abstraction over the publish/subscribe client
/// to enable dependency injection and testing.
#[async_trait::async_trait]
pub trait Transport: Send + Sync {
    type Error: std::error::Error + Send + Sync + 'static;

    /// Connect to the broker, returning once the broker has acknowledged
    async fn connect(&mut self) -> Result<(), Self::Error>;

    /// Disconnect from the broker
    async fn disconnect(&mut self) -> Result<(), Self::Error>;

    /// Subscribe to a topic
    async fn subscribe(&mut self, topic: &str, qos: QoS) -> Result<(), Self::Error>;

    /// Publish a payload to a topic
    async fn publish(
        &self,
        topic: &str,
        payload: Vec<u8>,
        qos: QoS,
        retain: bool,
    ) -> Result<(), Self::Error>;

    /// Check if transport is currently connected
    fn is_connected(&self) -> bool;

    /// Get current connection state
    fn connection_state(&self) -> Option<ConnectionState>;

    /// Check if a previously established connection has ended
    fn is_closed(&self) -> bool;

    /// Set the channel that receives messages arriving on subscribed topics
    async fn set_message_sender(&self, sender: mpsc::Sender<InboundMessage>);
}
