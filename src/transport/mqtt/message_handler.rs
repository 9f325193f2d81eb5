//! Pure message routing and processing logic for MQTT events
//!
//! This module contains pure functions for classifying MQTT events and
//! the forwarder that hands inbound publishes to an optional consumer.

use bytes::Bytes;
use chrono::{DateTime, Utc};
use rumqttc::{Event, Outgoing, Packet, SubscribeReasonCode};
use tokio::sync::mpsc;
use tracing::{debug, warn};

/// Message received on a subscribed topic
#[derive(Debug, Clone, PartialEq)]
pub struct InboundMessage {
    pub topic: String,
    pub payload: Bytes,
    pub retain: bool,
    pub received_at: DateTime<Utc>,
}

impl InboundMessage {
    /// Payload as text, replacing invalid UTF-8 sequences
    pub fn payload_text(&self) -> String {
        String::from_utf8_lossy(&self.payload).into_owned()
    }
}

/// Pure message routing decisions based on MQTT events
pub struct MessageHandler;

impl MessageHandler {
    /// Route MQTT event to appropriate handler (pure routing decision)
    pub fn route_mqtt_event(event: &Event) -> EventRoute {
        match event {
            Event::Incoming(incoming) => match incoming {
                Packet::ConnAck(_) => EventRoute::ConnectionAcknowledged,
                Packet::Publish(publish) => EventRoute::MessageReceived {
                    topic: publish.topic.clone(),
                    payload: publish.payload.clone(),
                    retain: publish.retain,
                },
                Packet::SubAck(suback) => EventRoute::SubscriptionAcknowledged {
                    packet_id: suback.pkid,
                    return_codes: suback.return_codes.clone(),
                },
                Packet::Disconnect => EventRoute::Disconnected,
                other => EventRoute::InfrastructureEvent(format!("{other:?}")),
            },
            Event::Outgoing(Outgoing::Disconnect) => EventRoute::DisconnectSent,
            Event::Outgoing(_) => EventRoute::OutgoingEvent,
        }
    }

    /// Validate subscription success from SubAck (pure function)
    pub fn validate_subscription_success(
        return_codes: &[SubscribeReasonCode],
    ) -> Result<(), String> {
        if return_codes
            .iter()
            .any(|code| matches!(code, SubscribeReasonCode::Failure))
        {
            Err(format!(
                "Subscription refused by broker: {return_codes:?}"
            ))
        } else {
            Ok(())
        }
    }
}

/// Routing decisions for MQTT events
#[derive(Debug, Clone)]
pub enum EventRoute {
    /// Connection acknowledged - ready to publish/subscribe
    ConnectionAcknowledged,
    /// Message received on subscribed topic
    MessageReceived {
        topic: String,
        payload: Bytes,
        retain: bool,
    },
    /// Subscription acknowledged with per-filter return codes
    SubscriptionAcknowledged {
        packet_id: u16,
        return_codes: Vec<SubscribeReasonCode>,
    },
    /// MQTT broker disconnected
    Disconnected,
    /// Our own DISCONNECT reached the wire
    DisconnectSent,
    /// Infrastructure event (PingResp, PubAck, etc.)
    InfrastructureEvent(String),
    /// Outgoing event (handled automatically)
    OutgoingEvent,
}

/// Hands inbound messages to the consumer, if one is registered
#[derive(Debug, Default)]
pub struct MessageForwarder {
    sender: Option<mpsc::Sender<InboundMessage>>,
}

impl MessageForwarder {
    pub fn new() -> Self {
        Self { sender: None }
    }

    pub fn set_sender(&mut self, sender: mpsc::Sender<InboundMessage>) {
        self.sender = Some(sender);
    }

    /// Forward a message; returns false when nobody is listening
    pub async fn forward(&self, message: InboundMessage) -> bool {
        let Some(sender) = &self.sender else {
            debug!(topic = %message.topic, "No message consumer registered - message dropped");
            return false;
        };

        if sender.send(message).await.is_err() {
            warn!("Message consumer has gone away - message dropped");
            return false;
        }
        true
    }
}
