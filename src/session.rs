//! Broker session lifecycle
//!
//! Connect, subscribe to the configured topic, publish the greeting, and
//! later disconnect. Subscribe and publish failures are logged and do not
//! abort the session; a failed connect does.

use crate::config::MqttSection;
use crate::error::BridgeError;
use crate::transport::{ConnectionState, Transport};
use rumqttc::QoS;
use std::future::Future;
use std::time::Duration;
use thiserror::Error;
use tracing::{error, info, warn, Instrument};

/// How often `closed` checks the transport state
const CLOSE_POLL_INTERVAL: Duration = Duration::from_millis(100);

/// Session-level errors
#[derive(Debug, Error)]
pub enum SessionError {
    #[error("Failed to connect: {0}")]
    Connect(#[source] Box<dyn std::error::Error + Send + Sync>),
    #[error("Failed to disconnect: {0}")]
    Disconnect(#[source] Box<dyn std::error::Error + Send + Sync>),
    #[error("Session already started")]
    AlreadyStarted,
}

/// What the session does once connected
#[derive(Debug, Clone, PartialEq)]
pub struct SessionSettings {
    pub topic: String,
    pub greeting: String,
    pub qos: QoS,
}

impl From<&MqttSection> for SessionSettings {
    fn from(section: &MqttSection) -> Self {
        Self {
            topic: section.topic.clone(),
            greeting: section.greeting.clone(),
            qos: section.qos(),
        }
    }
}

/// Single broker session with injected transport
pub struct Session<T>
where
    T: Transport,
{
    settings: SessionSettings,
    transport: T,
    started: bool,
}

impl<T> Session<T>
where
    T: Transport,
{
    pub fn new(settings: SessionSettings, transport: T) -> Self {
        Self {
            settings,
            transport,
            started: false,
        }
    }

    pub fn settings(&self) -> &SessionSettings {
        &self.settings
    }

    /// Get the transport instance
    pub fn transport(&self) -> &T {
        &self.transport
    }

    /// Connect, subscribe, then publish the greeting
    pub async fn start(&mut self) -> Result<(), SessionError> {
        if self.started {
            return Err(SessionError::AlreadyStarted);
        }

        let span = crate::lifecycle_span!(event = "start", topic = %self.settings.topic);
        async {
            self.transport
                .connect()
                .await
                .map_err(|e| SessionError::Connect(Box::new(e)))?;
            self.started = true;

            let topic = self.settings.topic.clone();
            let qos = self.settings.qos;

            if let Err(e) = self.transport.subscribe(&topic, qos).await {
                warn!(topic = %topic, error = %e, "Subscription request failed");
            }

            let payload = self.settings.greeting.clone().into_bytes();
            match self.transport.publish(&topic, payload, qos, false).await {
                Ok(()) => info!(topic = %topic, "Published greeting"),
                Err(e) => warn!(topic = %topic, error = %e, "Failed to publish greeting"),
            }

            Ok(())
        }
        .instrument(span)
        .await
    }

    /// Start unless `cancel` completes first.
    ///
    /// Returns `Ok(false)` when startup was abandoned; the caller should still
    /// call [`Session::shutdown`].
    pub async fn start_until<F>(&mut self, cancel: F) -> Result<bool, SessionError>
    where
        F: Future<Output = ()>,
    {
        tokio::select! {
            started = self.start() => started.map(|()| true),
            () = cancel => {
                warn!("Startup interrupted before the session was established");
                Ok(false)
            }
        }
    }

    /// Whether the broker connection has ended
    pub fn is_closed(&self) -> bool {
        self.transport.is_closed()
    }

    /// Resolve once the connection has ended, yielding the reason
    pub async fn closed(&self) -> String {
        loop {
            if self.is_closed() {
                return match self.transport.connection_state() {
                    Some(ConnectionState::Disconnected(reason)) => reason,
                    _ => "connection closed".to_string(),
                };
            }
            tokio::time::sleep(CLOSE_POLL_INTERVAL).await;
        }
    }

    /// Run until `shutdown` completes or the connection is lost, then disconnect.
    ///
    /// A lost connection is an error even though the disconnect itself succeeds.
    pub async fn run_until<F>(&mut self, shutdown: F) -> Result<(), BridgeError>
    where
        F: Future<Output = ()>,
    {
        let lost = tokio::select! {
            () = shutdown => None,
            reason = self.closed() => Some(reason),
        };

        if let Some(reason) = &lost {
            error!("MQTT connection lost: {}", reason);
        }

        let shutdown_result = self.shutdown().await;
        match lost {
            Some(reason) => Err(BridgeError::connection_lost(reason)),
            None => Ok(shutdown_result?),
        }
    }

    /// Disconnect from the broker
    pub async fn shutdown(&mut self) -> Result<(), SessionError> {
        info!("Disconnecting MQTT client...");
        match self.transport.disconnect().await {
            Ok(()) => {
                info!("MQTT client disconnected");
                Ok(())
            }
            Err(e) => {
                error!(error = %e, "Error during disconnect");
                Err(SessionError::Disconnect(Box::new(e)))
            }
        }
    }
}
