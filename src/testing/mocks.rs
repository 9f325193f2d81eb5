//! Mock implementations for testing
//!
//! Provides mock SecretStore and Transport implementations so the secrets
//! and session flows can be exercised without AWS or an MQTT broker.

use crate::secrets::{SecretStore, SecretsError};
use crate::transport::mqtt::MqttError;
use crate::transport::{ConnectionState, InboundMessage, Transport};
use async_trait::async_trait;
use bytes::Bytes;
use rumqttc::QoS;
use std::collections::HashMap;
use std::sync::Arc;
use tokio::sync::{mpsc, watch, Mutex};

#[derive(Debug, Clone)]
enum MockSecret {
    Text(String),
    Binary,
}

/// In-memory secret store
#[derive(Debug, Default, Clone)]
pub struct MockSecretStore {
    secrets: HashMap<String, MockSecret>,
    failure: Option<String>,
    requests: Arc<Mutex<Vec<(String, String)>>>,
}

impl MockSecretStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Store a secret with a string payload
    pub fn with_secret(mut self, secret_id: &str, payload: &str) -> Self {
        self.secrets
            .insert(secret_id.to_string(), MockSecret::Text(payload.to_string()));
        self
    }

    /// Store a secret that only carries binary data
    pub fn with_binary_secret(mut self, secret_id: &str) -> Self {
        self.secrets
            .insert(secret_id.to_string(), MockSecret::Binary);
        self
    }

    /// Fail every fetch with the given message
    pub fn with_failure(mut self, message: &str) -> Self {
        self.failure = Some(message.to_string());
        self
    }

    /// `(secret_id, version_stage)` pairs requested so far
    pub async fn requests(&self) -> Vec<(String, String)> {
        self.requests.lock().await.clone()
    }
}

#[async_trait]
impl SecretStore for MockSecretStore {
    async fn get_secret_string(
        &self,
        secret_id: &str,
        version_stage: &str,
    ) -> Result<Option<String>, SecretsError> {
        self.requests
            .lock()
            .await
            .push((secret_id.to_string(), version_stage.to_string()));

        if let Some(message) = &self.failure {
            return Err(SecretsError::Fetch {
                secret_id: secret_id.to_string(),
                message: message.clone(),
            });
        }

        match self.secrets.get(secret_id) {
            Some(MockSecret::Text(payload)) => Ok(Some(payload.clone())),
            Some(MockSecret::Binary) => Ok(None),
            None => Err(SecretsError::NotFound {
                secret_id: secret_id.to_string(),
            }),
        }
    }
}

/// A call made against [`MockTransport`]
#[derive(Debug, Clone, PartialEq)]
pub enum TransportCall {
    Connect,
    Subscribe { topic: String, qos: QoS },
    Publish {
        topic: String,
        payload: Vec<u8>,
        qos: QoS,
        retain: bool,
    },
    Disconnect,
}

/// Mock transport for testing
#[derive(Debug)]
pub struct MockTransport {
    calls: Arc<Mutex<Vec<TransportCall>>>,
    state: watch::Sender<Option<ConnectionState>>,
    message_sender: Arc<Mutex<Option<mpsc::Sender<InboundMessage>>>>,
    fail_connect: bool,
    fail_operations: bool,
}

impl Default for MockTransport {
    fn default() -> Self {
        Self {
            calls: Arc::new(Mutex::new(Vec::new())),
            state: watch::channel(None).0,
            message_sender: Arc::new(Mutex::new(None)),
            fail_connect: false,
            fail_operations: false,
        }
    }
}

impl MockTransport {
    pub fn new() -> Self {
        Self::default()
    }

    /// Transport whose connect is refused
    pub fn with_connect_failure() -> Self {
        Self {
            fail_connect: true,
            ..Default::default()
        }
    }

    /// Transport that connects but rejects subscribe and publish
    pub fn with_operation_failures() -> Self {
        Self {
            fail_operations: true,
            ..Default::default()
        }
    }

    pub async fn calls(&self) -> Vec<TransportCall> {
        self.calls.lock().await.clone()
    }

    pub async fn published(&self) -> Vec<(String, Vec<u8>)> {
        self.calls
            .lock()
            .await
            .iter()
            .filter_map(|call| match call {
                TransportCall::Publish { topic, payload, .. } => {
                    Some((topic.clone(), payload.clone()))
                }
                _ => None,
            })
            .collect()
    }

    /// Simulate the broker dropping the connection
    pub fn drop_connection(&self, reason: &str) {
        self.state
            .send_replace(Some(ConnectionState::Disconnected(reason.to_string())));
    }

    /// Simulate an inbound message; returns false when nobody is listening
    pub async fn deliver(&self, topic: &str, payload: &[u8]) -> bool {
        let sender = self.message_sender.lock().await.clone();
        let Some(sender) = sender else {
            return false;
        };
        let message = InboundMessage {
            topic: topic.to_string(),
            payload: Bytes::copy_from_slice(payload),
            retain: false,
            received_at: chrono::Utc::now(),
        };
        sender.send(message).await.is_ok()
    }

    async fn record(&self, call: TransportCall) {
        self.calls.lock().await.push(call);
    }

    fn check_connected(&self) -> Result<(), MqttError> {
        match self.connection_state() {
            Some(ConnectionState::Connected) => Ok(()),
            Some(state) => Err(MqttError::NotConnected { state }),
            None => Err(MqttError::ConnectionFailedStr(
                "Mock transport not connected".to_string(),
            )),
        }
    }
}

#[async_trait]
impl Transport for MockTransport {
    type Error = MqttError;

    async fn connect(&mut self) -> Result<(), Self::Error> {
        self.record(TransportCall::Connect).await;
        if self.fail_connect {
            let reason = "Mock connection refused".to_string();
            self.state
                .send_replace(Some(ConnectionState::Disconnected(reason.clone())));
            return Err(MqttError::ConnectionFailedStr(reason));
        }
        self.state.send_replace(Some(ConnectionState::Connected));
        Ok(())
    }

    async fn disconnect(&mut self) -> Result<(), Self::Error> {
        self.record(TransportCall::Disconnect).await;
        if self.connection_state().is_some() {
            self.state.send_replace(Some(ConnectionState::Disconnected(
                "Client disconnected".to_string(),
            )));
        }
        Ok(())
    }

    async fn subscribe(&mut self, topic: &str, qos: QoS) -> Result<(), Self::Error> {
        self.record(TransportCall::Subscribe {
            topic: topic.to_string(),
            qos,
        })
        .await;
        self.check_connected()?;
        if self.fail_operations {
            return Err(MqttError::SubscriptionFailed(
                "Mock subscription failure".into(),
            ));
        }
        Ok(())
    }

    async fn publish(
        &self,
        topic: &str,
        payload: Vec<u8>,
        qos: QoS,
        retain: bool,
    ) -> Result<(), Self::Error> {
        self.record(TransportCall::Publish {
            topic: topic.to_string(),
            payload,
            qos,
            retain,
        })
        .await;
        self.check_connected()?;
        if self.fail_operations {
            return Err(MqttError::PublishFailed("Mock publish failure".into()));
        }
        Ok(())
    }

    fn is_connected(&self) -> bool {
        matches!(self.connection_state(), Some(ConnectionState::Connected))
    }

    fn connection_state(&self) -> Option<ConnectionState> {
        self.state.borrow().clone()
    }

    fn is_closed(&self) -> bool {
        matches!(
            self.connection_state(),
            Some(ConnectionState::Disconnected(_))
        )
    }

    async fn set_message_sender(&self, sender: mpsc::Sender<InboundMessage>) {
        *self.message_sender.lock().await = Some(sender);
    }
}
