//! Impure I/O operations for MQTT client
//!
//! This module handles network communication, the event loop task and
//! integration with the rumqttc client. The session is single-shot: once
//! the connection ends for any reason the event loop stops and the client
//! reports [`ConnectionState::Disconnected`].

use super::connection::{
    configure_mqtt_options, redact_broker_url, ConnectionState, MqttError, MqttSettings,
};
use super::message_handler::{EventRoute, InboundMessage, MessageForwarder, MessageHandler};
use crate::transport::Transport;
use async_trait::async_trait;
use rumqttc::{AsyncClient, EventLoop, QoS};
use std::collections::VecDeque;
use std::sync::Arc;
use std::time::{Duration, Instant};
use tokio::sync::{mpsc, watch, Mutex};
use tokio::task::JoinHandle;
use tracing::{debug, error, info, warn, Instrument};

/// How long `disconnect` waits for the DISCONNECT packet to be flushed
const DISCONNECT_GRACE: Duration = Duration::from_secs(2);

/// Request channel capacity between the client handle and the event loop
const REQUEST_CAPACITY: usize = 10;

/// MQTT transport client
pub struct MqttClient {
    client_id: String,
    client: AsyncClient,
    // EventLoop is Send but not Sync; the mutex keeps the client shareable
    event_loop: Option<Mutex<EventLoop>>,
    settings: MqttSettings,
    event_loop_handle: Option<JoinHandle<()>>,
    state_rx: Option<watch::Receiver<ConnectionState>>,
    state_tx: Option<watch::Sender<ConnectionState>>,
    shutdown_tx: Option<watch::Sender<bool>>,
    pending_subscriptions: Arc<Mutex<VecDeque<String>>>,
    message_forwarder: Arc<Mutex<MessageForwarder>>,
    connect_time: Option<Instant>,
}

impl MqttClient {
    pub fn new(settings: MqttSettings) -> Result<Self, MqttError> {
        let mqtt_options = configure_mqtt_options(&settings)?;
        let client_id = mqtt_options.client_id();

        let (client, event_loop) = AsyncClient::new(mqtt_options, REQUEST_CAPACITY);

        Ok(MqttClient {
            client_id,
            client,
            event_loop: Some(Mutex::new(event_loop)),
            settings,
            event_loop_handle: None,
            state_rx: None,
            state_tx: None,
            shutdown_tx: None,
            pending_subscriptions: Arc::new(Mutex::new(VecDeque::new())),
            message_forwarder: Arc::new(Mutex::new(MessageForwarder::new())),
            connect_time: None,
        })
    }

    pub fn client_id(&self) -> &str {
        &self.client_id
    }

    /// Time since CONNACK, if connected
    pub fn uptime(&self) -> Option<Duration> {
        self.connect_time.map(|t| t.elapsed())
    }

    /// Set the channel that receives inbound messages
    pub async fn set_message_sender(&self, sender: mpsc::Sender<InboundMessage>) {
        let mut forwarder = self.message_forwarder.lock().await;
        forwarder.set_sender(sender);
    }

    /// Create connection state and shutdown channels
    #[allow(clippy::type_complexity)]
    fn setup_connection_channels() -> (
        (
            watch::Sender<ConnectionState>,
            watch::Receiver<ConnectionState>,
        ),
        (watch::Sender<bool>, watch::Receiver<bool>),
    ) {
        let state_channels = watch::channel(ConnectionState::Connecting);
        let shutdown_channels = watch::channel(false);
        (state_channels, shutdown_channels)
    }

    /// Wait for connection confirmation (CONNACK) with timeout
    async fn wait_for_connection_confirmation(
        mut state_rx: watch::Receiver<ConnectionState>,
        timeout: Duration,
    ) -> Result<(), MqttError> {
        let timeout_result = tokio::time::timeout(timeout, async {
            loop {
                if state_rx.changed().await.is_err() {
                    return Err(MqttError::ConnectionFailedStr(
                        "State channel closed".to_string(),
                    ));
                }
                match *state_rx.borrow() {
                    ConnectionState::Connected => return Ok(()),
                    ConnectionState::Disconnected(ref reason) => {
                        return Err(MqttError::ConnectionFailedStr(reason.clone()));
                    }
                    ConnectionState::Connecting => continue,
                }
            }
        })
        .await;

        match timeout_result {
            Ok(result) => result,
            Err(_) => Err(MqttError::ConnectTimeout(timeout)),
        }
    }

    /// Connect to the broker.
    ///
    /// Spawns the event loop task and returns only once the broker has sent
    /// CONNACK. Any failure before that is returned to the caller.
    pub async fn connect(&mut self) -> Result<(), MqttError> {
        let mut event_loop = self
            .event_loop
            .take()
            .ok_or_else(|| {
                MqttError::ConnectionFailedStr("Event loop already started".to_string())
            })?
            .into_inner();

        let ((state_tx, state_rx), (shutdown_tx, mut shutdown_rx)) =
            Self::setup_connection_channels();
        self.state_rx = Some(state_rx.clone());
        self.state_tx = Some(state_tx.clone());
        self.shutdown_tx = Some(shutdown_tx);

        let client_id = self.client_id.clone();
        let pending_subscriptions = self.pending_subscriptions.clone();
        let message_forwarder = self.message_forwarder.clone();
        let broker = redact_broker_url(&self.settings.broker_url);
        let span = crate::mqtt_span!(client_id = %client_id, broker = %broker);

        info!(broker = %broker, "Connecting to MQTT server");

        let handle = tokio::spawn(
            async move {
                debug!("MQTT event loop started");
                loop {
                    tokio::select! {
                        changed = shutdown_rx.changed() => {
                            if changed.is_err() || *shutdown_rx.borrow() {
                                debug!("Shutdown signal received, stopping event loop");
                                break;
                            }
                        }

                        event_result = event_loop.poll() => {
                            match event_result {
                                Ok(event) => {
                                    let route = MessageHandler::route_mqtt_event(&event);
                                    if !Self::process_event_route(
                                        route,
                                        &state_tx,
                                        &pending_subscriptions,
                                        &message_forwarder,
                                    )
                                    .await
                                    {
                                        break;
                                    }
                                }
                                Err(e) => {
                                    Self::handle_event_loop_error(e, &state_tx, *shutdown_rx.borrow());
                                    break;
                                }
                            }
                        }
                    }
                }
                debug!("MQTT event loop stopped");
            }
            .instrument(span),
        );

        self.event_loop_handle = Some(handle);

        if let Err(e) =
            Self::wait_for_connection_confirmation(state_rx, self.settings.connect_timeout).await
        {
            self.stop_event_loop();
            return Err(e);
        }

        self.connect_time = Some(Instant::now());
        Ok(())
    }

    /// Record a connection error; the session does not reconnect
    fn handle_event_loop_error(
        error: rumqttc::ConnectionError,
        state_tx: &watch::Sender<ConnectionState>,
        shutdown_requested: bool,
    ) {
        let reason = error.to_string();
        if shutdown_requested {
            debug!("Event loop ended during shutdown: {}", reason);
        } else {
            error!("MQTT connection error: {}", reason);
        }
        let _ = state_tx.send(ConnectionState::Disconnected(reason));
    }

    /// Process routed MQTT event.
    /// Returns true to continue loop, false to break
    async fn process_event_route(
        route: EventRoute,
        state_tx: &watch::Sender<ConnectionState>,
        pending_subscriptions: &Arc<Mutex<VecDeque<String>>>,
        message_forwarder: &Arc<Mutex<MessageForwarder>>,
    ) -> bool {
        match route {
            EventRoute::ConnectionAcknowledged => {
                info!("Connected to MQTT server");
                let _ = state_tx.send(ConnectionState::Connected);
                true
            }
            EventRoute::MessageReceived {
                topic,
                payload,
                retain,
            } => {
                debug!(topic = %topic, bytes = payload.len(), retain, "Message received");
                let message = InboundMessage {
                    topic,
                    payload,
                    retain,
                    received_at: chrono::Utc::now(),
                };
                message_forwarder.lock().await.forward(message).await;
                true
            }
            EventRoute::SubscriptionAcknowledged {
                packet_id,
                return_codes,
            } => {
                let topic = pending_subscriptions
                    .lock()
                    .await
                    .pop_front()
                    .unwrap_or_else(|| format!("<packet {packet_id}>"));
                match MessageHandler::validate_subscription_success(&return_codes) {
                    Ok(()) => info!("Subscribed to {}", topic),
                    Err(e) => warn!(topic = %topic, "{}", e),
                }
                true
            }
            EventRoute::Disconnected => {
                warn!("MQTT broker closed the connection");
                let _ = state_tx.send(ConnectionState::Disconnected(
                    "Broker disconnected".to_string(),
                ));
                false
            }
            EventRoute::DisconnectSent => {
                let _ = state_tx.send(ConnectionState::Disconnected(
                    "Client disconnected".to_string(),
                ));
                false
            }
            EventRoute::InfrastructureEvent(event_str) => {
                debug!(target: "mqtt_transport", "MQTT event: {}", event_str);
                true
            }
            EventRoute::OutgoingEvent => true,
        }
    }

    fn stop_event_loop(&mut self) {
        if let Some(shutdown_tx) = &self.shutdown_tx {
            let _ = shutdown_tx.send(true);
        }
        if let Some(handle) = self.event_loop_handle.take() {
            handle.abort();
        }
    }

    /// Disconnect from the broker.
    ///
    /// A no-op when the client never connected. Otherwise sends DISCONNECT
    /// and gives the event loop a short grace period to flush it.
    pub async fn disconnect(&mut self) -> Result<(), MqttError> {
        let Some(state) = self.connection_state() else {
            debug!("Disconnect requested before connect, nothing to do");
            return Ok(());
        };

        if state == ConnectionState::Connected {
            self.client
                .disconnect()
                .await
                .map_err(|e| MqttError::ConnectionFailed(Box::new(e)))?;

            if let Some(handle) = self.event_loop_handle.as_mut() {
                match tokio::time::timeout(DISCONNECT_GRACE, handle).await {
                    Ok(Ok(())) => debug!("Event loop task shut down gracefully"),
                    Ok(Err(e)) if !e.is_cancelled() => {
                        warn!("Event loop task ended with error: {}", e)
                    }
                    Ok(Err(_)) => {}
                    Err(_) => warn!("Event loop did not flush DISCONNECT in time, forcing stop"),
                }
            }
        }

        self.stop_event_loop();

        if let Some(state_tx) = &self.state_tx {
            state_tx.send_if_modified(|current| {
                if matches!(current, ConnectionState::Disconnected(_)) {
                    false
                } else {
                    *current = ConnectionState::Disconnected("Client disconnected".to_string());
                    true
                }
            });
        }

        info!(
            uptime_secs = self.uptime().map(|d| d.as_secs()),
            "MQTT connection closed"
        );
        Ok(())
    }

    /// Get current connection state.
    /// Returns None if connection hasn't been attempted yet
    pub fn connection_state(&self) -> Option<ConnectionState> {
        self.state_rx.as_ref().map(|rx| rx.borrow().clone())
    }

    /// Check if the connection has ended
    pub fn is_closed(&self) -> bool {
        matches!(
            self.connection_state(),
            Some(ConnectionState::Disconnected(_))
        )
    }

    /// Check connection state before operations
    fn check_connection_state(&self) -> Result<(), MqttError> {
        let state_rx = self.state_rx.as_ref().ok_or_else(|| {
            MqttError::ConnectionFailedStr("Client not connected: state_rx is None".to_string())
        })?;

        let current_state = state_rx.borrow().clone();
        if !current_state.can_publish() {
            return Err(MqttError::NotConnected {
                state: current_state,
            });
        }

        Ok(())
    }

    /// Subscribe to a topic; the SUBACK outcome is logged by the event loop
    pub async fn subscribe(&mut self, topic: &str, qos: QoS) -> Result<(), MqttError> {
        self.check_connection_state()?;

        self.pending_subscriptions
            .lock()
            .await
            .push_back(topic.to_string());

        if let Err(e) = self.client.subscribe(topic, qos).await {
            self.pending_subscriptions.lock().await.pop_back();
            return Err(MqttError::SubscriptionFailed(
                format!("Failed to subscribe to {topic}: {e}").into(),
            ));
        }

        debug!(topic, ?qos, "Subscribe request queued");
        Ok(())
    }

    /// Publish a payload to a topic
    pub async fn publish(
        &self,
        topic: &str,
        payload: Vec<u8>,
        qos: QoS,
        retain: bool,
    ) -> Result<(), MqttError> {
        self.check_connection_state()?;

        let bytes = payload.len();
        self.client
            .publish(topic, qos, retain, payload)
            .await
            .map_err(|e| MqttError::PublishFailed(Box::new(e)))?;

        debug!(topic, bytes, ?qos, retain, "Published message");
        Ok(())
    }
}

/// Implementation of Transport trait for MqttClient
#[async_trait]
impl Transport for MqttClient {
    type Error = MqttError;

    async fn connect(&mut self) -> Result<(), Self::Error> {
        MqttClient::connect(self).await
    }

    async fn disconnect(&mut self) -> Result<(), Self::Error> {
        MqttClient::disconnect(self).await
    }

    async fn subscribe(&mut self, topic: &str, qos: QoS) -> Result<(), Self::Error> {
        MqttClient::subscribe(self, topic, qos).await
    }

    async fn publish(
        &self,
        topic: &str,
        payload: Vec<u8>,
        qos: QoS,
        retain: bool,
    ) -> Result<(), Self::Error> {
        MqttClient::publish(self, topic, payload, qos, retain).await
    }

    fn is_connected(&self) -> bool {
        matches!(self.connection_state(), Some(ConnectionState::Connected))
    }

    fn connection_state(&self) -> Option<ConnectionState> {
        MqttClient::connection_state(self)
    }

    fn is_closed(&self) -> bool {
        MqttClient::is_closed(self)
    }

    async fn set_message_sender(&self, sender: mpsc::Sender<InboundMessage>) {
        MqttClient::set_message_sender(self, sender).await
    }
}

impl Drop for MqttClient {
    fn drop(&mut self) {
        // Async disconnect is not possible here; callers should use disconnect()
        self.stop_event_loop();
    }
}
