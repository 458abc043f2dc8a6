//! MQTT publisher
//!
//! Publishes with QoS 1 and (by default) the retain flag, so a subscriber
//! connecting later still sees the current source. The rumqttc event loop
//! runs in its own task and reconnects on its own; publishes are queued
//! without waiting so a dead broker never stalls the monitor loop.

use anyhow::Result;
use async_trait::async_trait;
use parking_lot::Mutex;
use rumqttc::{AsyncClient, ConnectReturnCode, Event, EventLoop, MqttOptions, Packet, QoS};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tokio::task::JoinHandle;
use tracing::{debug, info, warn};

use super::{Publisher, StateMessage};
use crate::config::MqttConfig;
use crate::error::PublishError;

/// Capacity of the request queue between client and event loop
const REQUEST_CAPACITY: usize = 32;
/// Pause between reconnection attempts
const RECONNECT_DELAY: Duration = Duration::from_secs(5);
/// How long shutdown waits for the disconnect to go out
const SHUTDOWN_GRACE: Duration = Duration::from_secs(2);

/// Publisher backed by an MQTT broker
pub struct MqttPublisher {
    client: AsyncClient,
    retain: bool,
    connected: Arc<AtomicBool>,
    event_task: Mutex<Option<JoinHandle<()>>>,
}

impl MqttPublisher {
    /// Create the client and start its event loop
    ///
    /// Connection happens in the background; failures are logged and
    /// retried.
    pub fn connect(config: &MqttConfig) -> Self {
        let mut options = MqttOptions::new(config.client_id.clone(), config.host.clone(), config.port);
        options.set_keep_alive(Duration::from_secs(config.keep_alive_secs.max(5)));
        if let (Some(username), Some(password)) = (&config.username, &config.password) {
            options.set_credentials(username.clone(), password.clone());
        }

        let (client, event_loop) = AsyncClient::new(options, REQUEST_CAPACITY);
        let connected = Arc::new(AtomicBool::new(false));

        info!("📡 Connecting to MQTT broker at {}:{}", config.host, config.port);
        let event_task = tokio::spawn(drive_event_loop(event_loop, Arc::clone(&connected)));

        Self {
            client,
            retain: config.retain,
            connected,
            event_task: Mutex::new(Some(event_task)),
        }
    }

    /// Whether the last connection attempt was accepted
    pub fn is_connected(&self) -> bool {
        self.connected.load(Ordering::Relaxed)
    }

    fn queue(&self, topic: &str, payload: &str) -> Result<(), PublishError> {
        self.client
            .try_publish(topic, QoS::AtLeastOnce, self.retain, payload.as_bytes().to_vec())
            .map_err(|source| PublishError::Client {
                topic: topic.to_string(),
                source,
            })
    }
}

#[async_trait]
impl Publisher for MqttPublisher {
    fn name(&self) -> &str {
        "mqtt"
    }

    async fn publish(&self, message: &StateMessage) {
        if !self.is_connected() {
            debug!("MQTT not connected yet, message will be sent once the broker is reachable");
        }

        if let Err(e) = self.queue(&message.source_topic, &message.source_value) {
            warn!("MQTT publish error: {}", e);
        }
        if let Err(e) = self.queue(&message.detail_topic, &message.detail_value) {
            warn!("MQTT publish error: {}", e);
        }
    }

    async fn shutdown(&self) -> Result<()> {
        if let Err(e) = self.client.try_disconnect() {
            debug!("MQTT disconnect request not queued: {}", e);
        }

        let task = self.event_task.lock().take();
        if let Some(mut task) = task {
            if tokio::time::timeout(SHUTDOWN_GRACE, &mut task).await.is_err() {
                task.abort();
            }
        }

        info!("MQTT publisher shut down");
        Ok(())
    }
}

/// Poll the event loop until disconnected on request
async fn drive_event_loop(mut event_loop: EventLoop, connected: Arc<AtomicBool>) {
    loop {
        match event_loop.poll().await {
            Ok(Event::Incoming(Packet::ConnAck(ack))) => {
                let accepted = ack.code == ConnectReturnCode::Success;
                connected.store(accepted, Ordering::Relaxed);
                if accepted {
                    info!("✅ Connected to MQTT broker");
                } else {
                    warn!("MQTT connection refused: {}", refusal_reason(ack.code));
                }
            }
            Ok(Event::Outgoing(rumqttc::Outgoing::Disconnect)) => {
                connected.store(false, Ordering::Relaxed);
                debug!("MQTT disconnect sent");
                return;
            }
            Ok(event) => {
                debug!("MQTT event: {:?}", event);
            }
            Err(e) => {
                if connected.swap(false, Ordering::Relaxed) {
                    warn!("MQTT connection lost: {}", e);
                } else {
                    debug!("MQTT connection attempt failed: {}", e);
                }
                tokio::time::sleep(RECONNECT_DELAY).await;
            }
        }
    }
}

fn refusal_reason(code: ConnectReturnCode) -> &'static str {
    match code {
        ConnectReturnCode::Success => "accepted",
        ConnectReturnCode::RefusedProtocolVersion => "incorrect protocol version",
        ConnectReturnCode::BadClientId => "invalid client identifier",
        ConnectReturnCode::ServiceUnavailable => "server unavailable",
        ConnectReturnCode::BadUserNamePassword => "bad username or password",
        ConnectReturnCode::NotAuthorized => "not authorized",
    }
}
