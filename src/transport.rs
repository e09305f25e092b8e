//! Publish/subscribe transport.
//!
//! The engine only sees the [`Transport`] trait: publish is non-blocking
//! and fire-and-forget, inbound request payloads arrive over a bounded
//! channel drained by the scheduler loop. The production implementation
//! rides on rumqttc; connectivity recovery lives in its event loop, outside
//! the session logic.

use crate::error::{DeviceError, DeviceResult};
use rumqttc::{AsyncClient, Event, MqttOptions, Packet, QoS};
use std::time::Duration;
use tokio::sync::mpsc;
use tokio::task::JoinHandle;

use crate::config::MqttConfig;

/// Outbound message sink
pub trait Transport {
    /// Publish one payload; errors mean the report is dropped, never queued
    fn publish(&self, topic: &str, payload: String) -> DeviceResult<()>;
}

/// MQTT transport backed by rumqttc
pub struct MqttTransport {
    client: AsyncClient,
    qos: QoS,
    _event_loop_handle: JoinHandle<()>,
}

impl MqttTransport {
    /// Connect to the broker, subscribe to the device request topic and
    /// spawn the event loop task.
    ///
    /// Returns the transport plus the receiver carrying raw inbound request
    /// payloads. The channel holds a single message: the device answers one
    /// request per iteration and a newer request simply wins.
    pub async fn connect(
        config: &MqttConfig,
        request_topic: &str,
    ) -> DeviceResult<(Self, mpsc::Receiver<Vec<u8>>)> {
        let (host, port) = parse_broker_url(&config.broker_url)?;
        let qos = qos_from_level(config.qos)?;

        log::info!(
            "Connecting to MQTT broker at {}:{} as {}",
            host,
            port,
            config.client_id
        );

        let mut options = MqttOptions::new(&config.client_id, host, port);
        options.set_keep_alive(Duration::from_secs(30));

        let (client, mut event_loop) = AsyncClient::new(options, 10);

        client
            .subscribe(request_topic, qos)
            .await
            .map_err(|e| DeviceError::Transport(format!("subscribe failed: {}", e)))?;
        log::info!("Subscribed to request topic: {}", request_topic);

        let (request_tx, request_rx) = mpsc::channel::<Vec<u8>>(1);
        let topic_filter = request_topic.to_string();

        let event_loop_handle = tokio::spawn(async move {
            loop {
                match event_loop.poll().await {
                    Ok(Event::Incoming(Packet::Publish(publish))) => {
                        if publish.topic == topic_filter {
                            // Last-request-wins: a full channel means the
                            // previous request is still unhandled this tick
                            if request_tx.try_send(publish.payload.to_vec()).is_err() {
                                log::debug!("request channel busy, dropping older request");
                            }
                        }
                    }
                    Ok(notification) => {
                        log::trace!("MQTT notification: {:?}", notification);
                    }
                    Err(e) => {
                        // Blocking recovery: session logic idles while the
                        // broker is unreachable
                        log::error!("MQTT connection error: {}", e);
                        tokio::time::sleep(Duration::from_secs(1)).await;
                    }
                }
            }
        });

        Ok((
            MqttTransport {
                client,
                qos,
                _event_loop_handle: event_loop_handle,
            },
            request_rx,
        ))
    }
}

impl Transport for MqttTransport {
    fn publish(&self, topic: &str, payload: String) -> DeviceResult<()> {
        self.client
            .try_publish(topic, self.qos, false, payload.into_bytes())
            .map_err(|e| DeviceError::Transport(format!("publish to {} failed: {}", topic, e)))
    }
}

fn qos_from_level(level: u8) -> DeviceResult<QoS> {
    match level {
        0 => Ok(QoS::AtMostOnce),
        1 => Ok(QoS::AtLeastOnce),
        2 => Ok(QoS::ExactlyOnce),
        other => Err(DeviceError::Config(format!("invalid QoS level {}", other))),
    }
}

/// Parse an MQTT broker URL into host and port
///
/// Supports:
/// - mqtt://localhost:1883
/// - mqtt://192.168.1.100:1883
/// - mqtts://broker.example.com:8883
pub fn parse_broker_url(url: &str) -> DeviceResult<(String, u16)> {
    let without_protocol = url
        .strip_prefix("mqtt://")
        .or_else(|| url.strip_prefix("mqtts://"))
        .ok_or_else(|| {
            DeviceError::Config(format!(
                "invalid MQTT URL {} (must start with mqtt:// or mqtts://)",
                url
            ))
        })?;

    if let Some((host, port_str)) = without_protocol.split_once(':') {
        let port = port_str
            .parse::<u16>()
            .map_err(|_| DeviceError::Config(format!("invalid port in MQTT URL {}", url)))?;
        Ok((host.to_string(), port))
    } else {
        Ok((without_protocol.to_string(), 1883))
    }
}

/// In-memory transport recording everything published, for tests.
///
/// Clones share the same log, so a test can hand one handle to the gateway
/// and keep another for assertions.
#[cfg(test)]
#[derive(Clone)]
pub struct MemoryTransport {
    sent: std::sync::Arc<std::sync::Mutex<Vec<(String, String)>>>,
}

#[cfg(test)]
impl MemoryTransport {
    pub fn new() -> Self {
        MemoryTransport {
            sent: std::sync::Arc::new(std::sync::Mutex::new(Vec::new())),
        }
    }

    pub fn sent(&self) -> Vec<(String, String)> {
        self.sent.lock().unwrap().clone()
    }
}

#[cfg(test)]
impl Transport for MemoryTransport {
    fn publish(&self, topic: &str, payload: String) -> DeviceResult<()> {
        self.sent
            .lock()
            .unwrap()
            .push((topic.to_string(), payload));
        Ok(())
    }
}

/// Transport that rejects every publish, for exercising the
/// fire-and-forget policy in tests.
#[cfg(test)]
pub struct OfflineTransport;

#[cfg(test)]
impl Transport for OfflineTransport {
    fn publish(&self, topic: &str, _payload: String) -> DeviceResult<()> {
        Err(DeviceError::Transport(format!(
            "offline, dropped publish to {}",
            topic
        )))
    }
}
