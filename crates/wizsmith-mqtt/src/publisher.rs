//! Publish capability and its two backends.

use std::time::Duration;

use async_trait::async_trait;
use rumqttc::{AsyncClient, Event, EventLoop, Packet};
use tokio::sync::mpsc;
use tracing::{debug, info, warn};

use crate::config::MqttSettings;
use crate::error::{MqttError, Result};

/// MQTT QoS level.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(u8)]
pub enum Qos {
    AtMostOnce = 0,
    AtLeastOnce = 1,
    ExactlyOnce = 2,
}

impl From<Qos> for rumqttc::QoS {
    fn from(qos: Qos) -> Self {
        match qos {
            Qos::AtMostOnce => rumqttc::QoS::AtMostOnce,
            Qos::AtLeastOnce => rumqttc::QoS::AtLeastOnce,
            Qos::ExactlyOnce => rumqttc::QoS::ExactlyOnce,
        }
    }
}

/// Message received from the broker on a subscribed topic.
#[derive(Debug, Clone)]
pub struct InboundMessage {
    pub topic: String,
    pub payload: Vec<u8>,
    pub retain: bool,
}

/// Message recorded by the in-process backend.
#[derive(Debug, Clone)]
pub struct PublishedMessage {
    pub topic: String,
    pub payload: Vec<u8>,
    pub qos: Qos,
    pub retain: bool,
}

/// The single publish seam the export loop and discovery write through.
#[async_trait]
pub trait StatePublisher: Send + Sync {
    async fn publish(&self, topic: &str, payload: Vec<u8>, qos: Qos, retain: bool) -> Result<()>;
}

/// rumqttc-backed publisher.
#[derive(Clone)]
pub struct MqttPublisher {
    client: AsyncClient,
}

impl MqttPublisher {
    /// Set up the client. Returns the publisher, the driver future that
    /// must be spawned to keep the connection alive, and the stream of
    /// inbound messages for subscribed topics.
    pub fn connect(
        settings: &MqttSettings,
    ) -> (Self, MqttDriver, mpsc::Receiver<InboundMessage>) {
        let (client, eventloop) = AsyncClient::new(settings.options(), 64);
        let (inbound_tx, inbound_rx) = mpsc::channel(256);

        let driver = MqttDriver {
            broker_addr: settings.broker_addr(),
            eventloop,
            inbound: inbound_tx,
            reconnect_delay: Duration::from_secs(5),
        };

        (Self { client }, driver, inbound_rx)
    }

    pub async fn subscribe(&self, topic: &str, qos: Qos) -> Result<()> {
        self.client.subscribe(topic, qos.into()).await?;
        Ok(())
    }
}

#[async_trait]
impl StatePublisher for MqttPublisher {
    async fn publish(&self, topic: &str, payload: Vec<u8>, qos: Qos, retain: bool) -> Result<()> {
        self.client
            .publish(topic, qos.into(), retain, payload)
            .await?;
        Ok(())
    }
}

/// Connection driver. Polls the event loop forever, forwarding inbound
/// publishes and backing off on connection errors. Owned by the task
/// registry and cancelled at shutdown.
pub struct MqttDriver {
    broker_addr: String,
    eventloop: EventLoop,
    inbound: mpsc::Sender<InboundMessage>,
    reconnect_delay: Duration,
}

impl MqttDriver {
    pub async fn run(mut self) {
        loop {
            match self.eventloop.poll().await {
                Ok(Event::Incoming(Packet::ConnAck(_))) => {
                    info!(broker = %self.broker_addr, "connected to MQTT broker");
                }
                Ok(Event::Incoming(Packet::Publish(publish))) => {
                    let message = InboundMessage {
                        topic: publish.topic,
                        payload: publish.payload.to_vec(),
                        retain: publish.retain,
                    };
                    if self.inbound.send(message).await.is_err() {
                        debug!("inbound receiver dropped, discarding message");
                    }
                }
                Ok(_) => {}
                Err(e) => {
                    warn!(broker = %self.broker_addr, "MQTT connection error: {e}");
                    tokio::time::sleep(self.reconnect_delay).await;
                }
            }
        }
    }
}

/// In-process backend: publishes land on a channel instead of a broker.
/// Stands in for a host-provided MQTT facade and backs the tests.
#[derive(Clone)]
pub struct ChannelPublisher {
    tx: mpsc::UnboundedSender<PublishedMessage>,
}

impl ChannelPublisher {
    pub fn new() -> (Self, mpsc::UnboundedReceiver<PublishedMessage>) {
        let (tx, rx) = mpsc::unbounded_channel();
        (Self { tx }, rx)
    }
}

#[async_trait]
impl StatePublisher for ChannelPublisher {
    async fn publish(&self, topic: &str, payload: Vec<u8>, qos: Qos, retain: bool) -> Result<()> {
        self.tx
            .send(PublishedMessage {
                topic: topic.to_string(),
                payload,
                qos,
                retain,
            })
            .map_err(|_| MqttError::ChannelClosed)
    }
}
