//! MQTT publish capability for the WizSmith bridge.
//!
//! The export loop talks to a single [`StatePublisher`] trait with two
//! interchangeable backends selected at wiring time:
//!
//! - [`MqttPublisher`]: a rumqttc `AsyncClient` with a background driver
//!   task feeding inbound messages (the command topic) into a channel.
//! - [`ChannelPublisher`]: an in-process backend standing in for a
//!   host-provided MQTT facade; also the test double.
//!
//! This unifies the two formerly divergent publish paths (raw client in the
//! add-on agent, host facade in the integration).

pub mod commands;
pub mod config;
pub mod discovery;
pub mod error;
pub mod publisher;

pub use commands::{parse_command_topic, COMMAND_TOPIC_FILTER};
pub use config::MqttSettings;
pub use discovery::{AnnouncedDevice, DiscoveryConfig};
pub use error::{MqttError, Result};
pub use publisher::{
    ChannelPublisher, InboundMessage, MqttDriver, MqttPublisher, PublishedMessage, Qos,
    StatePublisher,
};
