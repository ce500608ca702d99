//! Home Assistant MQTT discovery.
//!
//! The standalone agent announces its entities under the conventional
//! `homeassistant/{domain}/{id}/config` topics (retained), pointing at
//! the same `wizsmith/{device_id}/{domain}/{id}/state` topics the export
//! loop publishes to.

use serde::Serialize;
use tracing::{info, warn};

use crate::publisher::{Qos, StatePublisher};

/// Discovery config payload, serialized to the retained config topic.
#[derive(Debug, Clone, Serialize)]
pub struct DiscoveryConfig {
    pub name: String,
    pub uniq_id: String,
    pub state_topic: String,
    pub qos: u8,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub device_class: Option<String>,
}

/// A device the standalone agent announces to Home Assistant.
#[derive(Debug, Clone)]
pub struct AnnouncedDevice {
    pub id: String,
    pub name: String,
    pub domain: String,
    pub device_class: Option<String>,
}

impl AnnouncedDevice {
    pub fn new(
        id: impl Into<String>,
        name: impl Into<String>,
        domain: impl Into<String>,
    ) -> Self {
        Self {
            id: id.into(),
            name: name.into(),
            domain: domain.into(),
            device_class: None,
        }
    }

    pub fn with_device_class(mut self, device_class: impl Into<String>) -> Self {
        self.device_class = Some(device_class.into());
        self
    }

    pub fn config_topic(&self) -> String {
        format!("homeassistant/{}/{}/config", self.domain, self.id)
    }

    /// State topic for this device, matching what the export loop publishes
    /// for the entity `{domain}.{id}`.
    pub fn state_topic(&self, device_id: &str) -> String {
        format!("wizsmith/{device_id}/{}/{}/state", self.domain, self.id)
    }

    pub fn config_payload(&self, device_id: &str) -> DiscoveryConfig {
        DiscoveryConfig {
            name: self.name.clone(),
            uniq_id: self.id.clone(),
            state_topic: self.state_topic(device_id),
            qos: 0,
            device_class: self.device_class.clone(),
        }
    }
}

/// Publish retained discovery configs for `devices`. Failures are logged
/// per device and do not stop the remaining announcements. Returns the
/// number of successful publishes.
pub async fn announce(
    publisher: &dyn StatePublisher,
    device_id: &str,
    devices: &[AnnouncedDevice],
) -> usize {
    let mut published = 0;
    for device in devices {
        let payload = match serde_json::to_vec(&device.config_payload(device_id)) {
            Ok(payload) => payload,
            Err(e) => {
                warn!(device = %device.id, "discovery payload serialization failed: {e}");
                continue;
            }
        };
        match publisher
            .publish(&device.config_topic(), payload, Qos::AtMostOnce, true)
            .await
        {
            Ok(()) => {
                info!(device = %device.id, topic = %device.config_topic(), "published discovery");
                published += 1;
            }
            Err(e) => warn!(device = %device.id, "discovery publish failed: {e}"),
        }
    }
    published
}
