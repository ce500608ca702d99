//! Zero-touch provisioning.
//!
//! On first run the bridge ensures two remote assets exist:
//!
//! - an **agent asset** named `wizsmith-pi-{device_id}`, carrying the MQTT
//!   host/port in its configuration block, and
//! - a child asset named `HA Sensors` holding the writable JSON attribute
//!   `sensors_json` the export loop posts its batch to.
//!
//! Both steps query by name before creating, so re-running provisioning
//! with the same device identity never duplicates assets. Provisioning
//! failures are never fatal: the context stays partially populated and the
//! REST export leg is skipped while MQTT export continues.

use serde_json::json;
use tracing::{debug, info, warn};

use crate::client::{AssetParent, NewAsset, NewAttribute, OpenRemoteClient};

/// Prefix of the per-device agent asset name.
pub const AGENT_NAME_PREFIX: &str = "wizsmith-pi-";

/// Name of the child asset holding the sensor batch attribute.
pub const CHILD_ASSET_NAME: &str = "HA Sensors";

/// Name of the JSON attribute the batch is posted to.
pub const CHILD_ATTRIBUTE: &str = "sensors_json";

/// Identifiers produced by provisioning. Written once during setup and
/// read-only afterwards; remote export runs only when complete.
#[derive(Debug, Clone, Default)]
pub struct ProvisioningContext {
    pub agent_asset_id: Option<String>,
    pub child_asset_id: Option<String>,
    pub child_attribute: Option<String>,
}

impl ProvisioningContext {
    /// All identifiers resolved; the REST export leg is enabled.
    pub fn is_complete(&self) -> bool {
        self.export_target().is_some()
    }

    /// The (child asset id, attribute name) pair the batch is posted to.
    pub fn export_target(&self) -> Option<(&str, &str)> {
        match (
            self.agent_asset_id.as_deref(),
            self.child_asset_id.as_deref(),
            self.child_attribute.as_deref(),
        ) {
            (Some(_), Some(child), Some(attribute)) => Some((child, attribute)),
            _ => None,
        }
    }
}

/// Ensures the remote assets for one device identity exist.
pub struct Provisioner<'a> {
    client: &'a OpenRemoteClient,
    device_id: String,
    mqtt_host: String,
    mqtt_port: u16,
}

impl<'a> Provisioner<'a> {
    pub fn new(
        client: &'a OpenRemoteClient,
        device_id: impl Into<String>,
        mqtt_host: impl Into<String>,
        mqtt_port: u16,
    ) -> Self {
        Self {
            client,
            device_id: device_id.into(),
            mqtt_host: mqtt_host.into(),
            mqtt_port,
        }
    }

    /// The agent asset name for this device identity.
    pub fn agent_name(&self) -> String {
        format!("{AGENT_NAME_PREFIX}{}", self.device_id)
    }

    /// Run the full provisioning sequence. Each step that fails leaves the
    /// context partial and skips the remaining steps.
    pub async fn provision(&self) -> ProvisioningContext {
        let mut context = ProvisioningContext::default();

        let Some(agent_id) = self.ensure_agent().await else {
            warn!("provisioning incomplete, remote export disabled for this session");
            return context;
        };
        context.agent_asset_id = Some(agent_id.clone());

        if let Some((child_id, attribute)) = self.ensure_child(&agent_id).await {
            context.child_asset_id = Some(child_id);
            context.child_attribute = Some(attribute);
            info!(agent = %agent_id, "provisioning complete");
        } else {
            warn!("provisioning incomplete, remote export disabled for this session");
        }

        context
    }

    /// Query-or-create the agent asset. Returns `None` on any HTTP failure.
    pub async fn ensure_agent(&self) -> Option<String> {
        let name = self.agent_name();

        let existing = match self.client.query_assets(&name, None).await {
            Ok(items) => items.into_iter().next(),
            Err(e) => {
                warn!("agent asset query failed: {e}");
                return None;
            }
        };
        if let Some(asset) = existing {
            debug!(id = %asset.id, "agent asset already provisioned");
            return Some(asset.id);
        }

        let asset = NewAsset {
            name,
            description: Some("WizSmith auto-provisioned MQTTAgent".to_string()),
            configuration: Some(json!({
                "host": self.mqtt_host,
                "port": self.mqtt_port,
            })),
            parent: None,
        };
        match self.client.create_asset(&asset).await {
            Ok(id) => {
                info!(id = %id, "created agent asset");
                Some(id)
            }
            Err(e) => {
                warn!("create agent asset failed: {e}");
                None
            }
        }
    }

    /// Query-or-create the `HA Sensors` child under `agent_id` and make
    /// sure its JSON attribute exists. Attribute creation is fire-and-forget
    /// relative to the returned target.
    pub async fn ensure_child(&self, agent_id: &str) -> Option<(String, String)> {
        let existing = match self
            .client
            .query_assets(CHILD_ASSET_NAME, Some(agent_id))
            .await
        {
            Ok(items) => items
                .into_iter()
                .find(|asset| asset.parent_id.as_deref() == Some(agent_id)),
            Err(e) => {
                warn!("child asset query failed: {e}");
                return None;
            }
        };
        if let Some(asset) = existing {
            debug!(id = %asset.id, "child asset already provisioned");
            return Some((asset.id, CHILD_ATTRIBUTE.to_string()));
        }

        let child = NewAsset {
            name: CHILD_ASSET_NAME.to_string(),
            description: None,
            configuration: None,
            parent: Some(AssetParent {
                id: agent_id.to_string(),
            }),
        };
        let child_id = match self.client.create_asset(&child).await {
            Ok(id) => id,
            Err(e) => {
                warn!("create child asset failed: {e}");
                return None;
            }
        };

        if let Err(e) = self
            .client
            .create_attribute(&child_id, &NewAttribute::json(CHILD_ATTRIBUTE))
            .await
        {
            warn!("create sensors attribute failed: {e}");
        }

        info!(id = %child_id, "created child asset");
        Some((child_id, CHILD_ATTRIBUTE.to_string()))
    }
}
