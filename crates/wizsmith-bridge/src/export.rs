//! The periodic state export loop.
//!
//! Each cycle snapshots the host registry, publishes one MQTT message per
//! `sensor`/`binary_sensor` entity and posts the accumulated batch to the
//! provisioned OpenRemote attribute. The two legs have independent failure
//! domains: a failed publish never stops the rest of the cycle, and a
//! failed batch POST never blocks the next scheduled cycle.

use std::sync::Arc;
use std::time::Duration;

use serde_json::{json, Value};
use tokio::sync::watch;
use tracing::{debug, info, warn};

use wizsmith_core::{EntityRegistry, EntitySnapshot};
use wizsmith_mqtt::{Qos, StatePublisher};
use wizsmith_openremote::{OpenRemoteClient, ProvisioningContext};

/// Entity domains relayed by the export loop.
pub const EXPORTED_DOMAINS: [&str; 2] = ["sensor", "binary_sensor"];

/// MQTT topic for one entity's state.
pub fn entity_topic(device_id: &str, snapshot: &EntitySnapshot) -> String {
    format!(
        "wizsmith/{device_id}/{}/{}/state",
        snapshot.domain, snapshot.object_id
    )
}

/// Per-entity payload, also accumulated into the batch keyed by topic.
pub fn entity_payload(snapshot: &EntitySnapshot) -> Value {
    json!({
        "entity_id": snapshot.entity_id,
        "state": snapshot.state,
        "attributes": snapshot.attributes,
        "last_changed": snapshot.last_changed.to_rfc3339(),
    })
}

/// The REST leg of the export: the provisioned attribute to post batches to.
pub struct RemoteTarget {
    pub client: Arc<OpenRemoteClient>,
    pub context: ProvisioningContext,
}

/// Outcome of a single export cycle, for logging.
#[derive(Debug, Default, Clone, PartialEq, Eq)]
pub struct CycleSummary {
    pub published: usize,
    pub publish_failures: usize,
    pub batch_posted: bool,
}

/// Periodic batched state exporter.
pub struct StateExporter {
    device_id: String,
    registry: Arc<dyn EntityRegistry>,
    publisher: Arc<dyn StatePublisher>,
    remote: Option<RemoteTarget>,
}

impl StateExporter {
    pub fn new(
        device_id: impl Into<String>,
        registry: Arc<dyn EntityRegistry>,
        publisher: Arc<dyn StatePublisher>,
        remote: Option<RemoteTarget>,
    ) -> Self {
        Self {
            device_id: device_id.into(),
            registry,
            publisher,
            remote,
        }
    }

    /// Run one export cycle. Never fails; every error is logged and scoped
    /// to the entity or leg it occurred in.
    pub async fn run_cycle(&self) -> CycleSummary {
        let mut snapshots: Vec<EntitySnapshot> = self
            .registry
            .snapshot_all()
            .await
            .into_iter()
            .filter(|s| EXPORTED_DOMAINS.contains(&s.domain.as_str()))
            .collect();
        snapshots.sort_by(|a, b| a.entity_id.cmp(&b.entity_id));

        let mut summary = CycleSummary::default();
        let mut batch = serde_json::Map::new();

        for snapshot in &snapshots {
            let topic = entity_topic(&self.device_id, snapshot);
            let payload = entity_payload(snapshot);

            let bytes = match serde_json::to_vec(&payload) {
                Ok(bytes) => bytes,
                Err(e) => {
                    warn!(topic = %topic, "payload serialization failed: {e}");
                    continue;
                }
            };
            match self
                .publisher
                .publish(&topic, bytes, Qos::AtLeastOnce, false)
                .await
            {
                Ok(()) => summary.published += 1,
                Err(e) => {
                    warn!(topic = %topic, "MQTT publish failed: {e}");
                    summary.publish_failures += 1;
                }
            }

            // The batch carries every entity, including ones whose MQTT
            // publish failed; the two legs fail independently.
            batch.insert(topic, payload);
        }

        if let Some(remote) = &self.remote {
            match remote.context.export_target() {
                Some((child_id, attribute)) => {
                    match remote
                        .client
                        .update_attribute(child_id, attribute, &Value::Object(batch))
                        .await
                    {
                        Ok(()) => summary.batch_posted = true,
                        Err(e) => warn!("OpenRemote batch post failed: {e}"),
                    }
                }
                None => debug!("provisioning incomplete, skipping remote export"),
            }
        }

        summary
    }

    /// Run cycles until `stop` flips. The sleep happens after each cycle,
    /// so a slow cycle delays the next one instead of overlapping it.
    pub async fn run(self, period: Duration, mut stop: watch::Receiver<bool>) {
        loop {
            let summary = self.run_cycle().await;
            debug!(
                published = summary.published,
                failures = summary.publish_failures,
                batch_posted = summary.batch_posted,
                "export cycle finished"
            );

            tokio::select! {
                _ = tokio::time::sleep(period) => {}
                changed = stop.changed() => {
                    // A dropped sender counts as a stop signal.
                    if changed.is_err() || *stop.borrow() {
                        info!("export loop stopped");
                        return;
                    }
                }
            }
        }
    }
}
