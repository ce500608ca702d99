//! WizSmith bridge runtime.
//!
//! Ties the pieces together: durable device identity, the MQTT publish
//! capability, OpenRemote authentication and provisioning, the periodic
//! export loop, command forwarding and the one-shot release check.
//!
//! Setup ordering matters: authentication and provisioning complete (or
//! fail) before the export loop's first cycle, so the resulting
//! [`ProvisioningContext`] is written once and only read afterwards.
//!
//! [`ProvisioningContext`]: wizsmith_openremote::ProvisioningContext

pub mod commands;
pub mod export;
pub mod release;
pub mod tasks;

use std::sync::Arc;

use tracing::{info, warn};

use wizsmith_core::{DeviceIdentity, EntityRegistry, Settings};
use wizsmith_mqtt::{AnnouncedDevice, MqttPublisher, MqttSettings, Qos, COMMAND_TOPIC_FILTER};
use wizsmith_openremote::{Credentials, OpenRemoteClient, Provisioner};

pub use export::{CycleSummary, RemoteTarget, StateExporter};
pub use tasks::TaskRegistry;

/// The assembled bridge, ready to start.
pub struct Bridge {
    settings: Settings,
    device_id: DeviceIdentity,
    registry: Arc<dyn EntityRegistry>,
    discovery: Vec<AnnouncedDevice>,
}

impl Bridge {
    pub fn new(
        settings: Settings,
        device_id: DeviceIdentity,
        registry: Arc<dyn EntityRegistry>,
    ) -> Self {
        Self {
            settings,
            device_id,
            registry,
            discovery: Vec::new(),
        }
    }

    /// Announce these devices via Home Assistant MQTT discovery at startup
    /// (standalone agent deployments).
    pub fn with_discovery(mut self, devices: Vec<AnnouncedDevice>) -> Self {
        self.discovery = devices;
        self
    }

    /// Start every background task. Setup degradations (failed auth,
    /// partial provisioning) disable the affected leg and are reported
    /// through logs; they never abort startup.
    pub async fn start(self) -> TaskRegistry {
        let mut tasks = TaskRegistry::new();

        info!(device = %self.device_id, "starting WizSmith bridge");

        // MQTT leg. The connection is established lazily by the driver,
        // which retries on its own; publish failures surface per cycle.
        let mut mqtt_settings = MqttSettings::new(&self.settings.mqtt_host)
            .with_port(self.settings.mqtt_port)
            .with_client_id(format!("WizSmithHA-{}", self.device_id));
        if let (Some(user), Some(pass)) = (
            self.settings.mqtt_user.clone(),
            self.settings.mqtt_pass.clone(),
        ) {
            mqtt_settings = mqtt_settings.with_auth(user, pass);
        }
        let (publisher, driver, inbound) = MqttPublisher::connect(&mqtt_settings);
        tasks.spawn("mqtt-driver", driver.run());

        if !self.discovery.is_empty() {
            wizsmith_mqtt::discovery::announce(&publisher, self.device_id.as_str(), &self.discovery)
                .await;
        }

        // OpenRemote leg: authenticate, then provision. Both must settle
        // before the export loop starts.
        let remote = match self.settings.openremote_url.as_deref() {
            Some(base_url) => {
                let client = Arc::new(OpenRemoteClient::new(
                    base_url,
                    &self.settings.openremote_realm,
                    Credentials {
                        username: self.settings.openremote_user.clone(),
                        password: self.settings.openremote_pass.clone(),
                        client_id: self.settings.openremote_client_id.clone(),
                        client_secret: self.settings.openremote_client_secret.clone(),
                    },
                ));
                match client.authenticate().await {
                    Ok(_) => {
                        let provisioner = Provisioner::new(
                            &client,
                            self.device_id.as_str(),
                            &self.settings.mqtt_host,
                            self.settings.mqtt_port,
                        );
                        let context = provisioner.provision().await;
                        Some(RemoteTarget {
                            client: Arc::clone(&client),
                            context,
                        })
                    }
                    Err(e) => {
                        warn!("OpenRemote authentication failed, remote export disabled for this session: {e}");
                        None
                    }
                }
            }
            None => {
                info!("no OpenRemote URL configured, running MQTT-only");
                None
            }
        };

        // Command forwarding rides on the same authenticated client.
        if let Some(remote) = &remote {
            match publisher.subscribe(COMMAND_TOPIC_FILTER, Qos::AtMostOnce).await {
                Ok(()) => {
                    tasks.spawn(
                        "command-forwarder",
                        commands::forward_commands(
                            inbound,
                            Arc::clone(&remote.client),
                            tasks.stop_signal(),
                        ),
                    );
                }
                Err(e) => warn!("command topic subscription failed: {e}"),
            }
        }

        let exporter = StateExporter::new(
            self.device_id.as_str(),
            self.registry,
            Arc::new(publisher),
            remote,
        );
        tasks.spawn(
            "export-loop",
            exporter.run(self.settings.sync_interval(), tasks.stop_signal()),
        );

        let repo = self.settings.github_repo.clone();
        tasks.spawn("release-check", async move {
            release::check_once(
                &reqwest::Client::new(),
                release::GITHUB_API_BASE,
                &repo,
                wizsmith_core::VERSION,
            )
            .await;
        });

        tasks
    }
}
