//! Command-line interface for the WizSmith bridge.

use std::collections::HashMap;
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use anyhow::{Context, Result};
use clap::{Parser, Subcommand};

use wizsmith_bridge::Bridge;
use wizsmith_core::{settings::defaults, EntitySnapshot, IdentityStore, InMemoryRegistry, Settings};
use wizsmith_mqtt::AnnouncedDevice;

/// How long background tasks get to wind down after a shutdown signal.
const SHUTDOWN_GRACE: Duration = Duration::from_secs(10);

/// WizSmith - relay Home Assistant entity state to MQTT and OpenRemote.
#[derive(Parser, Debug)]
#[command(name = "wizsmith")]
#[command(author, version, about, long_about = None)]
struct Args {
    /// Action to perform.
    #[command(subcommand)]
    command: Command,

    /// Verbose output.
    #[arg(short, long, global = true)]
    verbose: bool,
}

/// Available commands.
#[derive(Subcommand, Debug)]
enum Command {
    /// Run the bridge until Ctrl+C or SIGTERM.
    Run {
        /// JSON file with stored config-entry data (highest precedence).
        #[arg(long)]
        entry: Option<PathBuf>,
        /// Add-on options file.
        #[arg(long, default_value = defaults::OPTIONS_PATH)]
        options: PathBuf,
        /// Where the durable device identity is persisted.
        #[arg(long, default_value = "/data/wizsmith_pi_id")]
        identity: PathBuf,
        /// Announce the built-in Pi sensors via MQTT discovery
        /// (standalone agent deployments without a Home Assistant host).
        #[arg(long)]
        standalone: bool,
    },
    /// Query GitHub for a newer release and exit.
    CheckUpdate,
}

#[tokio::main]
async fn main() -> Result<()> {
    let args = Args::parse();

    init_logging(args.verbose);

    match args.command {
        Command::Run {
            entry,
            options,
            identity,
            standalone,
        } => run(entry, options, identity, standalone).await,
        Command::CheckUpdate => check_update().await,
    }
}

fn init_logging(verbose: bool) {
    let default_directive = if verbose { "wizsmith=debug" } else { "wizsmith=info" };
    let env_filter = tracing_subscriber::EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| {
            tracing_subscriber::EnvFilter::new(default_directive)
                .add_directive(tracing::Level::INFO.into())
        });

    // JSON format for container deployments, compact otherwise.
    let json_logging = std::env::var("WIZSMITH_LOG_JSON")
        .ok()
        .and_then(|v| v.parse().ok())
        .unwrap_or(false);

    if json_logging {
        tracing_subscriber::fmt()
            .json()
            .with_env_filter(env_filter)
            .with_target(true)
            .init();
    } else {
        tracing_subscriber::fmt()
            .with_env_filter(env_filter)
            .with_target(false)
            .compact()
            .init();
    }
}

async fn run(
    entry: Option<PathBuf>,
    options: PathBuf,
    identity: PathBuf,
    standalone: bool,
) -> Result<()> {
    let entry_data = match entry {
        Some(path) => load_entry_file(&path)?,
        None => HashMap::new(),
    };
    let settings = Settings::load(entry_data, &options).context("invalid configuration")?;

    let device_id = IdentityStore::new(identity).get_or_create();

    let registry = InMemoryRegistry::shared();
    let mut bridge = Bridge::new(settings, device_id, registry.clone());
    if standalone {
        seed_builtin_devices(&registry).await;
        bridge = bridge.with_discovery(builtin_discovery());
    }

    let tasks = bridge.start().await;

    shutdown_signal().await;
    tasks.shutdown(SHUTDOWN_GRACE).await;
    tracing::info!("bridge stopped");

    Ok(())
}

async fn check_update() -> Result<()> {
    let settings = Settings::from_map(&HashMap::new()).context("invalid configuration")?;
    wizsmith_bridge::release::check_once(
        &reqwest::Client::new(),
        wizsmith_bridge::release::GITHUB_API_BASE,
        &settings.github_repo,
        wizsmith_core::VERSION,
    )
    .await;
    Ok(())
}

fn load_entry_file(path: &std::path::Path) -> Result<HashMap<String, serde_json::Value>> {
    let contents = std::fs::read_to_string(path)
        .with_context(|| format!("could not read entry file {}", path.display()))?;
    serde_json::from_str(&contents)
        .with_context(|| format!("entry file {} is not a JSON object", path.display()))
}

/// The sensors the standalone agent exposes on its own.
fn builtin_discovery() -> Vec<AnnouncedDevice> {
    vec![
        AnnouncedDevice::new("rpi_power_status", "RPi Power status", "binary_sensor")
            .with_device_class("problem"),
        AnnouncedDevice::new("cpu_temp", "CPU Temperature", "sensor")
            .with_device_class("temperature"),
    ]
}

async fn seed_builtin_devices(registry: &Arc<InMemoryRegistry>) {
    for snapshot in [
        EntitySnapshot::new("binary_sensor.rpi_power_status", "off"),
        EntitySnapshot::new("sensor.cpu_temp", "unknown"),
    ]
    .into_iter()
    .flatten()
    {
        registry.upsert(snapshot).await;
    }
}

/// Wait for shutdown signal (Ctrl+C or SIGTERM).
async fn shutdown_signal() {
    let ctrl_c = async {
        if tokio::signal::ctrl_c().await.is_err() {
            tracing::error!("failed to install Ctrl+C handler");
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate()) {
            Ok(mut signal) => {
                signal.recv().await;
            }
            Err(_) => {
                tracing::error!("failed to install SIGTERM handler");
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {
            tracing::info!("received Ctrl+C, starting graceful shutdown");
        }
        _ = terminate => {
            tracing::info!("received SIGTERM, starting graceful shutdown");
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn entry_file_round_trips() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("entry.json");
        std::fs::write(&path, r#"{"mqtt_host":"broker.local","mqtt_port":2883}"#).unwrap();

        let entry = load_entry_file(&path).unwrap();
        let settings = Settings::from_map(&entry).unwrap();
        assert_eq!(settings.mqtt_host, "broker.local");
        assert_eq!(settings.mqtt_port, 2883);
    }

    #[test]
    fn malformed_entry_file_is_an_error() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("entry.json");
        std::fs::write(&path, "not json").unwrap();
        assert!(load_entry_file(&path).is_err());
    }

    #[test]
    fn builtin_devices_have_discovery_configs() {
        let devices = builtin_discovery();
        assert_eq!(devices.len(), 2);
        assert_eq!(
            devices[0].config_topic(),
            "homeassistant/binary_sensor/rpi_power_status/config"
        );
    }
}
