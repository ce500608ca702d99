//! Bridge configuration.
//!
//! Settings are merged from three sources, highest precedence first:
//!
//! 1. stored config-entry data (what the user typed in the setup form),
//! 2. the add-on options file (`/data/options.json` in the add-on build),
//! 3. built-in defaults.
//!
//! A key present in the stored entry is never overridden by the options
//! file or a default.

use std::collections::HashMap;
use std::fs;
use std::path::Path;

use serde_json::Value;
use tracing::debug;

use crate::error::{Error, Result};

/// Recognized configuration keys.
pub mod keys {
    pub const MQTT_HOST: &str = "mqtt_host";
    pub const MQTT_PORT: &str = "mqtt_port";
    pub const MQTT_USER: &str = "mqtt_user";
    pub const MQTT_PASS: &str = "mqtt_pass";

    pub const OPENREMOTE_URL: &str = "openremote_url";
    pub const OPENREMOTE_USER: &str = "openremote_user";
    pub const OPENREMOTE_PASS: &str = "openremote_pass";
    pub const OPENREMOTE_CLIENT_ID: &str = "openremote_client_id";
    pub const OPENREMOTE_CLIENT_SECRET: &str = "openremote_client_secret";
    pub const OPENREMOTE_REALM: &str = "openremote_realm";

    pub const SYNC_INTERVAL: &str = "sync_interval";
    pub const GITHUB_REPO: &str = "github_repo";
}

/// Built-in defaults.
pub mod defaults {
    pub const MQTT_HOST: &str = "core-mosquitto";
    pub const MQTT_PORT: u16 = 1883;
    pub const SYNC_INTERVAL_SECS: u64 = 30;
    pub const OPENREMOTE_REALM: &str = "master";
    pub const GITHUB_REPO: &str = "joel-Y/wizhub";

    /// Options file written by the add-on supervisor.
    pub const OPTIONS_PATH: &str = "/data/options.json";
}

/// Fully resolved bridge configuration.
#[derive(Debug, Clone)]
pub struct Settings {
    pub mqtt_host: String,
    pub mqtt_port: u16,
    pub mqtt_user: Option<String>,
    pub mqtt_pass: Option<String>,

    pub openremote_url: Option<String>,
    pub openremote_user: Option<String>,
    pub openremote_pass: Option<String>,
    pub openremote_client_id: Option<String>,
    pub openremote_client_secret: Option<String>,
    pub openremote_realm: String,

    /// Export cycle period in seconds, always > 0.
    pub sync_interval_secs: u64,
    pub github_repo: String,
}

impl Settings {
    /// Merge stored entry data with the options file at `options_path` and
    /// the built-in defaults.
    pub fn load(entry: HashMap<String, Value>, options_path: &Path) -> Result<Self> {
        let mut merged = entry;

        match fs::read_to_string(options_path) {
            Ok(contents) => match serde_json::from_str::<HashMap<String, Value>>(&contents) {
                Ok(options) => {
                    for (key, value) in options {
                        // A blank entry value must not shadow the options
                        // file; blanks count as absent at every layer.
                        if merged.get(&key).is_none_or(is_blank) {
                            merged.insert(key, value);
                        }
                    }
                }
                Err(e) => debug!(path = %options_path.display(), error = %e, "options file is not valid JSON"),
            },
            Err(e) => debug!(path = %options_path.display(), error = %e, "no add-on options file"),
        }

        Self::from_map(&merged)
    }

    /// Resolve settings from an already-merged key-value map.
    pub fn from_map(map: &HashMap<String, Value>) -> Result<Self> {
        let sync_interval_secs =
            get_u64(map, keys::SYNC_INTERVAL).unwrap_or(defaults::SYNC_INTERVAL_SECS);
        if sync_interval_secs == 0 {
            return Err(Error::InvalidSetting {
                key: keys::SYNC_INTERVAL,
                reason: "must be greater than zero".to_string(),
            });
        }

        let mqtt_port = match get_u64(map, keys::MQTT_PORT) {
            Some(port) => u16::try_from(port).map_err(|_| Error::InvalidSetting {
                key: keys::MQTT_PORT,
                reason: format!("{port} is out of range"),
            })?,
            None => defaults::MQTT_PORT,
        };

        Ok(Self {
            mqtt_host: get_string(map, keys::MQTT_HOST)
                .unwrap_or_else(|| defaults::MQTT_HOST.to_string()),
            mqtt_port,
            mqtt_user: get_string(map, keys::MQTT_USER),
            mqtt_pass: get_string(map, keys::MQTT_PASS),
            openremote_url: get_string(map, keys::OPENREMOTE_URL)
                .map(|url| url.trim_end_matches('/').to_string()),
            openremote_user: get_string(map, keys::OPENREMOTE_USER),
            openremote_pass: get_string(map, keys::OPENREMOTE_PASS),
            openremote_client_id: get_string(map, keys::OPENREMOTE_CLIENT_ID),
            openremote_client_secret: get_string(map, keys::OPENREMOTE_CLIENT_SECRET),
            openremote_realm: get_string(map, keys::OPENREMOTE_REALM)
                .unwrap_or_else(|| defaults::OPENREMOTE_REALM.to_string()),
            sync_interval_secs,
            github_repo: get_string(map, keys::GITHUB_REPO)
                .unwrap_or_else(|| defaults::GITHUB_REPO.to_string()),
        })
    }

    pub fn sync_interval(&self) -> std::time::Duration {
        std::time::Duration::from_secs(self.sync_interval_secs)
    }
}

/// A blank string, as produced by an empty form field.
fn is_blank(value: &Value) -> bool {
    matches!(value, Value::String(s) if s.trim().is_empty())
}

/// String value lookup. Empty strings count as absent so that blank form
/// fields don't shadow the options file or defaults.
fn get_string(map: &HashMap<String, Value>, key: &str) -> Option<String> {
    match map.get(key) {
        Some(Value::String(s)) if !s.trim().is_empty() => Some(s.trim().to_string()),
        Some(Value::Number(n)) => Some(n.to_string()),
        _ => None,
    }
}

/// Integer lookup accepting both JSON numbers and numeric strings (the
/// options form serializes everything as strings).
fn get_u64(map: &HashMap<String, Value>, key: &str) -> Option<u64> {
    match map.get(key) {
        Some(Value::Number(n)) => n.as_u64(),
        Some(Value::String(s)) => s.trim().parse().ok(),
        _ => None,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;
    use std::io::Write;

    fn entry(pairs: &[(&str, Value)]) -> HashMap<String, Value> {
        pairs
            .iter()
            .map(|(k, v)| (k.to_string(), v.clone()))
            .collect()
    }

    #[test]
    fn defaults_apply_when_nothing_is_configured() {
        let settings = Settings::from_map(&HashMap::new()).unwrap();
        assert_eq!(settings.mqtt_host, "core-mosquitto");
        assert_eq!(settings.mqtt_port, 1883);
        assert_eq!(settings.sync_interval_secs, 30);
        assert_eq!(settings.openremote_realm, "master");
        assert_eq!(settings.github_repo, "joel-Y/wizhub");
        assert!(settings.openremote_url.is_none());
    }

    #[test]
    fn entry_data_wins_over_options_file() {
        let dir = tempfile::tempdir().unwrap();
        let options_path = dir.path().join("options.json");
        let mut file = fs::File::create(&options_path).unwrap();
        write!(
            file,
            "{}",
            json!({ "mqtt_host": "from-options", "mqtt_port": 2883 })
        )
        .unwrap();

        let settings = Settings::load(
            entry(&[("mqtt_host", json!("from-entry"))]),
            &options_path,
        )
        .unwrap();

        assert_eq!(settings.mqtt_host, "from-entry");
        // Options still fill keys the entry does not carry.
        assert_eq!(settings.mqtt_port, 2883);
    }

    #[test]
    fn missing_options_file_is_not_an_error() {
        let settings = Settings::load(
            entry(&[("sync_interval", json!(5))]),
            Path::new("/nonexistent/options.json"),
        )
        .unwrap();
        assert_eq!(settings.sync_interval_secs, 5);
    }

    #[test]
    fn zero_sync_interval_is_rejected() {
        let err = Settings::from_map(&entry(&[("sync_interval", json!(0))])).unwrap_err();
        assert!(matches!(
            err,
            Error::InvalidSetting { key: "sync_interval", .. }
        ));
    }

    #[test]
    fn numeric_strings_are_accepted() {
        let settings =
            Settings::from_map(&entry(&[("mqtt_port", json!("8883")), ("sync_interval", json!("60"))]))
                .unwrap();
        assert_eq!(settings.mqtt_port, 8883);
        assert_eq!(settings.sync_interval_secs, 60);
    }

    #[test]
    fn blank_entry_values_do_not_shadow_the_options_file() {
        let dir = tempfile::tempdir().unwrap();
        let options_path = dir.path().join("options.json");
        fs::write(&options_path, json!({ "mqtt_host": "from-options" }).to_string()).unwrap();

        let settings = Settings::load(entry(&[("mqtt_host", json!(""))]), &options_path).unwrap();
        assert_eq!(settings.mqtt_host, "from-options");
    }

    #[test]
    fn blank_strings_fall_through_to_defaults() {
        let settings = Settings::from_map(&entry(&[("mqtt_host", json!(""))])).unwrap();
        assert_eq!(settings.mqtt_host, "core-mosquitto");
    }

    #[test]
    fn trailing_slash_is_stripped_from_base_url() {
        let settings =
            Settings::from_map(&entry(&[("openremote_url", json!("http://or.local:8080/"))]))
                .unwrap();
        assert_eq!(
            settings.openremote_url.as_deref(),
            Some("http://or.local:8080")
        );
    }
}
