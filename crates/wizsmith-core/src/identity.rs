//! Durable device identity.
//!
//! Each installation carries a single opaque identifier that names its
//! remote assets and MQTT topics. The identifier is generated once and
//! persisted to a single-line UTF-8 file; losing the file means the
//! provisioner will create fresh remote assets on the next run.

use std::fs;
use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};
use tracing::{debug, warn};
use uuid::Uuid;

/// Opaque per-installation identifier.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct DeviceIdentity(String);

impl DeviceIdentity {
    /// Generate a fresh random identity.
    pub fn generate() -> Self {
        Self(Uuid::new_v4().to_string())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl std::fmt::Display for DeviceIdentity {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl From<&str> for DeviceIdentity {
    fn from(s: &str) -> Self {
        Self(s.to_string())
    }
}

/// File-backed identity storage.
pub struct IdentityStore {
    path: PathBuf,
}

impl IdentityStore {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Load the persisted identity, creating and persisting one if the file
    /// does not exist yet.
    ///
    /// Storage failures are not fatal: the store degrades to an ephemeral
    /// identity and logs a warning, which means remote assets will be
    /// re-provisioned on every restart until the path becomes writable.
    pub fn get_or_create(&self) -> DeviceIdentity {
        match fs::read_to_string(&self.path) {
            Ok(contents) => {
                let trimmed = contents.trim();
                if !trimmed.is_empty() {
                    debug!(path = %self.path.display(), "loaded persisted device identity");
                    return DeviceIdentity::from(trimmed);
                }
                warn!(path = %self.path.display(), "identity file is empty, regenerating");
                self.generate_and_persist()
            }
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => self.generate_and_persist(),
            Err(e) => {
                warn!(
                    path = %self.path.display(),
                    error = %e,
                    "could not read identity file, using ephemeral identity"
                );
                DeviceIdentity::generate()
            }
        }
    }

    fn generate_and_persist(&self) -> DeviceIdentity {
        let identity = DeviceIdentity::generate();
        if let Err(e) = fs::write(&self.path, identity.as_str()) {
            warn!(
                path = %self.path.display(),
                error = %e,
                "could not persist device identity, it will not survive a restart"
            );
        }
        identity
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn get_or_create_is_stable_across_calls() {
        let dir = tempfile::tempdir().unwrap();
        let store = IdentityStore::new(dir.path().join("device_id"));

        let first = store.get_or_create();
        let second = store.get_or_create();
        assert_eq!(first, second);
    }

    #[test]
    fn deleting_the_file_yields_a_new_identity() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("device_id");
        let store = IdentityStore::new(&path);

        let first = store.get_or_create();
        fs::remove_file(&path).unwrap();
        let second = store.get_or_create();
        assert_ne!(first, second);
    }

    #[test]
    fn trims_whitespace_from_persisted_identity() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("device_id");
        fs::write(&path, "  abc-123\n").unwrap();

        let identity = IdentityStore::new(&path).get_or_create();
        assert_eq!(identity.as_str(), "abc-123");
    }

    #[test]
    fn unwritable_path_falls_back_to_ephemeral() {
        // A directory path cannot be read as a file nor written to.
        let dir = tempfile::tempdir().unwrap();
        let store = IdentityStore::new(dir.path());

        let first = store.get_or_create();
        let second = store.get_or_create();
        assert_ne!(first, second);
    }
}
