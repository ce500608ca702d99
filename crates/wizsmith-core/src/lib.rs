//! Core types for the WizSmith bridge.
//!
//! This crate holds everything the other crates share:
//! - **Settings**: merged configuration from stored entry data, the add-on
//!   options file and built-in defaults.
//! - **DeviceIdentity**: the durable per-installation identifier.
//! - **EntitySnapshot / EntityRegistry**: the read-only view of host entity
//!   state consumed by the export loop.
//!
//! The host application (Home Assistant or the standalone agent) supplies an
//! `EntityRegistry`; everything else in the workspace is wired from these
//! types.

pub mod entity;
pub mod error;
pub mod identity;
pub mod settings;

pub use entity::{EntityRegistry, EntitySnapshot, InMemoryRegistry};
pub use error::{Error, Result};
pub use identity::{DeviceIdentity, IdentityStore};
pub use settings::Settings;

/// Version information
pub const VERSION: &str = env!("CARGO_PKG_VERSION");

/// Build information
pub const BUILD_PROFILE: &str = if cfg!(debug_assertions) {
    "debug"
} else {
    "release"
};
