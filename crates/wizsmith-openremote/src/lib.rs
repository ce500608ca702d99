//! OpenRemote manager client.
//!
//! Covers the small REST surface the bridge needs:
//!
//! - OAuth2 token acquisition with two grant strategies
//!   (client-credentials first, password grant as fallback),
//! - asset query/create and attribute create/update,
//! - command forwarding from the MQTT command topic,
//! - zero-touch provisioning of the per-device agent asset and its
//!   "HA Sensors" child.
//!
//! All calls carry a uniform 10 second timeout. A call rejected with
//! HTTP 401 re-runs the grant chain once and retries, so a token expiring
//! mid-process does not permanently disable remote export.

pub mod auth;
pub mod client;
pub mod error;
pub mod provision;

pub use auth::{Credentials, Token};
pub use client::{AssetRef, CommandForward, NewAsset, NewAttribute, OpenRemoteClient};
pub use error::{OpenRemoteError, Result};
pub use provision::{Provisioner, ProvisioningContext};
