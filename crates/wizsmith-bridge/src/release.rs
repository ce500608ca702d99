//! Release checker.
//!
//! One-shot per process: fetch the latest release tag for the configured
//! repository and log an informational message when a newer version exists.
//! Every failure is swallowed; this check must never affect the bridge.

use std::time::Duration;

use reqwest::Client;
use semver::Version;
use serde::Deserialize;
use tracing::{debug, info};

/// Public GitHub API base; tests substitute a mock server.
pub const GITHUB_API_BASE: &str = "https://api.github.com";

const RELEASE_TIMEOUT: Duration = Duration::from_secs(10);
const USER_AGENT: &str = concat!("wizsmith-bridge/", env!("CARGO_PKG_VERSION"));

#[derive(Deserialize)]
struct LatestRelease {
    tag_name: Option<String>,
}

/// Fetch the latest release tag and return it when it is newer than
/// `current_version`. Any failure yields `None`.
pub async fn newer_release(
    http: &Client,
    api_base: &str,
    repo: &str,
    current_version: &str,
) -> Option<String> {
    let url = format!("{api_base}/repos/{repo}/releases/latest");
    let response = http
        .get(&url)
        .header(reqwest::header::USER_AGENT, USER_AGENT)
        .timeout(RELEASE_TIMEOUT)
        .send()
        .await
        .map_err(|e| debug!("release check request failed: {e}"))
        .ok()?;

    if !response.status().is_success() {
        debug!(status = %response.status(), "release feed returned an error");
        return None;
    }

    let release: LatestRelease = response
        .json()
        .await
        .map_err(|e| debug!("release metadata did not parse: {e}"))
        .ok()?;
    let tag = release.tag_name?;

    is_newer(&tag, current_version).then_some(tag)
}

/// Semver-aware comparison with a raw inequality fallback for tags that do
/// not parse as versions.
fn is_newer(tag: &str, current: &str) -> bool {
    match (
        Version::parse(tag.trim_start_matches('v')),
        Version::parse(current.trim_start_matches('v')),
    ) {
        (Ok(latest), Ok(current)) => latest > current,
        _ => tag != current,
    }
}

/// Run the check once and log the result. Never fails.
pub async fn check_once(http: &Client, api_base: &str, repo: &str, current_version: &str) {
    if let Some(tag) = newer_release(http, api_base, repo, current_version).await {
        info!("new release available on GitHub: {tag} (current={current_version})");
    } else {
        debug!("no newer release found");
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn semver_comparison_handles_v_prefixes() {
        assert!(is_newer("v1.2.0", "1.1.9"));
        assert!(!is_newer("1.1.9", "v1.2.0"));
        assert!(!is_newer("v1.2.0", "1.2.0"));
    }

    #[test]
    fn non_semver_tags_fall_back_to_inequality() {
        assert!(is_newer("nightly-2024-05-01", "0.4.2"));
        assert!(!is_newer("0.4.2", "0.4.2"));
    }

    #[tokio::test]
    async fn reports_a_newer_tag() {
        let mut server = mockito::Server::new_async().await;
        server
            .mock("GET", "/repos/joel-Y/wizhub/releases/latest")
            .with_status(200)
            .with_body(r#"{"tag_name":"v9.9.9"}"#)
            .create_async()
            .await;

        let tag = newer_release(&Client::new(), &server.url(), "joel-Y/wizhub", "0.4.2").await;
        assert_eq!(tag.as_deref(), Some("v9.9.9"));
    }

    #[tokio::test]
    async fn current_release_yields_none() {
        let mut server = mockito::Server::new_async().await;
        server
            .mock("GET", "/repos/joel-Y/wizhub/releases/latest")
            .with_status(200)
            .with_body(r#"{"tag_name":"v0.4.2"}"#)
            .create_async()
            .await;

        let tag = newer_release(&Client::new(), &server.url(), "joel-Y/wizhub", "0.4.2").await;
        assert!(tag.is_none());
    }

    #[tokio::test]
    async fn failures_are_swallowed() {
        let mut server = mockito::Server::new_async().await;
        server
            .mock("GET", "/repos/joel-Y/wizhub/releases/latest")
            .with_status(500)
            .create_async()
            .await;
        assert!(
            newer_release(&Client::new(), &server.url(), "joel-Y/wizhub", "0.4.2")
                .await
                .is_none()
        );

        server
            .mock("GET", "/repos/joel-Y/wizhub/releases/latest")
            .with_status(200)
            .with_body("not json")
            .create_async()
            .await;
        assert!(
            newer_release(&Client::new(), &server.url(), "joel-Y/wizhub", "0.4.2")
                .await
                .is_none()
        );
    }

    #[tokio::test]
    async fn missing_tag_yields_none() {
        let mut server = mockito::Server::new_async().await;
        server
            .mock("GET", "/repos/joel-Y/wizhub/releases/latest")
            .with_status(200)
            .with_body(r#"{"name":"untagged"}"#)
            .create_async()
            .await;

        let tag = newer_release(&Client::new(), &server.url(), "joel-Y/wizhub", "0.4.2").await;
        assert!(tag.is_none());
    }
}
