//! Thin REST client over the manager API.
//!
//! The client owns the live bearer token behind a lock so a 401 response
//! can re-run the grant chain once and retry the call. Asset ids and the
//! batch attribute name live in the read-only [`ProvisioningContext`]
//! produced at setup time.
//!
//! [`ProvisioningContext`]: crate::provision::ProvisioningContext

use std::time::Duration;

use reqwest::{Client, Response, StatusCode};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use tokio::sync::RwLock;
use tracing::debug;

use crate::auth::{self, Credentials, Token};
use crate::error::{OpenRemoteError, Result};

/// Uniform timeout for every manager and token-endpoint call.
pub const HTTP_TIMEOUT: Duration = Duration::from_secs(10);

/// Reference to an existing asset, as returned by the query endpoint.
#[derive(Debug, Clone, Deserialize)]
pub struct AssetRef {
    pub id: String,
    pub name: String,
    #[serde(default, rename = "parentId")]
    pub parent_id: Option<String>,
}

/// Parent link on a new asset.
#[derive(Debug, Clone, Serialize)]
pub struct AssetParent {
    pub id: String,
}

/// Payload for asset creation.
#[derive(Debug, Clone, Serialize)]
pub struct NewAsset {
    pub name: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub configuration: Option<Value>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub parent: Option<AssetParent>,
}

/// Payload for attribute creation.
#[derive(Debug, Clone, Serialize)]
pub struct NewAttribute {
    pub name: String,
    #[serde(rename = "type")]
    pub attribute_type: String,
    pub writeable: bool,
    pub readable: bool,
}

impl NewAttribute {
    /// A readable and writable JSON attribute.
    pub fn json(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            attribute_type: "json".to_string(),
            writeable: true,
            readable: true,
        }
    }
}

/// Command received on the MQTT command topic, forwarded to the manager.
#[derive(Debug, Clone, Serialize)]
pub struct CommandForward {
    pub device_id: String,
    pub action: String,
    pub payload: String,
}

#[derive(Deserialize)]
struct AssetQueryResponse {
    #[serde(default)]
    items: Vec<AssetRef>,
}

#[derive(Deserialize)]
struct CreatedAsset {
    id: String,
}

/// Client for the manager REST API and its token endpoint.
pub struct OpenRemoteClient {
    http: Client,
    base_url: String,
    realm: String,
    credentials: Credentials,
    token: RwLock<Option<Token>>,
}

impl OpenRemoteClient {
    pub fn new(
        base_url: impl Into<String>,
        realm: impl Into<String>,
        credentials: Credentials,
    ) -> Self {
        let base_url = base_url.into();
        Self {
            http: Client::new(),
            base_url: base_url.trim_end_matches('/').to_string(),
            realm: realm.into(),
            credentials,
            token: RwLock::new(None),
        }
    }

    pub fn base_url(&self) -> &str {
        &self.base_url
    }

    /// Run the grant chain and store the resulting token.
    pub async fn authenticate(&self) -> Result<Token> {
        let token =
            auth::request_token(&self.http, &self.base_url, &self.realm, &self.credentials).await?;
        *self.token.write().await = Some(token.clone());
        Ok(token)
    }

    /// The current bearer token, if any grant has succeeded.
    pub async fn token(&self) -> Option<Token> {
        self.token.read().await.clone()
    }

    #[cfg(test)]
    pub(crate) async fn set_token_for_tests(&self, token: Token) {
        *self.token.write().await = Some(token);
    }

    /// Query assets by exact name, optionally scoped to a parent asset.
    pub async fn query_assets(&self, name: &str, parent_id: Option<&str>) -> Result<Vec<AssetRef>> {
        let mut body = serde_json::json!({ "names": [name] });
        if let Some(parent) = parent_id {
            body["parents"] = serde_json::json!([{ "id": parent }]);
        }

        let url = format!("{}/api/master/asset/query", self.base_url);
        let response = self.authed_post(&url, &body).await?;
        let parsed: AssetQueryResponse = response.json().await?;
        Ok(parsed.items)
    }

    /// Create an asset, returning its id.
    pub async fn create_asset(&self, asset: &NewAsset) -> Result<String> {
        let url = format!("{}/api/master/asset", self.base_url);
        let body = serde_json::to_value(asset).unwrap_or_default();
        let response = self.authed_post(&url, &body).await?;
        let created: CreatedAsset = response.json().await?;
        Ok(created.id)
    }

    /// Create an attribute on an existing asset.
    pub async fn create_attribute(&self, asset_id: &str, attribute: &NewAttribute) -> Result<()> {
        let url = format!("{}/api/master/asset/{asset_id}/attribute", self.base_url);
        let body = serde_json::to_value(attribute).unwrap_or_default();
        self.authed_post(&url, &body).await?;
        Ok(())
    }

    /// Write a value to an attribute.
    pub async fn update_attribute(
        &self,
        asset_id: &str,
        attribute: &str,
        value: &Value,
    ) -> Result<()> {
        let url = format!(
            "{}/api/master/asset/{asset_id}/attribute/{attribute}",
            self.base_url
        );
        self.authed_post(&url, value).await?;
        Ok(())
    }

    /// Forward a command received on the MQTT command topic.
    pub async fn forward_command(&self, command: &CommandForward) -> Result<()> {
        let url = format!("{}/api/master/asset/attribute/update", self.base_url);
        let body = serde_json::to_value(command).unwrap_or_default();
        self.authed_post(&url, &body).await?;
        Ok(())
    }

    /// Bearer-authenticated POST with a single re-auth retry on 401.
    async fn authed_post(&self, url: &str, body: &Value) -> Result<Response> {
        let token = self
            .token()
            .await
            .ok_or(OpenRemoteError::NotAuthenticated)?;

        let response = self.post_json(url, body, &token).await?;
        if response.status() != StatusCode::UNAUTHORIZED {
            return check_status(response).await;
        }

        debug!("token rejected by remote, re-running grant chain");
        let fresh = self.authenticate().await?;
        let retried = self.post_json(url, body, &fresh).await?;
        check_status(retried).await
    }

    async fn post_json(&self, url: &str, body: &Value, token: &Token) -> Result<Response> {
        Ok(self
            .http
            .post(url)
            .bearer_auth(token.as_str())
            .timeout(HTTP_TIMEOUT)
            .json(body)
            .send()
            .await?)
    }
}

async fn check_status(response: Response) -> Result<Response> {
    let status = response.status();
    if status.is_success() {
        return Ok(response);
    }
    let body = response.text().await.unwrap_or_default();
    Err(OpenRemoteError::Status(status, body))
}

#[cfg(test)]
mod tests {
    use super::*;
    use mockito::Matcher;
    use serde_json::json;

    /// Client pre-seeded with a token, as after a successful setup.
    async fn authenticated_client(base_url: &str, token: &str) -> OpenRemoteClient {
        let client = OpenRemoteClient::new(base_url, "master", Credentials::default());
        *client.token.write().await = Some(Token::from(token.to_string()));
        client
    }

    #[tokio::test]
    async fn unauthenticated_calls_are_rejected_locally() {
        let client = OpenRemoteClient::new("http://unused.invalid", "master", Credentials::default());
        let err = client
            .update_attribute("a1", "sensors_json", &json!({}))
            .await
            .unwrap_err();
        assert!(matches!(err, OpenRemoteError::NotAuthenticated));
    }

    #[tokio::test]
    async fn expired_token_triggers_one_reauth_and_retry() {
        let mut server = mockito::Server::new_async().await;
        server
            .mock("POST", "/auth/realms/master/protocol/openid-connect/token")
            .with_status(200)
            .with_body(r#"{"access_token":"fresh"}"#)
            .create_async()
            .await;
        let rejected = server
            .mock("POST", "/api/master/asset/a1/attribute/sensors_json")
            .match_header("authorization", "Bearer stale")
            .with_status(401)
            .create_async()
            .await;
        let accepted = server
            .mock("POST", "/api/master/asset/a1/attribute/sensors_json")
            .match_header("authorization", "Bearer fresh")
            .with_status(200)
            .create_async()
            .await;

        let client = OpenRemoteClient::new(
            server.url(),
            "master",
            Credentials {
                username: Some("admin".into()),
                password: Some("secret".into()),
                ..Default::default()
            },
        );
        *client.token.write().await = Some(Token::from("stale".to_string()));

        client
            .update_attribute("a1", "sensors_json", &json!({"k": "v"}))
            .await
            .unwrap();

        rejected.assert_async().await;
        accepted.assert_async().await;
        assert_eq!(client.token().await.unwrap().as_str(), "fresh");
    }

    #[tokio::test]
    async fn query_parses_items() {
        let mut server = mockito::Server::new_async().await;
        server
            .mock("POST", "/api/master/asset/query")
            .match_body(Matcher::Json(json!({ "names": ["wizsmith-pi-abc"] })))
            .with_status(200)
            .with_body(r#"{"items":[{"id":"a1","name":"wizsmith-pi-abc"}]}"#)
            .create_async()
            .await;

        let client = authenticated_client(&server.url(), "tok").await;
        let items = client.query_assets("wizsmith-pi-abc", None).await.unwrap();
        assert_eq!(items.len(), 1);
        assert_eq!(items[0].id, "a1");
        assert!(items[0].parent_id.is_none());
    }

    #[tokio::test]
    async fn non_success_status_is_surfaced() {
        let mut server = mockito::Server::new_async().await;
        server
            .mock("POST", "/api/master/asset")
            .with_status(500)
            .with_body("boom")
            .create_async()
            .await;

        let client = authenticated_client(&server.url(), "tok").await;
        let asset = NewAsset {
            name: "x".into(),
            description: None,
            configuration: None,
            parent: None,
        };
        let err = client.create_asset(&asset).await.unwrap_err();
        assert!(matches!(
            err,
            OpenRemoteError::Status(StatusCode::INTERNAL_SERVER_ERROR, _)
        ));
    }
}
