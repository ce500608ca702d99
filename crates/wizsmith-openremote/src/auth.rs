//! Token acquisition against the Keycloak endpoint bundled with OpenRemote.
//!
//! Two grant strategies are tried in order: client-credentials when both a
//! client id and secret are configured, then the password grant through the
//! stock `admin-cli` client. The first 200 response wins; if neither path
//! yields a token the caller disables remote export for this session.

use reqwest::Client;
use serde::Deserialize;
use tracing::{debug, warn};

use crate::error::{OpenRemoteError, Result};

/// Client id used for the password grant.
pub const PASSWORD_GRANT_CLIENT_ID: &str = "admin-cli";

/// Bearer token returned by the token endpoint. No expiry is tracked; a
/// rejected token is replaced by re-running the grant chain.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Token(String);

impl Token {
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl From<String> for Token {
    fn from(s: String) -> Self {
        Self(s)
    }
}

/// Configured OpenRemote credentials. Blank fields count as absent.
#[derive(Debug, Clone, Default)]
pub struct Credentials {
    pub username: Option<String>,
    pub password: Option<String>,
    pub client_id: Option<String>,
    pub client_secret: Option<String>,
}

impl Credentials {
    /// The (id, secret) pair, when both are usable.
    fn client_credentials(&self) -> Option<(&str, &str)> {
        match (non_empty(&self.client_id), non_empty(&self.client_secret)) {
            (Some(id), Some(secret)) => Some((id, secret)),
            _ => None,
        }
    }

    /// The (username, password) pair, when both are usable.
    fn password_grant(&self) -> Option<(&str, &str)> {
        match (non_empty(&self.username), non_empty(&self.password)) {
            (Some(user), Some(pass)) => Some((user, pass)),
            _ => None,
        }
    }
}

fn non_empty(value: &Option<String>) -> Option<&str> {
    value.as_deref().filter(|s| !s.trim().is_empty())
}

#[derive(Deserialize)]
struct TokenResponse {
    access_token: String,
}

/// Run the grant chain and return the first token obtained.
pub(crate) async fn request_token(
    http: &Client,
    base_url: &str,
    realm: &str,
    credentials: &Credentials,
) -> Result<Token> {
    let token_url = format!("{base_url}/auth/realms/{realm}/protocol/openid-connect/token");

    if let Some((client_id, client_secret)) = credentials.client_credentials() {
        let form = [
            ("grant_type", "client_credentials"),
            ("client_id", client_id),
            ("client_secret", client_secret),
        ];
        match post_grant(http, &token_url, &form).await {
            Ok(token) => {
                debug!("obtained token via client-credentials grant");
                return Ok(token);
            }
            Err(e) => warn!("client-credentials grant failed: {e}"),
        }
    }

    if let Some((username, password)) = credentials.password_grant() {
        let form = [
            ("grant_type", "password"),
            ("client_id", PASSWORD_GRANT_CLIENT_ID),
            ("username", username),
            ("password", password),
        ];
        match post_grant(http, &token_url, &form).await {
            Ok(token) => {
                debug!("obtained token via password grant");
                return Ok(token);
            }
            Err(e) => warn!("password grant failed: {e}"),
        }
    }

    Err(OpenRemoteError::AuthFailed)
}

async fn post_grant(http: &Client, token_url: &str, form: &[(&str, &str)]) -> Result<Token> {
    let response = http
        .post(token_url)
        .timeout(crate::client::HTTP_TIMEOUT)
        .form(form)
        .send()
        .await?;

    let status = response.status();
    if !status.is_success() {
        let body = response.text().await.unwrap_or_default();
        return Err(OpenRemoteError::Status(status, body));
    }

    let parsed: TokenResponse = response.json().await?;
    Ok(Token::from(parsed.access_token))
}
