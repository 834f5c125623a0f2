//! Credential bundle: a base64-wrapped JSON pair `[oauth1, oauth2]` as
//! produced by the Garmin SSO sign-in flow.

use base64::engine::general_purpose::STANDARD as BASE64;
use base64::Engine;
use serde::{Deserialize, Serialize};

use super::error::AuthError;

/// Long-lived OAuth1 token issued at sign-in. It signs the token exchange.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct OAuth1Token {
    pub oauth_token: String,
    pub oauth_token_secret: String,
    #[serde(default)]
    pub mfa_token: Option<String>,
    #[serde(default)]
    pub mfa_expiration_timestamp: Option<String>,
    #[serde(default)]
    pub domain: Option<String>,
}

/// Short-lived bearer token plus the refresh token used to renew it.
#[derive(Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct OAuth2Token {
    #[serde(default)]
    pub scope: String,
    #[serde(default)]
    pub jti: String,
    pub token_type: String,
    pub access_token: String,
    pub refresh_token: String,
    pub expires_in: i64,
    pub expires_at: i64,
    pub refresh_token_expires_in: i64,
    pub refresh_token_expires_at: i64,
}

impl std::fmt::Debug for OAuth2Token {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("OAuth2Token")
            .field("token_type", &self.token_type)
            .field("access_token", &"<redacted>")
            .field("refresh_token", &"<redacted>")
            .field("expires_at", &self.expires_at)
            .field("refresh_token_expires_at", &self.refresh_token_expires_at)
            .finish_non_exhaustive()
    }
}

impl OAuth2Token {
    pub fn expired(&self, now: i64) -> bool {
        self.expires_at < now
    }

    pub fn refresh_expired(&self, now: i64) -> bool {
        self.refresh_token_expires_at < now
    }

    /// `Authorization` header value, e.g. `Bearer eyJ...`.
    pub fn authorization(&self) -> String {
        format!("{} {}", title_case(&self.token_type), self.access_token)
    }
}

/// Refresh endpoint reply; expiry instants are derived locally.
#[derive(Debug, Deserialize)]
pub(crate) struct RefreshResponse {
    #[serde(default)]
    pub scope: String,
    #[serde(default)]
    pub jti: String,
    pub token_type: String,
    pub access_token: String,
    pub refresh_token: String,
    pub expires_in: i64,
    pub refresh_token_expires_in: i64,
}

impl RefreshResponse {
    pub(crate) fn into_token(self, now: i64) -> OAuth2Token {
        OAuth2Token {
            scope: self.scope,
            jti: self.jti,
            token_type: self.token_type,
            access_token: self.access_token,
            refresh_token: self.refresh_token,
            expires_in: self.expires_in,
            expires_at: now.saturating_add(self.expires_in),
            refresh_token_expires_in: self.refresh_token_expires_in,
            refresh_token_expires_at: now.saturating_add(self.refresh_token_expires_in),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CredentialBundle {
    pub oauth1: OAuth1Token,
    pub oauth2: OAuth2Token,
}

impl CredentialBundle {
    pub fn decode(secret: &str) -> Result<Self, AuthError> {
        let raw = BASE64.decode(secret.trim())?;
        let (oauth1, oauth2): (OAuth1Token, OAuth2Token) = serde_json::from_slice(&raw)
            .map_err(|e| AuthError::MalformedBundle(e.to_string()))?;
        Ok(Self { oauth1, oauth2 })
    }

    pub fn encode(&self) -> Result<String, AuthError> {
        let json = serde_json::to_vec(&(&self.oauth1, &self.oauth2))?;
        Ok(BASE64.encode(json))
    }
}

fn title_case(s: &str) -> String {
    let mut chars = s.chars();
    match chars.next() {
        Some(first) => first.to_uppercase().chain(chars.flat_map(char::to_lowercase)).collect(),
        None => String::new(),
    }
}
