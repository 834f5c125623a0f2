use std::time::Duration;

use reqwest::header::{HeaderMap, HeaderName, HeaderValue, AUTHORIZATION, ORIGIN, USER_AGENT};
use reqwest::Client;

use super::endpoints::Endpoints;
use super::error::AuthError;
use super::oauth1::{OAuth1Signer, OAuthConsumer};
use super::token::{CredentialBundle, RefreshResponse};

const DEFAULT_USER_AGENT: &str = "Mozilla/5.0 (Windows NT 10.0; Win64; x64) AppleWebKit/537.36 (KHTML, like Gecko) Chrome/79.0.3945.88 Safari/537.36";

/// Connect API rejects requests without this client marker.
const CLIENT_MARKER: (&str, &str) = ("nk", "NT");

pub const REQUEST_TIMEOUT: Duration = Duration::from_secs(240);
pub const CONNECT_TIMEOUT: Duration = Duration::from_secs(360);

pub(crate) fn now_epoch() -> i64 {
    chrono::Utc::now().timestamp()
}

pub(crate) fn build_http_client() -> Result<Client, AuthError> {
    Ok(Client::builder()
        .timeout(REQUEST_TIMEOUT)
        .connect_timeout(CONNECT_TIMEOUT)
        .build()?)
}

/// One authenticated Garmin Connect session.
///
/// The access token is checked (and refreshed) only while the session is
/// being built. Concurrent tasks read headers through `&Session`; nothing
/// mutates it mid-batch.
pub struct Session {
    client: Client,
    bundle: CredentialBundle,
    endpoints: Endpoints,
    headers: HeaderMap,
}

impl std::fmt::Debug for Session {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Session")
            .field("endpoints", &self.endpoints)
            .field("bundle", &"<redacted>")
            .finish_non_exhaustive()
    }
}

impl Session {
    /// Decode the credential bundle and refresh the access token if it has
    /// already expired. Any failure here is fatal for the run.
    pub async fn new(secret: &str, endpoints: Endpoints) -> Result<Self, AuthError> {
        let client = build_http_client()?;
        Self::with_client(client, secret, endpoints).await
    }

    pub async fn with_client(
        client: Client,
        secret: &str,
        endpoints: Endpoints,
    ) -> Result<Self, AuthError> {
        let mut bundle = CredentialBundle::decode(secret)?;

        let now = now_epoch();
        if bundle.oauth2.expired(now) {
            tracing::info!("Access token expired, refreshing");
            refresh(&client, &endpoints, &mut bundle, now).await?;
            tracing::info!("Access token refreshed");
        } else {
            tracing::debug!(expires_at = bundle.oauth2.expires_at, "Access token still valid");
        }

        let headers = build_headers(&endpoints, &bundle)?;
        Ok(Self {
            client,
            bundle,
            endpoints,
            headers,
        })
    }

    /// Fixed header set for every API request. Does not re-check expiry.
    pub fn current_headers(&self) -> HeaderMap {
        self.headers.clone()
    }

    pub fn endpoints(&self) -> &Endpoints {
        &self.endpoints
    }

    pub fn bundle(&self) -> &CredentialBundle {
        &self.bundle
    }

    /// Cheap clone; `reqwest::Client` is reference counted.
    pub fn http_client(&self) -> Client {
        self.client.clone()
    }
}

fn build_headers(endpoints: &Endpoints, bundle: &CredentialBundle) -> Result<HeaderMap, AuthError> {
    let mut headers = HeaderMap::new();
    headers.insert(USER_AGENT, HeaderValue::from_static(DEFAULT_USER_AGENT));
    headers.insert(ORIGIN, HeaderValue::from_str(&endpoints.sso_origin)?);
    headers.insert(
        HeaderName::from_static(CLIENT_MARKER.0),
        HeaderValue::from_static(CLIENT_MARKER.1),
    );
    let mut auth = HeaderValue::from_str(&bundle.oauth2.authorization())?;
    auth.set_sensitive(true);
    headers.insert(AUTHORIZATION, auth);
    Ok(headers)
}

/// User agent of the Connect mobile app, expected by the exchange endpoint.
const MOBILE_USER_AGENT: &str = "com.garmin.android.apps.connectmobile";

async fn fetch_consumer(client: &Client, endpoints: &Endpoints) -> Result<OAuthConsumer, AuthError> {
    tracing::debug!("GET {}", endpoints.oauth_consumer);
    let response = client.get(&endpoints.oauth_consumer).send().await?;
    let status = response.status();
    if !status.is_success() {
        return Err(AuthError::Consumer(format!("HTTP {status}")));
    }
    let body = response.bytes().await?;
    serde_json::from_slice(&body).map_err(|e| AuthError::Consumer(e.to_string()))
}

/// Exchange the bundle's OAuth1 token for a new OAuth2 token, updating the
/// bundle in place. The request is OAuth1-signed with the app's consumer key.
async fn refresh(
    client: &Client,
    endpoints: &Endpoints,
    bundle: &mut CredentialBundle,
    now: i64,
) -> Result<(), AuthError> {
    if bundle.oauth2.refresh_expired(now) {
        return Err(AuthError::RefreshTokenExpired {
            expired_at: bundle.oauth2.refresh_token_expires_at,
        });
    }

    let consumer = fetch_consumer(client, endpoints).await?;
    let url = endpoints.token_exchange();
    let form: Vec<(&str, &str)> = bundle
        .oauth1
        .mfa_token
        .as_deref()
        .map(|mfa| ("mfa_token", mfa))
        .into_iter()
        .collect();
    let mut authorization = HeaderValue::from_str(
        &OAuth1Signer::new(&consumer, &bundle.oauth1).authorization("POST", &url, &form, now)?,
    )?;
    authorization.set_sensitive(true);

    tracing::debug!("POST {}", url);
    let response = client
        .post(&url)
        .header(USER_AGENT, MOBILE_USER_AGENT)
        .header(AUTHORIZATION, authorization)
        .form(&form)
        .send()
        .await?;

    let status = response.status();
    if !status.is_success() {
        let message = response.text().await.unwrap_or_default();
        return Err(AuthError::Refresh {
            code: status.as_u16(),
            message,
        });
    }

    let body = response.bytes().await?;
    let reply: RefreshResponse = serde_json::from_slice(&body).map_err(|e| AuthError::Refresh {
        code: status.as_u16(),
        message: format!("undecodable token response: {e}"),
    })?;
    bundle.oauth2 = reply.into_token(now);
    Ok(())
}
