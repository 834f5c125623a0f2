//! Authenticated access to the three Connect endpoints the sync engine uses:
//! activity search, activity download and activity upload.

pub mod error;
pub mod responses;

use reqwest::multipart;
use reqwest::Client;
use serde::de::DeserializeOwned;

pub use self::error::ApiError;
pub use self::responses::{ActivitySummary, DetailedImportResult, UploadResponse};

use crate::auth::Session;
use crate::retry::{self, RetryAction, RetryPolicy};
use crate::types::FileType;

/// Remote operations consumed by the enumerator and the orchestrators.
///
/// `ApiClient` is the real implementation; tests substitute in-memory fakes.
#[async_trait::async_trait]
pub trait ActivityApi: Send + Sync {
    async fn list_activities(
        &self,
        start: u32,
        limit: u32,
        only_running: bool,
    ) -> Result<Vec<ActivitySummary>, ApiError>;

    async fn download_activity(
        &self,
        activity_id: &str,
        file_type: FileType,
    ) -> Result<Vec<u8>, ApiError>;

    /// Upload one file body. A reply listing rejected entries is still `Ok`;
    /// the caller inspects `failures`.
    async fn upload(&self, file_name: &str, body: Vec<u8>)
        -> Result<DetailedImportResult, ApiError>;
}

pub struct ApiClient {
    session: Session,
    client: Client,
    retry: RetryPolicy,
}

impl std::fmt::Debug for ApiClient {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ApiClient")
            .field("session", &self.session)
            .field("retry", &self.retry)
            .finish_non_exhaustive()
    }
}

impl ApiClient {
    pub fn new(session: Session) -> Self {
        let client = session.http_client();
        Self {
            session,
            client,
            retry: RetryPolicy::default(),
        }
    }

    pub fn session(&self) -> &Session {
        &self.session
    }

    /// GET `url` with the session headers and decode the JSON body.
    ///
    /// HTTP 429 fails immediately with `RateLimited`. Any other failure
    /// (status, transport, undecodable body) is retried exactly once; a
    /// second failure is returned as `Connection` wrapping the cause.
    pub async fn fetch_json<T: DeserializeOwned>(&self, url: &str) -> Result<T, ApiError> {
        let result = retry::retry(
            self.retry,
            |e: &ApiError| {
                if e.is_rate_limited() {
                    RetryAction::Abort
                } else {
                    RetryAction::Retry
                }
            },
            |attempt| async move {
                if attempt > 0 {
                    tracing::debug!("Retrying {} without re-authentication", url);
                }
                self.get_json_once(url).await
            },
        )
        .await;

        result.map_err(|e| match e {
            e @ ApiError::RateLimited { .. } => e,
            other => {
                tracing::debug!("Giving up on {}: {}", url, other);
                ApiError::Connection {
                    url: url.to_string(),
                    source: Box::new(other),
                }
            }
        })
    }

    async fn get_json_once<T: DeserializeOwned>(&self, url: &str) -> Result<T, ApiError> {
        tracing::debug!("GET {}", url);
        let response = self
            .client
            .get(url)
            .headers(self.session.current_headers())
            .send()
            .await?;

        let status = response.status();
        tracing::debug!("GET {} -> {}", url, status);
        if !status.is_success() {
            return Err(ApiError::from_status(status, url));
        }

        let body = response.bytes().await?;
        serde_json::from_slice(&body).map_err(|e| ApiError::Decode {
            url: url.to_string(),
            message: e.to_string(),
        })
    }
}

#[async_trait::async_trait]
impl ActivityApi for ApiClient {
    async fn list_activities(
        &self,
        start: u32,
        limit: u32,
        only_running: bool,
    ) -> Result<Vec<ActivitySummary>, ApiError> {
        let url = self.session.endpoints().search(start, limit, only_running);
        self.fetch_json(&url).await
    }

    async fn download_activity(
        &self,
        activity_id: &str,
        file_type: FileType,
    ) -> Result<Vec<u8>, ApiError> {
        let url = self.session.endpoints().download(activity_id, file_type);
        tracing::info!("Download activity from {}", url);
        let response = self
            .client
            .get(&url)
            .headers(self.session.current_headers())
            .send()
            .await?;

        let status = response.status();
        if !status.is_success() {
            return Err(ApiError::from_status(status, &url));
        }
        Ok(response.bytes().await?.to_vec())
    }

    async fn upload(
        &self,
        file_name: &str,
        body: Vec<u8>,
    ) -> Result<DetailedImportResult, ApiError> {
        let url = &self.session.endpoints().upload;
        let part = multipart::Part::bytes(body)
            .file_name(file_name.to_string())
            .mime_str("application/octet-stream")?;
        let form = multipart::Form::new().part("file", part);

        tracing::debug!("POST {} ({})", url, file_name);
        let response = self
            .client
            .post(url)
            .headers(self.session.current_headers())
            .multipart(form)
            .send()
            .await?;

        // Duplicates come back as 409 with a regular import report, so the
        // body is decoded before the status is judged.
        let status = response.status();
        let body = response.bytes().await?;
        match serde_json::from_slice::<UploadResponse>(&body) {
            Ok(parsed) => Ok(parsed.detailed_import_result),
            Err(_) if !status.is_success() => Err(ApiError::from_status(status, url)),
            Err(e) => Err(ApiError::Decode {
                url: url.clone(),
                message: e.to_string(),
            }),
        }
    }
}
