use thiserror::Error;

/// Failures while loading or refreshing the credential bundle.
/// All of them are fatal to the session.
#[derive(Debug, Error)]
pub enum AuthError {
    #[error("Malformed credential bundle: {0}")]
    MalformedBundle(String),

    #[error("Refresh token expired at {expired_at}; sign in again to obtain a new secret")]
    RefreshTokenExpired { expired_at: i64 },

    #[error("Token refresh failed (HTTP {code}): {message}")]
    Refresh { code: u16, message: String },

    #[error("Could not load OAuth consumer credentials: {0}")]
    Consumer(String),

    #[error("Could not sign token exchange: {0}")]
    Signing(String),

    #[error("Invalid header value: {0}")]
    InvalidHeader(#[from] reqwest::header::InvalidHeaderValue),

    #[error(transparent)]
    Http(#[from] reqwest::Error),

    #[error(transparent)]
    Base64(#[from] base64::DecodeError),

    #[error(transparent)]
    Json(#[from] serde_json::Error),
}
