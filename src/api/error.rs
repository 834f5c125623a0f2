use thiserror::Error;

/// Typed API errors enabling retry classification.
///
/// `RateLimited` is kept apart from everything else so a caller can back
/// off; every other failure is retried once and then surfaced wrapped in
/// `Connection`.
#[derive(Debug, Error)]
pub enum ApiError {
    #[error("Too many requests: {url}")]
    RateLimited { url: String },

    #[error("Error connecting to {url}: {source}")]
    Connection {
        url: String,
        #[source]
        source: Box<ApiError>,
    },

    #[error("HTTP error {status} from {url}")]
    HttpStatus { status: u16, url: String },

    #[error("Unexpected response from {url}: {message}")]
    Decode { url: String, message: String },

    #[error(transparent)]
    Http(#[from] reqwest::Error),
}

impl ApiError {
    pub fn is_rate_limited(&self) -> bool {
        matches!(self, ApiError::RateLimited { .. })
    }

    /// Map a non-success status to the matching error variant.
    pub(crate) fn from_status(status: reqwest::StatusCode, url: &str) -> Self {
        if status == reqwest::StatusCode::TOO_MANY_REQUESTS {
            ApiError::RateLimited {
                url: url.to_string(),
            }
        } else {
            ApiError::HttpStatus {
                status: status.as_u16(),
                url: url.to_string(),
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use reqwest::StatusCode;

    #[test]
    fn test_429_maps_to_rate_limited() {
        let e = ApiError::from_status(StatusCode::TOO_MANY_REQUESTS, "http://x");
        assert!(e.is_rate_limited());
    }

    #[test]
    fn test_other_status_maps_to_http_status() {
        let e = ApiError::from_status(StatusCode::BAD_GATEWAY, "http://x");
        assert!(matches!(e, ApiError::HttpStatus { status: 502, .. }));
        assert!(!e.is_rate_limited());
    }

    #[test]
    fn test_connection_error_keeps_cause() {
        use std::error::Error as _;
        let e = ApiError::Connection {
            url: "http://x".into(),
            source: Box::new(ApiError::HttpStatus {
                status: 500,
                url: "http://x".into(),
            }),
        };
        let cause = e.source().unwrap().to_string();
        assert!(cause.contains("500"), "{cause}");
    }
}
