use thiserror::Error;

use crate::api::ApiError;

/// Why a single activity could not be stored. Never fatal to the batch.
#[derive(Debug, Error)]
pub enum DownloadError {
    #[error(transparent)]
    Api(#[from] ApiError),

    #[error("Corrupt activity container: {0}")]
    Archive(#[from] zip::result::ZipError),

    #[error("Container entry has an unsafe path: {0}")]
    UnsafeEntry(String),

    #[error("Container for activity {0} holds no activity file")]
    NoActivityFile(String),

    #[error("Disk error: {0}")]
    Disk(#[from] std::io::Error),

    #[error("Extraction task failed: {0}")]
    Join(#[from] tokio::task::JoinError),
}

impl DownloadError {
    /// Rate limiting is worth a note in the summary: rerunning later helps.
    pub fn is_rate_limited(&self) -> bool {
        matches!(self, DownloadError::Api(e) if e.is_rate_limited())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_rate_limit_detected_through_api_error() {
        let e = DownloadError::from(ApiError::RateLimited { url: "x".into() });
        assert!(e.is_rate_limited());
    }

    #[test]
    fn test_disk_error_not_rate_limited() {
        let e = DownloadError::Disk(std::io::Error::other("disk full"));
        assert!(!e.is_rate_limited());
    }
}
