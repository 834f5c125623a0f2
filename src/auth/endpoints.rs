//! URL endpoints for Garmin Connect.
//! Supports the international ("garmin.com") and China ("garmin.cn") accounts.

use crate::types::{AuthDomain, FileType};

/// Published consumer key pair of the Connect mobile app.
const OAUTH_CONSUMER_URL: &str = "https://thegarth.s3.amazonaws.com/oauth_consumer.json";

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Endpoints {
    pub sso_origin: String,
    pub api_origin: String,
    pub upload: String,
    pub oauth_consumer: String,
}

impl Endpoints {
    /// Returns the endpoint set for the given account domain.
    pub fn for_domain(domain: AuthDomain) -> Self {
        match domain {
            // Both regions send the garmin.com sign-in origin.
            AuthDomain::Global => Self::new(
                "https://sso.garmin.com",
                "https://connectapi.garmin.com",
                OAUTH_CONSUMER_URL,
            ),
            AuthDomain::China => Self::new(
                "https://sso.garmin.com",
                "https://connectapi.garmin.cn",
                OAUTH_CONSUMER_URL,
            ),
        }
    }

    /// Every endpoint served from one base URL, e.g. a mock server.
    #[cfg(test)]
    pub fn with_base(base: &str) -> Self {
        let base = base.trim_end_matches('/');
        Self::new(base, base, &format!("{base}/oauth_consumer.json"))
    }

    fn new(sso_origin: &str, api_origin: &str, oauth_consumer: &str) -> Self {
        Self {
            sso_origin: sso_origin.to_string(),
            api_origin: api_origin.to_string(),
            upload: format!("{api_origin}/upload-service/upload/"),
            oauth_consumer: oauth_consumer.to_string(),
        }
    }

    pub fn search(&self, start: u32, limit: u32, only_running: bool) -> String {
        let mut url = format!(
            "{}/activitylist-service/activities/search/activities?start={start}&limit={limit}",
            self.api_origin
        );
        if only_running {
            url.push_str("&activityType=running");
        }
        url
    }

    /// Fit is served as the original upload (a zip container), everything
    /// else through the export service.
    pub fn download(&self, activity_id: &str, file_type: FileType) -> String {
        match file_type {
            FileType::Fit => format!(
                "{}/download-service/files/activity/{activity_id}",
                self.api_origin
            ),
            other => format!(
                "{}/download-service/export/{}/activity/{activity_id}",
                self.api_origin,
                other.extension()
            ),
        }
    }

    pub fn token_exchange(&self) -> String {
        format!("{}/oauth-service/oauth/exchange/user/2.0", self.api_origin)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_domains_use_their_own_api_host() {
        let global = Endpoints::for_domain(AuthDomain::Global);
        let china = Endpoints::for_domain(AuthDomain::China);
        assert!(global.search(0, 100, false).starts_with("https://connectapi.garmin.com/"));
        assert!(china.search(0, 100, false).starts_with("https://connectapi.garmin.cn/"));
        assert_eq!(china.upload, "https://connectapi.garmin.cn/upload-service/upload/");
        assert_eq!(
            china.token_exchange(),
            "https://connectapi.garmin.cn/oauth-service/oauth/exchange/user/2.0"
        );
        assert_eq!(global.oauth_consumer, china.oauth_consumer);
    }

    #[test]
    fn test_search_running_filter() {
        let ep = Endpoints::with_base("http://localhost:1234/");
        assert_eq!(
            ep.search(200, 100, true),
            "http://localhost:1234/activitylist-service/activities/search/activities?start=200&limit=100&activityType=running"
        );
        assert!(!ep.search(0, 100, false).contains("activityType"));
    }

    #[test]
    fn test_fit_download_uses_original_file_route() {
        let ep = Endpoints::for_domain(AuthDomain::Global);
        assert_eq!(
            ep.download("42", FileType::Fit),
            "https://connectapi.garmin.com/download-service/files/activity/42"
        );
        assert_eq!(
            ep.download("42", FileType::Tcx),
            "https://connectapi.garmin.com/download-service/export/tcx/activity/42"
        );
    }
}
