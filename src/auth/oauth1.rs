//! OAuth1 request signing (HMAC-SHA1) for the token exchange.

use base64::engine::general_purpose::STANDARD as BASE64;
use base64::Engine;
use ring::hmac;
use ring::rand::{SecureRandom, SystemRandom};
use serde::Deserialize;
use urlencoding::encode;

use super::error::AuthError;
use super::token::OAuth1Token;

/// Consumer credentials of the Connect mobile app, fetched at refresh time.
#[derive(Clone, Deserialize)]
pub struct OAuthConsumer {
    pub consumer_key: String,
    pub consumer_secret: String,
}

impl std::fmt::Debug for OAuthConsumer {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("OAuthConsumer")
            .field("consumer_key", &self.consumer_key)
            .field("consumer_secret", &"<redacted>")
            .finish()
    }
}

/// Signs requests on behalf of the bundle's OAuth1 token.
pub struct OAuth1Signer<'a> {
    consumer: &'a OAuthConsumer,
    token: &'a OAuth1Token,
}

impl<'a> OAuth1Signer<'a> {
    pub fn new(consumer: &'a OAuthConsumer, token: &'a OAuth1Token) -> Self {
        Self { consumer, token }
    }

    /// `Authorization` header for a request to `url` (no query string)
    /// whose form body is `params`.
    pub fn authorization(
        &self,
        method: &str,
        url: &str,
        params: &[(&str, &str)],
        timestamp: i64,
    ) -> Result<String, AuthError> {
        let nonce = nonce()?;
        Ok(self.authorization_with(method, url, params, &nonce, &timestamp.to_string()))
    }

    fn authorization_with(
        &self,
        method: &str,
        url: &str,
        params: &[(&str, &str)],
        nonce: &str,
        timestamp: &str,
    ) -> String {
        let mut oauth = vec![
            ("oauth_consumer_key", self.consumer.consumer_key.as_str()),
            ("oauth_nonce", nonce),
            ("oauth_signature_method", "HMAC-SHA1"),
            ("oauth_timestamp", timestamp),
            ("oauth_token", self.token.oauth_token.as_str()),
            ("oauth_version", "1.0"),
        ];
        let mut signed = oauth.clone();
        signed.extend_from_slice(params);
        let signature = self.signature(method, url, &signed);
        oauth.push(("oauth_signature", &signature));

        let fields: Vec<String> = oauth
            .iter()
            .map(|(k, v)| format!("{k}=\"{}\"", encode(v)))
            .collect();
        format!("OAuth {}", fields.join(", "))
    }

    fn signature(&self, method: &str, url: &str, params: &[(&str, &str)]) -> String {
        let mut pairs: Vec<(String, String)> = params
            .iter()
            .map(|(k, v)| (encode(k).into_owned(), encode(v).into_owned()))
            .collect();
        pairs.sort();
        let normalized = pairs
            .iter()
            .map(|(k, v)| format!("{k}={v}"))
            .collect::<Vec<_>>()
            .join("&");

        let base = format!(
            "{}&{}&{}",
            method.to_ascii_uppercase(),
            encode(url),
            encode(&normalized)
        );
        let key = format!(
            "{}&{}",
            encode(&self.consumer.consumer_secret),
            encode(&self.token.oauth_token_secret)
        );
        let key = hmac::Key::new(hmac::HMAC_SHA1_FOR_LEGACY_USE_ONLY, key.as_bytes());
        BASE64.encode(hmac::sign(&key, base.as_bytes()).as_ref())
    }
}

fn nonce() -> Result<String, AuthError> {
    let mut bytes = [0u8; 16];
    SystemRandom::new()
        .fill(&mut bytes)
        .map_err(|_| AuthError::Signing("no system randomness for the nonce".into()))?;
    Ok(bytes.iter().map(|b| format!("{b:02x}")).collect())
}

#[cfg(test)]
mod tests {
    use super::*;

    fn token(oauth_token: &str, secret: &str) -> OAuth1Token {
        OAuth1Token {
            oauth_token: oauth_token.into(),
            oauth_token_secret: secret.into(),
            mfa_token: None,
            mfa_expiration_timestamp: None,
            domain: None,
        }
    }

    #[test]
    fn test_signature_matches_published_vector() {
        // Worked example from Twitter's "Creating a signature" guide.
        let consumer = OAuthConsumer {
            consumer_key: "xvz1evFS4wEEPTGEFPHBog".into(),
            consumer_secret: "kAcSOqF21Fu85e7zjz7ZN2U4ZRhfV3WpwPAoE3Z7kBw".into(),
        };
        let token = token(
            "370773112-GmHxMAgYyLbNEtIKZeRNFsMKPR9EyMZeS9weJAEb",
            "LswwdoUaIvS8ltyTt5jkRh4J50vUPVVHtR2YPi5kE",
        );
        let header = OAuth1Signer::new(&consumer, &token).authorization_with(
            "post",
            "https://api.twitter.com/1.1/statuses/update.json",
            &[
                ("include_entities", "true"),
                ("status", "Hello Ladies + Gentlemen, a signed OAuth request!"),
            ],
            "kYjzVBB8Y0ZFabxSWbWovY3uYSQ2pTgmZeNu2VS4cg",
            "1318622958",
        );
        assert!(
            header.contains(r#"oauth_signature="hCtSmYh%2BiHYCEqBWrE7C7hYmtUk%3D""#),
            "{header}"
        );
    }

    #[test]
    fn test_form_params_are_signed_but_not_in_header() {
        let consumer = OAuthConsumer {
            consumer_key: "consumer-key".into(),
            consumer_secret: "consumer-secret".into(),
        };
        let token = token("oauth1-token", "oauth1-secret");
        let header = OAuth1Signer::new(&consumer, &token).authorization_with(
            "POST",
            "https://connectapi.garmin.com/oauth-service/oauth/exchange/user/2.0",
            &[("mfa_token", "mfa 1")],
            "nonce123",
            "1700000000",
        );
        assert_eq!(
            header,
            "OAuth oauth_consumer_key=\"consumer-key\", oauth_nonce=\"nonce123\", \
             oauth_signature_method=\"HMAC-SHA1\", oauth_timestamp=\"1700000000\", \
             oauth_token=\"oauth1-token\", oauth_version=\"1.0\", \
             oauth_signature=\"RwYSEVa%2BxImQq7euBeL%2Bvi4nKVc%3D\""
        );
    }

    #[test]
    fn test_nonce_changes_per_request() {
        let a = nonce().unwrap();
        let b = nonce().unwrap();
        assert_eq!(a.len(), 32);
        assert_ne!(a, b);
    }

    #[test]
    fn test_debug_redacts_consumer_secret() {
        let consumer = OAuthConsumer {
            consumer_key: "k".into(),
            consumer_secret: "very-secret".into(),
        };
        assert!(!format!("{consumer:?}").contains("very-secret"));
    }
}
