//! # cb-auth-oauth1
//!
//! HMAC-SHA1 request signing (OAuth 1.0a, user context) for the X API.
//! Produces the `Authorization` header value for a single request.

use base64::Engine;
use hmac::{Hmac, Mac};
use rand::distr::Alphanumeric;
use rand::Rng;
use secrecy::{ExposeSecret, SecretString};
use sha1::Sha1;

type HmacSha1 = Hmac<Sha1>;

const SIGNATURE_METHOD: &str = "HMAC-SHA1";
const OAUTH_VERSION: &str = "1.0";
const NONCE_LEN: usize = 32;

/// Consumer and access-token credentials of one account.
pub struct OAuth1Signer {
    consumer_key: String,
    consumer_secret: SecretString,
    token: String,
    token_secret: SecretString,
}

/// RFC 3986 encoding as OAuth requires: everything except `A-Za-z0-9-._~`.
pub fn percent_encode(value: &str) -> String {
    urlencoding::encode(value).into_owned()
}

impl OAuth1Signer {
    pub fn new(
        consumer_key: impl Into<String>,
        consumer_secret: SecretString,
        token: impl Into<String>,
        token_secret: SecretString,
    ) -> Self {
        Self {
            consumer_key: consumer_key.into(),
            consumer_secret,
            token: token.into(),
            token_secret,
        }
    }

    /// Header for a request with a fresh nonce and the current time.
    ///
    /// `params` holds query and form parameters; JSON and multipart bodies are
    /// not part of the signature.
    pub fn authorization_header(&self, method: &str, url: &str, params: &[(&str, &str)]) -> String {
        let nonce: String = rand::rng()
            .sample_iter(Alphanumeric)
            .take(NONCE_LEN)
            .map(char::from)
            .collect();
        let timestamp = chrono::Utc::now().timestamp();
        self.authorization_header_with(method, url, params, &nonce, timestamp)
    }

    pub fn authorization_header_with(
        &self,
        method: &str,
        url: &str,
        params: &[(&str, &str)],
        nonce: &str,
        timestamp: i64,
    ) -> String {
        let timestamp = timestamp.to_string();
        let mut oauth_params = vec![
            ("oauth_consumer_key", self.consumer_key.as_str()),
            ("oauth_nonce", nonce),
            ("oauth_signature_method", SIGNATURE_METHOD),
            ("oauth_timestamp", timestamp.as_str()),
            ("oauth_token", self.token.as_str()),
            ("oauth_version", OAUTH_VERSION),
        ];

        let base = signature_base(method, url, oauth_params.iter().chain(params.iter()));
        let signature = self.sign(&base);
        oauth_params.push(("oauth_signature", signature.as_str()));
        oauth_params.sort_unstable();

        let fields = oauth_params
            .iter()
            .map(|(k, v)| format!("{}=\"{}\"", percent_encode(k), percent_encode(v)))
            .collect::<Vec<_>>()
            .join(", ");
        format!("OAuth {fields}")
    }

    fn sign(&self, base: &str) -> String {
        let key = format!(
            "{}&{}",
            percent_encode(self.consumer_secret.expose_secret()),
            percent_encode(self.token_secret.expose_secret())
        );
        let mut mac = HmacSha1::new_from_slice(key.as_bytes()).expect("HMAC accepts keys of any length");
        mac.update(base.as_bytes());
        base64::engine::general_purpose::STANDARD.encode(mac.finalize().into_bytes())
    }
}

/// `METHOD&url&params` with parameters encoded, sorted and joined.
fn signature_base<'a, I>(method: &str, url: &str, params: I) -> String
where
    I: Iterator<Item = &'a (&'a str, &'a str)>,
{
    let mut encoded: Vec<(String, String)> = params
        .map(|(k, v)| (percent_encode(k), percent_encode(v)))
        .collect();
    encoded.sort();

    let param_string = encoded
        .iter()
        .map(|(k, v)| format!("{k}={v}"))
        .collect::<Vec<_>>()
        .join("&");

    format!(
        "{}&{}&{}",
        method.to_ascii_uppercase(),
        percent_encode(url),
        percent_encode(&param_string)
    )
}
