//! Remote key source: the authority's JWKS endpoint.
//!
//! [`KeySource`] is the last tier consulted by
//! [`SigningKeyCache`](crate::SigningKeyCache). It is the source of truth for
//! an issuer's signing keys, but it is slow and may be rate limited, so the
//! cache only calls it after the memory and durable tiers have both missed.

use std::{sync::Arc, time::Duration};

use async_trait::async_trait;
use chrono::Utc;
use platform_authorizer_storage::auth::KeySetSnapshot;
use serde::Deserialize;
use thiserror::Error;
use url::Url;

/// Default timeout for a JWKS fetch (connect + response).
pub const DEFAULT_FETCH_TIMEOUT: Duration = Duration::from_secs(10);

/// Default connect timeout for a JWKS fetch.
pub const DEFAULT_CONNECT_TIMEOUT: Duration = Duration::from_secs(5);

/// Path of the key set, relative to the authority base URL.
pub const JWKS_PATH: &str = ".well-known/jwks.json";

/// Errors raised while fetching a key set from the remote authority.
///
/// Every variant carries the URI that was asked, so a log line is enough to
/// tell which issuer is unhealthy.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[non_exhaustive]
pub enum KeySourceError {
    /// The HTTP client could not be built.
    #[error("Failed to build JWKS client for {uri}: {message}")]
    Client {
        /// JWKS URI.
        uri: String,
        /// Underlying error.
        message: String,
    },

    /// Transport failure or timeout.
    #[error("Failed to fetch JWKS from {uri}: {message}")]
    Fetch {
        /// JWKS URI.
        uri: String,
        /// Underlying error.
        message: String,
    },

    /// The endpoint answered with a non-success status.
    #[error("JWKS endpoint {uri} returned HTTP {status}")]
    Status {
        /// JWKS URI.
        uri: String,
        /// HTTP status code.
        status: u16,
    },

    /// The body was not a JSON Web Key Set.
    #[error("Failed to parse JWKS from {uri}: {message}")]
    Parse {
        /// JWKS URI.
        uri: String,
        /// Underlying error.
        message: String,
    },
}

impl KeySourceError {
    /// Returns the JWKS URI the failed request was sent to.
    #[must_use]
    pub fn uri(&self) -> &str {
        match self {
            Self::Client { uri, .. }
            | Self::Fetch { uri, .. }
            | Self::Status { uri, .. }
            | Self::Parse { uri, .. } => uri,
        }
    }
}

/// A source of truth for an issuer's signing keys.
#[async_trait]
pub trait KeySource: Send + Sync {
    /// Identifies the source in logs and, by default, names the durable record.
    fn uri(&self) -> &str;

    /// Fetches the complete current key set.
    ///
    /// The returned snapshot is stamped with the time of the fetch.
    async fn fetch_key_set(&self) -> Result<KeySetSnapshot, KeySourceError>;
}

#[async_trait]
impl<S: KeySource + ?Sized> KeySource for Arc<S> {
    fn uri(&self) -> &str {
        (**self).uri()
    }

    async fn fetch_key_set(&self) -> Result<KeySetSnapshot, KeySourceError> {
        (**self).fetch_key_set().await
    }
}

/// Derives the JWKS URI of an authority.
///
/// The key set lives at `.well-known/jwks.json` beneath the authority base
/// URL. A path on the authority is kept, so
/// `https://cognito-idp.eu-west-1.amazonaws.com/eu-west-1_abc` resolves to
/// `https://cognito-idp.eu-west-1.amazonaws.com/eu-west-1_abc/.well-known/jwks.json`.
///
/// # Errors
///
/// Returns the parse error if the joined URL is invalid.
pub fn jwks_uri_for(authority: &Url) -> Result<Url, url::ParseError> {
    let mut base = authority.clone();
    base.set_query(None);
    base.set_fragment(None);
    if !base.path().ends_with('/') {
        let path = format!("{}/", base.path());
        base.set_path(&path);
    }
    base.join(JWKS_PATH)
}

/// [`KeySource`] that fetches a JWKS document over HTTPS.
#[derive(Clone)]
pub struct HttpJwksSource {
    client: reqwest::Client,
    uri: Url,
    timeout: Duration,
}

impl std::fmt::Debug for HttpJwksSource {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("HttpJwksSource")
            .field("uri", &self.uri.as_str())
            .field("timeout", &self.timeout)
            .finish_non_exhaustive()
    }
}

#[bon::bon]
impl HttpJwksSource {
    /// Creates a source for the given JWKS URI.
    ///
    /// # Errors
    ///
    /// Returns [`KeySourceError::Client`] if the HTTP client cannot be built.
    #[builder]
    pub fn new(
        uri: Url,
        #[builder(default = DEFAULT_FETCH_TIMEOUT)] timeout: Duration,
    ) -> Result<Self, KeySourceError> {
        let client = reqwest::Client::builder()
            .timeout(timeout)
            .connect_timeout(timeout.min(DEFAULT_CONNECT_TIMEOUT))
            .build()
            .map_err(|e| KeySourceError::Client { uri: uri.to_string(), message: e.to_string() })?;
        Ok(Self { client, uri, timeout })
    }

    /// Creates a source for an authority's well-known JWKS endpoint.
    ///
    /// # Errors
    ///
    /// Returns [`KeySourceError::Client`] if the URI cannot be derived or the
    /// HTTP client cannot be built.
    pub fn for_authority(authority: &Url, timeout: Duration) -> Result<Self, KeySourceError> {
        let uri = jwks_uri_for(authority).map_err(|e| KeySourceError::Client {
            uri: authority.to_string(),
            message: format!("invalid authority: {e}"),
        })?;
        Self::builder().uri(uri).timeout(timeout).build()
    }

    /// Returns the request timeout.
    #[must_use]
    pub fn timeout(&self) -> Duration {
        self.timeout
    }
}

/// Body of a JWKS response.
///
/// Keys stay as raw JSON here and are decoded one by one, since authorities
/// may publish key types the verifier has no use for.
#[derive(Deserialize)]
struct JwksDocument {
    keys: Vec<serde_json::Value>,
}

#[async_trait]
impl KeySource for HttpJwksSource {
    fn uri(&self) -> &str {
        self.uri.as_str()
    }

    #[tracing::instrument(skip(self), fields(jwks_uri = %self.uri))]
    async fn fetch_key_set(&self) -> Result<KeySetSnapshot, KeySourceError> {
        let uri = self.uri.as_str();
        let response = self
            .client
            .get(self.uri.clone())
            .send()
            .await
            .map_err(|e| KeySourceError::Fetch { uri: uri.to_owned(), message: e.to_string() })?;

        let status = response.status();
        if !status.is_success() {
            return Err(KeySourceError::Status { uri: uri.to_owned(), status: status.as_u16() });
        }

        let document: JwksDocument = response
            .json()
            .await
            .map_err(|e| KeySourceError::Parse { uri: uri.to_owned(), message: e.to_string() })?;

        let published = document.keys.len();
        let snapshot = KeySetSnapshot::from_json_values(document.keys, Utc::now());
        tracing::debug!(published, usable = snapshot.len(), "JWKS fetched");
        Ok(snapshot)
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used, clippy::expect_used, clippy::panic)]
mod tests {
    use rstest::rstest;
    use serde_json::json;
    use wiremock::{
        Mock, MockServer, ResponseTemplate,
        matchers::{method, path},
    };

    use super::*;

    const X: &str = "11qYAYKxCrfVS_7TyWQHOg7hcvPapiMlrwIaaPcHURo";

    #[rstest]
    #[case::bare_host("https://auth.example.com", "https://auth.example.com/.well-known/jwks.json")]
    #[case::trailing_slash(
        "https://auth.example.com/",
        "https://auth.example.com/.well-known/jwks.json"
    )]
    #[case::with_path(
        "https://cognito-idp.eu-west-1.amazonaws.com/eu-west-1_abc",
        "https://cognito-idp.eu-west-1.amazonaws.com/eu-west-1_abc/.well-known/jwks.json"
    )]
    #[case::path_trailing_slash(
        "https://auth.example.com/tenant/",
        "https://auth.example.com/tenant/.well-known/jwks.json"
    )]
    #[case::query_dropped(
        "https://auth.example.com/?x=1",
        "https://auth.example.com/.well-known/jwks.json"
    )]
    fn test_jwks_uri_for(#[case] authority: &str, #[case] expected: &str) {
        let authority = Url::parse(authority).unwrap();
        assert_eq!(jwks_uri_for(&authority).unwrap().as_str(), expected);
    }

    async fn source_for(server: &MockServer) -> HttpJwksSource {
        let authority = Url::parse(&server.uri()).unwrap();
        HttpJwksSource::for_authority(&authority, Duration::from_secs(2)).unwrap()
    }

    #[tokio::test]
    async fn test_fetch_key_set() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/.well-known/jwks.json"))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({
                "keys": [
                    { "kty": "OKP", "crv": "Ed25519", "x": X, "kid": "k1" },
                    { "kty": "OKP", "crv": "Ed25519", "x": X, "kid": "k2" },
                    { "kty": "OKP", "crv": "Ed25519", "x": X },
                ]
            })))
            .expect(1)
            .mount(&server)
            .await;

        let snapshot = source_for(&server).await.fetch_key_set().await.unwrap();
        assert_eq!(snapshot.kids().collect::<Vec<_>>(), vec!["k1", "k2"]);
    }

    #[tokio::test]
    async fn test_fetch_skips_unsupported_keys() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/.well-known/jwks.json"))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({
                "keys": [
                    { "kty": "OKP", "crv": "Ed25519", "x": X, "kid": "good" },
                    { "kty": "EC", "crv": "secp256k1", "x": "AA", "y": "AA", "kid": "k1curve" },
                    { "kty": "OKP", "crv": "Ed25519", "x": X, "alg": "ES512", "kid": "es512" },
                    { "kty": "OKP", "crv": "Ed25519", "x": X, "kid": "next" },
                ]
            })))
            .expect(1)
            .mount(&server)
            .await;

        let snapshot = source_for(&server).await.fetch_key_set().await.unwrap();
        assert_eq!(snapshot.kids().collect::<Vec<_>>(), vec!["good", "next"]);
    }

    #[tokio::test]
    async fn test_fetch_body_without_keys_is_parse_error() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/.well-known/jwks.json"))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({ "issuer": "x" })))
            .mount(&server)
            .await;

        let err = source_for(&server).await.fetch_key_set().await.unwrap_err();
        assert!(matches!(err, KeySourceError::Parse { .. }), "got {err:?}");
    }

    #[tokio::test]
    async fn test_fetch_non_success_status() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/.well-known/jwks.json"))
            .respond_with(ResponseTemplate::new(503))
            .mount(&server)
            .await;

        let source = source_for(&server).await;
        let err = source.fetch_key_set().await.unwrap_err();
        assert_eq!(err, KeySourceError::Status { uri: source.uri().to_owned(), status: 503 });
    }

    #[tokio::test]
    async fn test_fetch_unparseable_body() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/.well-known/jwks.json"))
            .respond_with(ResponseTemplate::new(200).set_body_string("<html>oops</html>"))
            .mount(&server)
            .await;

        let err = source_for(&server).await.fetch_key_set().await.unwrap_err();
        assert!(matches!(err, KeySourceError::Parse { .. }), "got {err:?}");
    }

    #[tokio::test]
    async fn test_fetch_timeout_is_fetch_error() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/.well-known/jwks.json"))
            .respond_with(
                ResponseTemplate::new(200)
                    .set_body_json(json!({ "keys": [] }))
                    .set_delay(Duration::from_millis(500)),
            )
            .mount(&server)
            .await;

        let authority = Url::parse(&server.uri()).unwrap();
        let source =
            HttpJwksSource::for_authority(&authority, Duration::from_millis(50)).unwrap();
        let err = source.fetch_key_set().await.unwrap_err();
        assert!(matches!(err, KeySourceError::Fetch { .. }), "got {err:?}");
        assert_eq!(err.uri(), source.uri());
    }

    #[tokio::test]
    async fn test_fetch_unreachable_host() {
        // Port 9 (discard) is closed on any sane test machine.
        let source = HttpJwksSource::builder()
            .uri(Url::parse("http://127.0.0.1:9/.well-known/jwks.json").unwrap())
            .timeout(Duration::from_secs(1))
            .build()
            .unwrap();

        assert!(matches!(source.fetch_key_set().await, Err(KeySourceError::Fetch { .. })));
    }

    #[test]
    fn test_debug_shows_uri() {
        let source = HttpJwksSource::builder()
            .uri(Url::parse("https://auth.example.com/.well-known/jwks.json").unwrap())
            .build()
            .unwrap();
        let debug = format!("{source:?}");
        assert!(debug.contains("https://auth.example.com/.well-known/jwks.json"));
        assert_eq!(source.timeout(), DEFAULT_FETCH_TIMEOUT);
    }
}
