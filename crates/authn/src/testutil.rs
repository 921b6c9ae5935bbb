//! Shared test utilities for authentication testing.
//!
//! Helpers for generating Ed25519 key pairs, publishing them as JWKs, signing
//! tokens, crafting raw JWT strings (for attack testing), and a scriptable
//! [`KeySource`]. Feature-gated behind `testutil` to keep it out of production
//! builds.
//!
//! # Usage
//!
//! ```toml
//! [dev-dependencies]
//! platform-authorizer-authn = { path = "../authn", features = ["testutil"] }
//! ```
//!
//! ```no_run
//! // Requires the `testutil` feature to be enabled.
//! use platform_authorizer_authn::testutil::{TestSigningKey, StaticKeySource};
//! ```

use std::sync::atomic::{AtomicUsize, Ordering};

use async_trait::async_trait;
use base64::{Engine, engine::general_purpose::URL_SAFE_NO_PAD};
use chrono::Utc;
use ed25519_dalek::SigningKey;
use jsonwebtoken::{Algorithm, EncodingKey, Header, jwk::Jwk};
use parking_lot::Mutex;
use platform_authorizer_storage::auth::{KeySetSnapshot, SigningKeyRecord};
use rand_core::OsRng;
use serde_json::json;
use zeroize::Zeroizing;

use crate::jwks::{KeySource, KeySourceError};

/// Issuer used by [`standard_claims`].
pub const TEST_ISSUER: &str = "https://auth.example.com";

/// Audience used by [`standard_claims`].
pub const TEST_AUDIENCE: &str = "https://api.example.com";

/// JWKS URI of [`TEST_ISSUER`].
pub const TEST_JWKS_URI: &str = "https://auth.example.com/.well-known/jwks.json";

/// PKCS#1 RSA-2048 private key, for tests that need a non-Ed25519 key.
pub const RSA_TEST_KEY_PEM: &str = include_str!("../testdata/rsa-2048.pem");

/// Base64url modulus of [`RSA_TEST_KEY_PEM`].
pub const RSA_TEST_KEY_N: &str = "zcabxab1xMDimBEZizAJuNUfuRQVtHZXb1SiuuHweRk-fXnDslPYQOC0lOEP_PA5ipqUxm-qRwImWoiEGV2NnA7ZDlUIpMb9HDnPZel5H9hVxCmNuvKeGBut6ynUSuRQ5LVEm39kPZAfGKweAKhILwW3JyTijAVItUH_QXiIJ2uam0AloI3-L4kPuBpI_T_Fur3pEQSqG9ck8-n1AmYNjFErzKeEw0Yy-bnDd3ugZqCPdyp5f_ztcZHD5q-78emQjXt_jIhdxh2HefHvJrcyBajlUHiLrN5fr8VmpGoZb3hwZmKUxmok-nNqAT0Pofv6Hma2YQcY3mWOMvC23Bt3KQ";

/// Base64url public exponent of [`RSA_TEST_KEY_PEM`].
pub const RSA_TEST_KEY_E: &str = "AQAB";

/// Generates a test Ed25519 key pair.
///
/// Returns `(pkcs8_der, public_key_base64url)` where:
/// - `pkcs8_der` is the private key in PKCS#8 DER format wrapped in [`Zeroizing`] (suitable for
///   [`EncodingKey::from_ed_der`])
/// - `public_key_base64url` is the 32-byte public key encoded as base64url without padding (the
///   JWK `x` parameter)
///
/// Each call generates a fresh random key pair.
pub fn generate_test_keypair() -> (Zeroizing<Vec<u8>>, String) {
    let signing_key = SigningKey::generate(&mut OsRng);
    let public_key_b64 = URL_SAFE_NO_PAD.encode(signing_key.verifying_key().to_bytes());

    let private_bytes: Zeroizing<[u8; 32]> = Zeroizing::new(signing_key.to_bytes());
    let mut pkcs8_der = Zeroizing::new(vec![
        0x30, 0x2e, // SEQUENCE, 46 bytes
        0x02, 0x01, 0x00, // INTEGER version 0
        0x30, 0x05, // SEQUENCE, 5 bytes (algorithm identifier)
        0x06, 0x03, 0x2b, 0x65, 0x70, // OID 1.3.101.112 (Ed25519)
        0x04, 0x22, // OCTET STRING, 34 bytes
        0x04, 0x20, // OCTET STRING, 32 bytes (the actual key)
    ]);
    pkcs8_der.extend_from_slice(&*private_bytes);

    (pkcs8_der, public_key_b64)
}

/// Builds an Ed25519 JWK as an authority would publish it.
///
/// # Panics
///
/// Panics if the JSON does not deserialize as a JWK.
pub fn ed25519_jwk(kid: &str, x: &str) -> Jwk {
    serde_json::from_value(json!({
        "kty": "OKP",
        "crv": "Ed25519",
        "x": x,
        "kid": kid,
        "alg": "EdDSA",
        "use": "sig",
    }))
    .expect("valid Ed25519 JWK")
}

/// Builds the RSA JWK matching [`RSA_TEST_KEY_PEM`].
///
/// # Panics
///
/// Panics if the JSON does not deserialize as a JWK.
pub fn rsa_jwk(kid: &str) -> Jwk {
    serde_json::from_value(json!({
        "kty": "RSA",
        "n": RSA_TEST_KEY_N,
        "e": RSA_TEST_KEY_E,
        "kid": kid,
        "alg": "RS256",
        "use": "sig",
    }))
    .expect("valid RSA JWK")
}

/// Builds a [`KeySetSnapshot`] from JWKs, stamped now.
pub fn snapshot_of(jwks: impl IntoIterator<Item = Jwk>) -> KeySetSnapshot {
    KeySetSnapshot::from_jwks(jwks, Utc::now())
}

/// A freshly generated Ed25519 signing key with its `kid`.
pub struct TestSigningKey {
    kid: String,
    pkcs8_der: Zeroizing<Vec<u8>>,
    x: String,
}

impl TestSigningKey {
    /// Generates a new key pair under `kid`.
    pub fn generate(kid: &str) -> Self {
        let (pkcs8_der, x) = generate_test_keypair();
        Self { kid: kid.to_owned(), pkcs8_der, x }
    }

    /// The key identifier.
    pub fn kid(&self) -> &str {
        &self.kid
    }

    /// The public half as a JWK.
    pub fn jwk(&self) -> Jwk {
        ed25519_jwk(&self.kid, &self.x)
    }

    /// The public half as a key-set record.
    ///
    /// # Panics
    ///
    /// Never in practice: the generated JWK always carries a `kid`.
    pub fn record(&self) -> SigningKeyRecord {
        SigningKeyRecord::try_from(self.jwk()).expect("generated JWK has a kid")
    }

    /// Signs `claims` with this key, setting `kid` in the header.
    pub fn sign(&self, claims: &serde_json::Value) -> String {
        create_signed_jwt(&self.pkcs8_der, &self.kid, claims)
    }

    /// Signs `claims` with this key but advertises a different `kid`.
    pub fn sign_as(&self, kid: &str, claims: &serde_json::Value) -> String {
        create_signed_jwt(&self.pkcs8_der, kid, claims)
    }
}

impl std::fmt::Debug for TestSigningKey {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("TestSigningKey").field("kid", &self.kid).finish_non_exhaustive()
    }
}

/// Standard claims for [`TEST_ISSUER`] and [`TEST_AUDIENCE`], expiring in one hour.
pub fn standard_claims(sub: &str) -> serde_json::Value {
    let now = Utc::now().timestamp();
    json!({
        "iss": TEST_ISSUER,
        "sub": sub,
        "aud": TEST_AUDIENCE,
        "exp": now + 3600,
        "iat": now,
        "scope": "orders:read orders:write",
    })
}

/// Creates a JWT signed with an Ed25519 key in PKCS#8 DER format.
///
/// # Panics
///
/// Panics if JWT encoding fails (should not happen with valid inputs).
pub fn create_signed_jwt(pkcs8_der: &[u8], kid: &str, claims: &serde_json::Value) -> String {
    let mut header = Header::new(Algorithm::EdDSA);
    header.kid = Some(kid.to_string());

    let encoding_key = EncodingKey::from_ed_der(pkcs8_der);
    jsonwebtoken::encode(&header, claims, &encoding_key).expect("Failed to encode test JWT")
}

/// Creates an RS256 JWT signed with [`RSA_TEST_KEY_PEM`].
///
/// # Panics
///
/// Panics if the fixture key cannot be loaded or encoding fails.
pub fn create_rsa_signed_jwt(kid: &str, claims: &serde_json::Value) -> String {
    let mut header = Header::new(Algorithm::RS256);
    header.kid = Some(kid.to_string());

    let encoding_key =
        EncodingKey::from_rsa_pem(RSA_TEST_KEY_PEM.as_bytes()).expect("RSA test fixture");
    jsonwebtoken::encode(&header, claims, &encoding_key).expect("Failed to encode test JWT")
}

/// Creates a raw JWT string from arbitrary header and payload JSON.
///
/// The resulting JWT has the structure `{header_b64}.{payload_b64}.` with an
/// empty signature, for testing rejection of malformed or attack JWTs.
///
/// # Panics
///
/// Panics if JSON serialization fails.
pub fn craft_raw_jwt(header_json: &serde_json::Value, payload_json: &serde_json::Value) -> String {
    let header_b64 = URL_SAFE_NO_PAD.encode(serde_json::to_vec(header_json).expect("header json"));
    let payload_b64 =
        URL_SAFE_NO_PAD.encode(serde_json::to_vec(payload_json).expect("payload json"));
    format!("{header_b64}.{payload_b64}.")
}

/// A [`KeySource`] serving a fixed key set, with call counting and failure injection.
#[derive(Debug)]
pub struct StaticKeySource {
    uri: String,
    snapshot: Mutex<KeySetSnapshot>,
    failure: Mutex<Option<KeySourceError>>,
    fetches: AtomicUsize,
}

impl StaticKeySource {
    /// Creates a source at `uri` serving `snapshot`.
    pub fn new(uri: impl Into<String>, snapshot: KeySetSnapshot) -> Self {
        Self {
            uri: uri.into(),
            snapshot: Mutex::new(snapshot),
            failure: Mutex::new(None),
            fetches: AtomicUsize::new(0),
        }
    }

    /// Creates a source at [`TEST_JWKS_URI`] publishing `jwks`.
    pub fn publishing(jwks: impl IntoIterator<Item = Jwk>) -> Self {
        Self::new(TEST_JWKS_URI, snapshot_of(jwks))
    }

    /// Replaces the published key set.
    pub fn set_snapshot(&self, snapshot: KeySetSnapshot) {
        *self.snapshot.lock() = snapshot;
    }

    /// Makes subsequent fetches fail with `failure` (or succeed with `None`).
    pub fn fail_with(&self, failure: Option<KeySourceError>) {
        *self.failure.lock() = failure;
    }

    /// Makes subsequent fetches fail as if the endpoint returned `status`.
    pub fn fail_with_status(&self, status: u16) {
        self.fail_with(Some(KeySourceError::Status { uri: self.uri.clone(), status }));
    }

    /// Number of fetches so far, including failed ones.
    pub fn fetch_count(&self) -> usize {
        self.fetches.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl KeySource for StaticKeySource {
    fn uri(&self) -> &str {
        &self.uri
    }

    async fn fetch_key_set(&self) -> Result<KeySetSnapshot, KeySourceError> {
        self.fetches.fetch_add(1, Ordering::SeqCst);
        if let Some(failure) = self.failure.lock().clone() {
            return Err(failure);
        }
        Ok(self.snapshot.lock().clone())
    }
}

/// Asserts that a [`Result<T, AuthError>`](crate::error::AuthError) is an `Err`
/// matching the given variant.
///
/// # Examples
///
/// ```no_run
/// // Requires the `testutil` feature to be enabled.
/// use platform_authorizer_authn::assert_auth_error;
/// use platform_authorizer_authn::error::AuthError;
///
/// let result: Result<(), AuthError> = Err(AuthError::token_expired());
/// assert_auth_error!(result, TokenExpired);
/// ```
#[macro_export]
macro_rules! assert_auth_error {
    ($result:expr, $variant:ident) => {
        assert!(
            matches!($result, Err($crate::error::AuthError::$variant { .. })),
            "expected AuthError::{}, got: {:?}",
            stringify!($variant),
            $result,
        );
    };
    ($result:expr, $variant:ident, $msg:expr) => {
        assert!(
            matches!($result, Err($crate::error::AuthError::$variant { .. })),
            "{}: expected AuthError::{}, got: {:?}",
            $msg,
            stringify!($variant),
            $result,
        );
    };
}

#[cfg(test)]
#[allow(clippy::unwrap_used, clippy::expect_used, clippy::panic)]
mod tests {
    use jsonwebtoken::DecodingKey;

    use super::*;
    use crate::error::AuthError;

    #[test]
    fn test_generate_test_keypair_produces_valid_key() {
        let (pkcs8_der, public_key_b64) = generate_test_keypair();
        // 16 header bytes + 32 key bytes
        assert_eq!(pkcs8_der.len(), 48);
        assert_eq!(public_key_b64.len(), 43);
    }

    #[test]
    fn test_generated_jwk_is_usable() {
        let key = TestSigningKey::generate("kid-001");
        assert_eq!(key.record().kid(), "kid-001");
        assert!(DecodingKey::from_jwk(&key.jwk()).is_ok());
    }

    #[test]
    fn test_rsa_fixture_matches_jwk() {
        assert!(EncodingKey::from_rsa_pem(RSA_TEST_KEY_PEM.as_bytes()).is_ok());
        assert!(DecodingKey::from_jwk(&rsa_jwk("rsa-1")).is_ok());
    }

    #[test]
    fn test_craft_raw_jwt_format() {
        let jwt = craft_raw_jwt(&json!({"alg": "none"}), &json!({"sub": "test"}));
        let parts: Vec<&str> = jwt.split('.').collect();
        assert_eq!(parts.len(), 3);
        assert!(parts[2].is_empty(), "signature should be empty for raw JWTs");
    }

    #[tokio::test]
    async fn test_static_key_source_counts_and_fails() {
        let source = StaticKeySource::publishing([TestSigningKey::generate("k").jwk()]);
        assert_eq!(source.fetch_key_set().await.unwrap().len(), 1);

        source.fail_with_status(502);
        let err = source.fetch_key_set().await.unwrap_err();
        assert_eq!(err.uri(), TEST_JWKS_URI);
        assert_eq!(source.fetch_count(), 2);
    }

    #[test]
    fn test_assert_auth_error_variants() {
        let result: Result<(), AuthError> = Err(AuthError::key_not_found("kid-001"));
        assert_auth_error!(result, KeyNotFound);
        let result: Result<(), AuthError> = Err(AuthError::token_expired());
        assert_auth_error!(result, TokenExpired, "token should be expired");
    }
}
