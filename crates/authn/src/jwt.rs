//! JWT decoding and verification.
//!
//! Tokens are handled in two passes. The unverified pass reads the header
//! (`kid`, `alg`) and the `iss` claim so the caller can pick an issuer and a
//! key. The verified pass checks the signature against the resolved key and
//! then `aud`, `iss`, `exp` and `nbf`.
//!
//! # Example
//!
//! ```no_run
//! // Requires a valid JWT token string.
//! use platform_authorizer_authn::jwt::{decode_jwt_header, decode_unverified_claims, token_kid};
//!
//! # fn example(token: &str) -> Result<(), Box<dyn std::error::Error>> {
//! let header = decode_jwt_header(token)?;
//! let kid = token_kid(&header)?;
//! let claims = decode_unverified_claims(token)?;
//!
//! println!("kid {kid} from issuer {:?}", claims.iss);
//! # Ok(())
//! # }
//! ```

use base64::{Engine, engine::general_purpose::URL_SAFE_NO_PAD};
use jsonwebtoken::{Header, Validation, decode, decode_header};
use serde::{Deserialize, Serialize};

use crate::{
    error::AuthError,
    signing_key_cache::{ResolvedKey, SigningKeyCache},
    validation::{validate_algorithm, validate_kid},
};

/// Claims every verified token must carry.
pub const REQUIRED_CLAIMS: &[&str] = &["exp", "iss", "sub", "aud"];

/// The `aud` claim, which may be a single string or an array.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum Audience {
    /// A single audience.
    Single(String),
    /// Several audiences.
    Many(Vec<String>),
}

impl Audience {
    /// Iterates over every audience value.
    pub fn iter(&self) -> impl Iterator<Item = &str> {
        let values: &[String] = match self {
            Self::Single(value) => std::slice::from_ref(value),
            Self::Many(values) => values,
        };
        values.iter().map(String::as_str)
    }

    /// Returns whether `audience` is one of the values.
    #[must_use]
    pub fn contains(&self, audience: &str) -> bool {
        self.iter().any(|value| value == audience)
    }
}

/// Claims of a token whose signature and registered claims have been checked.
///
/// ```json
/// {
///   "iss": "https://auth.example.com",
///   "sub": "client-123",
///   "aud": ["https://api.example.com"],
///   "exp": 1234567890,
///   "scope": "orders:read orders:write"
/// }
/// ```
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct VerifiedClaims {
    /// Issuer.
    pub iss: String,
    /// Subject; becomes the caller's principal.
    pub sub: String,
    /// Audience.
    pub aud: Audience,
    /// Expiration time (seconds since epoch).
    pub exp: u64,
    /// Issued at (optional, seconds since epoch).
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub iat: Option<u64>,
    /// Not before (optional, seconds since epoch).
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub nbf: Option<u64>,
    /// Space-separated scopes.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub scope: Option<String>,
}

impl VerifiedClaims {
    /// Parse scopes from the space-separated `scope` claim.
    #[must_use]
    pub fn parse_scopes(&self) -> Vec<String> {
        self.scope
            .as_deref()
            .map(|scope| scope.split_whitespace().map(str::to_owned).collect())
            .unwrap_or_default()
    }
}

/// Claims read without verification, for routing only.
#[derive(Clone, Debug, Default, PartialEq, Deserialize)]
pub struct UnverifiedClaims {
    /// Issuer, if the token names one.
    #[serde(default)]
    pub iss: Option<String>,
}

/// Decode JWT header without verification.
///
/// # Errors
///
/// Returns an error if the JWT header cannot be decoded.
pub fn decode_jwt_header(token: &str) -> Result<Header, AuthError> {
    decode_header(token)
        .map_err(|e| AuthError::invalid_token_format(format!("Failed to decode JWT header: {e}")))
}

/// Returns the header's `kid` after format validation.
///
/// # Errors
///
/// Returns an error if the header has no `kid` or the `kid` fails
/// [`validate_kid`].
pub fn token_kid(header: &Header) -> Result<&str, AuthError> {
    let kid = header
        .kid
        .as_deref()
        .ok_or_else(|| AuthError::invalid_token_format("JWT header missing 'kid' field"))?;
    validate_kid(kid)?;
    Ok(kid)
}

/// Decode JWT claims without verification (used to select the issuer).
///
/// # Errors
///
/// Returns an error if:
/// - The JWT does not have exactly 3 parts
/// - The payload cannot be base64-decoded
/// - The payload is not a JSON object
pub fn decode_unverified_claims(token: &str) -> Result<UnverifiedClaims, AuthError> {
    let parts: Vec<&str> = token.split('.').collect();
    if parts.len() != 3 {
        return Err(AuthError::invalid_token_format("JWT must have 3 parts separated by dots"));
    }

    let payload_bytes = URL_SAFE_NO_PAD.decode(parts[1]).map_err(|e| {
        AuthError::invalid_token_format(format!("Failed to decode JWT payload: {e}"))
    })?;

    serde_json::from_slice(&payload_bytes)
        .map_err(|e| AuthError::invalid_token_format(format!("Failed to parse JWT claims: {e}")))
}

/// Verifies tokens for one issuer and a set of accepted audiences.
#[derive(Clone, Debug)]
pub struct TokenVerifier {
    issuer: String,
    audiences: Vec<String>,
    leeway: u64,
}

#[bon::bon]
impl TokenVerifier {
    /// Creates a verifier.
    ///
    /// `leeway` is the clock skew, in seconds, tolerated on `exp` and `nbf`
    /// (default 0). An empty audience list rejects every token.
    #[builder]
    pub fn new(
        #[builder(into)] issuer: String,
        audiences: Vec<String>,
        #[builder(default)] leeway: u64,
    ) -> Self {
        Self { issuer, audiences, leeway }
    }
}

impl TokenVerifier {
    /// The expected `iss` value.
    #[must_use]
    pub fn issuer(&self) -> &str {
        &self.issuer
    }

    /// The accepted `aud` values.
    #[must_use]
    pub fn audiences(&self) -> &[String] {
        &self.audiences
    }

    /// Verifies `token` against `key`.
    ///
    /// # Errors
    ///
    /// Returns an error if:
    /// - The header cannot be decoded or names a rejected algorithm
    /// - The key publishes a different algorithm than the header
    /// - The signature is invalid
    /// - A required claim is missing, expired, not yet valid, or mismatched
    pub fn verify(&self, token: &str, key: &ResolvedKey) -> Result<VerifiedClaims, AuthError> {
        let header = decode_jwt_header(token)?;
        let alg = format!("{:?}", header.alg);
        validate_algorithm(&alg)?;

        if let Some(published) = &key.jwk().common.key_algorithm {
            let published = format!("{published:?}");
            if published != alg {
                return Err(AuthError::unsupported_algorithm(format!(
                    "Token algorithm '{alg}' does not match key algorithm '{published}'"
                )));
            }
        }

        let mut validation = Validation::new(header.alg);
        validation.leeway = self.leeway;
        validation.validate_exp = true;
        validation.validate_nbf = true;
        validation.set_audience(&self.audiences);
        validation.set_issuer(&[&self.issuer]);
        validation.set_required_spec_claims(REQUIRED_CLAIMS);

        let token_data = decode::<VerifiedClaims>(token, key.decoding_key(), &validation)?;
        Ok(token_data.claims)
    }
}

/// Verify a JWT using keys from a [`SigningKeyCache`].
///
/// 1. Decodes the header and validates `kid` and `alg`
/// 2. Resolves `kid` through the cache tiers
/// 3. Verifies the signature and claims with `verifier`
///
/// # Errors
///
/// Returns an error if:
/// - The JWT is malformed or has no valid `kid`
/// - The algorithm is not in [`crate::validation::ACCEPTED_ALGORITHMS`]
/// - The key cannot be found, or the key source is unavailable
/// - The signature or a claim is invalid
#[tracing::instrument(skip(token, signing_key_cache, verifier), fields(issuer = verifier.issuer()))]
pub async fn verify_with_signing_key_cache(
    token: &str,
    signing_key_cache: &SigningKeyCache,
    verifier: &TokenVerifier,
) -> Result<VerifiedClaims, AuthError> {
    let header = decode_jwt_header(token)?;
    let kid = token_kid(&header)?;
    validate_algorithm(&format!("{:?}", header.alg))?;

    let key = signing_key_cache.resolve(kid).await?;
    let claims = verifier.verify(token, &key)?;

    tracing::debug!(kid, sub = %claims.sub, "JWT verified");
    Ok(claims)
}
