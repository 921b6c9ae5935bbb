//! Authentication error types.
//!
//! This module defines errors that can occur while resolving signing keys and
//! verifying bearer tokens. The authorizer never shows these to callers; they
//! exist for logs, metrics and tests.

use thiserror::Error;

use crate::jwks::KeySourceError;

/// Authentication errors.
///
/// # Non-exhaustive
///
/// This enum is marked `#[non_exhaustive]`. Downstream match expressions must
/// include a wildcard arm (`_ =>`).
#[derive(Debug, Error)]
#[non_exhaustive]
pub enum AuthError {
    /// Malformed JWT - cannot be decoded.
    #[error("Invalid token format: {0}")]
    InvalidTokenFormat(String),

    /// Token has expired.
    #[error("Token expired")]
    TokenExpired,

    /// Token not yet valid (nbf claim in future).
    #[error("Token not yet valid")]
    TokenNotYetValid,

    /// Signature verification failed.
    #[error("Invalid signature")]
    InvalidSignature,

    /// Unknown or invalid issuer.
    #[error("Invalid issuer: {0}")]
    InvalidIssuer(String),

    /// Audience doesn't match any accepted value.
    #[error("Invalid audience: {0}")]
    InvalidAudience(String),

    /// Required claim is missing.
    #[error("Missing claim: {0}")]
    MissingClaim(String),

    /// Algorithm not in allowed list.
    #[error("Unsupported algorithm: {0}")]
    UnsupportedAlgorithm(String),

    /// No cache tier holds a key with this identifier.
    #[error("Signing key not found: {kid}")]
    KeyNotFound {
        /// Key ID that was not found.
        kid: String,
    },

    /// The key was found but cannot verify this token.
    #[error("Invalid public key: {0}")]
    InvalidPublicKey(String),

    /// The remote key source could not be reached or returned garbage.
    ///
    /// Distinct from [`AuthError::KeyNotFound`]: the key may well exist, the
    /// authority just could not be asked.
    #[error("Key source unavailable: {0}")]
    KeySourceUnavailable(
        /// The underlying fetch failure, carrying the JWKS URI.
        #[source]
        KeySourceError,
    ),
}

impl AuthError {
    /// Creates an [`AuthError::InvalidTokenFormat`].
    #[must_use]
    pub fn invalid_token_format(message: impl Into<String>) -> Self {
        Self::InvalidTokenFormat(message.into())
    }

    /// Creates an [`AuthError::TokenExpired`].
    #[must_use]
    pub fn token_expired() -> Self {
        Self::TokenExpired
    }

    /// Creates an [`AuthError::TokenNotYetValid`].
    #[must_use]
    pub fn token_not_yet_valid() -> Self {
        Self::TokenNotYetValid
    }

    /// Creates an [`AuthError::InvalidSignature`].
    #[must_use]
    pub fn invalid_signature() -> Self {
        Self::InvalidSignature
    }

    /// Creates an [`AuthError::InvalidIssuer`].
    #[must_use]
    pub fn invalid_issuer(message: impl Into<String>) -> Self {
        Self::InvalidIssuer(message.into())
    }

    /// Creates an [`AuthError::InvalidAudience`].
    #[must_use]
    pub fn invalid_audience(message: impl Into<String>) -> Self {
        Self::InvalidAudience(message.into())
    }

    /// Creates an [`AuthError::MissingClaim`].
    #[must_use]
    pub fn missing_claim(claim: impl Into<String>) -> Self {
        Self::MissingClaim(claim.into())
    }

    /// Creates an [`AuthError::UnsupportedAlgorithm`].
    #[must_use]
    pub fn unsupported_algorithm(message: impl Into<String>) -> Self {
        Self::UnsupportedAlgorithm(message.into())
    }

    /// Creates an [`AuthError::KeyNotFound`].
    #[must_use]
    pub fn key_not_found(kid: impl Into<String>) -> Self {
        Self::KeyNotFound { kid: kid.into() }
    }

    /// Creates an [`AuthError::InvalidPublicKey`].
    #[must_use]
    pub fn invalid_public_key(message: impl Into<String>) -> Self {
        Self::InvalidPublicKey(message.into())
    }

    /// Creates an [`AuthError::KeySourceUnavailable`].
    #[must_use]
    pub fn key_source_unavailable(source: KeySourceError) -> Self {
        Self::KeySourceUnavailable(source)
    }
}

impl From<jsonwebtoken::errors::Error> for AuthError {
    fn from(err: jsonwebtoken::errors::Error) -> Self {
        use jsonwebtoken::errors::ErrorKind;

        match err.kind() {
            ErrorKind::InvalidToken => AuthError::invalid_token_format("Invalid JWT structure"),
            ErrorKind::InvalidSignature => AuthError::InvalidSignature,
            ErrorKind::ExpiredSignature => AuthError::TokenExpired,
            ErrorKind::ImmatureSignature => AuthError::TokenNotYetValid,
            ErrorKind::InvalidAudience => {
                AuthError::invalid_audience("Audience validation failed")
            },
            ErrorKind::InvalidIssuer => AuthError::invalid_issuer("Issuer validation failed"),
            ErrorKind::InvalidAlgorithm => {
                AuthError::unsupported_algorithm("Algorithm does not match the signing key")
            },
            ErrorKind::MissingRequiredClaim(claim) => AuthError::missing_claim(claim.clone()),
            ErrorKind::InvalidKeyFormat
            | ErrorKind::InvalidRsaKey(_)
            | ErrorKind::InvalidEcdsaKey => AuthError::invalid_public_key(err.to_string()),
            _ => AuthError::invalid_token_format(format!("JWT error: {err}")),
        }
    }
}

impl From<KeySourceError> for AuthError {
    fn from(err: KeySourceError) -> Self {
        AuthError::KeySourceUnavailable(err)
    }
}

/// Result type alias for authentication operations.
pub type Result<T> = std::result::Result<T, AuthError>;

#[cfg(test)]
#[allow(clippy::unwrap_used, clippy::expect_used, clippy::panic)]
mod tests {
    use std::error::Error as _;

    use jsonwebtoken::errors::ErrorKind;
    use rstest::rstest;

    use super::*;

    #[test]
    fn test_error_display() {
        assert_eq!(
            AuthError::invalid_token_format("test").to_string(),
            "Invalid token format: test"
        );
        assert_eq!(AuthError::token_expired().to_string(), "Token expired");
        assert_eq!(AuthError::missing_claim("sub").to_string(), "Missing claim: sub");
        assert_eq!(
            AuthError::key_not_found("key-123").to_string(),
            "Signing key not found: key-123"
        );
    }

    #[rstest]
    #[case::expired(ErrorKind::ExpiredSignature, "TokenExpired")]
    #[case::immature(ErrorKind::ImmatureSignature, "TokenNotYetValid")]
    #[case::signature(ErrorKind::InvalidSignature, "InvalidSignature")]
    #[case::audience(ErrorKind::InvalidAudience, "InvalidAudience")]
    #[case::issuer(ErrorKind::InvalidIssuer, "InvalidIssuer")]
    #[case::algorithm(ErrorKind::InvalidAlgorithm, "UnsupportedAlgorithm")]
    #[case::structure(ErrorKind::InvalidToken, "InvalidTokenFormat")]
    #[case::key_format(ErrorKind::InvalidKeyFormat, "InvalidPublicKey")]
    fn test_error_from_jsonwebtoken(#[case] kind: ErrorKind, #[case] expected: &str) {
        let auth_err: AuthError = jsonwebtoken::errors::Error::from(kind).into();
        let debug = format!("{auth_err:?}");
        assert!(debug.starts_with(expected), "expected {expected}, got {debug}");
    }

    #[test]
    fn test_missing_required_claim_names_claim() {
        let jwt_err =
            jsonwebtoken::errors::Error::from(ErrorKind::MissingRequiredClaim("exp".into()));
        let auth_err: AuthError = jwt_err.into();
        assert!(matches!(auth_err, AuthError::MissingClaim(ref claim) if claim == "exp"));
    }

    #[test]
    fn test_key_source_unavailable_preserves_source_chain() {
        let err: AuthError = KeySourceError::Status {
            uri: "https://auth.example.com/.well-known/jwks.json".into(),
            status: 503,
        }
        .into();

        assert!(matches!(err, AuthError::KeySourceUnavailable(_)));
        let source = err.source().expect("source chain must be preserved");
        assert!(source.to_string().contains("503"));
        assert!(source.to_string().contains("https://auth.example.com/.well-known/jwks.json"));
    }
}
