//! JWT algorithm and key-identifier validation.
//!
//! These checks run on the unverified header, before any cache tier is
//! consulted.
//!
//! # Security
//!
//! - Only asymmetric signature algorithms are accepted, so a public key can
//!   never be used as an HMAC secret (algorithm confusion)
//! - `none` is always rejected
//! - `kid` values are bounded and printable before they reach logs or the
//!   durable store

use crate::error::AuthError;

/// Forbidden JWT algorithms that are never accepted.
///
/// - `none`: No signature verification (trivially bypassable)
/// - `HS256`, `HS384`, `HS512`: Symmetric algorithms (shared secret vulnerability)
pub const FORBIDDEN_ALGORITHMS: &[&str] = &["none", "HS256", "HS384", "HS512"];

/// Accepted JWT algorithms.
///
/// Every asymmetric algorithm an OIDC authority commonly publishes keys for:
/// RSA PKCS#1 v1.5, RSA-PSS, ECDSA on P-256/P-384, and Ed25519.
pub const ACCEPTED_ALGORITHMS: &[&str] =
    &["RS256", "RS384", "RS512", "PS256", "PS384", "PS512", "ES256", "ES384", "EdDSA"];

/// Maximum accepted `kid` length in bytes.
pub const MAX_KID_LENGTH: usize = 256;

/// Validate JWT algorithm against security policies.
///
/// # Errors
///
/// Returns [`AuthError::UnsupportedAlgorithm`] if:
/// - Algorithm is symmetric (HS256, HS384, HS512)
/// - Algorithm is "none"
/// - Algorithm is not in [`ACCEPTED_ALGORITHMS`]
///
/// # Examples
///
/// ```
/// use platform_authorizer_authn::validation::validate_algorithm;
///
/// assert!(validate_algorithm("RS256").is_ok());
/// assert!(validate_algorithm("EdDSA").is_ok());
/// assert!(validate_algorithm("HS256").is_err());
/// ```
pub fn validate_algorithm(alg: &str) -> Result<(), AuthError> {
    if FORBIDDEN_ALGORITHMS.contains(&alg) {
        return Err(AuthError::unsupported_algorithm(format!(
            "Algorithm '{alg}' is not allowed for security reasons"
        )));
    }

    if !ACCEPTED_ALGORITHMS.contains(&alg) {
        return Err(AuthError::unsupported_algorithm(format!(
            "Algorithm '{alg}' is not in accepted list"
        )));
    }

    Ok(())
}

/// Validate a `kid` from an untrusted JWT header.
///
/// # Errors
///
/// Returns [`AuthError::InvalidTokenFormat`] if the `kid` is empty, longer
/// than [`MAX_KID_LENGTH`] bytes, or contains control characters.
///
/// # Examples
///
/// ```
/// use platform_authorizer_authn::validation::validate_kid;
///
/// assert!(validate_kid("2024-05-rsa").is_ok());
/// assert!(validate_kid("").is_err());
/// assert!(validate_kid("line\nbreak").is_err());
/// ```
pub fn validate_kid(kid: &str) -> Result<(), AuthError> {
    if kid.is_empty() {
        return Err(AuthError::invalid_token_format("JWT 'kid' is empty"));
    }
    if kid.len() > MAX_KID_LENGTH {
        return Err(AuthError::invalid_token_format(format!(
            "JWT 'kid' exceeds {MAX_KID_LENGTH} bytes"
        )));
    }
    if kid.chars().any(char::is_control) {
        return Err(AuthError::invalid_token_format("JWT 'kid' contains control characters"));
    }
    Ok(())
}
