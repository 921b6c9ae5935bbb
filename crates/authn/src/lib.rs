//! # Platform Authorizer Authentication
//!
//! Signing-key resolution and JWT verification for the platform authorizer.
//!
//! This crate provides:
//! - **Signing key cache**: memory → durable store → JWKS endpoint, with best-effort write-back
//! - **Key source**: the authority's JWKS document fetched over HTTPS
//! - **JWT verification**: signature, audience, issuer and expiry checks
//! - **Header validation**: algorithm allow-list and `kid` sanity checks
//!
//! ## Features
//!
//! - Only asymmetric algorithms (RS*, PS*, ES256/384, EdDSA) are supported
//! - Symmetric algorithms (HS256, etc.) and `none` are explicitly rejected
//! - A durable-store outage degrades to extra JWKS fetches, never to rejections
//!
//! ## Example
//!
//! ```no_run
//! use std::sync::Arc;
//! use std::time::Duration;
//!
//! use platform_authorizer_authn::{
//!     HttpJwksSource, SigningKeyCache, TokenVerifier, jwt::verify_with_signing_key_cache,
//! };
//! use platform_authorizer_storage::auth::MemoryKeySetStore;
//! use url::Url;
//!
//! # async fn example() -> Result<(), Box<dyn std::error::Error>> {
//! let authority = Url::parse("https://auth.example.com")?;
//! let source = HttpJwksSource::for_authority(&authority, Duration::from_secs(10))?;
//! let cache = SigningKeyCache::new(Arc::new(MemoryKeySetStore::new()), Arc::new(source));
//! let verifier = TokenVerifier::builder()
//!     .issuer("https://auth.example.com")
//!     .audiences(vec!["https://api.example.com".to_owned()])
//!     .build();
//!
//! let token = "eyJ0eXAiOiJKV1QiLCJhbGciOiJSUzI1NiIsImtpZCI6IjIwMjQifQ...";
//! let claims = verify_with_signing_key_cache(token, &cache, &verifier).await?;
//!
//! println!("Verified subject: {}", claims.sub);
//! # Ok(())
//! # }
//! ```

#![deny(unsafe_code)]
#![warn(missing_docs)]

/// Authentication error types.
pub mod error;
/// Remote key source (JWKS over HTTPS).
pub mod jwks;
/// JWT decoding and verification.
pub mod jwt;
/// Resolver counters.
pub mod metrics;
/// Tiered signing key cache.
pub mod signing_key_cache;
/// Test doubles and token helpers.
#[cfg(any(test, feature = "testutil"))]
pub mod testutil;
/// Algorithm and `kid` validation.
pub mod validation;

pub use error::{AuthError, Result};
pub use jwks::{HttpJwksSource, KeySource, KeySourceError, jwks_uri_for};
pub use jwt::{TokenVerifier, VerifiedClaims};
pub use metrics::ResolverMetricsSnapshot;
pub use signing_key_cache::{LastRefresh, RefreshTier, ResolvedKey, SigningKeyCache};
pub use validation::{ACCEPTED_ALGORITHMS, FORBIDDEN_ALGORITHMS, validate_algorithm, validate_kid};
