//! The `TOKEN` authorizer.
//!
//! [`Authorizer::authorize`] turns a [`TokenAuthorizerEvent`] into an allow
//! decision or an error whose message API Gateway understands. Every
//! rejection reads `Unauthorized` to the caller; the reason is only logged.

use std::{collections::HashMap, sync::Arc};

use platform_authorizer_authn::{
    AuthError, HttpJwksSource, SigningKeyCache, TokenVerifier, VerifiedClaims,
    jwt::{decode_jwt_header, decode_unverified_claims, token_kid, verify_with_signing_key_cache},
};
use platform_authorizer_storage::auth::KeySetStore;

use crate::{
    config::{AuthorizerConfig, ConfigError, authority_url},
    event::{AuthorizerContext, AuthorizerResponse, TOKEN_AUTHORIZER_TYPE, TokenAuthorizerEvent},
    policy::{MethodArn, PolicyDocument},
};

/// Message returned when the function is wired up as a `REQUEST` authorizer.
pub const MISCONFIGURATION_MESSAGE: &str =
    "This authorizer is not configured as a 'TOKEN' authorizer.";

/// Message API Gateway maps to a 401 response.
pub const UNAUTHORIZED_MESSAGE: &str = "Unauthorized";

/// Errors returned to API Gateway.
#[derive(Debug, Clone, Copy, PartialEq, Eq, thiserror::Error)]
#[non_exhaustive]
pub enum AuthorizeError {
    /// The invocation type is not `TOKEN`.
    #[error("This authorizer is not configured as a 'TOKEN' authorizer.")]
    Misconfigured,
    /// The request is not authorized.
    #[error("Unauthorized")]
    Unauthorized,
}

/// Extracts the JWT from a `Bearer <jwt>` header value.
///
/// The scheme is case-sensitive and may be followed by one or more spaces.
/// Returns `None` when the prefix is missing or nothing follows it.
///
/// # Example
///
/// ```
/// use platform_authorizer::handler::extract_bearer_token;
///
/// assert_eq!(extract_bearer_token("Bearer   abc.def.ghi"), Some("abc.def.ghi"));
/// assert_eq!(extract_bearer_token("Basic dXNlcg=="), None);
/// ```
#[must_use]
pub fn extract_bearer_token(header: &str) -> Option<&str> {
    let rest = header.strip_prefix("Bearer")?;
    let token = rest.trim_start_matches(' ');
    (token.len() < rest.len() && !token.is_empty()).then_some(token)
}

/// Key cache and verifier for one issuer.
#[derive(Debug)]
struct IssuerContext {
    cache: Arc<SigningKeyCache>,
    verifier: TokenVerifier,
}

/// Authorizes API Gateway `TOKEN` requests against one or more issuers.
///
/// Built once per process; each issuer keeps its own [`SigningKeyCache`].
#[derive(Debug, Default)]
pub struct Authorizer {
    issuers: HashMap<String, IssuerContext>,
}

impl Authorizer {
    /// Creates an authorizer that trusts no issuer.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Trusts tokens whose `iss` equals `verifier.issuer()`, with keys
    /// resolved through `cache`.
    #[must_use]
    pub fn with_issuer(mut self, cache: Arc<SigningKeyCache>, verifier: TokenVerifier) -> Self {
        self.issuers.insert(verifier.issuer().to_owned(), IssuerContext { cache, verifier });
        self
    }

    /// Builds an authorizer from `config`, sharing `store` as every issuer's
    /// durable tier.
    ///
    /// # Errors
    ///
    /// Returns [`ConfigError`] if an issuer URL is invalid or its JWKS client
    /// cannot be created.
    pub fn from_config(
        config: &AuthorizerConfig,
        store: Arc<dyn KeySetStore>,
    ) -> Result<Self, ConfigError> {
        let mut authorizer = Self::new();
        for issuer in config.issuers() {
            let authority = authority_url(issuer)?;
            let source = HttpJwksSource::for_authority(&authority, config.jwks_timeout()).map_err(
                |e| ConfigError::InvalidIssuer { issuer: issuer.clone(), message: e.to_string() },
            )?;

            let mut cache = SigningKeyCache::new(Arc::clone(&store), Arc::new(source));
            if let Some(record_id) = config.key_cache_id() {
                cache = cache.with_record_id(record_id);
            }
            if let Some(interval) = config.min_refresh_interval() {
                cache = cache.with_min_refresh_interval(interval);
            }

            let verifier = TokenVerifier::builder()
                .issuer(issuer.as_str())
                .audiences(config.audiences().to_vec())
                .build();

            tracing::info!(
                issuer = %issuer,
                jwks_uri = cache.source_uri(),
                record_id = cache.record_id(),
                "Configured issuer"
            );
            authorizer = authorizer.with_issuer(Arc::new(cache), verifier);
        }
        Ok(authorizer)
    }

    /// Number of trusted issuers.
    #[must_use]
    pub fn issuer_count(&self) -> usize {
        self.issuers.len()
    }

    /// The key cache serving `issuer`, if trusted.
    #[must_use]
    pub fn signing_key_cache(&self, issuer: &str) -> Option<&Arc<SigningKeyCache>> {
        self.issuers.get(issuer).map(|context| &context.cache)
    }

    /// Authorizes one request.
    ///
    /// # Errors
    ///
    /// - [`AuthorizeError::Misconfigured`] if the event type is not `TOKEN`
    /// - [`AuthorizeError::Unauthorized`] for every token, key or ARN failure
    #[tracing::instrument(skip(self, event), fields(method_arn = %event.method_arn))]
    pub async fn authorize(
        &self,
        event: &TokenAuthorizerEvent,
    ) -> Result<AuthorizerResponse, AuthorizeError> {
        if event.event_type != TOKEN_AUTHORIZER_TYPE {
            tracing::error!(event_type = %event.event_type, "Authorizer invoked with wrong type");
            return Err(AuthorizeError::Misconfigured);
        }

        let Some(header) = event.authorization_token.as_deref().filter(|t| !t.is_empty()) else {
            return Err(reject("Authorization token is missing"));
        };
        let Some(token) = extract_bearer_token(header) else {
            return Err(reject("Authorization token is not a bearer token"));
        };

        let kid = decode_jwt_header(token)
            .and_then(|header| token_kid(&header).map(str::to_owned))
            .map_err(|e| rejected("Token header has no usable key id", &e))?;

        let issuer = decode_unverified_claims(token)
            .map_err(|e| rejected("Token claims could not be decoded", &e))?
            .iss
            .ok_or_else(|| reject("Token has no issuer"))?;
        let Some(context) = self.issuers.get(&issuer) else {
            tracing::warn!(kid = %kid, issuer = %issuer, "Token issuer is not trusted");
            return Err(AuthorizeError::Unauthorized);
        };

        let claims = verify_with_signing_key_cache(token, &context.cache, &context.verifier)
            .await
            .map_err(|e| {
                tracing::warn!(
                    kid = %kid,
                    issuer = %issuer,
                    jwks_uri = context.cache.source_uri(),
                    error = %e,
                    "An error occurred validating the token"
                );
                AuthorizeError::Unauthorized
            })?;

        let arn = MethodArn::parse(&event.method_arn).map_err(|e| {
            tracing::warn!(error = %e, "Method ARN could not be parsed");
            AuthorizeError::Unauthorized
        })?;

        tracing::info!(
            sub = %claims.sub,
            issuer = %issuer,
            stage = arn.stage(),
            "Request authorized"
        );
        Ok(allow(claims, &arn))
    }
}

fn allow(claims: VerifiedClaims, arn: &MethodArn) -> AuthorizerResponse {
    AuthorizerResponse {
        usage_identifier_key: claims.sub.clone(),
        principal_id: claims.sub,
        policy_document: PolicyDocument::allow_stage(arn),
        context: AuthorizerContext { scope: claims.scope },
    }
}

fn reject(reason: &str) -> AuthorizeError {
    tracing::warn!(reason, "Rejecting request");
    AuthorizeError::Unauthorized
}

fn rejected(reason: &str, error: &AuthError) -> AuthorizeError {
    tracing::warn!(reason, error = %error, "Rejecting request");
    AuthorizeError::Unauthorized
}
