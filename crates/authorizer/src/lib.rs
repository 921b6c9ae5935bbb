//! # Platform Authorizer
//!
//! An API Gateway `TOKEN` authorizer for JWT bearer tokens.
//!
//! A request is allowed when its token verifies against a signing key of a
//! trusted issuer. Keys are resolved through a
//! [`SigningKeyCache`](platform_authorizer_authn::SigningKeyCache) per issuer,
//! so a warm instance verifies without any network call and a cold instance
//! usually only needs the shared durable store.
//!
//! The decision covers the whole deployment stage of the requesting API:
//! tokens are not endpoint-specific, and API Gateway caches the policy per
//! token.
//!
//! ## Modules
//!
//! - [`config`]: environment-driven configuration
//! - [`event`]: request and response payloads
//! - [`handler`]: the authorizer itself
//! - [`policy`]: method ARN parsing and policy documents

#![deny(unsafe_code)]
#![warn(missing_docs)]

pub mod config;
pub mod event;
pub mod handler;
pub mod policy;

pub use config::{AuthorizerConfig, ConfigError};
pub use event::{AuthorizerContext, AuthorizerResponse, TokenAuthorizerEvent};
pub use handler::{AuthorizeError, Authorizer, extract_bearer_token};
pub use policy::{MethodArn, PolicyDocument};
