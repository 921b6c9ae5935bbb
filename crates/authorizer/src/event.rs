//! API Gateway `TOKEN` authorizer payloads.

use serde::{Deserialize, Serialize};

use crate::policy::PolicyDocument;

/// The only invocation type this authorizer handles.
pub const TOKEN_AUTHORIZER_TYPE: &str = "TOKEN";

/// The event API Gateway sends to a `TOKEN` authorizer.
///
/// ```json
/// {
///   "type": "TOKEN",
///   "authorizationToken": "Bearer eyJ...",
///   "methodArn": "arn:aws:execute-api:eu-west-1:123456789012:a1b2c3/prod/GET/orders"
/// }
/// ```
///
/// Missing fields deserialize as empty so the handler, not the runtime,
/// decides how to reject them.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct TokenAuthorizerEvent {
    /// Invocation type (`TOKEN` or `REQUEST`).
    #[serde(rename = "type")]
    pub event_type: String,
    /// The raw `Authorization` header value.
    pub authorization_token: Option<String>,
    /// ARN of the method being invoked.
    pub method_arn: String,
}

/// Values passed to the backend integration.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct AuthorizerContext {
    /// The token's `scope` claim.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub scope: Option<String>,
}

/// An allow decision.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AuthorizerResponse {
    /// The caller's identity (`sub`).
    pub principal_id: String,
    /// What the caller may invoke.
    pub policy_document: PolicyDocument,
    /// Values passed to the backend.
    pub context: AuthorizerContext,
    /// Usage plan key; the caller's identity.
    pub usage_identifier_key: String,
}
