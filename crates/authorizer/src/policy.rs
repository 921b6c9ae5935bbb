//! `execute-api` ARNs and IAM policy documents.
//!
//! A token is not bound to one endpoint, so an allow decision covers every
//! method and resource of the stage the request arrived on:
//!
//! ```text
//! methodArn  arn:aws:execute-api:eu-west-1:123456789012:a1b2c3/prod/GET/orders/42
//! resource   arn:aws:execute-api:eu-west-1:123456789012:a1b2c3/prod/*
//! ```

use std::fmt;

use serde::{Deserialize, Serialize};

/// IAM policy language version.
pub const POLICY_VERSION: &str = "2012-10-17";

/// The action API Gateway checks before invoking the backend.
pub const INVOKE_ACTION: &str = "execute-api:Invoke";

/// Error parsing a method ARN.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error("invalid method ARN '{arn}': {reason}")]
pub struct ArnError {
    arn: String,
    reason: &'static str,
}

impl ArnError {
    fn new(arn: &str, reason: &'static str) -> Self {
        Self { arn: arn.to_owned(), reason }
    }
}

/// The parts of an `execute-api` method ARN that scope a policy.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MethodArn {
    partition: String,
    region: String,
    account_id: String,
    api_id: String,
    stage: String,
}

impl MethodArn {
    /// Parses `arn:<partition>:execute-api:<region>:<account>:<api>/<stage>/...`.
    ///
    /// Everything after the stage is discarded.
    ///
    /// # Errors
    ///
    /// Returns [`ArnError`] if the ARN is not an `execute-api` ARN or lacks
    /// an API id or stage.
    ///
    /// # Example
    ///
    /// ```
    /// use platform_authorizer::policy::MethodArn;
    ///
    /// let arn =
    ///     MethodArn::parse("arn:aws:execute-api:eu-west-1:123456789012:a1b2c3/prod/GET/orders")?;
    /// assert_eq!(arn.stage(), "prod");
    /// assert_eq!(
    ///     arn.stage_resource(),
    ///     "arn:aws:execute-api:eu-west-1:123456789012:a1b2c3/prod/*"
    /// );
    /// # Ok::<(), platform_authorizer::policy::ArnError>(())
    /// ```
    pub fn parse(arn: &str) -> Result<Self, ArnError> {
        let mut fields = arn.splitn(6, ':');
        let (Some("arn"), Some(partition), Some("execute-api"), Some(region), Some(account_id)) =
            (fields.next(), fields.next(), fields.next(), fields.next(), fields.next())
        else {
            return Err(ArnError::new(arn, "not an execute-api ARN"));
        };
        let resource = fields.next().ok_or_else(|| ArnError::new(arn, "missing resource"))?;

        let mut path = resource.splitn(3, '/');
        let api_id = path.next().filter(|s| !s.is_empty());
        let stage = path.next().filter(|s| !s.is_empty());
        let (Some(api_id), Some(stage)) = (api_id, stage) else {
            return Err(ArnError::new(arn, "missing API id or stage"));
        };
        if partition.is_empty() || region.is_empty() || account_id.is_empty() {
            return Err(ArnError::new(arn, "missing partition, region or account"));
        }

        Ok(Self {
            partition: partition.to_owned(),
            region: region.to_owned(),
            account_id: account_id.to_owned(),
            api_id: api_id.to_owned(),
            stage: stage.to_owned(),
        })
    }

    /// The REST API id.
    #[must_use]
    pub fn api_id(&self) -> &str {
        &self.api_id
    }

    /// The deployment stage.
    #[must_use]
    pub fn stage(&self) -> &str {
        &self.stage
    }

    /// The region.
    #[must_use]
    pub fn region(&self) -> &str {
        &self.region
    }

    /// The AWS account id.
    #[must_use]
    pub fn account_id(&self) -> &str {
        &self.account_id
    }

    /// A resource pattern covering every method and path of this stage.
    #[must_use]
    pub fn stage_resource(&self) -> String {
        format!("{}/*", self.stage_prefix())
    }

    fn stage_prefix(&self) -> String {
        format!(
            "arn:{}:execute-api:{}:{}:{}/{}",
            self.partition, self.region, self.account_id, self.api_id, self.stage
        )
    }
}

impl fmt::Display for MethodArn {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.stage_prefix())
    }
}

/// Statement effect.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum Effect {
    /// Grants the action.
    Allow,
    /// Denies the action.
    Deny,
}

/// One IAM policy statement.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "PascalCase")]
pub struct PolicyStatement {
    /// Action the statement applies to.
    pub action: String,
    /// Whether the action is allowed.
    pub effect: Effect,
    /// Resource pattern.
    pub resource: String,
}

/// An IAM policy document as API Gateway expects it.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "PascalCase")]
pub struct PolicyDocument {
    /// Policy language version.
    pub version: String,
    /// Statements.
    pub statement: Vec<PolicyStatement>,
}

impl PolicyDocument {
    /// A policy allowing invocation of every resource in `arn`'s stage.
    #[must_use]
    pub fn allow_stage(arn: &MethodArn) -> Self {
        Self {
            version: POLICY_VERSION.to_owned(),
            statement: vec![PolicyStatement {
                action: INVOKE_ACTION.to_owned(),
                effect: Effect::Allow,
                resource: arn.stage_resource(),
            }],
        }
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used, clippy::expect_used, clippy::panic)]
mod tests {
    use proptest::prelude::*;
    use rstest::rstest;
    use serde_json::json;

    use super::*;

    #[test]
    fn test_parse_discards_method_and_path() {
        let arn =
            MethodArn::parse("arn:aws:execute-api:us-east-1:123456789012:abcdef/dev/POST/a/b/c")
                .unwrap();

        assert_eq!(arn.api_id(), "abcdef");
        assert_eq!(arn.stage(), "dev");
        assert_eq!(arn.region(), "us-east-1");
        assert_eq!(arn.account_id(), "123456789012");
        assert_eq!(
            arn.stage_resource(),
            "arn:aws:execute-api:us-east-1:123456789012:abcdef/dev/*"
        );
    }

    #[test]
    fn test_parse_keeps_partition() {
        let arn = MethodArn::parse("arn:aws-cn:execute-api:cn-north-1:1:api/prod/GET/").unwrap();
        assert!(arn.stage_resource().starts_with("arn:aws-cn:execute-api:cn-north-1:1:api/prod/"));
    }

    #[rstest]
    #[case::empty("")]
    #[case::not_arn("urn:aws:execute-api:r:a:api/stage")]
    #[case::other_service("arn:aws:lambda:r:a:function/stage")]
    #[case::no_resource("arn:aws:execute-api:r:a")]
    #[case::no_stage("arn:aws:execute-api:r:a:api")]
    #[case::empty_stage("arn:aws:execute-api:r:a:api//GET/")]
    #[case::empty_region("arn:aws:execute-api::a:api/stage/GET/")]
    fn test_parse_rejects(#[case] arn: &str) {
        let err = MethodArn::parse(arn).unwrap_err();
        assert!(err.to_string().contains("invalid method ARN"));
    }

    #[test]
    fn test_policy_document_wire_shape() {
        let arn = MethodArn::parse("arn:aws:execute-api:eu-west-1:1:api/prod/GET/x").unwrap();
        let document = serde_json::to_value(PolicyDocument::allow_stage(&arn)).unwrap();

        assert_eq!(
            document,
            json!({
                "Version": "2012-10-17",
                "Statement": [{
                    "Action": "execute-api:Invoke",
                    "Effect": "Allow",
                    "Resource": "arn:aws:execute-api:eu-west-1:1:api/prod/*"
                }]
            })
        );
    }

    proptest! {
        #[test]
        fn prop_stage_resource_covers_method_arn(
            region in "[a-z]{2}-[a-z]{4,9}-[1-9]",
            account in "[0-9]{12}",
            api in "[a-z0-9]{10}",
            stage in "[A-Za-z0-9_-]{1,16}",
            method in "(GET|POST|PUT|DELETE|\\*)",
            path in "(/[a-z0-9]{1,8}){0,4}",
        ) {
            let raw =
                format!("arn:aws:execute-api:{region}:{account}:{api}/{stage}/{method}{path}");
            let arn = MethodArn::parse(&raw).unwrap();
            let resource = arn.stage_resource();
            let prefix = resource.trim_end_matches("/*");

            prop_assert_eq!(arn.stage(), stage.as_str());
            let expected_prefix = format!("{prefix}/");
            prop_assert!(raw.starts_with(&expected_prefix));
        }
    }
}
