//! Authorizer configuration.
//!
//! [`AuthorizerConfig`] is normally loaded from the Lambda environment with
//! [`AuthorizerConfig::from_env`]. Tests drive the same parsing through
//! [`AuthorizerConfig::from_lookup`].
//!
//! | Variable | Meaning | Default |
//! |----------|---------|---------|
//! | `AUDIENCE` | Comma-separated accepted audiences | required |
//! | `ISSUERS` | Comma-separated issuer base URLs | `AUTHORITY` |
//! | `AUTHORITY` | Single issuer base URL | - |
//! | `KEY_CACHE_TABLE` | DynamoDB table for the durable key cache | process-local store |
//! | `KEY_CACHE_ID` | Durable record id (single issuer only) | the issuer's JWKS URI |
//! | `JWKS_TIMEOUT` | JWKS fetch timeout | `10s` |
//! | `JWKS_MIN_REFRESH_INTERVAL` | Minimum gap between JWKS fetches; `0s` disables | `6s` |

use std::time::Duration;

use platform_authorizer_authn::jwks::DEFAULT_FETCH_TIMEOUT;
use url::Url;

/// Accepted audiences.
pub const ENV_AUDIENCE: &str = "AUDIENCE";
/// Issuer base URLs.
pub const ENV_ISSUERS: &str = "ISSUERS";
/// Single issuer base URL, read when `ISSUERS` is unset.
pub const ENV_AUTHORITY: &str = "AUTHORITY";
/// DynamoDB table for the durable key cache.
pub const ENV_KEY_CACHE_TABLE: &str = "KEY_CACHE_TABLE";
/// Durable record id override.
pub const ENV_KEY_CACHE_ID: &str = "KEY_CACHE_ID";
/// JWKS fetch timeout.
pub const ENV_JWKS_TIMEOUT: &str = "JWKS_TIMEOUT";
/// Minimum gap between JWKS fetches.
pub const ENV_JWKS_MIN_REFRESH_INTERVAL: &str = "JWKS_MIN_REFRESH_INTERVAL";

/// Default minimum gap between JWKS fetches (ten per minute).
pub const DEFAULT_MIN_REFRESH_INTERVAL: Duration = Duration::from_secs(6);

/// Errors raised while loading or validating configuration.
#[derive(Debug, thiserror::Error)]
#[non_exhaustive]
pub enum ConfigError {
    /// A required variable is unset or blank.
    #[error("missing required configuration: {0}")]
    Missing(&'static str),

    /// An issuer is not an absolute `http(s)` URL.
    #[error("invalid issuer '{issuer}': {message}")]
    InvalidIssuer {
        /// The configured value.
        issuer: String,
        /// What is wrong with it.
        message: String,
    },

    /// A duration variable could not be parsed.
    #[error("invalid duration for {variable} '{value}': {message}")]
    InvalidDuration {
        /// The variable name.
        variable: &'static str,
        /// The configured value.
        value: String,
        /// Parser message.
        message: String,
    },

    /// Any other invalid combination of settings.
    #[error("invalid configuration: {0}")]
    Invalid(String),
}

/// Convenience alias for configuration results.
pub type Result<T> = std::result::Result<T, ConfigError>;

/// Validated authorizer configuration.
///
/// # Example
///
/// ```
/// use std::time::Duration;
/// use platform_authorizer::AuthorizerConfig;
///
/// let config = AuthorizerConfig::builder()
///     .issuers(vec!["https://auth.example.com".to_owned()])
///     .audiences(vec!["https://api.example.com".to_owned()])
///     .key_cache_table("authorizer-key-cache")
///     .min_refresh_interval(Duration::from_secs(30))
///     .build()?;
///
/// assert_eq!(config.issuers().len(), 1);
/// # Ok::<(), platform_authorizer::ConfigError>(())
/// ```
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AuthorizerConfig {
    issuers: Vec<String>,
    audiences: Vec<String>,
    key_cache_table: Option<String>,
    key_cache_id: Option<String>,
    jwks_timeout: Duration,
    min_refresh_interval: Option<Duration>,
}

#[bon::bon]
impl AuthorizerConfig {
    /// Creates a configuration, validating all fields.
    ///
    /// # Errors
    ///
    /// Returns [`ConfigError`] if:
    /// - No issuer or no audience is given
    /// - An issuer is not an absolute `http(s)` URL with a host
    /// - `key_cache_id` is set while more than one issuer is configured
    /// - `jwks_timeout` is zero
    ///
    /// A zero `min_refresh_interval` disables the JWKS rate limit.
    #[builder]
    pub fn new(
        issuers: Vec<String>,
        audiences: Vec<String>,
        #[builder(into)] key_cache_table: Option<String>,
        #[builder(into)] key_cache_id: Option<String>,
        #[builder(default = DEFAULT_FETCH_TIMEOUT)] jwks_timeout: Duration,
        #[builder(default = DEFAULT_MIN_REFRESH_INTERVAL)] min_refresh_interval: Duration,
    ) -> Result<Self> {
        if issuers.is_empty() {
            return Err(ConfigError::Missing(ENV_ISSUERS));
        }
        if audiences.is_empty() {
            return Err(ConfigError::Missing(ENV_AUDIENCE));
        }
        for issuer in &issuers {
            authority_url(issuer)?;
        }
        if key_cache_id.is_some() && issuers.len() > 1 {
            return Err(ConfigError::Invalid(format!(
                "{ENV_KEY_CACHE_ID} cannot be shared by {} issuers",
                issuers.len()
            )));
        }
        if jwks_timeout.is_zero() {
            return Err(ConfigError::Invalid(format!(
                "{ENV_JWKS_TIMEOUT} must be greater than zero"
            )));
        }

        Ok(Self {
            issuers,
            audiences,
            key_cache_table,
            key_cache_id,
            jwks_timeout,
            min_refresh_interval: (!min_refresh_interval.is_zero()).then_some(min_refresh_interval),
        })
    }
}

impl AuthorizerConfig {
    /// Loads the configuration from the process environment.
    ///
    /// # Errors
    ///
    /// See [`AuthorizerConfig::from_lookup`].
    pub fn from_env() -> Result<Self> {
        Self::from_lookup(|name| std::env::var(name).ok())
    }

    /// Loads the configuration through `lookup`, which maps a variable name
    /// to its value.
    ///
    /// Blank values are treated as unset. List values are split on commas
    /// and trimmed.
    ///
    /// # Errors
    ///
    /// Returns [`ConfigError`] if a required variable is missing, a duration
    /// does not parse, or the resulting configuration is invalid.
    pub fn from_lookup<F>(lookup: F) -> Result<Self>
    where
        F: Fn(&str) -> Option<String>,
    {
        let read = |name: &str| lookup(name).map(|v| v.trim().to_owned()).filter(|v| !v.is_empty());

        let audiences = read(ENV_AUDIENCE).map(|v| split_list(&v)).unwrap_or_default();
        let issuers = read(ENV_ISSUERS)
            .or_else(|| read(ENV_AUTHORITY))
            .map(|v| split_list(&v))
            .unwrap_or_default();
        let jwks_timeout = match read(ENV_JWKS_TIMEOUT) {
            Some(value) => parse_duration(ENV_JWKS_TIMEOUT, value)?,
            None => DEFAULT_FETCH_TIMEOUT,
        };
        let min_refresh_interval = match read(ENV_JWKS_MIN_REFRESH_INTERVAL) {
            Some(value) => parse_duration(ENV_JWKS_MIN_REFRESH_INTERVAL, value)?,
            None => DEFAULT_MIN_REFRESH_INTERVAL,
        };

        Self::builder()
            .issuers(issuers)
            .audiences(audiences)
            .maybe_key_cache_table(read(ENV_KEY_CACHE_TABLE))
            .maybe_key_cache_id(read(ENV_KEY_CACHE_ID))
            .jwks_timeout(jwks_timeout)
            .min_refresh_interval(min_refresh_interval)
            .build()
    }

    /// Accepted issuers, as they appear in the `iss` claim.
    #[must_use]
    pub fn issuers(&self) -> &[String] {
        &self.issuers
    }

    /// Accepted audiences.
    #[must_use]
    pub fn audiences(&self) -> &[String] {
        &self.audiences
    }

    /// DynamoDB table for the durable key cache, if any.
    #[must_use]
    pub fn key_cache_table(&self) -> Option<&str> {
        self.key_cache_table.as_deref()
    }

    /// Durable record id override, if any.
    #[must_use]
    pub fn key_cache_id(&self) -> Option<&str> {
        self.key_cache_id.as_deref()
    }

    /// JWKS fetch timeout.
    #[must_use]
    pub fn jwks_timeout(&self) -> Duration {
        self.jwks_timeout
    }

    /// Minimum gap between JWKS fetches, or `None` when the limit is disabled.
    #[must_use]
    pub fn min_refresh_interval(&self) -> Option<Duration> {
        self.min_refresh_interval
    }
}

/// Parses an issuer into the authority base URL its keys are published under.
///
/// # Errors
///
/// Returns [`ConfigError::InvalidIssuer`] unless `issuer` is an absolute
/// `http(s)` URL with a host.
pub fn authority_url(issuer: &str) -> Result<Url> {
    let invalid =
        |message: String| ConfigError::InvalidIssuer { issuer: issuer.to_owned(), message };
    let url = Url::parse(issuer).map_err(|e| invalid(e.to_string()))?;
    if !matches!(url.scheme(), "http" | "https") {
        return Err(invalid("scheme must be http or https".to_owned()));
    }
    if url.host_str().is_none_or(str::is_empty) {
        return Err(invalid("missing host".to_owned()));
    }
    Ok(url)
}

fn split_list(value: &str) -> Vec<String> {
    value.split(',').map(str::trim).filter(|item| !item.is_empty()).map(str::to_owned).collect()
}

fn parse_duration(variable: &'static str, value: String) -> Result<Duration> {
    humantime::parse_duration(&value).map_err(|e| ConfigError::InvalidDuration {
        variable,
        message: e.to_string(),
        value,
    })
}
