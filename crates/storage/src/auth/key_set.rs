//! Key-set snapshot types shared by every cache tier.
//!
//! A [`KeySetSnapshot`] is the complete set of verification keys published by
//! an authority at one point in time. Snapshots are immutable values: a tier is
//! refreshed by replacing its snapshot, never by merging keys into it.

use chrono::{DateTime, Utc};
use jsonwebtoken::jwk::{Jwk, JwkSet};
use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Returned when a JWK without a `kid` parameter is turned into a [`SigningKeyRecord`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Error)]
#[error("JWK has no 'kid' parameter")]
pub struct MissingKeyId;

/// One public verification key, addressed by its key identifier.
///
/// The record keeps the JWK exactly as the authority published it. It
/// serializes as that JWK, so a stored key set stays readable as a plain
/// JWKS `keys` array.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(try_from = "Jwk", into = "Jwk")]
pub struct SigningKeyRecord {
    kid: String,
    jwk: Jwk,
}

impl SigningKeyRecord {
    /// Key identifier (matches the token header `kid`).
    #[must_use]
    pub fn kid(&self) -> &str {
        &self.kid
    }

    /// The published key material.
    #[must_use]
    pub fn jwk(&self) -> &Jwk {
        &self.jwk
    }
}

impl TryFrom<Jwk> for SigningKeyRecord {
    type Error = MissingKeyId;

    fn try_from(jwk: Jwk) -> Result<Self, Self::Error> {
        match jwk.common.key_id.clone() {
            Some(kid) if !kid.is_empty() => Ok(Self { kid, jwk }),
            _ => Err(MissingKeyId),
        }
    }
}

impl From<SigningKeyRecord> for Jwk {
    fn from(record: SigningKeyRecord) -> Self {
        record.jwk
    }
}

/// Immutable set of signing keys with the time the authority produced it.
///
/// `kid` values are unique within a snapshot. Every constructor (including
/// deserialization) keeps the first record for a repeated `kid` and drops the
/// rest.
///
/// # Example
///
/// ```
/// use chrono::Utc;
/// use jsonwebtoken::jwk::JwkSet;
/// use platform_authorizer_storage::auth::KeySetSnapshot;
///
/// let jwks: JwkSet = serde_json::from_str(r#"{"keys": [{
///     "kty": "OKP", "crv": "Ed25519", "kid": "key-1",
///     "x": "11qYAYKxCrfVS_7TyWQHOg7hcvPapiMlrwIaaPcHURo"
/// }]}"#)?;
///
/// let snapshot = KeySetSnapshot::from_jwk_set(&jwks, Utc::now());
/// assert!(snapshot.find("key-1").is_some());
/// assert!(snapshot.find("key-2").is_none());
/// # Ok::<(), serde_json::Error>(())
/// ```
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(from = "KeySetSnapshotRepr")]
pub struct KeySetSnapshot {
    keys: Vec<SigningKeyRecord>,
    refreshed_at: DateTime<Utc>,
}

#[derive(Deserialize)]
struct KeySetSnapshotRepr {
    keys: Vec<serde_json::Value>,
    refreshed_at: DateTime<Utc>,
}

impl From<KeySetSnapshotRepr> for KeySetSnapshot {
    fn from(repr: KeySetSnapshotRepr) -> Self {
        Self::from_json_values(repr.keys, repr.refreshed_at)
    }
}

#[bon::bon]
impl KeySetSnapshot {
    /// Creates a snapshot from records, dropping repeated `kid`s.
    ///
    /// `refreshed_at` defaults to now.
    #[builder]
    pub fn new(
        #[builder(with = |iter: impl IntoIterator<Item = SigningKeyRecord>| {
            iter.into_iter().collect()
        })]
        keys: Vec<SigningKeyRecord>,
        #[builder(default = Utc::now())] refreshed_at: DateTime<Utc>,
    ) -> Self {
        Self::deduplicated(keys, refreshed_at)
    }
}

impl KeySetSnapshot {
    fn deduplicated(keys: Vec<SigningKeyRecord>, refreshed_at: DateTime<Utc>) -> Self {
        let mut unique: Vec<SigningKeyRecord> = Vec::with_capacity(keys.len());
        for record in keys {
            if unique.iter().any(|existing| existing.kid == record.kid) {
                tracing::debug!(kid = %record.kid, "dropping duplicate kid from key set");
                continue;
            }
            unique.push(record);
        }
        Self { keys: unique, refreshed_at }
    }

    /// Builds a snapshot from a published JWKS document.
    ///
    /// Keys without a `kid` cannot be addressed and are skipped.
    #[must_use]
    pub fn from_jwk_set(jwk_set: &JwkSet, refreshed_at: DateTime<Utc>) -> Self {
        Self::from_jwks(jwk_set.keys.iter().cloned(), refreshed_at)
    }

    /// Builds a snapshot from loose JWKs, skipping those without a `kid`.
    #[must_use]
    pub fn from_jwks(jwks: impl IntoIterator<Item = Jwk>, refreshed_at: DateTime<Utc>) -> Self {
        let records = jwks.into_iter().filter_map(|jwk| match SigningKeyRecord::try_from(jwk) {
            Ok(record) => Some(record),
            Err(_) => {
                tracing::debug!("skipping JWK without kid");
                None
            },
        });
        Self::deduplicated(records.collect(), refreshed_at)
    }

    /// Builds a snapshot from raw JWKS `keys` entries.
    ///
    /// Each entry is decoded on its own. Entries that are not a JWK this crate
    /// can model (an unknown curve, key type or algorithm) are skipped along
    /// with those lacking a `kid`, so one exotic key never hides the others.
    #[must_use]
    pub fn from_json_values(
        values: impl IntoIterator<Item = serde_json::Value>,
        refreshed_at: DateTime<Utc>,
    ) -> Self {
        let jwks = values.into_iter().filter_map(|value| {
            let kid = value.get("kid").and_then(serde_json::Value::as_str).map(str::to_owned);
            match serde_json::from_value::<Jwk>(value) {
                Ok(jwk) => Some(jwk),
                Err(e) => {
                    tracing::debug!(kid = ?kid, error = %e, "skipping unsupported JWK");
                    None
                },
            }
        });
        Self::from_jwks(jwks, refreshed_at)
    }

    /// Looks up a key by identifier.
    #[must_use]
    pub fn find(&self, kid: &str) -> Option<&SigningKeyRecord> {
        self.keys.iter().find(|record| record.kid == kid)
    }

    /// All records, in publication order.
    #[must_use]
    pub fn keys(&self) -> &[SigningKeyRecord] {
        &self.keys
    }

    /// Iterates over the key identifiers in this snapshot.
    pub fn kids(&self) -> impl Iterator<Item = &str> {
        self.keys.iter().map(SigningKeyRecord::kid)
    }

    /// When the authority produced this snapshot.
    #[must_use]
    pub fn refreshed_at(&self) -> DateTime<Utc> {
        self.refreshed_at
    }

    /// Number of keys.
    #[must_use]
    pub fn len(&self) -> usize {
        self.keys.len()
    }

    /// Returns `true` if the snapshot holds no keys.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.keys.is_empty()
    }

    /// Converts the snapshot back into a JWKS document.
    #[must_use]
    pub fn to_jwk_set(&self) -> JwkSet {
        JwkSet { keys: self.keys.iter().map(|record| record.jwk.clone()).collect() }
    }
}
