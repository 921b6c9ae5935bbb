//! Signing key types and the durable key-set store.
//!
//! This module contains the data model shared by every tier of the signing
//! key resolver ([`KeySetSnapshot`], [`SigningKeyRecord`]) and the
//! [`KeySetStore`] trait for the shared durable tier.
//!
//! # Architecture
//!
//! ```text
//! ┌──────────────┐      ┌──────────────┐      ┌──────────────┐
//! │ process      │ miss │ KeySetStore  │ miss │ authority    │
//! │ memory       │─────►│ (durable,    │─────►│ JWKS         │
//! │              │      │  shared)     │      │ endpoint     │
//! └──────────────┘      └──────────────┘      └──────────────┘
//! ```
//!
//! Use [`MemoryKeySetStore`] for testing; `DynamoKeySetStore` (in
//! `platform-authorizer-storage-dynamodb`) in production.

mod key_set;
mod store;

pub use key_set::{KeySetSnapshot, MissingKeyId, SigningKeyRecord};
pub use store::{KeySetStore, MemoryKeySetStore};
