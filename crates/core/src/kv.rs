//! Key-value cache trait — backs conversation-state persistence.
//!
//! Values are opaque strings (callers serialize with serde_json). TTL
//! semantics: a value set with a TTL must be gone (return `None`) once the
//! TTL elapses. In-process implementations simulate this with an expiry
//! timestamp checked on read; no background sweeper is required.

use async_trait::async_trait;
use std::time::Duration;

use crate::error::StoreError;

/// A string-keyed cache with per-entry TTL.
#[async_trait]
pub trait KeyValueCache: Send + Sync {
    /// Fetch a value. Expired entries read as absent.
    async fn get(&self, key: &str) -> Result<Option<String>, StoreError>;

    /// Store a value with a time-to-live.
    async fn set_with_ttl(&self, key: &str, value: &str, ttl: Duration)
    -> Result<(), StoreError>;

    /// Remove a value. Removing an absent key is not an error.
    async fn delete(&self, key: &str) -> Result<(), StoreError>;
}
