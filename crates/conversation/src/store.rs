//! Conversation state persistence over an injected key-value cache.
//!
//! States are stored as JSON under `conv:{user}:{workspace}`. Expiry is
//! checked on load (lazy collection): an expired or unreadable entry reads
//! as a fresh Idle state and the stale record is deleted in passing.

use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, warn};

use taskweave_core::error::StoreError;
use taskweave_core::key::SessionKey;
use taskweave_core::kv::KeyValueCache;

use crate::state::{ConversationPhase, ConversationState};

const KEY_PREFIX: &str = "conv";

/// Load/save/clear conversation states keyed by [`SessionKey`].
pub struct ConversationStore {
    kv: Arc<dyn KeyValueCache>,
    ttl: Duration,
}

impl ConversationStore {
    pub fn new(kv: Arc<dyn KeyValueCache>, ttl: Duration) -> Self {
        Self { kv, ttl }
    }

    /// The TTL applied to non-Idle phases.
    pub fn ttl(&self) -> Duration {
        self.ttl
    }

    /// Load the state for a session. Absent, expired, or corrupt entries
    /// all read as a fresh Idle state; expired/corrupt entries are deleted.
    pub async fn load(&self, key: &SessionKey) -> Result<ConversationState, StoreError> {
        let cache_key = key.cache_key(KEY_PREFIX);
        let Some(raw) = self.kv.get(&cache_key).await? else {
            return Ok(ConversationState::idle());
        };

        let state: ConversationState = match serde_json::from_str(&raw) {
            Ok(state) => state,
            Err(e) => {
                warn!(session = %key, error = %e, "Corrupt conversation state, resetting");
                self.kv.delete(&cache_key).await?;
                return Ok(ConversationState::idle());
            }
        };

        if state.is_expired_at(chrono::Utc::now(), self.ttl) {
            debug!(session = %key, "Conversation state expired, lazily collected");
            self.kv.delete(&cache_key).await?;
            return Ok(ConversationState::idle());
        }

        Ok(state)
    }

    /// Persist a state. Saving an Idle state clears the entry instead —
    /// Idle is the absence of dialog state, not a record worth keeping.
    pub async fn save(
        &self,
        key: &SessionKey,
        state: &ConversationState,
    ) -> Result<(), StoreError> {
        let cache_key = key.cache_key(KEY_PREFIX);
        if matches!(state.phase, ConversationPhase::Idle) {
            return self.kv.delete(&cache_key).await;
        }
        let raw = serde_json::to_string(state)
            .map_err(|e| StoreError::InvalidDocument(e.to_string()))?;
        self.kv.set_with_ttl(&cache_key, &raw, self.ttl).await
    }

    /// Explicitly clear a session's state (completion or cancellation).
    pub async fn clear(&self, key: &SessionKey) -> Result<(), StoreError> {
        self.kv.delete(&key.cache_key(KEY_PREFIX)).await
    }
}
