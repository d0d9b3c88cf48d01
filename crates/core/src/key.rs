//! Session keys — the structured (user, workspace) composite key.
//!
//! Conversation state and context snapshots are partitioned by this key.
//! A structured tuple (not a concatenated string) so map lookups and
//! per-key locking are explicit and typo-proof.

use serde::{Deserialize, Serialize};

/// Identifies one (user, workspace) dialog partition.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct SessionKey {
    pub user_id: String,
    pub workspace_id: String,
}

impl SessionKey {
    pub fn new(user_id: impl Into<String>, workspace_id: impl Into<String>) -> Self {
        Self {
            user_id: user_id.into(),
            workspace_id: workspace_id.into(),
        }
    }

    /// Render as a cache key for string-keyed backends (KV cache).
    pub fn cache_key(&self, prefix: &str) -> String {
        format!("{}:{}:{}", prefix, self.user_id, self.workspace_id)
    }
}

impl std::fmt::Display for SessionKey {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}/{}", self.user_id, self.workspace_id)
    }
}
