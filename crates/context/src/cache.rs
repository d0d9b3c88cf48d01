//! The context cache — builds and incrementally refreshes snapshots.
//!
//! Tier builders are read-only queries against the document store and
//! never mutate anything. A builder failure propagates as a typed error
//! and leaves the cached snapshot exactly as it was: the cache never
//! commits partial data.

use chrono::{TimeDelta, Utc};
use std::collections::{HashMap, HashSet};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::RwLock;
use tracing::{debug, trace};

use taskweave_core::error::StoreError;
use taskweave_core::key::SessionKey;
use taskweave_core::store::{DocumentStore, TaskFilter};

use crate::snapshot::{ContextSnapshot, ContextTier};

/// Per-session tiered context cache over an injected document store.
pub struct ContextCache {
    store: Arc<dyn DocumentStore>,
    snapshots: RwLock<HashMap<SessionKey, ContextSnapshot>>,
    ttl: Duration,
    preload_threshold: u32,
}

impl ContextCache {
    pub fn new(store: Arc<dyn DocumentStore>, ttl: Duration, preload_threshold: u32) -> Self {
        Self {
            store,
            snapshots: RwLock::new(HashMap::new()),
            ttl,
            preload_threshold,
        }
    }

    /// Load tiers `Critical..=min_tier`, skipping tiers already loaded in a
    /// fresh snapshot. Returns a clone of the committed snapshot.
    ///
    /// The map lock is held only to read out and to commit, never across a
    /// tier build — sessions are partitioned, so one session's slow store
    /// must not stall another's context. Two concurrent turns for the same
    /// key are last-write-wins.
    pub async fn get(
        &self,
        key: &SessionKey,
        min_tier: ContextTier,
    ) -> Result<ContextSnapshot, StoreError> {
        let mut snapshot = self.fresh_snapshot(key).await;

        for tier in ContextTier::ALL {
            if tier > min_tier {
                break;
            }
            if !snapshot.is_loaded(tier) {
                self.build_tier(key, tier, &mut snapshot).await?;
            }
            snapshot.record_access(tier);
        }

        Ok(self.commit(key, snapshot).await)
    }

    /// Rebuild only the tiers containing the named fields. Hot tiers
    /// (accessed ≥ threshold) are refreshed too, even if untouched by the
    /// change. Tiers that were never loaded stay unloaded — they will be
    /// built on the next `get` that wants them.
    pub async fn update(
        &self,
        key: &SessionKey,
        changed_fields: &HashSet<String>,
    ) -> Result<ContextSnapshot, StoreError> {
        let existing = {
            let snapshots = self.snapshots.read().await;
            snapshots
                .get(key)
                .filter(|s| !s.is_stale_at(Utc::now(), self.ttl))
                .cloned()
        };
        let Some(mut snapshot) = existing else {
            // Nothing fresh to update; rebuild the base tier.
            let mut fresh = ContextSnapshot::empty();
            self.build_tier(key, ContextTier::Critical, &mut fresh).await?;
            return Ok(self.commit(key, fresh).await);
        };

        let mut to_refresh: HashSet<ContextTier> = changed_fields
            .iter()
            .filter_map(|f| ContextTier::of_field(f))
            .collect();
        to_refresh.extend(snapshot.hot_tiers(self.preload_threshold));

        for tier in ContextTier::ALL {
            if to_refresh.contains(&tier) && snapshot.is_loaded(tier) {
                trace!(session = %key, ?tier, "Incremental tier refresh");
                self.build_tier(key, tier, &mut snapshot).await?;
            }
        }

        Ok(self.commit(key, snapshot).await)
    }

    /// Drop the snapshot entirely; the next `get` rebuilds from scratch.
    pub async fn invalidate(&self, key: &SessionKey) {
        self.snapshots.write().await.remove(key);
    }

    /// A clone of the session's fresh snapshot, or an empty one to rebuild.
    async fn fresh_snapshot(&self, key: &SessionKey) -> ContextSnapshot {
        match self.snapshots.read().await.get(key) {
            Some(existing) if !existing.is_stale_at(Utc::now(), self.ttl) => existing.clone(),
            Some(_) => {
                debug!(session = %key, "Snapshot stale, rebuilding from tier zero");
                ContextSnapshot::empty()
            }
            None => ContextSnapshot::empty(),
        }
    }

    /// Store the built snapshot, evicting any session that went stale since
    /// its last touch so the map tracks only live sessions.
    async fn commit(&self, key: &SessionKey, snapshot: ContextSnapshot) -> ContextSnapshot {
        let mut snapshots = self.snapshots.write().await;
        let now = Utc::now();
        snapshots.retain(|_, s| !s.is_stale_at(now, self.ttl));
        snapshots.insert(key.clone(), snapshot.clone());
        snapshot
    }

    #[cfg(test)]
    async fn age_snapshot(&self, key: &SessionKey, by: TimeDelta) {
        if let Some(snapshot) = self.snapshots.write().await.get_mut(key) {
            snapshot.created_at -= by;
        }
    }

    // ── Tier builders ─────────────────────────────────────────────────

    async fn build_tier(
        &self,
        key: &SessionKey,
        tier: ContextTier,
        snapshot: &mut ContextSnapshot,
    ) -> Result<(), StoreError> {
        let user = key.user_id.as_str();
        let ws = key.workspace_id.as_str();
        match tier {
            ContextTier::Critical => {
                let workspace = self.store.get_workspace(ws).await?;
                let today = Utc::now().date_naive();
                let due_today = self
                    .store
                    .list_tasks(user, ws, &TaskFilter::due_on(today))
                    .await?;
                let habits = self.store.list_habits(user, ws).await?;

                snapshot.sections.insert(
                    "workspace".into(),
                    serde_json::json!({"id": workspace.id, "name": workspace.name}),
                );
                snapshot.sections.insert(
                    "tasks_today".into(),
                    serde_json::json!(
                        due_today.iter().map(|t| t.title.as_str()).collect::<Vec<_>>()
                    ),
                );
                snapshot.sections.insert(
                    "habits_today".into(),
                    serde_json::json!(
                        habits
                            .iter()
                            .map(|h| {
                                serde_json::json!({
                                    "name": h.name,
                                    "checked_in": h.checked_in_today,
                                    "streak": h.streak,
                                })
                            })
                            .collect::<Vec<_>>()
                    ),
                );
            }
            ContextTier::High => {
                let since = Utc::now() - TimeDelta::hours(24);
                let turns = self.store.recent_turns(user, ws, since).await?;
                let alerts = self.store.unread_alert_count(user).await?;

                snapshot.sections.insert(
                    "conversation_tail".into(),
                    serde_json::json!(
                        turns
                            .iter()
                            .map(|t| format!("{}: {}", t.role, t.content))
                            .collect::<Vec<_>>()
                    ),
                );
                snapshot
                    .sections
                    .insert("alerts".into(), serde_json::json!({"unread": alerts}));
            }
            ContextTier::Medium => {
                let week_ago = Utc::now() - TimeDelta::days(7);
                let filter = TaskFilter {
                    created_after: Some(week_ago),
                    ..Default::default()
                };
                let recent_tasks = self.store.list_tasks(user, ws, &filter).await?;
                let notes = self.store.list_notes(user, ws, 10).await?;
                let reminders = self.store.upcoming_reminders(user, ws).await?;

                snapshot.sections.insert(
                    "tasks_week".into(),
                    serde_json::json!(
                        recent_tasks
                            .iter()
                            .map(|t| serde_json::json!({"title": t.title, "completed": t.completed}))
                            .collect::<Vec<_>>()
                    ),
                );
                snapshot.sections.insert(
                    "notes".into(),
                    serde_json::json!(notes.iter().map(|n| n.title.as_str()).collect::<Vec<_>>()),
                );
                snapshot.sections.insert(
                    "reminders".into(),
                    serde_json::json!(
                        reminders
                            .iter()
                            .map(|r| format!("{} at {}", r.label, r.at.to_rfc3339()))
                            .collect::<Vec<_>>()
                    ),
                );
            }
            ContextTier::Low => {
                let workspaces = self.store.list_workspaces(user).await?;
                let stats = self.store.aggregate_stats(user).await?;

                snapshot.sections.insert(
                    "workspaces".into(),
                    serde_json::json!(
                        workspaces.iter().map(|w| w.name.as_str()).collect::<Vec<_>>()
                    ),
                );
                snapshot
                    .sections
                    .insert("stats".into(), serde_json::json!(stats));
            }
        }
        snapshot.loaded_tiers.insert(tier);
        Ok(())
    }
}
