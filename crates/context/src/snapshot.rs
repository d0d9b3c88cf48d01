//! Context tiers and the snapshot record.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::{HashMap, HashSet};
use std::time::Duration;

/// The four context tiers, ordered by recency/cost. `Critical` is always
/// loaded; lower tiers only on demand.
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize,
)]
#[serde(rename_all = "snake_case")]
pub enum ContextTier {
    Critical,
    High,
    Medium,
    Low,
}

impl ContextTier {
    /// All tiers, loading order.
    pub const ALL: [ContextTier; 4] = [
        ContextTier::Critical,
        ContextTier::High,
        ContextTier::Medium,
        ContextTier::Low,
    ];

    /// The snapshot fields this tier owns.
    pub fn fields(&self) -> &'static [&'static str] {
        match self {
            ContextTier::Critical => &["workspace", "tasks_today", "habits_today"],
            ContextTier::High => &["conversation_tail", "alerts"],
            ContextTier::Medium => &["tasks_week", "notes", "reminders"],
            ContextTier::Low => &["workspaces", "stats"],
        }
    }

    /// Which tier owns a field. "tasks" is an alias for both task fields'
    /// home tiers; callers pass concrete field names where they can.
    pub fn of_field(field: &str) -> Option<ContextTier> {
        for tier in ContextTier::ALL {
            if tier.fields().contains(&field) {
                return Some(tier);
            }
        }
        // Entity-level aliases used by action execution ("tasks changed").
        match field {
            "tasks" => Some(ContextTier::Critical),
            "habits" => Some(ContextTier::Critical),
            "notes" => Some(ContextTier::Medium),
            "workspaces" => Some(ContextTier::Low),
            _ => None,
        }
    }
}

/// A per-session context snapshot. Tiers populate `sections` under the
/// field names of [`ContextTier::fields`].
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ContextSnapshot {
    pub created_at: DateTime<Utc>,
    pub sections: HashMap<String, serde_json::Value>,
    pub loaded_tiers: HashSet<ContextTier>,
    pub access_counts: HashMap<String, u32>,
}

impl ContextSnapshot {
    pub fn empty() -> Self {
        Self {
            created_at: Utc::now(),
            sections: HashMap::new(),
            loaded_tiers: HashSet::new(),
            access_counts: HashMap::new(),
        }
    }

    pub fn is_loaded(&self, tier: ContextTier) -> bool {
        self.loaded_tiers.contains(&tier)
    }

    /// Stale snapshots are discarded wholesale and rebuilt from tier zero.
    pub fn is_stale_at(&self, now: DateTime<Utc>, ttl: Duration) -> bool {
        now.signed_duration_since(self.created_at).num_milliseconds() > ttl.as_millis() as i64
    }

    /// Record that a tier's fields were handed to a caller.
    pub fn record_access(&mut self, tier: ContextTier) {
        for field in tier.fields() {
            *self.access_counts.entry((*field).to_string()).or_insert(0) += 1;
        }
    }

    /// Tiers containing a field whose access count reached the threshold.
    pub fn hot_tiers(&self, threshold: u32) -> HashSet<ContextTier> {
        self.access_counts
            .iter()
            .filter(|(_, count)| **count >= threshold)
            .filter_map(|(field, _)| ContextTier::of_field(field))
            .collect()
    }

    /// Serialize the loaded sections for prompt injection, tier order.
    pub fn render_for_prompt(&self) -> String {
        let mut out = String::new();
        for tier in ContextTier::ALL {
            if !self.is_loaded(tier) {
                continue;
            }
            for field in tier.fields() {
                if let Some(value) = self.sections.get(*field) {
                    out.push_str(&format!("{field}: {value}\n"));
                }
            }
        }
        out
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeDelta;

    #[test]
    fn tier_ordering() {
        assert!(ContextTier::Critical < ContextTier::High);
        assert!(ContextTier::High < ContextTier::Medium);
        assert!(ContextTier::Medium < ContextTier::Low);
    }

    #[test]
    fn every_field_maps_back_to_its_tier() {
        for tier in ContextTier::ALL {
            for field in tier.fields() {
                assert_eq!(ContextTier::of_field(field), Some(tier), "field: {field}");
            }
        }
        assert_eq!(ContextTier::of_field("tasks"), Some(ContextTier::Critical));
        assert_eq!(ContextTier::of_field("nonsense"), None);
    }

    #[test]
    fn staleness() {
        let mut snapshot = ContextSnapshot::empty();
        let ttl = Duration::from_secs(1800);
        assert!(!snapshot.is_stale_at(Utc::now(), ttl));

        snapshot.created_at = Utc::now() - TimeDelta::minutes(31);
        assert!(snapshot.is_stale_at(Utc::now(), ttl));
    }

    #[test]
    fn access_counting_and_hot_tiers() {
        let mut snapshot = ContextSnapshot::empty();
        for _ in 0..3 {
            snapshot.record_access(ContextTier::Critical);
        }
        snapshot.record_access(ContextTier::High);

        let hot = snapshot.hot_tiers(3);
        assert!(hot.contains(&ContextTier::Critical));
        assert!(!hot.contains(&ContextTier::High));
    }

    #[test]
    fn render_skips_unloaded_tiers() {
        let mut snapshot = ContextSnapshot::empty();
        snapshot.loaded_tiers.insert(ContextTier::Critical);
        snapshot
            .sections
            .insert("tasks_today".into(), serde_json::json!(["buy milk"]));
        snapshot
            .sections
            .insert("stats".into(), serde_json::json!({"notes_total": 9}));

        let rendered = snapshot.render_for_prompt();
        assert!(rendered.contains("tasks_today"));
        // Low tier not loaded, so its section is not rendered.
        assert!(!rendered.contains("notes_total"));
    }
}
