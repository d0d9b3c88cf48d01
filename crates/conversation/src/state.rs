//! Conversation state and phases.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::time::Duration;

use taskweave_core::store::EntityKind;
use taskweave_intent::IntentClassification;

/// One selectable option in an explicit-choice prompt.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ChoiceOption {
    /// Opaque id the client echoes back to select this option.
    pub id: String,
    /// Human-readable label.
    pub label: String,
    /// Arbitrary payload the dispatcher needs to resume (workspace id etc.).
    #[serde(default)]
    pub payload: serde_json::Value,
}

impl ChoiceOption {
    pub fn new(
        id: impl Into<String>,
        label: impl Into<String>,
        payload: serde_json::Value,
    ) -> Self {
        Self {
            id: id.into(),
            label: label.into(),
            payload,
        }
    }
}

/// Where a conversation currently stands.
///
/// Every transition is total: an input that makes no sense for the current
/// phase leaves the phase unchanged (the dispatcher re-prompts).
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "phase", rename_all = "snake_case")]
pub enum ConversationPhase {
    /// No multi-step interaction in flight.
    Idle,

    /// A creation intent arrived without the field named by `step`; the
    /// next turn's raw text is that field.
    AwaitingEntityDetails { entity_kind: EntityKind, step: String },

    /// A bulk-destructive action awaits a yes/no. `reprompts` counts
    /// consecutive ambiguous replies; the store's cap auto-cancels.
    AwaitingConfirmation {
        action: String,
        metadata: serde_json::Value,
        #[serde(default)]
        reprompts: u32,
    },

    /// The user must pick one of `options` by id; free text is rejected.
    AwaitingExplicitChoice {
        question: String,
        options: Vec<ChoiceOption>,
        original_intent: IntentClassification,
        #[serde(default)]
        context_data: serde_json::Value,
    },
}

impl ConversationPhase {
    pub fn is_idle(&self) -> bool {
        matches!(self, ConversationPhase::Idle)
    }
}

/// The persisted dialog state for one (user, workspace) pair.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ConversationState {
    pub phase: ConversationPhase,
    pub created_at: DateTime<Utc>,
    pub last_updated_at: DateTime<Utc>,
}

impl ConversationState {
    /// A fresh Idle state.
    pub fn idle() -> Self {
        let now = Utc::now();
        Self {
            phase: ConversationPhase::Idle,
            created_at: now,
            last_updated_at: now,
        }
    }

    /// A state that just entered the given phase.
    pub fn entering(phase: ConversationPhase) -> Self {
        let now = Utc::now();
        Self {
            phase,
            created_at: now,
            last_updated_at: now,
        }
    }

    /// Replace the phase and stamp the update time.
    pub fn transition(&mut self, phase: ConversationPhase) {
        self.phase = phase;
        self.last_updated_at = Utc::now();
    }

    /// Whether this state has outlived the TTL at the given instant.
    /// Idle never expires — there is nothing to expire.
    pub fn is_expired_at(&self, now: DateTime<Utc>, ttl: Duration) -> bool {
        if self.phase.is_idle() {
            return false;
        }
        let age = now.signed_duration_since(self.last_updated_at);
        age.num_milliseconds() > ttl.as_millis() as i64
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeDelta;

    #[test]
    fn idle_never_expires() {
        let mut state = ConversationState::idle();
        state.last_updated_at = Utc::now() - TimeDelta::hours(24);
        assert!(!state.is_expired_at(Utc::now(), Duration::from_secs(300)));
    }

    #[test]
    fn confirmation_phase_expires_after_ttl() {
        let mut state = ConversationState::entering(ConversationPhase::AwaitingConfirmation {
            action: "delete_all_tasks".into(),
            metadata: serde_json::json!({"count": 5}),
            reprompts: 0,
        });
        let ttl = Duration::from_secs(300);
        assert!(!state.is_expired_at(Utc::now(), ttl));

        state.last_updated_at = Utc::now() - TimeDelta::seconds(301);
        assert!(state.is_expired_at(Utc::now(), ttl));
    }

    #[test]
    fn transition_bumps_update_time() {
        let mut state = ConversationState::idle();
        let before = state.last_updated_at;
        std::thread::sleep(std::time::Duration::from_millis(5));
        state.transition(ConversationPhase::AwaitingEntityDetails {
            entity_kind: EntityKind::Task,
            step: "title".into(),
        });
        assert!(state.last_updated_at > before);
        assert!(!state.phase.is_idle());
    }

    #[test]
    fn phase_roundtrips_through_json() {
        let phase = ConversationPhase::AwaitingExplicitChoice {
            question: "Which workspace?".into(),
            options: vec![
                ChoiceOption::new("1", "Work", serde_json::json!({"workspace_id": "w1"})),
                ChoiceOption::new("2", "Home", serde_json::json!({"workspace_id": "w2"})),
            ],
            original_intent: taskweave_intent::IntentClassifier::new()
                .classify("create a task called buy milk"),
            context_data: serde_json::Value::Null,
        };
        let json = serde_json::to_string(&phase).unwrap();
        assert!(json.contains("awaiting_explicit_choice"));
        let back: ConversationPhase = serde_json::from_str(&json).unwrap();
        match back {
            ConversationPhase::AwaitingExplicitChoice { options, .. } => {
                assert_eq!(options.len(), 2);
                assert_eq!(options[0].label, "Work");
            }
            other => panic!("Expected explicit choice, got: {other:?}"),
        }
    }

    #[test]
    fn reprompts_default_when_absent() {
        // Older persisted states without the field still deserialize.
        let json = r#"{"phase":"awaiting_confirmation","action":"delete_all_notes","metadata":{}}"#;
        let phase: ConversationPhase = serde_json::from_str(json).unwrap();
        match phase {
            ConversationPhase::AwaitingConfirmation { reprompts, .. } => assert_eq!(reprompts, 0),
            other => panic!("Expected confirmation, got: {other:?}"),
        }
    }
}
