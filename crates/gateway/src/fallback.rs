//! Canned fallback replies, matched to the intent group.
//!
//! When the gateway exhausts its retries (or the circuit is open), the user
//! still gets a reply that acknowledges what they were *trying* to do and
//! points at a manual path for it.

use taskweave_core::error::GatewayError;
use taskweave_intent::IntentGroup;

/// A group-appropriate reply for a terminal gateway failure.
pub fn fallback_reply(group: IntentGroup, error: &GatewayError) -> String {
    let suffix = match group {
        IntentGroup::Create => {
            "In the meantime, you can add it directly from the creation screen."
        }
        IntentGroup::List => {
            "In the meantime, you can browse your items directly from the sidebar."
        }
        IntentGroup::Update => {
            "In the meantime, you can edit the item directly from its detail view."
        }
        IntentGroup::Delete | IntentGroup::Batch => {
            "Nothing was deleted. You can manage items directly from their list view."
        }
        IntentGroup::Analytics => {
            "In the meantime, the stats page has your latest numbers."
        }
        IntentGroup::Misc | IntentGroup::Unknown => "Please try again in a moment.",
    };

    let lead = match error {
        GatewayError::RateLimited { .. } => "I'm handling a lot of requests right now.",
        GatewayError::CircuitOpen => "The assistant is taking a short break to recover.",
        GatewayError::AuthFailed(_) => "I couldn't authenticate with the assistant service.",
        _ => "The assistant is temporarily overloaded.",
    };

    format!("{lead} {suffix}")
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn creation_failure_points_at_creation_screen() {
        let msg = fallback_reply(
            IntentGroup::Create,
            &GatewayError::ServiceOverloaded("503".into()),
        );
        assert!(msg.contains("creation screen"));
        assert!(msg.contains("overloaded"));
    }

    #[test]
    fn delete_failure_reassures_nothing_was_deleted() {
        let msg = fallback_reply(IntentGroup::Batch, &GatewayError::CircuitOpen);
        assert!(msg.contains("Nothing was deleted"));
    }

    #[test]
    fn every_group_produces_a_reply() {
        let groups = [
            IntentGroup::List,
            IntentGroup::Create,
            IntentGroup::Update,
            IntentGroup::Delete,
            IntentGroup::Batch,
            IntentGroup::Analytics,
            IntentGroup::Misc,
            IntentGroup::Unknown,
        ];
        for group in groups {
            let msg = fallback_reply(group, &GatewayError::Network("down".into()));
            assert!(!msg.is_empty());
        }
    }
}
