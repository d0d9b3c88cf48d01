//! Prompt assembly for model-routed turns.
//!
//! The prompt is one flat text block: instructions, the reply contract, a
//! short worked example, intent-specific guidance, the rendered context
//! snapshot, and finally the user's message.

use taskweave_context::ContextSnapshot;
use taskweave_intent::{IntentClassification, IntentKind};

const INSTRUCTIONS: &str = "\
You are the assistant inside a personal productivity app. You help the user \
manage tasks, habits, notes, and workspaces. Be concise and concrete; never \
invent items that are not in the context below.";

const CONTRACT: &str = r#"Answer with a single JSON object and nothing else:
{
  "reply": "<what to say to the user>",
  "action": {"name": "<action>", "params": {}} | omit when no side effect,
  "data": {} | omit,
  "requires_confirmation": true | false
}
Allowed actions: create_task, create_habit, create_note, complete_task."#;

const EXAMPLE: &str = r#"Example:
User: note down that the deploy key rotates friday
{"reply": "Noted — I saved a note about the deploy key rotation.", "action": {"name": "create_note", "params": {"title": "deploy key rotates friday"}}}"#;

/// Intent-specific steering appended to the shared instructions.
fn guidance(kind: IntentKind) -> &'static str {
    match kind {
        IntentKind::ProductivitySummary => {
            "The user wants a summary of how they are doing. Ground every claim in the context; mention counts."
        }
        IntentKind::WeeklyReview => {
            "Walk through the week: completed work, open work, habit consistency. Keep it under five sentences."
        }
        IntentKind::TaskStats | IntentKind::HabitStats => {
            "Report the numbers from the context plainly. No editorializing."
        }
        IntentKind::SummarizeNotes => "Summarize the note titles in the context; do not invent bodies.",
        IntentKind::SuggestNextTask => {
            "Pick one task from the context and say why it is next. Overdue beats due-today beats the rest."
        }
        IntentKind::PrioritizeTasks => "Order the open tasks from the context and briefly justify the order.",
        IntentKind::MultiIntent => {
            "The message contains several requests. Address each one in order, in a single reply."
        }
        _ => "If the request is unclear, ask one clarifying question instead of guessing.",
    }
}

/// Assemble the full prompt for one model-routed turn.
pub fn build_prompt(
    classification: &IntentClassification,
    snapshot: &ContextSnapshot,
    user_text: &str,
) -> String {
    let context = snapshot.render_for_prompt();
    let context_block = if context.is_empty() {
        "(no context loaded)".to_string()
    } else {
        context
    };

    format!(
        "{INSTRUCTIONS}\n\n{CONTRACT}\n\n{EXAMPLE}\n\n{}\n\nCurrent context:\n{}\nUser: {}",
        guidance(classification.kind),
        context_block,
        user_text.trim(),
    )
}

#[cfg(test)]
mod tests {
    use super::*;
    use taskweave_intent::IntentClassifier;

    #[test]
    fn prompt_carries_context_and_user_text() {
        let classifier = IntentClassifier::new();
        let classification = classifier.classify("how productive was i this week");

        let mut snapshot = ContextSnapshot::empty();
        snapshot
            .loaded_tiers
            .insert(taskweave_context::ContextTier::Critical);
        snapshot
            .sections
            .insert("tasks_today".into(), serde_json::json!(["file taxes"]));

        let prompt = build_prompt(&classification, &snapshot, "how productive was i this week");
        assert!(prompt.contains("file taxes"));
        assert!(prompt.contains("User: how productive was i this week"));
        assert!(prompt.contains("single JSON object"));
    }

    #[test]
    fn empty_snapshot_still_renders() {
        let classifier = IntentClassifier::new();
        let classification = classifier.classify("blorp blorp");
        let prompt = build_prompt(&classification, &ContextSnapshot::empty(), "blorp blorp");
        assert!(prompt.contains("(no context loaded)"));
    }

    #[test]
    fn multi_intent_guidance_selected() {
        let classifier = IntentClassifier::new();
        let classification = classifier.classify("add a task and delete a note");
        let prompt = build_prompt(&classification, &ContextSnapshot::empty(), "x");
        assert!(prompt.contains("several requests"));
    }
}
