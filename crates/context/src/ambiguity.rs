//! Workspace ambiguity detection for creation intents.
//!
//! When a user says "add a task to the work project" and a workspace other
//! than the active one matches "work", the dispatcher must ask instead of
//! guessing. This module does the lookup; the dispatcher owns the question
//! flow.

use taskweave_core::error::StoreError;
use taskweave_core::store::{DocumentStore, WorkspaceRecord};
use tracing::debug;

/// A workspace mention that matched one or more non-active workspaces.
#[derive(Debug, Clone)]
pub struct WorkspaceAmbiguity {
    pub question: String,
    pub candidates: Vec<WorkspaceRecord>,
}

/// Check whether a workspace mention refers to somewhere other than the
/// active workspace. Returns `None` when the mention matches nothing or
/// only the active workspace itself.
pub async fn detect_workspace_ambiguity(
    store: &dyn DocumentStore,
    user_id: &str,
    active_workspace_id: &str,
    mention: &str,
) -> Result<Option<WorkspaceAmbiguity>, StoreError> {
    let mention = mention.trim();
    if mention.is_empty() {
        return Ok(None);
    }

    let needle = mention.to_lowercase();
    let workspaces = store.list_workspaces(user_id).await?;
    let candidates: Vec<WorkspaceRecord> = workspaces
        .into_iter()
        .filter(|w| w.id != active_workspace_id)
        .filter(|w| {
            let name = w.name.to_lowercase();
            name == needle || name.contains(&needle) || needle.contains(&name)
        })
        .collect();

    if candidates.is_empty() {
        return Ok(None);
    }

    debug!(
        mention,
        matches = candidates.len(),
        "Workspace mention matched non-active workspaces"
    );

    let question = if candidates.len() == 1 {
        format!(
            "Did you mean the \"{}\" workspace, or your current one?",
            candidates[0].name
        )
    } else {
        let names: Vec<&str> = candidates.iter().map(|w| w.name.as_str()).collect();
        format!(
            "Which workspace did you mean: {}, or your current one?",
            names.join(", ")
        )
    };

    Ok(Some(WorkspaceAmbiguity {
        question,
        candidates,
    }))
}
