//! Document store trait — the abstraction over the persistence collaborator.
//!
//! The dispatch core never talks to a database directly. Direct handlers and
//! context tier builders issue reads/writes through this trait; the
//! surrounding application provides the concrete backend.
//!
//! Bulk operations (`count_*`, `delete_*`) exist so destructive intents can
//! report an affected count *before* anything is deleted.

use async_trait::async_trait;
use chrono::{DateTime, NaiveDate, Utc};
use serde::{Deserialize, Serialize};

use crate::error::StoreError;

/// The kinds of user-owned entities the assistant manages.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum EntityKind {
    Task,
    Habit,
    Note,
    Workspace,
}

impl std::fmt::Display for EntityKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let s = match self {
            EntityKind::Task => "task",
            EntityKind::Habit => "habit",
            EntityKind::Note => "note",
            EntityKind::Workspace => "workspace",
        };
        write!(f, "{s}")
    }
}

/// A task document.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TaskRecord {
    pub id: String,
    pub workspace_id: String,
    pub title: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub due_date: Option<NaiveDate>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub priority: Option<String>,
    #[serde(default)]
    pub completed: bool,
    pub created_at: DateTime<Utc>,
}

/// A recurring habit document.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct HabitRecord {
    pub id: String,
    pub workspace_id: String,
    pub name: String,
    #[serde(default)]
    pub streak: u32,
    #[serde(default)]
    pub checked_in_today: bool,
}

/// A saved note document.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct NoteRecord {
    pub id: String,
    pub workspace_id: String,
    pub title: String,
    pub body: String,
    pub created_at: DateTime<Utc>,
}

/// A workspace document.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct WorkspaceRecord {
    pub id: String,
    pub name: String,
    pub owner_id: String,
}

/// One turn of stored conversation history (for the context cache).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ConversationTurn {
    pub role: String,
    pub content: String,
    pub at: DateTime<Utc>,
}

/// A scheduled reminder (for the context cache's medium tier).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ReminderRecord {
    pub id: String,
    pub label: String,
    pub at: DateTime<Utc>,
}

/// Aggregate usage statistics (for the context cache's low tier).
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct StatsSummary {
    pub tasks_completed_30d: u64,
    pub active_habits: u64,
    pub notes_total: u64,
}

/// Filter for task queries. `None` fields match everything.
#[derive(Debug, Clone, Default)]
pub struct TaskFilter {
    pub completed: Option<bool>,
    pub due_on: Option<NaiveDate>,
    pub due_before: Option<NaiveDate>,
    pub created_after: Option<DateTime<Utc>>,
}

impl TaskFilter {
    /// Open tasks due on the given day.
    pub fn due_on(day: NaiveDate) -> Self {
        Self {
            completed: Some(false),
            due_on: Some(day),
            ..Default::default()
        }
    }

    /// Open tasks due strictly before the given day (overdue).
    pub fn overdue(today: NaiveDate) -> Self {
        Self {
            completed: Some(false),
            due_before: Some(today),
            ..Default::default()
        }
    }
}

/// The document store collaborator.
///
/// Reads used only by tier builders (`recent_turns`, `unread_alert_count`,
/// `upcoming_reminders`, `aggregate_stats`) have empty defaults so test
/// doubles only implement what they exercise.
#[async_trait]
pub trait DocumentStore: Send + Sync {
    // --- Tasks ---
    async fn list_tasks(
        &self,
        user_id: &str,
        workspace_id: &str,
        filter: &TaskFilter,
    ) -> Result<Vec<TaskRecord>, StoreError>;

    async fn create_task(&self, task: TaskRecord) -> Result<TaskRecord, StoreError>;

    async fn complete_task(&self, task_id: &str) -> Result<TaskRecord, StoreError>;

    async fn find_task_by_title(
        &self,
        user_id: &str,
        workspace_id: &str,
        title: &str,
    ) -> Result<Option<TaskRecord>, StoreError>;

    async fn count_tasks(
        &self,
        user_id: &str,
        workspace_id: &str,
        filter: &TaskFilter,
    ) -> Result<u64, StoreError>;

    async fn delete_tasks(
        &self,
        user_id: &str,
        workspace_id: &str,
        filter: &TaskFilter,
    ) -> Result<u64, StoreError>;

    async fn delete_task_by_title(
        &self,
        user_id: &str,
        workspace_id: &str,
        title: &str,
    ) -> Result<bool, StoreError>;

    // --- Habits ---
    async fn list_habits(
        &self,
        user_id: &str,
        workspace_id: &str,
    ) -> Result<Vec<HabitRecord>, StoreError>;

    async fn create_habit(&self, habit: HabitRecord) -> Result<HabitRecord, StoreError>;

    async fn check_in_habit(&self, habit_id: &str) -> Result<HabitRecord, StoreError>;

    async fn count_habits(&self, user_id: &str, workspace_id: &str) -> Result<u64, StoreError>;

    async fn delete_habits(&self, user_id: &str, workspace_id: &str) -> Result<u64, StoreError>;

    // --- Notes ---
    async fn list_notes(
        &self,
        user_id: &str,
        workspace_id: &str,
        limit: usize,
    ) -> Result<Vec<NoteRecord>, StoreError>;

    async fn create_note(&self, note: NoteRecord) -> Result<NoteRecord, StoreError>;

    async fn search_notes(
        &self,
        user_id: &str,
        workspace_id: &str,
        query: &str,
    ) -> Result<Vec<NoteRecord>, StoreError>;

    async fn count_notes(&self, user_id: &str, workspace_id: &str) -> Result<u64, StoreError>;

    async fn delete_notes(&self, user_id: &str, workspace_id: &str) -> Result<u64, StoreError>;

    // --- Workspaces ---
    async fn get_workspace(&self, workspace_id: &str) -> Result<WorkspaceRecord, StoreError>;

    async fn list_workspaces(&self, user_id: &str) -> Result<Vec<WorkspaceRecord>, StoreError>;

    async fn find_workspace_by_name(
        &self,
        user_id: &str,
        name: &str,
    ) -> Result<Option<WorkspaceRecord>, StoreError>;

    // --- Context-cache reads (empty defaults) ---
    async fn recent_turns(
        &self,
        _user_id: &str,
        _workspace_id: &str,
        _since: DateTime<Utc>,
    ) -> Result<Vec<ConversationTurn>, StoreError> {
        Ok(Vec::new())
    }

    async fn unread_alert_count(&self, _user_id: &str) -> Result<u64, StoreError> {
        Ok(0)
    }

    async fn upcoming_reminders(
        &self,
        _user_id: &str,
        _workspace_id: &str,
    ) -> Result<Vec<ReminderRecord>, StoreError> {
        Ok(Vec::new())
    }

    async fn aggregate_stats(&self, _user_id: &str) -> Result<StatsSummary, StoreError> {
        Ok(StatsSummary::default())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn entity_kind_display() {
        assert_eq!(EntityKind::Task.to_string(), "task");
        assert_eq!(EntityKind::Workspace.to_string(), "workspace");
    }

    #[test]
    fn task_filter_constructors() {
        let day = NaiveDate::from_ymd_opt(2026, 8, 29).unwrap();
        let due = TaskFilter::due_on(day);
        assert_eq!(due.completed, Some(false));
        assert_eq!(due.due_on, Some(day));
        assert!(due.due_before.is_none());

        let overdue = TaskFilter::overdue(day);
        assert_eq!(overdue.due_before, Some(day));
        assert!(overdue.due_on.is_none());
    }

    #[test]
    fn task_record_roundtrip() {
        let task = TaskRecord {
            id: "t1".into(),
            workspace_id: "w1".into(),
            title: "buy milk".into(),
            due_date: None,
            priority: Some("high".into()),
            completed: false,
            created_at: Utc::now(),
        };
        let json = serde_json::to_string(&task).unwrap();
        // Optional fields with None are omitted entirely.
        assert!(!json.contains("due_date"));
        let back: TaskRecord = serde_json::from_str(&json).unwrap();
        assert_eq!(back.title, "buy milk");
        assert_eq!(back.priority.as_deref(), Some("high"));
    }
}
