//! The closed set of intents the assistant understands.

use serde::{Deserialize, Serialize};

/// Coarse grouping of intents, used for fallback-message selection and
/// routing decisions.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum IntentGroup {
    List,
    Create,
    Update,
    Delete,
    Batch,
    Analytics,
    Misc,
    Unknown,
}

/// Every intent the classifier can produce.
///
/// Closed enum — adding a variant means adding a pattern (or model routing)
/// and, for deterministic kinds, a direct handler.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum IntentKind {
    // --- List / read ---
    ListTasks,
    ListTasksToday,
    ListTasksOverdue,
    ListTasksCompleted,
    ListTasksUpcoming,
    SearchTasks,
    ListHabits,
    HabitStreak,
    ListNotes,
    SearchNotes,
    ShowNote,
    ListWorkspaces,
    ShowCurrentWorkspace,
    ListReminders,

    // --- Create ---
    CreateTask,
    CreateHabit,
    CreateNote,
    CreateWorkspace,
    CreateReminder,

    // --- Update ---
    CompleteTask,
    ReopenTask,
    RenameTask,
    SetTaskDueDate,
    SetTaskPriority,
    MoveTaskToWorkspace,
    CheckInHabit,
    RenameHabit,
    RenameWorkspace,
    UpdateNote,

    // --- Delete (singular) ---
    DeleteTask,
    DeleteHabit,
    DeleteNote,
    DeleteWorkspace,
    DeleteReminder,

    // --- Batch ---
    DeleteAllTasks,
    DeleteCompletedTasks,
    DeleteAllHabits,
    DeleteAllNotes,
    CompleteAllTasks,

    // --- Analytics / model-backed ---
    ProductivitySummary,
    WeeklyReview,
    TaskStats,
    HabitStats,
    SummarizeNotes,
    SuggestNextTask,
    PrioritizeTasks,

    // --- Small talk / meta ---
    Greeting,
    Help,
    Thanks,
    Goodbye,

    // --- Routing ---
    MultiIntent,
    Unknown,
}

impl IntentKind {
    /// Stable snake_case label (the `intent_label` of a dispatch result).
    pub fn label(&self) -> &'static str {
        match self {
            IntentKind::ListTasks => "list_tasks",
            IntentKind::ListTasksToday => "list_tasks_today",
            IntentKind::ListTasksOverdue => "list_tasks_overdue",
            IntentKind::ListTasksCompleted => "list_tasks_completed",
            IntentKind::ListTasksUpcoming => "list_tasks_upcoming",
            IntentKind::SearchTasks => "search_tasks",
            IntentKind::ListHabits => "list_habits",
            IntentKind::HabitStreak => "habit_streak",
            IntentKind::ListNotes => "list_notes",
            IntentKind::SearchNotes => "search_notes",
            IntentKind::ShowNote => "show_note",
            IntentKind::ListWorkspaces => "list_workspaces",
            IntentKind::ShowCurrentWorkspace => "show_current_workspace",
            IntentKind::ListReminders => "list_reminders",
            IntentKind::CreateTask => "create_task",
            IntentKind::CreateHabit => "create_habit",
            IntentKind::CreateNote => "create_note",
            IntentKind::CreateWorkspace => "create_workspace",
            IntentKind::CreateReminder => "create_reminder",
            IntentKind::CompleteTask => "complete_task",
            IntentKind::ReopenTask => "reopen_task",
            IntentKind::RenameTask => "rename_task",
            IntentKind::SetTaskDueDate => "set_task_due_date",
            IntentKind::SetTaskPriority => "set_task_priority",
            IntentKind::MoveTaskToWorkspace => "move_task_to_workspace",
            IntentKind::CheckInHabit => "check_in_habit",
            IntentKind::RenameHabit => "rename_habit",
            IntentKind::RenameWorkspace => "rename_workspace",
            IntentKind::UpdateNote => "update_note",
            IntentKind::DeleteTask => "delete_task",
            IntentKind::DeleteHabit => "delete_habit",
            IntentKind::DeleteNote => "delete_note",
            IntentKind::DeleteWorkspace => "delete_workspace",
            IntentKind::DeleteReminder => "delete_reminder",
            IntentKind::DeleteAllTasks => "delete_all_tasks",
            IntentKind::DeleteCompletedTasks => "delete_completed_tasks",
            IntentKind::DeleteAllHabits => "delete_all_habits",
            IntentKind::DeleteAllNotes => "delete_all_notes",
            IntentKind::CompleteAllTasks => "complete_all_tasks",
            IntentKind::ProductivitySummary => "productivity_summary",
            IntentKind::WeeklyReview => "weekly_review",
            IntentKind::TaskStats => "task_stats",
            IntentKind::HabitStats => "habit_stats",
            IntentKind::SummarizeNotes => "summarize_notes",
            IntentKind::SuggestNextTask => "suggest_next_task",
            IntentKind::PrioritizeTasks => "prioritize_tasks",
            IntentKind::Greeting => "greeting",
            IntentKind::Help => "help",
            IntentKind::Thanks => "thanks",
            IntentKind::Goodbye => "goodbye",
            IntentKind::MultiIntent => "multi_intent",
            IntentKind::Unknown => "unknown",
        }
    }

    /// The coarse group this intent belongs to.
    pub fn group(&self) -> IntentGroup {
        use IntentKind::*;
        match self {
            ListTasks | ListTasksToday | ListTasksOverdue | ListTasksCompleted
            | ListTasksUpcoming | SearchTasks | ListHabits | HabitStreak | ListNotes
            | SearchNotes | ShowNote | ListWorkspaces | ShowCurrentWorkspace
            | ListReminders => IntentGroup::List,
            CreateTask | CreateHabit | CreateNote | CreateWorkspace | CreateReminder => {
                IntentGroup::Create
            }
            CompleteTask | ReopenTask | RenameTask | SetTaskDueDate | SetTaskPriority
            | MoveTaskToWorkspace | CheckInHabit | RenameHabit | RenameWorkspace
            | UpdateNote => IntentGroup::Update,
            DeleteTask | DeleteHabit | DeleteNote | DeleteWorkspace | DeleteReminder => {
                IntentGroup::Delete
            }
            DeleteAllTasks | DeleteCompletedTasks | DeleteAllHabits | DeleteAllNotes
            | CompleteAllTasks => IntentGroup::Batch,
            ProductivitySummary | WeeklyReview | TaskStats | HabitStats | SummarizeNotes
            | SuggestNextTask | PrioritizeTasks => IntentGroup::Analytics,
            Greeting | Help | Thanks | Goodbye => IntentGroup::Misc,
            MultiIntent | Unknown => IntentGroup::Unknown,
        }
    }

    /// Whether this intent needs the language model. Analytics kinds need
    /// synthesis; multi-intent and unknown text are deferred to the model.
    pub fn requires_model(&self) -> bool {
        matches!(
            self.group(),
            IntentGroup::Analytics | IntentGroup::Unknown
        )
    }

    /// Bulk-destructive kinds require a confirmation round-trip before
    /// anything is deleted.
    pub fn is_bulk_destructive(&self) -> bool {
        matches!(
            self,
            IntentKind::DeleteAllTasks
                | IntentKind::DeleteCompletedTasks
                | IntentKind::DeleteAllHabits
                | IntentKind::DeleteAllNotes
        )
    }

    /// Creation kinds run the workspace-ambiguity check before executing.
    pub fn is_creation(&self) -> bool {
        self.group() == IntentGroup::Create
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn labels_are_snake_case() {
        assert_eq!(IntentKind::DeleteAllTasks.label(), "delete_all_tasks");
        assert_eq!(IntentKind::ListTasks.label(), "list_tasks");
        let json = serde_json::to_string(&IntentKind::CreateTask).unwrap();
        assert_eq!(json, "\"create_task\"");
    }

    #[test]
    fn model_routing() {
        assert!(IntentKind::ProductivitySummary.requires_model());
        assert!(IntentKind::Unknown.requires_model());
        assert!(IntentKind::MultiIntent.requires_model());
        assert!(!IntentKind::ListTasks.requires_model());
        assert!(!IntentKind::DeleteAllTasks.requires_model());
        assert!(!IntentKind::Greeting.requires_model());
    }

    #[test]
    fn bulk_destructive_set() {
        assert!(IntentKind::DeleteAllTasks.is_bulk_destructive());
        assert!(IntentKind::DeleteCompletedTasks.is_bulk_destructive());
        assert!(!IntentKind::DeleteTask.is_bulk_destructive());
        // Bulk-complete is batch but not destructive — no confirmation.
        assert!(!IntentKind::CompleteAllTasks.is_bulk_destructive());
    }

    #[test]
    fn groups() {
        assert_eq!(IntentKind::CreateTask.group(), IntentGroup::Create);
        assert_eq!(IntentKind::DeleteAllNotes.group(), IntentGroup::Batch);
        assert_eq!(IntentKind::WeeklyReview.group(), IntentGroup::Analytics);
        assert_eq!(IntentKind::Unknown.group(), IntentGroup::Unknown);
    }
}
