//! Direct handlers for deterministic intents.
//!
//! A handler reads or writes the document store and produces a finished
//! [`DispatchResult`], plus the context fields it touched and an optional
//! realtime event. Intents with no handler (operations the store does not
//! expose) return `None`; the dispatcher reports them as unhandled.

use chrono::{Days, Utc};
use std::collections::HashSet;
use uuid::Uuid;

use taskweave_core::dispatch::{ActionDescriptor, DispatchResult};
use taskweave_core::error::StoreError;
use taskweave_core::key::SessionKey;
use taskweave_core::realtime::BroadcastEvent;
use taskweave_core::store::{
    DocumentStore, EntityKind, HabitRecord, NoteRecord, TaskFilter, TaskRecord,
};
use taskweave_intent::{IntentClassification, IntentKind};

/// A handler's full output: the reply, plus what changed.
pub struct Outcome {
    pub result: DispatchResult,
    /// Context fields invalidated by this turn, entity-level ("tasks").
    pub changed: HashSet<String>,
    pub event: Option<BroadcastEvent>,
}

impl Outcome {
    /// A read-only outcome: nothing changed, nothing to broadcast.
    pub fn read(result: DispatchResult) -> Self {
        Self {
            result,
            changed: HashSet::new(),
            event: None,
        }
    }

    fn mutated(result: DispatchResult, field: &str, event: BroadcastEvent) -> Self {
        Self {
            result,
            changed: HashSet::from([field.to_string()]),
            event: Some(event),
        }
    }
}

fn bullet_list(items: &[String]) -> String {
    items
        .iter()
        .map(|i| format!("• {i}"))
        .collect::<Vec<_>>()
        .join("\n")
}

/// Run the direct handler for a deterministic intent, if one exists.
pub async fn run(
    store: &dyn DocumentStore,
    key: &SessionKey,
    classification: &IntentClassification,
) -> Result<Option<Outcome>, StoreError> {
    let user = key.user_id.as_str();
    let ws = key.workspace_id.as_str();
    let label = classification.kind.label();
    let today = Utc::now().date_naive();

    let outcome = match classification.kind {
        // ── Task reads ──
        IntentKind::ListTasks => {
            let filter = TaskFilter {
                completed: Some(false),
                ..Default::default()
            };
            let tasks = store.list_tasks(user, ws, &filter).await?;
            task_list_reply(label, &tasks, "open tasks")
        }
        IntentKind::ListTasksToday => {
            let tasks = store.list_tasks(user, ws, &TaskFilter::due_on(today)).await?;
            task_list_reply(label, &tasks, "tasks due today")
        }
        IntentKind::ListTasksOverdue => {
            let tasks = store.list_tasks(user, ws, &TaskFilter::overdue(today)).await?;
            task_list_reply(label, &tasks, "overdue tasks")
        }
        IntentKind::ListTasksCompleted => {
            let filter = TaskFilter {
                completed: Some(true),
                ..Default::default()
            };
            let tasks = store.list_tasks(user, ws, &filter).await?;
            task_list_reply(label, &tasks, "completed tasks")
        }
        IntentKind::ListTasksUpcoming => {
            let filter = TaskFilter {
                completed: Some(false),
                due_before: today.checked_add_days(Days::new(7)),
                ..Default::default()
            };
            let tasks = store.list_tasks(user, ws, &filter).await?;
            task_list_reply(label, &tasks, "tasks due this week")
        }
        IntentKind::SearchTasks => {
            let Some(query) = classification.get("query") else {
                return Ok(Some(Outcome::read(DispatchResult::reply(
                    label,
                    "What should I search your tasks for?",
                ))));
            };
            let needle = query.to_lowercase();
            let tasks: Vec<TaskRecord> = store
                .list_tasks(user, ws, &TaskFilter::default())
                .await?
                .into_iter()
                .filter(|t| t.title.to_lowercase().contains(&needle))
                .collect();
            task_list_reply(label, &tasks, &format!("tasks matching \"{query}\""))
        }

        // ── Habit reads ──
        IntentKind::ListHabits | IntentKind::HabitStreak => {
            let habits = store.list_habits(user, ws).await?;
            if habits.is_empty() {
                Outcome::read(DispatchResult::reply(
                    label,
                    "You're not tracking any habits yet.",
                ))
            } else {
                let lines: Vec<String> = habits
                    .iter()
                    .map(|h| {
                        let check = if h.checked_in_today { " ✓ today" } else { "" };
                        format!("{} — {} day streak{check}", h.name, h.streak)
                    })
                    .collect();
                Outcome::read(
                    DispatchResult::reply(
                        label,
                        format!("Your habits:\n{}", bullet_list(&lines)),
                    )
                    .with_data(serde_json::json!({ "habits": habits })),
                )
            }
        }

        // ── Note reads ──
        IntentKind::ListNotes => {
            let notes = store.list_notes(user, ws, 10).await?;
            note_list_reply(label, &notes, "recent notes")
        }
        IntentKind::SearchNotes => {
            let Some(query) = classification.get("query") else {
                return Ok(Some(Outcome::read(DispatchResult::reply(
                    label,
                    "What should I search your notes for?",
                ))));
            };
            let notes = store.search_notes(user, ws, query).await?;
            note_list_reply(label, &notes, &format!("notes matching \"{query}\""))
        }
        IntentKind::ShowNote => {
            let Some(title) = classification.get("title") else {
                return Ok(Some(Outcome::read(DispatchResult::reply(
                    label,
                    "Which note would you like to see?",
                ))));
            };
            match store.search_notes(user, ws, title).await?.into_iter().next() {
                Some(note) => Outcome::read(
                    DispatchResult::reply(label, format!("{}\n\n{}", note.title, note.body))
                        .with_data(serde_json::json!({ "note": note })),
                ),
                None => Outcome::read(DispatchResult::reply(
                    label,
                    format!("I couldn't find a note matching \"{title}\"."),
                )),
            }
        }

        // ── Workspace / reminder reads ──
        IntentKind::ListWorkspaces => {
            let workspaces = store.list_workspaces(user).await?;
            let lines: Vec<String> = workspaces
                .iter()
                .map(|w| {
                    if w.id == ws {
                        format!("{} (current)", w.name)
                    } else {
                        w.name.clone()
                    }
                })
                .collect();
            Outcome::read(
                DispatchResult::reply(
                    label,
                    format!("Your workspaces:\n{}", bullet_list(&lines)),
                )
                .with_data(serde_json::json!({ "workspaces": workspaces })),
            )
        }
        IntentKind::ShowCurrentWorkspace => {
            let workspace = store.get_workspace(ws).await?;
            Outcome::read(
                DispatchResult::reply(
                    label,
                    format!("You're in the \"{}\" workspace.", workspace.name),
                )
                .with_data(serde_json::json!({ "workspace": workspace })),
            )
        }
        IntentKind::ListReminders => {
            let reminders = store.upcoming_reminders(user, ws).await?;
            if reminders.is_empty() {
                Outcome::read(DispatchResult::reply(label, "No upcoming reminders."))
            } else {
                let lines: Vec<String> = reminders
                    .iter()
                    .map(|r| format!("{} — {}", r.label, r.at.format("%a %H:%M")))
                    .collect();
                Outcome::read(
                    DispatchResult::reply(
                        label,
                        format!("Upcoming reminders:\n{}", bullet_list(&lines)),
                    )
                    .with_data(serde_json::json!({ "reminders": reminders })),
                )
            }
        }

        // ── Creation (name already resolved by the dispatcher) ──
        IntentKind::CreateTask => {
            let Some(title) = classification.get("title") else {
                return Ok(None);
            };
            create_entity(store, ws, EntityKind::Task, title).await?
        }
        IntentKind::CreateHabit => {
            let Some(name) = classification.get("name") else {
                return Ok(None);
            };
            create_entity(store, ws, EntityKind::Habit, name).await?
        }
        IntentKind::CreateNote => {
            let Some(title) = classification.get("title") else {
                return Ok(None);
            };
            create_entity(store, ws, EntityKind::Note, title).await?
        }
        IntentKind::CreateWorkspace | IntentKind::CreateReminder => {
            // Not exposed through the chat store surface.
            Outcome::read(DispatchResult::reply(
                label,
                "I can't create those from chat yet — the sidebar has a button for it.",
            ))
        }

        // ── Updates the store exposes ──
        IntentKind::CompleteTask => {
            let Some(title) = classification.get("title") else {
                return Ok(Some(Outcome::read(DispatchResult::reply(
                    label,
                    "Which task should I mark as done?",
                ))));
            };
            match store.find_task_by_title(user, ws, title).await? {
                Some(task) => {
                    let completed = store.complete_task(&task.id).await?;
                    Outcome::mutated(
                        DispatchResult::reply(
                            label,
                            format!("Done — \"{}\" is complete.", completed.title),
                        )
                        .with_action(ActionDescriptor::new(
                            "complete_task",
                            serde_json::json!({ "task_id": completed.id }),
                        )),
                        "tasks",
                        BroadcastEvent::new(
                            "task.completed",
                            serde_json::json!({ "task_id": completed.id }),
                        ),
                    )
                }
                None => Outcome::read(DispatchResult::reply(
                    label,
                    format!("I couldn't find an open task called \"{title}\"."),
                )),
            }
        }
        IntentKind::CheckInHabit => {
            let Some(name) = classification.get("name") else {
                return Ok(Some(Outcome::read(DispatchResult::reply(
                    label,
                    "Which habit should I check in?",
                ))));
            };
            let habits = store.list_habits(user, ws).await?;
            match habits
                .iter()
                .find(|h| h.name.eq_ignore_ascii_case(name.trim()))
            {
                Some(habit) => {
                    let updated = store.check_in_habit(&habit.id).await?;
                    Outcome::mutated(
                        DispatchResult::reply(
                            label,
                            format!(
                                "Checked in \"{}\" — that's a {} day streak.",
                                updated.name, updated.streak
                            ),
                        ),
                        "habits",
                        BroadcastEvent::new(
                            "habit.checked_in",
                            serde_json::json!({ "habit_id": updated.id }),
                        ),
                    )
                }
                None => Outcome::read(DispatchResult::reply(
                    label,
                    format!("You're not tracking a habit called \"{name}\"."),
                )),
            }
        }

        // ── Singular task delete ──
        IntentKind::DeleteTask => {
            let Some(title) = classification.get("title") else {
                return Ok(Some(Outcome::read(DispatchResult::reply(
                    label,
                    "Which task should I delete?",
                ))));
            };
            if store.delete_task_by_title(user, ws, title).await? {
                Outcome::mutated(
                    DispatchResult::reply(label, format!("Deleted task \"{title}\".")),
                    "tasks",
                    BroadcastEvent::new("task.deleted", serde_json::json!({ "title": title })),
                )
            } else {
                Outcome::read(DispatchResult::reply(
                    label,
                    format!("I couldn't find a task called \"{title}\"."),
                ))
            }
        }

        // ── Bulk complete (batch, but not destructive) ──
        IntentKind::CompleteAllTasks => {
            let open = store
                .list_tasks(
                    user,
                    ws,
                    &TaskFilter {
                        completed: Some(false),
                        ..Default::default()
                    },
                )
                .await?;
            let mut count = 0u64;
            for task in &open {
                store.complete_task(&task.id).await?;
                count += 1;
            }
            Outcome::mutated(
                DispatchResult::reply(label, format!("Completed {count} tasks."))
                    .with_data(serde_json::json!({ "count": count })),
                "tasks",
                BroadcastEvent::new(
                    "tasks.bulk_completed",
                    serde_json::json!({ "count": count }),
                ),
            )
        }

        // ── Small talk ──
        IntentKind::Greeting => Outcome::read(DispatchResult::reply(
            label,
            "Hi! I can manage your tasks, habits, and notes. What would you like to do?",
        )),
        IntentKind::Help => Outcome::read(DispatchResult::reply(
            label,
            "I can list, add, complete, and delete tasks; track habits; take and search notes; \
             and summarize how your week is going. Try \"show my tasks\" or \"add a task called \
             water the plants\".",
        )),
        IntentKind::Thanks => {
            Outcome::read(DispatchResult::reply(label, "You're welcome!"))
        }
        IntentKind::Goodbye => {
            Outcome::read(DispatchResult::reply(label, "See you later!"))
        }

        // Everything else has no direct handler.
        _ => return Ok(None),
    };

    Ok(Some(outcome))
}

/// Create a task, habit, or note in the given workspace.
///
/// Shared by the plain creation path, the entity-details follow-up, and
/// explicit-choice resolution (which may target a non-active workspace).
pub async fn create_entity(
    store: &dyn DocumentStore,
    workspace_id: &str,
    kind: EntityKind,
    name: &str,
) -> Result<Outcome, StoreError> {
    let label = format!("create_{kind}");
    match kind {
        EntityKind::Task => {
            let task = store
                .create_task(TaskRecord {
                    id: Uuid::new_v4().to_string(),
                    workspace_id: workspace_id.to_string(),
                    title: name.to_string(),
                    due_date: None,
                    priority: None,
                    completed: false,
                    created_at: Utc::now(),
                })
                .await?;
            Ok(Outcome::mutated(
                DispatchResult::reply(label, format!("Added task \"{}\".", task.title))
                    .with_action(ActionDescriptor::new(
                        "create_task",
                        serde_json::json!({ "task_id": task.id }),
                    )),
                "tasks",
                BroadcastEvent::new("task.created", serde_json::json!({ "task_id": task.id })),
            ))
        }
        EntityKind::Habit => {
            let habit = store
                .create_habit(HabitRecord {
                    id: Uuid::new_v4().to_string(),
                    workspace_id: workspace_id.to_string(),
                    name: name.to_string(),
                    streak: 0,
                    checked_in_today: false,
                })
                .await?;
            Ok(Outcome::mutated(
                DispatchResult::reply(
                    label,
                    format!("Started tracking \"{}\". Good luck!", habit.name),
                ),
                "habits",
                BroadcastEvent::new(
                    "habit.created",
                    serde_json::json!({ "habit_id": habit.id }),
                ),
            ))
        }
        EntityKind::Note => {
            let note = store
                .create_note(NoteRecord {
                    id: Uuid::new_v4().to_string(),
                    workspace_id: workspace_id.to_string(),
                    title: name.to_string(),
                    body: String::new(),
                    created_at: Utc::now(),
                })
                .await?;
            Ok(Outcome::mutated(
                DispatchResult::reply(label, format!("Created note \"{}\".", note.title)),
                "notes",
                BroadcastEvent::new("note.created", serde_json::json!({ "note_id": note.id })),
            ))
        }
        EntityKind::Workspace => Ok(Outcome::read(DispatchResult::reply(
            label,
            "Workspaces can't be created from chat — use the workspace switcher.",
        ))),
    }
}

fn task_list_reply(label: &str, tasks: &[TaskRecord], what: &str) -> Outcome {
    if tasks.is_empty() {
        return Outcome::read(DispatchResult::reply(label, format!("No {what}.")));
    }
    let titles: Vec<String> = tasks.iter().map(|t| t.title.clone()).collect();
    Outcome::read(
        DispatchResult::reply(
            label,
            format!("You have {} {what}:\n{}", tasks.len(), bullet_list(&titles)),
        )
        .with_data(serde_json::json!({ "tasks": titles, "count": tasks.len() })),
    )
}

fn note_list_reply(label: &str, notes: &[NoteRecord], what: &str) -> Outcome {
    if notes.is_empty() {
        return Outcome::read(DispatchResult::reply(label, format!("No {what}.")));
    }
    let titles: Vec<String> = notes.iter().map(|n| n.title.clone()).collect();
    Outcome::read(
        DispatchResult::reply(
            label,
            format!("{} {what}:\n{}", notes.len(), bullet_list(&titles)),
        )
        .with_data(serde_json::json!({ "notes": titles, "count": notes.len() })),
    )
}
