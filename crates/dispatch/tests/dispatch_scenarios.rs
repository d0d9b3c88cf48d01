//! End-to-end dispatch scenarios against in-memory collaborators.

use std::sync::{Arc, Mutex};

use async_trait::async_trait;
use chrono::Utc;

use taskweave_config::AppConfig;
use taskweave_conversation::InMemoryKv;
use taskweave_core::error::{GatewayError, StoreError};
use taskweave_core::key::SessionKey;
use taskweave_core::model::ModelEndpoint;
use taskweave_core::realtime::NoopTransport;
use taskweave_core::store::{
    DocumentStore, HabitRecord, NoteRecord, TaskFilter, TaskRecord, WorkspaceRecord,
};
use taskweave_core::DispatchErrorKind;
use taskweave_dispatch::Dispatcher;

// ── In-memory document store ──────────────────────────────────────────

#[derive(Default)]
struct MemStore {
    workspaces: Vec<WorkspaceRecord>,
    tasks: Mutex<Vec<TaskRecord>>,
    habits: Mutex<Vec<HabitRecord>>,
    notes: Mutex<Vec<NoteRecord>>,
}

impl MemStore {
    fn with_workspaces(pairs: &[(&str, &str)]) -> Self {
        Self {
            workspaces: pairs
                .iter()
                .map(|(id, name)| WorkspaceRecord {
                    id: id.to_string(),
                    name: name.to_string(),
                    owner_id: "u1".into(),
                })
                .collect(),
            ..Default::default()
        }
    }

    fn seed_tasks(&self, titles: &[&str]) {
        let mut tasks = self.tasks.lock().unwrap();
        for (i, title) in titles.iter().enumerate() {
            tasks.push(TaskRecord {
                id: format!("t{i}"),
                workspace_id: "w1".into(),
                title: title.to_string(),
                due_date: None,
                priority: None,
                completed: false,
                created_at: Utc::now(),
            });
        }
    }

    fn task_titles(&self, workspace_id: &str) -> Vec<String> {
        self.tasks
            .lock()
            .unwrap()
            .iter()
            .filter(|t| t.workspace_id == workspace_id)
            .map(|t| t.title.clone())
            .collect()
    }
}

fn task_matches(task: &TaskRecord, filter: &TaskFilter) -> bool {
    if let Some(completed) = filter.completed {
        if task.completed != completed {
            return false;
        }
    }
    if let Some(day) = filter.due_on {
        if task.due_date != Some(day) {
            return false;
        }
    }
    if let Some(before) = filter.due_before {
        match task.due_date {
            Some(d) if d < before => {}
            _ => return false,
        }
    }
    if let Some(after) = filter.created_after {
        if task.created_at <= after {
            return false;
        }
    }
    true
}

#[async_trait]
impl DocumentStore for MemStore {
    async fn list_tasks(
        &self,
        _user_id: &str,
        workspace_id: &str,
        filter: &TaskFilter,
    ) -> Result<Vec<TaskRecord>, StoreError> {
        Ok(self
            .tasks
            .lock()
            .unwrap()
            .iter()
            .filter(|t| t.workspace_id == workspace_id && task_matches(t, filter))
            .cloned()
            .collect())
    }

    async fn create_task(&self, task: TaskRecord) -> Result<TaskRecord, StoreError> {
        self.tasks.lock().unwrap().push(task.clone());
        Ok(task)
    }

    async fn complete_task(&self, task_id: &str) -> Result<TaskRecord, StoreError> {
        let mut tasks = self.tasks.lock().unwrap();
        let task = tasks
            .iter_mut()
            .find(|t| t.id == task_id)
            .ok_or_else(|| StoreError::NotFound(task_id.to_string()))?;
        task.completed = true;
        Ok(task.clone())
    }

    async fn find_task_by_title(
        &self,
        _user_id: &str,
        workspace_id: &str,
        title: &str,
    ) -> Result<Option<TaskRecord>, StoreError> {
        Ok(self
            .tasks
            .lock()
            .unwrap()
            .iter()
            .find(|t| t.workspace_id == workspace_id && t.title.eq_ignore_ascii_case(title))
            .cloned())
    }

    async fn count_tasks(
        &self,
        user_id: &str,
        workspace_id: &str,
        filter: &TaskFilter,
    ) -> Result<u64, StoreError> {
        Ok(self.list_tasks(user_id, workspace_id, filter).await?.len() as u64)
    }

    async fn delete_tasks(
        &self,
        _user_id: &str,
        workspace_id: &str,
        filter: &TaskFilter,
    ) -> Result<u64, StoreError> {
        let mut tasks = self.tasks.lock().unwrap();
        let before = tasks.len();
        tasks.retain(|t| !(t.workspace_id == workspace_id && task_matches(t, filter)));
        Ok((before - tasks.len()) as u64)
    }

    async fn delete_task_by_title(
        &self,
        _user_id: &str,
        workspace_id: &str,
        title: &str,
    ) -> Result<bool, StoreError> {
        let mut tasks = self.tasks.lock().unwrap();
        let before = tasks.len();
        tasks.retain(|t| {
            !(t.workspace_id == workspace_id && t.title.eq_ignore_ascii_case(title))
        });
        Ok(tasks.len() < before)
    }

    async fn list_habits(
        &self,
        _user_id: &str,
        workspace_id: &str,
    ) -> Result<Vec<HabitRecord>, StoreError> {
        Ok(self
            .habits
            .lock()
            .unwrap()
            .iter()
            .filter(|h| h.workspace_id == workspace_id)
            .cloned()
            .collect())
    }

    async fn create_habit(&self, habit: HabitRecord) -> Result<HabitRecord, StoreError> {
        self.habits.lock().unwrap().push(habit.clone());
        Ok(habit)
    }

    async fn check_in_habit(&self, habit_id: &str) -> Result<HabitRecord, StoreError> {
        let mut habits = self.habits.lock().unwrap();
        let habit = habits
            .iter_mut()
            .find(|h| h.id == habit_id)
            .ok_or_else(|| StoreError::NotFound(habit_id.to_string()))?;
        habit.checked_in_today = true;
        habit.streak += 1;
        Ok(habit.clone())
    }

    async fn count_habits(&self, user_id: &str, workspace_id: &str) -> Result<u64, StoreError> {
        Ok(self.list_habits(user_id, workspace_id).await?.len() as u64)
    }

    async fn delete_habits(&self, _user_id: &str, workspace_id: &str) -> Result<u64, StoreError> {
        let mut habits = self.habits.lock().unwrap();
        let before = habits.len();
        habits.retain(|h| h.workspace_id != workspace_id);
        Ok((before - habits.len()) as u64)
    }

    async fn list_notes(
        &self,
        _user_id: &str,
        workspace_id: &str,
        limit: usize,
    ) -> Result<Vec<NoteRecord>, StoreError> {
        Ok(self
            .notes
            .lock()
            .unwrap()
            .iter()
            .filter(|n| n.workspace_id == workspace_id)
            .take(limit)
            .cloned()
            .collect())
    }

    async fn create_note(&self, note: NoteRecord) -> Result<NoteRecord, StoreError> {
        self.notes.lock().unwrap().push(note.clone());
        Ok(note)
    }

    async fn search_notes(
        &self,
        _user_id: &str,
        workspace_id: &str,
        query: &str,
    ) -> Result<Vec<NoteRecord>, StoreError> {
        let needle = query.to_lowercase();
        Ok(self
            .notes
            .lock()
            .unwrap()
            .iter()
            .filter(|n| {
                n.workspace_id == workspace_id
                    && (n.title.to_lowercase().contains(&needle)
                        || n.body.to_lowercase().contains(&needle))
            })
            .cloned()
            .collect())
    }

    async fn count_notes(&self, user_id: &str, workspace_id: &str) -> Result<u64, StoreError> {
        Ok(self.list_notes(user_id, workspace_id, usize::MAX).await?.len() as u64)
    }

    async fn delete_notes(&self, _user_id: &str, workspace_id: &str) -> Result<u64, StoreError> {
        let mut notes = self.notes.lock().unwrap();
        let before = notes.len();
        notes.retain(|n| n.workspace_id != workspace_id);
        Ok((before - notes.len()) as u64)
    }

    async fn get_workspace(&self, workspace_id: &str) -> Result<WorkspaceRecord, StoreError> {
        self.workspaces
            .iter()
            .find(|w| w.id == workspace_id)
            .cloned()
            .ok_or_else(|| StoreError::NotFound(workspace_id.to_string()))
    }

    async fn list_workspaces(&self, user_id: &str) -> Result<Vec<WorkspaceRecord>, StoreError> {
        Ok(self
            .workspaces
            .iter()
            .filter(|w| w.owner_id == user_id)
            .cloned()
            .collect())
    }

    async fn find_workspace_by_name(
        &self,
        user_id: &str,
        name: &str,
    ) -> Result<Option<WorkspaceRecord>, StoreError> {
        Ok(self
            .workspaces
            .iter()
            .find(|w| w.owner_id == user_id && w.name.eq_ignore_ascii_case(name))
            .cloned())
    }
}

// ── Scripted model endpoint ───────────────────────────────────────────

struct ScriptedEndpoint {
    script: Mutex<Vec<Result<String, GatewayError>>>,
    calls: Mutex<usize>,
}

impl ScriptedEndpoint {
    fn new(script: Vec<Result<String, GatewayError>>) -> Self {
        Self {
            script: Mutex::new(script),
            calls: Mutex::new(0),
        }
    }

    fn unused() -> Self {
        Self::new(vec![Err(GatewayError::AuthFailed(
            "endpoint must not be called".into(),
        ))])
    }

    fn call_count(&self) -> usize {
        *self.calls.lock().unwrap()
    }
}

#[async_trait]
impl ModelEndpoint for ScriptedEndpoint {
    fn name(&self) -> &str {
        "scripted"
    }

    async fn complete(&self, _prompt: &str) -> Result<String, GatewayError> {
        *self.calls.lock().unwrap() += 1;
        let mut script = self.script.lock().unwrap();
        // The last entry repeats forever.
        if script.len() > 1 {
            script.remove(0)
        } else {
            script[0].clone()
        }
    }
}

// ── Harness ───────────────────────────────────────────────────────────

fn session() -> SessionKey {
    SessionKey {
        user_id: "u1".into(),
        workspace_id: "w1".into(),
    }
}

fn dispatcher(store: Arc<MemStore>, endpoint: Arc<ScriptedEndpoint>) -> Dispatcher {
    Dispatcher::new(
        store,
        Arc::new(InMemoryKv::new()),
        endpoint,
        Arc::new(NoopTransport),
        &AppConfig::default(),
    )
}

fn single_workspace_store() -> Arc<MemStore> {
    Arc::new(MemStore::with_workspaces(&[("w1", "Personal")]))
}

// ── Scenarios ─────────────────────────────────────────────────────────

#[tokio::test]
async fn bulk_delete_confirms_then_executes() {
    let store = single_workspace_store();
    store.seed_tasks(&["a", "b", "c", "d", "e"]);
    let d = dispatcher(store.clone(), Arc::new(ScriptedEndpoint::unused()));
    let key = session();

    let asked = d.dispatch(&key, "delete all my tasks").await.unwrap();
    assert!(asked.requires_confirmation);
    assert_eq!(asked.intent_label, "delete_all_tasks");
    assert_eq!(asked.data.unwrap()["count"], 5);
    assert_eq!(store.task_titles("w1").len(), 5, "nothing deleted yet");

    let done = d.dispatch(&key, "yes").await.unwrap();
    assert!(done.reply.contains("Deleted 5 tasks"));
    assert!(store.task_titles("w1").is_empty());

    // Nothing left: the next attempt is informational, no confirmation.
    let empty = d.dispatch(&key, "delete all my tasks").await.unwrap();
    assert!(!empty.requires_confirmation);
    assert!(empty.reply.contains("don't have any tasks"));
}

#[tokio::test]
async fn declined_confirmation_deletes_nothing() {
    let store = single_workspace_store();
    store.seed_tasks(&["a", "b"]);
    let d = dispatcher(store.clone(), Arc::new(ScriptedEndpoint::unused()));
    let key = session();

    d.dispatch(&key, "delete all my tasks").await.unwrap();
    let declined = d.dispatch(&key, "no").await.unwrap();
    assert!(declined.reply.contains("nothing was deleted"));
    assert_eq!(store.task_titles("w1").len(), 2);
}

#[tokio::test]
async fn ambiguous_confirmation_reprompts_then_auto_cancels() {
    let store = single_workspace_store();
    store.seed_tasks(&["a", "b", "c"]);
    let d = dispatcher(store.clone(), Arc::new(ScriptedEndpoint::unused()));
    let key = session();

    d.dispatch(&key, "delete all my tasks").await.unwrap();

    // Two ambiguous replies keep the confirmation alive.
    for text in ["hmm", "what do you think?"] {
        let r = d.dispatch(&key, text).await.unwrap();
        assert!(r.requires_confirmation, "reply to {text:?} must re-prompt");
    }

    // The third strike auto-cancels.
    let cancelled = d.dispatch(&key, "eh").await.unwrap();
    assert!(!cancelled.requires_confirmation);
    assert!(cancelled.reply.contains("cancelled"));
    assert_eq!(store.task_titles("w1").len(), 3, "nothing deleted");
}

#[tokio::test]
async fn nameless_creation_collects_the_title() {
    let store = single_workspace_store();
    let d = dispatcher(store.clone(), Arc::new(ScriptedEndpoint::unused()));
    let key = session();

    let ask = d.dispatch(&key, "create a new task").await.unwrap();
    assert!(ask.reply.contains("called"));
    assert!(store.task_titles("w1").is_empty());

    let created = d.dispatch(&key, "buy milk").await.unwrap();
    assert!(created.error.is_none());
    assert_eq!(store.task_titles("w1"), vec!["buy milk".to_string()]);

    // The follow-up turn is back to normal classification.
    let listed = d.dispatch(&key, "show my tasks").await.unwrap();
    assert_eq!(listed.intent_label, "list_tasks");
    assert!(listed.reply.contains("buy milk"));
}

#[tokio::test]
async fn creation_with_inline_name_is_one_turn() {
    let store = single_workspace_store();
    let d = dispatcher(store.clone(), Arc::new(ScriptedEndpoint::unused()));
    let key = session();

    let r = d
        .dispatch(&key, "add a task called file the quarterly report")
        .await
        .unwrap();
    assert!(r.error.is_none());
    assert_eq!(
        store.task_titles("w1"),
        vec!["file the quarterly report".to_string()]
    );
}

#[tokio::test]
async fn deterministic_intents_never_touch_the_model() {
    let store = single_workspace_store();
    store.seed_tasks(&["write tests", "ship release"]);
    let endpoint = Arc::new(ScriptedEndpoint::unused());
    let d = dispatcher(store, endpoint.clone());
    let key = session();

    let r = d.dispatch(&key, "show my tasks").await.unwrap();
    assert_eq!(r.intent_label, "list_tasks");
    assert!(r.reply.contains("write tests"));
    assert_eq!(r.data.unwrap()["count"], 2);
    assert_eq!(endpoint.call_count(), 0);
}

#[tokio::test(start_paused = true)]
async fn model_failure_degrades_to_intent_aware_fallback() {
    let store = single_workspace_store();
    let endpoint = Arc::new(ScriptedEndpoint::new(vec![Err(
        GatewayError::ServiceOverloaded("529".into()),
    )]));
    let d = dispatcher(store, endpoint.clone());
    let key = session();

    let r = d
        .dispatch(&key, "how productive was i this week")
        .await
        .unwrap();
    assert_eq!(r.error, Some(DispatchErrorKind::ServiceOverloaded));
    assert!(r.reply.contains("stats page"), "reply: {}", r.reply);
    // Overload is transient: all attempts were spent before giving up.
    assert_eq!(endpoint.call_count(), 3);
}

#[tokio::test(start_paused = true)]
async fn model_requested_action_is_executed() {
    let store = single_workspace_store();
    let endpoint = Arc::new(ScriptedEndpoint::new(vec![Ok(
        r#"{"reply": "Start with the retro prep.", "action": {"name": "create_task", "params": {"title": "prep the retro"}}}"#
            .to_string(),
    )]));
    let d = dispatcher(store.clone(), endpoint.clone());
    let key = session();

    let r = d.dispatch(&key, "what should i work on").await.unwrap();
    assert!(r.error.is_none());
    assert_eq!(r.action.unwrap().name, "create_task");
    assert_eq!(store.task_titles("w1"), vec!["prep the retro".to_string()]);
    assert_eq!(endpoint.call_count(), 1);
}

#[tokio::test]
async fn workspace_mention_forces_an_explicit_choice() {
    let store = Arc::new(MemStore::with_workspaces(&[
        ("w1", "Personal"),
        ("w2", "Work"),
    ]));
    let d = dispatcher(store.clone(), Arc::new(ScriptedEndpoint::unused()));
    let key = session();

    let asked = d
        .dispatch(&key, "create a task called ship release in the work workspace")
        .await
        .unwrap();
    assert!(asked.reply.contains("Work"), "reply: {}", asked.reply);
    assert!(
        store.task_titles("w1").is_empty() && store.task_titles("w2").is_empty(),
        "nothing created until the choice is resolved"
    );
    let options = asked.data.unwrap()["options"].clone();
    assert!(options.as_array().unwrap().len() >= 2);

    // Structured resolution by option id.
    let resolved = d.resolve_choice(&key, "w2").await.unwrap();
    assert!(resolved.error.is_none());
    assert_eq!(store.task_titles("w2"), vec!["ship release".to_string()]);
    assert!(store.task_titles("w1").is_empty());
}

#[tokio::test]
async fn choice_rejects_filler_and_resolves_only_by_id() {
    let store = Arc::new(MemStore::with_workspaces(&[
        ("w1", "Personal"),
        ("w2", "Work"),
    ]));
    let d = dispatcher(store.clone(), Arc::new(ScriptedEndpoint::unused()));
    let key = session();

    d.dispatch(&key, "create a task called ship release in the work workspace")
        .await
        .unwrap();

    // Filler picks nothing; "no" is filler here, not a cancellation.
    for filler in ["yes", "no", "the first one"] {
        let reprompted = d.dispatch(&key, filler).await.unwrap();
        assert!(
            reprompted.data.unwrap()["options"].is_array(),
            "{filler:?} must re-prompt with the options"
        );
        assert!(store.task_titles("w2").is_empty(), "{filler:?} must not resolve");
    }

    // Label text is free text; it re-prompts instead of resolving.
    let still_pending = d.dispatch(&key, "Work").await.unwrap();
    assert!(still_pending.data.unwrap()["options"].is_array());
    assert!(store.task_titles("w2").is_empty());

    // Only an option id resolves the choice.
    let resolved = d.dispatch(&key, "w2").await.unwrap();
    assert!(resolved.error.is_none());
    assert_eq!(store.task_titles("w2"), vec!["ship release".to_string()]);
}

#[tokio::test]
async fn cancel_abandons_a_pending_choice() {
    let store = Arc::new(MemStore::with_workspaces(&[
        ("w1", "Personal"),
        ("w2", "Work"),
    ]));
    let d = dispatcher(store.clone(), Arc::new(ScriptedEndpoint::unused()));
    let key = session();

    d.dispatch(&key, "create a task called ship release in the work workspace")
        .await
        .unwrap();
    let cancelled = d.dispatch(&key, "cancel").await.unwrap();
    assert!(cancelled.reply.contains("cancelled"));
    assert!(store.task_titles("w1").is_empty() && store.task_titles("w2").is_empty());
}

#[tokio::test]
async fn sessions_do_not_share_dialog_state() {
    let store = Arc::new(MemStore::with_workspaces(&[
        ("w1", "Personal"),
        ("w2", "Work"),
    ]));
    store.seed_tasks(&["a"]);
    let d = dispatcher(store.clone(), Arc::new(ScriptedEndpoint::unused()));
    let alice = session();
    let bob = SessionKey {
        user_id: "u1".into(),
        workspace_id: "w2".into(),
    };

    // Alice is mid-confirmation; Bob's "yes" must not execute her delete.
    d.dispatch(&alice, "delete all my tasks").await.unwrap();
    let bob_reply = d.dispatch(&bob, "yes").await.unwrap();
    assert_ne!(bob_reply.intent_label, "delete_all_tasks");
    assert_eq!(store.task_titles("w1").len(), 1);

    let done = d.dispatch(&alice, "yes").await.unwrap();
    assert!(done.reply.contains("Deleted 1 tasks") || done.reply.contains("Deleted 1"));
    assert!(store.task_titles("w1").is_empty());
}

#[tokio::test]
async fn completing_a_task_mutates_the_store() {
    let store = single_workspace_store();
    store.seed_tasks(&["write tests"]);
    let d = dispatcher(store.clone(), Arc::new(ScriptedEndpoint::unused()));
    let key = session();

    let r = d.dispatch(&key, "complete write tests").await.unwrap();
    assert!(r.error.is_none());
    let tasks = store.tasks.lock().unwrap();
    assert!(tasks[0].completed);
}

#[tokio::test]
async fn unknown_store_operations_fail_typed() {
    let store = single_workspace_store();
    store.seed_tasks(&["a"]);
    let d = dispatcher(store, Arc::new(ScriptedEndpoint::unused()));
    let key = session();

    // Rename has no store operation; the turn fails with a typed kind
    // instead of silently pretending.
    let r = d.dispatch(&key, "rename the task a to b").await.unwrap();
    assert_eq!(r.error, Some(DispatchErrorKind::UnhandledIntent));
    assert!(!r.reply.is_empty());
}
