//! The dispatcher — one inbound message, one result.
//!
//! Pending dialog state always wins: while a confirmation, explicit choice,
//! or entity-details step is in flight, the inbound text answers that
//! question and is never re-classified. Only an Idle session reaches the
//! classifier.
//!
//! Per-session turns are serialized by a keyed mutex so two racing messages
//! from the same user cannot interleave a confirmation flow. Model failures
//! never escape as errors; they degrade to typed fallback replies.

use std::collections::{HashMap, HashSet};
use std::sync::{Arc, Mutex as StdMutex};
use tokio::sync::Mutex as AsyncMutex;
use tracing::{debug, info, warn};

use taskweave_config::AppConfig;
use taskweave_context::{ContextCache, ContextTier, detect_workspace_ambiguity};
use taskweave_conversation::{
    ChoiceOption, ConfirmationReply, ConfirmationVocab, ConversationPhase, ConversationState,
    ConversationStore,
};
use taskweave_core::dispatch::{DispatchErrorKind, DispatchResult};
use taskweave_core::error::GatewayError;
use taskweave_core::key::SessionKey;
use taskweave_core::kv::KeyValueCache;
use taskweave_core::model::ModelEndpoint;
use taskweave_core::realtime::{BroadcastEvent, RealtimeTransport};
use taskweave_core::store::{DocumentStore, EntityKind, TaskFilter};
use taskweave_core::Result;
use taskweave_gateway::{ModelGateway, StructuredReply, fallback_reply};
use taskweave_intent::{IntentClassification, IntentClassifier, IntentGroup, IntentKind};

use crate::handlers::{self, Outcome};
use crate::prompt;

const CHOICE_OPTION_CURRENT: &str = "current";

/// The request dispatcher. One instance serves every session.
pub struct Dispatcher {
    classifier: IntentClassifier,
    vocab: ConfirmationVocab,
    conversations: ConversationStore,
    context: ContextCache,
    gateway: ModelGateway,
    store: Arc<dyn DocumentStore>,
    realtime: Arc<dyn RealtimeTransport>,
    max_reprompts: u32,
    locks: StdMutex<HashMap<SessionKey, Arc<AsyncMutex<()>>>>,
}

impl Dispatcher {
    pub fn new(
        store: Arc<dyn DocumentStore>,
        kv: Arc<dyn KeyValueCache>,
        endpoint: Arc<dyn ModelEndpoint>,
        realtime: Arc<dyn RealtimeTransport>,
        config: &AppConfig,
    ) -> Self {
        Self {
            classifier: IntentClassifier::new(),
            vocab: ConfirmationVocab::new(),
            conversations: ConversationStore::new(kv, config.conversation.state_ttl()),
            context: ContextCache::new(
                store.clone(),
                config.context.snapshot_ttl(),
                config.context.preload_threshold,
            ),
            gateway: ModelGateway::new(endpoint, &config.gateway),
            store,
            realtime,
            max_reprompts: config.conversation.max_reprompts,
            locks: StdMutex::new(HashMap::new()),
        }
    }

    /// Dispatch one inbound message for a session.
    pub async fn dispatch(&self, key: &SessionKey, text: &str) -> Result<DispatchResult> {
        let lock = self.session_lock(key);
        let _turn = lock.lock().await;

        let state = self.conversations.load(key).await?;
        match state.phase {
            ConversationPhase::AwaitingConfirmation {
                action,
                metadata,
                reprompts,
            } => {
                self.continue_confirmation(key, text, action, metadata, reprompts)
                    .await
            }
            ConversationPhase::AwaitingExplicitChoice {
                question,
                options,
                original_intent,
                ..
            } => {
                self.continue_choice(key, text, question, options, original_intent)
                    .await
            }
            ConversationPhase::AwaitingEntityDetails { entity_kind, step } => {
                self.continue_entity_details(key, text, entity_kind, step)
                    .await
            }
            ConversationPhase::Idle => self.dispatch_idle(key, text).await,
        }
    }

    /// Resolve a pending explicit choice by option id (the client's
    /// structured path; free text goes through [`dispatch`](Self::dispatch)).
    pub async fn resolve_choice(
        &self,
        key: &SessionKey,
        option_id: &str,
    ) -> Result<DispatchResult> {
        let lock = self.session_lock(key);
        let _turn = lock.lock().await;

        let state = self.conversations.load(key).await?;
        let ConversationPhase::AwaitingExplicitChoice {
            question,
            options,
            original_intent,
            ..
        } = state.phase
        else {
            return Ok(DispatchResult::reply(
                "unknown",
                "There's nothing waiting on a choice right now.",
            ));
        };

        match options.iter().find(|o| o.id == option_id) {
            Some(option) => {
                let option = option.clone();
                self.apply_choice(key, &option, &original_intent).await
            }
            None => Ok(reprompt_choice(&question, &options, &original_intent)),
        }
    }

    // ── Pending-state continuations ───────────────────────────────────

    async fn continue_confirmation(
        &self,
        key: &SessionKey,
        text: &str,
        action: String,
        metadata: serde_json::Value,
        reprompts: u32,
    ) -> Result<DispatchResult> {
        match self.vocab.parse(text) {
            ConfirmationReply::Affirmative => {
                self.conversations.clear(key).await?;
                self.execute_confirmed(key, &action).await
            }
            ConfirmationReply::Negative => {
                info!(session = %key, action = %action, "Confirmation declined");
                self.conversations.clear(key).await?;
                Ok(DispatchResult::reply(
                    action,
                    "Cancelled — nothing was deleted.",
                ))
            }
            ConfirmationReply::Ambiguous => {
                let attempts = reprompts + 1;
                if attempts >= self.max_reprompts {
                    info!(session = %key, action = %action, "Confirmation auto-cancelled after repeated ambiguity");
                    self.conversations.clear(key).await?;
                    return Ok(DispatchResult::reply(
                        action,
                        "I'll take that as a no — cancelled. Ask again if you change your mind.",
                    ));
                }
                let state = ConversationState::entering(ConversationPhase::AwaitingConfirmation {
                    action: action.clone(),
                    metadata,
                    reprompts: attempts,
                });
                self.conversations.save(key, &state).await?;
                Ok(DispatchResult::reply(
                    action,
                    "Sorry, I need a clear yes or no. Should I go ahead?",
                )
                .confirming())
            }
        }
    }

    async fn execute_confirmed(&self, key: &SessionKey, action: &str) -> Result<DispatchResult> {
        let user = key.user_id.as_str();
        let ws = key.workspace_id.as_str();

        let (count, noun, field, event) = match action {
            "delete_all_tasks" => (
                self.store.delete_tasks(user, ws, &TaskFilter::default()).await?,
                "tasks",
                "tasks",
                "tasks.bulk_deleted",
            ),
            "delete_completed_tasks" => (
                self.store
                    .delete_tasks(
                        user,
                        ws,
                        &TaskFilter {
                            completed: Some(true),
                            ..Default::default()
                        },
                    )
                    .await?,
                "completed tasks",
                "tasks",
                "tasks.bulk_deleted",
            ),
            "delete_all_habits" => (
                self.store.delete_habits(user, ws).await?,
                "habits",
                "habits",
                "habits.bulk_deleted",
            ),
            "delete_all_notes" => (
                self.store.delete_notes(user, ws).await?,
                "notes",
                "notes",
                "notes.bulk_deleted",
            ),
            other => {
                warn!(session = %key, action = %other, "Confirmed action has no executor");
                return Ok(DispatchResult::failed(
                    other.to_string(),
                    "I lost track of what I was confirming. Please ask again.",
                    DispatchErrorKind::UnhandledIntent,
                ));
            }
        };

        info!(session = %key, action, count, "Bulk action executed");
        self.refresh_and_broadcast(
            key,
            HashSet::from([field.to_string()]),
            Some(BroadcastEvent::new(event, serde_json::json!({ "count": count }))),
        )
        .await;

        Ok(
            DispatchResult::reply(action.to_string(), format!("Deleted {count} {noun}."))
                .with_data(serde_json::json!({ "count": count })),
        )
    }

    async fn continue_choice(
        &self,
        key: &SessionKey,
        text: &str,
        question: String,
        options: Vec<ChoiceOption>,
        original_intent: IntentClassification,
    ) -> Result<DispatchResult> {
        // Filler first: "yes", "no", "the first one" pick nothing and must
        // be re-prompted, never guessed. A bare "no" is filler here, not a
        // cancellation.
        if self.vocab.is_ambiguous_filler(text) {
            let state = ConversationState::entering(ConversationPhase::AwaitingExplicitChoice {
                question: question.clone(),
                options: options.clone(),
                original_intent: original_intent.clone(),
                context_data: serde_json::Value::Null,
            });
            self.conversations.save(key, &state).await?;
            return Ok(reprompt_choice(&question, &options, &original_intent));
        }

        // Only an unambiguous abandon ("cancel", "never mind") ends the
        // choice.
        if self.vocab.parse(text) == ConfirmationReply::Negative {
            self.conversations.clear(key).await?;
            return Ok(DispatchResult::reply(
                original_intent.kind.label(),
                "Okay, cancelled.",
            ));
        }

        // Free text resolves the choice only when it is an option id; labels
        // and anything else re-prompt.
        let normalized = text.trim().to_lowercase();
        let matched = options
            .iter()
            .find(|o| o.id.to_lowercase() == normalized)
            .cloned();

        match matched {
            Some(option) => self.apply_choice(key, &option, &original_intent).await,
            None => {
                let state =
                    ConversationState::entering(ConversationPhase::AwaitingExplicitChoice {
                        question: question.clone(),
                        options: options.clone(),
                        original_intent: original_intent.clone(),
                        context_data: serde_json::Value::Null,
                    });
                self.conversations.save(key, &state).await?;
                Ok(reprompt_choice(&question, &options, &original_intent))
            }
        }
    }

    async fn apply_choice(
        &self,
        key: &SessionKey,
        option: &ChoiceOption,
        original_intent: &IntentClassification,
    ) -> Result<DispatchResult> {
        self.conversations.clear(key).await?;

        let Some((entity_kind, name)) = creation_subject(original_intent) else {
            return Ok(DispatchResult::failed(
                original_intent.kind.label(),
                "I lost track of the original request. Please ask again.",
                DispatchErrorKind::UnhandledIntent,
            ));
        };

        let workspace_id = option
            .payload
            .get("workspace_id")
            .and_then(|v| v.as_str())
            .unwrap_or(key.workspace_id.as_str())
            .to_string();

        debug!(session = %key, workspace = %workspace_id, "Choice resolved, resuming creation");
        let outcome =
            handlers::create_entity(&*self.store, &workspace_id, entity_kind, &name).await?;
        Ok(self.finish(key, outcome).await)
    }

    async fn continue_entity_details(
        &self,
        key: &SessionKey,
        text: &str,
        entity_kind: EntityKind,
        step: String,
    ) -> Result<DispatchResult> {
        if self.vocab.parse(text) == ConfirmationReply::Negative {
            self.conversations.clear(key).await?;
            return Ok(DispatchResult::reply(
                format!("create_{entity_kind}"),
                "Okay, cancelled.",
            ));
        }

        let value = text.trim();
        if value.is_empty() {
            let state = ConversationState::entering(ConversationPhase::AwaitingEntityDetails {
                entity_kind,
                step: step.clone(),
            });
            self.conversations.save(key, &state).await?;
            return Ok(DispatchResult::reply(
                format!("create_{entity_kind}"),
                format!("I still need a {step} for the {entity_kind}."),
            ));
        }

        self.conversations.clear(key).await?;
        let outcome =
            handlers::create_entity(&*self.store, &key.workspace_id, entity_kind, value).await?;
        Ok(self.finish(key, outcome).await)
    }

    // ── Idle dispatch ─────────────────────────────────────────────────

    async fn dispatch_idle(&self, key: &SessionKey, text: &str) -> Result<DispatchResult> {
        let classification = self.classifier.classify(text);
        debug!(
            session = %key,
            intent = classification.kind.label(),
            confidence = classification.confidence,
            requires_model = classification.requires_model,
            "Classified inbound message"
        );

        if classification.kind.is_creation() {
            return self.start_creation(key, classification).await;
        }
        if classification.kind.is_bulk_destructive() {
            return self.start_bulk_confirmation(key, classification).await;
        }
        if !classification.requires_model {
            if let Some(outcome) = handlers::run(&*self.store, key, &classification).await? {
                return Ok(self.finish(key, outcome).await);
            }
            return Ok(DispatchResult::failed(
                classification.kind.label(),
                "I understood what you want, but I can't do that from chat yet.",
                DispatchErrorKind::UnhandledIntent,
            ));
        }

        self.model_turn(key, &classification, text).await
    }

    async fn start_creation(
        &self,
        key: &SessionKey,
        classification: IntentClassification,
    ) -> Result<DispatchResult> {
        let Some((entity_kind, name)) = creation_subject(&classification) else {
            // Workspace/reminder creation and nameless requests without a
            // collectible field fall through to the handler table.
            if matches!(
                classification.kind,
                IntentKind::CreateWorkspace | IntentKind::CreateReminder
            ) {
                if let Some(outcome) = handlers::run(&*self.store, key, &classification).await? {
                    return Ok(self.finish(key, outcome).await);
                }
            }
            // Missing name: collect it on the next turn.
            let entity_kind = match classification.kind {
                IntentKind::CreateHabit => EntityKind::Habit,
                IntentKind::CreateNote => EntityKind::Note,
                _ => EntityKind::Task,
            };
            let step = name_field(entity_kind).to_string();
            let state = ConversationState::entering(ConversationPhase::AwaitingEntityDetails {
                entity_kind,
                step: step.clone(),
            });
            self.conversations.save(key, &state).await?;
            return Ok(DispatchResult::reply(
                classification.kind.label(),
                format!("Sure — what should the {entity_kind} be called?"),
            ));
        };

        // A workspace mention that matches somewhere other than the active
        // workspace needs an explicit pick before anything is created.
        if let Some(mention) = classification.get("workspace") {
            if let Some(ambiguity) = detect_workspace_ambiguity(
                &*self.store,
                &key.user_id,
                &key.workspace_id,
                mention,
            )
            .await?
            {
                let mut options: Vec<ChoiceOption> = ambiguity
                    .candidates
                    .iter()
                    .map(|w| {
                        ChoiceOption::new(
                            w.id.clone(),
                            w.name.clone(),
                            serde_json::json!({ "workspace_id": w.id }),
                        )
                    })
                    .collect();
                options.push(ChoiceOption::new(
                    CHOICE_OPTION_CURRENT,
                    "Current workspace",
                    serde_json::json!({ "workspace_id": key.workspace_id }),
                ));

                let state =
                    ConversationState::entering(ConversationPhase::AwaitingExplicitChoice {
                        question: ambiguity.question.clone(),
                        options: options.clone(),
                        original_intent: classification.clone(),
                        context_data: serde_json::Value::Null,
                    });
                self.conversations.save(key, &state).await?;
                return Ok(reprompt_choice(
                    &ambiguity.question,
                    &options,
                    &classification,
                ));
            }
        }

        let outcome =
            handlers::create_entity(&*self.store, &key.workspace_id, entity_kind, &name).await?;
        Ok(self.finish(key, outcome).await)
    }

    async fn start_bulk_confirmation(
        &self,
        key: &SessionKey,
        classification: IntentClassification,
    ) -> Result<DispatchResult> {
        let user = key.user_id.as_str();
        let ws = key.workspace_id.as_str();

        let (count, noun) = match classification.kind {
            IntentKind::DeleteAllTasks => (
                self.store.count_tasks(user, ws, &TaskFilter::default()).await?,
                "tasks",
            ),
            IntentKind::DeleteCompletedTasks => (
                self.store
                    .count_tasks(
                        user,
                        ws,
                        &TaskFilter {
                            completed: Some(true),
                            ..Default::default()
                        },
                    )
                    .await?,
                "completed tasks",
            ),
            IntentKind::DeleteAllHabits => (self.store.count_habits(user, ws).await?, "habits"),
            IntentKind::DeleteAllNotes => (self.store.count_notes(user, ws).await?, "notes"),
            _ => unreachable!("caller checked is_bulk_destructive"),
        };

        let label = classification.kind.label();
        if count == 0 {
            return Ok(DispatchResult::reply(
                label,
                format!("You don't have any {noun} to delete."),
            ));
        }

        let state = ConversationState::entering(ConversationPhase::AwaitingConfirmation {
            action: label.to_string(),
            metadata: serde_json::json!({ "count": count }),
            reprompts: 0,
        });
        self.conversations.save(key, &state).await?;

        Ok(DispatchResult::reply(
            label,
            format!("This will permanently delete {count} {noun}. Are you sure?"),
        )
        .with_data(serde_json::json!({ "count": count }))
        .confirming())
    }

    // ── The model path ────────────────────────────────────────────────

    async fn model_turn(
        &self,
        key: &SessionKey,
        classification: &IntentClassification,
        text: &str,
    ) -> Result<DispatchResult> {
        let tier = match classification.kind.group() {
            IntentGroup::Analytics => ContextTier::Low,
            _ => ContextTier::High,
        };
        let snapshot = self.context.get(key, tier).await?;
        let prompt = prompt::build_prompt(classification, &snapshot, text);

        let label = classification.kind.label();
        match self.gateway.invoke(&prompt).await {
            Ok(structured) => Ok(self.apply_model_reply(key, label, structured).await),
            Err(e) => {
                warn!(session = %key, intent = label, error = %e, "Model turn failed, using fallback");
                Ok(DispatchResult::failed(
                    label,
                    fallback_reply(classification.kind.group(), &e),
                    error_kind(&e),
                ))
            }
        }
    }

    async fn apply_model_reply(
        &self,
        key: &SessionKey,
        label: &str,
        structured: StructuredReply,
    ) -> DispatchResult {
        let mut result = DispatchResult::reply(label, structured.reply);
        if let Some(data) = structured.data {
            result = result.with_data(data);
        }

        let Some(action) = structured.action else {
            return result;
        };

        // A model-requested confirmation parks the action instead of
        // executing it.
        if structured.requires_confirmation {
            let state = ConversationState::entering(ConversationPhase::AwaitingConfirmation {
                action: action.name.clone(),
                metadata: action.params.clone(),
                reprompts: 0,
            });
            if let Err(e) = self.conversations.save(key, &state).await {
                warn!(session = %key, error = %e, "Failed to park model action for confirmation");
            }
            return result.with_action(action).confirming();
        }

        match self.execute_model_action(key, &action.name, &action.params).await {
            Ok(Some(outcome)) => {
                self.refresh_and_broadcast(key, outcome.changed, outcome.event)
                    .await;
                result.with_action(action)
            }
            Ok(None) => {
                warn!(session = %key, action = %action.name, "Model asked for an unknown action, skipping");
                result
            }
            Err(e) => {
                warn!(session = %key, action = %action.name, error = %e, "Model action failed");
                DispatchResult::failed(
                    label,
                    "I couldn't finish that — the item wasn't saved. Please try again.",
                    DispatchErrorKind::MalformedResponse,
                )
            }
        }
    }

    /// Execute a side effect named by the model. Unknown names are `None`.
    async fn execute_model_action(
        &self,
        key: &SessionKey,
        name: &str,
        params: &serde_json::Value,
    ) -> std::result::Result<Option<Outcome>, taskweave_core::StoreError> {
        let subject = params
            .get("title")
            .or_else(|| params.get("name"))
            .and_then(|v| v.as_str())
            .unwrap_or_default();

        let kind = match name {
            "create_task" => EntityKind::Task,
            "create_habit" => EntityKind::Habit,
            "create_note" => EntityKind::Note,
            "complete_task" => {
                let found = self
                    .store
                    .find_task_by_title(&key.user_id, &key.workspace_id, subject)
                    .await?;
                let Some(task) = found else {
                    return Ok(None);
                };
                let completed = self.store.complete_task(&task.id).await?;
                return Ok(Some(Outcome {
                    result: DispatchResult::reply("complete_task", ""),
                    changed: HashSet::from(["tasks".to_string()]),
                    event: Some(BroadcastEvent::new(
                        "task.completed",
                        serde_json::json!({ "task_id": completed.id }),
                    )),
                }));
            }
            _ => return Ok(None),
        };

        if subject.is_empty() {
            return Ok(None);
        }
        let outcome =
            handlers::create_entity(&*self.store, &key.workspace_id, kind, subject).await?;
        Ok(Some(outcome))
    }

    // ── Shared plumbing ───────────────────────────────────────────────

    /// Apply an outcome's side effects (context refresh, broadcast) and
    /// return its result.
    async fn finish(&self, key: &SessionKey, outcome: Outcome) -> DispatchResult {
        self.refresh_and_broadcast(key, outcome.changed, outcome.event)
            .await;
        outcome.result
    }

    /// Best-effort: a failed context refresh must not eat a reply for a
    /// mutation that already happened.
    async fn refresh_and_broadcast(
        &self,
        key: &SessionKey,
        changed: HashSet<String>,
        event: Option<BroadcastEvent>,
    ) {
        if !changed.is_empty() {
            if let Err(e) = self.context.update(key, &changed).await {
                warn!(session = %key, error = %e, "Context refresh failed after mutation");
            }
        }
        if let Some(event) = event {
            self.realtime.broadcast(key, event).await;
        }
    }

    fn session_lock(&self, key: &SessionKey) -> Arc<AsyncMutex<()>> {
        let mut locks = self.locks.lock().expect("session lock map poisoned");
        if locks.len() >= SESSION_LOCK_SWEEP_AT {
            sweep_idle_locks(&mut locks);
        }
        locks
            .entry(key.clone())
            .or_insert_with(|| Arc::new(AsyncMutex::new(())))
            .clone()
    }
}

/// Sweep the lock map once it reaches this size.
const SESSION_LOCK_SWEEP_AT: usize = 256;

/// Drop locks no turn currently holds; the map only references idle locks
/// once, so a higher count means a turn is in flight.
fn sweep_idle_locks(locks: &mut HashMap<SessionKey, Arc<AsyncMutex<()>>>) {
    locks.retain(|_, lock| Arc::strong_count(lock) > 1);
}

/// The entity kind and name of a creation intent, when the name is present.
fn creation_subject(classification: &IntentClassification) -> Option<(EntityKind, String)> {
    let (kind, field) = match classification.kind {
        IntentKind::CreateTask => (EntityKind::Task, "title"),
        IntentKind::CreateHabit => (EntityKind::Habit, "name"),
        IntentKind::CreateNote => (EntityKind::Note, "title"),
        _ => return None,
    };
    classification
        .get(field)
        .filter(|v| !v.trim().is_empty())
        .map(|v| (kind, v.to_string()))
}

fn name_field(kind: EntityKind) -> &'static str {
    match kind {
        EntityKind::Habit => "name",
        _ => "title",
    }
}

fn reprompt_choice(
    question: &str,
    options: &[ChoiceOption],
    original_intent: &IntentClassification,
) -> DispatchResult {
    let listed: Vec<String> = options.iter().map(|o| o.label.clone()).collect();
    DispatchResult::reply(
        original_intent.kind.label(),
        format!("{question} ({})", listed.join(" / ")),
    )
    .with_data(serde_json::json!({
        "options": options
            .iter()
            .map(|o| serde_json::json!({ "id": o.id, "label": o.label }))
            .collect::<Vec<_>>()
    }))
}

fn error_kind(e: &GatewayError) -> DispatchErrorKind {
    match e {
        GatewayError::RateLimited { .. } => DispatchErrorKind::RateLimited,
        GatewayError::AuthFailed(_) => DispatchErrorKind::AuthError,
        GatewayError::MalformedResponse(_) => DispatchErrorKind::MalformedResponse,
        GatewayError::CircuitOpen => DispatchErrorKind::CircuitOpen,
        _ => DispatchErrorKind::ServiceOverloaded,
    }
}
