//! # Taskweave Conversation
//!
//! The per-(user, workspace) dialog state machine and its persistence.
//!
//! A conversation is Idle almost all the time. It leaves Idle only for a
//! multi-step interaction: collecting a missing field, confirming a
//! destructive action, or resolving an explicit choice. Non-Idle states
//! expire after a TTL and are lazily collected on the next load — there is
//! no background sweeper.
//!
//! Confirmation replies ("yes", "cancel") are parsed by a dedicated
//! vocabulary, *not* the main intent table, so a bare "yes" can never be
//! misrouted as an unrelated command.

pub mod in_memory;
pub mod state;
pub mod store;
pub mod vocab;

pub use in_memory::InMemoryKv;
pub use state::{ChoiceOption, ConversationPhase, ConversationState};
pub use store::ConversationStore;
pub use vocab::{ConfirmationReply, ConfirmationVocab};
