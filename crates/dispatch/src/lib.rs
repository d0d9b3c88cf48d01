//! # Taskweave Dispatch
//!
//! The request dispatcher — one inbound chat message in, exactly one
//! [`DispatchResult`](taskweave_core::DispatchResult) out.
//!
//! A turn walks a fixed pipeline:
//!
//! 1. Pending dialog state first. While a confirmation, explicit choice, or
//!    entity-details step is in flight, the raw text answers *that* question
//!    and is never re-classified as a fresh command.
//! 2. Deterministic classification. Pattern-table intents run through direct
//!    handlers without touching the model.
//! 3. Guarded flows. Creations check workspace ambiguity; bulk-destructive
//!    intents always round-trip through a confirmation.
//! 4. The model path. Everything that needs synthesis goes through the
//!    gateway with tiered context, and terminal failures degrade to typed,
//!    intent-aware fallback replies.
//!
//! Turns for the same session are serialized by a per-key mutex; different
//! sessions never contend.

pub mod dispatcher;
pub mod handlers;
pub mod prompt;

pub use dispatcher::Dispatcher;
pub use handlers::Outcome;
