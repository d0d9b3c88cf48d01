//! # Taskweave Intent
//!
//! Deterministic intent classification: maps raw user text to a typed
//! intent, a confidence score, and extracted parameters. Pure functions,
//! no I/O, no randomness — the classifier can never fail a turn.
//!
//! The pattern table is *ordered*: more specific / scoped patterns precede
//! general ones (bulk "delete all tasks" before singular "delete task ..."),
//! and that ordering is load-bearing. See `classifier::table_order` tests.

pub mod classifier;
pub mod kind;

pub use classifier::{IntentClassification, IntentClassifier};
pub use kind::{IntentGroup, IntentKind};
