//! # Taskweave Core
//!
//! Domain types, collaborator traits, and error definitions for the taskweave
//! request-dispatch core. This crate has **zero framework dependencies** — it
//! defines the domain model that all other crates implement against.
//!
//! ## Design Philosophy
//!
//! Every collaborator (document store, key-value cache, model endpoint,
//! realtime transport) is defined as a trait here. Implementations live in
//! their respective crates. This enables:
//! - Swapping implementations via configuration
//! - Easy testing with mock/stub implementations
//! - Clean dependency graph (all crates depend inward on core)

pub mod dispatch;
pub mod error;
pub mod key;
pub mod kv;
pub mod model;
pub mod realtime;
pub mod store;

// Re-export key types at crate root for ergonomics
pub use dispatch::{ActionDescriptor, DispatchErrorKind, DispatchResult};
pub use error::{Error, GatewayError, Result, StoreError};
pub use key::SessionKey;
pub use kv::KeyValueCache;
pub use model::ModelEndpoint;
pub use realtime::{BroadcastEvent, NoopTransport, RealtimeTransport};
pub use store::{
    DocumentStore, EntityKind, HabitRecord, NoteRecord, TaskFilter, TaskRecord, WorkspaceRecord,
};
