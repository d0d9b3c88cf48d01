//! # Taskweave Context
//!
//! The tiered snapshot of "what the assistant currently knows" about a
//! (user, workspace) pair, loaded progressively by cost:
//!
//! 1. **Critical** — current workspace, today's due tasks, today's habit
//!    status. Always loaded.
//! 2. **High** — last-24h conversation tail, unread alert summary.
//! 3. **Medium** — last-7-days tasks, saved notes, upcoming reminders.
//! 4. **Low** — cross-workspace list, aggregate statistics.
//!
//! A tier is loaded at most once per snapshot lifetime unless invalidated.
//! Snapshots go stale after a TTL and are rebuilt from tier zero up.
//! Field-level access counts drive a preload heuristic: a hot field's tier
//! is eagerly refreshed on the next incremental update.

pub mod ambiguity;
pub mod cache;
pub mod snapshot;

pub use ambiguity::{WorkspaceAmbiguity, detect_workspace_ambiguity};
pub use cache::ContextCache;
pub use snapshot::{ContextSnapshot, ContextTier};
