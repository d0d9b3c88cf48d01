//! Dispatch result types — the output of one dispatch cycle.
//!
//! One `DispatchResult` per inbound message, always. Terminal failures are
//! carried in the `error` field with a human-readable `reply`; the dispatcher
//! contract forbids returning no result.

use serde::{Deserialize, Serialize};

/// A structured side-effect the model (or a direct handler) asked for.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ActionDescriptor {
    /// Action name, e.g. "create_task", "delete_all_tasks".
    pub name: String,
    /// Action parameters.
    #[serde(default)]
    pub params: serde_json::Value,
}

impl ActionDescriptor {
    pub fn new(name: impl Into<String>, params: serde_json::Value) -> Self {
        Self {
            name: name.into(),
            params,
        }
    }
}

/// Typed error kinds surfaced on a dispatch result.
///
/// These mirror the terminal gateway failures plus dispatcher-internal
/// conditions; each maps to a distinct user-facing message upstream.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DispatchErrorKind {
    ServiceOverloaded,
    RateLimited,
    AuthError,
    MalformedResponse,
    CircuitOpen,
    /// A deterministic intent had no registered direct handler.
    UnhandledIntent,
}

impl DispatchErrorKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            DispatchErrorKind::ServiceOverloaded => "service_overloaded",
            DispatchErrorKind::RateLimited => "rate_limited",
            DispatchErrorKind::AuthError => "auth_error",
            DispatchErrorKind::MalformedResponse => "malformed_response",
            DispatchErrorKind::CircuitOpen => "circuit_open",
            DispatchErrorKind::UnhandledIntent => "unhandled_intent",
        }
    }
}

/// The output of one dispatch cycle. Not persisted beyond the turn.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DispatchResult {
    /// Label of the classified intent (e.g. "list_tasks").
    pub intent_label: String,
    /// User-facing reply text.
    pub reply: String,
    /// Side-effect descriptor, if the turn produced one.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub action: Option<ActionDescriptor>,
    /// Arbitrary result payload (listed entities, counts, choices...).
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub data: Option<serde_json::Value>,
    /// Whether the turn ended waiting on a yes/no confirmation.
    #[serde(default)]
    pub requires_confirmation: bool,
    /// Typed error kind for terminal failures; `None` on success.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<DispatchErrorKind>,
}

impl DispatchResult {
    /// A plain successful reply.
    pub fn reply(intent_label: impl Into<String>, reply: impl Into<String>) -> Self {
        Self {
            intent_label: intent_label.into(),
            reply: reply.into(),
            action: None,
            data: None,
            requires_confirmation: false,
            error: None,
        }
    }

    /// A terminal failure with a human-readable message.
    pub fn failed(
        intent_label: impl Into<String>,
        reply: impl Into<String>,
        kind: DispatchErrorKind,
    ) -> Self {
        Self {
            intent_label: intent_label.into(),
            reply: reply.into(),
            action: None,
            data: None,
            requires_confirmation: false,
            error: Some(kind),
        }
    }

    pub fn with_data(mut self, data: serde_json::Value) -> Self {
        self.data = Some(data);
        self
    }

    pub fn with_action(mut self, action: ActionDescriptor) -> Self {
        self.action = Some(action);
        self
    }

    pub fn confirming(mut self) -> Self {
        self.requires_confirmation = true;
        self
    }
}
