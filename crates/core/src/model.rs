//! Model endpoint trait — the abstraction over the language-model service.
//!
//! A ModelEndpoint takes a fully assembled text prompt and returns the raw
//! completion text. Resilience (circuit breaking, retry, deadlines) and
//! response parsing live in the gateway crate, *around* this trait — an
//! endpoint implementation only speaks the wire protocol.

use async_trait::async_trait;

use crate::error::GatewayError;

/// The language-model collaborator.
#[async_trait]
pub trait ModelEndpoint: Send + Sync {
    /// A human-readable name for this endpoint (e.g., "anthropic", "mock").
    fn name(&self) -> &str;

    /// Send a prompt and return the raw completion text.
    async fn complete(&self, prompt: &str) -> Result<String, GatewayError>;
}
