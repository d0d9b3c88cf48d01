//! # Taskweave Gateway
//!
//! The resilient path between the dispatcher and the language model:
//!
//! - **Circuit breaker** — consecutive terminal failures open the circuit;
//!   after a cooldown, exactly one half-open probe decides whether to close.
//! - **Retry with backoff** — transient failures (overload, rate limit) are
//!   retried with exponential backoff under one overall deadline.
//! - **Response parsing** — model output is expected to be JSON, but prose
//!   wrappers and code fences are recovered from before giving up.
//! - **Typed fallbacks** — when everything fails, the caller gets a canned
//!   reply matched to the intent group, never a stack trace.

pub mod breaker;
pub mod fallback;
pub mod gateway;
pub mod http;
pub mod parse;

pub use breaker::CircuitBreaker;
pub use fallback::fallback_reply;
pub use gateway::ModelGateway;
pub use http::HttpModelEndpoint;
pub use parse::{ParseOutcome, StructuredReply, parse_model_reply};
