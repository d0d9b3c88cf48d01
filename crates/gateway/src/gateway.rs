//! The model gateway — breaker, retry, deadline, and parsing around one
//! [`ModelEndpoint`].
//!
//! Invocation contract:
//! - The circuit breaker is consulted before every attempt.
//! - Only transient failures are retried, up to `max_attempts`, with
//!   exponential backoff (`backoff_base * 2^attempt`).
//! - The whole invocation, retries included, runs under one deadline. A
//!   deadline hit is reported as overload.
//! - An unparseable completion is *not* an error: the caller gets a
//!   clarification reply that carries the model's prose.

use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, info, warn};

use taskweave_config::GatewayConfig;
use taskweave_core::error::GatewayError;
use taskweave_core::model::ModelEndpoint;

use crate::breaker::CircuitBreaker;
use crate::parse::{ParseOutcome, StructuredReply, parse_model_reply};

const CLARIFICATION_REPLY: &str =
    "I'm not sure I got that right. Could you rephrase what you'd like me to do?";

/// Resilient wrapper around a model endpoint.
pub struct ModelGateway {
    endpoint: Arc<dyn ModelEndpoint>,
    breaker: CircuitBreaker,
    max_attempts: u32,
    backoff_base: Duration,
    deadline: Duration,
}

impl ModelGateway {
    pub fn new(endpoint: Arc<dyn ModelEndpoint>, config: &GatewayConfig) -> Self {
        Self {
            endpoint,
            breaker: CircuitBreaker::new(config.failure_threshold, config.cooldown()),
            max_attempts: config.max_attempts,
            backoff_base: config.backoff_base(),
            deadline: config.deadline(),
        }
    }

    /// Send a prompt and parse the completion into a structured reply.
    ///
    /// Returns `Err` only for terminal transport failures; a completion that
    /// fails to parse becomes a clarification reply instead.
    pub async fn invoke(&self, prompt: &str) -> Result<StructuredReply, GatewayError> {
        let raw = self.complete_with_retry(prompt).await?;

        match parse_model_reply(&raw) {
            ParseOutcome::Direct(reply) | ParseOutcome::Recovered(reply) => Ok(reply),
            ParseOutcome::Unparseable(prose) => {
                warn!(endpoint = %self.endpoint.name(), "Completion unparseable, asking user to rephrase");
                Ok(StructuredReply {
                    reply: CLARIFICATION_REPLY.to_string(),
                    action: None,
                    data: Some(serde_json::json!({ "model_text": prose })),
                    requires_confirmation: false,
                })
            }
        }
    }

    /// Raw completion with breaker, retry, and the overall deadline applied.
    pub async fn complete_with_retry(&self, prompt: &str) -> Result<String, GatewayError> {
        match tokio::time::timeout(self.deadline, self.retry_loop(prompt)).await {
            Ok(result) => result,
            Err(_) => {
                warn!(
                    endpoint = %self.endpoint.name(),
                    deadline_secs = self.deadline.as_secs(),
                    "Invocation deadline exceeded"
                );
                self.breaker.record_failure();
                Err(GatewayError::Timeout(format!(
                    "no completion within {}s",
                    self.deadline.as_secs()
                )))
            }
        }
    }

    async fn retry_loop(&self, prompt: &str) -> Result<String, GatewayError> {
        let mut last_error = GatewayError::ServiceOverloaded("no attempts made".into());

        for attempt in 0..self.max_attempts {
            self.breaker.try_acquire()?;

            debug!(
                endpoint = %self.endpoint.name(),
                attempt = attempt + 1,
                total = self.max_attempts,
                "Sending completion request"
            );

            match self.endpoint.complete(prompt).await {
                Ok(text) => {
                    self.breaker.record_success();
                    return Ok(text);
                }
                Err(e) => {
                    self.breaker.record_failure();
                    let retryable = e.is_retryable();
                    warn!(
                        endpoint = %self.endpoint.name(),
                        error = %e,
                        retryable,
                        "Completion attempt failed"
                    );
                    last_error = e;
                    if !retryable {
                        return Err(last_error);
                    }
                }
            }

            if attempt + 1 < self.max_attempts {
                let delay = self.backoff_base * 2u32.pow(attempt);
                debug!(delay_ms = delay.as_millis() as u64, "Backing off before retry");
                tokio::time::sleep(delay).await;
            }
        }

        info!(endpoint = %self.endpoint.name(), "Retries exhausted");
        Err(last_error)
    }

    /// Whether the breaker is currently rejecting calls.
    pub fn circuit_open(&self) -> bool {
        self.breaker.is_open()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use async_trait::async_trait;
    use std::sync::Mutex;
    use tokio::time::Instant;

    /// Endpoint scripted with a sequence of results; repeats the last one.
    struct ScriptedEndpoint {
        script: Mutex<Vec<Result<String, GatewayError>>>,
        calls: Mutex<usize>,
        delay: Duration,
    }

    impl ScriptedEndpoint {
        fn new(script: Vec<Result<String, GatewayError>>) -> Self {
            Self {
                script: Mutex::new(script),
                calls: Mutex::new(0),
                delay: Duration::ZERO,
            }
        }

        fn calls(&self) -> usize {
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
            if !self.delay.is_zero() {
                tokio::time::sleep(self.delay).await;
            }
            let mut script = self.script.lock().unwrap();
            if script.len() > 1 {
                script.remove(0)
            } else {
                script[0].clone()
            }
        }
    }

    fn config() -> GatewayConfig {
        GatewayConfig::default()
    }

    fn overloaded() -> GatewayError {
        GatewayError::ServiceOverloaded("503".into())
    }

    #[tokio::test(start_paused = true)]
    async fn success_on_first_attempt() {
        let endpoint = Arc::new(ScriptedEndpoint::new(vec![Ok(
            r#"{"reply": "hi"}"#.to_string()
        )]));
        let gateway = ModelGateway::new(endpoint.clone(), &config());

        let reply = gateway.invoke("prompt").await.unwrap();
        assert_eq!(reply.reply, "hi");
        assert_eq!(endpoint.calls(), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn transient_failures_retry_with_backoff() {
        let endpoint = Arc::new(ScriptedEndpoint::new(vec![
            Err(overloaded()),
            Err(overloaded()),
            Ok(r#"{"reply": "finally"}"#.to_string()),
        ]));
        let gateway = ModelGateway::new(endpoint.clone(), &config());

        let start = Instant::now();
        let reply = gateway.invoke("prompt").await.unwrap();
        assert_eq!(reply.reply, "finally");
        assert_eq!(endpoint.calls(), 3);
        // 1s after attempt 0, 2s after attempt 1.
        assert!(start.elapsed() >= Duration::from_secs(3));
    }

    #[tokio::test(start_paused = true)]
    async fn retries_are_bounded() {
        let endpoint = Arc::new(ScriptedEndpoint::new(vec![Err(overloaded())]));
        let gateway = ModelGateway::new(endpoint.clone(), &config());

        let result = gateway.invoke("prompt").await;
        assert!(matches!(result, Err(GatewayError::ServiceOverloaded(_))));
        assert_eq!(endpoint.calls(), 3);
    }

    #[tokio::test(start_paused = true)]
    async fn terminal_failures_do_not_retry() {
        let endpoint = Arc::new(ScriptedEndpoint::new(vec![Err(GatewayError::AuthFailed(
            "bad key".into(),
        ))]));
        let gateway = ModelGateway::new(endpoint.clone(), &config());

        let result = gateway.invoke("prompt").await;
        assert!(matches!(result, Err(GatewayError::AuthFailed(_))));
        assert_eq!(endpoint.calls(), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn breaker_opens_after_consecutive_failures() {
        let endpoint = Arc::new(ScriptedEndpoint::new(vec![Err(overloaded())]));
        let gateway = ModelGateway::new(endpoint.clone(), &config());

        // Three failed attempts inside one invoke open the circuit.
        let _ = gateway.invoke("prompt").await;
        assert!(gateway.circuit_open());

        // The next invoke is rejected without touching the endpoint.
        let calls_before = endpoint.calls();
        let result = gateway.invoke("prompt").await;
        assert!(matches!(result, Err(GatewayError::CircuitOpen)));
        assert_eq!(endpoint.calls(), calls_before);
    }

    #[tokio::test(start_paused = true)]
    async fn open_circuit_recovers_after_cooldown() {
        let endpoint = Arc::new(ScriptedEndpoint::new(vec![
            Err(overloaded()),
            Err(overloaded()),
            Err(overloaded()),
            Ok(r#"{"reply": "back"}"#.to_string()),
        ]));
        let gateway = ModelGateway::new(endpoint.clone(), &config());

        let _ = gateway.invoke("prompt").await;
        assert!(gateway.circuit_open());

        tokio::time::advance(Duration::from_secs(31)).await;

        let reply = gateway.invoke("prompt").await.unwrap();
        assert_eq!(reply.reply, "back");
        assert!(!gateway.circuit_open());
    }

    #[tokio::test(start_paused = true)]
    async fn deadline_reports_timeout() {
        let mut endpoint = ScriptedEndpoint::new(vec![Ok("too late".into())]);
        endpoint.delay = Duration::from_secs(60);
        let gateway = ModelGateway::new(Arc::new(endpoint), &config());

        let result = gateway.invoke("prompt").await;
        match result {
            Err(e @ GatewayError::Timeout(_)) => {
                assert_eq!(e.label(), "service_overloaded");
            }
            other => panic!("Expected Timeout, got {other:?}"),
        }
    }

    #[tokio::test(start_paused = true)]
    async fn unparseable_completion_becomes_clarification() {
        let endpoint = Arc::new(ScriptedEndpoint::new(vec![Ok(
            "Sorry, plain prose here.".to_string()
        )]));
        let gateway = ModelGateway::new(endpoint, &config());

        let reply = gateway.invoke("prompt").await.unwrap();
        assert!(reply.reply.contains("rephrase"));
        assert!(reply.action.is_none());
        assert_eq!(
            reply.data.unwrap()["model_text"],
            "Sorry, plain prose here."
        );
    }
}
