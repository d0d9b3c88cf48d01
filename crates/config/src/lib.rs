//! Configuration loading and validation for taskweave.
//!
//! All dispatch-core tunables live here: conversation TTLs, context
//! staleness, circuit-breaker thresholds, retry policy, and the gateway
//! deadline. Loads from a TOML file with serde defaults for every field, so
//! an empty file is a valid configuration.

use serde::{Deserialize, Serialize};
use std::path::Path;
use std::time::Duration;
use thiserror::Error;
use tracing::debug;

/// Errors from configuration loading or validation.
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("Failed to read config file: {0}")]
    Io(#[from] std::io::Error),

    #[error("Failed to parse config: {0}")]
    Parse(#[from] toml::de::Error),

    #[error("Invalid configuration: {0}")]
    Invalid(String),
}

/// The root configuration structure.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct AppConfig {
    /// Conversation state-machine settings.
    #[serde(default)]
    pub conversation: ConversationConfig,

    /// Context cache settings.
    #[serde(default)]
    pub context: ContextConfig,

    /// Model gateway resilience settings.
    #[serde(default)]
    pub gateway: GatewayConfig,

    /// Model endpoint settings.
    #[serde(default)]
    pub model: ModelConfig,
}

/// Conversation state store tunables.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ConversationConfig {
    /// Seconds a non-Idle phase survives without an update.
    #[serde(default = "default_state_ttl_secs")]
    pub state_ttl_secs: u64,

    /// Ambiguous confirmation replies tolerated before auto-cancel.
    #[serde(default = "default_max_reprompts")]
    pub max_reprompts: u32,
}

fn default_state_ttl_secs() -> u64 {
    300
}
fn default_max_reprompts() -> u32 {
    3
}

impl Default for ConversationConfig {
    fn default() -> Self {
        Self {
            state_ttl_secs: default_state_ttl_secs(),
            max_reprompts: default_max_reprompts(),
        }
    }
}

impl ConversationConfig {
    pub fn state_ttl(&self) -> Duration {
        Duration::from_secs(self.state_ttl_secs)
    }
}

/// Context cache tunables.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ContextConfig {
    /// Seconds before a snapshot is stale and rebuilt from tier zero.
    #[serde(default = "default_snapshot_ttl_secs")]
    pub snapshot_ttl_secs: u64,

    /// Accesses after which a field is eagerly refreshed on update.
    #[serde(default = "default_preload_threshold")]
    pub preload_threshold: u32,
}

fn default_snapshot_ttl_secs() -> u64 {
    1800
}
fn default_preload_threshold() -> u32 {
    3
}

impl Default for ContextConfig {
    fn default() -> Self {
        Self {
            snapshot_ttl_secs: default_snapshot_ttl_secs(),
            preload_threshold: default_preload_threshold(),
        }
    }
}

impl ContextConfig {
    pub fn snapshot_ttl(&self) -> Duration {
        Duration::from_secs(self.snapshot_ttl_secs)
    }
}

/// Circuit breaker and retry tunables for the model gateway.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct GatewayConfig {
    /// Consecutive failures that open the breaker.
    #[serde(default = "default_failure_threshold")]
    pub failure_threshold: u32,

    /// Seconds the breaker stays open before a half-open probe.
    #[serde(default = "default_cooldown_secs")]
    pub cooldown_secs: u64,

    /// Maximum attempts per invoke (first try + retries).
    #[serde(default = "default_max_attempts")]
    pub max_attempts: u32,

    /// Base backoff delay in milliseconds (doubled per attempt).
    #[serde(default = "default_backoff_base_ms")]
    pub backoff_base_ms: u64,

    /// Overall deadline for one invoke, including retries, in seconds.
    #[serde(default = "default_deadline_secs")]
    pub deadline_secs: u64,
}

fn default_failure_threshold() -> u32 {
    3
}
fn default_cooldown_secs() -> u64 {
    30
}
fn default_max_attempts() -> u32 {
    3
}
fn default_backoff_base_ms() -> u64 {
    1000
}
fn default_deadline_secs() -> u64 {
    15
}

impl Default for GatewayConfig {
    fn default() -> Self {
        Self {
            failure_threshold: default_failure_threshold(),
            cooldown_secs: default_cooldown_secs(),
            max_attempts: default_max_attempts(),
            backoff_base_ms: default_backoff_base_ms(),
            deadline_secs: default_deadline_secs(),
        }
    }
}

impl GatewayConfig {
    pub fn cooldown(&self) -> Duration {
        Duration::from_secs(self.cooldown_secs)
    }

    pub fn backoff_base(&self) -> Duration {
        Duration::from_millis(self.backoff_base_ms)
    }

    pub fn deadline(&self) -> Duration {
        Duration::from_secs(self.deadline_secs)
    }
}

/// Model endpoint settings.
#[derive(Clone, Serialize, Deserialize)]
pub struct ModelConfig {
    /// Completion endpoint base URL.
    #[serde(default = "default_base_url")]
    pub base_url: String,

    /// API key for the endpoint.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub api_key: Option<String>,

    /// Model identifier sent with each request.
    #[serde(default = "default_model")]
    pub model: String,
}

fn default_base_url() -> String {
    "https://api.anthropic.com".into()
}
fn default_model() -> String {
    "claude-sonnet-4-20250514".into()
}

impl Default for ModelConfig {
    fn default() -> Self {
        Self {
            base_url: default_base_url(),
            api_key: None,
            model: default_model(),
        }
    }
}

impl std::fmt::Debug for ModelConfig {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ModelConfig")
            .field("base_url", &self.base_url)
            .field(
                "api_key",
                &self.api_key.as_ref().map(|_| "[REDACTED]"),
            )
            .field("model", &self.model)
            .finish()
    }
}

impl AppConfig {
    /// Load configuration from a TOML file.
    pub fn load(path: &Path) -> Result<Self, ConfigError> {
        let raw = std::fs::read_to_string(path)?;
        let config: AppConfig = toml::from_str(&raw)?;
        config.validate()?;
        debug!(path = %path.display(), "Loaded configuration");
        Ok(config)
    }

    /// Validate cross-field constraints. Zero TTLs or retry counts would
    /// silently disable whole subsystems, so they are rejected here.
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.conversation.state_ttl_secs == 0 {
            return Err(ConfigError::Invalid(
                "conversation.state_ttl_secs must be > 0".into(),
            ));
        }
        if self.context.snapshot_ttl_secs == 0 {
            return Err(ConfigError::Invalid(
                "context.snapshot_ttl_secs must be > 0".into(),
            ));
        }
        if self.gateway.failure_threshold == 0 {
            return Err(ConfigError::Invalid(
                "gateway.failure_threshold must be > 0".into(),
            ));
        }
        if self.gateway.max_attempts == 0 {
            return Err(ConfigError::Invalid(
                "gateway.max_attempts must be > 0".into(),
            ));
        }
        if self.gateway.deadline_secs == 0 {
            return Err(ConfigError::Invalid(
                "gateway.deadline_secs must be > 0".into(),
            ));
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    #[test]
    fn defaults_are_valid() {
        let config = AppConfig::default();
        assert!(config.validate().is_ok());
        assert_eq!(config.conversation.state_ttl_secs, 300);
        assert_eq!(config.context.snapshot_ttl_secs, 1800);
        assert_eq!(config.gateway.failure_threshold, 3);
        assert_eq!(config.gateway.max_attempts, 3);
        assert_eq!(config.gateway.backoff_base_ms, 1000);
        assert_eq!(config.gateway.deadline_secs, 15);
    }

    #[test]
    fn empty_toml_uses_defaults() {
        let config: AppConfig = toml::from_str("").unwrap();
        assert_eq!(config.conversation.max_reprompts, 3);
        assert_eq!(config.context.preload_threshold, 3);
    }

    #[test]
    fn partial_toml_overrides() {
        let config: AppConfig = toml::from_str(
            r#"
            [gateway]
            failure_threshold = 5
            cooldown_secs = 60
            "#,
        )
        .unwrap();
        assert_eq!(config.gateway.failure_threshold, 5);
        assert_eq!(config.gateway.cooldown_secs, 60);
        // Untouched sections keep defaults.
        assert_eq!(config.gateway.max_attempts, 3);
        assert_eq!(config.conversation.state_ttl_secs, 300);
    }

    #[test]
    fn zero_ttl_rejected() {
        let config: AppConfig = toml::from_str(
            r#"
            [conversation]
            state_ttl_secs = 0
            "#,
        )
        .unwrap();
        assert!(matches!(config.validate(), Err(ConfigError::Invalid(_))));
    }

    #[test]
    fn zero_attempts_rejected() {
        let config: AppConfig = toml::from_str(
            r#"
            [gateway]
            max_attempts = 0
            "#,
        )
        .unwrap();
        assert!(config.validate().is_err());
    }

    #[test]
    fn load_from_file() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        writeln!(file, "[context]\nsnapshot_ttl_secs = 900").unwrap();
        let config = AppConfig::load(file.path()).unwrap();
        assert_eq!(config.context.snapshot_ttl_secs, 900);
        assert_eq!(config.context.snapshot_ttl(), Duration::from_secs(900));
    }

    #[test]
    fn api_key_redacted_in_debug() {
        let config = ModelConfig {
            api_key: Some("sk-secret".into()),
            ..Default::default()
        };
        let debug = format!("{config:?}");
        assert!(!debug.contains("sk-secret"));
        assert!(debug.contains("REDACTED"));
    }

    #[test]
    fn duration_helpers() {
        let gw = GatewayConfig::default();
        assert_eq!(gw.cooldown(), Duration::from_secs(30));
        assert_eq!(gw.backoff_base(), Duration::from_millis(1000));
        assert_eq!(gw.deadline(), Duration::from_secs(15));
    }
}
