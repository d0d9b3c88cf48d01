//! HTTP model endpoint speaking the Anthropic Messages API.
//!
//! Status mapping:
//! - 429 → `RateLimited` (honoring `retry-after` when present)
//! - 503 / 529 → `ServiceOverloaded`
//! - 401 / 403 → `AuthFailed`
//! - anything else non-200 → `Network`

use async_trait::async_trait;
use serde::Deserialize;
use tracing::{debug, warn};

use taskweave_core::error::GatewayError;
use taskweave_core::model::ModelEndpoint;

const API_VERSION: &str = "2023-06-01";
const DEFAULT_MAX_TOKENS: u32 = 1024;
const DEFAULT_RETRY_AFTER_SECS: u64 = 5;

/// A [`ModelEndpoint`] over the Anthropic Messages API.
pub struct HttpModelEndpoint {
    base_url: String,
    api_key: String,
    model: String,
    client: reqwest::Client,
}

impl HttpModelEndpoint {
    pub fn new(
        base_url: impl Into<String>,
        api_key: impl Into<String>,
        model: impl Into<String>,
    ) -> Self {
        let client = reqwest::Client::builder()
            .timeout(std::time::Duration::from_secs(60))
            .build()
            .expect("Failed to create HTTP client");

        Self {
            base_url: base_url.into().trim_end_matches('/').to_string(),
            api_key: api_key.into(),
            model: model.into(),
            client,
        }
    }
}

#[async_trait]
impl ModelEndpoint for HttpModelEndpoint {
    fn name(&self) -> &str {
        "anthropic"
    }

    async fn complete(&self, prompt: &str) -> Result<String, GatewayError> {
        let url = format!("{}/v1/messages", self.base_url);
        let body = serde_json::json!({
            "model": self.model,
            "max_tokens": DEFAULT_MAX_TOKENS,
            "messages": [{"role": "user", "content": prompt}],
        });

        debug!(model = %self.model, "Sending completion request");

        let response = self
            .client
            .post(&url)
            .header("x-api-key", &self.api_key)
            .header("anthropic-version", API_VERSION)
            .header("Content-Type", "application/json")
            .json(&body)
            .send()
            .await
            .map_err(|e| GatewayError::Network(e.to_string()))?;

        let status = response.status().as_u16();
        match status {
            200 => {}
            429 => {
                let retry_after_secs = response
                    .headers()
                    .get("retry-after")
                    .and_then(|v| v.to_str().ok())
                    .and_then(|v| v.parse().ok())
                    .unwrap_or(DEFAULT_RETRY_AFTER_SECS);
                return Err(GatewayError::RateLimited { retry_after_secs });
            }
            503 | 529 => {
                let error_body = response.text().await.unwrap_or_default();
                warn!(status, "Model service overloaded");
                return Err(GatewayError::ServiceOverloaded(error_body));
            }
            401 | 403 => {
                return Err(GatewayError::AuthFailed("Invalid API key".into()));
            }
            _ => {
                let error_body = response.text().await.unwrap_or_default();
                warn!(status, body = %error_body, "Unexpected API error");
                return Err(GatewayError::Network(format!(
                    "status {status}: {error_body}"
                )));
            }
        }

        let api_resp: MessagesResponse = response
            .json()
            .await
            .map_err(|e| GatewayError::MalformedResponse(e.to_string()))?;

        let text: String = api_resp
            .content
            .iter()
            .filter_map(|block| match block {
                ResponseBlock::Text { text } => Some(text.as_str()),
                ResponseBlock::Other => None,
            })
            .collect::<Vec<_>>()
            .join("\n");

        if text.is_empty() {
            return Err(GatewayError::MalformedResponse(
                "response contained no text blocks".into(),
            ));
        }

        Ok(text)
    }
}

// --- Wire types ---

#[derive(Debug, Deserialize)]
struct MessagesResponse {
    content: Vec<ResponseBlock>,
}

#[derive(Debug, Deserialize)]
#[serde(tag = "type")]
enum ResponseBlock {
    #[serde(rename = "text")]
    Text { text: String },
    #[serde(other)]
    Other,
}
