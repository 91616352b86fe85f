// Anthropic Claude adapter

use reqwest::Client;
use serde_json::{json, Value};
use std::time::Duration;

use crate::error::Result;
use crate::providers::adapter_trait::ProviderAdapter;
use crate::providers::{malformed_response, transport_error, upstream_error};
use crate::types::CompletionOutcome;

const ANTHROPIC_VERSION: &str = "2023-06-01";

pub struct AnthropicAdapter {
    client: Client,
    base_url: String,
}

impl AnthropicAdapter {
    pub fn new(base_url: Option<&str>) -> Self {
        let client = Client::builder()
            .timeout(Duration::from_secs(120)) // 2 minutes for LLM responses
            .connect_timeout(Duration::from_secs(15))
            .build()
            .expect("Failed to create HTTP client");

        AnthropicAdapter {
            client,
            base_url: base_url
                .filter(|url| !url.trim().is_empty())
                .unwrap_or("https://api.anthropic.com")
                .trim_end_matches('/')
                .to_string(),
        }
    }

    fn messages_url(&self) -> String {
        // Tolerate a base URL that already includes /v1
        if self.base_url.ends_with("/v1") {
            format!("{}/messages", self.base_url)
        } else {
            format!("{}/v1/messages", self.base_url)
        }
    }
}

#[async_trait::async_trait]
impl ProviderAdapter for AnthropicAdapter {
    async fn verify(&self, api_key: &str) -> Result<()> {
        // There is no models endpoint; a minimal message request is the
        // cheapest way to prove the key works.
        let body = json!({
            "model": "claude-3-haiku-20240307",
            "max_tokens": 10,
            "messages": [{ "role": "user", "content": "test" }],
        });

        let response = self
            .client
            .post(self.messages_url())
            .header("x-api-key", api_key)
            .header("anthropic-version", ANTHROPIC_VERSION)
            .header("Content-Type", "application/json")
            .json(&body)
            .send()
            .await
            .map_err(transport_error)?;

        if !response.status().is_success() {
            return Err(upstream_error(response).await);
        }
        Ok(())
    }

    async fn complete(
        &self,
        prompt: &str,
        api_key: &str,
        model: &str,
    ) -> Result<CompletionOutcome> {
        let body = json!({
            "model": model,
            "max_tokens": 4096,
            "messages": [{ "role": "user", "content": prompt }],
        });

        let response = self
            .client
            .post(self.messages_url())
            .header("x-api-key", api_key)
            .header("anthropic-version", ANTHROPIC_VERSION)
            .header("Content-Type", "application/json")
            .json(&body)
            .send()
            .await
            .map_err(transport_error)?;

        if !response.status().is_success() {
            return Err(upstream_error(response).await);
        }

        let json: Value = response.json().await.map_err(|_| malformed_response())?;

        let text = json["content"]
            .get(0)
            .and_then(|c| c.get("text"))
            .and_then(|t| t.as_str())
            .unwrap_or("")
            .to_string();

        let input_tokens = json["usage"]
            .get("input_tokens")
            .and_then(|v| v.as_i64())
            .unwrap_or(0);
        let output_tokens = json["usage"]
            .get("output_tokens")
            .and_then(|v| v.as_i64())
            .unwrap_or(0);

        Ok(CompletionOutcome {
            text,
            tokens_used: input_tokens + output_tokens,
        })
    }
}

impl Default for AnthropicAdapter {
    fn default() -> Self {
        Self::new(None)
    }
}
