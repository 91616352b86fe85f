// OpenAI adapter

use reqwest::Client;
use serde_json::{json, Value};
use std::time::Duration;

use crate::error::Result;
use crate::providers::adapter_trait::ProviderAdapter;
use crate::providers::{malformed_response, transport_error, upstream_error};
use crate::types::CompletionOutcome;

pub struct OpenAiAdapter {
    client: Client,
    base_url: String,
}

impl OpenAiAdapter {
    pub fn new(base_url: Option<&str>) -> Self {
        let client = Client::builder()
            .timeout(Duration::from_secs(120)) // 2 minutes for LLM responses
            .connect_timeout(Duration::from_secs(15))
            .build()
            .expect("Failed to create HTTP client");

        OpenAiAdapter {
            client,
            base_url: base_url
                .filter(|url| !url.trim().is_empty())
                .unwrap_or("https://api.openai.com")
                .trim_end_matches('/')
                .to_string(),
        }
    }
}

#[async_trait::async_trait]
impl ProviderAdapter for OpenAiAdapter {
    async fn verify(&self, api_key: &str) -> Result<()> {
        let response = self
            .client
            .get(format!("{}/v1/models", self.base_url))
            .bearer_auth(api_key)
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
            "messages": [{ "role": "user", "content": prompt }],
        });

        let response = self
            .client
            .post(format!("{}/v1/chat/completions", self.base_url))
            .bearer_auth(api_key)
            .header("Content-Type", "application/json")
            .json(&body)
            .send()
            .await
            .map_err(transport_error)?;

        if !response.status().is_success() {
            return Err(upstream_error(response).await);
        }

        let json: Value = response.json().await.map_err(|_| malformed_response())?;

        let text = json["choices"]
            .get(0)
            .and_then(|c| c.get("message"))
            .and_then(|m| m.get("content"))
            .and_then(|t| t.as_str())
            .unwrap_or("")
            .to_string();

        let tokens_used = json["usage"]
            .get("total_tokens")
            .and_then(|v| v.as_i64())
            .unwrap_or(0);

        Ok(CompletionOutcome { text, tokens_used })
    }
}

impl Default for OpenAiAdapter {
    fn default() -> Self {
        Self::new(None)
    }
}
