// Google Gemini adapter

use reqwest::Client;
use serde_json::{json, Value};
use std::time::Duration;

use crate::error::Result;
use crate::providers::adapter_trait::ProviderAdapter;
use crate::providers::{malformed_response, transport_error, upstream_error};
use crate::types::CompletionOutcome;

pub struct GeminiAdapter {
    client: Client,
    base_url: String,
}

impl GeminiAdapter {
    pub fn new(base_url: Option<&str>) -> Self {
        let client = Client::builder()
            .timeout(Duration::from_secs(120)) // 2 minutes for LLM responses
            .connect_timeout(Duration::from_secs(15))
            .build()
            .expect("Failed to create HTTP client");

        GeminiAdapter {
            client,
            base_url: base_url
                .filter(|url| !url.trim().is_empty())
                .unwrap_or("https://generativelanguage.googleapis.com")
                .trim_end_matches('/')
                .to_string(),
        }
    }
}

#[async_trait::async_trait]
impl ProviderAdapter for GeminiAdapter {
    async fn verify(&self, api_key: &str) -> Result<()> {
        let response = self
            .client
            .get(format!("{}/v1beta/models?key={}", self.base_url, api_key))
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
        let url = format!(
            "{}/v1beta/models/{}:generateContent?key={}",
            self.base_url, model, api_key
        );

        let body = json!({
            "contents": [{ "parts": [{ "text": prompt }] }],
        });

        let response = self
            .client
            .post(&url)
            .header("Content-Type", "application/json")
            .json(&body)
            .send()
            .await
            .map_err(transport_error)?;

        if !response.status().is_success() {
            return Err(upstream_error(response).await);
        }

        let json: Value = response.json().await.map_err(|_| malformed_response())?;

        let text = json["candidates"]
            .get(0)
            .and_then(|c| c.get("content"))
            .and_then(|c| c.get("parts"))
            .and_then(|p| p.get(0))
            .and_then(|p| p.get("text"))
            .and_then(|t| t.as_str())
            .unwrap_or("")
            .to_string();

        // Gemini does not report usage here; approximate at 4 chars per token.
        let tokens_used = (text.chars().count() as i64 + 3) / 4;

        Ok(CompletionOutcome { text, tokens_used })
    }
}

impl Default for GeminiAdapter {
    fn default() -> Self {
        Self::new(None)
    }
}
