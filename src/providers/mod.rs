// Provider adapters module
//
// Closed set of backends; each maps its own wire format onto the normalized
// `CompletionOutcome`. Dispatch never retries: redaction and quota state
// belong to one logical user action and must not be applied twice.

pub mod adapter_trait;
pub mod anthropic;
pub mod google;
pub mod openai;

pub use adapter_trait::ProviderAdapter;
pub use anthropic::AnthropicAdapter;
pub use google::GeminiAdapter;
pub use openai::OpenAiAdapter;

use crate::error::ShieldError;
use crate::shield::sanitize_error_message;
use crate::types::Provider;

pub fn get_adapter(provider: Provider, base_url: Option<&str>) -> Box<dyn ProviderAdapter> {
    match provider {
        Provider::OpenAi => Box::new(OpenAiAdapter::new(base_url)),
        Provider::Gemini => Box::new(GeminiAdapter::new(base_url)),
        Provider::Anthropic => Box::new(AnthropicAdapter::new(base_url)),
    }
}

/// Advisory USD rate per token; not billing-accurate.
pub fn cost_per_token(provider: Provider) -> f64 {
    match provider {
        Provider::OpenAi => 0.00003,
        Provider::Gemini => 0.0000125,
        Provider::Anthropic => 0.000015,
    }
}

pub fn estimate_cost(provider: Provider, tokens_used: i64) -> f64 {
    tokens_used as f64 * cost_per_token(provider)
}

pub(crate) fn transport_error(err: reqwest::Error) -> ShieldError {
    ShieldError::Provider {
        status: 0,
        message: sanitize_error_message(&err.to_string()),
    }
}

pub(crate) fn malformed_response() -> ShieldError {
    ShieldError::Provider {
        status: 0,
        message: "invalid JSON in provider response".to_string(),
    }
}

pub(crate) async fn upstream_error(response: reqwest::Response) -> ShieldError {
    let status = response.status().as_u16();
    let body = response.text().await.unwrap_or_default();
    ShieldError::Provider {
        status,
        message: sanitize_error_message(&body),
    }
}
