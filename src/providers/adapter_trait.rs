// Provider adapter trait

use crate::error::Result;
use crate::types::CompletionOutcome;

#[async_trait::async_trait]
pub trait ProviderAdapter: Send + Sync {
    /// Cheapest authenticated call the backend offers; used by key
    /// verification to stamp `last_verified`.
    async fn verify(&self, api_key: &str) -> Result<()>;

    /// Send an already-sanitized prompt and normalize the reply to
    /// `(text, tokens_used)`. No retries here: a retry would have to re-run
    /// redaction and quota accounting, which is the caller's decision.
    async fn complete(&self, prompt: &str, api_key: &str, model: &str)
        -> Result<CompletionOutcome>;
}
