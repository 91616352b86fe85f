// Request orchestrator - the mediation pipeline
//
// Sequence per request: validate, quota pre-check, redact, resolve and
// decrypt the credential, dispatch, estimate cost, audit, commit quota.
// A provider or timeout failure aborts the whole request with no audit row
// and no ledger commit; the request is treated as if it never happened.

use serde::{Deserialize, Serialize};
use std::sync::Arc;
use tokio::time::{timeout, Duration};

use crate::audit::{self, AuditEvent};
use crate::db::Database;
use crate::error::{Result, ShieldError};
use crate::providers::{estimate_cost, get_adapter};
use crate::quota;
use crate::shield::RedactionEngine;
use crate::store;
use crate::types::{CallerIdentity, Provider};
use crate::vault::CredentialVault;

pub const MAX_MESSAGE_CHARS: usize = 10_000;
const DEFAULT_DISPATCH_TIMEOUT_SECS: u64 = 120;

#[derive(Debug, Clone, Deserialize)]
pub struct ChatRequest {
    pub message: String,
    pub provider: Provider,
    pub model: Option<String>,
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ChatResponse {
    pub message: String,
    pub shield_active: bool,
    pub redactions: usize,
    pub categories_triggered: Vec<String>,
    pub tokens_used: i64,
    pub estimated_cost: f64,
}

pub struct Orchestrator {
    db: Database,
    engine: Arc<RedactionEngine>,
    vault: Arc<CredentialVault>,
    dispatch_timeout_secs: u64,
}

impl Orchestrator {
    pub fn new(db: Database, engine: Arc<RedactionEngine>, vault: Arc<CredentialVault>) -> Self {
        Self {
            db,
            engine,
            vault,
            dispatch_timeout_secs: DEFAULT_DISPATCH_TIMEOUT_SECS,
        }
    }

    pub fn with_dispatch_timeout(mut self, secs: u64) -> Self {
        self.dispatch_timeout_secs = secs;
        self
    }

    pub async fn handle_chat(
        &self,
        caller: &CallerIdentity,
        request: ChatRequest,
    ) -> Result<ChatResponse> {
        let message_chars = request.message.chars().count();
        if message_chars == 0 {
            return Err(ShieldError::Validation("message must not be empty".to_string()));
        }
        if message_chars > MAX_MESSAGE_CHARS {
            return Err(ShieldError::Validation(format!(
                "message exceeds {} characters",
                MAX_MESSAGE_CHARS
            )));
        }

        // Configuration snapshot; administrative edits affect later requests only
        let tenant = store::load_tenant(&self.db, &caller.tenant_id)?;
        let user = store::load_user(&self.db, &caller.tenant_id, &caller.user_id)?;
        let retention = tenant.prompt_storage_mode;
        let day = quota::today_key();

        // Pre-check against prior usage; rejects before any provider call
        quota::check_quota(&self.db, &tenant, &user, &day)?;

        // Redaction is unconditional; no role bypasses it
        let redaction = self
            .engine
            .redact(&request.message, &tenant.custom_blacklist);

        let key = store::find_active_key(&self.db, &tenant.id, request.provider)?.ok_or_else(
            || {
                ShieldError::Configuration(format!(
                    "No active API key found for {}",
                    request.provider.as_str()
                ))
            },
        )?;

        let credential = self.vault.decrypt(&key.encrypted_key).map_err(|err| {
            tracing::error!(
                event = "credential_decrypt_failed",
                tenant_id = %tenant.id,
                provider = request.provider.as_str(),
                error_kind = err.kind(),
                "stored credential could not be decrypted"
            );
            err
        })?;

        let model = request
            .model
            .as_deref()
            .filter(|m| !m.trim().is_empty())
            .unwrap_or(request.provider.default_model())
            .to_string();

        let adapter = get_adapter(request.provider, key.base_url.as_deref());
        let outcome = timeout(
            Duration::from_secs(self.dispatch_timeout_secs),
            adapter.complete(&redaction.safe_text, &credential, &model),
        )
        .await
        .map_err(|_| ShieldError::Provider {
            status: 0,
            message: format!(
                "provider timed out after {} seconds",
                self.dispatch_timeout_secs
            ),
        })??;

        let estimated_cost = estimate_cost(request.provider, outcome.tokens_used);

        // Post-dispatch persistence. The provider call already happened and
        // cost tokens, so a failure here is surfaced as its own kind and
        // logged for reconciliation rather than silently dropped.
        let persisted = self.persist(
            &tenant.id,
            &user.id,
            &day,
            request.provider,
            retention,
            &redaction,
            &request.message,
            &outcome.text,
            outcome.tokens_used,
            estimated_cost,
        );
        if let Err(err) = persisted {
            tracing::error!(
                event = "reconciliation",
                tenant_id = %tenant.id,
                user_id = %user.id,
                provider = request.provider.as_str(),
                tokens_used = outcome.tokens_used,
                error_kind = err.kind(),
                "post-dispatch persistence failed"
            );
            return Err(err);
        }

        tracing::info!(
            event = "chat_complete",
            tenant_id = %tenant.id,
            user_id = %user.id,
            provider = request.provider.as_str(),
            tokens_used = outcome.tokens_used,
            redaction_count = redaction.redaction_count,
            "request complete"
        );

        Ok(ChatResponse {
            message: outcome.text,
            shield_active: true,
            redactions: redaction.redaction_count,
            categories_triggered: redaction.categories_triggered,
            tokens_used: outcome.tokens_used,
            estimated_cost,
        })
    }

    #[allow(clippy::too_many_arguments)]
    fn persist(
        &self,
        tenant_id: &str,
        user_id: &str,
        day: &str,
        provider: Provider,
        retention: crate::types::StorageMode,
        redaction: &crate::shield::RedactionOutcome,
        raw_message: &str,
        response_text: &str,
        tokens_used: i64,
        estimated_cost: f64,
    ) -> Result<()> {
        audit::record(
            &self.db,
            AuditEvent {
                tenant_id,
                user_id,
                provider,
                tokens_used,
                redaction_count: redaction.redaction_count as i64,
                categories_triggered: &redaction.categories_triggered,
                estimated_cost_usd: estimated_cost,
                retention,
                redacted_prompt: &redaction.safe_text,
                raw_prompt: raw_message,
                ai_response: response_text,
            },
        )
        .map_err(|err| ShieldError::Persistence(err.to_string()))?;

        quota::commit_usage(
            &self.db,
            tenant_id,
            user_id,
            day,
            tokens_used,
            redaction.redaction_count as i64,
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::store::{create_tenant, create_user};
    use crate::types::{Role, StorageMode};

    fn orchestrator() -> (Orchestrator, CallerIdentity) {
        let db = Database::open_in_memory().unwrap();
        let tenant = create_tenant(&db, "Acme", "acme.test", 1000, StorageMode::None, &[]).unwrap();
        let user = create_user(&db, &tenant.id, "a@acme.test", None, Role::User, 1000).unwrap();
        let caller = CallerIdentity {
            tenant_id: tenant.id,
            user_id: user.id,
            role: Role::User,
        };
        let orch = Orchestrator::new(
            db,
            Arc::new(RedactionEngine::new()),
            Arc::new(CredentialVault::new("orch-test-secret").unwrap()),
        );
        (orch, caller)
    }

    #[tokio::test]
    async fn test_empty_message_is_rejected() {
        let (orch, caller) = orchestrator();
        let err = orch
            .handle_chat(
                &caller,
                ChatRequest {
                    message: String::new(),
                    provider: Provider::OpenAi,
                    model: None,
                },
            )
            .await
            .unwrap_err();
        assert!(matches!(err, ShieldError::Validation(_)));
    }

    #[tokio::test]
    async fn test_oversized_message_is_rejected() {
        let (orch, caller) = orchestrator();
        let err = orch
            .handle_chat(
                &caller,
                ChatRequest {
                    message: "x".repeat(MAX_MESSAGE_CHARS + 1),
                    provider: Provider::OpenAi,
                    model: None,
                },
            )
            .await
            .unwrap_err();
        assert!(matches!(err, ShieldError::Validation(_)));
    }

    #[tokio::test]
    async fn test_missing_key_is_a_configuration_error() {
        let (orch, caller) = orchestrator();
        let err = orch
            .handle_chat(
                &caller,
                ChatRequest {
                    message: "hello".to_string(),
                    provider: Provider::Anthropic,
                    model: None,
                },
            )
            .await
            .unwrap_err();
        match err {
            ShieldError::Configuration(msg) => assert!(msg.contains("ANTHROPIC")),
            other => panic!("unexpected error: {:?}", other),
        }
    }

    #[tokio::test]
    async fn test_unknown_caller_is_unauthorized() {
        let (orch, mut caller) = orchestrator();
        caller.user_id = "ghost".to_string();
        let err = orch
            .handle_chat(
                &caller,
                ChatRequest {
                    message: "hello".to_string(),
                    provider: Provider::OpenAi,
                    model: None,
                },
            )
            .await
            .unwrap_err();
        assert!(matches!(err, ShieldError::Unauthorized(_)));
    }
}
