// Request error taxonomy
//
// Every externally visible failure carries a machine-readable kind plus
// non-sensitive context only (limits, counts, status codes). Raw prompt or
// credential material must never flow into these messages.

use thiserror::Error;

pub type Result<T> = std::result::Result<T, ShieldError>;

#[derive(Debug, Error)]
pub enum ShieldError {
    #[error("{0}")]
    Unauthorized(String),

    #[error("{0}")]
    Validation(String),

    #[error("Daily token limit exceeded (used {used} of {limit})")]
    UserQuotaExceeded { limit: i64, used: i64 },

    #[error("Tenant daily budget exceeded (used {used} of {budget})")]
    TenantBudgetExceeded { budget: i64, used: i64 },

    #[error("{0}")]
    Configuration(String),

    #[error("credential vault failure: {0}")]
    Crypto(String),

    /// `status` is the upstream HTTP status; 0 means the request never got a
    /// response (connect failure, timeout, malformed body).
    #[error("provider error ({status}): {message}")]
    Provider { status: u16, message: String },

    #[error("persistence failure after dispatch: {0}")]
    Persistence(String),

    #[error("{0}")]
    Internal(String),
}

impl ShieldError {
    pub fn kind(&self) -> &'static str {
        match self {
            ShieldError::Unauthorized(_) => "unauthorized",
            ShieldError::Validation(_) => "validation_failed",
            ShieldError::UserQuotaExceeded { .. } => "user_quota_exceeded",
            ShieldError::TenantBudgetExceeded { .. } => "tenant_budget_exceeded",
            ShieldError::Configuration(_) => "no_active_key_for_provider",
            ShieldError::Crypto(_) => "crypto_error",
            ShieldError::Provider { .. } => "provider_error",
            ShieldError::Persistence(_) => "persistence_error",
            ShieldError::Internal(_) => "internal_error",
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_quota_error_reports_limit_and_used() {
        let err = ShieldError::UserQuotaExceeded {
            limit: 100,
            used: 150,
        };
        let msg = err.to_string();
        assert!(msg.contains("150"));
        assert!(msg.contains("100"));
        assert_eq!(err.kind(), "user_quota_exceeded");
    }

    #[test]
    fn test_kinds_are_distinct() {
        let errors = [
            ShieldError::Validation("bad".into()),
            ShieldError::UserQuotaExceeded { limit: 1, used: 1 },
            ShieldError::TenantBudgetExceeded { budget: 1, used: 1 },
            ShieldError::Configuration("no key".into()),
            ShieldError::Provider {
                status: 500,
                message: "upstream".into(),
            },
            ShieldError::Persistence("write failed".into()),
        ];
        let kinds: std::collections::HashSet<_> = errors.iter().map(|e| e.kind()).collect();
        assert_eq!(kinds.len(), errors.len());
    }
}
