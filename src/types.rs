// Shared domain types

use serde::{Deserialize, Serialize};

/// The closed set of upstream AI backends.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Provider {
    #[serde(rename = "OPENAI")]
    OpenAi,
    #[serde(rename = "GEMINI")]
    Gemini,
    #[serde(rename = "ANTHROPIC")]
    Anthropic,
}

impl Provider {
    pub fn as_str(&self) -> &'static str {
        match self {
            Provider::OpenAi => "OPENAI",
            Provider::Gemini => "GEMINI",
            Provider::Anthropic => "ANTHROPIC",
        }
    }

    pub fn parse(value: &str) -> Option<Self> {
        match value {
            "OPENAI" => Some(Provider::OpenAi),
            "GEMINI" => Some(Provider::Gemini),
            "ANTHROPIC" => Some(Provider::Anthropic),
            _ => None,
        }
    }

    /// Model used when the caller does not specify one.
    pub fn default_model(&self) -> &'static str {
        match self {
            Provider::OpenAi => "gpt-4",
            Provider::Gemini => "gemini-pro",
            Provider::Anthropic => "claude-3-sonnet-20240229",
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum Role {
    #[serde(rename = "USER")]
    User,
    #[serde(rename = "ADMIN")]
    Admin,
    #[serde(rename = "SUPER_ADMIN")]
    SuperAdmin,
}

impl Role {
    pub fn as_str(&self) -> &'static str {
        match self {
            Role::User => "USER",
            Role::Admin => "ADMIN",
            Role::SuperAdmin => "SUPER_ADMIN",
        }
    }

    pub fn parse(value: &str) -> Option<Self> {
        match value {
            "USER" => Some(Role::User),
            "ADMIN" => Some(Role::Admin),
            "SUPER_ADMIN" => Some(Role::SuperAdmin),
            _ => None,
        }
    }

    pub fn is_admin(&self) -> bool {
        matches!(self, Role::Admin | Role::SuperAdmin)
    }
}

/// Tenant policy for how much of a request is persisted in the audit trail.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum StorageMode {
    #[serde(rename = "NONE")]
    None,
    #[serde(rename = "REDACTED_ONLY")]
    RedactedOnly,
    #[serde(rename = "FULL")]
    Full,
}

impl StorageMode {
    pub fn as_str(&self) -> &'static str {
        match self {
            StorageMode::None => "NONE",
            StorageMode::RedactedOnly => "REDACTED_ONLY",
            StorageMode::Full => "FULL",
        }
    }

    /// Unknown values degrade to `NONE`: storing nothing is the safe direction.
    pub fn parse(value: &str) -> Self {
        match value {
            "REDACTED_ONLY" => StorageMode::RedactedOnly,
            "FULL" => StorageMode::Full,
            _ => StorageMode::None,
        }
    }
}

/// Tenant configuration snapshot, read fresh at the start of each request.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Tenant {
    pub id: String,
    pub name: String,
    pub domain: String,
    pub daily_token_budget: i64,
    pub prompt_storage_mode: StorageMode,
    pub custom_blacklist: Vec<String>,
    pub created_at: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct User {
    pub id: String,
    pub tenant_id: String,
    pub email: String,
    pub name: Option<String>,
    pub role: Role,
    pub daily_token_limit: i64,
    pub created_at: String,
}

/// A provider credential at rest. The ciphertext never leaves the vault
/// unmasked except through `CredentialVault::decrypt`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ApiKeyRecord {
    pub id: String,
    pub tenant_id: String,
    pub provider: Provider,
    pub encrypted_key: String,
    pub masked_key: String,
    pub base_url: Option<String>,
    pub is_active: bool,
    pub last_verified: Option<String>,
    pub created_at: String,
}

/// Identity of an already-authenticated caller, handed to the pipeline.
#[derive(Debug, Clone)]
pub struct CallerIdentity {
    pub tenant_id: String,
    pub user_id: String,
    pub role: Role,
}

/// Provider response normalized across backends.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CompletionOutcome {
    pub text: String,
    pub tokens_used: i64,
}
