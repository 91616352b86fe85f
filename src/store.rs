// Record stores for tenants, users, and provider credentials
//
// Configuration rows are loaded fresh per request so concurrent
// administrative edits only affect subsequent requests.

use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::db::Database;
use crate::error::{Result, ShieldError};
use crate::types::{ApiKeyRecord, Provider, Role, StorageMode, Tenant, User};
use crate::vault::CredentialVault;

/// Masked listing entry; ciphertext never leaves this module unmasked.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct MaskedKeySummary {
    pub id: String,
    pub provider: Provider,
    pub masked_key: String,
    pub is_active: bool,
    pub last_verified: Option<String>,
    pub created_at: String,
}

pub fn load_tenant(db: &Database, tenant_id: &str) -> Result<Tenant> {
    let conn = db.get_connection();
    let guard = conn
        .lock()
        .map_err(|e| ShieldError::Internal(format!("Database lock error: {}", e)))?;

    guard
        .query_row(
            "SELECT id, name, domain, daily_token_budget, prompt_storage_mode, custom_blacklist_json, created_at
             FROM tenants WHERE id = ?1",
            [tenant_id],
            |row| {
                Ok(Tenant {
                    id: row.get(0)?,
                    name: row.get(1)?,
                    domain: row.get(2)?,
                    daily_token_budget: row.get(3)?,
                    prompt_storage_mode: StorageMode::parse(&row.get::<_, String>(4)?),
                    custom_blacklist: serde_json::from_str(&row.get::<_, String>(5)?)
                        .unwrap_or_default(),
                    created_at: row.get(6)?,
                })
            },
        )
        .map_err(|e| match e {
            rusqlite::Error::QueryReturnedNoRows => {
                ShieldError::Unauthorized("Unknown tenant".to_string())
            }
            other => ShieldError::Internal(format!("Failed to load tenant: {}", other)),
        })
}

pub fn load_user(db: &Database, tenant_id: &str, user_id: &str) -> Result<User> {
    let conn = db.get_connection();
    let guard = conn
        .lock()
        .map_err(|e| ShieldError::Internal(format!("Database lock error: {}", e)))?;

    guard
        .query_row(
            "SELECT id, tenant_id, email, name, role, daily_token_limit, created_at
             FROM users WHERE id = ?1 AND tenant_id = ?2",
            [user_id, tenant_id],
            |row| {
                Ok(User {
                    id: row.get(0)?,
                    tenant_id: row.get(1)?,
                    email: row.get(2)?,
                    name: row.get(3)?,
                    role: Role::parse(&row.get::<_, String>(4)?).unwrap_or(Role::User),
                    daily_token_limit: row.get(5)?,
                    created_at: row.get(6)?,
                })
            },
        )
        .map_err(|e| match e {
            rusqlite::Error::QueryReturnedNoRows => {
                ShieldError::Unauthorized("Unknown user".to_string())
            }
            other => ShieldError::Internal(format!("Failed to load user: {}", other)),
        })
}

pub fn create_tenant(
    db: &Database,
    name: &str,
    domain: &str,
    daily_token_budget: i64,
    prompt_storage_mode: StorageMode,
    custom_blacklist: &[String],
) -> Result<Tenant> {
    let id = Uuid::new_v4().to_string();
    let created_at = chrono::Utc::now().to_rfc3339();
    let blacklist_json = serde_json::to_string(custom_blacklist)
        .map_err(|e| ShieldError::Internal(format!("Failed to encode blacklist: {}", e)))?;

    let conn = db.get_connection();
    let guard = conn
        .lock()
        .map_err(|e| ShieldError::Internal(format!("Database lock error: {}", e)))?;

    guard
        .execute(
            "INSERT INTO tenants (id, name, domain, daily_token_budget, prompt_storage_mode, custom_blacklist_json, created_at, updated_at)
             VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?7)",
            rusqlite::params![
                id,
                name,
                domain,
                daily_token_budget,
                prompt_storage_mode.as_str(),
                blacklist_json,
                created_at
            ],
        )
        .map_err(|e| ShieldError::Internal(format!("Failed to create tenant: {}", e)))?;

    Ok(Tenant {
        id,
        name: name.to_string(),
        domain: domain.to_string(),
        daily_token_budget,
        prompt_storage_mode,
        custom_blacklist: custom_blacklist.to_vec(),
        created_at,
    })
}

pub fn create_user(
    db: &Database,
    tenant_id: &str,
    email: &str,
    name: Option<&str>,
    role: Role,
    daily_token_limit: i64,
) -> Result<User> {
    let id = Uuid::new_v4().to_string();
    let created_at = chrono::Utc::now().to_rfc3339();

    let conn = db.get_connection();
    let guard = conn
        .lock()
        .map_err(|e| ShieldError::Internal(format!("Database lock error: {}", e)))?;

    guard
        .execute(
            "INSERT INTO users (id, tenant_id, email, name, role, daily_token_limit, created_at)
             VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7)",
            rusqlite::params![
                id,
                tenant_id,
                email,
                name,
                role.as_str(),
                daily_token_limit,
                created_at
            ],
        )
        .map_err(|e| ShieldError::Internal(format!("Failed to create user: {}", e)))?;

    Ok(User {
        id,
        tenant_id: tenant_id.to_string(),
        email: email.to_string(),
        name: name.map(|s| s.to_string()),
        role,
        daily_token_limit,
        created_at,
    })
}

/// Encrypt and store a new provider credential for the tenant.
pub fn create_api_key(
    db: &Database,
    vault: &CredentialVault,
    tenant_id: &str,
    provider: Provider,
    api_key: &str,
    base_url: Option<&str>,
) -> Result<MaskedKeySummary> {
    if api_key.len() < 10 {
        return Err(ShieldError::Validation(
            "API key must be at least 10 characters".to_string(),
        ));
    }

    let encrypted_key = vault.encrypt(api_key)?;
    let masked_key = CredentialVault::mask(api_key);
    let id = Uuid::new_v4().to_string();
    let created_at = chrono::Utc::now().to_rfc3339();

    let conn = db.get_connection();
    let guard = conn
        .lock()
        .map_err(|e| ShieldError::Internal(format!("Database lock error: {}", e)))?;

    guard
        .execute(
            "INSERT INTO api_keys (id, tenant_id, provider, encrypted_key, masked_key, base_url, is_active, created_at)
             VALUES (?1, ?2, ?3, ?4, ?5, ?6, 1, ?7)",
            rusqlite::params![
                id,
                tenant_id,
                provider.as_str(),
                encrypted_key,
                masked_key,
                base_url,
                created_at
            ],
        )
        .map_err(|e| ShieldError::Internal(format!("Failed to store API key: {}", e)))?;

    Ok(MaskedKeySummary {
        id,
        provider,
        masked_key,
        is_active: true,
        last_verified: None,
        created_at,
    })
}

pub fn list_api_keys(db: &Database, tenant_id: &str) -> Result<Vec<MaskedKeySummary>> {
    let conn = db.get_connection();
    let guard = conn
        .lock()
        .map_err(|e| ShieldError::Internal(format!("Database lock error: {}", e)))?;

    let mut stmt = guard
        .prepare(
            "SELECT id, provider, masked_key, is_active, last_verified, created_at
             FROM api_keys WHERE tenant_id = ?1 ORDER BY created_at DESC",
        )
        .map_err(|e| ShieldError::Internal(format!("Failed to list API keys: {}", e)))?;

    let rows = stmt
        .query_map([tenant_id], |row| {
            Ok(MaskedKeySummary {
                id: row.get(0)?,
                provider: Provider::parse(&row.get::<_, String>(1)?)
                    .unwrap_or(Provider::OpenAi),
                masked_key: row.get(2)?,
                is_active: row.get::<_, i64>(3)? != 0,
                last_verified: row.get(4)?,
                created_at: row.get(5)?,
            })
        })
        .map_err(|e| ShieldError::Internal(format!("Failed to list API keys: {}", e)))?;

    let mut keys = Vec::new();
    for row in rows {
        keys.push(row.map_err(|e| ShieldError::Internal(format!("Failed to read key row: {}", e)))?);
    }
    Ok(keys)
}

/// Delete is scoped to the tenant so one tenant can never remove another's key.
pub fn delete_api_key(db: &Database, tenant_id: &str, key_id: &str) -> Result<()> {
    let conn = db.get_connection();
    let guard = conn
        .lock()
        .map_err(|e| ShieldError::Internal(format!("Database lock error: {}", e)))?;

    guard
        .execute(
            "DELETE FROM api_keys WHERE id = ?1 AND tenant_id = ?2",
            [key_id, tenant_id],
        )
        .map_err(|e| ShieldError::Internal(format!("Failed to delete API key: {}", e)))?;

    Ok(())
}

fn map_key_row(row: &rusqlite::Row<'_>) -> rusqlite::Result<ApiKeyRecord> {
    Ok(ApiKeyRecord {
        id: row.get(0)?,
        tenant_id: row.get(1)?,
        provider: Provider::parse(&row.get::<_, String>(2)?).unwrap_or(Provider::OpenAi),
        encrypted_key: row.get(3)?,
        masked_key: row.get(4)?,
        base_url: row.get(5)?,
        is_active: row.get::<_, i64>(6)? != 0,
        last_verified: row.get(7)?,
        created_at: row.get(8)?,
    })
}

/// Active credential for (tenant, provider). When several exist the newest
/// wins, so a freshly rotated key takes effect immediately.
pub fn find_active_key(
    db: &Database,
    tenant_id: &str,
    provider: Provider,
) -> Result<Option<ApiKeyRecord>> {
    let conn = db.get_connection();
    let guard = conn
        .lock()
        .map_err(|e| ShieldError::Internal(format!("Database lock error: {}", e)))?;

    let result = guard.query_row(
        "SELECT id, tenant_id, provider, encrypted_key, masked_key, base_url, is_active, last_verified, created_at
         FROM api_keys
         WHERE tenant_id = ?1 AND provider = ?2 AND is_active = 1
         ORDER BY created_at DESC
         LIMIT 1",
        [tenant_id, provider.as_str()],
        map_key_row,
    );

    match result {
        Ok(key) => Ok(Some(key)),
        Err(rusqlite::Error::QueryReturnedNoRows) => Ok(None),
        Err(e) => Err(ShieldError::Internal(format!(
            "Failed to look up API key: {}",
            e
        ))),
    }
}

pub fn load_api_key(db: &Database, tenant_id: &str, key_id: &str) -> Result<Option<ApiKeyRecord>> {
    let conn = db.get_connection();
    let guard = conn
        .lock()
        .map_err(|e| ShieldError::Internal(format!("Database lock error: {}", e)))?;

    let result = guard.query_row(
        "SELECT id, tenant_id, provider, encrypted_key, masked_key, base_url, is_active, last_verified, created_at
         FROM api_keys WHERE id = ?1 AND tenant_id = ?2",
        [key_id, tenant_id],
        map_key_row,
    );

    match result {
        Ok(key) => Ok(Some(key)),
        Err(rusqlite::Error::QueryReturnedNoRows) => Ok(None),
        Err(e) => Err(ShieldError::Internal(format!(
            "Failed to load API key: {}",
            e
        ))),
    }
}

pub fn mark_key_verified(db: &Database, key_id: &str) -> Result<()> {
    let conn = db.get_connection();
    let guard = conn
        .lock()
        .map_err(|e| ShieldError::Internal(format!("Database lock error: {}", e)))?;

    guard
        .execute(
            "UPDATE api_keys SET last_verified = ?1 WHERE id = ?2",
            rusqlite::params![chrono::Utc::now().to_rfc3339(), key_id],
        )
        .map_err(|e| ShieldError::Internal(format!("Failed to update API key: {}", e)))?;

    Ok(())
}
