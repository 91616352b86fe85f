// Audit recorder - append-only trail of dispatch attempts
//
// What gets persisted is decided once per request by the tenant's retention
// mode. Raw prompt and response text are only ever written under FULL; this
// is a compliance invariant enforced at the write site, not in the handlers.

use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::db::Database;
use crate::error::{Result, ShieldError};
use crate::types::{Provider, StorageMode};

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AuditLogEntry {
    pub id: String,
    pub tenant_id: String,
    pub user_id: String,
    pub provider: Provider,
    pub timestamp: String,
    pub tokens_used: i64,
    pub redaction_count: i64,
    pub categories_triggered: Vec<String>,
    pub estimated_cost_usd: f64,
    pub redacted_prompt: Option<String>,
    pub raw_prompt: Option<String>,
    pub ai_response: Option<String>,
}

/// Everything the orchestrator knows at audit time. The recorder, not the
/// caller, decides which text fields survive.
pub struct AuditEvent<'a> {
    pub tenant_id: &'a str,
    pub user_id: &'a str,
    pub provider: Provider,
    pub tokens_used: i64,
    pub redaction_count: i64,
    pub categories_triggered: &'a [String],
    pub estimated_cost_usd: f64,
    pub retention: StorageMode,
    pub redacted_prompt: &'a str,
    pub raw_prompt: &'a str,
    pub ai_response: &'a str,
}

pub fn record(db: &Database, event: AuditEvent<'_>) -> Result<AuditLogEntry> {
    let (redacted_prompt, raw_prompt, ai_response) = match event.retention {
        StorageMode::None => (None, None, None),
        StorageMode::RedactedOnly => (Some(event.redacted_prompt.to_string()), None, None),
        StorageMode::Full => (
            Some(event.redacted_prompt.to_string()),
            Some(event.raw_prompt.to_string()),
            Some(event.ai_response.to_string()),
        ),
    };

    let id = Uuid::new_v4().to_string();
    let timestamp = chrono::Utc::now().to_rfc3339();
    let categories_json = serde_json::to_string(event.categories_triggered)
        .map_err(|e| ShieldError::Persistence(format!("Failed to encode categories: {}", e)))?;

    let conn = db.get_connection();
    let guard = conn
        .lock()
        .map_err(|e| ShieldError::Persistence(format!("Database lock error: {}", e)))?;

    guard
        .execute(
            "INSERT INTO audit_logs (
                id, tenant_id, user_id, provider, timestamp,
                tokens_used, redaction_count, categories_json, estimated_cost_usd,
                redacted_prompt, raw_prompt, ai_response
            ) VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, ?11, ?12)",
            rusqlite::params![
                id,
                event.tenant_id,
                event.user_id,
                event.provider.as_str(),
                timestamp,
                event.tokens_used,
                event.redaction_count,
                categories_json,
                event.estimated_cost_usd,
                redacted_prompt,
                raw_prompt,
                ai_response
            ],
        )
        .map_err(|e| ShieldError::Persistence(format!("Failed to write audit entry: {}", e)))?;

    Ok(AuditLogEntry {
        id,
        tenant_id: event.tenant_id.to_string(),
        user_id: event.user_id.to_string(),
        provider: event.provider,
        timestamp,
        tokens_used: event.tokens_used,
        redaction_count: event.redaction_count,
        categories_triggered: event.categories_triggered.to_vec(),
        estimated_cost_usd: event.estimated_cost_usd,
        redacted_prompt,
        raw_prompt,
        ai_response,
    })
}

/// Optional filters for the admin listing.
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AuditFilter {
    pub user_id: Option<String>,
    pub provider: Option<Provider>,
    pub start_date: Option<String>,
    pub end_date: Option<String>,
}

/// Newest first, capped at 500 rows. There is deliberately no update or
/// delete counterpart to this listing.
pub fn list_entries(
    db: &Database,
    tenant_id: &str,
    filter: &AuditFilter,
) -> Result<Vec<AuditLogEntry>> {
    let mut sql = String::from(
        "SELECT id, tenant_id, user_id, provider, timestamp,
                tokens_used, redaction_count, categories_json, estimated_cost_usd,
                redacted_prompt, raw_prompt, ai_response
         FROM audit_logs WHERE tenant_id = ?1",
    );
    let mut params: Vec<String> = vec![tenant_id.to_string()];

    if let Some(user_id) = &filter.user_id {
        params.push(user_id.clone());
        sql.push_str(&format!(" AND user_id = ?{}", params.len()));
    }
    if let Some(provider) = filter.provider {
        params.push(provider.as_str().to_string());
        sql.push_str(&format!(" AND provider = ?{}", params.len()));
    }
    if let Some(start) = &filter.start_date {
        params.push(start.clone());
        sql.push_str(&format!(" AND timestamp >= ?{}", params.len()));
    }
    if let Some(end) = &filter.end_date {
        params.push(end.clone());
        sql.push_str(&format!(" AND timestamp <= ?{}", params.len()));
    }
    sql.push_str(" ORDER BY timestamp DESC LIMIT 500");

    let conn = db.get_connection();
    let guard = conn
        .lock()
        .map_err(|e| ShieldError::Internal(format!("Database lock error: {}", e)))?;

    let mut stmt = guard
        .prepare(&sql)
        .map_err(|e| ShieldError::Internal(format!("Failed to query audit log: {}", e)))?;

    let rows = stmt
        .query_map(rusqlite::params_from_iter(params.iter()), |row| {
            Ok(AuditLogEntry {
                id: row.get(0)?,
                tenant_id: row.get(1)?,
                user_id: row.get(2)?,
                provider: Provider::parse(&row.get::<_, String>(3)?)
                    .unwrap_or(Provider::OpenAi),
                timestamp: row.get(4)?,
                tokens_used: row.get(5)?,
                redaction_count: row.get(6)?,
                categories_triggered: serde_json::from_str(&row.get::<_, String>(7)?)
                    .unwrap_or_default(),
                estimated_cost_usd: row.get(8)?,
                redacted_prompt: row.get(9)?,
                raw_prompt: row.get(10)?,
                ai_response: row.get(11)?,
            })
        })
        .map_err(|e| ShieldError::Internal(format!("Failed to query audit log: {}", e)))?;

    let mut entries = Vec::new();
    for row in rows {
        entries
            .push(row.map_err(|e| ShieldError::Internal(format!("Failed to read audit row: {}", e)))?);
    }
    Ok(entries)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::store::{create_tenant, create_user};
    use crate::types::{Role, StorageMode};

    fn event<'a>(tenant_id: &'a str, user_id: &'a str, retention: StorageMode) -> AuditEvent<'a> {
        AuditEvent {
            tenant_id,
            user_id,
            provider: Provider::OpenAi,
            tokens_used: 42,
            redaction_count: 2,
            categories_triggered: &[],
            estimated_cost_usd: 0.00126,
            retention,
            redacted_prompt: "hello [EMAIL_REDACTED]",
            raw_prompt: "hello jane@co.com",
            ai_response: "hi there",
        }
    }

    fn setup() -> (Database, String, String) {
        let db = Database::open_in_memory().unwrap();
        let tenant = create_tenant(&db, "Acme", "acme.test", 1000, StorageMode::None, &[]).unwrap();
        let user = create_user(&db, &tenant.id, "a@acme.test", None, Role::User, 1000).unwrap();
        (db, tenant.id, user.id)
    }

    #[test]
    fn test_mode_none_stores_metadata_only() {
        let (db, tenant_id, user_id) = setup();
        let entry = record(&db, event(&tenant_id, &user_id, StorageMode::None)).unwrap();
        assert!(entry.redacted_prompt.is_none());
        assert!(entry.raw_prompt.is_none());
        assert!(entry.ai_response.is_none());
        assert_eq!(entry.tokens_used, 42);

        let stored = &list_entries(&db, &tenant_id, &AuditFilter::default()).unwrap()[0];
        assert!(stored.raw_prompt.is_none());
        assert!(stored.ai_response.is_none());
    }

    #[test]
    fn test_mode_redacted_only_never_stores_raw() {
        let (db, tenant_id, user_id) = setup();
        record(&db, event(&tenant_id, &user_id, StorageMode::RedactedOnly)).unwrap();

        let stored = &list_entries(&db, &tenant_id, &AuditFilter::default()).unwrap()[0];
        assert_eq!(
            stored.redacted_prompt.as_deref(),
            Some("hello [EMAIL_REDACTED]")
        );
        assert!(stored.raw_prompt.is_none());
        assert!(stored.ai_response.is_none());
    }

    #[test]
    fn test_mode_full_stores_raw_verbatim() {
        let (db, tenant_id, user_id) = setup();
        record(&db, event(&tenant_id, &user_id, StorageMode::Full)).unwrap();

        let stored = &list_entries(&db, &tenant_id, &AuditFilter::default()).unwrap()[0];
        assert_eq!(stored.raw_prompt.as_deref(), Some("hello jane@co.com"));
        assert_eq!(stored.ai_response.as_deref(), Some("hi there"));
    }

    #[test]
    fn test_listing_filters_by_user_and_provider() {
        let (db, tenant_id, user_id) = setup();
        record(&db, event(&tenant_id, &user_id, StorageMode::None)).unwrap();
        let mut gemini = event(&tenant_id, &user_id, StorageMode::None);
        gemini.provider = Provider::Gemini;
        record(&db, gemini).unwrap();

        let all = list_entries(&db, &tenant_id, &AuditFilter::default()).unwrap();
        assert_eq!(all.len(), 2);

        let only_gemini = list_entries(
            &db,
            &tenant_id,
            &AuditFilter {
                provider: Some(Provider::Gemini),
                ..Default::default()
            },
        )
        .unwrap();
        assert_eq!(only_gemini.len(), 1);

        let other_user = list_entries(
            &db,
            &tenant_id,
            &AuditFilter {
                user_id: Some("nobody".to_string()),
                ..Default::default()
            },
        )
        .unwrap();
        assert!(other_user.is_empty());
    }
}
