// Database migrations

use rusqlite::{Connection, Result};

pub fn run_migrations(conn: &Connection) -> Result<()> {
    // Create migrations table to track version
    conn.execute(
        "CREATE TABLE IF NOT EXISTS schema_migrations (
            version INTEGER PRIMARY KEY,
            applied_at TEXT NOT NULL DEFAULT (datetime('now'))
        )",
        [],
    )?;

    let current_version = get_current_version(conn)?;

    if current_version < 1 {
        migration_001_initial_schema(conn)?;
        set_version(conn, 1)?;
    }

    if current_version < 2 {
        migration_002_add_key_base_url(conn)?;
        set_version(conn, 2)?;
    }

    if current_version < 3 {
        migration_003_add_usage_indexes(conn)?;
        set_version(conn, 3)?;
    }

    Ok(())
}

fn get_current_version(conn: &Connection) -> Result<i32> {
    let mut stmt = conn.prepare("SELECT MAX(version) FROM schema_migrations")?;
    let version: Option<i32> = stmt.query_row([], |row| row.get(0))?;
    Ok(version.unwrap_or(0))
}

fn set_version(conn: &Connection, version: i32) -> Result<()> {
    conn.execute(
        "INSERT OR REPLACE INTO schema_migrations (version, applied_at) VALUES (?1, datetime('now'))",
        [version],
    )?;
    Ok(())
}

fn migration_001_initial_schema(conn: &Connection) -> Result<()> {
    // Tenants
    conn.execute(
        "CREATE TABLE IF NOT EXISTS tenants (
            id TEXT PRIMARY KEY,
            name TEXT NOT NULL,
            domain TEXT NOT NULL UNIQUE,
            daily_token_budget INTEGER NOT NULL DEFAULT 1000000,
            prompt_storage_mode TEXT NOT NULL DEFAULT 'NONE',
            custom_blacklist_json TEXT NOT NULL DEFAULT '[]',
            created_at TEXT NOT NULL DEFAULT (datetime('now')),
            updated_at TEXT NOT NULL DEFAULT (datetime('now'))
        )",
        [],
    )?;

    // Users (one tenant each; email unique within the tenant)
    conn.execute(
        "CREATE TABLE IF NOT EXISTS users (
            id TEXT PRIMARY KEY,
            tenant_id TEXT NOT NULL REFERENCES tenants(id),
            email TEXT NOT NULL,
            name TEXT,
            role TEXT NOT NULL DEFAULT 'USER',
            daily_token_limit INTEGER NOT NULL DEFAULT 50000,
            created_at TEXT NOT NULL DEFAULT (datetime('now')),
            UNIQUE(tenant_id, email)
        )",
        [],
    )?;

    // Provider credentials, ciphertext only
    conn.execute(
        "CREATE TABLE IF NOT EXISTS api_keys (
            id TEXT PRIMARY KEY,
            tenant_id TEXT NOT NULL REFERENCES tenants(id),
            provider TEXT NOT NULL,
            encrypted_key TEXT NOT NULL,
            masked_key TEXT NOT NULL,
            is_active INTEGER NOT NULL DEFAULT 1,
            last_verified TEXT,
            created_at TEXT NOT NULL DEFAULT (datetime('now'))
        )",
        [],
    )?;

    // Daily usage counters; one row per (tenant, user, day)
    conn.execute(
        "CREATE TABLE IF NOT EXISTS token_usage (
            id TEXT PRIMARY KEY,
            tenant_id TEXT NOT NULL REFERENCES tenants(id),
            user_id TEXT NOT NULL REFERENCES users(id),
            day TEXT NOT NULL,
            tokens_used INTEGER NOT NULL DEFAULT 0,
            redaction_count INTEGER NOT NULL DEFAULT 0,
            request_count INTEGER NOT NULL DEFAULT 0,
            UNIQUE(tenant_id, user_id, day)
        )",
        [],
    )?;

    // Append-only audit trail
    conn.execute(
        "CREATE TABLE IF NOT EXISTS audit_logs (
            id TEXT PRIMARY KEY,
            tenant_id TEXT NOT NULL REFERENCES tenants(id),
            user_id TEXT NOT NULL REFERENCES users(id),
            provider TEXT NOT NULL,
            timestamp TEXT NOT NULL DEFAULT (datetime('now')),
            tokens_used INTEGER NOT NULL DEFAULT 0,
            redaction_count INTEGER NOT NULL DEFAULT 0,
            categories_json TEXT NOT NULL DEFAULT '[]',
            estimated_cost_usd REAL NOT NULL DEFAULT 0,
            redacted_prompt TEXT,
            raw_prompt TEXT,
            ai_response TEXT
        )",
        [],
    )?;

    conn.execute(
        "CREATE INDEX IF NOT EXISTS idx_api_keys_tenant_provider ON api_keys(tenant_id, provider)",
        [],
    )?;

    conn.execute(
        "CREATE INDEX IF NOT EXISTS idx_audit_logs_tenant_timestamp ON audit_logs(tenant_id, timestamp)",
        [],
    )?;

    Ok(())
}

fn migration_002_add_key_base_url(conn: &Connection) -> Result<()> {
    // Optional per-key endpoint override (self-hosted gateways, regional endpoints)
    conn.execute("ALTER TABLE api_keys ADD COLUMN base_url TEXT", [])
        .ok(); // Ignore error if column already exists

    Ok(())
}

fn migration_003_add_usage_indexes(conn: &Connection) -> Result<()> {
    conn.execute(
        "CREATE INDEX IF NOT EXISTS idx_token_usage_tenant_day ON token_usage(tenant_id, day)",
        [],
    )?;

    Ok(())
}
