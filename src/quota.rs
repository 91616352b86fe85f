// Quota ledger - daily token accounting per (tenant, user, day)
//
// Cost is only known after the provider responds, so the check runs against
// prior usage and the commit applies actual usage afterwards. A single
// request may therefore overshoot a limit once; the next request is blocked.

use chrono::Utc;
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::db::Database;
use crate::error::{Result, ShieldError};
use crate::types::{Tenant, User};

/// UTC calendar day used as the ledger key.
pub fn today_key() -> String {
    Utc::now().format("%Y-%m-%d").to_string()
}

/// Tenant-wide totals for one day, used by the usage endpoint.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct UsageTotals {
    pub tokens_used: i64,
    pub redaction_count: i64,
    pub request_count: i64,
}

fn user_tokens_used(
    conn: &rusqlite::Connection,
    tenant_id: &str,
    user_id: &str,
    day: &str,
) -> rusqlite::Result<i64> {
    conn.query_row(
        "SELECT COALESCE(SUM(tokens_used), 0) FROM token_usage
         WHERE tenant_id = ?1 AND user_id = ?2 AND day = ?3",
        [tenant_id, user_id, day],
        |row| row.get(0),
    )
}

fn tenant_tokens_used(
    conn: &rusqlite::Connection,
    tenant_id: &str,
    day: &str,
) -> rusqlite::Result<i64> {
    conn.query_row(
        "SELECT COALESCE(SUM(tokens_used), 0) FROM token_usage
         WHERE tenant_id = ?1 AND day = ?2",
        [tenant_id, day],
        |row| row.get(0),
    )
}

/// Pre-dispatch check. The user limit is evaluated before the tenant budget,
/// and each violation reports its own used/limit pair.
pub fn check_quota(db: &Database, tenant: &Tenant, user: &User, day: &str) -> Result<()> {
    let conn = db.get_connection();
    let guard = conn
        .lock()
        .map_err(|e| ShieldError::Internal(format!("Database lock error: {}", e)))?;

    let used = user_tokens_used(&guard, &tenant.id, &user.id, day)
        .map_err(|e| ShieldError::Internal(format!("Failed to read user usage: {}", e)))?;
    if used >= user.daily_token_limit {
        return Err(ShieldError::UserQuotaExceeded {
            limit: user.daily_token_limit,
            used,
        });
    }

    let tenant_used = tenant_tokens_used(&guard, &tenant.id, day)
        .map_err(|e| ShieldError::Internal(format!("Failed to read tenant usage: {}", e)))?;
    if tenant_used >= tenant.daily_token_budget {
        return Err(ShieldError::TenantBudgetExceeded {
            budget: tenant.daily_token_budget,
            used: tenant_used,
        });
    }

    Ok(())
}

/// Post-dispatch commit. A single conflict-upsert under the connection mutex,
/// so concurrent commits for the same key never lose an increment.
pub fn commit_usage(
    db: &Database,
    tenant_id: &str,
    user_id: &str,
    day: &str,
    tokens_used: i64,
    redaction_count: i64,
) -> Result<()> {
    let conn = db.get_connection();
    let guard = conn
        .lock()
        .map_err(|e| ShieldError::Persistence(format!("Database lock error: {}", e)))?;

    guard
        .execute(
            "INSERT INTO token_usage (id, tenant_id, user_id, day, tokens_used, redaction_count, request_count)
             VALUES (?1, ?2, ?3, ?4, ?5, ?6, 1)
             ON CONFLICT(tenant_id, user_id, day) DO UPDATE SET
                 tokens_used = tokens_used + excluded.tokens_used,
                 redaction_count = redaction_count + excluded.redaction_count,
                 request_count = request_count + 1",
            rusqlite::params![
                Uuid::new_v4().to_string(),
                tenant_id,
                user_id,
                day,
                tokens_used,
                redaction_count
            ],
        )
        .map_err(|e| ShieldError::Persistence(format!("Failed to commit usage: {}", e)))?;

    Ok(())
}

pub fn usage_totals(db: &Database, tenant_id: &str, day: &str) -> Result<UsageTotals> {
    let conn = db.get_connection();
    let guard = conn
        .lock()
        .map_err(|e| ShieldError::Internal(format!("Database lock error: {}", e)))?;

    guard
        .query_row(
            "SELECT COALESCE(SUM(tokens_used), 0), COALESCE(SUM(redaction_count), 0), COALESCE(SUM(request_count), 0)
             FROM token_usage WHERE tenant_id = ?1 AND day = ?2",
            [tenant_id, day],
            |row| {
                Ok(UsageTotals {
                    tokens_used: row.get(0)?,
                    redaction_count: row.get(1)?,
                    request_count: row.get(2)?,
                })
            },
        )
        .map_err(|e| ShieldError::Internal(format!("Failed to read usage totals: {}", e)))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::store::{create_tenant, create_user};
    use crate::types::{Role, StorageMode};

    fn setup(user_limit: i64, tenant_budget: i64) -> (Database, Tenant, User) {
        let db = Database::open_in_memory().unwrap();
        let tenant = create_tenant(
            &db,
            "Acme",
            "acme.test",
            tenant_budget,
            StorageMode::None,
            &[],
        )
        .unwrap();
        let user =
            create_user(&db, &tenant.id, "a@acme.test", None, Role::User, user_limit).unwrap();
        (db, tenant, user)
    }

    #[test]
    fn test_soft_limit_allows_one_overshoot() {
        let (db, tenant, user) = setup(100, 1_000_000);
        let day = today_key();

        // 0 used: allowed even though the call will report 150 tokens
        check_quota(&db, &tenant, &user, &day).unwrap();
        commit_usage(&db, &tenant.id, &user.id, &day, 150, 0).unwrap();

        // Next request is rejected with the overshoot visible
        let err = check_quota(&db, &tenant, &user, &day).unwrap_err();
        match err {
            ShieldError::UserQuotaExceeded { limit, used } => {
                assert_eq!(limit, 100);
                assert_eq!(used, 150);
            }
            other => panic!("unexpected error: {:?}", other),
        }
    }

    #[test]
    fn test_tenant_budget_uses_prior_aggregate() {
        let (db, tenant, user) = setup(1_000_000, 1000);
        let other =
            create_user(&db, &tenant.id, "b@acme.test", None, Role::User, 1_000_000).unwrap();
        let day = today_key();

        // Other users have consumed 950 of the 1000 budget
        commit_usage(&db, &tenant.id, &other.id, &day, 950, 0).unwrap();

        // 950 < 1000: still dispatched
        check_quota(&db, &tenant, &user, &day).unwrap();
        commit_usage(&db, &tenant.id, &user.id, &day, 200, 0).unwrap();

        // Aggregate is now 1150 >= 1000: everyone is rejected
        let err = check_quota(&db, &tenant, &other, &day).unwrap_err();
        match err {
            ShieldError::TenantBudgetExceeded { budget, used } => {
                assert_eq!(budget, 1000);
                assert_eq!(used, 1150);
            }
            other => panic!("unexpected error: {:?}", other),
        }
    }

    #[test]
    fn test_commit_accumulates_counters() {
        let (db, tenant, user) = setup(1_000_000, 1_000_000);
        let day = today_key();

        commit_usage(&db, &tenant.id, &user.id, &day, 10, 2).unwrap();
        commit_usage(&db, &tenant.id, &user.id, &day, 30, 1).unwrap();

        let totals = usage_totals(&db, &tenant.id, &day).unwrap();
        assert_eq!(totals.tokens_used, 40);
        assert_eq!(totals.redaction_count, 3);
        assert_eq!(totals.request_count, 2);
    }

    #[test]
    fn test_days_are_isolated() {
        let (db, tenant, user) = setup(100, 1_000_000);

        commit_usage(&db, &tenant.id, &user.id, "2026-01-01", 500, 0).unwrap();

        // Usage from another day does not count against today
        check_quota(&db, &tenant, &user, &today_key()).unwrap();
    }

    #[test]
    fn test_concurrent_commits_do_not_lose_updates() {
        let (db, tenant, user) = setup(1_000_000, 1_000_000);
        let day = today_key();

        let mut handles = Vec::new();
        for _ in 0..8 {
            let db = db.clone();
            let tenant_id = tenant.id.clone();
            let user_id = user.id.clone();
            let day = day.clone();
            handles.push(std::thread::spawn(move || {
                for _ in 0..25 {
                    commit_usage(&db, &tenant_id, &user_id, &day, 1, 1).unwrap();
                }
            }));
        }
        for handle in handles {
            handle.join().unwrap();
        }

        let totals = usage_totals(&db, &tenant.id, &day).unwrap();
        assert_eq!(totals.tokens_used, 200);
        assert_eq!(totals.request_count, 200);
    }
}
