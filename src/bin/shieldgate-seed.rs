// One-time demo seed: creates a tenant with an admin and a regular user.
// Run with: cargo run --bin shieldgate-seed

use anyhow::{Context, Result};
use std::path::PathBuf;

use shieldgate::store;
use shieldgate::types::{Role, StorageMode};
use shieldgate::{CredentialVault, Database, Provider};

fn resolve_db_path() -> PathBuf {
    std::env::var("SHIELDGATE_DB")
        .map(PathBuf::from)
        .unwrap_or_else(|_| PathBuf::from("shieldgate.db"))
}

fn main() -> Result<()> {
    let db_path = resolve_db_path();
    println!("Database path: {:?}", db_path);

    let db = Database::new(db_path).context("Failed to open database")?;

    let domain = "shieldgate.local";

    // Check if the demo tenant already exists
    let existing: Option<String> = {
        let conn = db.get_connection();
        let guard = conn
            .lock()
            .map_err(|e| anyhow::anyhow!("Database lock error: {}", e))?;
        guard
            .query_row(
                "SELECT id FROM tenants WHERE domain = ?1",
                [domain],
                |row| row.get(0),
            )
            .ok()
    };

    let tenant_id = if let Some(id) = existing {
        println!("Tenant already exists with ID: {}", id);
        id
    } else {
        let tenant = store::create_tenant(
            &db,
            "Shieldgate Demo",
            domain,
            1_000_000,
            StorageMode::None,
            &["Project Alpha".to_string(), "Confidential".to_string()],
        )
        .map_err(|e| anyhow::anyhow!("Failed to create tenant: {}", e))?;
        println!("Created tenant: {} ({})", tenant.name, tenant.id);

        let admin = store::create_user(
            &db,
            &tenant.id,
            "admin@shieldgate.local",
            Some("Super Admin"),
            Role::SuperAdmin,
            100_000,
        )
        .map_err(|e| anyhow::anyhow!("Failed to create admin: {}", e))?;
        println!("Created admin user: {} ({})", admin.email, admin.id);

        let user = store::create_user(
            &db,
            &tenant.id,
            "user@shieldgate.local",
            Some("Test User"),
            Role::User,
            50_000,
        )
        .map_err(|e| anyhow::anyhow!("Failed to create user: {}", e))?;
        println!("Created regular user: {} ({})", user.email, user.id);

        tenant.id
    };

    // Optionally store a demo OpenAI key when both secrets are present
    if let Ok(api_key) = std::env::var("SHIELDGATE_SEED_OPENAI_KEY") {
        let vault =
            CredentialVault::from_env().map_err(|e| anyhow::anyhow!("Vault unavailable: {}", e))?;
        let summary = store::create_api_key(
            &db,
            &vault,
            &tenant_id,
            Provider::OpenAi,
            &api_key,
            None,
        )
        .map_err(|e| anyhow::anyhow!("Failed to store API key: {}", e))?;
        println!("Stored OpenAI key: {}", summary.masked_key);
    }

    println!();
    println!("Seeding completed. Pass the printed IDs as x-tenant-id / x-user-id headers.");
    Ok(())
}
