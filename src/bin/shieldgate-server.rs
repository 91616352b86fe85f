// Standalone HTTP server.
// Use: cargo run --bin shieldgate-server
//
// Requires SHIELDGATE_ENCRYPTION_KEY; refuses to start without it.

use std::env;
use std::path::PathBuf;
use std::sync::Arc;

use shieldgate::http_server::{run_http_server, AppState};
use shieldgate::{CredentialVault, Database, Orchestrator, RedactionEngine};

fn resolve_db_path() -> PathBuf {
    if let Ok(p) = env::var("SHIELDGATE_DB") {
        let path = PathBuf::from(p);
        if let Some(parent) = path.parent() {
            let _ = std::fs::create_dir_all(parent);
        }
        return path;
    }
    PathBuf::from("shieldgate.db")
}

/// Try to bind to a port, returning the actual port used
async fn try_bind_port(start_port: u16) -> u16 {
    let mut port = start_port;
    for _ in 0..10 {
        match tokio::net::TcpListener::bind(format!("0.0.0.0:{}", port)).await {
            Ok(listener) => {
                // Successfully bound, drop the listener so the server can use it
                drop(listener);
                return port;
            }
            Err(_) => {
                tracing::warn!(port, "port in use, trying next");
                port += 1;
            }
        }
    }
    // Return the last tried port, let the server fail with a clear message
    port
}

#[tokio::main]
async fn main() {
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("shieldgate=info")),
        )
        .init();

    let vault = match CredentialVault::from_env() {
        Ok(v) => v,
        Err(e) => {
            tracing::error!(error = %e, "refusing to start without a master secret");
            std::process::exit(1);
        }
    };

    let db_path = resolve_db_path();
    tracing::info!(path = %db_path.display(), "opening database");
    let db = match Database::new(db_path) {
        Ok(db) => db,
        Err(e) => {
            tracing::error!(error = %e, "failed to initialize database");
            std::process::exit(1);
        }
    };

    let vault = Arc::new(vault);
    let mut orchestrator = Orchestrator::new(
        db.clone(),
        Arc::new(RedactionEngine::new()),
        vault.clone(),
    );
    if let Some(secs) = env::var("SHIELDGATE_DISPATCH_TIMEOUT_SECS")
        .ok()
        .and_then(|s| s.parse().ok())
    {
        orchestrator = orchestrator.with_dispatch_timeout(secs);
    }

    let preferred_port: u16 = env::var("SHIELDGATE_HTTP_PORT")
        .ok()
        .and_then(|s| s.parse().ok())
        .unwrap_or(3001);
    let port = try_bind_port(preferred_port).await;

    let state = AppState {
        db,
        orchestrator: Arc::new(orchestrator),
        vault,
    };

    run_http_server(state, port).await;
}
