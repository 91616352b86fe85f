// HTTP server - exposes the mediation pipeline plus a small admin surface
//
// Authentication is out of scope: callers arrive already authenticated and
// identified by the x-tenant-id / x-user-id / x-role headers, which an
// upstream session layer is expected to set.

use axum::{
    extract::{Query, State},
    http::{HeaderMap, StatusCode},
    response::{IntoResponse, Response},
    routing::{get, post},
    Json, Router,
};
use serde_json::json;
use std::net::SocketAddr;
use std::sync::Arc;
use tower_http::cors::{Any, CorsLayer};

use crate::audit::{self, AuditFilter};
use crate::db::Database;
use crate::error::ShieldError;
use crate::orchestrator::{ChatRequest, Orchestrator};
use crate::providers::get_adapter;
use crate::quota;
use crate::shield::{sanitize_error_message, security_score};
use crate::store;
use crate::types::{CallerIdentity, Provider, Role};
use crate::vault::CredentialVault;

#[derive(Clone)]
pub struct AppState {
    pub db: Database,
    pub orchestrator: Arc<Orchestrator>,
    pub vault: Arc<CredentialVault>,
}

pub fn build_router(state: AppState) -> Router {
    let cors = CorsLayer::new()
        .allow_origin(Any)
        .allow_methods(Any)
        .allow_headers(Any);

    Router::new()
        .route("/", get(root))
        .route("/api/health", get(health))
        .route("/api/version", get(version))
        // The pipeline
        .route("/api/chat", post(chat))
        // Admin surface
        .route("/api/keys", get(list_keys).post(create_key).delete(delete_key))
        .route("/api/keys/verify", post(verify_key))
        .route("/api/audit", get(list_audit))
        .route("/api/usage", get(usage))
        .layer(cors)
        .with_state(state)
}

pub async fn run_http_server(state: AppState, port: u16) {
    let app = build_router(state);

    let addr = SocketAddr::from(([0, 0, 0, 0], port));
    let listener = match tokio::net::TcpListener::bind(addr).await {
        Ok(l) => l,
        Err(e) => {
            tracing::error!(port, error = %e, "failed to bind HTTP server");
            return;
        }
    };
    tracing::info!(port, "shieldgate listening");
    if let Err(e) = axum::serve(listener, app).await {
        tracing::error!(error = %e, "HTTP server error");
    }
}

fn caller_from_headers(headers: &HeaderMap) -> Result<CallerIdentity, ShieldError> {
    let tenant_id = headers
        .get("x-tenant-id")
        .and_then(|v| v.to_str().ok())
        .filter(|s| !s.is_empty())
        .ok_or_else(|| ShieldError::Unauthorized("Missing x-tenant-id header".to_string()))?;
    let user_id = headers
        .get("x-user-id")
        .and_then(|v| v.to_str().ok())
        .filter(|s| !s.is_empty())
        .ok_or_else(|| ShieldError::Unauthorized("Missing x-user-id header".to_string()))?;
    let role = headers
        .get("x-role")
        .and_then(|v| v.to_str().ok())
        .and_then(Role::parse)
        .unwrap_or(Role::User);

    Ok(CallerIdentity {
        tenant_id: tenant_id.to_string(),
        user_id: user_id.to_string(),
        role,
    })
}

fn require_admin(caller: &CallerIdentity) -> Result<(), ShieldError> {
    if caller.role.is_admin() {
        Ok(())
    } else {
        Err(ShieldError::Unauthorized("Admin access required".to_string()))
    }
}

/// Map the error taxonomy onto HTTP. Quota errors carry their used/limit
/// numbers; provider errors carry the upstream status.
fn error_response(err: ShieldError) -> Response {
    let mut body = json!({
        "error": err.to_string(),
        "kind": err.kind(),
    });

    let status = match &err {
        ShieldError::Unauthorized(_) => StatusCode::UNAUTHORIZED,
        ShieldError::Validation(_) | ShieldError::Configuration(_) => StatusCode::BAD_REQUEST,
        ShieldError::UserQuotaExceeded { limit, used } => {
            body["limit"] = json!(limit);
            body["used"] = json!(used);
            StatusCode::TOO_MANY_REQUESTS
        }
        ShieldError::TenantBudgetExceeded { budget, used } => {
            body["budget"] = json!(budget);
            body["used"] = json!(used);
            StatusCode::TOO_MANY_REQUESTS
        }
        ShieldError::Provider { status, .. } => {
            body["upstreamStatus"] = json!(status);
            StatusCode::BAD_GATEWAY
        }
        ShieldError::Crypto(_) | ShieldError::Persistence(_) | ShieldError::Internal(_) => {
            StatusCode::INTERNAL_SERVER_ERROR
        }
    };

    (status, Json(body)).into_response()
}

async fn root() -> impl IntoResponse {
    Json(json!({
        "name": "Shieldgate API",
        "version": env!("CARGO_PKG_VERSION"),
        "status": "running",
        "endpoints": {
            "health": "GET /api/health",
            "chat": "POST /api/chat",
            "keys": "GET|POST|DELETE /api/keys",
            "verify": "POST /api/keys/verify",
            "audit": "GET /api/audit",
            "usage": "GET /api/usage"
        }
    }))
}

async fn health() -> impl IntoResponse {
    Json(json!({ "status": "ok" }))
}

async fn version() -> impl IntoResponse {
    Json(json!({ "version": env!("CARGO_PKG_VERSION") }))
}

async fn chat(
    State(state): State<AppState>,
    headers: HeaderMap,
    Json(body): Json<serde_json::Value>,
) -> Response {
    let caller = match caller_from_headers(&headers) {
        Ok(c) => c,
        Err(e) => return error_response(e),
    };
    let request: ChatRequest = match serde_json::from_value(body) {
        Ok(r) => r,
        Err(e) => {
            return error_response(ShieldError::Validation(format!("Invalid request: {}", e)))
        }
    };
    match state.orchestrator.handle_chat(&caller, request).await {
        Ok(response) => (StatusCode::OK, Json(response)).into_response(),
        Err(e) => error_response(e),
    }
}

async fn list_keys(State(state): State<AppState>, headers: HeaderMap) -> Response {
    let caller = match caller_from_headers(&headers).and_then(|c| {
        require_admin(&c)?;
        Ok(c)
    }) {
        Ok(c) => c,
        Err(e) => return error_response(e),
    };
    match store::list_api_keys(&state.db, &caller.tenant_id) {
        Ok(keys) => (StatusCode::OK, Json(keys)).into_response(),
        Err(e) => error_response(e),
    }
}

#[derive(serde::Deserialize)]
#[serde(rename_all = "camelCase")]
struct CreateKeyRequest {
    provider: String,
    api_key: String,
    base_url: Option<String>,
}

async fn create_key(
    State(state): State<AppState>,
    headers: HeaderMap,
    Json(body): Json<serde_json::Value>,
) -> Response {
    let caller = match caller_from_headers(&headers).and_then(|c| {
        require_admin(&c)?;
        Ok(c)
    }) {
        Ok(c) => c,
        Err(e) => return error_response(e),
    };
    let request: CreateKeyRequest = match serde_json::from_value(body) {
        Ok(r) => r,
        Err(e) => {
            return error_response(ShieldError::Validation(format!("Invalid request: {}", e)))
        }
    };
    let Some(provider) = Provider::parse(&request.provider) else {
        return error_response(ShieldError::Validation(format!(
            "Unknown provider: {}",
            request.provider
        )));
    };
    match store::create_api_key(
        &state.db,
        &state.vault,
        &caller.tenant_id,
        provider,
        &request.api_key,
        request.base_url.as_deref(),
    ) {
        Ok(summary) => (StatusCode::CREATED, Json(summary)).into_response(),
        Err(e) => error_response(e),
    }
}

async fn delete_key(
    State(state): State<AppState>,
    headers: HeaderMap,
    Query(params): Query<std::collections::HashMap<String, String>>,
) -> Response {
    let caller = match caller_from_headers(&headers).and_then(|c| {
        require_admin(&c)?;
        Ok(c)
    }) {
        Ok(c) => c,
        Err(e) => return error_response(e),
    };
    let Some(id) = params.get("id").filter(|s| !s.is_empty()) else {
        return error_response(ShieldError::Validation("Key ID required".to_string()));
    };
    match store::delete_api_key(&state.db, &caller.tenant_id, id) {
        Ok(()) => (StatusCode::OK, Json(json!({ "success": true }))).into_response(),
        Err(e) => error_response(e),
    }
}

#[derive(serde::Deserialize)]
struct VerifyKeyRequest {
    id: String,
}

async fn verify_key(
    State(state): State<AppState>,
    headers: HeaderMap,
    Json(body): Json<serde_json::Value>,
) -> Response {
    let caller = match caller_from_headers(&headers).and_then(|c| {
        require_admin(&c)?;
        Ok(c)
    }) {
        Ok(c) => c,
        Err(e) => return error_response(e),
    };
    let request: VerifyKeyRequest = match serde_json::from_value(body) {
        Ok(r) => r,
        Err(e) => {
            return error_response(ShieldError::Validation(format!("Invalid request: {}", e)))
        }
    };

    let record = match store::load_api_key(&state.db, &caller.tenant_id, &request.id) {
        Ok(Some(record)) => record,
        Ok(None) => {
            return (
                StatusCode::NOT_FOUND,
                Json(json!({ "error": "API key not found", "kind": "validation_failed" })),
            )
                .into_response()
        }
        Err(e) => return error_response(e),
    };

    let credential = match state.vault.decrypt(&record.encrypted_key) {
        Ok(c) => c,
        Err(e) => return error_response(e),
    };

    let adapter = get_adapter(record.provider, record.base_url.as_deref());
    match adapter.verify(&credential).await {
        Ok(()) => {
            if let Err(e) = store::mark_key_verified(&state.db, &record.id) {
                return error_response(e);
            }
            (
                StatusCode::OK,
                Json(json!({ "valid": true, "message": "API key is valid" })),
            )
                .into_response()
        }
        Err(e) => (
            StatusCode::OK,
            Json(json!({
                "valid": false,
                "message": sanitize_error_message(&e.to_string()),
            })),
        )
            .into_response(),
    }
}

async fn list_audit(
    State(state): State<AppState>,
    headers: HeaderMap,
    Query(filter): Query<AuditFilter>,
) -> Response {
    let caller = match caller_from_headers(&headers).and_then(|c| {
        require_admin(&c)?;
        Ok(c)
    }) {
        Ok(c) => c,
        Err(e) => return error_response(e),
    };
    match audit::list_entries(&state.db, &caller.tenant_id, &filter) {
        Ok(entries) => (StatusCode::OK, Json(entries)).into_response(),
        Err(e) => error_response(e),
    }
}

async fn usage(State(state): State<AppState>, headers: HeaderMap) -> Response {
    let caller = match caller_from_headers(&headers).and_then(|c| {
        require_admin(&c)?;
        Ok(c)
    }) {
        Ok(c) => c,
        Err(e) => return error_response(e),
    };
    let day = quota::today_key();
    match quota::usage_totals(&state.db, &caller.tenant_id, &day) {
        Ok(totals) => (
            StatusCode::OK,
            Json(json!({
                "date": day,
                "tokensUsed": totals.tokens_used,
                "redactionCount": totals.redaction_count,
                "requestCount": totals.request_count,
                "securityScore": security_score(totals.redaction_count, totals.request_count),
            })),
        )
            .into_response(),
        Err(e) => error_response(e),
    }
}
