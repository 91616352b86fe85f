// End-to-end pipeline tests: a real SQLite file, the full orchestrator, and
// a wiremock endpoint standing in for the provider.

use std::sync::Arc;

use serde_json::json;
use wiremock::matchers::{method, path};
use wiremock::{Mock, MockServer, ResponseTemplate};

use shieldgate::audit::{self, AuditFilter};
use shieldgate::orchestrator::ChatRequest;
use shieldgate::store;
use shieldgate::types::{CallerIdentity, Role, StorageMode};
use shieldgate::{CredentialVault, Database, Orchestrator, Provider, RedactionEngine};

struct Harness {
    _dir: tempfile::TempDir,
    db: Database,
    orchestrator: Orchestrator,
    tenant_id: String,
    caller: CallerIdentity,
}

fn harness(retention: StorageMode, user_limit: i64) -> Harness {
    let dir = tempfile::tempdir().unwrap();
    let db = Database::new(dir.path().join("pipeline.db")).unwrap();
    let vault = Arc::new(CredentialVault::new("pipeline-test-secret").unwrap());

    let tenant = store::create_tenant(
        &db,
        "Acme",
        "acme.test",
        1_000_000,
        retention,
        &["Project Alpha".to_string()],
    )
    .unwrap();
    let user = store::create_user(
        &db,
        &tenant.id,
        "jane@acme.test",
        None,
        Role::User,
        user_limit,
    )
    .unwrap();

    let orchestrator = Orchestrator::new(db.clone(), Arc::new(RedactionEngine::new()), vault)
        .with_dispatch_timeout(5);

    Harness {
        _dir: dir,
        db,
        caller: CallerIdentity {
            tenant_id: tenant.id.clone(),
            user_id: user.id,
            role: Role::User,
        },
        tenant_id: tenant.id,
        orchestrator,
    }
}

fn add_openai_key(h: &Harness, base_url: &str) {
    let vault = CredentialVault::new("pipeline-test-secret").unwrap();
    store::create_api_key(
        &h.db,
        &vault,
        &h.tenant_id,
        Provider::OpenAi,
        "sk-pipeline-test-key",
        Some(base_url),
    )
    .unwrap();
}

async fn mock_openai(tokens: i64) -> MockServer {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/v1/chat/completions"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "choices": [{ "message": { "content": "model reply" } }],
            "usage": { "total_tokens": tokens },
        })))
        .mount(&server)
        .await;
    server
}

fn chat(message: &str) -> ChatRequest {
    ChatRequest {
        message: message.to_string(),
        provider: Provider::OpenAi,
        model: None,
    }
}

#[tokio::test]
async fn sensitive_text_never_reaches_the_provider() {
    let h = harness(StorageMode::Full, 1_000_000);
    let server = mock_openai(40).await;
    add_openai_key(&h, &server.uri());

    let response = h
        .orchestrator
        .handle_chat(
            &h.caller,
            chat("Contact me at jane@co.com about Project Alpha"),
        )
        .await
        .unwrap();

    assert!(response.shield_active);
    assert_eq!(response.tokens_used, 40);
    assert!(response.redactions >= 2);

    // The wire request must carry placeholders, never the raw values
    let requests = server.received_requests().await.unwrap();
    assert_eq!(requests.len(), 1);
    let sent = String::from_utf8(requests[0].body.clone()).unwrap();
    assert!(sent.contains("[EMAIL_REDACTED]"));
    assert!(!sent.contains("jane@co.com"));
    assert!(!sent.to_lowercase().contains("project alpha"));
}

#[tokio::test]
async fn full_retention_stores_raw_prompt_verbatim() {
    let h = harness(StorageMode::Full, 1_000_000);
    let server = mock_openai(10).await;
    add_openai_key(&h, &server.uri());

    let raw = "email jane@co.com please";
    h.orchestrator.handle_chat(&h.caller, chat(raw)).await.unwrap();

    let entries = audit::list_entries(&h.db, &h.tenant_id, &AuditFilter::default()).unwrap();
    assert_eq!(entries.len(), 1);
    assert_eq!(entries[0].raw_prompt.as_deref(), Some(raw));
    assert_eq!(entries[0].ai_response.as_deref(), Some("model reply"));
    assert!(entries[0]
        .redacted_prompt
        .as_deref()
        .unwrap()
        .contains("[EMAIL_REDACTED]"));
}

#[tokio::test]
async fn none_retention_stores_metadata_only() {
    let h = harness(StorageMode::None, 1_000_000);
    let server = mock_openai(10).await;
    add_openai_key(&h, &server.uri());

    h.orchestrator
        .handle_chat(&h.caller, chat("email jane@co.com please"))
        .await
        .unwrap();

    let entries = audit::list_entries(&h.db, &h.tenant_id, &AuditFilter::default()).unwrap();
    assert_eq!(entries.len(), 1);
    assert!(entries[0].redacted_prompt.is_none());
    assert!(entries[0].raw_prompt.is_none());
    assert!(entries[0].ai_response.is_none());
    assert_eq!(entries[0].redaction_count, 1);
}

#[tokio::test]
async fn soft_limit_allows_overshoot_then_blocks() {
    let h = harness(StorageMode::None, 100);
    let server = mock_openai(150).await;
    add_openai_key(&h, &server.uri());

    // 0 used < 100: dispatched even though the call reports 150 tokens
    let first = h
        .orchestrator
        .handle_chat(&h.caller, chat("hello"))
        .await
        .unwrap();
    assert_eq!(first.tokens_used, 150);

    // 150 >= 100: rejected before any provider call
    let err = h
        .orchestrator
        .handle_chat(&h.caller, chat("hello again"))
        .await
        .unwrap_err();
    match err {
        shieldgate::ShieldError::UserQuotaExceeded { limit, used } => {
            assert_eq!(limit, 100);
            assert_eq!(used, 150);
        }
        other => panic!("unexpected error: {:?}", other),
    }

    // Only the first request reached the provider
    assert_eq!(server.received_requests().await.unwrap().len(), 1);
}

#[tokio::test]
async fn provider_failure_leaves_no_side_effects() {
    let h = harness(StorageMode::Full, 1_000_000);
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/v1/chat/completions"))
        .respond_with(ResponseTemplate::new(500).set_body_string("upstream exploded"))
        .mount(&server)
        .await;
    add_openai_key(&h, &server.uri());

    let err = h
        .orchestrator
        .handle_chat(&h.caller, chat("hello"))
        .await
        .unwrap_err();
    match err {
        shieldgate::ShieldError::Provider { status, .. } => assert_eq!(status, 500),
        other => panic!("unexpected error: {:?}", other),
    }

    // No audit row, no ledger commit: the request never happened
    let entries = audit::list_entries(&h.db, &h.tenant_id, &AuditFilter::default()).unwrap();
    assert!(entries.is_empty());
    let day = shieldgate::quota::today_key();
    let totals = shieldgate::quota::usage_totals(&h.db, &h.tenant_id, &day).unwrap();
    assert_eq!(totals.request_count, 0);
    assert_eq!(totals.tokens_used, 0);

    // A later request is still admitted (nothing was charged)
    let ok_server = mock_openai(5).await;
    store::delete_api_key(
        &h.db,
        &h.tenant_id,
        &store::list_api_keys(&h.db, &h.tenant_id).unwrap()[0].id,
    )
    .unwrap();
    add_openai_key(&h, &ok_server.uri());
    h.orchestrator.handle_chat(&h.caller, chat("retry")).await.unwrap();
}

#[tokio::test]
async fn missing_key_never_reaches_the_network() {
    let h = harness(StorageMode::None, 1_000_000);
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .respond_with(ResponseTemplate::new(200))
        .expect(0)
        .mount(&server)
        .await;

    let err = h
        .orchestrator
        .handle_chat(&h.caller, chat("hello"))
        .await
        .unwrap_err();
    assert!(matches!(err, shieldgate::ShieldError::Configuration(_)));
}

#[tokio::test]
async fn usage_accumulates_across_requests() {
    let h = harness(StorageMode::None, 1_000_000);
    let server = mock_openai(25).await;
    add_openai_key(&h, &server.uri());

    for _ in 0..3 {
        h.orchestrator
            .handle_chat(&h.caller, chat("contact jane@co.com"))
            .await
            .unwrap();
    }

    let day = shieldgate::quota::today_key();
    let totals = shieldgate::quota::usage_totals(&h.db, &h.tenant_id, &day).unwrap();
    assert_eq!(totals.request_count, 3);
    assert_eq!(totals.tokens_used, 75);
    assert_eq!(totals.redaction_count, 3);
}
