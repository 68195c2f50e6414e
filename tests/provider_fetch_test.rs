//! Provider fetch strategies against a mock HTTP backend.
//!
//! Drives the real strategy closures (secret lookup, HTTP, payload mapping,
//! auth-expiry clearing) with `wiremock` standing in for the provider APIs.

use std::sync::Arc;

use traymeter::core::fetch::{run_plan, FetchResolution};
use traymeter::core::pricing::PriceBook;
use traymeter::core::secrets::{MemoryStore, SecretStore};
use traymeter::providers::{claude, codex, gemini};
use wiremock::matchers::{header, method, path};
use wiremock::{Mock, MockServer, ResponseTemplate};

#[tokio::test]
async fn claude_oauth_success_wins_without_consulting_fallbacks() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/api/oauth/usage"))
        .and(header("authorization", "Bearer tok-123"))
        .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!({
            "five_hour": { "utilization": 37.0, "resets_at": "2026-08-26T20:00:00Z" },
            "seven_day": { "utilization": 61.5 },
            "account": { "email": "dev@example.com", "plan": "max" }
        })))
        .mount(&server)
        .await;

    let secrets: Arc<dyn SecretStore> = Arc::new(MemoryStore::with_secrets([(
        claude::OAUTH_TOKEN_KEY,
        "tok-123",
    )]));
    let plan = claude::fetch_plan(Arc::clone(&secrets), Some(server.uri()));

    let outcome = run_plan(&plan).await;
    assert_eq!(
        outcome.resolution,
        FetchResolution::Success {
            strategy_id: "claude-oauth"
        }
    );
    let snapshot = outcome.snapshot;
    assert!((snapshot.primary.unwrap().used_percent - 37.0).abs() < f64::EPSILON);
    assert!((snapshot.secondary.unwrap().used_percent - 61.5).abs() < f64::EPSILON);
    assert_eq!(
        snapshot.identity.unwrap().email.as_deref(),
        Some("dev@example.com")
    );
    assert!(!snapshot.needs_reauth);
}

#[tokio::test]
async fn claude_oauth_rejection_clears_the_stored_token() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/api/oauth/usage"))
        .respond_with(ResponseTemplate::new(401))
        .mount(&server)
        .await;

    let secrets = Arc::new(MemoryStore::with_secrets([(
        claude::OAUTH_TOKEN_KEY,
        "stale-token",
    )]));
    let plan = claude::fetch_plan(
        Arc::clone(&secrets) as Arc<dyn SecretStore>,
        Some(server.uri()),
    );

    // Drive the oauth strategy directly; the rejection must clear the secret
    // so the next run classifies the provider as not configured.
    let oauth = &plan.strategies()[0];
    assert_eq!(oauth.id, "claude-oauth");
    assert!((oauth.can_execute)());

    let result = (oauth.fetch)().await;
    assert!(result.unwrap_err().needs_reauth());
    assert_eq!(secrets.get(claude::OAUTH_TOKEN_KEY).unwrap(), None);
    assert!(!(oauth.can_execute)());
}

#[tokio::test]
async fn codex_web_strategy_maps_credits_into_cost_block() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/backend-api/usage"))
        .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!({
            "rate_limits": {
                "primary": { "used_percent": 22.0, "window_minutes": 300 },
                "secondary": { "used_percent": 48.0, "window_minutes": 10080 }
            },
            "credits": { "used_usd": 8.4, "limit_usd": 25.0 },
            "plan": "plus"
        })))
        .mount(&server)
        .await;

    let secrets: Arc<dyn SecretStore> = Arc::new(MemoryStore::with_secrets([(
        codex::SESSION_COOKIE_KEY,
        "cookie-abc",
    )]));
    let plan = codex::fetch_plan(secrets, Some(server.uri()));

    let web = &plan.strategies()[1];
    assert_eq!(web.id, "codex-web");
    let snapshot = (web.fetch)().await.unwrap();

    assert!((snapshot.primary.unwrap().used_percent - 22.0).abs() < f64::EPSILON);
    let cost = snapshot.cost.unwrap();
    assert!((cost.used_usd - 8.4).abs() < f64::EPSILON);
    assert_eq!(cost.limit_usd, Some(25.0));
    assert_eq!(snapshot.identity.unwrap().plan.as_deref(), Some("plus"));
}

#[tokio::test]
async fn gemini_quota_payload_becomes_windows_and_flat_rate_cost() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/v1internal/quota"))
        .and(header("x-goog-api-key", "AIza-test"))
        .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!({
            "buckets": [
                { "model": "gemini-3-pro-preview", "request_count": 450, "request_limit": 500 },
                { "model": "gemini-3-flash", "request_count": 100, "request_limit": 2000 }
            ]
        })))
        .mount(&server)
        .await;

    let secrets: Arc<dyn SecretStore> = Arc::new(MemoryStore::with_secrets([(
        gemini::API_KEY_SECRET,
        "AIza-test",
    )]));
    let plan = gemini::fetch_plan(secrets, Some(server.uri()), Arc::new(PriceBook::current()));

    let api = &plan.strategies()[0];
    assert_eq!(api.id, "gemini-api-key");
    assert!((api.can_execute)());
    let snapshot = (api.fetch)().await.unwrap();

    let primary = snapshot.primary.unwrap();
    assert_eq!(primary.label.as_deref(), Some("gemini-3-pro-preview"));
    assert!((primary.used_percent - 90.0).abs() < f64::EPSILON);
    // 450 * $0.0045 + 100 * $0.0009.
    let cost = snapshot.cost.unwrap();
    assert!((cost.used_usd - (2.025 + 0.09)).abs() < 1e-9);
}

#[tokio::test]
async fn parser_drift_reports_parse_payload_not_network() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/api/oauth/usage"))
        .respond_with(
            ResponseTemplate::new(200).set_body_string(r#"{"totally":"different schema"#),
        )
        .mount(&server)
        .await;

    let secrets: Arc<dyn SecretStore> = Arc::new(MemoryStore::with_secrets([(
        claude::OAUTH_TOKEN_KEY,
        "tok",
    )]));
    let plan = claude::fetch_plan(secrets, Some(server.uri()));

    let result = (plan.strategies()[0].fetch)().await;
    let err = result.unwrap_err();
    assert!(matches!(
        err,
        traymeter::EngineError::ParsePayload { .. }
    ));
}
