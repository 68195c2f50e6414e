//! Claude provider: OAuth API, web session cookie, CLI fallback.
//!
//! Source labels: `oauth`, `web`, `cli`.

use std::sync::Arc;

use serde::Deserialize;

use crate::core::cli_runner::{run_json_command, tool_on_path, CLI_TIMEOUT};
use crate::core::fetch::{FetchKind, FetchPlan, Strategy};
use crate::core::http::{default_client, fetch_json};
use crate::core::models::{ProviderIdentity, RateWindow, UsageSnapshot};
use crate::core::provider::Provider;
use crate::core::secrets::SecretStore;
use crate::error::{EngineError, Result};

use super::clear_if_auth_expired;

/// Secret key for the OAuth token.
pub const OAUTH_TOKEN_KEY: &str = "claude-oauth-token";

/// Secret key for the claude.ai session cookie.
pub const SESSION_COOKIE_KEY: &str = "claude-session-cookie";

const CLI_NAME: &str = "claude";
const API_BASE: &str = "https://api.anthropic.com";
const WEB_BASE: &str = "https://claude.ai";

/// Ordered fetch plan for Claude.
#[must_use]
pub fn fetch_plan(secrets: Arc<dyn SecretStore>, api_base: Option<String>) -> FetchPlan {
    let api_base = api_base.unwrap_or_else(|| API_BASE.to_string());

    let oauth_secrets = Arc::clone(&secrets);
    let oauth_probe = Arc::clone(&secrets);
    let oauth_base = api_base.clone();

    let web_secrets = Arc::clone(&secrets);
    let web_probe = Arc::clone(&secrets);

    FetchPlan::new(
        Provider::Claude,
        vec![
            Strategy {
                id: "claude-oauth",
                kind: FetchKind::OAuth,
                priority: 1,
                can_execute: Box::new(move || has_secret(&*oauth_probe, OAUTH_TOKEN_KEY)),
                fetch: Box::new(move || {
                    let secrets = Arc::clone(&oauth_secrets);
                    let base = oauth_base.clone();
                    Box::pin(async move { fetch_oauth(&*secrets, &base).await })
                }),
            },
            Strategy {
                id: "claude-web",
                kind: FetchKind::Web,
                priority: 2,
                can_execute: Box::new(move || has_secret(&*web_probe, SESSION_COOKIE_KEY)),
                fetch: Box::new(move || {
                    let secrets = Arc::clone(&web_secrets);
                    Box::pin(async move { fetch_web(&*secrets).await })
                }),
            },
            Strategy {
                id: "claude-cli",
                kind: FetchKind::Cli,
                priority: 3,
                can_execute: Box::new(|| tool_on_path(CLI_NAME)),
                fetch: Box::new(|| Box::pin(fetch_cli())),
            },
        ],
    )
}

fn has_secret(secrets: &dyn SecretStore, key: &str) -> bool {
    matches!(secrets.get(key), Ok(Some(_)))
}

// =============================================================================
// Payload types
// =============================================================================

/// Usage payload shared by the OAuth endpoint and the CLI JSON output.
#[derive(Debug, Deserialize)]
struct UsagePayload {
    #[serde(default)]
    five_hour: Option<WindowPayload>,
    #[serde(default)]
    seven_day: Option<WindowPayload>,
    #[serde(default)]
    seven_day_opus: Option<WindowPayload>,
    #[serde(default)]
    account: Option<AccountPayload>,
}

#[derive(Debug, Deserialize)]
struct WindowPayload {
    utilization: f64,
    #[serde(default)]
    resets_at: Option<chrono::DateTime<chrono::Utc>>,
}

#[derive(Debug, Deserialize)]
struct AccountPayload {
    #[serde(default)]
    email: Option<String>,
    #[serde(default)]
    plan: Option<String>,
}

/// Web backend wraps the same windows under a `usage` object.
#[derive(Debug, Deserialize)]
struct WebPayload {
    usage: UsagePayload,
}

fn window(payload: &WindowPayload, label: &str, minutes: i32) -> RateWindow {
    let mut w = RateWindow::from_percent(payload.utilization)
        .with_label(label)
        .with_window_minutes(minutes);
    if let Some(at) = payload.resets_at {
        w = w.with_resets_at(at);
    }
    w
}

fn snapshot_from_payload(payload: &UsagePayload) -> UsageSnapshot {
    let mut snapshot = UsageSnapshot::new(Provider::Claude);
    snapshot.primary = payload.five_hour.as_ref().map(|w| window(w, "Session", 300));
    snapshot.secondary = payload
        .seven_day
        .as_ref()
        .map(|w| window(w, "Weekly", 10_080));
    snapshot.tertiary = payload
        .seven_day_opus
        .as_ref()
        .map(|w| window(w, "Opus", 10_080));
    snapshot.identity = payload.account.as_ref().map(|a| ProviderIdentity {
        email: a.email.clone(),
        plan: a.plan.clone(),
        account_id: None,
    });
    snapshot
}

// =============================================================================
// Strategy implementations
// =============================================================================

async fn fetch_oauth(secrets: &dyn SecretStore, api_base: &str) -> Result<UsageSnapshot> {
    let Some(token) = secrets.get(OAUTH_TOKEN_KEY)? else {
        return Err(not_configured());
    };

    let client = default_client()?;
    let url = format!("{api_base}/api/oauth/usage");
    let result: Result<UsagePayload> = fetch_json(
        &client,
        Provider::Claude.slug(),
        &url,
        &[
            ("authorization", &format!("Bearer {token}")),
            ("anthropic-version", "2023-06-01"),
        ],
    )
    .await;

    let payload = clear_if_auth_expired(result, secrets, OAUTH_TOKEN_KEY)?;
    Ok(snapshot_from_payload(&payload))
}

async fn fetch_web(secrets: &dyn SecretStore) -> Result<UsageSnapshot> {
    let Some(cookie) = secrets.get(SESSION_COOKIE_KEY)? else {
        return Err(not_configured());
    };

    let client = default_client()?;
    let url = format!("{WEB_BASE}/api/bootstrap/usage");
    let result: Result<WebPayload> = fetch_json(
        &client,
        Provider::Claude.slug(),
        &url,
        &[("cookie", &format!("sessionKey={cookie}"))],
    )
    .await;

    let payload = clear_if_auth_expired(result, secrets, SESSION_COOKIE_KEY)?;
    Ok(snapshot_from_payload(&payload.usage))
}

async fn fetch_cli() -> Result<UsageSnapshot> {
    let payload: UsagePayload =
        run_json_command(CLI_NAME, &["usage", "--json"], CLI_TIMEOUT).await?;
    Ok(snapshot_from_payload(&payload))
}

fn not_configured() -> EngineError {
    EngineError::NotConfigured {
        provider: Provider::Claude.slug().to_string(),
        hint: Provider::Claude.not_configured_hint().to_string(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::secrets::MemoryStore;

    #[test]
    fn plan_orders_oauth_web_cli() {
        let secrets: Arc<dyn SecretStore> = Arc::new(MemoryStore::new());
        let plan = fetch_plan(secrets, None);
        let ids: Vec<_> = plan.strategies().iter().map(|s| s.id).collect();
        assert_eq!(ids, vec!["claude-oauth", "claude-web", "claude-cli"]);
    }

    #[test]
    fn secret_backed_strategies_skip_without_secrets() {
        let secrets: Arc<dyn SecretStore> = Arc::new(MemoryStore::new());
        let plan = fetch_plan(secrets, None);
        assert!(!(plan.strategies()[0].can_execute)());
        assert!(!(plan.strategies()[1].can_execute)());
    }

    #[test]
    fn stored_cookie_enables_web_strategy() {
        let secrets: Arc<dyn SecretStore> =
            Arc::new(MemoryStore::with_secrets([(SESSION_COOKIE_KEY, "sk-abc")]));
        let plan = fetch_plan(secrets, None);
        assert!(!(plan.strategies()[0].can_execute)());
        assert!((plan.strategies()[1].can_execute)());
    }

    #[test]
    fn payload_maps_to_snapshot_windows() {
        let payload: UsagePayload = serde_json::from_value(serde_json::json!({
            "five_hour": { "utilization": 42.5, "resets_at": "2026-08-26T18:00:00Z" },
            "seven_day": { "utilization": 12.0 },
            "account": { "email": "dev@example.com", "plan": "max" }
        }))
        .unwrap();

        let snapshot = snapshot_from_payload(&payload);
        assert!(!snapshot.is_error());
        let primary = snapshot.primary.unwrap();
        assert!((primary.used_percent - 42.5).abs() < f64::EPSILON);
        assert_eq!(primary.label.as_deref(), Some("Session"));
        assert_eq!(primary.window_minutes, Some(300));
        assert!(primary.resets_at.is_some());
        assert!((snapshot.secondary.unwrap().used_percent - 12.0).abs() < f64::EPSILON);
        assert!(snapshot.tertiary.is_none());
        assert_eq!(
            snapshot.identity.unwrap().email.as_deref(),
            Some("dev@example.com")
        );
    }

    #[test]
    fn utilization_above_hundred_is_clamped() {
        let payload: UsagePayload = serde_json::from_value(serde_json::json!({
            "five_hour": { "utilization": 180.0 }
        }))
        .unwrap();
        let snapshot = snapshot_from_payload(&payload);
        assert!((snapshot.primary.unwrap().used_percent - 100.0).abs() < f64::EPSILON);
    }
}
