//! Codex provider: CLI RPC first, chatgpt.com web session as fallback.
//!
//! Source labels: `cli`, `web`.

use std::sync::Arc;

use serde::Deserialize;

use crate::core::cli_runner::{run_json_command, tool_on_path, CLI_TIMEOUT};
use crate::core::fetch::{FetchKind, FetchPlan, Strategy};
use crate::core::http::{default_client, fetch_json};
use crate::core::models::{CostBlock, ProviderIdentity, RateWindow, UsageSnapshot};
use crate::core::provider::Provider;
use crate::core::secrets::SecretStore;
use crate::error::Result;

use super::clear_if_auth_expired;

/// Secret key for the chatgpt.com session cookie.
pub const SESSION_COOKIE_KEY: &str = "codex-session-cookie";

const CLI_NAME: &str = "codex";
const WEB_BASE: &str = "https://chatgpt.com";

/// Ordered fetch plan for Codex.
#[must_use]
pub fn fetch_plan(secrets: Arc<dyn SecretStore>, api_base: Option<String>) -> FetchPlan {
    let web_base = api_base.unwrap_or_else(|| WEB_BASE.to_string());
    let web_secrets = Arc::clone(&secrets);
    let web_probe = secrets;

    FetchPlan::new(
        Provider::Codex,
        vec![
            Strategy {
                id: "codex-cli-rpc",
                kind: FetchKind::Cli,
                priority: 1,
                can_execute: Box::new(|| tool_on_path(CLI_NAME)),
                fetch: Box::new(|| Box::pin(fetch_cli())),
            },
            Strategy {
                id: "codex-web",
                kind: FetchKind::Web,
                priority: 2,
                can_execute: Box::new(move || {
                    matches!(web_probe.get(SESSION_COOKIE_KEY), Ok(Some(_)))
                }),
                fetch: Box::new(move || {
                    let secrets = Arc::clone(&web_secrets);
                    let base = web_base.clone();
                    Box::pin(async move { fetch_web(&*secrets, &base).await })
                }),
            },
        ],
    )
}

// =============================================================================
// Payload types
// =============================================================================

#[derive(Debug, Deserialize)]
struct RateLimitsPayload {
    #[serde(default)]
    primary: Option<LimitWindowPayload>,
    #[serde(default)]
    secondary: Option<LimitWindowPayload>,
}

#[derive(Debug, Deserialize)]
struct LimitWindowPayload {
    used_percent: f64,
    #[serde(default)]
    window_minutes: Option<i32>,
    #[serde(default)]
    resets_at: Option<chrono::DateTime<chrono::Utc>>,
}

/// CLI `usage --json` output.
#[derive(Debug, Deserialize)]
struct CliUsagePayload {
    rate_limits: RateLimitsPayload,
    #[serde(default)]
    plan: Option<String>,
    #[serde(default)]
    email: Option<String>,
}

/// Web dashboard payload; adds the credit balance block.
#[derive(Debug, Deserialize)]
struct WebUsagePayload {
    rate_limits: RateLimitsPayload,
    #[serde(default)]
    credits: Option<CreditsPayload>,
    #[serde(default)]
    plan: Option<String>,
}

#[derive(Debug, Deserialize)]
struct CreditsPayload {
    used_usd: f64,
    #[serde(default)]
    limit_usd: Option<f64>,
}

fn window(payload: &LimitWindowPayload, label: &str) -> RateWindow {
    let mut w = RateWindow::from_percent(payload.used_percent).with_label(label);
    if let Some(minutes) = payload.window_minutes {
        w = w.with_window_minutes(minutes);
    }
    if let Some(at) = payload.resets_at {
        w = w.with_resets_at(at);
    }
    w
}

fn apply_rate_limits(snapshot: &mut UsageSnapshot, limits: &RateLimitsPayload) {
    snapshot.primary = limits.primary.as_ref().map(|w| window(w, "Session"));
    snapshot.secondary = limits.secondary.as_ref().map(|w| window(w, "Weekly"));
}

fn snapshot_from_cli(payload: &CliUsagePayload) -> UsageSnapshot {
    let mut snapshot = UsageSnapshot::new(Provider::Codex);
    apply_rate_limits(&mut snapshot, &payload.rate_limits);
    if payload.plan.is_some() || payload.email.is_some() {
        snapshot.identity = Some(ProviderIdentity {
            email: payload.email.clone(),
            plan: payload.plan.clone(),
            account_id: None,
        });
    }
    snapshot
}

fn snapshot_from_web(payload: &WebUsagePayload) -> UsageSnapshot {
    let mut snapshot = UsageSnapshot::new(Provider::Codex);
    apply_rate_limits(&mut snapshot, &payload.rate_limits);
    snapshot.cost = payload.credits.as_ref().map(|c| CostBlock {
        used_usd: c.used_usd,
        limit_usd: c.limit_usd,
        period: "Monthly".to_string(),
    });
    if payload.plan.is_some() {
        snapshot.identity = Some(ProviderIdentity {
            email: None,
            plan: payload.plan.clone(),
            account_id: None,
        });
    }
    snapshot
}

// =============================================================================
// Strategy implementations
// =============================================================================

async fn fetch_cli() -> Result<UsageSnapshot> {
    let payload: CliUsagePayload =
        run_json_command(CLI_NAME, &["usage", "--json"], CLI_TIMEOUT).await?;
    Ok(snapshot_from_cli(&payload))
}

async fn fetch_web(secrets: &dyn SecretStore, base: &str) -> Result<UsageSnapshot> {
    let Some(cookie) = secrets.get(SESSION_COOKIE_KEY)? else {
        return Err(crate::error::EngineError::NotConfigured {
            provider: Provider::Codex.slug().to_string(),
            hint: Provider::Codex.not_configured_hint().to_string(),
        });
    };

    let client = default_client()?;
    let url = format!("{base}/backend-api/usage");
    let result: Result<WebUsagePayload> = fetch_json(
        &client,
        Provider::Codex.slug(),
        &url,
        &[("cookie", &format!("__Secure-next-auth.session-token={cookie}"))],
    )
    .await;

    let payload = clear_if_auth_expired(result, secrets, SESSION_COOKIE_KEY)?;
    Ok(snapshot_from_web(&payload))
}
