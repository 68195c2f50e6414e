//! Gemini provider: API-key quota endpoint, CLI fallback.
//!
//! Gemini bills coding-assistant traffic per request, so the quota payload
//! carries request counts rather than token totals; the cost block is
//! derived from the flat per-request rates.

use std::sync::Arc;

use serde::Deserialize;

use crate::core::cli_runner::{run_json_command, tool_on_path, CLI_TIMEOUT};
use crate::core::fetch::{FetchKind, FetchPlan, Strategy};
use crate::core::http::{default_client, fetch_json};
use crate::core::models::{CostBlock, RateWindow, UsageSnapshot};
use crate::core::pricing::PriceBook;
use crate::core::provider::Provider;
use crate::core::secrets::SecretStore;
use crate::error::Result;

use super::clear_if_auth_expired;

/// Secret key for a stored API key; the `GEMINI_API_KEY` env var wins.
pub const API_KEY_SECRET: &str = "gemini-api-key";

/// Environment variable consulted before the secret store.
pub const API_KEY_ENV: &str = "GEMINI_API_KEY";

const CLI_NAME: &str = "gemini";
const API_BASE: &str = "https://cloudcode-pa.googleapis.com";

/// Ordered fetch plan for Gemini.
#[must_use]
pub fn fetch_plan(
    secrets: Arc<dyn SecretStore>,
    api_base: Option<String>,
    book: Arc<PriceBook>,
) -> FetchPlan {
    let api_base = api_base.unwrap_or_else(|| API_BASE.to_string());
    let key_secrets = Arc::clone(&secrets);
    let key_probe = secrets;
    let api_book = Arc::clone(&book);

    FetchPlan::new(
        Provider::Gemini,
        vec![
            Strategy {
                id: "gemini-api-key",
                kind: FetchKind::ApiKey,
                priority: 1,
                can_execute: Box::new(move || resolve_api_key(&*key_probe).is_some()),
                fetch: Box::new(move || {
                    let secrets = Arc::clone(&key_secrets);
                    let base = api_base.clone();
                    let book = Arc::clone(&api_book);
                    Box::pin(async move { fetch_api(&*secrets, &base, &book).await })
                }),
            },
            Strategy {
                id: "gemini-cli",
                kind: FetchKind::Cli,
                priority: 2,
                can_execute: Box::new(|| tool_on_path(CLI_NAME)),
                fetch: Box::new(move || {
                    let book = Arc::clone(&book);
                    Box::pin(async move { fetch_cli(&book).await })
                }),
            },
        ],
    )
}

fn resolve_api_key(secrets: &dyn SecretStore) -> Option<String> {
    std::env::var(API_KEY_ENV)
        .ok()
        .filter(|v| !v.trim().is_empty())
        .or_else(|| secrets.get(API_KEY_SECRET).ok().flatten())
}

// =============================================================================
// Payload types
// =============================================================================

#[derive(Debug, Deserialize)]
struct QuotaPayload {
    #[serde(default)]
    buckets: Vec<QuotaBucket>,
}

#[derive(Debug, Deserialize)]
struct QuotaBucket {
    model: String,
    request_count: i64,
    #[serde(default)]
    request_limit: Option<i64>,
    #[serde(default)]
    resets_at: Option<chrono::DateTime<chrono::Utc>>,
}

fn snapshot_from_quota(payload: &QuotaPayload, book: &PriceBook) -> UsageSnapshot {
    let mut snapshot = UsageSnapshot::new(Provider::Gemini);

    // The tightest bucket becomes the headline window.
    let mut windows: Vec<RateWindow> = payload
        .buckets
        .iter()
        .map(|bucket| {
            #[allow(clippy::cast_precision_loss)]
            let mut w = bucket.request_limit.map_or_else(
                || RateWindow::from_percent(0.0),
                |limit| RateWindow::from_used_limit(bucket.request_count as f64, limit as f64),
            );
            w.unit = Some("requests".to_string());
            w.label = Some(bucket.model.clone());
            if let Some(at) = bucket.resets_at {
                w = w.with_resets_at(at);
            }
            w
        })
        .collect();
    windows.sort_by(|a, b| {
        b.used_percent
            .partial_cmp(&a.used_percent)
            .unwrap_or(std::cmp::Ordering::Equal)
    });
    let mut windows = windows.into_iter();
    snapshot.primary = windows.next();
    snapshot.secondary = windows.next();
    snapshot.tertiary = windows.next();

    let spend: f64 = payload
        .buckets
        .iter()
        .map(|b| book.request_cost_usd(&b.model, b.request_count))
        .sum();
    snapshot.cost = Some(CostBlock {
        used_usd: spend,
        limit_usd: None,
        period: "Today".to_string(),
    });

    snapshot
}

// =============================================================================
// Strategy implementations
// =============================================================================

async fn fetch_api(
    secrets: &dyn SecretStore,
    api_base: &str,
    book: &PriceBook,
) -> Result<UsageSnapshot> {
    let Some(key) = resolve_api_key(secrets) else {
        return Err(crate::error::EngineError::NotConfigured {
            provider: Provider::Gemini.slug().to_string(),
            hint: Provider::Gemini.not_configured_hint().to_string(),
        });
    };

    let client = default_client()?;
    let url = format!("{api_base}/v1internal/quota");
    let result: Result<QuotaPayload> = fetch_json(
        &client,
        Provider::Gemini.slug(),
        &url,
        &[("x-goog-api-key", &key)],
    )
    .await;

    // An env-provided key is not ours to delete; only stored keys clear.
    let payload = if std::env::var(API_KEY_ENV).is_ok() {
        result?
    } else {
        clear_if_auth_expired(result, secrets, API_KEY_SECRET)?
    };
    Ok(snapshot_from_quota(&payload, book))
}

async fn fetch_cli(book: &PriceBook) -> Result<UsageSnapshot> {
    let payload: QuotaPayload =
        run_json_command(CLI_NAME, &["usage", "--format", "json"], CLI_TIMEOUT).await?;
    Ok(snapshot_from_quota(&payload, book))
}
