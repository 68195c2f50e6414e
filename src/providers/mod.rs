//! Per-provider fetch strategy lists and the registry that owns them.

pub mod claude;
pub mod codex;
pub mod gemini;

use std::sync::Arc;
use std::time::Duration;

use futures::future::join_all;

use crate::core::config::EngineConfig;
use crate::core::fetch::{run_plan_with_timeout, FetchOutcome, FetchPlan};
use crate::core::pricing::PriceBook;
use crate::core::provider::Provider;
use crate::core::secrets::SecretStore;
use crate::error::{EngineError, Result};

/// On auth expiry, drop the stale secret so the next refresh classifies the
/// provider as not-configured instead of failing the same way again.
pub(crate) fn clear_if_auth_expired<T>(
    result: Result<T>,
    secrets: &dyn SecretStore,
    key: &str,
) -> Result<T> {
    if let Err(EngineError::AuthExpired { .. }) = &result {
        match secrets.delete(key) {
            Ok(()) => tracing::info!(key, "cleared expired credential"),
            Err(err) => tracing::warn!(key, %err, "failed to clear expired credential"),
        }
    }
    result
}

/// All enabled providers' fetch plans, built once at startup.
pub struct ProviderRegistry {
    plans: Vec<(FetchPlan, Duration)>,
}

impl ProviderRegistry {
    /// Build plans for every provider the config enables.
    #[must_use]
    pub fn new(config: &EngineConfig, secrets: Arc<dyn SecretStore>) -> Self {
        let book = Arc::new(PriceBook::current());
        let mut plans = Vec::new();

        for provider in Provider::ALL {
            let settings = config.provider(*provider);
            if !settings.enabled {
                tracing::debug!(provider = %provider, "provider disabled in config");
                continue;
            }
            let plan = match provider {
                Provider::Claude => {
                    claude::fetch_plan(Arc::clone(&secrets), settings.api_base.clone())
                }
                Provider::Codex => {
                    codex::fetch_plan(Arc::clone(&secrets), settings.api_base.clone())
                }
                Provider::Gemini => gemini::fetch_plan(
                    Arc::clone(&secrets),
                    settings.api_base.clone(),
                    Arc::clone(&book),
                ),
            };
            plans.push((plan, config.fetch_timeout(*provider)));
        }

        Self { plans }
    }

    /// Providers with an active plan, in display order.
    #[must_use]
    pub fn providers(&self) -> Vec<Provider> {
        self.plans.iter().map(|(plan, _)| plan.provider).collect()
    }

    /// Refresh one provider, if enabled.
    pub async fn refresh(&self, provider: Provider) -> Option<FetchOutcome> {
        let (plan, budget) = self.plans.iter().find(|(p, _)| p.provider == provider)?;
        Some(run_plan_with_timeout(plan, *budget).await)
    }

    /// Refresh every enabled provider concurrently; completes only when all
    /// providers have landed, each within its own time budget.
    pub async fn refresh_all(&self) -> Vec<FetchOutcome> {
        let futures = self
            .plans
            .iter()
            .map(|(plan, budget)| run_plan_with_timeout(plan, *budget));
        join_all(futures).await
    }
}
