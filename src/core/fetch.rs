//! Fetch strategy orchestration.
//!
//! Each provider has an ordered plan of strategies (OAuth API, web cookie,
//! CLI subprocess, ...). A refresh walks the plan by ascending priority:
//! inapplicable strategies are skipped, failing ones fall through to the
//! next, and the first success wins. Errors never escape a provider; every
//! outcome lands as a `UsageSnapshot`.

use std::future::Future;
use std::pin::Pin;
use std::time::Duration;

use futures::future::join_all;

use crate::error::{EngineError, Result};

use super::models::UsageSnapshot;
use super::provider::Provider;

/// Kind of fetch strategy, for logs and attempt records.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FetchKind {
    /// OAuth/API token against the provider's API.
    OAuth,
    /// Session cookie against the provider's web backend.
    Web,
    /// Local CLI tool invocation.
    Cli,
    /// API key from environment or secret store.
    ApiKey,
}

impl FetchKind {
    /// Source label for logs and the UI.
    #[must_use]
    pub const fn source_label(self) -> &'static str {
        match self {
            Self::OAuth => "oauth",
            Self::Web => "web",
            Self::Cli => "cli",
            Self::ApiKey => "api-key",
        }
    }
}

/// Boxed async fetch function.
pub type FetchFn =
    Box<dyn Fn() -> Pin<Box<dyn Future<Output = Result<UsageSnapshot>> + Send>> + Send + Sync>;

/// Availability probe, checked before each attempt.
pub type CanExecuteFn = Box<dyn Fn() -> bool + Send + Sync>;

/// One way of fetching a provider's usage.
pub struct Strategy {
    /// Stable identifier (e.g. `"claude-oauth"`).
    pub id: &'static str,
    pub kind: FetchKind,
    /// Lower runs earlier.
    pub priority: u8,
    /// Cheap applicability check: credentials present, binary on PATH.
    pub can_execute: CanExecuteFn,
    pub fetch: FetchFn,
}

impl std::fmt::Debug for Strategy {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Strategy")
            .field("id", &self.id)
            .field("kind", &self.kind)
            .field("priority", &self.priority)
            .finish_non_exhaustive()
    }
}

/// Ordered strategy list for one provider.
#[derive(Debug)]
pub struct FetchPlan {
    pub provider: Provider,
    strategies: Vec<Strategy>,
}

impl FetchPlan {
    /// Build a plan; strategies are kept sorted by ascending priority.
    #[must_use]
    pub fn new(provider: Provider, mut strategies: Vec<Strategy>) -> Self {
        strategies.sort_by_key(|s| s.priority);
        Self {
            provider,
            strategies,
        }
    }

    /// Strategies in execution order.
    #[must_use]
    pub fn strategies(&self) -> &[Strategy] {
        &self.strategies
    }
}

// =============================================================================
// Attempts and outcomes
// =============================================================================

/// What happened to one strategy during a plan run.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum AttemptStatus {
    Skipped,
    Failed(String),
    Succeeded,
}

/// Record of a single strategy attempt.
#[derive(Debug, Clone)]
pub struct FetchAttempt {
    pub strategy_id: &'static str,
    pub kind: FetchKind,
    pub status: AttemptStatus,
}

/// Terminal state of a plan run.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum FetchResolution {
    /// Some strategy produced a usable snapshot.
    Success { strategy_id: &'static str },
    /// Every strategy declined to run: the provider is not configured.
    AllSkipped,
    /// At least one strategy ran and all that ran failed.
    AllFailed { last_error: String },
}

/// Result of running one provider's plan.
#[derive(Debug)]
pub struct FetchOutcome {
    pub provider: Provider,
    pub snapshot: UsageSnapshot,
    pub resolution: FetchResolution,
    pub attempts: Vec<FetchAttempt>,
}

// =============================================================================
// Plan execution
// =============================================================================

/// Run a plan to completion: first success wins, failures fall through,
/// and the terminal state is always expressed as a snapshot.
pub async fn run_plan(plan: &FetchPlan) -> FetchOutcome {
    let provider = plan.provider;
    let mut attempts = Vec::with_capacity(plan.strategies().len());
    let mut last_error: Option<String> = None;
    let mut saw_auth_expiry = false;

    for strategy in plan.strategies() {
        if !(strategy.can_execute)() {
            tracing::debug!(provider = %provider, strategy = strategy.id, "strategy skipped");
            attempts.push(FetchAttempt {
                strategy_id: strategy.id,
                kind: strategy.kind,
                status: AttemptStatus::Skipped,
            });
            continue;
        }

        tracing::debug!(provider = %provider, strategy = strategy.id, "strategy attempting");
        match (strategy.fetch)().await {
            Ok(snapshot) if !snapshot.is_error() => {
                tracing::info!(
                    provider = %provider,
                    strategy = strategy.id,
                    source = strategy.kind.source_label(),
                    "fetch succeeded"
                );
                attempts.push(FetchAttempt {
                    strategy_id: strategy.id,
                    kind: strategy.kind,
                    status: AttemptStatus::Succeeded,
                });
                return FetchOutcome {
                    provider,
                    snapshot,
                    resolution: FetchResolution::Success {
                        strategy_id: strategy.id,
                    },
                    attempts,
                };
            }
            Ok(snapshot) => {
                // A strategy can also signal failure in-band.
                let message = snapshot
                    .error_message
                    .clone()
                    .unwrap_or_else(|| "fetch failed".to_string());
                tracing::warn!(provider = %provider, strategy = strategy.id, %message, "strategy failed");
                attempts.push(FetchAttempt {
                    strategy_id: strategy.id,
                    kind: strategy.kind,
                    status: AttemptStatus::Failed(message.clone()),
                });
                last_error = Some(message);
            }
            Err(err) => {
                let message = err.to_string();
                tracing::warn!(provider = %provider, strategy = strategy.id, %message, "strategy failed");
                attempts.push(FetchAttempt {
                    strategy_id: strategy.id,
                    kind: strategy.kind,
                    status: AttemptStatus::Failed(message.clone()),
                });
                saw_auth_expiry = saw_auth_expiry || err.needs_reauth();
                last_error = Some(message);
            }
        }
    }

    match last_error {
        None => {
            let hint = provider.not_configured_hint();
            let message = format!("{} is not configured: {hint}", provider.display_name());
            FetchOutcome {
                provider,
                snapshot: UsageSnapshot::failed(provider, message),
                resolution: FetchResolution::AllSkipped,
                attempts,
            }
        }
        Some(message) => {
            let mut snapshot = UsageSnapshot::failed(provider, message.clone());
            snapshot.needs_reauth = saw_auth_expiry;
            FetchOutcome {
                provider,
                snapshot,
                resolution: FetchResolution::AllFailed {
                    last_error: message,
                },
                attempts,
            }
        }
    }
}

/// Run a plan under a wall-clock budget.
///
/// Expiry cancels the in-flight strategy (its future is dropped) and no
/// further strategies run; the outcome is a timeout-failure snapshot.
pub async fn run_plan_with_timeout(plan: &FetchPlan, budget: Duration) -> FetchOutcome {
    match tokio::time::timeout(budget, run_plan(plan)).await {
        Ok(outcome) => outcome,
        Err(_) => {
            let err = EngineError::Timeout {
                provider: plan.provider.slug().to_string(),
                seconds: budget.as_secs(),
            };
            let message = err.to_string();
            tracing::warn!(provider = %plan.provider, %message, "fetch timed out");
            FetchOutcome {
                provider: plan.provider,
                snapshot: UsageSnapshot::failed(plan.provider, message.clone()),
                resolution: FetchResolution::AllFailed {
                    last_error: message,
                },
                attempts: Vec::new(),
            }
        }
    }
}

/// Refresh every plan concurrently, one task per provider, completing only
/// when all providers have landed. Within a provider, strategies remain
/// strictly sequential.
pub async fn refresh_all(plans: &[FetchPlan]) -> Vec<FetchOutcome> {
    let futures = plans
        .iter()
        .map(|plan| run_plan_with_timeout(plan, plan.provider.default_timeout()));
    join_all(futures).await
}
