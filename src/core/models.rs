//! Core data models.
//!
//! These are the engine's two outputs: live [`UsageSnapshot`]s from the
//! fetch orchestrator, and historical [`CostUsageSummary`] series from the
//! log scanner. The tray UI consumes both and produces nothing back.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use super::provider::Provider;

// =============================================================================
// Rate Window
// =============================================================================

/// A rate-limited usage window (session, weekly, per-model tier, ...).
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct RateWindow {
    /// Percentage of the window consumed, clamped to 0-100.
    pub used_percent: f64,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub window_minutes: Option<i32>,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub resets_at: Option<DateTime<Utc>>,

    /// Human-readable reset description, used when no absolute timestamp
    /// is available (e.g. "resets in 2 hours").
    #[serde(skip_serializing_if = "Option::is_none")]
    pub reset_description: Option<String>,

    /// Raw used units, when the server reports them.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub used: Option<f64>,

    /// Raw limit in the same units as `used`.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub limit: Option<f64>,

    /// Unit label for `used`/`limit` (e.g. "requests", "credits").
    #[serde(skip_serializing_if = "Option::is_none")]
    pub unit: Option<String>,

    /// Display label (e.g. "Session", "Weekly", "Opus").
    #[serde(skip_serializing_if = "Option::is_none")]
    pub label: Option<String>,
}

impl RateWindow {
    /// Create a window from a server-reported percentage, clamped to 0-100.
    #[must_use]
    pub fn from_percent(used_percent: f64) -> Self {
        Self {
            used_percent: used_percent.clamp(0.0, 100.0),
            ..Self::default()
        }
    }

    /// Create a window from raw used/limit units, deriving the percentage.
    ///
    /// A non-positive limit yields 0%.
    #[must_use]
    pub fn from_used_limit(used: f64, limit: f64) -> Self {
        let used_percent = if limit > 0.0 {
            (used / limit * 100.0).clamp(0.0, 100.0)
        } else {
            0.0
        };
        Self {
            used_percent,
            used: Some(used),
            limit: Some(limit),
            ..Self::default()
        }
    }

    /// Percentage remaining in this window.
    #[must_use]
    pub fn remaining_percent(&self) -> f64 {
        (100.0 - self.used_percent).max(0.0)
    }

    /// Builder: set the display label.
    #[must_use]
    pub fn with_label(mut self, label: impl Into<String>) -> Self {
        self.label = Some(label.into());
        self
    }

    /// Builder: set the window duration in minutes.
    #[must_use]
    pub const fn with_window_minutes(mut self, minutes: i32) -> Self {
        self.window_minutes = Some(minutes);
        self
    }

    /// Builder: set the absolute reset time.
    #[must_use]
    pub const fn with_resets_at(mut self, at: DateTime<Utc>) -> Self {
        self.resets_at = Some(at);
        self
    }
}

// =============================================================================
// Identity and cost block
// =============================================================================

/// Account identity attached to a snapshot.
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct ProviderIdentity {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub email: Option<String>,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub plan: Option<String>,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub account_id: Option<String>,
}

/// Spend information reported alongside live usage.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct CostBlock {
    /// Amount spent in the current period, USD.
    pub used_usd: f64,

    /// Spending limit for the period, if any.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub limit_usd: Option<f64>,

    /// Period description (e.g. "Monthly", "Last 30 days").
    pub period: String,
}

// =============================================================================
// Usage Snapshot
// =============================================================================

/// Per-provider envelope for a live usage fetch.
///
/// Exactly one of {successful window/cost/identity data, `error_message`}
/// is meaningful at a time: a non-`None` `error_message` means the fetch
/// failed regardless of other fields.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct UsageSnapshot {
    pub provider: Provider,

    /// Primary rate window (usually session-based).
    #[serde(skip_serializing_if = "Option::is_none")]
    pub primary: Option<RateWindow>,

    /// Secondary rate window (usually weekly).
    #[serde(skip_serializing_if = "Option::is_none")]
    pub secondary: Option<RateWindow>,

    /// Tertiary rate window (secondary-model tier).
    #[serde(skip_serializing_if = "Option::is_none")]
    pub tertiary: Option<RateWindow>,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub cost: Option<CostBlock>,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub identity: Option<ProviderIdentity>,

    pub fetched_at: DateTime<Utc>,

    /// Non-`None` means the fetch failed; the UI shows this text.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error_message: Option<String>,

    /// A refresh is currently in flight for this provider.
    #[serde(default)]
    pub is_loading: bool,

    /// The user must re-authenticate before the next fetch can succeed.
    #[serde(default)]
    pub needs_reauth: bool,

    /// The provider signaled that the plan does not include this data.
    #[serde(default)]
    pub needs_upgrade: bool,
}

impl UsageSnapshot {
    /// An empty, successful snapshot for a provider.
    #[must_use]
    pub fn new(provider: Provider) -> Self {
        Self {
            provider,
            primary: None,
            secondary: None,
            tertiary: None,
            cost: None,
            identity: None,
            fetched_at: Utc::now(),
            error_message: None,
            is_loading: false,
            needs_reauth: false,
            needs_upgrade: false,
        }
    }

    /// A failed snapshot carrying an error message.
    #[must_use]
    pub fn failed(provider: Provider, message: impl Into<String>) -> Self {
        Self {
            error_message: Some(message.into()),
            ..Self::new(provider)
        }
    }

    /// Whether this snapshot represents a failed fetch.
    #[must_use]
    pub const fn is_error(&self) -> bool {
        self.error_message.is_some()
    }
}

// =============================================================================
// Cost history
// =============================================================================

/// Day-bucketed token/cost entry produced by the log scanner.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct CostUsageDailyEntry {
    /// Day key, `YYYY-MM-DD`.
    pub date: String,

    pub input_tokens: i64,
    pub output_tokens: i64,
    pub cache_read_tokens: i64,
    pub cache_creation_tokens: i64,

    /// Sum of all token categories.
    pub total_tokens: i64,

    /// `None` when no model that day had known pricing.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub cost_usd: Option<f64>,

    /// Normalized model names seen that day, sorted.
    pub models: Vec<String>,
}

/// Aggregated totals over a summary's daily entries.
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct CostUsageTotals {
    pub input_tokens: i64,
    pub output_tokens: i64,
    pub cache_read_tokens: i64,
    pub cache_creation_tokens: i64,
    pub total_tokens: i64,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub cost_usd: Option<f64>,
}

/// Complete cost-history series for one provider over a rolling window.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CostUsageSummary {
    pub provider: Provider,
    pub updated_at: DateTime<Utc>,
    pub window_days: u32,

    /// Daily entries, most recent first.
    pub daily: Vec<CostUsageDailyEntry>,

    pub totals: CostUsageTotals,
}
