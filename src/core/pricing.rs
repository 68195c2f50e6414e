//! Pricing data and cost calculation.
//!
//! Static per-provider price tables, model-name normalization, and tiered
//! cost formulas. Absence of pricing data is an expected outcome (free-tier
//! or not-yet-catalogued models) and is communicated as `None`, never as an
//! error and never as zero.

use std::collections::HashMap;

use regex::Regex;

use super::provider::Provider;

/// Nano-USD per USD. Costs are stored as integers in aggregate caches to
/// avoid floating-point drift across repeated merges.
const NANO_PER_USD: f64 = 1_000_000_000.0;

/// Convert a USD amount to integer nano-USD.
#[must_use]
pub fn nano_usd(usd: f64) -> i64 {
    #[allow(clippy::cast_possible_truncation)]
    {
        (usd * NANO_PER_USD).round() as i64
    }
}

/// Convert integer nano-USD back to USD.
#[must_use]
#[allow(clippy::cast_precision_loss)]
pub fn usd_from_nano(nano: i64) -> f64 {
    nano as f64 / NANO_PER_USD
}

/// Token counts for one cost calculation.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct TokenCounts {
    pub input: i64,
    pub cache_read: i64,
    pub cache_creation: i64,
    pub output: i64,
}

/// A per-million-token rate with an optional above-threshold rate.
#[derive(Debug, Clone, Copy)]
pub struct TieredRate {
    /// USD per million tokens below the model's threshold.
    pub base: f64,
    /// USD per million tokens above the threshold, when the model defines one.
    pub above: Option<f64>,
}

impl TieredRate {
    const fn flat(base: f64) -> Self {
        Self { base, above: None }
    }

    const fn tiered(base: f64, above: f64) -> Self {
        Self {
            base,
            above: Some(above),
        }
    }

    /// Cost in USD for `tokens` of this category under the model's threshold.
    #[allow(clippy::cast_precision_loss)]
    fn cost(self, tokens: i64, threshold: Option<i64>) -> f64 {
        let tokens = tokens.max(0);
        match (threshold, self.above) {
            (Some(limit), Some(above)) if tokens > limit => {
                (limit as f64 * self.base + (tokens - limit) as f64 * above) / 1_000_000.0
            }
            _ => tokens as f64 * self.base / 1_000_000.0,
        }
    }
}

/// Per-token pricing for one model.
#[derive(Debug, Clone)]
pub struct TokenPrice {
    /// Token-count threshold above which the `above` rates apply.
    pub threshold: Option<i64>,
    pub input: TieredRate,
    pub cache_read: TieredRate,
    pub cache_creation: TieredRate,
    pub output: TieredRate,
}

impl TokenPrice {
    /// Total USD cost for the given token counts.
    #[must_use]
    pub fn cost(&self, counts: &TokenCounts) -> f64 {
        self.input.cost(counts.input, self.threshold)
            + self.cache_read.cost(counts.cache_read, self.threshold)
            + self.cache_creation.cost(counts.cache_creation, self.threshold)
            + self.output.cost(counts.output, self.threshold)
    }
}

/// Pricing tables for all providers.
///
/// Constructed once at startup and passed by reference; there is no ambient
/// global so tests can build isolated instances.
pub struct PriceBook {
    claude: HashMap<&'static str, TokenPrice>,
    codex: HashMap<&'static str, TokenPrice>,
    gemini_per_request: HashMap<&'static str, f64>,
    gemini_families: Vec<(&'static str, f64)>,
    gemini_default_per_request: f64,
    version_suffix: Regex,
    date_suffix: Regex,
}

/// Long-context threshold for Sonnet-class models.
const SONNET_LONG_CONTEXT: i64 = 200_000;

impl Default for PriceBook {
    fn default() -> Self {
        Self::current()
    }
}

impl PriceBook {
    /// Build the current price tables.
    ///
    /// Sources: provider pricing pages as of mid-2026. Models absent from
    /// these tables are intentionally unpriced.
    #[must_use]
    pub fn current() -> Self {
        let mut claude = HashMap::new();

        claude.insert(
            "claude-opus-4-5",
            Self::flat_price(5.0, 0.5, 6.25, 25.0),
        );
        claude.insert(
            "claude-opus-4-1",
            Self::flat_price(15.0, 1.5, 18.75, 75.0),
        );
        claude.insert(
            "claude-sonnet-4-5",
            Self::long_context_price(
                TieredRate::tiered(3.0, 6.0),
                TieredRate::tiered(0.3, 0.6),
                TieredRate::tiered(3.75, 7.5),
                TieredRate::tiered(15.0, 22.5),
            ),
        );
        claude.insert(
            "claude-sonnet-4",
            Self::long_context_price(
                TieredRate::tiered(3.0, 6.0),
                TieredRate::tiered(0.3, 0.6),
                TieredRate::tiered(3.75, 7.5),
                TieredRate::tiered(15.0, 22.5),
            ),
        );
        claude.insert(
            "claude-haiku-4-5",
            Self::flat_price(1.0, 0.1, 1.25, 5.0),
        );
        claude.insert(
            "claude-3-5-haiku",
            Self::flat_price(0.8, 0.08, 1.0, 4.0),
        );

        let mut codex = HashMap::new();
        codex.insert("gpt-5", Self::flat_price(1.25, 0.125, 0.0, 10.0));
        codex.insert("gpt-5-codex", Self::flat_price(1.25, 0.125, 0.0, 10.0));
        codex.insert("gpt-5-mini", Self::flat_price(0.25, 0.025, 0.0, 2.0));
        codex.insert("gpt-5-nano", Self::flat_price(0.05, 0.005, 0.0, 0.4));
        codex.insert("gpt-4.1", Self::flat_price(2.0, 0.5, 0.0, 8.0));
        codex.insert("o3", Self::flat_price(2.0, 0.5, 0.0, 8.0));
        codex.insert("o4-mini", Self::flat_price(1.1, 0.275, 0.0, 4.4));

        // Gemini bills coding-assistant traffic per request, not per token.
        let mut gemini_per_request = HashMap::new();
        gemini_per_request.insert("gemini-3-pro-preview", 0.0045);
        gemini_per_request.insert("gemini-3-flash", 0.0009);
        gemini_per_request.insert("gemini-2.5-pro", 0.0035);
        gemini_per_request.insert("gemini-2.5-flash", 0.0007);

        let gemini_families = vec![("pro", 0.0040), ("flash", 0.0008), ("image", 0.0030)];

        Self {
            claude,
            codex,
            gemini_per_request,
            gemini_families,
            gemini_default_per_request: 0.0020,
            version_suffix: Regex::new(r"-v\d+:\d+$").expect("static regex"),
            date_suffix: Regex::new(r"-\d{8}$").expect("static regex"),
        }
    }

    fn flat_price(input: f64, cache_read: f64, cache_creation: f64, output: f64) -> TokenPrice {
        TokenPrice {
            threshold: None,
            input: TieredRate::flat(input),
            cache_read: TieredRate::flat(cache_read),
            cache_creation: TieredRate::flat(cache_creation),
            output: TieredRate::flat(output),
        }
    }

    fn long_context_price(
        input: TieredRate,
        cache_read: TieredRate,
        cache_creation: TieredRate,
        output: TieredRate,
    ) -> TokenPrice {
        TokenPrice {
            threshold: Some(SONNET_LONG_CONTEXT),
            input,
            cache_read,
            cache_creation,
            output,
        }
    }

    fn table(&self, provider: Provider) -> Option<&HashMap<&'static str, TokenPrice>> {
        match provider {
            Provider::Claude => Some(&self.claude),
            Provider::Codex => Some(&self.codex),
            Provider::Gemini => None,
        }
    }

    /// Normalize a raw model name against the provider's price table.
    ///
    /// Strips vendor prefixes and cloud version suffixes unconditionally,
    /// then additionally tries removing a trailing 8-digit date suffix; the
    /// dateless base is returned only if it exists in the price table, so
    /// unknown names pass through cleaned rather than mangled.
    #[must_use]
    pub fn normalize_model(&self, provider: Provider, raw: &str) -> String {
        let mut name = raw.trim().to_lowercase();

        for prefix in ["anthropic/", "anthropic.", "models/", "google/", "openai/"] {
            if let Some(rest) = name.strip_prefix(prefix) {
                name = rest.to_string();
                break;
            }
        }

        // Vertex-style "@20250929" pins and Bedrock-style "-v1:0" tags.
        if let Some(at) = name.find('@') {
            name.truncate(at);
        }
        name = self.version_suffix.replace(&name, "").into_owned();

        if let Some(table) = self.table(provider) {
            let base = self.date_suffix.replace(&name, "");
            if base != name && table.contains_key(base.as_ref()) {
                return base.into_owned();
            }
        }

        name
    }

    /// Look up per-token pricing for an already-normalized model name.
    #[must_use]
    pub fn token_price(&self, provider: Provider, model: &str) -> Option<&TokenPrice> {
        self.table(provider)?.get(model)
    }

    /// Cost in USD for the given token counts, or `None` when the model is
    /// not priced. Callers must treat `None` as "unknown cost", not zero.
    #[must_use]
    pub fn token_cost_usd(
        &self,
        provider: Provider,
        model: &str,
        counts: &TokenCounts,
    ) -> Option<f64> {
        let normalized = self.normalize_model(provider, model);
        self.token_price(provider, &normalized)
            .map(|price| price.cost(counts))
    }

    /// Cost in USD for `request_count` requests against a flat-rate model.
    ///
    /// Lookup order: exact model name, then substring match against known
    /// family names, then the default rate. Always yields a value.
    #[must_use]
    #[allow(clippy::cast_precision_loss)]
    pub fn request_cost_usd(&self, model: &str, request_count: i64) -> f64 {
        let name = model.trim().to_lowercase();
        let rate = self.gemini_per_request.get(name.as_str()).copied().unwrap_or_else(|| {
            self.gemini_families
                .iter()
                .find(|(family, _)| name.contains(family))
                .map_or(self.gemini_default_per_request, |(_, rate)| *rate)
        });
        request_count.max(0) as f64 * rate
    }
}
