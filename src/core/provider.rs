//! Provider descriptors.
//!
//! Defines the supported providers and the per-provider metadata the
//! orchestrator and scanners need: names, timeouts, default log roots, and
//! the "not configured" remediation wording.

use std::path::PathBuf;
use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::error::{EngineError, Result};

/// Supported providers.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Provider {
    Claude,
    Codex,
    Gemini,
}

impl Provider {
    /// All providers in display order.
    pub const ALL: &'static [Self] = &[Self::Claude, Self::Codex, Self::Gemini];

    /// Stable lowercase identifier (config keys, secret names, log fields).
    #[must_use]
    pub const fn slug(self) -> &'static str {
        match self {
            Self::Claude => "claude",
            Self::Codex => "codex",
            Self::Gemini => "gemini",
        }
    }

    /// Display name for the UI layer.
    #[must_use]
    pub const fn display_name(self) -> &'static str {
        match self {
            Self::Claude => "Claude",
            Self::Codex => "Codex",
            Self::Gemini => "Gemini",
        }
    }

    /// Parse from a config/identifier string.
    pub fn from_slug(name: &str) -> Result<Self> {
        let lower = name.to_lowercase();
        Self::ALL
            .iter()
            .find(|p| p.slug() == lower)
            .copied()
            .ok_or_else(|| EngineError::Config(format!("unknown provider \"{name}\"")))
    }

    /// Default time budget for one full provider fetch (all strategies).
    #[must_use]
    pub const fn default_timeout(self) -> Duration {
        match self {
            // Gemini quota queries tend to be slower.
            Self::Gemini => Duration::from_secs(15),
            Self::Claude | Self::Codex => Duration::from_secs(10),
        }
    }

    /// Instructional message shown when no strategy could even attempt a
    /// fetch. Wording is provider-specific because the remediation differs.
    #[must_use]
    pub const fn not_configured_hint(self) -> &'static str {
        match self {
            Self::Claude => {
                "sign in with the Claude CLI (`claude`) or paste a claude.ai session cookie in settings"
            }
            Self::Codex => "run `codex login`, or paste a chatgpt.com session cookie in settings",
            Self::Gemini => "run `gemini auth login` or set GEMINI_API_KEY",
        }
    }

    /// Whether this provider writes local session logs we can cost-scan.
    #[must_use]
    pub const fn supports_cost_scan(self) -> bool {
        matches!(self, Self::Claude | Self::Codex)
    }

    /// Default root directory for this provider's session logs.
    #[must_use]
    pub fn default_log_root(self) -> Option<PathBuf> {
        let home = directories::BaseDirs::new().map(|d| d.home_dir().to_path_buf())?;
        match self {
            Self::Claude => Some(home.join(".claude").join("projects")),
            Self::Codex => Some(home.join(".codex").join("sessions")),
            Self::Gemini => None,
        }
    }
}

impl std::fmt::Display for Provider {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.slug())
    }
}
