//! Engine configuration.
//!
//! Loaded from `config.toml` in the platform config directory
//! (`~/.config/traymeter/` on Linux, `%APPDATA%/traymeter/` on Windows).
//! Unknown fields are tolerated so older builds can read configs written by
//! newer ones.

use std::fs;
use std::path::{Path, PathBuf};
use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::error::{EngineError, Result};

use super::logging::LogLevel;
use super::provider::Provider;

/// Top-level engine configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct EngineConfig {
    /// General settings.
    pub general: GeneralConfig,
    /// Provider-specific settings.
    pub providers: ProvidersConfig,
}

/// General engine settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct GeneralConfig {
    /// Per-provider fetch budget in seconds; 0 means each provider's
    /// built-in default.
    pub timeout_seconds: u64,
    /// Rolling cost-history window in days.
    pub cost_window_days: u32,
    /// Default log level (error, warn, info, debug, trace).
    pub log_level: Option<String>,
}

/// Per-provider settings container.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ProvidersConfig {
    pub claude: ProviderSettings,
    pub codex: ProviderSettings,
    pub gemini: ProviderSettings,
}

/// Settings for one provider.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ProviderSettings {
    /// Whether this provider participates in refreshes.
    pub enabled: bool,
    /// Custom API base URL, if different from the default.
    pub api_base: Option<String>,
    /// Session-log root override for the cost scanner.
    pub log_root: Option<PathBuf>,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            general: GeneralConfig::default(),
            providers: ProvidersConfig::default(),
        }
    }
}

impl Default for GeneralConfig {
    fn default() -> Self {
        Self {
            timeout_seconds: 0,
            cost_window_days: 30,
            log_level: None,
        }
    }
}

impl GeneralConfig {
    /// Configured fallback log level, for `logging::init_from_env_or`.
    #[must_use]
    pub fn parsed_log_level(&self) -> Option<LogLevel> {
        self.log_level.as_deref().and_then(LogLevel::from_arg)
    }
}

impl Default for ProvidersConfig {
    fn default() -> Self {
        Self {
            claude: ProviderSettings::default(),
            codex: ProviderSettings::default(),
            gemini: ProviderSettings::default(),
        }
    }
}

impl Default for ProviderSettings {
    fn default() -> Self {
        Self {
            enabled: true,
            api_base: None,
            log_root: None,
        }
    }
}

impl EngineConfig {
    /// Load from the default config file path. A missing file yields the
    /// defaults; a present-but-invalid file is an error.
    pub fn load() -> Result<Self> {
        Self::load_from(&Self::config_path())
    }

    /// Load from a specific path.
    pub fn load_from(path: &Path) -> Result<Self> {
        if !path.exists() {
            tracing::debug!(?path, "config file not found, using defaults");
            return Ok(Self::default());
        }

        tracing::debug!(?path, "loading config file");
        let content = fs::read_to_string(path)?;
        let config: Self = toml::from_str(&content)
            .map_err(|e| EngineError::Config(format!("invalid config file: {e}")))?;
        config.validate()?;
        Ok(config)
    }

    /// Save to the default config file path.
    pub fn save(&self) -> Result<()> {
        self.save_to(&Self::config_path())
    }

    /// Save to a specific path, creating parent directories as needed.
    pub fn save_to(&self, path: &Path) -> Result<()> {
        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent)?;
        }
        let content = toml::to_string_pretty(self)
            .map_err(|e| EngineError::Config(format!("failed to serialize config: {e}")))?;
        fs::write(path, content)?;
        tracing::debug!(?path, "config file saved");
        Ok(())
    }

    /// The platform config file path.
    #[must_use]
    pub fn config_path() -> PathBuf {
        directories::ProjectDirs::from("", "", "traymeter").map_or_else(
            || PathBuf::from("config.toml"),
            |dirs| dirs.config_dir().join("config.toml"),
        )
    }

    /// Check value bounds.
    pub fn validate(&self) -> Result<()> {
        if self.general.timeout_seconds > 300 {
            return Err(EngineError::Config(
                "timeout_seconds must be at most 300".to_string(),
            ));
        }
        if self.general.cost_window_days == 0 || self.general.cost_window_days > 365 {
            return Err(EngineError::Config(
                "cost_window_days must be between 1 and 365".to_string(),
            ));
        }
        if let Some(level) = &self.general.log_level {
            if LogLevel::from_arg(level).is_none() {
                return Err(EngineError::Config(format!(
                    "unknown log_level \"{level}\""
                )));
            }
        }
        Ok(())
    }

    /// Settings for one provider.
    #[must_use]
    pub const fn provider(&self, provider: Provider) -> &ProviderSettings {
        match provider {
            Provider::Claude => &self.providers.claude,
            Provider::Codex => &self.providers.codex,
            Provider::Gemini => &self.providers.gemini,
        }
    }

    /// Effective fetch budget for a provider.
    #[must_use]
    pub fn fetch_timeout(&self, provider: Provider) -> Duration {
        if self.general.timeout_seconds == 0 {
            provider.default_timeout()
        } else {
            Duration::from_secs(self.general.timeout_seconds)
        }
    }
}
