//! Error types for the aggregation engine.
//!
//! Uses `thiserror` for structured error types. Expected absences — an
//! unpriced model, a strategy whose credential is simply missing — are not
//! errors; they are `Option`/skip outcomes. Errors here mean something
//! actually went wrong: network faults, auth rejections, unreadable config.
//!
//! ## Error Taxonomy
//!
//! - **Authentication**: expired or rejected credentials
//! - **Network**: connection, timeout, HTTP-level failures
//! - **Configuration**: config file parsing, validation, missing values
//! - **Provider**: nothing configured, payload the parser no longer understands
//! - **Environment**: missing CLI tools, unreadable files
//! - **Internal**: unexpected errors

use thiserror::Error;

/// High-level error categories for classification and routing.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ErrorCategory {
    /// Authentication issues (expired, rejected tokens/cookies).
    Authentication,
    /// Network issues (timeout, connection, HTTP status).
    Network,
    /// Configuration issues (parse errors, invalid values).
    Configuration,
    /// Provider-specific issues (not configured, payload drift).
    Provider,
    /// Environment issues (missing CLIs, unreadable files).
    Environment,
    /// Internal errors.
    Internal,
}

impl ErrorCategory {
    /// Human-readable description of the category.
    #[must_use]
    pub const fn description(&self) -> &'static str {
        match self {
            Self::Authentication => "Authentication error",
            Self::Network => "Network error",
            Self::Configuration => "Configuration error",
            Self::Provider => "Provider error",
            Self::Environment => "Environment error",
            Self::Internal => "Internal error",
        }
    }
}

impl std::fmt::Display for ErrorCategory {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.description())
    }
}

/// Main error type for engine operations.
#[derive(Error, Debug)]
pub enum EngineError {
    /// A credential was present but the provider rejected it. The strategy
    /// that raises this is expected to have already cleared the stale secret.
    #[error("authentication expired for {provider}")]
    AuthExpired { provider: String },

    /// No strategy for the provider could even attempt execution. The hint
    /// carries provider-specific remediation wording.
    #[error("{provider} is not configured: {hint}")]
    NotConfigured { provider: String, hint: String },

    /// Network-level failure (connect, DNS, TLS, non-success HTTP status).
    #[error("network error: {0}")]
    Network(String),

    /// A fetch exceeded its time budget.
    #[error("timeout after {seconds}s for {provider}")]
    Timeout { provider: String, seconds: u64 },

    /// The remote source was reached but its payload could not be
    /// interpreted. Distinct from `Network` so callers can tell
    /// "credentials are fine, our parser is stale" from "can't reach it".
    #[error("unrecognized {provider} payload: {message}")]
    ParsePayload { provider: String, message: String },

    /// Required CLI tool not found in PATH.
    #[error("CLI tool not found: {0}")]
    ToolNotFound(String),

    /// A CLI tool ran but failed.
    #[error("{tool} failed: {reason}")]
    ToolFailed { tool: String, reason: String },

    /// Configuration error.
    #[error("configuration error: {0}")]
    Config(String),

    /// Secret store failure (backend unavailable, not a missing entry).
    #[error("secret store error: {0}")]
    SecretStore(String),

    /// I/O error.
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}

impl EngineError {
    /// Category of this error.
    #[must_use]
    pub const fn category(&self) -> ErrorCategory {
        match self {
            Self::AuthExpired { .. } => ErrorCategory::Authentication,
            Self::Network(_) | Self::Timeout { .. } => ErrorCategory::Network,
            Self::Config(_) => ErrorCategory::Configuration,
            Self::NotConfigured { .. } | Self::ParsePayload { .. } => ErrorCategory::Provider,
            Self::ToolNotFound(_) | Self::ToolFailed { .. } | Self::Io(_) => {
                ErrorCategory::Environment
            }
            Self::SecretStore(_) => ErrorCategory::Internal,
        }
    }

    /// Whether a later refresh cycle may plausibly succeed without user action.
    #[must_use]
    pub const fn is_retryable(&self) -> bool {
        matches!(
            self,
            Self::Network(_) | Self::Timeout { .. } | Self::ToolFailed { .. }
        )
    }

    /// Whether this error means the user must re-authenticate.
    #[must_use]
    pub const fn needs_reauth(&self) -> bool {
        matches!(self, Self::AuthExpired { .. })
    }
}

/// Convenience result type.
pub type Result<T> = std::result::Result<T, EngineError>;
