//! Engine logging setup.
//!
//! The host application calls [`init_from_env`] once at startup; everything
//! else in the crate just emits `tracing` events. Behavior is driven by the
//! `TRAYMETER_LOG`, `TRAYMETER_LOG_FORMAT` and `TRAYMETER_LOG_FILE`
//! environment variables.

use std::fs::OpenOptions;
use std::path::PathBuf;

use tracing_subscriber::fmt::format::FmtSpan;
use tracing_subscriber::fmt::writer::BoxMakeWriter;
use tracing_subscriber::EnvFilter;

const LOG_LEVEL_ENV: &str = "TRAYMETER_LOG";
const LOG_FORMAT_ENV: &str = "TRAYMETER_LOG_FORMAT";
const LOG_FILE_ENV: &str = "TRAYMETER_LOG_FILE";

/// Log output format.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum LogFormat {
    /// Human-readable logs.
    #[default]
    Human,
    /// JSON logs, one event per line.
    Json,
    /// Single-line terse logs.
    Compact,
}

impl LogFormat {
    /// Parse from a string, case-insensitive.
    #[must_use]
    pub fn from_arg(s: &str) -> Option<Self> {
        match s.to_lowercase().as_str() {
            "human" => Some(Self::Human),
            "json" => Some(Self::Json),
            "compact" => Some(Self::Compact),
            _ => None,
        }
    }
}

/// Minimum level for the default filter.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum LogLevel {
    Trace,
    Debug,
    Info,
    #[default]
    Warn,
    Error,
}

impl LogLevel {
    /// Parse from a string, case-insensitive.
    #[must_use]
    pub fn from_arg(s: &str) -> Option<Self> {
        match s.to_lowercase().as_str() {
            "trace" => Some(Self::Trace),
            "verbose" | "debug" => Some(Self::Debug),
            "info" => Some(Self::Info),
            "warn" | "warning" => Some(Self::Warn),
            "error" => Some(Self::Error),
            _ => None,
        }
    }

    /// Filter directive fragment for this level.
    #[must_use]
    pub const fn as_filter(self) -> &'static str {
        match self {
            Self::Trace => "trace",
            Self::Debug => "debug",
            Self::Info => "info",
            Self::Warn => "warn",
            Self::Error => "error",
        }
    }
}

fn env_trimmed(key: &str) -> Option<String> {
    std::env::var(key).ok().and_then(|value| {
        let trimmed = value.trim();
        if trimmed.is_empty() {
            None
        } else {
            Some(trimmed.to_string())
        }
    })
}

/// Initialize logging from the `TRAYMETER_*` environment variables.
pub fn init_from_env() {
    init_from_env_or(None);
}

/// Initialize from the environment with a fallback level, typically the
/// config file's `log_level`. `TRAYMETER_LOG` still wins when set.
pub fn init_from_env_or(fallback: Option<LogLevel>) {
    let level = env_trimmed(LOG_LEVEL_ENV)
        .and_then(|v| LogLevel::from_arg(&v))
        .or(fallback)
        .unwrap_or_default();
    let format = env_trimmed(LOG_FORMAT_ENV)
        .and_then(|v| LogFormat::from_arg(&v))
        .unwrap_or_default();
    let file = env_trimmed(LOG_FILE_ENV).map(PathBuf::from);
    init(level, format, file);
}

/// Initialize logging with explicit settings.
///
/// Safe to call more than once; later calls are no-ops.
pub fn init(level: LogLevel, format: LogFormat, log_file: Option<PathBuf>) {
    let file = log_file.and_then(|path| {
        OpenOptions::new()
            .create(true)
            .append(true)
            .open(&path)
            .ok()
    });

    let writer = if let Some(file) = file {
        BoxMakeWriter::new(file)
    } else {
        BoxMakeWriter::new(std::io::stderr)
    };

    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new(format!("traymeter={}", level.as_filter())));

    match format {
        LogFormat::Json => {
            tracing_subscriber::fmt()
                .with_env_filter(filter)
                .json()
                .with_writer(writer)
                .with_span_events(FmtSpan::CLOSE)
                .try_init()
                .ok();
        }
        LogFormat::Compact => {
            tracing_subscriber::fmt()
                .with_env_filter(filter)
                .compact()
                .with_writer(writer)
                .with_target(true)
                .try_init()
                .ok();
        }
        LogFormat::Human => {
            tracing_subscriber::fmt()
                .with_env_filter(filter)
                .with_writer(writer)
                .with_target(false)
                .without_time()
                .try_init()
                .ok();
        }
    }
}
