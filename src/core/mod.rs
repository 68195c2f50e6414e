//! Core engine: data models, day-range math, pricing, log scanning,
//! and the fetch-strategy orchestrator.

pub mod claude_logs;
pub mod cli_runner;
pub mod codex_logs;
pub mod config;
pub mod cost_tracker;
pub mod dayrange;
pub mod fetch;
pub mod http;
pub mod ledger;
pub mod logging;
pub mod models;
pub mod pricing;
pub mod provider;
pub mod secrets;
