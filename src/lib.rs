//! traymeter - usage and cost aggregation engine.
//!
//! The library behind a system-tray monitor for AI coding-assistant
//! accounts. It turns "does this provider have working credentials right
//! now" into a normalized [`core::models::UsageSnapshot`] via an ordered
//! fallback of fetch strategies, and turns local JSONL session logs into
//! day-bucketed token/cost aggregates via incremental, offset-resumable
//! scanning.
//!
//! The embedding application owns all rendering, tray chrome, and settings
//! UI; this crate only produces data.

#![deny(unsafe_code)]
#![warn(clippy::pedantic, clippy::nursery)]
#![allow(clippy::module_name_repetitions)]
#![allow(clippy::unused_async)]

pub mod core;
pub mod error;
pub mod providers;

pub use error::{EngineError, Result};
