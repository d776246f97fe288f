//! Analysis engine module.
//!
//! - `engine`: caching, coalescing, hybrid remote/local dispatch
//! - `local`: deterministic on-device heuristics
//! - `rate_limit`: fixed-window remote-call budget with spacing

mod engine;
mod local;
mod rate_limit;

pub use engine::AnalysisEngine;
pub use local::{local_patterns, local_sentiment, local_trends};
pub use rate_limit::RateLimiter;
