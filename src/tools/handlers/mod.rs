//! Built-in tool handlers (spec §4.11). Each is a thin `Tool` impl over
//! one or more core components; wiring happens in `lib.rs`.

pub mod cache_stats;
pub mod get_cached;
pub mod invalidation;
pub mod optimize_text;
pub mod partition;
pub mod pluggable_stub;
pub mod predictive;
pub mod session_optimize;
