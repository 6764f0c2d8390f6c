//! Session Log Store (C6) and Session Optimizer (C7) — spec §4.6, §4.7.

pub mod log_store;
pub mod optimizer;

pub use log_store::{CurrentSessionPointer, SessionLogStore, SessionParseResult};
pub use optimizer::{OptimizeSessionSummary, SessionOptimizer};
