//! C9 — Cache Invalidation Engine (spec §4.9).

pub mod engine;
pub mod types;

pub use engine::InvalidationEngine;
pub use types::{
    DependencyNode, InvalidationMode, InvalidationRecord, InvalidationStats, InvalidationStrategy,
    ScheduledInvalidation, ValidationReport,
};
