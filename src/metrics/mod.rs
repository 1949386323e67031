//! Operator-facing counters and distributions.

pub mod stats;

pub use stats::EngineStats;
