//! News-driven fair value quoting core.
//!
//! The engine fuses attributed price predictions ("tips") with live top of
//! book into a confidence-weighted fair value per security, then turns
//! mispricings into limit-respecting orders. It covers:
//! source reliability from matured tips, drift/volatility/comovement from the
//! price history, cross-sectional propagation of news shocks, and
//! re-quoting/unwinding as information expires.

pub mod config;
pub mod engine;
pub mod error;
pub mod estimator;
pub mod events;
pub mod execution;
pub mod journal;
pub mod market;
pub mod metrics;
pub mod registry;
pub mod strategy;
pub mod types;

pub use crate::config::EngineConfig;
pub use crate::engine::{Engine, EngineSnapshot};
pub use crate::error::EngineError;
