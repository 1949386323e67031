//! Statistics recomputed every tick from accumulated history.

pub mod comovement;
pub mod reliability;

pub use comovement::{ComovementEstimator, ComovementStats};
pub use reliability::{ReliabilityEstimator, ReliabilityTable};
