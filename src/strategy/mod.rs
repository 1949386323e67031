//! Per-tick strategy layer: fair values in, order actions out.

pub mod decision;
pub mod fair_value;
pub mod unwind;

pub use decision::{DecisionEngine, Decisions};
pub use fair_value::{FairValueBook, FairValueSynthesizer, ShockEstimate};
pub use unwind::{HygieneController, MaturityReport};
