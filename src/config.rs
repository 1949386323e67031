use anyhow::Context;
use serde::{Deserialize, Serialize};
use std::path::Path;

use crate::error::ConfigError;

/// Which correlation-matrix entries feed the comovement median.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DiagonalPolicy {
    /// All n*n entries, unit diagonal included. Biases the scalar toward 1.
    Include,
    /// Off-diagonal entries only.
    #[default]
    Exclude,
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct EngineConfig {
    /// Hard bound on |position| per security.
    pub position_limit: i64,
    /// New submissions per tick (cancels are not counted).
    pub max_orders_per_tick: usize,
    /// Reliability assigned to a source with no matured predictions.
    pub start_reliability: f64,
    /// A source is usable when its reliability is at or below this.
    pub min_reliability: f64,
    pub max_clip: i64,
    /// Smallest quantity worth sending.
    pub min_clip: i64,
    /// Confidence given to securities with no estimate.
    pub default_confidence: f64,
    /// Fair values are traded only when their confidence is strictly below this.
    pub acceptable_confidence: f64,
    /// Beta propagation starts once elapsed time exceeds this.
    pub warmup_time: f64,
    /// Length of the window over which a matured prediction is scored.
    pub resolution_horizon: f64,
    /// Beta confidence is this divided by the number of news observations.
    pub beta_confidence_scale: f64,
    /// Maturity handling fires once `now >= horizon - maturity_window`.
    pub maturity_window: f64,
    /// Maturity reports compare against the price this long before the horizon.
    pub report_lookback: f64,
    pub diagonal: DiagonalPolicy,
    /// Flatten positions whose informing prediction matured uncorroborated.
    pub liquidate_on_maturity: bool,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            position_limit: 500,
            max_orders_per_tick: 100,
            start_reliability: 30.0,
            min_reliability: 5.0,
            max_clip: 2_000,
            min_clip: 10,
            default_confidence: 5.0,
            acceptable_confidence: 5.0,
            warmup_time: 50.0,
            resolution_horizon: 5.0,
            beta_confidence_scale: 6.0,
            maturity_window: 1.0,
            report_lookback: 10.0,
            diagonal: DiagonalPolicy::Exclude,
            liquidate_on_maturity: false,
        }
    }
}

impl EngineConfig {
    /// Reads a (possibly partial) JSON config; absent fields keep their defaults.
    pub fn from_json_file(path: impl AsRef<Path>) -> anyhow::Result<Self> {
        let path = path.as_ref();
        let raw = std::fs::read_to_string(path)
            .with_context(|| format!("read config {}", path.display()))?;
        let cfg: Self = serde_json::from_str(&raw)
            .with_context(|| format!("parse config {}", path.display()))?;
        cfg.validate()?;
        Ok(cfg)
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        positive("position_limit", self.position_limit as f64)?;
        positive("max_orders_per_tick", self.max_orders_per_tick as f64)?;
        positive("max_clip", self.max_clip as f64)?;
        positive("default_confidence", self.default_confidence)?;
        positive("resolution_horizon", self.resolution_horizon)?;
        positive("beta_confidence_scale", self.beta_confidence_scale)?;
        non_negative("start_reliability", self.start_reliability)?;
        non_negative("min_reliability", self.min_reliability)?;
        non_negative("acceptable_confidence", self.acceptable_confidence)?;
        non_negative("min_clip", self.min_clip as f64)?;
        non_negative("warmup_time", self.warmup_time)?;
        non_negative("maturity_window", self.maturity_window)?;
        non_negative("report_lookback", self.report_lookback)?;
        if self.min_clip > self.max_clip {
            return Err(ConfigError::ClipRange {
                min: self.min_clip,
                max: self.max_clip,
            });
        }
        Ok(())
    }
}

fn positive(field: &'static str, value: f64) -> Result<(), ConfigError> {
    if value.is_finite() && value > 0.0 {
        Ok(())
    } else {
        Err(ConfigError::NotPositive { field, value })
    }
}

fn non_negative(field: &'static str, value: f64) -> Result<(), ConfigError> {
    if value.is_finite() && value >= 0.0 {
        Ok(())
    } else {
        Err(ConfigError::Negative { field, value })
    }
}
