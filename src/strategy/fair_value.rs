//! Fair value synthesis.
//!
//! Each tick:
//! 1. The *horizon* is the nearest future target time carried by a usable
//!    (reliable enough) prediction.
//! 2. Every security with a usable prediction at or beyond the horizon gets a
//!    `News` fair value: the predicted price, banded by the source's reliability.
//! 3. Each news hit implies a market-wide surprise, measured in the hit
//!    security's return standard deviations.
//! 4. After warm-up, the averaged surprise is propagated to every remaining
//!    security through the comovement coefficient (`Beta` fair values).
//!
//! Securities reached by neither step keep their market price with the
//! default confidence and are tagged `None`.

use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use tracing::debug;

use crate::config::EngineConfig;
use crate::estimator::{ComovementStats, ReliabilityTable};
use crate::market::{MarketState, Universe};
use crate::registry::PredictionRegistry;
use crate::types::{FairValue, Prediction, Provenance, SecurityId};

/// Confidence floor; a source with zero historical error still gets a band.
pub const MIN_CONFIDENCE: f64 = 1e-9;

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct ShockEstimate {
    /// Mean implied surprise, in standard deviations per unit time.
    pub surprise: f64,
    /// Mean of `confidence / stdev` over the contributing hits.
    pub weight: f64,
    pub observations: usize,
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct FairValueBook {
    pub time: f64,
    /// `None` when no usable prediction lies in the future.
    pub horizon: Option<f64>,
    pub values: BTreeMap<SecurityId, FairValue>,
    pub shock: Option<ShockEstimate>,
}

impl FairValueBook {
    pub fn get(&self, security: &SecurityId) -> Option<&FairValue> {
        self.values.get(security)
    }

    pub fn count(&self, provenance: Provenance) -> usize {
        self.values
            .values()
            .filter(|fv| fv.provenance == provenance)
            .count()
    }
}

pub struct FairValueInputs<'a> {
    pub now: f64,
    pub universe: &'a Universe,
    pub market: &'a MarketState,
    pub registry: &'a PredictionRegistry,
    pub reliability: &'a ReliabilityTable,
    pub comovement: &'a ComovementStats,
}

#[derive(Clone, Debug)]
pub struct FairValueSynthesizer {
    min_reliability: f64,
    default_confidence: f64,
    warmup_time: f64,
    beta_confidence_scale: f64,
}

impl FairValueSynthesizer {
    pub fn new(cfg: &EngineConfig) -> Self {
        Self {
            min_reliability: cfg.min_reliability,
            default_confidence: cfg.default_confidence,
            warmup_time: cfg.warmup_time,
            beta_confidence_scale: cfg.beta_confidence_scale,
        }
    }

    pub fn synthesize(&self, inputs: &FairValueInputs<'_>) -> FairValueBook {
        let now = inputs.now;
        let horizon = self.horizon(inputs);

        let mut values = BTreeMap::new();
        let mut surprises: Vec<(f64, f64)> = Vec::new();

        for (i, security) in inputs.universe.ids().enumerate() {
            let Some(price) = inputs.market.price(security) else {
                continue;
            };
            let chosen = horizon.and_then(|h| self.select(inputs, security, h));

            let Some(prediction) = chosen else {
                values.insert(
                    security.clone(),
                    FairValue {
                        price,
                        confidence: self.default_confidence,
                        provenance: Provenance::None,
                        informing: None,
                    },
                );
                continue;
            };

            let confidence = inputs.reliability.get(&prediction.source).max(MIN_CONFIDENCE);
            let time_remaining = prediction.target_time - now;
            let drift = inputs.comovement.drift.get(i).copied().unwrap_or(0.0);
            let stdev = inputs.comovement.stdev.get(i).copied().unwrap_or(0.0);
            if time_remaining > 0.0 && stdev > 0.0 {
                let per_time = (prediction.price - price) / time_remaining - drift;
                surprises.push((per_time / stdev, confidence / stdev));
            }

            values.insert(
                security.clone(),
                FairValue {
                    price: prediction.price,
                    confidence,
                    provenance: Provenance::News,
                    informing: Some(prediction.clone()),
                },
            );
        }

        let shock = self.propagate(inputs, horizon, &surprises, &mut values);

        debug!(
            now,
            horizon = ?horizon,
            news = values.values().filter(|v| v.provenance == Provenance::News).count(),
            beta = values.values().filter(|v| v.provenance == Provenance::Beta).count(),
            "fair values synthesized"
        );

        FairValueBook {
            time: now,
            horizon,
            values,
            shock,
        }
    }

    fn horizon(&self, inputs: &FairValueInputs<'_>) -> Option<f64> {
        inputs
            .registry
            .all_predictions()
            .filter(|p| p.target_time > inputs.now)
            .filter(|p| inputs.reliability.is_usable(&p.source, self.min_reliability))
            .map(|p| p.target_time)
            .min_by(|a, b| a.total_cmp(b))
    }

    /// Nearest usable target at or beyond the horizon; on equal targets the
    /// most recently received tip wins.
    fn select<'r>(
        &self,
        inputs: &FairValueInputs<'r>,
        security: &SecurityId,
        horizon: f64,
    ) -> Option<&'r Prediction> {
        inputs
            .registry
            .predictions(security)
            .iter()
            .filter(|p| p.target_time >= horizon)
            .filter(|p| inputs.reliability.is_usable(&p.source, self.min_reliability))
            .min_by(|a, b| {
                a.target_time
                    .total_cmp(&b.target_time)
                    .then_with(|| b.seq.cmp(&a.seq))
            })
    }

    fn propagate(
        &self,
        inputs: &FairValueInputs<'_>,
        horizon: Option<f64>,
        surprises: &[(f64, f64)],
        values: &mut BTreeMap<SecurityId, FairValue>,
    ) -> Option<ShockEstimate> {
        if inputs.now <= self.warmup_time || surprises.is_empty() {
            return None;
        }
        let time_remaining = horizon? - inputs.now;
        if time_remaining <= 0.0 {
            return None;
        }

        let n = surprises.len() as f64;
        let shock = ShockEstimate {
            surprise: surprises.iter().map(|s| s.0).sum::<f64>() / n,
            weight: surprises.iter().map(|s| s.1).sum::<f64>() / n,
            observations: surprises.len(),
        };
        let confidence = (self.beta_confidence_scale / n).max(MIN_CONFIDENCE);
        let rho = inputs.comovement.coefficient;

        for (i, security) in inputs.universe.ids().enumerate() {
            let Some(fv) = values.get_mut(security) else {
                continue;
            };
            if fv.provenance != Provenance::None {
                continue;
            }
            let drift = inputs.comovement.drift.get(i).copied().unwrap_or(0.0);
            let stdev = inputs.comovement.stdev.get(i).copied().unwrap_or(0.0);
            fv.price += (drift + shock.surprise * rho * stdev) * time_remaining;
            fv.confidence = confidence;
            fv.provenance = Provenance::Beta;
        }

        debug!(
            surprise = shock.surprise,
            weight = shock.weight,
            observations = shock.observations,
            rho,
            "market shock propagated"
        );
        Some(shock)
    }
}
