//! Source reliability: RMS distance between what a source predicted and the
//! average price actually realized just after the target time.
//!
//! A prediction is scored over `[target, min(target + horizon, now))`. Once
//! `now` has moved past `target + horizon` its residual can no longer change,
//! so it is folded into the source's running sum and never revisited.

use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

use crate::market::{PriceHistory, Universe};
use crate::registry::PredictionRegistry;
use crate::types::{SourceEntry, SourceId};

/// Per-tick reliability lookup. Unknown sources read as the start value.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct ReliabilityTable {
    default: f64,
    values: BTreeMap<SourceId, f64>,
}

impl ReliabilityTable {
    pub fn new(default: f64, values: BTreeMap<SourceId, f64>) -> Self {
        Self { default, values }
    }

    pub fn get(&self, source: &SourceId) -> f64 {
        self.values.get(source).copied().unwrap_or(self.default)
    }

    pub fn is_usable(&self, source: &SourceId, threshold: f64) -> bool {
        self.get(source) <= threshold
    }

    pub fn values(&self) -> &BTreeMap<SourceId, f64> {
        &self.values
    }
}

#[derive(Clone, Debug, Default, Serialize, Deserialize)]
struct SourceAccumulator {
    /// Entries of the source record already picked up.
    cursor: usize,
    /// Record indices not yet settled.
    pending: Vec<usize>,
    settled_sum_sq: f64,
    settled_count: usize,
}

#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct ReliabilityEstimator {
    start_reliability: f64,
    horizon: f64,
    sources: BTreeMap<SourceId, SourceAccumulator>,
}

impl ReliabilityEstimator {
    pub fn new(start_reliability: f64, horizon: f64) -> Self {
        Self {
            start_reliability,
            horizon,
            sources: BTreeMap::new(),
        }
    }

    pub fn update(
        &mut self,
        registry: &PredictionRegistry,
        history: &PriceHistory,
        universe: &Universe,
        now: f64,
    ) -> ReliabilityTable {
        let mut values = BTreeMap::new();

        for (source, record) in registry.sources() {
            let acc = self.sources.entry(source.clone()).or_default();
            acc.pending.extend(acc.cursor..record.len());
            acc.cursor = record.len();

            let mut sum_sq = 0.0;
            let mut count = 0usize;
            let mut still_pending = Vec::with_capacity(acc.pending.len());

            for &idx in &acc.pending {
                let entry = &record[idx];
                if entry.target_time >= now {
                    still_pending.push(idx);
                    continue;
                }
                let residual = residual(entry, history, universe, now, self.horizon);
                let settled = now >= entry.target_time + self.horizon;
                match (residual, settled) {
                    (Some(r), true) => {
                        acc.settled_sum_sq += r * r;
                        acc.settled_count += 1;
                    }
                    (Some(r), false) => {
                        sum_sq += r * r;
                        count += 1;
                        still_pending.push(idx);
                    }
                    (None, true) => {}
                    (None, false) => still_pending.push(idx),
                }
            }
            acc.pending = still_pending;

            let total = acc.settled_count + count;
            let value = if total == 0 {
                self.start_reliability
            } else {
                ((acc.settled_sum_sq + sum_sq) / total as f64).sqrt()
            };
            values.insert(source.clone(), value);
        }

        ReliabilityTable::new(self.start_reliability, values)
    }
}

/// Realized minus predicted, or `None` when the window holds no samples.
fn residual(
    entry: &SourceEntry,
    history: &PriceHistory,
    universe: &Universe,
    now: f64,
    horizon: f64,
) -> Option<f64> {
    let asset = universe.index_of(&entry.security)?;
    let end = (entry.target_time + horizon).min(now);
    let realized = history.window_mean(asset, entry.target_time, end)?;
    Some(realized - entry.price)
}
