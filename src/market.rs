//! Top-of-book tracking and the price history log.
//!
//! Securities are indexed by their position in the registered universe, so a
//! history row is a plain `Vec<f64>` in universe order.

use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

use crate::types::{BookLevel, MarketQuote, Security, SecurityId};

/// The registered tradeable securities, in a fixed order.
#[derive(Clone, Debug, Default, Serialize, Deserialize)]
pub struct Universe {
    securities: Vec<Security>,
    index: BTreeMap<SecurityId, usize>,
}

impl Universe {
    pub fn new(securities: Vec<Security>) -> Self {
        let index = securities
            .iter()
            .enumerate()
            .map(|(i, s)| (s.id.clone(), i))
            .collect();
        Self { securities, index }
    }

    pub fn index_of(&self, security: &SecurityId) -> Option<usize> {
        self.index.get(security).copied()
    }

    pub fn contains(&self, security: &SecurityId) -> bool {
        self.index.contains_key(security)
    }

    pub fn ids(&self) -> impl Iterator<Item = &SecurityId> {
        self.securities.iter().map(|s| &s.id)
    }

    pub fn len(&self) -> usize {
        self.securities.len()
    }

    pub fn is_empty(&self) -> bool {
        self.securities.is_empty()
    }
}

#[derive(Clone, Debug, Default, Serialize, Deserialize)]
pub struct MarketState {
    quotes: BTreeMap<SecurityId, MarketQuote>,
}

impl MarketState {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn register(&mut self, security: SecurityId, starting_price: f64) {
        self.quotes
            .insert(security.clone(), MarketQuote::opening(security, starting_price));
    }

    pub fn quote(&self, security: &SecurityId) -> Option<&MarketQuote> {
        self.quotes.get(security)
    }

    pub fn quotes(&self) -> &BTreeMap<SecurityId, MarketQuote> {
        &self.quotes
    }

    pub fn price(&self, security: &SecurityId) -> Option<f64> {
        self.quotes.get(security).map(|q| q.price)
    }

    /// Folds a full-ladder market update into the security's quote.
    ///
    /// Returns `false` when the security is not tracked.
    pub fn apply(
        &mut self,
        security: &SecurityId,
        bids: &[BookLevel],
        asks: &[BookLevel],
        last_price: f64,
        elapsed_time: f64,
    ) -> bool {
        let Some(quote) = self.quotes.get_mut(security) else {
            return false;
        };

        let best_bid = bids
            .iter()
            .filter(|l| l.qty > 0.0 && l.price.is_finite())
            .max_by(|a, b| a.price.total_cmp(&b.price))
            .cloned();
        let best_ask = asks
            .iter()
            .filter(|l| l.qty > 0.0 && l.price.is_finite())
            .min_by(|a, b| a.price.total_cmp(&b.price))
            .cloned();

        quote.last_price = last_price;
        quote.elapsed_time = elapsed_time;
        match (best_bid, best_ask) {
            (Some(bid), Some(ask)) => {
                quote.price = size_weighted_mid(&bid, &ask);
                quote.best_bid = Some(bid);
                quote.best_ask = Some(ask);
            }
            _ => {
                quote.best_bid = None;
                quote.best_ask = None;
                quote.price = last_price;
            }
        }
        true
    }
}

/// Midpoint weighted toward the thinner side of the touch.
pub fn size_weighted_mid(bid: &BookLevel, ask: &BookLevel) -> f64 {
    let total = bid.qty + ask.qty;
    if total <= 0.0 {
        return (bid.price + ask.price) / 2.0;
    }
    (ask.price * bid.qty + bid.price * ask.qty) / total
}

/// Append-only price vectors keyed by strictly increasing elapsed time.
#[derive(Clone, Debug, Default, Serialize, Deserialize)]
pub struct PriceHistory {
    times: Vec<f64>,
    rows: Vec<Vec<f64>>,
}

impl PriceHistory {
    pub fn with_capacity(ticks: usize) -> Self {
        Self {
            times: Vec::with_capacity(ticks),
            rows: Vec::with_capacity(ticks),
        }
    }

    /// Appends a row. A time at or before the last key is refused.
    pub fn append(&mut self, time: f64, row: Vec<f64>) -> bool {
        if !time.is_finite() {
            return false;
        }
        if let Some(&last) = self.times.last() {
            if time <= last {
                return false;
            }
        }
        self.times.push(time);
        self.rows.push(row);
        true
    }

    pub fn len(&self) -> usize {
        self.times.len()
    }

    pub fn is_empty(&self) -> bool {
        self.times.is_empty()
    }

    pub fn times(&self) -> &[f64] {
        &self.times
    }

    pub fn rows(&self) -> &[Vec<f64>] {
        &self.rows
    }

    /// Index of the first sample at or after `time`.
    pub fn lower_bound(&self, time: f64) -> usize {
        self.times.partition_point(|&t| t < time)
    }

    /// Latest recorded price of `asset` at or before `time`.
    pub fn price_at_or_before(&self, asset: usize, time: f64) -> Option<f64> {
        let idx = self.times.partition_point(|&t| t <= time);
        if idx == 0 {
            return None;
        }
        self.rows[idx - 1].get(asset).copied()
    }

    /// Mean price of `asset` over samples with time in `[start, end)`.
    pub fn window_mean(&self, asset: usize, start: f64, end: f64) -> Option<f64> {
        let lo = self.lower_bound(start);
        let hi = self.lower_bound(end);
        if hi <= lo {
            return None;
        }
        let mut sum = 0.0;
        for row in &self.rows[lo..hi] {
            sum += *row.get(asset)?;
        }
        Some(sum / (hi - lo) as f64)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn lvl(price: f64, qty: f64) -> BookLevel {
        BookLevel { price, qty }
    }

    fn tracked() -> (MarketState, SecurityId) {
        let id = SecurityId("X".into());
        let mut state = MarketState::new();
        state.register(id.clone(), 100.0);
        (state, id)
    }

    #[test]
    fn picks_best_levels_and_weights_toward_thin_side() {
        let (mut state, id) = tracked();
        let bids = [lvl(99.0, 10.0), lvl(99.5, 30.0), lvl(98.0, 5.0)];
        let asks = [lvl(101.0, 10.0), lvl(100.5, 10.0)];
        assert!(state.apply(&id, &bids, &asks, 100.2, 7.0));

        let q = state.quote(&id).unwrap();
        assert_eq!(q.bid_price(), Some(99.5));
        assert_eq!(q.ask_price(), Some(100.5));
        // (100.5*30 + 99.5*10) / 40: heavy bid pushes the price toward the ask.
        assert!((q.price - 100.25).abs() < 1e-12);
        assert_eq!(q.elapsed_time, 7.0);
    }

    #[test]
    fn empty_side_falls_back_to_last_trade() {
        let (mut state, id) = tracked();
        state.apply(&id, &[lvl(99.0, 1.0)], &[lvl(101.0, 1.0)], 100.0, 1.0);
        state.apply(&id, &[lvl(99.0, 1.0)], &[], 97.0, 2.0);

        let q = state.quote(&id).unwrap();
        assert_eq!(q.best_bid, None);
        assert_eq!(q.best_ask, None);
        assert_eq!(q.price, 97.0);
    }

    #[test]
    fn unknown_security_is_reported() {
        let (mut state, _) = tracked();
        assert!(!state.apply(&SecurityId("Y".into()), &[], &[], 1.0, 1.0));
    }

    #[test]
    fn history_never_overwrites_a_key() {
        let mut h = PriceHistory::default();
        assert!(h.append(1.0, vec![10.0]));
        assert!(!h.append(1.0, vec![99.0]));
        assert!(!h.append(0.5, vec![99.0]));
        assert!(h.append(2.0, vec![11.0]));
        assert_eq!(h.rows(), &[vec![10.0], vec![11.0]]);
    }

    #[test]
    fn window_mean_is_half_open() {
        let mut h = PriceHistory::default();
        for (t, p) in [(1.0, 10.0), (2.0, 12.0), (3.0, 14.0), (4.0, 100.0)] {
            h.append(t, vec![p]);
        }
        assert_eq!(h.window_mean(0, 1.0, 4.0), Some(12.0));
        assert_eq!(h.window_mean(0, 1.5, 2.5), Some(12.0));
        assert_eq!(h.window_mean(0, 4.0, 4.0), None);
        assert_eq!(h.price_at_or_before(0, 3.5), Some(14.0));
        assert_eq!(h.price_at_or_before(0, 0.5), None);
    }
}
