use hdrhistogram::Histogram;
use std::collections::BTreeMap;

#[derive(Clone, Debug, Default)]
pub struct OrderCounters {
    pub submitted: u64,
    pub cancelled: u64,
    /// Crossings skipped because the clip was under the minimum.
    pub suppressed_dust: u64,
    /// Submissions dropped by the per-tick order cap.
    pub capped: u64,
    pub liquidations: u64,
}

impl OrderCounters {
    pub fn suppression_rate(&self) -> f64 {
        let denom = self.submitted + self.suppressed_dust;
        if denom == 0 {
            return 0.0;
        }
        (self.suppressed_dust as f64) / (denom as f64)
    }
}

#[derive(Clone, Debug)]
pub struct Histo {
    /// Store values in micro-units (e.g. price cents) as integers.
    inner: Histogram<u64>,
}

impl Default for Histo {
    fn default() -> Self {
        Self {
            inner: Histogram::new(3).expect("histo"),
        }
    }
}

impl Histo {
    pub fn record(&mut self, v: u64) {
        let _ = self.inner.record(v.max(1));
    }

    pub fn p50(&self) -> u64 {
        self.inner.value_at_quantile(0.50)
    }

    pub fn p95(&self) -> u64 {
        self.inner.value_at_quantile(0.95)
    }

    pub fn max(&self) -> u64 {
        self.inner.max()
    }

    pub fn count(&self) -> u64 {
        self.inner.len()
    }
}

#[derive(Clone, Debug, Default)]
pub struct EngineStats {
    pub ticks: u64,
    pub market_updates: u64,
    pub news: u64,
    pub rejected_events: u64,
    pub orders: OrderCounters,
    pub horizons_reached: u64,
    pub beta_ticks: u64,

    /// |realized - predicted| at maturity, in price cents.
    pub maturity_error_cents: Histo,
}

impl EngineStats {
    pub fn record_maturity_error(&mut self, error: f64) {
        if error.is_finite() {
            self.maturity_error_cents.record((error.abs() * 100.0) as u64);
        }
    }

    /// Flat operator view, suitable for printing as JSON.
    pub fn summary(&self) -> BTreeMap<String, String> {
        let mut kv = BTreeMap::new();
        kv.insert("ticks".into(), self.ticks.to_string());
        kv.insert("market_updates".into(), self.market_updates.to_string());
        kv.insert("news".into(), self.news.to_string());
        kv.insert("rejected_events".into(), self.rejected_events.to_string());
        kv.insert("orders.submitted".into(), self.orders.submitted.to_string());
        kv.insert("orders.cancelled".into(), self.orders.cancelled.to_string());
        kv.insert("orders.suppressed_dust".into(), self.orders.suppressed_dust.to_string());
        kv.insert("orders.capped".into(), self.orders.capped.to_string());
        kv.insert("orders.liquidations".into(), self.orders.liquidations.to_string());
        kv.insert(
            "orders.suppression_rate".into(),
            format!("{:.4}", self.orders.suppression_rate()),
        );
        kv.insert("horizons_reached".into(), self.horizons_reached.to_string());
        kv.insert("beta_ticks".into(), self.beta_ticks.to_string());
        let h = &self.maturity_error_cents;
        if h.count() > 0 {
            kv.insert("maturity_error_cents.p50".into(), h.p50().to_string());
            kv.insert("maturity_error_cents.p95".into(), h.p95().to_string());
            kv.insert("maturity_error_cents.max".into(), h.max().to_string());
        }
        kv
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn summary_includes_error_quantiles_once_recorded() {
        let mut stats = EngineStats::default();
        assert!(!stats.summary().contains_key("maturity_error_cents.p50"));

        stats.record_maturity_error(-1.5);
        stats.record_maturity_error(f64::NAN);
        assert_eq!(stats.maturity_error_cents.count(), 1);
        assert_eq!(stats.summary()["maturity_error_cents.max"], "150");
    }

    #[test]
    fn suppression_rate_handles_zero() {
        let mut c = OrderCounters::default();
        assert_eq!(c.suppression_rate(), 0.0);
        c.submitted = 3;
        c.suppressed_dust = 1;
        assert!((c.suppression_rate() - 0.25).abs() < 1e-12);
    }
}
