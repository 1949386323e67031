//! Order hygiene and maturity handling.
//!
//! Every resting order reported by the venue is cancelled each tick, so
//! quotes never outlive the fair values they were priced from. When the tick
//! reaches the horizon, each security's informing prediction is checked
//! against the market, and tips whose target time has passed leave the
//! working set.

use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use tracing::{debug, info, warn};

use crate::config::EngineConfig;
use crate::estimator::ReliabilityTable;
use crate::market::{MarketState, PriceHistory, Universe};
use crate::registry::PredictionRegistry;
use crate::strategy::fair_value::FairValueBook;
use crate::types::{OpenOrder, OrderAction, OrderId, OrderIntent, Prediction, SecurityId, Side};

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct MaturityReport {
    pub security: SecurityId,
    pub horizon: f64,
    pub prediction: Option<Prediction>,
    /// Price `report_lookback` before the horizon, when history reaches back that far.
    pub reference_price: Option<f64>,
    pub current_price: f64,
    pub position: i64,
}

impl MaturityReport {
    /// Realized minus predicted, for securities that had a prediction.
    pub fn error(&self) -> Option<f64> {
        self.prediction.as_ref().map(|p| self.current_price - p.price)
    }
}

#[derive(Clone, Debug, Default, PartialEq)]
pub struct MaturityOutcome {
    pub reports: Vec<MaturityReport>,
    pub liquidations: Vec<OrderIntent>,
    /// Liquidations skipped because the clip was under the minimum.
    pub suppressed: usize,
}

pub struct MaturityInputs<'a> {
    pub now: f64,
    pub universe: &'a Universe,
    pub market: &'a MarketState,
    pub history: &'a PriceHistory,
    pub registry: &'a PredictionRegistry,
    pub reliability: &'a ReliabilityTable,
    pub fairs: &'a FairValueBook,
    pub positions: &'a BTreeMap<SecurityId, i64>,
}

#[derive(Clone, Debug)]
pub struct HygieneController {
    maturity_window: f64,
    report_lookback: f64,
    min_reliability: f64,
    max_clip: i64,
    min_clip: i64,
    liquidate_on_maturity: bool,
}

impl HygieneController {
    pub fn new(cfg: &EngineConfig) -> Self {
        Self {
            maturity_window: cfg.maturity_window,
            report_lookback: cfg.report_lookback,
            min_reliability: cfg.min_reliability,
            max_clip: cfg.max_clip,
            min_clip: cfg.min_clip,
            liquidate_on_maturity: cfg.liquidate_on_maturity,
        }
    }

    /// One cancel per open order, in order-id order.
    pub fn cancels(&self, open_orders: &BTreeMap<OrderId, OpenOrder>) -> Vec<OrderAction> {
        open_orders
            .iter()
            .map(|(order_id, order)| OrderAction::Cancel {
                security: order.security.clone(),
                order_id: order_id.clone(),
            })
            .collect()
    }

    /// True once the clock is within `maturity_window` of the horizon.
    pub fn at_horizon(&self, now: f64, fairs: &FairValueBook) -> bool {
        fairs
            .horizon
            .is_some_and(|h| now >= h - self.maturity_window)
    }

    pub fn on_maturity(&self, inputs: &MaturityInputs<'_>) -> MaturityOutcome {
        let mut out = MaturityOutcome::default();
        let Some(horizon) = inputs.fairs.horizon else {
            return out;
        };
        if !self.at_horizon(inputs.now, inputs.fairs) {
            return out;
        }

        for (i, security) in inputs.universe.ids().enumerate() {
            let Some(current_price) = inputs.market.price(security) else {
                continue;
            };
            let position = inputs.positions.get(security).copied().unwrap_or(0);
            let prediction = inputs
                .fairs
                .get(security)
                .and_then(|fv| fv.informing.clone());
            let report = MaturityReport {
                security: security.clone(),
                horizon,
                reference_price: inputs
                    .history
                    .price_at_or_before(i, horizon - self.report_lookback),
                prediction,
                current_price,
                position,
            };
            info!(
                %security,
                horizon,
                reference = ?report.reference_price,
                current = current_price,
                predicted = ?report.prediction.as_ref().map(|p| p.price),
                position,
                "maturity report"
            );

            if self.liquidate_on_maturity {
                self.liquidation(inputs, &report, &mut out);
            }
            out.reports.push(report);
        }
        out
    }

    /// Flattening order for a position whose tip matures at this horizon with
    /// nothing usable lined up behind it.
    fn liquidation(&self, inputs: &MaturityInputs<'_>, report: &MaturityReport, out: &mut MaturityOutcome) {
        if report.position == 0 {
            return;
        }
        let Some(prediction) = report.prediction.as_ref() else {
            return;
        };
        if prediction.target_time > report.horizon {
            return;
        }
        let corroborated = inputs
            .registry
            .predictions(&report.security)
            .iter()
            .any(|p| {
                p.target_time > report.horizon
                    && inputs.reliability.is_usable(&p.source, self.min_reliability)
            });
        if corroborated {
            return;
        }

        let Some(quote) = inputs.market.quote(&report.security) else {
            return;
        };
        let (side, price) = if report.position > 0 {
            (Side::Sell, quote.bid_price())
        } else {
            (Side::Buy, quote.ask_price())
        };
        let Some(price) = price else {
            warn!(security = %report.security, "no touch to liquidate against");
            return;
        };
        let quantity = report.position.saturating_abs().min(self.max_clip);
        if quantity < self.min_clip {
            debug!(security = %report.security, ?side, quantity, "liquidation below minimum clip, suppressed");
            out.suppressed += 1;
            return;
        }
        info!(security = %report.security, ?side, quantity, price, "liquidating matured position");
        out.liquidations.push(OrderIntent {
            security: report.security.clone(),
            side,
            quantity,
            price,
        });
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::{BookLevel, FairValue, Provenance, Security, SourceId};

    fn sec(s: &str) -> SecurityId {
        SecurityId(s.into())
    }

    fn open(security: &str) -> OpenOrder {
        OpenOrder {
            security: sec(security),
            side: Side::Buy,
            price: 1.0,
            quantity: 10,
        }
    }

    #[test]
    fn cancels_every_open_order_exactly_once() {
        let ctl = HygieneController::new(&EngineConfig::default());
        let mut orders = BTreeMap::new();
        orders.insert(OrderId("7".into()), open("M"));
        orders.insert(OrderId("9".into()), open("N"));

        let cancels = ctl.cancels(&orders);
        assert_eq!(
            cancels,
            vec![
                OrderAction::Cancel {
                    security: sec("M"),
                    order_id: OrderId("7".into())
                },
                OrderAction::Cancel {
                    security: sec("N"),
                    order_id: OrderId("9".into())
                },
            ]
        );
        assert!(ctl.cancels(&BTreeMap::new()).is_empty());
    }

    struct World {
        universe: Universe,
        market: MarketState,
        history: PriceHistory,
        registry: PredictionRegistry,
        reliability: ReliabilityTable,
        fairs: FairValueBook,
        positions: BTreeMap<SecurityId, i64>,
    }

    fn world(position: i64) -> World {
        let universe = Universe::new(vec![Security {
            id: sec("X"),
            tradeable: true,
            starting_price: 100.0,
        }]);
        let mut market = MarketState::new();
        market.register(sec("X"), 100.0);
        market.apply(
            &sec("X"),
            &[BookLevel { price: 103.0, qty: 5.0 }],
            &[BookLevel { price: 104.0, qty: 5.0 }],
            103.5,
            19.0,
        );
        let mut history = PriceHistory::default();
        for t in 0..=19 {
            history.append(t as f64, vec![100.0 + t as f64 * 0.2]);
        }
        let mut registry = PredictionRegistry::new();
        let good = SourceId("good".into());
        let tip = registry.record(sec("X"), 104.0, 20.0, good.clone(), 5.0).clone();
        let reliability = ReliabilityTable::new(1.0, BTreeMap::new());

        let mut values = BTreeMap::new();
        values.insert(
            sec("X"),
            FairValue {
                price: 104.0,
                confidence: 1.0,
                provenance: Provenance::News,
                informing: Some(tip),
            },
        );
        World {
            universe,
            market,
            history,
            registry,
            reliability,
            fairs: FairValueBook {
                time: 19.0,
                horizon: Some(20.0),
                values,
                shock: None,
            },
            positions: [(sec("X"), position)].into_iter().collect(),
        }
    }

    fn inputs<'a>(w: &'a World, now: f64) -> MaturityInputs<'a> {
        MaturityInputs {
            now,
            universe: &w.universe,
            market: &w.market,
            history: &w.history,
            registry: &w.registry,
            reliability: &w.reliability,
            fairs: &w.fairs,
            positions: &w.positions,
        }
    }

    #[test]
    fn reports_only_within_one_tick_of_horizon() {
        let w = world(0);
        let ctl = HygieneController::new(&EngineConfig::default());
        assert!(ctl.on_maturity(&inputs(&w, 18.5)).reports.is_empty());

        let out = ctl.on_maturity(&inputs(&w, 19.0));
        assert_eq!(out.reports.len(), 1);
        let r = &out.reports[0];
        assert_eq!(r.reference_price, Some(102.0));
        assert!((r.error().unwrap() - (103.5 - 104.0)).abs() < 1e-12);
        assert!(out.liquidations.is_empty());
    }

    #[test]
    fn liquidates_uncorroborated_long_at_the_bid() {
        let w = world(120);
        let cfg = EngineConfig {
            liquidate_on_maturity: true,
            ..Default::default()
        };
        let out = HygieneController::new(&cfg).on_maturity(&inputs(&w, 19.0));
        assert_eq!(
            out.liquidations,
            vec![OrderIntent {
                security: sec("X"),
                side: Side::Sell,
                quantity: 120,
                price: 103.0,
            }]
        );
    }

    #[test]
    fn dust_position_is_not_liquidated() {
        let w = world(3);
        let cfg = EngineConfig {
            liquidate_on_maturity: true,
            ..Default::default()
        };
        let out = HygieneController::new(&cfg).on_maturity(&inputs(&w, 19.0));
        assert!(out.liquidations.is_empty());
        assert_eq!(out.suppressed, 1);
        assert_eq!(out.reports.len(), 1);
    }

    #[test]
    fn later_usable_tip_keeps_the_position() {
        let mut w = world(-80);
        w.registry
            .record(sec("X"), 110.0, 40.0, SourceId("good".into()), 10.0);
        let cfg = EngineConfig {
            liquidate_on_maturity: true,
            ..Default::default()
        };
        let out = HygieneController::new(&cfg).on_maturity(&inputs(&w, 19.0));
        assert!(out.liquidations.is_empty());
    }
}
