//! Fair-value arbitrage: lean on the touch whenever it crosses the
//! confidence band, sized to the room left under the position limit.

use std::collections::BTreeMap;
use tracing::{debug, info};

use crate::config::EngineConfig;
use crate::market::{MarketState, Universe};
use crate::strategy::fair_value::FairValueBook;
use crate::types::{OrderIntent, Provenance, SecurityId, Side};

#[derive(Clone, Debug, Default, PartialEq)]
pub struct Decisions {
    pub orders: Vec<OrderIntent>,
    /// Crossings whose size fell under the minimum clip.
    pub suppressed: usize,
}

#[derive(Clone, Debug)]
pub struct DecisionEngine {
    position_limit: i64,
    max_clip: i64,
    min_clip: i64,
    acceptable_confidence: f64,
}

impl DecisionEngine {
    pub fn new(cfg: &EngineConfig) -> Self {
        Self {
            position_limit: cfg.position_limit,
            max_clip: cfg.max_clip,
            min_clip: cfg.min_clip,
            acceptable_confidence: cfg.acceptable_confidence,
        }
    }

    pub fn decide(
        &self,
        universe: &Universe,
        market: &MarketState,
        fairs: &FairValueBook,
        positions: &BTreeMap<SecurityId, i64>,
    ) -> Decisions {
        let mut out = Decisions::default();

        for security in universe.ids() {
            let (Some(fair), Some(quote)) = (fairs.get(security), market.quote(security)) else {
                continue;
            };
            if fair.provenance == Provenance::None || fair.confidence >= self.acceptable_confidence {
                continue;
            }
            let position = positions.get(security).copied().unwrap_or(0);

            if let Some(bid) = quote.bid_price() {
                if bid > fair.upper() {
                    let room = self.position_limit.saturating_add(position);
                    self.push(&mut out, security, Side::Sell, room, fair.upper());
                }
            }
            if let Some(ask) = quote.ask_price() {
                if ask < fair.lower() {
                    let room = self.position_limit.saturating_sub(position);
                    self.push(&mut out, security, Side::Buy, room, fair.lower());
                }
            }
        }
        out
    }

    fn push(&self, out: &mut Decisions, security: &SecurityId, side: Side, room: i64, price: f64) {
        let quantity = self.max_clip.min(room).max(0);
        if quantity < self.min_clip || quantity == 0 {
            debug!(%security, ?side, quantity, "clip below minimum, suppressed");
            out.suppressed += 1;
            return;
        }
        info!(%security, ?side, quantity, price, "fair value crossed");
        out.orders.push(OrderIntent {
            security: security.clone(),
            side,
            quantity,
            price,
        });
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::{BookLevel, FairValue, Security};

    fn sec(s: &str) -> SecurityId {
        SecurityId(s.into())
    }

    fn setup(bid: f64, ask: f64) -> (Universe, MarketState) {
        let universe = Universe::new(vec![Security {
            id: sec("X"),
            tradeable: true,
            starting_price: 100.0,
        }]);
        let mut market = MarketState::new();
        market.register(sec("X"), 100.0);
        market.apply(
            &sec("X"),
            &[BookLevel { price: bid, qty: 10.0 }],
            &[BookLevel { price: ask, qty: 10.0 }],
            100.0,
            1.0,
        );
        (universe, market)
    }

    fn book(price: f64, confidence: f64, provenance: Provenance) -> FairValueBook {
        let mut values = BTreeMap::new();
        values.insert(
            sec("X"),
            FairValue {
                price,
                confidence,
                provenance,
                informing: None,
            },
        );
        FairValueBook {
            time: 1.0,
            horizon: Some(10.0),
            values,
            shock: None,
        }
    }

    fn positions(p: i64) -> BTreeMap<SecurityId, i64> {
        [(sec("X"), p)].into_iter().collect()
    }

    fn engine() -> DecisionEngine {
        DecisionEngine::new(&EngineConfig {
            acceptable_confidence: 5.0,
            ..Default::default()
        })
    }

    #[test]
    fn sells_rich_market_at_band_top() {
        let (u, m) = setup(108.0, 110.0);
        let d = engine().decide(&u, &m, &book(105.0, 4.0, Provenance::News), &positions(0));
        assert_eq!(
            d.orders,
            vec![OrderIntent {
                security: sec("X"),
                side: Side::Sell,
                quantity: 500,
                price: 107.0,
            }]
        );
    }

    #[test]
    fn buys_cheap_market_at_band_bottom_within_limit() {
        let (u, m) = setup(90.0, 92.0);
        let d = engine().decide(&u, &m, &book(100.0, 2.0, Provenance::Beta), &positions(200));
        assert_eq!(d.orders.len(), 1);
        assert_eq!(d.orders[0].side, Side::Buy);
        assert_eq!(d.orders[0].quantity, 300);
        assert_eq!(d.orders[0].price, 99.0);
    }

    #[test]
    fn never_trades_unestimated_or_wide_fairs() {
        let (u, m) = setup(108.0, 110.0);
        let e = engine();
        assert!(e.decide(&u, &m, &book(100.0, 1.0, Provenance::None), &positions(0)).orders.is_empty());
        assert!(e.decide(&u, &m, &book(100.0, 5.0, Provenance::News), &positions(0)).orders.is_empty());
    }

    #[test]
    fn suppresses_dust_near_the_limit() {
        let (u, m) = setup(108.0, 110.0);
        let d = engine().decide(&u, &m, &book(105.0, 4.0, Provenance::News), &positions(-495));
        assert!(d.orders.is_empty());
        assert_eq!(d.suppressed, 1);
    }

    #[test]
    fn extreme_positions_only_trade_toward_flat() {
        let e = engine();

        let (u, m) = setup(108.0, 110.0);
        let d = e.decide(&u, &m, &book(100.0, 2.0, Provenance::News), &positions(i64::MAX));
        assert_eq!(d.orders.len(), 1);
        assert_eq!(d.orders[0].side, Side::Sell);
        assert_eq!(d.orders[0].quantity, 2_000);
        let d = e.decide(&u, &m, &book(100.0, 2.0, Provenance::News), &positions(i64::MIN));
        assert!(d.orders.is_empty());
        assert_eq!(d.suppressed, 1);

        let (u, m) = setup(90.0, 92.0);
        let d = e.decide(&u, &m, &book(100.0, 2.0, Provenance::News), &positions(i64::MIN));
        assert_eq!(d.orders.len(), 1);
        assert_eq!(d.orders[0].side, Side::Buy);
        assert_eq!(d.orders[0].quantity, 2_000);
    }

    #[test]
    fn orders_never_breach_the_position_limit() {
        let e = engine();
        for position in [-500, -499, -300, 0, 250, 499, 500] {
            for (bid, ask) in [(108.0, 110.0), (90.0, 92.0)] {
                let (u, m) = setup(bid, ask);
                let d = e.decide(&u, &m, &book(100.0, 2.0, Provenance::News), &positions(position));
                for o in d.orders {
                    let after = position + o.signed_quantity();
                    assert!(after.abs() <= 500, "position {position} -> {after}");
                    assert!(o.quantity >= 10);
                }
            }
        }
    }

    #[test]
    fn one_sided_book_disables_comparisons() {
        let (u, mut m) = setup(108.0, 110.0);
        m.apply(&sec("X"), &[BookLevel { price: 108.0, qty: 5.0 }], &[], 109.0, 2.0);
        let d = engine().decide(&u, &m, &book(100.0, 2.0, Provenance::News), &positions(0));
        assert!(d.orders.is_empty());
    }
}
