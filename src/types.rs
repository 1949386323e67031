use serde::{Deserialize, Serialize};
use std::fmt;

#[derive(Clone, Debug, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct SecurityId(pub String);

#[derive(Clone, Debug, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct SourceId(pub String);

#[derive(Clone, Debug, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct OrderId(pub String);

impl fmt::Display for SecurityId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl fmt::Display for SourceId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl fmt::Display for OrderId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub enum Side {
    Buy,
    Sell,
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct BookLevel {
    pub price: f64,
    pub qty: f64,
}

/// Static description of a listed security, fixed at registration.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct Security {
    pub id: SecurityId,
    pub tradeable: bool,
    pub starting_price: f64,
}

/// Top of book for one security plus the valuation price derived from it.
///
/// `best_bid`/`best_ask` are `None` whenever either side of the book is empty;
/// `price` then carries the venue's last trade price.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct MarketQuote {
    pub security: SecurityId,
    pub best_bid: Option<BookLevel>,
    pub best_ask: Option<BookLevel>,
    pub last_price: f64,
    pub price: f64,
    pub elapsed_time: f64,
}

impl MarketQuote {
    pub fn opening(security: SecurityId, starting_price: f64) -> Self {
        Self {
            security,
            best_bid: None,
            best_ask: None,
            last_price: starting_price,
            price: starting_price,
            elapsed_time: 0.0,
        }
    }

    pub fn bid_price(&self) -> Option<f64> {
        self.best_bid.as_ref().map(|l| l.price)
    }

    pub fn ask_price(&self) -> Option<f64> {
        self.best_ask.as_ref().map(|l| l.price)
    }
}

/// One tip: "security will trade at `price` at `target_time`", attributed to `source`.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct Prediction {
    pub security: SecurityId,
    pub price: f64,
    pub target_time: f64,
    pub source: SourceId,
    pub arrival_time: f64,
    /// Registry-wide arrival sequence; later tips have larger values.
    pub seq: u64,
}

/// What a source said, as kept in its append-only track record.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct SourceEntry {
    pub security: SecurityId,
    pub price: f64,
    pub target_time: f64,
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct OpenOrder {
    pub security: SecurityId,
    pub side: Side,
    pub price: f64,
    pub quantity: i64,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Provenance {
    News,
    Beta,
    None,
}

impl Provenance {
    pub fn as_str(self) -> &'static str {
        match self {
            Provenance::News => "news",
            Provenance::Beta => "beta",
            Provenance::None => "none",
        }
    }
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct FairValue {
    pub price: f64,
    /// Full width of the confidence band around `price`.
    pub confidence: f64,
    pub provenance: Provenance,
    /// The prediction behind a `News` fair value.
    pub informing: Option<Prediction>,
}

impl FairValue {
    pub fn lower(&self) -> f64 {
        self.price - self.confidence / 2.0
    }

    pub fn upper(&self) -> f64 {
        self.price + self.confidence / 2.0
    }
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct OrderIntent {
    pub security: SecurityId,
    pub side: Side,
    pub quantity: i64,
    pub price: f64,
}

impl OrderIntent {
    /// Position change if the order fills completely.
    pub fn signed_quantity(&self) -> i64 {
        match self.side {
            Side::Buy => self.quantity,
            Side::Sell => -self.quantity,
        }
    }
}

/// Outbound instruction for the exchange-session collaborator.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub enum OrderAction {
    Submit(OrderIntent),
    Cancel { security: SecurityId, order_id: OrderId },
}
