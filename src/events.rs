use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

use crate::error::NewsDecodeError;
use crate::types::*;

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub enum EventKind {
    Register,
    Market,
    Trader,
    News,
}

/// Everything the exchange session delivers to the core flows through this enum.
#[derive(Clone, Debug, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum Event {
    Register(Registration),
    MarketUpdate(MarketUpdate),
    TraderUpdate(TraderUpdate),
    News(NewsEvent),
}

impl Event {
    pub fn kind(&self) -> EventKind {
        match self {
            Event::Register(_) => EventKind::Register,
            Event::MarketUpdate(_) => EventKind::Market,
            Event::TraderUpdate(_) => EventKind::Trader,
            Event::News(_) => EventKind::News,
        }
    }

    /// Venue clock carried by the event, if any.
    pub fn elapsed_time(&self) -> Option<f64> {
        match self {
            Event::Register(_) => None,
            Event::MarketUpdate(e) => Some(e.elapsed_time),
            Event::TraderUpdate(e) => Some(e.elapsed_time),
            Event::News(e) => e.elapsed_time,
        }
    }
}

#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct SecurityMeta {
    pub tradeable: bool,
    pub starting_price: f64,
}

#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct Registration {
    pub securities: BTreeMap<SecurityId, SecurityMeta>,
    pub case_length: u64,
}

#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct MarketUpdate {
    pub security: SecurityId,
    /// Full bid ladder; order is not significant.
    pub bids: Vec<BookLevel>,
    pub asks: Vec<BookLevel>,
    pub last_price: f64,
    pub elapsed_time: f64,
}

#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct TraderUpdate {
    pub positions: BTreeMap<SecurityId, i64>,
    pub open_orders: BTreeMap<OrderId, OpenOrder>,
    pub elapsed_time: f64,
}

/// Raw news item. The venue packs the security and target time into the
/// headline (`"<SECURITY> <TARGET_TIME>"`) and the predicted price into the body.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct NewsEvent {
    pub headline: String,
    pub body: String,
    pub source: SourceId,
    #[serde(default)]
    pub elapsed_time: Option<f64>,
}

#[derive(Clone, Debug, PartialEq)]
pub struct DecodedNews {
    pub security: SecurityId,
    pub target_time: f64,
    pub price: f64,
    pub source: SourceId,
}

impl NewsEvent {
    pub fn decode(&self) -> Result<DecodedNews, NewsDecodeError> {
        let mut tokens = self.headline.split_whitespace();
        let security = tokens.next().ok_or(NewsDecodeError::MissingSecurity)?;
        let target = tokens.next().ok_or(NewsDecodeError::MissingTargetTime)?;
        let target_time: f64 = target
            .parse()
            .map_err(|_| NewsDecodeError::TargetTime(target.to_string()))?;
        let body = self.body.trim();
        let price: f64 = body
            .parse()
            .map_err(|_| NewsDecodeError::Price(body.to_string()))?;
        if !target_time.is_finite() {
            return Err(NewsDecodeError::TargetTime(target.to_string()));
        }
        if !price.is_finite() {
            return Err(NewsDecodeError::Price(body.to_string()));
        }
        Ok(DecodedNews {
            security: SecurityId(security.to_string()),
            target_time,
            price,
            source: self.source.clone(),
        })
    }
}
