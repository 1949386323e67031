//! The decision core.
//!
//! `Engine` owns every piece of session state and is driven one event at a
//! time; a handler runs to completion before the next event is looked at.
//! Trader updates are the decision cadence: each one refreshes the
//! estimators, rebuilds fair values and returns the order actions for the
//! session to send.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, BTreeSet};
use std::sync::Arc;
use tracing::{debug, info, warn};

use crate::config::EngineConfig;
use crate::error::EngineError;
use crate::estimator::{ComovementEstimator, ComovementStats, ReliabilityEstimator, ReliabilityTable};
use crate::events::*;
use crate::journal::{JournalRecord, JournalSink, NoopJournal};
use crate::market::{MarketState, PriceHistory, Universe};
use crate::metrics::EngineStats;
use crate::registry::PredictionRegistry;
use crate::strategy::decision::DecisionEngine;
use crate::strategy::fair_value::{FairValueBook, FairValueInputs, FairValueSynthesizer};
use crate::strategy::unwind::{HygieneController, MaturityInputs};
use crate::types::*;

/// Upper bound on rows reserved at registration; longer cases grow the history.
const MAX_HISTORY_PRESIZE: usize = 100_000;

/// Serializable view of the full engine state.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct EngineSnapshot {
    pub written_at: DateTime<Utc>,
    pub time: f64,
    pub quotes: BTreeMap<SecurityId, MarketQuote>,
    pub positions: BTreeMap<SecurityId, i64>,
    pub open_orders: BTreeMap<OrderId, OpenOrder>,
    pub predictions: Vec<Prediction>,
    pub reliability: BTreeMap<SourceId, f64>,
    pub comovement: ComovementStats,
    pub fairs: Option<FairValueBook>,
}

pub struct Engine {
    cfg: EngineConfig,
    registered: bool,
    case_length: u64,
    universe: Universe,
    market: MarketState,
    history: PriceHistory,
    registry: PredictionRegistry,
    reliability: ReliabilityEstimator,
    comovement: ComovementEstimator,
    synthesizer: FairValueSynthesizer,
    decision: DecisionEngine,
    hygiene: HygieneController,
    positions: BTreeMap<SecurityId, i64>,
    open_orders: BTreeMap<OrderId, OpenOrder>,
    now: f64,
    last_reliability: ReliabilityTable,
    last_comovement: ComovementStats,
    fairs: Option<FairValueBook>,
    stats: EngineStats,
    journal: Arc<dyn JournalSink>,
    journal_snapshots: bool,
}

impl Engine {
    pub fn new(cfg: EngineConfig) -> Self {
        let mut engine = Self::with_journal(cfg, Arc::new(NoopJournal));
        engine.journal_snapshots = false;
        engine
    }

    pub fn with_journal(cfg: EngineConfig, journal: Arc<dyn JournalSink>) -> Self {
        Self {
            registered: false,
            case_length: 0,
            universe: Universe::default(),
            market: MarketState::new(),
            history: PriceHistory::default(),
            registry: PredictionRegistry::new(),
            reliability: ReliabilityEstimator::new(cfg.start_reliability, cfg.resolution_horizon),
            comovement: ComovementEstimator::new(0, cfg.diagonal),
            synthesizer: FairValueSynthesizer::new(&cfg),
            decision: DecisionEngine::new(&cfg),
            hygiene: HygieneController::new(&cfg),
            positions: BTreeMap::new(),
            open_orders: BTreeMap::new(),
            now: 0.0,
            last_reliability: ReliabilityTable::new(cfg.start_reliability, BTreeMap::new()),
            last_comovement: ComovementStats::empty(0),
            fairs: None,
            stats: EngineStats::default(),
            journal,
            journal_snapshots: true,
            cfg,
        }
    }

    pub fn config(&self) -> &EngineConfig {
        &self.cfg
    }

    pub fn now(&self) -> f64 {
        self.now
    }

    pub fn case_length(&self) -> u64 {
        self.case_length
    }

    pub fn universe(&self) -> &Universe {
        &self.universe
    }

    pub fn market(&self) -> &MarketState {
        &self.market
    }

    pub fn history(&self) -> &PriceHistory {
        &self.history
    }

    pub fn registry(&self) -> &PredictionRegistry {
        &self.registry
    }

    pub fn positions(&self) -> &BTreeMap<SecurityId, i64> {
        &self.positions
    }

    pub fn reliability(&self) -> &ReliabilityTable {
        &self.last_reliability
    }

    pub fn comovement(&self) -> &ComovementStats {
        &self.last_comovement
    }

    /// Fair values from the most recent tick.
    pub fn fairs(&self) -> Option<&FairValueBook> {
        self.fairs.as_ref()
    }

    pub fn stats(&self) -> &EngineStats {
        &self.stats
    }

    pub fn handle(&mut self, event: &Event) -> Result<Vec<OrderAction>, EngineError> {
        let result = match event {
            Event::Register(reg) => self.on_register(reg).map(|_| Vec::new()),
            Event::MarketUpdate(update) => self.on_market_update(update).map(|_| Vec::new()),
            Event::News(news) => self.on_news(news).map(|_| Vec::new()),
            Event::TraderUpdate(update) => self.on_trader_update(update),
        };
        if result.is_err() {
            self.stats.rejected_events += 1;
        }
        result
    }

    pub fn on_register(&mut self, reg: &Registration) -> Result<(), EngineError> {
        if self.registered {
            return Err(EngineError::AlreadyRegistered);
        }
        let securities: Vec<Security> = reg
            .securities
            .iter()
            .filter(|(_, meta)| meta.tradeable)
            .map(|(id, meta)| Security {
                id: id.clone(),
                tradeable: meta.tradeable,
                starting_price: meta.starting_price,
            })
            .collect();

        for s in &securities {
            self.market.register(s.id.clone(), s.starting_price);
            self.registry.track(s.id.clone());
            self.positions.insert(s.id.clone(), 0);
        }
        self.universe = Universe::new(securities);
        self.case_length = reg.case_length;
        let presize = usize::try_from(reg.case_length)
            .ok()
            .and_then(|n| n.checked_add(1))
            .unwrap_or(0)
            .min(MAX_HISTORY_PRESIZE);
        self.history = PriceHistory::with_capacity(presize);
        self.comovement = ComovementEstimator::new(self.universe.len(), self.cfg.diagonal);
        self.last_comovement = ComovementStats::empty(self.universe.len());
        self.registered = true;

        self.journal_emit(JournalRecord::Universe {
            securities: self.universe.ids().cloned().collect(),
        });
        info!(
            tradeable = self.universe.len(),
            listed = reg.securities.len(),
            case_length = reg.case_length,
            "registered"
        );
        Ok(())
    }

    pub fn on_market_update(&mut self, update: &MarketUpdate) -> Result<(), EngineError> {
        self.ensure_registered()?;
        let known = self.market.apply(
            &update.security,
            &update.bids,
            &update.asks,
            update.last_price,
            update.elapsed_time,
        );
        if !known {
            return Err(EngineError::UnknownSecurity(update.security.clone()));
        }
        self.advance_clock(update.elapsed_time);
        self.stats.market_updates += 1;
        Ok(())
    }

    pub fn on_news(&mut self, news: &NewsEvent) -> Result<(), EngineError> {
        self.ensure_registered()?;
        let decoded = news.decode()?;
        if !self.universe.contains(&decoded.security) {
            return Err(EngineError::UnknownSecurity(decoded.security));
        }
        if let Some(t) = news.elapsed_time {
            self.advance_clock(t);
        }
        let now = self.now;
        let p = self.registry.record(
            decoded.security,
            decoded.price,
            decoded.target_time,
            decoded.source,
            now,
        );
        debug!(
            security = %p.security,
            source = %p.source,
            price = p.price,
            target = p.target_time,
            "news"
        );
        self.stats.news += 1;
        Ok(())
    }

    /// One decision tick.
    pub fn on_trader_update(&mut self, update: &TraderUpdate) -> Result<Vec<OrderAction>, EngineError> {
        self.ensure_registered()?;
        self.advance_clock(update.elapsed_time);
        let now = self.now;

        for id in self.universe.ids() {
            let position = update.positions.get(id).copied().unwrap_or(0);
            self.positions.insert(id.clone(), position);
        }
        self.open_orders = update.open_orders.clone();

        self.record_history(now);

        let reliability = self
            .reliability
            .update(&self.registry, &self.history, &self.universe, now);
        let comovement = self.comovement.stats();
        let fairs = self.synthesizer.synthesize(&FairValueInputs {
            now,
            universe: &self.universe,
            market: &self.market,
            registry: &self.registry,
            reliability: &reliability,
            comovement: &comovement,
        });
        if fairs.shock.is_some() {
            self.stats.beta_ticks += 1;
        }

        let mut actions = self.hygiene.cancels(&self.open_orders);
        self.stats.orders.cancelled += actions.len() as u64;

        let maturity = self.hygiene.on_maturity(&MaturityInputs {
            now,
            universe: &self.universe,
            market: &self.market,
            history: &self.history,
            registry: &self.registry,
            reliability: &reliability,
            fairs: &fairs,
            positions: &self.positions,
        });
        if !maturity.reports.is_empty() {
            self.stats.horizons_reached += 1;
            for report in &maturity.reports {
                if let Some(err) = report.error() {
                    self.stats.record_maturity_error(err);
                }
            }
        }

        let pruned = self.registry.prune_expired(now);
        if !pruned.is_empty() {
            debug!(count = pruned.len(), "expired predictions pruned");
        }

        let decisions = self
            .decision
            .decide(&self.universe, &self.market, &fairs, &self.positions);
        self.stats.orders.suppressed_dust += (decisions.suppressed + maturity.suppressed) as u64;

        let liquidating: BTreeSet<&SecurityId> =
            maturity.liquidations.iter().map(|o| &o.security).collect();
        self.stats.orders.liquidations += maturity.liquidations.len() as u64;
        let mut submissions: Vec<OrderIntent> = maturity.liquidations.clone();
        submissions.extend(
            decisions
                .orders
                .into_iter()
                .filter(|o| !liquidating.contains(&o.security)),
        );
        if submissions.len() > self.cfg.max_orders_per_tick {
            let dropped = submissions.len() - self.cfg.max_orders_per_tick;
            warn!(dropped, cap = self.cfg.max_orders_per_tick, "order cap reached");
            self.stats.orders.capped += dropped as u64;
            submissions.truncate(self.cfg.max_orders_per_tick);
        }
        self.stats.orders.submitted += submissions.len() as u64;
        actions.extend(submissions.into_iter().map(OrderAction::Submit));

        self.stats.ticks += 1;
        info!(
            now,
            horizon = ?fairs.horizon,
            news = fairs.count(Provenance::News),
            beta = fairs.count(Provenance::Beta),
            none = fairs.count(Provenance::None),
            rho = comovement.coefficient,
            actions = actions.len(),
            "tick"
        );

        self.last_reliability = reliability;
        self.last_comovement = comovement;
        self.fairs = Some(fairs);
        if self.journal_snapshots {
            let snapshot = self.snapshot();
            self.journal_emit(JournalRecord::Snapshot(Box::new(snapshot)));
        }
        Ok(actions)
    }

    pub fn snapshot(&self) -> EngineSnapshot {
        EngineSnapshot {
            written_at: Utc::now(),
            time: self.now,
            quotes: self.market.quotes().clone(),
            positions: self.positions.clone(),
            open_orders: self.open_orders.clone(),
            predictions: self.registry.all_predictions().cloned().collect(),
            reliability: self.last_reliability.values().clone(),
            comovement: self.last_comovement.clone(),
            fairs: self.fairs.clone(),
        }
    }

    fn record_history(&mut self, now: f64) {
        let row: Vec<f64> = self
            .universe
            .ids()
            .map(|id| self.market.price(id).unwrap_or(f64::NAN))
            .collect();
        if !self.history.append(now, row.clone()) {
            debug!(now, "history already has this time, row skipped");
            return;
        }
        self.comovement.observe(&row);
        self.journal_emit(JournalRecord::HistoryRow { time: now, prices: row });
    }

    fn ensure_registered(&self) -> Result<(), EngineError> {
        if self.registered {
            Ok(())
        } else {
            Err(EngineError::NotRegistered)
        }
    }

    fn advance_clock(&mut self, t: f64) {
        if t.is_finite() && t > self.now {
            self.now = t;
        }
    }

    fn journal_emit(&self, record: JournalRecord) {
        if let Err(err) = self.journal.emit(record) {
            warn!(error = %err, "journal emit failed");
        }
    }
}
