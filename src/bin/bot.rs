use anyhow::Context;
use clap::Parser;
use news_beta_bot::events::*;
use news_beta_bot::execution::paper::PaperAdapter;
use news_beta_bot::execution::dispatch;
use news_beta_bot::journal::file::FileJournal;
use news_beta_bot::journal::{JournalSink, NoopJournal};
use news_beta_bot::types::*;
use news_beta_bot::{Engine, EngineConfig};
use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};
use std::collections::BTreeMap;
use std::io::{BufRead, BufReader};
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tracing::warn;

#[derive(Parser, Debug)]
#[command(name = "bot")]
struct Args {
    /// JSON-lines session to replay; a synthetic session is generated when absent.
    #[arg(long)]
    events: Option<PathBuf>,

    /// JSON engine config (partial files fall back to defaults).
    #[arg(long, env = "NEWS_BOT_CONFIG")]
    config: Option<PathBuf>,

    #[arg(long)]
    history_csv: Option<PathBuf>,

    #[arg(long)]
    snapshot_json: Option<PathBuf>,

    #[arg(long, env = "NEWS_BOT_LOG_JSON")]
    log_json: bool,

    #[arg(long)]
    position_limit: Option<i64>,

    #[arg(long)]
    liquidate_on_maturity: bool,

    /// Synthetic session: number of securities.
    #[arg(long, default_value_t = 4)]
    securities: usize,

    /// Synthetic session: case length in time units.
    #[arg(long, default_value_t = 200)]
    case_length: u64,

    #[arg(long, default_value_t = 7)]
    seed: u64,
}

fn init_tracing(json: bool) {
    let filter = tracing_subscriber::EnvFilter::from_default_env();
    if json {
        tracing_subscriber::fmt().json().with_env_filter(filter).init();
    } else {
        tracing_subscriber::fmt().with_env_filter(filter).init();
    }
}

fn load_config(args: &Args) -> anyhow::Result<EngineConfig> {
    let mut cfg = match &args.config {
        Some(path) => EngineConfig::from_json_file(path)?,
        None => EngineConfig::default(),
    };
    if let Some(limit) = args.position_limit {
        cfg.position_limit = limit;
    }
    if args.liquidate_on_maturity {
        cfg.liquidate_on_maturity = true;
    }
    cfg.validate()?;
    Ok(cfg)
}

fn read_events(path: &Path) -> anyhow::Result<Vec<Event>> {
    let file = std::fs::File::open(path).with_context(|| format!("open {}", path.display()))?;
    let mut out = Vec::new();
    for (n, line) in BufReader::new(file).lines().enumerate() {
        let line = line.with_context(|| format!("read line {}", n + 1))?;
        if line.trim().is_empty() {
            continue;
        }
        let event: Event =
            serde_json::from_str(&line).with_context(|| format!("parse event on line {}", n + 1))?;
        out.push(event);
    }
    Ok(out)
}

/// Pre-drawn price paths, so tips can be scored against the future.
struct SyntheticSession {
    ids: Vec<SecurityId>,
    paths: Vec<Vec<f64>>,
    rng: StdRng,
}

impl SyntheticSession {
    fn new(securities: usize, case_length: u64, seed: u64) -> Self {
        let mut rng = StdRng::seed_from_u64(seed);
        let ids: Vec<SecurityId> = (0..securities).map(|i| SecurityId(format!("SEC{i}"))).collect();
        let betas: Vec<f64> = (0..securities).map(|_| rng.gen_range(0.5..1.5)).collect();
        let mut paths: Vec<Vec<f64>> = (0..securities).map(|_| vec![100.0]).collect();
        for _ in 0..case_length {
            let market = rng.gen_range(-0.4..=0.4);
            for (i, path) in paths.iter_mut().enumerate() {
                let last = *path.last().unwrap_or(&100.0);
                let idio = rng.gen_range(-0.3..=0.3);
                path.push((last + betas[i] * market + idio).max(1.0));
            }
        }
        Self { ids, paths, rng }
    }

    fn registration(&self, case_length: u64) -> Event {
        let securities = self
            .ids
            .iter()
            .map(|id| {
                (
                    id.clone(),
                    SecurityMeta {
                        tradeable: true,
                        starting_price: 100.0,
                    },
                )
            })
            .collect();
        Event::Register(Registration {
            securities,
            case_length,
        })
    }

    fn book(&mut self, i: usize, t: u64) -> Event {
        let mid = self.paths[i][t as usize];
        let half = self.rng.gen_range(0.05..0.6);
        Event::MarketUpdate(MarketUpdate {
            security: self.ids[i].clone(),
            bids: vec![BookLevel {
                price: mid - half,
                qty: self.rng.gen_range(10.0..200.0),
            }],
            asks: vec![BookLevel {
                price: mid + half,
                qty: self.rng.gen_range(10.0..200.0),
            }],
            last_price: mid,
            elapsed_time: t as f64,
        })
    }

    /// A tip about `i` at `target`, with the source's noise level.
    fn tip(&mut self, i: usize, t: u64, target: u64, source: &str, noise: f64) -> Event {
        let truth = self.paths[i][target as usize];
        let price = truth + self.rng.gen_range(-noise..=noise);
        Event::News(NewsEvent {
            headline: format!("{} {}", self.ids[i].0, target),
            body: format!("{price:.2}"),
            source: SourceId(source.into()),
            elapsed_time: Some(t as f64),
        })
    }
}

async fn process(engine: &mut Engine, adapter: &PaperAdapter, event: &Event) {
    match engine.handle(event) {
        Ok(actions) => {
            for action in actions {
                if let Err(err) = dispatch(adapter, action).await {
                    warn!(error = %err, "dispatch failed");
                }
            }
        }
        Err(err) => warn!(kind = ?event.kind(), error = %err, "event rejected"),
    }
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let args = Args::parse();
    init_tracing(args.log_json);

    let cfg = load_config(&args)?;

    let file_journal = if args.history_csv.is_some() || args.snapshot_json.is_some() {
        Some(Arc::new(FileJournal::spawn(
            args.history_csv.clone(),
            args.snapshot_json.clone(),
        )?))
    } else {
        None
    };
    let journal: Arc<dyn JournalSink> = match &file_journal {
        Some(j) => j.clone(),
        None => Arc::new(NoopJournal),
    };

    let mut engine = Engine::with_journal(cfg, journal);
    let adapter = PaperAdapter::new();

    if let Some(path) = &args.events {
        for event in read_events(path)? {
            process(&mut engine, &adapter, &event).await;
        }
    } else {
        let mut session = SyntheticSession::new(args.securities, args.case_length, args.seed);
        process(&mut engine, &adapter, &session.registration(args.case_length)).await;

        for t in 1..args.case_length {
            for i in 0..args.securities {
                let event = session.book(i, t);
                process(&mut engine, &adapter, &event).await;
            }
            if t % 15 == 0 && args.securities > 0 {
                let target = (t + 20).min(args.case_length);
                let i = (t as usize / 15) % args.securities;
                let good = session.tip(i, t, target, "wire", 0.5);
                let bad = session.tip((i + 1) % args.securities, t, target, "rumor", 12.0);
                process(&mut engine, &adapter, &good).await;
                process(&mut engine, &adapter, &bad).await;
            }
            // Paper orders never fill, so positions stay flat.
            let positions: BTreeMap<SecurityId, i64> =
                session.ids.iter().map(|id| (id.clone(), 0)).collect();
            let tick = Event::TraderUpdate(TraderUpdate {
                positions,
                open_orders: adapter.open_orders(),
                elapsed_time: t as f64,
            });
            process(&mut engine, &adapter, &tick).await;
        }
    }

    if let Some(j) = &file_journal {
        j.close();
    }

    let mut summary = engine.stats().summary();
    summary.insert("paper.cancels".into(), adapter.cancel_count().to_string());
    summary.insert("paper.working".into(), adapter.open_orders().len().to_string());
    println!("{}", serde_json::to_string_pretty(&summary)?);
    Ok(())
}
