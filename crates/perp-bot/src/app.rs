//! Application wiring.
//!
//! One gateway per process: a paper account over live public market data,
//! wrapped in the throttling layer and shared by every command and loop.

use std::path::Path;
use std::sync::Arc;
use std::time::Duration;

use perp_core::{Price, Size};
use perp_gateway::{DynGateway, InfoClient, OrderAmount, PaperGateway, ThrottledGateway};
use perp_mm::{MarketMakerConfig, MarketMakerLoop};
use perp_strategy::{LogObserver, StrategyConfig, StrategyLoop};
use perp_telemetry::Metrics;
use tokio::task::JoinSet;
use tokio_util::sync::CancellationToken;
use tracing::{error, info, warn};

use crate::account_store::AccountStore;
use crate::cli::{Command, OrderArgs, RunArgs, TradeCommand};
use crate::config::AppSettings;
use crate::error::{AppError, AppResult};
use crate::report::{
    OrdersReport, PositionRow, PositionsReport, PriceReport, RunOutcome, RunReport, StatusReport,
    TradeReport,
};
use crate::run_state::{RunLedger, RunStateStore};

/// A config file passed to `run`.
#[derive(Debug, Clone)]
pub enum Job {
    Maker(MarketMakerConfig),
    Strategy(StrategyConfig),
}

impl Job {
    /// Load a config, telling market maker and strategy configs apart by
    /// the presence of a `market_making` section.
    pub fn load(path: &Path, dry_run: bool) -> AppResult<Self> {
        let content = std::fs::read_to_string(path)
            .map_err(|e| AppError::Config(format!("Failed to read {}: {e}", path.display())))?;
        let value: serde_json::Value = serde_json::from_str(&content)
            .map_err(|e| AppError::Config(format!("Failed to parse {}: {e}", path.display())))?;

        if value.get("market_making").is_some() {
            let mut config = MarketMakerConfig::from_json(&content)?;
            config.flags.dry_run |= dry_run;
            Ok(Self::Maker(config))
        } else {
            let mut config = StrategyConfig::from_json(&content)?;
            config.flags.dry_run |= dry_run;
            Ok(Self::Strategy(config))
        }
    }

    pub fn name(&self) -> &str {
        match self {
            Self::Maker(c) => &c.name,
            Self::Strategy(c) => &c.name,
        }
    }
}

struct PaperHandle {
    gateway: Arc<PaperGateway<InfoClient>>,
    store: AccountStore,
    runs: RunStateStore,
}

pub struct Application {
    settings: AppSettings,
    gateway: DynGateway,
    paper: Option<PaperHandle>,
    /// Strategy last-run times, shared by every `run` on this instance.
    ledger: Arc<RunLedger>,
}

impl Application {
    /// Paper account over the configured info endpoint.
    pub fn new(settings: AppSettings) -> AppResult<Self> {
        let store = AccountStore::new(&settings.paper.account_path);
        let account = store.load_or_create(settings.paper.starting_equity)?;
        let runs = RunStateStore::new(&settings.paper.run_state_path);
        let ledger = Arc::new(RunLedger::new(runs.load()?));
        let info = InfoClient::new(settings.network.info_url.as_str())?;
        let paper = Arc::new(PaperGateway::new(info, account));
        let gateway: DynGateway = Arc::new(ThrottledGateway::new(paper.clone(), settings.throttle));

        info!(
            info_url = %settings.network.info_url,
            account = %store.path().display(),
            "Paper gateway ready"
        );
        Ok(Self {
            settings,
            gateway,
            paper: Some(PaperHandle {
                gateway: paper,
                store,
                runs,
            }),
            ledger,
        })
    }

    /// Use an existing gateway. Nothing is persisted.
    pub fn with_gateway(settings: AppSettings, gateway: DynGateway) -> Self {
        Self {
            settings,
            gateway,
            paper: None,
            ledger: Arc::new(RunLedger::default()),
        }
    }

    pub fn gateway(&self) -> &DynGateway {
        &self.gateway
    }

    fn persist(&self) -> AppResult<()> {
        let Some(paper) = &self.paper else {
            return Ok(());
        };
        paper.store.save(&paper.gateway.snapshot())?;
        paper.runs.save(&self.ledger.snapshot())
    }

    /// Run one CLI command and render its output.
    pub async fn execute(&self, command: Command, stop: CancellationToken) -> AppResult<String> {
        let output = match command {
            Command::Price { symbol } => self.price(&symbol).await?.to_string(),
            Command::Status { symbol } => self.status(symbol.as_deref()).await?.to_string(),
            Command::Positions => self.positions().await?.to_string(),
            Command::Orders { symbol } => self.orders(symbol.as_deref()).await?.to_string(),
            Command::Trade(trade) => {
                let report = self.trade(trade).await;
                // Fills may have happened before a later step failed.
                self.persist()?;
                report?.to_string()
            }
            Command::Run(args) => {
                let report = self.run(&args, stop).await;
                self.persist()?;
                report?.to_string()
            }
        };
        Ok(output)
    }

    pub async fn price(&self, symbol: &str) -> AppResult<PriceReport> {
        let book = self.gateway.spread(symbol).await?;
        Ok(PriceReport {
            symbol: symbol.to_string(),
            book,
        })
    }

    pub async fn positions(&self) -> AppResult<PositionsReport> {
        let positions = self.gateway.positions().await?;
        let mut rows = Vec::with_capacity(positions.len());
        for position in positions.iter().filter(|p| !p.is_flat()) {
            let mark = match self.gateway.price(&position.symbol).await {
                Ok(mark) => Some(mark),
                Err(e) => {
                    warn!(symbol = %position.symbol, error = %e, "Mark unavailable");
                    None
                }
            };
            rows.push(PositionRow::new(position, mark));
        }
        Ok(PositionsReport { rows })
    }

    pub async fn orders(&self, symbol: Option<&str>) -> AppResult<OrdersReport> {
        Ok(OrdersReport {
            orders: self.gateway.open_orders(symbol).await?,
        })
    }

    pub async fn status(&self, symbol: Option<&str>) -> AppResult<StatusReport> {
        let equity = self.gateway.equity().await?;
        let mut positions = self.positions().await?;
        if let Some(symbol) = symbol {
            positions.rows.retain(|row| row.symbol == symbol);
        }
        let open_orders = self.gateway.open_orders(symbol).await?.len();
        let book = match symbol {
            Some(symbol) => Some(self.price(symbol).await?),
            None => None,
        };
        Ok(StatusReport {
            equity,
            positions,
            open_orders,
            book,
        })
    }

    pub async fn trade(&self, command: TradeCommand) -> AppResult<TradeReport> {
        match command {
            TradeCommand::Buy(args) => self.market(args, true).await,
            TradeCommand::Sell(args) => self.market(args, false).await,
            TradeCommand::Close { symbol, size } => {
                let order = self.gateway.close(&symbol, size.map(Size::new)).await?;
                let action = match &order {
                    Some(_) => format!("close {symbol}"),
                    None => format!("close {symbol}: no position"),
                };
                Ok(TradeReport {
                    action,
                    orders: order.into_iter().collect(),
                    cancelled: 0,
                })
            }
            TradeCommand::CloseAll => {
                let cancelled = self.gateway.cancel_all(None).await?;
                let mut orders = Vec::new();
                for position in self.gateway.positions().await? {
                    if position.is_flat() {
                        continue;
                    }
                    if let Some(order) = self.gateway.close(&position.symbol, None).await? {
                        orders.push(order);
                    }
                }
                Ok(TradeReport {
                    action: "close all".to_string(),
                    orders,
                    cancelled,
                })
            }
        }
    }

    async fn market(&self, args: OrderArgs, buy: bool) -> AppResult<TradeReport> {
        let amount = match (args.usd, args.size) {
            (Some(usd), _) => OrderAmount::Usd(usd),
            (None, Some(size)) => OrderAmount::Size(Size::new(size)),
            (None, None) => return Err(AppError::Config("--usd or --size is required".into())),
        };
        let leverage = args.leverage.unwrap_or(self.settings.paper.default_leverage);
        self.gateway.set_leverage(&args.symbol, leverage).await?;

        let limit = args.price.map(Price::new);
        let order = if buy {
            self.gateway.buy(&args.symbol, amount, limit).await?
        } else {
            self.gateway.sell(&args.symbol, amount, limit).await?
        };
        Metrics::order_sent(&args.symbol, "manual");
        Ok(TradeReport {
            action: format!("{} {}", if buy { "buy" } else { "sell" }, args.symbol),
            orders: vec![order],
            cancelled: 0,
        })
    }

    /// Run each config once, or all of them concurrently until `stop` fires
    /// or the duration elapses.
    pub async fn run(&self, args: &RunArgs, stop: CancellationToken) -> AppResult<RunReport> {
        let jobs = args
            .configs
            .iter()
            .map(|path| -> AppResult<(String, Job)> {
                Ok((path.display().to_string(), Job::load(path, args.dry_run)?))
            })
            .collect::<AppResult<Vec<_>>>()?;

        let outcomes = if args.looping {
            self.run_loops(jobs, args.duration.map(Duration::from_secs), stop)
                .await?
        } else {
            self.run_single(jobs, args.force).await?
        };

        if let Some(path) = &self.settings.telemetry.metrics_path {
            Metrics::write_snapshot(path)?;
        }
        Ok(RunReport { outcomes })
    }

    async fn run_single(&self, jobs: Vec<(String, Job)>, force: bool) -> AppResult<Vec<RunOutcome>> {
        let mut outcomes = Vec::with_capacity(jobs.len());
        for (config, job) in jobs {
            let outcome = match job {
                Job::Maker(c) => {
                    let mut maker = MarketMakerLoop::new(c, self.gateway.clone());
                    maker.preflight().await?;
                    RunOutcome::MakerCycle {
                        config,
                        result: maker.run_once().await,
                    }
                }
                Job::Strategy(c) => {
                    let last_run = self.ledger.last_run(&c.name);
                    let mut strategy = StrategyLoop::new(c, self.gateway.clone())
                        .with_last_run(last_run)
                        .with_observer(Box::new(LogObserver));
                    strategy.preflight().await?;
                    let result = strategy.run(force).await;
                    self.ledger.record(&strategy.config().name, strategy.last_run());
                    RunOutcome::StrategyCycle { config, result }
                }
            };
            outcomes.push(outcome);
        }
        Ok(outcomes)
    }

    async fn run_loops(
        &self,
        jobs: Vec<(String, Job)>,
        duration: Option<Duration>,
        stop: CancellationToken,
    ) -> AppResult<Vec<RunOutcome>> {
        let poll = self.settings.strategy_poll_interval();
        let mut tasks = JoinSet::new();

        for (index, (config, job)) in jobs.into_iter().enumerate() {
            let gateway = self.gateway.clone();
            let ledger = self.ledger.clone();
            let stop = stop.clone();
            info!(config = %config, name = job.name(), "Starting loop");
            tasks.spawn(async move {
                let outcome = match job {
                    Job::Maker(c) => {
                        let mut maker = MarketMakerLoop::new(c, gateway);
                        maker
                            .run_loop(duration, &stop)
                            .await
                            .map(|summary| RunOutcome::MakerLoop { config, summary })
                            .map_err(AppError::from)
                    }
                    Job::Strategy(c) => {
                        let last_run = ledger.last_run(&c.name);
                        let mut strategy = StrategyLoop::new(c, gateway)
                            .with_last_run(last_run)
                            .with_observer(Box::new(LogObserver));
                        let outcome = strategy
                            .run_loop(poll, duration, &stop)
                            .await
                            .map(|summary| RunOutcome::StrategyLoop { config, summary })
                            .map_err(AppError::from);
                        ledger.record(&strategy.config().name, strategy.last_run());
                        outcome
                    }
                };
                (index, outcome)
            });
        }

        let mut outcomes = Vec::new();
        let mut first_error = None;
        while let Some(joined) = tasks.join_next().await {
            let failure = match joined {
                Ok((index, Ok(outcome))) => {
                    outcomes.push((index, outcome));
                    continue;
                }
                Ok((_, Err(e))) => e,
                Err(e) => AppError::Task(e.to_string()),
            };
            error!(error = %failure, "Loop failed, stopping the others");
            stop.cancel();
            first_error.get_or_insert(failure);
        }

        if let Some(e) = first_error {
            return Err(e);
        }
        outcomes.sort_by_key(|(index, _)| *index);
        Ok(outcomes.into_iter().map(|(_, outcome)| outcome).collect())
    }
}
