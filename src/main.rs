use chrono::Utc;
use clap::Parser;
use std::sync::Arc;
use tokio::signal;
use tokio::sync::{mpsc, watch};
use tracing::{error, info};
use tracing_subscriber::EnvFilter;

use daytrader::broker::{HistoricalData, PaperBroker, TradingCalendar};
use daytrader::config::AppConfig;
use daytrader::error::{Result, TraderError};
use daytrader::persistence::{PostgresTradeStore, TradeStore};
use daytrader::reconcile::Reconciler;
use daytrader::session::{SessionController, StrategyRun, WallClockCalendar};
use daytrader::state::SessionState;
use daytrader::strategy::{
    DispatchConfig, MomentumShort, MomentumShortConfig, Strategy, StrategyDispatch,
};
use daytrader::TradingEngine;

#[derive(Parser, Debug)]
#[command(name = "daytrader", about = "Intraday trading bot runtime")]
struct Cli {
    /// Configuration directory
    #[arg(long, default_value = "config")]
    config_dir: String,

    /// Run against the in-memory paper broker instead of a live transport.
    /// The paper feed generates no bar events on its own, so this mode
    /// exercises startup, teardown and operator interrupt only; a live feed
    /// implementation supplies the tick and minute-bar stream.
    #[arg(long, default_value_t = true)]
    paper: bool,
}

/// No-backfill stand-in for a market-data provider; the paper feed has no
/// history to serve.
struct EmptyHistory;

#[async_trait::async_trait]
impl HistoricalData for EmptyHistory {
    async fn get_historical_data(
        &self,
        _symbols: &[String],
    ) -> Result<std::collections::HashMap<String, Vec<(chrono::DateTime<Utc>, daytrader::domain::Bar)>>>
    {
        Ok(std::collections::HashMap::new())
    }
}

fn init_logging(level: &str) {
    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new(format!("{level},daytrader=debug,sqlx=warn")));

    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(true)
        .with_thread_ids(false)
        .with_file(false)
        .with_line_number(false)
        .init();
}

async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(e) = signal::ctrl_c().await {
            error!("Failed to install Ctrl+C handler: {}", e);
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match signal::unix::signal(signal::unix::SignalKind::terminate()) {
            Ok(mut stream) => {
                stream.recv().await;
            }
            Err(e) => error!("Failed to install SIGTERM handler: {}", e),
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {},
        _ = terminate => {},
    }
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    let config = AppConfig::load_from(&cli.config_dir)?;
    init_logging(&config.logging.level);
    if let Err(errors) = config.validate() {
        for e in &errors {
            error!("config: {e}");
        }
        return Err(TraderError::Validation(errors.join("; ")));
    }

    if !cli.paper {
        return Err(TraderError::Validation(
            "no live broker transport is wired in this build; run with --paper".to_string(),
        ));
    }

    let calendar = WallClockCalendar::new(
        &config.session.timezone,
        &config.session.market_open,
        &config.session.market_close,
    )?;
    let window = calendar.session_window(Utc::now().date_naive()).await?;
    info!(open = %window.market_open, close = %window.market_close, "session window");

    let now = Utc::now();
    if now >= window.market_close {
        info!("missed market close, try again next trading day");
        return Err(TraderError::MarketClosed(now.date_naive().to_string()));
    }
    if !window.contains(now) {
        let wait = window.time_to_open(now).to_std().unwrap_or_default();
        info!(?wait, "market not open yet, events will start at the open");
    }

    let store: Arc<dyn TradeStore> = Arc::new(PostgresTradeStore::connect(&config.database).await?);

    let (events_tx, events_rx) = mpsc::channel(1024);
    let broker = Arc::new(PaperBroker::with_events(events_tx.clone()));

    let momentum = Arc::new(MomentumShort::new(MomentumShortConfig::default()));
    let strategies: Vec<Arc<dyn Strategy>> = vec![momentum.clone()];
    let mut runs = Vec::new();
    for strategy in &strategies {
        store.register_run(strategy.run_id(), strategy.name()).await?;
        runs.push(StrategyRun {
            run_id: strategy.run_id(),
            strategy: strategy.name().to_string(),
        });
    }

    let dispatch = StrategyDispatch::new(
        strategies,
        broker.clone(),
        broker.clone(),
        DispatchConfig {
            liquidation_cutoff_minutes: config.session.liquidation_cutoff_minutes,
            stale_order_minutes: config.session.stale_order_minutes,
            cool_down_minutes: config.session.cool_down_minutes,
        },
    );
    let reconciler = Reconciler::new(store.clone());
    let state = SessionState::new(config.symbols.iter().cloned());

    let mut engine = TradingEngine::new(
        state,
        dispatch,
        reconciler,
        broker.clone(),
        broker.clone(),
        window,
    );
    engine.seed(&EmptyHistory).await?;

    let (controller, halt_rx) = SessionController::new(
        window,
        config.session.teardown_grace_minutes,
        runs,
        store,
        broker.clone(),
    );
    let (early_tx, early_rx) = watch::channel(None);
    let teardown = tokio::spawn(controller.run_teardown(early_rx));

    tokio::spawn(async move {
        shutdown_signal().await;
        info!("interrupt received");
        let _ = early_tx.send(Some("operator interrupt".to_string()));
    });

    engine.run(events_rx, halt_rx).await;
    drop(events_tx);

    if let Err(e) = teardown.await {
        error!("teardown task failed: {e}");
    }
    info!("done");
    Ok(())
}
