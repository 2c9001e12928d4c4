//! Trading-session window and the end-of-session controller.
//!
//! The session window is computed once per day from a calendar lookup and
//! stays immutable. Teardown fires once, `grace` past the close, unless an
//! early-termination reason arrives first; either path runs the same
//! finalization steps.

use async_trait::async_trait;
use chrono::{DateTime, Duration, NaiveDate, NaiveTime, TimeZone, Utc};
use chrono_tz::Tz;
use std::sync::Arc;
use tokio::sync::watch;
use tracing::{debug, error, info, warn};
use uuid::Uuid;

use crate::broker::{MarketDataFeed, TradingCalendar};
use crate::error::{Result, TraderError};
use crate::persistence::TradeStore;

/// Open and close instants for one trading day
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SessionWindow {
    pub market_open: DateTime<Utc>,
    pub market_close: DateTime<Utc>,
}

impl SessionWindow {
    /// Whole minutes remaining until the close; negative after the close
    pub fn minutes_to_close(&self, ts: DateTime<Utc>) -> i64 {
        (self.market_close - ts).num_minutes()
    }

    pub fn time_to_open(&self, now: DateTime<Utc>) -> Duration {
        self.market_open - now
    }

    pub fn contains(&self, ts: DateTime<Utc>) -> bool {
        ts >= self.market_open && ts < self.market_close
    }

    /// True once the post-open cool-down has elapsed and strategies may act
    pub fn cooled_down(&self, now: DateTime<Utc>, cool_down_minutes: i64) -> bool {
        now - self.market_open >= Duration::minutes(cool_down_minutes)
    }
}

/// Calendar that derives the window from configured exchange-local
/// open/close times. Stands in for a broker calendar endpoint; half days
/// and holidays need a real lookup behind the same trait.
pub struct WallClockCalendar {
    tz: Tz,
    open: NaiveTime,
    close: NaiveTime,
}

impl WallClockCalendar {
    pub fn new(timezone: &str, open: &str, close: &str) -> Result<Self> {
        let tz: Tz = timezone
            .parse()
            .map_err(|e| TraderError::Calendar(format!("bad timezone {timezone:?}: {e}")))?;
        let open = NaiveTime::parse_from_str(open, "%H:%M")
            .map_err(|e| TraderError::Calendar(format!("bad open time {open:?}: {e}")))?;
        let close = NaiveTime::parse_from_str(close, "%H:%M")
            .map_err(|e| TraderError::Calendar(format!("bad close time {close:?}: {e}")))?;
        if open >= close {
            return Err(TraderError::Calendar(
                "market open must precede market close".to_string(),
            ));
        }
        Ok(Self { tz, open, close })
    }

    fn local_instant(&self, date: NaiveDate, time: NaiveTime) -> Result<DateTime<Utc>> {
        self.tz
            .from_local_datetime(&date.and_time(time))
            .single()
            .map(|dt| dt.with_timezone(&Utc))
            .ok_or_else(|| {
                TraderError::Calendar(format!("ambiguous local time {date} {time} in {}", self.tz))
            })
    }
}

#[async_trait]
impl TradingCalendar for WallClockCalendar {
    async fn session_window(&self, date: NaiveDate) -> Result<SessionWindow> {
        Ok(SessionWindow {
            market_open: self.local_instant(date, self.open)?,
            market_close: self.local_instant(date, self.close)?,
        })
    }
}

/// One strategy's session-scoped run
#[derive(Debug, Clone)]
pub struct StrategyRun {
    pub run_id: Uuid,
    pub strategy: String,
}

/// Governs orderly shutdown at session end.
///
/// Owns the single-shot teardown timer and the engine's halt signal.
pub struct SessionController {
    window: SessionWindow,
    grace: Duration,
    runs: Vec<StrategyRun>,
    store: Arc<dyn TradeStore>,
    feed: Arc<dyn MarketDataFeed>,
    halt_tx: watch::Sender<bool>,
}

impl SessionController {
    pub fn new(
        window: SessionWindow,
        grace_minutes: i64,
        runs: Vec<StrategyRun>,
        store: Arc<dyn TradeStore>,
        feed: Arc<dyn MarketDataFeed>,
    ) -> (Self, watch::Receiver<bool>) {
        let (halt_tx, halt_rx) = watch::channel(false);
        (
            Self {
                window,
                grace: Duration::minutes(grace_minutes),
                runs,
                store,
                feed,
                halt_tx,
            },
            halt_rx,
        )
    }

    /// Wait until `market_close + grace`, then finalize the session. An
    /// early-termination reason on `early_rx` interrupts the sleep and
    /// finalizes with that reason instead. Runs exactly once either way.
    pub async fn run_teardown(self, mut early_rx: watch::Receiver<Option<String>>) {
        let fire_at = self.window.market_close + self.grace;
        let wait = (fire_at - Utc::now()).to_std().unwrap_or_default();
        info!(?wait, "teardown timer waiting for market close");

        tokio::select! {
            _ = tokio::time::sleep(wait) => {
                self.finish("market close").await;
            }
            changed = early_rx.changed() => {
                match changed {
                    Ok(()) => {
                        let reason = early_rx
                            .borrow()
                            .clone()
                            .unwrap_or_else(|| "early termination".to_string());
                        debug!("teardown timer interrupted during sleep");
                        self.finish(&reason).await;
                    }
                    Err(_) => {
                        // Sender dropped without a reason; still finalize so
                        // run end times are recorded.
                        warn!("early-termination channel dropped");
                        self.finish("terminated").await;
                    }
                }
            }
        }
    }

    /// Record the end reason for every strategy run, close subscriptions,
    /// and halt the engine loop.
    async fn finish(&self, reason: &str) {
        info!(%reason, "session teardown starting");

        for run in &self.runs {
            if let Err(e) = self.store.record_run_end(run.run_id, reason).await {
                error!(strategy = %run.strategy, "failed to record run end: {e}");
            }
        }

        if let Err(e) = self.feed.close().await {
            warn!("failed to close data feed: {e}");
        }

        let _ = self.halt_tx.send(true);
        info!("session teardown done");
    }
}
