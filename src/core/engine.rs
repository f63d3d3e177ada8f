// src/core/engine.rs
use crate::config::{ExchangeConfig, StrategyConfig};
use crate::connectors::traits::{ExchangeClient, ExchangeError};
use crate::core::shutdown::ShutdownSignal;
use crate::status::{StatusError, StatusSink};
use crate::strategies::traits::{Strategy, StrategyError};
use crate::types::{StatusRecord, StrategyState};
use std::time::Duration;
use thiserror::Error;
use tracing::{debug, error, info, warn};

#[derive(Debug, Error)]
pub enum EngineError {
    #[error("exchange failed to initialize: {0}")]
    Exchange(#[source] ExchangeError),

    #[error("strategy failed to initialize: {0}")]
    Strategy(#[source] StrategyError),

    #[error("status sink failed to start: {0}")]
    Status(#[source] StatusError),

    #[error("strategy failed to start: {0}")]
    StrategyStart(#[source] StrategyError),
}

/// What happened during one polling cycle.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct CycleReport {
    pub depth_delivered: bool,
    pub account_delivered: bool,
    pub order_events: usize,
    pub status: Option<String>,
}

/// Owns one exchange, one strategy and one status sink and drives them:
/// depth -> `on_tick`, account -> `on_account`, fills -> `on_order`, stats ->
/// sink, then sleep. Single task, so nothing here needs locking.
pub struct TradingEngine {
    symbol: String,
    poll_interval: Duration,
    exchange: Box<dyn ExchangeClient>,
    strategy: Box<dyn Strategy>,
    sink: Box<dyn StatusSink>,
    last_state: StrategyState,
}

impl TradingEngine {
    pub fn new(
        symbol: impl Into<String>,
        poll_interval: Duration,
        exchange: Box<dyn ExchangeClient>,
        strategy: Box<dyn Strategy>,
        sink: Box<dyn StatusSink>,
    ) -> Self {
        Self {
            symbol: symbol.into(),
            poll_interval,
            exchange,
            strategy,
            sink,
            last_state: StrategyState::Init,
        }
    }

    /// Initializes exchange, strategy and sink, then starts the strategy.
    /// On any failure every component is cleaned up, sink first.
    pub async fn bootstrap(
        &mut self,
        exchange_config: &ExchangeConfig,
        strategy_config: &StrategyConfig,
    ) -> Result<(), EngineError> {
        let result = self.try_bootstrap(exchange_config, strategy_config).await;
        if let Err(e) = &result {
            error!(error = %e, "Engine bootstrap failed, cleaning up");
            self.teardown().await;
        }
        result
    }

    async fn try_bootstrap(
        &mut self,
        exchange_config: &ExchangeConfig,
        strategy_config: &StrategyConfig,
    ) -> Result<(), EngineError> {
        self.exchange
            .init(exchange_config)
            .await
            .map_err(EngineError::Exchange)?;
        info!(exchange = self.exchange.name(), "Exchange initialized");

        self.strategy
            .init(strategy_config)
            .await
            .map_err(EngineError::Strategy)?;

        self.sink.start().await.map_err(EngineError::Status)?;

        self.strategy.start().map_err(EngineError::StrategyStart)?;
        self.last_state = self.strategy.state();

        info!(
            strategy = self.strategy.name(),
            symbol = %self.symbol,
            poll_interval_ms = self.poll_interval.as_millis() as u64,
            "Engine started"
        );
        Ok(())
    }

    pub fn strategy(&self) -> &dyn Strategy {
        self.strategy.as_ref()
    }

    /// Runs cycles until `shutdown` fires. The flag is checked before each
    /// cycle, so an in-flight cycle always completes. Returns the number of
    /// cycles run.
    pub async fn run(&mut self, mut shutdown: ShutdownSignal) -> u64 {
        let mut cycles = 0u64;
        info!("Engine loop running");

        while !shutdown.is_triggered() {
            self.run_cycle().await;
            cycles += 1;

            tokio::select! {
                _ = tokio::time::sleep(self.poll_interval) => {}
                _ = shutdown.triggered() => {}
            }
        }

        info!(cycles, "Engine loop stopped");
        cycles
    }

    /// One poll/dispatch/broadcast pass. Per-step failures are logged and
    /// skipped; later steps still run.
    pub async fn run_cycle(&mut self) -> CycleReport {
        let mut report = CycleReport::default();

        match self.exchange.get_depth(&self.symbol).await {
            Ok(depth) => {
                debug!(
                    asks = depth.ask_count(),
                    bids = depth.bid_count(),
                    at = %depth.timestamp(),
                    "Depth received"
                );
                self.strategy
                    .on_tick(std::slice::from_ref(&depth), self.exchange.as_mut())
                    .await;
                report.depth_delivered = true;
            }
            Err(e) => log_poll_failure("depth", &e),
        }

        match self.exchange.get_account().await {
            Ok(account) => {
                self.strategy.on_account(&account);
                report.account_delivered = true;
            }
            Err(e) => log_poll_failure("account", &e),
        }

        match self.exchange.poll_order_events().await {
            Ok(events) => {
                for event in &events {
                    self.strategy.on_order(event);
                }
                report.order_events = events.len();
            }
            Err(e) => log_poll_failure("order events", &e),
        }

        self.observe_state();

        let record = StatusRecord::new(&self.strategy.stats(), self.strategy.state());
        match serde_json::to_string(&record) {
            Ok(text) => {
                self.sink.broadcast(&text);
                report.status = Some(text);
            }
            Err(e) => error!(error = %e, "Failed to serialize status"),
        }

        report
    }

    fn observe_state(&mut self) {
        let state = self.strategy.state();
        if state == self.last_state {
            return;
        }
        if state == StrategyState::Error {
            error!(
                strategy = self.strategy.name(),
                "Strategy is in error state; no further trading decisions"
            );
        } else {
            info!(from = %self.last_state, to = %state, "Strategy state observed");
        }
        self.last_state = state;
    }

    /// Stops the strategy and releases everything, sink first.
    pub async fn shutdown(mut self) {
        self.strategy.stop();
        let stats = self.strategy.stats();
        info!(
            total_profit = %stats.total_profit,
            trades = stats.total_trades,
            win_rate = %stats.win_rate,
            "Engine shutting down"
        );
        self.teardown().await;
    }

    async fn teardown(&mut self) {
        self.sink.cleanup().await;
        self.strategy.cleanup().await;
        self.exchange.cleanup().await;
        debug!("Engine components released");
    }
}

fn log_poll_failure(what: &str, e: &ExchangeError) {
    if e.is_retryable() {
        debug!(poll = what, error = %e, "Poll failed, retrying next cycle");
    } else {
        warn!(poll = what, error = %e, "Poll failed, skipping this cycle");
    }
}
