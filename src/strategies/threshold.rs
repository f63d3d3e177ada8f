// src/strategies/threshold.rs
use crate::config::StrategyConfig;
use crate::connectors::traits::{ExchangeClient, ExchangeError};
use crate::strategies::lifecycle::Lifecycle;
use crate::strategies::stats::StatsTracker;
use crate::strategies::traits::{Strategy, StrategyError};
use crate::types::{
    AccountSnapshot, DepthSnapshot, OrderEvent, Side, StrategyState, StrategyStats,
};
use crate::utils::precision::{normalize_price, normalize_quantity};
use async_trait::async_trait;
use chrono::{DateTime, NaiveDate, Utc};
use rust_decimal::Decimal;
use tracing::{debug, info, warn};

/// An order the strategy wants placed.
#[derive(Debug, Clone, PartialEq)]
pub struct Decision {
    pub symbol: String,
    pub side: Side,
    pub price: Decimal,
    pub amount: Decimal,
}

/// Buys when the best ask drops below `buy_below`, sells the held position
/// when the best bid rises above `sell_above`. One order in flight at a time.
pub struct ThresholdStrategy {
    config: StrategyConfig,
    lifecycle: Lifecycle,
    tracker: StatsTracker,
    account: Option<AccountSnapshot>,
    pending_order: Option<String>,
    orders_today: u32,
    orders_day: Option<NaiveDate>,
}

impl ThresholdStrategy {
    pub fn new() -> Self {
        let config = StrategyConfig::default();
        Self {
            tracker: StatsTracker::new(config.taker_fee, config.min_profit),
            config,
            lifecycle: Lifecycle::new(),
            account: None,
            pending_order: None,
            orders_today: 0,
            orders_day: None,
        }
    }

    fn held(&self) -> Decimal {
        match &self.account {
            Some(account) => account.available_stocks(),
            None => self.tracker.position(),
        }
    }

    fn daily_cap_reached(&self, today: NaiveDate) -> bool {
        let cap = self.config.max_trades_per_day;
        cap > 0 && self.orders_day == Some(today) && self.orders_today >= cap
    }

    fn count_order(&mut self, today: NaiveDate) {
        if self.orders_day != Some(today) {
            self.orders_day = Some(today);
            self.orders_today = 0;
        }
        self.orders_today += 1;
    }

    /// Pure decision rule over the first depth snapshot.
    pub fn decide(&self, depths: &[DepthSnapshot], now: DateTime<Utc>) -> Option<Decision> {
        if self.pending_order.is_some() {
            return None;
        }
        if !self.config.is_active_at(now.time()) || self.daily_cap_reached(now.date_naive()) {
            return None;
        }
        let depth = depths.first()?;
        self.sell_decision(depth).or_else(|| self.buy_decision(depth))
    }

    fn sell_decision(&self, depth: &DepthSnapshot) -> Option<Decision> {
        let bid = depth.best_bid()?;
        let held = self.held();
        if self.config.sell_above <= Decimal::ZERO || held <= Decimal::ZERO {
            return None;
        }
        if bid.price <= self.config.sell_above {
            return None;
        }

        let mut amount = held.min(bid.amount);
        if self.config.order_amount > Decimal::ZERO {
            amount = amount.min(self.config.order_amount);
        }
        self.finish(depth, Side::Sell, bid.price, amount)
    }

    fn buy_decision(&self, depth: &DepthSnapshot) -> Option<Decision> {
        let ask = depth.best_ask()?;
        if self.config.buy_below <= Decimal::ZERO || ask.price >= self.config.buy_below {
            return None;
        }

        let mut amount = ask.amount;
        if self.config.order_amount > Decimal::ZERO {
            amount = amount.min(self.config.order_amount);
        }
        let headroom = self.config.max_position - self.held();
        amount = amount.min(headroom);
        if self.config.risk_limit > Decimal::ZERO {
            amount = amount.min(self.config.risk_limit / ask.price);
        }
        if let Some(account) = &self.account {
            let unit_cost = ask.price * (Decimal::ONE + self.config.taker_fee);
            amount = amount.min(account.available_balance() / unit_cost);
        }
        self.finish(depth, Side::Buy, ask.price, amount)
    }

    fn finish(
        &self,
        depth: &DepthSnapshot,
        side: Side,
        price: Decimal,
        amount: Decimal,
    ) -> Option<Decision> {
        let amount = normalize_quantity(amount, self.config.step_size);
        let price = normalize_price(price, self.config.tick_size);
        if amount <= Decimal::ZERO || price <= Decimal::ZERO {
            return None;
        }
        Some(Decision {
            symbol: depth.symbol().to_string(),
            side,
            price,
            amount,
        })
    }
}

impl Default for ThresholdStrategy {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl Strategy for ThresholdStrategy {
    fn name(&self) -> &str {
        &self.config.name
    }

    async fn init(&mut self, config: &StrategyConfig) -> Result<(), StrategyError> {
        if config.risk_limit < Decimal::ZERO {
            return Err(StrategyError::ConfigInvalid(format!(
                "risk_limit must be >= 0, got {}",
                config.risk_limit
            )));
        }
        if config.max_position < Decimal::ZERO {
            return Err(StrategyError::ConfigInvalid(format!(
                "max_position must be >= 0, got {}",
                config.max_position
            )));
        }

        self.config = config.clone();
        self.tracker = StatsTracker::new(config.taker_fee, config.min_profit);
        self.account = None;
        self.pending_order = None;
        self.orders_today = 0;
        self.orders_day = None;
        self.lifecycle.reset();

        info!(
            name = %config.name,
            version = %config.version,
            buy_below = %config.buy_below,
            sell_above = %config.sell_above,
            max_position = %config.max_position,
            "Strategy initialized"
        );
        Ok(())
    }

    async fn on_tick(&mut self, depths: &[DepthSnapshot], exchange: &mut dyn ExchangeClient) {
        if !self.lifecycle.accepts_ticks() {
            return;
        }
        let now = Utc::now();
        self.tracker.roll_day(now);

        let Some(decision) = self.decide(depths, now) else {
            return;
        };

        info!(
            side = %decision.side,
            price = %decision.price,
            amount = %decision.amount,
            "Signal detected"
        );
        match exchange
            .place_order(&decision.symbol, decision.side, decision.price, decision.amount)
            .await
        {
            Ok(ack) => {
                info!(order_id = %ack.id, status = %ack.status, "Order accepted");
                self.pending_order = Some(ack.id);
                self.count_order(now.date_naive());
            }
            Err(ExchangeError::Unauthorized(msg)) => {
                self.lifecycle.fault(&StrategyError::Internal(format!(
                    "order rejected as unauthorized: {}",
                    msg
                )));
            }
            Err(e) => {
                warn!(error = %e, "Order placement failed");
            }
        }
    }

    fn on_account(&mut self, account: &AccountSnapshot) {
        if !self.lifecycle.accepts_events() {
            return;
        }
        if account.stocks > self.config.max_position {
            warn!(
                stocks = %account.stocks,
                max_position = %self.config.max_position,
                "Position above configured maximum"
            );
        }
        self.account = Some(*account);
    }

    fn on_order(&mut self, event: &OrderEvent) {
        if !self.lifecycle.accepts_events() {
            return;
        }
        if !event.is_finished {
            debug!(order_id = %event.order_id, filled = %event.amount, "Partial fill");
            return;
        }

        let pnl = self.tracker.record_terminal(event, Utc::now());
        if self.pending_order.as_deref() == Some(event.order_id.as_str()) {
            self.pending_order = None;
        }
        info!(
            order_id = %event.order_id,
            side = %event.side,
            price = %event.price,
            amount = %event.amount,
            pnl = %pnl,
            "Order finished"
        );
    }

    fn state(&self) -> StrategyState {
        self.lifecycle.state()
    }

    fn stats(&self) -> StrategyStats {
        self.tracker.snapshot()
    }

    fn start(&mut self) -> Result<(), StrategyError> {
        self.lifecycle.start()
    }

    fn pause(&mut self) -> Result<(), StrategyError> {
        self.lifecycle.pause()
    }

    fn stop(&mut self) {
        self.lifecycle.stop();
    }

    async fn cleanup(&mut self) {
        if let Some(order_id) = self.pending_order.take() {
            warn!(%order_id, "Strategy cleaned up with an order still in flight");
        }
        let stats = self.tracker.snapshot();
        info!(
            trades = stats.total_trades,
            total_profit = %stats.total_profit,
            "Strategy cleaned up"
        );
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::ExchangeConfig;
    use crate::types::{DepthLevel, OrderAck};
    use chrono::{NaiveTime, TimeZone};
    use rust_decimal_macros::dec;

    #[derive(Default)]
    struct RecordingExchange {
        orders: Vec<(String, Side, Decimal, Decimal)>,
        reject_with: Option<fn() -> ExchangeError>,
    }

    #[async_trait]
    impl ExchangeClient for RecordingExchange {
        fn name(&self) -> &str {
            "recording"
        }

        async fn init(&mut self, _config: &ExchangeConfig) -> Result<(), ExchangeError> {
            Ok(())
        }

        async fn get_account(&mut self) -> Result<AccountSnapshot, ExchangeError> {
            Ok(AccountSnapshot::default())
        }

        async fn get_depth(&mut self, symbol: &str) -> Result<DepthSnapshot, ExchangeError> {
            Ok(DepthSnapshot::from_levels(symbol, vec![], vec![]))
        }

        async fn place_order(
            &mut self,
            symbol: &str,
            side: Side,
            price: Decimal,
            amount: Decimal,
        ) -> Result<OrderAck, ExchangeError> {
            if let Some(reject) = self.reject_with {
                return Err(reject());
            }
            self.orders.push((symbol.to_string(), side, price, amount));
            Ok(OrderAck {
                id: format!("order-{}", self.orders.len()),
                symbol: symbol.to_string(),
                status: "NEW".to_string(),
            })
        }

        async fn cleanup(&mut self) {}
    }

    fn config() -> StrategyConfig {
        StrategyConfig {
            buy_below: dec!(21000),
            sell_above: dec!(22000),
            order_amount: dec!(1),
            risk_limit: dec!(0),
            max_position: dec!(100),
            taker_fee: dec!(0),
            ..StrategyConfig::default()
        }
    }

    fn depth(ask: Decimal, ask_amount: Decimal, bid: Decimal) -> DepthSnapshot {
        DepthSnapshot::from_levels(
            "BTCUSDT",
            vec![DepthLevel::new(ask, ask_amount)],
            vec![DepthLevel::new(bid, dec!(1))],
        )
    }

    fn funded() -> AccountSnapshot {
        AccountSnapshot::new(dec!(10000), dec!(0), dec!(0), dec!(0)).unwrap()
    }

    async fn running(config: StrategyConfig) -> ThresholdStrategy {
        let mut strategy = ThresholdStrategy::new();
        strategy.init(&config).await.unwrap();
        strategy.start().unwrap();
        strategy
    }

    #[tokio::test]
    async fn init_validates_limits() {
        let mut strategy = ThresholdStrategy::new();
        let mut bad = config();
        bad.risk_limit = dec!(-1);
        assert!(matches!(
            strategy.init(&bad).await,
            Err(StrategyError::ConfigInvalid(_))
        ));

        let mut bad = config();
        bad.max_position = dec!(-0.1);
        assert!(strategy.init(&bad).await.is_err());

        strategy.init(&config()).await.unwrap();
        assert_eq!(strategy.state(), StrategyState::Init);
    }

    #[tokio::test]
    async fn buys_once_below_threshold() {
        let mut strategy = running(config()).await;
        strategy.on_account(&funded());
        let mut exchange = RecordingExchange::default();
        let book = [depth(dec!(20000), dec!(0.5), dec!(19990))];

        strategy.on_tick(&book, &mut exchange).await;
        strategy.on_tick(&book, &mut exchange).await;

        assert_eq!(exchange.orders.len(), 1);
        let (symbol, side, price, amount) = &exchange.orders[0];
        assert_eq!(symbol, "BTCUSDT");
        assert_eq!(*side, Side::Buy);
        assert_eq!(*price, dec!(20000));
        assert!(*amount <= dec!(0.5) && *amount > dec!(0));
    }

    #[tokio::test]
    async fn buy_amount_respects_limits() {
        let mut cfg = config();
        cfg.risk_limit = dec!(1000);
        cfg.step_size = dec!(0.001);
        let strategy = running(cfg).await;
        let now = Utc::now();

        let decision = strategy
            .decide(&[depth(dec!(20000), dec!(0.5), dec!(19990))], now)
            .unwrap();
        assert_eq!(decision.amount, dec!(0.05));

        let mut cfg = config();
        cfg.max_position = dec!(0.2);
        let strategy = running(cfg).await;
        let decision = strategy
            .decide(&[depth(dec!(20000), dec!(0.5), dec!(19990))], now)
            .unwrap();
        assert_eq!(decision.amount, dec!(0.2));
    }

    #[tokio::test]
    async fn sells_held_position_above_threshold() {
        let mut strategy = running(config()).await;
        strategy.on_account(&AccountSnapshot::new(dec!(0), dec!(0.3), dec!(0), dec!(0)).unwrap());

        let decision = strategy
            .decide(&[depth(dec!(22600), dec!(1), dec!(22500))], Utc::now())
            .unwrap();
        assert_eq!(decision.side, Side::Sell);
        assert_eq!(decision.price, dec!(22500));
        assert_eq!(decision.amount, dec!(0.3));
    }

    #[tokio::test]
    async fn no_orders_or_stats_when_not_running() {
        let mut strategy = running(config()).await;
        strategy.on_account(&funded());
        strategy.pause().unwrap();
        let mut exchange = RecordingExchange::default();
        let book = [depth(dec!(20000), dec!(0.5), dec!(19990))];

        strategy.on_tick(&book, &mut exchange).await;
        assert_eq!(strategy.stats(), StrategyStats::default());

        strategy.stop();
        strategy.on_tick(&book, &mut exchange).await;
        assert!(exchange.orders.is_empty());
        assert_eq!(strategy.stats(), StrategyStats::default());
    }

    #[tokio::test]
    async fn terminal_event_clears_pending_order() {
        let mut strategy = running(config()).await;
        strategy.on_account(&funded());
        let mut exchange = RecordingExchange::default();
        let book = [depth(dec!(20000), dec!(0.5), dec!(19990))];

        strategy.on_tick(&book, &mut exchange).await;
        strategy.on_order(&OrderEvent {
            order_id: "order-1".to_string(),
            symbol: "BTCUSDT".to_string(),
            side: Side::Buy,
            price: dec!(20000),
            amount: dec!(0.2),
            is_finished: false,
        });
        strategy.on_tick(&book, &mut exchange).await;
        assert_eq!(exchange.orders.len(), 1);

        strategy.on_order(&OrderEvent {
            order_id: "order-1".to_string(),
            symbol: "BTCUSDT".to_string(),
            side: Side::Buy,
            price: dec!(20000),
            amount: dec!(0.5),
            is_finished: true,
        });
        assert_eq!(strategy.stats().total_trades, 1);

        strategy.on_tick(&book, &mut exchange).await;
        assert_eq!(exchange.orders.len(), 2);
    }

    #[tokio::test]
    async fn unauthorized_order_faults_strategy() {
        let mut strategy = running(config()).await;
        strategy.on_account(&funded());
        let mut exchange = RecordingExchange {
            reject_with: Some(|| ExchangeError::Unauthorized("revoked".into())),
            ..Default::default()
        };
        let book = [depth(dec!(20000), dec!(0.5), dec!(19990))];

        strategy.on_tick(&book, &mut exchange).await;
        assert_eq!(strategy.state(), StrategyState::Error);

        exchange.reject_with = None;
        strategy.on_tick(&book, &mut exchange).await;
        strategy.on_order(&OrderEvent {
            order_id: "x".to_string(),
            symbol: "BTCUSDT".to_string(),
            side: Side::Buy,
            price: dec!(1),
            amount: dec!(1),
            is_finished: true,
        });
        assert!(exchange.orders.is_empty());
        assert_eq!(strategy.stats().total_trades, 0);
        assert_eq!(strategy.start(), Err(StrategyError::InvalidTransition {
            from: StrategyState::Error,
            action: "start",
        }));
    }

    #[tokio::test]
    async fn respects_window_and_daily_cap() {
        let mut cfg = config();
        cfg.start_time = NaiveTime::from_hms_opt(9, 0, 0);
        cfg.end_time = NaiveTime::from_hms_opt(17, 0, 0);
        cfg.max_trades_per_day = 1;
        let mut strategy = running(cfg).await;
        let book = [depth(dec!(20000), dec!(0.5), dec!(19990))];

        let night = Utc.with_ymd_and_hms(2024, 3, 1, 20, 0, 0).unwrap();
        assert!(strategy.decide(&book, night).is_none());

        let noon = Utc.with_ymd_and_hms(2024, 3, 1, 12, 0, 0).unwrap();
        assert!(strategy.decide(&book, noon).is_some());

        strategy.count_order(noon.date_naive());
        assert!(strategy.decide(&book, noon).is_none());

        let next_noon = Utc.with_ymd_and_hms(2024, 3, 2, 12, 0, 0).unwrap();
        assert!(strategy.decide(&book, next_noon).is_some());
    }
}
