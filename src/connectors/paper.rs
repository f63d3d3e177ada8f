// src/connectors/paper.rs
//! Paper execution: real market data, simulated account.
//!
//! Depth is pulled from the wrapped adapter. Orders never leave the process;
//! they rest against a simulated account and fill in full once the latest
//! depth crosses their limit price, paying the taker fee.

use crate::config::ExchangeConfig;
use crate::connectors::traits::{validate_order, ExchangeClient, ExchangeError};
use crate::types::{AccountSnapshot, DepthSnapshot, OrderAck, OrderEvent, Side};
use async_trait::async_trait;
use rust_decimal::Decimal;
use tracing::{debug, info};
use uuid::Uuid;

#[derive(Debug, Clone)]
struct PaperOrder {
    id: String,
    symbol: String,
    side: Side,
    price: Decimal,
    amount: Decimal,
    /// Quote (buy) or base (sell) amount frozen for this order.
    reserved: Decimal,
}

/// Balances of the simulated account. Totals include frozen amounts.
#[derive(Debug, Clone, Default)]
pub struct SimulatedAccount {
    balance: Decimal,
    stocks: Decimal,
    frozen_balance: Decimal,
    frozen_stocks: Decimal,
}

impl SimulatedAccount {
    pub fn new(initial_balance: Decimal) -> Self {
        Self {
            balance: initial_balance,
            ..Default::default()
        }
    }

    pub fn snapshot(&self) -> AccountSnapshot {
        AccountSnapshot {
            balance: self.balance,
            stocks: self.stocks,
            frozen_balance: self.frozen_balance,
            frozen_stocks: self.frozen_stocks,
        }
    }

    fn reserve(&mut self, side: Side, amount: Decimal) -> Result<(), ExchangeError> {
        match side {
            Side::Buy => {
                let available = self.balance - self.frozen_balance;
                if amount > available {
                    return Err(ExchangeError::Rejected(format!(
                        "insufficient balance: need {}, available {}",
                        amount, available
                    )));
                }
                self.frozen_balance += amount;
            }
            Side::Sell => {
                let available = self.stocks - self.frozen_stocks;
                if amount > available {
                    return Err(ExchangeError::Rejected(format!(
                        "insufficient stocks: need {}, available {}",
                        amount, available
                    )));
                }
                self.frozen_stocks += amount;
            }
        }
        Ok(())
    }

    fn settle(&mut self, order: &PaperOrder, fill_price: Decimal, fee_rate: Decimal) {
        let notional = fill_price * order.amount;
        match order.side {
            Side::Buy => {
                self.frozen_balance -= order.reserved;
                self.balance -= notional * (Decimal::ONE + fee_rate);
                self.stocks += order.amount;
            }
            Side::Sell => {
                self.frozen_stocks -= order.reserved;
                self.stocks -= order.amount;
                self.balance += notional * (Decimal::ONE - fee_rate);
            }
        }
    }
}

pub struct PaperExchange {
    market_data: Box<dyn ExchangeClient>,
    account: SimulatedAccount,
    taker_fee: Decimal,
    open_orders: Vec<PaperOrder>,
    pending_events: Vec<OrderEvent>,
    last_depth: Option<DepthSnapshot>,
    initialized: bool,
}

impl PaperExchange {
    pub fn new(market_data: Box<dyn ExchangeClient>, initial_balance: Decimal) -> Self {
        Self {
            market_data,
            account: SimulatedAccount::new(initial_balance),
            taker_fee: Decimal::ZERO,
            open_orders: Vec::new(),
            pending_events: Vec::new(),
            last_depth: None,
            initialized: false,
        }
    }

    pub fn account(&self) -> &SimulatedAccount {
        &self.account
    }

    fn crossing_price(depth: &DepthSnapshot, order: &PaperOrder) -> Option<Decimal> {
        if depth.symbol() != order.symbol {
            return None;
        }
        match order.side {
            Side::Buy => depth
                .best_ask()
                .filter(|ask| ask.price <= order.price)
                .map(|ask| ask.price),
            Side::Sell => depth
                .best_bid()
                .filter(|bid| bid.price >= order.price)
                .map(|bid| bid.price),
        }
    }

    fn match_open_orders(&mut self) {
        let Some(depth) = self.last_depth.as_ref() else {
            return;
        };

        let mut still_open = Vec::with_capacity(self.open_orders.len());
        for order in std::mem::take(&mut self.open_orders) {
            match Self::crossing_price(depth, &order) {
                Some(fill_price) => {
                    self.account.settle(&order, fill_price, self.taker_fee);
                    info!(
                        order_id = %order.id,
                        side = %order.side,
                        amount = %order.amount,
                        price = %fill_price,
                        "Paper fill"
                    );
                    self.pending_events.push(OrderEvent {
                        order_id: order.id.clone(),
                        symbol: order.symbol.clone(),
                        side: order.side,
                        price: fill_price,
                        amount: order.amount,
                        is_finished: true,
                    });
                }
                None => still_open.push(order),
            }
        }
        self.open_orders = still_open;
    }
}

#[async_trait]
impl ExchangeClient for PaperExchange {
    fn name(&self) -> &str {
        "paper"
    }

    async fn init(&mut self, config: &ExchangeConfig) -> Result<(), ExchangeError> {
        if self.initialized {
            return Ok(());
        }
        self.market_data.init(config).await?;
        self.taker_fee = config.taker_fee;
        self.initialized = true;
        info!(
            market_data = self.market_data.name(),
            balance = %self.account.balance,
            "Paper exchange ready"
        );
        Ok(())
    }

    async fn get_account(&mut self) -> Result<AccountSnapshot, ExchangeError> {
        Ok(self.account.snapshot())
    }

    async fn get_depth(&mut self, symbol: &str) -> Result<DepthSnapshot, ExchangeError> {
        let depth = self.market_data.get_depth(symbol).await?;
        self.last_depth = Some(depth.clone());
        self.match_open_orders();
        Ok(depth)
    }

    async fn place_order(
        &mut self,
        symbol: &str,
        side: Side,
        price: Decimal,
        amount: Decimal,
    ) -> Result<OrderAck, ExchangeError> {
        validate_order(symbol, price, amount)?;

        let reserved = match side {
            Side::Buy => price * amount * (Decimal::ONE + self.taker_fee),
            Side::Sell => amount,
        };
        self.account.reserve(side, reserved)?;

        let order = PaperOrder {
            id: Uuid::new_v4().simple().to_string(),
            symbol: symbol.to_string(),
            side,
            price,
            amount,
            reserved,
        };
        debug!(order_id = %order.id, %side, %price, %amount, "Paper order accepted");

        let ack = OrderAck {
            id: order.id.clone(),
            symbol: order.symbol.clone(),
            status: "NEW".to_string(),
        };
        self.open_orders.push(order);
        self.match_open_orders();
        Ok(ack)
    }

    async fn poll_order_events(&mut self) -> Result<Vec<OrderEvent>, ExchangeError> {
        Ok(std::mem::take(&mut self.pending_events))
    }

    async fn cleanup(&mut self) {
        if !self.initialized {
            return;
        }
        self.market_data.cleanup().await;
        self.open_orders.clear();
        self.initialized = false;
        info!(
            balance = %self.account.balance,
            stocks = %self.account.stocks,
            "Paper exchange closed"
        );
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::DepthLevel;
    use rust_decimal_macros::dec;
    use std::collections::VecDeque;

    struct ScriptedFeed {
        depths: VecDeque<DepthSnapshot>,
    }

    #[async_trait]
    impl ExchangeClient for ScriptedFeed {
        fn name(&self) -> &str {
            "scripted"
        }

        async fn init(&mut self, _config: &ExchangeConfig) -> Result<(), ExchangeError> {
            Ok(())
        }

        async fn get_account(&mut self) -> Result<AccountSnapshot, ExchangeError> {
            Err(ExchangeError::Unauthorized("feed only".into()))
        }

        async fn get_depth(&mut self, _symbol: &str) -> Result<DepthSnapshot, ExchangeError> {
            self.depths
                .pop_front()
                .ok_or_else(|| ExchangeError::Transient("no more depth".into()))
        }

        async fn place_order(
            &mut self,
            _symbol: &str,
            _side: Side,
            _price: Decimal,
            _amount: Decimal,
        ) -> Result<OrderAck, ExchangeError> {
            Err(ExchangeError::Unauthorized("feed only".into()))
        }

        async fn cleanup(&mut self) {}
    }

    fn book(ask: Decimal, bid: Decimal) -> DepthSnapshot {
        DepthSnapshot::from_levels(
            "BTCUSDT",
            vec![DepthLevel::new(ask, dec!(1))],
            vec![DepthLevel::new(bid, dec!(1))],
        )
    }

    async fn paper(depths: Vec<DepthSnapshot>) -> PaperExchange {
        let feed = ScriptedFeed {
            depths: depths.into(),
        };
        let mut exchange = PaperExchange::new(Box::new(feed), dec!(10000));
        let config = ExchangeConfig {
            taker_fee: dec!(0.001),
            ..ExchangeConfig::default()
        };
        exchange.init(&config).await.unwrap();
        exchange
    }

    #[tokio::test]
    async fn resting_buy_fills_when_ask_crosses() {
        let mut exchange = paper(vec![book(dec!(20100), dec!(20000)), book(dec!(19900), dec!(19800))]).await;
        exchange.get_depth("BTCUSDT").await.unwrap();

        exchange
            .place_order("BTCUSDT", Side::Buy, dec!(20000), dec!(0.1))
            .await
            .unwrap();
        let account = exchange.get_account().await.unwrap();
        assert_eq!(account.frozen_balance, dec!(2002));
        assert!(exchange.poll_order_events().await.unwrap().is_empty());

        exchange.get_depth("BTCUSDT").await.unwrap();
        let events = exchange.poll_order_events().await.unwrap();
        assert_eq!(events.len(), 1);
        assert!(events[0].is_finished);
        assert_eq!(events[0].price, dec!(19900));

        let account = exchange.get_account().await.unwrap();
        assert_eq!(account.frozen_balance, dec!(0));
        assert_eq!(account.stocks, dec!(0.1));
        assert_eq!(account.balance, dec!(10000) - dec!(1990) * dec!(1.001));
        assert!(exchange.poll_order_events().await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn sell_without_stocks_is_rejected() {
        let mut exchange = paper(vec![]).await;
        let err = exchange
            .place_order("BTCUSDT", Side::Sell, dec!(20000), dec!(0.1))
            .await
            .unwrap_err();
        assert!(matches!(err, ExchangeError::Rejected(_)));
    }

    #[tokio::test]
    async fn zero_price_has_no_side_effects() {
        let mut exchange = paper(vec![]).await;
        let err = exchange
            .place_order("BTCUSDT", Side::Buy, dec!(0), dec!(1))
            .await
            .unwrap_err();
        assert!(matches!(err, ExchangeError::InvalidArgument(_)));
        assert_eq!(exchange.get_account().await.unwrap().frozen_balance, dec!(0));
        assert!(exchange.open_orders.is_empty());
    }

    #[tokio::test]
    async fn crossing_order_fills_immediately() {
        let mut exchange = paper(vec![book(dec!(20000), dec!(19990))]).await;
        exchange.get_depth("BTCUSDT").await.unwrap();

        exchange
            .place_order("BTCUSDT", Side::Buy, dec!(20050), dec!(0.2))
            .await
            .unwrap();
        let events = exchange.poll_order_events().await.unwrap();
        assert_eq!(events.len(), 1);
        assert_eq!(events[0].price, dec!(20000));
        assert_eq!(exchange.account().snapshot().stocks, dec!(0.2));
    }
}
