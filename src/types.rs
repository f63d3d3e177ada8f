// src/types.rs
use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use std::fmt;

/// Depth snapshots never carry more levels than this per side.
pub const MAX_DEPTH_LEVELS: usize = 10;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum Side {
    Buy,
    Sell,
}

impl fmt::Display for Side {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Side::Buy => write!(f, "BUY"),
            Side::Sell => write!(f, "SELL"),
        }
    }
}

/// Balance and position of one account, as reported by the exchange.
///
/// `balance` is the quote asset, `stocks` the base asset. Frozen amounts are
/// reserved against open orders and are included in the totals.
#[derive(Debug, Clone, Copy, PartialEq, Default, Serialize, Deserialize)]
pub struct AccountSnapshot {
    pub balance: Decimal,
    pub stocks: Decimal,
    pub frozen_balance: Decimal,
    pub frozen_stocks: Decimal,
}

impl AccountSnapshot {
    /// Builds a snapshot, rejecting negative values and frozen amounts
    /// larger than their totals.
    pub fn new(
        balance: Decimal,
        stocks: Decimal,
        frozen_balance: Decimal,
        frozen_stocks: Decimal,
    ) -> Result<Self, String> {
        let snapshot = Self {
            balance,
            stocks,
            frozen_balance,
            frozen_stocks,
        };
        snapshot.validate()?;
        Ok(snapshot)
    }

    pub fn validate(&self) -> Result<(), String> {
        if self.balance.is_sign_negative()
            || self.stocks.is_sign_negative()
            || self.frozen_balance.is_sign_negative()
            || self.frozen_stocks.is_sign_negative()
        {
            return Err(format!("negative account value: {:?}", self));
        }
        if self.frozen_balance > self.balance {
            return Err(format!(
                "frozen balance {} exceeds balance {}",
                self.frozen_balance, self.balance
            ));
        }
        if self.frozen_stocks > self.stocks {
            return Err(format!(
                "frozen stocks {} exceed stocks {}",
                self.frozen_stocks, self.stocks
            ));
        }
        Ok(())
    }

    pub fn available_balance(&self) -> Decimal {
        self.balance - self.frozen_balance
    }

    pub fn available_stocks(&self) -> Decimal {
        self.stocks - self.frozen_stocks
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct DepthLevel {
    pub price: Decimal,
    pub amount: Decimal,
}

impl DepthLevel {
    pub fn new(price: Decimal, amount: Decimal) -> Self {
        Self { price, amount }
    }

    fn is_valid(&self) -> bool {
        self.price > Decimal::ZERO && self.amount > Decimal::ZERO
    }
}

/// Top-of-book snapshot for one symbol.
///
/// Asks ascend by price, bids descend, each side holds at most
/// [`MAX_DEPTH_LEVELS`] levels with positive price and amount.
#[derive(Debug, Clone, PartialEq)]
pub struct DepthSnapshot {
    symbol: String,
    asks: Vec<DepthLevel>,
    bids: Vec<DepthLevel>,
    timestamp: DateTime<Utc>,
}

impl DepthSnapshot {
    /// Normalizes raw levels: drops non-positive levels, sorts each side and
    /// truncates to capacity.
    pub fn from_levels(
        symbol: impl Into<String>,
        mut asks: Vec<DepthLevel>,
        mut bids: Vec<DepthLevel>,
    ) -> Self {
        asks.retain(DepthLevel::is_valid);
        bids.retain(DepthLevel::is_valid);
        asks.sort_by(|a, b| a.price.cmp(&b.price));
        bids.sort_by(|a, b| b.price.cmp(&a.price));
        asks.truncate(MAX_DEPTH_LEVELS);
        bids.truncate(MAX_DEPTH_LEVELS);

        Self {
            symbol: symbol.into(),
            asks,
            bids,
            timestamp: Utc::now(),
        }
    }

    pub fn symbol(&self) -> &str {
        &self.symbol
    }

    pub fn asks(&self) -> &[DepthLevel] {
        &self.asks
    }

    pub fn bids(&self) -> &[DepthLevel] {
        &self.bids
    }

    pub fn ask_count(&self) -> usize {
        self.asks.len()
    }

    pub fn bid_count(&self) -> usize {
        self.bids.len()
    }

    pub fn best_ask(&self) -> Option<&DepthLevel> {
        self.asks.first()
    }

    pub fn best_bid(&self) -> Option<&DepthLevel> {
        self.bids.first()
    }

    pub fn timestamp(&self) -> DateTime<Utc> {
        self.timestamp
    }
}

/// Fill or cancel notification for an order placed through the exchange.
///
/// `amount` is the cumulative filled quantity; a cancel with nothing filled
/// arrives with a zero amount.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct OrderEvent {
    pub order_id: String,
    pub symbol: String,
    pub side: Side,
    pub price: Decimal,
    pub amount: Decimal,
    pub is_finished: bool,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct OrderAck {
    pub id: String,
    pub symbol: String,
    pub status: String,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum StrategyState {
    Init,
    Running,
    Paused,
    Stopped,
    Error,
}

impl StrategyState {
    pub fn is_terminal(self) -> bool {
        matches!(self, StrategyState::Stopped | StrategyState::Error)
    }
}

impl fmt::Display for StrategyState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            StrategyState::Init => "init",
            StrategyState::Running => "running",
            StrategyState::Paused => "paused",
            StrategyState::Stopped => "stopped",
            StrategyState::Error => "error",
        };
        f.write_str(name)
    }
}

#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
pub struct StrategyStats {
    pub total_profit: Decimal,
    pub daily_profit: Decimal,
    pub total_trades: u32,
    pub successful_trades: u32,
    pub max_drawdown: Decimal,
    pub win_rate: Decimal,
    pub last_trade_time: Option<DateTime<Utc>>,
}

/// Payload pushed to the status sink once per cycle.
#[derive(Debug, Clone, Serialize)]
pub struct StatusRecord {
    #[serde(with = "rust_decimal::serde::float")]
    pub total_profit: Decimal,
    #[serde(with = "rust_decimal::serde::float")]
    pub daily_profit: Decimal,
    pub trades: u32,
    pub successful_trades: u32,
    #[serde(with = "rust_decimal::serde::float")]
    pub win_rate: Decimal,
    #[serde(with = "rust_decimal::serde::float")]
    pub max_drawdown: Decimal,
    pub state: String,
    pub timestamp: i64,
}

impl StatusRecord {
    pub fn new(stats: &StrategyStats, state: StrategyState) -> Self {
        Self {
            total_profit: stats.total_profit.round_dp(2),
            daily_profit: stats.daily_profit.round_dp(2),
            trades: stats.total_trades,
            successful_trades: stats.successful_trades,
            win_rate: stats.win_rate.round_dp(4),
            max_drawdown: stats.max_drawdown.round_dp(2),
            state: state.to_string(),
            timestamp: Utc::now().timestamp_millis(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rust_decimal_macros::dec;

    #[test]
    fn depth_is_sorted_filtered_and_bounded() {
        let asks = (1..=15)
            .rev()
            .map(|i| DepthLevel::new(Decimal::from(100 + i), dec!(1)))
            .chain([DepthLevel::new(dec!(0), dec!(1))])
            .collect();
        let bids = vec![
            DepthLevel::new(dec!(98), dec!(1)),
            DepthLevel::new(dec!(99), dec!(2)),
            DepthLevel::new(dec!(97), dec!(0)),
        ];

        let depth = DepthSnapshot::from_levels("BTCUSDT", asks, bids);

        assert_eq!(depth.ask_count(), MAX_DEPTH_LEVELS);
        assert_eq!(depth.best_ask().unwrap().price, dec!(101));
        assert!(depth.asks().windows(2).all(|w| w[0].price < w[1].price));
        assert_eq!(depth.bid_count(), 2);
        assert_eq!(depth.best_bid().unwrap().price, dec!(99));
    }

    #[test]
    fn account_rejects_frozen_above_total() {
        assert!(AccountSnapshot::new(dec!(100), dec!(1), dec!(150), dec!(0)).is_err());
        assert!(AccountSnapshot::new(dec!(100), dec!(1), dec!(0), dec!(2)).is_err());
        assert!(AccountSnapshot::new(dec!(-1), dec!(1), dec!(0), dec!(0)).is_err());

        let ok = AccountSnapshot::new(dec!(100), dec!(1), dec!(40), dec!(0.5)).unwrap();
        assert_eq!(ok.available_balance(), dec!(60));
        assert_eq!(ok.available_stocks(), dec!(0.5));
    }

    #[test]
    fn status_record_serializes_numbers() {
        let stats = StrategyStats {
            total_profit: dec!(12.346),
            daily_profit: dec!(1.5),
            total_trades: 3,
            ..Default::default()
        };
        let json = serde_json::to_value(StatusRecord::new(&stats, StrategyState::Running)).unwrap();

        assert_eq!(json["total_profit"], serde_json::json!(12.35));
        assert_eq!(json["daily_profit"], serde_json::json!(1.5));
        assert_eq!(json["trades"], serde_json::json!(3));
        assert_eq!(json["state"], serde_json::json!("running"));
    }
}
