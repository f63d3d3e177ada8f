// src/strategies/stats.rs
//! Trade accounting behind [`StrategyStats`].
//!
//! Position is tracked at average cost, with the taker fee folded into the
//! cost of every buy and deducted from the proceeds of every sell. Each
//! terminal order event counts as one trade. A trade is successful when it is
//! a sell whose net proceeds per unit beat the average cost by at least
//! `min_profit` (as a fraction of cost). Buys and empty cancels count as
//! trades but never as wins.

use crate::types::{OrderEvent, Side, StrategyStats};
use chrono::{DateTime, NaiveDate, Utc};
use rust_decimal::Decimal;
use tracing::warn;

#[derive(Debug, Clone)]
pub struct StatsTracker {
    stats: StrategyStats,
    fee_rate: Decimal,
    min_profit: Decimal,
    position: Decimal,
    average_cost: Decimal,
    peak_profit: Decimal,
    current_day: Option<NaiveDate>,
}

impl StatsTracker {
    pub fn new(fee_rate: Decimal, min_profit: Decimal) -> Self {
        Self {
            stats: StrategyStats::default(),
            fee_rate,
            min_profit,
            position: Decimal::ZERO,
            average_cost: Decimal::ZERO,
            peak_profit: Decimal::ZERO,
            current_day: None,
        }
    }

    pub fn snapshot(&self) -> StrategyStats {
        self.stats.clone()
    }

    pub fn position(&self) -> Decimal {
        self.position
    }

    pub fn average_cost(&self) -> Decimal {
        self.average_cost
    }

    /// Resets `daily_profit` when `now` falls on a new UTC day.
    pub fn roll_day(&mut self, now: DateTime<Utc>) {
        let today = now.date_naive();
        if self.current_day != Some(today) {
            if self.current_day.is_some() {
                self.stats.daily_profit = Decimal::ZERO;
            }
            self.current_day = Some(today);
        }
    }

    /// Applies a terminal order event and returns the profit it realised.
    pub fn record_terminal(&mut self, event: &OrderEvent, now: DateTime<Utc>) -> Decimal {
        self.roll_day(now);
        self.stats.total_trades += 1;
        self.stats.last_trade_time = Some(now);

        let realised = if event.amount > Decimal::ZERO {
            match event.side {
                Side::Buy => {
                    self.apply_buy(event.price, event.amount);
                    Decimal::ZERO
                }
                Side::Sell => self.apply_sell(event.price, event.amount),
            }
        } else {
            Decimal::ZERO
        };

        self.stats.win_rate = Decimal::from(self.stats.successful_trades)
            / Decimal::from(self.stats.total_trades);
        realised
    }

    fn apply_buy(&mut self, price: Decimal, amount: Decimal) {
        let cost = price * amount * (Decimal::ONE + self.fee_rate);
        let total_cost = self.average_cost * self.position + cost;
        self.position += amount;
        self.average_cost = total_cost / self.position;
    }

    fn apply_sell(&mut self, price: Decimal, amount: Decimal) -> Decimal {
        let matched = amount.min(self.position);
        if matched < amount {
            warn!(
                sold = %amount,
                held = %self.position,
                "Sell fill exceeds tracked position; excess has no cost basis"
            );
        }
        if matched.is_zero() {
            return Decimal::ZERO;
        }

        let net_price = price * (Decimal::ONE - self.fee_rate);
        let pnl = (net_price - self.average_cost) * matched;
        if self.average_cost > Decimal::ZERO
            && (net_price - self.average_cost) / self.average_cost >= self.min_profit
        {
            self.stats.successful_trades += 1;
        }

        self.position -= matched;
        if self.position.is_zero() {
            self.average_cost = Decimal::ZERO;
        }

        self.stats.total_profit += pnl;
        self.stats.daily_profit += pnl;
        self.peak_profit = self.peak_profit.max(self.stats.total_profit);
        self.stats.max_drawdown = self
            .stats
            .max_drawdown
            .max(self.peak_profit - self.stats.total_profit);
        pnl
    }
}
