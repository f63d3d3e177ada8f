// src/strategies/traits.rs
use crate::config::StrategyConfig;
use crate::connectors::traits::ExchangeClient;
use crate::types::{AccountSnapshot, DepthSnapshot, OrderEvent, StrategyState, StrategyStats};
use async_trait::async_trait;
use thiserror::Error;

#[derive(Debug, Error, PartialEq)]
pub enum StrategyError {
    #[error("invalid strategy configuration: {0}")]
    ConfigInvalid(String),

    #[error("cannot {action} a strategy in state {from}")]
    InvalidTransition {
        from: StrategyState,
        action: &'static str,
    },

    #[error("internal strategy error: {0}")]
    Internal(String),
}

#[async_trait]
pub trait Strategy: Send + Sync {
    fn name(&self) -> &str;

    /// Validates the configuration and puts the strategy in `Init`.
    async fn init(&mut self, config: &StrategyConfig) -> Result<(), StrategyError>;

    /// Decision point. May place orders through `exchange`; a no-op outside
    /// `Running`.
    async fn on_tick(&mut self, depths: &[DepthSnapshot], exchange: &mut dyn ExchangeClient);

    fn on_account(&mut self, account: &AccountSnapshot);

    fn on_order(&mut self, event: &OrderEvent);

    fn state(&self) -> StrategyState;

    fn stats(&self) -> StrategyStats;

    fn start(&mut self) -> Result<(), StrategyError>;

    fn pause(&mut self) -> Result<(), StrategyError>;

    /// Always succeeds; stopping a stopped strategy is a no-op.
    fn stop(&mut self);

    async fn cleanup(&mut self);
}
