// src/connectors/traits.rs
use crate::config::ExchangeConfig;
use crate::types::{AccountSnapshot, DepthSnapshot, OrderAck, OrderEvent, Side};
use async_trait::async_trait;
use rust_decimal::Decimal;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum ExchangeError {
    #[error("invalid exchange configuration: {0}")]
    ConfigInvalid(String),

    #[error("failed to connect to exchange: {0}")]
    ConnectFailed(String),

    #[error("unauthorized: {0}")]
    Unauthorized(String),

    #[error("transient failure: {0}")]
    Transient(String),

    #[error("invalid argument: {0}")]
    InvalidArgument(String),

    #[error("rejected by exchange: {0}")]
    Rejected(String),

    #[error("unexpected exchange response: {0}")]
    Protocol(String),
}

impl ExchangeError {
    /// Failures worth waiting out until the next polling cycle.
    pub fn is_retryable(&self) -> bool {
        matches!(self, ExchangeError::Transient(_))
    }
}

/// Capabilities the engine needs from one exchange connection.
///
/// Instances are single-owner: the engine holds the only handle and calls it
/// from one task, so adapters get `&mut self` and need no locking unless they
/// spawn background I/O of their own.
#[async_trait]
pub trait ExchangeClient: Send + Sync {
    fn name(&self) -> &str;

    /// Validates credentials and establishes connectivity. A second call on
    /// an initialized adapter is a no-op.
    async fn init(&mut self, config: &ExchangeConfig) -> Result<(), ExchangeError>;

    async fn get_account(&mut self) -> Result<AccountSnapshot, ExchangeError>;

    async fn get_depth(&mut self, symbol: &str) -> Result<DepthSnapshot, ExchangeError>;

    /// Submits a limit order. `Ok` means the exchange accepted it, not that it
    /// filled; fills arrive later through [`ExchangeClient::poll_order_events`].
    async fn place_order(
        &mut self,
        symbol: &str,
        side: Side,
        price: Decimal,
        amount: Decimal,
    ) -> Result<OrderAck, ExchangeError>;

    /// Drains fill/cancel notifications observed since the previous call.
    async fn poll_order_events(&mut self) -> Result<Vec<OrderEvent>, ExchangeError> {
        Ok(Vec::new())
    }

    /// Releases connections. Safe to call repeatedly.
    async fn cleanup(&mut self);
}

/// Rejects malformed order parameters before anything leaves the process.
pub fn validate_order(symbol: &str, price: Decimal, amount: Decimal) -> Result<(), ExchangeError> {
    if symbol.trim().is_empty() {
        return Err(ExchangeError::InvalidArgument("empty symbol".to_string()));
    }
    if price <= Decimal::ZERO {
        return Err(ExchangeError::InvalidArgument(format!(
            "price must be positive, got {}",
            price
        )));
    }
    if amount <= Decimal::ZERO {
        return Err(ExchangeError::InvalidArgument(format!(
            "amount must be positive, got {}",
            amount
        )));
    }
    Ok(())
}

pub fn validate_symbol(symbol: &str) -> Result<(), ExchangeError> {
    if symbol.trim().is_empty() {
        return Err(ExchangeError::InvalidArgument("empty symbol".to_string()));
    }
    Ok(())
}
