pub mod binance;
pub mod messages;
pub mod paper;
pub mod traits;

use crate::config::{ExchangeConfig, ExchangeKind};
use binance::BinanceClient;
use paper::PaperExchange;
use rust_decimal::Decimal;
use traits::{ExchangeClient, ExchangeError};

/// Builds the adapter for `config.kind`. Without `live` the adapter only
/// supplies market data and orders go to a simulated account holding
/// `paper_balance`.
pub fn create_exchange(
    config: &ExchangeConfig,
    live: bool,
    paper_balance: Decimal,
) -> Result<Box<dyn ExchangeClient>, ExchangeError> {
    match (config.kind, live) {
        (ExchangeKind::Binance, true) => Ok(Box::new(BinanceClient::new())),
        (ExchangeKind::Binance, false) => Ok(Box::new(PaperExchange::new(
            Box::new(BinanceClient::market_data_only()),
            paper_balance,
        ))),
        (kind, _) => Err(ExchangeError::ConfigInvalid(format!(
            "no adapter available for exchange {:?}",
            kind
        ))),
    }
}
