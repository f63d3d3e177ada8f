// src/config.rs

use chrono::NaiveTime;
use config::{Config, ConfigError, Environment, File};
use rust_decimal::Decimal;
use serde::Deserialize;
use std::env;
use std::time::Duration;
use thiserror::Error;
use url::Url;

#[derive(Debug, Error)]
pub enum AppConfigError {
    #[error(transparent)]
    Load(#[from] ConfigError),

    #[error("invalid configuration: {0}")]
    Invalid(String),
}

#[derive(Debug, Deserialize, Clone, Copy, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum ExchangeKind {
    Binance,
    Okex,
    Huobi,
    Mexc,
    Bybit,
}

/// Identity and credentials for one exchange connection.
#[derive(Debug, Deserialize, Clone)]
#[serde(default)]
pub struct ExchangeConfig {
    pub kind: ExchangeKind,
    pub api_key: String,
    pub api_secret: String,
    pub passphrase: String,
    pub rest_endpoint: String,
    pub ws_endpoint: String,
    pub maker_fee: Decimal,
    pub taker_fee: Decimal,
    pub base_asset: String,
    pub quote_asset: String,
    pub request_timeout_ms: u64,
}

impl Default for ExchangeConfig {
    fn default() -> Self {
        Self {
            kind: ExchangeKind::Binance,
            api_key: String::new(),
            api_secret: String::new(),
            passphrase: String::new(),
            rest_endpoint: "https://api.binance.com".to_string(),
            ws_endpoint: "wss://stream.binance.com:9443".to_string(),
            maker_fee: Decimal::new(1, 3),
            taker_fee: Decimal::new(2, 3),
            base_asset: "BTC".to_string(),
            quote_asset: "USDT".to_string(),
            request_timeout_ms: 5_000,
        }
    }
}

impl ExchangeConfig {
    pub fn request_timeout(&self) -> Duration {
        Duration::from_millis(self.request_timeout_ms)
    }
}

#[derive(Debug, Deserialize, Clone)]
#[serde(default)]
pub struct StrategyConfig {
    pub name: String,
    pub version: String,
    pub kind: String,
    pub initial_balance: Decimal,
    /// Largest quote notional a single order may commit.
    pub risk_limit: Decimal,
    /// Largest base-asset position the strategy may hold.
    pub max_position: Decimal,
    /// Minimum net return on cost basis for a closing fill to count as a win.
    pub min_profit: Decimal,
    /// Orders placed per UTC day; 0 disables the cap.
    pub max_trades_per_day: u32,
    pub start_time: Option<NaiveTime>,
    pub end_time: Option<NaiveTime>,

    // threshold strategy
    pub buy_below: Decimal,
    pub sell_above: Decimal,
    pub order_amount: Decimal,
    pub step_size: Decimal,
    pub tick_size: Decimal,
    /// Copied from the exchange section at load time.
    #[serde(skip)]
    pub taker_fee: Decimal,
}

impl Default for StrategyConfig {
    fn default() -> Self {
        Self {
            name: "ThresholdStrategy".to_string(),
            version: "1.0.0".to_string(),
            kind: "threshold".to_string(),
            initial_balance: Decimal::from(10_000),
            risk_limit: Decimal::from(1_000),
            max_position: Decimal::from(100),
            min_profit: Decimal::new(1, 3),
            max_trades_per_day: 0,
            start_time: None,
            end_time: None,
            buy_below: Decimal::ZERO,
            sell_above: Decimal::ZERO,
            order_amount: Decimal::ZERO,
            step_size: Decimal::ZERO,
            tick_size: Decimal::ZERO,
            taker_fee: Decimal::new(2, 3),
        }
    }
}

impl StrategyConfig {
    /// True when `time` falls inside the configured daily window. A window
    /// whose end precedes its start wraps past midnight.
    pub fn is_active_at(&self, time: NaiveTime) -> bool {
        match (self.start_time, self.end_time) {
            (Some(start), Some(end)) if start <= end => time >= start && time < end,
            (Some(start), Some(end)) => time >= start || time < end,
            (Some(start), None) => time >= start,
            (None, Some(end)) => time < end,
            (None, None) => true,
        }
    }
}

#[derive(Debug, Deserialize, Clone)]
#[serde(default)]
pub struct EngineConfig {
    pub symbol: String,
    pub poll_interval_ms: u64,
    pub live_trading: bool,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            symbol: "BTCUSDT".to_string(),
            poll_interval_ms: 100,
            live_trading: false,
        }
    }
}

impl EngineConfig {
    pub fn poll_interval(&self) -> Duration {
        Duration::from_millis(self.poll_interval_ms)
    }
}

#[derive(Debug, Deserialize, Clone)]
#[serde(default)]
pub struct StatusConfig {
    pub enabled: bool,
    pub host: String,
    pub port: u16,
    pub max_connections: usize,
}

impl Default for StatusConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            host: "0.0.0.0".to_string(),
            port: 8080,
            max_connections: 100,
        }
    }
}

#[derive(Debug, Deserialize, Clone)]
#[serde(default)]
pub struct LoggingConfig {
    pub level: String,
    pub directory: Option<String>,
    pub file_prefix: String,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: "info".to_string(),
            directory: None,
            file_prefix: "quantframe.log".to_string(),
        }
    }
}

#[derive(Debug, Deserialize, Clone, Default)]
#[serde(default)]
pub struct AppConfig {
    pub engine: EngineConfig,
    pub exchange: ExchangeConfig,
    pub strategy: StrategyConfig,
    pub status: StatusConfig,
    pub logging: LoggingConfig,
}

impl AppConfig {
    /// Loads `Settings` (or `$QUANTFRAME_CONFIG`) overlaid with `APP__*`
    /// environment variables.
    pub fn new() -> Result<Self, AppConfigError> {
        let path = env::var("QUANTFRAME_CONFIG").unwrap_or_else(|_| "Settings".to_string());
        let builder = Config::builder()
            .add_source(File::with_name(&path).required(false))
            .add_source(Environment::with_prefix("APP").separator("__"));

        let mut config: AppConfig = builder.build()?.try_deserialize()?;
        config.apply_credential_fallback();
        config.strategy.taker_fee = config.exchange.taker_fee;
        config.validate()?;
        Ok(config)
    }

    fn apply_credential_fallback(&mut self) {
        if self.exchange.api_key.is_empty() {
            self.exchange.api_key = env::var("BINANCE_API_KEY").unwrap_or_default();
        }
        if self.exchange.api_secret.is_empty() {
            self.exchange.api_secret = env::var("BINANCE_SECRET_KEY").unwrap_or_default();
        }
    }

    pub fn validate(&self) -> Result<(), AppConfigError> {
        if self.engine.symbol.trim().is_empty() {
            return Err(AppConfigError::Invalid("engine.symbol is empty".into()));
        }
        if self.engine.poll_interval_ms == 0 {
            return Err(AppConfigError::Invalid(
                "engine.poll_interval_ms must be positive".into(),
            ));
        }
        if self.exchange.maker_fee.is_sign_negative() || self.exchange.taker_fee.is_sign_negative()
        {
            return Err(AppConfigError::Invalid("exchange fees must be >= 0".into()));
        }
        for (key, value) in [
            ("exchange.rest_endpoint", &self.exchange.rest_endpoint),
            ("exchange.ws_endpoint", &self.exchange.ws_endpoint),
        ] {
            Url::parse(value)
                .map_err(|e| AppConfigError::Invalid(format!("{key} is not a URL: {e}")))?;
        }
        if self.exchange.request_timeout_ms == 0 {
            return Err(AppConfigError::Invalid(
                "exchange.request_timeout_ms must be positive".into(),
            ));
        }
        Ok(())
    }
}
