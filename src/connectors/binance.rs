// src/connectors/binance.rs
use crate::config::ExchangeConfig;
use crate::connectors::messages::{BinanceAccountInfo, BinanceApiError, BinanceDepth, BinanceOrder};
use crate::connectors::traits::{validate_order, validate_symbol, ExchangeClient, ExchangeError};
use crate::types::{AccountSnapshot, DepthLevel, DepthSnapshot, OrderAck, OrderEvent, Side};
use async_trait::async_trait;
use chrono::Utc;
use hmac::{Hmac, Mac};
use reqwest::{Client, Method, Response, StatusCode};
use rust_decimal::Decimal;
use serde::de::DeserializeOwned;
use sha2::Sha256;
use std::collections::HashMap;
use tracing::{debug, info, warn};
use uuid::Uuid;

type HmacSha256 = Hmac<Sha256>;

const DEPTH_LIMIT: &str = "10";
/// Consecutive failed status queries after which an order is given up on.
const MAX_STATUS_FAILURES: u32 = 5;

/// Order we placed and still expect updates for.
#[derive(Debug, Clone)]
struct TrackedOrder {
    symbol: String,
    side: Side,
    price: Decimal,
    reported_qty: Decimal,
    failed_queries: u32,
}

pub struct BinanceClient {
    api_key: String,
    secret_key: String,
    http_client: Client,
    base_rest_url: String,
    base_asset: String,
    quote_asset: String,
    initialized: bool,
    market_data_only: bool,
    open_orders: HashMap<String, TrackedOrder>,
}

impl BinanceClient {
    pub fn new() -> Self {
        Self {
            api_key: String::new(),
            secret_key: String::new(),
            http_client: Client::new(),
            base_rest_url: String::new(),
            base_asset: String::new(),
            quote_asset: String::new(),
            initialized: false,
            market_data_only: false,
            open_orders: HashMap::new(),
        }
    }

    /// A client limited to public endpoints. It needs no credentials, and
    /// account and order calls fail with `Unauthorized`.
    pub fn market_data_only() -> Self {
        Self {
            market_data_only: true,
            ..Self::new()
        }
    }

    fn ensure_signed(&self) -> Result<(), ExchangeError> {
        self.ensure_ready()?;
        if self.market_data_only {
            return Err(ExchangeError::Unauthorized(
                "client was created for market data only".to_string(),
            ));
        }
        Ok(())
    }

    fn ensure_ready(&self) -> Result<(), ExchangeError> {
        if !self.initialized {
            return Err(ExchangeError::ConnectFailed(
                "binance client used before init".to_string(),
            ));
        }
        Ok(())
    }

    fn sign_and_build_query(&self, params: Vec<(&str, String)>) -> Result<String, ExchangeError> {
        let mut params = params;
        let timestamp = Utc::now().timestamp_millis().to_string();
        params.push(("timestamp", timestamp));

        let query_string = serde_urlencoded::to_string(&params)
            .map_err(|e| ExchangeError::InvalidArgument(e.to_string()))?;

        let mut mac = HmacSha256::new_from_slice(self.secret_key.as_bytes())
            .map_err(|e| ExchangeError::ConfigInvalid(format!("secret key: {}", e)))?;
        mac.update(query_string.as_bytes());
        let signature = hex::encode(mac.finalize().into_bytes());

        Ok(format!("{}&signature={}", query_string, signature))
    }

    async fn send_signed_request<T: DeserializeOwned>(
        &self,
        method: Method,
        endpoint: &str,
        params: Vec<(&str, String)>,
    ) -> Result<T, ExchangeError> {
        let full_query = self.sign_and_build_query(params)?;
        let url = format!("{}{}?{}", self.base_rest_url, endpoint, full_query);

        let response = self
            .http_client
            .request(method, &url)
            .header("X-MBX-APIKEY", &self.api_key)
            .send()
            .await
            .map_err(map_transport_error)?;

        decode_response(response).await
    }

    async fn send_public_request<T: DeserializeOwned>(
        &self,
        endpoint: &str,
        params: &[(&str, &str)],
    ) -> Result<T, ExchangeError> {
        let url = format!("{}{}", self.base_rest_url, endpoint);
        let response = self
            .http_client
            .get(&url)
            .query(params)
            .send()
            .await
            .map_err(map_transport_error)?;

        decode_response(response).await
    }

    /// Counts a failed status query. Past [`MAX_STATUS_FAILURES`] the order
    /// is dropped and reported finished with whatever fill was last seen, so
    /// a strategy waiting on it is released.
    fn record_query_failure(&mut self, client_id: &str) -> Option<OrderEvent> {
        let tracked = self.open_orders.get_mut(client_id)?;
        tracked.failed_queries += 1;
        if tracked.failed_queries < MAX_STATUS_FAILURES {
            return None;
        }

        let tracked = self.open_orders.remove(client_id)?;
        warn!(
            order_id = %client_id,
            attempts = tracked.failed_queries,
            filled = %tracked.reported_qty,
            "Giving up on order status; reporting it as finished"
        );
        Some(OrderEvent {
            order_id: client_id.to_string(),
            symbol: tracked.symbol,
            side: tracked.side,
            price: tracked.price,
            amount: tracked.reported_qty,
            is_finished: true,
        })
    }

    async fn query_order(&self, client_id: &str, symbol: &str) -> Result<BinanceOrder, ExchangeError> {
        let params = vec![
            ("symbol", symbol.to_string()),
            ("origClientOrderId", client_id.to_string()),
        ];
        self.send_signed_request(Method::GET, "/api/v3/order", params)
            .await
    }
}

impl Default for BinanceClient {
    fn default() -> Self {
        Self::new()
    }
}

fn map_transport_error(e: reqwest::Error) -> ExchangeError {
    if e.is_decode() {
        return ExchangeError::Protocol(e.to_string());
    }
    match e.status() {
        Some(StatusCode::UNAUTHORIZED) | Some(StatusCode::FORBIDDEN) => {
            ExchangeError::Unauthorized(e.to_string())
        }
        _ => ExchangeError::Transient(e.to_string()),
    }
}

fn map_status_error(status: StatusCode, body: &str) -> ExchangeError {
    let message = serde_json::from_str::<BinanceApiError>(body)
        .map(|err| format!("{} (code {})", err.msg, err.code))
        .unwrap_or_else(|_| format!("http {}: {}", status, body));

    match status {
        StatusCode::UNAUTHORIZED | StatusCode::FORBIDDEN => ExchangeError::Unauthorized(message),
        StatusCode::TOO_MANY_REQUESTS | StatusCode::REQUEST_TIMEOUT => {
            ExchangeError::Transient(message)
        }
        s if s.as_u16() == 418 || s.is_server_error() => ExchangeError::Transient(message),
        _ => ExchangeError::Rejected(message),
    }
}

async fn decode_response<T: DeserializeOwned>(response: Response) -> Result<T, ExchangeError> {
    let status = response.status();
    if !status.is_success() {
        let body = response.text().await.unwrap_or_default();
        return Err(map_status_error(status, &body));
    }
    response
        .json::<T>()
        .await
        .map_err(|e| ExchangeError::Protocol(e.to_string()))
}

#[async_trait]
impl ExchangeClient for BinanceClient {
    fn name(&self) -> &str {
        "binance"
    }

    async fn init(&mut self, config: &ExchangeConfig) -> Result<(), ExchangeError> {
        if self.initialized {
            debug!("Binance client already initialized");
            return Ok(());
        }
        let has_credentials =
            !config.api_key.trim().is_empty() && !config.api_secret.trim().is_empty();
        if !self.market_data_only && !has_credentials {
            return Err(ExchangeError::ConfigInvalid(
                "api_key and api_secret are required".to_string(),
            ));
        }
        if config.rest_endpoint.trim().is_empty() {
            return Err(ExchangeError::ConfigInvalid("rest_endpoint is empty".to_string()));
        }
        if config.base_asset.is_empty() || config.quote_asset.is_empty() {
            return Err(ExchangeError::ConfigInvalid(
                "base_asset and quote_asset are required".to_string(),
            ));
        }

        self.http_client = Client::builder()
            .timeout(config.request_timeout())
            .build()
            .map_err(|e| ExchangeError::ConfigInvalid(e.to_string()))?;
        self.api_key = config.api_key.clone();
        self.secret_key = config.api_secret.clone();
        self.base_rest_url = config.rest_endpoint.trim_end_matches('/').to_string();
        self.base_asset = config.base_asset.to_uppercase();
        self.quote_asset = config.quote_asset.to_uppercase();

        let url = format!("{}/api/v3/ping", self.base_rest_url);
        self.http_client
            .get(&url)
            .send()
            .await
            .and_then(|r| r.error_for_status())
            .map_err(|e| ExchangeError::ConnectFailed(e.to_string()))?;

        self.initialized = true;
        info!(endpoint = %self.base_rest_url, "Binance client connected");
        Ok(())
    }

    async fn get_account(&mut self) -> Result<AccountSnapshot, ExchangeError> {
        self.ensure_signed()?;
        let info: BinanceAccountInfo = self
            .send_signed_request(Method::GET, "/api/v3/account", vec![])
            .await?;

        let (balance, frozen_balance) = info.holding(&self.quote_asset);
        let (stocks, frozen_stocks) = info.holding(&self.base_asset);

        AccountSnapshot::new(balance, stocks, frozen_balance, frozen_stocks)
            .map_err(ExchangeError::Protocol)
    }

    async fn get_depth(&mut self, symbol: &str) -> Result<DepthSnapshot, ExchangeError> {
        self.ensure_ready()?;
        validate_symbol(symbol)?;
        let depth: BinanceDepth = self
            .send_public_request("/api/v3/depth", &[("symbol", symbol), ("limit", DEPTH_LIMIT)])
            .await?;

        let to_levels = |levels: Vec<(Decimal, Decimal)>| {
            levels
                .into_iter()
                .map(|(price, amount)| DepthLevel::new(price, amount))
                .collect()
        };
        Ok(DepthSnapshot::from_levels(
            symbol,
            to_levels(depth.asks),
            to_levels(depth.bids),
        ))
    }

    async fn place_order(
        &mut self,
        symbol: &str,
        side: Side,
        price: Decimal,
        amount: Decimal,
    ) -> Result<OrderAck, ExchangeError> {
        validate_order(symbol, price, amount)?;
        self.ensure_signed()?;

        let client_id = Uuid::new_v4().simple().to_string();
        let params = vec![
            ("symbol", symbol.to_string()),
            ("side", side.to_string()),
            ("type", "LIMIT".to_string()),
            ("timeInForce", "GTC".to_string()),
            ("quantity", amount.normalize().to_string()),
            ("price", price.normalize().to_string()),
            ("newClientOrderId", client_id.clone()),
        ];

        info!(%side, %amount, %price, symbol, "Sending order");

        let resp: BinanceOrder = self
            .send_signed_request(Method::POST, "/api/v3/order", params)
            .await?;

        self.open_orders.insert(
            client_id.clone(),
            TrackedOrder {
                symbol: resp.symbol.clone(),
                side,
                price,
                reported_qty: Decimal::ZERO,
                failed_queries: 0,
            },
        );

        Ok(OrderAck {
            id: client_id,
            symbol: resp.symbol,
            status: resp.status,
        })
    }

    async fn poll_order_events(&mut self) -> Result<Vec<OrderEvent>, ExchangeError> {
        if self.market_data_only || self.open_orders.is_empty() {
            return Ok(Vec::new());
        }
        self.ensure_ready()?;
        let mut events = Vec::new();
        let pending: Vec<(String, TrackedOrder)> = self
            .open_orders
            .iter()
            .map(|(id, order)| (id.clone(), order.clone()))
            .collect();

        for (client_id, tracked) in pending {
            let order = match self.query_order(&client_id, &tracked.symbol).await {
                Ok(order) => order,
                Err(ExchangeError::Unauthorized(msg)) => {
                    return Err(ExchangeError::Unauthorized(msg));
                }
                Err(e) => {
                    warn!(order_id = %client_id, error = %e, "Order status query failed");
                    events.extend(self.record_query_failure(&client_id));
                    continue;
                }
            };

            if let Some(entry) = self.open_orders.get_mut(&client_id) {
                entry.failed_queries = 0;
            }
            let finished = order.is_terminal();
            if !finished && order.executed_qty <= tracked.reported_qty {
                continue;
            }

            events.push(OrderEvent {
                order_id: client_id.clone(),
                symbol: order.symbol.clone(),
                side: tracked.side,
                price: if order.executed_qty.is_zero() {
                    tracked.price
                } else {
                    order.average_price()
                },
                amount: order.executed_qty,
                is_finished: finished,
            });

            if finished {
                self.open_orders.remove(&client_id);
            } else if let Some(entry) = self.open_orders.get_mut(&client_id) {
                entry.reported_qty = order.executed_qty;
            }
        }

        Ok(events)
    }

    async fn cleanup(&mut self) {
        if !self.initialized {
            return;
        }
        if !self.open_orders.is_empty() {
            warn!(
                open_orders = self.open_orders.len(),
                "Binance client closing with orders still open"
            );
        }
        self.open_orders.clear();
        self.initialized = false;
        info!("Binance client closed");
    }
}
