// src/connectors/messages.rs
use rust_decimal::Decimal;
use serde::Deserialize;

/// One balance row of `GET /api/v3/account`.
#[derive(Debug, Deserialize)]
pub struct BinanceBalance {
    pub asset: String,
    pub free: Decimal,
    pub locked: Decimal,
}

#[derive(Debug, Deserialize)]
pub struct BinanceAccountInfo {
    pub balances: Vec<BinanceBalance>,
}

impl BinanceAccountInfo {
    /// Returns `(total, locked)` for `asset`, zero when the account has none.
    pub fn holding(&self, asset: &str) -> (Decimal, Decimal) {
        self.balances
            .iter()
            .find(|b| b.asset.eq_ignore_ascii_case(asset))
            .map(|b| (b.free + b.locked, b.locked))
            .unwrap_or((Decimal::ZERO, Decimal::ZERO))
    }
}

/// `GET /api/v3/depth` body. Levels arrive as `["price", "qty"]` pairs.
#[derive(Debug, Deserialize)]
pub struct BinanceDepth {
    #[serde(rename = "lastUpdateId")]
    pub last_update_id: u64,
    pub bids: Vec<(Decimal, Decimal)>,
    pub asks: Vec<(Decimal, Decimal)>,
}

/// Order body returned by both `POST` and `GET /api/v3/order`.
#[derive(Debug, Deserialize)]
pub struct BinanceOrder {
    #[serde(rename = "orderId")]
    pub order_id: u64,
    pub symbol: String,
    pub status: String,
    #[serde(rename = "clientOrderId")]
    pub client_order_id: String,
    pub price: Decimal,
    #[serde(rename = "executedQty")]
    pub executed_qty: Decimal,
    #[serde(rename = "cummulativeQuoteQty")]
    pub cumulative_quote_qty: Decimal,
    pub side: String,
}

impl BinanceOrder {
    /// Average fill price, falling back to the limit price before any fill.
    pub fn average_price(&self) -> Decimal {
        if self.executed_qty.is_zero() {
            return self.price;
        }
        self.cumulative_quote_qty / self.executed_qty
    }

    pub fn is_terminal(&self) -> bool {
        matches!(
            self.status.as_str(),
            "FILLED" | "CANCELED" | "REJECTED" | "EXPIRED" | "EXPIRED_IN_MATCH"
        )
    }
}

#[derive(Debug, Deserialize)]
pub struct BinanceApiError {
    pub code: i64,
    pub msg: String,
}

#[cfg(test)]
mod tests {
    use super::*;
    use rust_decimal_macros::dec;

    #[test]
    fn parses_depth_levels() {
        let raw = r#"{"lastUpdateId":1027024,"bids":[["4.00000000","431.00000000"]],"asks":[["4.00000200","12.00000000"]]}"#;
        let depth: BinanceDepth = serde_json::from_str(raw).unwrap();

        assert_eq!(depth.last_update_id, 1027024);
        assert_eq!(depth.bids[0], (dec!(4), dec!(431)));
        assert_eq!(depth.asks[0], (dec!(4.000002), dec!(12)));
    }

    #[test]
    fn account_holding_sums_free_and_locked() {
        let raw = r#"{"balances":[
            {"asset":"BTC","free":"0.5","locked":"0.25"},
            {"asset":"USDT","free":"1000","locked":"0"}
        ]}"#;
        let info: BinanceAccountInfo = serde_json::from_str(raw).unwrap();

        assert_eq!(info.holding("BTC"), (dec!(0.75), dec!(0.25)));
        assert_eq!(info.holding("usdt"), (dec!(1000), dec!(0)));
        assert_eq!(info.holding("ETH"), (dec!(0), dec!(0)));
    }

    #[test]
    fn order_terminal_states() {
        let raw = r#"{"orderId":7,"symbol":"BTCUSDT","status":"PARTIALLY_FILLED","clientOrderId":"abc",
                      "price":"20000.00","executedQty":"0.1","cummulativeQuoteQty":"1999.5","side":"BUY"}"#;
        let mut order: BinanceOrder = serde_json::from_str(raw).unwrap();
        assert!(!order.is_terminal());
        assert_eq!(order.average_price(), dec!(19995));
        order.status = "CANCELED".to_string();
        assert!(order.is_terminal());
    }
}
