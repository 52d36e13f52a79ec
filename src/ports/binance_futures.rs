//! Binance USDT-M futures REST connector (hedge mode).

use async_trait::async_trait;
use hmac::{Hmac, Mac};
use reqwest::{Client, RequestBuilder};
use rust_decimal::Decimal;
use serde::de::DeserializeOwned;
use serde::Deserialize;
use sha2::Sha256;
use std::time::Duration;

use crate::config::BinanceConfig;
use crate::exchange::{
    ExchangeConnector, ExchangeError, OrderResult, OrderSide, OrderStatus, PositionSide,
    PositionSnapshot, SymbolFilters,
};

const HTTP_TIMEOUT: Duration = Duration::from_secs(10);

#[derive(Debug, Deserialize)]
struct ApiErrorBody {
    code: i64,
    msg: String,
}

#[derive(Debug, Deserialize)]
struct ExchangeInfo {
    symbols: Vec<ExchangeSymbol>,
}

#[derive(Debug, Deserialize)]
struct ExchangeSymbol {
    symbol: String,
    filters: Vec<FilterEntry>,
}

#[derive(Debug, Deserialize)]
#[serde(tag = "filterType")]
enum FilterEntry {
    #[serde(rename = "LOT_SIZE")]
    LotSize {
        #[serde(rename = "stepSize")]
        step_size: Decimal,
    },
    #[serde(rename = "PRICE_FILTER")]
    PriceFilter {
        #[serde(rename = "tickSize")]
        tick_size: Decimal,
    },
    #[serde(other)]
    Other,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct OrderResponse {
    order_id: i64,
    #[serde(default)]
    avg_price: Option<Decimal>,
    #[serde(default)]
    price: Option<Decimal>,
}

impl OrderResponse {
    /// Average execution price. Resting orders report `avgPrice` 0 and carry only their
    /// own limit `price`, which is not a fill.
    fn fill_price(&self) -> Option<Decimal> {
        self.avg_price.filter(|p| *p > Decimal::ZERO)
    }
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct PremiumIndex {
    mark_price: Decimal,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct PositionRisk {
    position_amt: Decimal,
    entry_price: Decimal,
    mark_price: Decimal,
    position_side: String,
}

#[derive(Debug, Clone, Copy)]
enum OrderKind {
    Market,
    Limit(Decimal),
    StopMarket(Decimal),
    TakeProfitMarket(Decimal),
}

impl OrderKind {
    fn params(&self) -> Vec<String> {
        match self {
            OrderKind::Market => vec![
                "type=MARKET".to_string(),
                "newOrderRespType=RESULT".to_string(),
            ],
            OrderKind::Limit(price) => vec![
                "type=LIMIT".to_string(),
                "timeInForce=GTC".to_string(),
                format!("price={}", format_decimal(*price)),
            ],
            OrderKind::StopMarket(stop) => vec![
                "type=STOP_MARKET".to_string(),
                format!("stopPrice={}", format_decimal(*stop)),
            ],
            OrderKind::TakeProfitMarket(stop) => vec![
                "type=TAKE_PROFIT_MARKET".to_string(),
                format!("stopPrice={}", format_decimal(*stop)),
            ],
        }
    }
}

/// Plain decimal text without trailing zeros, as the REST API expects.
pub fn format_decimal(value: Decimal) -> String {
    value.normalize().to_string()
}

pub fn sign(secret: &str, query: &str) -> Result<String, ExchangeError> {
    let mut mac = Hmac::<Sha256>::new_from_slice(secret.as_bytes())
        .map_err(|e| ExchangeError::Other(format!("invalid API secret: {}", e)))?;
    mac.update(query.as_bytes());
    Ok(hex::encode(mac.finalize().into_bytes()))
}

/// Maps a non-success HTTP answer to a typed error.
pub fn map_api_error(status: u16, body: &str) -> ExchangeError {
    if status == 429 || status == 418 {
        return ExchangeError::RateLimited(format!("HTTP {}: {}", status, body));
    }
    let parsed: ApiErrorBody = match serde_json::from_str(body) {
        Ok(parsed) => parsed,
        Err(_) => {
            return ExchangeError::Decode(format!("HTTP {} with body '{}'", status, body));
        }
    };
    match parsed.code {
        -1121 => ExchangeError::InvalidSymbol(parsed.msg),
        -2019 => ExchangeError::InsufficientMargin(parsed.msg),
        -1003 => ExchangeError::RateLimited(parsed.msg),
        code @ (-2010 | -2021 | -2022 | -4003 | -4164) => ExchangeError::OrderRejected {
            code,
            msg: parsed.msg,
        },
        code => ExchangeError::Api {
            code,
            msg: parsed.msg,
        },
    }
}

fn filters_for_symbol(info: ExchangeInfo, symbol: &str) -> Result<SymbolFilters, ExchangeError> {
    let entry = info
        .symbols
        .into_iter()
        .find(|s| s.symbol == symbol)
        .ok_or_else(|| ExchangeError::InvalidSymbol(symbol.to_string()))?;

    let mut filters = SymbolFilters::default();
    for filter in entry.filters {
        match filter {
            FilterEntry::LotSize { step_size } => filters.step_size = Some(step_size),
            FilterEntry::PriceFilter { tick_size } => filters.tick_size = Some(tick_size),
            FilterEntry::Other => {}
        }
    }
    Ok(filters)
}

fn positions_from_risk(rows: Vec<PositionRisk>) -> Vec<PositionSnapshot> {
    rows.into_iter()
        .filter_map(|row| match row.position_side.parse::<PositionSide>() {
            Ok(position_side) => Some(PositionSnapshot {
                position_side,
                entry_price: row.entry_price,
                mark_price: row.mark_price,
                position_amt: row.position_amt,
            }),
            Err(_) => {
                log::debug!(
                    "[ORDER] ignoring position row with side {}",
                    row.position_side
                );
                None
            }
        })
        .collect()
}

pub struct BinanceFuturesConnector {
    client: Client,
    base_url: String,
    credentials: Option<BinanceConfig>,
    recv_window_ms: u64,
}

impl BinanceFuturesConnector {
    pub fn new(
        base_url: &str,
        credentials: Option<BinanceConfig>,
        recv_window_ms: u64,
    ) -> Result<Self, ExchangeError> {
        let client = Client::builder()
            .timeout(HTTP_TIMEOUT)
            .build()
            .map_err(|e| ExchangeError::Transport(e.to_string()))?;
        Ok(Self {
            client,
            base_url: base_url.trim_end_matches('/').to_string(),
            credentials,
            recv_window_ms,
        })
    }

    fn signed_url(&self, path: &str, mut params: Vec<String>) -> Result<(String, &str), ExchangeError> {
        let credentials = self.credentials.as_ref().ok_or_else(|| {
            ExchangeError::Other(format!("{} requires API credentials", path))
        })?;
        params.push(format!("timestamp={}", chrono::Utc::now().timestamp_millis()));
        params.push(format!("recvWindow={}", self.recv_window_ms));
        let query = params.join("&");
        let signature = sign(&credentials.api_secret, &query)?;
        Ok((
            format!("{}{}?{}&signature={}", self.base_url, path, query, signature),
            credentials.api_key.as_str(),
        ))
    }

    async fn public_get<T: DeserializeOwned>(&self, path: &str, query: &str) -> Result<T, ExchangeError> {
        let url = if query.is_empty() {
            format!("{}{}", self.base_url, path)
        } else {
            format!("{}{}?{}", self.base_url, path, query)
        };
        send_json(self.client.get(&url)).await
    }

    async fn signed_get<T: DeserializeOwned>(
        &self,
        path: &str,
        params: Vec<String>,
    ) -> Result<T, ExchangeError> {
        let (url, api_key) = self.signed_url(path, params)?;
        send_json(self.client.get(&url).header("X-MBX-APIKEY", api_key)).await
    }

    async fn signed_post<T: DeserializeOwned>(
        &self,
        path: &str,
        params: Vec<String>,
    ) -> Result<T, ExchangeError> {
        let (url, api_key) = self.signed_url(path, params)?;
        send_json(self.client.post(&url).header("X-MBX-APIKEY", api_key)).await
    }

    async fn place_order(
        &self,
        symbol: &str,
        side: OrderSide,
        quantity: Decimal,
        position_side: PositionSide,
        kind: OrderKind,
    ) -> Result<OrderResult, ExchangeError> {
        let mut params = vec![
            format!("symbol={}", symbol),
            format!("side={}", side),
            format!("positionSide={}", position_side),
            format!("quantity={}", format_decimal(quantity)),
        ];
        params.extend(kind.params());

        let response: OrderResponse = self.signed_post("/fapi/v1/order", params).await?;
        let fill_price = response.fill_price();
        log::info!(
            "[ORDER] {} {:?} {} {} qty={} id={} fill={:?}",
            symbol,
            kind,
            side,
            position_side,
            quantity,
            response.order_id,
            fill_price
        );
        Ok(OrderResult {
            symbol: symbol.to_string(),
            order_id: response.order_id.to_string(),
            side,
            position_side,
            quantity,
            fill_price,
        })
    }
}

async fn send_json<T: DeserializeOwned>(builder: RequestBuilder) -> Result<T, ExchangeError> {
    let resp = builder
        .send()
        .await
        .map_err(|e| ExchangeError::Transport(e.to_string()))?;
    let status = resp.status();
    let body = resp
        .text()
        .await
        .map_err(|e| ExchangeError::Transport(e.to_string()))?;
    if !status.is_success() {
        let err = map_api_error(status.as_u16(), &body);
        log::debug!("[ORDER] binance api error: {} - {}", status, body);
        return Err(err);
    }
    serde_json::from_str(&body).map_err(|e| ExchangeError::Decode(format!("{}: {}", e, body)))
}

#[async_trait]
impl ExchangeConnector for BinanceFuturesConnector {
    async fn lookup_symbol_filters(&self, symbol: &str) -> Result<SymbolFilters, ExchangeError> {
        let info: ExchangeInfo = self.public_get("/fapi/v1/exchangeInfo", "").await?;
        filters_for_symbol(info, symbol)
    }

    async fn set_leverage(&self, symbol: &str, leverage: u32) -> Result<(), ExchangeError> {
        let _: serde_json::Value = self
            .signed_post(
                "/fapi/v1/leverage",
                vec![format!("symbol={}", symbol), format!("leverage={}", leverage)],
            )
            .await?;
        log::info!("[ORDER] {} leverage set to {}", symbol, leverage);
        Ok(())
    }

    async fn place_market_order(
        &self,
        symbol: &str,
        side: OrderSide,
        quantity: Decimal,
        position_side: PositionSide,
    ) -> Result<OrderResult, ExchangeError> {
        self.place_order(symbol, side, quantity, position_side, OrderKind::Market)
            .await
    }

    async fn place_limit_order(
        &self,
        symbol: &str,
        side: OrderSide,
        quantity: Decimal,
        price: Decimal,
        position_side: PositionSide,
    ) -> Result<OrderResult, ExchangeError> {
        self.place_order(symbol, side, quantity, position_side, OrderKind::Limit(price))
            .await
    }

    async fn place_stop_market_order(
        &self,
        symbol: &str,
        side: OrderSide,
        quantity: Decimal,
        stop_price: Decimal,
        position_side: PositionSide,
    ) -> Result<OrderResult, ExchangeError> {
        self.place_order(
            symbol,
            side,
            quantity,
            position_side,
            OrderKind::StopMarket(stop_price),
        )
        .await
    }

    async fn place_take_profit_order(
        &self,
        symbol: &str,
        side: OrderSide,
        quantity: Decimal,
        stop_price: Decimal,
        position_side: PositionSide,
    ) -> Result<OrderResult, ExchangeError> {
        self.place_order(
            symbol,
            side,
            quantity,
            position_side,
            OrderKind::TakeProfitMarket(stop_price),
        )
        .await
    }

    async fn get_mark_price(&self, symbol: &str) -> Result<Decimal, ExchangeError> {
        let index: PremiumIndex = self
            .public_get("/fapi/v1/premiumIndex", &format!("symbol={}", symbol))
            .await?;
        Ok(index.mark_price)
    }

    async fn get_order_status(
        &self,
        symbol: &str,
        order_id: &str,
    ) -> Result<OrderStatus, ExchangeError> {
        let response: OrderResponse = self
            .signed_get(
                "/fapi/v1/order",
                vec![format!("symbol={}", symbol), format!("orderId={}", order_id)],
            )
            .await?;
        Ok(OrderStatus {
            avg_price: response.avg_price,
            price: response.price.unwrap_or(Decimal::ZERO),
        })
    }

    async fn get_positions(&self, symbol: &str) -> Result<Vec<PositionSnapshot>, ExchangeError> {
        let rows: Vec<PositionRisk> = self
            .signed_get("/fapi/v2/positionRisk", vec![format!("symbol={}", symbol)])
            .await?;
        Ok(positions_from_risk(rows))
    }
}
