use async_trait::async_trait;
use rust_decimal::Decimal;
use std::sync::Arc;

use crate::config::{get_binance_config_from_env, HedgeBotConfig};
use crate::exchange::{
    ExchangeConnector, ExchangeError, OrderResult, OrderSide, OrderStatus, PositionSide,
    PositionSnapshot, SymbolFilters,
};
use crate::ports::binance_futures::BinanceFuturesConnector;
use crate::ports::paper_dex::PaperConnector;
use crate::rate_limit_notifier::notify_rate_limit;

pub struct ConnectorBox {
    pub inner: Box<dyn ExchangeConnector>,
}

impl ConnectorBox {
    pub fn new(inner: Box<dyn ExchangeConnector>) -> Self {
        Self { inner }
    }

    fn report_failure(&self, operation: &str, detail: &str, err: &ExchangeError) {
        log::warn!("[ORDER] {} failed ({}): {}", operation, detail, err);
        if err.is_rate_limit() {
            notify_rate_limit(operation, &format!("{} | {}", detail, err));
        }
    }

    fn observe<T>(
        &self,
        operation: &str,
        detail: &str,
        result: Result<T, ExchangeError>,
    ) -> Result<T, ExchangeError> {
        if let Err(ref err) = result {
            self.report_failure(operation, detail, err);
        }
        result
    }

    pub fn create(cfg: &HedgeBotConfig) -> Result<Self, ExchangeError> {
        match cfg.exchange.as_str() {
            "binance" => {
                let credentials = get_binance_config_from_env(cfg.run_mode())
                    .map_err(|e| ExchangeError::Other(e.to_string()))?;
                let binance = BinanceFuturesConnector::new(
                    &cfg.rest_endpoint,
                    credentials,
                    cfg.recv_window_ms,
                )?;
                if cfg.dry_run {
                    log::info!("[PAPER] Dry run: orders are simulated against live mark prices");
                    Ok(ConnectorBox::new(Box::new(PaperConnector::new(Arc::new(
                        binance,
                    )))))
                } else {
                    Ok(ConnectorBox::new(Box::new(binance)))
                }
            }
            other => Err(ExchangeError::Other(format!(
                "Unsupported exchange '{}'",
                other
            ))),
        }
    }
}

#[async_trait]
impl ExchangeConnector for ConnectorBox {
    async fn lookup_symbol_filters(&self, symbol: &str) -> Result<SymbolFilters, ExchangeError> {
        let result = self.inner.lookup_symbol_filters(symbol).await;
        self.observe("lookup_symbol_filters", symbol, result)
    }

    async fn set_leverage(&self, symbol: &str, leverage: u32) -> Result<(), ExchangeError> {
        let result = self.inner.set_leverage(symbol, leverage).await;
        self.observe(
            "set_leverage",
            &format!("{} | leverage={}", symbol, leverage),
            result,
        )
    }

    async fn place_market_order(
        &self,
        symbol: &str,
        side: OrderSide,
        quantity: Decimal,
        position_side: PositionSide,
    ) -> Result<OrderResult, ExchangeError> {
        let result = self
            .inner
            .place_market_order(symbol, side, quantity, position_side)
            .await;
        self.observe(
            "place_market_order",
            &format!("{} | {} {} size={}", symbol, side, position_side, quantity),
            result,
        )
    }

    async fn place_limit_order(
        &self,
        symbol: &str,
        side: OrderSide,
        quantity: Decimal,
        price: Decimal,
        position_side: PositionSide,
    ) -> Result<OrderResult, ExchangeError> {
        let result = self
            .inner
            .place_limit_order(symbol, side, quantity, price, position_side)
            .await;
        self.observe(
            "place_limit_order",
            &format!(
                "{} | {} {} size={} price={}",
                symbol, side, position_side, quantity, price
            ),
            result,
        )
    }

    async fn place_stop_market_order(
        &self,
        symbol: &str,
        side: OrderSide,
        quantity: Decimal,
        stop_price: Decimal,
        position_side: PositionSide,
    ) -> Result<OrderResult, ExchangeError> {
        let result = self
            .inner
            .place_stop_market_order(symbol, side, quantity, stop_price, position_side)
            .await;
        self.observe(
            "place_stop_market_order",
            &format!(
                "{} | {} {} size={} stop={}",
                symbol, side, position_side, quantity, stop_price
            ),
            result,
        )
    }

    async fn place_take_profit_order(
        &self,
        symbol: &str,
        side: OrderSide,
        quantity: Decimal,
        stop_price: Decimal,
        position_side: PositionSide,
    ) -> Result<OrderResult, ExchangeError> {
        let result = self
            .inner
            .place_take_profit_order(symbol, side, quantity, stop_price, position_side)
            .await;
        self.observe(
            "place_take_profit_order",
            &format!(
                "{} | {} {} size={} stop={}",
                symbol, side, position_side, quantity, stop_price
            ),
            result,
        )
    }

    async fn get_mark_price(&self, symbol: &str) -> Result<Decimal, ExchangeError> {
        let result = self.inner.get_mark_price(symbol).await;
        self.observe("get_mark_price", symbol, result)
    }

    async fn get_order_status(
        &self,
        symbol: &str,
        order_id: &str,
    ) -> Result<OrderStatus, ExchangeError> {
        let result = self.inner.get_order_status(symbol, order_id).await;
        self.observe(
            "get_order_status",
            &format!("{} | order_id={}", symbol, order_id),
            result,
        )
    }

    async fn get_positions(&self, symbol: &str) -> Result<Vec<PositionSnapshot>, ExchangeError> {
        let result = self.inner.get_positions(symbol).await;
        self.observe("get_positions", symbol, result)
    }
}
