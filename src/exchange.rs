//! Exchange-facing types and the connector interface used by the hedge core.

use async_trait::async_trait;
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use std::fmt;
use thiserror::Error;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum OrderSide {
    Buy,
    Sell,
}

impl OrderSide {
    pub fn as_str(&self) -> &'static str {
        match self {
            OrderSide::Buy => "BUY",
            OrderSide::Sell => "SELL",
        }
    }
}

impl fmt::Display for OrderSide {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum PositionSide {
    Long,
    Short,
}

impl PositionSide {
    pub fn as_str(&self) -> &'static str {
        match self {
            PositionSide::Long => "LONG",
            PositionSide::Short => "SHORT",
        }
    }

    /// Side of the order that opens a position on this side.
    pub fn entry_side(&self) -> OrderSide {
        match self {
            PositionSide::Long => OrderSide::Buy,
            PositionSide::Short => OrderSide::Sell,
        }
    }

    /// Side of the order that reduces a position on this side.
    pub fn exit_side(&self) -> OrderSide {
        match self {
            PositionSide::Long => OrderSide::Sell,
            PositionSide::Short => OrderSide::Buy,
        }
    }
}

impl fmt::Display for PositionSide {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl std::str::FromStr for PositionSide {
    type Err = ExchangeError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_uppercase().as_str() {
            "LONG" => Ok(PositionSide::Long),
            "SHORT" => Ok(PositionSide::Short),
            other => Err(ExchangeError::Decode(format!(
                "unexpected position side '{}'",
                other
            ))),
        }
    }
}

/// Trading-rule increments for a symbol. A filter the exchange did not report is `None`.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct SymbolFilters {
    pub step_size: Option<Decimal>,
    pub tick_size: Option<Decimal>,
}

#[derive(Debug, Clone, PartialEq)]
pub struct OrderResult {
    pub symbol: String,
    pub order_id: String,
    pub side: OrderSide,
    pub position_side: PositionSide,
    pub quantity: Decimal,
    /// Execution price reported with the placement response, if the exchange sent one.
    pub fill_price: Option<Decimal>,
}

#[derive(Debug, Clone, PartialEq)]
pub struct OrderStatus {
    pub avg_price: Option<Decimal>,
    pub price: Decimal,
}

#[derive(Debug, Clone, PartialEq)]
pub struct PositionSnapshot {
    pub position_side: PositionSide,
    pub entry_price: Decimal,
    pub mark_price: Decimal,
    /// Signed amount: positive for longs, negative for shorts, zero when flat.
    pub position_amt: Decimal,
}

#[derive(Debug, Error, Clone, PartialEq)]
pub enum ExchangeError {
    #[error("invalid symbol: {0}")]
    InvalidSymbol(String),
    #[error("order rejected ({code}): {msg}")]
    OrderRejected { code: i64, msg: String },
    #[error("insufficient margin: {0}")]
    InsufficientMargin(String),
    #[error("rate limited: {0}")]
    RateLimited(String),
    #[error("api error {code}: {msg}")]
    Api { code: i64, msg: String },
    #[error("transport error: {0}")]
    Transport(String),
    #[error("unexpected response: {0}")]
    Decode(String),
    #[error("{0}")]
    Other(String),
}

impl ExchangeError {
    /// Classified errors are answers from the trading API itself; everything else
    /// (network, decoding, local faults) is unclassified.
    pub fn is_classified(&self) -> bool {
        matches!(
            self,
            ExchangeError::InvalidSymbol(_)
                | ExchangeError::OrderRejected { .. }
                | ExchangeError::InsufficientMargin(_)
                | ExchangeError::RateLimited(_)
                | ExchangeError::Api { .. }
        )
    }

    pub fn is_rate_limit(&self) -> bool {
        matches!(self, ExchangeError::RateLimited(_))
    }
}

#[async_trait]
pub trait ExchangeConnector: Send + Sync {
    async fn lookup_symbol_filters(&self, symbol: &str) -> Result<SymbolFilters, ExchangeError>;

    async fn set_leverage(&self, symbol: &str, leverage: u32) -> Result<(), ExchangeError>;

    async fn place_market_order(
        &self,
        symbol: &str,
        side: OrderSide,
        quantity: Decimal,
        position_side: PositionSide,
    ) -> Result<OrderResult, ExchangeError>;

    async fn place_limit_order(
        &self,
        symbol: &str,
        side: OrderSide,
        quantity: Decimal,
        price: Decimal,
        position_side: PositionSide,
    ) -> Result<OrderResult, ExchangeError>;

    async fn place_stop_market_order(
        &self,
        symbol: &str,
        side: OrderSide,
        quantity: Decimal,
        stop_price: Decimal,
        position_side: PositionSide,
    ) -> Result<OrderResult, ExchangeError>;

    async fn place_take_profit_order(
        &self,
        symbol: &str,
        side: OrderSide,
        quantity: Decimal,
        stop_price: Decimal,
        position_side: PositionSide,
    ) -> Result<OrderResult, ExchangeError>;

    async fn get_mark_price(&self, symbol: &str) -> Result<Decimal, ExchangeError>;

    async fn get_order_status(
        &self,
        symbol: &str,
        order_id: &str,
    ) -> Result<OrderStatus, ExchangeError>;

    async fn get_positions(&self, symbol: &str) -> Result<Vec<PositionSnapshot>, ExchangeError>;
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn api_answers_are_classified() {
        assert!(ExchangeError::InvalidSymbol("FOO".into()).is_classified());
        assert!(ExchangeError::RateLimited("429".into()).is_classified());
        assert!(ExchangeError::Api {
            code: -1000,
            msg: "unknown".into()
        }
        .is_classified());
        assert!(!ExchangeError::Transport("timeout".into()).is_classified());
        assert!(!ExchangeError::Decode("eof".into()).is_classified());
        assert!(!ExchangeError::Other("bug".into()).is_classified());
    }

    #[test]
    fn position_side_maps_entry_and_exit_sides() {
        assert_eq!(PositionSide::Long.entry_side(), OrderSide::Buy);
        assert_eq!(PositionSide::Long.exit_side(), OrderSide::Sell);
        assert_eq!(PositionSide::Short.entry_side(), OrderSide::Sell);
        assert_eq!(PositionSide::Short.exit_side(), OrderSide::Buy);
        assert_eq!("short".parse::<PositionSide>().unwrap(), PositionSide::Short);
        assert!("BOTH".parse::<PositionSide>().is_err());
    }
}
