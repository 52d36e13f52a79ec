use rust_decimal::Decimal;
use serde::Deserialize;

use crate::exchange::{OrderResult, OrderSide, PositionSide};

/// How much to trade: a fixed coin amount, or a USDT notional converted at the mark price.
#[derive(Debug, Clone, Copy, PartialEq, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum QuantitySpec {
    Coins(Decimal),
    Notional(Decimal),
}

#[derive(Debug, Clone, PartialEq)]
pub struct TradingIntent {
    pub symbol: String,
    pub quantity: QuantitySpec,
    pub leverage: u32,
    pub trigger_price: Option<Decimal>,
}

impl TradingIntent {
    pub fn new(
        symbol: &str,
        quantity: QuantitySpec,
        leverage: u32,
        trigger_price: Option<Decimal>,
    ) -> Self {
        Self {
            symbol: symbol.trim().to_uppercase(),
            quantity,
            leverage,
            trigger_price,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EntryMode {
    Immediate,
    Triggered,
}

#[derive(Debug, Clone, PartialEq)]
pub struct HedgeLeg {
    pub order: OrderResult,
    pub entry_price: Option<Decimal>,
}

impl HedgeLeg {
    pub fn new(order: OrderResult) -> Self {
        Self {
            order,
            entry_price: None,
        }
    }

    pub fn order_id(&self) -> &str {
        &self.order.order_id
    }

    pub fn side(&self) -> OrderSide {
        self.order.side
    }

    pub fn position_side(&self) -> PositionSide {
        self.order.position_side
    }
}

/// Both legs of one same-price long+short entry.
#[derive(Debug, Clone, PartialEq)]
pub struct HedgedOrderPair {
    pub symbol: String,
    pub quantity: Decimal,
    pub mode: EntryMode,
    pub long: HedgeLeg,
    pub short: HedgeLeg,
}

/// Operator supplied stop-loss thresholds for one pair.
#[derive(Debug, Clone, Copy, PartialEq, Deserialize)]
pub struct StopLossPrices {
    pub long: Decimal,
    pub short: Decimal,
}

#[derive(Debug, Clone, PartialEq)]
pub struct StopLossSpec {
    pub side: OrderSide,
    pub position_side: PositionSide,
    pub quantity: Decimal,
    pub trigger_price: Decimal,
    pub order_id: String,
}

#[derive(Debug, Clone, PartialEq)]
pub struct TakeProfitSpec {
    pub side: OrderSide,
    pub position_side: PositionSide,
    pub quantity: Decimal,
    pub trigger_price: Decimal,
    pub order_id: String,
}

#[derive(Debug, Clone, PartialEq)]
pub struct SessionReport {
    pub symbol: String,
    pub pair: HedgedOrderPair,
    pub stop_losses: Vec<StopLossSpec>,
    pub take_profits: Vec<TakeProfitSpec>,
}
