use async_trait::async_trait;
use rust_decimal::Decimal;
use std::collections::{HashMap, VecDeque};
use std::str::FromStr;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Mutex;

use crate::exchange::{
    ExchangeConnector, ExchangeError, OrderResult, OrderSide, OrderStatus, PositionSide,
    PositionSnapshot, SymbolFilters,
};

pub fn dec(value: &str) -> Decimal {
    Decimal::from_str(value).unwrap()
}

#[derive(Debug, Clone, PartialEq)]
pub enum Call {
    Filters(String),
    Leverage(String, u32),
    Market(OrderSide, Decimal, PositionSide),
    Limit(OrderSide, Decimal, Decimal, PositionSide),
    StopMarket(OrderSide, Decimal, Decimal, PositionSide),
    TakeProfit(OrderSide, Decimal, Decimal, PositionSide),
    MarkPrice,
    OrderStatus(String),
    Positions,
}

impl Call {
    pub fn is_order(&self) -> bool {
        matches!(
            self,
            Call::Market(..) | Call::Limit(..) | Call::StopMarket(..) | Call::TakeProfit(..)
        )
    }
}

/// Connector double driven by queued answers. The last queued mark price and the last
/// queued position set repeat once the queue runs dry.
pub struct ScriptedConnector {
    pub filters: Mutex<SymbolFilters>,
    pub marks: Mutex<VecDeque<Decimal>>,
    pub positions: Mutex<VecDeque<Vec<PositionSnapshot>>>,
    pub statuses: Mutex<HashMap<String, OrderStatus>>,
    pub market_fill: Mutex<Option<Decimal>>,
    pub failures: Mutex<HashMap<&'static str, ExchangeError>>,
    pub calls: Mutex<Vec<Call>>,
    next_id: AtomicUsize,
}

impl Default for ScriptedConnector {
    fn default() -> Self {
        Self {
            filters: Mutex::new(SymbolFilters {
                step_size: Some(dec("0.001")),
                tick_size: Some(dec("0.01")),
            }),
            marks: Mutex::new(VecDeque::new()),
            positions: Mutex::new(VecDeque::new()),
            statuses: Mutex::new(HashMap::new()),
            market_fill: Mutex::new(None),
            failures: Mutex::new(HashMap::new()),
            calls: Mutex::new(Vec::new()),
            next_id: AtomicUsize::new(1),
        }
    }
}

impl ScriptedConnector {
    pub fn with_marks(marks: &[&str]) -> Self {
        let connector = Self::default();
        connector.push_marks(marks);
        connector
    }

    pub fn push_marks(&self, marks: &[&str]) {
        self.marks
            .lock()
            .unwrap()
            .extend(marks.iter().map(|m| dec(m)));
    }

    pub fn push_positions(&self, positions: Vec<PositionSnapshot>) {
        self.positions.lock().unwrap().push_back(positions);
    }

    pub fn fail(&self, operation: &'static str, err: ExchangeError) {
        self.failures.lock().unwrap().insert(operation, err);
    }

    pub fn calls(&self) -> Vec<Call> {
        self.calls.lock().unwrap().clone()
    }

    pub fn order_calls(&self) -> Vec<Call> {
        self.calls().into_iter().filter(Call::is_order).collect()
    }

    fn record(&self, operation: &'static str, call: Call) -> Result<(), ExchangeError> {
        self.calls.lock().unwrap().push(call);
        match self.failures.lock().unwrap().get(operation) {
            Some(err) => Err(err.clone()),
            None => Ok(()),
        }
    }

    fn order(
        &self,
        symbol: &str,
        side: OrderSide,
        quantity: Decimal,
        position_side: PositionSide,
        fill_price: Option<Decimal>,
    ) -> OrderResult {
        OrderResult {
            symbol: symbol.to_string(),
            order_id: format!("test-{}", self.next_id.fetch_add(1, Ordering::SeqCst)),
            side,
            position_side,
            quantity,
            fill_price,
        }
    }
}

pub fn position(side: PositionSide, entry: &str, mark: &str, amt: &str) -> PositionSnapshot {
    PositionSnapshot {
        position_side: side,
        entry_price: dec(entry),
        mark_price: dec(mark),
        position_amt: dec(amt),
    }
}

#[async_trait]
impl ExchangeConnector for ScriptedConnector {
    async fn lookup_symbol_filters(&self, symbol: &str) -> Result<SymbolFilters, ExchangeError> {
        self.record("filters", Call::Filters(symbol.to_string()))?;
        Ok(self.filters.lock().unwrap().clone())
    }

    async fn set_leverage(&self, symbol: &str, leverage: u32) -> Result<(), ExchangeError> {
        self.record("leverage", Call::Leverage(symbol.to_string(), leverage))
    }

    async fn place_market_order(
        &self,
        symbol: &str,
        side: OrderSide,
        quantity: Decimal,
        position_side: PositionSide,
    ) -> Result<OrderResult, ExchangeError> {
        self.record("market", Call::Market(side, quantity, position_side))?;
        let fill = *self.market_fill.lock().unwrap();
        Ok(self.order(symbol, side, quantity, position_side, fill))
    }

    async fn place_limit_order(
        &self,
        symbol: &str,
        side: OrderSide,
        quantity: Decimal,
        price: Decimal,
        position_side: PositionSide,
    ) -> Result<OrderResult, ExchangeError> {
        self.record("limit", Call::Limit(side, quantity, price, position_side))?;
        Ok(self.order(symbol, side, quantity, position_side, None))
    }

    async fn place_stop_market_order(
        &self,
        symbol: &str,
        side: OrderSide,
        quantity: Decimal,
        stop_price: Decimal,
        position_side: PositionSide,
    ) -> Result<OrderResult, ExchangeError> {
        self.record(
            "stop",
            Call::StopMarket(side, quantity, stop_price, position_side),
        )?;
        Ok(self.order(symbol, side, quantity, position_side, None))
    }

    async fn place_take_profit_order(
        &self,
        symbol: &str,
        side: OrderSide,
        quantity: Decimal,
        stop_price: Decimal,
        position_side: PositionSide,
    ) -> Result<OrderResult, ExchangeError> {
        self.record(
            "take_profit",
            Call::TakeProfit(side, quantity, stop_price, position_side),
        )?;
        Ok(self.order(symbol, side, quantity, position_side, None))
    }

    async fn get_mark_price(&self, _symbol: &str) -> Result<Decimal, ExchangeError> {
        self.record("mark", Call::MarkPrice)?;
        let mut marks = self.marks.lock().unwrap();
        if marks.len() > 1 {
            Ok(marks.pop_front().unwrap())
        } else {
            marks
                .front()
                .copied()
                .ok_or_else(|| ExchangeError::Other("no mark price scripted".to_string()))
        }
    }

    async fn get_order_status(
        &self,
        _symbol: &str,
        order_id: &str,
    ) -> Result<OrderStatus, ExchangeError> {
        self.record("status", Call::OrderStatus(order_id.to_string()))?;
        self.statuses
            .lock()
            .unwrap()
            .get(order_id)
            .cloned()
            .ok_or_else(|| ExchangeError::Api {
                code: -2013,
                msg: "Order does not exist.".to_string(),
            })
    }

    async fn get_positions(&self, _symbol: &str) -> Result<Vec<PositionSnapshot>, ExchangeError> {
        self.record("positions", Call::Positions)?;
        let mut positions = self.positions.lock().unwrap();
        if positions.len() > 1 {
            Ok(positions.pop_front().unwrap())
        } else {
            Ok(positions.front().cloned().unwrap_or_default())
        }
    }
}
