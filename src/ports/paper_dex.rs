use async_trait::async_trait;
use rust_decimal::Decimal;
use std::collections::HashMap;
use std::sync::{Arc, Mutex, MutexGuard};

use crate::exchange::{
    ExchangeConnector, ExchangeError, OrderResult, OrderSide, OrderStatus, PositionSide,
    PositionSnapshot, SymbolFilters,
};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum TriggerKind {
    StopLoss,
    TakeProfit,
}

#[derive(Debug, Clone)]
struct RestingOrder {
    order_id: String,
    symbol: String,
    side: OrderSide,
    position_side: PositionSide,
    quantity: Decimal,
    stop_price: Decimal,
    kind: TriggerKind,
}

impl RestingOrder {
    fn crossed(&self, mark: Decimal) -> bool {
        let reducing_long = self.position_side == PositionSide::Long;
        match (self.kind, reducing_long) {
            (TriggerKind::StopLoss, true) | (TriggerKind::TakeProfit, false) => {
                mark <= self.stop_price
            }
            (TriggerKind::StopLoss, false) | (TriggerKind::TakeProfit, true) => {
                mark >= self.stop_price
            }
        }
    }
}

#[derive(Debug, Clone, Default)]
struct PaperPosition {
    // Unsigned size; the sign comes from the position side
    size: Decimal,
    entry_price: Decimal,
}

#[derive(Debug, Default)]
struct PaperBook {
    leverage: HashMap<String, u32>,
    positions: HashMap<(String, PositionSide), PaperPosition>,
    resting: Vec<RestingOrder>,
    orders: HashMap<String, OrderStatus>,
}

impl PaperBook {
    fn fill(
        &mut self,
        symbol: &str,
        side: OrderSide,
        position_side: PositionSide,
        quantity: Decimal,
        price: Decimal,
    ) {
        let position = self
            .positions
            .entry((symbol.to_string(), position_side))
            .or_default();
        if side == position_side.entry_side() {
            let size = position.size + quantity;
            if !size.is_zero() {
                position.entry_price =
                    (position.entry_price * position.size + price * quantity) / size;
            }
            position.size = size;
        } else {
            position.size = (position.size - quantity).max(Decimal::ZERO);
            if position.size.is_zero() {
                position.entry_price = Decimal::ZERO;
            }
        }
    }

    fn trigger_resting(&mut self, symbol: &str, mark: Decimal) {
        let (fired, pending): (Vec<RestingOrder>, Vec<RestingOrder>) = self
            .resting
            .drain(..)
            .partition(|o| o.symbol == symbol && o.crossed(mark));
        self.resting = pending;
        for order in fired {
            log::info!(
                "[PAPER] {:?} {} {} {} triggered at mark {} (stop {})",
                order.kind,
                order.symbol,
                order.side,
                order.position_side,
                mark,
                order.stop_price
            );
            self.fill(
                &order.symbol,
                order.side,
                order.position_side,
                order.quantity,
                mark,
            );
            self.orders.insert(
                order.order_id,
                OrderStatus {
                    avg_price: Some(mark),
                    price: Decimal::ZERO,
                },
            );
        }
    }
}

/// Simulated exchange for dry runs. Symbol filters and mark prices come from `market`;
/// orders, leverage and positions live in memory.
pub struct PaperConnector {
    market: Arc<dyn ExchangeConnector>,
    book: Mutex<PaperBook>,
}

impl PaperConnector {
    pub fn new(market: Arc<dyn ExchangeConnector>) -> Self {
        Self {
            market,
            book: Mutex::new(PaperBook::default()),
        }
    }

    #[cfg(test)]
    fn leverage(&self, symbol: &str) -> Option<u32> {
        self.book().ok()?.leverage.get(symbol).copied()
    }

    fn book(&self) -> Result<MutexGuard<'_, PaperBook>, ExchangeError> {
        self.book
            .lock()
            .map_err(|_| ExchangeError::Other("paper order book poisoned".to_string()))
    }

    fn new_order_id() -> String {
        format!("paper-{}", rand::random::<u64>())
    }

    fn filled(
        &self,
        symbol: &str,
        side: OrderSide,
        quantity: Decimal,
        position_side: PositionSide,
        price: Decimal,
    ) -> Result<OrderResult, ExchangeError> {
        let order_id = Self::new_order_id();
        let mut book = self.book()?;
        book.fill(symbol, side, position_side, quantity, price);
        book.orders.insert(
            order_id.clone(),
            OrderStatus {
                avg_price: Some(price),
                price,
            },
        );
        log::info!(
            "[PAPER] fill symbol={}, side={}, position_side={}, size={}, price={}",
            symbol,
            side,
            position_side,
            quantity,
            price
        );
        Ok(OrderResult {
            symbol: symbol.to_string(),
            order_id,
            side,
            position_side,
            quantity,
            fill_price: Some(price),
        })
    }

    fn rest(
        &self,
        symbol: &str,
        side: OrderSide,
        quantity: Decimal,
        stop_price: Decimal,
        position_side: PositionSide,
        kind: TriggerKind,
    ) -> Result<OrderResult, ExchangeError> {
        if stop_price <= Decimal::ZERO || quantity <= Decimal::ZERO {
            return Err(ExchangeError::OrderRejected {
                code: -4003,
                msg: "Quantity and stop price must be positive.".to_string(),
            });
        }
        let order_id = Self::new_order_id();
        let mut book = self.book()?;
        book.resting.push(RestingOrder {
            order_id: order_id.clone(),
            symbol: symbol.to_string(),
            side,
            position_side,
            quantity,
            stop_price,
            kind,
        });
        book.orders.insert(
            order_id.clone(),
            OrderStatus {
                avg_price: None,
                price: Decimal::ZERO,
            },
        );
        log::info!(
            "[PAPER] resting {:?} symbol={}, side={}, position_side={}, size={}, stop={}",
            kind,
            symbol,
            side,
            position_side,
            quantity,
            stop_price
        );
        Ok(OrderResult {
            symbol: symbol.to_string(),
            order_id,
            side,
            position_side,
            quantity,
            fill_price: None,
        })
    }
}

#[async_trait]
impl ExchangeConnector for PaperConnector {
    async fn lookup_symbol_filters(&self, symbol: &str) -> Result<SymbolFilters, ExchangeError> {
        self.market.lookup_symbol_filters(symbol).await
    }

    async fn set_leverage(&self, symbol: &str, leverage: u32) -> Result<(), ExchangeError> {
        if leverage == 0 || leverage > 125 {
            return Err(ExchangeError::Api {
                code: -4028,
                msg: format!("Leverage {} is not valid", leverage),
            });
        }
        self.book()?.leverage.insert(symbol.to_string(), leverage);
        log::info!("[PAPER] {} leverage set to {}", symbol, leverage);
        Ok(())
    }

    async fn place_market_order(
        &self,
        symbol: &str,
        side: OrderSide,
        quantity: Decimal,
        position_side: PositionSide,
    ) -> Result<OrderResult, ExchangeError> {
        let mark = self.market.get_mark_price(symbol).await?;
        self.filled(symbol, side, quantity, position_side, mark)
    }

    async fn place_limit_order(
        &self,
        symbol: &str,
        side: OrderSide,
        quantity: Decimal,
        price: Decimal,
        position_side: PositionSide,
    ) -> Result<OrderResult, ExchangeError> {
        self.filled(symbol, side, quantity, position_side, price)
    }

    async fn place_stop_market_order(
        &self,
        symbol: &str,
        side: OrderSide,
        quantity: Decimal,
        stop_price: Decimal,
        position_side: PositionSide,
    ) -> Result<OrderResult, ExchangeError> {
        self.rest(
            symbol,
            side,
            quantity,
            stop_price,
            position_side,
            TriggerKind::StopLoss,
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
        self.rest(
            symbol,
            side,
            quantity,
            stop_price,
            position_side,
            TriggerKind::TakeProfit,
        )
    }

    async fn get_mark_price(&self, symbol: &str) -> Result<Decimal, ExchangeError> {
        self.market.get_mark_price(symbol).await
    }

    async fn get_order_status(
        &self,
        _symbol: &str,
        order_id: &str,
    ) -> Result<OrderStatus, ExchangeError> {
        self.book()?
            .orders
            .get(order_id)
            .cloned()
            .ok_or_else(|| ExchangeError::Api {
                code: -2013,
                msg: "Order does not exist.".to_string(),
            })
    }

    async fn get_positions(&self, symbol: &str) -> Result<Vec<PositionSnapshot>, ExchangeError> {
        let mark = self.market.get_mark_price(symbol).await?;
        let mut book = self.book()?;
        book.trigger_resting(symbol, mark);

        let mut snapshots: Vec<PositionSnapshot> = book
            .positions
            .iter()
            .filter(|((s, _), _)| s == symbol)
            .map(|((_, side), position)| PositionSnapshot {
                position_side: *side,
                entry_price: position.entry_price,
                mark_price: mark,
                position_amt: match side {
                    PositionSide::Long => position.size,
                    PositionSide::Short => -position.size,
                },
            })
            .collect();
        snapshots.sort_by_key(|p| p.position_side != PositionSide::Long);
        Ok(snapshots)
    }
}
