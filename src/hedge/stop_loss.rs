use rust_decimal::Decimal;
use std::sync::Arc;
use tokio::time::Duration;

use super::error::SessionError;
use super::filters::FilterNormalizer;
use super::types::{HedgeLeg, HedgedOrderPair, StopLossPrices, StopLossSpec};
use super::waiter::PriceWaiter;
use crate::exchange::{ExchangeConnector, PositionSide};

#[derive(Debug, Clone, PartialEq)]
pub struct ArmedStops {
    pub breach_price: Decimal,
    pub stops: Vec<StopLossSpec>,
}

pub struct StopLossArmer {
    connector: Arc<dyn ExchangeConnector>,
    normalizer: FilterNormalizer,
    waiter: PriceWaiter,
}

impl StopLossArmer {
    pub fn new(connector: Arc<dyn ExchangeConnector>, poll_interval: Duration) -> Self {
        Self {
            normalizer: FilterNormalizer::new(connector.clone()),
            waiter: PriceWaiter::new(connector.clone(), poll_interval),
            connector,
        }
    }

    /// Fills in `entry_price` on both legs. The placement response's fill price wins;
    /// otherwise the order status is queried for its average (or, failing that, limit) price.
    pub async fn resolve_entry_prices(&self, pair: &mut HedgedOrderPair) -> Result<(), SessionError> {
        let symbol = pair.symbol.clone();
        for leg in [&mut pair.long, &mut pair.short] {
            let price = self.entry_price_for(&symbol, leg).await?;
            leg.entry_price = Some(price);
        }
        Ok(())
    }

    async fn entry_price_for(&self, symbol: &str, leg: &HedgeLeg) -> Result<Decimal, SessionError> {
        if let Some(fill) = leg.order.fill_price {
            return Ok(fill);
        }
        let status = self
            .connector
            .get_order_status(symbol, leg.order_id())
            .await?;
        let price = match status.avg_price {
            Some(avg) if avg > Decimal::ZERO => avg,
            _ => status.price,
        };
        log::debug!(
            "[STOP] {} {} entry resolved from order status: {}",
            symbol,
            leg.position_side(),
            price
        );
        Ok(price)
    }

    /// Waits until the mark breaches either threshold, then places a stop-market order for
    /// every threshold breached by that observation.
    pub async fn arm(
        &self,
        pair: &HedgedOrderPair,
        stops: StopLossPrices,
    ) -> Result<ArmedStops, SessionError> {
        let symbol = pair.symbol.as_str();
        log::info!(
            "[STOP] Setting stop loss for long position at {} and short position at {}",
            stops.long,
            stops.short
        );
        let breach_price = self
            .waiter
            .wait_until(symbol, |mark| {
                long_stop_breached(mark, &stops) || short_stop_breached(mark, &stops)
            })
            .await?;
        log::info!(
            "[STOP] Stop loss price reached at mark {}. Placing stop loss orders for {}...",
            breach_price,
            symbol
        );

        let mut placed = Vec::with_capacity(2);
        if long_stop_breached(breach_price, &stops) {
            placed.push(
                self.place_stop(pair, PositionSide::Long, stops.long)
                    .await?,
            );
        }
        if short_stop_breached(breach_price, &stops) {
            placed.push(
                self.place_stop(pair, PositionSide::Short, stops.short)
                    .await?,
            );
        }
        Ok(ArmedStops {
            breach_price,
            stops: placed,
        })
    }

    async fn place_stop(
        &self,
        pair: &HedgedOrderPair,
        position_side: PositionSide,
        stop_price: Decimal,
    ) -> Result<StopLossSpec, SessionError> {
        let symbol = pair.symbol.as_str();
        let trigger_price = self.normalizer.normalize_price(symbol, stop_price).await?;
        let side = position_side.exit_side();
        let order = self
            .connector
            .place_stop_market_order(symbol, side, pair.quantity, trigger_price, position_side)
            .await?;
        log::info!(
            "[ORDER] {} stop-market {} {} qty={} stop={} id={}",
            symbol,
            side,
            position_side,
            pair.quantity,
            trigger_price,
            order.order_id
        );
        Ok(StopLossSpec {
            side,
            position_side,
            quantity: pair.quantity,
            trigger_price,
            order_id: order.order_id,
        })
    }
}

fn long_stop_breached(mark: Decimal, stops: &StopLossPrices) -> bool {
    mark <= stops.long
}

fn short_stop_breached(mark: Decimal, stops: &StopLossPrices) -> bool {
    mark >= stops.short
}
