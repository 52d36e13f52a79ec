use rust_decimal::Decimal;
use std::sync::Arc;
use tokio::time::Duration;

use super::error::SessionError;
use super::filters::FilterNormalizer;
use super::types::{EntryMode, HedgeLeg, HedgedOrderPair, QuantitySpec, TradingIntent};
use super::waiter::PriceWaiter;
use crate::exchange::{ExchangeConnector, PositionSide};

/// Places the two same-price entry legs of a hedge, either at market right away or as
/// GTC limits once the mark price reaches the trigger.
pub struct EntryPlanner {
    connector: Arc<dyn ExchangeConnector>,
    normalizer: FilterNormalizer,
    waiter: PriceWaiter,
}

impl EntryPlanner {
    pub fn new(connector: Arc<dyn ExchangeConnector>, poll_interval: Duration) -> Self {
        Self {
            normalizer: FilterNormalizer::new(connector.clone()),
            waiter: PriceWaiter::new(connector.clone(), poll_interval),
            connector,
        }
    }

    pub fn entry_mode(intent: &TradingIntent) -> EntryMode {
        match intent.trigger_price {
            Some(_) => EntryMode::Triggered,
            None => EntryMode::Immediate,
        }
    }

    /// Raw (not yet normalized) coin quantity for the intent.
    pub async fn resolve_quantity(&self, intent: &TradingIntent) -> Result<Decimal, SessionError> {
        match intent.quantity {
            QuantitySpec::Coins(quantity) => Ok(quantity),
            QuantitySpec::Notional(notional) => {
                let mark = self.connector.get_mark_price(&intent.symbol).await?;
                if mark <= Decimal::ZERO {
                    return Err(SessionError::Invariant(format!(
                        "non-positive mark price {} for {}",
                        mark, intent.symbol
                    )));
                }
                let quantity = notional / mark;
                log::info!(
                    "[ENTRY] {} notional {} at mark {} -> quantity {}",
                    intent.symbol,
                    notional,
                    mark,
                    quantity
                );
                Ok(quantity)
            }
        }
    }

    pub async fn enter(&self, intent: &TradingIntent) -> Result<HedgedOrderPair, SessionError> {
        let raw_quantity = self.resolve_quantity(intent).await?;
        match intent.trigger_price {
            None => self.enter_immediately(intent, raw_quantity).await,
            Some(trigger) => self.enter_at_trigger(intent, raw_quantity, trigger).await,
        }
    }

    async fn enter_immediately(
        &self,
        intent: &TradingIntent,
        raw_quantity: Decimal,
    ) -> Result<HedgedOrderPair, SessionError> {
        let symbol = intent.symbol.as_str();
        let quantity = self.normalized_quantity(symbol, raw_quantity).await?;
        self.set_leverage(intent).await?;
        log::info!(
            "[ENTRY] Placing market long and short orders for {} qty={} leverage={}",
            symbol,
            quantity,
            intent.leverage
        );

        let long = self
            .place_leg(symbol, PositionSide::Long, quantity, None)
            .await?;
        let short = self
            .place_leg(symbol, PositionSide::Short, quantity, None)
            .await?;
        Ok(HedgedOrderPair {
            symbol: symbol.to_string(),
            quantity,
            mode: EntryMode::Immediate,
            long,
            short,
        })
    }

    async fn enter_at_trigger(
        &self,
        intent: &TradingIntent,
        raw_quantity: Decimal,
        trigger: Decimal,
    ) -> Result<HedgedOrderPair, SessionError> {
        let symbol = intent.symbol.as_str();
        log::info!(
            "[ENTRY] Waiting for {} to reach the limit price of {}...",
            symbol,
            trigger
        );
        let reached = self.waiter.wait_until(symbol, |mark| mark >= trigger).await?;
        log::info!("[ENTRY] Limit price reached at mark {}", reached);

        let quantity = self.normalized_quantity(symbol, raw_quantity).await?;
        let price = self.normalizer.normalize_price(symbol, trigger).await?;
        self.set_leverage(intent).await?;
        log::info!(
            "[ENTRY] Placing limit long and short orders for {} qty={} price={} leverage={}",
            symbol,
            quantity,
            price,
            intent.leverage
        );

        let long = self
            .place_leg(symbol, PositionSide::Long, quantity, Some(price))
            .await?;
        let short = self
            .place_leg(symbol, PositionSide::Short, quantity, Some(price))
            .await?;
        Ok(HedgedOrderPair {
            symbol: symbol.to_string(),
            quantity,
            mode: EntryMode::Triggered,
            long,
            short,
        })
    }

    async fn normalized_quantity(
        &self,
        symbol: &str,
        raw_quantity: Decimal,
    ) -> Result<Decimal, SessionError> {
        let quantity = self.normalizer.normalize_quantity(symbol, raw_quantity).await?;
        if quantity <= Decimal::ZERO {
            return Err(SessionError::EmptyQuantity {
                symbol: symbol.to_string(),
                raw: raw_quantity,
            });
        }
        Ok(quantity)
    }

    async fn set_leverage(&self, intent: &TradingIntent) -> Result<(), SessionError> {
        self.connector
            .set_leverage(&intent.symbol, intent.leverage)
            .await
            .map_err(|source| SessionError::Leverage {
                symbol: intent.symbol.clone(),
                leverage: intent.leverage,
                source,
            })?;
        log::debug!("[ENTRY] leverage {}x set on {}", intent.leverage, intent.symbol);
        Ok(())
    }

    /// Market order when `limit` is `None`, GTC limit otherwise.
    async fn place_leg(
        &self,
        symbol: &str,
        position_side: PositionSide,
        quantity: Decimal,
        limit: Option<Decimal>,
    ) -> Result<HedgeLeg, SessionError> {
        let side = position_side.entry_side();
        let order = match limit {
            None => {
                self.connector
                    .place_market_order(symbol, side, quantity, position_side)
                    .await?
            }
            Some(price) => {
                self.connector
                    .place_limit_order(symbol, side, quantity, price, position_side)
                    .await?
            }
        };
        match limit {
            None => log::info!(
                "[ORDER] {} market {} {} id={}",
                symbol,
                side,
                position_side,
                order.order_id
            ),
            Some(price) => log::info!(
                "[ORDER] {} limit {} {} @ {} id={}",
                symbol,
                side,
                position_side,
                price,
                order.order_id
            ),
        }
        Ok(HedgeLeg::new(order))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::exchange::{ExchangeError, OrderSide};
    use crate::hedge::test_support::{dec, Call, ScriptedConnector};

    fn planner(connector: &Arc<ScriptedConnector>) -> EntryPlanner {
        EntryPlanner::new(connector.clone(), Duration::from_secs(1))
    }

    #[tokio::test]
    async fn immediate_entry_sets_leverage_before_market_legs() {
        let connector = Arc::new(ScriptedConnector::default());
        let intent = TradingIntent::new("btcusdt", QuantitySpec::Coins(dec("1.23456789")), 20, None);
        let pair = planner(&connector).enter(&intent).await.unwrap();

        assert_eq!(pair.symbol, "BTCUSDT");
        assert_eq!(pair.quantity, dec("1.234"));
        assert_eq!(pair.mode, EntryMode::Immediate);
        assert_eq!(pair.long.side(), OrderSide::Buy);
        assert_eq!(pair.short.position_side(), PositionSide::Short);

        let calls: Vec<Call> = connector
            .calls()
            .into_iter()
            .filter(|c| !matches!(c, Call::Filters(_)))
            .collect();
        assert_eq!(
            calls,
            vec![
                Call::Leverage("BTCUSDT".into(), 20),
                Call::Market(OrderSide::Buy, dec("1.234"), PositionSide::Long),
                Call::Market(OrderSide::Sell, dec("1.234"), PositionSide::Short),
            ]
        );
    }

    #[tokio::test]
    async fn notional_is_converted_at_mark_price() {
        let connector = Arc::new(ScriptedConnector::with_marks(&["25000"]));
        let intent = TradingIntent::new("BTCUSDT", QuantitySpec::Notional(dec("1000")), 5, None);
        let planner = planner(&connector);
        assert_eq!(planner.resolve_quantity(&intent).await.unwrap(), dec("0.04"));
        let pair = planner.enter(&intent).await.unwrap();
        assert_eq!(pair.quantity, dec("0.04"));
    }

    #[tokio::test]
    async fn zero_mark_price_is_an_invariant_failure() {
        let connector = Arc::new(ScriptedConnector::with_marks(&["0"]));
        let intent = TradingIntent::new("BTCUSDT", QuantitySpec::Notional(dec("1000")), 5, None);
        let err = planner(&connector).enter(&intent).await.unwrap_err();
        assert!(matches!(err, SessionError::Invariant(_)));
        assert!(connector.order_calls().is_empty());
    }

    #[tokio::test]
    async fn leverage_failure_places_no_order() {
        let connector = Arc::new(ScriptedConnector::default());
        connector.fail(
            "leverage",
            ExchangeError::Api {
                code: -4028,
                msg: "Leverage 500 is not valid".into(),
            },
        );
        let intent = TradingIntent::new("BTCUSDT", QuantitySpec::Coins(dec("1")), 500, None);
        let err = planner(&connector).enter(&intent).await.unwrap_err();
        assert!(matches!(err, SessionError::Leverage { leverage: 500, .. }));
        assert!(connector.order_calls().is_empty());
    }

    #[tokio::test]
    async fn quantity_below_one_step_is_rejected() {
        let connector = Arc::new(ScriptedConnector::default());
        let intent = TradingIntent::new("BTCUSDT", QuantitySpec::Coins(dec("0.0004")), 10, None);
        let err = planner(&connector).enter(&intent).await.unwrap_err();
        assert!(matches!(err, SessionError::EmptyQuantity { .. }));
        assert!(!connector
            .calls()
            .iter()
            .any(|c| matches!(c, Call::Leverage(..))));
    }

    #[tokio::test]
    async fn exchange_rejection_propagates_unchanged() {
        let connector = Arc::new(ScriptedConnector::default());
        connector.fail(
            "market",
            ExchangeError::InsufficientMargin("Margin is insufficient.".into()),
        );
        let intent = TradingIntent::new("BTCUSDT", QuantitySpec::Coins(dec("1")), 10, None);
        let err = planner(&connector).enter(&intent).await.unwrap_err();
        assert!(matches!(
            err,
            SessionError::Exchange(ExchangeError::InsufficientMargin(_))
        ));
    }

    #[tokio::test(start_paused = true)]
    async fn triggered_entry_waits_then_places_gtc_limits_at_trigger() {
        let connector = Arc::new(ScriptedConnector::with_marks(&["26000", "26500", "27001"]));
        let intent = TradingIntent::new(
            "BTCUSDT",
            QuantitySpec::Coins(dec("0.5")),
            10,
            Some(dec("27000.567")),
        );
        assert_eq!(EntryPlanner::entry_mode(&intent), EntryMode::Triggered);
        let pair = planner(&connector).enter(&intent).await.unwrap();
        assert_eq!(pair.mode, EntryMode::Triggered);

        let calls = connector.calls();
        let marks = calls.iter().filter(|c| **c == Call::MarkPrice).count();
        assert_eq!(marks, 3);
        let leverage_at = calls
            .iter()
            .position(|c| matches!(c, Call::Leverage(..)))
            .unwrap();
        let first_order_at = calls.iter().position(Call::is_order).unwrap();
        assert!(leverage_at < first_order_at);
        assert_eq!(
            connector.order_calls(),
            vec![
                Call::Limit(OrderSide::Buy, dec("0.5"), dec("27000.56"), PositionSide::Long),
                Call::Limit(OrderSide::Sell, dec("0.5"), dec("27000.56"), PositionSide::Short),
            ]
        );
    }
}
