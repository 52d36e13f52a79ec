use rust_decimal::Decimal;
use rust_decimal_macros::dec;
use std::collections::HashSet;
use std::sync::Arc;
use tokio::time::{sleep, Duration};

use super::error::SessionError;
use super::filters::FilterNormalizer;
use super::types::TakeProfitSpec;
use crate::exchange::{ExchangeConnector, PositionSide, PositionSnapshot};

const LONG_TAKE_PROFIT_FACTOR: Decimal = dec!(1.10);
const SHORT_TAKE_PROFIT_FACTOR: Decimal = dec!(0.90);

/// What to do once one leg crosses its take-profit threshold.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ExitPolicy {
    /// End the session on the first triggered leg. The other leg is left unmanaged.
    FirstTrigger,
    /// Keep polling until every leg that was open has been handled or closed.
    BothLegs,
}

impl std::str::FromStr for ExitPolicy {
    type Err = String;

    fn from_str(s: &str) -> std::result::Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "first_trigger" | "first" => Ok(ExitPolicy::FirstTrigger),
            "both_legs" | "both" => Ok(ExitPolicy::BothLegs),
            other => Err(format!("unknown exit policy '{}'", other)),
        }
    }
}

/// Price at which a position on `side` entered at `entry` is taken profit on.
pub fn take_profit_price(side: PositionSide, entry: Decimal) -> Decimal {
    match side {
        PositionSide::Long => entry * LONG_TAKE_PROFIT_FACTOR,
        PositionSide::Short => entry * SHORT_TAKE_PROFIT_FACTOR,
    }
}

pub fn take_profit_reached(position: &PositionSnapshot) -> bool {
    let threshold = take_profit_price(position.position_side, position.entry_price);
    match position.position_side {
        PositionSide::Long => position.mark_price >= threshold,
        PositionSide::Short => position.mark_price <= threshold,
    }
}

/// Unrealized return of the position relative to its entry price.
pub fn profit_ratio(position: &PositionSnapshot) -> Decimal {
    if position.entry_price.is_zero() {
        return Decimal::ZERO;
    }
    let change = (position.mark_price - position.entry_price) / position.entry_price;
    match position.position_side {
        PositionSide::Long => change,
        PositionSide::Short => -change,
    }
}

pub struct PositionMonitor {
    connector: Arc<dyn ExchangeConnector>,
    normalizer: FilterNormalizer,
    poll_interval: Duration,
    policy: ExitPolicy,
}

impl PositionMonitor {
    pub fn new(
        connector: Arc<dyn ExchangeConnector>,
        poll_interval: Duration,
        policy: ExitPolicy,
    ) -> Self {
        Self {
            normalizer: FilterNormalizer::new(connector.clone()),
            connector,
            poll_interval,
            policy,
        }
    }

    pub async fn run(&self, symbol: &str) -> Result<Vec<TakeProfitSpec>, SessionError> {
        log::info!("[MONITOR] Watching {} positions (policy {:?})", symbol, self.policy);
        let mut placed: Vec<TakeProfitSpec> = Vec::new();
        let mut handled: HashSet<PositionSide> = HashSet::new();
        let mut seen_open: HashSet<PositionSide> = HashSet::new();

        loop {
            let positions = self.connector.get_positions(symbol).await?;
            let mut open_now: HashSet<PositionSide> = HashSet::new();

            for position in positions.iter().filter(|p| !p.position_amt.is_zero()) {
                let side = position.position_side;
                open_now.insert(side);
                seen_open.insert(side);
                if handled.contains(&side) {
                    continue;
                }
                if position.entry_price <= Decimal::ZERO {
                    log::warn!(
                        "[MONITOR] {} {} reports entry price {}; skipping",
                        symbol,
                        side,
                        position.entry_price
                    );
                    continue;
                }
                log::debug!(
                    "[MONITOR] {} {} entry={} mark={} ratio={:.4}",
                    symbol,
                    side,
                    position.entry_price,
                    position.mark_price,
                    profit_ratio(position)
                );
                if !take_profit_reached(position) {
                    continue;
                }

                let spec = self.place_take_profit(symbol, position).await?;
                handled.insert(side);
                placed.push(spec);

                if self.policy == ExitPolicy::FirstTrigger {
                    let other = match side {
                        PositionSide::Long => PositionSide::Short,
                        PositionSide::Short => PositionSide::Long,
                    };
                    if positions
                        .iter()
                        .any(|p| p.position_side == other && !p.position_amt.is_zero())
                    {
                        log::warn!(
                            "[MONITOR] {} {} leg is still open and is no longer monitored",
                            symbol,
                            other
                        );
                    }
                    return Ok(placed);
                }
            }

            if self.policy == ExitPolicy::BothLegs && !placed.is_empty() {
                // A leg counts as done once its take-profit is placed or it is flat.
                let pending = seen_open
                    .iter()
                    .any(|side| !handled.contains(side) && open_now.contains(side));
                if !pending {
                    return Ok(placed);
                }
            }

            sleep(self.poll_interval).await;
        }
    }

    async fn place_take_profit(
        &self,
        symbol: &str,
        position: &PositionSnapshot,
    ) -> Result<TakeProfitSpec, SessionError> {
        let position_side = position.position_side;
        let side = position_side.exit_side();
        let quantity = position.position_amt.abs();
        let raw_price = take_profit_price(position_side, position.entry_price);
        let trigger_price = self.normalizer.normalize_price(symbol, raw_price).await?;
        let order = self
            .connector
            .place_take_profit_order(symbol, side, quantity, trigger_price, position_side)
            .await?;
        log::info!(
            "[MONITOR] Take profit triggered. Setting take profit at {} for remaining {} position (qty={}, id={}).",
            trigger_price,
            position_side,
            quantity,
            order.order_id
        );
        Ok(TakeProfitSpec {
            side,
            position_side,
            quantity,
            trigger_price,
            order_id: order.order_id,
        })
    }
}
