use async_trait::async_trait;
use std::sync::Arc;
use tokio::time::Duration;

use super::error::{ErrorClass, SessionError};
use super::monitor::{ExitPolicy, PositionMonitor};
use super::planner::EntryPlanner;
use super::stop_loss::StopLossArmer;
use super::types::{HedgedOrderPair, SessionReport, StopLossPrices, TradingIntent};
use crate::exchange::ExchangeConnector;

/// Source of operator decisions: what to trade next, and where to put the stops.
#[async_trait]
pub trait OperatorInput: Send {
    /// `None` when the operator has nothing more to trade.
    async fn next_intent(&mut self) -> anyhow::Result<Option<TradingIntent>>;

    async fn stop_loss_prices(&mut self, pair: &HedgedOrderPair) -> anyhow::Result<StopLossPrices>;
}

#[derive(Debug, Clone, Copy)]
pub struct SessionSettings {
    pub poll_interval: Duration,
    pub exit_policy: ExitPolicy,
}

impl Default for SessionSettings {
    fn default() -> Self {
        Self {
            poll_interval: Duration::from_secs(1),
            exit_policy: ExitPolicy::FirstTrigger,
        }
    }
}

pub struct SessionController<I: OperatorInput> {
    operator: I,
    planner: EntryPlanner,
    armer: StopLossArmer,
    monitor: PositionMonitor,
}

impl<I: OperatorInput> SessionController<I> {
    pub fn new(connector: Arc<dyn ExchangeConnector>, operator: I, settings: SessionSettings) -> Self {
        Self {
            operator,
            planner: EntryPlanner::new(connector.clone(), settings.poll_interval),
            armer: StopLossArmer::new(connector.clone(), settings.poll_interval),
            monitor: PositionMonitor::new(connector, settings.poll_interval, settings.exit_policy),
        }
    }

    /// Runs sessions until one completes, the operator runs out of intents, or an
    /// unclassified error aborts the run. Classified errors end only their own session.
    pub async fn run(&mut self) -> Result<Option<SessionReport>, SessionError> {
        loop {
            let intent = match self.operator.next_intent().await.map_err(SessionError::Input)? {
                Some(intent) => intent,
                None => {
                    log::info!("[SESSION] No more intents; stopping.");
                    return Ok(None);
                }
            };
            match self.run_session(&intent).await {
                Ok(report) => return Ok(Some(report)),
                Err(err) => match err.class() {
                    ErrorClass::Classified => {
                        log::error!("[SESSION] {} session ended: {}", intent.symbol, err);
                    }
                    ErrorClass::Unclassified => {
                        log::error!("[SESSION] {} aborting run: {}", intent.symbol, err);
                        return Err(err);
                    }
                },
            }
        }
    }

    pub async fn run_session(&mut self, intent: &TradingIntent) -> Result<SessionReport, SessionError> {
        log::info!(
            "[SESSION] Starting {} leverage={} quantity={:?} trigger={:?}",
            intent.symbol,
            intent.leverage,
            intent.quantity,
            intent.trigger_price
        );
        let mut pair = self.planner.enter(intent).await?;
        self.armer.resolve_entry_prices(&mut pair).await?;
        log::info!(
            "[SESSION] Long order placed at {}, short order placed at {}",
            display_price(&pair.long.entry_price),
            display_price(&pair.short.entry_price)
        );

        let stops = self
            .operator
            .stop_loss_prices(&pair)
            .await
            .map_err(SessionError::Input)?;
        let armed = self.armer.arm(&pair, stops).await?;
        let take_profits = self.monitor.run(&pair.symbol).await?;
        log::info!(
            "[SESSION] {} finished: {} stop(s), {} take-profit(s)",
            pair.symbol,
            armed.stops.len(),
            take_profits.len()
        );

        Ok(SessionReport {
            symbol: pair.symbol.clone(),
            pair,
            stop_losses: armed.stops,
            take_profits,
        })
    }
}

fn display_price(price: &Option<rust_decimal::Decimal>) -> String {
    price
        .map(|p| p.to_string())
        .unwrap_or_else(|| "unknown".to_string())
}
