//! Hedged long+short position lifecycle: entry, stop-loss arming and take-profit monitoring.

pub mod error;
pub mod filters;
pub mod monitor;
pub mod planner;
pub mod session;
pub mod stop_loss;
pub mod types;
pub mod waiter;

#[cfg(test)]
pub(crate) mod test_support;

pub use error::{ErrorClass, NormalizeError, SessionError};
pub use filters::{normalize, FilterNormalizer};
pub use monitor::{ExitPolicy, PositionMonitor};
pub use planner::EntryPlanner;
pub use session::{OperatorInput, SessionController, SessionSettings};
pub use stop_loss::{ArmedStops, StopLossArmer};
pub use types::{
    EntryMode, HedgeLeg, HedgedOrderPair, QuantitySpec, SessionReport, StopLossPrices,
    StopLossSpec, TakeProfitSpec, TradingIntent,
};
pub use waiter::PriceWaiter;
