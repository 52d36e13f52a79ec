use rust_decimal::Decimal;
use std::sync::Arc;
use tokio::time::{sleep, Duration};

use crate::exchange::{ExchangeConnector, ExchangeError};

/// Polls the mark price until a predicate holds. There is no timeout; the wait ends on
/// a matching price or on the first failed price query.
pub struct PriceWaiter {
    connector: Arc<dyn ExchangeConnector>,
    poll_interval: Duration,
}

impl PriceWaiter {
    pub fn new(connector: Arc<dyn ExchangeConnector>, poll_interval: Duration) -> Self {
        Self {
            connector,
            poll_interval,
        }
    }

    pub async fn wait_until<F>(&self, symbol: &str, predicate: F) -> Result<Decimal, ExchangeError>
    where
        F: Fn(Decimal) -> bool,
    {
        let mut polls: u64 = 0;
        loop {
            let mark = self.connector.get_mark_price(symbol).await?;
            polls += 1;
            if predicate(mark) {
                log::debug!("[WAIT] {} condition met at {} after {} polls", symbol, mark, polls);
                return Ok(mark);
            }
            log::trace!("[WAIT] {} mark {} does not satisfy condition", symbol, mark);
            sleep(self.poll_interval).await;
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::hedge::test_support::{dec, Call, ScriptedConnector};

    #[tokio::test(start_paused = true)]
    async fn returns_first_price_satisfying_predicate() {
        let connector = Arc::new(ScriptedConnector::with_marks(&["99", "99.5", "100.2", "98"]));
        let waiter = PriceWaiter::new(connector.clone(), Duration::from_secs(1));
        let limit = dec("100");
        let price = waiter.wait_until("BTCUSDT", |p| p >= limit).await.unwrap();
        assert_eq!(price, dec("100.2"));
        let polls = connector
            .calls()
            .into_iter()
            .filter(|c| *c == Call::MarkPrice)
            .count();
        assert_eq!(polls, 3);
    }

    #[tokio::test(start_paused = true)]
    async fn sleeps_one_interval_between_observations() {
        let connector = Arc::new(ScriptedConnector::with_marks(&["1", "2", "3"]));
        let waiter = PriceWaiter::new(connector, Duration::from_secs(1));
        let started = tokio::time::Instant::now();
        let price = waiter.wait_until("ETHUSDT", |p| p >= dec("3")).await.unwrap();
        assert_eq!(price, dec("3"));
        let elapsed = started.elapsed();
        assert!(elapsed >= Duration::from_secs(2) && elapsed < Duration::from_secs(3));
    }

    #[tokio::test(start_paused = true)]
    async fn propagates_price_query_errors() {
        let connector = Arc::new(ScriptedConnector::with_marks(&["1"]));
        connector.fail("mark", ExchangeError::RateLimited("429".into()));
        let waiter = PriceWaiter::new(connector, Duration::from_secs(1));
        let err = waiter.wait_until("ETHUSDT", |_| true).await.unwrap_err();
        assert!(err.is_rate_limit());
    }
}
