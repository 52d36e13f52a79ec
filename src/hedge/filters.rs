use rust_decimal::{Decimal, RoundingStrategy};
use std::sync::Arc;

use super::error::NormalizeError;
use crate::exchange::ExchangeConnector;

const NORMALIZED_DP: u32 = 8;

/// Rounds `value` down to a multiple of `increment`, truncated to 8 decimal places.
pub fn normalize(value: Decimal, increment: Decimal) -> Result<Decimal, NormalizeError> {
    if increment <= Decimal::ZERO {
        return Err(NormalizeError::InvalidIncrement(increment));
    }
    if value < Decimal::ZERO {
        return Err(NormalizeError::NegativeValue(value));
    }
    let rounded = value - (value % increment);
    Ok(rounded.round_dp_with_strategy(NORMALIZED_DP, RoundingStrategy::ToZero))
}

/// Normalizes order quantities and prices against the symbol's current filters.
/// Filters are fetched again on every call.
pub struct FilterNormalizer {
    connector: Arc<dyn ExchangeConnector>,
}

impl FilterNormalizer {
    pub fn new(connector: Arc<dyn ExchangeConnector>) -> Self {
        Self { connector }
    }

    pub async fn normalize_quantity(
        &self,
        symbol: &str,
        quantity: Decimal,
    ) -> Result<Decimal, NormalizeError> {
        let filters = self
            .connector
            .lookup_symbol_filters(symbol)
            .await
            .map_err(NormalizeError::Lookup)?;
        let step = filters.step_size.ok_or_else(|| NormalizeError::MissingFilter {
            symbol: symbol.to_string(),
            filter: "LOT_SIZE",
        })?;
        let normalized = normalize(quantity, step)?;
        log::debug!(
            "[FILTER] {} quantity {} -> {} (step {})",
            symbol,
            quantity,
            normalized,
            step
        );
        Ok(normalized)
    }

    pub async fn normalize_price(
        &self,
        symbol: &str,
        price: Decimal,
    ) -> Result<Decimal, NormalizeError> {
        let filters = self
            .connector
            .lookup_symbol_filters(symbol)
            .await
            .map_err(NormalizeError::Lookup)?;
        let tick = filters.tick_size.ok_or_else(|| NormalizeError::MissingFilter {
            symbol: symbol.to_string(),
            filter: "PRICE_FILTER",
        })?;
        let normalized = normalize(price, tick)?;
        log::debug!(
            "[FILTER] {} price {} -> {} (tick {})",
            symbol,
            price,
            normalized,
            tick
        );
        Ok(normalized)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::exchange::{ExchangeError, SymbolFilters};
    use crate::hedge::test_support::{dec, Call, ScriptedConnector};

    #[test]
    fn normalize_rounds_quantity_down_to_step() {
        assert_eq!(normalize(dec("1.23456789"), dec("0.001")).unwrap(), dec("1.234"));
    }

    #[test]
    fn normalize_rounds_price_down_to_tick() {
        assert_eq!(normalize(dec("27000.567"), dec("0.01")).unwrap(), dec("27000.56"));
    }

    #[test]
    fn normalize_is_idempotent_and_bounded() {
        let cases = [
            ("1.23456789", "0.001"),
            ("0.0023", "0.001"),
            ("27000.567", "0.01"),
            ("5", "0.5"),
            ("0.000000019", "0.00000001"),
            ("99.999", "1"),
            ("0", "0.1"),
        ];
        for (value, step) in cases {
            let (v, s) = (dec(value), dec(step));
            let once = normalize(v, s).unwrap();
            assert_eq!(normalize(once, s).unwrap(), once, "idempotent for {}", value);
            assert!(once <= v, "bounded above for {}", value);
            assert!(v - once < s, "within one step for {}", value);
            assert_eq!(once % s, Decimal::ZERO, "multiple of step for {}", value);
        }
    }

    #[test]
    fn normalize_truncates_to_eight_places() {
        let step = dec("0.000000001");
        assert_eq!(normalize(dec("0.123456789"), step).unwrap(), dec("0.12345678"));
    }

    #[test]
    fn normalize_rejects_zero_increment_and_negative_values() {
        assert!(matches!(
            normalize(dec("1"), Decimal::ZERO),
            Err(NormalizeError::InvalidIncrement(_))
        ));
        assert!(matches!(
            normalize(dec("-1"), dec("0.1")),
            Err(NormalizeError::NegativeValue(_))
        ));
    }

    #[tokio::test]
    async fn normalizer_refetches_filters_each_call() {
        let connector = Arc::new(ScriptedConnector::default());
        let normalizer = FilterNormalizer::new(connector.clone());
        let qty = normalizer
            .normalize_quantity("BTCUSDT", dec("1.23456789"))
            .await
            .unwrap();
        let price = normalizer
            .normalize_price("BTCUSDT", dec("27000.567"))
            .await
            .unwrap();
        assert_eq!(qty, dec("1.234"));
        assert_eq!(price, dec("27000.56"));
        let lookups = connector
            .calls()
            .into_iter()
            .filter(|c| matches!(c, Call::Filters(_)))
            .count();
        assert_eq!(lookups, 2);
    }

    #[tokio::test]
    async fn normalizer_reports_missing_filter() {
        let connector = Arc::new(ScriptedConnector::default());
        *connector.filters.lock().unwrap() = SymbolFilters {
            step_size: Some(dec("0.001")),
            tick_size: None,
        };
        let normalizer = FilterNormalizer::new(connector);
        let err = normalizer
            .normalize_price("BTCUSDT", dec("100"))
            .await
            .unwrap_err();
        assert!(matches!(
            err,
            NormalizeError::MissingFilter {
                filter: "PRICE_FILTER",
                ..
            }
        ));
    }

    #[tokio::test]
    async fn normalizer_wraps_lookup_failures() {
        let connector = Arc::new(ScriptedConnector::default());
        connector.fail("filters", ExchangeError::InvalidSymbol("NOPE".into()));
        let normalizer = FilterNormalizer::new(connector);
        let err = normalizer
            .normalize_quantity("NOPE", dec("1"))
            .await
            .unwrap_err();
        assert!(matches!(err, NormalizeError::Lookup(ExchangeError::InvalidSymbol(_))));
    }
}
