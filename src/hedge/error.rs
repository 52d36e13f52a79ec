use rust_decimal::Decimal;
use thiserror::Error;

use crate::exchange::ExchangeError;

#[derive(Debug, Error)]
pub enum NormalizeError {
    #[error("increment must be positive, got {0}")]
    InvalidIncrement(Decimal),
    #[error("cannot normalize negative value {0}")]
    NegativeValue(Decimal),
    #[error("{filter} filter missing for {symbol}")]
    MissingFilter {
        symbol: String,
        filter: &'static str,
    },
    #[error("filter lookup failed: {0}")]
    Lookup(#[source] ExchangeError),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorClass {
    /// Ends the current symbol session; a new session may start.
    Classified,
    /// Aborts the whole run.
    Unclassified,
}

#[derive(Debug, Error)]
pub enum SessionError {
    #[error("exchange error: {0}")]
    Exchange(#[from] ExchangeError),
    #[error("normalization failed: {0}")]
    Normalize(#[from] NormalizeError),
    #[error("failed to set leverage {leverage}x on {symbol}: {source}")]
    Leverage {
        symbol: String,
        leverage: u32,
        #[source]
        source: ExchangeError,
    },
    #[error("quantity {raw} rounds to zero on {symbol}")]
    EmptyQuantity { symbol: String, raw: Decimal },
    #[error("operator input failed: {0}")]
    Input(#[source] anyhow::Error),
    #[error("{0}")]
    Invariant(String),
}

impl SessionError {
    pub fn class(&self) -> ErrorClass {
        match self {
            SessionError::Exchange(err) if err.is_classified() => ErrorClass::Classified,
            SessionError::Exchange(_) => ErrorClass::Unclassified,
            SessionError::Normalize(_)
            | SessionError::Leverage { .. }
            | SessionError::EmptyQuantity { .. } => ErrorClass::Classified,
            SessionError::Input(_) | SessionError::Invariant(_) => ErrorClass::Unclassified,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn exchange_errors_keep_their_class() {
        let classified = SessionError::from(ExchangeError::InsufficientMargin("x".into()));
        assert_eq!(classified.class(), ErrorClass::Classified);
        let transport = SessionError::from(ExchangeError::Transport("reset".into()));
        assert_eq!(transport.class(), ErrorClass::Unclassified);
    }

    #[test]
    fn leverage_and_normalization_failures_end_the_session_only() {
        let leverage = SessionError::Leverage {
            symbol: "BTCUSDT".into(),
            leverage: 20,
            source: ExchangeError::Transport("timeout".into()),
        };
        assert_eq!(leverage.class(), ErrorClass::Classified);
        let normalize = SessionError::from(NormalizeError::InvalidIncrement(Decimal::ZERO));
        assert_eq!(normalize.class(), ErrorClass::Classified);
        let input = SessionError::Input(anyhow::anyhow!("stdin closed"));
        assert_eq!(input.class(), ErrorClass::Unclassified);
    }
}
