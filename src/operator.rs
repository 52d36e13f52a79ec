//! Operator input sources: interactive console prompts and sessions scripted in config.

use anyhow::{anyhow, Context, Result};
use async_trait::async_trait;
use rust_decimal::Decimal;
use serde::Deserialize;
use std::collections::VecDeque;
use std::num::NonZeroU32;
use std::str::FromStr;
use tokio::io::{
    AsyncBufRead, AsyncBufReadExt, AsyncWrite, AsyncWriteExt, BufReader, Stdin, Stdout,
};

use crate::hedge::{HedgedOrderPair, OperatorInput, QuantitySpec, StopLossPrices, TradingIntent};

#[derive(Debug, Clone, Deserialize)]
pub struct ScriptedSession {
    pub symbol: String,
    pub quantity: QuantitySpec,
    pub leverage: NonZeroU32,
    pub trigger_price: Option<Decimal>,
    pub long_stop_loss: Decimal,
    pub short_stop_loss: Decimal,
}

impl ScriptedSession {
    pub fn intent(&self) -> TradingIntent {
        TradingIntent::new(
            &self.symbol,
            self.quantity,
            self.leverage.get(),
            self.trigger_price,
        )
    }

    pub fn stops(&self) -> StopLossPrices {
        StopLossPrices {
            long: self.long_stop_loss,
            short: self.short_stop_loss,
        }
    }
}

/// Replays sessions from configuration, one per intent.
pub struct ScriptedOperator {
    sessions: VecDeque<ScriptedSession>,
    current: Option<StopLossPrices>,
}

impl ScriptedOperator {
    pub fn new(sessions: Vec<ScriptedSession>) -> Self {
        Self {
            sessions: sessions.into(),
            current: None,
        }
    }
}

#[async_trait]
impl OperatorInput for ScriptedOperator {
    async fn next_intent(&mut self) -> Result<Option<TradingIntent>> {
        let Some(session) = self.sessions.pop_front() else {
            return Ok(None);
        };
        self.current = Some(session.stops());
        Ok(Some(session.intent()))
    }

    async fn stop_loss_prices(&mut self, pair: &HedgedOrderPair) -> Result<StopLossPrices> {
        self.current
            .ok_or_else(|| anyhow!("no scripted stop-loss prices for {}", pair.symbol))
    }
}

/// Prompts on `output` and reads answers line by line from `input`. Invalid answers are
/// asked again; end of input while collecting an intent ends the run.
pub struct ConsoleOperator<R, W> {
    input: R,
    output: W,
}

impl ConsoleOperator<BufReader<Stdin>, Stdout> {
    pub fn stdio() -> Self {
        Self::new(BufReader::new(tokio::io::stdin()), tokio::io::stdout())
    }
}

impl<R, W> ConsoleOperator<R, W>
where
    R: AsyncBufRead + Unpin + Send,
    W: AsyncWrite + Unpin + Send,
{
    pub fn new(input: R, output: W) -> Self {
        Self { input, output }
    }

    async fn say(&mut self, text: &str) -> Result<()> {
        self.output.write_all(text.as_bytes()).await?;
        self.output.flush().await?;
        Ok(())
    }

    async fn prompt(&mut self, question: &str) -> Result<Option<String>> {
        self.say(question).await?;
        let mut line = String::new();
        let read = self
            .input
            .read_line(&mut line)
            .await
            .context("failed to read operator input")?;
        if read == 0 {
            return Ok(None);
        }
        Ok(Some(line.trim().to_string()))
    }

    async fn prompt_until<T, F>(&mut self, question: &str, accept: F) -> Result<Option<T>>
    where
        F: Fn(&str) -> Option<T>,
    {
        loop {
            let Some(answer) = self.prompt(question).await? else {
                return Ok(None);
            };
            match accept(&answer) {
                Some(value) => return Ok(Some(value)),
                None => {
                    self.say(&format!("Invalid value '{}', please try again.\n", answer))
                        .await?
                }
            }
        }
    }

    async fn prompt_price(&mut self, question: &str) -> Result<Option<Decimal>> {
        self.prompt_until(question, positive_decimal).await
    }
}

fn positive_decimal(raw: &str) -> Option<Decimal> {
    Decimal::from_str(raw).ok().filter(|v| *v > Decimal::ZERO)
}

fn yes_no(raw: &str) -> Option<bool> {
    match raw.to_lowercase().as_str() {
        "yes" | "y" => Some(true),
        "no" | "n" => Some(false),
        _ => None,
    }
}

#[async_trait]
impl<R, W> OperatorInput for ConsoleOperator<R, W>
where
    R: AsyncBufRead + Unpin + Send,
    W: AsyncWrite + Unpin + Send,
{
    async fn next_intent(&mut self) -> Result<Option<TradingIntent>> {
        let Some(symbol) = self
            .prompt_until("Enter the token symbol (e.g., BTCUSDT): ", |s| {
                (!s.is_empty() && s.chars().all(|c| c.is_ascii_alphanumeric()))
                    .then(|| s.to_uppercase())
            })
            .await?
        else {
            return Ok(None);
        };

        let use_usdt = loop {
            let Some(answer) = self
                .prompt(
                    "Do you want to trade using USDT or a specific number of coins? (usdt/coins): ",
                )
                .await?
            else {
                return Ok(None);
            };
            match answer.to_lowercase().as_str() {
                "usdt" => break true,
                "coins" => break false,
                _ => {
                    self.say("Invalid trade type. Please enter 'usdt' or 'coins'.\n")
                        .await?
                }
            }
        };

        let quantity = if use_usdt {
            match self
                .prompt_price("Enter the amount in USDT you want to trade: ")
                .await?
            {
                Some(amount) => QuantitySpec::Notional(amount),
                None => return Ok(None),
            }
        } else {
            match self
                .prompt_price("Enter the number of coins you want to trade: ")
                .await?
            {
                Some(amount) => QuantitySpec::Coins(amount),
                None => return Ok(None),
            }
        };

        let Some(leverage) = self
            .prompt_until("Enter the leverage you want to use: ", |s| {
                s.parse::<u32>().ok().filter(|l| *l > 0)
            })
            .await?
        else {
            return Ok(None);
        };

        let Some(wants_limit) = self
            .prompt_until("Do you want to place a limit order? (yes/no): ", yes_no)
            .await?
        else {
            return Ok(None);
        };

        let trigger_price = if wants_limit {
            match self.prompt_price("Enter the limit price: ").await? {
                Some(price) => Some(price),
                None => return Ok(None),
            }
        } else {
            None
        };

        Ok(Some(TradingIntent::new(
            &symbol,
            quantity,
            leverage,
            trigger_price,
        )))
    }

    async fn stop_loss_prices(&mut self, pair: &HedgedOrderPair) -> Result<StopLossPrices> {
        let long = self
            .prompt_price("Enter the stop loss price for the long position: ")
            .await?
            .ok_or_else(|| anyhow!("input closed before stop loss for {}", pair.symbol))?;
        let short = self
            .prompt_price("Enter the stop loss price for the short position: ")
            .await?
            .ok_or_else(|| anyhow!("input closed before stop loss for {}", pair.symbol))?;
        Ok(StopLossPrices { long, short })
    }
}
