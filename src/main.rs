use anyhow::{anyhow, Context};
use chrono::{DateTime, FixedOffset, Utc};
use env_logger::Builder;
use hedgebot::config::HedgeBotConfig;
use hedgebot::exchange::ExchangeConnector;
use hedgebot::hedge::{OperatorInput, SessionController, SessionReport, SessionSettings};
use hedgebot::operator::{ConsoleOperator, ScriptedOperator};
use hedgebot::trade::execution::connector_box::ConnectorBox;
use log::LevelFilter;
use std::env;
use std::io::Write;
use std::str::FromStr;
use std::sync::Arc;

async fn drive<I: OperatorInput>(
    connector: Arc<dyn ExchangeConnector>,
    operator: I,
    settings: SessionSettings,
) -> anyhow::Result<()> {
    let mut controller = SessionController::new(connector, operator, settings);
    tokio::select! {
        result = controller.run() => {
            match result? {
                Some(report) => log_report(&report),
                None => log::info!("Operator input finished without a completed session."),
            }
            Ok(())
        }
        _ = tokio::signal::ctrl_c() => {
            log::warn!("Interrupted; orders already placed remain live on the exchange.");
            // A pending console read would keep the runtime from shutting down
            std::process::exit(130);
        }
    }
}

fn log_report(report: &SessionReport) {
    log::info!(
        "Session for {} complete: qty={}, {} stop-loss order(s), {} take-profit order(s)",
        report.symbol,
        report.pair.quantity,
        report.stop_losses.len(),
        report.take_profits.len()
    );
    for tp in &report.take_profits {
        log::info!(
            "  take profit {} {} qty={} at {} (id={})",
            tp.side,
            tp.position_side,
            tp.quantity,
            tp.trigger_price,
            tp.order_id
        );
    }
}

#[tokio::main(flavor = "current_thread")]
async fn main() -> anyhow::Result<()> {
    // Initialize logging with local timezone
    let offset_seconds = env::var("TIMEZONE_OFFSET")
        .unwrap_or_else(|_| "3600".to_string())
        .parse::<i32>()
        .context("Invalid TIMEZONE_OFFSET")?;
    let offset = FixedOffset::east_opt(offset_seconds).ok_or_else(|| anyhow!("Invalid offset"))?;
    Builder::from_default_env()
        .format(move |buf, record| {
            let utc_now: DateTime<Utc> = Utc::now();
            let local_now = utc_now.with_timezone(&offset);
            writeln!(
                buf,
                "{} [{}] - {}",
                local_now.format("%Y-%m-%dT%H:%M:%S%z"),
                record.level(),
                record.args()
            )
        })
        .filter(
            None,
            LevelFilter::from_str(&env::var("RUST_LOG").unwrap_or_else(|_| "info".to_string()))
                .unwrap_or(LevelFilter::Info),
        )
        .init();

    let git_hash = option_env!("HEDGEBOT_GIT_HASH").unwrap_or("unknown");
    log::info!("hedgebot git: {}", git_hash);

    let cfg = HedgeBotConfig::from_env_or_yaml().context("invalid hedgebot config")?;
    log::info!(
        "Starting hedge sessions on {} (dry_run={}, poll={}ms, exit_policy={:?})",
        cfg.exchange,
        cfg.dry_run,
        cfg.poll_interval_ms,
        cfg.exit_policy
    );
    let connector: Arc<dyn ExchangeConnector> =
        Arc::new(ConnectorBox::create(&cfg).context("failed to initialize exchange connector")?);
    let settings = cfg.session_settings();

    if cfg.sessions.is_empty() {
        drive(connector, ConsoleOperator::stdio(), settings).await
    } else {
        log::info!("Running {} scripted session(s)", cfg.sessions.len());
        drive(connector, ScriptedOperator::new(cfg.sessions.clone()), settings).await
    }
}
