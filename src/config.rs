use anyhow::{anyhow, Context, Result};
use serde::Deserialize;
use std::env;
use std::fmt;
use std::fs::File;
use std::num::ParseIntError;
use std::path::Path;
use tokio::time::Duration;

use crate::hedge::{ExitPolicy, SessionSettings};
use crate::operator::ScriptedSession;

const DEFAULT_EXCHANGE: &str = "binance";
const DEFAULT_REST_ENDPOINT: &str = "https://fapi.binance.com";
const DEFAULT_RECV_WINDOW_MS: u64 = 5_000;
const DEFAULT_POLL_INTERVAL_MS: u64 = 1_000;
const DEFAULT_EXIT_POLICY: &str = "first_trigger";

#[derive(Debug)]
pub struct BinanceConfig {
    pub api_key: String,
    pub api_secret: String,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RunMode {
    Dry,
    RealTrade,
}

#[derive(Debug)]
pub enum ConfigError {
    ParseIntError(ParseIntError),
    MissingVar(String),
}

impl fmt::Display for ConfigError {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        match self {
            ConfigError::ParseIntError(e) => write!(f, "Parse int error: {}", e),
            ConfigError::MissingVar(name) => write!(f, "{} must be set", name),
        }
    }
}

impl std::error::Error for ConfigError {}

impl From<ParseIntError> for ConfigError {
    fn from(err: ParseIntError) -> ConfigError {
        ConfigError::ParseIntError(err)
    }
}

/// API credentials. Paper trading only reads public market data, so keys are optional there.
pub fn get_binance_config_from_env(mode: RunMode) -> Result<Option<BinanceConfig>, ConfigError> {
    let api_key = env::var("BINANCE_API_KEY").ok().filter(|v| !v.trim().is_empty());
    let api_secret = env::var("BINANCE_API_SECRET")
        .ok()
        .filter(|v| !v.trim().is_empty());

    match (mode, api_key, api_secret) {
        (_, Some(api_key), Some(api_secret)) => Ok(Some(BinanceConfig {
            api_key,
            api_secret,
        })),
        (RunMode::Dry, _, _) => {
            log::info!("No Binance credentials set; paper trading uses public endpoints only");
            Ok(None)
        }
        (RunMode::RealTrade, None, _) => Err(ConfigError::MissingVar("BINANCE_API_KEY".into())),
        (RunMode::RealTrade, _, None) => {
            Err(ConfigError::MissingVar("BINANCE_API_SECRET".into()))
        }
    }
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "snake_case")]
struct HedgeBotYaml {
    exchange: Option<String>,
    rest_endpoint: Option<String>,
    dry_run: Option<bool>,
    recv_window_ms: Option<u64>,
    poll_interval_ms: Option<u64>,
    exit_policy: Option<String>,
    #[serde(default)]
    sessions: Vec<ScriptedSession>,
}

#[derive(Debug, Clone)]
pub struct HedgeBotConfig {
    pub exchange: String,
    pub rest_endpoint: String,
    pub dry_run: bool,
    pub recv_window_ms: u64,
    pub poll_interval_ms: u64,
    pub exit_policy: ExitPolicy,
    // Scripted operator input; empty means interactive console prompts
    pub sessions: Vec<ScriptedSession>,
}

impl Default for HedgeBotConfig {
    fn default() -> Self {
        Self {
            exchange: DEFAULT_EXCHANGE.to_string(),
            rest_endpoint: DEFAULT_REST_ENDPOINT.to_string(),
            dry_run: true,
            recv_window_ms: DEFAULT_RECV_WINDOW_MS,
            poll_interval_ms: DEFAULT_POLL_INTERVAL_MS,
            exit_policy: ExitPolicy::FirstTrigger,
            sessions: Vec::new(),
        }
    }
}

impl HedgeBotConfig {
    pub fn from_env_or_yaml() -> Result<Self> {
        let config_path = env::var("HEDGEBOT_CONFIG_PATH")
            .ok()
            .filter(|value| !value.trim().is_empty());
        if let Some(path) = config_path {
            return Self::from_yaml_path(path);
        }
        Self::from_env()
    }

    pub fn from_yaml_path<P: AsRef<Path>>(path: P) -> Result<Self> {
        let path_ref = path.as_ref();
        let file = File::open(path_ref)
            .with_context(|| format!("failed to open hedgebot config {}", path_ref.display()))?;
        let yaml: HedgeBotYaml = serde_yaml::from_reader(file)
            .with_context(|| format!("failed to parse hedgebot config {}", path_ref.display()))?;

        let mut cfg = Self::from_yaml(yaml)?;
        cfg.apply_overrides(|key| env::var(key).ok())?;
        Ok(cfg)
    }

    pub fn from_env() -> Result<Self> {
        let mut cfg = HedgeBotConfig::default();
        cfg.apply_overrides(|key| env::var(key).ok())?;
        Ok(cfg)
    }

    fn from_yaml(yaml: HedgeBotYaml) -> Result<Self> {
        let exit_policy = yaml
            .exit_policy
            .as_deref()
            .unwrap_or(DEFAULT_EXIT_POLICY)
            .parse::<ExitPolicy>()
            .map_err(|e| anyhow!(e))?;
        Ok(HedgeBotConfig {
            exchange: yaml
                .exchange
                .unwrap_or_else(|| DEFAULT_EXCHANGE.to_string()),
            rest_endpoint: yaml
                .rest_endpoint
                .unwrap_or_else(|| DEFAULT_REST_ENDPOINT.to_string()),
            dry_run: yaml.dry_run.unwrap_or(true),
            recv_window_ms: yaml.recv_window_ms.unwrap_or(DEFAULT_RECV_WINDOW_MS),
            poll_interval_ms: yaml.poll_interval_ms.unwrap_or(DEFAULT_POLL_INTERVAL_MS),
            exit_policy,
            sessions: yaml.sessions,
        })
    }

    fn apply_overrides<F>(&mut self, lookup: F) -> Result<()>
    where
        F: Fn(&str) -> Option<String>,
    {
        let lookup = |key: &str| lookup(key).filter(|value| !value.trim().is_empty());

        if let Some(value) = lookup("EXCHANGE") {
            self.exchange = value.trim().to_lowercase();
        }
        if let Some(value) = lookup("REST_ENDPOINT") {
            self.rest_endpoint = value;
        }
        if let Some(value) = lookup("DRY_RUN") {
            self.dry_run = value.to_lowercase() == "true";
        }
        if let Some(value) = lookup("RECV_WINDOW_MS") {
            self.recv_window_ms = value
                .parse::<u64>()
                .map_err(ConfigError::from)
                .context("RECV_WINDOW_MS")?;
        }
        if let Some(value) = lookup("POLL_INTERVAL_MS") {
            self.poll_interval_ms = value
                .parse::<u64>()
                .map_err(ConfigError::from)
                .context("POLL_INTERVAL_MS")?;
        }
        if let Some(value) = lookup("EXIT_POLICY") {
            self.exit_policy = value.parse::<ExitPolicy>().map_err(|e| anyhow!(e))?;
        }

        if self.poll_interval_ms == 0 {
            return Err(anyhow!("POLL_INTERVAL_MS must be positive"));
        }
        Ok(())
    }

    pub fn run_mode(&self) -> RunMode {
        if self.dry_run {
            RunMode::Dry
        } else {
            RunMode::RealTrade
        }
    }

    pub fn session_settings(&self) -> SessionSettings {
        SessionSettings {
            poll_interval: Duration::from_millis(self.poll_interval_ms),
            exit_policy: self.exit_policy,
        }
    }
}
