use crate::{Error, Result};

/// Process configuration loaded from environment variables at startup.
#[derive(Debug, Clone)]
pub struct Config {
    // Inputs
    pub candles_path: String,
    pub strategy_config_path: String,
    pub orderbook_path: Option<String>,
    pub funding_path: Option<String>,

    // Persistence
    pub database_url: String,

    // Paper host
    pub paper_slippage_bps: f64,
    pub max_leverage: f64,
}

impl Config {
    /// Load all configuration from environment variables.
    /// Loads `.env` if present.
    pub fn from_env() -> Result<Self> {
        let _ = dotenvy::dotenv(); // ignore error if .env not present

        Ok(Config {
            candles_path: required_env("CANDLES_PATH")?,
            strategy_config_path: optional_env("STRATEGY_CONFIG_PATH")
                .unwrap_or_else(|| "config/strategies.toml".to_string()),
            orderbook_path: optional_env("ORDERBOOK_PATH"),
            funding_path: optional_env("FUNDING_PATH"),
            database_url: optional_env("DATABASE_URL")
                .unwrap_or_else(|| "sqlite::memory:".to_string()),
            paper_slippage_bps: parsed_env("PAPER_SLIPPAGE_BPS", 10.0)?,
            max_leverage: parsed_env("MAX_LEVERAGE", 10.0)?,
        })
    }
}

fn required_env(key: &str) -> Result<String> {
    std::env::var(key).map_err(|_| {
        Error::Config(format!(
            "Required environment variable '{key}' is not set. Check your .env file."
        ))
    })
}

fn optional_env(key: &str) -> Option<String> {
    std::env::var(key).ok().filter(|v| !v.trim().is_empty())
}

fn parsed_env(key: &str, default: f64) -> Result<f64> {
    match optional_env(key) {
        Some(raw) => raw
            .trim()
            .parse()
            .map_err(|_| Error::Config(format!("{key} must be a number, got '{raw}'"))),
        None => Ok(default),
    }
}
