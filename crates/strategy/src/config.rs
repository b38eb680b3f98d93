use serde::{Deserialize, Serialize};
use std::collections::HashMap;

use common::{Error, Result, Timeframe};

/// Top-level strategy config file (TOML).
///
/// Example `config/strategies.toml`:
/// ```toml
/// [[strategy]]
/// type = "depth"
/// name = "Goal Depth SOL"
/// pair = "SOLUSDT"
/// stake = 100.0
/// timeframe = "5m"
///
/// [strategy.params]
/// depth = 10
/// delta = 1.3
/// volume_threshold = 1000.0
/// stages = [[0.03, 0.3], [0.06, 0.3]]
/// final_target = 0.10
/// ```
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct StrategyFileConfig {
    #[serde(rename = "strategy")]
    pub strategies: Vec<StrategyConfig>,
}

#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct StrategyConfig {
    /// Strategy family: "ema_cross", "ema_stoch_rsi", "depth", "vidra" or
    /// "support_resistance".
    #[serde(rename = "type")]
    pub strategy_type: String,
    /// Human-readable name shown in logs and reports.
    pub name: String,
    /// Trading pair, e.g. "SOLUSDT".
    pub pair: String,
    /// Stake per entry in quote currency.
    pub stake: f64,
    /// Candle interval; each family has its own default.
    #[serde(default)]
    pub timeframe: Option<String>,
    /// Family-specific parameters.
    #[serde(default)]
    pub params: HashMap<String, toml::Value>,
}

impl StrategyFileConfig {
    pub fn load(path: &str) -> Result<Self> {
        let content = std::fs::read_to_string(path).map_err(|e| {
            Error::Config(format!("Failed to read strategy config at '{path}': {e}"))
        })?;
        Self::parse(&content)
            .map_err(|e| Error::Config(format!("Failed to parse strategy config at '{path}': {e}")))
    }

    pub fn parse(content: &str) -> Result<Self> {
        toml::from_str(content).map_err(|e| Error::Config(e.to_string()))
    }
}

impl StrategyConfig {
    pub fn timeframe_or(&self, default: &str) -> Result<Timeframe> {
        self.timeframe.as_deref().unwrap_or(default).parse()
    }

    pub fn has_param(&self, key: &str) -> bool {
        self.params.contains_key(key)
    }

    /// Float parameter; integers are accepted too.
    pub fn param_f64(&self, key: &str, default: f64) -> f64 {
        self.params.get(key).and_then(as_f64).unwrap_or(default)
    }

    pub fn param_opt_f64(&self, key: &str) -> Option<f64> {
        self.params.get(key).and_then(as_f64)
    }

    /// Non-negative integer parameter. Floats and negatives are rejected.
    pub fn param_usize(&self, key: &str, default: usize) -> Result<usize> {
        let Some(value) = self.params.get(key) else {
            return Ok(default);
        };
        value
            .as_integer()
            .and_then(|v| usize::try_from(v).ok())
            .ok_or_else(|| self.bad_param(key, "expected a non-negative integer"))
    }

    pub fn param_bool(&self, key: &str, default: bool) -> bool {
        self.params
            .get(key)
            .and_then(|v| v.as_bool())
            .unwrap_or(default)
    }

    pub fn param_str<'a>(&'a self, key: &str, default: &'a str) -> &'a str {
        self.params
            .get(key)
            .and_then(|v| v.as_str())
            .unwrap_or(default)
    }

    /// Array of `[a, b]` number pairs, e.g. ladder stages. Missing key is an
    /// empty list; a malformed entry is an error.
    pub fn param_pairs(&self, key: &str) -> Result<Vec<(f64, f64)>> {
        let Some(value) = self.params.get(key) else {
            return Ok(Vec::new());
        };
        let items = value
            .as_array()
            .ok_or_else(|| self.bad_param(key, "expected an array of [a, b] pairs"))?;
        items
            .iter()
            .map(|item| match item.as_array().map(Vec::as_slice) {
                Some([a, b]) => match (as_f64(a), as_f64(b)) {
                    (Some(a), Some(b)) => Ok((a, b)),
                    _ => Err(self.bad_param(key, "pair members must be numbers")),
                },
                _ => Err(self.bad_param(key, "each entry must be a two-element array")),
            })
            .collect()
    }

    /// Table of `key = number`, e.g. `minimal_roi = { "0" = 0.1 }`.
    pub fn param_table_f64(&self, key: &str) -> Result<Vec<(String, f64)>> {
        let Some(value) = self.params.get(key) else {
            return Ok(Vec::new());
        };
        let table = value
            .as_table()
            .ok_or_else(|| self.bad_param(key, "expected a table"))?;
        table
            .iter()
            .map(|(k, v)| {
                as_f64(v)
                    .map(|n| (k.clone(), n))
                    .ok_or_else(|| self.bad_param(key, "table values must be numbers"))
            })
            .collect()
    }

    /// Table of `key = [numbers...]`, e.g. per-timeframe order-book settings.
    pub fn param_table_list(&self, key: &str) -> Result<Vec<(String, Vec<f64>)>> {
        let Some(value) = self.params.get(key) else {
            return Ok(Vec::new());
        };
        let table = value
            .as_table()
            .ok_or_else(|| self.bad_param(key, "expected a table"))?;
        table
            .iter()
            .map(|(k, v)| {
                let list = v
                    .as_array()
                    .and_then(|items| items.iter().map(as_f64).collect::<Option<Vec<_>>>())
                    .ok_or_else(|| self.bad_param(key, "table values must be number arrays"))?;
                Ok((k.clone(), list))
            })
            .collect()
    }

    fn bad_param(&self, key: &str, detail: &str) -> Error {
        Error::Config(format!("strategy '{}': param '{key}': {detail}", self.name))
    }
}

fn as_f64(value: &toml::Value) -> Option<f64> {
    value
        .as_float()
        .or_else(|| value.as_integer().map(|i| i as f64))
}
