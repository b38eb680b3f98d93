use std::sync::Arc;

use tracing::info;

use common::{Error, Result};

use crate::config::{StrategyConfig, StrategyFileConfig};
use crate::strategies::{
    DepthStrategy, EmaCrossStrategy, EmaStochRsiStrategy, SupportResistanceStrategy, VidraStrategy,
};
use crate::Strategy;

/// Holds all configured strategy instances.
pub struct StrategyRegistry {
    strategies: Vec<Arc<dyn Strategy>>,
}

impl StrategyRegistry {
    /// Build the registry from config. Any invalid entry fails the whole load.
    pub fn from_config(file_cfg: &StrategyFileConfig) -> Result<Self> {
        let mut strategies: Vec<Arc<dyn Strategy>> = Vec::new();

        for cfg in &file_cfg.strategies {
            if cfg.stake <= 0.0 {
                return Err(Error::Config(format!(
                    "strategy '{}': stake must be positive, got {}",
                    cfg.name, cfg.stake
                )));
            }
            if strategies.iter().any(|s| s.name() == cfg.name) {
                return Err(Error::Config(format!("duplicate strategy name '{}'", cfg.name)));
            }
            let strategy = build_strategy(cfg)?;
            info!(
                name = %strategy.name(),
                pair = %strategy.pair(),
                kind = %cfg.strategy_type,
                timeframe = %strategy.settings().timeframe,
                "Registered strategy"
            );
            strategies.push(Arc::from(strategy));
        }

        Ok(Self { strategies })
    }

    pub fn len(&self) -> usize {
        self.strategies.len()
    }

    pub fn is_empty(&self) -> bool {
        self.strategies.is_empty()
    }

    pub fn get(&self, name: &str) -> Option<Arc<dyn Strategy>> {
        self.strategies.iter().find(|s| s.name() == name).cloned()
    }

    /// Strategies trading `pair`.
    pub fn for_pair<'a>(&'a self, pair: &'a str) -> impl Iterator<Item = &'a Arc<dyn Strategy>> + 'a {
        self.strategies.iter().filter(move |s| s.pair() == pair)
    }

    pub fn iter(&self) -> impl Iterator<Item = &Arc<dyn Strategy>> {
        self.strategies.iter()
    }
}

// ─── Strategy builders ────────────────────────────────────────────────────────

pub fn build_strategy(cfg: &StrategyConfig) -> Result<Box<dyn Strategy>> {
    match cfg.strategy_type.as_str() {
        "ema_cross" => Ok(Box::new(EmaCrossStrategy::from_config(cfg)?)),
        "ema_stoch_rsi" => Ok(Box::new(EmaStochRsiStrategy::from_config(cfg)?)),
        "depth" => Ok(Box::new(DepthStrategy::from_config(cfg)?)),
        "vidra" => Ok(Box::new(VidraStrategy::from_config(cfg)?)),
        "support_resistance" => Ok(Box::new(SupportResistanceStrategy::from_config(cfg)?)),
        other => Err(Error::Config(format!(
            "strategy '{}': unknown type '{other}'",
            cfg.name
        ))),
    }
}
