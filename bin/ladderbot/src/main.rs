use std::collections::BTreeSet;
use std::sync::Arc;

use anyhow::Context;
use tracing::{error, info, warn};
use tracing_subscriber::EnvFilter;

use common::{Config, DataProvider};
use paper::{HistoryProvider, PaperHost, SqliteTradeStore};
use strategy::{StrategyFileConfig, StrategyRegistry};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // ── Logging ──────────────────────────────────────────────────────────────
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
        .init();

    // ── Config ───────────────────────────────────────────────────────────────
    let cfg = Config::from_env().context("loading environment config")?;
    let strategy_file = StrategyFileConfig::load(&cfg.strategy_config_path)
        .with_context(|| format!("loading {}", cfg.strategy_config_path))?;
    let registry = StrategyRegistry::from_config(&strategy_file).context("building strategies")?;
    info!(strategies = registry.len(), "LadderBot starting");

    // ── Market data ──────────────────────────────────────────────────────────
    let pairs: BTreeSet<&str> = registry.iter().map(|s| s.pair()).collect();
    let history = HistoryProvider::load(&cfg, pairs.iter().copied()).context("loading history")?;

    // ── Trade store ──────────────────────────────────────────────────────────
    let store = Arc::new(
        SqliteTradeStore::connect(&cfg.database_url)
            .await
            .context("opening trade store")?,
    );
    let host = PaperHost::from_config(&cfg, store);

    // ── Replay ───────────────────────────────────────────────────────────────
    let mut failures = 0usize;
    for entry in &strategy_file.strategies {
        let Some(strategy) = registry.get(&entry.name) else { continue };
        let candles = match history.candles(
            strategy.pair(),
            strategy.settings().timeframe,
            PaperHost::candle_type(strategy.as_ref()),
        ) {
            Ok(candles) => candles,
            Err(e) => {
                warn!(strategy = %entry.name, error = %e, "Skipping strategy without history");
                continue;
            }
        };

        match host.run(strategy.as_ref(), entry.stake, &candles, &history).await {
            Ok(report) => info!(
                strategy = %report.strategy,
                pair = %report.pair,
                trades = report.trade_count(),
                profit = %format!("{:.4}", report.total_profit()),
                win_rate = %format!("{:.1}%", report.win_rate() * 100.0),
                max_drawdown = %format!("{:.4}", report.max_drawdown()),
                exits = ?report.exits_by_reason(),
                callback_errors = report.callback_errors,
                "Strategy summary"
            ),
            Err(e) => {
                failures += 1;
                error!(strategy = %entry.name, error = %e, "Replay failed");
            }
        }
    }

    if failures > 0 {
        anyhow::bail!("{failures} strategy replays failed");
    }
    info!("All replays finished");
    Ok(())
}
