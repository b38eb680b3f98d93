use tracing::debug;

use common::{CandleType, Error, Result, Trade, TradeDirection};

use crate::config::StrategyConfig;
use crate::frame::{CandleFrame, SignalKind};
use crate::indicators::{last_defined, RsiIndicator};
use crate::orderbook::DepthMode;
use crate::strategies::{
    and, base_settings, falling, fetch_book, gated, map_mask, rising, rsi_bands, DepthGate,
    PositionPlan,
};
use crate::{Adjustment, AnalysisContext, Informative, PositionTick, Strategy, StrategySettings};

const FUNDING: &str = "funding_rate";

/// Order-book depth entries: a bid-heavy book with large resting orders,
/// rising volume and a red candle. Optional RSI and funding-rate filters,
/// optional mirrored short side.
pub struct DepthStrategy {
    cfg: StrategyConfig,
    settings: StrategySettings,
    long_gate: DepthGate,
    short_gate: Option<DepthGate>,
    rsi: Option<RsiIndicator>,
    rsi_exit: bool,
    funding: bool,
    plan: PositionPlan,
}

impl DepthStrategy {
    pub fn from_config(cfg: &StrategyConfig) -> Result<Self> {
        let plan = PositionPlan::from_config(cfg)?;
        let mut settings = base_settings(cfg, "5m", -0.03)?;
        plan.apply(&mut settings);

        let long_gate = DepthGate::from_config(cfg, "", settings.timeframe, DepthMode::BidsOverAsks)?;
        let short_gate = if cfg.param_bool("short", false) {
            let mode = match cfg.param_str("short_mode", "bids_under_asks") {
                "bids_over_asks" => DepthMode::BidsOverAsks,
                "asks_over_bids" => DepthMode::AsksOverBids,
                "bids_under_asks" => DepthMode::BidsUnderAsks,
                other => {
                    return Err(Error::Config(format!(
                        "strategy '{}': unknown short_mode '{other}'",
                        cfg.name
                    )))
                }
            };
            let mut gate = DepthGate::from_config(cfg, "short_", settings.timeframe, mode)?;
            // Fall back to the long side's depth settings when the short side has none
            if !cfg.has_param("short_depth") {
                gate.check.depth = long_gate.check.depth;
            }
            if !cfg.has_param("short_delta") {
                gate.check.delta = long_gate.check.delta;
            }
            if !cfg.has_param("short_volume_threshold") {
                gate.volume_threshold = long_gate.volume_threshold;
            }
            Some(gate)
        } else {
            None
        };

        let rsi = if cfg.has_param("rsi_period") {
            Some(rsi_bands(cfg)?)
        } else {
            None
        };

        Ok(Self {
            cfg: cfg.clone(),
            settings,
            long_gate,
            short_gate,
            rsi_exit: cfg.param_bool("rsi_exit", rsi.is_some()),
            rsi,
            funding: cfg.param_bool("funding", false),
            plan,
        })
    }

    fn funding_column(&self) -> String {
        format!("{FUNDING}_{}", self.settings.timeframe)
    }
}

impl Strategy for DepthStrategy {
    fn name(&self) -> &str {
        &self.cfg.name
    }

    fn pair(&self) -> &str {
        &self.cfg.pair
    }

    fn settings(&self) -> &StrategySettings {
        &self.settings
    }

    fn informative(&self) -> Vec<Informative> {
        if !self.funding {
            return Vec::new();
        }
        vec![Informative {
            pair: self.cfg.pair.clone(),
            timeframe: self.settings.timeframe,
            candle_type: CandleType::FundingRate,
        }]
    }

    fn populate_informative(&self, informative: &Informative, frame: &mut CandleFrame) -> Result<()> {
        if informative.candle_type == CandleType::FundingRate {
            let rate = frame.open().to_vec();
            frame.set_column(FUNDING, rate)?;
        }
        Ok(())
    }

    fn populate_indicators(&self, frame: &mut CandleFrame, _ctx: &AnalysisContext<'_>) -> Result<()> {
        if let Some(ind) = &self.rsi {
            let values = ind.series(frame.close());
            debug!(strategy = %self.cfg.name, latest = ?last_defined(&values), "RSI");
            frame.set_column("rsi", values)?;
        }
        Ok(())
    }

    fn populate_entry_trend(&self, frame: &mut CandleFrame, ctx: &AnalysisContext<'_>) -> Result<()> {
        let mut depths = vec![self.long_gate.check.depth];
        depths.extend(self.short_gate.map(|g| g.check.depth));
        let book = fetch_book(ctx, &depths)?;

        let long_ok = self.long_gate.passes(&book);
        let volume_up = rising(frame.volume());
        debug!(strategy = %self.cfg.name, long_ok, "Depth gate");

        let mut long = and(&volume_up, &falling(frame.close()));
        if let Some(ind) = &self.rsi {
            long = and(&long, &map_mask(frame.column("rsi")?, |r| ind.is_oversold(r)));
        }
        if self.funding {
            long = and(&long, &map_mask(frame.column(&self.funding_column())?, |f| f < 0.0));
        }
        frame.mark_tagged(SignalKind::EnterLong, &gated(long, long_ok), "depth")?;

        if let Some(gate) = &self.short_gate {
            let short_ok = gate.passes(&book);
            debug!(strategy = %self.cfg.name, short_ok, "Short depth gate");
            let mut short = and(&volume_up, &rising(frame.close()));
            if let Some(ind) = &self.rsi {
                short = and(&short, &map_mask(frame.column("rsi")?, |r| ind.is_overbought(r)));
            }
            if self.funding {
                short = and(&short, &map_mask(frame.column(&self.funding_column())?, |f| f > 0.0));
            }
            frame.mark_tagged(SignalKind::EnterShort, &gated(short, short_ok), "depth")?;
        }
        Ok(())
    }

    fn populate_exit_trend(&self, frame: &mut CandleFrame, _ctx: &AnalysisContext<'_>) -> Result<()> {
        let Some(ind) = self.rsi.as_ref().filter(|_| self.rsi_exit) else {
            return Ok(());
        };
        let high = map_mask(frame.column("rsi")?, |r| ind.is_overbought(r));
        frame.mark_tagged(SignalKind::ExitLong, &high, "rsi_high")?;
        if self.short_gate.is_some() {
            let low = map_mask(frame.column("rsi")?, |r| ind.is_oversold(r));
            frame.mark_tagged(SignalKind::ExitShort, &low, "rsi_low")?;
        }
        Ok(())
    }

    fn custom_stoploss(&self, trade: &mut Trade, tick: &PositionTick) -> Result<Option<f64>> {
        self.plan.stoploss(trade, tick)
    }

    fn adjust_trade_position(&self, trade: &mut Trade, tick: &PositionTick) -> Result<Option<Adjustment>> {
        self.plan.adjust(trade, tick)
    }

    fn leverage(&self, _proposed: f64, max: f64, _side: TradeDirection) -> f64 {
        self.plan.leverage(max)
    }
}
