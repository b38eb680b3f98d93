use tracing::info;

use common::{Result, Trade};

use crate::Adjustment;

/// Take-profit step: sell `fraction` of the current stake once the excursion
/// reaches `threshold`.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Stage {
    pub threshold: f64,
    pub fraction: f64,
}

/// Averaging step: add `fraction` of the current stake once the excursion
/// falls to `level` (negative).
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct DcaLevel {
    pub level: f64,
    pub fraction: f64,
}

/// Staged take-profit with optional DCA levels and a final full exit.
///
/// Each step fires at most once per trade; the `stage_{n}_sold` and
/// `stage_{i}_bought` flags in custom data remember what was done. A call
/// returns at most one action, DCA first, then stages in order, then the
/// final target.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct StagedLadder {
    pub stages: Vec<Stage>,
    pub final_target: Option<f64>,
    pub dca: Vec<DcaLevel>,
}

impl StagedLadder {
    pub fn new(stages: Vec<Stage>, final_target: Option<f64>) -> Self {
        Self { stages, final_target, dca: Vec::new() }
    }

    pub fn with_dca(mut self, dca: Vec<DcaLevel>) -> Self {
        self.dca = dca;
        self
    }

    pub fn sold_flag(stage: usize) -> String {
        format!("stage_{stage}_sold")
    }

    pub fn bought_flag(level: usize) -> String {
        format!("stage_{level}_bought")
    }

    /// Whether the first take-profit stage has been taken.
    pub fn first_stage_sold(trade: &Trade) -> bool {
        trade.custom_data.get_bool(&Self::sold_flag(1), false)
    }

    pub fn evaluate(&self, trade: &mut Trade, current_rate: f64) -> Result<Option<Adjustment>> {
        let excursion = trade.excursion(current_rate)?;

        for (i, step) in self.dca.iter().enumerate() {
            let flag = Self::bought_flag(i);
            if excursion <= step.level && !trade.custom_data.get_bool(&flag, false) {
                let stake = trade.stake_amount * step.fraction;
                info!(trade_id = %trade.id, pair = %trade.pair, excursion, level = step.level, stake, "DCA level reached");
                trade.custom_data.set(flag, true);
                return Ok(Some(Adjustment::increase(stake, format!("dca_{i}"))));
            }
        }

        for (i, stage) in self.stages.iter().enumerate() {
            let n = i + 1;
            let flag = Self::sold_flag(n);
            if excursion >= stage.threshold && !trade.custom_data.get_bool(&flag, false) {
                let stake = trade.stake_amount * stage.fraction;
                info!(trade_id = %trade.id, pair = %trade.pair, excursion, stage = n, stake, "Take-profit stage reached");
                trade.custom_data.set(flag, true);
                return Ok(Some(Adjustment::decrease(stake, format!("stage_{n}"))));
            }
        }

        if let Some(target) = self.final_target {
            if excursion >= target {
                info!(trade_id = %trade.id, pair = %trade.pair, excursion, target, "Final target reached");
                return Ok(Some(Adjustment::decrease(trade.stake_amount, "final_target")));
            }
        }
        Ok(None)
    }
}
