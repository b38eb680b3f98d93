use std::fmt;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use common::{OrderSide, Trade, TradeDirection};

/// Why the host closed (part of) a position.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ExitReason {
    StopLoss,
    TrailingStop,
    CustomStop,
    Roi,
    ExitSignal,
    CustomExit,
    /// A decrease that covered the whole remaining stake.
    PositionAdjustment,
    EndOfData,
}

impl ExitReason {
    pub fn as_str(&self) -> &'static str {
        match self {
            ExitReason::StopLoss => "stop_loss",
            ExitReason::TrailingStop => "trailing_stop",
            ExitReason::CustomStop => "custom_stop",
            ExitReason::Roi => "roi",
            ExitReason::ExitSignal => "exit_signal",
            ExitReason::CustomExit => "custom_exit",
            ExitReason::PositionAdjustment => "position_adjustment",
            ExitReason::EndOfData => "end_of_data",
        }
    }

    /// Static, trailing or custom stop hit.
    pub fn is_stop(&self) -> bool {
        matches!(self, ExitReason::StopLoss | ExitReason::TrailingStop | ExitReason::CustomStop)
    }
}

impl fmt::Display for ExitReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// One simulated order against a position.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Fill {
    pub trade_id: String,
    pub side: OrderSide,
    pub rate: f64,
    /// Stake moved by this fill, in quote currency.
    pub stake: f64,
    pub tag: Option<String>,
    pub date: DateTime<Utc>,
}

/// A position after its final exit.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ClosedTrade {
    pub trade_id: String,
    pub strategy: String,
    pub pair: String,
    pub direction: TradeDirection,
    pub enter_tag: Option<String>,
    pub exit_tag: Option<String>,
    pub reason: ExitReason,
    pub open_date: DateTime<Utc>,
    pub close_date: DateTime<Utc>,
    /// Average entry after any additions.
    pub open_rate: f64,
    pub close_rate: f64,
    /// Largest stake committed at any point.
    pub max_stake: f64,
    /// Realised profit over every partial and the final exit.
    pub profit_abs: f64,
}

impl ClosedTrade {
    #[allow(clippy::too_many_arguments)]
    pub fn from_trade(
        strategy: &str,
        trade: &Trade,
        reason: ExitReason,
        exit_tag: Option<String>,
        close_rate: f64,
        close_date: DateTime<Utc>,
        max_stake: f64,
        profit_abs: f64,
    ) -> Self {
        Self {
            trade_id: trade.id.clone(),
            strategy: strategy.to_string(),
            pair: trade.pair.clone(),
            direction: trade.direction,
            enter_tag: trade.enter_tag.clone(),
            exit_tag,
            reason,
            open_date: trade.open_date,
            close_date,
            open_rate: trade.open_rate,
            close_rate,
            max_stake,
            profit_abs,
        }
    }

    /// Profit relative to the largest stake committed.
    pub fn profit_ratio(&self) -> f64 {
        if self.max_stake > 0.0 {
            self.profit_abs / self.max_stake
        } else {
            0.0
        }
    }

    pub fn is_win(&self) -> bool {
        self.profit_abs > 0.0
    }
}

/// Outcome of one strategy run over a recorded series.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct BacktestReport {
    pub strategy: String,
    pub pair: String,
    pub closed: Vec<ClosedTrade>,
    pub fills: Vec<Fill>,
    /// Callbacks that failed and fell back to their neutral result.
    pub callback_errors: usize,
}

impl BacktestReport {
    pub fn new(strategy: impl Into<String>, pair: impl Into<String>) -> Self {
        Self {
            strategy: strategy.into(),
            pair: pair.into(),
            ..Self::default()
        }
    }

    pub fn trade_count(&self) -> usize {
        self.closed.len()
    }

    pub fn total_profit(&self) -> f64 {
        self.closed.iter().map(|t| t.profit_abs).sum()
    }

    pub fn win_rate(&self) -> f64 {
        if self.closed.is_empty() {
            return 0.0;
        }
        self.closed.iter().filter(|t| t.is_win()).count() as f64 / self.closed.len() as f64
    }

    /// Largest peak-to-trough fall of cumulative realised profit.
    pub fn max_drawdown(&self) -> f64 {
        let mut peak = 0.0_f64;
        let mut equity = 0.0_f64;
        let mut worst = 0.0_f64;
        for t in &self.closed {
            equity += t.profit_abs;
            peak = peak.max(equity);
            worst = worst.max(peak - equity);
        }
        worst
    }

    /// Closed-trade count per exit reason, in first-seen order.
    pub fn exits_by_reason(&self) -> Vec<(ExitReason, usize)> {
        let mut out: Vec<(ExitReason, usize)> = Vec::new();
        for t in &self.closed {
            match out.iter_mut().find(|(r, _)| *r == t.reason) {
                Some((_, n)) => *n += 1,
                None => out.push((t.reason, 1)),
            }
        }
        out
    }
}
