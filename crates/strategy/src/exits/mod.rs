//! Position-management building blocks shared by the strategy catalog.
//!
//! Each block reads and writes its own flags in the trade's custom data and
//! returns at most one decision per call.

pub mod drawdown;
pub mod ladder;
pub mod stoploss;
pub mod targets;

pub use drawdown::DrawdownLadder;
pub use ladder::{DcaLevel, Stage, StagedLadder};
pub use stoploss::{stoploss_from_open, BreakEven, MaxRateTrail};
pub use targets::{ProfitTargets, Target};
