use std::sync::Arc;

use chrono::{DateTime, Utc};
use tracing::{debug, info, warn};

use common::{
    Candle, CandleType, Config, DataProvider, OrderSide, Result, Trade, TradeDirection,
};
use strategy::{
    analyze, Adjustment, AnalysisContext, CandleFrame, OrderKind, PositionTick, SignalKind, Strategy,
};

use crate::report::{BacktestReport, ClosedTrade, ExitReason, Fill};
use crate::store::TradeStore;

/// Replays a candle series through one strategy.
///
/// The frame is analysed once up front. Each row is then processed at its
/// close: stop and ROI hits are checked against the row's range, the
/// position callbacks run at the close price, and signals on the row fill
/// at that same close. One position per run, no fees. Market orders pay
/// `slippage_bps`; limit orders fill at the quoted rate.
pub struct PaperHost {
    store: Arc<dyn TradeStore>,
    slippage_bps: f64,
    max_leverage: f64,
}

/// The open position plus what the host tracks around it.
struct OpenPosition {
    trade: Trade,
    stop_rate: f64,
    stop_reason: ExitReason,
    max_stake: f64,
    realized: f64,
}

impl PaperHost {
    pub fn new(store: Arc<dyn TradeStore>, slippage_bps: f64, max_leverage: f64) -> Self {
        Self {
            store,
            slippage_bps,
            max_leverage: max_leverage.max(1.0),
        }
    }

    pub fn from_config(cfg: &Config, store: Arc<dyn TradeStore>) -> Self {
        Self::new(store, cfg.paper_slippage_bps, cfg.max_leverage)
    }

    /// Run `strategy` over `candles`, committing `stake` per entry.
    /// Informative series and order books come from `data`.
    pub async fn run(
        &self,
        strategy: &dyn Strategy,
        stake: f64,
        candles: &[Candle],
        data: &dyn DataProvider,
    ) -> Result<BacktestReport> {
        let settings = strategy.settings();
        let ctx = AnalysisContext {
            pair: strategy.pair(),
            timeframe: settings.timeframe,
            data,
        };
        let frame = analyze(strategy, candles, &ctx)?;
        info!(
            strategy = %strategy.name(),
            pair = %strategy.pair(),
            rows = frame.len(),
            "Replaying analysed frame"
        );

        let mut report = BacktestReport::new(strategy.name(), strategy.pair());
        let mut open: Option<OpenPosition> = None;

        for row in 0..frame.len() {
            let Some(candle) = frame.candle(row) else { continue };
            let now = candle.timestamp + settings.timeframe.duration();

            let mut closed_here = false;
            if let Some(mut pos) = open.take() {
                match self.manage(strategy, &mut pos, &frame, row, candle, now, &mut report).await? {
                    Some((reason, tag, rate)) => {
                        self.close(strategy, pos, reason, tag, rate, now, &mut report).await?;
                        closed_here = true;
                    }
                    None => open = Some(pos),
                }
            }

            if open.is_none() && !closed_here {
                if let Some((direction, tag)) = entry_signal(&frame, row, settings.can_short) {
                    let pos = self.enter(strategy, direction, tag, stake, candle.close, now, &mut report).await?;
                    open = Some(pos);
                }
            }
        }

        if let (Some(pos), Some(last)) = (open.take(), frame.last_candle()) {
            let now = last.timestamp + settings.timeframe.duration();
            self.close(strategy, pos, ExitReason::EndOfData, None, last.close, now, &mut report).await?;
        }

        info!(
            strategy = %report.strategy,
            trades = report.trade_count(),
            profit = report.total_profit(),
            win_rate = report.win_rate(),
            "Replay finished"
        );
        Ok(report)
    }

    /// Process one row for an open position. Returns the exit to take, if any,
    /// as `(reason, tag, rate before slippage)`.
    #[allow(clippy::too_many_arguments)]
    async fn manage(
        &self,
        strategy: &dyn Strategy,
        pos: &mut OpenPosition,
        frame: &CandleFrame,
        row: usize,
        candle: Candle,
        now: DateTime<Utc>,
        report: &mut BacktestReport,
    ) -> Result<Option<(ExitReason, Option<String>, f64)>> {
        let settings = strategy.settings();
        let short = pos.trade.is_short();
        pos.trade.observe_range(candle.low, candle.high);

        // Stop hit inside the candle; a gap through the stop fills at the open
        let stop_hit = if short {
            candle.high >= pos.stop_rate
        } else {
            candle.low <= pos.stop_rate
        };
        if stop_hit {
            let rate = if short {
                candle.open.max(pos.stop_rate)
            } else {
                candle.open.min(pos.stop_rate)
            };
            return Ok(Some((pos.stop_reason, None, rate)));
        }

        let minutes = (now - pos.trade.open_date).num_minutes().max(0) as u64;
        if let Some(roi) = settings.roi_at(minutes) {
            let move_needed = roi / pos.trade.leverage;
            let (target, reached) = if short {
                let target = pos.trade.open_rate * (1.0 - move_needed);
                (target, candle.low <= target)
            } else {
                let target = pos.trade.open_rate * (1.0 + move_needed);
                (target, candle.high >= target)
            };
            if reached {
                let rate = if short { candle.open.min(target) } else { candle.open.max(target) };
                return Ok(Some((ExitReason::Roi, None, rate)));
            }
        }

        let rate = candle.close;
        let tick = PositionTick {
            current_time: now,
            current_rate: rate,
            current_profit: pos.trade.profit_ratio(rate),
            last_candle: Some(candle),
        };

        if settings.position_adjustment {
            let result = strategy.adjust_trade_position(&mut pos.trade, &tick);
            self.persist_if_dirty(&mut pos.trade).await?;
            if let Some(action) = guarded(strategy, "adjust_trade_position", result, report) {
                if let Some(tag) = self.apply_adjustment(strategy, pos, action, rate, now, report).await? {
                    return Ok(Some((ExitReason::PositionAdjustment, tag, rate)));
                }
            }
        }

        let tick = PositionTick { current_profit: pos.trade.profit_ratio(rate), ..tick };
        let result = strategy.custom_exit(&mut pos.trade, &tick);
        self.persist_if_dirty(&mut pos.trade).await?;
        if let Some(reason) = guarded(strategy, "custom_exit", result, report) {
            return Ok(Some((ExitReason::CustomExit, Some(reason), rate)));
        }

        if settings.use_exit_signal {
            let kind = if short { SignalKind::ExitShort } else { SignalKind::ExitLong };
            let profitable = pos.trade.profit_ratio(rate) > 0.0;
            if frame.signal(kind)[row] && (!settings.exit_profit_only || profitable) {
                let tag = frame.exit_tag(row).map(str::to_string);
                return Ok(Some((ExitReason::ExitSignal, tag, rate)));
            }
        }

        self.update_stop(strategy, pos, &tick, report).await?;
        Ok(None)
    }

    /// Tighten the stop from the trailing settings and `custom_stoploss`.
    async fn update_stop(
        &self,
        strategy: &dyn Strategy,
        pos: &mut OpenPosition,
        tick: &PositionTick,
        report: &mut BacktestReport,
    ) -> Result<()> {
        let settings = strategy.settings();
        let trade = &pos.trade;
        let short = trade.is_short();

        let mut candidates: Vec<(f64, ExitReason)> = Vec::new();

        if let Some(trailing) = settings.trailing {
            let best = if short { trade.min_rate } else { trade.max_rate };
            let activated = trade.profit_ratio(best) > trailing.offset;
            if activated && trailing.positive > 0.0 {
                let price = stop_price(best, trailing.positive, trade.leverage, short);
                candidates.push((price, ExitReason::TrailingStop));
            } else if activated {
                // Zero distance pins the stop to the entry rate
                candidates.push((trade.open_rate, ExitReason::TrailingStop));
            }
            if (!activated || trailing.positive == 0.0) && !trailing.only_offset_is_reached {
                let price = stop_price(best, -settings.stoploss, trade.leverage, short);
                candidates.push((price, ExitReason::TrailingStop));
            }
        }

        if settings.use_custom_stoploss {
            let result = strategy.custom_stoploss(&mut pos.trade, tick);
            self.persist_if_dirty(&mut pos.trade).await?;
            if let Some(d) = guarded(strategy, "custom_stoploss", result, report) {
                if d.is_finite() {
                    let price = stop_price(tick.current_rate, d.abs(), pos.trade.leverage, short);
                    candidates.push((price, ExitReason::CustomStop));
                }
            }
        }

        for (price, reason) in candidates {
            let tighter = if short { price < pos.stop_rate } else { price > pos.stop_rate };
            if tighter {
                debug!(trade_id = %pos.trade.id, from = pos.stop_rate, to = price, %reason, "Stop tightened");
                pos.stop_rate = price;
                pos.stop_reason = reason;
            }
        }
        Ok(())
    }

    /// Apply an adjustment. Returns `Some(tag)` when it closes the position.
    async fn apply_adjustment(
        &self,
        strategy: &dyn Strategy,
        pos: &mut OpenPosition,
        action: Adjustment,
        rate: f64,
        now: DateTime<Utc>,
        report: &mut BacktestReport,
    ) -> Result<Option<Option<String>>> {
        let stake = action.stake();
        if !stake.is_finite() || stake <= 0.0 {
            warn!(strategy = %strategy.name(), stake, "Ignoring non-positive adjustment");
            return Ok(None);
        }
        let tag = action.tag().map(str::to_string);
        let trade = &mut pos.trade;

        match action {
            Adjustment::Decrease { .. } if stake >= trade.stake_amount * (1.0 - 1e-9) => {
                return Ok(Some(tag));
            }
            Adjustment::Decrease { .. } => {
                let side = OrderSide::exiting(trade.direction);
                let fill_rate = self.fill_rate(side, strategy.settings().order_types.exit, rate);
                let sold = trade.amount * stake / trade.stake_amount;
                pos.realized += stake * trade.profit_ratio(fill_rate);
                trade.stake_amount -= stake;
                trade.amount -= sold;
                info!(trade_id = %trade.id, stake, rate = fill_rate, tag = ?tag, "Partial exit");
                report.fills.push(Fill { trade_id: trade.id.clone(), side, rate: fill_rate, stake, tag, date: now });
            }
            Adjustment::Increase { .. } => {
                let side = OrderSide::entering(trade.direction);
                let fill_rate = self.fill_rate(side, strategy.settings().order_types.entry, rate);
                let bought = stake * trade.leverage / fill_rate;
                trade.open_rate =
                    (trade.open_rate * trade.amount + fill_rate * bought) / (trade.amount + bought);
                trade.amount += bought;
                trade.stake_amount += stake;
                pos.max_stake = pos.max_stake.max(trade.stake_amount);
                info!(trade_id = %trade.id, stake, rate = fill_rate, open_rate = trade.open_rate, tag = ?tag, "Position increased");
                report.fills.push(Fill { trade_id: trade.id.clone(), side, rate: fill_rate, stake, tag, date: now });
            }
        }
        self.store.save_trade(strategy.name(), &pos.trade).await?;
        Ok(None)
    }

    #[allow(clippy::too_many_arguments)]
    async fn enter(
        &self,
        strategy: &dyn Strategy,
        direction: TradeDirection,
        tag: Option<String>,
        stake: f64,
        rate: f64,
        now: DateTime<Utc>,
        report: &mut BacktestReport,
    ) -> Result<OpenPosition> {
        let settings = strategy.settings();
        let proposed = strategy.leverage(1.0, self.max_leverage, direction);
        let leverage = if proposed.is_finite() { proposed.clamp(1.0, self.max_leverage) } else { 1.0 };

        let side = OrderSide::entering(direction);
        let fill_rate = self.fill_rate(side, settings.order_types.entry, rate);
        let mut trade = Trade::open(strategy.pair(), direction, fill_rate, stake, leverage, now);
        trade.enter_tag = tag.clone();

        let stop_rate = stop_price(fill_rate, -settings.stoploss, leverage, direction == TradeDirection::Short);
        info!(
            strategy = %strategy.name(),
            trade_id = %trade.id,
            %direction,
            rate = fill_rate,
            stake,
            leverage,
            tag = ?tag,
            "Entered position"
        );
        self.store.save_trade(strategy.name(), &trade).await?;
        report.fills.push(Fill { trade_id: trade.id.clone(), side, rate: fill_rate, stake, tag, date: now });

        Ok(OpenPosition {
            trade,
            stop_rate,
            stop_reason: ExitReason::StopLoss,
            max_stake: stake,
            realized: 0.0,
        })
    }

    #[allow(clippy::too_many_arguments)]
    async fn close(
        &self,
        strategy: &dyn Strategy,
        mut pos: OpenPosition,
        reason: ExitReason,
        tag: Option<String>,
        rate: f64,
        now: DateTime<Utc>,
        report: &mut BacktestReport,
    ) -> Result<()> {
        let side = OrderSide::exiting(pos.trade.direction);
        let order_types = strategy.settings().order_types;
        let kind = if reason.is_stop() { order_types.stoploss } else { order_types.exit };
        let fill_rate = self.fill_rate(side, kind, rate);
        let stake = pos.trade.stake_amount;
        pos.realized += stake * pos.trade.profit_ratio(fill_rate);

        report.fills.push(Fill {
            trade_id: pos.trade.id.clone(),
            side,
            rate: fill_rate,
            stake,
            tag: tag.clone(),
            date: now,
        });
        let closed = ClosedTrade::from_trade(
            strategy.name(),
            &pos.trade,
            reason,
            tag,
            fill_rate,
            now,
            pos.max_stake,
            pos.realized,
        );
        info!(
            strategy = %strategy.name(),
            trade_id = %closed.trade_id,
            %reason,
            exit_tag = ?closed.exit_tag,
            rate = fill_rate,
            profit = closed.profit_abs,
            "Closed position"
        );
        self.store.close_trade(&closed).await?;
        report.closed.push(closed);
        Ok(())
    }

    async fn persist_if_dirty(&self, trade: &mut Trade) -> Result<()> {
        if trade.custom_data.take_dirty() {
            self.store.save_custom_data(&trade.id, &trade.custom_data).await?;
        }
        Ok(())
    }

    /// Market buys pay more, market sells receive less. Limit orders fill
    /// at `rate`.
    fn fill_rate(&self, side: OrderSide, kind: OrderKind, rate: f64) -> f64 {
        let slip = match kind {
            OrderKind::Limit => 0.0,
            OrderKind::Market => self.slippage_bps / 10_000.0,
        };
        match side {
            OrderSide::Buy => rate * (1.0 + slip),
            OrderSide::Sell => rate * (1.0 - slip),
        }
    }

    /// Series type the host asks for as the base series.
    pub fn candle_type(strategy: &dyn Strategy) -> CandleType {
        if strategy.settings().can_short {
            CandleType::Futures
        } else {
            CandleType::Spot
        }
    }
}

/// Log a failed callback and fall back to "no decision".
fn guarded<T>(
    strategy: &dyn Strategy,
    hook: &str,
    result: Result<Option<T>>,
    report: &mut BacktestReport,
) -> Option<T> {
    match result {
        Ok(value) => value,
        Err(e) => {
            warn!(strategy = %strategy.name(), hook, error = %e, "Callback failed, keeping neutral default");
            report.callback_errors += 1;
            None
        }
    }
}

/// Stop price `distance` (leveraged ratio) away from `reference`, on the
/// losing side of the position.
fn stop_price(reference: f64, distance: f64, leverage: f64, short: bool) -> f64 {
    let step = distance / leverage;
    if short {
        reference * (1.0 + step)
    } else {
        reference * (1.0 - step)
    }
}

/// Entry signalled on `row`. A row that also carries the matching exit
/// signal does not enter.
fn entry_signal(frame: &CandleFrame, row: usize, can_short: bool) -> Option<(TradeDirection, Option<String>)> {
    let tag = || frame.enter_tag(row).map(str::to_string);
    if frame.signal(SignalKind::EnterLong)[row] && !frame.signal(SignalKind::ExitLong)[row] {
        return Some((TradeDirection::Long, tag()));
    }
    if can_short && frame.signal(SignalKind::EnterShort)[row] && !frame.signal(SignalKind::ExitShort)[row] {
        return Some((TradeDirection::Short, tag()));
    }
    None
}
