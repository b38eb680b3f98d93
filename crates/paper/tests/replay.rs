use std::sync::Arc;

use chrono::{DateTime, Duration};
use sqlx::Row;

use common::{Candle, CandleType, Error, OrderSide, Result, Trade, TradeDirection};
use paper::{ExitReason, HistoryProvider, MemoryTradeStore, PaperHost, SqliteTradeStore, TradeStore};
use strategy::exits::{DcaLevel, Stage, StagedLadder};
use strategy::{
    Adjustment, AnalysisContext, CandleFrame, Informative, OrderKind, PositionTick, SignalKind, Strategy,
    StrategySettings, TrailingStop,
};

/// Enters on fixed rows and runs an optional ladder.
struct Scripted {
    settings: StrategySettings,
    enter_rows: Vec<usize>,
    short: bool,
    ladder: Option<StagedLadder>,
    fail_adjust: bool,
}

impl Scripted {
    fn new(stoploss: f64) -> Self {
        Self {
            settings: StrategySettings::new("5m".parse().unwrap(), stoploss),
            enter_rows: vec![0],
            short: false,
            ladder: None,
            fail_adjust: false,
        }
    }

    fn short(mut self) -> Self {
        self.short = true;
        self.settings.can_short = true;
        self
    }

    fn with_ladder(mut self) -> Self {
        self.ladder = Some(StagedLadder::new(
            vec![Stage { threshold: 0.02, fraction: 0.3 }, Stage { threshold: 0.04, fraction: 0.3 }],
            Some(0.06),
        ));
        self.settings.position_adjustment = true;
        self
    }
}

impl Strategy for Scripted {
    fn name(&self) -> &str {
        "scripted"
    }

    fn pair(&self) -> &str {
        "TESTUSDT"
    }

    fn settings(&self) -> &StrategySettings {
        &self.settings
    }

    fn populate_indicators(&self, _frame: &mut CandleFrame, _ctx: &AnalysisContext<'_>) -> Result<()> {
        Ok(())
    }

    fn populate_entry_trend(&self, frame: &mut CandleFrame, _ctx: &AnalysisContext<'_>) -> Result<()> {
        let mask: Vec<bool> = (0..frame.len()).map(|i| self.enter_rows.contains(&i)).collect();
        let kind = if self.short { SignalKind::EnterShort } else { SignalKind::EnterLong };
        frame.mark_tagged(kind, &mask, "scripted")
    }

    fn populate_exit_trend(&self, _frame: &mut CandleFrame, _ctx: &AnalysisContext<'_>) -> Result<()> {
        Ok(())
    }

    fn adjust_trade_position(&self, trade: &mut Trade, tick: &PositionTick) -> Result<Option<Adjustment>> {
        if self.fail_adjust {
            return Err(Error::Other("boom".into()));
        }
        match &self.ladder {
            Some(ladder) => ladder.evaluate(trade, tick.current_rate),
            None => Ok(None),
        }
    }
}

/// Enters long once the merged 15m close reaches `threshold`.
struct QuarterHourBreakout {
    settings: StrategySettings,
    threshold: f64,
}

impl Strategy for QuarterHourBreakout {
    fn name(&self) -> &str {
        "quarter_hour_breakout"
    }

    fn pair(&self) -> &str {
        "TESTUSDT"
    }

    fn settings(&self) -> &StrategySettings {
        &self.settings
    }

    fn informative(&self) -> Vec<Informative> {
        vec![Informative {
            pair: "TESTUSDT".into(),
            timeframe: "15m".parse().unwrap(),
            candle_type: CandleType::Spot,
        }]
    }

    fn populate_indicators(&self, _frame: &mut CandleFrame, _ctx: &AnalysisContext<'_>) -> Result<()> {
        Ok(())
    }

    fn populate_entry_trend(&self, frame: &mut CandleFrame, _ctx: &AnalysisContext<'_>) -> Result<()> {
        let mask: Vec<bool> = frame.column("close_15m")?.iter().map(|c| *c >= self.threshold).collect();
        frame.mark_tagged(SignalKind::EnterLong, &mask, "breakout")
    }

    fn populate_exit_trend(&self, _frame: &mut CandleFrame, _ctx: &AnalysisContext<'_>) -> Result<()> {
        Ok(())
    }
}

/// `(open, high, low, close)` rows, five minutes apart.
fn bars(rows: &[(f64, f64, f64, f64)]) -> Vec<Candle> {
    let start = DateTime::from_timestamp(1_700_000_000 - 1_700_000_000 % 300, 0).unwrap();
    rows.iter()
        .enumerate()
        .map(|(i, &(open, high, low, close))| Candle {
            timestamp: start + Duration::minutes(5 * i as i64),
            open,
            high,
            low,
            close,
            volume: 1.0,
        })
        .collect()
}

fn flat(closes: &[f64]) -> Vec<Candle> {
    bars(&closes.iter().map(|&c| (c, c, c, c)).collect::<Vec<_>>())
}

fn approx(a: f64, b: f64) -> bool {
    (a - b).abs() < 1e-9
}

#[tokio::test]
async fn staged_exits_then_final_target() {
    let store = Arc::new(MemoryTradeStore::new());
    let host = PaperHost::new(store.clone(), 0.0, 10.0);
    let strategy = Scripted::new(-0.5).with_ladder();
    let candles = flat(&[100.0, 101.0, 102.5, 104.5, 106.5, 107.0]);

    let report = host.run(&strategy, 100.0, &candles, &HistoryProvider::new()).await.unwrap();

    assert_eq!(report.trade_count(), 1);
    let closed = &report.closed[0];
    assert_eq!(closed.reason, ExitReason::PositionAdjustment);
    assert_eq!(closed.exit_tag.as_deref(), Some("final_target"));
    assert_eq!(closed.enter_tag.as_deref(), Some("scripted"));
    // 30 @ +2.5%, 21 @ +4.5%, remaining 49 @ +6.5%
    assert!(approx(closed.profit_abs, 30.0 * 0.025 + 21.0 * 0.045 + 49.0 * 0.065));
    assert_eq!(report.fills.len(), 4);
    assert_eq!(report.fills[1].tag.as_deref(), Some("stage_1"));
    assert_eq!(report.fills[2].tag.as_deref(), Some("stage_2"));

    let data = store.load_custom_data(&closed.trade_id).await.unwrap();
    assert!(data.get_bool("stage_1_sold", false));
    assert!(data.get_bool("stage_2_sold", false));
    assert_eq!(store.closed_trades().await.len(), 1);
    assert!(store.open_trades().await.is_empty());
}

#[tokio::test]
async fn static_stop_fills_at_stop_price() {
    let host = PaperHost::new(Arc::new(MemoryTradeStore::new()), 0.0, 10.0);
    let strategy = Scripted::new(-0.05);
    let candles = bars(&[
        (100.0, 100.0, 100.0, 100.0),
        (100.0, 100.0, 99.0, 99.0),
        (99.0, 99.0, 97.0, 97.0),
        (96.0, 96.0, 94.0, 95.0),
        (95.0, 95.0, 95.0, 95.0),
    ]);

    let report = host.run(&strategy, 100.0, &candles, &HistoryProvider::new()).await.unwrap();

    assert_eq!(report.trade_count(), 1);
    let closed = &report.closed[0];
    assert_eq!(closed.reason, ExitReason::StopLoss);
    assert!(approx(closed.close_rate, 95.0));
    assert!(approx(closed.profit_abs, -5.0));
}

#[tokio::test]
async fn trailing_stop_follows_best_rate() {
    let host = PaperHost::new(Arc::new(MemoryTradeStore::new()), 0.0, 10.0);
    let mut strategy = Scripted::new(-0.1);
    strategy.settings.trailing = Some(TrailingStop {
        positive: 0.02,
        offset: 0.03,
        only_offset_is_reached: true,
    });
    let candles = bars(&[
        (100.0, 100.0, 100.0, 100.0),
        (100.0, 104.0, 100.0, 104.0),
        (103.0, 103.0, 101.0, 101.5),
    ]);

    let report = host.run(&strategy, 100.0, &candles, &HistoryProvider::new()).await.unwrap();

    let closed = &report.closed[0];
    assert_eq!(closed.reason, ExitReason::TrailingStop);
    assert!(approx(closed.close_rate, 104.0 * 0.98));
}

#[tokio::test]
async fn failing_callback_falls_back_to_no_action() {
    let host = PaperHost::new(Arc::new(MemoryTradeStore::new()), 0.0, 10.0);
    let mut strategy = Scripted::new(-0.5).with_ladder();
    strategy.fail_adjust = true;
    let candles = flat(&[100.0, 103.0, 105.0, 110.0]);

    let report = host.run(&strategy, 100.0, &candles, &HistoryProvider::new()).await.unwrap();

    assert_eq!(report.callback_errors, 3);
    assert_eq!(report.trade_count(), 1);
    assert_eq!(report.closed[0].reason, ExitReason::EndOfData);
    assert!(approx(report.closed[0].profit_abs, 10.0));
}

#[tokio::test]
async fn slippage_applies_to_both_sides() {
    let host = PaperHost::new(Arc::new(MemoryTradeStore::new()), 10.0, 10.0);
    let mut strategy = Scripted::new(-0.5);
    strategy.settings.order_types.entry = OrderKind::Market;
    strategy.settings.order_types.exit = OrderKind::Market;
    let candles = flat(&[100.0, 100.0]);

    let report = host.run(&strategy, 100.0, &candles, &HistoryProvider::new()).await.unwrap();

    assert!(approx(report.fills[0].rate, 100.1));
    assert!(approx(report.closed[0].close_rate, 99.9));
    assert!(report.closed[0].profit_abs < 0.0);
}

#[tokio::test]
async fn sqlite_store_keeps_flags_and_closes_trade() {
    let store = Arc::new(SqliteTradeStore::connect("sqlite::memory:").await.unwrap());
    let host = PaperHost::new(store.clone(), 0.0, 10.0);
    let strategy = Scripted::new(-0.5).with_ladder();
    let candles = flat(&[100.0, 102.5, 104.5, 106.5]);

    let report = host.run(&strategy, 100.0, &candles, &HistoryProvider::new()).await.unwrap();
    let trade_id = &report.closed[0].trade_id;

    let row = sqlx::query("SELECT is_open, exit_tag, stake_amount FROM trades WHERE id = ?1")
        .bind(trade_id)
        .fetch_one(store.pool())
        .await
        .unwrap();
    assert_eq!(row.get::<i64, _>("is_open"), 0);
    assert_eq!(row.get::<String, _>("exit_tag"), "final_target");
    assert!(approx(row.get::<f64, _>("stake_amount"), 49.0));

    let flags = store.load_custom_data(trade_id).await.unwrap();
    assert_eq!(flags.len(), 2);
}

#[tokio::test]
async fn limit_orders_skip_slippage_but_stops_pay_it() {
    let host = PaperHost::new(Arc::new(MemoryTradeStore::new()), 10.0, 10.0);
    // Default order types: limit entry and exit, market stop
    let strategy = Scripted::new(-0.05);
    let candles = bars(&[
        (100.0, 100.0, 100.0, 100.0),
        (96.0, 96.0, 94.0, 95.0),
    ]);

    let report = host.run(&strategy, 100.0, &candles, &HistoryProvider::new()).await.unwrap();

    assert!(approx(report.fills[0].rate, 100.0));
    assert_eq!(report.closed[0].reason, ExitReason::StopLoss);
    assert!(approx(report.closed[0].close_rate, 95.0 * 0.999));
}

#[tokio::test]
async fn zero_trailing_distance_moves_stop_to_entry() {
    let host = PaperHost::new(Arc::new(MemoryTradeStore::new()), 0.0, 10.0);
    let mut strategy = Scripted::new(-0.05);
    strategy.settings.trailing = Some(TrailingStop {
        positive: 0.0,
        offset: 0.015,
        only_offset_is_reached: false,
    });
    let candles = bars(&[
        (100.0, 100.0, 100.0, 100.0),
        (100.0, 102.0, 100.0, 102.0),
        (101.0, 101.0, 99.0, 99.5),
    ]);

    let report = host.run(&strategy, 100.0, &candles, &HistoryProvider::new()).await.unwrap();

    let closed = &report.closed[0];
    assert_eq!(closed.reason, ExitReason::TrailingStop);
    assert!(approx(closed.close_rate, 100.0));
    assert!(approx(closed.profit_abs, 0.0));
}

#[tokio::test]
async fn short_ladder_sells_into_falling_prices() {
    let store = Arc::new(MemoryTradeStore::new());
    let host = PaperHost::new(store.clone(), 0.0, 10.0);
    let strategy = Scripted::new(-0.5).with_ladder().short();
    let candles = flat(&[100.0, 98.0, 96.0, 94.0]);

    let report = host.run(&strategy, 100.0, &candles, &HistoryProvider::new()).await.unwrap();

    let closed = &report.closed[0];
    assert_eq!(closed.direction, TradeDirection::Short);
    assert_eq!(closed.exit_tag.as_deref(), Some("final_target"));
    // 30 @ 100/98, 21 @ 100/96, remaining 49 @ 100/94
    assert!(approx(closed.profit_abs, 30.0 * 0.02 + 21.0 * 0.04 + 49.0 * 0.06));
    assert_eq!(report.fills[0].side, OrderSide::Sell);
    assert!(report.fills[1..].iter().all(|f| f.side == OrderSide::Buy));
    assert_eq!(report.fills[1].tag.as_deref(), Some("stage_1"));

    let data = store.load_custom_data(&closed.trade_id).await.unwrap();
    assert!(data.get_bool("stage_2_sold", false));
}

#[tokio::test]
async fn short_stop_sits_above_entry() {
    let host = PaperHost::new(Arc::new(MemoryTradeStore::new()), 0.0, 10.0);
    let strategy = Scripted::new(-0.05).short();
    let candles = bars(&[
        (100.0, 100.0, 100.0, 100.0),
        (100.0, 103.0, 100.0, 103.0),
        (104.0, 106.0, 103.0, 105.0),
        (105.0, 105.0, 105.0, 105.0),
    ]);

    let report = host.run(&strategy, 100.0, &candles, &HistoryProvider::new()).await.unwrap();

    let closed = &report.closed[0];
    assert_eq!(closed.reason, ExitReason::StopLoss);
    assert!(approx(closed.close_rate, 105.0));
    assert!(approx(closed.profit_abs, -5.0));
}

#[tokio::test]
async fn dca_averages_open_rate_and_raises_max_stake() {
    let store = Arc::new(MemoryTradeStore::new());
    let host = PaperHost::new(store.clone(), 0.0, 10.0);
    let mut strategy = Scripted::new(-0.5);
    strategy.ladder = Some(
        StagedLadder::new(vec![Stage { threshold: 0.04, fraction: 0.5 }], None)
            .with_dca(vec![DcaLevel { level: -0.05, fraction: 0.5 }]),
    );
    strategy.settings.position_adjustment = true;
    let candles = flat(&[100.0, 95.0, 97.0, 100.0]);

    let report = host.run(&strategy, 100.0, &candles, &HistoryProvider::new()).await.unwrap();

    assert_eq!(report.fills.len(), 3);
    assert_eq!(report.fills[1].tag.as_deref(), Some("dca_0"));
    assert!(approx(report.fills[1].stake, 50.0));

    let closed = &report.closed[0];
    assert_eq!(closed.reason, ExitReason::EndOfData);
    // 1 unit @ 100 plus 50/95 units @ 95
    let open_rate = 150.0 / (1.0 + 50.0 / 95.0);
    assert!(approx(closed.open_rate, open_rate));
    assert!(approx(closed.max_stake, 150.0));
    assert!(approx(closed.profit_abs, 150.0 * (100.0 / open_rate - 1.0)));

    let data = store.load_custom_data(&closed.trade_id).await.unwrap();
    assert!(data.get_bool("stage_0_bought", false));
}

#[tokio::test]
async fn informative_close_is_seen_only_after_it_closes() {
    let host = PaperHost::new(Arc::new(MemoryTradeStore::new()), 0.0, 10.0);
    let strategy = QuarterHourBreakout {
        settings: StrategySettings::new("5m".parse().unwrap(), -0.5),
        threshold: 105.0,
    };
    // Hour-aligned so every 15m bucket holds three base rows
    let start = DateTime::from_timestamp(1_699_999_200, 0).unwrap();
    let candles: Vec<Candle> = (0..9)
        .map(|i| {
            let c = 100.0 + i as f64;
            Candle {
                timestamp: start + Duration::minutes(5 * i as i64),
                open: c,
                high: c,
                low: c,
                close: c,
                volume: 1.0,
            }
        })
        .collect();
    let data = HistoryProvider::new().with_candles("TESTUSDT", candles.clone());

    let report = host.run(&strategy, 100.0, &candles, &data).await.unwrap();

    // The second 15m candle closes at 105 on row 5; rows 3 and 4 still see 102
    let entry = &report.fills[0];
    assert!(approx(entry.rate, 105.0));
    assert_eq!(entry.date, start + Duration::minutes(30));
    assert_eq!(entry.tag.as_deref(), Some("breakout"));
    assert!(approx(report.closed[0].profit_abs, 100.0 * (108.0 / 105.0 - 1.0)));
}
