use std::collections::BTreeMap;

use chrono::{DateTime, Utc};

use common::{Candle, Error, Result, Timeframe};

/// Which of the four signal masks to write.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SignalKind {
    EnterLong,
    ExitLong,
    EnterShort,
    ExitShort,
}

/// The analysed candle series: OHLCV, indicator columns and signal masks.
///
/// Indicator columns are full-length `f64` vectors with `NaN` for undefined
/// rows. Signal masks start all-false and are OR-ed into, so several
/// conditions can mark the same kind independently.
#[derive(Debug, Clone, Default)]
pub struct CandleFrame {
    timestamps: Vec<DateTime<Utc>>,
    open: Vec<f64>,
    high: Vec<f64>,
    low: Vec<f64>,
    close: Vec<f64>,
    volume: Vec<f64>,
    columns: BTreeMap<String, Vec<f64>>,
    enter_long: Vec<bool>,
    exit_long: Vec<bool>,
    enter_short: Vec<bool>,
    exit_short: Vec<bool>,
    enter_tag: Vec<Option<String>>,
    exit_tag: Vec<Option<String>>,
}

impl CandleFrame {
    pub fn from_candles(candles: &[Candle]) -> Self {
        let n = candles.len();
        Self {
            timestamps: candles.iter().map(|c| c.timestamp).collect(),
            open: candles.iter().map(|c| c.open).collect(),
            high: candles.iter().map(|c| c.high).collect(),
            low: candles.iter().map(|c| c.low).collect(),
            close: candles.iter().map(|c| c.close).collect(),
            volume: candles.iter().map(|c| c.volume).collect(),
            columns: BTreeMap::new(),
            enter_long: vec![false; n],
            exit_long: vec![false; n],
            enter_short: vec![false; n],
            exit_short: vec![false; n],
            enter_tag: vec![None; n],
            exit_tag: vec![None; n],
        }
    }

    pub fn len(&self) -> usize {
        self.timestamps.len()
    }

    pub fn is_empty(&self) -> bool {
        self.timestamps.is_empty()
    }

    pub fn timestamps(&self) -> &[DateTime<Utc>] {
        &self.timestamps
    }

    pub fn open(&self) -> &[f64] {
        &self.open
    }

    pub fn high(&self) -> &[f64] {
        &self.high
    }

    pub fn low(&self) -> &[f64] {
        &self.low
    }

    pub fn close(&self) -> &[f64] {
        &self.close
    }

    pub fn volume(&self) -> &[f64] {
        &self.volume
    }

    /// Any column by name, OHLCV included.
    pub fn column(&self, name: &str) -> Result<&[f64]> {
        match name {
            "open" => Ok(&self.open),
            "high" => Ok(&self.high),
            "low" => Ok(&self.low),
            "close" => Ok(&self.close),
            "volume" => Ok(&self.volume),
            other => self
                .columns
                .get(other)
                .map(Vec::as_slice)
                .ok_or_else(|| Error::MissingColumn(other.to_string())),
        }
    }

    pub fn has_column(&self, name: &str) -> bool {
        self.column(name).is_ok()
    }

    /// Names of the derived (non-OHLCV) columns.
    pub fn column_names(&self) -> impl Iterator<Item = &str> {
        self.columns.keys().map(String::as_str)
    }

    pub fn set_column(&mut self, name: impl Into<String>, values: Vec<f64>) -> Result<()> {
        let name = name.into();
        self.check_len(&name, values.len())?;
        self.columns.insert(name, values);
        Ok(())
    }

    /// OR `mask` into the chosen signal.
    pub fn mark(&mut self, kind: SignalKind, mask: &[bool]) -> Result<()> {
        self.check_len(kind_name(kind), mask.len())?;
        let target = self.signal_mut(kind);
        for (slot, &hit) in target.iter_mut().zip(mask) {
            *slot |= hit;
        }
        Ok(())
    }

    /// Like [`mark`](Self::mark), also tagging the rows that fire.
    pub fn mark_tagged(&mut self, kind: SignalKind, mask: &[bool], tag: &str) -> Result<()> {
        self.mark(kind, mask)?;
        let tags = match kind {
            SignalKind::EnterLong | SignalKind::EnterShort => &mut self.enter_tag,
            SignalKind::ExitLong | SignalKind::ExitShort => &mut self.exit_tag,
        };
        for (slot, &hit) in tags.iter_mut().zip(mask) {
            if hit && slot.is_none() {
                *slot = Some(tag.to_string());
            }
        }
        Ok(())
    }

    pub fn signal(&self, kind: SignalKind) -> &[bool] {
        match kind {
            SignalKind::EnterLong => &self.enter_long,
            SignalKind::ExitLong => &self.exit_long,
            SignalKind::EnterShort => &self.enter_short,
            SignalKind::ExitShort => &self.exit_short,
        }
    }

    pub fn enter_tag(&self, row: usize) -> Option<&str> {
        self.enter_tag.get(row).and_then(|t| t.as_deref())
    }

    pub fn exit_tag(&self, row: usize) -> Option<&str> {
        self.exit_tag.get(row).and_then(|t| t.as_deref())
    }

    pub fn candle(&self, row: usize) -> Option<Candle> {
        if row >= self.len() {
            return None;
        }
        Some(Candle {
            timestamp: self.timestamps[row],
            open: self.open[row],
            high: self.high[row],
            low: self.low[row],
            close: self.close[row],
            volume: self.volume[row],
        })
    }

    pub fn last_candle(&self) -> Option<Candle> {
        self.len().checked_sub(1).and_then(|i| self.candle(i))
    }

    /// Value of `name` at `row`, `None` when missing or undefined.
    pub fn value(&self, name: &str, row: usize) -> Option<f64> {
        self.column(name)
            .ok()
            .and_then(|c| c.get(row).copied())
            .filter(|v| !v.is_nan())
    }

    /// Merge every column of `informative` into this frame as `{name}_{tf}`.
    ///
    /// An informative candle opened at `t` only becomes visible on the base
    /// row that closes together with it (`t + inf_tf - base_tf`); rows in
    /// between carry the last visible value forward.
    pub fn merge_informative(
        &mut self,
        informative: &CandleFrame,
        base_tf: Timeframe,
        inf_tf: Timeframe,
    ) -> Result<()> {
        let offset = inf_tf.duration() - base_tf.duration();
        let visible_at: Vec<DateTime<Utc>> = informative
            .timestamps
            .iter()
            .map(|t| *t + offset)
            .collect();

        // Base row -> index of the informative row visible on it
        let mut source = Vec::with_capacity(self.len());
        let mut visible = 0;
        for ts in &self.timestamps {
            while visible < visible_at.len() && visible_at[visible] <= *ts {
                visible += 1;
            }
            source.push(visible.checked_sub(1));
        }

        let suffix = inf_tf.to_string();
        let mut names: Vec<&str> = vec!["open", "high", "low", "close", "volume"];
        names.extend(informative.column_names());
        for name in names {
            let values = informative.column(name)?;
            let merged = source
                .iter()
                .map(|idx| idx.map_or(f64::NAN, |k| values[k]))
                .collect();
            self.set_column(format!("{name}_{suffix}"), merged)?;
        }
        Ok(())
    }

    fn signal_mut(&mut self, kind: SignalKind) -> &mut Vec<bool> {
        match kind {
            SignalKind::EnterLong => &mut self.enter_long,
            SignalKind::ExitLong => &mut self.exit_long,
            SignalKind::EnterShort => &mut self.enter_short,
            SignalKind::ExitShort => &mut self.exit_short,
        }
    }

    fn check_len(&self, name: &str, got: usize) -> Result<()> {
        if got != self.len() {
            return Err(Error::ColumnLength {
                name: name.to_string(),
                expected: self.len(),
                got,
            });
        }
        Ok(())
    }
}

fn kind_name(kind: SignalKind) -> &'static str {
    match kind {
        SignalKind::EnterLong => "enter_long",
        SignalKind::ExitLong => "exit_long",
        SignalKind::EnterShort => "enter_short",
        SignalKind::ExitShort => "exit_short",
    }
}

/// Aggregate candles into `timeframe` buckets aligned to the epoch.
/// The trailing bucket may be incomplete.
pub fn resample(candles: &[Candle], timeframe: Timeframe) -> Vec<Candle> {
    let mut out: Vec<Candle> = Vec::new();
    for c in candles {
        let bucket = timeframe.floor(c.timestamp);
        match out.last_mut() {
            Some(last) if last.timestamp == bucket => {
                last.high = last.high.max(c.high);
                last.low = last.low.min(c.low);
                last.close = c.close;
                last.volume += c.volume;
            }
            _ => out.push(Candle {
                timestamp: bucket,
                ..*c
            }),
        }
    }
    out
}
