use std::collections::HashMap;
use std::fs::File;
use std::path::{Path, PathBuf};

use chrono::DateTime;
use serde::Deserialize;
use tracing::{debug, info, warn};

use common::{Candle, CandleType, Config, DataProvider, Error, OrderBook, Result, Timeframe};
use strategy::resample;

/// Recorded market data served through [`DataProvider`].
///
/// Each pair has one base candle series; coarser timeframes are resampled
/// from it on request. Funding rates and a single order-book snapshot per
/// pair are optional.
#[derive(Debug, Default)]
pub struct HistoryProvider {
    candles: HashMap<String, Vec<Candle>>,
    funding: HashMap<String, Vec<Candle>>,
    books: HashMap<String, OrderBook>,
}

#[derive(Deserialize)]
struct CandleRow {
    /// Milliseconds since the epoch.
    timestamp: i64,
    open: f64,
    high: f64,
    low: f64,
    close: f64,
    volume: f64,
}

#[derive(Deserialize)]
struct FundingRow {
    timestamp: i64,
    rate: f64,
}

impl HistoryProvider {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_candles(mut self, pair: impl Into<String>, candles: Vec<Candle>) -> Self {
        self.candles.insert(pair.into(), candles);
        self
    }

    pub fn with_funding(mut self, pair: impl Into<String>, rates: Vec<Candle>) -> Self {
        self.funding.insert(pair.into(), rates);
        self
    }

    pub fn with_orderbook(mut self, pair: impl Into<String>, book: OrderBook) -> Self {
        self.books.insert(pair.into(), book);
        self
    }

    /// Load `{pair}.csv` from the candle directory for every pair, plus the
    /// optional `{pair}.csv` funding file and `{pair}.json` book snapshot.
    pub fn load<'a>(cfg: &Config, pairs: impl IntoIterator<Item = &'a str>) -> Result<Self> {
        let mut provider = Self::new();
        for pair in pairs {
            let path = Path::new(&cfg.candles_path).join(format!("{pair}.csv"));
            let candles = read_candles(&path)?;
            info!(pair, rows = candles.len(), path = %path.display(), "Loaded candles");
            provider.candles.insert(pair.to_string(), candles);

            if let Some(path) = optional_file(cfg.funding_path.as_deref(), pair, "csv") {
                provider.funding.insert(pair.to_string(), read_funding(&path)?);
                debug!(pair, path = %path.display(), "Loaded funding rates");
            }
            match optional_file(cfg.orderbook_path.as_deref(), pair, "json") {
                Some(path) => {
                    let book: OrderBook = serde_json::from_reader(File::open(&path)?)?;
                    debug!(pair, bids = book.bids.len(), asks = book.asks.len(), "Loaded order book");
                    provider.books.insert(pair.to_string(), book);
                }
                None => warn!(pair, "No order book snapshot, depth gates will fail"),
            }
        }
        Ok(provider)
    }
}

fn optional_file(dir: Option<&str>, pair: &str, ext: &str) -> Option<PathBuf> {
    let path = Path::new(dir?).join(format!("{pair}.{ext}"));
    path.is_file().then_some(path)
}

fn timestamp(ms: i64) -> Result<chrono::DateTime<chrono::Utc>> {
    DateTime::from_timestamp_millis(ms).ok_or_else(|| Error::Other(format!("timestamp {ms} out of range")))
}

/// Read an OHLCV file with a `timestamp,open,high,low,close,volume` header.
/// Rows are sorted oldest first.
pub fn read_candles(path: &Path) -> Result<Vec<Candle>> {
    let mut rdr = csv::Reader::from_path(path)?;
    let mut out = Vec::new();
    for rec in rdr.deserialize() {
        let row: CandleRow = rec?;
        out.push(Candle {
            timestamp: timestamp(row.timestamp)?,
            open: row.open,
            high: row.high,
            low: row.low,
            close: row.close,
            volume: row.volume,
        });
    }
    out.sort_by_key(|c| c.timestamp);
    Ok(out)
}

/// Read a `timestamp,rate` file into candle shape, rate in every price field.
pub fn read_funding(path: &Path) -> Result<Vec<Candle>> {
    let mut rdr = csv::Reader::from_path(path)?;
    let mut out = Vec::new();
    for rec in rdr.deserialize() {
        let row: FundingRow = rec?;
        out.push(Candle {
            timestamp: timestamp(row.timestamp)?,
            open: row.rate,
            high: row.rate,
            low: row.rate,
            close: row.rate,
            volume: 0.0,
        });
    }
    out.sort_by_key(|c| c.timestamp);
    Ok(out)
}

/// Interval between the first two rows, if there are two.
fn base_secs(series: &[Candle]) -> Option<i64> {
    match series {
        [a, b, ..] => Some((b.timestamp - a.timestamp).num_seconds()),
        _ => None,
    }
}

impl DataProvider for HistoryProvider {
    fn candles(&self, pair: &str, timeframe: Timeframe, candle_type: CandleType) -> Result<Vec<Candle>> {
        let source = match candle_type {
            CandleType::Spot | CandleType::Futures => &self.candles,
            CandleType::FundingRate => &self.funding,
        };
        let series = source
            .get(pair)
            .ok_or_else(|| Error::MissingData(format!("no {candle_type} history for {pair}")))?;

        match base_secs(series) {
            Some(base) if base == timeframe.secs() => Ok(series.clone()),
            Some(base) if base > timeframe.secs() => Err(Error::MissingData(format!(
                "{pair} {candle_type} is recorded at {base}s, cannot serve {timeframe}"
            ))),
            _ => Ok(resample(series, timeframe)),
        }
    }

    fn orderbook(&self, pair: &str, depth: usize) -> Result<OrderBook> {
        self.books
            .get(pair)
            .map(|b| b.truncated(depth))
            .ok_or_else(|| Error::MissingData(format!("no order book for {pair}")))
    }
}
