use crate::{Candle, CandleType, OrderBook, Result, Timeframe};

/// Market data the host hands to strategies on demand.
///
/// A live host answers from its exchange connection; the paper host answers
/// from recorded history. Strategies only ever read through this trait and
/// never retain what it returns beyond a single callback.
pub trait DataProvider: Send + Sync {
    /// Candle series for `pair` at `timeframe`, oldest first.
    fn candles(&self, pair: &str, timeframe: Timeframe, candle_type: CandleType)
        -> Result<Vec<Candle>>;

    /// Order book snapshot with at most `depth` levels per side.
    fn orderbook(&self, pair: &str, depth: usize) -> Result<OrderBook>;
}
