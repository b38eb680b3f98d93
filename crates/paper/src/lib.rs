//! Paper host: replays recorded candles through a strategy, simulating fills
//! with slippage and persisting position state through a [`TradeStore`].

pub mod host;
pub mod provider;
pub mod report;
pub mod store;

pub use host::PaperHost;
pub use provider::HistoryProvider;
pub use report::{BacktestReport, ClosedTrade, ExitReason, Fill};
pub use store::{MemoryTradeStore, SqliteTradeStore, TradeStore};
