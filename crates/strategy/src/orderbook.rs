use serde::{Deserialize, Serialize};
use tracing::debug;

use common::OrderBook;

/// Sum of the first `depth` bid sizes over the first `depth` ask sizes.
///
/// `None` when either side is shallower than `depth` or the asks sum to zero.
pub fn depth_ratio(book: &OrderBook, depth: usize) -> Option<f64> {
    if depth == 0 || book.bids.len() < depth || book.asks.len() < depth {
        return None;
    }
    let bids: f64 = book.bids[..depth].iter().map(|l| l.size).sum();
    let asks: f64 = book.asks[..depth].iter().map(|l| l.size).sum();
    if asks == 0.0 {
        return None;
    }
    Some(bids / asks)
}

/// How the depth ratio is compared with `delta`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DepthMode {
    /// bids / asks > delta
    BidsOverAsks,
    /// asks / bids > delta
    AsksOverBids,
    /// bids / asks < delta
    BidsUnderAsks,
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct DepthCheck {
    pub depth: usize,
    pub delta: f64,
}

impl DepthCheck {
    pub fn new(depth: usize, delta: f64) -> Self {
        Self { depth, delta }
    }

    /// Insufficient depth never passes.
    pub fn passes(&self, book: &OrderBook, mode: DepthMode) -> bool {
        let Some(ratio) = depth_ratio(book, self.depth) else {
            debug!(depth = self.depth, "Order book too shallow for depth check");
            return false;
        };
        let pass = match mode {
            DepthMode::BidsOverAsks => ratio > self.delta,
            DepthMode::AsksOverBids => ratio > 0.0 && 1.0 / ratio > self.delta,
            DepthMode::BidsUnderAsks => ratio < self.delta,
        };
        debug!(ratio, delta = self.delta, ?mode, pass, "Depth of market");
        pass
    }
}

/// Any level on either side with at least `threshold` size.
pub fn has_large_orders(book: &OrderBook, threshold: f64) -> bool {
    let found = book
        .bids
        .iter()
        .chain(&book.asks)
        .filter(|l| l.size >= threshold)
        .count();
    debug!(threshold, found, "Large orders");
    found > 0
}

#[cfg(test)]
mod tests {
    use super::*;
    use common::BookLevel;

    fn book(bids: &[f64], asks: &[f64]) -> OrderBook {
        let level = |(i, size): (usize, &f64)| BookLevel { price: 100.0 + i as f64, size: *size };
        OrderBook {
            bids: bids.iter().enumerate().map(level).collect(),
            asks: asks.iter().enumerate().map(level).collect(),
        }
    }

    #[test]
    fn ratio_uses_first_levels_only() {
        let b = book(&[10.0, 10.0, 1000.0], &[5.0, 5.0, 1.0]);
        assert_eq!(depth_ratio(&b, 2), Some(2.0));
    }

    #[test]
    fn shallow_book_fails_every_mode() {
        let b = book(&[10.0], &[1.0, 1.0]);
        let check = DepthCheck::new(2, 1.3);
        assert_eq!(depth_ratio(&b, 2), None);
        assert!(!check.passes(&b, DepthMode::BidsOverAsks));
        assert!(!check.passes(&b, DepthMode::AsksOverBids));
        assert!(!check.passes(&b, DepthMode::BidsUnderAsks));
    }

    #[test]
    fn modes_compare_against_delta() {
        let bid_heavy = book(&[20.0, 20.0], &[10.0, 10.0]);
        let ask_heavy = book(&[10.0, 10.0], &[20.0, 20.0]);
        let check = DepthCheck::new(2, 1.3);
        assert!(check.passes(&bid_heavy, DepthMode::BidsOverAsks));
        assert!(!check.passes(&ask_heavy, DepthMode::BidsOverAsks));
        assert!(check.passes(&ask_heavy, DepthMode::AsksOverBids));
        assert!(check.passes(&ask_heavy, DepthMode::BidsUnderAsks));
        assert!(!check.passes(&book(&[1.0, 1.0], &[0.0, 0.0]), DepthMode::BidsOverAsks));
    }

    #[test]
    fn large_orders_on_either_side() {
        assert!(has_large_orders(&book(&[1.0], &[1000.0]), 1000.0));
        assert!(!has_large_orders(&book(&[999.0], &[10.0]), 1000.0));
    }
}
