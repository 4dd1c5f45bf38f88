//! Depth-limited ladder snapshots and change detection.
//!
//! [`LadderView`] keeps the most recent [`Batch`] and the last published
//! [`Snapshot`]. Consumers pull from it whenever a batch arrives or the tick
//! size changes, and only get a snapshot back when it differs materially from
//! the one they already have.

use std::sync::Arc;

use serde::Serialize;

use crate::aggregate::{aggregate, AggregatedLevel};
use crate::types::{Batch, Side, TickSize};

/// Levels kept per side.
pub const DEFAULT_DEPTH: usize = 20;

/// Quantity differences at or below this are treated as noise.
pub const QUANTITY_TOLERANCE: f64 = 1e-9;

/// Floor for [`Snapshot::max_quantity`], so a thin book does not render as
/// full-width bars.
const MIN_SCALE_QUANTITY: f64 = 1.0;

/// Published top-of-book view for both sides, best level first.
#[derive(Clone, Debug, Default, PartialEq, Serialize)]
pub struct Snapshot {
    pub bids: Vec<AggregatedLevel>,
    pub asks: Vec<AggregatedLevel>,
}

impl Snapshot {
    /// Aggregate a batch at `tick` and keep the best `depth` levels per side.
    pub fn from_batch(batch: &Batch, tick: TickSize, depth: usize) -> Self {
        let mut bids = aggregate(&batch.bids, tick, Side::Bid);
        let mut asks = aggregate(&batch.asks, tick, Side::Ask);
        bids.truncate(depth);
        asks.truncate(depth);
        Self { bids, asks }
    }

    pub fn is_empty(&self) -> bool {
        self.bids.is_empty() && self.asks.is_empty()
    }

    pub fn best_bid(&self) -> Option<&AggregatedLevel> {
        self.bids.first()
    }

    pub fn best_ask(&self) -> Option<&AggregatedLevel> {
        self.asks.first()
    }

    /// Best ask minus best bid. `None` unless both sides have levels.
    pub fn spread(&self) -> Option<f64> {
        Some(self.best_ask()?.price - self.best_bid()?.price)
    }

    pub fn mid(&self) -> Option<f64> {
        Some((self.best_ask()?.price + self.best_bid()?.price) * 0.5)
    }

    /// Largest quantity on either side, never below 1.0. Used to scale
    /// depth bars.
    pub fn max_quantity(&self) -> f64 {
        self.bids
            .iter()
            .chain(&self.asks)
            .map(|l| l.quantity)
            .fold(MIN_SCALE_QUANTITY, f64::max)
    }

    /// Bar width for `level` relative to [`max_quantity`](Self::max_quantity),
    /// in `[0, 1]`.
    pub fn fill_ratio(&self, level: &AggregatedLevel) -> f64 {
        (level.quantity / self.max_quantity()).min(1.0)
    }
}

/// Index-wise equivalence of two sorted level lists: same length, identical
/// prices, quantities within [`QUANTITY_TOLERANCE`].
pub fn levels_equivalent(a: &[AggregatedLevel], b: &[AggregatedLevel]) -> bool {
    a.len() == b.len()
        && a.iter().zip(b).all(|(x, y)| {
            x.price == y.price && (x.quantity - y.quantity).abs() <= QUANTITY_TOLERANCE
        })
}

/// Whether `next` should replace `previous` downstream.
pub fn should_replace(previous: &[AggregatedLevel], next: &[AggregatedLevel]) -> bool {
    !levels_equivalent(previous, next)
}

/// Pull-based ladder: recompute on demand, publish only on material change.
#[derive(Debug)]
pub struct LadderView {
    tick: TickSize,
    depth: usize,
    latest: Option<Arc<Batch>>,
    current: Snapshot,
}

impl LadderView {
    pub fn new(tick: TickSize, depth: usize) -> Self {
        Self {
            tick,
            depth,
            latest: None,
            current: Snapshot::default(),
        }
    }

    pub fn tick(&self) -> TickSize {
        self.tick
    }

    pub fn depth(&self) -> usize {
        self.depth
    }

    /// Last published snapshot (empty until something was published).
    pub fn current(&self) -> &Snapshot {
        &self.current
    }

    /// Take `batch` as the new raw state and recompute.
    pub fn on_batch(&mut self, batch: Arc<Batch>) -> Option<&Snapshot> {
        self.latest = Some(batch);
        self.compute_if_changed()
    }

    /// Switch tick size and recompute from the latest batch.
    pub fn set_tick(&mut self, tick: TickSize) -> Option<&Snapshot> {
        if tick == self.tick {
            return None;
        }
        self.tick = tick;
        self.compute_if_changed()
    }

    /// Recompute from the latest batch. Returns the new snapshot only if it
    /// replaced the previously published one.
    pub fn compute_if_changed(&mut self) -> Option<&Snapshot> {
        let batch = self.latest.as_ref()?;
        let next = Snapshot::from_batch(batch, self.tick, self.depth);
        if should_replace(&self.current.bids, &next.bids)
            || should_replace(&self.current.asks, &next.asks)
        {
            self.current = next;
            Some(&self.current)
        } else {
            None
        }
    }
}
