//! Tick-bucket aggregation of raw price levels.
//!
//! Prices are rounded *down* to the tick grid on both sides, quantities are
//! summed per bucket, and the buckets are returned best-first: bids
//! descending, asks ascending.

use std::collections::BTreeMap;

use ordered_float::OrderedFloat;
use serde::Serialize;

use crate::types::{RawLevel, Side, TickSize};

/// A tick bucket: grid price and total resting quantity.
#[derive(Copy, Clone, Debug, PartialEq, Serialize)]
pub struct AggregatedLevel {
    pub price: f64,
    pub quantity: f64,
}

impl AggregatedLevel {
    pub fn new(price: f64, quantity: f64) -> Self {
        Self { price, quantity }
    }
}

/// Round `price` down to the grid of `tick`.
///
/// The bucket index is `floor(price * m)` with `m = 1 / tick`, and the bucket
/// price is `index / m`. Scaling by `m` can land one ulp below an exact grid
/// value (`0.29 * 100 = 28.999999999999996`), so the index is corrected until
/// `index / m <= price < (index + 1) / m`. Grid prices therefore map to
/// themselves.
pub fn round_to_tick(price: f64, tick: TickSize) -> f64 {
    let m = tick.multiplier();
    let mut index = (price * m).floor();
    if (index + 1.0) / m <= price {
        index += 1.0;
    } else if index / m > price {
        index -= 1.0;
    }
    index / m
}

/// Group raw levels into tick buckets for one side of the book.
///
/// Levels whose price or quantity does not parse to a finite number, and
/// levels with quantity <= 0, are skipped. The result is sorted best-first
/// and is not truncated.
pub fn aggregate(levels: &[RawLevel], tick: TickSize, side: Side) -> Vec<AggregatedLevel> {
    let mut buckets: BTreeMap<OrderedFloat<f64>, f64> = BTreeMap::new();

    for level in levels {
        let (Some(price), Some(quantity)) = (level.price(), level.quantity()) else {
            continue;
        };
        if quantity <= 0.0 {
            continue;
        }
        *buckets
            .entry(OrderedFloat(round_to_tick(price, tick)))
            .or_insert(0.0) += quantity;
    }

    let levels = buckets
        .into_iter()
        .map(|(price, quantity)| AggregatedLevel::new(price.0, quantity));

    match side {
        // Ascending map; best bid is the highest price.
        Side::Bid => levels.rev().collect(),
        Side::Ask => levels.collect(),
    }
}
