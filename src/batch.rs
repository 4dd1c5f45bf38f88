//! Accumulation buffer between flush ticks.

use crate::types::{Batch, DepthUpdate};

/// Buffers decoded updates until the next flush.
///
/// `push` and `flush` are the only mutation points. The buffer is owned by a
/// single task, so appends and flush-and-clear never interleave.
#[derive(Debug, Default)]
pub struct BatchBuffer {
    pending: Vec<DepthUpdate>,
}

impl BatchBuffer {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn push(&mut self, update: DepthUpdate) {
        self.pending.push(update);
    }

    /// Coalesce everything buffered into one [`Batch`] and clear the buffer.
    ///
    /// Returns `None` when nothing was buffered; an empty batch is never
    /// produced. Levels keep arrival order; `update_id` and `event_time` are
    /// taken from the last buffered update.
    pub fn flush(&mut self) -> Option<Batch> {
        let last = self.pending.last()?;
        let mut batch = Batch {
            bids: Vec::with_capacity(self.pending.iter().map(|u| u.bids.len()).sum()),
            asks: Vec::with_capacity(self.pending.iter().map(|u| u.asks.len()).sum()),
            event_time: last.event_time,
            update_id: last.update_id,
        };
        for update in self.pending.drain(..) {
            batch.bids.extend(update.bids);
            batch.asks.extend(update.asks);
        }
        Some(batch)
    }

    /// Number of buffered updates.
    pub fn len(&self) -> usize {
        self.pending.len()
    }

    pub fn is_empty(&self) -> bool {
        self.pending.is_empty()
    }

    /// Drop everything buffered without emitting it.
    pub fn clear(&mut self) {
        self.pending.clear();
    }
}
