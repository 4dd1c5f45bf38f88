//! Streaming order-book depth aggregation.
//!
//! Raw depth updates are decoded, buffered, flushed as one coalesced
//! [`Batch`] per interval, grouped into tick buckets, and published as
//! depth-limited [`Snapshot`]s only when they change.

pub mod aggregate;
pub mod batch;
pub mod config;
pub mod decoder;
pub mod error;
pub mod feed;
pub mod snapshot;
pub mod source;
pub mod types;

// ---- Top-level re-exports ----

pub use aggregate::{aggregate, round_to_tick, AggregatedLevel};
pub use batch::BatchBuffer;
pub use config::{FeedConfig, SourceConfig, SourceKind, SyntheticConfig};
pub use decoder::{decode, decode_slice, decode_str, Decoded, Payload};
pub use error::{LadderError, Result};
pub use feed::{DepthFeed, Subscription};
pub use snapshot::{levels_equivalent, should_replace, LadderView, Snapshot, DEFAULT_DEPTH};
pub use source::{build_source, LiveSource, SyntheticSource, UpdateSource};
pub use types::{Batch, DepthUpdate, RawLevel, RawValue, Side, TickSize};
