//! Update sources: anything that pushes raw depth payloads.
//!
//! The feed only sees the [`UpdateSource`] trait, so a live WebSocket and the
//! synthetic generator are interchangeable.

pub mod live;
pub mod synthetic;

use tokio::sync::mpsc;

use crate::config::{SourceConfig, SourceKind};
use crate::decoder::Payload;
use crate::error::Result;

pub use live::LiveSource;
pub use synthetic::SyntheticSource;

/// A push-based, unbounded producer of raw payloads.
pub trait UpdateSource: Send {
    /// Short name used in log lines.
    fn name(&self) -> &'static str;

    /// Start producing into `tx`. Delivery happens on a background task.
    ///
    /// # Errors
    ///
    /// Returns [`LadderError::AlreadyStarted`](crate::LadderError::AlreadyStarted)
    /// if the source is already running.
    fn start(&mut self, tx: mpsc::UnboundedSender<Payload>) -> Result<()>;

    /// Stop producing.
    ///
    /// # Errors
    ///
    /// Returns [`LadderError::NotStarted`](crate::LadderError::NotStarted) if
    /// the source is not running.
    fn close(&mut self) -> Result<()>;
}

/// Build the source selected by `config`.
pub fn build_source(config: &SourceConfig) -> Box<dyn UpdateSource> {
    match config.kind {
        SourceKind::Live => Box::new(LiveSource::new(config.live_url())),
        SourceKind::Synthetic => {
            let mut synthetic = config.synthetic.clone();
            synthetic.symbol = config.symbol.to_uppercase();
            Box::new(SyntheticSource::new(synthetic))
        }
    }
}
