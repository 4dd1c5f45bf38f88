//! Pipeline configuration.

use std::fmt;
use std::str::FromStr;
use std::time::Duration;

use crate::error::LadderError;

/// Binance spot stream base (combined with `/{symbol}@depth`).
pub const BINANCE_SPOT_WS: &str = "wss://stream.binance.com:9443/ws";

/// Default flush cadence (10 batches per second).
pub const DEFAULT_FLUSH_INTERVAL: Duration = Duration::from_millis(100);

/// Settings for [`DepthFeed`](crate::feed::DepthFeed).
#[derive(Debug, Clone)]
pub struct FeedConfig {
    /// Period of the flush timer.
    pub flush_interval: Duration,
}

impl Default for FeedConfig {
    fn default() -> Self {
        Self {
            flush_interval: DEFAULT_FLUSH_INTERVAL,
        }
    }
}

/// Which update source to run.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum SourceKind {
    Live,
    #[default]
    Synthetic,
}

impl fmt::Display for SourceKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            SourceKind::Live => f.write_str("live"),
            SourceKind::Synthetic => f.write_str("synthetic"),
        }
    }
}

impl FromStr for SourceKind {
    type Err = LadderError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "live" => Ok(SourceKind::Live),
            "synthetic" | "mock" => Ok(SourceKind::Synthetic),
            _ => Err(LadderError::InvalidSource(s.to_string())),
        }
    }
}

/// Source selection plus per-source settings.
#[derive(Debug, Clone)]
pub struct SourceConfig {
    pub kind: SourceKind,
    /// Trading pair, e.g. `btcusdt`.
    pub symbol: String,
    /// Overrides the live stream URL derived from `symbol`.
    pub url: Option<String>,
    pub synthetic: SyntheticConfig,
}

impl SourceConfig {
    /// WebSocket URL for the live source.
    pub fn live_url(&self) -> String {
        match &self.url {
            Some(url) => url.clone(),
            None => format!("{BINANCE_SPOT_WS}/{}@depth", self.symbol.to_lowercase()),
        }
    }
}

impl Default for SourceConfig {
    fn default() -> Self {
        Self {
            kind: SourceKind::default(),
            symbol: "btcusdt".to_string(),
            url: None,
            synthetic: SyntheticConfig::default(),
        }
    }
}

/// Shape of the synthetic random-walk book.
#[derive(Debug, Clone)]
pub struct SyntheticConfig {
    /// Time between generated messages (5 ms ≈ 200 msg/s).
    pub interval: Duration,
    /// Symbol stamped on each message.
    pub symbol: String,
    /// Centre of the sinusoidal drift.
    pub base_price: f64,
    /// Drift amplitude around `base_price`.
    pub amplitude: f64,
    /// Levels generated per side.
    pub levels: usize,
    /// Distance between consecutive levels.
    pub level_step: f64,
    /// Upper bound of the random price jitter.
    pub jitter: f64,
    /// Upper bound of generated quantities.
    pub max_quantity: f64,
}

impl Default for SyntheticConfig {
    fn default() -> Self {
        Self {
            interval: Duration::from_millis(5),
            symbol: "BTCUSDT".to_string(),
            base_price: 50_000.0,
            amplitude: 200.0,
            levels: 10,
            level_step: 0.5,
            jitter: 0.2,
            max_quantity: 5.0,
        }
    }
}
