use clap::Parser;
use depth_ladder::{SourceKind, TickSize, DEFAULT_DEPTH};

/// depth-ladder: tick-aggregated order book ladder from a depth stream.
#[derive(Parser, Debug)]
#[command(name = "depth-ladder", version)]
pub struct Args {
    /// Log level (trace, debug, info, warn, error); RUST_LOG takes precedence
    #[arg(long, env = "LADDER_LOG_LEVEL", default_value = "info")]
    pub log_level: String,

    /// Update source (live or synthetic)
    #[arg(long, env = "LADDER_SOURCE", default_value = "synthetic")]
    pub source: SourceKind,

    /// Trading pair symbol (e.g. btcusdt)
    #[arg(long, env = "LADDER_SYMBOL", default_value = "btcusdt")]
    pub symbol: String,

    /// Override the live WebSocket URL
    #[arg(long, env = "LADDER_URL")]
    pub url: Option<String>,

    /// Initial tick size (0.01, 0.1 or 1); type a new one on stdin to switch
    #[arg(long, env = "LADDER_TICK", default_value = "0.1")]
    pub tick: TickSize,

    /// Levels shown per side
    #[arg(long, env = "LADDER_DEPTH", default_value_t = DEFAULT_DEPTH)]
    pub depth: usize,

    /// Flush interval in milliseconds
    #[arg(long, env = "LADDER_FLUSH_MS", default_value_t = 100, value_parser = clap::value_parser!(u64).range(1..))]
    pub flush_ms: u64,

    /// Output as JSON instead of TSV
    #[arg(long)]
    pub json: bool,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults() {
        let args = Args::try_parse_from(["depth-ladder"]).unwrap();
        assert_eq!(args.source, SourceKind::Synthetic);
        assert_eq!(args.symbol, "btcusdt");
        assert_eq!(args.tick, TickSize::Tenth);
        assert_eq!(args.depth, 20);
        assert_eq!(args.flush_ms, 100);
        assert!(!args.json);
    }

    #[test]
    fn parses_overrides() {
        let args = Args::try_parse_from([
            "depth-ladder",
            "--source",
            "live",
            "--tick",
            "0.01",
            "--depth",
            "5",
            "--json",
        ])
        .unwrap();
        assert_eq!(args.source, SourceKind::Live);
        assert_eq!(args.tick, TickSize::Hundredth);
        assert_eq!(args.depth, 5);
        assert!(args.json);
    }

    #[test]
    fn rejects_zero_flush_interval() {
        assert!(Args::try_parse_from(["depth-ladder", "--flush-ms", "0"]).is_err());
    }

    #[test]
    fn rejects_unknown_tick() {
        assert!(Args::try_parse_from(["depth-ladder", "--tick", "0.5"]).is_err());
    }
}
