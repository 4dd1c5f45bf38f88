mod cli;
mod output;

use std::io::{self, BufRead, BufWriter, Write};
use std::time::Duration;

use clap::Parser;
use depth_ladder::{build_source, DepthFeed, FeedConfig, LadderView, SourceConfig, TickSize};
use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;
use tracing::{error, info, warn};
use tracing_subscriber::EnvFilter;

#[tokio::main]
async fn main() {
    rustls::crypto::ring::default_provider()
        .install_default()
        .expect("failed to install rustls crypto provider");

    let _ = dotenvy::dotenv(); // load .env if present, before reading LADDER_* vars
    let args = cli::Args::parse();

    // Initialize tracing
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| {
        let level = args
            .log_level
            .parse::<tracing_subscriber::filter::LevelFilter>()
            .unwrap_or(tracing_subscriber::filter::LevelFilter::INFO);
        EnvFilter::default().add_directive(level.into())
    });

    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(false)
        .with_writer(std::io::stderr)
        .init();

    info!(
        source = %args.source,
        symbol = %args.symbol,
        tick = %args.tick,
        depth = args.depth,
        json = args.json,
        "depth-ladder starting"
    );

    let cancel = setup_signal_handlers();

    if let Err(e) = run(args, cancel).await {
        error!(error = %e, "depth-ladder fatal error");
        std::process::exit(1);
    }
}

/// Drive the feed and print every changed snapshot until cancelled.
async fn run(args: cli::Args, cancel: CancellationToken) -> depth_ladder::Result<()> {
    let source = build_source(&SourceConfig {
        kind: args.source,
        symbol: args.symbol.clone(),
        url: args.url.clone(),
        ..Default::default()
    });
    let mut feed = DepthFeed::new(
        source,
        FeedConfig {
            flush_interval: Duration::from_millis(args.flush_ms),
        },
    );
    let mut batches = feed.subscribe_batches();
    feed.start()?;

    let mut view = LadderView::new(args.tick, args.depth);
    let mut commands = spawn_stdin_reader();
    let mut stdin_open = true;

    let stdout = io::stdout().lock();
    let mut writer = BufWriter::new(stdout);
    let mut buf = String::with_capacity(4096);

    let result = loop {
        tokio::select! {
            _ = cancel.cancelled() => break Ok(()),

            changed = batches.changed() => {
                if changed.is_err() {
                    info!("feed stopped");
                    break Ok(());
                }
                let latest = batches.borrow_and_update().clone();
                let tick = view.tick();
                if let Some(batch) = latest {
                    if let Some(snapshot) = view.on_batch(batch) {
                        if let Err(e) = output::write_snapshot(snapshot, tick, args.json, &mut buf, &mut writer) {
                            break Err(e);
                        }
                    }
                }
            }

            line = commands.recv(), if stdin_open => match line {
                Some(line) if line.trim().is_empty() => {}
                Some(line) => match line.parse::<TickSize>() {
                    Ok(tick) => {
                        info!(%tick, "tick size changed");
                        if let Some(snapshot) = view.set_tick(tick) {
                            if let Err(e) = output::write_snapshot(snapshot, tick, args.json, &mut buf, &mut writer) {
                                break Err(e);
                            }
                        }
                    }
                    Err(e) => warn!(error = %e, "ignoring input"),
                },
                None => stdin_open = false,
            },
        }
    };

    feed.close();
    let _ = writer.flush();
    info!("depth-ladder stopped");
    result
}

/// Read stdin lines on a plain thread so a pending read never holds up
/// runtime shutdown.
fn spawn_stdin_reader() -> mpsc::UnboundedReceiver<String> {
    let (tx, rx) = mpsc::unbounded_channel();
    std::thread::spawn(move || {
        for line in io::stdin().lock().lines() {
            let Ok(line) = line else { break };
            if tx.send(line).is_err() {
                break;
            }
        }
    });
    rx
}

/// Register SIGINT and SIGTERM handlers that trigger the returned token.
fn setup_signal_handlers() -> CancellationToken {
    let cancel = CancellationToken::new();

    let cancel_clone = cancel.clone();
    tokio::spawn(async move {
        let _ = tokio::signal::ctrl_c().await;
        info!("received SIGINT, shutting down");
        cancel_clone.cancel();
    });

    #[cfg(unix)]
    {
        let cancel_clone = cancel.clone();
        tokio::spawn(async move {
            let mut sig = tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate())
                .expect("failed to register SIGTERM handler");
            sig.recv().await;
            info!("received SIGTERM, shutting down");
            cancel_clone.cancel();
        });
    }

    cancel
}
