//! Live WebSocket depth stream.
//!
//! Spawns a background task with auto-reconnect, heartbeat and stale
//! connection detection. Every text or binary frame is forwarded untouched as
//! a [`Payload`]; decoding happens downstream in the feed.

use std::time::Duration;

use futures_util::{SinkExt, StreamExt};
use tokio::sync::mpsc;
use tokio::time::{self, Instant};
use tokio_tungstenite::tungstenite::Message;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, warn};

use crate::decoder::Payload;
use crate::error::{LadderError, Result};
use crate::source::UpdateSource;

const PING_INTERVAL: Duration = Duration::from_secs(30);
const PONG_TIMEOUT: Duration = Duration::from_secs(10);
const STALE_THRESHOLD: Duration = Duration::from_secs(60);
const STALE_CHECK_INTERVAL: Duration = Duration::from_secs(10);
const RECONNECT_DELAY: Duration = Duration::from_secs(3);

/// WebSocket [`UpdateSource`].
///
/// Does **not** connect until [`start`](UpdateSource::start) is called.
pub struct LiveSource {
    url: String,
    cancel: Option<CancellationToken>,
}

impl LiveSource {
    pub fn new(url: impl Into<String>) -> Self {
        Self {
            url: url.into(),
            cancel: None,
        }
    }

    pub fn url(&self) -> &str {
        &self.url
    }
}

impl UpdateSource for LiveSource {
    fn name(&self) -> &'static str {
        "live"
    }

    fn start(&mut self, tx: mpsc::UnboundedSender<Payload>) -> Result<()> {
        if self.cancel.is_some() {
            return Err(LadderError::AlreadyStarted);
        }
        let cancel = CancellationToken::new();
        self.cancel = Some(cancel.clone());
        let url = self.url.clone();

        tokio::spawn(async move {
            info!(url = %url, "live source starting");
            loop {
                match run_connection(&url, &tx, &cancel).await {
                    Ok(()) => {
                        info!("live source stopped gracefully");
                        return;
                    }
                    Err(e) => {
                        error!(error = %e, "depth stream connection error");
                        if cancel.is_cancelled() {
                            return;
                        }
                        info!(delay = ?RECONNECT_DELAY, "reconnecting");
                        tokio::select! {
                            _ = time::sleep(RECONNECT_DELAY) => {}
                            _ = cancel.cancelled() => {
                                info!("shutdown during reconnect wait");
                                return;
                            }
                        }
                    }
                }
            }
        });

        Ok(())
    }

    fn close(&mut self) -> Result<()> {
        let cancel = self.cancel.take().ok_or(LadderError::NotStarted)?;
        cancel.cancel();
        Ok(())
    }
}

impl Drop for LiveSource {
    fn drop(&mut self) {
        if let Some(cancel) = self.cancel.take() {
            cancel.cancel();
        }
    }
}

/// Single WebSocket connection lifetime.
///
/// Returns `Ok(())` on shutdown (cancellation or the payload receiver going
/// away) and an error for anything that warrants a reconnect.
async fn run_connection(
    url: &str,
    tx: &mpsc::UnboundedSender<Payload>,
    cancel: &CancellationToken,
) -> Result<()> {
    info!("connecting");

    let (ws_stream, _response) = tokio::select! {
        res = tokio_tungstenite::connect_async(url) => res?,
        _ = cancel.cancelled() => return Ok(()),
    };
    let (mut sink, mut stream) = ws_stream.split();

    info!("connected");

    let mut last_message_time = Instant::now();
    let mut ping_interval = time::interval(PING_INTERVAL);
    ping_interval.tick().await; // consume the immediate first tick

    let mut stale_interval = time::interval(STALE_CHECK_INTERVAL);
    stale_interval.tick().await;

    let mut pong_deadline: Option<Instant> = None;

    loop {
        // Either the pong deadline or effectively never.
        let pong_timeout_fut = match pong_deadline {
            Some(deadline) => time::sleep_until(deadline),
            None => time::sleep_until(Instant::now() + Duration::from_secs(86400)),
        };
        let pong_active = pong_deadline.is_some();

        tokio::select! {
            msg = stream.next() => {
                let payload = match msg {
                    Some(Ok(Message::Text(text))) => Some(Payload::Text(text)),
                    Some(Ok(Message::Binary(bytes))) => Some(Payload::Binary(bytes)),
                    Some(Ok(Message::Ping(data))) => {
                        debug!("received server ping");
                        sink.send(Message::Pong(data)).await?;
                        None
                    }
                    Some(Ok(Message::Pong(_))) => {
                        debug!("received pong");
                        pong_deadline = None;
                        None
                    }
                    Some(Ok(Message::Close(_))) => {
                        info!("received close frame");
                        return Err(LadderError::ConnectionClosed);
                    }
                    Some(Ok(Message::Frame(_))) => None,
                    Some(Err(e)) => return Err(e.into()),
                    None => return Err(LadderError::ConnectionClosed),
                };
                last_message_time = Instant::now();
                if let Some(payload) = payload {
                    if tx.send(payload).is_err() {
                        debug!("payload receiver dropped, closing connection");
                        let _ = sink.send(Message::Close(None)).await;
                        return Ok(());
                    }
                }
            }

            _ = ping_interval.tick() => {
                debug!("sending ping");
                sink.send(Message::Ping(vec![])).await?;
                pong_deadline = Some(Instant::now() + PONG_TIMEOUT);
            }

            _ = stale_interval.tick() => {
                let elapsed = last_message_time.elapsed();
                if elapsed > STALE_THRESHOLD {
                    let ms = elapsed.as_millis() as u64;
                    warn!(elapsed_ms = ms, "connection stale");
                    return Err(LadderError::StaleConnection(ms));
                }
            }

            _ = pong_timeout_fut, if pong_active => {
                warn!("pong timeout");
                return Err(LadderError::PongTimeout);
            }

            _ = cancel.cancelled() => {
                info!("shutdown requested, sending close frame");
                let _ = sink.send(Message::Close(None)).await;
                return Ok(());
            }
        }
    }
}
