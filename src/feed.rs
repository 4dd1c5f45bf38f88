//! Timed batching of a depth update stream.
//!
//! # Architecture
//!
//! ```text
//!   UpdateSource (live / synthetic)
//!              |  mpsc::UnboundedSender<Payload>
//!              v
//!   +------ background task (owns BatchBuffer) ------+
//!   |  - decodes payloads, drops undecodable ones    |
//!   |  - pushes updates into the buffer              |
//!   |  - flush timer: coalesce + clear + publish     |
//!   +------------------------------------------------+
//!              |                           |
//!      listeners (in order)     watch::Sender<Option<Arc<Batch>>>
//! ```
//!
//! Decoding, appending and flushing all happen on the one task, so a flush
//! can never lose or duplicate an update that arrives concurrently.

use std::collections::BTreeMap;
use std::sync::{Arc, Mutex, PoisonError, Weak};
use std::time::Duration;

use tokio::sync::{mpsc, watch};
use tokio::task::JoinHandle;
use tokio::time::{self, MissedTickBehavior};
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use crate::batch::BatchBuffer;
use crate::config::FeedConfig;
use crate::decoder::{decode, Decoded, Payload};
use crate::error::{LadderError, Result};
use crate::source::UpdateSource;
use crate::types::Batch;

type Listener = Arc<dyn Fn(&Batch) + Send + Sync>;

#[derive(Default)]
struct Registry {
    next_id: u64,
    entries: BTreeMap<u64, Listener>,
}

/// Registration-ordered listener set.
#[derive(Clone, Default)]
struct Listeners {
    inner: Arc<Mutex<Registry>>,
}

impl Listeners {
    fn add(&self, listener: Listener) -> u64 {
        let mut registry = self.inner.lock().unwrap_or_else(PoisonError::into_inner);
        let id = registry.next_id;
        registry.next_id += 1;
        registry.entries.insert(id, listener);
        id
    }

    fn len(&self) -> usize {
        self.inner
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .entries
            .len()
    }

    /// Call every listener registered at the start of this call. The lock is
    /// released before any listener runs, so listeners may (un)subscribe.
    fn emit(&self, batch: &Batch) {
        let listeners: Vec<Listener> = self
            .inner
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .entries
            .values()
            .cloned()
            .collect();
        for listener in listeners {
            listener(batch);
        }
    }
}

/// Handle returned by [`DepthFeed::subscribe`].
pub struct Subscription {
    id: u64,
    registry: Weak<Mutex<Registry>>,
}

impl Subscription {
    /// Remove the listener. Returns `false` if it was already removed or the
    /// feed is gone. Safe to call from inside the listener itself.
    pub fn unsubscribe(&self) -> bool {
        let Some(registry) = self.registry.upgrade() else {
            return false;
        };
        let mut registry = registry.lock().unwrap_or_else(PoisonError::into_inner);
        registry.entries.remove(&self.id).is_some()
    }
}

/// Batches a depth update stream on a fixed cadence.
///
/// Call [`DepthFeed::new`] then [`DepthFeed::start`]. Batches are delivered
/// to closures registered with [`DepthFeed::subscribe`] and published on a
/// `watch` channel ([`DepthFeed::subscribe_batches`]).
pub struct DepthFeed {
    source: Box<dyn UpdateSource>,
    config: FeedConfig,
    listeners: Listeners,
    /// Moved into the flush task on start, so receivers observe the task
    /// ending as a closed channel.
    batch_tx: Option<watch::Sender<Option<Arc<Batch>>>>,
    batch_rx: watch::Receiver<Option<Arc<Batch>>>,
    cancel: CancellationToken,
    task_handle: Option<JoinHandle<()>>,
    closed: bool,
}

impl DepthFeed {
    pub fn new(source: Box<dyn UpdateSource>, config: FeedConfig) -> Self {
        let (batch_tx, batch_rx) = watch::channel(None);
        Self {
            source,
            config,
            listeners: Listeners::default(),
            batch_tx: Some(batch_tx),
            batch_rx,
            cancel: CancellationToken::new(),
            task_handle: None,
            closed: false,
        }
    }

    /// Start the source and the flush task. Must be called within a tokio
    /// runtime.
    ///
    /// # Errors
    ///
    /// [`LadderError::AlreadyStarted`] if called twice or after
    /// [`close`](Self::close); otherwise whatever the source's `start`
    /// returns.
    pub fn start(&mut self) -> Result<()> {
        if self.batch_tx.is_none() || self.closed {
            return Err(LadderError::AlreadyStarted);
        }

        let (payload_tx, payload_rx) = mpsc::unbounded_channel();
        self.source.start(payload_tx)?;
        let batch_tx = self.batch_tx.take().ok_or(LadderError::AlreadyStarted)?;

        info!(
            source = self.source.name(),
            flush_interval = ?self.config.flush_interval,
            "depth feed starting"
        );

        let handle = tokio::spawn(run_flush_loop(
            payload_rx,
            self.config.flush_interval,
            self.listeners.clone(),
            batch_tx,
            self.cancel.clone(),
        ));
        self.task_handle = Some(handle);
        Ok(())
    }

    /// Register a listener for every emitted batch. Listeners run on the
    /// feed task in registration order and must not block.
    pub fn subscribe<F>(&self, listener: F) -> Subscription
    where
        F: Fn(&Batch) + Send + Sync + 'static,
    {
        let id = self.listeners.add(Arc::new(listener));
        Subscription {
            id,
            registry: Arc::downgrade(&self.listeners.inner),
        }
    }

    /// Number of registered listeners.
    pub fn listener_count(&self) -> usize {
        self.listeners.len()
    }

    /// Clone a `watch::Receiver` holding the most recent batch. `changed()`
    /// errors once the feed task has exited (source ended or feed closed).
    pub fn subscribe_batches(&self) -> watch::Receiver<Option<Arc<Batch>>> {
        self.batch_rx.clone()
    }

    /// Most recently emitted batch, if any.
    pub fn latest_batch(&self) -> Option<Arc<Batch>> {
        self.batch_rx.borrow().clone()
    }

    /// Stop the flush timer and close the source.
    ///
    /// Best effort: a failing source close is logged and ignored. Updates
    /// buffered since the last flush are discarded. Calling `close` more
    /// than once is a no-op.
    pub fn close(&mut self) {
        if self.closed {
            return;
        }
        self.closed = true;
        self.batch_tx.take();
        self.cancel.cancel();
        if let Some(handle) = self.task_handle.take() {
            handle.abort();
        }
        if let Err(e) = self.source.close() {
            warn!(source = self.source.name(), error = %e, "ignoring source close failure");
        }
    }
}

impl Drop for DepthFeed {
    fn drop(&mut self) {
        self.close();
    }
}

/// Owns the buffer: decode and append on arrival, flush on every tick.
async fn run_flush_loop(
    mut payload_rx: mpsc::UnboundedReceiver<Payload>,
    flush_interval: Duration,
    listeners: Listeners,
    batch_tx: watch::Sender<Option<Arc<Batch>>>,
    cancel: CancellationToken,
) {
    let mut buffer = BatchBuffer::new();
    let mut flush = time::interval(flush_interval);
    flush.set_missed_tick_behavior(MissedTickBehavior::Delay);
    let mut dropped: u64 = 0;

    loop {
        tokio::select! {
            biased;

            _ = cancel.cancelled() => {
                debug!(pending = buffer.len(), "depth feed closed, discarding buffer");
                buffer.clear();
                return;
            }

            _ = flush.tick() => {
                if let Some(batch) = buffer.flush() {
                    publish(&listeners, &batch_tx, batch);
                }
            }

            payload = payload_rx.recv() => match payload {
                Some(payload) => match decode(payload) {
                    Decoded::Update(update) => buffer.push(update),
                    Decoded::Undecoded(payload) => {
                        dropped += 1;
                        debug!(bytes = payload_len(&payload), dropped, "dropping undecodable payload");
                    }
                },
                None => {
                    info!(pending = buffer.len(), "update source ended");
                    if let Some(batch) = buffer.flush() {
                        publish(&listeners, &batch_tx, batch);
                    }
                    return;
                }
            },
        }
    }
}

fn publish(listeners: &Listeners, batch_tx: &watch::Sender<Option<Arc<Batch>>>, batch: Batch) {
    debug!(
        bids = batch.bids.len(),
        asks = batch.asks.len(),
        update_id = ?batch.update_id,
        "flushing batch"
    );
    let batch = Arc::new(batch);
    listeners.emit(&batch);
    batch_tx.send_replace(Some(batch));
}

fn payload_len(payload: &Payload) -> usize {
    match payload {
        Payload::Text(text) => text.len(),
        Payload::Binary(bytes) => bytes.len(),
    }
}
