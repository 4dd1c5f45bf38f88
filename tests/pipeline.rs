//! End-to-end tests for the batching feed, driven on tokio's paused clock.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use depth_ladder::{
    Batch, DepthFeed, FeedConfig, LadderError, LadderView, Payload, RawLevel, Result,
    SyntheticConfig, SyntheticSource, TickSize, UpdateSource, DEFAULT_DEPTH,
};
use tokio::sync::mpsc;
use tokio::time;

// ---------------------------------------------------------------------------
// Scripted source: the test pushes payloads by hand
// ---------------------------------------------------------------------------

type Slot = Arc<Mutex<Option<mpsc::UnboundedSender<Payload>>>>;

struct ScriptedSource {
    slot: Slot,
    closed: Arc<AtomicBool>,
    fail_close: bool,
}

impl UpdateSource for ScriptedSource {
    fn name(&self) -> &'static str {
        "scripted"
    }

    fn start(&mut self, tx: mpsc::UnboundedSender<Payload>) -> Result<()> {
        *self.slot.lock().unwrap() = Some(tx);
        Ok(())
    }

    fn close(&mut self) -> Result<()> {
        self.closed.store(true, Ordering::SeqCst);
        self.slot.lock().unwrap().take();
        if self.fail_close {
            Err(LadderError::ConnectionClosed)
        } else {
            Ok(())
        }
    }
}

struct Script {
    slot: Slot,
    closed: Arc<AtomicBool>,
}

impl Script {
    fn send(&self, payload: impl Into<Payload>) {
        let slot = self.slot.lock().unwrap();
        slot.as_ref().expect("source started").send(payload.into()).unwrap();
    }

    fn update(&self, id: u64, bid: &str, ask: &str) {
        self.send(format!(
            r#"{{"e":"depthUpdate","E":{},"s":"BTCUSDT","U":{id},"bids":[["{bid}","1"]],"asks":[["{ask}","2"]]}}"#,
            1_700_000_000_000u64 + id
        ));
    }

    /// Drop the sender, as a source that ran out of data would.
    fn finish(&self) {
        self.slot.lock().unwrap().take();
    }
}

fn scripted(fail_close: bool) -> (Box<dyn UpdateSource>, Script) {
    let slot: Slot = Arc::new(Mutex::new(None));
    let closed = Arc::new(AtomicBool::new(false));
    let source = ScriptedSource {
        slot: Arc::clone(&slot),
        closed: Arc::clone(&closed),
        fail_close,
    };
    (Box::new(source), Script { slot, closed })
}

fn collect(feed: &DepthFeed) -> Arc<Mutex<Vec<Batch>>> {
    let seen = Arc::new(Mutex::new(Vec::new()));
    let sink = Arc::clone(&seen);
    let _sub = feed.subscribe(move |batch: &Batch| sink.lock().unwrap().push(batch.clone()));
    seen
}

fn feed_with(source: Box<dyn UpdateSource>) -> DepthFeed {
    DepthFeed::new(
        source,
        FeedConfig {
            flush_interval: Duration::from_millis(100),
        },
    )
}

// ---------------------------------------------------------------------------
// Flush cadence
// ---------------------------------------------------------------------------

#[tokio::test(start_paused = true)]
async fn quiet_window_emits_nothing() {
    let (source, _script) = scripted(false);
    let mut feed = feed_with(source);
    let seen = collect(&feed);
    feed.start().unwrap();

    time::sleep(Duration::from_millis(550)).await;
    assert!(seen.lock().unwrap().is_empty());
    assert!(feed.latest_batch().is_none());
}

#[tokio::test(start_paused = true)]
async fn messages_in_one_window_coalesce_into_one_batch() {
    let (source, script) = scripted(false);
    let mut feed = feed_with(source);
    let seen = collect(&feed);
    feed.start().unwrap();

    script.update(1, "100.05", "100.25");
    script.update(2, "100.06", "100.26");
    script.update(3, "100.14", "100.27");

    time::sleep(Duration::from_millis(150)).await;
    {
        let seen = seen.lock().unwrap();
        assert_eq!(seen.len(), 1);
        let batch = &seen[0];
        assert_eq!(
            batch.bids,
            vec![
                RawLevel::new("100.05", "1"),
                RawLevel::new("100.06", "1"),
                RawLevel::new("100.14", "1"),
            ]
        );
        assert_eq!(batch.asks.len(), 3);
        assert_eq!(batch.update_id, Some(3));
        assert_eq!(batch.event_time, Some(1_700_000_000_003));
    }

    // Nothing new arrives: no further emissions.
    time::sleep(Duration::from_millis(300)).await;
    assert_eq!(seen.lock().unwrap().len(), 1);
}

#[tokio::test(start_paused = true)]
async fn separate_windows_emit_separate_batches() {
    let (source, script) = scripted(false);
    let mut feed = feed_with(source);
    let seen = collect(&feed);
    feed.start().unwrap();

    script.update(1, "100", "101");
    time::sleep(Duration::from_millis(150)).await;
    script.update(2, "99", "102");
    script.update(3, "98", "103");
    time::sleep(Duration::from_millis(100)).await;

    let seen = seen.lock().unwrap();
    assert_eq!(seen.len(), 2);
    assert_eq!(seen[0].update_id, Some(1));
    assert_eq!(seen[0].bids.len(), 1);
    assert_eq!(seen[1].update_id, Some(3));
    assert_eq!(seen[1].bids.len(), 2);
}

#[tokio::test(start_paused = true)]
async fn undecodable_payloads_are_dropped() {
    let (source, script) = scripted(false);
    let mut feed = feed_with(source);
    let seen = collect(&feed);
    feed.start().unwrap();

    script.send("not json");
    script.send(vec![0xffu8, 0x00, 0x7b]);
    script.send(r#"{"result":null,"id":1}"#);
    script.update(7, "100", "101");
    time::sleep(Duration::from_millis(150)).await;

    // A window with only garbage emits nothing.
    script.send("{");
    time::sleep(Duration::from_millis(200)).await;

    let seen = seen.lock().unwrap();
    assert_eq!(seen.len(), 1);
    assert_eq!(seen[0].update_id, Some(7));
    assert_eq!(seen[0].bids, vec![RawLevel::new("100", "1")]);
}

#[tokio::test(start_paused = true)]
async fn binary_frames_are_decoded() {
    let (source, script) = scripted(false);
    let mut feed = feed_with(source);
    let seen = collect(&feed);
    feed.start().unwrap();

    let text = r#"{"U":5,"bids":[[100.5,1.5]],"asks":[]}"#;
    script.send(text.as_bytes().to_vec());
    time::sleep(Duration::from_millis(150)).await;

    let seen = seen.lock().unwrap();
    assert_eq!(seen.len(), 1);
    assert_eq!(seen[0].bids, vec![RawLevel::new(100.5, 1.5)]);
}

#[tokio::test(start_paused = true)]
async fn bad_levels_do_not_cost_the_message() {
    let (source, script) = scripted(false);
    let mut feed = feed_with(source);
    let mut rx = feed.subscribe_batches();
    feed.start().unwrap();

    script.send(r#"{"E":1700000000000.0,"U":9,"bids":[["100.05","1"],[null,"2"],["99.9","1","x"]],"asks":[]}"#);
    rx.changed().await.unwrap();

    let batch = rx.borrow_and_update().clone().unwrap();
    assert_eq!(batch.event_time, Some(1_700_000_000_000));
    assert_eq!(batch.bids.len(), 3);

    let mut view = LadderView::new(TickSize::Tenth, DEFAULT_DEPTH);
    let snapshot = view.on_batch(batch).cloned().unwrap();
    let prices: Vec<f64> = snapshot.bids.iter().map(|l| l.price).collect();
    assert_eq!(prices, vec![100.0, 99.9]);
}

// ---------------------------------------------------------------------------
// Subscribers
// ---------------------------------------------------------------------------

#[tokio::test(start_paused = true)]
async fn unsubscribed_listener_stops_receiving() {
    let (source, script) = scripted(false);
    let mut feed = feed_with(source);
    let kept = collect(&feed);

    let dropped = Arc::new(Mutex::new(0usize));
    let counter = Arc::clone(&dropped);
    let sub = feed.subscribe(move |_: &Batch| *counter.lock().unwrap() += 1);
    assert_eq!(feed.listener_count(), 2);
    feed.start().unwrap();

    script.update(1, "100", "101");
    time::sleep(Duration::from_millis(150)).await;
    assert!(sub.unsubscribe());
    assert_eq!(feed.listener_count(), 1);

    script.update(2, "100", "101");
    time::sleep(Duration::from_millis(100)).await;

    assert_eq!(*dropped.lock().unwrap(), 1);
    assert_eq!(kept.lock().unwrap().len(), 2);
}

#[tokio::test(start_paused = true)]
async fn watch_channel_tracks_latest_batch() {
    let (source, script) = scripted(false);
    let mut feed = feed_with(source);
    let mut rx = feed.subscribe_batches();
    feed.start().unwrap();

    script.update(41, "100", "101");
    script.update(42, "100", "101");
    rx.changed().await.unwrap();

    let latest = rx.borrow_and_update().clone().unwrap();
    assert_eq!(latest.update_id, Some(42));
    assert_eq!(feed.latest_batch().unwrap().update_id, Some(42));
}

// ---------------------------------------------------------------------------
// Lifecycle
// ---------------------------------------------------------------------------

#[tokio::test(start_paused = true)]
async fn close_discards_buffer_and_swallows_source_errors() {
    let (source, script) = scripted(true);
    let mut feed = feed_with(source);
    let seen = collect(&feed);
    let mut rx = feed.subscribe_batches();
    feed.start().unwrap();

    script.update(1, "100", "101");
    time::sleep(Duration::from_millis(10)).await;
    feed.close();
    assert!(script.closed.load(Ordering::SeqCst));

    time::sleep(Duration::from_millis(300)).await;
    assert!(seen.lock().unwrap().is_empty());
    assert!(rx.changed().await.is_err(), "watch closes with the feed");

    // Idempotent.
    feed.close();
}

#[tokio::test(start_paused = true)]
async fn ended_source_flushes_what_is_buffered() {
    let (source, script) = scripted(false);
    let mut feed = feed_with(source);
    let seen = collect(&feed);
    let mut rx = feed.subscribe_batches();
    feed.start().unwrap();

    script.update(1, "100", "101");
    script.update(2, "99", "102");
    script.finish();
    time::sleep(Duration::from_millis(10)).await;

    {
        let seen = seen.lock().unwrap();
        assert_eq!(seen.len(), 1);
        assert_eq!(seen[0].update_id, Some(2));
    }

    // The final batch is still observed, then the channel reports the end.
    rx.changed().await.unwrap();
    assert_eq!(rx.borrow_and_update().as_ref().unwrap().update_id, Some(2));
    assert!(rx.changed().await.is_err());
    assert_eq!(feed.latest_batch().unwrap().update_id, Some(2));
}

#[tokio::test]
async fn closing_unstarted_feed_ends_watch() {
    let (source, _script) = scripted(false);
    let mut feed = feed_with(source);
    let mut rx = feed.subscribe_batches();
    feed.close();
    assert!(rx.changed().await.is_err());
}

#[tokio::test]
async fn start_is_single_shot() {
    let (source, _script) = scripted(false);
    let mut feed = feed_with(source);
    feed.start().unwrap();
    assert!(matches!(feed.start(), Err(LadderError::AlreadyStarted)));
    feed.close();
    assert!(matches!(feed.start(), Err(LadderError::AlreadyStarted)));
}

// ---------------------------------------------------------------------------
// Synthetic source through the whole pipeline
// ---------------------------------------------------------------------------

#[tokio::test(start_paused = true)]
async fn synthetic_feed_produces_sorted_ladders() {
    let source = SyntheticSource::new(SyntheticConfig::default());
    let mut feed = feed_with(Box::new(source));
    let mut rx = feed.subscribe_batches();
    feed.start().unwrap();

    let mut view = LadderView::new(TickSize::Hundredth, DEFAULT_DEPTH);
    let mut published = 0;
    for _ in 0..5 {
        rx.changed().await.unwrap();
        let batch = rx.borrow_and_update().clone().unwrap();
        assert!(!batch.bids.is_empty());
        assert_eq!(batch.bids.len() % 10, 0, "ten levels per message");

        if let Some(snapshot) = view.on_batch(batch) {
            published += 1;
            assert!(snapshot.bids.len() <= DEFAULT_DEPTH);
            assert!(snapshot.asks.len() <= DEFAULT_DEPTH);
            assert!(snapshot.bids.windows(2).all(|w| w[0].price > w[1].price));
            assert!(snapshot.asks.windows(2).all(|w| w[0].price < w[1].price));
            assert!(snapshot.fill_ratio(&snapshot.bids[0]) <= 1.0);
        }
    }
    assert!(published >= 1);

    // Regroup the last batch at a coarser tick without waiting for a flush.
    let coarse = view.set_tick(TickSize::One).cloned().unwrap();
    assert!(coarse.bids.len() <= DEFAULT_DEPTH);
    assert!(coarse
        .bids
        .iter()
        .chain(&coarse.asks)
        .all(|l| l.price.fract() == 0.0));

    feed.close();
}
