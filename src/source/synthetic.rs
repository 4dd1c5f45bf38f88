//! Synthetic depth generator for demos and tests.
//!
//! Emits one `depthUpdate` roughly every 5 ms. The mid price drifts on a slow
//! sine wave driven by the sequence counter; each message carries ten bid
//! levels below and ten ask levels above it with jittered prices and random
//! positive quantities. Messages are serialized to JSON text so they travel
//! through the decoder like live frames.

use std::time::{SystemTime, UNIX_EPOCH};

use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};
use tokio::sync::mpsc;
use tokio::time::{self, MissedTickBehavior};
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use crate::config::SyntheticConfig;
use crate::decoder::Payload;
use crate::error::{LadderError, Result};
use crate::source::UpdateSource;
use crate::types::{DepthUpdate, RawLevel};

/// Smallest generated quantity; keeps every level a resting order.
const MIN_QUANTITY: f64 = 0.000_001;

/// Random-walk [`UpdateSource`].
pub struct SyntheticSource {
    config: SyntheticConfig,
    cancel: Option<CancellationToken>,
}

impl SyntheticSource {
    pub fn new(config: SyntheticConfig) -> Self {
        Self {
            config,
            cancel: None,
        }
    }
}

impl UpdateSource for SyntheticSource {
    fn name(&self) -> &'static str {
        "synthetic"
    }

    fn start(&mut self, tx: mpsc::UnboundedSender<Payload>) -> Result<()> {
        if self.cancel.is_some() {
            return Err(LadderError::AlreadyStarted);
        }
        let cancel = CancellationToken::new();
        self.cancel = Some(cancel.clone());
        let config = self.config.clone();

        tokio::spawn(async move {
            info!(symbol = %config.symbol, interval = ?config.interval, "synthetic source starting");
            let mut rng = StdRng::from_entropy();
            let mut seq: u64 = 1;
            let mut interval = time::interval(config.interval);
            interval.set_missed_tick_behavior(MissedTickBehavior::Delay);

            loop {
                tokio::select! {
                    _ = cancel.cancelled() => {
                        debug!(seq, "synthetic source stopped");
                        return;
                    }
                    _ = interval.tick() => {
                        let update = generate_update(&config, seq, epoch_ms(), &mut rng);
                        match serde_json::to_string(&update) {
                            Ok(text) => {
                                if tx.send(Payload::Text(text)).is_err() {
                                    debug!("payload receiver dropped, stopping synthetic source");
                                    return;
                                }
                            }
                            Err(e) => warn!(error = %e, "failed to encode synthetic update"),
                        }
                        seq += 1;
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

impl Drop for SyntheticSource {
    fn drop(&mut self) {
        if let Some(cancel) = self.cancel.take() {
            cancel.cancel();
        }
    }
}

/// Build the update with sequence number `seq`.
pub fn generate_update<R: Rng>(
    config: &SyntheticConfig,
    seq: u64,
    event_time: u64,
    rng: &mut R,
) -> DepthUpdate {
    let center = config.base_price + (seq as f64 / 100.0).sin() * config.amplitude;
    let mut bids = Vec::with_capacity(config.levels);
    let mut asks = Vec::with_capacity(config.levels);

    for i in 0..config.levels {
        let offset = i as f64 * config.level_step;
        let bid = center - offset - rng.gen::<f64>() * config.jitter;
        let ask = center + offset + rng.gen::<f64>() * config.jitter;
        bids.push(RawLevel::new(format!("{bid:.2}"), quantity(config, rng)));
        asks.push(RawLevel::new(format!("{ask:.2}"), quantity(config, rng)));
    }

    DepthUpdate {
        e: Some("depthUpdate".to_string()),
        event_time: Some(event_time),
        s: Some(config.symbol.clone()),
        update_id: Some(seq),
        bids,
        asks,
    }
}

fn quantity<R: Rng>(config: &SyntheticConfig, rng: &mut R) -> String {
    format!("{:.6}", rng.gen_range(MIN_QUANTITY..config.max_quantity))
}

/// Current wall-clock time in epoch milliseconds.
fn epoch_ms() -> u64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .unwrap_or_default()
        .as_millis() as u64
}

#[cfg(test)]
mod tests {
    use std::time::Duration;

    use super::*;
    use crate::decoder::decode;

    fn seeded() -> StdRng {
        StdRng::seed_from_u64(7)
    }

    #[test]
    fn update_has_ten_levels_per_side() {
        let config = SyntheticConfig::default();
        let update = generate_update(&config, 1, 1_700_000_000_000, &mut seeded());
        assert_eq!(update.bids.len(), 10);
        assert_eq!(update.asks.len(), 10);
        assert_eq!(update.e.as_deref(), Some("depthUpdate"));
        assert_eq!(update.s.as_deref(), Some("BTCUSDT"));
        assert_eq!(update.update_id, Some(1));
        assert_eq!(update.event_time, Some(1_700_000_000_000));
    }

    #[test]
    fn bids_step_down_and_asks_step_up() {
        let config = SyntheticConfig::default();
        let mut rng = seeded();
        for seq in [1, 50, 157, 314] {
            let update = generate_update(&config, seq, 0, &mut rng);
            let bids: Vec<f64> = update.bids.iter().map(|l| l.price().unwrap()).collect();
            let asks: Vec<f64> = update.asks.iter().map(|l| l.price().unwrap()).collect();
            assert!(bids.windows(2).all(|w| w[0] > w[1]), "bids {bids:?}");
            assert!(asks.windows(2).all(|w| w[0] < w[1]), "asks {asks:?}");
            assert!(bids[0] <= asks[0]);
        }
    }

    #[test]
    fn prices_stay_within_drift_band() {
        let config = SyntheticConfig::default();
        let mut rng = seeded();
        let low = config.base_price - config.amplitude - 10.0 * config.level_step;
        let high = config.base_price + config.amplitude + 10.0 * config.level_step;
        for seq in 1..1_000 {
            let update = generate_update(&config, seq, 0, &mut rng);
            for level in update.bids.iter().chain(&update.asks) {
                let price = level.price().unwrap();
                assert!((low..=high).contains(&price), "price {price} out of band");
            }
        }
    }

    #[test]
    fn quantities_are_positive_and_bounded() {
        let config = SyntheticConfig::default();
        let mut rng = seeded();
        for seq in 1..200 {
            let update = generate_update(&config, seq, 0, &mut rng);
            for level in update.bids.iter().chain(&update.asks) {
                let qty = level.quantity().unwrap();
                assert!(qty > 0.0 && qty <= config.max_quantity, "qty {qty}");
            }
        }
    }

    #[test]
    fn close_before_start_is_an_error() {
        let mut source = SyntheticSource::new(SyntheticConfig::default());
        assert!(matches!(source.close(), Err(LadderError::NotStarted)));
    }

    #[tokio::test(start_paused = true)]
    async fn emits_sequential_decodable_payloads() {
        let mut source = SyntheticSource::new(SyntheticConfig::default());
        let (tx, mut rx) = mpsc::unbounded_channel();
        source.start(tx).unwrap();

        time::sleep(Duration::from_millis(50)).await;
        source.close().unwrap();

        let mut ids = Vec::new();
        while let Ok(payload) = rx.try_recv() {
            let update = decode(payload).into_update().expect("synthetic payload decodes");
            ids.push(update.update_id.unwrap());
        }
        assert!(ids.len() >= 5, "only {} payloads", ids.len());
        assert_eq!(ids[0], 1);
        assert!(ids.windows(2).all(|w| w[1] == w[0] + 1));
    }

    #[tokio::test]
    async fn start_twice_is_rejected() {
        let mut source = SyntheticSource::new(SyntheticConfig::default());
        let (tx, _rx) = mpsc::unbounded_channel();
        source.start(tx.clone()).unwrap();
        assert!(matches!(source.start(tx), Err(LadderError::AlreadyStarted)));
        source.close().unwrap();
    }
}
