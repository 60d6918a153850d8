//! Snapshot Loader: REST full-depth fetches for initial loads and verification
//!
//! Fetches are paced (one call per `min_interval`) and retried with the REST
//! backoff until they succeed.

use crate::backoff::{retry, BackoffPolicy};
use async_trait::async_trait;
use kucoin_auth::{TokenProvider, WsToken};
use kucoin_book::{BookStore, VerificationRequest};
use kucoin_rest::RestClient;
use kucoin_types::{DepthSnapshot, FeedResult, Instrument};
use std::time::Duration;
use tokio::sync::Mutex;
use tokio::time::Instant;
use tracing::{debug, instrument};

/// Source of full-depth snapshots
#[async_trait]
pub trait SnapshotSource: Send + Sync {
    /// Fetch the full-depth book of one instrument
    async fn full_depth(&self, instrument: &Instrument) -> FeedResult<DepthSnapshot>;
}

#[async_trait]
impl SnapshotSource for RestClient {
    async fn full_depth(&self, instrument: &Instrument) -> FeedResult<DepthSnapshot> {
        Ok(RestClient::full_depth(self, instrument).await?)
    }
}

/// Source of websocket connection tokens
#[async_trait]
pub trait TokenSource: Send + Sync {
    /// Request a token for the public channels
    async fn public_token(&self) -> FeedResult<WsToken>;
}

#[async_trait]
impl TokenSource for TokenProvider {
    async fn public_token(&self) -> FeedResult<WsToken> {
        Ok(self.fetch_public_token().await?)
    }
}

/// What a load is for
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LoadMode {
    /// Replace the book wholesale
    Initial,
    /// Arm a verification if the snapshot is ahead of the live book
    Verification,
}

/// Result of applying a fetched snapshot
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LoadOutcome {
    /// The book was replaced at this sequence
    Loaded { sequence: u64 },
    /// A verification is now pending at this target
    VerificationArmed { target: u64 },
    /// The snapshot was not ahead of the live book; nothing armed
    NotFresher { fetched: u64, live: u64 },
}

/// Paced, retrying snapshot fetcher
pub struct SnapshotLoader<S> {
    source: S,
    backoff: BackoffPolicy,
    min_interval: Duration,
    last_call: Mutex<Option<Instant>>,
}

impl<S: SnapshotSource> SnapshotLoader<S> {
    /// Create a loader
    pub fn new(source: S, backoff: BackoffPolicy, min_interval: Duration) -> Self {
        Self {
            source,
            backoff,
            min_interval,
            last_call: Mutex::new(None),
        }
    }

    /// Underlying source
    pub fn source(&self) -> &S {
        &self.source
    }

    /// Fetch a snapshot, retrying until it succeeds or fails for good
    #[instrument(skip(self), fields(instrument = %instrument))]
    pub async fn fetch(&self, instrument: &Instrument) -> FeedResult<DepthSnapshot> {
        let this = self;
        retry(&self.backoff, "full-depth snapshot", move || async move {
            this.pace().await;
            this.source.full_depth(instrument).await
        })
        .await
    }

    async fn pace(&self) {
        let mut last = self.last_call.lock().await;
        if let Some(previous) = *last {
            let ready_at = previous + self.min_interval;
            if ready_at > Instant::now() {
                debug!(
                    wait_ms = (ready_at - Instant::now()).as_millis() as u64,
                    "Pacing REST call"
                );
                tokio::time::sleep_until(ready_at).await;
            }
        }
        *last = Some(Instant::now());
    }
}

/// Apply a fetched snapshot to the store or the pending verification slot
pub fn apply_load(
    store: &BookStore,
    pending: &mut Option<VerificationRequest>,
    instrument: &Instrument,
    depth: DepthSnapshot,
    mode: LoadMode,
) -> LoadOutcome {
    match mode {
        LoadMode::Initial => {
            store.replace(instrument, depth.sequence, &depth.bids, &depth.asks);
            LoadOutcome::Loaded {
                sequence: depth.sequence,
            }
        }
        LoadMode::Verification => {
            let live = store.sequence(instrument.as_str()).unwrap_or(0);
            if depth.sequence > live {
                let target = depth.sequence;
                *pending = Some(VerificationRequest::new(
                    instrument.clone(),
                    target,
                    depth.bids,
                    depth.asks,
                ));
                LoadOutcome::VerificationArmed { target }
            } else {
                LoadOutcome::NotFresher {
                    fetched: depth.sequence,
                    live,
                }
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use kucoin_types::{FeedError, Level};
    use rust_decimal_macros::dec;
    use std::sync::atomic::{AtomicU32, Ordering};

    struct Flaky {
        failures: u32,
        calls: AtomicU32,
        sequence: u64,
    }

    #[async_trait]
    impl SnapshotSource for Flaky {
        async fn full_depth(&self, _instrument: &Instrument) -> FeedResult<DepthSnapshot> {
            let n = self.calls.fetch_add(1, Ordering::SeqCst);
            if n < self.failures {
                return Err(FeedError::rest_call("/api/v3/market/orderbook/level2", "429000"));
            }
            Ok(depth(self.sequence))
        }
    }

    fn depth(sequence: u64) -> DepthSnapshot {
        DepthSnapshot {
            sequence,
            bids: vec![Level::new(dec!(9.5), dec!(3))],
            asks: vec![Level::new(dec!(10), dec!(1))],
            time: None,
        }
    }

    #[tokio::test(start_paused = true)]
    async fn test_fetch_retries_with_backoff() {
        let loader = SnapshotLoader::new(
            Flaky {
                failures: 2,
                calls: AtomicU32::new(0),
                sequence: 50,
            },
            BackoffPolicy::rest_default(),
            Duration::from_millis(3500),
        );

        let started = Instant::now();
        let got = loader.fetch(&Instrument::from("BTC-USDT")).await.unwrap();
        assert_eq!(got.sequence, 50);
        assert_eq!(loader.source().calls.load(Ordering::SeqCst), 3);
        // 20 s + 22 s of backoff
        assert!(started.elapsed() >= Duration::from_secs(42));
    }

    #[tokio::test(start_paused = true)]
    async fn test_fetches_are_paced() {
        let loader = SnapshotLoader::new(
            Flaky {
                failures: 0,
                calls: AtomicU32::new(0),
                sequence: 1,
            },
            BackoffPolicy::rest_default(),
            Duration::from_millis(3500),
        );

        let started = Instant::now();
        loader.fetch(&Instrument::from("BTC-USDT")).await.unwrap();
        loader.fetch(&Instrument::from("ETH-USDT")).await.unwrap();
        assert!(started.elapsed() >= Duration::from_millis(3500));
    }

    #[test]
    fn test_initial_load_replaces_book() {
        let instrument = Instrument::from("BTC-USDT");
        let store = BookStore::new(&[instrument.clone()]);
        let mut pending = None;

        let outcome = apply_load(&store, &mut pending, &instrument, depth(77), LoadMode::Initial);
        assert_eq!(outcome, LoadOutcome::Loaded { sequence: 77 });
        assert_eq!(store.sequence("BTC-USDT"), Some(77));
        assert!(pending.is_none());
    }

    #[test]
    fn test_verification_load_arms_when_fresher() {
        let instrument = Instrument::from("BTC-USDT");
        let store = BookStore::new(&[instrument.clone()]);
        store.replace(&instrument, 100, &[], &[]);
        let mut pending = None;

        let outcome = apply_load(&store, &mut pending, &instrument, depth(120), LoadMode::Verification);
        assert_eq!(outcome, LoadOutcome::VerificationArmed { target: 120 });
        assert_eq!(pending.as_ref().unwrap().target_sequence, 120);
        // book untouched
        assert_eq!(store.sequence("BTC-USDT"), Some(100));
    }

    #[test]
    fn test_verification_load_rejects_stale_snapshot() {
        let instrument = Instrument::from("BTC-USDT");
        let store = BookStore::new(&[instrument.clone()]);
        store.replace(&instrument, 100, &[], &[]);
        let mut pending = None;

        let outcome = apply_load(&store, &mut pending, &instrument, depth(100), LoadMode::Verification);
        assert_eq!(outcome, LoadOutcome::NotFresher { fetched: 100, live: 100 });
        assert!(pending.is_none());
    }
}
