//! High-level book mirror handle

use crate::builder::{BookMirrorBuilder, CredentialSource};
use kucoin_auth::{Credentials, TokenProvider};
use kucoin_book::{BestBidAsk, BookSnapshot};
use kucoin_rest::{ClientConfig, RestClient};
use kucoin_types::{FeedError, FeedResult, Instrument};
use kucoin_ws::{
    Connector, FeedContext, FeedEvent, FeedState, SnapshotLoader, SnapshotSource, StatsSnapshot,
    Supervisor, TokenSource, WsConnector,
};
use rust_decimal::Decimal;
use std::sync::Arc;
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tracing::{error, info, instrument};

/// Running mirror of KuCoin full-depth books
///
/// The feed runs on a background task; reads take immutable copies of the
/// books and never block it for long.
///
/// # Example
///
/// ```no_run
/// use kucoin_sdk::BookMirror;
///
/// #[tokio::main]
/// async fn main() -> Result<(), Box<dyn std::error::Error>> {
///     let mut mirror = BookMirror::builder(["BTC-USDT", "ETH-USDT"]).start()?;
///
///     let mut events = mirror.events().unwrap();
///     while let Some(event) = events.recv().await {
///         println!("{:?}", event);
///         if let Some(top) = mirror.best_bid_ask("BTC-USDT") {
///             println!("BTC-USDT top: {:?}", top);
///         }
///     }
///
///     Ok(())
/// }
/// ```
pub struct BookMirror<S = RestClient> {
    ctx: Arc<FeedContext<S>>,
    event_rx: Option<mpsc::UnboundedReceiver<FeedEvent>>,
    task: Option<JoinHandle<FeedResult<()>>>,
}

impl BookMirror {
    /// Create a new mirror builder
    pub fn builder(instruments: impl IntoIterator<Item = impl Into<String>>) -> BookMirrorBuilder {
        BookMirrorBuilder::new(instruments)
    }
}

impl<S: SnapshotSource + 'static> BookMirror<S> {
    /// Spawn `supervisor` and wrap it
    ///
    /// `events` must be the receiver paired with the supervisor's context.
    pub fn from_supervisor<C, T>(
        supervisor: Supervisor<C, T, S>,
        events: mpsc::UnboundedReceiver<FeedEvent>,
    ) -> Self
    where
        C: Connector + 'static,
        T: TokenSource + 'static,
    {
        let ctx = Arc::clone(supervisor.context());
        let task = tokio::spawn(async move {
            let result = supervisor.run().await;
            if let Err(e) = &result {
                error!("Feed stopped: {}", e);
            }
            result
        });

        Self {
            ctx,
            event_rx: Some(events),
            task: Some(task),
        }
    }

    /// Supervisor state
    pub fn state(&self) -> FeedState {
        self.ctx.state()
    }

    /// Whether books are being kept current
    pub fn is_streaming(&self) -> bool {
        self.state().is_streaming()
    }

    /// Mirrored instruments
    pub fn instruments(&self) -> &[Instrument] {
        &self.ctx.config.instruments
    }

    /// Immutable copy of a book
    pub fn current_book(&self, instrument: &str) -> Option<BookSnapshot> {
        self.ctx.store.current_book(instrument)
    }

    /// Best bid and ask of a book
    pub fn best_bid_ask(&self, instrument: &str) -> Option<BestBidAsk> {
        self.ctx.store.best_bid_ask(instrument)
    }

    /// Sequence a book is at
    pub fn sequence(&self, instrument: &str) -> Option<u64> {
        self.ctx.store.sequence(instrument)
    }

    /// Best ask minus best bid
    pub fn spread(&self, instrument: &str) -> Option<Decimal> {
        self.current_book(instrument).and_then(|book| book.spread())
    }

    /// Midpoint of best bid and ask
    pub fn mid_price(&self, instrument: &str) -> Option<Decimal> {
        self.current_book(instrument).and_then(|book| book.mid_price())
    }

    /// Feed counters
    pub fn stats(&self) -> StatsSnapshot {
        self.ctx.stats.snapshot()
    }

    /// Take the event receiver (can only be called once)
    pub fn events(&mut self) -> Option<mpsc::UnboundedReceiver<FeedEvent>> {
        self.event_rx.take()
    }

    /// Request graceful shutdown
    #[instrument(skip(self))]
    pub fn shutdown(&self) {
        self.ctx.shutdown.trigger();
    }

    /// Wait for the feed task to finish
    pub async fn join(&mut self) -> FeedResult<()> {
        match self.task.take() {
            Some(task) => task
                .await
                .map_err(|e| FeedError::Transport(format!("feed task failed: {}", e)))?,
            None => Ok(()),
        }
    }

    /// Shut down and wait for the feed task
    pub async fn stop(mut self) -> FeedResult<()> {
        self.shutdown();
        self.join().await
    }
}

impl BookMirrorBuilder {
    /// Validate, build the live stack and spawn the feed
    ///
    /// Must be called from within a tokio runtime.
    #[instrument(skip(self), fields(instruments = ?self.instruments))]
    pub fn start(self) -> FeedResult<BookMirror> {
        let config = self.feed_config()?;
        let credentials = match self.credentials {
            CredentialSource::Environment => Some(Credentials::from_env()?),
            CredentialSource::Explicit(credentials) => Some(credentials),
            CredentialSource::Anonymous => None,
        };

        let mut rest_config = ClientConfig::new()
            .with_base_url(config.rest_base_url.clone())
            .with_timeout(config.rest_timeout.as_secs().max(1));
        if let Some(credentials) = credentials.clone() {
            rest_config = rest_config.with_credentials(credentials);
        }
        let rest = RestClient::with_config(rest_config)?;
        let tokens =
            TokenProvider::with_base_url(config.rest_base_url.clone(), credentials, config.rest_timeout)?;

        let loader = SnapshotLoader::new(rest, config.rest_backoff.clone(), config.rest_min_interval);
        let connector = WsConnector::new(config.connect_timeout);
        let (tx, rx) = mpsc::unbounded_channel();
        let ctx = Arc::new(FeedContext::new(config, loader, tx));

        info!(
            "Book mirror started for {:?}, snapshots in {}",
            ctx.config.instruments,
            ctx.config.snapshot_dir.display()
        );
        Ok(BookMirror::from_supervisor(
            Supervisor::new(connector, tokens, ctx),
            rx,
        ))
    }
}
