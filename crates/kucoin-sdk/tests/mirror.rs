//! BookMirror tests against a scripted feed
//!
//! The live test needs `KUCOIN_API_KEY`, `KUCOIN_API_SECRET` and
//! `KUCOIN_API_PASSPHRASE`; run it with `cargo test -- --ignored`.

use async_trait::async_trait;
use kucoin_auth::WsToken;
use kucoin_sdk::prelude::*;
use kucoin_ws::{
    FeedContext, MockConnector, MockTransport, SnapshotLoader, SnapshotSource, Supervisor,
    TokenSource,
};
use rust_decimal_macros::dec;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::mpsc;

const BTC: &str = "BTC-USDT";

fn ack(id: u64) -> String {
    format!(r#"{{"id":"{:010}","type":"ack"}}"#, id)
}

fn bid(sequence: u64, price: &str, size: &str) -> String {
    format!(
        r#"{{"type":"message","topic":"/market/level2:{btc}","subject":"trade.l2update","tunnelId":"{btc}_books","data":{{"sequenceStart":{seq},"sequenceEnd":{seq},"symbol":"{btc}","changes":{{"asks":[],"bids":[["{price}","{size}","{seq}"]]}}}}}}"#,
        btc = BTC,
        seq = sequence,
        price = price,
        size = size,
    )
}

struct FixedSnapshot {
    calls: AtomicUsize,
}

#[async_trait]
impl SnapshotSource for FixedSnapshot {
    async fn full_depth(&self, _instrument: &Instrument) -> FeedResult<DepthSnapshot> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        Ok(DepthSnapshot {
            sequence: 100,
            bids: vec![Level::new(dec!(9.5), dec!(3))],
            asks: vec![Level::new(dec!(10), dec!(1))],
            time: None,
        })
    }
}

struct StaticToken;

#[async_trait]
impl TokenSource for StaticToken {
    async fn public_token(&self) -> FeedResult<WsToken> {
        Ok(WsToken {
            token: "2neAiuYvAU61ZDXANAGAsiL4".into(),
            endpoint: "wss://ws-api-spot.kucoin.com/".into(),
            ping_interval: Duration::from_secs(18),
            ping_timeout: Duration::from_secs(10),
        })
    }
}

fn mock_mirror(dir: &std::path::Path, frames: Vec<String>) -> BookMirror<FixedSnapshot> {
    let config = BookMirrorBuilder::new([BTC])
        .without_credentials()
        .with_snapshot_dir(dir)
        .with_init_preload(0)
        .with_restart_delay(Duration::from_millis(10))
        .feed_config()
        .unwrap()
        .with_rest_min_interval(Duration::ZERO);

    // connectId takes id 1; openTunnel and subscribe take 2 and 3
    let mut transport = MockTransport::new("wss://mock").held_open();
    transport.push_response(r#"{"id":"hQvf8jkno","type":"welcome"}"#);
    transport.push_response(ack(2));
    transport.push_response(ack(3));
    transport.push_responses(frames);

    let (tx, rx) = mpsc::unbounded_channel();
    let loader = SnapshotLoader::new(
        FixedSnapshot {
            calls: AtomicUsize::new(0),
        },
        config.rest_backoff.clone(),
        config.rest_min_interval,
    );
    let ctx = Arc::new(FeedContext::new(config, loader, tx));
    let supervisor = Supervisor::new(MockConnector::new([transport]), StaticToken, ctx);
    BookMirror::from_supervisor(supervisor, rx)
}

async fn wait_for_sequence(mirror: &BookMirror<FixedSnapshot>, sequence: u64) {
    tokio::time::timeout(Duration::from_secs(5), async {
        while mirror.sequence(BTC) != Some(sequence) {
            tokio::time::sleep(Duration::from_millis(5)).await;
        }
    })
    .await
    .expect("book never reached sequence");
}

#[tokio::test]
async fn test_mirror_tracks_book_and_stops() {
    let dir = tempfile::tempdir().unwrap();
    let mut mirror = mock_mirror(
        dir.path(),
        vec![bid(101, "9.6", "2"), bid(102, "9.5", "0")],
    );

    let mut events = mirror.events().unwrap();
    assert!(mirror.events().is_none());

    tokio::time::timeout(Duration::from_secs(5), async {
        loop {
            match events.recv().await {
                Some(FeedEvent::Connection(ConnectionEvent::Streaming)) => break,
                Some(_) => continue,
                None => panic!("event channel closed"),
            }
        }
    })
    .await
    .unwrap();

    wait_for_sequence(&mirror, 102).await;
    assert!(mirror.is_streaming());
    assert_eq!(mirror.instruments(), &[Instrument::from(BTC)]);

    let book = mirror.current_book(BTC).unwrap();
    assert_eq!(book.bids, vec![Level::new(dec!(9.6), dec!(2))]);
    assert_eq!(mirror.spread(BTC), Some(dec!(0.4)));
    assert_eq!(mirror.mid_price(BTC), Some(dec!(9.8)));

    let top = mirror.best_bid_ask(BTC).unwrap();
    assert_eq!(top.bid, Some(Level::new(dec!(9.6), dec!(2))));
    assert_eq!(top.ask, Some(Level::new(dec!(10), dec!(1))));

    assert_eq!(mirror.stats().processed, 2);
    assert!(mirror.current_book("ETH-USDT").is_none());

    mirror.shutdown();
    assert!(mirror.join().await.is_ok());
    assert_eq!(mirror.state(), FeedState::Stopped);
    // second join has nothing to wait for
    assert!(mirror.join().await.is_ok());
}

#[tokio::test]
async fn test_stop_consumes_mirror() {
    let dir = tempfile::tempdir().unwrap();
    let mirror = mock_mirror(dir.path(), vec![bid(101, "9.6", "2")]);
    wait_for_sequence(&mirror, 101).await;
    assert!(mirror.stop().await.is_ok());
}

#[tokio::test]
async fn test_start_rejects_invalid_config() {
    let result = BookMirror::builder(Vec::<String>::new()).without_credentials().start();
    assert!(matches!(result, Err(FeedError::Configuration(_))));

    let result = BookMirror::builder(["BTC_USDT"]).without_credentials().start();
    match result {
        Err(FeedError::Configuration(msg)) => assert!(msg.contains("BTC_USDT")),
        _ => panic!("expected configuration error"),
    }
}

#[tokio::test]
#[ignore = "needs network access and KUCOIN_API_* credentials"]
async fn test_live_mirror_reaches_streaming() {
    let _ = tracing_subscriber::fmt()
        .with_env_filter("kucoin_ws=info")
        .with_test_writer()
        .try_init();

    let dir = tempfile::tempdir().unwrap();
    let mut mirror = BookMirror::builder([BTC])
        .with_snapshot_dir(dir.path())
        .with_init_preload(50)
        .start()
        .unwrap();

    let mut events = mirror.events().unwrap();
    tokio::time::timeout(Duration::from_secs(60), async {
        while let Some(event) = events.recv().await {
            if let FeedEvent::Connection(ConnectionEvent::Streaming) = event {
                return;
            }
        }
        panic!("event channel closed before streaming");
    })
    .await
    .expect("feed did not reach streaming");

    assert!(mirror.sequence(BTC).unwrap() > 0);
    assert!(mirror.spread(BTC).unwrap() >= Decimal::ZERO);
    mirror.stop().await.unwrap();
}
