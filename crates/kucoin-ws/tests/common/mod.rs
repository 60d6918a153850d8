//! Common test utilities and fixtures for feed tests
//!
//! Frames follow the layout of live KuCoin level2 traffic.

#![allow(dead_code)]

use async_trait::async_trait;
use kucoin_auth::WsToken;
use kucoin_types::{DepthSnapshot, FeedError, FeedResult, Instrument, Level};
use kucoin_ws::{
    BackoffPolicy, FeedConfig, FeedContext, FeedEvent, MockConnector, MockTransport,
    SnapshotLoader, SnapshotSource, Supervisor, TokenSource,
};
use parking_lot::Mutex;
use rust_decimal::Decimal;
use serde_json::json;
use std::collections::VecDeque;
use std::path::Path;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::mpsc;

pub const BTC: &str = "BTC-USDT";

/// Welcome frame sent by the venue right after the upgrade
pub const WELCOME: &str = r#"{"id":"hQvf8jkno","type":"welcome"}"#;

/// Ack for a 10-digit request id
pub fn ack(id: u64) -> String {
    format!(r#"{{"id":"{:010}","type":"ack"}}"#, id)
}

/// Level2 diff frame; records are (price, size, sequence)
pub fn diff(
    instrument: &str,
    start: u64,
    end: u64,
    bids: &[(&str, &str, u64)],
    asks: &[(&str, &str, u64)],
) -> String {
    let records = |side: &[(&str, &str, u64)]| {
        side.iter()
            .map(|(p, s, q)| json!([p, s, q.to_string()]))
            .collect::<Vec<_>>()
    };
    json!({
        "type": "message",
        "topic": format!("/market/level2:{}", instrument),
        "subject": "trade.l2update",
        "tunnelId": format!("{}_books", instrument),
        "data": {
            "sequenceStart": start,
            "sequenceEnd": end,
            "symbol": instrument,
            "changes": { "asks": records(asks), "bids": records(bids) }
        }
    })
    .to_string()
}

/// One-change diff on the bid side
pub fn bid(sequence: u64, price: &str, size: &str) -> String {
    diff(BTC, sequence, sequence, &[(price, size, sequence)], &[])
}

/// One-change diff on the ask side
pub fn ask(sequence: u64, price: &str, size: &str) -> String {
    diff(BTC, sequence, sequence, &[], &[(price, size, sequence)])
}

pub fn depth(sequence: u64, bids: &[(Decimal, Decimal)], asks: &[(Decimal, Decimal)]) -> DepthSnapshot {
    let levels = |side: &[(Decimal, Decimal)]| {
        side.iter()
            .map(|(p, s)| Level::new(*p, *s))
            .collect::<Vec<_>>()
    };
    DepthSnapshot {
        sequence,
        bids: levels(bids),
        asks: levels(asks),
        time: None,
    }
}

/// Hands out snapshots in order, repeating the last one
#[derive(Default)]
pub struct ScriptedSnapshots {
    script: Mutex<VecDeque<DepthSnapshot>>,
    last: Mutex<Option<DepthSnapshot>>,
    calls: AtomicUsize,
}

impl ScriptedSnapshots {
    pub fn new(script: impl IntoIterator<Item = DepthSnapshot>) -> Self {
        Self {
            script: Mutex::new(script.into_iter().collect()),
            ..Default::default()
        }
    }

    pub fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl SnapshotSource for ScriptedSnapshots {
    async fn full_depth(&self, _instrument: &Instrument) -> FeedResult<DepthSnapshot> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        let next = self.script.lock().pop_front();
        let mut last = self.last.lock();
        if let Some(snapshot) = next {
            *last = Some(snapshot);
        }
        last.clone()
            .ok_or_else(|| FeedError::Configuration("no scripted snapshot".into()))
    }
}

/// Token source that always succeeds
pub struct StaticToken;

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

/// Fast timings, one instrument, no preloads
pub fn test_config(dir: &Path) -> FeedConfig {
    FeedConfig::new()
        .with_instruments([Instrument::from(BTC)])
        .with_snapshot_dir(dir)
        .with_init_preload(0)
        .with_verify_preload(1)
        .with_messages_per_verify(1_000_000)
        .with_rest_min_interval(Duration::ZERO)
        .with_rest_backoff(BackoffPolicy::fixed(Duration::from_millis(10)))
        .with_restart_backoff(BackoffPolicy::fixed(Duration::from_millis(10)))
        .with_handshake_timeout(Duration::from_secs(2))
        .with_progress_log_every(0)
}

/// Transport that answers the handshake of the `cycle`-th connection
///
/// Each cycle uses three ids: connectId, openTunnel, subscribe.
pub fn handshaking_transport(cycle: u64) -> MockTransport {
    let first = (cycle - 1) * 3 + 2;
    let mut transport = MockTransport::new("wss://mock").held_open();
    transport.push_response(WELCOME);
    transport.push_response(ack(first));
    transport.push_response(ack(first + 1));
    transport
}

pub type TestSupervisor = Supervisor<MockConnector, StaticToken, ScriptedSnapshots>;

pub fn supervisor(
    config: FeedConfig,
    transports: Vec<MockTransport>,
    snapshots: ScriptedSnapshots,
) -> (Arc<TestSupervisor>, mpsc::UnboundedReceiver<FeedEvent>) {
    let (tx, rx) = mpsc::unbounded_channel();
    let loader = SnapshotLoader::new(
        snapshots,
        config.rest_backoff.clone(),
        config.rest_min_interval,
    );
    let ctx = Arc::new(FeedContext::new(config, loader, tx));
    let supervisor = Supervisor::new(MockConnector::new(transports), StaticToken, ctx);
    (Arc::new(supervisor), rx)
}

/// Wait for the first event matching `pred`, failing after five seconds
pub async fn next_matching<F>(events: &mut mpsc::UnboundedReceiver<FeedEvent>, mut pred: F) -> FeedEvent
where
    F: FnMut(&FeedEvent) -> bool,
{
    tokio::time::timeout(Duration::from_secs(5), async {
        loop {
            let event = events.recv().await.expect("event channel closed");
            if pred(&event) {
                return event;
            }
        }
    })
    .await
    .expect("timed out waiting for event")
}

pub fn install_tracing() {
    let _ = tracing_subscriber::fmt()
        .with_env_filter("kucoin_ws=debug")
        .with_test_writer()
        .try_init();
}
