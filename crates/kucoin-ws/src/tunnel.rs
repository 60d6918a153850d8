//! Tunnel and subscription bookkeeping
//!
//! All instruments share one websocket. Each gets its own tunnel, opened and
//! subscribed with two acknowledged requests.

use kucoin_types::{format_request_id, Instrument, TunnelRequest};
use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

/// Process-wide request id counter
///
/// Survives reconnects; also supplies the `connectId` of each websocket URL.
#[derive(Debug, Clone, Default)]
pub struct RequestIds {
    counter: Arc<AtomicU64>,
}

impl RequestIds {
    /// Create a counter starting at 1
    pub fn new() -> Self {
        Self::default()
    }

    /// Next id, zero-padded to 10 digits
    pub fn next(&self) -> String {
        format_request_id(self.counter.fetch_add(1, Ordering::Relaxed) + 1)
    }

    /// Number of ids handed out so far
    pub fn issued(&self) -> u64 {
        self.counter.load(Ordering::Relaxed)
    }
}

/// Outstanding acknowledgement for one request
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PendingAck {
    /// Instrument the request is for
    pub instrument: Instrument,
    /// "openTunnel" or "subscribe"
    pub kind: &'static str,
}

/// Tracks the handshake requests of one session
#[derive(Debug, Default)]
pub struct TunnelManager {
    pending: HashMap<String, PendingAck>,
    confirmed: usize,
    rejected: Vec<(String, String)>,
}

impl TunnelManager {
    /// Create an empty manager
    pub fn new() -> Self {
        Self::default()
    }

    /// Build openTunnel + subscribe for every instrument and mark them pending
    pub fn handshake_requests(
        &mut self,
        ids: &RequestIds,
        instruments: &[Instrument],
    ) -> Vec<TunnelRequest> {
        let mut requests = Vec::with_capacity(instruments.len() * 2);
        for instrument in instruments {
            for request in [
                TunnelRequest::open_tunnel(ids.next(), instrument),
                TunnelRequest::subscribe(ids.next(), instrument),
            ] {
                if request.expects_ack() {
                    self.pending.insert(
                        request.id().to_string(),
                        PendingAck {
                            instrument: instrument.clone(),
                            kind: request_kind(&request),
                        },
                    );
                }
                requests.push(request);
            }
        }
        requests
    }

    /// Record an ack; returns the request it answered, if it was pending
    pub fn confirm(&mut self, id: &str) -> Option<PendingAck> {
        let ack = self.pending.remove(id)?;
        self.confirmed += 1;
        Some(ack)
    }

    /// Record a rejection; returns the request it answered, if it was pending
    pub fn reject(&mut self, id: &str, reason: impl Into<String>) -> Option<PendingAck> {
        let ack = self.pending.remove(id)?;
        self.rejected.push((id.to_string(), reason.into()));
        Some(ack)
    }

    /// Whether an id is awaiting acknowledgement
    pub fn is_pending(&self, id: &str) -> bool {
        self.pending.contains_key(id)
    }

    /// True once every request was acknowledged and none was rejected
    pub fn all_acknowledged(&self) -> bool {
        self.pending.is_empty() && self.rejected.is_empty()
    }

    /// Number of outstanding acks
    pub fn pending_count(&self) -> usize {
        self.pending.len()
    }

    /// Number of acks received
    pub fn confirmed_count(&self) -> usize {
        self.confirmed
    }

    /// First rejection, if any
    pub fn first_rejection(&self) -> Option<&(String, String)> {
        self.rejected.first()
    }
}

fn request_kind(request: &TunnelRequest) -> &'static str {
    match request {
        TunnelRequest::OpenTunnel { .. } => "openTunnel",
        TunnelRequest::Subscribe { .. } => "subscribe",
        TunnelRequest::Ping { .. } => "ping",
    }
}
