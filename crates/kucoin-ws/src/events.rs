//! Connection and book lifecycle events

use kucoin_types::Instrument;
use std::path::PathBuf;
use std::time::Duration;

/// Reason for disconnection
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum DisconnectReason {
    /// Server closed the connection
    ServerClosed,
    /// Network or protocol error
    NetworkError(String),
    /// A handshake step timed out
    Timeout,
    /// Client requested shutdown
    Shutdown,
    /// Keep-alive ping could not be sent
    PingFailed,
    /// Live book differed from its REST reference
    VerificationFailure,
    /// Live book skipped past a verification target
    SequenceGap,
}

/// Connection lifecycle events
#[derive(Debug, Clone)]
pub enum ConnectionEvent {
    /// Websocket is up and the welcome frame arrived
    Connected {
        /// Connect id used in the websocket URL
        connect_id: String,
    },
    /// Every tunnel and subscription was acknowledged
    Subscribed {
        /// Number of instruments subscribed
        instruments: usize,
    },
    /// Initial loads are done and diffs are being applied
    Streaming,
    /// Connection was lost
    Disconnected {
        /// Reason for disconnection
        reason: DisconnectReason,
    },
    /// Waiting before the next connection cycle
    Restarting {
        /// Restart number (1-indexed)
        attempt: u32,
        /// Delay before this attempt
        delay: Duration,
    },
    /// Restart budget exhausted; the supervisor stopped
    RestartsExhausted {
        /// Final error
        error: String,
    },
}

/// Book lifecycle events
#[derive(Debug, Clone)]
pub enum BookEvent {
    /// A book was replaced by a REST snapshot
    SnapshotLoaded {
        instrument: Instrument,
        sequence: u64,
    },
    /// A verification is pending
    VerificationArmed {
        instrument: Instrument,
        target: u64,
    },
    /// The live book matched its reference
    VerificationConfirmed {
        instrument: Instrument,
        sequence: u64,
    },
    /// A scheduled verification was skipped
    VerificationDeferred {
        /// Instrument the skipped verification would have covered
        instrument: Instrument,
        /// Instrument of the request still pending, if any
        pending: Option<Instrument>,
    },
    /// Snapshot files were written
    Persisted {
        /// Files written
        paths: Vec<PathBuf>,
    },
}

/// Combined event type for event streams
#[derive(Debug, Clone)]
pub enum FeedEvent {
    /// Connection-related event
    Connection(ConnectionEvent),
    /// Book-related event
    Book(BookEvent),
}

impl From<ConnectionEvent> for FeedEvent {
    fn from(event: ConnectionEvent) -> Self {
        FeedEvent::Connection(event)
    }
}

impl From<BookEvent> for FeedEvent {
    fn from(event: BookEvent) -> Self {
        FeedEvent::Book(event)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_event_conversion() {
        let event: FeedEvent = ConnectionEvent::Streaming.into();
        assert!(matches!(event, FeedEvent::Connection(ConnectionEvent::Streaming)));

        let event: FeedEvent = BookEvent::VerificationConfirmed {
            instrument: Instrument::from("BTC-USDT"),
            sequence: 10,
        }
        .into();
        assert!(matches!(event, FeedEvent::Book(BookEvent::VerificationConfirmed { sequence: 10, .. })));
    }
}
