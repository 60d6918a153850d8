//! Socket seam between the feed and the network
//!
//! The ingestor only ever sees text frames. [`WsTransport`] is the
//! tokio-tungstenite implementation; [`MockTransport`] replays scripted frames
//! so whole sessions can run in tests without a venue.
//!
//! # Example
//!
//! ```no_run
//! use kucoin_ws::transport::{Transport, TransportError, WsTransport};
//!
//! async fn first_frame(url: &str) -> Result<Option<String>, TransportError> {
//!     let mut socket = WsTransport::new(url);
//!     socket.connect().await?;
//!     socket.send(r#"{"id":"0000000001","type":"ping"}"#).await?;
//!     socket.recv().await
//! }
//! ```

use async_trait::async_trait;
use futures_util::{SinkExt, StreamExt};
use kucoin_types::FeedError;
use std::time::Duration;
use thiserror::Error;
use tokio::net::TcpStream;
use tokio_tungstenite::{connect_async, tungstenite::Message, MaybeTlsStream, WebSocketStream};
use tracing::{debug, instrument, trace};

type Socket = WebSocketStream<MaybeTlsStream<TcpStream>>;

/// Socket-level failures
#[derive(Error, Debug)]
pub enum TransportError {
    /// Upgrade or TCP/TLS setup failed
    #[error("websocket connect failed: {0}")]
    ConnectionFailed(String),

    /// Peer closed the socket
    #[error("websocket closed by peer")]
    ConnectionClosed,

    /// Outbound frame could not be written
    #[error("websocket write failed: {0}")]
    SendFailed(String),

    /// Inbound frame could not be read
    #[error("websocket read failed: {0}")]
    ReceiveFailed(String),

    /// Upgrade did not finish in time
    #[error("websocket connect timed out after {0:?}")]
    Timeout(Duration),

    /// Used before `connect` or after `close`
    #[error("websocket not connected")]
    NotConnected,

    /// Frame was not valid UTF-8
    #[error("malformed websocket frame: {0}")]
    Protocol(String),
}

impl From<TransportError> for FeedError {
    fn from(err: TransportError) -> Self {
        match err {
            TransportError::ConnectionClosed => FeedError::ConnectionClosed,
            other => FeedError::Transport(other.to_string()),
        }
    }
}

/// Text-frame socket driven by the ingestor
#[async_trait]
pub trait Transport: Send + Sync {
    /// Open the socket
    async fn connect(&mut self) -> Result<(), TransportError>;

    /// Write one text frame
    async fn send(&mut self, message: &str) -> Result<(), TransportError>;

    /// Next text frame, or `None` once the peer sent a close frame
    ///
    /// Must be cancel-safe: the ingestor races it against the ping timer.
    async fn recv(&mut self) -> Result<Option<String>, TransportError>;

    /// Send a close frame and drop the socket
    async fn close(&mut self) -> Result<(), TransportError>;

    /// Whether the socket is open
    fn is_connected(&self) -> bool;

    /// URL the socket was opened against
    fn endpoint(&self) -> &str;
}

/// Opens transports; one call per supervisor cycle
#[async_trait]
pub trait Connector: Send + Sync {
    /// Transport produced by this connector
    type Transport: Transport + 'static;

    /// Open a connected transport to `url`
    async fn connect(&self, url: &str) -> Result<Self::Transport, TransportError>;
}

/// tokio-tungstenite socket
pub struct WsTransport {
    url: String,
    socket: Option<Socket>,
    connect_timeout: Duration,
}

impl WsTransport {
    /// Transport for `url`; nothing is opened until [`Transport::connect`]
    pub fn new(url: impl Into<String>) -> Self {
        Self {
            url: url.into(),
            socket: None,
            connect_timeout: Duration::from_secs(10),
        }
    }

    /// Bound the websocket upgrade
    pub fn with_timeout(mut self, connect_timeout: Duration) -> Self {
        self.connect_timeout = connect_timeout;
        self
    }

    fn socket(&mut self) -> Result<&mut Socket, TransportError> {
        self.socket.as_mut().ok_or(TransportError::NotConnected)
    }
}

/// Text payload of a data frame; `None` for control frames
fn frame_text(message: Message) -> Option<Result<String, TransportError>> {
    match message {
        Message::Text(text) => Some(Ok(text)),
        Message::Binary(bytes) => {
            Some(String::from_utf8(bytes).map_err(|e| TransportError::Protocol(e.to_string())))
        }
        // tungstenite answers protocol pings itself
        Message::Ping(_) | Message::Pong(_) | Message::Frame(_) | Message::Close(_) => None,
    }
}

#[async_trait]
impl Transport for WsTransport {
    #[instrument(skip(self), fields(url = %self.url))]
    async fn connect(&mut self) -> Result<(), TransportError> {
        debug!("Opening websocket");
        let upgrade = tokio::time::timeout(self.connect_timeout, connect_async(self.url.as_str()))
            .await
            .map_err(|_| TransportError::Timeout(self.connect_timeout))?;
        let (socket, response) = upgrade.map_err(|e| TransportError::ConnectionFailed(e.to_string()))?;

        debug!(status = %response.status(), "Websocket open");
        self.socket = Some(socket);
        Ok(())
    }

    #[instrument(skip(self, message), fields(len = message.len()))]
    async fn send(&mut self, message: &str) -> Result<(), TransportError> {
        self.socket()?
            .send(Message::Text(message.to_owned()))
            .await
            .map_err(|e| TransportError::SendFailed(e.to_string()))
    }

    async fn recv(&mut self) -> Result<Option<String>, TransportError> {
        loop {
            let next = self.socket()?.next().await;
            match next {
                Some(Ok(Message::Close(frame))) => {
                    debug!(?frame, "Peer sent close frame");
                    self.socket = None;
                    return Ok(None);
                }
                Some(Ok(message)) => match frame_text(message) {
                    Some(text) => return text.map(Some),
                    None => trace!("Skipped control frame"),
                },
                Some(Err(e)) => return Err(TransportError::ReceiveFailed(e.to_string())),
                None => {
                    self.socket = None;
                    return Err(TransportError::ConnectionClosed);
                }
            }
        }
    }

    #[instrument(skip(self))]
    async fn close(&mut self) -> Result<(), TransportError> {
        match self.socket.take() {
            Some(mut socket) => socket
                .close(None)
                .await
                .map_err(|e| TransportError::SendFailed(e.to_string())),
            None => Ok(()),
        }
    }

    fn is_connected(&self) -> bool {
        self.socket.is_some()
    }

    fn endpoint(&self) -> &str {
        &self.url
    }
}

/// Connector producing [`WsTransport`]s
#[derive(Debug, Clone)]
pub struct WsConnector {
    connect_timeout: Duration,
}

impl WsConnector {
    /// Create a connector with the given connect timeout
    pub fn new(connect_timeout: Duration) -> Self {
        Self { connect_timeout }
    }
}

impl Default for WsConnector {
    fn default() -> Self {
        Self::new(Duration::from_secs(10))
    }
}

#[async_trait]
impl Connector for WsConnector {
    type Transport = WsTransport;

    async fn connect(&self, url: &str) -> Result<WsTransport, TransportError> {
        let mut transport = WsTransport::new(url).with_timeout(self.connect_timeout);
        transport.connect().await?;
        Ok(transport)
    }
}

#[cfg(any(test, feature = "test-utils"))]
type Script = std::collections::VecDeque<Result<Option<String>, TransportError>>;

/// Scripted transport
///
/// `recv` replays `responses` in order. Once the script is exhausted it
/// reports a closed socket, or pends forever when built with
/// [`held_open`](MockTransport::held_open).
#[cfg(any(test, feature = "test-utils"))]
pub struct MockTransport {
    url: String,
    connected: bool,
    /// Remaining scripted results for `recv`
    pub responses: Script,
    /// Frames written through `send`
    pub sent_messages: std::sync::Arc<parking_lot::Mutex<Vec<String>>>,
    /// Make `connect` fail
    pub fail_connect: bool,
    /// Make `send` fail
    pub fail_send: bool,
    /// Pend instead of closing when the script runs out
    pub hold_open: bool,
}

#[cfg(any(test, feature = "test-utils"))]
impl MockTransport {
    /// Empty script against `url`
    pub fn new(url: impl Into<String>) -> Self {
        Self {
            url: url.into(),
            connected: false,
            responses: Script::new(),
            sent_messages: Default::default(),
            fail_connect: false,
            fail_send: false,
            hold_open: false,
        }
    }

    /// Script one inbound frame
    pub fn push_response(&mut self, frame: impl Into<String>) {
        self.responses.push_back(Ok(Some(frame.into())));
    }

    /// Script several inbound frames
    pub fn push_responses(&mut self, frames: impl IntoIterator<Item = impl Into<String>>) {
        self.responses
            .extend(frames.into_iter().map(|frame| Ok(Some(frame.into()))));
    }

    /// Script a close frame from the peer
    pub fn push_close(&mut self) {
        self.responses.push_back(Ok(None));
    }

    /// Script a read failure
    pub fn push_error(&mut self, error: TransportError) {
        self.responses.push_back(Err(error));
    }

    /// Keep the socket open after the last scripted frame
    pub fn held_open(mut self) -> Self {
        self.hold_open = true;
        self
    }

    /// Shared handle to the sent frames; survives the transport being moved
    pub fn sent_handle(&self) -> std::sync::Arc<parking_lot::Mutex<Vec<String>>> {
        std::sync::Arc::clone(&self.sent_messages)
    }

    /// Drain the sent frames
    pub fn take_sent(&mut self) -> Vec<String> {
        std::mem::take(&mut *self.sent_messages.lock())
    }
}

#[cfg(any(test, feature = "test-utils"))]
#[async_trait]
impl Transport for MockTransport {
    async fn connect(&mut self) -> Result<(), TransportError> {
        if self.fail_connect {
            return Err(TransportError::ConnectionFailed("scripted connect failure".into()));
        }
        self.connected = true;
        Ok(())
    }

    async fn send(&mut self, message: &str) -> Result<(), TransportError> {
        match (self.connected, self.fail_send) {
            (false, _) => Err(TransportError::NotConnected),
            (true, true) => Err(TransportError::SendFailed("scripted write failure".into())),
            (true, false) => {
                self.sent_messages.lock().push(message.to_owned());
                Ok(())
            }
        }
    }

    async fn recv(&mut self) -> Result<Option<String>, TransportError> {
        if !self.connected {
            return Err(TransportError::NotConnected);
        }
        // yield before popping so a cancelled recv never drops a frame
        tokio::task::yield_now().await;
        match self.responses.pop_front() {
            Some(scripted) => scripted,
            None if self.hold_open => std::future::pending().await,
            None => Err(TransportError::ConnectionClosed),
        }
    }

    async fn close(&mut self) -> Result<(), TransportError> {
        self.connected = false;
        Ok(())
    }

    fn is_connected(&self) -> bool {
        self.connected
    }

    fn endpoint(&self) -> &str {
        &self.url
    }
}

/// Connector handing out prepared [`MockTransport`]s, one per connect call
#[cfg(any(test, feature = "test-utils"))]
#[derive(Default)]
pub struct MockConnector {
    transports: parking_lot::Mutex<std::collections::VecDeque<MockTransport>>,
    /// URLs passed to connect(), in order
    pub urls: parking_lot::Mutex<Vec<String>>,
}

#[cfg(any(test, feature = "test-utils"))]
impl MockConnector {
    /// Create a connector that hands out `transports` in order
    pub fn new(transports: impl IntoIterator<Item = MockTransport>) -> Self {
        Self {
            transports: parking_lot::Mutex::new(transports.into_iter().collect()),
            urls: Default::default(),
        }
    }

    /// Number of connect calls so far
    pub fn connect_count(&self) -> usize {
        self.urls.lock().len()
    }
}

#[cfg(any(test, feature = "test-utils"))]
#[async_trait]
impl Connector for MockConnector {
    type Transport = MockTransport;

    async fn connect(&self, url: &str) -> Result<MockTransport, TransportError> {
        self.urls.lock().push(url.to_string());
        let next = self.transports.lock().pop_front();
        let mut transport =
            next.ok_or_else(|| TransportError::ConnectionFailed("no mock transport left".into()))?;
        transport.connect().await?;
        Ok(transport)
    }
}
