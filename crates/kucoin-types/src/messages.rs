//! Request and control-frame types for KuCoin's multiplexed websocket

use crate::Instrument;
use serde::{Deserialize, Serialize};

// ============================================================================
// Request Types
// ============================================================================

/// Width of the zero-padded request id
pub const REQUEST_ID_WIDTH: usize = 10;

/// Format a request counter value as the 10-digit id the venue expects
pub fn format_request_id(value: u64) -> String {
    let padded = format!("{:0width$}", value, width = REQUEST_ID_WIDTH);
    // Keep the last ten digits once the counter outgrows the field
    padded[padded.len() - REQUEST_ID_WIDTH..].to_string()
}

/// Outbound request on the multiplexed connection
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "type")]
pub enum TunnelRequest {
    /// Open a named tunnel for one instrument
    #[serde(rename = "openTunnel")]
    OpenTunnel {
        id: String,
        #[serde(rename = "newTunnelId")]
        new_tunnel_id: String,
        response: bool,
    },
    /// Subscribe a topic inside an open tunnel
    #[serde(rename = "subscribe")]
    Subscribe {
        id: String,
        topic: String,
        #[serde(rename = "tunnelId")]
        tunnel_id: String,
        response: bool,
    },
    /// Application-level keep-alive
    #[serde(rename = "ping")]
    Ping { id: String },
}

impl TunnelRequest {
    /// Create an openTunnel request for an instrument's book tunnel
    pub fn open_tunnel(id: impl Into<String>, instrument: &Instrument) -> Self {
        Self::OpenTunnel {
            id: id.into(),
            new_tunnel_id: instrument.tunnel_id(),
            response: true,
        }
    }

    /// Create a level2 subscribe request routed through the instrument's tunnel
    pub fn subscribe(id: impl Into<String>, instrument: &Instrument) -> Self {
        Self::Subscribe {
            id: id.into(),
            topic: instrument.level2_topic(),
            tunnel_id: instrument.tunnel_id(),
            response: true,
        }
    }

    /// Create a ping request
    pub fn ping(id: impl Into<String>) -> Self {
        Self::Ping { id: id.into() }
    }

    /// Request id echoed by the venue in its ack/pong
    pub fn id(&self) -> &str {
        match self {
            Self::OpenTunnel { id, .. } | Self::Subscribe { id, .. } | Self::Ping { id } => id,
        }
    }

    /// Whether the venue will acknowledge this request
    pub fn expects_ack(&self) -> bool {
        match self {
            Self::OpenTunnel { response, .. } | Self::Subscribe { response, .. } => *response,
            Self::Ping { .. } => false,
        }
    }

    /// Serialize to the JSON text sent over the socket
    pub fn to_json(&self) -> Result<String, serde_json::Error> {
        serde_json::to_string(self)
    }
}

// ============================================================================
// Inbound Frames
// ============================================================================

/// Frame type discriminator
#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum FrameKind {
    /// Sent once after the connection is accepted
    Welcome,
    /// Acknowledges an openTunnel/subscribe request
    Ack,
    /// Reply to a ping
    Pong,
    /// Request rejected or server-side failure
    Error,
    /// Topic data
    Message,
    /// Anything else
    #[serde(other)]
    Unknown,
}

/// Lightweight view of an inbound frame, enough to route it
#[derive(Debug, Clone, Deserialize)]
pub struct FrameHeader {
    /// Frame type
    #[serde(rename = "type")]
    pub kind: FrameKind,
    /// Echoed request id (control frames only)
    #[serde(default)]
    pub id: Option<String>,
    /// Tunnel the frame arrived on (data frames only)
    #[serde(default, rename = "tunnelId")]
    pub tunnel_id: Option<String>,
}

impl FrameHeader {
    /// Parse just the routing fields of a frame
    pub fn parse(text: &str) -> Result<Self, serde_json::Error> {
        serde_json::from_str(text)
    }
}

/// Error frame returned by the venue
#[derive(Debug, Clone, Deserialize)]
pub struct ErrorFrame {
    /// Request id the error refers to, when any
    #[serde(default)]
    pub id: Option<String>,
    /// Venue error code
    #[serde(default)]
    pub code: Option<serde_json::Value>,
    /// Human-readable error description
    #[serde(default)]
    pub data: Option<serde_json::Value>,
}

impl ErrorFrame {
    /// Parse an error frame
    pub fn parse(text: &str) -> Result<Self, serde_json::Error> {
        serde_json::from_str(text)
    }

    /// Render the code and description for logging
    pub fn describe(&self) -> String {
        let code = self
            .code
            .as_ref()
            .map(|c| c.to_string())
            .unwrap_or_else(|| "?".to_string());
        let data = self
            .data
            .as_ref()
            .map(|d| match d {
                serde_json::Value::String(s) => s.clone(),
                other => other.to_string(),
            })
            .unwrap_or_default();
        format!("{} {}", code, data)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_request_id_padding() {
        assert_eq!(format_request_id(0), "0000000000");
        assert_eq!(format_request_id(42), "0000000042");
        assert_eq!(format_request_id(12_345_678_901), "2345678901");
    }

    #[test]
    fn test_open_tunnel_json() {
        let req = TunnelRequest::open_tunnel("0000000001", &Instrument::from("BTC-USDT"));
        let value: serde_json::Value = serde_json::from_str(&req.to_json().unwrap()).unwrap();
        assert_eq!(value["type"], "openTunnel");
        assert_eq!(value["id"], "0000000001");
        assert_eq!(value["newTunnelId"], "BTC-USDT_books");
        assert_eq!(value["response"], true);
    }

    #[test]
    fn test_subscribe_json() {
        let req = TunnelRequest::subscribe("0000000002", &Instrument::from("ETH-BTC"));
        let value: serde_json::Value = serde_json::from_str(&req.to_json().unwrap()).unwrap();
        assert_eq!(value["type"], "subscribe");
        assert_eq!(value["topic"], "/market/level2:ETH-BTC");
        assert_eq!(value["tunnelId"], "ETH-BTC_books");
        assert!(req.expects_ack());
    }

    #[test]
    fn test_ping_json() {
        let req = TunnelRequest::ping("0000000003");
        assert_eq!(req.to_json().unwrap(), r#"{"type":"ping","id":"0000000003"}"#);
        assert!(!req.expects_ack());
        assert_eq!(req.id(), "0000000003");
    }

    #[test]
    fn test_frame_header_kinds() {
        let welcome = FrameHeader::parse(r#"{"id":"abc","type":"welcome"}"#).unwrap();
        assert_eq!(welcome.kind, FrameKind::Welcome);

        let ack = FrameHeader::parse(r#"{"id":"0000000002","type":"ack"}"#).unwrap();
        assert_eq!(ack.kind, FrameKind::Ack);
        assert_eq!(ack.id.as_deref(), Some("0000000002"));

        let message = FrameHeader::parse(
            r#"{"type":"message","tunnelId":"BTC-USDT_books","topic":"/market/level2:BTC-USDT","data":{}}"#,
        )
        .unwrap();
        assert_eq!(message.kind, FrameKind::Message);
        assert_eq!(message.tunnel_id.as_deref(), Some("BTC-USDT_books"));

        let other = FrameHeader::parse(r#"{"type":"notice"}"#).unwrap();
        assert_eq!(other.kind, FrameKind::Unknown);
    }

    #[test]
    fn test_error_frame_describe() {
        let frame = ErrorFrame::parse(r#"{"id":"0000000004","type":"error","code":404,"data":"topic not found"}"#)
            .unwrap();
        assert_eq!(frame.describe(), "404 topic not found");
    }
}
