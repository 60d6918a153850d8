//! REST payload types (depth snapshots and websocket tokens)

use crate::level::deserialize_sequence;
use crate::Level;
use serde::Deserialize;

/// Success code carried by every accepted KuCoin REST response
pub const API_SUCCESS_CODE: &str = "200000";

/// Standard KuCoin response wrapper
#[derive(Debug, Clone, Deserialize)]
pub struct ApiEnvelope<T> {
    /// "200000" on success, an error code otherwise
    pub code: String,
    /// Payload, present on success; a missing field reads as `None`
    pub data: Option<T>,
    /// Error description, present on failure
    #[serde(default)]
    pub msg: Option<String>,
}

/// Non-success envelope
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ApiFailure {
    /// Venue error code
    pub code: String,
    /// Venue error message
    pub msg: String,
}

impl<T> ApiEnvelope<T> {
    /// Convert into the payload, or the venue's error
    pub fn into_result(self) -> Result<T, ApiFailure> {
        if self.code != API_SUCCESS_CODE {
            return Err(ApiFailure {
                code: self.code,
                msg: self.msg.unwrap_or_default(),
            });
        }
        self.data.ok_or_else(|| ApiFailure {
            code: self.code,
            msg: "success response without data".to_string(),
        })
    }
}

/// Full-depth book from `GET /api/v3/market/orderbook/level2`
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct DepthSnapshot {
    /// Sequence number the snapshot is consistent with
    #[serde(deserialize_with = "deserialize_sequence")]
    pub sequence: u64,
    /// Bids, best (highest) first
    #[serde(default)]
    pub bids: Vec<Level>,
    /// Asks, best (lowest) first
    #[serde(default)]
    pub asks: Vec<Level>,
    /// Server time in milliseconds
    #[serde(default)]
    pub time: Option<u64>,
}

/// Payload of `POST /api/v1/bullet-public`
#[derive(Debug, Clone, Deserialize)]
pub struct BulletToken {
    /// Connection token passed as a query parameter
    pub token: String,
    /// Candidate websocket servers
    #[serde(rename = "instanceServers")]
    pub instance_servers: Vec<InstanceServer>,
}

/// One websocket server advertised by the token endpoint
#[derive(Debug, Clone, Deserialize)]
pub struct InstanceServer {
    /// Websocket URL without query parameters
    pub endpoint: String,
    /// Whether TLS is used
    #[serde(default)]
    pub encrypt: bool,
    /// Transport protocol, "websocket"
    #[serde(default)]
    pub protocol: String,
    /// Keep-alive ping interval in milliseconds
    #[serde(rename = "pingInterval")]
    pub ping_interval: u64,
    /// Server-side timeout for a missing ping in milliseconds
    #[serde(rename = "pingTimeout", default)]
    pub ping_timeout: u64,
}

#[cfg(test)]
mod tests {
    use super::*;
    use rust_decimal_macros::dec;

    #[test]
    fn test_depth_snapshot_envelope() {
        let json = r#"{"code":"200000","data":{"time":1659738043576,"sequence":"11501459","bids":[["0.00037339","150"],["0.0003733","20"]],"asks":[["0.00037526","50"]]}}"#;
        let env: ApiEnvelope<DepthSnapshot> = serde_json::from_str(json).unwrap();
        let depth = env.into_result().unwrap();
        assert_eq!(depth.sequence, 11501459);
        assert_eq!(depth.bids.len(), 2);
        assert_eq!(depth.bids[0].price, dec!(0.00037339));
        assert_eq!(depth.asks[0].size, dec!(50));
    }

    #[test]
    fn test_error_envelope() {
        let json = r#"{"code":"429000","msg":"Too Many Requests"}"#;
        let env: ApiEnvelope<DepthSnapshot> = serde_json::from_str(json).unwrap();
        let err = env.into_result().unwrap_err();
        assert_eq!(err.code, "429000");
        assert_eq!(err.msg, "Too Many Requests");
    }

    #[test]
    fn test_envelope_without_data_for_payload_lacking_default() {
        let json = r#"{"code":"400100","msg":"Bad Request"}"#;
        let env: ApiEnvelope<BulletToken> = serde_json::from_str(json).unwrap();
        assert!(env.data.is_none());
        assert_eq!(env.into_result().unwrap_err().msg, "Bad Request");

        let json = r#"{"code":"200000"}"#;
        let env: ApiEnvelope<BulletToken> = serde_json::from_str(json).unwrap();
        let err = env.into_result().unwrap_err();
        assert_eq!(err.code, "200000");
        assert_eq!(err.msg, "success response without data");

        let json = r#"{"code":"200000","data":null}"#;
        let env: ApiEnvelope<DepthSnapshot> = serde_json::from_str(json).unwrap();
        assert!(env.into_result().is_err());
    }

    #[test]
    fn test_bullet_token() {
        let json = r#"{"code":"200000","data":{"token":"2neAiuYvAU61ZD","instanceServers":[{"endpoint":"wss://ws-api-spot.kucoin.com/","encrypt":true,"protocol":"websocket","pingInterval":18000,"pingTimeout":10000}]}}"#;
        let env: ApiEnvelope<BulletToken> = serde_json::from_str(json).unwrap();
        let token = env.into_result().unwrap();
        assert_eq!(token.token, "2neAiuYvAU61ZD");
        assert_eq!(token.instance_servers[0].ping_interval, 18000);
        assert!(token.instance_servers[0].encrypt);
    }
}
