//! Market data endpoints
//!
//! The full-depth book is the only market endpoint the mirror needs, and it
//! requires a signed request.

use crate::error::{RestError, RestResult};
use kucoin_auth::{Credentials, RequestSigner};
use kucoin_types::{ApiEnvelope, DepthSnapshot, Instrument};
use reqwest::Client;
use tracing::{debug, instrument};

/// Full-depth level2 snapshot
pub const FULL_DEPTH_PATH: &str = "/api/v3/market/orderbook/level2";

/// Market data endpoints
pub struct MarketEndpoints<'a> {
    client: &'a Client,
    base_url: &'a str,
    credentials: Option<&'a Credentials>,
}

impl<'a> MarketEndpoints<'a> {
    pub fn new(client: &'a Client, base_url: &'a str, credentials: Option<&'a Credentials>) -> Self {
        Self {
            client,
            base_url,
            credentials,
        }
    }

    /// Path and query for a full-depth request
    pub fn full_depth_path(instrument: &Instrument) -> RestResult<String> {
        let query = serde_urlencoded::to_string([("symbol", instrument.as_str())])
            .map_err(|e| RestError::InvalidParameter(e.to_string()))?;
        Ok(format!("{}?{}", FULL_DEPTH_PATH, query))
    }

    /// Get the full-depth book for an instrument
    #[instrument(skip(self), fields(instrument = %instrument))]
    pub async fn get_full_depth(&self, instrument: &Instrument) -> RestResult<DepthSnapshot> {
        let credentials = self.credentials.ok_or(RestError::AuthRequired)?;
        let path = Self::full_depth_path(instrument)?;
        let url = format!("{}{}", self.base_url, path);

        let signer = RequestSigner::new(credentials, "GET", path.as_str());
        let mut request = self.client.get(&url);
        for (name, value) in signer.headers("")? {
            request = request.header(name, value);
        }

        debug!("Fetching full-depth snapshot");

        let text = request.send().await?.text().await?;
        let envelope: ApiEnvelope<DepthSnapshot> =
            serde_json::from_str(&text).map_err(|e| RestError::Parse(e.to_string()))?;
        let depth = envelope.into_result()?;

        debug!(
            sequence = depth.sequence,
            bids = depth.bids.len(),
            asks = depth.asks.len(),
            "Got full-depth snapshot"
        );
        Ok(depth)
    }
}
