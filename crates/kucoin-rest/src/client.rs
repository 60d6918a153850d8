//! Main REST client implementation

use crate::endpoints::MarketEndpoints;
use crate::error::RestResult;
use kucoin_auth::{Credentials, BASE_URL};
use kucoin_types::{DepthSnapshot, Instrument};
use reqwest::Client;
use std::time::Duration;
use tracing::info;

/// Default request timeout
const DEFAULT_TIMEOUT_SECS: u64 = 30;

/// KuCoin REST API client
///
/// # Example
///
/// ```no_run
/// use kucoin_rest::{ClientConfig, RestClient};
/// use kucoin_auth::Credentials;
/// use kucoin_types::Instrument;
///
/// #[tokio::main]
/// async fn main() -> Result<(), Box<dyn std::error::Error>> {
///     let creds = Credentials::from_env()?;
///     let client = RestClient::with_config(ClientConfig::new().with_credentials(creds))?;
///     let depth = client.full_depth(&Instrument::from("BTC-USDT")).await?;
///     println!("sequence {}", depth.sequence);
///     Ok(())
/// }
/// ```
#[derive(Debug, Clone)]
pub struct RestClient {
    http_client: Client,
    base_url: String,
    credentials: Option<Credentials>,
}

impl RestClient {
    /// Create a client without credentials
    pub fn new() -> RestResult<Self> {
        Self::with_config(ClientConfig::default())
    }

    /// Create a client with custom configuration
    pub fn with_config(config: ClientConfig) -> RestResult<Self> {
        let http_client = Client::builder()
            .timeout(Duration::from_secs(config.timeout_secs))
            .user_agent(
                config
                    .user_agent
                    .as_deref()
                    .unwrap_or(concat!("kucoin-rest/", env!("CARGO_PKG_VERSION"))),
            )
            .build()?;

        info!(base_url = %config.base_url, "Created KuCoin REST client");

        Ok(Self {
            http_client,
            base_url: config.base_url,
            credentials: config.credentials,
        })
    }

    /// Check if the client can call signed endpoints
    pub fn has_credentials(&self) -> bool {
        self.credentials.is_some()
    }

    /// Base URL requests go to
    pub fn base_url(&self) -> &str {
        &self.base_url
    }

    /// Get market endpoints
    pub fn market(&self) -> MarketEndpoints<'_> {
        MarketEndpoints::new(&self.http_client, &self.base_url, self.credentials.as_ref())
    }

    /// Get the full-depth book for an instrument
    pub async fn full_depth(&self, instrument: &Instrument) -> RestResult<DepthSnapshot> {
        self.market().get_full_depth(instrument).await
    }
}

/// Configuration for the REST client
#[derive(Debug, Clone)]
pub struct ClientConfig {
    /// API credentials (required for the full-depth endpoint)
    pub credentials: Option<Credentials>,
    /// Base URL
    pub base_url: String,
    /// Request timeout in seconds
    pub timeout_secs: u64,
    /// Custom user agent
    pub user_agent: Option<String>,
}

impl Default for ClientConfig {
    fn default() -> Self {
        Self {
            credentials: None,
            base_url: BASE_URL.to_string(),
            timeout_secs: DEFAULT_TIMEOUT_SECS,
            user_agent: None,
        }
    }
}

impl ClientConfig {
    /// Create a new configuration builder
    pub fn new() -> Self {
        Self::default()
    }

    /// Set credentials
    pub fn with_credentials(mut self, credentials: Credentials) -> Self {
        self.credentials = Some(credentials);
        self
    }

    /// Set base URL
    pub fn with_base_url(mut self, base_url: impl Into<String>) -> Self {
        self.base_url = base_url.into();
        self
    }

    /// Set timeout
    pub fn with_timeout(mut self, secs: u64) -> Self {
        self.timeout_secs = secs;
        self
    }

    /// Set user agent
    pub fn with_user_agent(mut self, user_agent: impl Into<String>) -> Self {
        self.user_agent = Some(user_agent.into());
        self
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::RestError;

    #[test]
    fn test_client_config() {
        let config = ClientConfig::new()
            .with_timeout(60)
            .with_base_url("http://localhost:8080")
            .with_user_agent("test-agent");

        assert_eq!(config.timeout_secs, 60);
        assert_eq!(config.base_url, "http://localhost:8080");
        assert_eq!(config.user_agent, Some("test-agent".to_string()));
    }

    #[test]
    fn test_client_without_credentials() {
        let client = RestClient::new().unwrap();
        assert!(!client.has_credentials());
        assert_eq!(client.base_url(), "https://api.kucoin.com");
    }

    #[tokio::test]
    async fn test_auth_required_error() {
        let client = RestClient::new().unwrap();
        let result = client.full_depth(&Instrument::from("BTC-USDT")).await;
        assert!(matches!(result, Err(RestError::AuthRequired)));
    }

    #[tokio::test]
    #[ignore = "requires network access and KUCOIN_* credentials"]
    async fn test_full_depth_live() {
        let creds = Credentials::from_env().unwrap();
        let client = RestClient::with_config(ClientConfig::new().with_credentials(creds)).unwrap();
        let depth = client.full_depth(&Instrument::from("BTC-USDT")).await.unwrap();
        assert!(depth.sequence > 0);
        assert!(!depth.bids.is_empty());
    }
}
