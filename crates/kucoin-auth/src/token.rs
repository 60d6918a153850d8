//! WebSocket token provider
//!
//! Every websocket connection needs a fresh token from the bullet endpoint.
//! The token response also names the server to connect to and its ping interval.

use crate::credentials::{Credentials, RequestSigner};
use crate::error::{AuthError, AuthResult};
use kucoin_types::{ApiEnvelope, BulletToken};
use reqwest::Client;
use std::time::Duration;
use tracing::{debug, instrument};

/// Default REST base URL
pub const BASE_URL: &str = "https://api.kucoin.com";

/// Token endpoint for public channels
pub const BULLET_PUBLIC_PATH: &str = "/api/v1/bullet-public";

/// Websocket connection token
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct WsToken {
    /// The connection token
    pub token: String,
    /// Websocket endpoint without query parameters
    pub endpoint: String,
    /// How often the client must ping
    pub ping_interval: Duration,
    /// Server-side timeout for missing pings
    pub ping_timeout: Duration,
}

impl WsToken {
    /// Full websocket URL for a connection identified by `connect_id`
    pub fn connect_url(&self, connect_id: &str) -> String {
        format!(
            "{}?token={}&connectId={}",
            self.endpoint, self.token, connect_id
        )
    }

    /// Pick the first advertised server
    pub fn from_bullet(bullet: BulletToken) -> AuthResult<Self> {
        let server = bullet
            .instance_servers
            .into_iter()
            .next()
            .ok_or(AuthError::NoInstanceServer)?;

        Ok(Self {
            token: bullet.token,
            endpoint: server.endpoint,
            ping_interval: Duration::from_millis(server.ping_interval),
            ping_timeout: Duration::from_millis(server.ping_timeout),
        })
    }
}

/// Provider for websocket connection tokens
///
/// # Example
///
/// ```no_run
/// use kucoin_auth::TokenProvider;
///
/// # async fn example() -> Result<(), Box<dyn std::error::Error>> {
/// let provider = TokenProvider::new(None)?;
/// let token = provider.fetch_public_token().await?;
/// println!("connect to {}", token.connect_url("0000000001"));
/// # Ok(())
/// # }
/// ```
#[derive(Debug, Clone)]
pub struct TokenProvider {
    client: Client,
    base_url: String,
    credentials: Option<Credentials>,
}

impl TokenProvider {
    /// Create a provider against the production API
    ///
    /// Requests are signed when credentials are given.
    pub fn new(credentials: Option<Credentials>) -> AuthResult<Self> {
        Self::with_base_url(BASE_URL, credentials, Duration::from_secs(30))
    }

    /// Create a provider against a custom base URL
    pub fn with_base_url(
        base_url: impl Into<String>,
        credentials: Option<Credentials>,
        timeout: Duration,
    ) -> AuthResult<Self> {
        let client = Client::builder()
            .timeout(timeout)
            .user_agent(concat!("kucoin-auth/", env!("CARGO_PKG_VERSION")))
            .build()?;

        Ok(Self {
            client,
            base_url: base_url.into(),
            credentials,
        })
    }

    /// Request a token for public channels
    #[instrument(skip(self))]
    pub async fn fetch_public_token(&self) -> AuthResult<WsToken> {
        let body = "{}";
        let url = format!("{}{}", self.base_url, BULLET_PUBLIC_PATH);

        let mut request = self
            .client
            .post(&url)
            .header("Content-Type", "application/json")
            .body(body);

        if let Some(credentials) = &self.credentials {
            let signer = RequestSigner::new(credentials, "POST", BULLET_PUBLIC_PATH);
            for (name, value) in signer.headers(body)? {
                request = request.header(name, value);
            }
        }

        debug!("Requesting websocket token");

        let text = request.send().await?.text().await?;
        let envelope: ApiEnvelope<BulletToken> =
            serde_json::from_str(&text).map_err(|e| AuthError::Parse(e.to_string()))?;
        let bullet = envelope.into_result().map_err(|f| AuthError::Api {
            code: f.code,
            msg: f.msg,
        })?;

        let token = WsToken::from_bullet(bullet)?;
        debug!(
            endpoint = %token.endpoint,
            ping_interval_ms = token.ping_interval.as_millis() as u64,
            "Got websocket token"
        );
        Ok(token)
    }

    /// Base URL requests go to
    pub fn base_url(&self) -> &str {
        &self.base_url
    }

    /// Credentials used to sign requests, if any
    pub fn credentials(&self) -> Option<&Credentials> {
        self.credentials.as_ref()
    }
}
