//! API credentials for KuCoin
//!
//! Implements the version 2 key scheme: every signed request carries an
//! HMAC-SHA256 over `timestamp + method + path + body`, and the passphrase
//! itself is sent HMAC'd with the same secret.
//!
//! # Security
//!
//! The secret and passphrase are stored using the `secrecy` crate which:
//! - Zeroizes memory on drop
//! - Prevents accidental logging via Debug impl
//! - Provides explicit access via `expose_secret()`

use base64::{engine::general_purpose::STANDARD as BASE64, Engine};
use hmac::{Hmac, Mac};
use secrecy::{ExposeSecret, SecretBox};
use sha2::Sha256;
use std::time::{SystemTime, UNIX_EPOCH};

use crate::error::{AuthError, AuthResult};

type HmacSha256 = Hmac<Sha256>;

/// Environment variable holding the API key
pub const ENV_API_KEY: &str = "KUCOIN_API_KEY";
/// Environment variable holding the API secret
pub const ENV_API_SECRET: &str = "KUCOIN_API_SECRET";
/// Environment variable holding the API passphrase
pub const ENV_API_PASSPHRASE: &str = "KUCOIN_API_PASSPHRASE";

/// Key scheme version sent in `KC-API-KEY-VERSION`
pub const KEY_VERSION: &str = "2";

/// API credentials for signed requests
///
/// The secret and passphrase are zeroized when the Credentials are dropped.
pub struct Credentials {
    /// API key (public)
    api_key: String,
    /// API secret, used as the HMAC key
    secret: SecretBox<String>,
    /// Passphrase chosen when the key was created
    passphrase: SecretBox<String>,
}

impl Credentials {
    /// Create credentials from key, secret and passphrase
    ///
    /// Fails when any part is empty.
    pub fn new(
        api_key: impl Into<String>,
        secret: impl Into<String>,
        passphrase: impl Into<String>,
    ) -> AuthResult<Self> {
        let api_key = api_key.into();
        let secret = secret.into();
        let passphrase = passphrase.into();

        for (name, value) in [("api key", &api_key), ("secret", &secret), ("passphrase", &passphrase)] {
            if value.trim().is_empty() {
                return Err(AuthError::InvalidCredentials(format!("empty {}", name)));
            }
        }

        Ok(Self {
            api_key,
            secret: SecretBox::new(Box::new(secret)),
            passphrase: SecretBox::new(Box::new(passphrase)),
        })
    }

    /// Create credentials from environment variables
    ///
    /// Reads `KUCOIN_API_KEY`, `KUCOIN_API_SECRET` and `KUCOIN_API_PASSPHRASE`.
    pub fn from_env() -> AuthResult<Self> {
        let read = |name: &str| {
            std::env::var(name).map_err(|_| AuthError::EnvVarNotSet(name.to_string()))
        };
        Self::new(read(ENV_API_KEY)?, read(ENV_API_SECRET)?, read(ENV_API_PASSPHRASE)?)
    }

    /// Get the API key
    pub fn api_key(&self) -> &str {
        &self.api_key
    }

    /// Current time in milliseconds, as sent in `KC-API-TIMESTAMP`
    pub fn timestamp_ms() -> u64 {
        SystemTime::now()
            .duration_since(UNIX_EPOCH)
            .map(|d| d.as_millis() as u64)
            .unwrap_or_default()
    }

    fn hmac_base64(&self, message: &[u8]) -> AuthResult<String> {
        let mut mac = HmacSha256::new_from_slice(self.secret.expose_secret().as_bytes())
            .map_err(|e| AuthError::InvalidCredentials(e.to_string()))?;
        mac.update(message);
        Ok(BASE64.encode(mac.finalize().into_bytes()))
    }

    /// Sign a request
    ///
    /// `path` includes the query string; `body` is empty for GET requests.
    pub fn sign(&self, timestamp: u64, method: &str, path: &str, body: &str) -> AuthResult<String> {
        let prehash = format!("{}{}{}{}", timestamp, method.to_ascii_uppercase(), path, body);
        self.hmac_base64(prehash.as_bytes())
    }

    /// Passphrase HMAC'd with the secret, as required by key version 2
    pub fn signed_passphrase(&self) -> AuthResult<String> {
        self.hmac_base64(self.passphrase.expose_secret().as_bytes())
    }
}

impl Clone for Credentials {
    fn clone(&self) -> Self {
        Self {
            api_key: self.api_key.clone(),
            secret: SecretBox::new(Box::new(self.secret.expose_secret().clone())),
            passphrase: SecretBox::new(Box::new(self.passphrase.expose_secret().clone())),
        }
    }
}

impl std::fmt::Debug for Credentials {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let prefix: String = self.api_key.chars().take(8).collect();
        f.debug_struct("Credentials")
            .field("api_key", &format!("{}...", prefix))
            .field("secret", &"[REDACTED]")
            .field("passphrase", &"[REDACTED]")
            .finish()
    }
}

/// Builds the `KC-API-*` header set for one request
#[derive(Debug)]
pub struct RequestSigner<'a> {
    credentials: &'a Credentials,
    method: String,
    path: String,
    timestamp: u64,
}

impl<'a> RequestSigner<'a> {
    /// Create a signer for `method` on `path` (query string included)
    pub fn new(credentials: &'a Credentials, method: &str, path: impl Into<String>) -> Self {
        Self {
            credentials,
            method: method.to_ascii_uppercase(),
            path: path.into(),
            timestamp: Credentials::timestamp_ms(),
        }
    }

    /// Timestamp that will be signed
    pub fn timestamp(&self) -> u64 {
        self.timestamp
    }

    /// Produce the headers for a request with the given body
    pub fn headers(&self, body: &str) -> AuthResult<Vec<(&'static str, String)>> {
        let signature = self
            .credentials
            .sign(self.timestamp, &self.method, &self.path, body)?;

        Ok(vec![
            ("KC-API-KEY", self.credentials.api_key().to_string()),
            ("KC-API-SIGN", signature),
            ("KC-API-TIMESTAMP", self.timestamp.to_string()),
            ("KC-API-PASSPHRASE", self.credentials.signed_passphrase()?),
            ("KC-API-KEY-VERSION", KEY_VERSION.to_string()),
        ])
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn creds() -> Credentials {
        Credentials::new("test_api_key", "test_secret", "test_passphrase").unwrap()
    }

    #[test]
    fn test_empty_parts_rejected() {
        assert!(Credentials::new("", "s", "p").is_err());
        assert!(Credentials::new("k", " ", "p").is_err());
        assert!(Credentials::new("k", "s", "").is_err());
    }

    #[test]
    fn test_credentials_debug_redacts_secrets() {
        let debug = format!("{:?}", creds());
        assert!(!debug.contains("test_secret"));
        assert!(!debug.contains("test_passphrase"));
        assert!(debug.contains("[REDACTED]"));
    }

    #[test]
    fn test_signing_consistency() {
        let c = creds();
        let path = "/api/v3/market/orderbook/level2?symbol=BTC-USDT";
        let a = c.sign(1659738043576, "GET", path, "").unwrap();
        let b = c.sign(1659738043576, "get", path, "").unwrap();
        assert_eq!(a, b);
        assert!(BASE64.decode(&a).is_ok());
        // HMAC-SHA256 is 32 bytes
        assert_eq!(BASE64.decode(&a).unwrap().len(), 32);

        let other = c.sign(1659738043577, "GET", path, "").unwrap();
        assert_ne!(a, other);
    }

    #[test]
    fn test_signed_passphrase_is_not_plain() {
        let c = creds();
        let signed = c.signed_passphrase().unwrap();
        assert_ne!(signed, "test_passphrase");
        assert_eq!(signed, c.clone().signed_passphrase().unwrap());
    }

    #[test]
    fn test_request_signer_headers() {
        let c = creds();
        let signer = RequestSigner::new(&c, "post", "/api/v1/bullet-public");
        let headers = signer.headers("{}").unwrap();
        let names: Vec<_> = headers.iter().map(|(n, _)| *n).collect();
        assert_eq!(
            names,
            vec!["KC-API-KEY", "KC-API-SIGN", "KC-API-TIMESTAMP", "KC-API-PASSPHRASE", "KC-API-KEY-VERSION"]
        );
        assert_eq!(headers[2].1, signer.timestamp().to_string());
        assert_eq!(headers[1].1, c.sign(signer.timestamp(), "POST", "/api/v1/bullet-public", "{}").unwrap());
        assert_eq!(headers[4].1, "2");
    }
}
