//! Request signing and websocket token provider for the KuCoin API
//!
//! The level2 feed itself is public, but every websocket connection starts
//! with a token request, and the full-depth REST snapshot needs a signed call.
//!
//! # Example
//!
//! ```no_run
//! use kucoin_auth::{Credentials, TokenProvider};
//!
//! #[tokio::main]
//! async fn main() -> Result<(), Box<dyn std::error::Error>> {
//!     // KUCOIN_API_KEY, KUCOIN_API_SECRET, KUCOIN_API_PASSPHRASE
//!     let creds = Credentials::from_env()?;
//!
//!     let provider = TokenProvider::new(Some(creds))?;
//!     let token = provider.fetch_public_token().await?;
//!     println!("Ping every {:?}", token.ping_interval);
//!
//!     Ok(())
//! }
//! ```

mod credentials;
mod error;
mod token;

pub use credentials::{
    Credentials, RequestSigner, ENV_API_KEY, ENV_API_PASSPHRASE, ENV_API_SECRET, KEY_VERSION,
};
pub use error::{AuthError, AuthResult};
pub use token::{TokenProvider, WsToken, BASE_URL, BULLET_PUBLIC_PATH};
