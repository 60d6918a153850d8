//! Supervisor: restarts the whole pipeline after any failure
//!
//! One cycle is token fetch, connect, handshake, initial loads and
//! streaming. Any error ends the cycle; books are reset and a new cycle
//! starts after the restart delay. Only shutdown, configuration errors and
//! an exhausted restart budget stop the loop.

use crate::backoff::retry;
use crate::context::{FeedContext, FeedState};
use crate::events::{ConnectionEvent, DisconnectReason};
use crate::ingestor::FeedIngestor;
use crate::loader::{SnapshotSource, TokenSource};
use crate::persistence::PersistenceManager;
use crate::transport::Connector;
use kucoin_types::{FeedError, FeedResult};
use std::sync::Arc;
use tokio::time::timeout;
use tracing::{error, info, warn};

/// Runs connection cycles until shutdown
pub struct Supervisor<C, T, S> {
    connector: C,
    tokens: T,
    ctx: Arc<FeedContext<S>>,
}

impl<C, T, S> Supervisor<C, T, S>
where
    C: Connector,
    T: TokenSource,
    S: SnapshotSource,
{
    /// Create a supervisor
    pub fn new(connector: C, tokens: T, ctx: Arc<FeedContext<S>>) -> Self {
        Self {
            connector,
            tokens,
            ctx,
        }
    }

    /// Shared context
    pub fn context(&self) -> &Arc<FeedContext<S>> {
        &self.ctx
    }

    /// Token source
    pub fn tokens(&self) -> &T {
        &self.tokens
    }

    /// Connector
    pub fn connector(&self) -> &C {
        &self.connector
    }

    /// Run until shutdown or a failure that restarting cannot fix
    pub async fn run(&self) -> FeedResult<()> {
        let ctx = &*self.ctx;
        let mut purger = PersistenceManager::new(&ctx.config.snapshot_dir);
        match purger.purge() {
            Ok(0) => {}
            Ok(removed) => info!(
                removed,
                "Purged snapshot directory {}",
                ctx.config.snapshot_dir.display()
            ),
            Err(e) => warn!("Failed to purge snapshot directory: {}", e),
        }

        let mut restarts = 0u32;
        let outcome = loop {
            if ctx.shutdown.is_triggered() {
                break Ok(());
            }

            let result = tokio::select! {
                biased;
                _ = ctx.shutdown.wait() => Err(FeedError::ShuttingDown),
                result = self.run_cycle() => result,
            };

            let error = match result {
                Ok(()) => break Ok(()),
                Err(_) if ctx.shutdown.is_triggered() => break Ok(()),
                Err(e) => e,
            };

            ctx.set_state(failure_state(&error));
            ctx.emit(ConnectionEvent::Disconnected {
                reason: disconnect_reason(&error),
            });

            if error.is_unrecoverable() {
                error!("Feed stopped: {}", error);
                break Err(error);
            }

            restarts = restarts.saturating_add(1);
            if let Some(max) = ctx.config.max_restarts {
                if restarts > max {
                    error!("Restart attempts exhausted after {} restarts", max);
                    ctx.emit(ConnectionEvent::RestartsExhausted {
                        error: error.to_string(),
                    });
                    break Err(error);
                }
            }

            let delay = ctx.config.restart_backoff.delay_with_jitter(restarts);
            warn!(
                "Feed cycle failed, restarting in {:?} (restart {}): {}",
                delay, restarts, error
            );
            ctx.stats.restarted();
            ctx.emit(ConnectionEvent::Restarting {
                attempt: restarts,
                delay,
            });
            ctx.set_state(FeedState::Disconnected);

            tokio::select! {
                biased;
                _ = ctx.shutdown.wait() => break Ok(()),
                _ = tokio::time::sleep(delay) => {}
            }
        };

        if outcome.is_ok() {
            info!("Feed shut down");
            ctx.emit(ConnectionEvent::Disconnected {
                reason: DisconnectReason::Shutdown,
            });
        }
        ctx.set_state(FeedState::Stopped);
        outcome
    }

    async fn run_cycle(&self) -> FeedResult<()> {
        let ctx = &*self.ctx;
        ctx.store.reset(&ctx.config.instruments);

        ctx.set_state(FeedState::TokenFetch);
        let tokens = &self.tokens;
        let token = retry(&ctx.config.rest_backoff, "websocket token", move || async move {
            tokens.public_token().await
        })
        .await?;

        ctx.set_state(FeedState::Connecting);
        let connect_id = ctx.ids.next();
        let url = token.connect_url(&connect_id);
        info!("Connecting to {}", token.endpoint);

        let transport = match timeout(ctx.config.connect_timeout, self.connector.connect(&url)).await
        {
            Ok(Ok(transport)) => transport,
            Ok(Err(e)) => {
                return Err(FeedError::ConnectionFailed {
                    url: token.endpoint.clone(),
                    reason: e.to_string(),
                });
            }
            Err(_) => {
                return Err(FeedError::ConnectionTimeout {
                    url: token.endpoint.clone(),
                    timeout: ctx.config.connect_timeout,
                });
            }
        };

        FeedIngestor::new(ctx, transport, token.ping_interval, connect_id)
            .run()
            .await
    }
}

fn failure_state(error: &FeedError) -> FeedState {
    match error {
        FeedError::VerificationFailure { .. } => FeedState::VerificationFailure,
        FeedError::SequenceGap { .. } => FeedState::SequenceGap,
        _ => FeedState::Error,
    }
}

fn disconnect_reason(error: &FeedError) -> DisconnectReason {
    match error {
        FeedError::ConnectionClosed => DisconnectReason::ServerClosed,
        FeedError::ConnectionTimeout { .. } | FeedError::HandshakeTimeout { .. } => {
            DisconnectReason::Timeout
        }
        FeedError::PingFailed(_) => DisconnectReason::PingFailed,
        FeedError::VerificationFailure { .. } => DisconnectReason::VerificationFailure,
        FeedError::SequenceGap { .. } => DisconnectReason::SequenceGap,
        FeedError::ShuttingDown => DisconnectReason::Shutdown,
        other => DisconnectReason::NetworkError(other.to_string()),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use kucoin_types::Side;
    use std::time::Duration;

    #[test]
    fn test_failure_state_mapping() {
        let mismatch = FeedError::VerificationFailure {
            instrument: "BTC-USDT".into(),
            sequence: 5,
            side: Side::Bid,
        };
        assert_eq!(failure_state(&mismatch), FeedState::VerificationFailure);
        assert_eq!(
            disconnect_reason(&mismatch),
            DisconnectReason::VerificationFailure
        );

        let gap = FeedError::SequenceGap {
            instrument: "BTC-USDT".into(),
            target: 5,
            live: 7,
        };
        assert_eq!(failure_state(&gap), FeedState::SequenceGap);
        assert_eq!(failure_state(&FeedError::ConnectionClosed), FeedState::Error);
    }

    #[test]
    fn test_disconnect_reasons() {
        assert_eq!(
            disconnect_reason(&FeedError::ConnectionClosed),
            DisconnectReason::ServerClosed
        );
        assert_eq!(
            disconnect_reason(&FeedError::HandshakeTimeout {
                stage: "welcome",
                timeout: Duration::from_secs(10),
            }),
            DisconnectReason::Timeout
        );
        assert!(matches!(
            disconnect_reason(&FeedError::Transport("reset".into())),
            DisconnectReason::NetworkError(_)
        ));
    }
}
