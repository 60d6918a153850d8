//! Feed Ingestor: one websocket session from welcome to disconnect
//!
//! Every frame is read, routed and, if it carries data, enqueued. After each
//! data arrival the queue processor runs once: it either counts down a
//! preload, kicks off a REST load, or applies up to `max_batch` queued diffs.
//! REST loads run while the socket keeps being read, so nothing is lost and
//! keep-alive pings keep going out.
//!
//! The session ends with an error on any transport, handshake or integrity
//! failure, and with [`FeedError::ShuttingDown`] on shutdown.

use crate::context::{FeedContext, FeedState};
use crate::events::{BookEvent, ConnectionEvent};
use crate::loader::{apply_load, LoadMode, LoadOutcome, SnapshotSource};
use crate::persistence::SnapshotKind;
use crate::session::{FeedMode, SessionState};
use crate::transport::Transport;
use kucoin_book::{BookSynchronizer, SyncError};
use kucoin_types::{
    DiffMessage, ErrorFrame, FeedError, FeedResult, FrameHeader, FrameKind, Instrument,
    TunnelRequest,
};
use std::future::Future;
use std::time::Duration;
use tokio::time::{interval_at, timeout, Instant, Interval, MissedTickBehavior};
use tracing::{debug, error, info, instrument, warn};

/// Used when the token does not carry a ping interval
const DEFAULT_PING_INTERVAL: Duration = Duration::from_secs(18);

/// Drives one connection cycle
pub struct FeedIngestor<'a, T, S> {
    ctx: &'a FeedContext<S>,
    transport: T,
    sync: BookSynchronizer,
    session: SessionState,
    ping: Interval,
    connect_id: String,
}

impl<'a, T: Transport, S: SnapshotSource> FeedIngestor<'a, T, S> {
    /// Create an ingestor for a freshly connected transport
    pub fn new(
        ctx: &'a FeedContext<S>,
        transport: T,
        ping_interval: Duration,
        connect_id: impl Into<String>,
    ) -> Self {
        let period = if ping_interval.is_zero() {
            DEFAULT_PING_INTERVAL
        } else {
            ping_interval
        };
        let mut ping = interval_at(Instant::now() + period, period);
        ping.set_missed_tick_behavior(MissedTickBehavior::Delay);

        Self {
            ctx,
            transport,
            sync: BookSynchronizer::new(ctx.store.clone()),
            session: SessionState::new(&ctx.config),
            ping,
            connect_id: connect_id.into(),
        }
    }

    /// Per-session state
    pub fn session(&self) -> &SessionState {
        &self.session
    }

    /// Run the session until it fails or shutdown is requested
    pub async fn run(mut self) -> FeedResult<()> {
        let result = self.run_session().await;
        if let Err(e) = self.transport.close().await {
            debug!("Close after session end failed: {}", e);
        }
        result
    }

    async fn run_session(&mut self) -> FeedResult<()> {
        let ctx = self.ctx;
        let handshake_timeout = ctx.config.handshake_timeout;

        timeout(handshake_timeout, self.await_welcome())
            .await
            .map_err(|_| FeedError::HandshakeTimeout {
                stage: "welcome",
                timeout: handshake_timeout,
            })??;
        info!("Connected (connectId {})", self.connect_id);
        ctx.emit(ConnectionEvent::Connected {
            connect_id: self.connect_id.clone(),
        });

        ctx.set_state(FeedState::Subscribing);
        self.send_handshake().await?;
        timeout(handshake_timeout, self.await_acks())
            .await
            .map_err(|_| FeedError::HandshakeTimeout {
                stage: "acknowledgements",
                timeout: handshake_timeout,
            })??;
        info!(
            instruments = ctx.config.instruments.len(),
            acks = self.session.tunnels.confirmed_count(),
            "All tunnels and subscriptions acknowledged"
        );
        ctx.emit(ConnectionEvent::Subscribed {
            instruments: ctx.config.instruments.len(),
        });

        ctx.set_state(FeedState::InitLoad);
        if ctx.config.init_preload == 0 {
            let _permit = self.session.guard.try_acquire();
            self.initial_load().await?;
        } else {
            info!(
                frames = ctx.config.init_preload,
                "Queueing frames before initial snapshots"
            );
            self.session.mode = FeedMode::InitPreload {
                remaining: ctx.config.init_preload,
            };
        }

        loop {
            let frame = self.recv_frame().await?;
            if self.handle_frame(frame) {
                self.pump().await?;
            }
        }
    }

    async fn await_welcome(&mut self) -> FeedResult<()> {
        loop {
            let frame = self.recv_frame().await?;
            if let Ok(FrameHeader {
                kind: FrameKind::Welcome,
                ..
            }) = FrameHeader::parse(&frame)
            {
                return Ok(());
            }
            self.handle_frame(frame);
        }
    }

    async fn send_handshake(&mut self) -> FeedResult<()> {
        let ctx = self.ctx;
        let requests = self
            .session
            .tunnels
            .handshake_requests(&ctx.ids, &ctx.config.instruments);

        for request in &requests {
            let json = request
                .to_json()
                .map_err(|e| FeedError::Transport(e.to_string()))?;
            debug!("Sending request: {}", json);
            self.transport.send(&json).await?;
        }
        Ok(())
    }

    async fn await_acks(&mut self) -> FeedResult<()> {
        loop {
            if let Some((id, reason)) = self.session.tunnels.first_rejection() {
                return Err(FeedError::SubscriptionRejected {
                    id: id.clone(),
                    reason: reason.clone(),
                });
            }
            if self.session.tunnels.all_acknowledged() {
                return Ok(());
            }
            let frame = self.recv_frame().await?;
            self.handle_frame(frame);
        }
    }

    /// Next text frame, sending pings as they fall due
    async fn recv_frame(&mut self) -> FeedResult<String> {
        loop {
            tokio::select! {
                biased;
                _ = self.ctx.shutdown.wait() => return Err(FeedError::ShuttingDown),
                _ = self.ping.tick() => self.send_ping().await?,
                frame = self.transport.recv() => {
                    return match frame {
                        Ok(Some(text)) => Ok(text),
                        Ok(None) => Err(FeedError::ConnectionClosed),
                        Err(e) => Err(e.into()),
                    };
                }
            }
        }
    }

    /// Drive `fut` to completion while frames keep being read and enqueued
    async fn await_with_feed<F, R>(&mut self, fut: F) -> FeedResult<R>
    where
        F: Future<Output = FeedResult<R>>,
    {
        tokio::pin!(fut);
        loop {
            tokio::select! {
                biased;
                _ = self.ctx.shutdown.wait() => return Err(FeedError::ShuttingDown),
                out = &mut fut => return out,
                _ = self.ping.tick() => self.send_ping().await?,
                frame = self.transport.recv() => match frame {
                    Ok(Some(text)) => {
                        self.handle_frame(text);
                    }
                    Ok(None) => return Err(FeedError::ConnectionClosed),
                    Err(e) => return Err(e.into()),
                },
            }
        }
    }

    async fn send_ping(&mut self) -> FeedResult<()> {
        let ping = TunnelRequest::ping(self.ctx.ids.next());
        let json = ping
            .to_json()
            .map_err(|e| FeedError::PingFailed(e.to_string()))?;
        debug!("Sending ping {}", ping.id());
        self.transport
            .send(&json)
            .await
            .map_err(|e| FeedError::PingFailed(e.to_string()))
    }

    /// Route one frame; returns true if it was a data frame and got enqueued
    fn handle_frame(&mut self, frame: String) -> bool {
        let header = match FrameHeader::parse(&frame) {
            Ok(header) => header,
            Err(e) => {
                self.ctx.stats.parse_failed();
                warn!("Failed to parse frame: {} - {}", e, frame);
                return false;
            }
        };

        match header.kind {
            FrameKind::Message => {
                self.ctx.stats.frame_received();
                self.session.frames += 1;
                self.session.queue.push(frame);
                true
            }
            FrameKind::Ack => {
                if let Some(id) = header.id.as_deref() {
                    match self.session.tunnels.confirm(id) {
                        Some(ack) => debug!(
                            id,
                            instrument = %ack.instrument,
                            kind = ack.kind,
                            "Request acknowledged"
                        ),
                        None => debug!(id, "Ack for unknown request"),
                    }
                }
                false
            }
            FrameKind::Error => {
                let detail = ErrorFrame::parse(&frame)
                    .map(|e| e.describe())
                    .unwrap_or_else(|_| frame.clone());
                match header.id.as_deref() {
                    Some(id) if self.session.tunnels.is_pending(id) => {
                        warn!(id, "Request rejected: {}", detail);
                        self.session.tunnels.reject(id, detail);
                    }
                    _ => warn!("Error frame received: {}", detail),
                }
                false
            }
            FrameKind::Pong => {
                debug!(id = ?header.id, "Pong received");
                false
            }
            FrameKind::Welcome => {
                debug!("Extra welcome frame ignored");
                false
            }
            FrameKind::Unknown => {
                debug!("Unknown frame: {}", frame);
                false
            }
        }
    }

    /// Run the queue processor once for a data arrival
    async fn pump(&mut self) -> FeedResult<()> {
        let Some(_permit) = self.session.guard.try_acquire() else {
            return Ok(());
        };

        match &mut self.session.mode {
            FeedMode::InitPreload { remaining } => {
                *remaining = remaining.saturating_sub(1);
                if *remaining > 0 {
                    return Ok(());
                }
                self.initial_load().await?;
            }
            FeedMode::VerifyPreload {
                instrument,
                remaining,
            } => {
                *remaining = remaining.saturating_sub(1);
                if *remaining > 0 {
                    return Ok(());
                }
                let instrument = instrument.clone();
                self.verification_load(&instrument).await?;
            }
            FeedMode::Live => {
                let cadence = self.ctx.config.messages_per_verify;
                if cadence > 0 && self.session.since_verify >= cadence {
                    self.schedule_verification().await?;
                    if self.session.mode != FeedMode::Live {
                        return Ok(());
                    }
                }
            }
        }

        self.drain_batch()
    }

    #[instrument(skip(self))]
    async fn initial_load(&mut self) -> FeedResult<()> {
        let ctx = self.ctx;
        for instrument in &ctx.config.instruments {
            let depth = self.await_with_feed(ctx.loader.fetch(instrument)).await?;
            let outcome = apply_load(
                &ctx.store,
                &mut self.session.verification,
                instrument,
                depth,
                LoadMode::Initial,
            );
            if let LoadOutcome::Loaded { sequence } = outcome {
                info!(
                    instrument = %instrument,
                    sequence,
                    queued = self.session.queue.len(),
                    "Initial snapshot loaded"
                );
                ctx.emit(BookEvent::SnapshotLoaded {
                    instrument: instrument.clone(),
                    sequence,
                });
            }
        }

        self.session.mode = FeedMode::Live;
        ctx.set_state(FeedState::Streaming);
        ctx.emit(ConnectionEvent::Streaming);
        info!(queued = self.session.queue.len(), "Streaming");
        Ok(())
    }

    async fn schedule_verification(&mut self) -> FeedResult<()> {
        let ctx = self.ctx;
        self.session.since_verify = 0;
        let Some(instrument) = self
            .session
            .next_verification_target(&ctx.config.instruments)
        else {
            return Ok(());
        };

        if let Some(pending) = self.session.pending_instrument().cloned() {
            warn!(
                instrument = %instrument,
                pending = %pending,
                "Falling behind: previous verification still pending, skipping this one"
            );
            ctx.stats.verification_deferred();
            ctx.emit(BookEvent::VerificationDeferred {
                instrument,
                pending: Some(pending),
            });
            return Ok(());
        }

        if ctx.config.verify_preload == 0 {
            return self.verification_load(&instrument).await;
        }
        debug!(
            instrument = %instrument,
            frames = ctx.config.verify_preload,
            "Queueing frames before verification snapshot"
        );
        self.session.mode = FeedMode::VerifyPreload {
            instrument,
            remaining: ctx.config.verify_preload,
        };
        Ok(())
    }

    #[instrument(skip_all, fields(instrument = %instrument))]
    async fn verification_load(&mut self, instrument: &Instrument) -> FeedResult<()> {
        let ctx = self.ctx;
        let depth = self.await_with_feed(ctx.loader.fetch(instrument)).await?;
        self.session.mode = FeedMode::Live;

        match apply_load(
            &ctx.store,
            &mut self.session.verification,
            instrument,
            depth,
            LoadMode::Verification,
        ) {
            LoadOutcome::VerificationArmed { target } => {
                info!(
                    target_sequence = target,
                    live = ctx.store.sequence(instrument.as_str()).unwrap_or(0),
                    queued = self.session.queue.len(),
                    "Verification armed"
                );
                ctx.emit(BookEvent::VerificationArmed {
                    instrument: instrument.clone(),
                    target,
                });
            }
            LoadOutcome::NotFresher { fetched, live } => {
                warn!(
                    fetched,
                    live, "Verification snapshot is not ahead of the live book, skipping"
                );
            }
            LoadOutcome::Loaded { .. } => {}
        }
        Ok(())
    }

    fn drain_batch(&mut self) -> FeedResult<()> {
        for _ in 0..self.ctx.config.max_batch {
            let Some(frame) = self.session.queue.pop() else {
                break;
            };
            self.process_frame(&frame)?;
        }
        Ok(())
    }

    fn process_frame(&mut self, frame: &str) -> FeedResult<()> {
        self.ctx.stats.frame_processed();
        self.session.processed += 1;
        self.session.since_verify += 1;

        match DiffMessage::parse(frame) {
            Ok(msg) => self.apply_diff(&msg)?,
            Err(e) => {
                self.ctx.stats.parse_failed();
                warn!("Dropping unparseable diff: {}", e);
            }
        }

        self.persist_periodically();
        self.log_progress();
        Ok(())
    }

    fn apply_diff(&mut self, msg: &DiffMessage) -> FeedResult<()> {
        let ctx = self.ctx;
        match self.sync.apply(msg, &mut self.session.verification) {
            Ok(report) => {
                ctx.stats.record_sync(&report);
                if let Some(jump) = report.discontinuity {
                    warn!(
                        instrument = %msg.instrument,
                        book = jump.book,
                        start = jump.message_start,
                        "Diff starts past the next expected sequence"
                    );
                }
                if let Some(defect) = &report.defect {
                    warn!(
                        instrument = %msg.instrument,
                        sequence = defect.sequence,
                        reason = ?defect.reason,
                        "Diff replay stopped at a bad record"
                    );
                }
                if report.missing_deletes > 0 {
                    debug!(
                        instrument = %msg.instrument,
                        count = report.missing_deletes,
                        "Delete for a price level not in the book"
                    );
                }
                if let Some(sequence) = report.confirmed {
                    info!(
                        instrument = %msg.instrument,
                        sequence,
                        "Verification passed: 100% match"
                    );
                    ctx.emit(BookEvent::VerificationConfirmed {
                        instrument: msg.instrument.clone(),
                        sequence,
                    });
                }
                Ok(())
            }
            Err(SyncError::UnknownInstrument(instrument)) => {
                ctx.stats.anomaly();
                warn!(instrument = %instrument, "Diff for untracked instrument dropped");
                Ok(())
            }
            Err(e) => {
                match &e {
                    SyncError::VerificationFailure { .. } => ctx.stats.verification_failed(),
                    SyncError::SequenceGap { .. } => ctx.stats.sequence_gap(),
                    SyncError::UnknownInstrument(_) => {}
                }
                error!("{}", e);
                self.persist_forensics(&e);
                Err(e.into())
            }
        }
    }

    /// Write the live book and its reference after an integrity failure
    fn persist_forensics(&mut self, failure: &SyncError) {
        let Some((live, reference)) = failure.forensic_books() else {
            return;
        };

        let mut paths = Vec::with_capacity(2);
        for (kind, book) in [(SnapshotKind::Books, live), (SnapshotKind::Verify, reference)] {
            match self.session.persistence.persist(kind, book) {
                Ok(path) => {
                    info!(path = %path.display(), "Forensic snapshot written");
                    paths.push(path);
                }
                Err(e) => error!("Failed to write forensic snapshot: {}", e),
            }
        }

        if !paths.is_empty() {
            self.ctx.stats.persisted(paths.len());
            self.ctx.emit(BookEvent::Persisted { paths });
        }
    }

    fn persist_periodically(&mut self) {
        let ctx = self.ctx;
        let every = ctx.config.persist_every;
        if every == 0
            || !self.session.persistence_warmed_up()
            || self.session.processed % every != 0
        {
            return;
        }

        let books = ctx.store.snapshots();
        match self
            .session
            .persistence
            .persist_batch(SnapshotKind::Books, &books)
        {
            Ok(paths) => {
                debug!(files = paths.len(), "Books persisted");
                ctx.stats.persisted(paths.len());
                ctx.emit(BookEvent::Persisted { paths });
            }
            Err(e) => warn!("Periodic persistence failed: {}", e),
        }
    }

    fn log_progress(&self) {
        let every = self.ctx.config.progress_log_every;
        if every == 0 || self.session.processed % every != 0 {
            return;
        }
        info!(
            processed = self.session.processed,
            received = self.session.frames,
            queued = self.session.queue.len(),
            verifying = ?self.session.pending_instrument().map(|i| i.as_str()),
            "Feed progress"
        );
    }
}
