//! Diff replay against the book store
//!
//! [`BookSynchronizer::apply`] replays one [`DiffMessage`] into the matching
//! book and checks a pending [`VerificationRequest`] after every change that
//! advanced the sequence. Integrity failures come back as fatal
//! [`SyncError`]s carrying both books for forensic persistence.

use crate::orderbook::{BookSnapshot, ChangeOutcome};
use crate::store::BookStore;
use crate::verify::{VerificationRequest, VerifyOutcome};
use kucoin_types::{ChangeDefect, DiffMessage, FeedError, Instrument, Side};
use thiserror::Error;

/// Tally of what one diff message did
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct SyncReport {
    /// Changes that advanced the sequence
    pub applied: usize,
    /// Changes at or below the book sequence
    pub stale: usize,
    /// Price-zero records
    pub sequence_only: usize,
    /// Levels deleted
    pub removed: usize,
    /// Deletes for prices the book did not hold
    pub missing_deletes: usize,
    /// Levels inserted
    pub inserted: usize,
    /// Levels whose size changed
    pub updated: usize,
    /// Opposite-side levels removed by cross-book correction
    pub crossed_removed: usize,
    /// Sequence confirmed by a verification during this message
    pub confirmed: Option<u64>,
    /// Replay stopped early at this defect
    pub defect: Option<ChangeDefect>,
    /// The message started more than one past the book sequence
    pub discontinuity: Option<SequenceJump>,
    /// Book sequence after the message
    pub sequence: u64,
}

/// A message whose first sequence skipped ahead of the book
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SequenceJump {
    /// Book sequence before the message
    pub book: u64,
    /// `sequenceStart` of the message
    pub message_start: u64,
}

/// Failures while applying a diff message
#[derive(Debug, Error)]
pub enum SyncError {
    /// The message names an instrument the store does not track
    #[error("diff for untracked instrument {0}")]
    UnknownInstrument(String),

    /// Live book differs from the reference at the target sequence
    #[error("verification failure for {}: {side} differ at sequence {}", .live.instrument, .live.sequence)]
    VerificationFailure {
        side: Side,
        live: Box<BookSnapshot>,
        reference: Box<BookSnapshot>,
    },

    /// Live book moved past the reference sequence
    #[error("sequence gap for {}: live {} passed target {}", .live.instrument, .live.sequence, .reference.sequence)]
    SequenceGap {
        live: Box<BookSnapshot>,
        reference: Box<BookSnapshot>,
    },
}

impl SyncError {
    /// Whether the connection must be reset
    pub fn is_fatal(&self) -> bool {
        !matches!(self, Self::UnknownInstrument(_))
    }

    /// Live and reference books for forensic persistence
    pub fn forensic_books(&self) -> Option<(&BookSnapshot, &BookSnapshot)> {
        match self {
            Self::VerificationFailure {
                live, reference, ..
            }
            | Self::SequenceGap { live, reference } => Some((&**live, &**reference)),
            Self::UnknownInstrument(_) => None,
        }
    }
}

impl From<SyncError> for FeedError {
    fn from(err: SyncError) -> Self {
        match err {
            SyncError::VerificationFailure { side, live, .. } => FeedError::VerificationFailure {
                instrument: live.instrument.to_string(),
                sequence: live.sequence,
                side,
            },
            SyncError::SequenceGap { live, reference } => FeedError::SequenceGap {
                instrument: live.instrument.to_string(),
                target: reference.sequence,
                live: live.sequence,
            },
            SyncError::UnknownInstrument(instrument) => {
                FeedError::Configuration(format!("untracked instrument {}", instrument))
            }
        }
    }
}

/// Applies parsed diffs to a [`BookStore`]
#[derive(Debug, Clone)]
pub struct BookSynchronizer {
    store: BookStore,
}

impl BookSynchronizer {
    /// Create a synchronizer writing into `store`
    pub fn new(store: BookStore) -> Self {
        Self { store }
    }

    /// The store being written
    pub fn store(&self) -> &BookStore {
        &self.store
    }

    /// Replay one diff message
    ///
    /// `pending` is cleared whenever its verification settles, whether it
    /// confirmed or failed.
    pub fn apply(
        &self,
        msg: &DiffMessage,
        pending: &mut Option<VerificationRequest>,
    ) -> Result<SyncReport, SyncError> {
        let instrument = msg.instrument.as_str();
        self.store
            .with_book_mut(instrument, |book| {
                let mut report = SyncReport::default();

                let before = book.sequence();
                let next = before.checked_add(1);
                if before > 0 && next.is_some_and(|next| msg.sequence_start > next) {
                    report.discontinuity = Some(SequenceJump {
                        book: before,
                        message_start: msg.sequence_start,
                    });
                }

                for change in &msg.changes {
                    let outcome = book.apply_change(change);
                    match outcome {
                        ChangeOutcome::Stale => {
                            report.stale += 1;
                            continue;
                        }
                        ChangeOutcome::SequenceOnly => report.sequence_only += 1,
                        ChangeOutcome::Removed => report.removed += 1,
                        ChangeOutcome::RemoveMissing => report.missing_deletes += 1,
                        ChangeOutcome::Updated => report.updated += 1,
                        ChangeOutcome::Inserted { crossed_removed } => {
                            report.inserted += 1;
                            report.crossed_removed += crossed_removed;
                        }
                    }
                    report.applied += 1;

                    let verdict = match pending.as_ref() {
                        Some(request) => request.evaluate(book),
                        None => VerifyOutcome::Pending,
                    };
                    if !verdict.is_terminal() {
                        continue;
                    }
                    // Terminal verdicts imply a request was pending
                    let Some(request) = pending.take() else {
                        continue;
                    };
                    match verdict {
                        VerifyOutcome::Confirmed => report.confirmed = Some(book.sequence()),
                        VerifyOutcome::Mismatch { side } => {
                            return Err(SyncError::VerificationFailure {
                                side,
                                live: Box::new(book.snapshot()),
                                reference: Box::new(request.reference_snapshot()),
                            });
                        }
                        VerifyOutcome::Gap => {
                            return Err(SyncError::SequenceGap {
                                live: Box::new(book.snapshot()),
                                reference: Box::new(request.reference_snapshot()),
                            });
                        }
                        VerifyOutcome::Pending => {}
                    }
                }

                report.defect = msg.defect.clone();
                report.sequence = book.sequence();
                Ok(report)
            })
            .unwrap_or_else(|| Err(SyncError::UnknownInstrument(instrument.to_string())))
    }

    /// Whether the instrument is tracked
    pub fn tracks(&self, instrument: &Instrument) -> bool {
        self.store.contains(instrument.as_str())
    }
}
