//! Feed counters

use kucoin_book::SyncReport;
use std::sync::atomic::{AtomicU64, Ordering};

/// Live counters shared between the feed task and readers
#[derive(Debug, Default)]
pub struct FeedStats {
    frames: AtomicU64,
    processed: AtomicU64,
    parse_failures: AtomicU64,
    anomalies: AtomicU64,
    changes_applied: AtomicU64,
    stale_changes: AtomicU64,
    missing_deletes: AtomicU64,
    crossed_removed: AtomicU64,
    discontinuities: AtomicU64,
    verifications_confirmed: AtomicU64,
    verifications_deferred: AtomicU64,
    verification_failures: AtomicU64,
    sequence_gaps: AtomicU64,
    snapshots_persisted: AtomicU64,
    restarts: AtomicU64,
}

/// Point-in-time copy of [`FeedStats`]
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct StatsSnapshot {
    /// Data frames received
    pub frames: u64,
    /// Frames taken off the queue
    pub processed: u64,
    /// Frames dropped as unparseable
    pub parse_failures: u64,
    /// Messages whose replay stopped at a bad record, plus untracked instruments
    pub anomalies: u64,
    /// Changes that advanced a book sequence
    pub changes_applied: u64,
    /// Changes skipped as stale
    pub stale_changes: u64,
    /// Deletes for absent levels
    pub missing_deletes: u64,
    /// Levels removed by cross-book correction
    pub crossed_removed: u64,
    /// Messages starting past the next expected sequence
    pub discontinuities: u64,
    /// Verifications that matched
    pub verifications_confirmed: u64,
    /// Verifications skipped because one was pending
    pub verifications_deferred: u64,
    /// Verifications that mismatched
    pub verification_failures: u64,
    /// Verifications overrun by the live book
    pub sequence_gaps: u64,
    /// Snapshot files written
    pub snapshots_persisted: u64,
    /// Supervisor restarts
    pub restarts: u64,
}

fn bump(counter: &AtomicU64, by: u64) {
    counter.fetch_add(by, Ordering::Relaxed);
}

impl FeedStats {
    /// Create zeroed counters
    pub fn new() -> Self {
        Self::default()
    }

    pub(crate) fn frame_received(&self) {
        bump(&self.frames, 1);
    }

    pub(crate) fn frame_processed(&self) {
        bump(&self.processed, 1);
    }

    pub(crate) fn parse_failed(&self) {
        bump(&self.parse_failures, 1);
    }

    pub(crate) fn anomaly(&self) {
        bump(&self.anomalies, 1);
    }

    pub(crate) fn record_sync(&self, report: &SyncReport) {
        bump(&self.changes_applied, report.applied as u64);
        bump(&self.stale_changes, report.stale as u64);
        bump(&self.missing_deletes, report.missing_deletes as u64);
        bump(&self.crossed_removed, report.crossed_removed as u64);
        if report.discontinuity.is_some() {
            bump(&self.discontinuities, 1);
        }
        if report.defect.is_some() {
            bump(&self.anomalies, 1);
        }
        if report.confirmed.is_some() {
            bump(&self.verifications_confirmed, 1);
        }
    }

    pub(crate) fn verification_deferred(&self) {
        bump(&self.verifications_deferred, 1);
    }

    pub(crate) fn verification_failed(&self) {
        bump(&self.verification_failures, 1);
    }

    pub(crate) fn sequence_gap(&self) {
        bump(&self.sequence_gaps, 1);
    }

    pub(crate) fn persisted(&self, files: usize) {
        bump(&self.snapshots_persisted, files as u64);
    }

    pub(crate) fn restarted(&self) {
        bump(&self.restarts, 1);
    }

    /// Copy every counter
    pub fn snapshot(&self) -> StatsSnapshot {
        let load = |c: &AtomicU64| c.load(Ordering::Relaxed);
        StatsSnapshot {
            frames: load(&self.frames),
            processed: load(&self.processed),
            parse_failures: load(&self.parse_failures),
            anomalies: load(&self.anomalies),
            changes_applied: load(&self.changes_applied),
            stale_changes: load(&self.stale_changes),
            missing_deletes: load(&self.missing_deletes),
            crossed_removed: load(&self.crossed_removed),
            discontinuities: load(&self.discontinuities),
            verifications_confirmed: load(&self.verifications_confirmed),
            verifications_deferred: load(&self.verifications_deferred),
            verification_failures: load(&self.verification_failures),
            sequence_gaps: load(&self.sequence_gaps),
            snapshots_persisted: load(&self.snapshots_persisted),
            restarts: load(&self.restarts),
        }
    }
}
