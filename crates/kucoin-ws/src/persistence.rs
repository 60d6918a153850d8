//! Rotated snapshot files
//!
//! Each (instrument, kind) slot keeps its two newest files; the third write
//! deletes the oldest. Periodic batches are bracketed by a busy marker so
//! external readers can skip a half-written generation.
//!
//! File layout:
//!
//! ```text
//! books/BTC-USDT-2024-03-01-12-00-00-123456.BOOKS
//! {"BTC-USDT": [{"sequence": 11501462}, {"bids": [["9.5","3"]]}, {"asks": [["10","1"]]}]}
//! ```

use chrono::{DateTime, NaiveDateTime, Utc};
use kucoin_book::BookSnapshot;
use kucoin_types::{FeedError, Instrument, Level};
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, HashMap, VecDeque};
use std::fs::{self, File};
use std::io::{self, Write};
use std::path::{Path, PathBuf};
use thiserror::Error;
use tracing::{debug, warn};

/// Busy marker file name
pub const BUSY_MARKER: &str = "BUSY.FLG";

/// Busy marker contents
pub const BUSY_CONTENTS: &str = "WAIT!";

/// Generations kept per slot
pub const GENERATIONS: usize = 2;

const TIMESTAMP_FORMAT: &str = "%Y-%m-%d-%H-%M-%S-%6f";

// Rendered length of TIMESTAMP_FORMAT
const STAMP_LEN: usize = 26;

/// Errors from snapshot persistence
#[derive(Error, Debug)]
pub enum PersistError {
    #[error("IO error on {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: io::Error,
    },

    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    #[error("Malformed snapshot file {path}: {reason}")]
    Malformed { path: PathBuf, reason: String },
}

impl PersistError {
    fn io(path: &Path, source: io::Error) -> Self {
        Self::Io {
            path: path.to_path_buf(),
            source,
        }
    }
}

impl From<PersistError> for FeedError {
    fn from(err: PersistError) -> Self {
        FeedError::Persistence(err.to_string())
    }
}

/// Which slot a file belongs to
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum SnapshotKind {
    /// Periodic live book, and the live side of a failure
    Books,
    /// REST reference captured for a failed verification
    Verify,
}

impl SnapshotKind {
    /// File extension including the dot
    pub fn extension(&self) -> &'static str {
        match self {
            Self::Books => ".BOOKS",
            Self::Verify => ".VERIFY",
        }
    }

    fn from_extension(ext: &str) -> Option<Self> {
        match ext {
            "BOOKS" => Some(Self::Books),
            "VERIFY" => Some(Self::Verify),
            _ => None,
        }
    }
}

#[derive(Debug, Serialize, Deserialize)]
#[serde(untagged)]
enum Section {
    Sequence { sequence: u64 },
    Bids { bids: Vec<Level> },
    Asks { asks: Vec<Level> },
}

/// A snapshot file read back from disk
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PersistedSnapshot {
    /// Slot the file was written to
    pub kind: SnapshotKind,
    /// Book contents
    pub book: BookSnapshot,
    /// Write time encoded in the file name
    pub written_at: Option<DateTime<Utc>>,
}

/// Writes rotated snapshot files for one session
#[derive(Debug)]
pub struct PersistenceManager {
    dir: PathBuf,
    rotations: HashMap<(Instrument, SnapshotKind), VecDeque<PathBuf>>,
}

impl PersistenceManager {
    /// Create a manager writing into `dir`; rotation starts empty
    pub fn new(dir: impl Into<PathBuf>) -> Self {
        Self {
            dir: dir.into(),
            rotations: HashMap::new(),
        }
    }

    /// Create a manager whose rotation picks up the files already in `dir`
    ///
    /// Files left by an earlier session count as the oldest generations of
    /// their slot and are rotated away by the next writes.
    pub fn open(dir: impl Into<PathBuf>) -> Self {
        let mut manager = Self::new(dir);
        let entries = match fs::read_dir(&manager.dir) {
            Ok(entries) => entries,
            Err(e) if e.kind() == io::ErrorKind::NotFound => return manager,
            Err(e) => {
                warn!(dir = %manager.dir.display(), error = %e, "Cannot scan snapshot directory");
                return manager;
            }
        };

        let mut found: Vec<(FileName, PathBuf)> = entries
            .filter_map(|entry| entry.ok().map(|e| e.path()))
            .filter_map(|path| FileName::parse(&path).map(|name| (name, path)))
            .collect();
        // oldest first, so each push_front leaves the newest at the front
        found.sort_by(|(a, _), (b, _)| a.order_key().cmp(&b.order_key()));
        for (name, path) in found {
            manager
                .rotations
                .entry((name.instrument, name.kind))
                .or_default()
                .push_front(path);
        }

        if !manager.rotations.is_empty() {
            debug!(
                dir = %manager.dir.display(),
                slots = manager.rotations.len(),
                "Resumed rotation from existing snapshot files"
            );
        }
        manager
    }

    /// Snapshot directory
    pub fn dir(&self) -> &Path {
        &self.dir
    }

    /// Delete every file in the snapshot directory, creating it if needed
    ///
    /// Returns the number of files removed.
    pub fn purge(&mut self) -> Result<usize, PersistError> {
        fs::create_dir_all(&self.dir).map_err(|e| PersistError::io(&self.dir, e))?;
        let mut removed = 0;
        for entry in fs::read_dir(&self.dir).map_err(|e| PersistError::io(&self.dir, e))? {
            let path = entry.map_err(|e| PersistError::io(&self.dir, e))?.path();
            if path.is_file() {
                fs::remove_file(&path).map_err(|e| PersistError::io(&path, e))?;
                removed += 1;
            }
        }
        self.rotations.clear();
        debug!(dir = %self.dir.display(), removed, "Purged snapshot directory");
        Ok(removed)
    }

    /// Write one snapshot and rotate its slot
    pub fn persist(&mut self, kind: SnapshotKind, book: &BookSnapshot) -> Result<PathBuf, PersistError> {
        fs::create_dir_all(&self.dir).map_err(|e| PersistError::io(&self.dir, e))?;

        let path = self.next_path(kind, &book.instrument);
        write_atomic(&path, &encode(book)?)?;

        let slot = self
            .rotations
            .entry((book.instrument.clone(), kind))
            .or_default();
        slot.push_front(path.clone());
        while slot.len() > GENERATIONS {
            if let Some(oldest) = slot.pop_back() {
                match fs::remove_file(&oldest) {
                    Ok(()) => {}
                    Err(e) if e.kind() == io::ErrorKind::NotFound => {}
                    Err(e) => return Err(PersistError::io(&oldest, e)),
                }
            }
        }

        debug!(path = %path.display(), sequence = book.sequence, "Persisted snapshot");
        Ok(path)
    }

    /// Write a batch of snapshots behind the busy marker
    pub fn persist_batch(
        &mut self,
        kind: SnapshotKind,
        books: &[BookSnapshot],
    ) -> Result<Vec<PathBuf>, PersistError> {
        let _busy = self.mark_busy()?;
        books.iter().map(|book| self.persist(kind, book)).collect()
    }

    /// Write the busy marker; it is removed when the returned guard drops
    pub fn mark_busy(&self) -> Result<BusyMarker, PersistError> {
        fs::create_dir_all(&self.dir).map_err(|e| PersistError::io(&self.dir, e))?;
        let path = self.dir.join(BUSY_MARKER);
        fs::write(&path, BUSY_CONTENTS).map_err(|e| PersistError::io(&path, e))?;
        Ok(BusyMarker { path })
    }

    /// Files currently retained for a slot, newest first
    pub fn retained(&self, instrument: &Instrument, kind: SnapshotKind) -> Vec<PathBuf> {
        self.rotations
            .get(&(instrument.clone(), kind))
            .map(|slot| slot.iter().cloned().collect())
            .unwrap_or_default()
    }

    fn next_path(&self, kind: SnapshotKind, instrument: &Instrument) -> PathBuf {
        let stamp = Utc::now().format(TIMESTAMP_FORMAT).to_string();
        let mut path = self
            .dir
            .join(format!("{}-{}{}", instrument, stamp, kind.extension()));
        let mut n = 1;
        while path.exists() {
            path = self
                .dir
                .join(format!("{}-{}_{}{}", instrument, stamp, n, kind.extension()));
            n += 1;
        }
        path
    }
}

/// Busy marker held for the duration of a batch
#[derive(Debug)]
pub struct BusyMarker {
    path: PathBuf,
}

impl BusyMarker {
    /// Marker file path
    pub fn path(&self) -> &Path {
        &self.path
    }
}

impl Drop for BusyMarker {
    fn drop(&mut self) {
        if let Err(e) = fs::remove_file(&self.path) {
            warn!(path = %self.path.display(), error = %e, "Failed to remove busy marker");
        }
    }
}

/// Parts of a snapshot file name: `<instrument>-<stamp>[_<n>].<KIND>`
#[derive(Debug, Clone, PartialEq, Eq)]
struct FileName {
    instrument: Instrument,
    kind: SnapshotKind,
    stamp: NaiveDateTime,
    collision: u32,
}

impl FileName {
    fn parse(path: &Path) -> Option<Self> {
        let kind = SnapshotKind::from_extension(path.extension()?.to_str()?)?;
        let stem = path.file_stem()?.to_str()?;

        let (base, collision) = match stem.rsplit_once('_') {
            Some((base, n)) if !n.is_empty() && n.bytes().all(|b| b.is_ascii_digit()) => {
                (base, n.parse().ok()?)
            }
            _ => (stem, 0),
        };

        let split = base.len().checked_sub(STAMP_LEN + 1)?;
        if !base.is_char_boundary(split) || base.as_bytes()[split] != b'-' {
            return None;
        }
        let stamp = NaiveDateTime::parse_from_str(&base[split + 1..], TIMESTAMP_FORMAT).ok()?;
        let instrument = &base[..split];
        if instrument.is_empty() {
            return None;
        }

        Some(Self {
            instrument: Instrument::new(instrument),
            kind,
            stamp,
            collision,
        })
    }

    fn order_key(&self) -> (NaiveDateTime, u32) {
        (self.stamp, self.collision)
    }
}

fn encode(book: &BookSnapshot) -> Result<Vec<u8>, PersistError> {
    let mut doc = BTreeMap::new();
    doc.insert(
        book.instrument.to_string(),
        vec![
            Section::Sequence {
                sequence: book.sequence,
            },
            Section::Bids {
                bids: book.bids.clone(),
            },
            Section::Asks {
                asks: book.asks.clone(),
            },
        ],
    );
    Ok(serde_json::to_vec_pretty(&doc)?)
}

// Write to a temp file and rename so readers never see a partial file
fn write_atomic(path: &Path, data: &[u8]) -> Result<(), PersistError> {
    let tmp = path.with_extension("tmp");
    {
        let mut file = File::create(&tmp).map_err(|e| PersistError::io(&tmp, e))?;
        file.write_all(data).map_err(|e| PersistError::io(&tmp, e))?;
        file.sync_all().map_err(|e| PersistError::io(&tmp, e))?;
    }
    fs::rename(&tmp, path).map_err(|e| PersistError::io(path, e))
}

/// Whether a periodic batch is being written into `dir`
pub fn is_busy(dir: impl AsRef<Path>) -> bool {
    dir.as_ref().join(BUSY_MARKER).exists()
}

/// Read a snapshot file written by [`PersistenceManager`]
pub fn read_snapshot(path: impl AsRef<Path>) -> Result<PersistedSnapshot, PersistError> {
    let path = path.as_ref();
    let malformed = |reason: &str| PersistError::Malformed {
        path: path.to_path_buf(),
        reason: reason.to_string(),
    };

    let kind = path
        .extension()
        .and_then(|e| e.to_str())
        .and_then(SnapshotKind::from_extension)
        .ok_or_else(|| malformed("unknown extension"))?;

    let data = fs::read(path).map_err(|e| PersistError::io(path, e))?;
    let doc: BTreeMap<String, Vec<Section>> = serde_json::from_slice(&data)?;
    let (name, sections) = doc
        .into_iter()
        .next()
        .ok_or_else(|| malformed("empty document"))?;

    let mut sequence = None;
    let mut bids = Vec::new();
    let mut asks = Vec::new();
    for section in sections {
        match section {
            Section::Sequence { sequence: s } => sequence = Some(s),
            Section::Bids { bids: b } => bids = b,
            Section::Asks { asks: a } => asks = a,
        }
    }
    let sequence = sequence.ok_or_else(|| malformed("missing sequence"))?;

    let written_at = FileName::parse(path)
        .filter(|file| file.instrument.as_str() == name)
        .map(|file| file.stamp.and_utc());

    Ok(PersistedSnapshot {
        kind,
        book: BookSnapshot::new(Instrument::new(name), sequence, bids, asks),
        written_at,
    })
}
