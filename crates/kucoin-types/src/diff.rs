//! Level2 diff message parsing
//!
//! A diff frame carries every book change between `sequenceStart` and
//! `sequenceEnd` split across an `asks` and a `bids` array, each record being
//! `[price, size, sequence]`. [`DiffMessage::parse`] merges both arrays into
//! one list ordered by sequence so the changes can be replayed exactly as the
//! venue applied them.

use crate::level::{decimal_from_value, deserialize_sequence, sequence_from_value};
use crate::{FrameKind, Instrument, Side};
use rust_decimal::Decimal;
use serde::Deserialize;
use thiserror::Error;

/// Subject of level2 update frames
pub const LEVEL2_SUBJECT: &str = "trade.l2update";

/// One price-level change inside a diff message
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BookChange {
    /// Book side the change applies to
    pub side: Side,
    /// Price of the level; zero marks a sequence-only record
    pub price: Decimal,
    /// New size at the price; zero deletes the level
    pub size: Decimal,
    /// Venue sequence number of this change
    pub sequence: u64,
}

impl BookChange {
    /// Create a change record
    pub fn new(side: Side, price: Decimal, size: Decimal, sequence: u64) -> Self {
        Self {
            side,
            price,
            size,
            sequence,
        }
    }

    /// Records with price zero only advance the book sequence
    pub fn is_sequence_only(&self) -> bool {
        self.price.is_zero()
    }

    /// Records with a price and a zero size remove the level
    pub fn is_delete(&self) -> bool {
        !self.price.is_zero() && self.size.is_zero()
    }
}

/// Why change replay stopped short of `sequence_end`
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum DefectReason {
    /// No record carries this sequence number
    Missing,
    /// A record carries this sequence number but its price or size is unreadable
    InvalidRecord(String),
}

/// First sequence in a message that could not be turned into a change
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ChangeDefect {
    /// Sequence number at which replay stopped
    pub sequence: u64,
    /// What was wrong with it
    pub reason: DefectReason,
}

/// Parsed incremental update for one instrument
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DiffMessage {
    /// Instrument the update belongs to
    pub instrument: Instrument,
    /// First sequence number covered by the message
    pub sequence_start: u64,
    /// Last sequence number covered by the message
    pub sequence_end: u64,
    /// Changes in ascending sequence order, stopping before any defect
    pub changes: Vec<BookChange>,
    /// Set when the message is missing a sequence or has an unreadable record
    pub defect: Option<ChangeDefect>,
}

/// Errors turning a raw frame into a [`DiffMessage`]
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ParseFailure {
    /// Frame is not valid JSON or does not have the level2 layout
    #[error("malformed diff frame: {0}")]
    Json(String),

    /// Frame is valid but is not a data message
    #[error("not a diff message (frame type {0:?})")]
    NotDiffMessage(FrameKind),

    /// Data message without a payload
    #[error("diff message has no data")]
    MissingData,

    /// `sequenceEnd` precedes `sequenceStart`
    #[error("invalid sequence range {start}..={end}")]
    InvalidSequenceRange { start: u64, end: u64 },

    /// A change record whose sequence number cannot be read
    #[error("unreadable {side} record #{index}: {reason}")]
    InvalidChange {
        side: Side,
        index: usize,
        reason: String,
    },
}

#[derive(Deserialize)]
struct RawFrame {
    #[serde(rename = "type")]
    kind: FrameKind,
    #[serde(default)]
    subject: Option<String>,
    #[serde(default)]
    data: Option<RawDiffData>,
}

#[derive(Deserialize)]
struct RawDiffData {
    #[serde(rename = "sequenceStart", deserialize_with = "deserialize_sequence")]
    sequence_start: u64,
    #[serde(rename = "sequenceEnd", deserialize_with = "deserialize_sequence")]
    sequence_end: u64,
    symbol: String,
    #[serde(default)]
    changes: RawChanges,
}

#[derive(Default, Deserialize)]
struct RawChanges {
    #[serde(default)]
    asks: Vec<Vec<serde_json::Value>>,
    #[serde(default)]
    bids: Vec<Vec<serde_json::Value>>,
}

/// A record whose sequence is known; price/size may still be bad
struct SequencedRecord {
    sequence: u64,
    parsed: Result<BookChange, String>,
}

impl DiffMessage {
    /// Parse one raw websocket frame
    pub fn parse(text: &str) -> Result<Self, ParseFailure> {
        let frame: RawFrame =
            serde_json::from_str(text).map_err(|e| ParseFailure::Json(e.to_string()))?;

        if frame.kind != FrameKind::Message {
            return Err(ParseFailure::NotDiffMessage(frame.kind));
        }
        if let Some(subject) = frame.subject.as_deref() {
            if subject != LEVEL2_SUBJECT {
                return Err(ParseFailure::Json(format!("unexpected subject {}", subject)));
            }
        }

        let data = frame.data.ok_or(ParseFailure::MissingData)?;
        Self::from_raw(data)
    }

    fn from_raw(data: RawDiffData) -> Result<Self, ParseFailure> {
        let start = data.sequence_start;
        let end = data.sequence_end;
        if end < start {
            return Err(ParseFailure::InvalidSequenceRange { start, end });
        }

        let mut records = Vec::with_capacity(data.changes.asks.len() + data.changes.bids.len());
        collect_records(Side::Ask, &data.changes.asks, &mut records)?;
        collect_records(Side::Bid, &data.changes.bids, &mut records)?;

        records.retain(|r| r.sequence >= start && r.sequence <= end);
        records.sort_by_key(|r| r.sequence);

        let mut changes = Vec::with_capacity(records.len());
        let mut defect = None;
        let mut expected = start;

        for record in records {
            if record.sequence < expected {
                // Duplicate sequence within one message; the first record wins
                continue;
            }
            if record.sequence > expected {
                defect = Some(ChangeDefect {
                    sequence: expected,
                    reason: DefectReason::Missing,
                });
                break;
            }
            let Some(next) = record.sequence.checked_add(1) else {
                defect = Some(ChangeDefect {
                    sequence: record.sequence,
                    reason: DefectReason::InvalidRecord("sequence number overflows".to_string()),
                });
                break;
            };
            match record.parsed {
                Ok(change) => changes.push(change),
                Err(reason) => {
                    defect = Some(ChangeDefect {
                        sequence: record.sequence,
                        reason: DefectReason::InvalidRecord(reason),
                    });
                    break;
                }
            }
            expected = next;
        }

        if defect.is_none() && expected <= end {
            defect = Some(ChangeDefect {
                sequence: expected,
                reason: DefectReason::Missing,
            });
        }

        Ok(Self {
            instrument: Instrument::new(data.symbol),
            sequence_start: start,
            sequence_end: end,
            changes,
            defect,
        })
    }

    /// Number of sequence numbers the message claims to cover
    pub fn span(&self) -> u64 {
        (self.sequence_end - self.sequence_start).saturating_add(1)
    }

    /// Whether every sequence in the range produced a change
    pub fn is_complete(&self) -> bool {
        self.defect.is_none()
    }
}

fn collect_records(
    side: Side,
    raw: &[Vec<serde_json::Value>],
    out: &mut Vec<SequencedRecord>,
) -> Result<(), ParseFailure> {
    for (index, record) in raw.iter().enumerate() {
        let sequence = record
            .get(2)
            .and_then(sequence_from_value)
            .ok_or_else(|| ParseFailure::InvalidChange {
                side,
                index,
                reason: "missing or non-numeric sequence".to_string(),
            })?;

        let price = record.first().and_then(decimal_from_value);
        let size = record.get(1).and_then(decimal_from_value);
        let parsed = match (price, size) {
            (Some(price), Some(size)) if !size.is_sign_negative() => {
                Ok(BookChange::new(side, price, size, sequence))
            }
            (Some(_), Some(size)) => Err(format!("negative size {}", size)),
            (None, _) => Err(format!("unreadable price {:?}", record.first())),
            (_, None) => Err(format!("unreadable size {:?}", record.get(1))),
        };

        out.push(SequencedRecord { sequence, parsed });
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use rust_decimal_macros::dec;

    const MULTI: &str = r#"{"type":"message","tunnelId":"DOT-BTC_books","topic":"/market/level2:DOT-BTC","subject":"trade.l2update","data":{"changes":{"asks":[["0.00037526","50","11501462"],["0.00037563","150","11501461"]],"bids":[["0.00037339","150","11501460"]]},"sequenceEnd":11501462,"sequenceStart":11501460,"symbol":"DOT-BTC","time":1659738043576}}"#;

    #[test]
    fn test_parse_orders_changes_by_sequence() {
        let msg = DiffMessage::parse(MULTI).unwrap();
        assert_eq!(msg.instrument.as_str(), "DOT-BTC");
        assert_eq!(msg.sequence_start, 11501460);
        assert_eq!(msg.sequence_end, 11501462);
        assert_eq!(msg.span(), 3);
        assert!(msg.is_complete());

        let seqs: Vec<u64> = msg.changes.iter().map(|c| c.sequence).collect();
        assert_eq!(seqs, vec![11501460, 11501461, 11501462]);
        assert_eq!(msg.changes[0].side, Side::Bid);
        assert_eq!(msg.changes[1].side, Side::Ask);
        assert_eq!(msg.changes[1].price, dec!(0.00037563));
        assert_eq!(msg.changes[2].size, dec!(50));
    }

    #[test]
    fn test_parse_sequence_only_record() {
        let raw = r#"{"type":"message","tunnelId":"XMR-USDT_books","topic":"/market/level2:XMR-USDT","subject":"trade.l2update","data":{"sequenceStart":1617361515152,"symbol":"XMR-USDT","changes":{"asks":[],"bids":[["0","0","1617361515152"]]},"sequenceEnd":1617361515152}}"#;
        let msg = DiffMessage::parse(raw).unwrap();
        assert_eq!(msg.changes.len(), 1);
        assert!(msg.changes[0].is_sequence_only());
        assert!(!msg.changes[0].is_delete());
    }

    #[test]
    fn test_parse_empty_changes() {
        let raw = r#"{"type":"message","subject":"trade.l2update","data":{"sequenceStart":5,"sequenceEnd":5,"symbol":"BTC-USDT","changes":{"asks":[],"bids":[]}}}"#;
        let msg = DiffMessage::parse(raw).unwrap();
        assert!(msg.changes.is_empty());
        assert_eq!(
            msg.defect,
            Some(ChangeDefect {
                sequence: 5,
                reason: DefectReason::Missing
            })
        );
    }

    #[test]
    fn test_parse_drops_out_of_range_records() {
        let raw = r#"{"type":"message","subject":"trade.l2update","data":{"sequenceStart":10,"sequenceEnd":11,"symbol":"BTC-USDT","changes":{"asks":[["1","1","9"],["1","2","10"]],"bids":[["0.5","1","11"],["0.4","1","12"]]}}}"#;
        let msg = DiffMessage::parse(raw).unwrap();
        let seqs: Vec<u64> = msg.changes.iter().map(|c| c.sequence).collect();
        assert_eq!(seqs, vec![10, 11]);
        assert!(msg.is_complete());
    }

    #[test]
    fn test_parse_gap_stops_replay() {
        let raw = r#"{"type":"message","subject":"trade.l2update","data":{"sequenceStart":10,"sequenceEnd":12,"symbol":"BTC-USDT","changes":{"asks":[["1","1","10"],["1","2","12"]],"bids":[]}}}"#;
        let msg = DiffMessage::parse(raw).unwrap();
        assert_eq!(msg.changes.len(), 1);
        assert_eq!(
            msg.defect,
            Some(ChangeDefect {
                sequence: 11,
                reason: DefectReason::Missing
            })
        );
    }

    #[test]
    fn test_parse_invalid_price_stops_replay() {
        let raw = r#"{"type":"message","subject":"trade.l2update","data":{"sequenceStart":10,"sequenceEnd":12,"symbol":"BTC-USDT","changes":{"asks":[["1","1","10"],["oops","2","11"],["2","1","12"]],"bids":[]}}}"#;
        let msg = DiffMessage::parse(raw).unwrap();
        assert_eq!(msg.changes.len(), 1);
        let defect = msg.defect.unwrap();
        assert_eq!(defect.sequence, 11);
        assert!(matches!(defect.reason, DefectReason::InvalidRecord(_)));
    }

    #[test]
    fn test_parse_rejects_change_at_maximum_sequence() {
        let max = u64::MAX;
        let text = format!(
            r#"{{"type":"message","subject":"trade.l2update","data":{{"changes":{{"asks":[],"bids":[["9.5","1","{}"],["9.4","1","{}"]]}},"sequenceEnd":"{}","sequenceStart":"{}","symbol":"BTC-USDT"}}}}"#,
            max - 1,
            max,
            max,
            max - 1
        );
        let msg = DiffMessage::parse(&text).unwrap();
        assert_eq!(msg.span(), 2);
        assert_eq!(msg.changes.len(), 1);
        assert_eq!(msg.changes[0].sequence, max - 1);
        let defect = msg.defect.unwrap();
        assert_eq!(defect.sequence, max);
        assert!(matches!(defect.reason, DefectReason::InvalidRecord(_)));
    }

    #[test]
    fn test_span_of_full_range_saturates() {
        let msg = DiffMessage {
            instrument: Instrument::from("BTC-USDT"),
            sequence_start: 0,
            sequence_end: u64::MAX,
            changes: Vec::new(),
            defect: None,
        };
        assert_eq!(msg.span(), u64::MAX);
    }

    #[test]
    fn test_parse_failures() {
        assert!(matches!(DiffMessage::parse("not json"), Err(ParseFailure::Json(_))));
        assert!(matches!(
            DiffMessage::parse(r#"{"type":"pong","id":"1"}"#),
            Err(ParseFailure::NotDiffMessage(FrameKind::Pong))
        ));
        assert!(matches!(
            DiffMessage::parse(r#"{"type":"message"}"#),
            Err(ParseFailure::MissingData)
        ));
        assert!(matches!(
            DiffMessage::parse(
                r#"{"type":"message","data":{"sequenceStart":5,"sequenceEnd":4,"symbol":"A-B","changes":{}}}"#
            ),
            Err(ParseFailure::InvalidSequenceRange { start: 5, end: 4 })
        ));
        assert!(matches!(
            DiffMessage::parse(
                r#"{"type":"message","data":{"sequenceStart":5,"sequenceEnd":5,"symbol":"A-B","changes":{"bids":[["1","1"]]}}}"#
            ),
            Err(ParseFailure::InvalidChange { side: Side::Bid, index: 0, .. })
        ));
    }
}
