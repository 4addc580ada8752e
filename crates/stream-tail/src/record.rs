//! Decoding of stream entries into typed records

use datastream::{EntryKind, StreamEntry};
use sequencer_types::{BookMark, EntryType, L2BlockEnd, L2BlockStart, L2Transaction};
use serde::Serialize;
use thiserror::Error;

#[derive(Error, Debug)]
#[error("entry {id}: cannot decode {kind:?} payload: {source}")]
pub struct DecodeError {
    pub id: u64,
    pub kind: EntryKind,
    #[source]
    pub source: std::io::Error,
}

/// Typed view of one stream entry
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum Record {
    Bookmark(BookMark),
    BlockStart(L2BlockStart),
    Transaction(L2Transaction),
    BlockEnd(L2BlockEnd),
}

impl Record {
    pub fn decode(entry: &StreamEntry) -> Result<Self, DecodeError> {
        let payload = &entry.payload;
        let decoded = match entry.kind {
            EntryKind::Bookmark => BookMark::from_bytes(payload).map(Record::Bookmark),
            EntryKind::Data(EntryType::L2BlockStart) => {
                L2BlockStart::from_bytes(payload).map(Record::BlockStart)
            }
            EntryKind::Data(EntryType::L2Tx) => {
                L2Transaction::from_bytes(payload).map(Record::Transaction)
            }
            EntryKind::Data(EntryType::L2BlockEnd) => {
                L2BlockEnd::from_bytes(payload).map(Record::BlockEnd)
            }
        };
        decoded.map_err(|source| DecodeError {
            id: entry.id,
            kind: entry.kind,
            source,
        })
    }

    /// Log the record with its entry id
    pub fn log(&self, id: u64) {
        match self {
            Record::Bookmark(bookmark) => {
                tracing::info!(id, block = bookmark.block_number, "bookmark");
            }
            Record::BlockStart(start) => tracing::info!(
                id,
                block = start.block_number,
                batch = start.batch_number,
                timestamp = start.timestamp,
                coinbase = %start.coinbase,
                fork_id = start.fork_id,
                "block start"
            ),
            Record::Transaction(tx) => tracing::info!(
                id,
                valid = tx.is_valid,
                egp_percentage = tx.effective_gas_price_percentage,
                state_root = %tx.state_root,
                size = tx.encoded.len(),
                "transaction"
            ),
            Record::BlockEnd(end) => tracing::info!(
                id,
                block = end.block_number,
                block_hash = %end.block_hash,
                state_root = %end.state_root,
                "block end"
            ),
        }
    }
}
