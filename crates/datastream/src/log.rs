//! The append-only log contract used by the sequencer

use crate::error::StreamError;
use sequencer_types::EntryType;

/// Identifier of an appended entry
pub type EntryId = u64;

/// Appendable log with atomic write groups.
///
/// Entries appended between `start_atomic_op` and `commit_atomic_op` become
/// visible to readers together, or not at all after `rollback_atomic_op`.
/// A log has a single writer, hence `&mut self`.
pub trait StreamLog: Send {
    fn start_atomic_op(&mut self) -> Result<(), StreamError>;

    fn add_bookmark(&mut self, bookmark: Vec<u8>) -> Result<EntryId, StreamError>;

    fn add_entry(&mut self, entry_type: EntryType, data: Vec<u8>) -> Result<EntryId, StreamError>;

    fn commit_atomic_op(&mut self) -> Result<(), StreamError>;

    fn rollback_atomic_op(&mut self) -> Result<(), StreamError>;

    /// Most recently committed bookmark, if any
    fn last_bookmark(&self) -> Result<Option<Vec<u8>>, StreamError>;
}
