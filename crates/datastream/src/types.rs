//! Stream entries and the messages exchanged with consumers

use borsh::{BorshDeserialize, BorshSerialize};
use sequencer_types::EntryType;
use serde::{Deserialize, Serialize};

/// What a stream entry holds
#[derive(Clone, Copy, Debug, PartialEq, Eq, BorshSerialize, BorshDeserialize, Serialize, Deserialize)]
pub enum EntryKind {
    /// Searchable marker (e.g. the start of an L2 block)
    Bookmark,
    /// Regular data record
    Data(EntryType),
}

/// A committed entry of the stream
#[derive(Clone, Debug, PartialEq, Eq, BorshSerialize, BorshDeserialize, Serialize, Deserialize)]
pub struct StreamEntry {
    /// Position in the stream, starting at 0
    pub id: u64,
    pub kind: EntryKind,
    /// Opaque encoded record
    pub payload: Vec<u8>,
}

/// Message sent by a consumer
#[derive(Debug, Clone, BorshSerialize, BorshDeserialize)]
pub enum ClientRequest {
    /// Replay from `entry` and then follow live commits
    StartFrom { entry: u64 },
}

/// Message sent by the stream server
#[derive(Debug, Clone, BorshSerialize, BorshDeserialize)]
pub enum ServerMessage {
    Entry(StreamEntry),
    /// Requested start is past the end of the stream
    Error { reason: String },
}

impl ClientRequest {
    pub fn to_bytes(&self) -> Vec<u8> {
        borsh::to_vec(self).expect("ClientRequest serialization should not fail")
    }

    pub fn from_bytes(data: &[u8]) -> Result<Self, borsh::io::Error> {
        borsh::from_slice(data)
    }
}

impl ServerMessage {
    pub fn to_bytes(&self) -> Vec<u8> {
        borsh::to_vec(self).expect("ServerMessage serialization should not fail")
    }

    pub fn from_bytes(data: &[u8]) -> Result<Self, borsh::io::Error> {
        borsh::from_slice(data)
    }
}
