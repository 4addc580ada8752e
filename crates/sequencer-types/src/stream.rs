//! Payloads of the records appended to the data stream

use crate::primitives::{Address, Hash};
use borsh::{BorshDeserialize, BorshSerialize};
use serde::{Deserialize, Serialize};

/// Kind of a regular (non-bookmark) stream entry
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, BorshSerialize, BorshDeserialize, Serialize, Deserialize)]
#[borsh(use_discriminant = true)]
#[repr(u32)]
pub enum EntryType {
    L2BlockStart = 1,
    L2Tx = 2,
    L2BlockEnd = 3,
}

impl EntryType {
    pub fn code(self) -> u32 {
        self as u32
    }

    pub fn from_code(code: u32) -> Option<Self> {
        match code {
            1 => Some(Self::L2BlockStart),
            2 => Some(Self::L2Tx),
            3 => Some(Self::L2BlockEnd),
            _ => None,
        }
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, BorshSerialize, BorshDeserialize, Serialize, Deserialize)]
#[borsh(use_discriminant = true)]
#[repr(u8)]
pub enum BookmarkType {
    L2Block = 1,
}

/// Bookmark locating the first entry of an L2 block
#[derive(Clone, Copy, Debug, PartialEq, Eq, BorshSerialize, BorshDeserialize, Serialize, Deserialize)]
pub struct BookMark {
    pub kind: BookmarkType,
    pub block_number: u64,
}

impl BookMark {
    pub fn l2_block(block_number: u64) -> Self {
        Self {
            kind: BookmarkType::L2Block,
            block_number,
        }
    }

    pub fn to_bytes(&self) -> Vec<u8> {
        borsh::to_vec(self).expect("BookMark serialization should not fail")
    }

    pub fn from_bytes(data: &[u8]) -> Result<Self, borsh::io::Error> {
        borsh::from_slice(data)
    }
}

/// First record of an L2 block
#[derive(Clone, Debug, PartialEq, Eq, BorshSerialize, BorshDeserialize, Serialize, Deserialize)]
pub struct L2BlockStart {
    pub batch_number: u64,
    pub block_number: u64,
    pub timestamp: i64,
    pub global_exit_root: Hash,
    pub coinbase: Address,
    pub fork_id: u16,
}

impl L2BlockStart {
    pub fn to_bytes(&self) -> Vec<u8> {
        borsh::to_vec(self).expect("L2BlockStart serialization should not fail")
    }

    pub fn from_bytes(data: &[u8]) -> Result<Self, borsh::io::Error> {
        borsh::from_slice(data)
    }
}

/// Last record of an L2 block
#[derive(Clone, Debug, PartialEq, Eq, BorshSerialize, BorshDeserialize, Serialize, Deserialize)]
pub struct L2BlockEnd {
    pub block_number: u64,
    pub block_hash: Hash,
    pub state_root: Hash,
}

impl L2BlockEnd {
    pub fn to_bytes(&self) -> Vec<u8> {
        borsh::to_vec(self).expect("L2BlockEnd serialization should not fail")
    }

    pub fn from_bytes(data: &[u8]) -> Result<Self, borsh::io::Error> {
        borsh::from_slice(data)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_entry_type_codes() {
        assert_eq!(EntryType::L2BlockStart.code(), 1);
        assert_eq!(EntryType::from_code(3), Some(EntryType::L2BlockEnd));
        assert_eq!(EntryType::from_code(9), None);
    }

    #[test]
    fn test_bookmark_encoding_is_stable_per_block() {
        assert_eq!(BookMark::l2_block(7).to_bytes(), BookMark::l2_block(7).to_bytes());
        assert_ne!(BookMark::l2_block(7).to_bytes(), BookMark::l2_block(8).to_bytes());

        let decoded = BookMark::from_bytes(&BookMark::l2_block(42).to_bytes()).unwrap();
        assert_eq!(decoded.block_number, 42);
        assert_eq!(decoded.kind, BookmarkType::L2Block);
    }
}
