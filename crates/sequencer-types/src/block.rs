//! Finalized L2 blocks handed from the finalizer to the stream pipeline

use crate::primitives::{Address, Hash};
use crate::stream::{BookMark, L2BlockEnd, L2BlockStart};
use borsh::{BorshDeserialize, BorshSerialize};
use serde::{Deserialize, Serialize};

/// A transaction included in a finalized L2 block
#[derive(Clone, Debug, PartialEq, Eq, BorshSerialize, BorshDeserialize, Serialize, Deserialize)]
pub struct L2Transaction {
    /// Effective gas price percentage applied by the sequencer
    pub effective_gas_price_percentage: u8,
    pub is_valid: bool,
    /// Intermediate state root after this transaction.
    ///
    /// Not known to the finalizer; filled in at streaming time.
    pub state_root: Hash,
    /// Encoded transaction
    pub encoded: Vec<u8>,
}

impl L2Transaction {
    pub fn new(encoded: Vec<u8>, effective_gas_price_percentage: u8, is_valid: bool) -> Self {
        Self {
            effective_gas_price_percentage,
            is_valid,
            state_root: Hash::ZERO,
            encoded,
        }
    }

    pub fn to_bytes(&self) -> Vec<u8> {
        borsh::to_vec(self).expect("L2Transaction serialization should not fail")
    }

    pub fn from_bytes(data: &[u8]) -> Result<Self, borsh::io::Error> {
        borsh::from_slice(data)
    }
}

/// An immutable finalized L2 block
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct FullBlock {
    pub block_number: u64,
    pub batch_number: u64,
    /// Unix seconds
    pub timestamp: i64,
    pub global_exit_root: Hash,
    pub coinbase: Address,
    pub fork_id: u16,
    pub state_root: Hash,
    pub block_hash: Hash,
    /// Included transactions, in inclusion order
    pub txs: Vec<L2Transaction>,
}

impl FullBlock {
    pub fn bookmark(&self) -> BookMark {
        BookMark::l2_block(self.block_number)
    }

    pub fn start_record(&self) -> L2BlockStart {
        L2BlockStart {
            batch_number: self.batch_number,
            block_number: self.block_number,
            timestamp: self.timestamp,
            global_exit_root: self.global_exit_root,
            coinbase: self.coinbase,
            fork_id: self.fork_id,
        }
    }

    pub fn end_record(&self) -> L2BlockEnd {
        L2BlockEnd {
            block_number: self.block_number,
            block_hash: self.block_hash,
            state_root: self.state_root,
        }
    }
}
