//! Pool transactions and the worker's admitted-transaction trackers

use crate::primitives::{Address, Hash};
use borsh::{BorshDeserialize, BorshSerialize};
use serde::{Deserialize, Serialize};
use std::time::{Duration, Instant};

/// Resource usage counters of a transaction (zkEVM prover resources)
#[derive(
    Clone, Copy, Debug, Default, PartialEq, Eq, BorshSerialize, BorshDeserialize, Serialize, Deserialize,
)]
pub struct ZkCounters {
    pub gas_used: u64,
    pub keccak_hashes: u32,
    pub poseidon_hashes: u32,
    pub poseidon_paddings: u32,
    pub mem_aligns: u32,
    pub arithmetics: u32,
    pub binaries: u32,
    pub steps: u32,
    pub sha256_hashes: u32,
}

impl ZkCounters {
    /// True when every counter is within the given limits
    pub fn fits_within(&self, limits: &ZkCounters) -> bool {
        self.gas_used <= limits.gas_used
            && self.keccak_hashes <= limits.keccak_hashes
            && self.poseidon_hashes <= limits.poseidon_hashes
            && self.poseidon_paddings <= limits.poseidon_paddings
            && self.mem_aligns <= limits.mem_aligns
            && self.arithmetics <= limits.arithmetics
            && self.binaries <= limits.binaries
            && self.steps <= limits.steps
            && self.sha256_hashes <= limits.sha256_hashes
    }
}

/// Pool-side status of a transaction.
///
/// The sequencer loops only move transactions to `Failed`; the finalizer
/// sets `Selected` and `Invalid` once a transaction has been executed.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub enum TxStatus {
    Pending,
    /// Rejected or expired before execution
    Failed,
    /// Included in a closed block
    Selected,
    /// Executed with an invalid result
    Invalid,
}

/// A transaction waiting in the pool
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct PendingTransaction {
    /// Transaction hash
    pub hash: Hash,
    /// Sender
    pub from: Address,
    pub nonce: u64,
    pub gas_price: u128,
    /// RLP-encoded transaction as received by the pool
    pub encoded: Vec<u8>,
    /// Resource usage reported by the pre-execution
    pub zk_counters: ZkCounters,
    /// Submitter IP (may be empty)
    pub ip: String,
}

/// The worker's record of an admitted transaction
#[derive(Clone, Debug)]
pub struct TxTracker {
    pub hash: Hash,
    pub from: Address,
    pub nonce: u64,
    pub gas_price: u128,
    pub counters: ZkCounters,
    pub ip: String,
    /// When the worker admitted the transaction
    pub received_at: Instant,
}

impl TxTracker {
    pub fn age(&self) -> Duration {
        self.received_at.elapsed()
    }

    /// True when the tracker has lived longer than `max_lifetime`
    pub fn is_expired(&self, max_lifetime: Duration) -> bool {
        self.age() > max_lifetime
    }
}
