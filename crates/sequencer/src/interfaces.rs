//! Collaborators the sequencer core drives but does not implement

use crate::error::{DropReason, L1Error, PoolError, StateError, WorkerError};
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use sequencer_types::{Address, FullBlock, Hash, PendingTransaction, TxStatus, TxTracker};
use std::sync::Arc;
use std::time::Duration;
use tokio_util::sync::CancellationToken;

/// Transaction pool
#[async_trait]
pub trait TxPool: Send + Sync {
    /// Pending transactions not yet claimed by the worker
    async fn get_non_wip_pending_txs(&self) -> Result<Vec<PendingTransaction>, PoolError>;

    async fn update_tx_status(
        &self,
        hash: Hash,
        status: TxStatus,
        is_wip: bool,
        failed_reason: Option<String>,
    ) -> Result<(), PoolError>;

    async fn update_tx_wip_status(&self, hash: Hash, is_wip: bool) -> Result<(), PoolError>;

    async fn delete_transactions_by_hashes(&self, hashes: &[Hash]) -> Result<(), PoolError>;

    async fn delete_failed_transactions_older_than(
        &self,
        cutoff: DateTime<Utc>,
    ) -> Result<(), PoolError>;

    /// Release every WIP claim (crash recovery at startup)
    async fn mark_wip_txs_as_pending(&self) -> Result<(), PoolError>;
}

/// Result of submitting a tracker to the worker
#[derive(Debug)]
pub enum AddTxOutcome {
    /// Tracker accepted; `replaced` is the queued tracker it evicted, if any
    Added { replaced: Option<TxTracker> },
    /// Tracker refused
    Dropped(DropReason),
}

/// Holds admitted transactions until block building consumes them.
///
/// Implementations synchronize internally; intake and expiry call it concurrently.
#[async_trait]
pub trait TxWorker: Send + Sync {
    fn new_tx_tracker(&self, tx: &PendingTransaction) -> Result<TxTracker, WorkerError>;

    async fn add_tx_tracker(&self, tracker: TxTracker) -> AddTxOutcome;

    /// Evict and return every tracker older than `max_lifetime`
    fn expire_transactions(&self, max_lifetime: Duration) -> Vec<TxTracker>;
}

/// Persisted chain state
#[async_trait]
pub trait StateReader: Send + Sync {
    async fn last_virtual_batch_num(&self) -> Result<u64, StateError>;

    async fn last_batch_number(&self) -> Result<u64, StateError>;

    async fn count_reorgs(&self) -> Result<u64, StateError>;

    /// Storage word at `position` of `address` under `state_root`
    async fn storage_at(
        &self,
        address: Address,
        position: Hash,
        state_root: Hash,
    ) -> Result<Hash, StateError>;

    /// Hashes of transactions included more than `confirmations` L1 blocks ago
    async fn txs_older_than_n_l1_blocks(&self, confirmations: u64) -> Result<Vec<Hash>, StateError>;

    /// Stored L2 blocks with a number above `block_number` (all when `None`), ascending
    async fn full_blocks_after(&self, block_number: Option<u64>) -> Result<Vec<FullBlock>, StateError>;
}

/// L1 chain reader
#[async_trait]
pub trait L1Reader: Send + Sync {
    async fn latest_batch_number(&self) -> Result<u64, L1Error>;

    async fn trusted_sequencer(&self) -> Result<Address, L1Error>;
}

/// Batch-closing engine, the sole producer of finalized blocks
#[async_trait]
pub trait Finalizer: Send + Sync {
    /// Run until `cancel` fires
    async fn start(self: Arc<Self>, cancel: CancellationToken);

    /// Stop producing blocks because of `cause`
    async fn halt(&self, cancel: &CancellationToken, cause: anyhow::Error);
}
