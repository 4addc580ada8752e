//! In-memory collaborators for unit tests

use crate::error::{L1Error, PoolError, StateError};
use crate::interfaces::{Finalizer, L1Reader, StateReader, TxPool};
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use datastream::{EntryId, StreamError, StreamLog};
use parking_lot::Mutex;
use sequencer_types::{
    Address, BookMark, EntryType, FullBlock, Hash, L2Transaction, PendingTransaction, TxStatus,
    ZkCounters,
};
use std::collections::HashSet;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;

/// Pool transaction with hash `id` sent by address `sender`
pub fn pending_tx(id: u8, sender: u8, nonce: u64, gas_price: u128) -> PendingTransaction {
    let mut from = [0u8; 20];
    from[19] = sender;
    PendingTransaction {
        hash: Hash::from_u64(id as u64),
        from: Address::new(from),
        nonce,
        gas_price,
        encoded: vec![0xf8, id],
        zk_counters: ZkCounters::default(),
        ip: String::new(),
    }
}

/// Finalized block `number` carrying `txs` transactions
pub fn full_block(number: u64, txs: usize) -> FullBlock {
    FullBlock {
        block_number: number,
        batch_number: number / 10 + 1,
        timestamp: 1_700_000_000 + number as i64,
        global_exit_root: Hash::from_u64(number + 1000),
        coinbase: Address::new([0x11; 20]),
        fork_id: 9,
        state_root: Hash::from_u64(number + 2000),
        block_hash: Hash::from_u64(number + 3000),
        txs: (0..txs)
            .map(|i| L2Transaction::new(vec![0xf8, number as u8, i as u8], 100, true))
            .collect(),
    }
}

// ----- pool -----

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PoolCall {
    UpdateStatus(Hash),
    UpdateWip(Hash),
    DeleteByHashes(Vec<Hash>),
    DeleteFailedOlderThan(DateTime<Utc>),
    MarkWipAsPending,
}

struct PoolEntry {
    tx: PendingTransaction,
    status: TxStatus,
    is_wip: bool,
    failed_reason: Option<String>,
    wip_marks: usize,
    received_at: DateTime<Utc>,
}

#[derive(Default)]
struct PoolInner {
    entries: Vec<PoolEntry>,
    calls: Vec<PoolCall>,
    failing_status_updates: HashSet<Hash>,
    fail_fetch: bool,
    fail_deletes: bool,
    fail_failed_cleanup: bool,
    fail_mark_wip: bool,
}

impl PoolInner {
    fn entry_mut(&mut self, hash: &Hash) -> Option<&mut PoolEntry> {
        self.entries.iter_mut().find(|entry| entry.tx.hash == *hash)
    }

    fn entry(&self, hash: &Hash) -> Option<&PoolEntry> {
        self.entries.iter().find(|entry| entry.tx.hash == *hash)
    }
}

#[derive(Default)]
pub struct MockPool {
    inner: Mutex<PoolInner>,
}

impl MockPool {
    /// Add a pending, unclaimed transaction
    pub fn insert(&self, tx: PendingTransaction) {
        let mut inner = self.inner.lock();
        inner.entries.retain(|entry| entry.tx.hash != tx.hash);
        inner.entries.push(PoolEntry {
            tx,
            status: TxStatus::Pending,
            is_wip: false,
            failed_reason: None,
            wip_marks: 0,
            received_at: Utc::now(),
        });
    }

    /// Claim a transaction as if a previous run had admitted it
    pub fn set_wip(&self, hash: &Hash) {
        if let Some(entry) = self.inner.lock().entry_mut(hash) {
            entry.is_wip = true;
        }
    }

    pub fn len(&self) -> usize {
        self.inner.lock().entries.len()
    }

    pub fn status(&self, hash: &Hash) -> Option<TxStatus> {
        self.inner.lock().entry(hash).map(|entry| entry.status)
    }

    pub fn is_wip(&self, hash: &Hash) -> bool {
        self.inner.lock().entry(hash).is_some_and(|entry| entry.is_wip)
    }

    /// How many times the transaction was marked WIP
    pub fn wip_marks(&self, hash: &Hash) -> usize {
        self.inner.lock().entry(hash).map_or(0, |entry| entry.wip_marks)
    }

    pub fn failed_reason(&self, hash: &Hash) -> Option<String> {
        self.inner
            .lock()
            .entry(hash)
            .and_then(|entry| entry.failed_reason.clone())
    }

    pub fn calls(&self) -> Vec<PoolCall> {
        self.inner.lock().calls.clone()
    }

    pub fn fail_status_updates_for(&self, hash: Hash) {
        self.inner.lock().failing_status_updates.insert(hash);
    }

    pub fn fail_fetch(&self) {
        self.inner.lock().fail_fetch = true;
    }

    pub fn fail_deletes(&self) {
        self.inner.lock().fail_deletes = true;
    }

    pub fn fail_failed_cleanup(&self) {
        self.inner.lock().fail_failed_cleanup = true;
    }

    pub fn fail_mark_wip(&self) {
        self.inner.lock().fail_mark_wip = true;
    }
}

fn injected(what: &str) -> anyhow::Error {
    anyhow::anyhow!("injected {} failure", what)
}

#[async_trait]
impl TxPool for MockPool {
    async fn get_non_wip_pending_txs(&self) -> Result<Vec<PendingTransaction>, PoolError> {
        let inner = self.inner.lock();
        if inner.fail_fetch {
            return Err(injected("fetch").into());
        }
        Ok(inner
            .entries
            .iter()
            .filter(|entry| entry.status == TxStatus::Pending && !entry.is_wip)
            .map(|entry| entry.tx.clone())
            .collect())
    }

    async fn update_tx_status(
        &self,
        hash: Hash,
        status: TxStatus,
        is_wip: bool,
        failed_reason: Option<String>,
    ) -> Result<(), PoolError> {
        let mut inner = self.inner.lock();
        inner.calls.push(PoolCall::UpdateStatus(hash));
        if inner.failing_status_updates.contains(&hash) {
            return Err(injected("status update").into());
        }
        let entry = inner.entry_mut(&hash).ok_or(PoolError::NotFound)?;
        entry.status = status;
        entry.is_wip = is_wip;
        entry.failed_reason = failed_reason;
        Ok(())
    }

    async fn update_tx_wip_status(&self, hash: Hash, is_wip: bool) -> Result<(), PoolError> {
        let mut inner = self.inner.lock();
        inner.calls.push(PoolCall::UpdateWip(hash));
        let entry = inner.entry_mut(&hash).ok_or(PoolError::NotFound)?;
        entry.is_wip = is_wip;
        if is_wip {
            entry.wip_marks += 1;
        }
        Ok(())
    }

    async fn delete_transactions_by_hashes(&self, hashes: &[Hash]) -> Result<(), PoolError> {
        let mut inner = self.inner.lock();
        if inner.fail_deletes {
            return Err(injected("delete").into());
        }
        inner.calls.push(PoolCall::DeleteByHashes(hashes.to_vec()));
        inner.entries.retain(|entry| !hashes.contains(&entry.tx.hash));
        Ok(())
    }

    async fn delete_failed_transactions_older_than(
        &self,
        cutoff: DateTime<Utc>,
    ) -> Result<(), PoolError> {
        let mut inner = self.inner.lock();
        if inner.fail_failed_cleanup {
            return Err(injected("failed txs cleanup").into());
        }
        inner.calls.push(PoolCall::DeleteFailedOlderThan(cutoff));
        inner
            .entries
            .retain(|entry| !(entry.status == TxStatus::Failed && entry.received_at < cutoff));
        Ok(())
    }

    async fn mark_wip_txs_as_pending(&self) -> Result<(), PoolError> {
        let mut inner = self.inner.lock();
        if inner.fail_mark_wip {
            return Err(injected("mark wip").into());
        }
        inner.calls.push(PoolCall::MarkWipAsPending);
        for entry in inner.entries.iter_mut().filter(|entry| entry.is_wip) {
            entry.is_wip = false;
            entry.status = TxStatus::Pending;
        }
        Ok(())
    }
}

// ----- state -----

/// Reply of `MockState::storage_at`
#[derive(Debug, Clone, Copy, Default)]
pub enum StorageReply {
    Value(Hash),
    #[default]
    NotFound,
    Fail,
}

#[derive(Default)]
struct StateInner {
    virtual_batch: u64,
    trusted_batch: u64,
    batches_not_found: bool,
    fail_virtual: bool,
    fail_trusted: bool,
    reorgs: u64,
    fail_reorgs: bool,
    storage: StorageReply,
    storage_reads: Vec<(Address, Hash, Hash)>,
    old_txs: Vec<Hash>,
    fail_old_txs: bool,
    blocks: Vec<FullBlock>,
    full_blocks_requests: Vec<Option<u64>>,
}

#[derive(Default)]
pub struct MockState {
    inner: Mutex<StateInner>,
}

impl MockState {
    pub fn set_batches(&self, virtual_batch: u64, trusted_batch: u64) {
        let mut inner = self.inner.lock();
        inner.virtual_batch = virtual_batch;
        inner.trusted_batch = trusted_batch;
    }

    pub fn fail_batches_with_not_found(&self) {
        self.inner.lock().batches_not_found = true;
    }

    pub fn fail_virtual_batch(&self) {
        self.inner.lock().fail_virtual = true;
    }

    pub fn fail_trusted_batch(&self) {
        self.inner.lock().fail_trusted = true;
    }

    pub fn set_reorgs(&self, count: u64) {
        self.inner.lock().reorgs = count;
    }

    pub fn fail_reorgs(&self) {
        self.inner.lock().fail_reorgs = true;
    }

    pub fn set_storage(&self, reply: StorageReply) {
        self.inner.lock().storage = reply;
    }

    /// Every `(address, position, state_root)` read so far
    pub fn storage_reads(&self) -> Vec<(Address, Hash, Hash)> {
        self.inner.lock().storage_reads.clone()
    }

    pub fn set_old_txs(&self, hashes: Vec<Hash>) {
        self.inner.lock().old_txs = hashes;
    }

    pub fn fail_old_txs(&self) {
        self.inner.lock().fail_old_txs = true;
    }

    pub fn set_full_blocks(&self, blocks: Vec<FullBlock>) {
        self.inner.lock().blocks = blocks;
    }

    pub fn full_blocks_requests(&self) -> Vec<Option<u64>> {
        self.inner.lock().full_blocks_requests.clone()
    }
}

#[async_trait]
impl StateReader for MockState {
    async fn last_virtual_batch_num(&self) -> Result<u64, StateError> {
        let inner = self.inner.lock();
        if inner.fail_virtual {
            return Err(injected("virtual batch").into());
        }
        if inner.batches_not_found {
            return Err(StateError::NotFound);
        }
        Ok(inner.virtual_batch)
    }

    async fn last_batch_number(&self) -> Result<u64, StateError> {
        let inner = self.inner.lock();
        if inner.fail_trusted {
            return Err(injected("trusted batch").into());
        }
        if inner.batches_not_found {
            return Err(StateError::NotFound);
        }
        Ok(inner.trusted_batch)
    }

    async fn count_reorgs(&self) -> Result<u64, StateError> {
        let inner = self.inner.lock();
        if inner.fail_reorgs {
            return Err(injected("reorg count").into());
        }
        Ok(inner.reorgs)
    }

    async fn storage_at(
        &self,
        address: Address,
        position: Hash,
        state_root: Hash,
    ) -> Result<Hash, StateError> {
        let mut inner = self.inner.lock();
        inner.storage_reads.push((address, position, state_root));
        match inner.storage {
            StorageReply::Value(value) => Ok(value),
            StorageReply::NotFound => Err(StateError::NotFound),
            StorageReply::Fail => Err(injected("storage").into()),
        }
    }

    async fn txs_older_than_n_l1_blocks(&self, _confirmations: u64) -> Result<Vec<Hash>, StateError> {
        let inner = self.inner.lock();
        if inner.fail_old_txs {
            return Err(injected("old txs").into());
        }
        Ok(inner.old_txs.clone())
    }

    async fn full_blocks_after(&self, block_number: Option<u64>) -> Result<Vec<FullBlock>, StateError> {
        let mut inner = self.inner.lock();
        inner.full_blocks_requests.push(block_number);
        Ok(inner
            .blocks
            .iter()
            .filter(|block| block_number.map_or(true, |last| block.block_number > last))
            .cloned()
            .collect())
    }
}

// ----- L1 -----

pub struct MockL1 {
    latest_batch: Mutex<u64>,
    trusted_sequencer: Address,
    latest_batch_calls: AtomicUsize,
    fail_latest_batch: Mutex<bool>,
    fail_trusted_sequencer: Mutex<bool>,
}

impl MockL1 {
    pub fn new(latest_batch: u64) -> Self {
        Self {
            latest_batch: Mutex::new(latest_batch),
            trusted_sequencer: Address::new([0x5e; 20]),
            latest_batch_calls: AtomicUsize::new(0),
            fail_latest_batch: Mutex::new(false),
            fail_trusted_sequencer: Mutex::new(false),
        }
    }

    pub fn trusted_sequencer_address(&self) -> Address {
        self.trusted_sequencer
    }

    pub fn latest_batch_calls(&self) -> usize {
        self.latest_batch_calls.load(Ordering::SeqCst)
    }

    pub fn fail_latest_batch(&self) {
        *self.fail_latest_batch.lock() = true;
    }

    pub fn fail_trusted_sequencer(&self) {
        *self.fail_trusted_sequencer.lock() = true;
    }
}

#[async_trait]
impl L1Reader for MockL1 {
    async fn latest_batch_number(&self) -> Result<u64, L1Error> {
        self.latest_batch_calls.fetch_add(1, Ordering::SeqCst);
        if *self.fail_latest_batch.lock() {
            return Err(injected("l1 latest batch").into());
        }
        Ok(*self.latest_batch.lock())
    }

    async fn trusted_sequencer(&self) -> Result<Address, L1Error> {
        if *self.fail_trusted_sequencer.lock() {
            return Err(injected("trusted sequencer").into());
        }
        Ok(self.trusted_sequencer)
    }
}

// ----- finalizer -----

/// Finalizer that sends a fixed list of blocks on start and records halts
#[derive(Default)]
pub struct MockFinalizer {
    blocks_tx: Option<mpsc::Sender<FullBlock>>,
    blocks: Mutex<Vec<FullBlock>>,
    starts: AtomicUsize,
    sent: AtomicUsize,
    halt_causes: Mutex<Vec<String>>,
}

impl MockFinalizer {
    pub fn producing(blocks_tx: mpsc::Sender<FullBlock>, blocks: Vec<FullBlock>) -> Self {
        Self {
            blocks_tx: Some(blocks_tx),
            blocks: Mutex::new(blocks),
            ..Self::default()
        }
    }

    pub fn starts(&self) -> usize {
        self.starts.load(Ordering::SeqCst)
    }

    /// Blocks handed to the block channel so far
    pub fn sent(&self) -> usize {
        self.sent.load(Ordering::SeqCst)
    }

    pub fn halt_causes(&self) -> Vec<String> {
        self.halt_causes.lock().clone()
    }
}

#[async_trait]
impl Finalizer for MockFinalizer {
    async fn start(self: Arc<Self>, cancel: CancellationToken) {
        self.starts.fetch_add(1, Ordering::SeqCst);
        let blocks = std::mem::take(&mut *self.blocks.lock());
        if let Some(blocks_tx) = &self.blocks_tx {
            for block in blocks {
                tokio::select! {
                    _ = cancel.cancelled() => return,
                    sent = blocks_tx.send(block) => {
                        if sent.is_err() {
                            return;
                        }
                        self.sent.fetch_add(1, Ordering::SeqCst);
                    }
                }
            }
        }
        cancel.cancelled().await;
    }

    async fn halt(&self, _cancel: &CancellationToken, cause: anyhow::Error) {
        self.halt_causes.lock().push(cause.to_string());
    }
}

// ----- stream log -----

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum LogRecord {
    Bookmark(Vec<u8>),
    Entry(EntryType, Vec<u8>),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum FailStep {
    Entry(EntryType),
    Commit,
}

#[derive(Default)]
struct LogInner {
    committed: Vec<LogRecord>,
    pending: Option<Vec<LogRecord>>,
    last_bookmark: Option<Vec<u8>>,
    rollbacks: usize,
    fail_on: Option<FailStep>,
}

/// In-memory `StreamLog`; clones share the same records
#[derive(Clone, Default)]
pub struct RecordingLog {
    inner: Arc<Mutex<LogInner>>,
}

impl RecordingLog {
    pub fn committed(&self) -> Vec<LogRecord> {
        self.inner.lock().committed.clone()
    }

    /// Block numbers of the committed bookmarks, in log order
    pub fn committed_blocks(&self) -> Vec<u64> {
        self.committed()
            .iter()
            .filter_map(|record| match record {
                LogRecord::Bookmark(bytes) => BookMark::from_bytes(bytes).ok(),
                LogRecord::Entry(..) => None,
            })
            .map(|bookmark| bookmark.block_number)
            .collect()
    }

    pub fn rollbacks(&self) -> usize {
        self.inner.lock().rollbacks
    }

    pub fn fail_on_entry(&self, entry_type: EntryType) {
        self.inner.lock().fail_on = Some(FailStep::Entry(entry_type));
    }

    pub fn fail_on_commit(&self) {
        self.inner.lock().fail_on = Some(FailStep::Commit);
    }

    pub fn clear_failure(&self) {
        self.inner.lock().fail_on = None;
    }

    fn append(&self, record: LogRecord) -> Result<EntryId, StreamError> {
        let mut inner = self.inner.lock();
        if let LogRecord::Entry(entry_type, _) = &record {
            if inner.fail_on == Some(FailStep::Entry(*entry_type)) {
                return Err(StreamError::Corrupt("injected append failure".to_string()));
            }
        }
        let committed = inner.committed.len();
        let pending = inner.pending.as_mut().ok_or(StreamError::NoAtomicOp)?;
        pending.push(record);
        Ok((committed + pending.len() - 1) as EntryId)
    }
}

impl StreamLog for RecordingLog {
    fn start_atomic_op(&mut self) -> Result<(), StreamError> {
        let mut inner = self.inner.lock();
        if inner.pending.is_some() {
            return Err(StreamError::AtomicOpInProgress);
        }
        inner.pending = Some(Vec::new());
        Ok(())
    }

    fn add_bookmark(&mut self, bookmark: Vec<u8>) -> Result<EntryId, StreamError> {
        self.append(LogRecord::Bookmark(bookmark))
    }

    fn add_entry(&mut self, entry_type: EntryType, data: Vec<u8>) -> Result<EntryId, StreamError> {
        self.append(LogRecord::Entry(entry_type, data))
    }

    fn commit_atomic_op(&mut self) -> Result<(), StreamError> {
        let mut inner = self.inner.lock();
        if inner.fail_on == Some(FailStep::Commit) {
            return Err(StreamError::Corrupt("injected commit failure".to_string()));
        }
        let records = inner.pending.take().ok_or(StreamError::NoAtomicOp)?;
        for record in &records {
            if let LogRecord::Bookmark(bytes) = record {
                inner.last_bookmark = Some(bytes.clone());
            }
        }
        inner.committed.extend(records);
        Ok(())
    }

    fn rollback_atomic_op(&mut self) -> Result<(), StreamError> {
        let mut inner = self.inner.lock();
        inner.pending.take().ok_or(StreamError::NoAtomicOp)?;
        inner.rollbacks += 1;
        Ok(())
    }

    fn last_bookmark(&self) -> Result<Option<Vec<u8>>, StreamError> {
        Ok(self.inner.lock().last_bookmark.clone())
    }
}
