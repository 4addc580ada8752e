//! In-process counters for the sequencer loops

use serde::Serialize;
use std::sync::atomic::{AtomicU64, Ordering};

/// Outcome label of a processed transaction.
///
/// The expiry loop records `Failed`. `Successful` and `Invalid` are recorded
/// by the finalizer, which receives these counters in its context.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TxProcessedLabel {
    /// Executed and included in a block
    Successful,
    /// Included in a block but rejected by the executor
    Invalid,
    /// Dropped before execution
    Failed,
}

#[derive(Debug, Default)]
pub struct SequencerMetrics {
    txs_processed_successful: AtomicU64,
    txs_processed_invalid: AtomicU64,
    txs_processed_failed: AtomicU64,
    txs_added: AtomicU64,
    txs_rejected: AtomicU64,
    txs_replaced: AtomicU64,
    blocks_streamed: AtomicU64,
    stream_faults: AtomicU64,
}

/// Point-in-time copy of the counters
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct MetricsSnapshot {
    pub txs_processed_successful: u64,
    pub txs_processed_invalid: u64,
    pub txs_processed_failed: u64,
    pub txs_added: u64,
    pub txs_rejected: u64,
    pub txs_replaced: u64,
    pub blocks_streamed: u64,
    pub stream_faults: u64,
}

impl SequencerMetrics {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn tx_processed(&self, label: TxProcessedLabel, count: u64) {
        let counter = match label {
            TxProcessedLabel::Successful => &self.txs_processed_successful,
            TxProcessedLabel::Invalid => &self.txs_processed_invalid,
            TxProcessedLabel::Failed => &self.txs_processed_failed,
        };
        counter.fetch_add(count, Ordering::Relaxed);
    }

    pub fn tx_added(&self) {
        self.txs_added.fetch_add(1, Ordering::Relaxed);
    }

    pub fn tx_rejected(&self) {
        self.txs_rejected.fetch_add(1, Ordering::Relaxed);
    }

    pub fn tx_replaced(&self) {
        self.txs_replaced.fetch_add(1, Ordering::Relaxed);
    }

    pub fn block_streamed(&self) {
        self.blocks_streamed.fetch_add(1, Ordering::Relaxed);
    }

    pub fn stream_fault(&self) {
        self.stream_faults.fetch_add(1, Ordering::Relaxed);
    }

    pub fn snapshot(&self) -> MetricsSnapshot {
        MetricsSnapshot {
            txs_processed_successful: self.txs_processed_successful.load(Ordering::Relaxed),
            txs_processed_invalid: self.txs_processed_invalid.load(Ordering::Relaxed),
            txs_processed_failed: self.txs_processed_failed.load(Ordering::Relaxed),
            txs_added: self.txs_added.load(Ordering::Relaxed),
            txs_rejected: self.txs_rejected.load(Ordering::Relaxed),
            txs_replaced: self.txs_replaced.load(Ordering::Relaxed),
            blocks_streamed: self.blocks_streamed.load(Ordering::Relaxed),
            stream_faults: self.stream_faults.load(Ordering::Relaxed),
        }
    }
}
