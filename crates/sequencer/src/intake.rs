//! Intake Loop - moves pending pool transactions into the worker

use crate::error::{PoolError, REPLACED_TX_REASON};
use crate::interfaces::{AddTxOutcome, TxPool, TxWorker};
use crate::metrics::SequencerMetrics;
use sequencer_types::{PendingTransaction, TxStatus};
use std::sync::Arc;
use std::time::Duration;
use tokio_util::sync::CancellationToken;

/// What happened to one pool transaction during a cycle
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum IntakeOutcome {
    /// Accepted by the worker and marked WIP
    Added,
    /// Refused by the worker and marked failed
    Rejected,
    /// Tracker could not be built or a pool update failed
    Skipped,
}

pub struct PoolLoader {
    pool: Arc<dyn TxPool>,
    worker: Arc<dyn TxWorker>,
    metrics: Arc<SequencerMetrics>,
    interval: Duration,
}

impl PoolLoader {
    pub fn new(
        pool: Arc<dyn TxPool>,
        worker: Arc<dyn TxWorker>,
        metrics: Arc<SequencerMetrics>,
        interval: Duration,
    ) -> Self {
        Self {
            pool,
            worker,
            metrics,
            interval,
        }
    }

    /// Sleep, load, repeat until cancelled
    pub async fn run(self, cancel: CancellationToken) {
        loop {
            tokio::select! {
                _ = cancel.cancelled() => break,
                _ = tokio::time::sleep(self.interval) => {}
            }
            self.run_once().await;
        }
        tracing::debug!("pool loader stopped");
    }

    /// One intake cycle; returns the outcome per fetched transaction
    pub async fn run_once(&self) -> Vec<IntakeOutcome> {
        let txs = match self.pool.get_non_wip_pending_txs().await {
            Ok(txs) => txs,
            Err(PoolError::NotFound) => return Vec::new(),
            Err(err) => {
                tracing::error!(error = %err, "error loading txs from pool");
                return Vec::new();
            }
        };

        let mut outcomes = Vec::with_capacity(txs.len());
        for tx in &txs {
            let outcome = match self.add_tx_to_worker(tx).await {
                Ok(outcome) => outcome,
                Err(err) => {
                    tracing::error!(hash = %tx.hash, error = %err, "error adding transaction to worker");
                    IntakeOutcome::Skipped
                }
            };
            outcomes.push(outcome);
        }
        outcomes
    }

    async fn add_tx_to_worker(&self, tx: &PendingTransaction) -> Result<IntakeOutcome, PoolError> {
        let tracker = match self.worker.new_tx_tracker(tx) {
            Ok(tracker) => tracker,
            Err(err) => {
                tracing::error!(hash = %tx.hash, error = %err, "invalid transaction, skipping");
                return Ok(IntakeOutcome::Skipped);
            }
        };
        let hash = tracker.hash;

        match self.worker.add_tx_tracker(tracker).await {
            AddTxOutcome::Dropped(reason) => {
                self.metrics.tx_rejected();
                tracing::debug!(%hash, %reason, "worker dropped transaction");
                self.pool
                    .update_tx_status(hash, TxStatus::Failed, false, Some(reason.to_string()))
                    .await?;
                Ok(IntakeOutcome::Rejected)
            }
            AddTxOutcome::Added { replaced } => {
                if let Some(replaced) = replaced {
                    self.metrics.tx_replaced();
                    if let Err(err) = self
                        .pool
                        .update_tx_status(
                            replaced.hash,
                            TxStatus::Failed,
                            false,
                            Some(REPLACED_TX_REASON.to_string()),
                        )
                        .await
                    {
                        tracing::warn!(
                            hash = %replaced.hash,
                            error = %err,
                            "error when setting replaced tx as failed"
                        );
                    }
                }
                self.pool.update_tx_wip_status(tx.hash, true).await?;
                self.metrics.tx_added();
                Ok(IntakeOutcome::Added)
            }
        }
    }
}
