//! Expiry Loop - evicts stale trackers from the worker

use crate::error::EXPIRED_TX_REASON;
use crate::interfaces::{TxPool, TxWorker};
use crate::metrics::{SequencerMetrics, TxProcessedLabel};
use sequencer_types::TxStatus;
use std::sync::Arc;
use std::time::Duration;
use tokio_util::sync::CancellationToken;

pub struct TxExpirer {
    pool: Arc<dyn TxPool>,
    worker: Arc<dyn TxWorker>,
    metrics: Arc<SequencerMetrics>,
    interval: Duration,
    max_lifetime: Duration,
}

impl TxExpirer {
    pub fn new(
        pool: Arc<dyn TxPool>,
        worker: Arc<dyn TxWorker>,
        metrics: Arc<SequencerMetrics>,
        interval: Duration,
        max_lifetime: Duration,
    ) -> Self {
        Self {
            pool,
            worker,
            metrics,
            interval,
            max_lifetime,
        }
    }

    pub async fn run(self, cancel: CancellationToken) {
        loop {
            tokio::select! {
                _ = cancel.cancelled() => break,
                _ = tokio::time::sleep(self.interval) => {}
            }
            self.run_once().await;
        }
        tracing::debug!("tx expirer stopped");
    }

    /// Expire old trackers; returns how many were evicted
    pub async fn run_once(&self) -> usize {
        let expired = self.worker.expire_transactions(self.max_lifetime);
        if expired.is_empty() {
            return 0;
        }
        tracing::info!("expiring {} txs from the worker", expired.len());

        for tracker in &expired {
            let result = self
                .pool
                .update_tx_status(
                    tracker.hash,
                    TxStatus::Failed,
                    false,
                    Some(EXPIRED_TX_REASON.to_string()),
                )
                .await;
            self.metrics.tx_processed(TxProcessedLabel::Failed, 1);
            if let Err(err) = result {
                tracing::error!(hash = %tracker.hash, error = %err, "failed to update tx status");
            }
        }

        expired.len()
    }
}
