//! Sync Gate - is the local state caught up with L1?

use crate::error::StateError;
use crate::interfaces::{L1Reader, StateReader};
use std::sync::Arc;
use std::time::Duration;
use tokio_util::sync::CancellationToken;

/// Decides whether the sequencer may operate on the local state.
///
/// Fails closed: any query failure reports "not synced".
#[derive(Clone)]
pub struct SyncGate {
    state: Arc<dyn StateReader>,
    l1: Arc<dyn L1Reader>,
}

impl SyncGate {
    pub fn new(state: Arc<dyn StateReader>, l1: Arc<dyn L1Reader>) -> Self {
        Self { state, l1 }
    }

    pub async fn is_synced(&self) -> bool {
        let last_virtual_batch = match not_found_as_zero(self.state.last_virtual_batch_num().await) {
            Ok(num) => num,
            Err(err) => {
                tracing::error!(error = %err, "failed to get last virtual batch number");
                return false;
            }
        };
        let last_trusted_batch = match not_found_as_zero(self.state.last_batch_number().await) {
            Ok(num) => num,
            Err(err) => {
                tracing::error!(error = %err, "failed to get last batch number");
                return false;
            }
        };

        // Sequencing ahead of L1 confirmation is normal operation
        if last_trusted_batch > last_virtual_batch {
            return true;
        }

        let last_l1_batch = match self.l1.latest_batch_number().await {
            Ok(num) => num,
            Err(err) => {
                tracing::error!(error = %err, "failed to get latest L1 batch number");
                return false;
            }
        };

        if last_virtual_batch < last_l1_batch {
            tracing::info!(
                last_virtual_batch,
                last_l1_batch,
                "waiting for the state to be synced"
            );
            return false;
        }

        true
    }

    /// Poll `is_synced` every `interval` until it holds.
    ///
    /// Returns `false` if `cancel` fires first.
    pub async fn wait_until_synced(&self, interval: Duration, cancel: &CancellationToken) -> bool {
        loop {
            if self.is_synced().await {
                return true;
            }
            tracing::info!("waiting for synchronizer to sync...");
            tokio::select! {
                _ = cancel.cancelled() => return false,
                _ = tokio::time::sleep(interval) => {}
            }
        }
    }
}

fn not_found_as_zero(result: Result<u64, StateError>) -> Result<u64, StateError> {
    match result {
        Err(StateError::NotFound) => Ok(0),
        other => other,
    }
}
