//! Consistency Monitor - halts the finalizer when the reorg counter moves

use crate::error::SequencerError;
use crate::interfaces::{Finalizer, StateReader};
use std::sync::Arc;
use std::time::Duration;
use tokio_util::sync::CancellationToken;

/// Why the monitor stopped
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MonitorExit {
    /// Reorg counter changed; the finalizer was halted
    Halted { observed: u64, current: u64 },
    /// The reorg counter could not be read
    QueryFailed,
    Cancelled,
}

pub struct ConsistencyMonitor {
    state: Arc<dyn StateReader>,
    finalizer: Arc<dyn Finalizer>,
    interval: Duration,
}

impl ConsistencyMonitor {
    pub fn new(state: Arc<dyn StateReader>, finalizer: Arc<dyn Finalizer>, interval: Duration) -> Self {
        Self {
            state,
            finalizer,
            interval,
        }
    }

    /// Watch the reorg counter until it changes, cannot be read, or `cancel` fires.
    ///
    /// A monitor that cannot observe the state stops instead of retrying.
    pub async fn run(self, cancel: CancellationToken) -> MonitorExit {
        let observed = match self.state.count_reorgs().await {
            Ok(count) => count,
            Err(err) => {
                tracing::error!(error = %err, "failed to get number of reorgs");
                return MonitorExit::QueryFailed;
            }
        };
        tracing::debug!(observed, "consistency monitor started");

        loop {
            tokio::select! {
                _ = cancel.cancelled() => return MonitorExit::Cancelled,
                _ = tokio::time::sleep(self.interval) => {}
            }

            let current = match self.state.count_reorgs().await {
                Ok(count) => count,
                Err(err) => {
                    tracing::error!(error = %err, "failed to get number of reorgs");
                    return MonitorExit::QueryFailed;
                }
            };

            if current != observed {
                tracing::error!(observed, current, "state inconsistency detected, halting finalizer");
                self.finalizer
                    .halt(&cancel, SequencerError::StateInconsistency.into())
                    .await;
                return MonitorExit::Halted { observed, current };
            }
        }
    }
}
