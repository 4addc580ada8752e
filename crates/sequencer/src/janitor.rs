//! Pool Janitor - deletes confirmed and failed transactions from the pool

use crate::interfaces::{StateReader, TxPool};
use chrono::{DateTime, Utc};
use std::sync::Arc;
use std::time::Duration;
use tokio_util::sync::CancellationToken;

/// Assumed L1 block time used to turn confirmations into wall-clock age
pub const L1_BLOCK_TIME: Duration = Duration::from_secs(14);

/// Result of one janitor cycle
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum JanitorCycle {
    /// Both sub-tasks ran; `deleted` confirmed txs were removed
    Completed { deleted: usize },
    /// Deleting confirmed txs failed; failed txs were left for the next cycle
    ConfirmedFailed,
    /// Confirmed txs were deleted but deleting failed txs did not succeed
    FailedTxsFailed { deleted: usize },
}

pub struct PoolJanitor {
    pool: Arc<dyn TxPool>,
    state: Arc<dyn StateReader>,
    interval: Duration,
    l1_block_confirmations: u64,
}

impl PoolJanitor {
    pub fn new(
        pool: Arc<dyn TxPool>,
        state: Arc<dyn StateReader>,
        interval: Duration,
        l1_block_confirmations: u64,
    ) -> Self {
        Self {
            pool,
            state,
            interval,
            l1_block_confirmations,
        }
    }

    pub async fn run(self, cancel: CancellationToken) {
        loop {
            tokio::select! {
                _ = cancel.cancelled() => break,
                _ = tokio::time::sleep(self.interval) => {}
            }
            self.run_once(Utc::now()).await;
        }
        tracing::debug!("pool janitor stopped");
    }

    /// Cutoff for deleting failed transactions at `now`
    pub fn failed_cutoff(&self, now: DateTime<Utc>) -> DateTime<Utc> {
        let confirmations = u32::try_from(self.l1_block_confirmations).unwrap_or(u32::MAX);
        let age = L1_BLOCK_TIME.saturating_mul(confirmations);
        chrono::Duration::from_std(age)
            .ok()
            .and_then(|age| now.checked_sub_signed(age))
            .unwrap_or(DateTime::<Utc>::MIN_UTC)
    }

    pub async fn run_once(&self, now: DateTime<Utc>) -> JanitorCycle {
        tracing::info!("trying to get txs to delete from the pool...");
        let hashes = match self
            .state
            .txs_older_than_n_l1_blocks(self.l1_block_confirmations)
            .await
        {
            Ok(hashes) => hashes,
            Err(err) => {
                tracing::error!(error = %err, "failed to get txs hashes to delete");
                return JanitorCycle::ConfirmedFailed;
            }
        };

        tracing::info!("trying to delete {} selected txs", hashes.len());
        if let Err(err) = self.pool.delete_transactions_by_hashes(&hashes).await {
            tracing::error!(error = %err, "failed to delete selected txs from the pool");
            return JanitorCycle::ConfirmedFailed;
        }
        tracing::info!("deleted {} selected txs from the pool", hashes.len());

        let cutoff = self.failed_cutoff(now);
        tracing::info!(%cutoff, "trying to delete failed txs from the pool");
        if let Err(err) = self.pool.delete_failed_transactions_older_than(cutoff).await {
            tracing::error!(error = %err, "failed to delete failed txs from the pool");
            return JanitorCycle::FailedTxsFailed {
                deleted: hashes.len(),
            };
        }
        tracing::info!("failed txs deleted from the pool");

        JanitorCycle::Completed {
            deleted: hashes.len(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::test_utils::{pending_tx, MockPool, MockState, PoolCall};
    use chrono::TimeZone;

    fn janitor(pool: &Arc<MockPool>, state: &Arc<MockState>) -> PoolJanitor {
        PoolJanitor::new(pool.clone(), state.clone(), Duration::from_secs(60), 100)
    }

    #[tokio::test]
    async fn test_cycle_deletes_confirmed_and_failed() {
        let pool = Arc::new(MockPool::default());
        let state = Arc::new(MockState::default());
        let confirmed = pending_tx(1, 1, 0, 10);
        pool.insert(confirmed.clone());
        pool.insert(pending_tx(2, 2, 0, 10));
        state.set_old_txs(vec![confirmed.hash]);

        let now = Utc.with_ymd_and_hms(2024, 1, 1, 12, 0, 0).unwrap();
        let cycle = janitor(&pool, &state).run_once(now).await;

        assert_eq!(cycle, JanitorCycle::Completed { deleted: 1 });
        assert!(pool.status(&confirmed.hash).is_none());
        assert_eq!(pool.len(), 1);
        assert_eq!(
            pool.calls().last(),
            Some(&PoolCall::DeleteFailedOlderThan(now - chrono::Duration::seconds(1400)))
        );
    }

    #[tokio::test]
    async fn test_state_failure_skips_failed_cleanup() {
        let pool = Arc::new(MockPool::default());
        let state = Arc::new(MockState::default());
        state.fail_old_txs();

        let cycle = janitor(&pool, &state).run_once(Utc::now()).await;

        assert_eq!(cycle, JanitorCycle::ConfirmedFailed);
        assert!(pool.calls().is_empty());
    }

    #[tokio::test]
    async fn test_delete_failure_skips_failed_cleanup() {
        let pool = Arc::new(MockPool::default());
        let state = Arc::new(MockState::default());
        pool.fail_deletes();

        let cycle = janitor(&pool, &state).run_once(Utc::now()).await;

        assert_eq!(cycle, JanitorCycle::ConfirmedFailed);
        assert!(!pool
            .calls()
            .iter()
            .any(|call| matches!(call, PoolCall::DeleteFailedOlderThan(_))));
    }

    #[tokio::test]
    async fn test_failed_cleanup_error_is_reported() {
        let pool = Arc::new(MockPool::default());
        let state = Arc::new(MockState::default());
        pool.fail_failed_cleanup();

        let cycle = janitor(&pool, &state).run_once(Utc::now()).await;
        assert_eq!(cycle, JanitorCycle::FailedTxsFailed { deleted: 0 });
    }
}
