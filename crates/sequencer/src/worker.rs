//! Worker - admitted transactions waiting for block building
//!
//! Trackers are grouped per sender and ordered by nonce. A single mutex
//! guards the whole set so that intake (insert) and expiry (evict) see each
//! other's changes atomically.

use crate::config::BatchConstraints;
use crate::error::{DropReason, WorkerError};
use crate::interfaces::{AddTxOutcome, TxWorker};
use async_trait::async_trait;
use parking_lot::Mutex;
use sequencer_types::{Address, PendingTransaction, TxTracker};
use std::collections::{BTreeMap, HashMap};
use std::net::IpAddr;
use std::time::{Duration, Instant};

#[derive(Default)]
struct WorkerState {
    /// Trackers per sender, keyed by nonce
    senders: HashMap<Address, BTreeMap<u64, TxTracker>>,
}

pub struct Worker {
    constraints: BatchConstraints,
    state: Mutex<WorkerState>,
}

impl Worker {
    pub fn new(constraints: BatchConstraints) -> Self {
        Self {
            constraints,
            state: Mutex::new(WorkerState::default()),
        }
    }

    /// Number of queued trackers
    pub fn len(&self) -> usize {
        self.state.lock().senders.values().map(BTreeMap::len).sum()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Remove and return the best candidate for the next block: the highest
    /// gas price among each sender's lowest-nonce tracker.
    pub fn take_best(&self) -> Option<TxTracker> {
        let mut state = self.state.lock();

        let (sender, nonce) = state
            .senders
            .iter()
            .filter_map(|(sender, queue)| queue.first_key_value().map(|(nonce, tx)| (sender, nonce, tx)))
            .max_by_key(|(_, _, tx)| tx.gas_price)
            .map(|(sender, nonce, _)| (*sender, *nonce))?;

        let queue = state.senders.get_mut(&sender)?;
        let best = queue.remove(&nonce);
        if queue.is_empty() {
            state.senders.remove(&sender);
        }
        best
    }
}

#[async_trait]
impl TxWorker for Worker {
    fn new_tx_tracker(&self, tx: &PendingTransaction) -> Result<TxTracker, WorkerError> {
        if tx.encoded.is_empty() {
            return Err(WorkerError::EmptyPayload);
        }
        if !tx.ip.is_empty() && tx.ip.parse::<IpAddr>().is_err() {
            return Err(WorkerError::InvalidIp(tx.ip.clone()));
        }

        Ok(TxTracker {
            hash: tx.hash,
            from: tx.from,
            nonce: tx.nonce,
            gas_price: tx.gas_price,
            counters: tx.zk_counters,
            ip: tx.ip.clone(),
            received_at: Instant::now(),
        })
    }

    async fn add_tx_tracker(&self, tracker: TxTracker) -> AddTxOutcome {
        if !tracker.counters.fits_within(&self.constraints.max_counters) {
            return AddTxOutcome::Dropped(DropReason::OutOfCounters);
        }

        let mut state = self.state.lock();
        let queue = state.senders.entry(tracker.from).or_default();

        match queue.get(&tracker.nonce) {
            Some(existing) if existing.hash == tracker.hash => {
                AddTxOutcome::Added { replaced: None }
            }
            Some(existing) if existing.gas_price >= tracker.gas_price => {
                AddTxOutcome::Dropped(DropReason::Underpriced)
            }
            _ => {
                let replaced = queue.insert(tracker.nonce, tracker);
                AddTxOutcome::Added { replaced }
            }
        }
    }

    fn expire_transactions(&self, max_lifetime: Duration) -> Vec<TxTracker> {
        let mut state = self.state.lock();
        let mut expired = Vec::new();

        for queue in state.senders.values_mut() {
            let stale: Vec<u64> = queue
                .iter()
                .filter(|(_, tx)| tx.is_expired(max_lifetime))
                .map(|(nonce, _)| *nonce)
                .collect();
            for nonce in stale {
                if let Some(tx) = queue.remove(&nonce) {
                    expired.push(tx);
                }
            }
        }
        state.senders.retain(|_, queue| !queue.is_empty());

        expired
    }
}
