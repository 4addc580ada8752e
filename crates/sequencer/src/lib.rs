//! Sequencer - orchestration core of the L2 sequencer
//!
//! Architecture:
//! - Sync Gate: refuses to operate until local state has caught up with L1
//! - Intake / Expiry: move pool transactions into the worker and evict stale ones
//! - Pool Janitor: deletes confirmed and long-failed transactions from the pool
//! - Consistency Monitor: halts the finalizer when a reorg is detected
//! - Streaming Pipeline: writes finalized blocks to the data stream atomically
//!
//! The finalizer, pool, state store and L1 reader are collaborators
//! described by the traits in [`interfaces`].

pub mod config;
pub mod consistency;
pub mod error;
pub mod expiry;
pub mod intake;
pub mod interfaces;
pub mod janitor;
pub mod metrics;
pub mod sequencer;
pub mod streaming;
pub mod sync;
pub mod telemetry;
pub mod worker;

#[cfg(test)]
mod test_utils;

pub use config::{BatchConstraints, ConfigError, SequencerConfig, StreamServerConfig};
pub use consistency::{ConsistencyMonitor, MonitorExit};
pub use error::{
    DropReason, L1Error, PoolError, SequencerError, StateError, WorkerError, EXPIRED_TX_REASON,
    REPLACED_TX_REASON,
};
pub use expiry::TxExpirer;
pub use intake::{IntakeOutcome, PoolLoader};
pub use interfaces::{AddTxOutcome, Finalizer, L1Reader, StateReader, TxPool, TxWorker};
pub use janitor::{JanitorCycle, PoolJanitor};
pub use metrics::{MetricsSnapshot, SequencerMetrics, TxProcessedLabel};
pub use sequencer::{FinalizerContext, Sequencer, SequencerTasks};
pub use streaming::{StreamPipeline, StreamPipelineHandle, StreamingError};
pub use sync::SyncGate;
pub use worker::Worker;
