//! Sequencer errors

use crate::config::ConfigError;
use crate::streaming::StreamingError;
use datastream::StreamError;
use thiserror::Error;

/// Pool failure reason recorded for trackers evicted by the expiry loop
pub const EXPIRED_TX_REASON: &str = "transaction expired";

/// Pool failure reason recorded for trackers replaced in the worker
pub const REPLACED_TX_REASON: &str = "replaced transaction";

/// Startup and cross-component errors
#[derive(Error, Debug)]
pub enum SequencerError {
    #[error("failed to get trusted sequencer address: {0}")]
    TrustedSequencer(#[source] L1Error),

    #[error("failed to mark WIP txs as pending: {0}")]
    MarkWipAsPending(#[source] PoolError),

    #[error("failed to create stream server: {0}")]
    StreamServer(#[source] StreamError),

    #[error("failed to update data stream file: {0}")]
    StreamCatchUp(#[source] StreamingError),

    #[error("state inconsistency detected, halting finalizer")]
    StateInconsistency,

    #[error("shutdown requested before startup completed")]
    Cancelled,

    #[error("invalid config: {0}")]
    Config(#[from] ConfigError),
}

/// Transaction pool errors
#[derive(Error, Debug)]
pub enum PoolError {
    #[error("not found")]
    NotFound,

    #[error(transparent)]
    Other(#[from] anyhow::Error),
}

/// State store errors
#[derive(Error, Debug)]
pub enum StateError {
    #[error("state not found")]
    NotFound,

    #[error(transparent)]
    Other(#[from] anyhow::Error),
}

/// L1 reader errors
#[derive(Error, Debug)]
pub enum L1Error {
    #[error("l1 request failed: {0}")]
    Request(#[from] anyhow::Error),
}

/// Transaction rejected while building its tracker
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum WorkerError {
    #[error("empty transaction payload")]
    EmptyPayload,

    #[error("invalid origin ip: {0}")]
    InvalidIp(String),
}

/// Reason the worker refused a tracker
#[derive(Error, Debug, Clone, Copy, PartialEq, Eq)]
pub enum DropReason {
    #[error("out of counters: transaction exceeds batch resources")]
    OutOfCounters,

    #[error("duplicate nonce with equal or lower gas price")]
    Underpriced,
}
