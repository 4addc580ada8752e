//! Streaming Pipeline - writes finalized blocks to the data stream
//!
//! Each block becomes one atomic group: bookmark, block start, one record per
//! transaction, block end. The first failure rolls the group back and
//! disables the log; only an explicit reattach brings it back, after the
//! reattached log has been caught up with the stored blocks it missed.

use crate::error::StateError;
use crate::interfaces::StateReader;
use crate::metrics::SequencerMetrics;
use datastream::{StreamError, StreamLog};
use sequencer_types::{
    system_sc_position, BookMark, EntryType, FullBlock, Hash, SYSTEM_SC_ADDRESS,
};
use std::sync::Arc;
use thiserror::Error;
use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;

#[derive(Error, Debug)]
pub enum StreamingError {
    #[error("stream log error: {0}")]
    Log(#[from] StreamError),

    #[error("failed to read intermediate state root: {0}")]
    State(#[from] StateError),

    #[error("invalid bookmark in stream log: {0}")]
    Bookmark(std::io::Error),

    #[error("streaming is disabled")]
    Disabled,

    #[error("stream pipeline is not running")]
    PipelineClosed,
}

/// Installs a fresh log into a running pipeline
#[derive(Clone)]
pub struct StreamPipelineHandle {
    reattach_tx: mpsc::UnboundedSender<Box<dyn StreamLog>>,
}

impl StreamPipelineHandle {
    /// Replace the pipeline's log.
    ///
    /// The pipeline catches the new log up from its last bookmark before
    /// streaming the next channel block.
    pub fn reattach(&self, log: Box<dyn StreamLog>) -> Result<(), StreamingError> {
        self.reattach_tx
            .send(log)
            .map_err(|_| StreamingError::PipelineClosed)
    }
}

pub struct StreamPipeline {
    /// `None` once disabled
    log: Option<Box<dyn StreamLog>>,
    /// Highest block number present in the log
    last_streamed: Option<u64>,
    blocks_rx: mpsc::Receiver<FullBlock>,
    reattach_rx: mpsc::UnboundedReceiver<Box<dyn StreamLog>>,
    state: Arc<dyn StateReader>,
    metrics: Arc<SequencerMetrics>,
}

impl StreamPipeline {
    pub fn new(
        log: Option<Box<dyn StreamLog>>,
        blocks_rx: mpsc::Receiver<FullBlock>,
        state: Arc<dyn StateReader>,
        metrics: Arc<SequencerMetrics>,
    ) -> (Self, StreamPipelineHandle) {
        let (reattach_tx, reattach_rx) = mpsc::unbounded_channel();
        let pipeline = Self {
            log,
            last_streamed: None,
            blocks_rx,
            reattach_rx,
            state,
            metrics,
        };
        (pipeline, StreamPipelineHandle { reattach_tx })
    }

    pub fn is_enabled(&self) -> bool {
        self.log.is_some()
    }

    /// Consume blocks until `cancel` fires or every sender is gone
    pub async fn run(mut self, cancel: CancellationToken) {
        loop {
            tokio::select! {
                _ = cancel.cancelled() => break,
                Some(log) = self.reattach_rx.recv() => self.reattach(log).await,
                block = self.blocks_rx.recv() => match block {
                    Some(block) => {
                        let block_number = block.block_number;
                        if self.log.is_some() && self.last_streamed >= Some(block_number) {
                            tracing::debug!(block_number, "block already in stream log, skipping");
                            continue;
                        }
                        match self.stream_block(block).await {
                            Ok(()) | Err(StreamingError::Disabled) => {}
                            Err(err) => {
                                tracing::debug!(block_number, error = %err, "block not streamed");
                            }
                        }
                    }
                    None => break,
                },
            }
        }
        tracing::debug!("stream pipeline stopped");
    }

    /// Install a reattached log and fill in the blocks it missed
    async fn reattach(&mut self, log: Box<dyn StreamLog>) {
        self.log = Some(log);
        match self.catch_up().await {
            Ok(blocks) => {
                tracing::info!(blocks, "stream log reattached, streaming resumed");
            }
            Err(err) => {
                tracing::error!(error = %err, "failed to catch up reattached stream log, stream disabled");
                // A failed append already disabled the log and counted the fault
                if self.log.take().is_some() {
                    self.metrics.stream_fault();
                }
            }
        }
    }

    /// Write one block as an atomic group.
    ///
    /// Any failure rolls the group back and disables the log.
    pub async fn stream_block(&mut self, block: FullBlock) -> Result<(), StreamingError> {
        let Some(log) = self.log.as_mut() else {
            tracing::trace!(block_number = block.block_number, "streaming disabled, dropping block");
            return Err(StreamingError::Disabled);
        };

        match append_block(log.as_mut(), self.state.as_ref(), &block).await {
            Ok(()) => {
                self.last_streamed = Some(block.block_number);
                self.metrics.block_streamed();
                tracing::debug!(
                    block_number = block.block_number,
                    txs = block.txs.len(),
                    "block streamed"
                );
                Ok(())
            }
            Err(err) => {
                if let Err(rollback_err) = log.rollback_atomic_op() {
                    tracing::error!(error = %rollback_err, "failed to roll back stream atomic op");
                }
                tracing::error!(
                    block_number = block.block_number,
                    error = %err,
                    "error streaming block, stream disabled"
                );
                self.metrics.stream_fault();
                self.log = None;
                Err(err)
            }
        }
    }

    /// Stream stored blocks the log has not seen yet; returns how many were written
    pub async fn catch_up(&mut self) -> Result<usize, StreamingError> {
        let last_bookmark = match self.log.as_ref() {
            Some(log) => log.last_bookmark()?,
            None => return Err(StreamingError::Disabled),
        };
        let last_block = match last_bookmark {
            Some(bytes) => Some(
                BookMark::from_bytes(&bytes)
                    .map_err(StreamingError::Bookmark)?
                    .block_number,
            ),
            None => None,
        };
        self.last_streamed = last_block;

        let blocks = self.state.full_blocks_after(last_block).await?;
        if blocks.is_empty() {
            tracing::info!(?last_block, "data stream is up to date");
            return Ok(0);
        }

        tracing::info!(?last_block, count = blocks.len(), "updating data stream file");
        let count = blocks.len();
        for block in blocks {
            self.stream_block(block).await?;
        }
        Ok(count)
    }
}

async fn append_block(
    log: &mut dyn StreamLog,
    state: &dyn StateReader,
    block: &FullBlock,
) -> Result<(), StreamingError> {
    log.start_atomic_op()?;
    log.add_bookmark(block.bookmark().to_bytes())?;
    log.add_entry(EntryType::L2BlockStart, block.start_record().to_bytes())?;

    let position = system_sc_position(block.block_number);
    for tx in &block.txs {
        let state_root = match state
            .storage_at(SYSTEM_SC_ADDRESS, position, block.state_root)
            .await
        {
            Ok(root) => root,
            Err(StateError::NotFound) => Hash::ZERO,
            Err(err) => return Err(err.into()),
        };

        let mut record = tx.clone();
        record.state_root = state_root;
        log.add_entry(EntryType::L2Tx, record.to_bytes())?;
    }

    log.add_entry(EntryType::L2BlockEnd, block.end_record().to_bytes())?;
    log.commit_atomic_op()?;
    Ok(())
}
